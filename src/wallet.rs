// ===============================
// src/wallet.rs (wallet provider seam)
// ===============================
//
// Wallet = kolaborator eksternal. Yang kita butuhkan cuma:
// address, chain id yang sedang terkoneksi, personal_sign, dan EIP-712.
//
use std::io::{self, BufRead, Write};

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer as _};
use ethers::types::transaction::eip712::TypedData;
use ethers::types::{Address, Signature};

use crate::error::{Error, Result};

#[async_trait]
pub trait WalletProvider: Send + Sync {
    fn address(&self) -> Address;

    /// Chain the wallet is connected to right now.
    async fn chain_id(&self) -> Result<u64>;

    /// EIP-191 personal message signature.
    async fn sign_message(&self, message: &str) -> Result<Signature>;

    async fn sign_typed_data(&self, typed: &TypedData) -> Result<Signature>;
}

/// Map a wallet's error text to our taxonomy.
pub fn classify_wallet_error(msg: &str) -> Error {
    let lower = msg.to_ascii_lowercase();
    if lower.contains("user rejected") || lower.contains("user denied") || lower.contains("rejected by user") {
        Error::UserRejected
    } else {
        Error::Signing(msg.to_string())
    }
}

/// Local secp256k1 key.
pub struct KeyWallet {
    inner: LocalWallet,
    chain_id: u64,
}

impl KeyWallet {
    pub fn from_private_key(key: &str, chain_id: u64) -> Result<Self> {
        let inner: LocalWallet = key
            .trim()
            .trim_start_matches("0x")
            .parse()
            .map_err(|e| Error::Config(format!("private key: {e}")))?;
        Ok(Self { inner: inner.with_chain_id(chain_id), chain_id })
    }

    pub fn random(chain_id: u64) -> Self {
        let inner = LocalWallet::new(&mut rand::thread_rng());
        Self { inner: inner.with_chain_id(chain_id), chain_id }
    }

    pub fn local(&self) -> &LocalWallet {
        &self.inner
    }
}

// private key tidak boleh bocor lewat Debug
impl std::fmt::Debug for KeyWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyWallet")
            .field("address", &self.inner.address())
            .field("chain_id", &self.chain_id)
            .finish()
    }
}

#[async_trait]
impl WalletProvider for KeyWallet {
    fn address(&self) -> Address {
        self.inner.address()
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(self.chain_id)
    }

    async fn sign_message(&self, message: &str) -> Result<Signature> {
        self.inner
            .sign_message(message)
            .await
            .map_err(|e| classify_wallet_error(&e.to_string()))
    }

    async fn sign_typed_data(&self, typed: &TypedData) -> Result<Signature> {
        self.inner
            .sign_typed_data(typed)
            .await
            .map_err(|e| classify_wallet_error(&e.to_string()))
    }
}

/// Asks the operator on the terminal before every signature.
pub struct PromptWallet<W> {
    inner: W,
}

impl<W: WalletProvider> PromptWallet<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    async fn confirm(&self, what: String) -> Result<()> {
        let approved = tokio::task::spawn_blocking(move || -> io::Result<bool> {
            let mut out = io::stderr();
            write!(out, "sign {what}? [y/N] ")?;
            out.flush()?;
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
        })
        .await
        .map_err(|e| Error::Signing(e.to_string()))?
        .map_err(|e| Error::Signing(e.to_string()))?;

        if approved {
            Ok(())
        } else {
            Err(Error::UserRejected)
        }
    }
}

#[async_trait]
impl<W: WalletProvider> WalletProvider for PromptWallet<W> {
    fn address(&self) -> Address {
        self.inner.address()
    }

    async fn chain_id(&self) -> Result<u64> {
        self.inner.chain_id().await
    }

    async fn sign_message(&self, message: &str) -> Result<Signature> {
        self.confirm(format!("message {message}")).await?;
        self.inner.sign_message(message).await
    }

    async fn sign_typed_data(&self, typed: &TypedData) -> Result<Signature> {
        self.confirm(format!("typed data {}", typed.primary_type)).await?;
        self.inner.sign_typed_data(typed).await
    }
}

#[async_trait]
impl<W: WalletProvider + ?Sized> WalletProvider for std::sync::Arc<W> {
    fn address(&self) -> Address {
        (**self).address()
    }

    async fn chain_id(&self) -> Result<u64> {
        (**self).chain_id().await
    }

    async fn sign_message(&self, message: &str) -> Result<Signature> {
        (**self).sign_message(message).await
    }

    async fn sign_typed_data(&self, typed: &TypedData) -> Result<Signature> {
        (**self).sign_typed_data(typed).await
    }
}
