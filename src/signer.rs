// ===============================
// src/signer.rs
// ===============================
//
// Dua mode tanda tangan, jangan tertukar:
// - L1 action (order/cancel): raw personal_sign atas string JSON kanonik
// - user-signed action (approveBuilderFee): EIP-712 typed data, chainId dari wallet
//
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use ethers::types::transaction::eip712::TypedData;
use ethers::types::{Address, Signature, U256};
use serde::Serialize;
use tracing::debug;

use crate::config::Network;
use crate::domain::{Action, ApproveBuilderFee, SignatureWire, SignedEnvelope};
use crate::error::{Error, Result};
use crate::wallet::WalletProvider;

pub const SIGN_DOMAIN_NAME: &str = "HyperliquidSignTransaction";
pub const APPROVE_BUILDER_FEE_TYPE: &str = "HyperliquidTransaction:ApproveBuilderFee";

pub fn timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Wall-clock millis, strictly increasing even within the same millisecond.
#[derive(Debug, Default)]
pub struct NonceSource {
    last: AtomicU64,
}

impl NonceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u64 {
        self.next_at(timestamp_ms())
    }

    pub fn next_at(&self, now_ms: u64) -> u64 {
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now_ms.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(actual) => prev = actual,
            }
        }
    }
}

/// Lower-case 0x hex; the venue compares the serialized form byte for byte.
pub fn address_lower(addr: &Address) -> String {
    format!("{:#x}", addr)
}

fn u256_hex(v: U256) -> String {
    let mut buf = [0u8; 32];
    v.to_big_endian(&mut buf);
    format!("0x{}", hex::encode(buf))
}

pub fn signature_wire(sig: &Signature) -> SignatureWire {
    SignatureWire { r: u256_hex(sig.r), s: u256_hex(sig.s), v: sig.v }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct L1Payload<'a> {
    action: &'a Action,
    nonce: u64,
    vault_address: Option<String>,
}

/// Exact string signed for an L1 action.
pub fn l1_message(action: &Action, nonce: u64) -> Result<String> {
    let payload = L1Payload { action, nonce, vault_address: None };
    Ok(serde_json::to_string(&payload)?)
}

/// `0x66eee` style hex used in the `signatureChainId` field.
pub fn chain_id_hex(chain_id: u64) -> String {
    format!("0x{:x}", chain_id)
}

pub fn builder_fee_typed_data(action: &ApproveBuilderFee, chain_id: u64) -> Result<TypedData> {
    let td = serde_json::json!({
        "types": {
            "EIP712Domain": [
                {"name": "name", "type": "string"},
                {"name": "version", "type": "string"},
                {"name": "chainId", "type": "uint256"},
                {"name": "verifyingContract", "type": "address"}
            ],
            APPROVE_BUILDER_FEE_TYPE: [
                {"name": "hyperliquidChain", "type": "string"},
                {"name": "maxFeeRate", "type": "string"},
                {"name": "builder", "type": "address"},
                {"name": "nonce", "type": "uint64"},
                {"name": "signatureChainId", "type": "string"}
            ]
        },
        "primaryType": APPROVE_BUILDER_FEE_TYPE,
        "domain": {
            "name": SIGN_DOMAIN_NAME,
            "version": "1",
            "chainId": chain_id,
            "verifyingContract": "0x0000000000000000000000000000000000000000"
        },
        "message": {
            "hyperliquidChain": action.hyperliquid_chain,
            "maxFeeRate": action.max_fee_rate,
            "builder": action.builder,
            "nonce": action.nonce,
            "signatureChainId": action.signature_chain_id
        }
    });
    serde_json::from_value(td).map_err(|e| Error::Signing(format!("typed data: {e}")))
}

/// Signing adapter over any wallet provider. One instance per signer (owns its nonces).
pub struct Signer<W> {
    wallet: W,
    network: Network,
    nonces: NonceSource,
}

impl<W: WalletProvider> Signer<W> {
    pub fn new(wallet: W, network: Network) -> Self {
        Self { wallet, network, nonces: NonceSource::new() }
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    pub fn wallet(&self) -> &W {
        &self.wallet
    }

    pub fn next_nonce(&self) -> u64 {
        self.nonces.next()
    }

    /// Raw-message mode for orders and cancels.
    pub async fn sign_l1_action(&self, action: Action, nonce: u64) -> Result<SignedEnvelope> {
        let message = l1_message(&action, nonce)?;
        debug!(kind = action.kind(), nonce, "signing l1 action");
        let sig = self.wallet.sign_message(&message).await?;
        Ok(SignedEnvelope {
            action,
            nonce,
            signature: signature_wire(&sig),
            vault_address: None,
        })
    }

    pub fn approve_builder_fee_action(
        &self,
        builder: &Address,
        max_fee_rate: &str,
        nonce: u64,
        chain_id: u64,
    ) -> ApproveBuilderFee {
        ApproveBuilderFee {
            hyperliquid_chain: self.network.hyperliquid_chain().to_string(),
            signature_chain_id: chain_id_hex(chain_id),
            max_fee_rate: max_fee_rate.to_string(),
            builder: address_lower(builder),
            nonce,
        }
    }

    /// Typed-data mode; the domain uses the wallet's live chain id.
    pub async fn sign_builder_fee_approval(
        &self,
        builder: &Address,
        max_fee_rate: &str,
        nonce: u64,
    ) -> Result<SignedEnvelope> {
        let chain_id = self.wallet.chain_id().await?;
        let action = self.approve_builder_fee_action(builder, max_fee_rate, nonce, chain_id);
        let typed = builder_fee_typed_data(&action, chain_id)?;
        debug!(chain_id, nonce, "signing builder fee approval");
        let sig = self.wallet.sign_typed_data(&typed).await?;
        Ok(SignedEnvelope {
            action: Action::ApproveBuilderFee(action),
            nonce,
            signature: signature_wire(&sig),
            vault_address: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{build_order, order_action};
    use crate::domain::Tif;
    use crate::wallet::KeyWallet;
    use ethers::types::transaction::eip712::Eip712;
    use ethers::types::H256;

    #[test]
    fn nonces_strictly_increase_within_same_millisecond() {
        let n = NonceSource::new();
        let a = n.next_at(1_700_000_000_000);
        let b = n.next_at(1_700_000_000_000);
        let c = n.next_at(1_699_999_999_999); // clock went backwards
        let d = n.next_at(1_700_000_000_500);
        assert_eq!(a, 1_700_000_000_000);
        assert_eq!(b, a + 1);
        assert_eq!(c, b + 1);
        assert_eq!(d, 1_700_000_000_500);
    }

    #[test]
    fn l1_message_is_canonical() {
        let o = build_order(135, true, "10", "1", false, Tif::Gtc).unwrap();
        let msg = l1_message(&order_action(vec![o]), 42).unwrap();
        assert_eq!(
            msg,
            r#"{"action":{"type":"order","orders":[{"a":135,"b":true,"p":"10","s":"1","r":false,"t":{"limit":{"tif":"Gtc"}}}],"grouping":"na"},"nonce":42,"vaultAddress":null}"#
        );
    }

    #[tokio::test]
    async fn l1_signature_recovers_to_signer() {
        let wallet = KeyWallet::random(42161);
        let addr = wallet.address();
        let signer = Signer::new(wallet, Network::Mainnet);
        let o = build_order(1, false, "2500.5", "0.01", true, Tif::Alo).unwrap();
        let env = signer.sign_l1_action(order_action(vec![o]), 7).await.unwrap();

        assert!(env.signature.v == 27 || env.signature.v == 28);
        assert_eq!(env.signature.r.len(), 66);

        let sig = Signature {
            r: U256::from_str_radix(&env.signature.r[2..], 16).unwrap(),
            s: U256::from_str_radix(&env.signature.s[2..], 16).unwrap(),
            v: env.signature.v,
        };
        let msg = l1_message(&env.action, env.nonce).unwrap();
        assert_eq!(sig.recover(msg.as_str()).unwrap(), addr);
    }

    #[tokio::test]
    async fn builder_approval_uses_wallet_chain_and_lowercase_address() {
        let wallet = KeyWallet::random(998);
        let addr = wallet.address();
        let signer = Signer::new(wallet, Network::Testnet);
        let builder: Address = "0xAbCdEf0123456789aBcDeF0123456789AbCdEf01".parse().unwrap();

        let env = signer.sign_builder_fee_approval(&builder, "0.001%", 1234).await.unwrap();
        let Action::ApproveBuilderFee(ref action) = env.action else {
            panic!("wrong action kind");
        };
        assert_eq!(action.builder, "0xabcdef0123456789abcdef0123456789abcdef01");
        assert_eq!(action.signature_chain_id, "0x3e6");
        assert_eq!(action.hyperliquid_chain, "Testnet");

        let typed = builder_fee_typed_data(action, 998).unwrap();
        assert_eq!(typed.domain.chain_id, Some(U256::from(998u64)));
        let digest = typed.encode_eip712().unwrap();
        let sig = Signature {
            r: U256::from_str_radix(&env.signature.r[2..], 16).unwrap(),
            s: U256::from_str_radix(&env.signature.s[2..], 16).unwrap(),
            v: env.signature.v,
        };
        assert_eq!(sig.recover(H256::from(digest)).unwrap(), addr);

        // signature for one chain must not verify under another chain's domain
        let other = builder_fee_typed_data(action, 42161).unwrap().encode_eip712().unwrap();
        assert_ne!(sig.recover(H256::from(other)).unwrap(), addr);
    }

    #[test]
    fn signature_hex_is_padded() {
        assert_eq!(
            u256_hex(U256::from(1u64)),
            "0x0000000000000000000000000000000000000000000000000000000000000001"
        );
    }
}
