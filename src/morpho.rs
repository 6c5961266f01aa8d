// ===============================
// src/morpho.rs (Morpho Blue wstETH/USDC)
// ===============================
//
// Baca posisi + market dari kontrak, ubah ke PositionInputs (lending.rs),
// dan kirim supplyCollateral / borrow / repay. Harga ETH/USD dari Chainlink,
// di-cache 60s, fallback ke harga konfigurasi kalau RPC gagal.
//
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use ethers::abi::Detokenize;
use ethers::contract::{abigen, ContractCall, ContractError};
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer as _};
use ethers::middleware::SignerMiddleware;
use ethers::types::{Address, Bytes, H256, U256, U64};
use serde::Serialize;
use ethers::utils::{format_units, parse_units, ParseUnits};
use tracing::{info, warn};

use crate::config::MorphoConfig;
use crate::error::{Error, Result};
use crate::fixed::is_valid_input;
use crate::lending::{borrow_shares_to_assets, units_to_f64, PositionInputs, PositionMetrics};

abigen!(
    MorphoBlue,
    r#"[
        struct MarketParams { address loanToken; address collateralToken; address oracle; address irm; uint256 lltv; }
        function position(bytes32 id, address user) external view returns (uint256 supplyShares, uint128 borrowShares, uint128 collateral)
        function market(bytes32 id) external view returns (uint128 totalSupplyAssets, uint128 totalSupplyShares, uint128 totalBorrowAssets, uint128 totalBorrowShares, uint128 lastUpdate, uint128 fee)
        function supplyCollateral(MarketParams marketParams, uint256 assets, address onBehalf, bytes data) external
        function borrow(MarketParams marketParams, uint256 assets, uint256 shares, address onBehalf, address receiver) external returns (uint256, uint256)
        function repay(MarketParams marketParams, uint256 assets, uint256 shares, address onBehalf, bytes data) external returns (uint256, uint256)
    ]"#;

    Erc20,
    r#"[
        function approve(address spender, uint256 amount) external returns (bool)
        function balanceOf(address account) external view returns (uint256)
    ]"#;

    ChainlinkFeed,
    r#"[
        function latestRoundData() external view returns (uint80 roundId, int256 answer, uint256 startedAt, uint256 updatedAt, uint80 answeredInRound)
    ]"#;
);

pub const ETH_PRICE_TTL: Duration = Duration::from_secs(60);
const CHAINLINK_DECIMALS: i32 = 8;
const ETHEREUM_MAINNET: u64 = 1;

pub type ReadClient = Provider<Http>;
pub type WriteClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Source of the numbers the health-factor math needs.
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn position_inputs(&self, user: Address) -> Result<PositionInputs>;

    async fn position_metrics(&self, user: Address) -> Result<PositionMetrics> {
        Ok(PositionMetrics::derive(&self.position_inputs(user).await?))
    }
}

/// On-chain writes; amounts are human decimal strings, returns the tx hash.
#[async_trait]
pub trait LendingActions: Send + Sync {
    async fn supply_collateral(&self, amount: &str) -> Result<String>;
    async fn borrow(&self, amount: &str) -> Result<String>;
    async fn repay(&self, amount: &str) -> Result<String>;
}

#[derive(Debug)]
pub enum SupplyBorrowOutcome {
    Both { supply_tx: String, borrow_tx: String },
    /// Collateral is on-chain; only the borrow needs another attempt.
    SupplyOnly { supply_tx: String, borrow_error: Error },
}

/// Supply first; a borrow failure afterwards does not roll the supply back.
pub async fn supply_then_borrow<L: LendingActions + ?Sized>(
    lending: &L,
    collateral_amount: &str,
    borrow_amount: &str,
) -> Result<SupplyBorrowOutcome> {
    let supply_tx = lending.supply_collateral(collateral_amount).await?;
    info!(%supply_tx, collateral_amount, "collateral supplied");
    match lending.borrow(borrow_amount).await {
        Ok(borrow_tx) => {
            info!(%borrow_tx, borrow_amount, "borrowed");
            Ok(SupplyBorrowOutcome::Both { supply_tx, borrow_tx })
        }
        Err(borrow_error) => {
            warn!(%supply_tx, error = %borrow_error, "supply succeeded, borrow must be retried");
            Ok(SupplyBorrowOutcome::SupplyOnly { supply_tx, borrow_error })
        }
    }
}

/// Last good ETH/USD price with its fetch time.
#[derive(Debug, Default)]
pub struct PriceCache {
    slot: Mutex<Option<(f64, Instant)>>,
}

impl PriceCache {
    pub fn fresh(&self, now: Instant, ttl: Duration) -> Option<f64> {
        let cached = *self.slot.lock().ok()?;
        cached.and_then(|(px, at)| (now.duration_since(at) < ttl).then_some(px))
    }

    pub fn store(&self, px: f64, at: Instant) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some((px, at));
        }
    }
}

pub(crate) fn contract_err<M: Middleware>(what: &str, e: ContractError<M>) -> Error {
    if e.is_revert() {
        Error::Lending(format!("{what} reverted: {e}"))
    } else {
        Error::NetworkFailure(format!("{what}: {e}"))
    }
}

pub(crate) fn parse_addr(s: &str) -> Result<Address> {
    Address::from_str(s).map_err(|e| Error::Config(format!("address {s}: {e}")))
}

/// Decimal string to token base units. Only plain `digits[.digits]` is accepted.
pub fn to_base_units(amount: &str, decimals: u32) -> Result<U256> {
    let t = amount.trim();
    // parse_units menerima "-1" (I256) dan "1_000"; tolak sebelum scaling
    if !is_valid_input(t) || !t.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Err(Error::InvalidNumericInput(format!("{amount}: not a non-negative decimal")));
    }
    let v = match parse_units(t, decimals) {
        Ok(ParseUnits::U256(v)) => v,
        Ok(ParseUnits::I256(_)) => {
            return Err(Error::InvalidNumericInput(format!("{amount}: negative")));
        }
        Err(e) => return Err(Error::InvalidNumericInput(format!("{amount}: {e}"))),
    };
    if v.is_zero() {
        return Err(Error::InvalidNumericInput(format!("{amount}: must be > 0")));
    }
    Ok(v)
}

pub struct MorphoClient<M> {
    client: Arc<M>,
    cfg: MorphoConfig,
    morpho: MorphoBlue<M>,
    market_id: [u8; 32],
    params: MarketParams,
    oracle_price: f64,
    eth_price_fallback: f64,
    eth_price: PriceCache,
}

impl MorphoClient<ReadClient> {
    pub fn connect_http(rpc_url: &str, cfg: MorphoConfig, oracle_price: f64, eth_fallback: f64) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| Error::Config(format!("rpc url {rpc_url}: {e}")))?;
        Self::new(Arc::new(provider), cfg, oracle_price, eth_fallback)
    }
}

impl MorphoClient<WriteClient> {
    pub fn connect_signer(
        rpc_url: &str,
        wallet: LocalWallet,
        cfg: MorphoConfig,
        oracle_price: f64,
        eth_fallback: f64,
    ) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| Error::Config(format!("rpc url {rpc_url}: {e}")))?;
        let signer = SignerMiddleware::new(provider, wallet.with_chain_id(ETHEREUM_MAINNET));
        Self::new(Arc::new(signer), cfg, oracle_price, eth_fallback)
    }

    fn owner(&self) -> Address {
        self.client.address()
    }

    async fn ensure_mainnet(&self) -> Result<()> {
        let id = self
            .client
            .get_chainid()
            .await
            .map_err(|e| Error::NetworkFailure(format!("chain id: {e}")))?;
        if id.as_u64() != ETHEREUM_MAINNET {
            return Err(Error::Lending(format!(
                "connected to chain {id}, switch to Ethereum mainnet"
            )));
        }
        Ok(())
    }

    async fn send_and_confirm<D: Detokenize>(&self, what: &str, call: ContractCall<WriteClient, D>) -> Result<String> {
        let pending = call.send().await.map_err(|e| contract_err(what, e))?;
        let hash = format!("{:#x}", pending.tx_hash());
        info!(what, tx = %hash, "tx sent");
        let receipt = pending
            .await
            .map_err(|e| Error::NetworkFailure(format!("{what} receipt: {e}")))?
            .ok_or_else(|| Error::Lending(format!("{what}: tx {hash} dropped")))?;
        if receipt.status != Some(U64::from(1)) {
            return Err(Error::Lending(format!("{what}: tx {hash} reverted")));
        }
        Ok(hash)
    }

    async fn approve(&self, token: Address, amount: U256) -> Result<String> {
        let erc20 = Erc20::new(token, self.client.clone());
        self.send_and_confirm("approve", erc20.approve(self.morpho.address(), amount)).await
    }
}

impl<M: Middleware + 'static> MorphoClient<M> {
    pub fn new(client: Arc<M>, cfg: MorphoConfig, oracle_price: f64, eth_price_fallback: f64) -> Result<Self> {
        let morpho = MorphoBlue::new(parse_addr(&cfg.morpho)?, client.clone());
        let market_id = H256::from_str(&cfg.market_id)
            .map_err(|e| Error::Config(format!("market id {}: {e}", cfg.market_id)))?
            .0;
        let params = market_params(&cfg)?;
        Ok(Self {
            client,
            cfg,
            morpho,
            market_id,
            params,
            oracle_price,
            eth_price_fallback,
            eth_price: PriceCache::default(),
        })
    }

    pub fn market_params(&self) -> &MarketParams {
        &self.params
    }

    /// wstETH in ETH terms. Fixed configured value; the market oracle is not queried.
    pub fn oracle_price(&self) -> f64 {
        self.oracle_price
    }

    /// Chainlink ETH/USD, cached; falls back to the configured price on failure.
    pub async fn eth_price(&self) -> f64 {
        let now = Instant::now();
        if let Some(px) = self.eth_price.fresh(now, ETH_PRICE_TTL) {
            return px;
        }
        match self.fetch_eth_price().await {
            Ok(px) => {
                self.eth_price.store(px, now);
                px
            }
            Err(e) => {
                warn!(error = %e, fallback = self.eth_price_fallback, "ETH price unavailable");
                crate::metrics::QUERY_FAILURES.with_label_values(&["eth_price"]).inc();
                self.eth_price_fallback
            }
        }
    }

    async fn fetch_eth_price(&self) -> Result<f64> {
        let feed = ChainlinkFeed::new(parse_addr(&self.cfg.eth_usd_feed)?, self.client.clone());
        let (_, answer, _, _, _) = feed
            .latest_round_data()
            .call()
            .await
            .map_err(|e| contract_err("latestRoundData", e))?;
        let raw: f64 = answer
            .to_string()
            .parse()
            .map_err(|_| Error::Decode(format!("ETH/USD answer {answer}")))?;
        if raw <= 0.0 {
            return Err(Error::Lending(format!("bad ETH/USD answer {answer}")));
        }
        Ok(raw / 10f64.powi(CHAINLINK_DECIMALS))
    }

    /// Borrowed USDC (base units) and collateral wstETH (base units).
    pub async fn raw_position(&self, user: Address) -> Result<(u128, u128)> {
        let (_, borrow_shares, collateral) = self
            .morpho
            .position(self.market_id, user)
            .call()
            .await
            .map_err(|e| contract_err("position", e))?;
        let (_, _, total_borrow_assets, total_borrow_shares, _, _) = self
            .morpho
            .market(self.market_id)
            .call()
            .await
            .map_err(|e| contract_err("market", e))?;
        let borrowed = borrow_shares_to_assets(borrow_shares, total_borrow_assets, total_borrow_shares);
        Ok((borrowed, collateral))
    }

    pub async fn token_balance(&self, token: &str, user: Address) -> Result<U256> {
        let erc20 = Erc20::new(parse_addr(token)?, self.client.clone());
        erc20.balance_of(user).call().await.map_err(|e| contract_err("balanceOf", e))
    }

    /// wstETH and USDC held by the wallet itself (not in the market).
    pub async fn wallet_balances(&self, user: Address) -> Result<WalletBalances> {
        let (collateral, loan) = tokio::try_join!(
            self.token_balance(&self.cfg.collateral_token, user),
            self.token_balance(&self.cfg.loan_token, user),
        )?;
        Ok(WalletBalances {
            wsteth: base_units_to_f64(collateral, self.cfg.collateral_decimals)?,
            usdc: base_units_to_f64(loan, self.cfg.loan_decimals)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WalletBalances {
    pub wsteth: f64,
    pub usdc: f64,
}

fn base_units_to_f64(v: U256, decimals: u32) -> Result<f64> {
    format_units(v, decimals)
        .map_err(|e| Error::Decode(format!("balance {v}: {e}")))?
        .parse::<f64>()
        .map_err(|e| Error::Decode(format!("balance {v}: {e}")))
}

pub fn market_params(cfg: &MorphoConfig) -> Result<MarketParams> {
    Ok(MarketParams {
        loan_token: parse_addr(&cfg.loan_token)?,
        collateral_token: parse_addr(&cfg.collateral_token)?,
        oracle: parse_addr(&cfg.oracle)?,
        irm: parse_addr(&cfg.irm)?,
        lltv: U256::from(cfg.lltv_wad),
    })
}

#[async_trait]
impl<M: Middleware + 'static> PositionSource for MorphoClient<M> {
    async fn position_inputs(&self, user: Address) -> Result<PositionInputs> {
        let (borrowed, collateral) = self.raw_position(user).await?;
        Ok(PositionInputs {
            collateral: units_to_f64(collateral, self.cfg.collateral_decimals),
            borrowed: units_to_f64(borrowed, self.cfg.loan_decimals),
            oracle_price: self.oracle_price,
            reference_price: self.eth_price().await,
            lltv: self.cfg.lltv(),
        })
    }
}

#[async_trait]
impl LendingActions for MorphoClient<WriteClient> {
    async fn supply_collateral(&self, amount: &str) -> Result<String> {
        self.ensure_mainnet().await?;
        let assets = to_base_units(amount, self.cfg.collateral_decimals)?;
        let owner = self.owner();

        let balance = self.token_balance(&self.cfg.collateral_token, owner).await?;
        if balance < assets {
            return Err(Error::Lending(format!(
                "insufficient collateral balance: have {}, need {amount}",
                format_units(balance, self.cfg.collateral_decimals).unwrap_or_default()
            )));
        }

        self.approve(self.params.collateral_token, assets).await?;
        let call = self.morpho.supply_collateral(self.params.clone(), assets, owner, Bytes::new());
        self.send_and_confirm("supplyCollateral", call).await
    }

    async fn borrow(&self, amount: &str) -> Result<String> {
        self.ensure_mainnet().await?;
        let assets = to_base_units(amount, self.cfg.loan_decimals)?;
        let owner = self.owner();
        // shares = 0: amount is given in assets
        let call = self.morpho.borrow(self.params.clone(), assets, U256::zero(), owner, owner);
        self.send_and_confirm("borrow", call).await
    }

    async fn repay(&self, amount: &str) -> Result<String> {
        self.ensure_mainnet().await?;
        let assets = to_base_units(amount, self.cfg.loan_decimals)?;
        let owner = self.owner();
        self.approve(self.params.loan_token, assets).await?;
        let call = self.morpho.repay(self.params.clone(), assets, U256::zero(), owner, Bytes::new());
        self.send_and_confirm("repay", call).await
    }
}
