// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : hl_loop_rust — Hyperliquid order signing + Morpho leverage loop in Rust
Module  : config.rs
Version : 0.1.0
License : MIT (see LICENSE)

Summary : Builds E8 fixed-point orders and cancels for Hyperliquid, signs them
          with a wallet (raw message for L1 actions, EIP-712 for builder fee
          approval), posts them to /exchange, polls /info, reads a Morpho Blue
          wstETH/USDC position and derives its health factor, and debounces
          automated actions with a small state machine.
=============================================================================
*/
use std::env;
use std::time::Duration;

use dotenvy::dotenv;

/// Hyperliquid environment
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    pub fn parse(s: &str) -> Option<Network> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" | "main" => Some(Network::Mainnet),
            "testnet" | "test" => Some(Network::Testnet),
            _ => None,
        }
    }

    pub fn from_env(key: &str, default_net: Network) -> Network {
        env::var(key).ok().and_then(|v| Network::parse(&v)).unwrap_or(default_net)
    }

    pub fn default_api_url(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://api.hyperliquid.xyz",
            Network::Testnet => "https://api.hyperliquid-testnet.xyz",
        }
    }

    /// Value of `hyperliquidChain` in user-signed actions.
    pub fn hyperliquid_chain(&self) -> &'static str {
        match self {
            Network::Mainnet => "Mainnet",
            Network::Testnet => "Testnet",
        }
    }

    /// HyperEVM JSON-RPC (CoreWriter helper lives here)
    pub fn default_hyper_evm_rpc(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://api.hyperliquid.xyz/evm",
            Network::Testnet => "https://api.hyperliquid-testnet.xyz/evm",
        }
    }

    pub fn hyper_evm_chain_id(&self) -> u64 {
        match self {
            Network::Mainnet => 999,
            Network::Testnet => 998,
        }
    }

    /// Arbitrum One / Arbitrum Sepolia, tempat wallet biasanya terkoneksi
    pub fn default_wallet_chain_id(&self) -> u64 {
        match self {
            Network::Mainnet => 42_161,
            Network::Testnet => 421_614,
        }
    }
}

// ===== CoreWriter helper (HyperEVM) =====
pub const CORE_WRITER_HELPER: &str = "0x3577F2f2cAe036C2907eDd3D8A39f7d2F1e68362";

// ===== Morpho Blue (Ethereum mainnet) =====
pub const MORPHO_BLUE: &str = "0xBBBBBbbBBb9cC5e90e3b3Af64bdAF62C37EEFFCb";
pub const WSTETH: &str = "0x7f39C581F595B53c5cb19bD0b3f8dA6c935E2Ca0";
pub const USDC: &str = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";
pub const WSTETH_USDC_ORACLE: &str = "0x48F7E36EB6B826B2dF4B2E630B62Cd25e89E40e2";
pub const ADAPTIVE_IRM: &str = "0x870aC11D48B15DB9a138Cf899d20F13F79Ba00BC";
pub const CHAINLINK_ETH_USD: &str = "0x5f4eC3Df9cbd43714FE2740f5E3616155c5b8419";
pub const WSTETH_USDC_MARKET_ID: &str =
    "0xb323495f7e4148be5643a4ea4a8221eef163e4bccfdedc2a6f4696baacbc86cc";
/// 0.86 in WAD
pub const WSTETH_USDC_LLTV_WAD: u128 = 860_000_000_000_000_000;

#[derive(Clone, Debug)]
pub struct MorphoConfig {
    pub morpho: String,
    pub loan_token: String,
    pub collateral_token: String,
    pub oracle: String,
    pub irm: String,
    pub eth_usd_feed: String,
    pub market_id: String,
    pub lltv_wad: u128,
    pub loan_decimals: u32,
    pub collateral_decimals: u32,
}

impl Default for MorphoConfig {
    fn default() -> Self {
        Self {
            morpho: MORPHO_BLUE.to_string(),
            loan_token: USDC.to_string(),
            collateral_token: WSTETH.to_string(),
            oracle: WSTETH_USDC_ORACLE.to_string(),
            irm: ADAPTIVE_IRM.to_string(),
            eth_usd_feed: CHAINLINK_ETH_USD.to_string(),
            market_id: WSTETH_USDC_MARKET_ID.to_string(),
            lltv_wad: WSTETH_USDC_LLTV_WAD,
            loan_decimals: 6,
            collateral_decimals: 18,
        }
    }
}

impl MorphoConfig {
    pub fn lltv(&self) -> f64 {
        self.lltv_wad as f64 / 1e18
    }
}

#[derive(Clone, Debug)]
pub struct NetworkConfig {
    pub network: Network,
    pub api_url: String,
    pub wallet_chain_id: u64,
    pub hyper_evm_rpc: String,
    pub core_writer: String,
    pub morpho: MorphoConfig,
}

impl NetworkConfig {
    pub fn for_network(network: Network) -> Self {
        Self {
            network,
            api_url: network.default_api_url().to_string(),
            wallet_chain_id: network.default_wallet_chain_id(),
            hyper_evm_rpc: network.default_hyper_evm_rpc().to_string(),
            core_writer: CORE_WRITER_HELPER.to_string(),
            morpho: MorphoConfig::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Args {
    pub net: NetworkConfig,
    pub eth_rpc_url: String,
    // private key tidak pernah di-log; Args di-Debug hanya lewat redacted()
    pub private_key: Option<String>,
    pub builder_address: Option<String>,
    pub max_fee_rate: String,

    // order
    pub slippage_bps: u32,
    pub fallback_asset_index: Option<u32>,

    // polling
    pub poll_interval: Duration,
    pub position_poll_interval: Duration,

    // files/metrics
    pub record_file: Option<String>,
    pub metrics_port: u16,

    pub dry_run: bool,
    pub confirm_sign: bool,

    // lending price inputs
    pub wsteth_oracle_price: f64,
    pub eth_price_fallback: f64,
}

impl Args {
    pub fn redacted(&self) -> Args {
        let mut c = self.clone();
        if c.private_key.is_some() {
            c.private_key = Some("<redacted>".to_string());
        }
        c
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default_v: T) -> T {
    env::var(key).ok().and_then(|s| s.trim().parse().ok()).unwrap_or(default_v)
}

fn env_flag(key: &str, default_v: bool) -> bool {
    match env::var(key).unwrap_or_default().trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default_v,
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    env::var(key).ok().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

pub fn load() -> Args {
    // .env dibaca dulu (PRIVATE_KEY, NETWORK, dll)
    let _ = dotenv();
    load_with(Network::from_env("NETWORK", Network::Mainnet))
}

/// Same as `load` but with the network already chosen (CLI override).
pub fn load_with(network: Network) -> Args {
    let mut net = NetworkConfig::for_network(network);
    if let Some(url) = env_nonempty("HL_API_URL") {
        net.api_url = url.trim_end_matches('/').to_string();
    }
    net.wallet_chain_id = env_parse("WALLET_CHAIN_ID", net.wallet_chain_id);
    if let Some(url) = env_nonempty("HYPER_EVM_RPC_URL") {
        net.hyper_evm_rpc = url;
    }
    if let Some(addr) = env_nonempty("CORE_WRITER_HELPER") {
        net.core_writer = addr;
    }

    let eth_rpc_url =
        env_nonempty("ETH_RPC_URL").unwrap_or_else(|| "https://eth.llamarpc.com".to_string());

    // ===== Order =====
    let slippage_bps = env_parse("SLIPPAGE_BPS", crate::order::DEFAULT_SLIPPAGE_BPS);
    // Contoh: FALLBACK_ASSET_INDEX=135 (HYPE) kalau meta tidak memuat simbolnya
    let fallback_asset_index = env_nonempty("FALLBACK_ASSET_INDEX").and_then(|s| s.parse().ok());

    // ===== Polling =====
    let poll_secs: u64 = env_parse("POLL_INTERVAL_SECS", 5);
    let position_secs: u64 = env_parse("POSITION_POLL_INTERVAL_SECS", 15);

    Args {
        net,
        eth_rpc_url,
        private_key: env_nonempty("PRIVATE_KEY"),
        builder_address: env_nonempty("BUILDER_ADDRESS"),
        max_fee_rate: env_nonempty("MAX_FEE_RATE").unwrap_or_else(|| "0.1%".to_string()),
        slippage_bps,
        fallback_asset_index,
        poll_interval: Duration::from_secs(poll_secs.max(1)),
        position_poll_interval: Duration::from_secs(position_secs.max(1)),
        record_file: env_nonempty("RECORD_FILE"),
        metrics_port: env_parse("METRICS_PORT", 9898),
        dry_run: env_flag("DRY_RUN", false),
        confirm_sign: env_flag("CONFIRM_SIGN", false),
        wsteth_oracle_price: env_parse("WSTETH_ORACLE_PRICE", 1.15),
        eth_price_fallback: env_parse("ETH_PRICE_FALLBACK", 4500.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_defaults() {
        assert_eq!(Network::parse("TESTNET"), Some(Network::Testnet));
        assert_eq!(Network::parse("devnet"), None);
        let t = NetworkConfig::for_network(Network::Testnet);
        assert_eq!(t.api_url, "https://api.hyperliquid-testnet.xyz");
        assert_eq!(t.network.hyperliquid_chain(), "Testnet");
        assert_eq!(Network::Mainnet.default_api_url(), "https://api.hyperliquid.xyz");
        assert_eq!(t.hyper_evm_rpc, "https://api.hyperliquid-testnet.xyz/evm");
        assert_eq!(Network::Mainnet.hyper_evm_chain_id(), 999);
    }

    #[test]
    fn morpho_market_defaults() {
        let m = MorphoConfig::default();
        assert!((m.lltv() - 0.86).abs() < 1e-12);
        assert_eq!(m.loan_decimals, 6);
        assert_eq!(m.collateral_decimals, 18);
    }

    #[test]
    fn redaction_hides_key() {
        let mut a = load_with(Network::Testnet);
        a.private_key = Some("0xdeadbeef".into());
        let shown = format!("{:?}", a.redacted());
        assert!(!shown.contains("deadbeef"));
    }
}
