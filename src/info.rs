// ===============================
// src/info.rs (/info queries)
// ===============================
//
// Query yang dipoll itu best-effort: gagal = log + metric + nilai default,
// bukan error ke pemanggil. Versi strict tetap ada untuk alur order.
//
use std::sync::RwLock;

use ahash::AHashMap;
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::exchange::VenueClient;
use crate::gateway::Transport;
use crate::metrics::QUERY_FAILURES;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InfoRequest {
    MetaAndAssetCtxs,
    ClearinghouseState { user: Address },
    SpotClearinghouseState { user: Address },
    OpenOrders { user: Address },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMeta {
    pub name: String,
    pub sz_decimals: u32,
    #[serde(default)]
    pub max_leverage: u32,
    #[serde(default)]
    pub only_isolated: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    pub universe: Vec<AssetMeta>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetCtx {
    pub mark_px: String,
    #[serde(default)]
    pub mid_px: Option<String>,
    #[serde(default)]
    pub oracle_px: Option<String>,
    #[serde(default)]
    pub funding: Option<String>,
    #[serde(default)]
    pub open_interest: Option<String>,
    #[serde(default)]
    pub day_ntl_vlm: Option<String>,
}

/// The venue answers `[meta, [ctx, ...]]`, ctx i belongs to universe i.
pub type MetaAndAssetCtxs = (Meta, Vec<AssetCtx>);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginSummary {
    pub account_value: String,
    pub total_ntl_pos: String,
    pub total_raw_usd: String,
    pub total_margin_used: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerpPosition {
    pub coin: String,
    /// signed size
    pub szi: String,
    #[serde(default)]
    pub entry_px: Option<String>,
    #[serde(default)]
    pub position_value: Option<String>,
    #[serde(default)]
    pub unrealized_pnl: Option<String>,
    #[serde(default)]
    pub return_on_equity: Option<String>,
    #[serde(default)]
    pub margin_used: Option<String>,
    #[serde(default)]
    pub liquidation_px: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetPosition {
    pub position: PerpPosition,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearinghouseState {
    #[serde(default)]
    pub cross_margin_summary: MarginSummary,
    #[serde(default)]
    pub withdrawable: String,
    #[serde(default)]
    pub asset_positions: Vec<AssetPosition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotBalance {
    pub coin: String,
    pub total: String,
    #[serde(default)]
    pub hold: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotClearinghouseState {
    pub balances: Vec<SpotBalance>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenOrder {
    pub coin: String,
    pub limit_px: String,
    pub oid: u64,
    /// "B" bid / "A" ask
    pub side: String,
    pub sz: String,
    pub timestamp: u64,
    #[serde(default)]
    pub cloid: Option<String>,
}

fn parse_f64(s: &str) -> f64 {
    s.trim().parse().unwrap_or(0.0)
}

/// Typed /info client with an asset-index cache.
pub struct InfoClient<T> {
    venue: VenueClient<T>,
    fallback_index: Option<u32>,
    assets: RwLock<AHashMap<String, u32>>,
}

impl<T: Transport> InfoClient<T> {
    pub fn new(transport: T, fallback_index: Option<u32>) -> Self {
        Self::from_venue(VenueClient::new(transport), fallback_index)
    }

    pub fn from_venue(venue: VenueClient<T>, fallback_index: Option<u32>) -> Self {
        Self { venue, fallback_index, assets: RwLock::new(AHashMap::new()) }
    }

    pub fn venue(&self) -> &VenueClient<T> {
        &self.venue
    }

    pub async fn meta_and_asset_ctxs(&self) -> Result<MetaAndAssetCtxs> {
        let out: MetaAndAssetCtxs = self.venue.post_query(&InfoRequest::MetaAndAssetCtxs).await?;
        self.remember_universe(&out.0);
        Ok(out)
    }

    fn remember_universe(&self, meta: &Meta) {
        if let Ok(mut map) = self.assets.write() {
            for (i, a) in meta.universe.iter().enumerate() {
                map.insert(a.name.to_ascii_uppercase(), i as u32);
            }
        }
    }

    fn cached_index(&self, coin: &str) -> Option<u32> {
        self.assets.read().ok().and_then(|m| m.get(&coin.to_ascii_uppercase()).copied())
    }

    /// Universe position of `coin`; refreshes meta once on a cache miss,
    /// then falls back to the configured index.
    pub async fn asset_index(&self, coin: &str) -> Result<u32> {
        if let Some(i) = self.cached_index(coin) {
            return Ok(i);
        }
        match self.meta_and_asset_ctxs().await {
            Ok(_) => {}
            Err(e) if self.fallback_index.is_some() => {
                warn!(coin, error = %e, "meta lookup failed, using fallback asset index");
            }
            Err(e) => return Err(e),
        }
        self.cached_index(coin)
            .or(self.fallback_index)
            .ok_or_else(|| Error::AssetNotFound(coin.to_string()))
    }

    /// Strict: errors if the venue has no usable mark price.
    pub async fn mark_price(&self, coin: &str) -> Result<f64> {
        let (meta, ctxs) = self.meta_and_asset_ctxs().await?;
        let idx = meta
            .universe
            .iter()
            .position(|a| a.name.eq_ignore_ascii_case(coin))
            .or_else(|| self.fallback_index.map(|i| i as usize));
        let px = idx
            .and_then(|i| ctxs.get(i))
            .map(|c| parse_f64(&c.mark_px))
            .ok_or_else(|| Error::AssetNotFound(coin.to_string()))?;
        if px > 0.0 {
            Ok(px)
        } else {
            Err(Error::AssetNotFound(format!("{coin}: no mark price")))
        }
    }

    pub async fn mark_price_or_default(&self, coin: &str) -> f64 {
        best_effort("mark_price", self.mark_price(coin).await)
    }

    pub async fn all_mark_prices(&self) -> Result<AHashMap<String, f64>> {
        let (meta, ctxs) = self.meta_and_asset_ctxs().await?;
        Ok(meta
            .universe
            .iter()
            .zip(ctxs.iter())
            .map(|(a, c)| (a.name.clone(), parse_f64(&c.mark_px)))
            .collect())
    }

    pub async fn account_summary(&self, user: Address) -> Result<ClearinghouseState> {
        self.venue.post_query(&InfoRequest::ClearinghouseState { user }).await
    }

    /// USDC withdrawable from the perp account.
    pub async fn withdrawable_balance(&self, user: Address) -> Result<f64> {
        Ok(parse_f64(&self.account_summary(user).await?.withdrawable))
    }

    pub async fn withdrawable_balance_or_default(&self, user: Address) -> f64 {
        best_effort("withdrawable_balance", self.withdrawable_balance(user).await)
    }

    pub async fn spot_balances(&self, user: Address) -> Result<Vec<SpotBalance>> {
        let s: SpotClearinghouseState =
            self.venue.post_query(&InfoRequest::SpotClearinghouseState { user }).await?;
        Ok(s.balances)
    }

    pub async fn open_orders(&self, user: Address) -> Result<Vec<OpenOrder>> {
        self.venue.post_query(&InfoRequest::OpenOrders { user }).await
    }
}

fn best_effort<V: Default>(query: &str, r: Result<V>) -> V {
    match r {
        Ok(v) => v,
        Err(e) => {
            warn!(query, error = %e, "query failed, using default");
            QUERY_FAILURES.with_label_values(&[query]).inc();
            V::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MockTransport;

    const META: &str = r#"[{"universe":[{"name":"BTC","szDecimals":5,"maxLeverage":40},{"name":"ETH","szDecimals":4,"maxLeverage":25},{"name":"HYPE","szDecimals":2,"maxLeverage":10}]},[{"markPx":"65000.0","funding":"0.0000125"},{"markPx":"3100.5"},{"markPx":"20.0"}]]"#;

    fn user() -> Address {
        "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23".parse().unwrap()
    }

    #[test]
    fn request_bodies_match_venue() {
        assert_eq!(
            serde_json::to_string(&InfoRequest::MetaAndAssetCtxs).unwrap(),
            r#"{"type":"metaAndAssetCtxs"}"#
        );
        assert_eq!(
            serde_json::to_string(&InfoRequest::ClearinghouseState { user: user() }).unwrap(),
            r#"{"type":"clearinghouseState","user":"0x2c7536e3605d9c16a7a3d7b1898e529396a65c23"}"#
        );
        assert_eq!(
            serde_json::to_string(&InfoRequest::OpenOrders { user: user() }).unwrap(),
            r#"{"type":"openOrders","user":"0x2c7536e3605d9c16a7a3d7b1898e529396a65c23"}"#
        );
    }

    #[tokio::test]
    async fn asset_index_is_cached() {
        let t = MockTransport::new();
        t.push_reply(200, META);
        let info = InfoClient::new(t, None);
        assert_eq!(info.asset_index("HYPE").await.unwrap(), 2);
        // cache hit, no second request
        assert_eq!(info.asset_index("eth").await.unwrap(), 1);
        assert_eq!(info.venue().transport().requests().len(), 1);
    }

    #[tokio::test]
    async fn unknown_asset_uses_fallback_or_errors() {
        let t = MockTransport::new();
        t.push_reply(200, META).push_reply(200, META);
        let info = InfoClient::new(t, Some(135));
        assert_eq!(info.asset_index("PURR").await.unwrap(), 135);

        let t = MockTransport::new();
        t.push_reply(200, META);
        let strict = InfoClient::new(t, None);
        assert!(matches!(strict.asset_index("PURR").await, Err(Error::AssetNotFound(_))));
    }

    #[tokio::test]
    async fn mark_prices() {
        let t = MockTransport::new();
        t.push_reply(200, META).push_reply(200, META).push_error(Error::NetworkFailure("down".into()));
        let info = InfoClient::new(t, None);
        assert_eq!(info.mark_price("HYPE").await.unwrap(), 20.0);
        let all = info.all_mark_prices().await.unwrap();
        assert_eq!(all.get("ETH"), Some(&3100.5));
        assert_eq!(info.mark_price_or_default("HYPE").await, 0.0);
    }

    #[tokio::test]
    async fn balances_and_orders() {
        let t = MockTransport::new();
        t.push_reply(
            200,
            r#"{"crossMarginSummary":{"accountValue":"120.5","totalNtlPos":"40.0","totalRawUsd":"80.5","totalMarginUsed":"4.0"},"withdrawable":"116.5","assetPositions":[{"type":"oneWay","position":{"coin":"HYPE","szi":"2.0","entryPx":"20.0","positionValue":"40.0","unrealizedPnl":"0.0","returnOnEquity":"0.0","marginUsed":"4.0","leverage":{"type":"cross","value":10}}}]}"#,
        )
        .push_reply(200, r#"{"balances":[{"coin":"USDC","token":0,"total":"12.0","hold":"0.0","entryNtl":"0.0"}]}"#)
        .push_reply(200, r#"[{"coin":"HYPE","limitPx":"10.0","oid":77,"side":"B","sz":"1.0","timestamp":1700000000000}]"#)
        .push_reply(500, "oops");
        let info = InfoClient::new(t, None);

        assert_eq!(info.withdrawable_balance(user()).await.unwrap(), 116.5);
        let spot = info.spot_balances(user()).await.unwrap();
        assert_eq!(spot[0].coin, "USDC");
        let orders = info.open_orders(user()).await.unwrap();
        assert_eq!(orders[0].oid, 77);
        assert_eq!(info.withdrawable_balance_or_default(user()).await, 0.0);
    }
}
