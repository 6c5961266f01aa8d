// ===============================
// src/trader.rs
// ===============================
//
// Alur tiap aksi: build -> nonce -> sign -> post -> log/record/metrics.
// Gagal di mana pun langsung dikembalikan ke pemanggil, tanpa retry.
//
use std::sync::Arc;

use chrono::Utc;
use ethers::types::Address;
use tracing::{info, warn};

use crate::config::Network;
use crate::domain::{Action, Event, OrderRef, SignedEnvelope, Tif, VenueResponse};
use crate::error::{Error, Result};
use crate::exchange::{embedded_errors, VenueClient};
use crate::gateway::Transport;
use crate::info::InfoClient;
use crate::metrics::SIGN_REJECTIONS;
use crate::order::{build_cancel, build_market_order, build_order, cancel_action, order_action, Cloid};
use crate::recorder::Journal;
use crate::signer::Signer;
use crate::wallet::WalletProvider;

/// A limit order as entered by the user.
#[derive(Debug, Clone)]
pub struct LimitOrder {
    pub coin: String,
    pub is_buy: bool,
    pub price: String,
    pub size: String,
    pub reduce_only: bool,
    pub tif: Tif,
    pub cloid: Option<Cloid>,
}

pub struct Trader<W, T: ?Sized> {
    signer: Signer<W>,
    venue: VenueClient<Arc<T>>,
    info: Arc<InfoClient<Arc<T>>>,
    journal: Journal,
}

impl<W: WalletProvider, T: Transport + ?Sized> Trader<W, T> {
    pub fn new(wallet: W, network: Network, transport: Arc<T>, fallback_asset: Option<u32>, journal: Journal) -> Self {
        Self {
            signer: Signer::new(wallet, network),
            venue: VenueClient::new(transport.clone()),
            info: Arc::new(InfoClient::new(transport, fallback_asset)),
            journal,
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub async fn place_limit_order(&self, req: &LimitOrder) -> Result<VenueResponse> {
        let asset = self.info.asset_index(&req.coin).await?;
        let mut wire = build_order(asset, req.is_buy, req.price.as_str(), req.size.as_str(), req.reduce_only, req.tif)?;
        wire.c = req.cloid.as_ref().map(|c| c.0.clone());
        info!(coin = %req.coin, asset, px = %wire.p, sz = %wire.s, buy = wire.b, "placing limit order");
        self.submit_l1(order_action(vec![wire])).await
    }

    /// Aggressive IOC at mark ± slippage; fails if no mark price is available.
    pub async fn place_market_order(&self, coin: &str, is_buy: bool, size: &str, slippage_bps: u32) -> Result<VenueResponse> {
        let asset = self.info.asset_index(coin).await?;
        let mark = self.info.mark_price(coin).await?;
        let wire = build_market_order(asset, is_buy, size, mark, slippage_bps)?;
        info!(coin, asset, mark, px = %wire.p, sz = %wire.s, buy = is_buy, "placing market order");
        self.submit_l1(order_action(vec![wire])).await
    }

    pub async fn cancel(&self, coin: &str, target: OrderRef) -> Result<VenueResponse> {
        let asset = self.info.asset_index(coin).await?;
        let action = cancel_action(vec![build_cancel(asset, target)])?;
        self.submit_l1(action).await
    }

    pub async fn approve_builder_fee(&self, builder: &Address, max_fee_rate: &str) -> Result<VenueResponse> {
        let nonce = self.signer.next_nonce();
        let envelope = self
            .signer
            .sign_builder_fee_approval(builder, max_fee_rate, nonce)
            .await
            .map_err(|e| self.sign_failed("approveBuilderFee", nonce, e))?;
        self.post(envelope).await
    }

    async fn submit_l1(&self, action: Action) -> Result<VenueResponse> {
        let nonce = self.signer.next_nonce();
        let kind = action.kind();
        let envelope = self
            .signer
            .sign_l1_action(action, nonce)
            .await
            .map_err(|e| self.sign_failed(kind, nonce, e))?;
        self.post(envelope).await
    }

    fn sign_failed(&self, kind: &str, nonce: u64, e: Error) -> Error {
        if e.is_user_rejection() {
            SIGN_REJECTIONS.inc();
            info!(kind, nonce, "signature declined");
        } else {
            warn!(kind, nonce, error = %e, "signing failed");
        }
        self.record_result(kind, nonce, Err(&e));
        e
    }

    async fn post(&self, envelope: SignedEnvelope) -> Result<VenueResponse> {
        let kind = envelope.action.kind();
        let nonce = envelope.nonce;
        self.journal.record(Event::ActionSent {
            ts_ms: Utc::now().timestamp_millis(),
            kind: kind.to_string(),
            nonce,
        });

        let result = self.venue.post_action(&envelope).await.and_then(|resp| {
            let errors = embedded_errors(&resp);
            if errors.is_empty() {
                Ok(resp)
            } else {
                Err(Error::VenueRejected(errors.join("; ")))
            }
        });
        self.record_result(kind, nonce, result.as_ref().map(|_| ()));
        result
    }

    fn record_result(&self, kind: &str, nonce: u64, r: std::result::Result<(), &Error>) {
        self.journal.record(Event::ActionResult {
            ts_ms: Utc::now().timestamp_millis(),
            kind: kind.to_string(),
            nonce,
            ok: r.is_ok(),
            message: r.err().map(|e| e.to_string()),
        });
    }
}
