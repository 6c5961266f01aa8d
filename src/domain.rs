// ===============================
// src/domain.rs
// ===============================
//
// Wire shapes for Hyperliquid /exchange. Urutan field struct = urutan di JSON,
// dan urutan itu ikut ditandatangani (raw-message signing), jadi jangan diubah.
//
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn is_buy(&self) -> bool {
        matches!(self, Side::Buy)
    }

    pub fn parse(s: &str) -> Option<Side> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" | "b" | "long" => Some(Side::Buy),
            "sell" | "s" | "short" => Some(Side::Sell),
            _ => None,
        }
    }
}

/// Venue spelling is `Gtc`/`Ioc`/`Alo`, not upper-case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tif {
    Gtc,
    Ioc,
    Alo,
}

impl Tif {
    pub fn parse(s: &str) -> Option<Tif> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gtc" => Some(Tif::Gtc),
            "ioc" => Some(Tif::Ioc),
            "alo" | "post_only" => Some(Tif::Alo),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limit {
    pub tif: Tif,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderType {
    pub limit: Limit,
}

/// One order as the venue expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderWire {
    /// asset index
    pub a: u32,
    /// is buy
    pub b: bool,
    /// price, canonical decimal string
    pub p: String,
    /// size, canonical decimal string
    pub s: String,
    /// reduce only
    pub r: bool,
    pub t: OrderType,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub c: Option<String>,
}

impl OrderWire {
    pub fn tif(&self) -> Tif {
        self.t.limit.tif
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkOrder {
    pub orders: Vec<OrderWire>,
    pub grouping: String,
}

/// Either the venue-assigned order id or our own client order id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderRef {
    Oid(u64),
    Cloid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRequest {
    pub asset: u32,
    pub target: OrderRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelWire {
    pub a: u32,
    pub o: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelCloidWire {
    pub asset: u32,
    pub cloid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkCancel {
    pub cancels: Vec<CancelWire>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkCancelCloid {
    pub cancels: Vec<CancelCloidWire>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveBuilderFee {
    pub hyperliquid_chain: String,
    pub signature_chain_id: String,
    pub max_fee_rate: String,
    /// lower-case 0x hex
    pub builder: String,
    pub nonce: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Action {
    Order(BulkOrder),
    Cancel(BulkCancel),
    CancelByCloid(BulkCancelCloid),
    ApproveBuilderFee(ApproveBuilderFee),
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Order(_) => "order",
            Action::Cancel(_) => "cancel",
            Action::CancelByCloid(_) => "cancelByCloid",
            Action::ApproveBuilderFee(_) => "approveBuilderFee",
        }
    }
}

/// `(r, s, v)` with 0x-prefixed 32-byte hex r/s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureWire {
    pub r: String,
    pub s: String,
    pub v: u64,
}

/// Body of POST /exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedEnvelope {
    pub action: Action,
    pub nonce: u64,
    pub signature: SignatureWire,
    pub vault_address: Option<String>,
}

/// Parsed POST /exchange reply. `response` is a string on `err`, an object on `ok`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueResponse {
    pub status: String,
    #[serde(default)]
    pub response: Option<serde_json::Value>,
}

impl VenueResponse {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

// Journal events (lihat recorder.rs)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    ActionSent { ts_ms: i64, kind: String, nonce: u64 },
    ActionResult { ts_ms: i64, kind: String, nonce: u64, ok: bool, message: Option<String> },
    Snapshot(crate::poller::AccountSnapshot),
    Note { ts_ms: i64, text: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_action_serializes_in_wire_order() {
        let action = Action::Order(BulkOrder {
            orders: vec![OrderWire {
                a: 135,
                b: true,
                p: "10".into(),
                s: "1".into(),
                r: false,
                t: OrderType { limit: Limit { tif: Tif::Gtc } },
                c: None,
            }],
            grouping: "na".into(),
        });
        assert_eq!(
            serde_json::to_string(&action).unwrap(),
            r#"{"type":"order","orders":[{"a":135,"b":true,"p":"10","s":"1","r":false,"t":{"limit":{"tif":"Gtc"}}}],"grouping":"na"}"#
        );
    }

    #[test]
    fn cancel_actions_use_venue_tags() {
        let by_oid = Action::Cancel(BulkCancel { cancels: vec![CancelWire { a: 3, o: 77 }] });
        assert_eq!(
            serde_json::to_string(&by_oid).unwrap(),
            r#"{"type":"cancel","cancels":[{"a":3,"o":77}]}"#
        );
        let by_cloid = Action::CancelByCloid(BulkCancelCloid {
            cancels: vec![CancelCloidWire { asset: 3, cloid: "0xab".into() }],
        });
        assert_eq!(
            serde_json::to_string(&by_cloid).unwrap(),
            r#"{"type":"cancelByCloid","cancels":[{"asset":3,"cloid":"0xab"}]}"#
        );
    }

    #[test]
    fn venue_error_reply_parses() {
        let r: VenueResponse =
            serde_json::from_str(r#"{"status":"err","response":"Insufficient margin"}"#).unwrap();
        assert!(!r.is_ok());
        assert_eq!(r.response.unwrap().as_str(), Some("Insufficient margin"));
    }

    #[test]
    fn side_and_tif_parsing() {
        assert_eq!(Side::parse("BUY"), Some(Side::Buy));
        assert_eq!(Side::parse("short"), Some(Side::Sell));
        assert_eq!(Tif::parse("IOC"), Some(Tif::Ioc));
        assert_eq!(Tif::parse("fok"), None);
    }
}
