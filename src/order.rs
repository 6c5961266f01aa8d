// ===============================
// src/order.rs (order / cancel builder)
// ===============================
use rand::Rng;
use rust_decimal::Decimal;

use crate::domain::{
    Action, BulkCancel, BulkCancelCloid, BulkOrder, CancelCloidWire, CancelRequest, CancelWire,
    Limit, OrderRef, OrderType, OrderWire, Tif,
};
use crate::error::{Error, Result};
use crate::fixed::{format_scaled, scale_decimal, to_scaled, NumericInput};

/// 1%: "market" orders are aggressive IOC limits.
pub const DEFAULT_SLIPPAGE_BPS: u32 = 100;

const BPS_DENOM: u32 = 10_000;

/// 128-bit client order id, `0x` + 32 hex chars.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cloid(pub String);

impl Cloid {
    pub fn random() -> Self {
        let raw: u128 = rand::thread_rng().gen();
        Cloid(format!("0x{:032x}", raw))
    }

    pub fn parse(s: &str) -> Result<Self> {
        let hex_part = s.strip_prefix("0x").unwrap_or(s);
        if hex_part.len() != 32 || hex::decode(hex_part).is_err() {
            return Err(Error::InvalidOrderParameters(format!("bad cloid {s}")));
        }
        Ok(Cloid(format!("0x{}", hex_part.to_ascii_lowercase())))
    }
}

pub fn build_order<'a, 'b>(
    asset: u32,
    is_buy: bool,
    price: impl Into<NumericInput<'a>>,
    size: impl Into<NumericInput<'b>>,
    reduce_only: bool,
    tif: Tif,
) -> Result<OrderWire> {
    let px = to_scaled(price)?;
    let sz = to_scaled(size)?;
    wire_from_scaled(asset, is_buy, px, sz, reduce_only, tif)
}

fn wire_from_scaled(
    asset: u32,
    is_buy: bool,
    px: u128,
    sz: u128,
    reduce_only: bool,
    tif: Tif,
) -> Result<OrderWire> {
    if px == 0 {
        return Err(Error::InvalidOrderParameters("price must be > 0".into()));
    }
    if sz == 0 {
        return Err(Error::InvalidOrderParameters("size must be > 0".into()));
    }
    Ok(OrderWire {
        a: asset,
        b: is_buy,
        p: format_scaled(px),
        s: format_scaled(sz),
        r: reduce_only,
        t: OrderType { limit: Limit { tif } },
        c: None,
    })
}

/// Limit = reference x (1 +/- bps/10000), sent as IOC.
pub fn build_market_order<'a, 'b>(
    asset: u32,
    is_buy: bool,
    size: impl Into<NumericInput<'a>>,
    reference_price: impl Into<NumericInput<'b>>,
    slippage_bps: u32,
) -> Result<OrderWire> {
    let reference = reference_price.into().to_decimal()?;
    let bps = Decimal::from(slippage_bps) / Decimal::from(BPS_DENOM);
    let factor = if is_buy { Decimal::ONE + bps } else { Decimal::ONE - bps };
    if factor <= Decimal::ZERO {
        return Err(Error::InvalidOrderParameters(format!(
            "slippage {slippage_bps} bps leaves no positive sell price"
        )));
    }
    let limit = reference
        .checked_mul(factor)
        .ok_or_else(|| Error::InvalidNumericInput(format!("{reference} out of range")))?;
    let px = scale_decimal(limit)?;
    let sz = to_scaled(size)?;
    wire_from_scaled(asset, is_buy, px, sz, false, Tif::Ioc)
}

pub fn build_cancel(asset: u32, target: OrderRef) -> CancelRequest {
    CancelRequest { asset, target }
}

pub fn order_action(orders: Vec<OrderWire>) -> Action {
    Action::Order(BulkOrder { orders, grouping: "na".to_string() })
}

/// Cancels for one action must share an id kind; mixed batches are split by the caller.
pub fn cancel_action(cancels: Vec<CancelRequest>) -> Result<Action> {
    let Some(first) = cancels.first() else {
        return Err(Error::InvalidOrderParameters("no cancels given".into()));
    };
    match first.target {
        OrderRef::Oid(_) => {
            let mut wires = Vec::with_capacity(cancels.len());
            for c in cancels {
                match c.target {
                    OrderRef::Oid(o) => wires.push(CancelWire { a: c.asset, o }),
                    OrderRef::Cloid(_) => {
                        return Err(Error::InvalidOrderParameters("mixed oid/cloid cancels".into()))
                    }
                }
            }
            Ok(Action::Cancel(BulkCancel { cancels: wires }))
        }
        OrderRef::Cloid(_) => {
            let mut wires = Vec::with_capacity(cancels.len());
            for c in cancels {
                match c.target {
                    OrderRef::Cloid(cloid) => wires.push(CancelCloidWire { asset: c.asset, cloid }),
                    OrderRef::Oid(_) => {
                        return Err(Error::InvalidOrderParameters("mixed oid/cloid cancels".into()))
                    }
                }
            }
            Ok(Action::CancelByCloid(BulkCancelCloid { cancels: wires }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_price_or_size_is_rejected() {
        assert!(matches!(
            build_order(1, true, "0", "1", false, Tif::Gtc),
            Err(Error::InvalidOrderParameters(_))
        ));
        assert!(matches!(
            build_order(1, true, "10", "0", false, Tif::Gtc),
            Err(Error::InvalidOrderParameters(_))
        ));
        // below 1e-8 floors to zero
        assert!(matches!(
            build_order(1, true, "10", "0.000000001", false, Tif::Gtc),
            Err(Error::InvalidOrderParameters(_))
        ));
    }

    #[test]
    fn negative_input_stays_numeric_error() {
        assert!(matches!(
            build_order(1, false, "-3", "1", false, Tif::Gtc),
            Err(Error::InvalidNumericInput(_))
        ));
    }

    #[test]
    fn price_is_canonical_string() {
        let o = build_order(7, true, "1.5", "2", false, Tif::Gtc).unwrap();
        assert_eq!(o.p, "1.5");
        assert_eq!(o.s, "2");
        let json = serde_json::to_string(&o).unwrap();
        assert!(json.contains(r#""p":"1.5""#));
    }

    #[test]
    fn market_buy_adds_slippage() {
        let o = build_market_order(135, true, 1.0, 20.0, 100).unwrap();
        assert_eq!(o.a, 135);
        assert_eq!(o.p, "20.2");
        assert_eq!(o.s, "1");
        assert_eq!(o.tif(), Tif::Ioc);
        assert!(!o.r);
    }

    #[test]
    fn market_sell_subtracts_slippage() {
        let o = build_market_order(135, false, "0.5", "20", DEFAULT_SLIPPAGE_BPS).unwrap();
        assert_eq!(o.p, "19.8");
        assert!(!o.b);
    }

    #[test]
    fn full_slippage_sell_is_invalid() {
        assert!(matches!(
            build_market_order(1, false, "1", "20", 10_000),
            Err(Error::InvalidOrderParameters(_))
        ));
    }

    #[test]
    fn cancel_by_either_id_kind() {
        let a = cancel_action(vec![build_cancel(4, OrderRef::Oid(91))]).unwrap();
        assert_eq!(a.kind(), "cancel");
        let cloid = Cloid::random();
        let b = cancel_action(vec![build_cancel(4, OrderRef::Cloid(cloid.0))]).unwrap();
        assert_eq!(b.kind(), "cancelByCloid");
        assert!(cancel_action(vec![]).is_err());
        assert!(cancel_action(vec![
            build_cancel(4, OrderRef::Oid(1)),
            build_cancel(4, OrderRef::Cloid("0x00000000000000000000000000000001".into())),
        ])
        .is_err());
    }

    #[test]
    fn cloid_shape() {
        let c = Cloid::random();
        assert_eq!(c.0.len(), 34);
        assert!(Cloid::parse(&c.0).is_ok());
        assert!(Cloid::parse("0x1234").is_err());
    }
}
