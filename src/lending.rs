// ===============================
// src/lending.rs (position math)
// ===============================
//
// Pure functions only, no I/O: input = hasil baca on-chain + harga,
// output = metrik risiko. Unit: collateral dalam token (wstETH),
// borrowed dalam USD (USDC), oracle = collateral->ETH, reference = ETH->USD.
//
use serde::{Deserialize, Serialize};

/// Health factor reported when nothing is borrowed.
pub const HEALTH_FACTOR_SAFE: f64 = 999.0;

/// Below this the position can be liquidated.
pub const LIQUIDATION_HEALTH_FACTOR: f64 = 1.0;

pub fn collateral_value_usd(collateral: f64, oracle_price: f64, reference_price: f64) -> f64 {
    collateral * oracle_price * reference_price
}

/// `(collateral × oracle × reference × lltv) / borrowed`, or the sentinel when `borrowed == 0`.
pub fn compute_health_factor(
    collateral: f64,
    borrowed: f64,
    oracle_price: f64,
    reference_price: f64,
    lltv: f64,
) -> f64 {
    if borrowed <= 0.0 {
        return HEALTH_FACTOR_SAFE;
    }
    compute_max_borrowable(collateral, oracle_price, reference_price, lltv) / borrowed
}

pub fn compute_max_borrowable(
    collateral: f64,
    oracle_price: f64,
    reference_price: f64,
    lltv: f64,
) -> f64 {
    collateral_value_usd(collateral, oracle_price, reference_price) * lltv
}

/// Never negative.
pub fn compute_available_to_borrow(max_borrowable: f64, borrowed: f64) -> f64 {
    (max_borrowable - borrowed).max(0.0)
}

/// Current loan-to-value in percent; 0 without collateral.
pub fn compute_ltv(borrowed: f64, collateral_value_usd: f64) -> f64 {
    if collateral_value_usd > 0.0 {
        borrowed / collateral_value_usd * 100.0
    } else {
        0.0
    }
}

/// `borrowShares × totalBorrowAssets / totalBorrowShares`, rounded down like the contract.
pub fn borrow_shares_to_assets(shares: u128, total_assets: u128, total_shares: u128) -> u128 {
    if shares == 0 || total_shares == 0 {
        return 0;
    }
    // u128 x u128 bisa overflow untuk market besar; turun ke f64 kalau perlu
    match shares.checked_mul(total_assets) {
        Some(p) => p / total_shares,
        None => (shares as f64 * total_assets as f64 / total_shares as f64) as u128,
    }
}

/// Token base units to a float amount (`6` for USDC, `18` for wstETH).
pub fn units_to_f64(amount: u128, decimals: u32) -> f64 {
    amount as f64 / 10f64.powi(decimals as i32)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionInputs {
    pub collateral: f64,
    pub borrowed: f64,
    pub oracle_price: f64,
    pub reference_price: f64,
    pub lltv: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionMetrics {
    pub collateral: f64,
    pub borrowed: f64,
    pub collateral_value_usd: f64,
    pub max_borrowable: f64,
    pub available_to_borrow: f64,
    /// percent
    pub ltv: f64,
    /// percent
    pub liquidation_threshold: f64,
    pub health_factor: f64,
}

impl PositionMetrics {
    pub fn derive(i: &PositionInputs) -> Self {
        let value = collateral_value_usd(i.collateral, i.oracle_price, i.reference_price);
        let max_borrowable = value * i.lltv;
        Self {
            collateral: i.collateral,
            borrowed: i.borrowed,
            collateral_value_usd: value,
            max_borrowable,
            available_to_borrow: compute_available_to_borrow(max_borrowable, i.borrowed),
            ltv: compute_ltv(i.borrowed, value),
            liquidation_threshold: i.lltv * 100.0,
            health_factor: compute_health_factor(
                i.collateral,
                i.borrowed,
                i.oracle_price,
                i.reference_price,
                i.lltv,
            ),
        }
    }

    pub fn is_liquidatable(&self) -> bool {
        self.health_factor < LIQUIDATION_HEALTH_FACTOR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_debt_is_sentinel_regardless_of_price() {
        assert_eq!(compute_health_factor(2.0, 0.0, 1.15, 4500.0, 0.86), HEALTH_FACTOR_SAFE);
        assert_eq!(compute_health_factor(2.0, 0.0, 0.0, 0.0, 0.86), HEALTH_FACTOR_SAFE);
    }

    #[test]
    fn health_factor_matches_formula() {
        let hf = compute_health_factor(1.0, 4000.0, 1.15, 4500.0, 0.86);
        assert!((hf - 1.112_625).abs() < 1e-9, "hf = {hf}");
    }

    #[test]
    fn available_never_negative() {
        assert_eq!(compute_available_to_borrow(100.0, 250.0), 0.0);
        assert_eq!(compute_available_to_borrow(300.0, 250.0), 50.0);
    }

    #[test]
    fn ltv_percent() {
        assert_eq!(compute_ltv(50.0, 200.0), 25.0);
        assert_eq!(compute_ltv(50.0, 0.0), 0.0);
    }

    #[test]
    fn shares_convert_pro_rata() {
        assert_eq!(borrow_shares_to_assets(500, 2_000, 1_000), 1_000);
        assert_eq!(borrow_shares_to_assets(1, 2, 3), 0);
        assert_eq!(borrow_shares_to_assets(10, 2_000, 0), 0);
        // overflow path stays close
        let big = borrow_shares_to_assets(u128::MAX / 2, 4, 8);
        assert!(big > 0);
    }

    #[test]
    fn derive_full_metrics() {
        let m = PositionMetrics::derive(&PositionInputs {
            collateral: 1.0,
            borrowed: 4000.0,
            oracle_price: 1.15,
            reference_price: 4500.0,
            lltv: 0.86,
        });
        assert!((m.collateral_value_usd - 5175.0).abs() < 1e-9);
        assert!((m.max_borrowable - 4450.5).abs() < 1e-9);
        assert!((m.available_to_borrow - 450.5).abs() < 1e-9);
        assert!((m.liquidation_threshold - 86.0).abs() < 1e-9);
        assert!(!m.is_liquidatable());

        let underwater = PositionMetrics::derive(&PositionInputs { borrowed: 5000.0, ..Default::default() });
        assert_eq!(underwater.health_factor, 0.0);
        assert!(underwater.is_liquidatable());
    }

    #[test]
    fn units() {
        assert_eq!(units_to_f64(1_500_000, 6), 1.5);
        assert_eq!(units_to_f64(2_000_000_000_000_000_000, 18), 2.0);
    }
}
