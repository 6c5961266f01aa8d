// ===============================
// tests/property_tests.rs
// ===============================
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use hl_loop_rust::fixed::{format_scaled, from_scaled, to_scaled, FixedPointAmount};
use hl_loop_rust::lending::{compute_health_factor, HEALTH_FACTOR_SAFE};

#[test]
fn known_values() {
    assert_eq!(to_scaled("1.5").unwrap(), 150_000_000);
    assert_eq!(to_scaled("0.123456789").unwrap(), 12_345_678);
    assert_eq!(format_scaled(1_000_000_000), "10");
    let amt = FixedPointAmount::parse("2500.50").unwrap();
    assert_eq!(amt.raw, dec!(2500.50));
    assert_eq!(amt.wire(), "2500.5");
}

proptest! {
    // scaled < 2^53 supaya f64 masih eksak
    #[test]
    fn scale_roundtrip(scaled in 0u64..(1u64 << 53)) {
        let d = Decimal::from_i128_with_scale(scaled as i128, 8);
        let s = to_scaled(d.to_string().as_str()).unwrap();
        prop_assert_eq!(s, scaled as u128);
        prop_assert_eq!(from_scaled(s), scaled as f64 / 1e8);
    }

    #[test]
    fn wire_text_is_canonical(scaled in 0u128..10_000_000_000_000_000u128) {
        let text = format_scaled(scaled);
        prop_assert!(!text.ends_with('.'));
        if text.contains('.') {
            prop_assert!(!text.ends_with('0'));
        }
        // wire text parses back to the same E8 value
        prop_assert_eq!(to_scaled(text.as_str()).unwrap(), scaled);
    }

    #[test]
    fn extra_digits_are_truncated(int in 0u64..1_000_000, frac in 0u64..100_000_000, tail in 0u8..10) {
        let text = format!("{int}.{frac:08}{tail}");
        prop_assert_eq!(to_scaled(text.as_str()).unwrap(), int as u128 * 100_000_000 + frac as u128);
    }

    #[test]
    fn health_factor_scales_with_collateral(c in 0.01f64..1_000.0, b in 1.0f64..1_000_000.0) {
        let one = compute_health_factor(c, b, 1.15, 4500.0, 0.86);
        let two = compute_health_factor(c * 2.0, b, 1.15, 4500.0, 0.86);
        prop_assert!(two > one);
        prop_assert_eq!(compute_health_factor(c, 0.0, 1.15, 4500.0, 0.86), HEALTH_FACTOR_SAFE);
    }
}
