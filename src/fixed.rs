// ===============================
// src/fixed.rs (E8 fixed-point)
// ===============================
//
// Venue wire format: nilai desimal x 10^8.
// Scaling selalu lewat Decimal, tidak pernah lewat perkalian f64.
//
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::error::{Error, Result};

pub const SCALE_DECIMALS: u32 = 8;
pub const SCALE_FACTOR: u64 = 100_000_000;

/// Raw user input: text from a form/CLI or a number from an API.
#[derive(Debug, Clone, Copy)]
pub enum NumericInput<'a> {
    Text(&'a str),
    Float(f64),
}

impl<'a> From<&'a str> for NumericInput<'a> {
    fn from(s: &'a str) -> Self {
        NumericInput::Text(s)
    }
}

impl<'a> From<&'a String> for NumericInput<'a> {
    fn from(s: &'a String) -> Self {
        NumericInput::Text(s.as_str())
    }
}

impl From<f64> for NumericInput<'_> {
    fn from(v: f64) -> Self {
        NumericInput::Float(v)
    }
}

impl NumericInput<'_> {
    pub fn to_decimal(self) -> Result<Decimal> {
        match self {
            NumericInput::Text(s) => {
                let t = s.trim();
                if t.is_empty() {
                    return Err(Error::InvalidNumericInput("empty input".into()));
                }
                Decimal::from_str(t).map_err(|_| Error::InvalidNumericInput(t.to_string()))
            }
            NumericInput::Float(v) => {
                if !v.is_finite() {
                    return Err(Error::InvalidNumericInput(v.to_string()));
                }
                // Display f64 = shortest round-trip, tanpa notasi eksponen
                Decimal::from_str(&v.to_string())
                    .map_err(|_| Error::InvalidNumericInput(v.to_string()))
            }
        }
    }
}

/// A decimal quantity together with its E8 wire value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPointAmount {
    pub raw: Decimal,
    pub scaled: u128,
}

impl FixedPointAmount {
    pub fn parse<'a>(value: impl Into<NumericInput<'a>>) -> Result<Self> {
        let raw = value.into().to_decimal()?;
        let scaled = scale_decimal(raw)?;
        Ok(Self { raw, scaled })
    }

    pub fn wire(&self) -> String {
        format_scaled(self.scaled)
    }
}

pub(crate) fn scale_decimal(d: Decimal) -> Result<u128> {
    if d.is_sign_negative() && !d.is_zero() {
        return Err(Error::InvalidNumericInput(format!("negative value {d}")));
    }
    d.checked_mul(Decimal::from(SCALE_FACTOR))
        .map(|x| x.floor())
        .and_then(|x| x.to_u128())
        .ok_or_else(|| Error::InvalidNumericInput(format!("{d} out of range")))
}

/// `floor(value × 10^8)`.
pub fn to_scaled<'a>(value: impl Into<NumericInput<'a>>) -> Result<u128> {
    scale_decimal(value.into().to_decimal()?)
}

/// Display only; never feed the result back into a signed payload.
pub fn from_scaled(scaled: u128) -> f64 {
    scaled as f64 / SCALE_FACTOR as f64
}

pub fn is_valid_input<'a>(value: impl Into<NumericInput<'a>>) -> bool {
    match value.into().to_decimal() {
        Ok(d) => !(d.is_sign_negative() && !d.is_zero()),
        Err(_) => false,
    }
}

/// Canonical minimal-width decimal: `150000000 -> "1.5"`, `1000000000 -> "10"`.
pub fn format_scaled(scaled: u128) -> String {
    let int_part = scaled / SCALE_FACTOR as u128;
    let frac_part = scaled % SCALE_FACTOR as u128;
    if frac_part == 0 {
        return int_part.to_string();
    }
    let frac = format!("{:0width$}", frac_part, width = SCALE_DECIMALS as usize);
    format!("{}.{}", int_part, frac.trim_end_matches('0'))
}

pub fn format_display(scaled: u128, decimals: usize) -> String {
    format!("{:.*}", decimals, from_scaled(scaled))
}
