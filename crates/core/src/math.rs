//! Overflow-checked fixed-point arithmetic at WAD (1e18) and RAY (1e27)
//! precision.
//!
//! Every multiplication and division in the accrual and liquidation paths
//! routes through these functions so that rounding is identical everywhere
//! in the system. Operations round half up, except [`mul_div_floor`] which
//! truncates for accrual-index settlement. All reject with
//! [`MathError::Overflow`] when the unrounded intermediate would exceed
//! the U256 range.

use alloy::primitives::U256;
use thiserror::Error;

/// WAD constant: 1e18 for 18-decimal fixed-point arithmetic.
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Half of WAD, used for half-up rounding.
pub const HALF_WAD: U256 = U256::from_limbs([500_000_000_000_000_000, 0, 0, 0]);

/// RAY constant: 1e27 for 27-decimal fixed-point arithmetic.
pub const RAY: U256 = U256::from_limbs([11515845246265065472, 54210108, 0, 0]);

/// Half of RAY, used for half-up rounding.
pub const HALF_RAY: U256 = U256::from_limbs([5757922623132532736, 27105054, 0, 0]);

/// Ratio between the RAY and WAD scales (1e9).
pub const WAD_RAY_RATIO: U256 = U256::from_limbs([1_000_000_000, 0, 0, 0]);

const HALF_RATIO: U256 = U256::from_limbs([500_000_000, 0, 0, 0]);

/// Basis points denominator (10000 = 100%).
pub const BPS_DENOMINATOR: U256 = U256::from_limbs([10_000, 0, 0, 0]);

/// Fixed-point arithmetic failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MathError {
    /// Intermediate product or sum exceeds the U256 range.
    #[error("fixed-point overflow")]
    Overflow,
    /// Division by zero.
    #[error("division by zero")]
    DivisionByZero,
}

/// Pre-computed powers of 10 for fast decimal conversion.
const POW10: [u128; 39] = [
    1,
    10,
    100,
    1_000,
    10_000,
    100_000,
    1_000_000,
    10_000_000,
    100_000_000,
    1_000_000_000,
    10_000_000_000,
    100_000_000_000,
    1_000_000_000_000,
    10_000_000_000_000,
    100_000_000_000_000,
    1_000_000_000_000_000,
    10_000_000_000_000_000,
    100_000_000_000_000_000,
    1_000_000_000_000_000_000,
    10_000_000_000_000_000_000,
    100_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000_000_000,
];

/// Fast power of 10 lookup (up to 10^38).
#[inline(always)]
pub fn pow10(exp: u8) -> U256 {
    if exp < 39 {
        U256::from(POW10[exp as usize])
    } else {
        U256::from(10u64).pow(U256::from(exp))
    }
}

#[inline(always)]
fn mul_scaled(a: U256, b: U256, half: U256, scale: U256) -> Result<U256, MathError> {
    let product = a.checked_mul(b).ok_or(MathError::Overflow)?;
    let rounded = product.checked_add(half).ok_or(MathError::Overflow)?;
    Ok(rounded / scale)
}

#[inline(always)]
fn div_scaled(a: U256, b: U256, scale: U256) -> Result<U256, MathError> {
    if b.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let scaled = a.checked_mul(scale).ok_or(MathError::Overflow)?;
    let rounded = scaled.checked_add(b >> 1).ok_or(MathError::Overflow)?;
    Ok(rounded / b)
}

/// Multiply then divide at arbitrary scale, rounding half up:
/// (a * b + denominator/2) / denominator. Used by the accrual ledger
/// where the scale is the asset's own unit rather than WAD/RAY.
#[inline(always)]
pub fn mul_div(a: U256, b: U256, denominator: U256) -> Result<U256, MathError> {
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    mul_scaled(a, b, denominator >> 1, denominator)
}

/// Multiply then divide at arbitrary scale, truncating: a * b / denominator.
/// The accrual index settles with this so that repeated settlement can
/// never credit more reward than the emission actually produced.
#[inline(always)]
pub fn mul_div_floor(a: U256, b: U256, denominator: U256) -> Result<U256, MathError> {
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let product = a.checked_mul(b).ok_or(MathError::Overflow)?;
    Ok(product / denominator)
}

/// Multiply two WAD values, rounding half up: (a * b + WAD/2) / WAD.
#[inline(always)]
pub fn wad_mul(a: U256, b: U256) -> Result<U256, MathError> {
    mul_scaled(a, b, HALF_WAD, WAD)
}

/// Divide two WAD values, rounding half up: (a * WAD + b/2) / b.
#[inline(always)]
pub fn wad_div(a: U256, b: U256) -> Result<U256, MathError> {
    div_scaled(a, b, WAD)
}

/// Multiply two RAY values, rounding half up.
#[inline(always)]
pub fn ray_mul(a: U256, b: U256) -> Result<U256, MathError> {
    mul_scaled(a, b, HALF_RAY, RAY)
}

/// Divide two RAY values, rounding half up.
#[inline(always)]
pub fn ray_div(a: U256, b: U256) -> Result<U256, MathError> {
    div_scaled(a, b, RAY)
}

/// Convert a WAD value to RAY. Lossless (pure multiply), overflow-checked.
#[inline(always)]
pub fn wad_to_ray(a: U256) -> Result<U256, MathError> {
    a.checked_mul(WAD_RAY_RATIO).ok_or(MathError::Overflow)
}

/// Convert a RAY value to WAD, rounding half up. Loses the low 9 digits.
#[inline(always)]
pub fn ray_to_wad(a: U256) -> Result<U256, MathError> {
    let rounded = a.checked_add(HALF_RATIO).ok_or(MathError::Overflow)?;
    Ok(rounded / WAD_RAY_RATIO)
}

/// Apply a basis-point discount: value * (10000 - bps) / 10000.
///
/// Example: apply_bps_discount(1000, 100) = 990 (1% off).
#[inline(always)]
pub fn apply_bps_discount(value: U256, bps: u16) -> Result<U256, MathError> {
    let factor = U256::from(10_000u16.saturating_sub(bps));
    let scaled = value.checked_mul(factor).ok_or(MathError::Overflow)?;
    Ok(scaled / BPS_DENOMINATOR)
}

/// Apply a basis-point premium: value * (10000 + bps) / 10000.
///
/// Example: apply_bps_premium(1000, 500) = 1050 (5% bonus).
#[inline(always)]
pub fn apply_bps_premium(value: U256, bps: u16) -> Result<U256, MathError> {
    let factor = U256::from(10_000u32 + bps as u32);
    let scaled = value.checked_mul(factor).ok_or(MathError::Overflow)?;
    Ok(scaled / BPS_DENOMINATOR)
}

/// Take a basis-point fraction of a value: value * bps / 10000.
#[inline(always)]
pub fn bps_fraction(value: U256, bps: u16) -> Result<U256, MathError> {
    let scaled = value
        .checked_mul(U256::from(bps))
        .ok_or(MathError::Overflow)?;
    Ok(scaled / BPS_DENOMINATOR)
}

/// Convert WAD (18 decimals) to f64. Use only for display/logging, not
/// for computation.
#[inline(always)]
pub fn wad_to_f64(wad: U256) -> f64 {
    if wad <= U256::from(u128::MAX) {
        let value: u128 = wad.to();
        value as f64 / 1e18
    } else {
        let limbs = wad.as_limbs();
        let high = limbs[1] as f64 * (u64::MAX as f64 + 1.0);
        let low = limbs[0] as f64;
        (high + low) / 1e18
    }
}
