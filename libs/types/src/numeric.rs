//! Fixed-precision helpers for quote prices
//!
//! Uses rust_decimal for deterministic arithmetic (no floating-point errors).
//! Rounding to an instrument's price precision is HALF_UP.

use rust_decimal::{Decimal, RoundingStrategy};

/// Largest precision rust_decimal can represent.
pub const MAX_DIGITS: u32 = 28;

/// Round a price to `digits` decimal places, HALF_UP.
pub fn round_price(price: Decimal, digits: u32) -> Decimal {
    price.round_dp_with_strategy(digits.min(MAX_DIGITS), RoundingStrategy::MidpointAwayFromZero)
}

/// Largest of the given values, or zero for an empty slice.
pub fn max_of(values: &[Decimal]) -> Decimal {
    values.iter().copied().max().unwrap_or(Decimal::ZERO)
}

/// Smallest of the given values, or zero for an empty slice.
pub fn min_of(values: &[Decimal]) -> Decimal {
    values.iter().copied().min().unwrap_or(Decimal::ZERO)
}


// ── Property-Based Tests ────────────────────────────────────────────
