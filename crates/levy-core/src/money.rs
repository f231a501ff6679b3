//! # Money Module
//!
//! Integer minor-unit money and the two rounding modes used by every tax
//! computation in the engine.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  In a VAT book that must reconcile to the cent:                         │
//! │    11.20 gross at 12% → 10.00 net + 1.20 tax                            │
//! │    Both halves rounded independently can drift by 0.01                  │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents + Exact Rational Rounding                  │
//! │    tax = round(base × bps / 10000)   computed on i128, never f64        │
//! │    net = round(gross × 10000 / (10000 + bps)); tax = gross − net        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use levy_core::money::{Money, RoundingMode};
//! use levy_core::types::TaxRate;
//!
//! let base = Money::from_cents(5000);
//! let tax = base.apply_rate(TaxRate::from_bps(1200), RoundingMode::HalfUp);
//! assert_eq!(tax.cents(), 600);
//!
//! let (net, tax) = Money::from_cents(1120).extract_from_gross(TaxRate::from_bps(1200), RoundingMode::HalfUp);
//! assert_eq!((net.cents(), tax.cents()), (1000, 120));
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

use crate::types::TaxRate;
use crate::BPS_DENOMINATOR;

// =============================================================================
// Rounding Mode
// =============================================================================

/// How a non-integral cent amount is brought back to whole cents.
///
/// ## Tie Handling
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────┐
/// │  exact value   │  HalfUp  │  HalfEven                               │
/// │  ──────────────┼──────────┼──────────                               │
/// │      0.5       │    1     │    0                                    │
/// │      1.5       │    2     │    2                                    │
/// │      2.5       │    3     │    2                                    │
/// │     -2.5       │   -3     │   -2                                    │
/// │      2.4999    │    2     │    2      (not a tie: plain nearest)    │
/// └─────────────────────────────────────────────────────────────────────┘
/// ```
/// Both modes decide on the exact rational remainder; nothing is
/// approximated before the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum RoundingMode {
    /// Ties round away from zero.
    #[default]
    HalfUp,
    /// Ties round to the even neighbour (bankers rounding).
    HalfEven,
}

impl RoundingMode {
    /// Divides `numerator` by `denominator` and rounds the exact quotient.
    ///
    /// `denominator` must be positive. Every rounding in the engine funnels
    /// through here.
    ///
    /// ## Example
    /// ```rust
    /// use levy_core::money::RoundingMode;
    ///
    /// assert_eq!(RoundingMode::HalfUp.round_div(25, 10), 3);
    /// assert_eq!(RoundingMode::HalfEven.round_div(25, 10), 2);
    /// assert_eq!(RoundingMode::HalfEven.round_div(35, 10), 4);
    /// assert_eq!(RoundingMode::HalfUp.round_div(-25, 10), -3);
    /// ```
    pub fn round_div(self, numerator: i128, denominator: i128) -> i128 {
        debug_assert!(denominator > 0, "round_div requires a positive denominator");

        // Truncating division: quotient rounds toward zero,
        // remainder carries the sign of the numerator.
        let quotient = numerator / denominator;
        let remainder = numerator % denominator;
        if remainder == 0 {
            return quotient;
        }

        let away_from_zero = quotient + numerator.signum();
        match (remainder.abs() * 2).cmp(&denominator) {
            Ordering::Less => quotient,
            Ordering::Greater => away_from_zero,
            Ordering::Equal => match self {
                RoundingMode::HalfUp => away_from_zero,
                RoundingMode::HalfEven => {
                    if quotient % 2 == 0 {
                        quotient
                    } else {
                        away_from_zero
                    }
                }
            },
        }
    }
}

impl fmt::Display for RoundingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundingMode::HalfUp => write!(f, "half_up"),
            RoundingMode::HalfEven => write!(f, "half_even"),
        }
    }
}

// =============================================================================
// Cent-Level Primitives
// =============================================================================

/// Computes `round(base_cents × rate_bps / 10000)`.
///
/// ## Example
/// ```rust
/// use levy_core::money::{apply_rate_bps, RoundingMode};
///
/// // 12% of 50.00 = 6.00
/// assert_eq!(apply_rate_bps(5000, 1200, RoundingMode::HalfUp), 600);
/// // 8.25% of 10.00 = 0.825 → 0.83 (half up) / 0.82 (half even)
/// assert_eq!(apply_rate_bps(1000, 825, RoundingMode::HalfUp), 83);
/// assert_eq!(apply_rate_bps(1000, 825, RoundingMode::HalfEven), 82);
/// ```
pub fn apply_rate_bps(base_cents: i64, rate_bps: u32, mode: RoundingMode) -> i64 {
    let numerator = base_cents as i128 * rate_bps as i128;
    clamp_to_i64(mode.round_div(numerator, BPS_DENOMINATOR as i128))
}

/// Splits a tax-inclusive amount into `(net_cents, tax_cents)`.
///
/// ## Reconciliation Guarantee
/// Only the net is rounded. The tax is the remainder `gross − net`, so
/// `net + tax == gross` holds for every input.
///
/// ## Example
/// ```rust
/// use levy_core::money::{extract_from_gross, RoundingMode};
///
/// let (net, tax) = extract_from_gross(1000, 825, RoundingMode::HalfEven);
/// assert_eq!(net + tax, 1000);
/// assert_eq!((net, tax), (924, 76));
/// ```
pub fn extract_from_gross(gross_cents: i64, rate_bps: u32, mode: RoundingMode) -> (i64, i64) {
    let denominator = BPS_DENOMINATOR as i128 + rate_bps as i128;
    let numerator = gross_cents as i128 * BPS_DENOMINATOR as i128;
    let net = clamp_to_i64(mode.round_div(numerator, denominator));
    (net, gross_cents - net)
}

/// Rounded results never exceed the input magnitude for rates up to 100%;
/// larger multipliers saturate instead of wrapping.
fn clamp_to_i64(value: i128) -> i64 {
    value.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

// =============================================================================
// Money Type
// =============================================================================

/// Represents a monetary value in the smallest currency unit (cents).
///
/// ## Design Decisions
/// - **i64 (signed)**: refunds and voids produce negative lines
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - **No currency field**: a snapshot is single-currency; the currency
///   code lives on the snapshot, not on every amount
///
/// ## Where Money Flows
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                                                                         │
/// │  OrderLine.unit_price + addons ──► × quantity ──► line base             │
/// │                                                        │                │
/// │                              rate bucket accumulation ◄┘                │
/// │                                        │                                │
/// │            apply_rate / extract_from_gross (per bucket, once)           │
/// │                                        │                                │
/// │                                        ▼                                │
/// │   surcharges ──► delivery ──► TaxSnapshot totals (i64 cents)            │
/// │                                                                         │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents (the smallest currency unit).
    ///
    /// ## Example
    /// ```rust
    /// use levy_core::money::Money;
    ///
    /// let price = Money::from_cents(1099);
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion (truncated toward zero).
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Tax at `rate` on this amount, treated as tax-exclusive.
    ///
    /// ## User Workflow
    /// ```text
    /// Rate bucket "std" base: 50.00
    ///      │
    ///      ▼
    /// apply_rate(12%, HalfUp) ← THIS FUNCTION
    ///      │
    ///      ▼
    /// Tax: 6.00
    /// ```
    pub fn apply_rate(&self, rate: TaxRate, mode: RoundingMode) -> Money {
        self.apply_bps(rate.bps(), mode)
    }

    /// Percentage of this amount expressed in basis points.
    ///
    /// Used for surcharges, whose percentage is not a tax rate.
    pub fn apply_bps(&self, bps: u32, mode: RoundingMode) -> Money {
        Money(apply_rate_bps(self.0, bps, mode))
    }

    /// Splits this tax-inclusive amount into `(net, tax)`.
    ///
    /// See [`extract_from_gross`] for the reconciliation guarantee.
    pub fn extract_from_gross(&self, rate: TaxRate, mode: RoundingMode) -> (Money, Money) {
        let (net, tax) = extract_from_gross(self.0, rate.bps(), mode);
        (Money(net), Money(tax))
    }

    /// Multiplies money by a quantity.
    ///
    /// ## Example
    /// ```rust
    /// use levy_core::money::Money;
    ///
    /// let unit_price = Money::from_cents(299);
    /// assert_eq!(unit_price.multiply_quantity(3).cents(), 897);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Plain decimal rendering without a currency symbol.
///
/// ## Note
/// For logs and debugging only. The snapshot carries the currency code and
/// the admin pages localize amounts.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
