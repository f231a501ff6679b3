//! # Tax Snapshot
//!
//! The calculator that freezes an order's tax at close time, and the
//! snapshot it produces.
//!
//! ## Calculation Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  OrderInput + TaxProfile                                                │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  1. resolve jurisdiction ──────────► EffectiveConfig (validated)        │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  2. classify lines ────────────────► gross per rate code + zero-rated   │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  3. B2B exemption? ── yes ─────────► all rate gross → exempt, tax 0     │
//! │        │ no                                                             │
//! │        ▼                                                                │
//! │  4. per bucket: inclusive → extract_from_gross (base = net)             │
//! │                 exclusive → apply_rate_bps    (base = gross)            │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  5. surcharges on pre-tax subtotal (always tax-exclusive)               │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  6. delivery: AsLine → synthetic base (+ tax)                           │
//! │               OutOfScope → added to grand total after tax               │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  7. totals: grand = sub + tax + out-of-scope                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//! The snapshot contains no timestamps, no maps and no floats. Serializing
//! two snapshots computed from the same inputs yields identical bytes.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::classifier::{classify_line, Bucket};
use crate::error::{ConfigurationError, CoreError, CoreResult};
use crate::jurisdiction::{resolve_effective_config, EffectiveConfig};
use crate::money::{Money, RoundingMode};
use crate::types::{DeliveryMode, OrderInput, TaxProfile, TaxRate, TaxRateRule};
use crate::validation::validate_order_input;

// =============================================================================
// Snapshot Types
// =============================================================================

/// The frozen tax result of one closed order.
///
/// Created once, stored verbatim next to the order, never recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct TaxSnapshot {
    /// Profile version that produced this snapshot.
    pub profile_id: String,
    pub profile_version: i64,

    pub currency: String,

    /// Code of the jurisdiction rule applied; empty for the base profile.
    pub jurisdiction_applied: String,

    pub prices_include_tax: bool,
    pub rounding: RoundingMode,

    pub totals: SnapshotTotals,

    /// Non-zero rate buckets that received lines, in profile rate order.
    pub summary_by_rate: Vec<RateSummary>,
    pub summary_zero_rated: BaseSummary,
    pub summary_exempt: BaseSummary,

    pub surcharges: Vec<SurchargeSummary>,

    /// Present only for an `AsLine` delivery with a non-zero fee.
    #[serde(default)]
    pub delivery: Option<DeliverySummary>,

    /// Out-of-scope delivery fee, added to the grand total after tax.
    pub out_of_scope_cents: i64,

    pub customer: SnapshotCustomer,

    /// True when the B2B tax-ID exemption applied.
    pub b2b_exempt: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotTotals {
    pub sub_total_cents: i64,
    pub tax_cents: i64,
    pub grand_total_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RateSummary {
    pub code: String,
    pub rate_bps: u32,
    /// Net base (after extraction for inclusive pricing).
    pub base_cents: i64,
    pub tax_cents: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BaseSummary {
    pub base_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SurchargeSummary {
    pub code: String,
    pub base_cents: i64,
    pub tax_cents: i64,
    pub taxable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DeliverySummary {
    pub base_cents: i64,
    pub tax_cents: i64,
    pub taxable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotCustomer {
    #[serde(default)]
    pub tax_id: Option<String>,
}

impl TaxSnapshot {
    /// Total tax across rate buckets, surcharges and delivery.
    pub fn tax(&self) -> Money {
        Money::from_cents(self.totals.tax_cents)
    }

    pub fn grand_total(&self) -> Money {
        Money::from_cents(self.totals.grand_total_cents)
    }
}

// =============================================================================
// Calculator
// =============================================================================

/// Gross accumulated for one non-zero rate code.
struct RateBucket<'a> {
    rule: &'a TaxRateRule,
    rate: TaxRate,
    gross: Money,
    touched: bool,
}

/// Computes the tax snapshot for a closed order.
///
/// ## Errors
/// - [`CoreError::Validation`] when the order input is malformed
/// - [`CoreError::CurrencyMismatch`] when the order names another currency
/// - [`CoreError::Configuration`] when the effective rules are broken
///
/// ## Example
/// ```rust
/// use levy_core::snapshot::calculate_tax_snapshot;
/// use levy_core::types::{OrderInput, OrderLine, TaxProfile, TaxRateRule};
///
/// let mut profile = TaxProfile::new("PH", "PHP");
/// profile.prices_include_tax = true;
/// profile.rates.push(TaxRateRule::all("std", "VAT", 1200));
///
/// let order = OrderInput::new("dine_in", vec![OrderLine::new(1, 1120)]);
/// let snapshot = calculate_tax_snapshot(&profile, &order).unwrap();
///
/// assert_eq!(snapshot.summary_by_rate[0].base_cents, 1000);
/// assert_eq!(snapshot.summary_by_rate[0].tax_cents, 120);
/// assert_eq!(snapshot.totals.grand_total_cents, 1120);
/// ```
pub fn calculate_tax_snapshot(profile: &TaxProfile, input: &OrderInput) -> CoreResult<TaxSnapshot> {
    validate_order_input(input)?;

    if let Some(currency) = input.currency.as_deref().map(str::trim) {
        if !currency.is_empty() && !currency.eq_ignore_ascii_case(&profile.currency) {
            return Err(CoreError::CurrencyMismatch {
                order: currency.to_string(),
                profile: profile.currency.clone(),
            });
        }
    }

    // Step 1: effective configuration
    let config = resolve_effective_config(profile, &input.locality)?;
    let mode = config.rounding;

    // Step 2: classification
    let mut buckets = config
        .rates
        .iter()
        .filter(|rule| rule.rate_bps != 0)
        .map(|rule| {
            Ok(RateBucket {
                rule,
                rate: rule.tax_rate()?,
                gross: Money::zero(),
                touched: false,
            })
        })
        .collect::<Result<Vec<_>, ConfigurationError>>()?;
    let mut zero_rated = Money::zero();

    for line in &input.lines {
        let classification = classify_line(line, &input.order_type, &config.rates);
        match classification.bucket {
            Bucket::TaxedAt(rule) => {
                let bucket = buckets
                    .iter_mut()
                    .find(|bucket| bucket.rule.code == rule.code)
                    .ok_or_else(|| ConfigurationError::DanglingTaxCode {
                        owner: "line classification".to_string(),
                        tax_code: rule.code.clone(),
                    })?;
                bucket.gross += classification.base;
                bucket.touched = true;
            }
            Bucket::ZeroRated | Bucket::Unclassified => zero_rated += classification.base,
        }
    }

    // Step 3: B2B exemption, all or nothing
    let tax_id = input.customer.normalized_tax_id();
    let b2b_exempt = profile.b2b_config.tax_exempt_with_tax_id && tax_id.is_some();

    // Step 4: per-bucket tax
    let mut exempt = Money::zero();
    let mut summary_by_rate = Vec::new();
    for bucket in buckets.iter().filter(|bucket| bucket.touched) {
        let (base, tax) = if b2b_exempt {
            exempt += bucket.gross;
            (Money::zero(), Money::zero())
        } else if config.prices_include_tax {
            bucket.gross.extract_from_gross(bucket.rate, mode)
        } else {
            (bucket.gross, bucket.gross.apply_rate(bucket.rate, mode))
        };
        summary_by_rate.push(RateSummary {
            code: bucket.rule.code.clone(),
            rate_bps: bucket.rate.bps(),
            base_cents: base.cents(),
            tax_cents: tax.cents(),
        });
    }

    let rate_base: Money = summary_by_rate
        .iter()
        .map(|row| Money::from_cents(row.base_cents))
        .sum();
    let rate_tax: Money = summary_by_rate
        .iter()
        .map(|row| Money::from_cents(row.tax_cents))
        .sum();
    let pre_surcharge_subtotal = rate_base + zero_rated + exempt;

    // Step 5: surcharges
    let mut surcharges = Vec::new();
    for rule in config
        .surcharges
        .iter()
        .filter(|rule| rule.applies_to_order_type(&input.order_type))
    {
        let base = pre_surcharge_subtotal.apply_bps(rule.percent()?.bps(), mode);
        let owner = || format!("surcharge '{}'", rule.code);
        let taxable = rule.taxable && !b2b_exempt;
        let tax = if taxable {
            base.apply_rate(taxed_via(&config, owner, rule.tax_code.as_deref())?, mode)
        } else {
            Money::zero()
        };
        surcharges.push(SurchargeSummary {
            code: rule.code.clone(),
            base_cents: base.cents(),
            tax_cents: tax.cents(),
            taxable,
        });
    }

    // Step 6: delivery
    let fee = Money::from_cents(input.delivery_fee_cents);
    let mut out_of_scope = Money::zero();
    let mut delivery = None;
    match &config.delivery {
        DeliveryMode::OutOfScope => out_of_scope = fee,
        DeliveryMode::AsLine { taxable, tax_code } if !fee.is_zero() => {
            let taxable = *taxable && !b2b_exempt;
            let tax = if taxable {
                fee.apply_rate(
                    taxed_via(&config, || "delivery".to_string(), tax_code.as_deref())?,
                    mode,
                )
            } else {
                Money::zero()
            };
            delivery = Some(DeliverySummary {
                base_cents: fee.cents(),
                tax_cents: tax.cents(),
                taxable,
            });
        }
        DeliveryMode::AsLine { .. } => {}
    }

    // Step 7: totals
    let surcharge_base: Money = surcharges.iter().map(|s| Money::from_cents(s.base_cents)).sum();
    let surcharge_tax: Money = surcharges.iter().map(|s| Money::from_cents(s.tax_cents)).sum();
    let delivery_base = Money::from_cents(delivery.map_or(0, |d| d.base_cents));
    let delivery_tax = Money::from_cents(delivery.map_or(0, |d| d.tax_cents));

    let sub_total = pre_surcharge_subtotal + surcharge_base + delivery_base;
    let tax = rate_tax + surcharge_tax + delivery_tax;
    let grand_total = sub_total + tax + out_of_scope;

    Ok(TaxSnapshot {
        profile_id: profile.id.clone(),
        profile_version: profile.version,
        currency: profile.currency.clone(),
        jurisdiction_applied: config.jurisdiction_code.clone(),
        prices_include_tax: config.prices_include_tax,
        rounding: mode,
        totals: SnapshotTotals {
            sub_total_cents: sub_total.cents(),
            tax_cents: tax.cents(),
            grand_total_cents: grand_total.cents(),
        },
        summary_by_rate,
        summary_zero_rated: BaseSummary {
            base_cents: zero_rated.cents(),
        },
        summary_exempt: BaseSummary {
            base_cents: exempt.cents(),
        },
        surcharges,
        delivery,
        out_of_scope_cents: out_of_scope.cents(),
        customer: SnapshotCustomer {
            tax_id: tax_id.map(String::from),
        },
        b2b_exempt,
    })
}

/// Rate used to tax a surcharge or delivery line.
///
/// A missing or dangling tax code fails the whole calculation.
fn taxed_via(
    config: &EffectiveConfig,
    owner: impl FnOnce() -> String,
    tax_code: Option<&str>,
) -> Result<TaxRate, ConfigurationError> {
    let code = match tax_code {
        Some(code) => code,
        None => return Err(ConfigurationError::MissingTaxCode { owner: owner() }),
    };
    match config.rate_for_code(code) {
        Some(rule) => rule.tax_rate(),
        None => Err(ConfigurationError::DanglingTaxCode {
            owner: owner(),
            tax_code: code.to_string(),
        }),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::types::{Customer, OrderLine, RateConditions, SurchargeRule};
    use proptest::prelude::*;

    fn profile(inclusive: bool, half_even: bool, exempt: bool) -> TaxProfile {
        let mut profile = TaxProfile::new("PH", "PHP");
        profile.prices_include_tax = inclusive;
        profile.rounding = if half_even {
            RoundingMode::HalfEven
        } else {
            RoundingMode::HalfUp
        };
        profile.b2b_config.tax_exempt_with_tax_id = exempt;
        profile.rates.push(TaxRateRule::filtered(
            "alcohol",
            "Alcohol",
            2000,
            RateConditions {
                item_tag_in: vec!["alcohol".to_string()],
                ..Default::default()
            },
        ));
        profile.rates.push(TaxRateRule::filtered(
            "zero",
            "Zero",
            0,
            RateConditions {
                item_tag_in: vec!["water".to_string()],
                ..Default::default()
            },
        ));
        profile.rates.push(TaxRateRule::all("std", "Standard", 825));
        profile.surcharges.push(SurchargeRule {
            code: "svc".to_string(),
            label: String::new(),
            percent_bps: 1000,
            apply_when_order_type_in: vec![],
            taxable: true,
            tax_code: Some("std".to_string()),
        });
        profile
    }

    fn any_line() -> impl Strategy<Value = OrderLine> {
        (1u32..20, 0i64..100_000, 0i64..2_000, 0usize..3).prop_map(|(qty, price, addons, tag)| {
            let mut line = OrderLine::new(qty, price);
            line.addons_cents = addons;
            match tag {
                1 => line.tags.push("alcohol".to_string()),
                2 => line.tags.push("water".to_string()),
                _ => {}
            }
            line
        })
    }

    proptest! {
        #[test]
        fn totals_reconcile(
            lines in prop::collection::vec(any_line(), 0..12),
            inclusive in any::<bool>(),
            half_even in any::<bool>(),
            with_tax_id in any::<bool>(),
            fee in 0i64..5_000
        ) {
            let profile = profile(inclusive, half_even, true);
            let mut order = OrderInput::new("dine_in", lines.clone());
            order.delivery_fee_cents = fee;
            if with_tax_id {
                order.customer = Customer::with_tax_id("TIN");
            }

            let snapshot = calculate_tax_snapshot(&profile, &order).unwrap();
            let totals = snapshot.totals;

            prop_assert_eq!(
                totals.grand_total_cents,
                totals.sub_total_cents + totals.tax_cents + snapshot.out_of_scope_cents
            );

            let rate_tax: i64 = snapshot.summary_by_rate.iter().map(|r| r.tax_cents).sum();
            let surcharge_tax: i64 = snapshot.surcharges.iter().map(|s| s.tax_cents).sum();
            prop_assert_eq!(totals.tax_cents, rate_tax + surcharge_tax);

            // Pre-surcharge value reconciles with the order lines.
            let gross: i64 = lines.iter().map(|l| l.base().cents()).sum();
            let rate_base: i64 = snapshot.summary_by_rate.iter().map(|r| r.base_cents).sum();
            let pre_surcharge = rate_base
                + snapshot.summary_zero_rated.base_cents
                + snapshot.summary_exempt.base_cents;
            if inclusive {
                prop_assert_eq!(pre_surcharge + rate_tax, gross);
            } else {
                prop_assert_eq!(pre_surcharge, gross);
            }

            if with_tax_id {
                prop_assert_eq!(totals.tax_cents, 0);
            }
        }

        #[test]
        fn calculation_is_idempotent(
            lines in prop::collection::vec(any_line(), 0..8),
            inclusive in any::<bool>()
        ) {
            let profile = profile(inclusive, false, false);
            let order = OrderInput::new("dine_in", lines);
            let first = serde_json::to_string(&calculate_tax_snapshot(&profile, &order).unwrap()).unwrap();
            let second = serde_json::to_string(&calculate_tax_snapshot(&profile, &order).unwrap()).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
