//! # Domain Types
//!
//! The tax rule model and the order input consumed by the engine.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         TaxProfile (versioned)                          │
//! │                                                                         │
//! │  country / currency / pricesIncludeTax / rounding                       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  TaxRateRule    │   │  SurchargeRule  │   │  DeliveryMode   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  code           │   │  code           │   │  OutOfScope     │       │
//! │  │  rateBps        │   │  percentBps     │   │  AsLine {       │       │
//! │  │  appliesTo:     │   │  orderTypeIn    │   │    taxable,     │       │
//! │  │   All |         │   │  taxable        │   │    taxCode }    │       │
//! │  │   Filtered{..}  │   │  taxCode ───────┼───┼──► rate code    │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────────────────┐   ┌─────────────────────────────┐     │
//! │  │  JurisdictionRule           │   │  B2bConfig                  │     │
//! │  │  match {country, state,     │   │  taxExemptWithTaxId         │     │
//! │  │         city, zipPrefix}    │   │  invoiceNumbering?          │     │
//! │  │  *Override (replace)        │   │   series/prefix/suffix/     │     │
//! │  └─────────────────────────────┘   │   padding/resetPolicy       │     │
//! │                                    └─────────────────────────────┘     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ordering Matters
//! `rates`, `surcharges` and `jurisdictions` are ordered lists. The first
//! matching rate wins, and jurisdictions tie-break on array position.
//!
//! ## Immutability
//! A profile referenced by a snapshot is never edited. Changes create a new
//! version (new `id`, next `version`) and re-point the tenant's active profile.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ConfigurationError;
use crate::money::{Money, RoundingMode};

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 1200 bps = 12.00% (e.g., Philippine VAT)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    /// Checks if tax rate is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

/// Converts configured basis points into a rate. Rates above 100% are
/// allowed; negatives are not.
pub(crate) fn checked_bps(owner: impl FnOnce() -> String, bps: i32) -> Result<TaxRate, ConfigurationError> {
    if bps < 0 {
        return Err(ConfigurationError::NegativeBps { owner: owner(), bps });
    }
    Ok(TaxRate::from_bps(bps.unsigned_abs()))
}

// =============================================================================
// Tax Rate Rule
// =============================================================================

/// One entry of the ordered rate table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct TaxRateRule {
    /// Unique within the effective rate list.
    pub code: String,

    #[serde(default)]
    pub label: String,

    /// Basis points. Zero marks matching lines as zero-rated.
    pub rate_bps: i32,

    #[serde(default)]
    pub applies_to: RateFilter,
}

impl TaxRateRule {
    /// A rule matching every line.
    pub fn all(code: impl Into<String>, label: impl Into<String>, rate_bps: i32) -> Self {
        TaxRateRule {
            code: code.into(),
            label: label.into(),
            rate_bps,
            applies_to: RateFilter::All,
        }
    }

    /// A rule matching only lines that satisfy `conditions`.
    pub fn filtered(
        code: impl Into<String>,
        label: impl Into<String>,
        rate_bps: i32,
        conditions: RateConditions,
    ) -> Self {
        TaxRateRule {
            code: code.into(),
            label: label.into(),
            rate_bps,
            applies_to: RateFilter::Filtered(conditions),
        }
    }

    /// The configured rate, or a [`ConfigurationError`] when it is out of range.
    pub fn tax_rate(&self) -> Result<TaxRate, ConfigurationError> {
        checked_bps(|| format!("rate '{}'", self.code), self.rate_bps)
    }
}

/// Which lines a rate rule applies to.
///
/// ## JSON Shape
/// ```text
/// "appliesTo": "all"
/// "appliesTo": { "filtered": { "itemCategoryIn": ["drinks"], "orderTypeIn": ["dine_in"] } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub enum RateFilter {
    #[default]
    All,
    Filtered(RateConditions),
}

/// Conditions of a filtered rate rule. An empty list places no constraint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RateConditions {
    #[serde(default)]
    pub item_category_in: Vec<String>,
    #[serde(default)]
    pub item_tag_in: Vec<String>,
    #[serde(default)]
    pub exclude_item_tag_in: Vec<String>,
    #[serde(default)]
    pub order_type_in: Vec<String>,
}

// =============================================================================
// Surcharge Rule
// =============================================================================

/// A percentage fee on the pre-tax subtotal (service charge).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SurchargeRule {
    pub code: String,

    #[serde(default)]
    pub label: String,

    pub percent_bps: i32,

    /// Empty means every order type.
    #[serde(default)]
    pub apply_when_order_type_in: Vec<String>,

    #[serde(default)]
    pub taxable: bool,

    /// Rate code used to tax the surcharge when `taxable`.
    #[serde(default)]
    pub tax_code: Option<String>,
}

impl SurchargeRule {
    /// Whether this surcharge is charged for `order_type`.
    pub fn applies_to_order_type(&self, order_type: &str) -> bool {
        self.apply_when_order_type_in.is_empty()
            || self.apply_when_order_type_in.iter().any(|t| t == order_type)
    }

    /// The configured percentage as a checked rate.
    pub fn percent(&self) -> Result<TaxRate, ConfigurationError> {
        checked_bps(|| format!("surcharge '{}'", self.code), self.percent_bps)
    }
}

// =============================================================================
// Delivery
// =============================================================================

/// How the delivery fee is treated.
///
/// ## JSON Shape
/// ```text
/// { "mode": "OutOfScope" }
/// { "mode": "AsLine", "taxable": true, "taxCode": "std" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "mode")]
pub enum DeliveryMode {
    /// Fee is added to the grand total after tax and never taxed.
    #[default]
    OutOfScope,
    /// Fee becomes a synthetic line, optionally taxed via `tax_code`.
    AsLine {
        #[serde(default)]
        taxable: bool,
        #[serde(rename = "taxCode", default)]
        tax_code: Option<String>,
    },
}

// =============================================================================
// Jurisdictions
// =============================================================================

/// Locality-scoped replacement of parts of the base profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct JurisdictionRule {
    pub code: String,

    #[serde(rename = "match", default)]
    pub matcher: JurisdictionMatch,

    #[serde(default)]
    pub rates_override: Option<Vec<TaxRateRule>>,
    #[serde(default)]
    pub surcharges_override: Option<Vec<SurchargeRule>>,
    #[serde(default)]
    pub delivery_override: Option<DeliveryMode>,
    #[serde(default)]
    pub prices_include_tax_override: Option<bool>,
    #[serde(default)]
    pub rounding_override: Option<RoundingMode>,
}

impl JurisdictionRule {
    /// A rule with the given match and no overrides.
    pub fn new(code: impl Into<String>, matcher: JurisdictionMatch) -> Self {
        JurisdictionRule {
            code: code.into(),
            matcher,
            rates_override: None,
            surcharges_override: None,
            delivery_override: None,
            prices_include_tax_override: None,
            rounding_override: None,
        }
    }
}

/// Locality fields a jurisdiction rule requires. Absent fields match anything.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct JurisdictionMatch {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub zip_prefix: Option<String>,
}

// =============================================================================
// B2B and Invoice Numbering
// =============================================================================

/// Business-customer handling.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct B2bConfig {
    /// Exempt the whole taxable base when the customer presents a tax ID.
    #[serde(default)]
    pub tax_exempt_with_tax_id: bool,

    #[serde(default)]
    pub invoice_numbering: Option<InvoiceNumberingConfig>,
}

/// Layout and reset behavior of B2B invoice numbers.
///
/// ## Example
/// ```text
/// series "B", prefix "INV-", padding 6, suffix "/25"
///   → "B-INV-000042/25"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceNumberingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub series: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub suffix: Option<String>,
    /// Minimum digit count; 0 disables padding.
    #[serde(default)]
    pub padding: u8,
    #[serde(default)]
    pub reset_policy: ResetPolicy,
}

/// When an invoice counter starts over at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum ResetPolicy {
    #[default]
    Never,
    Yearly,
    Monthly,
    Daily,
}

impl ResetPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResetPolicy::Never => "never",
            ResetPolicy::Yearly => "yearly",
            ResetPolicy::Monthly => "monthly",
            ResetPolicy::Daily => "daily",
        }
    }
}

// =============================================================================
// Tax Profile
// =============================================================================

/// A tenant's complete tax configuration at one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct TaxProfile {
    /// UUID v4 assigned when this version is stored. Empty for drafts.
    #[serde(default)]
    pub id: String,

    /// Monotonic per tenant. 0 for drafts.
    #[serde(default)]
    pub version: i64,

    /// ISO 3166-1 alpha-2.
    pub country: String,

    /// ISO 4217.
    pub currency: String,

    #[serde(default)]
    pub prices_include_tax: bool,

    #[serde(default)]
    pub rounding: RoundingMode,

    #[serde(default)]
    pub rates: Vec<TaxRateRule>,

    #[serde(default)]
    pub surcharges: Vec<SurchargeRule>,

    #[serde(default)]
    pub delivery: DeliveryMode,

    #[serde(default)]
    pub jurisdictions: Vec<JurisdictionRule>,

    #[serde(default)]
    pub b2b_config: B2bConfig,
}

impl TaxProfile {
    /// An empty exclusive-pricing, half-up profile.
    pub fn new(country: impl Into<String>, currency: impl Into<String>) -> Self {
        TaxProfile {
            id: String::new(),
            version: 0,
            country: country.into(),
            currency: currency.into(),
            prices_include_tax: false,
            rounding: RoundingMode::HalfUp,
            rates: Vec::new(),
            surcharges: Vec::new(),
            delivery: DeliveryMode::OutOfScope,
            jurisdictions: Vec::new(),
            b2b_config: B2bConfig::default(),
        }
    }

    /// Invoice numbering settings, when numbering is switched on.
    pub fn active_numbering(&self) -> Option<&InvoiceNumberingConfig> {
        self.b2b_config
            .invoice_numbering
            .as_ref()
            .filter(|numbering| numbering.enabled)
    }
}

// =============================================================================
// Order Input
// =============================================================================

/// One line of a closed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub quantity: u32,

    pub unit_price_cents: i64,

    /// Per-unit modifier charges, already summed.
    #[serde(default)]
    pub addons_cents: i64,

    #[serde(default)]
    pub category_id: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,
}

impl OrderLine {
    /// A plain line without addons, category or tags.
    pub fn new(quantity: u32, unit_price_cents: i64) -> Self {
        OrderLine {
            quantity,
            unit_price_cents,
            addons_cents: 0,
            category_id: None,
            tags: Vec::new(),
        }
    }

    /// `(unit price + addons) × quantity`.
    pub fn base(&self) -> Money {
        Money::from_cents(self.unit_price_cents + self.addons_cents)
            .multiply_quantity(i64::from(self.quantity))
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// The buyer as far as tax is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    #[serde(default)]
    pub tax_id: Option<String>,
}

impl Customer {
    pub fn with_tax_id(tax_id: impl Into<String>) -> Self {
        Customer {
            tax_id: Some(tax_id.into()),
        }
    }

    /// The tax ID trimmed, or `None` when blank.
    pub fn normalized_tax_id(&self) -> Option<&str> {
        self.tax_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// Where the order is served or delivered.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Locality {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
}

/// Everything the calculator needs about one closed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OrderInput {
    /// Defaults to the profile currency when absent.
    #[serde(default)]
    pub currency: Option<String>,

    /// e.g. "dine_in", "takeaway", "delivery".
    pub order_type: String,

    pub lines: Vec<OrderLine>,

    #[serde(default)]
    pub customer: Customer,

    #[serde(default)]
    pub locality: Locality,

    #[serde(default)]
    pub delivery_fee_cents: i64,
}

impl OrderInput {
    pub fn new(order_type: impl Into<String>, lines: Vec<OrderLine>) -> Self {
        OrderInput {
            currency: None,
            order_type: order_type.into(),
            lines,
            customer: Customer::default(),
            locality: Locality::default(),
            delivery_fee_cents: 0,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tax_rate_from_bps() {
        let rate = TaxRate::from_bps(1200);
        assert_eq!(rate.bps(), 1200);
        assert!(!rate.is_zero());
        assert!(TaxRate::default().is_zero());
    }

    #[test]
    fn test_rule_tax_rate_bounds() {
        assert_eq!(TaxRateRule::all("std", "", 1200).tax_rate().unwrap().bps(), 1200);
        assert!(matches!(
            TaxRateRule::all("bad", "", -1).tax_rate(),
            Err(ConfigurationError::NegativeBps { .. })
        ));
        assert_eq!(
            TaxRateRule::all("excise", "", 15_000).tax_rate().unwrap().bps(),
            15_000
        );
    }

    #[test]
    fn test_line_base_includes_addons_per_unit() {
        let mut line = OrderLine::new(3, 1000);
        line.addons_cents = 150;
        assert_eq!(line.base().cents(), 3450);
    }

    #[test]
    fn test_customer_tax_id_is_trimmed() {
        assert_eq!(Customer::with_tax_id("  123-456 ").normalized_tax_id(), Some("123-456"));
        assert_eq!(Customer::with_tax_id("   ").normalized_tax_id(), None);
        assert_eq!(Customer::default().normalized_tax_id(), None);
    }

    #[test]
    fn test_surcharge_order_type_filter() {
        let mut svc = SurchargeRule {
            code: "svc".to_string(),
            label: "Service".to_string(),
            percent_bps: 1000,
            apply_when_order_type_in: vec![],
            taxable: false,
            tax_code: None,
        };
        assert!(svc.applies_to_order_type("takeaway"));

        svc.apply_when_order_type_in = vec!["dine_in".to_string()];
        assert!(svc.applies_to_order_type("dine_in"));
        assert!(!svc.applies_to_order_type("takeaway"));
    }

    #[test]
    fn test_profile_document_shape() {
        let json = r#"{
            "country": "PH",
            "currency": "PHP",
            "pricesIncludeTax": true,
            "rounding": "HalfEven",
            "rates": [
                { "code": "std", "label": "VAT", "rateBps": 1200, "appliesTo": "all" },
                { "code": "zero", "rateBps": 0,
                  "appliesTo": { "filtered": { "itemCategoryIn": ["rice"] } } }
            ],
            "surcharges": [
                { "code": "svc", "percentBps": 1000, "applyWhenOrderTypeIn": ["dine_in"],
                  "taxable": true, "taxCode": "std" }
            ],
            "delivery": { "mode": "AsLine", "taxable": true, "taxCode": "std" },
            "jurisdictions": [
                { "code": "MKT", "match": { "city": "Makati" }, "roundingOverride": "HalfUp" }
            ],
            "b2bConfig": {
                "taxExemptWithTaxId": true,
                "invoiceNumbering": { "enabled": true, "prefix": "INV-", "padding": 6,
                                      "resetPolicy": "yearly" }
            }
        }"#;

        let profile: TaxProfile = serde_json::from_str(json).unwrap();
        assert!(profile.prices_include_tax);
        assert_eq!(profile.rounding, RoundingMode::HalfEven);
        assert_eq!(profile.rates[0].applies_to, RateFilter::All);
        assert!(matches!(&profile.rates[1].applies_to,
            RateFilter::Filtered(c) if c.item_category_in == vec!["rice".to_string()]));
        assert_eq!(
            profile.delivery,
            DeliveryMode::AsLine {
                taxable: true,
                tax_code: Some("std".to_string())
            }
        );
        assert_eq!(profile.jurisdictions[0].matcher.city.as_deref(), Some("Makati"));
        assert_eq!(profile.jurisdictions[0].rounding_override, Some(RoundingMode::HalfUp));

        let numbering = profile.active_numbering().unwrap();
        assert_eq!(numbering.reset_policy, ResetPolicy::Yearly);
        assert_eq!(numbering.padding, 6);

        let back = serde_json::to_string(&profile).unwrap();
        let again: TaxProfile = serde_json::from_str(&back).unwrap();
        assert_eq!(again, profile);
    }

    #[test]
    fn test_disabled_numbering_is_not_active() {
        let mut profile = TaxProfile::new("PH", "PHP");
        profile.b2b_config.invoice_numbering = Some(InvoiceNumberingConfig::default());
        assert!(profile.active_numbering().is_none());
    }
}
