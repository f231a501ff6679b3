//! # Jurisdiction Resolution
//!
//! Picks at most one [`JurisdictionRule`] for an order's locality and merges
//! its overrides over the base profile into an [`EffectiveConfig`].
//!
//! ## Selection
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  locality: { country: "US", state: "CA", city: "SF", zip: "94107" }     │
//! │                                                                         │
//! │  jurisdictions (array order)      matches?   tier                       │
//! │  ─────────────────────────────    ────────   ─────────                  │
//! │  0  US     { country: "US" }         yes      Country                   │
//! │  1  CA     { state: "CA" }           yes      State                     │
//! │  2  SOMA   { zipPrefix: "941" }      yes      ZipPrefix   ◄── selected  │
//! │  3  SOMA2  { zipPrefix: "9410" }     yes      ZipPrefix   (later, tie)  │
//! │  4  NY     { state: "NY" }           no                                 │
//! │                                                                         │
//! │  Tier order: ZipPrefix > City > State > Country > Any                   │
//! │  Same tier: earliest in array order wins                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Overrides Replace
//! `ratesOverride` swaps the whole rate list; nothing is appended or merged
//! by code. The same holds for surcharges, delivery, pricing mode and rounding.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ConfigurationError;
use crate::money::RoundingMode;
use crate::types::{
    DeliveryMode, JurisdictionMatch, JurisdictionRule, Locality, SurchargeRule,
    TaxProfile, TaxRateRule,
};

// =============================================================================
// Effective Configuration
// =============================================================================

/// The rule set that actually applies to one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveConfig {
    pub rates: Vec<TaxRateRule>,
    pub surcharges: Vec<SurchargeRule>,
    pub delivery: DeliveryMode,
    pub prices_include_tax: bool,
    pub rounding: RoundingMode,
    /// Code of the applied jurisdiction rule; empty when none matched.
    pub jurisdiction_code: String,
}

impl EffectiveConfig {
    /// The base profile with no jurisdiction applied.
    pub fn base(profile: &TaxProfile) -> Self {
        EffectiveConfig {
            rates: profile.rates.clone(),
            surcharges: profile.surcharges.clone(),
            delivery: profile.delivery.clone(),
            prices_include_tax: profile.prices_include_tax,
            rounding: profile.rounding,
            jurisdiction_code: String::new(),
        }
    }

    /// The base profile with `rule`'s overrides swapped in.
    pub fn with_override(profile: &TaxProfile, rule: &JurisdictionRule) -> Self {
        EffectiveConfig {
            rates: rule
                .rates_override
                .clone()
                .unwrap_or_else(|| profile.rates.clone()),
            surcharges: rule
                .surcharges_override
                .clone()
                .unwrap_or_else(|| profile.surcharges.clone()),
            delivery: rule
                .delivery_override
                .clone()
                .unwrap_or_else(|| profile.delivery.clone()),
            prices_include_tax: rule
                .prices_include_tax_override
                .unwrap_or(profile.prices_include_tax),
            rounding: rule.rounding_override.unwrap_or(profile.rounding),
            jurisdiction_code: rule.code.clone(),
        }
    }

    /// Looks up a rate by code.
    pub fn rate_for_code(&self, code: &str) -> Option<&TaxRateRule> {
        self.rates.iter().find(|rate| rate.code == code)
    }

    /// Checks that this configuration can produce a correct snapshot.
    ///
    /// ## Rules
    /// - Rate and surcharge codes are non-empty and unique within their list
    /// - Rate and surcharge basis points are within 0..=10000
    /// - A taxable surcharge or delivery carries a tax code
    /// - Every tax code present resolves to a rate in `self.rates`
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.validate_rules()
            .map_err(|err| err.in_jurisdiction(&self.jurisdiction_code))
    }

    fn validate_rules(&self) -> Result<(), ConfigurationError> {
        let mut seen = HashSet::new();
        for rate in &self.rates {
            check_code("rate", &rate.code, &mut seen)?;
            rate.tax_rate()?;
        }

        let mut seen = HashSet::new();
        for surcharge in &self.surcharges {
            check_code("surcharge", &surcharge.code, &mut seen)?;
            surcharge.percent()?;
            self.check_tax_code(
                || format!("surcharge '{}'", surcharge.code),
                surcharge.taxable,
                surcharge.tax_code.as_deref(),
            )?;
        }

        if let DeliveryMode::AsLine { taxable, tax_code } = &self.delivery {
            self.check_tax_code(|| "delivery".to_string(), *taxable, tax_code.as_deref())?;
        }

        Ok(())
    }

    fn check_tax_code(
        &self,
        owner: impl Fn() -> String,
        taxable: bool,
        tax_code: Option<&str>,
    ) -> Result<(), ConfigurationError> {
        match tax_code {
            Some(code) if self.rate_for_code(code).is_some() => Ok(()),
            Some(code) => Err(ConfigurationError::DanglingTaxCode {
                owner: owner(),
                tax_code: code.to_string(),
            }),
            None if taxable => Err(ConfigurationError::MissingTaxCode { owner: owner() }),
            None => Ok(()),
        }
    }
}

fn check_code<'a>(
    kind: &str,
    code: &'a str,
    seen: &mut HashSet<&'a str>,
) -> Result<(), ConfigurationError> {
    if code.trim().is_empty() {
        return Err(ConfigurationError::EmptyCode {
            kind: kind.to_string(),
        });
    }
    if !seen.insert(code) {
        return Err(ConfigurationError::DuplicateCode {
            kind: kind.to_string(),
            code: code.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Matching
// =============================================================================

/// How specific a jurisdiction match is. Higher wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Specificity {
    /// Empty match: a catch-all below every other tier.
    Any,
    Country,
    State,
    City,
    ZipPrefix,
}

/// Normalized non-blank value of an optional match field.
fn field(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_lowercase)
}

impl JurisdictionMatch {
    /// The tier of the most specific field this match constrains.
    pub fn specificity(&self) -> Specificity {
        if field(&self.zip_prefix).is_some() {
            Specificity::ZipPrefix
        } else if field(&self.city).is_some() {
            Specificity::City
        } else if field(&self.state).is_some() {
            Specificity::State
        } else if field(&self.country).is_some() {
            Specificity::Country
        } else {
            Specificity::Any
        }
    }

    /// True when every constrained field agrees with `locality`.
    ///
    /// Comparison is case-insensitive; `zipPrefix` is a string prefix test.
    pub fn matches(&self, locality: &Locality) -> bool {
        let equals = |wanted: &Option<String>, actual: &Option<String>| match field(wanted) {
            None => true,
            Some(wanted) => field(actual).is_some_and(|actual| actual == wanted),
        };

        let zip_ok = match field(&self.zip_prefix) {
            None => true,
            Some(prefix) => field(&locality.zip).is_some_and(|zip| zip.starts_with(&prefix)),
        };

        zip_ok
            && equals(&self.country, &locality.country)
            && equals(&self.state, &locality.state)
            && equals(&self.city, &locality.city)
    }
}

/// The jurisdiction rule that applies to `locality`, if any.
///
/// Highest [`Specificity`] wins; within a tier the earliest rule wins.
pub fn select_jurisdiction<'a>(
    rules: &'a [JurisdictionRule],
    locality: &Locality,
) -> Option<&'a JurisdictionRule> {
    let mut best: Option<(Specificity, &JurisdictionRule)> = None;
    for rule in rules.iter().filter(|rule| rule.matcher.matches(locality)) {
        let tier = rule.matcher.specificity();
        match best {
            Some((best_tier, _)) if best_tier >= tier => {}
            _ => best = Some((tier, rule)),
        }
    }
    best.map(|(_, rule)| rule)
}

// =============================================================================
// Resolution
// =============================================================================

/// Produces the validated effective configuration for an order's locality.
///
/// ## Example
/// ```rust
/// use levy_core::jurisdiction::resolve_effective_config;
/// use levy_core::types::{JurisdictionMatch, JurisdictionRule, Locality, TaxProfile, TaxRateRule};
///
/// let mut profile = TaxProfile::new("US", "USD");
/// profile.rates.push(TaxRateRule::all("std", "State", 725));
///
/// let mut sf = JurisdictionRule::new("SF", JurisdictionMatch {
///     zip_prefix: Some("941".into()),
///     ..Default::default()
/// });
/// sf.rates_override = Some(vec![TaxRateRule::all("std", "SF", 863)]);
/// profile.jurisdictions.push(sf);
///
/// let locality = Locality { zip: Some("94107".into()), ..Default::default() };
/// let effective = resolve_effective_config(&profile, &locality).unwrap();
/// assert_eq!(effective.jurisdiction_code, "SF");
/// assert_eq!(effective.rates[0].rate_bps, 863);
/// ```
pub fn resolve_effective_config(
    profile: &TaxProfile,
    locality: &Locality,
) -> Result<EffectiveConfig, ConfigurationError> {
    let effective = match select_jurisdiction(&profile.jurisdictions, locality) {
        Some(rule) => EffectiveConfig::with_override(profile, rule),
        None => EffectiveConfig::base(profile),
    };
    effective.validate()?;
    Ok(effective)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RateConditions;

    fn matcher(country: Option<&str>, state: Option<&str>, city: Option<&str>, zip: Option<&str>) -> JurisdictionMatch {
        JurisdictionMatch {
            country: country.map(String::from),
            state: state.map(String::from),
            city: city.map(String::from),
            zip_prefix: zip.map(String::from),
        }
    }

    fn locality(country: &str, state: &str, city: &str, zip: &str) -> Locality {
        Locality {
            country: Some(country.to_string()),
            state: Some(state.to_string()),
            city: Some(city.to_string()),
            zip: Some(zip.to_string()),
        }
    }

    fn rule_with_rate(code: &str, m: JurisdictionMatch, bps: i32) -> JurisdictionRule {
        let mut rule = JurisdictionRule::new(code, m);
        rule.rates_override = Some(vec![TaxRateRule::all("std", code, bps)]);
        rule
    }

    fn profile() -> TaxProfile {
        let mut profile = TaxProfile::new("US", "USD");
        profile.rates.push(TaxRateRule::all("std", "Base", 500));
        profile
    }

    #[test]
    fn test_no_match_uses_base_profile() {
        let mut profile = profile();
        profile
            .jurisdictions
            .push(rule_with_rate("NY", matcher(None, Some("NY"), None, None), 888));

        let effective =
            resolve_effective_config(&profile, &locality("US", "CA", "SF", "94107")).unwrap();
        assert_eq!(effective.jurisdiction_code, "");
        assert_eq!(effective.rates, profile.rates);
    }

    #[test]
    fn test_zip_prefix_beats_country() {
        let mut profile = profile();
        profile
            .jurisdictions
            .push(rule_with_rate("US", matcher(Some("US"), None, None, None), 600));
        profile
            .jurisdictions
            .push(rule_with_rate("SOMA", matcher(None, None, None, Some("941")), 863));

        let effective =
            resolve_effective_config(&profile, &locality("US", "CA", "SF", "94107")).unwrap();
        assert_eq!(effective.jurisdiction_code, "SOMA");
        assert_eq!(effective.rates[0].rate_bps, 863);
    }

    #[test]
    fn test_tier_order() {
        let loc = locality("US", "CA", "SF", "94107");
        let mut profile = profile();
        profile
            .jurisdictions
            .push(rule_with_rate("COUNTRY", matcher(Some("US"), None, None, None), 1));
        profile
            .jurisdictions
            .push(rule_with_rate("STATE", matcher(None, Some("CA"), None, None), 2));
        assert_eq!(select_jurisdiction(&profile.jurisdictions, &loc).unwrap().code, "STATE");

        profile
            .jurisdictions
            .push(rule_with_rate("CITY", matcher(None, None, Some("SF"), None), 3));
        assert_eq!(select_jurisdiction(&profile.jurisdictions, &loc).unwrap().code, "CITY");
    }

    #[test]
    fn test_same_tier_earliest_wins() {
        let mut profile = profile();
        profile
            .jurisdictions
            .push(rule_with_rate("FIRST", matcher(None, None, None, Some("941")), 1));
        profile
            .jurisdictions
            .push(rule_with_rate("LONGER", matcher(None, None, None, Some("9410")), 2));

        let chosen =
            select_jurisdiction(&profile.jurisdictions, &locality("US", "CA", "SF", "94107"));
        assert_eq!(chosen.unwrap().code, "FIRST");
    }

    #[test]
    fn test_all_present_fields_must_match() {
        // Zip matches but state does not.
        let m = matcher(None, Some("NY"), None, Some("941"));
        assert!(!m.matches(&locality("US", "CA", "SF", "94107")));
        assert_eq!(m.specificity(), Specificity::ZipPrefix);
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let m = matcher(Some("us"), None, Some("san francisco"), None);
        assert!(m.matches(&locality("US", "CA", "San Francisco", "94107")));
    }

    #[test]
    fn test_missing_locality_field_does_not_match() {
        let m = matcher(None, None, None, Some("941"));
        assert!(!m.matches(&Locality::default()));
    }

    #[test]
    fn test_empty_match_is_lowest_tier_catch_all() {
        let mut profile = profile();
        profile
            .jurisdictions
            .push(rule_with_rate("DEFAULT", JurisdictionMatch::default(), 100));
        profile
            .jurisdictions
            .push(rule_with_rate("US", matcher(Some("US"), None, None, None), 200));

        let loc = locality("US", "CA", "SF", "94107");
        assert_eq!(select_jurisdiction(&profile.jurisdictions, &loc).unwrap().code, "US");

        let elsewhere = locality("PH", "NCR", "Makati", "1200");
        assert_eq!(
            select_jurisdiction(&profile.jurisdictions, &elsewhere).unwrap().code,
            "DEFAULT"
        );
    }

    #[test]
    fn test_override_replaces_rates_instead_of_merging() {
        let mut profile = profile();
        profile.rates.push(TaxRateRule::filtered(
            "alcohol",
            "Alcohol",
            2000,
            RateConditions {
                item_tag_in: vec!["alcohol".to_string()],
                ..Default::default()
            },
        ));
        profile
            .jurisdictions
            .push(rule_with_rate("US", matcher(Some("US"), None, None, None), 700));

        let effective =
            resolve_effective_config(&profile, &locality("US", "CA", "SF", "94107")).unwrap();
        assert_eq!(effective.rates.len(), 1);
        assert!(effective.rate_for_code("alcohol").is_none());
        // Fields without an override keep base values.
        assert_eq!(effective.surcharges, profile.surcharges);
        assert_eq!(effective.rounding, profile.rounding);
    }

    #[test]
    fn test_scalar_overrides() {
        let mut profile = profile();
        let mut rule = JurisdictionRule::new("EU", matcher(Some("US"), None, None, None));
        rule.prices_include_tax_override = Some(true);
        rule.rounding_override = Some(RoundingMode::HalfEven);
        rule.delivery_override = Some(DeliveryMode::AsLine {
            taxable: true,
            tax_code: Some("std".to_string()),
        });
        profile.jurisdictions.push(rule);

        let effective =
            resolve_effective_config(&profile, &locality("US", "CA", "SF", "94107")).unwrap();
        assert!(effective.prices_include_tax);
        assert_eq!(effective.rounding, RoundingMode::HalfEven);
        assert!(matches!(effective.delivery, DeliveryMode::AsLine { taxable: true, .. }));
    }

    #[test]
    fn test_dangling_surcharge_tax_code_is_configuration_error() {
        let mut profile = profile();
        profile.surcharges.push(SurchargeRule {
            code: "svc".to_string(),
            label: "Service".to_string(),
            percent_bps: 1000,
            apply_when_order_type_in: vec!["dine_in".to_string()],
            taxable: true,
            tax_code: Some("vat".to_string()),
        });

        let err = resolve_effective_config(&profile, &Locality::default()).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::DanglingTaxCode {
                owner: "surcharge 'svc'".to_string(),
                tax_code: "vat".to_string(),
            }
        );
    }

    #[test]
    fn test_override_can_break_tax_code_reference() {
        let mut profile = profile();
        profile.delivery = DeliveryMode::AsLine {
            taxable: true,
            tax_code: Some("std".to_string()),
        };
        let mut rule = JurisdictionRule::new("ZERO", matcher(Some("US"), None, None, None));
        rule.rates_override = Some(vec![TaxRateRule::all("zero", "Zero", 0)]);
        profile.jurisdictions.push(rule);

        let err =
            resolve_effective_config(&profile, &locality("US", "CA", "SF", "94107")).unwrap_err();
        assert!(matches!(err, ConfigurationError::Jurisdiction { ref code, .. } if code == "ZERO"));
    }

    #[test]
    fn test_negative_override_rate_is_rejected() {
        let mut profile = profile();
        profile
            .jurisdictions
            .push(rule_with_rate("NEG", matcher(Some("US"), None, None, None), -100));

        let err =
            resolve_effective_config(&profile, &locality("US", "CA", "SF", "94107")).unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::Jurisdiction { source, .. }
                if matches!(*source, ConfigurationError::NegativeBps { bps: -100, .. })
        ));
    }

    #[test]
    fn test_taxable_without_code_and_duplicates() {
        let mut config = EffectiveConfig::base(&profile());
        config.delivery = DeliveryMode::AsLine {
            taxable: true,
            tax_code: None,
        };
        assert_eq!(
            config.validate(),
            Err(ConfigurationError::MissingTaxCode {
                owner: "delivery".to_string()
            })
        );

        let mut config = EffectiveConfig::base(&profile());
        config.rates.push(TaxRateRule::all("std", "Again", 100));
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::DuplicateCode { .. })
        ));
    }
}
