//! # Line Classifier
//!
//! Maps each order line to the rate bucket it is taxed in.
//!
//! ## First Match Wins
//! ```text
//! line: { category: "beer", tags: ["alcohol"] }, order type: "dine_in"
//!
//!   rates[0] "alcohol"  filtered: itemTagIn ["alcohol"]        ◄── match, stop
//!   rates[1] "std"      all
//!
//!   rate 0 bps  → ZeroRated
//!   rate > 0    → TaxedAt(rule)
//!   no rule     → Unclassified (reported as zero-rated, never exempt)
//! ```

use crate::money::Money;
use crate::types::{OrderLine, RateConditions, RateFilter, TaxRateRule};

/// Where a line's base is accumulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket<'a> {
    /// Taxed at the matched rule's non-zero rate.
    TaxedAt(&'a TaxRateRule),
    /// Matched a rule whose rate is 0 bps.
    ZeroRated,
    /// No rule matched. Treated as zero-rated by the snapshot.
    Unclassified,
}

impl Bucket<'_> {
    /// Code of the rate bucket, if the line is taxed.
    pub fn code(&self) -> Option<&str> {
        match self {
            Bucket::TaxedAt(rule) => Some(rule.code.as_str()),
            Bucket::ZeroRated | Bucket::Unclassified => None,
        }
    }
}

/// Result of classifying one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification<'a> {
    pub bucket: Bucket<'a>,
    /// `(unit price + addons) × quantity`.
    pub base: Money,
}

impl RateConditions {
    /// True when `line` in an order of `order_type` satisfies every condition.
    pub fn matches(&self, line: &OrderLine, order_type: &str) -> bool {
        let order_type_ok =
            self.order_type_in.is_empty() || self.order_type_in.iter().any(|t| t == order_type);

        let category_ok = self.item_category_in.is_empty()
            || line
                .category_id
                .as_ref()
                .is_some_and(|category| self.item_category_in.contains(category));

        let tag_ok =
            self.item_tag_in.is_empty() || self.item_tag_in.iter().any(|tag| line.has_tag(tag));

        let not_excluded = !self.exclude_item_tag_in.iter().any(|tag| line.has_tag(tag));

        order_type_ok && category_ok && tag_ok && not_excluded
    }
}

impl TaxRateRule {
    /// True when this rule applies to `line`.
    pub fn matches(&self, line: &OrderLine, order_type: &str) -> bool {
        match &self.applies_to {
            RateFilter::All => true,
            RateFilter::Filtered(conditions) => conditions.matches(line, order_type),
        }
    }
}

/// Classifies one line against the ordered rate list.
///
/// ## Example
/// ```rust
/// use levy_core::classifier::{classify_line, Bucket};
/// use levy_core::types::{OrderLine, TaxRateRule};
///
/// let rates = vec![TaxRateRule::all("std", "Standard", 1200)];
/// let result = classify_line(&OrderLine::new(2, 2500), "dine_in", &rates);
///
/// assert_eq!(result.bucket.code(), Some("std"));
/// assert_eq!(result.base.cents(), 5000);
/// ```
pub fn classify_line<'a>(
    line: &OrderLine,
    order_type: &str,
    rates: &'a [TaxRateRule],
) -> Classification<'a> {
    let bucket = match rates.iter().find(|rule| rule.matches(line, order_type)) {
        Some(rule) if rule.rate_bps == 0 => Bucket::ZeroRated,
        Some(rule) => Bucket::TaxedAt(rule),
        None => Bucket::Unclassified,
    };

    Classification {
        bucket,
        base: line.base(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(category: Option<&str>, tags: &[&str]) -> OrderLine {
        OrderLine {
            quantity: 1,
            unit_price_cents: 1000,
            addons_cents: 0,
            category_id: category.map(String::from),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn restaurant_rates() -> Vec<TaxRateRule> {
        vec![
            TaxRateRule::filtered(
                "alcohol",
                "Alcohol",
                2000,
                RateConditions {
                    item_tag_in: strings(&["alcohol"]),
                    ..Default::default()
                },
            ),
            TaxRateRule::filtered(
                "takeaway_food",
                "Takeaway food",
                0,
                RateConditions {
                    item_category_in: strings(&["food"]),
                    exclude_item_tag_in: strings(&["hot"]),
                    order_type_in: strings(&["takeaway"]),
                    ..Default::default()
                },
            ),
            TaxRateRule::filtered(
                "std",
                "Standard",
                1200,
                RateConditions {
                    item_category_in: strings(&["food", "drinks"]),
                    ..Default::default()
                },
            ),
        ]
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let rates = restaurant_rates();
        // Drinks tagged alcohol hit the alcohol rule before "std".
        let result = classify_line(&line(Some("drinks"), &["alcohol"]), "dine_in", &rates);
        assert_eq!(result.bucket.code(), Some("alcohol"));
    }

    #[test]
    fn test_zero_rate_match_is_zero_rated() {
        let rates = restaurant_rates();
        let result = classify_line(&line(Some("food"), &[]), "takeaway", &rates);
        assert_eq!(result.bucket, Bucket::ZeroRated);
    }

    #[test]
    fn test_excluded_tag_falls_through_to_next_rule() {
        let rates = restaurant_rates();
        let result = classify_line(&line(Some("food"), &["hot"]), "takeaway", &rates);
        assert_eq!(result.bucket.code(), Some("std"));
    }

    #[test]
    fn test_order_type_filter() {
        let rates = restaurant_rates();
        let result = classify_line(&line(Some("food"), &[]), "dine_in", &rates);
        assert_eq!(result.bucket.code(), Some("std"));
    }

    #[test]
    fn test_no_match_is_unclassified() {
        let rates = restaurant_rates();
        assert_eq!(
            classify_line(&line(Some("merch"), &[]), "dine_in", &rates).bucket,
            Bucket::Unclassified
        );
        // A category filter never matches a line without a category.
        assert_eq!(
            classify_line(&line(None, &[]), "dine_in", &rates).bucket,
            Bucket::Unclassified
        );
        assert_eq!(
            classify_line(&line(Some("food"), &[]), "dine_in", &[]).bucket,
            Bucket::Unclassified
        );
    }

    #[test]
    fn test_all_rule_matches_everything() {
        let rates = vec![TaxRateRule::all("std", "Standard", 1200)];
        let result = classify_line(&line(None, &[]), "", &rates);
        assert_eq!(result.bucket.code(), Some("std"));
    }

    #[test]
    fn test_base_multiplies_addons_by_quantity() {
        let mut l = line(None, &[]);
        l.quantity = 2;
        l.unit_price_cents = 2500;
        l.addons_cents = 300;
        let result = classify_line(&l, "dine_in", &[]);
        assert_eq!(result.base.cents(), 5600);
    }
}
