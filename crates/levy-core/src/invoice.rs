//! # Invoice Numbering
//!
//! The pure half of B2B invoice numbering: reset windows, counter
//! transitions and number formatting. The atomic read-modify-write of the
//! stored counter lives in `levy-db`.
//!
//! ## Counter State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Active(current_value, period_key)                                      │
//! │                                                                         │
//! │  issue(now):                                                            │
//! │    new_key = PeriodKey::for_date(reset_policy, now)                     │
//! │    new_key != period_key ──► current_value = 0                          │
//! │    current_value += 1, period_key = new_key                             │
//! │                                                                         │
//! │  yearly:  2024-12-31 → ("2024", 57)                                     │
//! │           2025-01-01 → ("2025", 1)   ◄── reset                          │
//! │           2025-01-01 → ("2025", 2)                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::{InvoiceNumberingConfig, OrderInput, ResetPolicy, TaxProfile};

// =============================================================================
// Period Key
// =============================================================================

/// Name of the reset window a counter value belongs to.
///
/// `""` for never, `"2025"` yearly, `"2025-01"` monthly, `"2025-01-31"` daily.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PeriodKey(String);

impl PeriodKey {
    /// The window containing the calendar date `date`.
    pub fn for_naive_date(policy: ResetPolicy, date: NaiveDate) -> Self {
        let key = match policy {
            ResetPolicy::Never => String::new(),
            ResetPolicy::Yearly => format!("{:04}", date.year()),
            ResetPolicy::Monthly => format!("{:04}-{:02}", date.year(), date.month()),
            ResetPolicy::Daily => format!("{:04}-{:02}-{:02}", date.year(), date.month(), date.day()),
        };
        PeriodKey(key)
    }

    /// The window containing `now`, using the UTC calendar date.
    pub fn for_date(policy: ResetPolicy, now: DateTime<Utc>) -> Self {
        Self::for_naive_date(policy, now.date_naive())
    }

    /// Wraps a key read back from storage.
    pub fn from_stored(key: impl Into<String>) -> Self {
        PeriodKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Counter
// =============================================================================

/// Stored state of one tenant/series counter.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceCounter {
    /// Last value issued in `period_key`; 0 before the first issue.
    pub current_value: u64,
    pub period_key: PeriodKey,
}

impl InvoiceCounter {
    /// The counter state after issuing one number in `period`.
    ///
    /// ## Example
    /// ```rust
    /// use levy_core::invoice::{InvoiceCounter, PeriodKey};
    ///
    /// let counter = InvoiceCounter { current_value: 41, period_key: PeriodKey::from_stored("2024") };
    ///
    /// assert_eq!(counter.advance(PeriodKey::from_stored("2024")).current_value, 42);
    /// assert_eq!(counter.advance(PeriodKey::from_stored("2025")).current_value, 1);
    /// ```
    pub fn advance(&self, period: PeriodKey) -> InvoiceCounter {
        let current_value = if period == self.period_key {
            self.current_value + 1
        } else {
            1
        };
        InvoiceCounter {
            current_value,
            period_key: period,
        }
    }

    /// [`advance`](Self::advance) using the window `now` falls into.
    pub fn issue(&self, policy: ResetPolicy, now: DateTime<Utc>) -> InvoiceCounter {
        self.advance(PeriodKey::for_date(policy, now))
    }
}

// =============================================================================
// Formatting
// =============================================================================

impl InvoiceNumberingConfig {
    /// Counter namespace; the empty string when no series is configured.
    pub fn series_key(&self) -> &str {
        self.series.as_deref().map(str::trim).unwrap_or("")
    }

    /// Renders `[series-]prefix + zero-padded value + suffix`.
    ///
    /// ## Example
    /// ```rust
    /// use levy_core::types::InvoiceNumberingConfig;
    ///
    /// let numbering = InvoiceNumberingConfig {
    ///     enabled: true,
    ///     series: Some("B".into()),
    ///     prefix: Some("INV-".into()),
    ///     suffix: Some("/25".into()),
    ///     padding: 6,
    ///     ..Default::default()
    /// };
    /// assert_eq!(numbering.format_number(42), "B-INV-000042/25");
    /// ```
    pub fn format_number(&self, value: u64) -> String {
        let series = self.series_key();
        let mut number = String::new();
        if !series.is_empty() {
            number.push_str(series);
            number.push('-');
        }
        number.push_str(self.prefix.as_deref().unwrap_or(""));
        number.push_str(&format!("{:0width$}", value, width = usize::from(self.padding)));
        number.push_str(self.suffix.as_deref().unwrap_or(""));
        number
    }
}

/// Numbering settings to use for `input`, when it should get an invoice number.
///
/// Requires numbering enabled on the profile and a non-blank customer tax ID.
pub fn numbering_for_order<'a>(
    profile: &'a TaxProfile,
    input: &OrderInput,
) -> Option<&'a InvoiceNumberingConfig> {
    input.customer.normalized_tax_id()?;
    profile.active_numbering()
}
