//! Concurrent invoice issuance against one file-backed database.
//!
//! Each test opens real SQLite files in a temp directory so that separate
//! connections (and separate pools) contend for the same counter row.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use levy_core::{
    Customer, InvoiceNumberingConfig, OrderInput, OrderLine, ResetPolicy, TaxProfile, TaxRateRule,
};
use levy_db::{Database, DbConfig, RetryPolicy};

const TENANT: &str = "tenant-concurrency";
const TASKS: u64 = 25;

fn numbering() -> InvoiceNumberingConfig {
    InvoiceNumberingConfig {
        enabled: true,
        series: Some("B".to_string()),
        prefix: Some("INV-".to_string()),
        suffix: None,
        padding: 6,
        reset_policy: ResetPolicy::Yearly,
    }
}

fn retry_policy() -> RetryPolicy {
    RetryPolicy {
        max_conflict_retries: 10,
        initial_backoff: Duration::from_millis(2),
        max_backoff: Duration::from_millis(50),
    }
}

async fn open(path: &Path, migrate: bool) -> Database {
    Database::new(
        DbConfig::new(path)
            .max_connections(8)
            .busy_timeout(Duration::from_secs(10))
            .run_migrations(migrate),
    )
    .await
    .unwrap()
}

fn temp_db() -> (TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("levy.db");
    (dir, path)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_issues_are_gap_free_and_distinct() {
    let (_dir, path) = temp_db();
    let db = open(&path, true).await;
    let sequencer = db.sequencer(retry_policy());
    let now = Utc.with_ymd_and_hms(2025, 4, 1, 12, 0, 0).unwrap();

    let mut handles = Vec::new();
    for i in 0..TASKS {
        let sequencer = sequencer.clone();
        handles.push(tokio::spawn(async move {
            sequencer
                .issue_for_order(TENANT, &format!("order-{}", i), &numbering(), now)
                .await
        }));
    }

    let mut values = Vec::new();
    let mut numbers = HashSet::new();
    for handle in handles {
        let issued = handle.await.unwrap().unwrap();
        assert_eq!(issued.period_key.as_str(), "2025");
        values.push(issued.value);
        numbers.insert(issued.number);
    }

    values.sort_unstable();
    assert_eq!(values, (1..=TASKS).collect::<Vec<_>>());
    assert_eq!(numbers.len(), TASKS as usize);
    assert!(numbers.contains("B-INV-000001"));
    assert!(numbers.contains(&format!("B-INV-{:06}", TASKS)));

    let counter = db.invoices().counter(TENANT, "B").await.unwrap().unwrap();
    assert_eq!(counter.current_value, TASKS);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn separate_pools_share_one_counter() {
    let (_dir, path) = temp_db();
    let first = open(&path, true).await;
    let second = open(&path, false).await;
    let now = Utc.with_ymd_and_hms(2025, 4, 1, 12, 0, 0).unwrap();

    let mut handles = Vec::new();
    for i in 0..TASKS {
        let db = if i % 2 == 0 { first.clone() } else { second.clone() };
        handles.push(tokio::spawn(async move {
            db.sequencer(retry_policy())
                .issue(TENANT, &numbering(), now)
                .await
        }));
    }

    let mut values = Vec::new();
    for handle in handles {
        values.push(handle.await.unwrap().unwrap().value);
    }

    values.sort_unstable();
    assert_eq!(values, (1..=TASKS).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_closes_of_one_order_share_one_number() {
    let (_dir, path) = temp_db();
    let db = open(&path, true).await;

    let mut profile = TaxProfile::new("PH", "PHP");
    profile.rates.push(TaxRateRule::all("std", "VAT", 1200));
    profile.b2b_config.invoice_numbering = Some(numbering());
    let stored = db.profiles().create_version(TENANT, &profile).await.unwrap();
    db.profiles().activate(TENANT, &stored.id).await.unwrap();

    let mut order = OrderInput::new("takeaway", vec![OrderLine::new(3, 1500)]);
    order.customer = Customer::with_tax_id("TIN-42");
    let now = Utc.with_ymd_and_hms(2025, 4, 1, 12, 0, 0).unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let closer = db.order_closer(retry_policy());
        let order = order.clone();
        handles.push(tokio::spawn(async move {
            closer.close_order(TENANT, "order-shared", &order, now).await
        }));
    }

    let mut numbers = HashSet::new();
    for handle in handles {
        let closed = handle.await.unwrap().unwrap();
        assert_eq!(closed.snapshot.totals.grand_total_cents, 5040);
        numbers.insert(closed.invoice_number.unwrap());
    }

    assert_eq!(numbers.len(), 1);
    assert!(numbers.contains("B-INV-000001"));

    let counter = db.invoices().counter(TENANT, "B").await.unwrap().unwrap();
    assert_eq!(counter.current_value, 1);
}
