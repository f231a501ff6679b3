//! # Seed Profile Generator
//!
//! Stores and activates a sample restaurant tax profile, then closes one
//! demo order and prints its snapshot.
//!
//! ## Usage
//! ```bash
//! # Default config (levy.toml) and default tenant
//! cargo run -p levy-db --bin seed
//!
//! # Specify database path and tenant
//! cargo run -p levy-db --bin seed -- --db ./data/levy.db --tenant tenant-a
//!
//! # More logging
//! RUST_LOG=levy_db=debug cargo run -p levy-db --bin seed
//! ```
//!
//! ## Sample Profile (PH, PHP, exclusive pricing)
//! - `basic`: 0% on the `grocery` category (zero-rated)
//! - `std`: 12% VAT on everything else
//! - `svc`: 10% dine-in service charge, taxed at `std`
//! - Delivery billed as a line, taxed at `std`
//! - Makati City override: 5% local service charge instead of 10%
//! - B2B invoice numbers `INV-000001`, reset yearly

use std::env;
use std::path::PathBuf;

use chrono::Utc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use levy_core::{
    Customer, DeliveryMode, InvoiceNumberingConfig, JurisdictionMatch, JurisdictionRule, Locality,
    OrderInput, OrderLine, RateConditions, ResetPolicy, RoundingMode, SurchargeRule, TaxProfile,
    TaxRateRule,
};
use levy_db::{Database, EngineConfig};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut db_path: Option<PathBuf> = None;
    let mut tenant: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--tenant" | "-t" => {
                if i + 1 < args.len() {
                    tenant = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Levy Seed Profile Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>  levy.toml to load (default: platform config dir)");
                println!("  -d, --db <PATH>      Database file path (overrides config)");
                println!("  -t, --tenant <ID>    Tenant to seed (default: [tenant] default_id)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = EngineConfig::load(config_path)?;
    if let Some(path) = db_path {
        config.database.path = Some(path);
    }
    let tenant = tenant.unwrap_or_else(|| config.default_tenant_id().to_string());

    println!("🌱 Levy Seed Profile Generator");
    println!("==============================");
    println!("Database: {}", config.database_path().display());
    println!("Tenant:   {}", tenant);
    println!();

    if let Some(parent) = config.database_path().parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Database::new(config.db_config()).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let stored = db.profiles().create_version(&tenant, &sample_profile()).await?;
    db.profiles().activate(&tenant, &stored.id).await?;
    println!("✓ Stored and activated profile v{} ({})", stored.version, stored.id);

    let order_id = format!("demo-{}", Uuid::new_v4());
    let closed = db
        .order_closer(config.retry_policy())
        .close_order(&tenant, &order_id, &demo_order(), Utc::now())
        .await?;

    println!("✓ Closed demo order {}", order_id);
    if let Some(number) = &closed.invoice_number {
        println!("  Invoice number: {}", number);
    }
    println!();
    println!("{}", serde_json::to_string_pretty(&closed.snapshot)?);

    db.close().await;
    Ok(())
}

fn sample_profile() -> TaxProfile {
    let mut profile = TaxProfile::new("PH", "PHP");
    profile.rounding = RoundingMode::HalfUp;

    profile.rates = vec![
        TaxRateRule::filtered(
            "basic",
            "Zero-rated groceries",
            0,
            RateConditions {
                item_category_in: vec!["grocery".to_string()],
                ..Default::default()
            },
        ),
        TaxRateRule::all("std", "VAT 12%", 1200),
    ];

    let service_charge = |percent_bps| SurchargeRule {
        code: "svc".to_string(),
        label: "Service charge".to_string(),
        percent_bps,
        apply_when_order_type_in: vec!["dine_in".to_string()],
        taxable: true,
        tax_code: Some("std".to_string()),
    };
    profile.surcharges = vec![service_charge(1000)];

    profile.delivery = DeliveryMode::AsLine {
        taxable: true,
        tax_code: Some("std".to_string()),
    };

    let mut makati = JurisdictionRule::new(
        "ph-makati",
        JurisdictionMatch {
            country: Some("PH".to_string()),
            city: Some("Makati".to_string()),
            ..Default::default()
        },
    );
    makati.surcharges_override = Some(vec![service_charge(500)]);
    profile.jurisdictions.push(makati);

    profile.b2b_config.invoice_numbering = Some(InvoiceNumberingConfig {
        enabled: true,
        series: None,
        prefix: Some("INV-".to_string()),
        suffix: None,
        padding: 6,
        reset_policy: ResetPolicy::Yearly,
    });

    profile
}

fn demo_order() -> OrderInput {
    let mut adobo = OrderLine::new(2, 32_500);
    adobo.addons_cents = 4_500;
    adobo.category_id = Some("mains".to_string());

    let mut rice = OrderLine::new(1, 8_000);
    rice.category_id = Some("grocery".to_string());

    let mut order = OrderInput::new("dine_in", vec![adobo, rice]);
    order.customer = Customer::with_tax_id("123-456-789-000");
    order.locality = Locality {
        country: Some("PH".to_string()),
        city: Some("Makati".to_string()),
        ..Default::default()
    };
    order
}
