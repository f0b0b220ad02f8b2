//! # Seed Data Generator
//!
//! Populates a development database with products, stock batches,
//! promotions and loyalty accounts.
//!
//! ## Usage
//! ```bash
//! # 200 products (default)
//! cargo run -p till-db --bin seed
//!
//! # Custom amount and path
//! cargo run -p till-db --bin seed -- --count 1000 --db ./data/till.db
//! ```
//!
//! ## Generated Data
//! - Products across categories, each with a subcategory
//! - Two batches per product at `main-store`: one dated, one without expiry
//! - One category-wide and one subcategory promotion per category
//! - Loyalty accounts `customer-0001` .. `customer-0010` with varied balances
//! - `tax_rate_percent` set to 5

use chrono::{Duration, Utc};
use std::env;
use till_core::{Batch, DiscountType, LoyaltyAccount, Product, Promotion};
use till_db::{
    BatchRepository, Database, DbConfig, LoyaltyRepository, ProductRepository, PromotionRepository,
    SettingsRepository,
};
use uuid::Uuid;

const LOCATION: &str = "main-store";

/// (category, subcategory, product names)
const CATALOGUE: &[(&str, &str, &[&str])] = &[
    ("beverages", "soft-drinks", &["Cola", "Lemonade", "Ginger Ale", "Orange Soda", "Tonic"]),
    ("beverages", "juice", &["Apple Juice", "Orange Juice", "Grape Juice", "Cranberry"]),
    ("dairy", "milk", &["Whole Milk", "Skim Milk", "Oat Milk", "Almond Milk"]),
    ("dairy", "cheese", &["Cheddar", "Gouda", "Brie", "Mozzarella", "Feta"]),
    ("snacks", "chips", &["Salted Chips", "Paprika Chips", "Tortilla Chips"]),
    ("snacks", "candy", &["Chocolate Bar", "Gummy Bears", "Mints", "Toffee"]),
    ("grocery", "pasta", &["Spaghetti", "Penne", "Fusilli", "Lasagne"]),
];

const SIZES: &[(&str, i64)] = &[("Small", 0), ("Regular", 150), ("Large", 300), ("Family", 600)];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut count: usize = 200;
    let mut db_path = String::from("./till_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(200);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Till Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of products to generate (default: 200)");
                println!("  -d, --db <PATH>    Database file path (default: ./till_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Till Seed Data Generator");
    println!("===========================");
    println!("Database: {}", db_path);
    println!("Products: {}", count);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
        .fetch_one(db.pool())
        .await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let start = std::time::Instant::now();
    let mut tx = db.begin().await?;

    let mut generated = 0;
    'outer: for (line_idx, (category, subcategory, names)) in CATALOGUE.iter().enumerate() {
        for (name_idx, name) in names.iter().enumerate() {
            for (size_idx, (size, addon)) in SIZES.iter().enumerate() {
                if generated >= count {
                    break 'outer;
                }
                let seed = line_idx * 1000 + name_idx * 10 + size_idx;
                let product = generate_product(category, subcategory, name, size, *addon, seed);
                ProductRepository::insert(&mut tx, &product).await?;
                for batch in generate_batches(&product, seed) {
                    BatchRepository::insert(&mut tx, &batch).await?;
                }
                generated += 1;
            }
        }
    }
    println!("✓ Generated {} products with batches", generated);

    let mut promotions = 0;
    for (idx, (category, subcategory, _)) in CATALOGUE.iter().enumerate() {
        for promotion in generate_promotions(category, subcategory, idx) {
            PromotionRepository::insert(&mut tx, &promotion).await?;
            promotions += 1;
        }
    }
    println!("✓ Generated {} promotions", promotions);

    let now = Utc::now();
    for n in 1..=10 {
        let points = (n as i64) * 1250;
        let account = LoyaltyAccount {
            id: Uuid::new_v4().to_string(),
            customer_id: format!("customer-{:04}", n),
            points,
            tier: till_core::LoyaltyTier::Bronze,
            created_at: now,
            updated_at: now,
        };
        LoyaltyRepository::insert(&mut tx, &account).await?;
    }
    println!("✓ Generated 10 loyalty accounts");

    SettingsRepository::set(&mut tx, till_core::settings::TAX_RATE_PERCENT, "5").await?;

    tx.commit().await?;

    // Tiers from the configured thresholds.
    let mut conn = db.acquire().await?;
    let settings = till_core::EngineSettings::load(&SettingsRepository::load_all(&mut conn).await?)?;
    for n in 1..=10 {
        let customer_id = format!("customer-{:04}", n);
        if let Some(account) = LoyaltyRepository::get_by_customer(&mut conn, &customer_id).await? {
            let tier = settings.loyalty.tier_for(account.points);
            LoyaltyRepository::set_tier(&mut conn, &customer_id, tier, now).await?;
        }
    }

    println!();
    println!("✓ Seed complete in {:?}", start.elapsed());

    Ok(())
}

fn generate_product(
    category: &str,
    subcategory: &str,
    name: &str,
    size: &str,
    price_addon: i64,
    seed: usize,
) -> Product {
    let now = Utc::now();
    let code: String = name
        .chars()
        .filter(|c| c.is_alphanumeric())
        .take(4)
        .collect::<String>()
        .to_uppercase();

    // $1.49 - $9.48 plus the size addon
    let price_cents = 149 + ((seed * 37) % 800) as i64 + price_addon;
    let cost_pct = 55 + (seed % 25) as i64;

    Product {
        id: Uuid::new_v4().to_string(),
        sku: format!("{}-{:04}", code, seed),
        name: format!("{} {}", name, size),
        selling_price_cents: price_cents,
        purchase_price_cents: price_cents * cost_pct / 100,
        category_id: category.to_string(),
        subcategory_id: Some(subcategory.to_string()),
        default_location_id: LOCATION.to_string(),
        created_at: now,
        updated_at: now,
    }
}

fn generate_batches(product: &Product, seed: usize) -> Vec<Batch> {
    let now = Utc::now();
    let dated = Batch {
        id: Uuid::new_v4().to_string(),
        product_id: product.id.clone(),
        location_id: LOCATION.to_string(),
        quantity: 5 + (seed % 20) as i64,
        expiry_date: Some((now + Duration::days(10 + (seed % 90) as i64)).date_naive()),
        reference: Some("seed".to_string()),
        created_at: now - Duration::days(30),
        updated_at: now,
    };
    let undated = Batch {
        id: Uuid::new_v4().to_string(),
        expiry_date: None,
        quantity: 10 + (seed % 40) as i64,
        created_at: now - Duration::days(5),
        ..dated.clone()
    };
    vec![dated, undated]
}

fn generate_promotions(category: &str, subcategory: &str, idx: usize) -> Vec<Promotion> {
    let now = Utc::now();
    let base = Promotion {
        id: Uuid::new_v4().to_string(),
        name: format!("{} week", category),
        product_id: None,
        subcategory_id: None,
        category_id: Some(category.to_string()),
        discount_type: DiscountType::Percentage,
        discount_value: 5,
        starts_at: now - Duration::days(1),
        ends_at: now + Duration::days(30),
        priority: 0,
        is_active: true,
    };
    let sub = Promotion {
        id: Uuid::new_v4().to_string(),
        name: format!("{} deal", subcategory),
        category_id: None,
        subcategory_id: Some(subcategory.to_string()),
        discount_type: DiscountType::FixedAmount,
        discount_value: 25 + (idx as i64) * 5,
        priority: 1,
        ..base.clone()
    };
    vec![base, sub]
}
