//! Shared fixtures for engine tests.

use std::path::PathBuf;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use uuid::Uuid;

use till_core::{Batch, DiscountType, LoyaltyAccount, LoyaltyTier, Product, Promotion};
use till_db::{
    BatchRepository, Database, DbConfig, LoyaltyRepository, ProductRepository, PromotionRepository,
    SettingsRepository,
};

pub const LOCATION: &str = "main-store";

pub async fn db() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

/// A fresh database file in the temp directory, for tests that need more
/// than one connection.
pub async fn file_db(max_connections: u32) -> (Database, PathBuf) {
    let path = std::env::temp_dir().join(format!("till-{}.db", Uuid::new_v4()));
    let db = Database::new(DbConfig::new(&path).max_connections(max_connections))
        .await
        .unwrap();
    (db, path)
}

pub fn remove_db_files(path: &PathBuf) {
    for suffix in ["", "-wal", "-shm"] {
        let mut file = path.clone().into_os_string();
        file.push(suffix);
        let _ = std::fs::remove_file(file);
    }
}

pub async fn product(db: &Database, price_cents: i64, category: &str, subcategory: Option<&str>) -> Product {
    let now = Utc::now();
    let id = Uuid::new_v4().to_string();
    let product = Product {
        sku: format!("SKU-{}", &id[..8]),
        id,
        name: "Test Product".to_string(),
        selling_price_cents: price_cents,
        purchase_price_cents: price_cents / 2,
        category_id: category.to_string(),
        subcategory_id: subcategory.map(str::to_string),
        default_location_id: LOCATION.to_string(),
        created_at: now,
        updated_at: now,
    };
    let mut conn = db.acquire().await.unwrap();
    ProductRepository::insert(&mut conn, &product).await.unwrap();
    product
}

pub async fn batch(db: &Database, product: &Product, quantity: i64) -> Batch {
    batch_with(db, product, quantity, None, Utc::now()).await
}

pub async fn batch_with(
    db: &Database,
    product: &Product,
    quantity: i64,
    expiry_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
) -> Batch {
    let batch = Batch {
        id: Uuid::new_v4().to_string(),
        product_id: product.id.clone(),
        location_id: LOCATION.to_string(),
        quantity,
        expiry_date,
        reference: None,
        created_at,
        updated_at: created_at,
    };
    let mut conn = db.acquire().await.unwrap();
    BatchRepository::insert(&mut conn, &batch).await.unwrap();
    batch
}

/// An active promotion running from yesterday until next month.
#[allow(clippy::too_many_arguments)]
pub async fn promotion(
    db: &Database,
    name: &str,
    product_id: Option<&str>,
    subcategory_id: Option<&str>,
    category_id: Option<&str>,
    discount_type: DiscountType,
    discount_value: i64,
    priority: i64,
) -> Promotion {
    let now = Utc::now();
    let promotion = Promotion {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        product_id: product_id.map(str::to_string),
        subcategory_id: subcategory_id.map(str::to_string),
        category_id: category_id.map(str::to_string),
        discount_type,
        discount_value,
        starts_at: now - Duration::days(1),
        ends_at: now + Duration::days(30),
        priority,
        is_active: true,
    };
    let mut conn = db.acquire().await.unwrap();
    PromotionRepository::insert(&mut conn, &promotion).await.unwrap();
    promotion
}

pub async fn loyalty_account(db: &Database, customer_id: &str, points: i64) -> LoyaltyAccount {
    let now = Utc::now();
    let account = LoyaltyAccount {
        id: Uuid::new_v4().to_string(),
        customer_id: customer_id.to_string(),
        points,
        tier: LoyaltyTier::Bronze,
        created_at: now,
        updated_at: now,
    };
    let mut conn = db.acquire().await.unwrap();
    LoyaltyRepository::insert(&mut conn, &account).await.unwrap();
    account
}

pub async fn set_setting(db: &Database, key: &str, value: &str) {
    let mut conn = db.acquire().await.unwrap();
    SettingsRepository::set(&mut conn, key, value).await.unwrap();
}

pub async fn remove_setting(db: &Database, key: &str) {
    let mut conn = db.acquire().await.unwrap();
    SettingsRepository::remove(&mut conn, key).await.unwrap();
}
