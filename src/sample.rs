//! `copilot sample-db`: a small e-commerce database for trying things out.
//!
//! Six related tables (customers, categories, products, orders,
//! order_items, reviews) filled with deterministic data, so the same
//! questions give the same answers on every machine.

use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use chrono::{Duration, NaiveDate};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE customers (
        id INTEGER PRIMARY KEY,
        first_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        city TEXT,
        country TEXT NOT NULL,
        created_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE categories (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        description TEXT
    )"#,
    r#"CREATE TABLE products (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        category_id INTEGER NOT NULL REFERENCES categories(id),
        price REAL NOT NULL,
        stock_quantity INTEGER NOT NULL DEFAULT 0
    )"#,
    r#"CREATE TABLE orders (
        id INTEGER PRIMARY KEY,
        customer_id INTEGER NOT NULL REFERENCES customers(id),
        order_date TEXT NOT NULL,
        status TEXT NOT NULL,
        total_amount REAL NOT NULL
    )"#,
    r#"CREATE TABLE order_items (
        id INTEGER PRIMARY KEY,
        order_id INTEGER NOT NULL REFERENCES orders(id),
        product_id INTEGER NOT NULL REFERENCES products(id),
        quantity INTEGER NOT NULL,
        unit_price REAL NOT NULL
    )"#,
    r#"CREATE TABLE reviews (
        id INTEGER PRIMARY KEY,
        product_id INTEGER NOT NULL REFERENCES products(id),
        customer_id INTEGER NOT NULL REFERENCES customers(id),
        rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
        comment TEXT,
        review_date TEXT NOT NULL
    )"#,
    "CREATE INDEX idx_orders_customer ON orders(customer_id)",
    "CREATE INDEX idx_order_items_order ON order_items(order_id)",
    "CREATE INDEX idx_reviews_product ON reviews(product_id)",
];

const FIRST_NAMES: &[&str] = &[
    "Ada", "Grace", "Alan", "Edsger", "Barbara", "Donald", "Margaret", "Ken", "Frances", "Dennis",
    "Radia", "Linus", "Katherine", "John", "Shafi",
];
const LAST_NAMES: &[&str] = &[
    "Lovelace", "Hopper", "Turing", "Dijkstra", "Liskov", "Knuth", "Hamilton", "Thompson",
    "Allen", "Ritchie", "Perlman", "Torvalds", "Johnson", "Backus", "Goldwasser",
];
const CITIES: &[(&str, &str)] = &[
    ("London", "UK"),
    ("Manchester", "UK"),
    ("New York", "USA"),
    ("Seattle", "USA"),
    ("Austin", "USA"),
    ("Berlin", "Germany"),
    ("Munich", "Germany"),
    ("Paris", "France"),
    ("Toronto", "Canada"),
    ("Sydney", "Australia"),
];
const CATEGORIES: &[(&str, &str, &[(&str, f64)])] = &[
    (
        "Electronics",
        "Gadgets and devices",
        &[
            ("Wireless Headphones", 129.99),
            ("USB-C Charger", 24.99),
            ("Smart Watch", 249.0),
            ("Bluetooth Speaker", 79.5),
            ("E-Reader", 139.0),
        ],
    ),
    (
        "Books",
        "Printed and digital books",
        &[
            ("The Rust Programming Language", 39.95),
            ("Designing Data-Intensive Applications", 45.0),
            ("SQL Antipatterns", 32.5),
            ("The Pragmatic Programmer", 41.99),
            ("Structure and Interpretation of Computer Programs", 55.0),
        ],
    ),
    (
        "Home & Kitchen",
        "Cookware and home goods",
        &[
            ("Cast Iron Skillet", 34.99),
            ("French Press", 27.5),
            ("Chef's Knife", 89.0),
            ("Cutting Board", 19.99),
            ("Espresso Machine", 399.0),
        ],
    ),
    (
        "Sports",
        "Fitness and outdoor equipment",
        &[
            ("Yoga Mat", 29.99),
            ("Running Shoes", 119.0),
            ("Water Bottle", 14.5),
            ("Resistance Bands", 22.0),
            ("Camping Tent", 189.0),
        ],
    ),
    (
        "Toys",
        "Games and toys for all ages",
        &[
            ("Building Blocks Set", 59.99),
            ("Jigsaw Puzzle", 18.0),
            ("Board Game", 44.95),
            ("Remote Control Car", 69.0),
            ("Plush Bear", 16.5),
        ],
    ),
    (
        "Clothing",
        "Apparel and accessories",
        &[
            ("Denim Jacket", 79.0),
            ("Wool Sweater", 64.5),
            ("Baseball Cap", 21.0),
            ("Rain Coat", 99.99),
            ("Leather Belt", 35.0),
        ],
    ),
];
const STATUSES: &[&str] = &[
    "delivered",
    "delivered",
    "delivered",
    "shipped",
    "processing",
    "cancelled",
];
const COMMENTS: &[&str] = &[
    "Terrible, would not buy again.",
    "Not great, had some issues.",
    "Does the job.",
    "Very good value.",
    "Excellent, highly recommended!",
];

const CUSTOMERS: usize = 50;
const ORDERS: usize = 200;
const REVIEWS: usize = 150;

/// Small deterministic generator (64-bit LCG).
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next() % n as u64) as usize
    }
}

/// Summary of what was written.
#[derive(Debug, Default)]
pub struct SampleSummary {
    pub customers: usize,
    pub categories: usize,
    pub products: usize,
    pub orders: usize,
    pub order_items: usize,
    pub reviews: usize,
}

/// Create the sample database at `path`. Refuses to overwrite an existing
/// file unless `force` is set.
pub async fn create_sample_db(path: &Path, force: bool) -> Result<SampleSummary> {
    if path.exists() {
        if !force {
            bail!(
                "{} already exists (use --force to overwrite)",
                path.display()
            );
        }
        std::fs::remove_file(path)?;
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // Rollback journal: the target database is later opened read-only.
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to create database: {}", path.display()))?;
    let summary = populate(&pool).await;
    pool.close().await;
    summary
}

async fn populate(pool: &SqlitePool) -> Result<SampleSummary> {
    let mut tx = pool.begin().await?;
    for stmt in SCHEMA {
        sqlx::query(stmt).execute(&mut *tx).await?;
    }

    let mut rng = Lcg(42);
    let epoch = NaiveDate::from_ymd_opt(2024, 1, 1)
        .ok_or_else(|| anyhow::anyhow!("invalid base date"))?;
    let day = |offset: usize| {
        (epoch + Duration::days(offset as i64))
            .format("%Y-%m-%d")
            .to_string()
    };
    let mut summary = SampleSummary::default();

    for id in 1..=CUSTOMERS {
        let first = FIRST_NAMES[rng.below(FIRST_NAMES.len())];
        let last = LAST_NAMES[rng.below(LAST_NAMES.len())];
        let (city, country) = CITIES[rng.below(CITIES.len())];
        sqlx::query(
            "INSERT INTO customers (id, first_name, last_name, email, city, country, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id as i64)
        .bind(first)
        .bind(last)
        .bind(format!(
            "{}.{}{}@example.com",
            first.to_lowercase(),
            last.to_lowercase(),
            id
        ))
        .bind(city)
        .bind(country)
        .bind(day(rng.below(120)))
        .execute(&mut *tx)
        .await?;
        summary.customers += 1;
    }

    let mut prices: Vec<f64> = Vec::new();
    for (cat_idx, (name, description, products)) in CATEGORIES.iter().enumerate() {
        let category_id = cat_idx as i64 + 1;
        sqlx::query("INSERT INTO categories (id, name, description) VALUES (?, ?, ?)")
            .bind(category_id)
            .bind(name)
            .bind(description)
            .execute(&mut *tx)
            .await?;
        summary.categories += 1;

        for (product, price) in products.iter() {
            prices.push(*price);
            sqlx::query(
                "INSERT INTO products (id, name, category_id, price, stock_quantity) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(prices.len() as i64)
            .bind(product)
            .bind(category_id)
            .bind(price)
            .bind(rng.below(200) as i64)
            .execute(&mut *tx)
            .await?;
            summary.products += 1;
        }
    }

    let mut item_id = 0i64;
    for order_id in 1..=ORDERS {
        let customer_id = rng.below(CUSTOMERS) + 1;
        let status = STATUSES[rng.below(STATUSES.len())];
        let order_date = day(120 + rng.below(240));

        let mut total = 0.0;
        let mut items = Vec::new();
        for _ in 0..(1 + rng.below(4)) {
            let product_id = rng.below(prices.len()) + 1;
            let quantity = 1 + rng.below(3);
            let unit_price = prices[product_id - 1];
            total += unit_price * quantity as f64;
            items.push((product_id, quantity, unit_price));
        }

        sqlx::query(
            "INSERT INTO orders (id, customer_id, order_date, status, total_amount) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(order_id as i64)
        .bind(customer_id as i64)
        .bind(&order_date)
        .bind(status)
        .bind((total * 100.0).round() / 100.0)
        .execute(&mut *tx)
        .await?;
        summary.orders += 1;

        for (product_id, quantity, unit_price) in items {
            item_id += 1;
            sqlx::query(
                "INSERT INTO order_items (id, order_id, product_id, quantity, unit_price) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(item_id)
            .bind(order_id as i64)
            .bind(product_id as i64)
            .bind(quantity as i64)
            .bind(unit_price)
            .execute(&mut *tx)
            .await?;
            summary.order_items += 1;
        }
    }

    for review_id in 1..=REVIEWS {
        let rating = 1 + rng.below(5);
        sqlx::query(
            "INSERT INTO reviews (id, product_id, customer_id, rating, comment, review_date) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(review_id as i64)
        .bind((rng.below(prices.len()) + 1) as i64)
        .bind((rng.below(CUSTOMERS) + 1) as i64)
        .bind(rating as i64)
        .bind(COMMENTS[rating - 1])
        .bind(day(150 + rng.below(250)))
        .execute(&mut *tx)
        .await?;
        summary.reviews += 1;
    }

    tx.commit().await?;
    Ok(summary)
}

/// Run `copilot sample-db`.
pub async fn run_sample_db(path: &Path, force: bool) -> Result<()> {
    let summary = create_sample_db(path, force).await?;
    println!("sample database created: {}", path.display());
    println!("  customers: {}", summary.customers);
    println!("  categories: {}", summary.categories);
    println!("  products: {}", summary.products);
    println!("  orders: {}", summary.orders);
    println!("  order_items: {}", summary.order_items);
    println!("  reviews: {}", summary.reviews);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db;
    use crate::schema::load_catalog;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sample_db_catalog() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shop.db");
        let summary = create_sample_db(&path, false).await.unwrap();
        assert_eq!(summary.customers, CUSTOMERS);
        assert_eq!(summary.products, 30);

        let pool = db::connect_target(&Config::for_database(&path)).await.unwrap();
        let catalog = load_catalog(&pool).await.unwrap();
        assert_eq!(
            catalog.table_names(),
            vec!["categories", "customers", "order_items", "orders", "products", "reviews"]
        );
        let items = catalog.table("order_items").unwrap();
        assert_eq!(items.foreign_keys.len(), 2);
        assert_eq!(items.row_count as usize, summary.order_items);

        let mismatched: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders o WHERE abs(o.total_amount - \
             (SELECT SUM(quantity * unit_price) FROM order_items i WHERE i.order_id = o.id)) > 0.01",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(mismatched, 0);
        pool.close().await;
    }

    #[tokio::test]
    async fn test_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shop.db");
        create_sample_db(&path, false).await.unwrap();
        assert!(create_sample_db(&path, false).await.is_err());
        assert!(create_sample_db(&path, true).await.is_ok());
    }

    #[test]
    fn test_generator_is_deterministic() {
        let mut a = Lcg(7);
        let mut b = Lcg(7);
        let xs: Vec<usize> = (0..10).map(|_| a.below(100)).collect();
        let ys: Vec<usize> = (0..10).map(|_| b.below(100)).collect();
        assert_eq!(xs, ys);
    }
}
