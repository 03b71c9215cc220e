//! Schema catalog: the authoritative description of every table.
//!
//! A [`Catalog`] is an immutable snapshot. When the database schema changes
//! the application builds a new catalog and swaps it into a
//! [`CatalogHandle`]; readers holding the old `Arc<Catalog>` keep a
//! consistent view until they finish.
//!
//! [`SchemaDocument`] is the derived rendering of one table that the indexer
//! embeds and the retriever matches against.

use std::sync::{Arc, RwLock};

use serde::Serialize;
use sha2::{Digest, Sha256};

/// One column of a table, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Declared SQL type as reported by the database (may be empty).
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
}

/// A foreign-key edge from a local column to a column of another table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKeyEdge {
    pub column: String,
    pub target_table: String,
    pub target_column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub foreign_keys: Vec<ForeignKeyEdge>,
    /// Approximate row count at introspection time.
    pub row_count: u64,
}

impl TableDescriptor {
    /// Case-insensitive column lookup.
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }
}

/// Immutable snapshot of all tables, sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Catalog {
    tables: Vec<TableDescriptor>,
}

impl Catalog {
    /// Build a catalog. Tables are sorted by name so that every derived
    /// rendering is deterministic regardless of introspection order.
    pub fn new(mut tables: Vec<TableDescriptor>) -> Self {
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        tables.dedup_by(|a, b| a.name.eq_ignore_ascii_case(&b.name));
        Self { tables }
    }

    pub fn tables(&self) -> &[TableDescriptor] {
        &self.tables
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Case-insensitive table lookup.
    pub fn table(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name.clone()).collect()
    }

    /// Tables referenced by `name`'s foreign keys, in edge order, deduplicated.
    pub fn referenced_tables(&self, name: &str) -> Vec<&TableDescriptor> {
        let mut out: Vec<&TableDescriptor> = Vec::new();
        if let Some(table) = self.table(name) {
            for fk in &table.foreign_keys {
                if let Some(target) = self.table(&fk.target_table) {
                    if !out.iter().any(|t| t.name == target.name) {
                        out.push(target);
                    }
                }
            }
        }
        out
    }

    /// Tables whose foreign keys point at `name`.
    pub fn referencing_tables(&self, name: &str) -> Vec<&TableDescriptor> {
        self.tables
            .iter()
            .filter(|t| {
                t.foreign_keys
                    .iter()
                    .any(|fk| fk.target_table.eq_ignore_ascii_case(name))
            })
            .collect()
    }

    /// SHA-256 over every rendered document; changes whenever any table's
    /// documented shape changes.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for table in &self.tables {
            hasher.update(SchemaDocument::render(table).text.as_bytes());
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Shared, atomically replaceable handle to the current catalog.
#[derive(Debug, Default)]
pub struct CatalogHandle {
    current: RwLock<Arc<Catalog>>,
}

impl CatalogHandle {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            current: RwLock::new(Arc::new(catalog)),
        }
    }

    /// The catalog as of now. Later replacements do not affect the returned snapshot.
    pub fn snapshot(&self) -> Arc<Catalog> {
        self.current.read().unwrap().clone()
    }

    /// Swap in a new catalog wholesale.
    pub fn replace(&self, catalog: Catalog) {
        *self.current.write().unwrap() = Arc::new(catalog);
    }
}

/// Embeddable text rendering of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaDocument {
    pub table_name: String,
    pub text: String,
}

impl SchemaDocument {
    /// Render a table into its document. Pure function of the descriptor.
    pub fn render(table: &TableDescriptor) -> Self {
        let mut lines = Vec::new();
        lines.push(format!("Table Name: {}", table.name));
        lines.push(format!("Row Count: {} rows", table.row_count));
        lines.push(String::new());
        lines.push("Columns:".to_string());
        for col in &table.columns {
            let mut line = if col.data_type.is_empty() {
                format!("- {}", col.name)
            } else {
                format!("- {} ({})", col.name, col.data_type)
            };
            if col.primary_key {
                line.push_str(" [PRIMARY KEY]");
            }
            if !col.nullable {
                line.push_str(" [NOT NULL]");
            }
            lines.push(line);
        }

        if !table.foreign_keys.is_empty() {
            lines.push(String::new());
            lines.push("Relationships:".to_string());
            for fk in &table.foreign_keys {
                lines.push(format!(
                    "- {} references {}.{}",
                    fk.column, fk.target_table, fk.target_column
                ));
            }
        }

        let use_cases = infer_use_cases(table);
        if !use_cases.is_empty() {
            lines.push(String::new());
            lines.push("Common Use Cases:".to_string());
            for uc in use_cases {
                lines.push(format!("- {}", uc));
            }
        }

        Self {
            table_name: table.name.clone(),
            text: lines.join("\n"),
        }
    }

    /// SHA-256 of the document text, used to detect stale index entries.
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.text.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Retrieval hints derived from table and column names.
fn infer_use_cases(table: &TableDescriptor) -> Vec<&'static str> {
    let name = table.name.to_lowercase();
    let columns: Vec<String> = table.columns.iter().map(|c| c.name.to_lowercase()).collect();
    let has_col = |c: &str| columns.iter().any(|col| col == c);

    let mut hints = Vec::new();
    if name.contains("customer") {
        hints.push("Customer information and demographics");
        hints.push("Customer contact details");
    }
    if name.contains("order") {
        hints.push("Order history and transactions");
        hints.push("Sales and revenue analysis");
    }
    if name.contains("product") {
        hints.push("Product catalog and inventory");
        hints.push("Product pricing and details");
    }
    if name.contains("review") || has_col("rating") {
        hints.push("Customer feedback and ratings");
        hints.push("Product quality analysis");
    }
    if name.contains("category") || name.contains("categories") {
        hints.push("Product categorization");
        hints.push("Hierarchical organization");
    }
    if has_col("price") || has_col("amount") || columns.iter().any(|c| c.ends_with("_amount")) {
        hints.push("Financial and pricing data");
    }
    if columns
        .iter()
        .any(|c| c.contains("date") || c.ends_with("_at"))
    {
        hints.push("Time-based analysis and trends");
    }
    hints
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn col(name: &str, ty: &str, pk: bool) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.to_string(),
            data_type: ty.to_string(),
            nullable: !pk,
            primary_key: pk,
        }
    }

    pub fn fk(column: &str, table: &str, target: &str) -> ForeignKeyEdge {
        ForeignKeyEdge {
            column: column.to_string(),
            target_table: table.to_string(),
            target_column: target.to_string(),
        }
    }

    pub fn table(
        name: &str,
        columns: Vec<ColumnDescriptor>,
        fks: Vec<ForeignKeyEdge>,
    ) -> TableDescriptor {
        TableDescriptor {
            name: name.to_string(),
            columns,
            foreign_keys: fks,
            row_count: 0,
        }
    }

    /// customers(id, name), orders(id, customer_id → customers.id, total_amount)
    pub fn shop_catalog() -> Catalog {
        Catalog::new(vec![
            table(
                "orders",
                vec![
                    col("id", "INTEGER", true),
                    col("customer_id", "INTEGER", false),
                    col("total_amount", "REAL", false),
                ],
                vec![fk("customer_id", "customers", "id")],
            ),
            table(
                "customers",
                vec![col("id", "INTEGER", true), col("name", "TEXT", false)],
                vec![],
            ),
        ])
    }

    /// Star schema: order_items → orders → customers, order_items → products → categories.
    pub fn store_catalog() -> Catalog {
        Catalog::new(vec![
            table(
                "customers",
                vec![
                    col("id", "INTEGER", true),
                    col("name", "TEXT", false),
                    col("email", "TEXT", false),
                ],
                vec![],
            ),
            table(
                "categories",
                vec![col("id", "INTEGER", true), col("name", "TEXT", false)],
                vec![],
            ),
            table(
                "products",
                vec![
                    col("id", "INTEGER", true),
                    col("name", "TEXT", false),
                    col("price", "REAL", false),
                    col("category_id", "INTEGER", false),
                ],
                vec![fk("category_id", "categories", "id")],
            ),
            table(
                "orders",
                vec![
                    col("id", "INTEGER", true),
                    col("customer_id", "INTEGER", false),
                    col("order_date", "TEXT", false),
                    col("total_amount", "REAL", false),
                ],
                vec![fk("customer_id", "customers", "id")],
            ),
            table(
                "order_items",
                vec![
                    col("id", "INTEGER", true),
                    col("order_id", "INTEGER", false),
                    col("product_id", "INTEGER", false),
                    col("quantity", "INTEGER", false),
                ],
                vec![fk("order_id", "orders", "id"), fk("product_id", "products", "id")],
            ),
            table(
                "audit_log",
                vec![col("id", "INTEGER", true), col("message", "TEXT", false)],
                vec![],
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_catalog_sorted_and_case_insensitive() {
        let catalog = shop_catalog();
        assert_eq!(catalog.table_names(), vec!["customers", "orders"]);
        assert!(catalog.table("ORDERS").is_some());
        assert!(catalog.table("orders").unwrap().has_column("Customer_ID"));
        assert!(catalog.table("payments").is_none());
    }

    #[test]
    fn test_referenced_and_referencing() {
        let catalog = store_catalog();
        let refs: Vec<&str> = catalog
            .referenced_tables("order_items")
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(refs, vec!["orders", "products"]);

        let back: Vec<&str> = catalog
            .referencing_tables("orders")
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(back, vec!["order_items"]);
    }

    #[test]
    fn test_document_contains_columns_and_keys() {
        let catalog = shop_catalog();
        let doc = SchemaDocument::render(catalog.table("orders").unwrap());
        assert_eq!(doc.table_name, "orders");
        assert!(doc.text.starts_with("Table Name: orders"));
        assert!(doc.text.contains("- id (INTEGER) [PRIMARY KEY] [NOT NULL]"));
        assert!(doc.text.contains("- customer_id references customers.id"));
        assert!(doc.text.contains("Order history and transactions"));
        assert!(doc.text.contains("Financial and pricing data"));
    }

    #[test]
    fn test_document_render_is_deterministic() {
        let catalog = store_catalog();
        for table in catalog.tables() {
            let a = SchemaDocument::render(table);
            let b = SchemaDocument::render(table);
            assert_eq!(a, b);
            assert_eq!(a.hash(), b.hash());
        }
        assert_eq!(catalog.fingerprint(), store_catalog().fingerprint());
        assert_ne!(catalog.fingerprint(), shop_catalog().fingerprint());
    }

    #[test]
    fn test_handle_swap_keeps_old_snapshot() {
        let handle = CatalogHandle::new(shop_catalog());
        let before = handle.snapshot();
        handle.replace(store_catalog());
        assert_eq!(before.len(), 2);
        assert_eq!(handle.snapshot().len(), 6);
    }
}
