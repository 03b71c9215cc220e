//! Static SQL validation against the catalog.
//!
//! Three blocking layers run in order and the first failure is returned:
//!
//! 1. **Statement type**: the leading keyword must be in the allow-list and
//!    the text must parse as a single query.
//! 2. **Dangerous constructs**: no deny-listed keyword anywhere in the text
//!    (comments and subqueries included, string literals excluded) and no
//!    second statement after a `;`.
//! 3. **Identifiers**: the parsed statement is walked scope by scope. Every
//!    table must be a catalog table or a visible CTE, every
//!    `qualifier.column` must resolve against that qualifier's columns, and
//!    every bare column must belong to a source in scope (or name a
//!    projection alias). CTEs and derived tables expose their output
//!    columns, not the columns of the tables they read.
//!
//! A passing statement also gets non-blocking performance warnings.

use std::collections::HashMap;
use std::ops::ControlFlow;

use serde::Serialize;
use sqlparser::ast::{
    Expr, Query, Select, SelectItem, SetExpr, Statement, TableFactor, Visit, Visitor,
};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer, Whitespace};
use tracing::debug;

use crate::catalog::{Catalog, TableDescriptor};
use crate::error::ValidationError;

pub const DEFAULT_ALLOWED_STATEMENTS: &[&str] = &["SELECT", "WITH"];

pub const DEFAULT_DENIED_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "TRUNCATE", "ALTER", "CREATE", "INSERT", "UPDATE", "REPLACE", "ATTACH",
    "DETACH", "PRAGMA", "VACUUM", "REINDEX", "GRANT", "REVOKE",
];

/// Implicit columns every rowid table has.
const ROWID_ALIASES: &[&str] = &["rowid", "oid", "_rowid_"];

const MULTIPLE_STATEMENTS: &str = "multiple statements separated by ';'";

/// Result of a passing validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// Catalog tables the statement references, in order of first appearance.
    pub tables: Vec<String>,
    /// Non-blocking performance hints.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Validator {
    allowed_statements: Vec<String>,
    denied_keywords: Vec<String>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(
            DEFAULT_ALLOWED_STATEMENTS.iter().map(|s| s.to_string()).collect(),
            DEFAULT_DENIED_KEYWORDS.iter().map(|s| s.to_string()).collect(),
        )
    }
}

impl Validator {
    pub fn new(allowed_statements: Vec<String>, denied_keywords: Vec<String>) -> Self {
        Self {
            allowed_statements: allowed_statements
                .into_iter()
                .map(|s| s.trim().to_ascii_uppercase())
                .collect(),
            denied_keywords: denied_keywords
                .into_iter()
                .map(|s| s.trim().to_ascii_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Run all layers against `catalog`.
    pub fn validate(
        &self,
        sql: &str,
        catalog: &Catalog,
    ) -> Result<ValidationReport, ValidationError> {
        let dialect = SQLiteDialect {};
        let tokens = Tokenizer::new(&dialect, sql)
            .tokenize()
            .map_err(|e| ValidationError::SyntaxError {
                message: e.to_string(),
            })?;
        let significant: Vec<&Token> = tokens.iter().filter(|t| is_significant(t)).collect();
        if significant.iter().all(|t| matches!(t, Token::SemiColon)) {
            return Err(ValidationError::UnparseableOutput);
        }

        let keyword = leading_keyword(&significant);
        self.check_statement_type(&keyword)?;
        self.check_dangerous(&tokens, &significant)?;

        let statement = parse_single(&dialect, sql)?;
        let Statement::Query(query) = &statement else {
            // A permitted leading keyword that does not open a query.
            return Err(ValidationError::DisallowedStatementType {
                keyword,
                allowed: self.allowed_statements.join(", "),
            });
        };

        let mut resolver = Resolver::new(catalog);
        if let ControlFlow::Break(err) = statement.visit(&mut resolver) {
            return Err(err);
        }
        resolver.check_columns()?;
        let warnings = performance_warnings(query, &resolver);

        debug!(tables = ?resolver.tables, warnings = warnings.len(), "statement passed validation");
        Ok(ValidationReport {
            tables: resolver.tables,
            warnings,
        })
    }

    fn check_statement_type(&self, keyword: &str) -> Result<(), ValidationError> {
        if self.allowed_statements.iter().any(|a| a == keyword) {
            Ok(())
        } else {
            Err(ValidationError::DisallowedStatementType {
                keyword: keyword.to_string(),
                allowed: self.allowed_statements.join(", "),
            })
        }
    }

    fn check_dangerous(
        &self,
        tokens: &[Token],
        significant: &[&Token],
    ) -> Result<(), ValidationError> {
        for (i, token) in tokens.iter().enumerate() {
            let hit = match token {
                Token::Word(word) if word.quote_style.is_none() => {
                    let called = tokens[i + 1..]
                        .iter()
                        .find(|t| is_significant(t))
                        .is_some_and(|t| matches!(t, Token::LParen));
                    let upper = word.value.to_ascii_uppercase();
                    self.denied_keywords
                        .iter()
                        .find(|k| !called && **k == upper)
                }
                Token::Whitespace(Whitespace::SingleLineComment { comment, .. })
                | Token::Whitespace(Whitespace::MultiLineComment(comment)) => {
                    let upper = comment.to_ascii_uppercase();
                    self.denied_keywords
                        .iter()
                        .find(|k| contains_statement_word(&upper, k))
                }
                _ => None,
            };
            if let Some(keyword) = hit {
                return Err(ValidationError::DangerousConstruct {
                    construct: keyword.clone(),
                });
            }
        }

        if let Some(pos) = significant.iter().position(|t| matches!(t, Token::SemiColon)) {
            if significant[pos + 1..]
                .iter()
                .any(|t| !matches!(t, Token::SemiColon))
            {
                return Err(ValidationError::DangerousConstruct {
                    construct: MULTIPLE_STATEMENTS.to_string(),
                });
            }
        }
        Ok(())
    }
}

fn is_significant(token: &Token) -> bool {
    !matches!(token, Token::Whitespace(_) | Token::EOF)
}

/// First keyword of the statement, skipping opening parentheses.
fn leading_keyword(significant: &[&Token]) -> String {
    match significant
        .iter()
        .copied()
        .find(|t| !matches!(t, Token::LParen))
    {
        Some(Token::Word(word)) => word.value.to_ascii_uppercase(),
        Some(other) => other.to_string(),
        None => "(".to_string(),
    }
}

fn parse_single(dialect: &SQLiteDialect, sql: &str) -> Result<Statement, ValidationError> {
    let mut statements =
        Parser::parse_sql(dialect, sql).map_err(|e| ValidationError::SyntaxError {
            message: e.to_string(),
        })?;
    match statements.len() {
        0 => Err(ValidationError::UnparseableOutput),
        1 => Ok(statements.remove(0)),
        _ => Err(ValidationError::DangerousConstruct {
            construct: MULTIPLE_STATEMENTS.to_string(),
        }),
    }
}

/// Whole-word occurrence of `word` that is not a function call such as
/// `replace(...)`.
fn contains_statement_word(haystack: &str, word: &str) -> bool {
    let bytes = haystack.as_bytes();
    let is_word_byte = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
    let mut from = 0;
    while let Some(offset) = haystack[from..].find(word) {
        let start = from + offset;
        let end = start + word.len();
        let left_ok = start == 0 || !is_word_byte(bytes[start - 1]);
        let right_ok = end == bytes.len() || !is_word_byte(bytes[end]);
        if left_ok && right_ok {
            let next = haystack[end..].trim_start().chars().next();
            if next != Some('(') {
                return true;
            }
        }
        from = end;
    }
    false
}

fn is_rowid(word: &str) -> bool {
    ROWID_ALIASES.iter().any(|k| k.eq_ignore_ascii_case(word))
}

/// Columns a FROM source exposes.
#[derive(Debug, Clone)]
enum Columns<'c> {
    Table(&'c TableDescriptor),
    Named(Vec<String>),
    /// Table-valued functions and projections whose columns are not known.
    Open,
}

impl Columns<'_> {
    fn contains(&self, column: &str) -> bool {
        match self {
            Columns::Table(table) => table.has_column(column) || is_rowid(column),
            Columns::Named(names) => names.iter().any(|n| n.eq_ignore_ascii_case(column)),
            Columns::Open => true,
        }
    }
}

#[derive(Debug)]
struct Source<'c> {
    /// Alias, or the table name when unaliased. Derived tables may have none.
    name: Option<String>,
    columns: Columns<'c>,
}

/// One query level: its FROM sources, the CTEs it defines and its
/// projection aliases. Nested queries see their parents.
#[derive(Debug, Default)]
struct Scope<'c> {
    parent: Option<usize>,
    sources: Vec<Source<'c>>,
    ctes: HashMap<String, Columns<'c>>,
    aliases: Vec<String>,
}

#[derive(Debug)]
struct ColumnRef {
    scope: usize,
    qualifier: Option<String>,
    column: String,
}

/// Collects scopes and table references while the AST is walked; column
/// references are resolved afterwards, once every scope is complete.
struct Resolver<'c> {
    catalog: &'c Catalog,
    scopes: Vec<Scope<'c>>,
    stack: Vec<usize>,
    refs: Vec<ColumnRef>,
    tables: Vec<String>,
    queries: usize,
    joins: usize,
}

impl<'c> Resolver<'c> {
    fn new(catalog: &'c Catalog) -> Self {
        Self {
            catalog,
            scopes: Vec::new(),
            stack: Vec::new(),
            refs: Vec::new(),
            tables: Vec::new(),
            queries: 0,
            joins: 0,
        }
    }

    fn chain(&self, start: usize) -> impl Iterator<Item = &Scope<'c>> + '_ {
        std::iter::successors(Some(&self.scopes[start]), move |s| {
            s.parent.map(|p| &self.scopes[p])
        })
    }

    fn cte(&self, scope: usize, name: &str) -> Option<Columns<'c>> {
        let key = name.to_lowercase();
        self.chain(scope).find_map(|s| s.ctes.get(&key).cloned())
    }

    fn catalog_table(&self, factor: &TableFactor) -> Option<&'c TableDescriptor> {
        let catalog = self.catalog;
        match factor {
            TableFactor::Table {
                name, args: None, ..
            } => name.0.last().and_then(|ident| catalog.table(&ident.value)),
            _ => None,
        }
    }

    /// Column names a subquery produces, as seen by whoever selects from it.
    fn output_columns(&self, query: &Query) -> Columns<'c> {
        let Some(select) = first_select(&query.body) else {
            return Columns::Open;
        };
        let mut names = Vec::new();
        for item in &select.projection {
            match item {
                SelectItem::ExprWithAlias { alias, .. } => names.push(alias.value.clone()),
                SelectItem::UnnamedExpr(Expr::Identifier(ident)) => names.push(ident.value.clone()),
                SelectItem::UnnamedExpr(Expr::CompoundIdentifier(parts)) => {
                    names.extend(parts.last().map(|p| p.value.clone()))
                }
                SelectItem::UnnamedExpr(_) => {}
                SelectItem::Wildcard(_) => {
                    for from in &select.from {
                        let factors = std::iter::once(&from.relation)
                            .chain(from.joins.iter().map(|j| &j.relation));
                        for factor in factors {
                            match self.catalog_table(factor) {
                                Some(table) => {
                                    names.extend(table.columns.iter().map(|c| c.name.clone()))
                                }
                                None => return Columns::Open,
                            }
                        }
                    }
                }
                _ => return Columns::Open,
            }
        }
        Columns::Named(names)
    }

    fn check_columns(&self) -> Result<(), ValidationError> {
        for column_ref in &self.refs {
            self.resolve(column_ref)?;
        }
        Ok(())
    }

    fn resolve(&self, r: &ColumnRef) -> Result<(), ValidationError> {
        match &r.qualifier {
            Some(qualifier) => {
                let source = self
                    .chain(r.scope)
                    .flat_map(|s| s.sources.iter())
                    .find(|s| {
                        s.name
                            .as_deref()
                            .is_some_and(|n| n.eq_ignore_ascii_case(qualifier))
                    });
                match source {
                    None => Err(ValidationError::UnknownIdentifier {
                        identifier: qualifier.clone(),
                    }),
                    Some(s) if s.columns.contains(&r.column) => Ok(()),
                    Some(_) => Err(ValidationError::UnknownIdentifier {
                        identifier: format!("{qualifier}.{}", r.column),
                    }),
                }
            }
            None => {
                let found = self.chain(r.scope).any(|s| {
                    s.aliases.iter().any(|a| a.eq_ignore_ascii_case(&r.column))
                        || s.sources.iter().any(|src| src.columns.contains(&r.column))
                });
                if found {
                    Ok(())
                } else {
                    Err(ValidationError::UnknownIdentifier {
                        identifier: r.column.clone(),
                    })
                }
            }
        }
    }
}

impl Visitor for Resolver<'_> {
    type Break = ValidationError;

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        let id = self.scopes.len();
        self.scopes.push(Scope {
            parent: self.stack.last().copied(),
            ..Scope::default()
        });
        self.stack.push(id);
        self.queries += 1;

        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                let columns = if cte.alias.columns.is_empty() {
                    self.output_columns(&cte.query)
                } else {
                    Columns::Named(cte.alias.columns.iter().map(|c| c.value.clone()).collect())
                };
                self.scopes[id]
                    .ctes
                    .insert(cte.alias.name.value.to_lowercase(), columns);
            }
        }

        for select in selects(&query.body) {
            self.joins += select.from.iter().map(|f| f.joins.len()).sum::<usize>();
            for item in &select.projection {
                if let SelectItem::ExprWithAlias { alias, .. } = item {
                    self.scopes[id].aliases.push(alias.value.clone());
                }
            }
        }
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &Query) -> ControlFlow<Self::Break> {
        self.stack.pop();
        ControlFlow::Continue(())
    }

    fn pre_visit_table_factor(&mut self, factor: &TableFactor) -> ControlFlow<Self::Break> {
        let Some(&id) = self.stack.last() else {
            return ControlFlow::Continue(());
        };
        let catalog = self.catalog;
        let source = match factor {
            TableFactor::Table {
                name, alias, args, ..
            } => {
                let Some(table_name) = name.0.last().map(|i| i.value.as_str()) else {
                    return ControlFlow::Continue(());
                };
                let label = alias
                    .as_ref()
                    .map(|a| a.name.value.clone())
                    .unwrap_or_else(|| table_name.to_string());
                let columns = if args.is_some() {
                    Columns::Open
                } else if let Some(columns) = self.cte(id, table_name) {
                    columns
                } else if let Some(table) = catalog.table(table_name) {
                    if !self.tables.contains(&table.name) {
                        self.tables.push(table.name.clone());
                    }
                    Columns::Table(table)
                } else {
                    return ControlFlow::Break(ValidationError::UnknownIdentifier {
                        identifier: table_name.to_string(),
                    });
                };
                Source {
                    name: Some(label),
                    columns,
                }
            }
            TableFactor::Derived {
                subquery, alias, ..
            } => {
                let columns = match alias {
                    Some(a) if !a.columns.is_empty() => {
                        Columns::Named(a.columns.iter().map(|c| c.value.clone()).collect())
                    }
                    _ => self.output_columns(subquery),
                };
                Source {
                    name: alias.as_ref().map(|a| a.name.value.clone()),
                    columns,
                }
            }
            // The joined factors inside register themselves.
            TableFactor::NestedJoin { .. } => return ControlFlow::Continue(()),
            _ => Source {
                name: None,
                columns: Columns::Open,
            },
        };
        self.scopes[id].sources.push(source);
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<Self::Break> {
        let Some(&scope) = self.stack.last() else {
            return ControlFlow::Continue(());
        };
        match expr {
            Expr::Identifier(ident) => self.refs.push(ColumnRef {
                scope,
                qualifier: None,
                column: ident.value.clone(),
            }),
            Expr::CompoundIdentifier(parts) if parts.len() >= 2 => {
                let n = parts.len();
                self.refs.push(ColumnRef {
                    scope,
                    qualifier: Some(parts[n - 2].value.clone()),
                    column: parts[n - 1].value.clone(),
                });
            }
            _ => {}
        }
        ControlFlow::Continue(())
    }
}

/// SELECT blocks of one query level. Parenthesised queries are their own level.
fn selects(body: &SetExpr) -> Vec<&Select> {
    match body {
        SetExpr::Select(select) => vec![select.as_ref()],
        SetExpr::SetOperation { left, right, .. } => {
            let mut out = selects(left);
            out.extend(selects(right));
            out
        }
        _ => Vec::new(),
    }
}

fn first_select(body: &SetExpr) -> Option<&Select> {
    match body {
        SetExpr::Select(select) => Some(select.as_ref()),
        SetExpr::Query(query) => first_select(&query.body),
        SetExpr::SetOperation { left, .. } => first_select(left),
        _ => None,
    }
}

fn unbounded_star(query: &Query) -> bool {
    if query.limit.is_some() {
        return false;
    }
    match query.body.as_ref() {
        SetExpr::Query(inner) => unbounded_star(inner),
        body => selects(body).iter().any(|select| {
            select
                .projection
                .iter()
                .any(|item| matches!(item, SelectItem::Wildcard(_)))
        }),
    }
}

fn performance_warnings(query: &Query, resolver: &Resolver<'_>) -> Vec<String> {
    let mut warnings = Vec::new();

    if unbounded_star(query) {
        warnings.push("Query uses SELECT * without LIMIT - may return many rows".to_string());
    }

    if resolver.joins > 3 {
        warnings.push(format!("Query has {} JOINs - may be slow", resolver.joins));
    }

    if resolver.queries > 1 {
        warnings.push("Query contains subqueries - verify performance".to_string());
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::{shop_catalog, store_catalog};

    fn check(sql: &str) -> Result<ValidationReport, ValidationError> {
        Validator::default().validate(sql, &store_catalog())
    }

    fn unknown(sql: &str) -> String {
        match check(sql) {
            Err(ValidationError::UnknownIdentifier { identifier }) => identifier,
            other => panic!("expected unknown identifier for {sql:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_join_aggregate() {
        let sql = "SELECT c.name, SUM(o.total_amount) AS total_spent \
                   FROM customers c JOIN orders o ON o.customer_id = c.id \
                   GROUP BY c.id, c.name ORDER BY total_spent DESC LIMIT 10";
        let report = Validator::default().validate(sql, &shop_catalog()).unwrap();
        assert_eq!(report.tables, vec!["customers", "orders"]);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_statement_type_allow_list() {
        match check("DROP TABLE customers") {
            Err(ValidationError::DisallowedStatementType { keyword, allowed }) => {
                assert_eq!(keyword, "DROP");
                assert_eq!(allowed, "SELECT, WITH");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            check("EXPLAIN SELECT 1"),
            Err(ValidationError::DisallowedStatementType { .. })
        ));
        assert!(check("(SELECT id FROM customers)").is_ok());
    }

    #[test]
    fn test_deny_list_scans_comments_not_literals() {
        assert_eq!(
            check("SELECT id FROM customers -- then DROP everything"),
            Err(ValidationError::DangerousConstruct {
                construct: "DROP".to_string()
            })
        );
        assert_eq!(
            check("SELECT id FROM customers WHERE id IN (SELECT id FROM orders /* DELETE */)"),
            Err(ValidationError::DangerousConstruct {
                construct: "DELETE".to_string()
            })
        );
        assert!(check("SELECT id FROM customers WHERE name = 'Bobby; DROP TABLE'").is_ok());
        assert!(check("SELECT REPLACE(name, 'a', 'b') FROM customers").is_ok());
        assert!(check("SELECT id FROM orders WHERE order_date > '2024-01-01'").is_ok());
    }

    #[test]
    fn test_multiple_statements_rejected() {
        assert!(matches!(
            check("SELECT 1; SELECT 2"),
            Err(ValidationError::DangerousConstruct { .. })
        ));
        assert!(check("SELECT 1;").is_ok());
    }

    #[test]
    fn test_deny_list_reported_before_unknown_identifier() {
        assert_eq!(
            check("SELECT nope FROM payments -- DELETE"),
            Err(ValidationError::DangerousConstruct {
                construct: "DELETE".to_string()
            })
        );
    }

    #[test]
    fn test_unknown_tables_and_columns() {
        assert_eq!(unknown("SELECT id FROM payments"), "payments");
        assert_eq!(unknown("SELECT c.nickname FROM customers c"), "c.nickname");
        assert_eq!(unknown("SELECT email FROM orders"), "email");
        assert_eq!(unknown("SELECT x.id FROM customers c"), "x");
        assert_eq!(
            unknown("SELECT o.id FROM orders o JOIN shipments s ON s.order_id = o.id"),
            "shipments"
        );
    }

    #[test]
    fn test_identifiers_are_case_insensitive() {
        assert!(check("SELECT C.Name FROM CUSTOMERS c WHERE C.EMAIL LIKE '%@x.com'").is_ok());
        assert!(check(r#"SELECT "name" FROM "customers""#).is_ok());
    }

    #[test]
    fn test_aliases_and_functions_are_not_columns() {
        assert!(check(
            "SELECT strftime('%Y', order_date) yr, COUNT(*) cnt FROM orders GROUP BY yr ORDER BY cnt DESC"
        )
        .is_ok());
        assert!(check(
            "SELECT CASE WHEN price > 100 THEN 'high' ELSE 'low' END tier, CAST(price AS INTEGER) FROM products"
        )
        .is_ok());
        assert!(check("SELECT rowid, name FROM customers WHERE id = ?").is_ok());
    }

    #[test]
    fn test_cte_and_subqueries() {
        let sql = "WITH spend (customer_id, total) AS (\
                     SELECT customer_id, SUM(total_amount) FROM orders GROUP BY customer_id) \
                   SELECT c.name, s.total FROM customers c JOIN spend s ON s.customer_id = c.id";
        let report = check(sql).unwrap();
        assert_eq!(report.tables, vec!["orders", "customers"]);

        let sql = "SELECT t.n FROM (SELECT COUNT(*) AS n FROM orders) AS t";
        let report = check(sql).unwrap();
        assert_eq!(report.tables, vec!["orders"]);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("subqueries")));

        let sql = "SELECT name FROM customers WHERE id IN (SELECT customer_id FROM orders)";
        assert!(check(sql).is_ok());
    }

    #[test]
    fn test_comma_joins() {
        let report = check(
            "SELECT p.name, c.name FROM products p, categories c WHERE p.category_id = c.id",
        )
        .unwrap();
        assert_eq!(report.tables, vec!["products", "categories"]);
    }

    #[test]
    fn test_performance_warnings() {
        let report = check("SELECT * FROM customers").unwrap();
        assert!(report.warnings[0].contains("SELECT * without LIMIT"));
        assert!(check("SELECT * FROM customers LIMIT 5")
            .unwrap()
            .warnings
            .is_empty());

        let sql = "SELECT oi.id FROM order_items oi \
                   JOIN orders o ON o.id = oi.order_id \
                   JOIN customers c ON c.id = o.customer_id \
                   JOIN products p ON p.id = oi.product_id \
                   JOIN categories cat ON cat.id = p.category_id";
        let report = check(sql).unwrap();
        assert!(report.warnings.iter().any(|w| w.contains("4 JOINs")));
    }

    #[test]
    fn test_empty_is_unparseable() {
        assert_eq!(check("  -- nothing"), Err(ValidationError::UnparseableOutput));
    }

    #[test]
    fn test_custom_lists() {
        let v = Validator::new(vec!["select".into()], vec!["pragma".into()]);
        assert!(matches!(
            v.validate("WITH x AS (SELECT 1) SELECT * FROM x", &store_catalog()),
            Err(ValidationError::DisallowedStatementType { .. })
        ));
        // UPDATE is not denied by this list, but only SELECT may lead.
        assert!(v
            .validate("SELECT id FROM customers WHERE name = 'UPDATE'", &store_catalog())
            .is_ok());
    }

    #[test]
    fn test_quoted_identifiers_must_resolve() {
        assert_eq!(unknown(r#"SELECT "nickname" FROM customers"#), "nickname");
        assert_eq!(unknown(r#"SELECT c."nickname" FROM customers c"#), "c.nickname");
        assert_eq!(unknown(r#"SELECT id FROM "payments""#), "payments");
    }

    #[test]
    fn test_cte_exposes_only_its_output_columns() {
        let cte = "WITH s AS (SELECT id FROM customers) ";
        assert!(check(&format!("{cte}SELECT s.id FROM s")).is_ok());
        assert_eq!(unknown(&format!("{cte}SELECT s.bogus FROM s")), "s.bogus");
        assert_eq!(unknown(&format!("{cte}SELECT s.email FROM s")), "s.email");
        assert_eq!(unknown(&format!("{cte}SELECT bogus FROM s")), "bogus");

        let star = "WITH s AS (SELECT * FROM customers) ";
        assert!(check(&format!("{star}SELECT s.email FROM s")).is_ok());
        assert_eq!(
            unknown(&format!("{star}SELECT s.total_amount FROM s")),
            "s.total_amount"
        );
    }

    #[test]
    fn test_derived_table_exposes_only_its_output_columns() {
        assert_eq!(
            unknown("SELECT t.id FROM (SELECT COUNT(*) AS n FROM orders) t"),
            "t.id"
        );
        assert_eq!(
            unknown("SELECT t.n FROM (SELECT customer_id AS n FROM orders WHERE bogus > 1) t"),
            "bogus"
        );
    }

    #[test]
    fn test_correlated_subquery_sees_outer_scope() {
        let sql = "SELECT c.name FROM customers c \
                   WHERE EXISTS (SELECT 1 FROM orders o WHERE o.customer_id = c.id)";
        assert_eq!(check(sql).unwrap().tables, vec!["customers", "orders"]);
        let sql = "SELECT c.name FROM customers c \
                   WHERE EXISTS (SELECT 1 FROM orders o WHERE o.email = c.email)";
        assert_eq!(unknown(sql), "o.email");
    }

    #[test]
    fn test_alias_hides_table_name() {
        assert_eq!(unknown("SELECT customers.id FROM customers c"), "customers");
        assert!(check("SELECT customers.id FROM customers").is_ok());
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(
            check("SELECT id FROM customers WHERE (id = 1"),
            Err(ValidationError::SyntaxError { .. })
        ));
        assert!(matches!(
            check("SELECT 'unterminated FROM customers"),
            Err(ValidationError::SyntaxError { .. })
        ));
    }
}
