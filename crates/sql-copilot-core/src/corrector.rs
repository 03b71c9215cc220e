//! Repair prompts for failed attempts.
//!
//! The correction prompt carries the original question, the same schema
//! excerpt, and only the most recent failure: the SQL that failed and why.
//! Older failures are not repeated.

use crate::prompt::{response_format, sql_rules};

/// Longest slice of a failed attempt quoted back to the model.
const MAX_FAILED_SQL_CHARS: usize = 4000;

/// Build the prompt for the next round after a validation or execution failure.
pub fn build_correction_prompt(
    original_question: &str,
    schema_excerpt: &str,
    failed_sql: &str,
    error_description: &str,
) -> String {
    let failed: String = failed_sql.trim().chars().take(MAX_FAILED_SQL_CHARS).collect();
    format!(
        "You translate questions about a SQLite database into SQL. \
         Your previous answer was rejected; fix it.\n\n\
         DATABASE SCHEMA:\n{schema_excerpt}\n\n\
         QUESTION:\n{original_question}\n\n\
         PREVIOUS QUERY:\n```sql\n{failed}\n```\n\n\
         ERROR:\n{error_description}\n\n\
         RULES:\n{rules}\n\n\
         Correct the query so it answers the question and avoids the error.\n\n\
         {format}\n",
        rules = sql_rules(),
        format = response_format(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_all_inputs() {
        let p = build_correction_prompt(
            "Top customers",
            "Table: customers (2 rows)",
            "DROP TABLE customers",
            "disallowed statement type: DROP",
        );
        assert!(p.contains("QUESTION:\nTop customers"));
        assert!(p.contains("Table: customers (2 rows)"));
        assert!(p.contains("```sql\nDROP TABLE customers\n```"));
        assert!(p.contains("ERROR:\ndisallowed statement type: DROP"));
    }

    #[test]
    fn test_pure() {
        let a = build_correction_prompt("q", "s", "SELECT x", "no such column: x");
        let b = build_correction_prompt("q", "s", "SELECT x", "no such column: x");
        assert_eq!(a, b);
    }

    #[test]
    fn test_long_failed_output_truncated() {
        let long = "x".repeat(MAX_FAILED_SQL_CHARS * 2);
        let p = build_correction_prompt("q", "s", &long, "e");
        assert!(p.len() < MAX_FAILED_SQL_CHARS * 2);
    }
}
