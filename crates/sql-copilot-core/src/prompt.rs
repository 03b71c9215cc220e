//! Prompt templates for the language model.
//!
//! Templates are plain functions of their inputs so the exact text sent to
//! the model can be asserted in tests and replayed from logs.

/// Rules appended to every SQL-producing prompt.
const SQL_RULES: &str = "\
1. Write a single SQLite SELECT statement (a WITH clause is allowed).
2. Use only the tables and columns listed in the schema.
3. JOIN tables through the listed foreign keys.
4. Give tables short aliases and qualify columns with them.
5. Add a LIMIT clause when the result could be large.
6. Order the results in a way that answers the question.
7. Use aggregate functions (COUNT, SUM, AVG, ...) where the question asks for totals or rankings.";

const RESPONSE_FORMAT: &str = "\
Respond in exactly this format:

SQL:
```sql
<the query>
```

EXPLANATION:
<one or two sentences on how the query answers the question>

CONFIDENCE:
<High, Medium or Low>";

/// First-round prompt: question plus schema excerpt.
pub fn generation_prompt(question: &str, schema_excerpt: &str) -> String {
    format!(
        "You translate questions about a SQLite database into SQL.\n\n\
         DATABASE SCHEMA:\n{schema_excerpt}\n\n\
         RULES:\n{SQL_RULES}\n\n\
         QUESTION:\n{question}\n\n\
         {RESPONSE_FORMAT}\n"
    )
}

/// Ask the model to explain an existing statement in plain language.
pub fn explanation_prompt(sql: &str) -> String {
    format!(
        "Explain the following SQL query to someone who is learning SQL.\n\n\
         SQL QUERY:\n```sql\n{sql}\n```\n\n\
         Walk through it step by step:\n\
         1. What data it returns\n\
         2. Which tables it reads\n\
         3. Which filters apply\n\
         4. How the tables are joined, if they are\n\
         5. Any grouping or aggregation\n\
         6. How the results are sorted or limited\n\n\
         EXPLANATION:\n"
    )
}

pub(crate) fn response_format() -> &'static str {
    RESPONSE_FORMAT
}

pub(crate) fn sql_rules() -> &'static str {
    SQL_RULES
}
