//! Plain-language explanation of a SQL statement.

use std::time::Duration;

use anyhow::{bail, Result};

use sql_copilot_core::extract::extract_sql;
use sql_copilot_core::prompt::explanation_prompt;
use sql_copilot_core::synthesis::LanguageModel;

use crate::config::Config;
use crate::llm;

/// Ask `model` to explain `sql` step by step.
pub async fn explain_sql(
    model: &dyn LanguageModel,
    sql: &str,
    timeout: Duration,
) -> Result<String> {
    let sql = sql.trim();
    if sql.is_empty() {
        bail!("sql must not be empty");
    }
    // Accept pasted model output as well as bare SQL.
    let statement = extract_sql(sql).unwrap_or_else(|| sql.to_string());
    let text = model
        .generate(&explanation_prompt(&statement), timeout)
        .await?;
    Ok(text.trim().to_string())
}

/// Run `copilot explain`.
pub async fn run_explain(config: &Config, sql: &str) -> Result<()> {
    let model = llm::create_model(&config.llm)?;
    let timeout = Duration::from_secs(config.synthesis.generation_timeout_secs);
    let explanation = explain_sql(model.as_ref(), sql, timeout).await?;
    println!("{}", explanation);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sql_copilot_core::error::GenerationError;
    use std::sync::Mutex;

    struct EchoModel {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LanguageModel for EchoModel {
        fn model_name(&self) -> &str {
            "echo"
        }
        async fn generate(
            &self,
            prompt: &str,
            _timeout: Duration,
        ) -> Result<String, GenerationError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("  It lists customers.  ".to_string())
        }
    }

    #[tokio::test]
    async fn test_explain_uses_extracted_statement() {
        let model = EchoModel {
            prompts: Mutex::new(Vec::new()),
        };
        let text = explain_sql(
            &model,
            "```sql\nSELECT name FROM customers;\n```",
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert_eq!(text, "It lists customers.");

        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].contains("SELECT name FROM customers"));
        assert!(!prompts[0].contains("customers;"));
    }

    #[tokio::test]
    async fn test_explain_rejects_empty_sql() {
        let model = EchoModel {
            prompts: Mutex::new(Vec::new()),
        };
        assert!(explain_sql(&model, "   ", Duration::from_secs(1)).await.is_err());
        assert!(model.prompts.lock().unwrap().is_empty());
    }
}
