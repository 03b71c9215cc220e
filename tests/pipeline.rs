//! End-to-end pipeline tests over the sample database with a deterministic
//! embedder and a scripted language model.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use sql_copilot::config::Config;
use sql_copilot::pipeline::Pipeline;
use sql_copilot::sample::create_sample_db;
use sql_copilot_core::embedding::Embedder;
use sql_copilot_core::error::GenerationError;
use sql_copilot_core::indexer::IndexMode;
use sql_copilot_core::synthesis::{LanguageModel, SynthesisOutcome};

const VOCAB: &[&str] = &[
    "customer", "order", "product", "review", "rating", "categor", "price", "email", "city",
    "quantity", "status", "comment",
];

/// Bag-of-stems embedder: one dimension per vocabulary stem.
struct StemEmbedder;

#[async_trait]
impl Embedder for StemEmbedder {
    fn model_name(&self) -> &str {
        "stems"
    }

    fn dims(&self) -> usize {
        VOCAB.len()
    }

    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let lower = t.to_lowercase();
                VOCAB
                    .iter()
                    .map(|stem| lower.matches(stem).count() as f32)
                    .collect()
            })
            .collect())
    }
}

/// Returns its replies in order, repeating the last one.
struct ScriptedModel {
    replies: Vec<&'static str>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn new(replies: Vec<&'static str>) -> Self {
        Self {
            replies,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        prompt: &str,
        _timeout: Duration,
    ) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.replies[n.min(self.replies.len() - 1)];
        Ok(reply.to_string())
    }
}

async fn open(dir: &TempDir) -> Pipeline {
    let db_path = dir.path().join("ecommerce.db");
    create_sample_db(&db_path, false).await.unwrap();

    let mut config = Config::for_database(&db_path);
    config.index.path = dir.path().join("schema_index.sqlite");
    config.embedding.provider = "ollama".to_string();
    config.embedding.model = Some("stems".to_string());

    let embedder: Arc<dyn Embedder> = Arc::new(StemEmbedder);
    Pipeline::open_with_embedder(&config, Some(embedder))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_reindex_is_incremental() {
    let dir = TempDir::new().unwrap();
    let pipeline = open(&dir).await;

    let first = pipeline.reindex(&IndexMode::Incremental, 4).await.unwrap();
    assert_eq!(first.indexed.len(), 6);
    assert!(first.failed.is_empty());

    let second = pipeline.reindex(&IndexMode::Incremental, 4).await.unwrap();
    assert!(second.indexed.is_empty());
    assert_eq!(second.skipped.len(), 6);

    let rebuilt = pipeline.reindex(&IndexMode::Rebuild, 4).await.unwrap();
    assert_eq!(rebuilt.indexed.len(), 6);

    pipeline.close().await;
}

#[tokio::test]
async fn test_retrieval_narrows_context() {
    let dir = TempDir::new().unwrap();
    let pipeline = open(&dir).await;
    pipeline.reindex(&IndexMode::Incremental, 8).await.unwrap();

    let config = pipeline.config.synthesis_config();
    assert!(config.rag_enabled);

    let (retrieval, excerpt) = pipeline
        .retrieve("average review rating and comment", &config)
        .await;
    let result = retrieval.unwrap();
    assert_eq!(result.table_names()[0], "reviews");
    assert!(!excerpt.is_fallback());
    assert!(excerpt.text.contains("reviews"));

    pipeline.close().await;
}

#[tokio::test]
async fn test_empty_index_falls_back_to_full_catalog() {
    let dir = TempDir::new().unwrap();
    let pipeline = open(&dir).await;

    let config = pipeline.config.synthesis_config();
    let (retrieval, excerpt) = pipeline.retrieve("orders per customer", &config).await;
    assert!(retrieval.is_err());
    assert!(excerpt.is_fallback());
    assert_eq!(excerpt.tables.len(), 6);

    pipeline.close().await;
}

#[tokio::test]
async fn test_ask_corrects_after_validation_error() {
    let dir = TempDir::new().unwrap();
    let pipeline = open(&dir).await;
    pipeline.reindex(&IndexMode::Incremental, 8).await.unwrap();

    let model = Arc::new(ScriptedModel::new(vec![
        "SELECT p.name, AVG(r.stars) FROM reviews r JOIN products p ON p.id = r.product_id GROUP BY p.name",
        "```sql\nSELECT p.name, AVG(r.rating) AS avg_rating\nFROM reviews r JOIN products p ON p.id = r.product_id\nGROUP BY p.name ORDER BY avg_rating DESC\n```",
    ]));
    let config = pipeline.config.synthesis_config();
    let outcome = pipeline
        .synthesizer(model.clone())
        .synthesize("average review rating per product", &config)
        .await;

    match &outcome {
        SynthesisOutcome::Success {
            attempts,
            rows,
            context,
            history,
            ..
        } => {
            assert_eq!(*attempts, 2);
            assert_eq!(history.len(), 2);
            assert_eq!(rows.columns, vec!["name", "avg_rating"]);
            assert!(!rows.rows.is_empty());
            assert!(context.tables.contains(&"reviews".to_string()));
            assert!(context.fallback.is_none());
        }
        other => panic!("expected success, got {:?}", other),
    }

    let prompts = model.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("stars"));

    pipeline.close().await;
}

#[tokio::test]
async fn test_ask_gives_up_after_max_rounds() {
    let dir = TempDir::new().unwrap();
    let pipeline = open(&dir).await;

    let model = Arc::new(ScriptedModel::new(vec!["DELETE FROM orders"]));
    let config = pipeline.config.request_config(Some(false), Some(3));
    let outcome = pipeline
        .synthesizer(model.clone())
        .synthesize("remove all orders", &config)
        .await;

    assert!(!outcome.is_success());
    assert_eq!(outcome.attempts(), 3);
    assert_eq!(model.calls.load(Ordering::SeqCst), 3);

    // Nothing was executed against the read-only target.
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(&pipeline.target)
        .await
        .unwrap();
    assert_eq!(count, 200);

    pipeline.close().await;
}
