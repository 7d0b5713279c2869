//! Answer generation grounded in retrieved chunks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::document::{Answer, Retrieved};
use crate::error::{RagError, Result};

/// A language-model backend: prompt in, response text out.
///
/// Non-streaming by design; the pipeline needs the complete response to
/// pair with its sources. Failures should map to
/// [`RagError::Generation`], which is retryable without rebuilding or
/// re-retrieving anything.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a response for the given prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// A human-readable name for the backend (logged, never parsed).
    fn name(&self) -> &str;
}

/// Composes the grounding context and invokes the language model.
pub struct AnswerGenerator {
    model: Arc<dyn LanguageModel>,
    context_budget: usize,
    timeout: Duration,
}

impl AnswerGenerator {
    /// Create a generator over the given model.
    ///
    /// `context_budget` caps the grounding context in characters;
    /// `timeout` bounds each model invocation.
    pub fn new(model: Arc<dyn LanguageModel>, context_budget: usize, timeout: Duration) -> Self {
        Self { model, context_budget, timeout }
    }

    /// Generate an answer for `query` grounded in `retrieved`.
    ///
    /// The retrieved chunks are rendered into the prompt in the order
    /// provided. If their total length exceeds the context budget, the
    /// lowest-scored chunks are dropped first — never silently: the
    /// returned [`Answer::truncated`] flag records it. The
    /// highest-scored chunk is always kept, even oversized.
    ///
    /// # Errors
    ///
    /// [`RagError::Generation`] on model failure and
    /// [`RagError::Timeout`] on elapse; neither invalidates the index or
    /// the retrieval result, so the caller may retry generation alone.
    pub async fn generate(&self, query: &str, retrieved: Retrieved) -> Result<Answer> {
        let (context, truncated) = build_context(&retrieved, self.context_budget);
        if truncated {
            warn!(
                budget = self.context_budget,
                retrieved = retrieved.len(),
                "grounding context exceeded the budget; dropped lowest-scored chunks"
            );
        }

        let prompt = compose_prompt(query, &context);

        let limit = self.timeout;
        let text = tokio::time::timeout(limit, self.model.generate(&prompt))
            .await
            .map_err(|_| RagError::Timeout { operation: "generation".to_string(), limit })??;

        info!(model = %self.model.name(), answer_len = text.len(), "answer generated");
        Ok(Answer { text, sources: retrieved, truncated })
    }
}

/// Render retrieved chunks into labeled context blocks, keeping the
/// longest prefix (best-scored first) that fits the budget.
fn build_context(retrieved: &Retrieved, budget: usize) -> (String, bool) {
    if retrieved.is_empty() {
        return (String::new(), false);
    }

    let blocks: Vec<String> = retrieved
        .results
        .iter()
        .map(|scored| {
            let source = scored
                .chunk
                .metadata
                .get("source")
                .cloned()
                .unwrap_or_else(|| scored.chunk.document_id.clone());
            format!("[{source} #{ordinal}]\n{text}", ordinal = scored.chunk.ordinal, text = scored.chunk.text)
        })
        .collect();

    let mut kept = 0;
    let mut used = 0;
    for block in &blocks {
        let cost = block.chars().count() + if kept > 0 { 2 } else { 0 };
        if kept > 0 && used + cost > budget {
            break;
        }
        kept += 1;
        used += cost;
    }

    (blocks[..kept].join("\n\n"), kept < blocks.len())
}

/// Compose the final prompt from the question and the grounding context.
fn compose_prompt(query: &str, context: &str) -> String {
    if context.is_empty() {
        return format!(
            "No supporting context was retrieved for this question. \
             Answer from the question alone, and say explicitly if you cannot.\n\n\
             Question: {query}"
        );
    }

    format!(
        "Answer the question using only the context below. \
         Cite the bracketed source labels you relied on. \
         If the context does not contain the answer, say so.\n\n\
         Context:\n{context}\n\n\
         Question: {query}"
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::document::{Chunk, Modality, ScoredChunk};

    struct EchoModel;

    #[async_trait]
    impl LanguageModel for EchoModel {
        async fn generate(&self, prompt: &str) -> Result<String> {
            Ok(prompt.to_string())
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    fn scored(ordinal: usize, text: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                id: format!("doc:{ordinal}"),
                document_id: "doc".to_string(),
                ordinal,
                text: text.to_string(),
                modality: Modality::Text,
                metadata: HashMap::new(),
            },
            score,
        }
    }

    #[tokio::test]
    async fn answer_carries_its_sources() {
        let retrieved =
            Retrieved { results: vec![scored(0, "Net income was $2M.", 0.9)] };
        let generator = AnswerGenerator::new(Arc::new(EchoModel), 6000, Duration::from_secs(5));

        let answer = generator.generate("What was net income?", retrieved).await.unwrap();
        assert!(answer.text.contains("Net income was $2M."));
        assert!(answer.text.contains("What was net income?"));
        assert_eq!(answer.sources.len(), 1);
        assert!(!answer.truncated);
    }

    #[tokio::test]
    async fn lowest_scored_chunks_are_dropped_first() {
        let retrieved = Retrieved {
            results: vec![
                scored(0, &"best ".repeat(10), 0.9),
                scored(1, &"middle ".repeat(10), 0.5),
                scored(2, &"worst ".repeat(10), 0.1),
            ],
        };
        let generator = AnswerGenerator::new(Arc::new(EchoModel), 160, Duration::from_secs(5));

        let answer = generator.generate("q", retrieved).await.unwrap();
        assert!(answer.truncated);
        assert!(answer.text.contains("best"));
        assert!(!answer.text.contains("worst"));
        // The full retrieval is still reported to the caller
        assert_eq!(answer.sources.len(), 3);
    }

    #[tokio::test]
    async fn the_top_chunk_survives_even_when_oversized() {
        let retrieved = Retrieved { results: vec![scored(0, &"x".repeat(500), 0.9)] };
        let generator = AnswerGenerator::new(Arc::new(EchoModel), 100, Duration::from_secs(5));

        let answer = generator.generate("q", retrieved).await.unwrap();
        assert!(answer.text.contains("xxx"));
        assert!(!answer.truncated);
    }

    #[tokio::test]
    async fn empty_retrieval_still_generates() {
        let generator = AnswerGenerator::new(Arc::new(EchoModel), 6000, Duration::from_secs(5));
        let answer = generator.generate("anything?", Retrieved::default()).await.unwrap();
        assert!(answer.text.contains("No supporting context"));
        assert!(answer.sources.is_empty());
    }

    #[tokio::test]
    async fn stalled_models_surface_timeouts() {
        struct Stalled;

        #[async_trait]
        impl LanguageModel for Stalled {
            async fn generate(&self, _prompt: &str) -> Result<String> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(String::new())
            }

            fn name(&self) -> &str {
                "stalled"
            }
        }

        let generator = AnswerGenerator::new(Arc::new(Stalled), 6000, Duration::from_millis(10));
        let err = generator.generate("q", Retrieved::default()).await.unwrap_err();
        assert!(matches!(err, RagError::Timeout { .. }));
        assert!(err.is_retryable());
    }
}
