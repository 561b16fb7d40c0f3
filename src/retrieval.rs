//! Retrieval-answer pipeline: embed the query, search the managed store
//! with bounded retry-on-corruption, assemble a bounded context, and call
//! the generation service.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::embeddings::EmbeddingProvider;
use crate::generation::GenerationProvider;
use crate::lifecycle::VectorstoreManager;
use crate::stores::VectorBackend;
use crate::types::{QueryHit, RagAnswer, RagError, SearchResponse};

/// Reply for blank queries; returned before any index access.
pub const EMPTY_QUERY_MESSAGE: &str = "Please provide a valid query.";

/// Reply when the search returns nothing. Not an error.
pub const NO_DOCUMENTS_MESSAGE: &str = "No relevant documents found for your query.";

/// Reply when the generation service fails.
pub const GENERATION_ERROR_MESSAGE: &str = "Error generating response with the model.";

/// Upper bound accepted for a caller-supplied `top_k`; anything outside
/// `1..=MAX_TOP_K` falls back to the configured default.
pub const MAX_TOP_K: usize = 20;

/// End-to-end query execution against the lifecycle-managed store.
pub struct RagPipeline {
    manager: Arc<VectorstoreManager>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
    retrieval_k: usize,
    max_context_chars: usize,
}

impl RagPipeline {
    pub fn new(
        manager: Arc<VectorstoreManager>,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
    ) -> Self {
        let config = manager.config();
        let retrieval_k = config.retrieval_k;
        let max_context_chars = config.max_context_chars;
        Self {
            manager,
            embedder,
            generator,
            retrieval_k,
            max_context_chars,
        }
    }

    /// Answers a query with generated text grounded in retrieved chunks.
    ///
    /// Every terminal outcome is a normal [`RagAnswer`]; failures surface as
    /// fixed, human-readable result strings with an empty source list.
    pub async fn answer(&self, query: &str) -> RagAnswer {
        let query = query.trim();
        if query.is_empty() {
            return RagAnswer {
                result: EMPTY_QUERY_MESSAGE.to_string(),
                source_documents: Vec::new(),
            };
        }

        let hits = match self.retrieve(query, self.retrieval_k).await {
            Ok(hits) => hits,
            Err(err) => {
                error!(error = %err, "retrieval failed");
                return RagAnswer {
                    result: format!("Error processing query: {err}"),
                    source_documents: Vec::new(),
                };
            }
        };

        if hits.is_empty() {
            return RagAnswer {
                result: NO_DOCUMENTS_MESSAGE.to_string(),
                source_documents: Vec::new(),
            };
        }

        let context = build_context(&hits, self.max_context_chars);
        let prompt = format_prompt(&context, query);
        let result = match self.generator.generate(&prompt).await {
            Ok(text) => text.trim().to_string(),
            Err(err) => {
                error!(error = %err, "generation failed");
                GENERATION_ERROR_MESSAGE.to_string()
            }
        };

        info!(sources = hits.len(), "generated answer");
        RagAnswer {
            result,
            source_documents: hits,
        }
    }

    /// The search-and-synthesize variant: retrieval only, always a
    /// structured [`SearchResponse`], never an error to the caller.
    pub async fn search(&self, query: &str, top_k: usize) -> SearchResponse {
        let query = query.trim().to_string();
        if query.is_empty() {
            return SearchResponse {
                success: false,
                query,
                results_count: 0,
                results: Vec::new(),
                message: "query must be a non-empty string".to_string(),
            };
        }

        let k = if (1..=MAX_TOP_K).contains(&top_k) {
            top_k
        } else {
            self.retrieval_k
        };

        match self.retrieve(&query, k).await {
            Ok(results) => {
                let message = if results.is_empty() {
                    "No relevant documents found".to_string()
                } else {
                    format!("Found {} relevant document(s)", results.len())
                };
                SearchResponse {
                    success: true,
                    results_count: results.len(),
                    results,
                    message,
                    query,
                }
            }
            Err(err) => SearchResponse {
                success: false,
                query,
                results_count: 0,
                results: Vec::new(),
                message: format!("Error processing query: {err}"),
            },
        }
    }

    /// Similarity search with exactly one reset-and-retry when the first
    /// attempt fails with a corruption-classified error.
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<QueryHit>, RagError> {
        match self.retrieve_once(query, k).await {
            Ok(hits) => Ok(hits),
            Err(err) if err.is_corruption() => {
                info!(error = %err, "storage corruption during retrieval, resetting vectorstore");
                self.manager.reset().await;
                self.retrieve_once(query, k).await
            }
            Err(err) => Err(err),
        }
    }

    async fn retrieve_once(&self, query: &str, k: usize) -> Result<Vec<QueryHit>, RagError> {
        let store = self.manager.get_or_create().await?;
        let query_embedding = self.embedder.embed_query(query).await?;
        let matches = store.search_similar(&query_embedding, k).await?;
        debug!(hits = matches.len(), k, "similarity search complete");

        Ok(matches
            .into_iter()
            .map(|(record, distance)| QueryHit {
                content: record.content,
                score: round4(1.0 - distance),
                source: record.source,
                source_path: record.source_path,
                chunk_index: record.chunk_index,
            })
            .collect())
    }
}

fn round4(value: f32) -> f32 {
    (value * 10_000.0).round() / 10_000.0
}

/// Concatenates chunk texts with blank-line separators, truncated to
/// `max_chars` characters. Truncation may cut mid-chunk; that is the
/// accepted trade-off for bounding prompt size.
fn build_context(hits: &[QueryHit], max_chars: usize) -> String {
    let context = hits
        .iter()
        .map(|hit| hit.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    if context.chars().count() > max_chars {
        context.chars().take(max_chars).collect()
    } else {
        context
    }
}

/// Formats the generation prompt; falls back to a context-free prompt when
/// truncation leaves nothing.
fn format_prompt(context: &str, query: &str) -> String {
    if context.trim().is_empty() {
        format!("Answer: {query}")
    } else {
        format!("Answer based on context: {context}... Question: {query}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(content: &str) -> QueryHit {
        QueryHit {
            content: content.to_string(),
            score: 0.9,
            source: "case.txt".to_string(),
            source_path: "/tmp/case.txt".to_string(),
            chunk_index: 0,
        }
    }

    #[test]
    fn context_joins_with_blank_lines() {
        let context = build_context(&[hit("first"), hit("second")], 1000);
        assert_eq!(context, "first\n\nsecond");
    }

    #[test]
    fn context_truncates_to_max_chars() {
        let context = build_context(&[hit(&"x".repeat(600)), hit(&"y".repeat(600))], 1000);
        assert_eq!(context.chars().count(), 1000);
    }

    #[test]
    fn prompt_falls_back_without_context() {
        assert_eq!(format_prompt("", "who?"), "Answer: who?");
        assert_eq!(format_prompt("  \n ", "who?"), "Answer: who?");
        assert!(format_prompt("ctx", "who?").starts_with("Answer based on context: ctx"));
    }

    #[test]
    fn scores_round_to_four_decimals() {
        assert!((round4(0.123_456) - 0.1235).abs() < 1e-6);
        assert_eq!(round4(1.0), 1.0);
    }
}
