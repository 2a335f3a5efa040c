//! `search_regulations`: semantic search over the indexed regulation texts.

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;
use unidesk_core::error::ToolError;
use unidesk_core::retrieval::{DEFAULT_K, MAX_K, RetrievalQuery};
use unidesk_core::tool::{Tool, ToolContext};
use unidesk_memory::Retriever;

pub const TOOL_NAME: &str = "search_regulations";

/// Scratch key holding the chunks of the most recent search.
pub const RESULTS_KEY: &str = "regulation_search_results";

/// Scratch key holding the most recent search query.
pub const LAST_QUERY_KEY: &str = "last_regulation_query";

pub struct SearchRegulationsTool {
    retriever: Retriever,
    default_course_id: Option<String>,
}

impl SearchRegulationsTool {
    pub fn new(retriever: Retriever) -> Self {
        Self {
            retriever,
            default_course_id: None,
        }
    }

    /// Course searched when neither the arguments nor the turn name one.
    pub fn with_default_course(mut self, course_id: impl Into<String>) -> Self {
        self.default_course_id = Some(course_id.into());
        self
    }
}

#[async_trait]
impl Tool for SearchRegulationsTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Search the university's regulations (yönetmelik) and course materials by meaning. \
         Returns the most relevant passages with their metadata and relevance score."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to look for, in natural language"
                },
                "course_id": {
                    "type": "string",
                    "description": "Index partition to search (defaults to the regulations)"
                },
                "k": {
                    "type": "integer",
                    "description": format!("Number of passages to return (1-{MAX_K}, default {DEFAULT_K})"),
                    "default": DEFAULT_K
                },
                "score_threshold": {
                    "type": "number",
                    "description": "Minimum relevance score in [0, 1] (default 0)",
                    "default": 0.0
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: Value, ctx: &mut ToolContext) -> Result<Value, ToolError> {
        let query_text = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        let course_id = arguments["course_id"]
            .as_str()
            .map(str::to_string)
            .or_else(|| ctx.course_id.clone())
            .or_else(|| self.default_course_id.clone());

        let mut query = RetrievalQuery::new(query_text, course_id);
        if let Some(k) = arguments["k"].as_i64() {
            query = query.with_k(k);
        }
        if let Some(threshold) = arguments["score_threshold"].as_f64() {
            query = query.with_threshold(threshold as f32);
        }

        let chunks = match self.retriever.retrieve(&query).await {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(query = query_text, error = %e, "Regulation search failed");
                return Ok(serde_json::json!({
                    "error": format!("Error querying vector store: {e}"),
                    "detail": e.to_string(),
                    "query": query_text,
                    "num_results": 0,
                    "results": [],
                }));
            }
        };

        let results: Vec<Value> = chunks
            .iter()
            .map(|c| {
                serde_json::json!({
                    "content": c.content,
                    "metadata": c.metadata,
                    "relevance_score": c.relevance_score,
                })
            })
            .collect();

        ctx.scratch
            .insert(RESULTS_KEY.into(), Value::Array(results.clone()));
        ctx.scratch
            .insert(LAST_QUERY_KEY.into(), Value::String(query_text.to_string()));

        Ok(serde_json::json!({
            "query": query_text,
            "num_results": results.len(),
            "results": results,
        }))
    }
}
