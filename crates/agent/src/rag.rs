//! RAG pipeline — Retrieval-Augmented Generation over indexed course
//! material.
//!
//! # Flow
//!
//! `START → RETRIEVE → GENERATE → END`, strictly in that order.
//!
//! 1. **Retrieve**: run `search_regulations` for the question, scoped to
//!    the course, and render the hits as a markdown context block
//! 2. **Generate**: answer from that context only, citing how many
//!    materials were used
//!
//! Neither stage fails the turn on its own: retrieval problems become an
//! error string in the context, and a failed generation becomes a fixed
//! apology. Either way exactly one assistant message is appended.

use crate::prompts::RAG_PROMPT;
use crate::sink::EventSink;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use unidesk_core::event::{GENERATE_NODE, RETRIEVE_NODE, TurnError};
use unidesk_core::message::{Message, MessageToolCall};
use unidesk_core::provider::{Provider, ProviderRequest};
use unidesk_core::retrieval::{COURSE_ID_KEY, DEFAULT_K, clamp_k};
use unidesk_core::session::Session;
use unidesk_core::tool::{ToolCall, ToolContext, ToolRegistry};
use unidesk_tools::regulation_search::TOOL_NAME as SEARCH_TOOL;

pub const MISSING_COURSE_CONTEXT: &str = "Error: No course_id provided";
pub const NO_MATERIALS_CONTEXT: &str = "No relevant course materials found for this query.";
pub const GENERATION_FAILED_MESSAGE: &str =
    "I apologize, but I encountered an error while generating the response. Please try again.";

/// Pipeline position. Advances strictly forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RagStage {
    Start,
    Retrieve,
    Generate,
    End,
}

impl RagStage {
    pub fn next(self) -> Self {
        match self {
            Self::Start => Self::Retrieve,
            Self::Retrieve => Self::Generate,
            Self::Generate | Self::End => Self::End,
        }
    }
}

/// What to look up, and where.
#[derive(Debug, Clone)]
pub struct RagInput {
    pub query: String,
    pub course_id: Option<String>,
    pub k: usize,
    pub score_threshold: f32,
}

impl RagInput {
    pub fn new(query: impl Into<String>, course_id: Option<String>) -> Self {
        Self {
            query: query.into(),
            course_id,
            k: DEFAULT_K,
            score_threshold: 0.0,
        }
    }

    pub fn with_k(mut self, k: i64) -> Self {
        self.k = clamp_k(k);
        self
    }

    pub fn with_threshold(mut self, score_threshold: f32) -> Self {
        self.score_threshold = score_threshold;
        self
    }
}

/// One retrieved passage, as reported by the search tool.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Passage {
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub relevance_score: f32,
}

/// Everything a pipeline run produced.
#[derive(Debug, Clone)]
pub struct RagOutcome {
    pub context: String,
    pub passages: Vec<Passage>,
    pub answer: String,
}

pub struct RagPipeline {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    tools: Arc<ToolRegistry>,
}

impl RagPipeline {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            tools,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: Option<u32>) -> Self {
        self.max_tokens = max;
        self
    }

    /// Run the pipeline. The session's last message is taken to be the
    /// question; the answer is appended after it.
    pub async fn run(
        &self,
        input: &RagInput,
        session: &mut Session,
        ctx: &mut ToolContext,
        sink: &EventSink,
    ) -> Result<RagOutcome, TurnError> {
        let mut stage = RagStage::Start;
        let mut context = String::new();
        let mut passages = Vec::new();
        let mut answer = String::new();

        loop {
            match stage {
                RagStage::Start => {}
                RagStage::Retrieve => {
                    (context, passages) = self.retrieve(input, ctx, sink).await?;
                    sink.finished(RETRIEVE_NODE).await?;
                }
                RagStage::Generate => {
                    answer = self.generate(input, session, &context, passages.len()).await;
                    let message = Message::assistant(answer.clone());
                    session.append(message.clone());
                    sink.delta(GENERATE_NODE, answer.as_str()).await?;
                    sink.message(GENERATE_NODE, message).await?;
                    sink.finished(GENERATE_NODE).await?;
                }
                RagStage::End => break,
            }
            let next = stage.next();
            debug!(from = ?stage, to = ?next, "RAG stage transition");
            stage = next;
        }

        Ok(RagOutcome {
            context,
            passages,
            answer,
        })
    }

    async fn retrieve(
        &self,
        input: &RagInput,
        ctx: &mut ToolContext,
        sink: &EventSink,
    ) -> Result<(String, Vec<Passage>), TurnError> {
        let Some(course_id) = input
            .course_id
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
        else {
            error!("No course_id provided for retrieval");
            return Ok((MISSING_COURSE_CONTEXT.to_string(), Vec::new()));
        };

        info!(course_id, query = %input.query, k = input.k, "RAG: retrieving");

        let call = ToolCall {
            id: format!("call_{}", uuid::Uuid::new_v4().simple()),
            name: SEARCH_TOOL.to_string(),
            arguments: serde_json::json!({
                "query": input.query,
                "course_id": course_id,
                "k": input.k,
                "score_threshold": input.score_threshold,
            }),
        };
        let request = MessageToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.to_string(),
        };
        sink.message(RETRIEVE_NODE, Message::tool_call("", vec![request]))
            .await?;

        let result = self.tools.execute(&call, ctx).await;
        sink.message(
            RETRIEVE_NODE,
            Message::tool_result(&result.call_id, &result.name, result.output.as_str()),
        )
        .await?;

        match parse_search_output(&result.output) {
            Ok(passages) => {
                info!(course_id, documents = passages.len(), "RAG: retrieved");
                Ok((format_context(&passages), passages))
            }
            Err(reason) => {
                warn!(course_id, error = %reason, "RAG: retrieval failed");
                Ok((format!("Error retrieving documents: {reason}"), Vec::new()))
            }
        }
    }

    async fn generate(&self, input: &RagInput, session: &Session, context: &str, sources: usize) -> String {
        let course_id = input.course_id.as_deref().unwrap_or("unknown");

        let mut messages = vec![
            Message::system(RAG_PROMPT),
            Message::system(format!("Course ID: {course_id}\n\n{context}")),
        ];
        messages.extend(prior_turns(session));
        messages.push(Message::user(input.query.as_str()));

        let mut request = ProviderRequest::new(self.model.clone(), messages);
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;

        info!(context_chars = context.len(), "RAG: generating");
        match self.provider.complete(request).await {
            Ok(response) => {
                let mut answer = response.message.content().to_string();
                if sources > 0 {
                    answer.push_str(&format!("\n\n---\n*Based on {sources} course material(s)*"));
                }
                debug!(chars = answer.len(), "RAG: generated answer");
                answer
            }
            Err(e) => {
                error!(error = %e, "RAG: generation failed");
                GENERATION_FAILED_MESSAGE.to_string()
            }
        }
    }
}

/// User and assistant turns before the current question.
fn prior_turns(session: &Session) -> Vec<Message> {
    let history = session.history();
    let prior = match history.last() {
        Some(last) if last.is_user() => &history[..history.len() - 1],
        _ => history,
    };
    prior
        .iter()
        .filter(|m| m.is_user() || m.is_assistant())
        .cloned()
        .collect()
}

/// Read the search tool's output. `Err` carries the reason when the tool
/// reported a failure.
pub fn parse_search_output(output: &str) -> Result<Vec<Passage>, String> {
    let value: Value = serde_json::from_str(output).map_err(|e| format!("invalid search output: {e}"))?;

    if let Some(err) = value.get("error") {
        let reason = value
            .get("detail")
            .and_then(Value::as_str)
            .or_else(|| err.as_str())
            .unwrap_or("unknown error");
        return Err(reason.to_string());
    }

    match value.get("results") {
        Some(results) => serde_json::from_value(results.clone()).map_err(|e| format!("invalid search results: {e}")),
        None => Ok(Vec::new()),
    }
}

/// Render retrieved passages as the generation context.
pub fn format_context(passages: &[Passage]) -> String {
    if passages.is_empty() {
        return NO_MATERIALS_CONTEXT.to_string();
    }

    let mut parts = vec!["# Retrieved Course Materials\n".to_string()];
    for (i, passage) in passages.iter().enumerate() {
        parts.push(format!("## Document {} (Relevance: {:.2})", i + 1, passage.relevance_score));

        if !passage.metadata.is_empty() {
            parts.push("**Metadata:**".to_string());
            let mut keys: Vec<&String> = passage.metadata.keys().filter(|k| *k != COURSE_ID_KEY).collect();
            keys.sort();
            for key in keys {
                let value = match &passage.metadata[key] {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                parts.push(format!("- {key}: {value}"));
            }
        }

        parts.push(format!("\n**Content:**\n{}\n", passage.content));
        parts.push("---\n".to_string());
    }
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::RawItem;
    use crate::test_helpers::*;
    use unidesk_core::event::ExecutionEvent;
    use unidesk_core::retrieval::Document;
    use unidesk_memory::{InMemoryVectorStore, Retriever};
    use unidesk_core::error::RetrievalError;
    use unidesk_core::retrieval::Embedder;
    use unidesk_tools::SearchRegulationsTool;

    struct UnitEmbedder;

    #[async_trait::async_trait]
    impl Embedder for UnitEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, RetrievalError> {
            Ok(vec![1.0, 0.0])
        }
    }

    async fn registry() -> Arc<ToolRegistry> {
        let store = InMemoryVectorStore::new();
        store
            .insert(
                Document::new("Staj 30 iş günüdür.")
                    .with_metadata(COURSE_ID_KEY, "regulations")
                    .with_metadata("source", "staj_yonergesi.pdf")
                    .with_metadata("page", 4),
                vec![1.0, 0.0],
            )
            .await;
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(SearchRegulationsTool::new(Retriever::new(
            Arc::new(UnitEmbedder),
            Arc::new(store),
        ))));
        Arc::new(registry)
    }

    fn drain(rx: &mut tokio::sync::mpsc::Receiver<RawItem>) -> Vec<ExecutionEvent> {
        let mut events = Vec::new();
        while let Ok(item) = rx.try_recv() {
            events.push(item.unwrap());
        }
        events
    }

    fn session(question: &str) -> Session {
        let mut s = Session::new("t1");
        s.append(Message::user("Merhaba"));
        s.append(Message::assistant("Merhaba, nasıl yardımcı olabilirim?"));
        s.append(Message::user(question));
        s
    }

    #[test]
    fn stages_advance_in_order() {
        let mut stage = RagStage::Start;
        let mut seen = vec![stage];
        while stage != RagStage::End {
            stage = stage.next();
            seen.push(stage);
        }
        assert_eq!(
            seen,
            vec![RagStage::Start, RagStage::Retrieve, RagStage::Generate, RagStage::End]
        );
        assert_eq!(RagStage::End.next(), RagStage::End);
    }

    #[test]
    fn context_layout() {
        let mut metadata = Map::new();
        metadata.insert("source".into(), Value::String("yonetmelik.pdf".into()));
        metadata.insert("course_id".into(), Value::String("regulations".into()));
        metadata.insert("page".into(), Value::from(3));
        let passages = vec![Passage {
            content: "Mazeret sınavı başvurusu 5 gün içinde yapılır.".into(),
            metadata,
            relevance_score: 0.8333,
        }];

        let expected = "# Retrieved Course Materials\n\n\
            ## Document 1 (Relevance: 0.83)\n\
            **Metadata:**\n\
            - page: 3\n\
            - source: yonetmelik.pdf\n\
            \n**Content:**\nMazeret sınavı başvurusu 5 gün içinde yapılır.\n\n\
            ---\n";
        assert_eq!(format_context(&passages), expected);
        assert_eq!(format_context(&[]), NO_MATERIALS_CONTEXT);
    }

    #[test]
    fn search_output_errors_are_reasons() {
        let err = parse_search_output(
            r#"{"error": "Error querying vector store: down", "detail": "down", "query": "q", "num_results": 0, "results": []}"#,
        )
        .unwrap_err();
        assert_eq!(err, "down");

        let err = parse_search_output(r#"{"error": "Tool timed out: search_regulations after 60s", "tool": "search_regulations"}"#)
            .unwrap_err();
        assert!(err.contains("timed out"));

        let ok = parse_search_output(r#"{"query": "q", "num_results": 1, "results": [{"content": "x", "metadata": {}, "relevance_score": 0.5}]}"#)
            .unwrap();
        assert_eq!(ok.len(), 1);
    }

    #[tokio::test]
    async fn full_run_retrieves_then_generates() {
        let provider = Arc::new(SequentialMockProvider::single_text("Staj süresi 30 iş günüdür."));
        let pipeline = RagPipeline::new(provider.clone(), "mock-model", registry().await);
        let (sink, mut rx) = EventSink::channel();
        let mut session = session("Staj kaç gün?");
        let mut ctx = ToolContext::default();

        let input = RagInput::new("Staj kaç gün?", Some("regulations".into()));
        let outcome = pipeline.run(&input, &mut session, &mut ctx, &sink).await.unwrap();

        assert_eq!(outcome.passages.len(), 1);
        assert!(outcome.context.contains("- source: staj_yonergesi.pdf"));
        assert_eq!(
            outcome.answer,
            "Staj süresi 30 iş günüdür.\n\n---\n*Based on 1 course material(s)*"
        );
        assert_eq!(session.history().len(), 4);
        assert_eq!(session.history()[3].content(), outcome.answer);
        assert_eq!(ctx.scratch["last_regulation_query"], "Staj kaç gün?");

        // prompt: header, course context, prior turns, question
        let requests = provider.requests();
        let messages = &requests[0].messages;
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[0].content(), RAG_PROMPT);
        assert!(messages[1].content().starts_with("Course ID: regulations\n\n# Retrieved"));
        assert_eq!(messages[2].content(), "Merhaba");
        assert_eq!(messages[4].content(), "Staj kaç gün?");

        let nodes: Vec<String> = drain(&mut rx)
            .iter()
            .map(|e| match e {
                ExecutionEvent::Message { node, message } => format!("{node}:{:?}", message.role()),
                ExecutionEvent::Delta { node, .. } => format!("{node}:delta"),
                ExecutionEvent::NodeFinished { node } => format!("{node}:finished"),
                ExecutionEvent::Custom { node, .. } => format!("{node}:custom"),
            })
            .collect();
        assert_eq!(
            nodes,
            vec![
                "retrieve:Assistant",
                "retrieve:Tool",
                "retrieve:finished",
                "generate:delta",
                "generate:Assistant",
                "generate:finished",
            ]
        );
    }

    #[tokio::test]
    async fn missing_course_skips_search() {
        let provider = Arc::new(SequentialMockProvider::single_text("Bilgi bulunamadı."));
        let pipeline = RagPipeline::new(provider.clone(), "mock-model", registry().await);
        let (sink, mut rx) = EventSink::channel();
        let mut session = session("Staj kaç gün?");
        let mut ctx = ToolContext::default();

        let outcome = pipeline
            .run(&RagInput::new("Staj kaç gün?", None), &mut session, &mut ctx, &sink)
            .await
            .unwrap();

        assert_eq!(outcome.context, MISSING_COURSE_CONTEXT);
        assert_eq!(outcome.answer, "Bilgi bulunamadı.");
        assert!(ctx.scratch.is_empty());
        assert!(
            !drain(&mut rx)
                .iter()
                .any(|e| matches!(e, ExecutionEvent::Message { node, .. } if node == RETRIEVE_NODE))
        );
        let requests = provider.requests();
        assert!(requests[0].messages[1].content().contains(MISSING_COURSE_CONTEXT));
    }

    #[tokio::test]
    async fn generation_failure_still_answers_once() {
        let pipeline = RagPipeline::new(Arc::new(FailingProvider), "mock-model", registry().await);
        let (sink, _rx) = EventSink::channel();
        let mut session = session("Staj kaç gün?");

        let outcome = pipeline
            .run(
                &RagInput::new("Staj kaç gün?", Some("regulations".into())),
                &mut session,
                &mut ToolContext::default(),
                &sink,
            )
            .await
            .unwrap();

        assert_eq!(outcome.answer, GENERATION_FAILED_MESSAGE);
        let assistants = session.history().iter().filter(|m| m.is_assistant()).count();
        assert_eq!(assistants, 2);
        assert_eq!(session.history().last().unwrap().content(), GENERATION_FAILED_MESSAGE);
    }

    #[tokio::test]
    async fn unknown_course_yields_empty_context() {
        let provider = Arc::new(SequentialMockProvider::single_text("Materyal yok."));
        let pipeline = RagPipeline::new(provider, "mock-model", registry().await);
        let (sink, _rx) = EventSink::channel();
        let mut session = session("Ödev ne zaman?");

        let outcome = pipeline
            .run(
                &RagInput::new("Ödev ne zaman?", Some("eem999".into())),
                &mut session,
                &mut ToolContext::default(),
                &sink,
            )
            .await
            .unwrap();
        assert_eq!(outcome.context, NO_MATERIALS_CONTEXT);
        assert_eq!(outcome.answer, "Materyal yok.");
    }
}
