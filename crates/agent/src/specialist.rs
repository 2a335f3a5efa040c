//! The tool-using specialist loop.
//!
//! 1. Send the system prompt and the thread's history to the LLM
//! 2. Stream any answer text out as it arrives
//! 3. **If tool calls**: execute them, append the results, loop back
//! 4. **If text only**: append it as the assistant message and stop
//!
//! The loop stops after a bounded number of LLM calls; in that case a
//! fixed assistant message is appended instead.

use crate::sink::EventSink;
use std::sync::Arc;
use tracing::{debug, info, warn};
use unidesk_core::error::ToolError;
use unidesk_core::event::{TOOLS_NODE, TurnError};
use unidesk_core::message::{Message, MessageToolCall};
use unidesk_core::provider::{Provider, ProviderRequest, ToolDefinition};
use unidesk_core::session::Session;
use unidesk_core::tool::{ToolCall, ToolContext, ToolRegistry, ToolResult};

pub const DEFAULT_MAX_ITERATIONS: u32 = 25;

pub const MAX_ITERATIONS_MESSAGE: &str =
    "I've reached the maximum number of tool call iterations. Please provide further guidance.";

/// A specialist that answers by calling tools in a loop.
pub struct ToolAgent {
    /// Node name reported on every event this agent emits
    name: String,
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    tools: Arc<ToolRegistry>,
    /// Names of the registry tools this agent may call
    allowed_tools: Vec<String>,
    max_iterations: u32,
}

impl ToolAgent {
    pub fn new(
        name: impl Into<String>,
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
        allowed_tools: &[&str],
    ) -> Self {
        Self {
            name: name.into(),
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            tools,
            allowed_tools: allowed_tools.iter().map(|s| s.to_string()).collect(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
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

    /// Set the maximum number of LLM calls per turn.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let names: Vec<&str> = self.allowed_tools.iter().map(String::as_str).collect();
        self.tools.definitions_for(&names)
    }

    /// Run the loop against `session`, appending exactly one assistant
    /// message (plus any tool-call and tool-result messages) to it.
    pub async fn run(
        &self,
        system_prompt: &str,
        session: &mut Session,
        ctx: &mut ToolContext,
        sink: &EventSink,
    ) -> Result<(), TurnError> {
        info!(
            agent = %self.name,
            thread_id = %session.thread_id,
            messages = session.history().len(),
            "Specialist processing turn"
        );

        let definitions = self.tool_definitions();

        for iteration in 1..=self.max_iterations {
            debug!(agent = %self.name, iteration, "Agent loop iteration");

            let mut messages = Vec::with_capacity(session.history().len() + 1);
            messages.push(Message::system(system_prompt));
            messages.extend(session.history().iter().cloned());

            let mut request = ProviderRequest::new(self.model.clone(), messages);
            request.temperature = self.temperature;
            request.max_tokens = self.max_tokens;
            request.tools = definitions.clone();
            request.stream = true;

            let (content, calls) = self.stream_reply(request, sink).await?;

            if calls.is_empty() {
                let answer = Message::assistant(content);
                session.append(answer.clone());
                sink.message(&self.name, answer).await?;
                sink.finished(&self.name).await?;
                return Ok(());
            }

            debug!(agent = %self.name, tool_count = calls.len(), "Executing tool calls");
            let request_msg = Message::tool_call(content, calls.clone());
            session.append(request_msg.clone());
            sink.message(&self.name, request_msg).await?;

            for call in &calls {
                let result = self.execute_call(call, ctx).await;
                let result_msg = Message::tool_result(&result.call_id, &result.name, result.output);
                session.append(result_msg.clone());
                sink.message(TOOLS_NODE, result_msg).await?;
            }
            sink.finished(TOOLS_NODE).await?;
        }

        warn!(
            agent = %self.name,
            iterations = self.max_iterations,
            "Max tool iterations reached, forcing text response"
        );
        session.append(Message::assistant(MAX_ITERATIONS_MESSAGE));
        sink.delta(&self.name, MAX_ITERATIONS_MESSAGE).await?;
        sink.message(&self.name, Message::assistant(MAX_ITERATIONS_MESSAGE))
            .await?;
        sink.finished(&self.name).await?;
        Ok(())
    }

    /// Stream one LLM reply, forwarding text as deltas. Returns the full
    /// text and any requested tool calls.
    async fn stream_reply(
        &self,
        request: ProviderRequest,
        sink: &EventSink,
    ) -> Result<(String, Vec<MessageToolCall>), TurnError> {
        let mut rx = self.provider.stream(request).await?;
        let mut content = String::new();
        let mut calls = Vec::new();

        while let Some(chunk) = rx.recv().await {
            let chunk = chunk?;
            if let Some(text) = chunk.content
                && !text.is_empty()
            {
                sink.delta(&self.name, text.as_str()).await?;
                content.push_str(&text);
            }
            calls.extend(chunk.tool_calls);
            if chunk.done {
                break;
            }
        }

        Ok((content, calls))
    }

    async fn execute_call(&self, call: &MessageToolCall, ctx: &mut ToolContext) -> ToolResult {
        if !self.allowed_tools.iter().any(|t| t == &call.name) {
            warn!(agent = %self.name, tool = %call.name, "Model requested an undeclared tool");
            return error_result(call, &ToolError::NotFound(call.name.clone()));
        }
        match ToolCall::try_from(call) {
            Ok(parsed) => self.tools.execute(&parsed, ctx).await,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Unparseable tool arguments");
                error_result(call, &e)
            }
        }
    }
}

fn error_result(call: &MessageToolCall, error: &ToolError) -> ToolResult {
    ToolResult {
        call_id: call.id.clone(),
        name: call.name.clone(),
        success: false,
        output: serde_json::json!({ "error": error.to_string(), "tool": call.name }).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use unidesk_core::event::ExecutionEvent;
    use unidesk_core::message::Role;
    use unidesk_core::session::AgentId;

    fn drain(rx: &mut tokio::sync::mpsc::Receiver<crate::sink::RawItem>) -> Vec<ExecutionEvent> {
        let mut events = Vec::new();
        while let Ok(item) = rx.try_recv() {
            events.push(item.unwrap());
        }
        events
    }

    fn agent(provider: Arc<SequentialMockProvider>, registry: ToolRegistry) -> ToolAgent {
        ToolAgent::new(
            AgentId::Announcement.as_str(),
            provider,
            "mock-model",
            Arc::new(registry),
            &["list_announcements"],
        )
    }

    #[tokio::test]
    async fn text_only_reply_appends_one_assistant_message() {
        let provider = Arc::new(SequentialMockProvider::single_text("Merhaba!"));
        let agent = agent(provider.clone(), ToolRegistry::new());
        let (sink, mut rx) = crate::sink::EventSink::channel();

        let mut session = Session::new("t1");
        session.append(Message::user("Selam"));
        let mut ctx = ToolContext::default();

        agent
            .run("prompt", &mut session, &mut ctx, &sink)
            .await
            .unwrap();

        assert_eq!(session.history().len(), 2);
        assert!(session.history()[1].is_assistant());
        assert_eq!(session.history()[1].content(), "Merhaba!");
        let events = drain(&mut rx);
        assert!(matches!(&events[0], ExecutionEvent::Delta { content, .. } if content == "Merhaba!"));
        assert!(matches!(events.last(), Some(ExecutionEvent::NodeFinished { node }) if node == "announcement_agent"));

        let requests = provider.requests();
        let request = &requests[0];
        assert!(matches!(request.messages[0], Message::System { .. }));
        assert_eq!(request.messages[0].content(), "prompt");
    }

    #[tokio::test]
    async fn tool_results_feed_back_into_the_loop() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_tool_call("list_announcements", serde_json::json!({}))],
            "İki duyuru var.",
        ));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(FixedTool {
            name: "list_announcements",
            output: serde_json::json!({"count": 2}),
        }));
        let agent = agent(provider.clone(), registry);
        let (sink, mut rx) = crate::sink::EventSink::channel();

        let mut session = Session::new("t1");
        session.append(Message::user("Duyurular?"));
        let mut ctx = ToolContext::default();
        agent
            .run("prompt", &mut session, &mut ctx, &sink)
            .await
            .unwrap();

        let kinds: Vec<_> = session.history().iter().map(Message::role).collect();
        assert_eq!(
            kinds,
            vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );
        assert_eq!(
            session.history().iter().filter(|m| m.is_assistant()).count(),
            1
        );
        assert_eq!(ctx.scratch["last_list_announcements"]["count"], 2);

        // second LLM call sees the tool result
        let requests = provider.requests();
        let second = &requests[1];
        assert!(second.messages.iter().any(|m| matches!(m, Message::ToolResult { .. })));
        assert_eq!(second.tools.len(), 1);

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(e, ExecutionEvent::Message { node, message: Message::ToolResult { .. } } if node == TOOLS_NODE)));
    }

    #[tokio::test]
    async fn iteration_limit_appends_fixed_message() {
        let call = make_tool_call("list_announcements", serde_json::json!({}));
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(vec![call.clone()]),
            make_tool_call_response(vec![call]),
        ]));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(FixedTool {
            name: "list_announcements",
            output: serde_json::json!([]),
        }));
        let agent = agent(provider.clone(), registry).with_max_iterations(2);
        let (sink, _rx) = crate::sink::EventSink::channel();

        let mut session = Session::new("t1");
        session.append(Message::user("?"));
        agent
            .run("prompt", &mut session, &mut ToolContext::default(), &sink)
            .await
            .unwrap();

        assert_eq!(provider.call_count(), 2);
        let last = session.history().last().unwrap();
        assert!(last.is_assistant());
        assert_eq!(last.content(), MAX_ITERATIONS_MESSAGE);
    }

    #[tokio::test]
    async fn provider_failure_is_a_turn_error() {
        let agent = ToolAgent::new(
            "announcement_agent",
            Arc::new(FailingProvider),
            "m",
            Arc::new(ToolRegistry::new()),
            &[],
        );
        let (sink, _rx) = crate::sink::EventSink::channel();
        let mut session = Session::new("t1");
        session.append(Message::user("?"));

        let err = agent
            .run("prompt", &mut session, &mut ToolContext::default(), &sink)
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::Provider(_)));
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test]
    async fn broken_arguments_become_error_result() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![MessageToolCall {
                id: "call_x".into(),
                name: "list_announcements".into(),
                arguments: "{oops".into(),
            }],
            "Bir hata oldu.",
        ));
        let agent = agent(provider, ToolRegistry::new());
        let (sink, _rx) = crate::sink::EventSink::channel();
        let mut session = Session::new("t1");
        session.append(Message::user("?"));
        agent
            .run("prompt", &mut session, &mut ToolContext::default(), &sink)
            .await
            .unwrap();

        let Message::ToolResult { content, .. } = &session.history()[2] else {
            panic!("expected tool result");
        };
        let payload: serde_json::Value = serde_json::from_str(content).unwrap();
        assert!(payload["error"].as_str().unwrap().contains("not JSON"));
    }

    #[tokio::test]
    async fn undeclared_tool_is_refused() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_tool_call("search_regulations", serde_json::json!({"query": "staj"}))],
            "Yapamıyorum.",
        ));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(FixedTool {
            name: "search_regulations",
            output: serde_json::json!({}),
        }));
        let agent = agent(provider, registry);
        let (sink, _rx) = crate::sink::EventSink::channel();
        let mut session = Session::new("t1");
        session.append(Message::user("?"));
        let mut ctx = ToolContext::default();
        agent.run("prompt", &mut session, &mut ctx, &sink).await.unwrap();

        assert!(ctx.scratch.is_empty());
        assert!(session.history()[2].content().contains("Tool not found"));
    }
}
