//! Event stream multiplexer.
//!
//! Consumes the raw execution feed of one turn and emits the client event
//! sequence. The output always ends with exactly one [`StreamEvent::Done`];
//! a failed turn produces one [`StreamEvent::Error`] right before it.

use crate::sink::RawItem;
use crate::stream_event::{StreamEvent, ToolOutput};
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tracing::{debug, error};
use unidesk_core::event::{ExecutionEvent, ROUTER_NODE};
use unidesk_core::message::Message;

/// Buffer size of the client-facing event channel.
pub const CLIENT_BUFFER: usize = 64;

/// Stateful classifier of raw events.
///
/// While any announced tool call still awaits its result, text deltas are
/// dropped so partial model output does not interleave with tool traffic.
#[derive(Debug, Default)]
pub struct Multiplexer {
    pending_calls: HashSet<String>,
}

impl Multiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tool_in_flight(&self) -> bool {
        !self.pending_calls.is_empty()
    }

    /// Client events for one raw event, in emission order.
    pub fn classify(&mut self, event: ExecutionEvent) -> Vec<StreamEvent> {
        match event {
            ExecutionEvent::Custom { payload, .. } => payload
                .get("agent")
                .and_then(Value::as_str)
                .map(|agent| StreamEvent::AgentDecision {
                    agent_name: agent.to_string(),
                })
                .into_iter()
                .collect(),

            ExecutionEvent::Message { message, .. } => self.classify_message(message),

            ExecutionEvent::Delta { node, content } => {
                if node == ROUTER_NODE || self.tool_in_flight() || content.is_empty() {
                    Vec::new()
                } else {
                    vec![StreamEvent::MessageDelta { content }]
                }
            }

            ExecutionEvent::NodeFinished { node } => {
                if node == ROUTER_NODE {
                    Vec::new()
                } else {
                    vec![StreamEvent::NodeComplete { node }]
                }
            }
        }
    }

    fn classify_message(&mut self, message: Message) -> Vec<StreamEvent> {
        match message {
            Message::ToolCall { calls, .. } => calls
                .into_iter()
                .filter(|c| !c.name.is_empty() && !c.id.is_empty())
                .map(|c| {
                    self.pending_calls.insert(c.id.clone());
                    StreamEvent::ToolStart {
                        args: parse_args(&c.arguments),
                        name: c.name,
                        id: c.id,
                    }
                })
                .collect(),
            Message::ToolResult {
                call_id,
                name,
                content,
                ..
            } => {
                self.pending_calls.remove(&call_id);
                vec![StreamEvent::ToolResult {
                    id: call_id,
                    name,
                    result: ToolOutput::parse(&content),
                }]
            }
            _ => Vec::new(),
        }
    }

    /// Drain `raw` into `out`. Stops pulling as soon as `out` is closed,
    /// even while waiting on `raw`, and after the first error item.
    pub async fn pump<S>(mut self, mut raw: S, out: &mpsc::Sender<StreamEvent>)
    where
        S: Stream<Item = RawItem> + Unpin,
    {
        loop {
            if out.is_closed() {
                debug!("Client went away, stopping event pump");
                return;
            }
            let next = tokio::select! {
                biased;
                _ = out.closed() => {
                    debug!("Client went away, stopping event pump");
                    return;
                }
                next = raw.next() => next,
            };
            let Some(item) = next else {
                break;
            };
            match item {
                Ok(event) => {
                    for client_event in self.classify(event) {
                        if out.send(client_event).await.is_err() {
                            debug!("Client went away, stopping event pump");
                            return;
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "Turn failed");
                    let _ = out
                        .send(StreamEvent::Error {
                            message: e.to_string(),
                        })
                        .await;
                    let _ = out.send(StreamEvent::Done).await;
                    return;
                }
            }
        }
        let _ = out.send(StreamEvent::Done).await;
    }
}

/// Spawn a pump over `raw` and return the client event receiver.
pub fn multiplex<S>(raw: S) -> mpsc::Receiver<StreamEvent>
where
    S: Stream<Item = RawItem> + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
    spawn_pump(raw, tx);
    rx
}

/// Spawn a pump over `raw` writing into an existing client channel.
pub fn spawn_pump<S>(raw: S, out: mpsc::Sender<StreamEvent>)
where
    S: Stream<Item = RawItem> + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        Multiplexer::new().pump(raw, &out).await;
    });
}

fn parse_args(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
