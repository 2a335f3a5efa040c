//! Terminal rendering of client events.

use std::io::Write;
use tokio::sync::mpsc;
use unidesk_agent::{StreamEvent, ToolOutput};

/// Longest tool result shown before truncation.
const RESULT_PREVIEW_CHARS: usize = 160;

/// One status line for non-text events; `None` for text and `done`.
pub fn status_line(event: &StreamEvent) -> Option<String> {
    match event {
        StreamEvent::AgentDecision { agent_name } => Some(format!("  → {agent_name}")),
        StreamEvent::ToolStart { name, args, .. } => Some(format!("  ⚙ {name} {args}")),
        StreamEvent::ToolResult { name, result, .. } => {
            Some(format!("  ✓ {name}: {}", preview(result)))
        }
        StreamEvent::Error { message } => Some(format!("  [Error] {message}")),
        StreamEvent::MessageDelta { .. } | StreamEvent::NodeComplete { .. } | StreamEvent::Done => None,
    }
}

fn preview(result: &ToolOutput) -> String {
    let text = match result {
        ToolOutput::Json(value) => value.to_string(),
        ToolOutput::Text(text) => text.clone(),
    };
    if text.chars().count() <= RESULT_PREVIEW_CHARS {
        return text;
    }
    let cut: String = text.chars().take(RESULT_PREVIEW_CHARS).collect();
    format!("{cut}…")
}

/// Print a turn's events as they arrive. Returns the streamed answer text.
pub async fn render(mut events: mpsc::Receiver<StreamEvent>, verbose: bool) -> std::io::Result<String> {
    let mut answer = String::new();
    let mut stdout = std::io::stdout();

    while let Some(event) = events.recv().await {
        match &event {
            StreamEvent::MessageDelta { content } => {
                if answer.is_empty() {
                    print!("\n  Assistant > ");
                }
                print!("{content}");
                stdout.flush()?;
                answer.push_str(content);
            }
            StreamEvent::Done => break,
            StreamEvent::Error { .. } => {
                if let Some(line) = status_line(&event) {
                    eprintln!("{line}");
                }
            }
            _ if verbose => {
                if let Some(line) = status_line(&event) {
                    eprintln!("{line}");
                }
            }
            _ => {}
        }
    }

    if !answer.is_empty() {
        println!();
    }
    Ok(answer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_results_are_truncated() {
        let event = StreamEvent::ToolResult {
            id: "c1".into(),
            name: "fetch_document".into(),
            result: ToolOutput::Text("ş".repeat(500)),
        };
        let line = status_line(&event).unwrap();
        assert!(line.ends_with('…'));
        assert!(line.chars().count() < 200);
    }

    #[test]
    fn text_events_have_no_status_line() {
        assert!(status_line(&StreamEvent::MessageDelta { content: "x".into() }).is_none());
        assert!(status_line(&StreamEvent::Done).is_none());
        assert_eq!(
            status_line(&StreamEvent::AgentDecision {
                agent_name: "regulation_agent".into()
            })
            .unwrap(),
            "  → regulation_agent"
        );
    }

    #[tokio::test]
    async fn render_collects_answer_until_done() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(StreamEvent::MessageDelta { content: "Mer".into() }).await.unwrap();
        tx.send(StreamEvent::MessageDelta { content: "haba".into() }).await.unwrap();
        tx.send(StreamEvent::Done).await.unwrap();
        tx.send(StreamEvent::MessageDelta { content: "ignored".into() }).await.unwrap();

        assert_eq!(render(rx, false).await.unwrap(), "Merhaba");
    }
}
