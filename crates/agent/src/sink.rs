//! The write end of a turn's raw event feed.

use crate::stream_event::StreamEvent;
use tokio::sync::mpsc;
use unidesk_core::event::{ExecutionEvent, TurnError};
use unidesk_core::message::Message;

/// Item type of the raw feed.
pub type RawItem = Result<ExecutionEvent, TurnError>;

/// Buffer size of the raw feed between a turn and its consumer.
pub const RAW_BUFFER: usize = 64;

/// Sends execution events for one turn. Once the consumer has gone away
/// every emit fails with [`TurnError::Cancelled`], which unwinds the turn
/// without committing it.
///
/// The consumer is the raw receiver and, when attached, the client channel
/// the raw feed is multiplexed into. The client side is held weakly so the
/// sink never keeps a client stream open.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<RawItem>,
    client: Option<mpsc::WeakSender<StreamEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<RawItem>) -> Self {
        Self { tx, client: None }
    }

    /// Also treat the sink as closed once `client` is gone.
    pub fn watching(mut self, client: mpsc::WeakSender<StreamEvent>) -> Self {
        self.client = Some(client);
        self
    }

    /// A sink paired with its receiving end.
    pub fn channel() -> (Self, mpsc::Receiver<RawItem>) {
        let (tx, rx) = mpsc::channel(RAW_BUFFER);
        (Self::new(tx), rx)
    }

    pub async fn emit(&self, event: ExecutionEvent) -> Result<(), TurnError> {
        if self.client_gone() {
            return Err(TurnError::Cancelled);
        }
        self.tx.send(Ok(event)).await.map_err(|_| TurnError::Cancelled)
    }

    pub async fn custom(&self, node: &str, payload: serde_json::Value) -> Result<(), TurnError> {
        self.emit(ExecutionEvent::Custom {
            node: node.to_string(),
            payload,
        })
        .await
    }

    pub async fn message(&self, node: &str, message: Message) -> Result<(), TurnError> {
        self.emit(ExecutionEvent::Message {
            node: node.to_string(),
            message,
        })
        .await
    }

    pub async fn delta(&self, node: &str, content: impl Into<String>) -> Result<(), TurnError> {
        self.emit(ExecutionEvent::Delta {
            node: node.to_string(),
            content: content.into(),
        })
        .await
    }

    pub async fn finished(&self, node: &str) -> Result<(), TurnError> {
        self.emit(ExecutionEvent::NodeFinished {
            node: node.to_string(),
        })
        .await
    }

    /// Report a fatal error. Ignored if nobody is listening.
    pub async fn fail(&self, error: TurnError) {
        let _ = self.tx.send(Err(error)).await;
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed() || self.client_gone()
    }

    fn client_gone(&self) -> bool {
        self.client
            .as_ref()
            .is_some_and(|weak| weak.upgrade().is_none_or(|tx| tx.is_closed()))
    }
}
