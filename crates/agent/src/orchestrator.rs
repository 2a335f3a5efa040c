//! Turn orchestration: router → one specialist, over a thread's session.
//!
//! A turn works on a private copy of the thread's session and commits it
//! with a single `put` once the specialist has finished. Nothing is written
//! when the turn fails or its consumer disconnects. Turns on the same
//! thread are serialized; different threads run concurrently.

use crate::multiplexer::{CLIENT_BUFFER, spawn_pump};
use crate::prompts::announcement_prompt;
use crate::rag::{RagInput, RagOutcome, RagPipeline};
use crate::router::Router;
use crate::sink::{EventSink, RawItem};
use crate::specialist::ToolAgent;
use crate::stream_event::StreamEvent;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info};
use unidesk_core::event::{ROUTER_NODE, TurnError};
use unidesk_core::message::Message;
use unidesk_core::retrieval::DEFAULT_K;
use unidesk_core::session::{AgentId, Session, SessionStore};
use unidesk_core::tool::{SiteContext, ToolContext};

/// One inbound user message.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub thread_id: String,
    pub message: String,
    /// Course to search; falls back to the orchestrator's default
    pub course_id: Option<String>,
}

impl TurnRequest {
    pub fn new(thread_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            message: message.into(),
            course_id: None,
        }
    }

    pub fn with_course(mut self, course_id: impl Into<String>) -> Self {
        self.course_id = Some(course_id.into());
        self
    }
}

/// Retrieval settings applied to regulation turns.
#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    pub k: i64,
    pub score_threshold: f32,
    pub default_course_id: Option<String>,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            k: DEFAULT_K as i64,
            score_threshold: 0.0,
            default_course_id: None,
        }
    }
}

pub struct Orchestrator {
    store: Arc<dyn SessionStore>,
    router: Router,
    announcements: ToolAgent,
    regulations: RagPipeline,
    site: SiteContext,
    retrieval: RetrievalSettings,
    thread_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        router: Router,
        announcements: ToolAgent,
        regulations: RagPipeline,
        site: SiteContext,
    ) -> Self {
        Self {
            store,
            router,
            announcements,
            regulations,
            site,
            retrieval: RetrievalSettings::default(),
            thread_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_retrieval(mut self, retrieval: RetrievalSettings) -> Self {
        self.retrieval = retrieval;
        self
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Start a turn and return its client event stream. Dropping the
    /// receiver cancels the turn; it is then never committed.
    pub fn stream_turn(self: &Arc<Self>, request: TurnRequest) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
        let raw = self.spawn_feed(Some(tx.downgrade()), move |this, sink| async move {
            this.run_turn(request, &sink).await
        });
        spawn_pump(ReceiverStream::new(raw), tx);
        rx
    }

    /// Start a turn and return its raw execution feed. A panic inside the
    /// turn arrives as an error item.
    pub fn execute(self: &Arc<Self>, request: TurnRequest) -> mpsc::Receiver<RawItem> {
        self.spawn_feed(None, move |this, sink| async move { this.run_turn(request, &sink).await })
    }

    /// Ask the regulation pipeline directly, outside any thread. Nothing is
    /// persisted.
    pub fn stream_course(
        self: &Arc<Self>,
        course_id: impl Into<String>,
        query: impl Into<String>,
    ) -> mpsc::Receiver<StreamEvent> {
        let course_id = course_id.into();
        let query = query.into();
        let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
        let raw = self.spawn_feed(Some(tx.downgrade()), move |this, sink| async move {
            this.run_course(&course_id, &query, &sink).await.map(|_| ())
        });
        spawn_pump(ReceiverStream::new(raw), tx);
        rx
    }

    fn spawn_feed<F, Fut>(
        self: &Arc<Self>,
        client: Option<mpsc::WeakSender<StreamEvent>>,
        work: F,
    ) -> mpsc::Receiver<RawItem>
    where
        F: FnOnce(Arc<Self>, EventSink) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), TurnError>> + Send + 'static,
    {
        let (sink, rx) = EventSink::channel();
        let sink = match client {
            Some(client) => sink.watching(client),
            None => sink,
        };
        let this = Arc::clone(self);
        let turn_sink = sink.clone();

        let turn = tokio::spawn(async move {
            match work(this, turn_sink.clone()).await {
                Ok(()) => {}
                Err(TurnError::Cancelled) => debug!("Turn cancelled by consumer"),
                Err(e) => turn_sink.fail(e).await,
            }
        });

        tokio::spawn(async move {
            if let Err(e) = turn.await
                && e.is_panic()
            {
                error!("Turn task panicked");
                sink.fail(TurnError::Internal("turn task panicked".into()))
                    .await;
            }
        });

        rx
    }

    /// Run the regulation pipeline for one question against `course_id`.
    pub async fn run_course(
        &self,
        course_id: &str,
        query: &str,
        sink: &EventSink,
    ) -> Result<RagOutcome, TurnError> {
        let mut session = Session::new(format!("course-{course_id}"));
        session.append(Message::user(query));

        let mut ctx = ToolContext::new(self.site.clone()).with_course_id(course_id);
        let input = RagInput::new(query, Some(course_id.to_string()))
            .with_k(self.retrieval.k)
            .with_threshold(self.retrieval.score_threshold);

        let outcome = self
            .regulations
            .run(&input, &mut session, &mut ctx, sink)
            .await?;
        sink.finished(AgentId::Regulation.as_str()).await?;
        Ok(outcome)
    }

    /// Run one turn to completion, emitting into `sink`.
    pub async fn run_turn(&self, request: TurnRequest, sink: &EventSink) -> Result<(), TurnError> {
        let thread_id = request.thread_id.clone();
        let lock = self.thread_lock(&thread_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.run_locked(request, sink).await
        };
        self.release_thread_lock(&thread_id, lock).await;
        result
    }

    async fn run_locked(&self, request: TurnRequest, sink: &EventSink) -> Result<(), TurnError> {
        let mut session = self
            .store
            .get(&request.thread_id)
            .await?
            .unwrap_or_else(|| Session::new(request.thread_id.as_str()));
        session.append(Message::user(request.message.as_str()));

        let decision = self.router.route(&session).await;
        let agent = decision.selected_agent;
        sink.custom(
            ROUTER_NODE,
            serde_json::json!({
                "agent": agent.as_str(),
                "routing_reason": decision.reason,
            }),
        )
        .await?;
        session.record_routing(decision);
        sink.finished(ROUTER_NODE).await?;

        let course_id = request
            .course_id
            .clone()
            .or_else(|| self.retrieval.default_course_id.clone());
        let mut ctx = ToolContext::new(self.site.clone());
        ctx.course_id = course_id.clone();

        match agent {
            AgentId::Announcement => {
                let prompt = announcement_prompt(&self.site);
                self.announcements
                    .run(&prompt, &mut session, &mut ctx, sink)
                    .await?;
            }
            AgentId::Regulation => {
                let input = RagInput::new(request.message.as_str(), course_id)
                    .with_k(self.retrieval.k)
                    .with_threshold(self.retrieval.score_threshold);
                self.regulations
                    .run(&input, &mut session, &mut ctx, sink)
                    .await?;
                sink.finished(agent.as_str()).await?;
            }
        }

        session.merge_scratch(ctx.scratch);

        if sink.is_closed() {
            return Err(TurnError::Cancelled);
        }
        self.store.put(&session).await?;

        info!(
            thread_id = %session.thread_id,
            agent = %agent,
            messages = session.history().len(),
            "Turn committed"
        );
        Ok(())
    }

    async fn thread_lock(&self, thread_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.thread_locks.lock().await;
        locks
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Forget the thread's lock unless another turn still holds or awaits it.
    async fn release_thread_lock(&self, thread_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.thread_locks.lock().await;
        // one reference in the map, one here
        if Arc::strong_count(&lock) == 2 {
            locks.remove(thread_id);
        }
    }
}
