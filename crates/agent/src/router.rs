//! Query router: one LLM classification per turn.
//!
//! The router never fails. An unreachable LLM or an answer naming no known
//! specialist both fall back to the announcement specialist, with the
//! reason recorded on the decision.

use crate::prompts::ROUTER_PROMPT;
use std::sync::Arc;
use tracing::{error, info, warn};
use unidesk_core::message::Message;
use unidesk_core::provider::{Provider, ProviderRequest};
use unidesk_core::session::{AgentId, RoutingDecision, Session};

pub struct Router {
    provider: Arc<dyn Provider>,
    model: String,
}

impl Router {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Pick the specialist for the session's latest user message.
    pub async fn route(&self, session: &Session) -> RoutingDecision {
        let Some(query) = session.last_user_message() else {
            warn!(thread_id = %session.thread_id, "No user message found, defaulting to announcements");
            return RoutingDecision::new(AgentId::Announcement, "", "No user message found");
        };

        let mut request = ProviderRequest::new(
            self.model.clone(),
            vec![Message::system(ROUTER_PROMPT), Message::user(query)],
        );
        request.temperature = 0.0;

        match self.provider.complete(request).await {
            Ok(response) => {
                let raw = response.message.content().to_string();
                let decision = classify(&raw);
                info!(
                    thread_id = %session.thread_id,
                    agent = %decision.selected_agent,
                    query = %preview(query),
                    "Routing query"
                );
                decision
            }
            Err(e) => {
                error!(thread_id = %session.thread_id, error = %e, "Routing failed, defaulting to announcements");
                RoutingDecision::new(AgentId::Announcement, "", format!("ERROR: {e}"))
            }
        }
    }
}

/// Map a classifier answer onto a specialist. Keywords are matched as
/// substrings of the upper-cased answer, regulation first.
pub fn classify(raw: &str) -> RoutingDecision {
    let decision = raw.trim().to_uppercase();

    for agent in AgentId::ALL {
        if agent.keywords().iter().any(|kw| decision.contains(kw)) {
            return RoutingDecision::new(agent, raw, decision);
        }
    }

    warn!(decision = %decision, "Unclear routing decision, defaulting to announcements");
    let reason = format!("UNCLEAR: {decision} -> DEFAULT: ANNOUNCEMENT");
    RoutingDecision::new(AgentId::Announcement, raw, reason)
}

fn preview(text: &str) -> String {
    text.chars().take(50).collect()
}
