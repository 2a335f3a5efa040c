//! Build the orchestrator and its collaborators from configuration.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use unidesk_agent::{Orchestrator, RagPipeline, RetrievalSettings, Router, ToolAgent};
use unidesk_config::AppConfig;
use unidesk_core::provider::Provider;
use unidesk_core::retrieval::{Embedder, VectorStore};
use unidesk_core::session::{AgentId, SessionStore};
use unidesk_core::tool::SiteContext;
use unidesk_memory::{
    InMemorySessionStore, ProviderEmbedder, QdrantStore, Retriever, SqliteSessionStore,
};
use unidesk_tools::{ANNOUNCEMENT_TOOLS, ToolDeps, default_registry};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

pub fn site_context(config: &AppConfig) -> SiteContext {
    SiteContext {
        url: config.site.url.trim_end_matches('/').to_string(),
        school: config.site.school.clone(),
        department: config.site.department.clone(),
    }
}

pub fn retriever(config: &AppConfig, provider: Arc<dyn Provider>) -> Result<Retriever, String> {
    let retrieval = &config.retrieval;
    let (embedder, store): (Arc<dyn Embedder>, Arc<dyn VectorStore>) = match retrieval.backend.as_str() {
        "qdrant" => (
            Arc::new(ProviderEmbedder::new(provider, retrieval.embedding_model.as_str())),
            Arc::new(QdrantStore::new(
                retrieval.qdrant_url.as_str(),
                retrieval.collection.as_str(),
                retrieval.qdrant_api_key.clone(),
            )),
        ),
        other => return Err(format!("Unknown retrieval backend '{other}' (expected qdrant)")),
    };
    Ok(Retriever::new(embedder, store))
}

pub async fn session_store(config: &AppConfig) -> Result<Arc<dyn SessionStore>, Box<dyn std::error::Error>> {
    match config.session.backend.as_str() {
        "memory" => Ok(Arc::new(InMemorySessionStore::new())),
        "sqlite" => {
            let path = config.session.resolved_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let store = SqliteSessionStore::new(&path.to_string_lossy()).await?;
            Ok(Arc::new(store))
        }
        other => Err(format!("Unknown session backend '{other}' (expected sqlite or memory)").into()),
    }
}

/// Wire every component named in `config` into an orchestrator.
pub async fn build(config: &AppConfig) -> Result<Arc<Orchestrator>, Box<dyn std::error::Error>> {
    let provider = unidesk_providers::build_from_config(config);
    let model = config.default_model.as_str();
    let max_tokens = Some(config.default_max_tokens);

    let retriever = retriever(config, provider.clone())?;
    let mut deps = ToolDeps::http(retriever, FETCH_TIMEOUT);
    deps.default_course_id = Some(config.retrieval.default_course_id.clone());
    let tools = Arc::new(default_registry(
        deps,
        Duration::from_secs(config.agent.tool_timeout_secs),
    ));

    let announcements = ToolAgent::new(
        AgentId::Announcement.as_str(),
        provider.clone(),
        model,
        tools.clone(),
        &ANNOUNCEMENT_TOOLS,
    )
    .with_temperature(config.default_temperature)
    .with_max_tokens(max_tokens)
    .with_max_iterations(u32::try_from(config.agent.max_tool_iterations).unwrap_or(u32::MAX));

    let regulations = RagPipeline::new(provider.clone(), model, tools)
        .with_temperature(config.default_temperature)
        .with_max_tokens(max_tokens);

    let store = session_store(config).await?;
    info!(
        provider = %provider.name(),
        model,
        sessions = %store.name(),
        retrieval = %config.retrieval.backend,
        "Runtime ready"
    );

    let orchestrator = Orchestrator::new(
        store,
        Router::new(provider, model),
        announcements,
        regulations,
        site_context(config),
    )
    .with_retrieval(RetrievalSettings {
        k: config.retrieval.default_k,
        score_threshold: config.retrieval.score_threshold,
        default_course_id: Some(config.retrieval.default_course_id.clone()),
    });

    Ok(Arc::new(orchestrator))
}
