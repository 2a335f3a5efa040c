//! LLM provider implementations for UniDesk.
//!
//! All providers implement the `unidesk_core::Provider` trait.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

use std::sync::Arc;
use tracing::warn;
use unidesk_config::AppConfig;
use unidesk_core::Provider;

/// Build the configured provider.
///
/// A missing API key is only a warning: local endpoints accept any key and
/// remote ones will answer with an authentication error the agent can
/// recover from.
pub fn build_from_config(config: &AppConfig) -> Arc<dyn Provider> {
    let api_key = config.api_key.clone().unwrap_or_else(|| {
        warn!(
            provider = %config.default_provider,
            "No API key configured; set UNIDESK_API_KEY or OPENAI_API_KEY"
        );
        String::new()
    });

    Arc::new(OpenAiCompatProvider::new(
        &config.default_provider,
        &config.base_url,
        api_key,
    ))
}
