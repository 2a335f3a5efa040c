//! `unidesk course` — Ask the regulation pipeline about one course.

use crate::render::render;
use crate::runtime;
use unidesk_config::AppConfig;

pub async fn run(
    course: Option<String>,
    message: String,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let course = course.unwrap_or_else(|| config.retrieval.default_course_id.clone());

    let orchestrator = runtime::build(&config).await?;
    render(orchestrator.stream_course(course, message), verbose).await?;
    Ok(())
}
