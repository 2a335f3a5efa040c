//! `unidesk chat` — Interactive or single-message chat mode.

use crate::render::render;
use crate::runtime;
use tokio::io::{AsyncBufReadExt, BufReader};
use unidesk_agent::TurnRequest;
use unidesk_config::AppConfig;

pub async fn run(
    message: Option<String>,
    thread: Option<String>,
    course: Option<String>,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  WARNING: No API key configured.");
        eprintln!("  Set UNIDESK_API_KEY or OPENAI_API_KEY, or add api_key to");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
    }

    let orchestrator = runtime::build(&config).await?;
    let thread_id = thread.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let request = |text: &str| {
        let mut req = TurnRequest::new(thread_id.as_str(), text);
        req.course_id = course.clone();
        req
    };

    if let Some(msg) = message {
        render(orchestrator.stream_turn(request(&msg)), verbose).await?;
        return Ok(());
    }

    println!();
    println!("  UniDesk — {} / {}", config.site.school, config.site.department);
    println!();
    println!("  Model:     {}", config.default_model);
    println!("  Site:      {}", config.site.url);
    println!("  Thread:    {thread_id}");
    println!();
    println!("  Type your question and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        use std::io::Write;
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        render(orchestrator.stream_turn(request(line)), verbose).await?;
        println!();
    }

    println!();
    println!("  Görüşmek üzere!");
    println!();
    Ok(())
}
