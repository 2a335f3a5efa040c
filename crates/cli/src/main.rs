//! UniDesk CLI — the main entry point.
//!
//! Commands:
//! - `chat`    — Interactive chat or single-message mode
//! - `course`  — Ask the regulation pipeline about one course
//! - `config`  — Print, show, validate or locate the configuration

use clap::{Parser, Subcommand};

mod commands;
mod render;
mod runtime;

#[derive(Parser)]
#[command(
    name = "unidesk",
    about = "UniDesk — department announcements and regulations assistant",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging and show tool activity
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the assistant
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Continue an existing conversation thread
        #[arg(short, long)]
        thread: Option<String>,

        /// Course to search for regulation questions
        #[arg(long)]
        course: Option<String>,
    },

    /// Ask about one course's materials directly
    Course {
        /// Course id (defaults to retrieval.default_course_id)
        #[arg(short, long)]
        course: Option<String>,

        /// The question
        #[arg(short, long)]
        message: String,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print a default config.toml
    Init,
    /// Show the active configuration
    Show,
    /// Validate the configuration file
    Validate,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Chat {
            message,
            thread,
            course,
        } => commands::chat::run(message, thread, course, cli.verbose).await?,
        Commands::Course { course, message } => {
            commands::course::run(course, message, cli.verbose).await?
        }
        Commands::Config { action } => match action.unwrap_or(ConfigAction::Init) {
            ConfigAction::Init => commands::config_cmd::init().await?,
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_shot_chat() {
        let cli = Cli::try_parse_from(["unidesk", "chat", "-m", "Son duyurular?", "--thread", "t1"]).unwrap();
        match cli.command {
            Commands::Chat { message, thread, course } => {
                assert_eq!(message.as_deref(), Some("Son duyurular?"));
                assert_eq!(thread.as_deref(), Some("t1"));
                assert!(course.is_none());
            }
            _ => panic!("expected chat"),
        }
    }

    #[test]
    fn course_requires_a_message() {
        assert!(Cli::try_parse_from(["unidesk", "course", "--course", "cs101"]).is_err());
        assert!(Cli::try_parse_from(["unidesk", "course", "-c", "cs101", "-m", "Staj?"]).is_ok());
    }

    #[test]
    fn bare_config_defaults_to_init() {
        let cli = Cli::try_parse_from(["unidesk", "config"]).unwrap();
        assert!(matches!(cli.command, Commands::Config { action: None }));
    }
}
