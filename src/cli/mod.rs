//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "pagechat",
    version,
    author = "neur0map",
    about = "Chat with a document using hybrid retrieval and a local LLM",
    long_about = "Pagechat indexes a PDF or text document into a session with lexical (BM25) and \
                  semantic (HNSW) indexes, then answers questions grounded in the retrieved pages, \
                  streaming the answer from a local Ollama model."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/pagechat/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Profile to apply on top of the config file
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Index a document and chat with it interactively
    Chat {
        /// PDF, text or markdown file
        file: PathBuf,

        /// Print the source pages after each answer
        #[arg(long)]
        sources: bool,
    },

    /// Index a document and answer a single question
    Ask {
        /// PDF, text or markdown file
        file: PathBuf,

        /// Question to ask
        question: String,

        /// Print the source pages after the answer
        #[arg(long)]
        sources: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Print the default config file location
    Path,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ask() {
        let cli = Cli::try_parse_from(["pagechat", "ask", "report.pdf", "What is due?", "--sources"])
            .unwrap();
        match cli.command {
            Commands::Ask {
                file,
                question,
                sources,
            } => {
                assert_eq!(file, PathBuf::from("report.pdf"));
                assert_eq!(question, "What is due?");
                assert!(sources);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "pagechat", "chat", "notes.md", "--verbose", "--profile", "fast",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.profile.as_deref(), Some("fast"));
    }

    #[test]
    fn test_config_init_force() {
        let cli = Cli::try_parse_from(["pagechat", "config", "init", "--force"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Init { force: true }
            }
        ));
    }
}
