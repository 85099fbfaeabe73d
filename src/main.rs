use futures::StreamExt;
use pagechat::chain::{ChatError, Role};
use pagechat::cli::{Cli, Commands, ConfigAction};
use pagechat::config::Config;
use pagechat::error::{PagechatError, Result};
use pagechat::RagEngine;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Handle commands
    match cli.command {
        Commands::Chat { file, sources } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_chat(config, &file, sources).await?;
        }
        Commands::Ask {
            file,
            question,
            sources,
        } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_ask(config, &file, &question, sources).await?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "pagechat=debug" } else { "pagechat=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let mut config = Config::load_or_default(config_path.as_deref())?;
    if let Some(profile) = profile {
        config.apply_profile(&profile)?;
        tracing::info!("Applied profile: {}", profile);
    }
    Ok(config)
}

/// Load models off the async runtime, then index `file` into a fresh session
async fn start_session(config: Config, file: &Path) -> Result<(RagEngine, String)> {
    tracing::info!("Loading models...");
    let engine = tokio::task::spawn_blocking(move || RagEngine::from_config(config))
        .await
        .map_err(|e| PagechatError::Other(e.into()))??;

    let session_id = engine.new_session_id().await;
    let summary = engine.index_document(file, &session_id).await?;

    println!("✓ Indexed {}", summary.document_name);
    println!("  Session: {}", summary.session_id);
    println!(
        "  Pages: {}  Chunks: {}",
        summary.page_count, summary.chunk_count
    );

    Ok((engine, session_id))
}

async fn cmd_ask(config: Config, file: &Path, question: &str, show_sources: bool) -> Result<()> {
    let (engine, session_id) = start_session(config, file).await?;
    println!();
    stream_answer(&engine, &session_id, question, show_sources).await?;
    engine.delete_session(&session_id).await;
    Ok(())
}

async fn cmd_chat(config: Config, file: &Path, show_sources: bool) -> Result<()> {
    let (engine, session_id) = start_session(config, file).await?;
    println!("\nAsk a question. /history shows the conversation, /quit exits.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = lines.next_line().await.map_err(|e| PagechatError::Io {
            source: e,
            context: "Failed to read from stdin".to_string(),
        })?
        else {
            break;
        };

        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/history" => {
                for message in engine.history(&session_id).await.map_err(ChatError::from)? {
                    let who = match message.role {
                        Role::User => "you",
                        Role::Assistant => "assistant",
                    };
                    println!("[{}] {}", who, message.text);
                }
                continue;
            }
            question => {
                // A failed answer is reported; the session stays usable
                match stream_answer(&engine, &session_id, question, show_sources).await {
                    Err(PagechatError::Chat(ChatError::Generation(e))) => {
                        eprintln!("✗ {}", e);
                    }
                    other => other?,
                }
            }
        }
    }

    engine.delete_session(&session_id).await;
    Ok(())
}

/// Print the answer as it streams; Ctrl-C abandons the turn
async fn stream_answer(
    engine: &RagEngine,
    session_id: &str,
    question: &str,
    show_sources: bool,
) -> Result<()> {
    let mut stream = engine.chat(session_id, question).await?;
    let mut stdout = std::io::stdout();

    loop {
        tokio::select! {
            next = stream.next() => match next {
                Some(Ok(fragment)) => {
                    print!("{}", fragment);
                    stdout.flush().ok();
                }
                Some(Err(e)) => {
                    println!();
                    return Err(e.into());
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!("\n[interrupted]");
                return Ok(());
            }
        }
    }
    println!();

    if show_sources {
        if let Some(sources) = stream.sources() {
            let mut pages: Vec<u32> = sources.iter().map(|c| c.source_page).collect();
            pages.sort_unstable();
            pages.dedup();
            let pages: Vec<String> = pages.iter().map(|p| p.to_string()).collect();
            println!("\nSources: pages {}", pages.join(", "));
        }
    }
    println!();

    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = Config::load_or_default(config_path.as_deref())?;
            let content = toml::to_string_pretty(&config)?;
            println!("{}", content);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
        ConfigAction::Path => {
            println!("{}", Config::default_path()?.display());
        }
    }

    Ok(())
}
