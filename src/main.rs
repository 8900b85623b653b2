#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::uninlined_format_args
)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use notebooklm::auth::{AuthManager, Cookie, CookieStore, TokenAuthority};
use notebooklm::security::url_validation::{notebook_id_from_url, validate_notebook_url};
use notebooklm::{CallOptions, Config, NotebookError, QueryClient, QueryRequest, RpcClient};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt};

/// `nblm` - talk to NotebookLM without a browser.
#[derive(Parser, Debug)]
#[command(name = "nblm")]
#[command(version)]
#[command(about = "Headless NotebookLM client.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show whether saved credentials are usable
    Status,

    /// Delete saved cookies and the encryption key
    Logout,

    /// Save cookies exported by a browser login (JSON array)
    Import {
        /// Path to the cookie JSON file
        file: PathBuf,
    },

    /// Call a batchexecute RPC and print its decoded result
    Rpc {
        /// RPC identifier, e.g. wXbhsf
        id: String,

        /// JSON array of parameters
        params: String,

        /// Routing hint sent as source-path
        #[arg(long)]
        source_path: Option<String>,

        /// Per-call timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Ask a question against notebook sources
    Ask {
        /// Notebook id or notebook URL
        notebook: String,

        question: String,

        /// Source id to ground the answer on (repeatable)
        #[arg(long = "source")]
        sources: Vec<String>,
    },
}

fn cookie_store(config: &Config) -> Arc<CookieStore> {
    Arc::new(CookieStore::from_config(config))
}

fn token_authority(config: &Config) -> Arc<TokenAuthority> {
    Arc::new(TokenAuthority::new(
        cookie_store(config),
        config.endpoints.clone(),
        &config.timeouts,
    ))
}

fn resolve_notebook_id(raw: &str, config: &Config) -> notebooklm::Result<String> {
    if !raw.starts_with("http://") && !raw.starts_with("https://") {
        return Ok(raw.to_string());
    }
    validate_notebook_url(raw, &config.endpoints.base_url)?;
    notebook_id_from_url(raw)
        .ok_or_else(|| NotebookError::validation(format!("No notebook id in URL: {raw}")))
}

fn print_json<T: serde::Serialize>(value: &T) -> notebooklm::Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| NotebookError::Unexpected(anyhow::anyhow!("Failed to encode output: {e}")))?;
    println!("{text}");
    Ok(())
}

async fn run(command: Commands, config: Config) -> notebooklm::Result<()> {
    match command {
        Commands::Status => {
            let store = cookie_store(&config);
            let has_cookies = store.has_cookies();
            let state = AuthManager::new(store).status();
            print_json(&serde_json::json!({
                "hasCookies": has_cookies,
                "isValid": state.is_valid,
                "needsRefresh": state.needs_refresh,
                "expiresAt": state.expires_at,
            }))
        }
        Commands::Logout => {
            AuthManager::new(cookie_store(&config)).logout()?;
            println!("Logged out.");
            Ok(())
        }
        Commands::Import { file } => {
            let raw = std::fs::read_to_string(&file).map_err(|e| {
                NotebookError::validation(format!("Cannot read {}: {e}", file.display()))
            })?;
            let cookies: Vec<Cookie> = serde_json::from_str(&raw)
                .map_err(|e| NotebookError::validation(format!("Invalid cookie JSON: {e}")))?;
            let saved = AuthManager::new(cookie_store(&config)).import_cookies(cookies)?;
            println!("Saved {saved} cookie(s).");
            Ok(())
        }
        Commands::Rpc {
            id,
            params,
            source_path,
            timeout_ms,
        } => {
            let params: serde_json::Value = serde_json::from_str(&params)
                .map_err(|e| NotebookError::validation(format!("PARAMS_JSON is not JSON: {e}")))?;
            if !params.is_array() {
                return Err(NotebookError::validation("PARAMS_JSON must be a JSON array"));
            }
            let mut options = CallOptions::default();
            if let Some(path) = source_path {
                options = options.source_path(path);
            }
            if let Some(ms) = timeout_ms {
                options = options.timeout(Duration::from_millis(ms));
            }

            let client = RpcClient::new(token_authority(&config), config.timeouts.rpc());
            let result = client.call_with(&id, &params, &options).await?;
            print_json(&result)
        }
        Commands::Ask {
            notebook,
            question,
            sources,
        } => {
            let notebook_id = resolve_notebook_id(&notebook, &config)?;
            let client = QueryClient::new(token_authority(&config), config.timeouts.query());
            // Conversation context lives in the client, so one-shot runs
            // always ask a fresh question.
            let request = QueryRequest::new(notebook_id, question).with_sources(sources);
            let result = client.query(&request).await?;
            print_json(&result)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging - respects RUST_LOG env var, defaults to INFO
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let config = Config::load().context("Failed to load configuration")?;

    if let Err(e) = run(cli.command, config).await {
        tracing::debug!("{e:?}");
        eprintln!("[{}] {}", e.category(), e.user_message());
        std::process::exit(1);
    }
    Ok(())
}
