use std::io;
use std::path::Path;
use std::sync::Arc;

use api_client::{ApiClient, ApiConfig, ApiError, ApiRequest, CookieStore, CredentialSlot, CredentialStore, Method};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("cookie file {path}: {source}")]
    CookieFile { path: String, source: io::Error },
}

#[derive(Parser, Debug)]
#[command(name = "api-cli", about = "Authenticated API client CLI")]
struct Cli {
    /// Overrides `API_BASE_URL` from the environment.
    #[arg(long)]
    base_url: Option<String>,

    #[arg(long, env = "API_COOKIE_FILE", default_value = ".api-cookies")]
    cookie_file: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "API_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Logout,
    Get {
        path: String,
    },
    Post(BodyArgs),
    Put(BodyArgs),
    Patch(BodyArgs),
    Delete {
        path: String,
    },
    /// Show which credentials are stored (never their values).
    Tokens,
}

#[derive(Args, Debug)]
struct BodyArgs {
    path: String,
    #[arg(long, default_value = "{}")]
    data: String,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!(error = %e, "no .env loaded");
    }

    let cli = Cli::parse();
    let config = resolve_config(cli.base_url.as_deref())?;

    let store = Arc::new(load_cookie_store(Path::new(&cli.cookie_file), config.cookie_secure).await?);
    let client = ApiClient::from_config(&config, store.clone())?;

    let outcome = run(&client, cli.command).await;
    // Persist even on failure: a failed refresh or logout has cleared credentials.
    save_cookie_store(Path::new(&cli.cookie_file), &store).await?;
    outcome
}

fn resolve_config(base_url: Option<&str>) -> Result<ApiConfig, CliError> {
    let mut config = ApiConfig::from_env()?;
    if let Some(url) = base_url {
        let overridden = ApiConfig::new(url)?;
        config.base_url = overridden.base_url;
        config.cookie_secure = overridden.cookie_secure;
    }
    Ok(config)
}

async fn run(client: &ApiClient, command: Command) -> Result<(), CliError> {
    match command {
        Command::Login { email, password } => {
            client
                .login(&serde_json::json!({ "email": email, "password": password }))
                .await?;
            println!("logged in");
        }
        Command::Logout => {
            client.logout().await?;
            println!("logged out");
        }
        Command::Get { path } => print_json(&client.get_json_cached::<Value>(&path).await?)?,
        Command::Post(args) => send_body(client, Method::POST, args).await?,
        Command::Put(args) => send_body(client, Method::PUT, args).await?,
        Command::Patch(args) => send_body(client, Method::PATCH, args).await?,
        Command::Delete { path } => {
            client.delete(&path).await?;
            println!("deleted");
        }
        Command::Tokens => {
            for (label, slot) in [("access", CredentialSlot::Access), ("refresh", CredentialSlot::Refresh)] {
                let state = if client.credentials().get(slot).is_some() { "present" } else { "absent" };
                println!("{label}: {state}");
            }
        }
    }
    Ok(())
}

async fn send_body(client: &ApiClient, method: Method, args: BodyArgs) -> Result<(), CliError> {
    let body = parse_data(&args.data)?;
    let request = ApiRequest::new(method, &args.path).json(body);
    let value: Value = client.send_json(&request).await?;
    print_json(&value)
}

fn parse_data(raw: &str) -> Result<Value, CliError> {
    Ok(serde_json::from_str(raw)?)
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

// =============================================================================
// COOKIE FILE
// =============================================================================

/// Load the cookie file, treating a missing file as an empty store.
async fn load_cookie_store(path: &Path, secure: bool) -> Result<CookieStore, CliError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(source) => return Err(CliError::CookieFile { path: path.display().to_string(), source }),
    };
    Ok(CookieStore::from_cookie_header(&raw, secure)?)
}

async fn save_cookie_store(path: &Path, store: &CookieStore) -> Result<(), CliError> {
    tokio::fs::write(path, store.cookie_header())
        .await
        .map_err(|source| CliError::CookieFile { path: path.display().to_string(), source })
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
