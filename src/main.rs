use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use std::path::PathBuf;
use tokio::sync::mpsc;

use habitat::client::ApiClient;
use habitat::config::{Config, JWT_SECRET_ENV};
use habitat::feed::FeedSession;
use habitat::server::{self, AppState, TokenManager};
use habitat::storage::{Database, DatabaseError};

mod app;
mod ui;

use app::{App, AppEvent};

/// Get the config directory path (~/.config/habitat/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("habitat"))
}

/// Create the config directory with user-only permissions.
fn ensure_config_dir(dir: &std::path::Path) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        tracing::info!(path = %dir.display(), "Created config directory");
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(dir) {
            Ok(metadata) => {
                let mut perms = metadata.permissions();
                perms.set_mode(0o700);
                if let Err(e) = std::fs::set_permissions(dir, perms) {
                    tracing::warn!(
                        path = %dir.display(),
                        error = %e,
                        "Failed to set config directory permissions to 0700"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(path = %dir.display(), error = %e, "Failed to read config directory metadata");
            }
        }
    }
    Ok(())
}

#[derive(Parser, Debug)]
#[command(name = "habitat", about = "Habitat community feeds: API server and terminal client")]
struct Cli {
    /// Config file (default: ~/.config/habitat/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the REST API
    Serve {
        /// Listen address, overrides `bind_address`
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
        /// SQLite database file, overrides `database_path`
        #[arg(long, value_name = "PATH")]
        db: Option<String>,
    },
    /// Browse a habitat feed in the terminal
    Browse {
        /// Habitat to open (default: the first one the server lists)
        #[arg(long, value_name = "ID")]
        habitat: Option<i64>,
        /// API base URL, overrides `api_base_url`
        #[arg(long, value_name = "URL")]
        api: Option<String>,
        /// Bearer token for hearts, overrides `api_token`
        #[arg(long, value_name = "TOKEN")]
        token: Option<String>,
        /// Posts per request (server default when omitted)
        #[arg(long, value_name = "N")]
        limit: Option<i64>,
    },
    /// Print a signed bearer token for a user
    Token {
        #[arg(long, value_name = "ID")]
        user: i64,
        #[arg(long, value_name = "PATH")]
        db: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_dir = get_config_dir()?;
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    tracing::debug!(?config, "Configuration");

    match cli.command {
        Command::Serve { bind, db } => {
            let db = open_database(&config, &config_dir, db).await?;
            let tokens = token_manager(&config)?;
            let state = AppState::new(
                db.clone(),
                tokens,
                config.page_limits(),
                config.max_images_per_post,
            );
            let bind = bind.unwrap_or_else(|| config.bind_address.clone());
            server::serve(&bind, state).await?;
            db.close().await;
        }
        Command::Browse {
            habitat,
            api,
            token,
            limit,
        } => {
            let base = api.unwrap_or_else(|| config.api_base_url.clone());
            let token = token.or_else(|| config.api_token.clone()).map(SecretString::from);
            let client = ApiClient::new(&base, token)
                .with_context(|| format!("Invalid API URL {base}"))?;
            browse(client, habitat, limit, &config).await?;
        }
        Command::Token { user, db } => {
            let db = open_database(&config, &config_dir, db).await?;
            if !db.user_exists(user).await.context("Failed to look up user")? {
                anyhow::bail!("No user with id {user}");
            }
            let (token, expires) = token_manager(&config)?
                .sign(user)
                .context("Failed to sign token")?;
            db.close().await;
            println!("{token}");
            tracing::info!(user, expires, "Token issued");
        }
    }
    Ok(())
}

async fn open_database(config: &Config, config_dir: &std::path::Path, flag: Option<String>) -> Result<Database> {
    let path = match flag.or_else(|| config.database_path.clone()) {
        Some(path) => path,
        None => {
            ensure_config_dir(config_dir)?;
            config_dir
                .join("habitat.db")
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?
                .to_string()
        }
    };

    match Database::open(&path).await {
        Ok(db) => Ok(db),
        Err(DatabaseError::InstanceLocked) => {
            anyhow::bail!("The database at {path} is locked by another process. Please close it and try again.")
        }
        Err(e) => Err(anyhow::anyhow!("Failed to open database {path}: {e}")),
    }
}

fn token_manager(config: &Config) -> Result<TokenManager> {
    let secret = config.jwt_secret().ok_or_else(|| {
        anyhow::anyhow!("No signing secret: set {JWT_SECRET_ENV} or jwt_secret in the config file")
    })?;
    Ok(TokenManager::new(
        &secret,
        chrono::Duration::hours(config.token_ttl_hours),
    ))
}

async fn browse(client: ApiClient, habitat: Option<i64>, limit: Option<i64>, config: &Config) -> Result<()> {
    let habitat_id = match habitat {
        Some(id) => id,
        None => client
            .list_habitats()
            .await
            .with_context(|| format!("Failed to reach {}", client.base_url()))?
            .first()
            .map(|h| h.id)
            .ok_or_else(|| anyhow::anyhow!("The server has no habitats yet"))?,
    };
    tracing::info!(habitat_id, api = %client.base_url(), "Opening feed");

    // Real viewport is set once the terminal is up.
    let session = FeedSession::new(habitat_id, 0, config.session_config());
    let mut app = App::new(client, session, limit);

    let (event_tx, event_rx) = mpsc::channel::<AppEvent>(32);
    ui::run(&mut app, event_tx, event_rx).await
}
