//! eyedentify-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the SQLite
//! record store and the photo directory, and serves the API over HTTP.
//!
//! # Operator accounts
//!
//! ```text
//! cargo run -p eyedentify-server -- --hash-password
//! cargo run -p eyedentify-server -- --add-operator agent@example.sn --name "Mariama Diallo"
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::Parser;
use eyedentify_server::{AppState, ServerConfig, auth::hash_password};
use eyedentify_store_sqlite::{DiskObjectStorage, SqliteStore};
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Eyedentify enrollment server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,

  /// Register an operator with this email (password read from stdin) and
  /// exit.
  #[arg(long, value_name = "EMAIL", requires = "name")]
  add_operator: Option<String>,

  /// Display name for `--add-operator`.
  #[arg(long)]
  name: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Helper mode: hash a password and exit.
  if cli.hash_password {
    let password = read_password()?;
    let hash = hash_password(&password)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?;
    println!("{hash}");
    return Ok(());
  }

  let settings = config::Config::builder()
    .set_default("host", "127.0.0.1")?
    .set_default("port", 8080)?
    .set_default("base_url", "http://localhost:8080")?
    .set_default("store_path", "~/.local/share/eyedentify/eyedentify.db")?
    .set_default("storage_dir", "~/.local/share/eyedentify/storage")?
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("EYEDENTIFY"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let store_path = expand_tilde(&server_cfg.store_path);
  if let Some(parent) = store_path.parent() {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  // Helper mode: register an operator and exit.
  if let Some(email) = cli.add_operator {
    let name = cli.name.context("--name is required with --add-operator")?;
    let password = read_password()?;
    let hash = hash_password(&password)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?;
    let operator = store
      .add_operator(&email, &name, &hash)
      .await
      .with_context(|| format!("failed to add operator {email}"))?;
    println!("{}", operator.user_id);
    return Ok(());
  }

  let storage_dir = expand_tilde(&server_cfg.storage_dir);
  let storage = DiskObjectStorage::new(storage_dir, server_cfg.base_url.clone());

  let state = AppState {
    store:   Arc::new(store),
    storage: Arc::new(storage),
    config:  Arc::new(server_cfg.clone()),
  };

  let app = eyedentify_server::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  let password = line.trim_end_matches(['\n', '\r']).to_string();
  anyhow::ensure!(!password.is_empty(), "empty password");
  Ok(password)
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
