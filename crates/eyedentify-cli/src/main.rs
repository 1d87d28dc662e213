//! `eyedentify` — operator terminal for CNI enrollment and identification.
//!
//! # Usage
//!
//! ```text
//! eyedentify --url http://localhost:8080 --email agent@example.sn --password secret
//! eyedentify --config ~/.config/eyedentify/cli.toml
//! ```

mod app;
mod audit_file;
mod client;
mod ui;

use std::{
  io,
  path::{Path, PathBuf},
  sync::{Arc, Mutex},
  time::Duration,
};

use anyhow::{Context, Result};
use app::{App, Screen, Settings};
use audit_file::JsonFileAudit;
use clap::Parser;
use client::{ApiClient, ApiConfig};
use crossterm::{
  event::{self, Event, KeyEventKind},
  execute,
  terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use eyedentify_core::{audit::AuditLog, iris::IrisScanner, wizard::EnrollmentConfig};
use ratatui::{Terminal, backend::CrosstermBackend};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

const DEFAULT_URL: &str = "http://localhost:8080";
const DEFAULT_SUCCESS_RATE: f64 = 0.8;
const DEFAULT_DISPLAY_DELAY: Duration = Duration::from_secs(2);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "eyedentify", about = "Operator terminal for CNI enrollment")]
struct Args {
  /// Path to a TOML config file.
  #[arg(short, long, value_name = "FILE", env = "EYEDENTIFY_CONFIG")]
  config: Option<PathBuf>,

  /// Base URL of the eyedentify server (default: http://localhost:8080).
  #[arg(long, env = "EYEDENTIFY_URL")]
  url: Option<String>,

  /// Operator email; signs in on startup together with --password.
  #[arg(long, env = "EYEDENTIFY_EMAIL")]
  email: Option<String>,

  /// Operator password (plaintext).
  #[arg(long, env = "EYEDENTIFY_PASSWORD")]
  password: Option<String>,

  /// Where the local operation history is kept.
  #[arg(long, value_name = "FILE", env = "EYEDENTIFY_AUDIT_FILE")]
  audit_file: Option<PathBuf>,

  /// Write diagnostics to this file. Nothing is logged without one.
  #[arg(long, value_name = "FILE", env = "EYEDENTIFY_LOG_FILE")]
  log_file: Option<PathBuf>,
}

// ─── Config file ──────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file.
#[derive(Deserialize, Default)]
struct ConfigFile {
  #[serde(default)]
  url:                         String,
  #[serde(default)]
  email:                       String,
  #[serde(default)]
  password:                    String,
  audit_file:                  Option<PathBuf>,
  log_file:                    Option<PathBuf>,
  identification_success_rate: Option<f64>,
  display_delay_ms:            Option<u64>,
  request_timeout_secs:        Option<u64>,
  authority:                   Option<String>,
}

fn non_empty(s: &str) -> Option<String> { (!s.is_empty()).then(|| s.to_owned()) }

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();

  let file_cfg: ConfigFile = if let Some(path) = &args.config {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).context("parsing config file")?
  } else {
    ConfigFile::default()
  };

  // The terminal owns stdout, so diagnostics only ever go to a file.
  if let Some(path) = args.log_file.clone().or(file_cfg.log_file.clone()) {
    init_file_logging(&expand_tilde(&path))?;
  }

  // CLI flags override config file, which overrides defaults.
  let api_config = ApiConfig {
    base_url: args
      .url
      .or_else(|| non_empty(&file_cfg.url))
      .unwrap_or_else(|| DEFAULT_URL.to_string()),
    timeout:  file_cfg
      .request_timeout_secs
      .map_or(DEFAULT_TIMEOUT, Duration::from_secs),
  };
  let email = args.email.or_else(|| non_empty(&file_cfg.email));
  let password = args.password.or_else(|| non_empty(&file_cfg.password));

  let audit_path = args
    .audit_file
    .or(file_cfg.audit_file)
    .map(|p| expand_tilde(&p))
    .unwrap_or_else(default_audit_path);
  let audit = Arc::new(AuditLog::open(Arc::new(JsonFileAudit::new(audit_path))));

  let success_rate = file_cfg
    .identification_success_rate
    .unwrap_or(DEFAULT_SUCCESS_RATE);
  anyhow::ensure!(
    (0.0..=1.0).contains(&success_rate),
    "identification_success_rate must be between 0 and 1"
  );
  let mut enrollment = EnrollmentConfig::default();
  if let Some(authority) = file_cfg.authority {
    enrollment.authority = authority;
  }
  let settings = Settings {
    success_rate,
    display_delay: file_cfg
      .display_delay_ms
      .map_or(DEFAULT_DISPLAY_DELAY, Duration::from_millis),
    scanner: IrisScanner::new(),
    enrollment,
  };

  let client = ApiClient::new(api_config)?;
  let mut app = App::new(client, audit, settings).await?;

  if let (Some(email), Some(password)) = (email, password) {
    match app.session.sign_in(&email, &password).await {
      Ok(_) => {
        app.screen = Screen::Dashboard;
        app.refresh_dashboard().await;
      }
      Err(e) => {
        app.sign_in.email = email;
        app.sign_in.error = Some(e.to_string());
      }
    }
  }

  // Set up the terminal.
  enable_raw_mode().context("enabling raw mode")?;
  let mut stdout = io::stdout();
  execute!(stdout, EnterAlternateScreen).context("entering alternate screen")?;
  let backend = CrosstermBackend::new(stdout);
  let mut terminal = Terminal::new(backend).context("creating terminal")?;

  let run_result = run_event_loop(&mut terminal, &mut app).await;

  // Restore terminal regardless of result.
  disable_raw_mode().ok();
  execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
  terminal.show_cursor().ok();

  run_result
}

// ─── Event loop ───────────────────────────────────────────────────────────────

async fn run_event_loop(
  terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
  app: &mut App,
) -> Result<()> {
  loop {
    app.tick().await;
    terminal.draw(|f| ui::draw(f, app)).context("drawing frame")?;

    // Poll for an event, yielding control to tokio while waiting.
    let maybe_event = tokio::task::block_in_place(|| {
      if event::poll(Duration::from_millis(50))? {
        Ok::<_, io::Error>(Some(event::read()?))
      } else {
        Ok(None)
      }
    })?;

    if let Some(Event::Key(key)) = maybe_event
      && key.kind == KeyEventKind::Press
      && !app.handle_key(key).await?
    {
      break;
    }
  }

  Ok(())
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn init_file_logging(path: &Path) -> Result<()> {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("creating log directory {}", parent.display()))?;
  }
  let file = std::fs::OpenOptions::new()
    .create(true)
    .append(true)
    .open(path)
    .with_context(|| format!("opening log file {}", path.display()))?;

  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    )
    .with_ansi(false)
    .with_writer(Mutex::new(file))
    .init();
  Ok(())
}

fn default_audit_path() -> PathBuf {
  expand_tilde(Path::new("~/.local/share/eyedentify/audit.json"))
}

fn expand_tilde(path: &Path) -> PathBuf {
  if let Ok(rest) = path.strip_prefix("~")
    && let Some(home) = std::env::var_os("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
