//! `muster`: operator CLI for the Muster roster store.
//!
//! Reads `muster.toml` (or the path given with `--config`), opens the SQLite
//! store and runs one command, printing the result as JSON.
//!
//! # Usage
//!
//! ```text
//! muster facility add ZDV "Denver ARTCC"
//! muster person add 1293257 Jane Doe --initials JD
//! muster roster add 1293257 ZDV
//! muster --as 1293257 request submit 1293257 ZAB visiting --reason "winter"
//! ```
//!
//! Without `--as` or `--facility-key` every command runs as the trusted
//! operator.

mod commands;

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::Parser;
use muster_core::{engine::Principal, person::Cid};
use muster_store_sqlite::SqliteStore;
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::commands::{Command, Engine};

const DEFAULT_STORE_PATH: &str = "~/.local/share/muster/muster.db";

#[derive(Parser)]
#[command(name = "muster", author, version, about = "Roster and role administration")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "muster.toml")]
  config: PathBuf,

  /// Act as this member instead of the operator.
  #[arg(long = "as", value_name = "CID", global = true)]
  actor: Option<u64>,

  /// Act as the facility owning this API key.
  #[arg(long, value_name = "KEY", global = true, conflicts_with = "actor")]
  facility_key: Option<String>,

  #[command(subcommand)]
  command: Command,
}

/// Settings read from the config file and `MUSTER_*` environment variables.
#[derive(Debug, Deserialize)]
struct Settings {
  store_path: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let settings: Settings = config::Config::builder()
    .set_default("store_path", DEFAULT_STORE_PATH)
    .context("failed to set config defaults")?
    .add_source(config::File::from(cli.config.clone()).required(false))
    .add_source(config::Environment::with_prefix("MUSTER"))
    .build()
    .context("failed to read config file")?
    .try_deserialize()
    .context("failed to deserialise Settings")?;

  let store_path = expand_tilde(&settings.store_path);
  if let Some(parent) = store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {}", parent.display()))?;
  }

  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  let engine = Engine::with_log_notifier(store.into());

  let principal = match (cli.actor, cli.facility_key) {
    (Some(cid), _) => engine
      .member(Cid(cid))
      .await
      .with_context(|| format!("cannot act as {cid}"))?,
    (None, Some(key)) => engine
      .facility_principal(key)
      .await
      .context("cannot act as facility")?,
    (None, None) => Principal::Operator,
  };
  tracing::debug!(actor = %principal, "resolved principal");

  let output = cli.command.run(&engine, &principal).await?;
  println!(
    "{}",
    serde_json::to_string_pretty(&output).context("failed to encode output")?
  );
  Ok(())
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
