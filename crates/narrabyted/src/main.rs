//! `narrabyted`: the CLI/daemon entry point for the documentation
//! generation orchestrator. Three subcommands: `serve` starts the
//! HTTP+SSE surface, `init` writes a default org config, and `migrate`
//! runs the SessionStore's migrations idempotently.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use docs_core::config::{default_config_path, load_org_config, save_org_config, OrgConfig};
use docs_core::orchestrator::Orchestrator;
use docs_core::store::{SessionStore, SqliteSessionStore};
use docs_web::{run_web_server, WebState};

#[derive(Debug, Parser)]
#[command(name = "narrabyted", about = "Narrabyte documentation generation orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the HTTP+SSE surface.
    Serve {
        /// Path to the org config TOML. Defaults to `$NARRABYTE_CONFIG` or
        /// `~/.narrabyte/orchestrator.toml`.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Path to the SQLite session store. Defaults to
        /// `$NARRABYTE_DB` or `~/.narrabyte/sessions.sqlite3`.
        #[arg(long)]
        db: Option<PathBuf>,
        /// Overrides the bind address from the config's `[http]` section.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Write a default org config to disk.
    Init {
        #[arg(long)]
        config: Option<PathBuf>,
        /// Overwrite an existing config file.
        #[arg(long)]
        force: bool,
    },
    /// Run the SessionStore's migrations idempotently.
    Migrate {
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

fn default_db_path() -> PathBuf {
    if let Ok(path) = std::env::var("NARRABYTE_DB") {
        return PathBuf::from(path);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".narrabyte").join("sessions.sqlite3")
}

fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve { config, db, bind } => serve(config, db, bind).await,
        Command::Init { config, force } => init(config, force),
        Command::Migrate { db } => migrate(db),
    }
}

async fn serve(config: Option<PathBuf>, db: Option<PathBuf>, bind: Option<String>) -> anyhow::Result<()> {
    let config_path = config.unwrap_or_else(default_config_path);
    let org = load_org_config(&config_path)?;
    let bind_addr = bind.unwrap_or_else(|| org.http.bind.clone());

    let db_path = db.unwrap_or_else(default_db_path);
    ensure_parent_dir(&db_path)?;
    let store: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::open(&db_path)?);

    let orchestrator = Arc::new(Orchestrator::new(org, store));
    let state = WebState::new(orchestrator);

    println!("narrabyted: binding to {bind_addr} (config: {}, db: {})", config_path.display(), db_path.display());
    run_web_server(&bind_addr, state).await?;
    Ok(())
}

fn init(config: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let config_path = config.unwrap_or_else(default_config_path);
    if config_path.exists() && !force {
        anyhow::bail!("{} already exists; pass --force to overwrite", config_path.display());
    }
    save_org_config(&config_path, &OrgConfig::default())?;
    println!("wrote default config to {}", config_path.display());
    Ok(())
}

fn migrate(db: Option<PathBuf>) -> anyhow::Result<()> {
    let db_path = db.unwrap_or_else(default_db_path);
    ensure_parent_dir(&db_path)?;
    let store = SqliteSessionStore::open(&db_path)?;
    store.migrate()?;
    println!("migrated session store at {}", db_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_db_path_respects_env_override() {
        std::env::set_var("NARRABYTE_DB", "/tmp/narrabyte-test-db.sqlite3");
        assert_eq!(default_db_path(), PathBuf::from("/tmp/narrabyte-test-db.sqlite3"));
        std::env::remove_var("NARRABYTE_DB");
    }

    #[test]
    fn init_then_migrate_round_trip_against_tempdir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config_path = dir.path().join("orchestrator.toml");
        let db_path = dir.path().join("sessions.sqlite3");

        init(Some(config_path.clone()), false).expect("init");
        assert!(config_path.exists());

        let err = init(Some(config_path.clone()), false).unwrap_err();
        assert!(err.to_string().contains("already exists"));

        migrate(Some(db_path.clone())).expect("migrate");
        assert!(db_path.exists());
    }
}
