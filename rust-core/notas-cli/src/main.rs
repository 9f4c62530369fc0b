// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//!
//! notas: inspect, migrate and watch notas document storage.
//!
//! Subcommands:
//! - `list`: documents of the active backend
//! - `info`: active backend and document count
//! - `migrate`: copy every document between two backends, then verify
//! - `rollback`: empty a backend
//! - `watch`: print changes in the documents directory until Ctrl-C

mod format;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use notas_storage::handle_store::HandleStore;
use notas_storage::{
    BackendKind, BackendRegistry, Document, FileSystemBackend, FileWatcher, MigrationConfig,
    MigrationEngine, StorageBackend, StorageConfig, StorageError, StorageService, WatchHandler,
};

use format::{format_documents, format_progress, OutputFormat};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Where the CLI keeps its state when the configuration names no paths.
const STATE_DIR: &str = ".notas";

#[derive(Parser, Debug)]
#[command(name = "notas", version = VERSION, about = "notas document storage tool")]
struct Cli {
    /// JSON configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend to use instead of the default priority order.
    #[arg(long, global = true)]
    backend: Option<BackendKind>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every document.
    List {
        /// Output format (table or json).
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },
    /// Show the active backend and document count.
    Info,
    /// Copy every document from one backend to another.
    Migrate {
        #[arg(long)]
        from: BackendKind,
        #[arg(long)]
        to: BackendKind,
        /// Documents written concurrently per batch.
        #[arg(long)]
        batch_size: Option<usize>,
        /// Empty the target again if verification fails.
        #[arg(long)]
        rollback_on_failure: bool,
    },
    /// Delete every document from a backend.
    Rollback {
        #[arg(long)]
        target: BackendKind,
    },
    /// Print changes in the documents directory until interrupted.
    Watch {
        /// Poll interval in milliseconds.
        #[arg(long)]
        interval_ms: Option<u64>,
    },
}

fn load_config(cli: &Cli) -> Result<StorageConfig, StorageError> {
    let mut config = match &cli.config {
        Some(path) => StorageConfig::from_file(path)?,
        None => StorageConfig::default(),
    };
    config.apply_env()?;
    if let Some(kind) = cli.backend {
        config.preferred_backend = Some(kind);
    }
    let state = PathBuf::from(STATE_DIR);
    config
        .local_db_path
        .get_or_insert_with(|| state.join("notas.redb"));
    config
        .handle_store_path
        .get_or_insert_with(|| state.join("handle.json"));
    Ok(config)
}

async fn open_backend(
    registry: &BackendRegistry,
    kind: BackendKind,
) -> Result<Arc<dyn StorageBackend>, StorageError> {
    let backend = registry
        .create(kind)
        .ok_or_else(|| StorageError::NotConfigured(format!("{kind} backend is not configured")))?;
    backend.initialize().await?;
    Ok(backend)
}

struct PrintingHandler;

impl WatchHandler for PrintingHandler {
    fn on_file_added(&self, id: &str, doc: Document) {
        println!("{} {id} ({})", "added".green(), doc.title);
    }

    fn on_file_changed(&self, id: &str, doc: Document) {
        println!("{} {id} ({})", "changed".yellow(), doc.title);
    }

    fn on_file_deleted(&self, id: &str) {
        println!("{} {id}", "deleted".red());
    }

    fn on_error(&self, error: &StorageError) {
        eprintln!("{} {error}", "error".red().bold());
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&cli)?;

    match cli.command {
        Command::List { format } => {
            let service = StorageService::from_config(config);
            let docs = service.list_documents().await?;
            println!("{}", format_documents(&docs, format));
        }
        Command::Info => {
            let service = StorageService::from_config(config);
            let count = service.list_documents().await?.len();
            println!("backend:   {}", service.backend_type()?.to_string().bold());
            println!("documents: {count}");
        }
        Command::Migrate {
            from,
            to,
            batch_size,
            rollback_on_failure,
        } => {
            let registry = BackendRegistry::from_config(&config);
            let source = open_backend(&registry, from).await?;
            let target = open_backend(&registry, to).await?;
            let engine = MigrationEngine::new(source, target);

            if !engine.needs_migration().await? {
                tracing::warn!(%from, %to, "target already holds documents or source is empty");
            }

            let options = MigrationConfig {
                batch_size: batch_size.unwrap_or(config.migration.batch_size),
                ..config.migration.clone()
            };
            let report = engine
                .migrate(&options, |progress| {
                    if let Some(line) = format_progress(progress) {
                        println!("{line}");
                    }
                })
                .await?;
            for error in &report.errors {
                println!("{} {}: {}", "failed".red(), error.id, error.message);
            }

            let verification = engine.verify().await?;
            println!(
                "verify: source {} / target {} / errors {} -> {}",
                verification.source_count,
                verification.target_count,
                verification.error_count,
                if verification.success {
                    "ok".green()
                } else {
                    "mismatch".red()
                }
            );
            if !verification.success && rollback_on_failure {
                let deleted = engine.rollback().await?;
                println!("rolled back {deleted} documents from {to}");
            }
        }
        Command::Rollback { target } => {
            let registry = BackendRegistry::from_config(&config);
            let backend = open_backend(&registry, target).await?;
            let engine = MigrationEngine::new(backend.clone(), backend);
            let deleted = engine.rollback().await?;
            println!("deleted {deleted} documents from {target}");
        }
        Command::Watch { interval_ms } => {
            let handle_store = config.handle_store_path.clone().map(HandleStore::new);
            let backend = Arc::new(match handle_store {
                Some(store) => FileSystemBackend::with_handle_store(config.documents_dir.clone(), store),
                None => match &config.documents_dir {
                    Some(dir) => FileSystemBackend::new(dir),
                    None => return Err(StorageError::NotConfigured("no documents directory".into()).into()),
                },
            });
            backend.initialize().await?;

            let interval = interval_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.watcher.interval());
            let watcher = FileWatcher::with_interval(Arc::new(PrintingHandler), interval);
            watcher.set_backend(backend).await?;
            watcher.start().await?;
            println!("watching (Ctrl-C to stop)");

            tokio::signal::ctrl_c().await?;
            watcher.stop().await;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    run(Cli::parse()).await
}
