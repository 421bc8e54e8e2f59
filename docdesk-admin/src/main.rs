//! docdesk - document administration client
//!
//! Lists, inspects, and deletes documents on the e-signature API and drives
//! their asynchronous analyses from the command line.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docdesk_common::config::{ConfigResolver, LoggingConfig, API_URL_ENV, CONFIG_PATH_ENV};
use docdesk_common::events::EventBus;
use docdesk_common::{CompanyId, DocumentId};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docdesk_admin::{ApiClient, ConfirmationPort, DocumentCollectionView, ViewOptions};

mod commands;

/// Command-line arguments for docdesk
#[derive(Parser, Debug)]
#[command(name = "docdesk")]
#[command(about = "Administrative client for documents and their analyses")]
#[command(version)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// REST API root, e.g. http://localhost:8000/api/
    #[arg(long, env = API_URL_ENV)]
    api_url: Option<String>,

    /// Only show documents of this company
    #[arg(long)]
    company: Option<CompanyId>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List documents with their analysis status
    List {
        /// Keep running until every in-flight analysis settles
        #[arg(short, long)]
        watch: bool,
    },
    /// List companies
    Companies,
    /// Show a document and its analysis
    Show { id: DocumentId },
    /// Request an analysis for a document
    Analyze {
        id: DocumentId,
        /// Re-run even if an analysis exists
        #[arg(short, long)]
        force: bool,
        /// Wait for the analysis to settle
        #[arg(short, long)]
        wait: bool,
    },
    /// Remove a document's analysis
    RemoveAnalysis {
        id: DocumentId,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Delete a document
    Delete {
        id: DocumentId,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

impl Command {
    fn skips_confirmation(&self) -> bool {
        matches!(
            self,
            Command::RemoveAnalysis { yes: true, .. } | Command::Delete { yes: true, .. }
        )
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    let file_layer = match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };
    let stderr_layer = file_layer
        .is_none()
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ConfigResolver::new(args.config.clone())
        .with_api_url(args.api_url.clone())
        .resolve();
    if args.company.is_some() {
        config.company_id = args.company;
    }

    init_tracing(&config.logging)?;
    info!(api = %config.api_base_url, "Starting docdesk {}", env!("CARGO_PKG_VERSION"));

    let client = Arc::new(ApiClient::from_config(&config).context("Failed to create API client")?);
    let confirmation: Arc<dyn ConfirmationPort> = if args.command.skips_confirmation() {
        Arc::new(docdesk_admin::AutoConfirm(true))
    } else {
        Arc::new(commands::StdinConfirmation)
    };

    let view = DocumentCollectionView::new(
        client.clone(),
        client,
        confirmation,
        EventBus::new(config.event_capacity),
        ViewOptions::from_config(&config),
    );

    let result = commands::run(args.command, &view).await;
    view.dispose();
    result
}
