//! fileharbor-search: run a search against the fileharbor API
//!
//! Submits the search, follows the job until it finishes and prints the
//! result as JSON.

use clap::Parser;
use fileharbor_client::{ClientConfig, ClientError, Filters, Gateway, SearchClient, SearchParams, StatusBoard};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "fileharbor-search", version, about = "Search the fileharbor API")]
struct Cli {
    /// Query text
    #[arg(short, long)]
    query: Option<String>,

    /// Modality tag (e.g. image, text)
    #[arg(short, long)]
    modality: Option<String>,

    /// Dataset to search (repeatable)
    #[arg(short, long)]
    dataset: Vec<String>,

    /// Similarity mode (repeatable)
    #[arg(short, long)]
    similarity: Vec<String>,

    /// Filter as key=value; values are parsed as JSON when possible (repeatable)
    #[arg(short, long = "filter", value_parser = parse_filter)]
    filters: Vec<(String, Value)>,

    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// API host, overriding the configuration
    #[arg(long, env = "FILEHARBOR_API")]
    api: Option<String>,
}

fn parse_filter(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;

    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.trim().to_string(), value))
}

impl Cli {
    fn params(&self) -> SearchParams {
        SearchParams {
            query: self.query.clone(),
            modality: self.modality.clone(),
            dataset: (!self.dataset.is_empty()).then(|| self.dataset.clone()),
            similarity: (!self.similarity.is_empty()).then(|| self.similarity.clone()),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fileharbor_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let mut config = ClientConfig::load(cli.config.as_deref())?;
    if let Some(api) = &cli.api {
        config = config.with_api(api.clone());
    }
    info!("Using API at {}", config.base_url());

    let board = StatusBoard::new();
    let gateway = Gateway::new(&config, board.clone())?;
    let client = Arc::new(SearchClient::new(gateway, &config));

    if !cli.filters.is_empty() {
        let filters: Filters = cli.filters.iter().cloned().collect();
        client.set_filters(filters);
    }

    // Report status and job progress while the search runs
    let mut status = board.subscribe_status();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            info!("Status: loading={} error={}", current.loading, current.error);
        }
    });

    let mut snapshots = client.subscribe();
    tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            match &snapshot.job_id {
                Some(job_id) => info!("Search {:?}: waiting on job {}", snapshot.phase, job_id),
                None => info!("Search {:?}", snapshot.phase),
            }
        }
    });

    match client.search(cli.params()).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(ClientError::Request(message)) => {
            warn!("Search failed");
            eprintln!("{}", serde_json::to_string_pretty(&message)?);
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}
