//! fileharbor-mock: standalone mock search backend

use fileharbor_mock::{serve, MockConfig, MockState};
use std::path::Path;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fileharbor_mock=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting fileharbor-mock v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = if let Some(config_path) = std::env::args().nth(1) {
        info!("Loading configuration from {}", config_path);
        MockConfig::from_file(Path::new(&config_path))?
    } else {
        info!("No config file specified, using development defaults");
        MockConfig::development()
    }
    .with_env_overrides();

    info!(
        "Jobs answer after {} pending replies; minimum query length {}",
        config.pending_polls, config.min_query_len
    );

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    serve(listener, MockState::new(config)).await
}
