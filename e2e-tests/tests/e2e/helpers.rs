use fileharbor_client::{ClientConfig, Gateway, SearchClient, StatusBoard};
use fileharbor_mock::{serve, MockConfig, MockState};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::net::TcpListener;

static TRACING: Once = Once::new();

/// Mock backend running on an ephemeral port
pub struct TestEnv {
    pub url: String,
    pub mock: Arc<MockState>,
}

impl TestEnv {
    /// Start a mock backend with development defaults
    pub async fn start() -> Self {
        Self::start_with(MockConfig::development()).await
    }

    /// Start a mock backend with a custom configuration
    pub async fn start_with(config: MockConfig) -> Self {
        TRACING.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| "fileharbor_client=debug,fileharbor_mock=debug".into()),
                )
                .with_test_writer()
                .try_init();
        });

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind to ephemeral port");
        let url = format!("http://{}", listener.local_addr().expect("get local addr"));

        let mock = MockState::new(config);
        let server_state = mock.clone();
        tokio::spawn(async move {
            serve(listener, server_state).await.expect("mock backend run");
        });

        Self { url, mock }
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::development().with_api(self.url.clone())
    }

    pub fn gateway(&self) -> Gateway {
        Gateway::new(&self.config(), StatusBoard::new()).expect("create gateway")
    }

    /// Search client polling at `poll_interval`
    pub fn client(&self, poll_interval: Duration) -> Arc<SearchClient> {
        Arc::new(SearchClient::with_poll_interval(self.gateway(), poll_interval))
    }
}

/// Mock configuration whose jobs need `pending` replies before delivering
pub fn mock_config(pending: u32) -> MockConfig {
    MockConfig {
        pending_polls: pending,
        ..MockConfig::development()
    }
}
