//! fileharbor-client: search client for the fileharbor API
//!
//! Searches on the fileharbor backend may take a while. The server answers a
//! search either with the final result or with a `job_id`, in which case the
//! client polls until the result is ready.
//!
//! # Components
//!
//! - [`Gateway`]: the single HTTP entry point. Resolves the API base URL,
//!   attaches the CSRF token, and keeps the shared [`StatusBoard`] up to date
//!   while ignoring job status polls.
//! - [`SearchClient`]: owns search parameters and filters, submits searches,
//!   drives the poll loop and exposes the result as a watchable snapshot.
//!
//! # Example
//!
//! ```no_run
//! use fileharbor_client::{ClientConfig, Gateway, SearchClient, SearchParams, StatusBoard};
//!
//! # async fn run() -> fileharbor_client::Result<()> {
//! let config = ClientConfig::load(None)?;
//! let board = StatusBoard::new();
//! let gateway = Gateway::new(&config, board.clone())?;
//! let client = SearchClient::new(gateway, &config);
//!
//! let result = client
//!     .search(SearchParams::query("lighthouse").with_dataset(["paintings"]))
//!     .await?;
//! println!("{} entries", result.entries.len());
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod config;
pub mod error;
pub mod gateway;
pub mod job;
pub mod search;
pub mod status;

pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use gateway::{ApiRequest, Gateway};
pub use job::JobId;
pub use search::{Filters, SearchClient, SearchParams, SearchPhase, SearchResult, SearchSnapshot};
pub use status::{ErrorMessage, RequestStatus, StatusBoard};
