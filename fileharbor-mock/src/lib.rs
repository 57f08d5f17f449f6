//! fileharbor-mock: mock search backend
//!
//! Speaks the asynchronous search protocol of the fileharbor API so the
//! client can be developed and tested without the real analyser stack.
//!
//! - `POST /search` with `{"params": {...}}` starts a search and answers with
//!   `{"job_id": ...}`, or with the result directly when no polling is
//!   configured.
//! - `POST /search` with `{"params": {"job_id": ...}}` polls the job until it
//!   answers with `{"entries": [...], "aggregations": [...]}`.
//! - Short queries are rejected with `400 {"query": ["Too short"]}`, unknown
//!   jobs with `404 "Not found."`.

pub mod config;
pub mod jobs;
pub mod server;

pub use config::MockConfig;
pub use server::{router, serve, MockState};
