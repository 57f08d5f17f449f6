//! Search module
//!
//! Submits searches and polls asynchronous search jobs until they finish.

pub mod client;
pub mod types;

pub use client::{SearchClient, SEARCH_PATH};
pub use types::*;
