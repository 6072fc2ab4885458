//! Backend REST API access

mod client;

pub use client::{BackendApiClient, ProjectSummary, DEFAULT_TIMEOUT};
