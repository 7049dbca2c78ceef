//! HTTP transport against the FOSSology v2 REST API.

pub mod client;
pub mod models;

pub use client::RestClient;
pub use models::{FossologyResponse, ScanJobRequest};
