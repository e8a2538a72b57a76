//! HTTP client module with response classification.

mod client;
mod status;

pub use client::HttpClient;
pub use status::{classify_send_error, classify_status};
