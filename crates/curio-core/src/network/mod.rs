//! HTTP plumbing shared by the registry client and the downloaders.

mod client;
mod download;
mod retry;

pub use client::HttpClient;
pub use download::FallbackDownloader;
pub use retry::{retry_async, RetryConfig, RetryStats};
