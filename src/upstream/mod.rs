pub mod client;
pub mod retry;

pub use client::UpstreamClient;
pub use retry::RetryConfig;
