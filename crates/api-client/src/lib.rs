pub mod client;
pub mod error;
pub mod retry;

pub use client::ApiClient;
pub use error::ApiError;
pub use livechat_api;
pub use retry::RetryConfig;
