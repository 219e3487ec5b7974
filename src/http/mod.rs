pub mod client;
pub mod model;
pub mod rate_limit;

pub use client::RateLimitedClient;
pub use model::Kline;
