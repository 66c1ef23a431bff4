//! Utility modules shared across the player

pub mod http;
pub mod throttle;

pub use http::build_http_client;
pub use throttle::LogThrottler;
