//! Session configuration
//!
//! Configuration is a plain serde structure with sensible defaults. It can be
//! loaded from a JSON file and is then overridden by command line flags.

pub mod schema;
pub mod store;

pub use schema::{IceServerConfig, SessionConfig, SinkStrategy, DEFAULT_STUN_SERVER};
pub use store::load_config;
