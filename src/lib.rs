//! rtc-player - WebRTC play client for SRS streaming servers
//!
//! This crate discovers the play API of an SRS player page, negotiates a
//! receive-only WebRTC session and routes the received media into a sink
//! (discard, display or record).

pub mod config;
pub mod error;
pub mod events;
pub mod player;
pub mod sink;
pub mod utils;
pub mod webrtc;

#[cfg(test)]
mod test_util;

pub use error::{AppError, Result};
pub use player::{PlayTarget, Player};
