//! Transparency reporting.
//!
//! Tracks how much the recorder has collected so participants can audit it.

pub mod log;

pub use log::{
    create_shared_log, create_shared_log_with_persistence, SharedTransparencyLog, TransparencyLog,
    TransparencyStats,
};
