//! Shared types and configuration for the casari backend.
//!
//! This crate has zero internal deps so every other crate (db, events,
//! scheduler, cli) can depend on it.

pub mod config;
pub mod error;
pub mod panic;
pub mod types;

pub use config::{AppConfig, DatabaseConfig, DispatchMode, PubSubConfig, SchedulerConfig};
pub use error::ConfigError;
pub use panic::panic_message;
