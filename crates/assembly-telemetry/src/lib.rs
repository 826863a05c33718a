//! # Assembly Telemetry
//!
//! Structured logging for the block assembly pipeline.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use assembly_telemetry::{init_logging, TelemetryConfig};
//!
//! let config = TelemetryConfig::for_component("miner");
//! let _handle = init_logging(&config)?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `ASSEMBLY_SERVICE_NAME` | `block-assembly` | Service name in log lines |
//! | `ASSEMBLY_LOG_LEVEL` | `info` | Log level filter (`RUST_LOG` wins) |
//! | `ASSEMBLY_JSON_LOGS` | `false` | JSON output |
//! | `ASSEMBLY_THREAD_IDS` | `false` | Thread ids in log lines |

#![warn(missing_docs)]

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::{build_env_filter, init_logging, init_test_logging, LoggingHandle};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// A global subscriber is already installed
    #[error("Subscriber already initialized: {0}")]
    AlreadyInitialized(String),

    /// Invalid filter or configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}
