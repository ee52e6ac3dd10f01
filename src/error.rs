//! Error types for the viewfinder core
//!
//! Nothing in this taxonomy is fatal: every error degrades to "keep the last
//! good state and tell the caller".

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the orientation-sensor input path
#[derive(Debug, Error)]
pub enum SensorError {
    /// A sample arrived with missing angle fields, which is how the platform
    /// signals that sensor permission was denied or the sensor is absent
    #[error("orientation sensor unavailable or permission denied")]
    PermissionDenied,

    /// A sample carried non-finite angles
    #[error("orientation sample contained non-finite angles")]
    InvalidSample,
}

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}
