//! Viewfinder configuration
//!
//! Loaded from a JSON file (`viewfinder.json` next to the executable, or the
//! path in `VIEWFINDER_CONFIG`). A missing or malformed file falls back to
//! defaults with a logged warning; config problems are never fatal.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::boost::TransformKind;
use crate::error::ConfigError;
use crate::render::fov::FovSettings;

/// Environment variable naming an alternative config path
pub const CONFIG_ENV: &str = "VIEWFINDER_CONFIG";

/// Default config file name
pub const CONFIG_FILE: &str = "viewfinder.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewfinderConfig {
    /// Feed and screen FOVs in degrees
    pub fov: FovSettings,
    /// Which boost transformation to start with
    pub transformation: TransformKind,
    /// Initial sensor-mode speed, in units of c
    pub default_speed: f64,
    /// Orbit distance of the outside camera position
    pub camera_outside_distance: f64,
    /// Optional image file for the user-facing feed
    pub user_feed_image: Option<PathBuf>,
    /// Optional image file for the environment-facing feed
    pub env_feed_image: Option<PathBuf>,
}

impl Default for ViewfinderConfig {
    fn default() -> Self {
        Self {
            fov: FovSettings::default(),
            transformation: TransformKind::Lorentz,
            default_speed: 0.5,
            camera_outside_distance: 4.0,
            user_feed_image: None,
            env_feed_image: None,
        }
    }
}

impl ViewfinderConfig {
    /// Load from an explicit path
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from `VIEWFINDER_CONFIG` or the default file, else defaults
    pub fn load_or_default() -> Self {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));

        match Self::load(&path) {
            Ok(config) => {
                log::info!("loaded config from {}", path.display());
                config
            }
            Err(ConfigError::Io { .. }) => {
                log::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                log::warn!("{e}; using defaults");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ViewfinderConfig::default();
        assert_eq!(config.transformation, TransformKind::Lorentz);
        assert!((config.default_speed - 0.5).abs() < 1e-12);
        assert!((config.camera_outside_distance - 4.0).abs() < 1e-12);
        assert!((config.fov.user - 67.3).abs() < 1e-12);
    }

    #[test]
    fn test_json_round_trip() {
        let mut config = ViewfinderConfig::default();
        config.transformation = TransformKind::Galilean;
        config.default_speed = -0.25;

        let text = serde_json::to_string(&config).unwrap();
        let back: ViewfinderConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back.transformation, TransformKind::Galilean);
        assert!((back.default_speed + 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: ViewfinderConfig =
            serde_json::from_str(r#"{ "default_speed": 0.9 }"#).unwrap();
        assert!((config.default_speed - 0.9).abs() < 1e-12);
        assert_eq!(config.transformation, TransformKind::Lorentz);
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let err = ViewfinderConfig::load(Path::new("/nonexistent/viewfinder.json"));
        assert!(matches!(err, Err(ConfigError::Io { .. })));
    }
}
