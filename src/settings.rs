//! Driver settings
//!
//! Stored as JSON next to the binary (or wherever `--config` points).

use std::path::Path;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::*;

/// Environment variable that overrides `server_url`
pub const SERVER_URL_ENV: &str = "BUZZ_WIRE_SERVER_URL";

/// Which signal decides whether the probe is touching the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CollisionSource {
    /// Flag supplied by the presentation layer (engine colliders)
    #[default]
    #[value(alias = "engine")]
    External,
    /// `is_colliding` reported by the session server
    #[value(alias = "remote")]
    Server,
    /// Containment test against the locally built segment colliders
    Local,
    /// Any of the above
    #[value(alias = "all")]
    Any,
}

impl CollisionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollisionSource::External => "external",
            CollisionSource::Server => "server",
            CollisionSource::Local => "local",
            CollisionSource::Any => "any",
        }
    }

    /// Combine the available signals into one flag
    pub fn resolve(&self, external: bool, server: bool, local: bool) -> bool {
        match self {
            CollisionSource::External => external,
            CollisionSource::Server => server,
            CollisionSource::Local => local,
            CollisionSource::Any => external || server || local,
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to access settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Session driver settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // === Server ===
    /// Base URL of the session server
    pub server_url: String,
    /// Timeout applied to every request (seconds)
    pub request_timeout_secs: f32,
    /// Delay between health checks while disconnected (seconds)
    pub health_retry_secs: f32,

    // === Session ===
    /// Contact distance sent with the start request
    pub collision_threshold: f32,
    /// Debounce window between counted collisions (seconds)
    pub collision_cooldown_secs: f32,
    /// Which collision signal drives the counter
    pub collision_source: CollisionSource,

    // === Geometry ===
    pub wire_radius: f32,
    pub collider_radius_multiplier: f32,
    pub zone_marker_scale: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            health_retry_secs: HEALTH_RETRY_SECS,

            collision_threshold: DEFAULT_COLLISION_THRESHOLD,
            collision_cooldown_secs: COLLISION_COOLDOWN_SECS,
            collision_source: CollisionSource::default(),

            wire_radius: WIRE_RADIUS,
            collider_radius_multiplier: COLLIDER_RADIUS_MULTIPLIER,
            zone_marker_scale: ZONE_MARKER_SCALE,
        }
    }
}

/// Seconds as a `Duration`; negative clamps to zero, out-of-range uses `default`
fn seconds(key: &str, secs: f32, default: f32) -> Duration {
    match Duration::try_from_secs_f32(secs.max(0.0)) {
        Ok(duration) => duration,
        Err(e) => {
            log::warn!("settings: {key} = {secs} unusable ({e}), using {default}");
            Duration::from_secs_f32(default)
        }
    }
}

impl Settings {
    /// Per-request timeout as a `Duration`
    pub fn request_timeout(&self) -> Duration {
        seconds(
            "request_timeout_secs",
            self.request_timeout_secs,
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )
    }

    pub fn health_retry_interval(&self) -> Duration {
        seconds(
            "health_retry_secs",
            self.health_retry_secs,
            HEALTH_RETRY_SECS,
        )
    }

    /// Read settings from a JSON file
    pub fn read(path: &Path) -> Result<Self, SettingsError> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Load settings, falling back to defaults when the file is missing or invalid
    pub fn load(path: &Path) -> Self {
        let mut settings = match Self::read(path) {
            Ok(settings) => {
                log::info!("Loaded settings from {}", path.display());
                settings
            }
            Err(e) => {
                log::info!("Using default settings ({e})");
                Self::default()
            }
        };
        settings.apply_env();
        settings
    }

    /// Write settings as pretty JSON
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        log::info!("Settings saved to {}", path.display());
        Ok(())
    }

    /// Apply environment overrides
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(SERVER_URL_ENV) {
            if !url.trim().is_empty() {
                self.server_url = url.trim().to_string();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{"server_url": "http://10.0.0.2:5000", "collision_source": "any"}"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.server_url, "http://10.0.0.2:5000");
        assert_eq!(settings.collision_source, CollisionSource::Any);
        assert_eq!(settings.collision_cooldown_secs, COLLISION_COOLDOWN_SECS);
        assert_eq!(settings.request_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("settings.json"));
        assert_eq!(settings.collision_threshold, DEFAULT_COLLISION_THRESHOLD);
    }

    #[test]
    fn test_save_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = Settings {
            collision_threshold: 0.08,
            collision_source: CollisionSource::Local,
            ..Settings::default()
        };
        settings.save(&path).unwrap();
        let loaded = Settings::read(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_invalid_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Settings::read(&path), Err(SettingsError::Json(_))));
        assert_eq!(Settings::load(&path).wire_radius, WIRE_RADIUS);
    }

    #[test]
    fn test_out_of_range_durations_fall_back() {
        let settings = Settings {
            request_timeout_secs: 1.0e20,
            health_retry_secs: f32::INFINITY,
            ..Settings::default()
        };
        assert_eq!(settings.request_timeout(), Duration::from_secs(5));
        assert_eq!(settings.health_retry_interval(), Duration::from_secs(1));

        let negative = Settings {
            request_timeout_secs: -3.0,
            ..Settings::default()
        };
        assert_eq!(negative.request_timeout(), Duration::ZERO);
    }

    #[test]
    fn test_collision_source_resolve() {
        assert!(CollisionSource::External.resolve(true, false, false));
        assert!(!CollisionSource::External.resolve(false, true, true));
        assert!(CollisionSource::Server.resolve(false, true, false));
        assert!(CollisionSource::Local.resolve(false, false, true));
        assert!(CollisionSource::Any.resolve(false, false, true));
        assert!(!CollisionSource::Any.resolve(false, false, false));
        assert_eq!(
            CollisionSource::from_str("Engine", true),
            Ok(CollisionSource::External)
        );
        assert!(CollisionSource::from_str("nope", true).is_err());
    }
}
