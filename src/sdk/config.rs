/**
 * ============================================================================
 * TRACKER CONFIGURATION MODULE
 * ============================================================================
 *
 * PURPOSE: Configuration schema, persistence, and validation
 *
 * FUNCTIONALITY:
 * - Define configuration with production defaults
 * - Validate configuration values
 * - Load configuration from a JSON file
 * - Save configuration atomically
 *
 * ============================================================================
 */

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/**
 * Complete tracker configuration
 * Consumed by the tracker facade at construction
 */
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct TrackerConfig {
    // Collection endpoint (e.g., http://localhost:8080/api/track)
    pub endpoint: String,

    // Emit pageView at startup and listen to click/error/performance events
    pub auto_track: bool,

    // Loud failures (errors returned to the caller) instead of logged warnings
    pub debug: bool,

    // Queued events before a size-triggered flush
    pub batch_size: usize,

    // Milliseconds between the first queued event and the timer flush
    pub flush_interval_ms: u64,

    // Use the beacon primitive for unload flushes when available
    pub beacon_enabled: bool,

    // Per-request timeout for the HTTP network surface
    pub request_timeout_seconds: u64,

    // User agent sent with HTTP requests
    pub user_agent: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080/api/track".to_string(),
            auto_track: false,
            debug: false,
            batch_size: 5,
            flush_interval_ms: 2000,
            beacon_enabled: true,
            request_timeout_seconds: 10,
            user_agent: format!("pulse-tracker/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl TrackerConfig {
    /**
     * Configuration bound to an endpoint, every other field at its default
     */
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /**
     * Validate configuration values
     * Returns Ok(()) if valid, Err(String) with validation message if invalid
     */
    pub fn validate(&self) -> Result<(), String> {
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err("endpoint must start with http:// or https://".to_string());
        }
        if reqwest::Url::parse(&self.endpoint).is_err() {
            return Err(format!("endpoint '{}' is not a valid URL", self.endpoint));
        }

        if self.batch_size < 1 || self.batch_size > 1000 {
            return Err("batch_size must be between 1 and 1000".to_string());
        }
        if self.flush_interval_ms < 10 || self.flush_interval_ms > 600_000 {
            return Err("flush_interval_ms must be between 10 and 600000".to_string());
        }
        if self.request_timeout_seconds < 1 || self.request_timeout_seconds > 120 {
            return Err("request_timeout_seconds must be between 1 and 120".to_string());
        }

        Ok(())
    }
}

/**
 * Load configuration from disk
 * Returns default configuration if the file doesn't exist
 */
pub fn load_config(path: &Path) -> Result<TrackerConfig, String> {
    if !path.exists() {
        log::info!("Tracker config not found at {}, using defaults", path.display());
        return Ok(TrackerConfig::default());
    }

    let json_str = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config file: {}", e))?;

    let config: TrackerConfig = serde_json::from_str(&json_str)
        .map_err(|e| format!("Failed to parse config JSON: {}", e))?;

    config.validate()?;

    log::info!("Loaded tracker config from {}", path.display());
    Ok(config)
}

/**
 * Save configuration to disk atomically
 * Uses temporary file + rename to prevent corruption
 */
pub fn save_config(path: &Path, config: &TrackerConfig) -> Result<(), String> {
    config.validate()?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }

    let json_str = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;

    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, json_str)
        .map_err(|e| format!("Failed to write temporary config file: {}", e))?;

    fs::rename(&temp_path, path)
        .map_err(|e| format!("Failed to save config file: {}", e))?;

    log::info!("Saved tracker config to {}", path.display());
    Ok(())
}
