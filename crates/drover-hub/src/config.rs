//! Hub configuration with layered loading.
//!
//! Configuration is resolved from three layers (in priority order):
//! 1. **Compiled defaults** — [`HubConfig::default()`]
//! 2. **Config file** — JSON, deep-merged over defaults
//! 3. **Environment variables** — `DROVER_*` overrides (highest priority)
//!
//! Deep merge rules: objects merge recursively, arrays and primitives are
//! replaced entirely, nulls in the source are skipped. Invalid environment
//! values are logged and ignored.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use drover_core::RetryConfig;

/// Errors from loading or parsing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file from disk.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse JSON in the config file.
    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

/// Per-node-link tunables.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinkConfig {
    /// Capacity of each session's bounded outbound command queue.
    pub queue_capacity: usize,
    /// How long a dispatch send may wait on a full queue before being
    /// abandoned for that session, in ms.
    pub send_timeout_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            send_timeout_ms: 1000,
        }
    }
}

/// Liveness sweep tunables.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LivenessConfig {
    /// Status ingest staleness beyond which a node flips to Disconnected,
    /// in ms.
    pub staleness_ms: u64,
    /// Sweep interval, in ms.
    pub sweep_interval_ms: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            staleness_ms: 15_000,
            sweep_interval_ms: 5_000,
        }
    }
}

/// Transcript hub tunables.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranscriptConfig {
    /// Maximum retained entries per scope; oldest are dropped first.
    pub retention: usize,
    /// Capacity of each scope's submission queue; a full queue rejects.
    pub queue_capacity: usize,
    /// Capacity of each scope's live broadcast channel.
    pub broadcast_capacity: usize,
    /// Bound on a single evaluator call, in ms.
    pub eval_timeout_ms: u64,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            retention: 1024,
            queue_capacity: 64,
            broadcast_capacity: 1024,
            eval_timeout_ms: 30_000,
        }
    }
}

/// Presence tracker tunables.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PresenceConfig {
    /// Capacity of the presence broadcast channel.
    pub broadcast_capacity: usize,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 256,
        }
    }
}

/// Top-level hub configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubConfig {
    /// Identifier of this control plane, shown in topology snapshots.
    pub plane_id: String,
    /// Node link tunables.
    pub link: LinkConfig,
    /// Liveness sweep tunables.
    pub liveness: LivenessConfig,
    /// Transcript tunables.
    pub transcript: TranscriptConfig,
    /// Presence tunables.
    pub presence: PresenceConfig,
    /// Reconnect backoff defaults handed to observer clients.
    pub retry: RetryConfig,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            plane_id: "plane-1".into(),
            link: LinkConfig::default(),
            liveness: LivenessConfig::default(),
            transcript: TranscriptConfig::default(),
            presence: PresenceConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Loader
// ─────────────────────────────────────────────────────────────────────────────

/// Default config file name, resolved relative to the working directory.
const DEFAULT_CONFIG_FILE: &str = "drover.json";

/// Load configuration from the default location.
///
/// `DROVER_CONFIG` overrides the file path; otherwise `drover.json` in the
/// working directory is used (and silently skipped when absent).
pub fn load_config() -> Result<HubConfig, ConfigError> {
    let path = std::env::var("DROVER_CONFIG")
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_owned());
    load_config_from_path(Path::new(&path))
}

/// Load configuration from a file path with env var overrides.
///
/// If the file does not exist, returns defaults (plus env overrides). If the
/// file contains invalid JSON, returns an error.
pub fn load_config_from_path(path: &Path) -> Result<HubConfig, ConfigError> {
    let defaults = serde_json::to_value(HubConfig::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading hub config from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "config file not found, using defaults");
        defaults
    };

    let mut config: HubConfig = serde_json::from_value(merged)?;
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `DROVER_*` environment variable overrides.
///
/// Integers must parse and fall within range; invalid values are logged and
/// ignored (falling back to file/default).
pub fn apply_env_overrides(config: &mut HubConfig) {
    if let Some(v) = read_env_string("DROVER_PLANE_ID") {
        config.plane_id = v;
    }
    if let Some(v) = read_env_u64("DROVER_STALENESS_MS", 100, 3_600_000) {
        config.liveness.staleness_ms = v;
    }
    if let Some(v) = read_env_u64("DROVER_SWEEP_INTERVAL_MS", 100, 3_600_000) {
        config.liveness.sweep_interval_ms = v;
    }
    if let Some(v) = read_env_u64("DROVER_SEND_TIMEOUT_MS", 10, 600_000) {
        config.link.send_timeout_ms = v;
    }
    if let Some(v) = read_env_usize("DROVER_LINK_QUEUE", 1, 65_536) {
        config.link.queue_capacity = v;
    }
    if let Some(v) = read_env_usize("DROVER_TRANSCRIPT_RETENTION", 1, 1_048_576) {
        config.transcript.retention = v;
    }
    if let Some(v) = read_env_u64("DROVER_EVAL_TIMEOUT_MS", 100, 3_600_000) {
        config.transcript.eval_timeout_ms = v;
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid integer env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid integer env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = HubConfig::default();
        assert_eq!(cfg.plane_id, "plane-1");
        assert_eq!(cfg.link.queue_capacity, 64);
        assert_eq!(cfg.link.send_timeout_ms, 1000);
        assert_eq!(cfg.liveness.staleness_ms, 15_000);
        assert_eq!(cfg.liveness.sweep_interval_ms, 5_000);
        assert_eq!(cfg.transcript.retention, 1024);
        assert_eq!(cfg.transcript.queue_capacity, 64);
        assert_eq!(cfg.transcript.eval_timeout_ms, 30_000);
        assert_eq!(cfg.presence.broadcast_capacity, 256);
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = HubConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: HubConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.liveness.staleness_ms, cfg.liveness.staleness_ms);
        assert_eq!(back.transcript.retention, cfg.transcript.retention);
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let cfg: HubConfig =
            serde_json::from_str(r#"{"liveness":{"stalenessMs":500}}"#).unwrap();
        assert_eq!(cfg.liveness.staleness_ms, 500);
        // untouched fields keep defaults
        assert_eq!(cfg.liveness.sweep_interval_ms, 5_000);
        assert_eq!(cfg.transcript.retention, 1024);
    }

    #[test]
    fn deep_merge_objects() {
        let target = serde_json::json!({"a": {"x": 1, "y": 2}, "b": 3});
        let source = serde_json::json!({"a": {"y": 20}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"]["x"], 1);
        assert_eq!(merged["a"]["y"], 20);
        assert_eq!(merged["b"], 3);
    }

    #[test]
    fn deep_merge_skips_nulls() {
        let target = serde_json::json!({"a": 1});
        let source = serde_json::json!({"a": null, "b": 2});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn deep_merge_replaces_arrays() {
        let target = serde_json::json!({"a": [1, 2, 3]});
        let source = serde_json::json!({"a": [9]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], serde_json::json!([9]));
    }

    #[test]
    fn parse_u64_range_enforces_bounds() {
        assert_eq!(parse_u64_range("500", 100, 1000), Some(500));
        assert_eq!(parse_u64_range("50", 100, 1000), None);
        assert_eq!(parse_u64_range("5000", 100, 1000), None);
        assert_eq!(parse_u64_range("abc", 100, 1000), None);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = load_config_from_path(Path::new("/nonexistent/drover.json")).unwrap();
        assert_eq!(cfg.transcript.retention, 1024);
    }
}
