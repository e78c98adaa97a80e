use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const TRACKER_JSON: &str = "tracker.json";
const STORE_JSON: &str = "store.json";

pub const DEFAULT_WEEK_LIMIT: u32 = 8;
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 1_000;
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigBundle {
    pub tracker: serde_json::Value,
    pub store: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerSettings {
    pub default_week_limit: u32,
    pub settle_delay_ms: u64,
    pub log_level: String,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            default_week_limit: DEFAULT_WEEK_LIMIT,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Sqlite,
    Rest { base_url: String, timeout_seconds: u64 },
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            TRACKER_JSON,
            serde_json::json!({
                "schema": 1,
                "defaultWeekLimit": DEFAULT_WEEK_LIMIT,
                "settleDelayMs": DEFAULT_SETTLE_DELAY_MS,
                "logLevel": DEFAULT_LOG_LEVEL
            }),
        ),
        (
            STORE_JSON,
            serde_json::json!({
                "schema": 1,
                "backend": "sqlite",
                "rest": {
                    "baseUrl": null,
                    "timeoutSeconds": DEFAULT_TIMEOUT_SECONDS
                }
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_configs(config_dir: &Path) -> Result<ConfigBundle, InfraError> {
    Ok(ConfigBundle {
        tracker: read_config(&config_dir.join(TRACKER_JSON))?,
        store: read_config(&config_dir.join(STORE_JSON))?,
    })
}

pub fn read_tracker_settings(config_dir: &Path) -> Result<TrackerSettings, InfraError> {
    let path = config_dir.join(TRACKER_JSON);
    let tracker = read_config(&path)?;
    let defaults = TrackerSettings::default();

    let default_week_limit = match tracker.get("defaultWeekLimit") {
        None | Some(serde_json::Value::Null) => defaults.default_week_limit,
        Some(value) => value
            .as_u64()
            .and_then(|limit| u32::try_from(limit).ok())
            .filter(|limit| *limit > 0)
            .ok_or_else(|| {
                InfraError::InvalidConfig(format!(
                    "defaultWeekLimit must be a positive integer in {}",
                    path.display()
                ))
            })?,
    };
    let settle_delay_ms = tracker
        .get("settleDelayMs")
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(defaults.settle_delay_ms);
    let log_level = tracker
        .get("logLevel")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or(defaults.log_level);

    Ok(TrackerSettings {
        default_week_limit,
        settle_delay_ms,
        log_level,
    })
}

pub fn read_store_backend(config_dir: &Path) -> Result<StoreBackend, InfraError> {
    let path = config_dir.join(STORE_JSON);
    let store = read_config(&path)?;
    let backend = store
        .get("backend")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .unwrap_or("sqlite")
        .to_ascii_lowercase();

    match backend.as_str() {
        "sqlite" => Ok(StoreBackend::Sqlite),
        "rest" => {
            let rest = store.get("rest");
            let base_url = rest
                .and_then(|rest| rest.get("baseUrl"))
                .and_then(serde_json::Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| {
                    InfraError::InvalidConfig(format!(
                        "rest.baseUrl is required for the rest backend in {}",
                        path.display()
                    ))
                })?;
            let timeout_seconds = rest
                .and_then(|rest| rest.get("timeoutSeconds"))
                .and_then(serde_json::Value::as_u64)
                .filter(|seconds| *seconds > 0)
                .unwrap_or(DEFAULT_TIMEOUT_SECONDS);
            Ok(StoreBackend::Rest {
                base_url: base_url.to_string(),
                timeout_seconds,
            })
        }
        other => Err(InfraError::InvalidConfig(format!(
            "unknown store backend '{other}' in {}",
            path.display()
        ))),
    }
}
