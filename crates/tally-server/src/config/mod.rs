//! Service config loader.
//!
//! Configuration comes from an optional YAML file (`TALLY_CONFIG`, strict
//! parsing) overlaid with environment variables. Every option has a default,
//! so an empty environment yields a config pointing at the conventional store.

pub mod schema;

use std::fs;

use tally_core::error::{Result, TallyError};

pub use schema::{ServiceConfig, StoreSection, TracingSection};

/// Environment variable naming the optional YAML file.
pub const CONFIG_PATH_VAR: &str = "TALLY_CONFIG";

pub fn load_from_file(path: &str) -> Result<ServiceConfig> {
    let cfg = parse_file(path)?;
    cfg.validate()?;
    Ok(cfg)
}

pub fn load_from_str(s: &str) -> Result<ServiceConfig> {
    let cfg = parse_str(s)?;
    cfg.validate()?;
    Ok(cfg)
}

/// Strict parse only; ranges are checked once the environment is applied.
fn parse_file(path: &str) -> Result<ServiceConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| TallyError::BadConfig(format!("read config failed ({path}): {e}")))?;
    parse_str(&s)
}

fn parse_str(s: &str) -> Result<ServiceConfig> {
    serde_yaml::from_str(s).map_err(|e| TallyError::BadConfig(format!("invalid yaml: {e}")))
}

/// Load from the process environment.
pub fn load() -> Result<ServiceConfig> {
    load_with(|key| std::env::var(key).ok())
}

/// Load with an injectable variable lookup.
pub fn load_with<F>(lookup: F) -> Result<ServiceConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut cfg = match lookup(CONFIG_PATH_VAR) {
        Some(path) if !path.trim().is_empty() => parse_file(path.trim())?,
        _ => ServiceConfig::default(),
    };
    apply_env(&mut cfg, &lookup)?;
    cfg.validate()?;
    Ok(cfg)
}

/// Overlay recognized environment variables onto `cfg`.
pub fn apply_env<F>(cfg: &mut ServiceConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("LISTEN_ADDR") {
        cfg.listen = v;
    }

    let store = &mut cfg.store;
    if let Some(v) = lookup("DB_HOST") {
        store.host = v;
    }
    if let Some(v) = lookup("DB_PORT") {
        store.port = parse_num("DB_PORT", &v)?;
    }
    if let Some(v) = lookup("DB_NAME") {
        store.database = v;
    }
    if let Some(v) = lookup("DB_USER") {
        store.user = v;
    }
    if let Some(v) = lookup("DB_PASSWORD") {
        store.password = v;
    }
    if let Some(v) = lookup("DB_POOL_SIZE") {
        store.pool_size = parse_num("DB_POOL_SIZE", &v)?;
    }
    if let Some(v) = lookup("DB_MAX_OVERFLOW") {
        store.max_overflow = parse_num("DB_MAX_OVERFLOW", &v)?;
    }
    if let Some(v) = lookup("DB_POOL_TIMEOUT_SECS") {
        store.pool_timeout_secs = parse_num("DB_POOL_TIMEOUT_SECS", &v)?;
    }
    if let Some(v) = lookup("DB_POOL_RECYCLE_SECS") {
        store.pool_recycle_secs = parse_num("DB_POOL_RECYCLE_SECS", &v)?;
    }

    let tracing = &mut cfg.tracing;
    if let Some(v) = lookup("OTEL_ENABLED") {
        tracing.enabled = Some(is_truthy(&v));
    }
    if let Some(v) = lookup("OTEL_EXPORTER_OTLP_ENDPOINT") {
        tracing.endpoint = Some(v);
    }
    if let Some(v) = lookup("OTEL_SERVICE_NAME") {
        tracing.service_name = v;
    }
    if let Some(v) = lookup("OTEL_ENV") {
        tracing.environment = v;
    }
    Ok(())
}

/// `1`, `true`, `yes`, `on` (any case) switch a flag on; anything else is off.
pub fn is_truthy(v: &str) -> bool {
    matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_num<T>(key: &str, v: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    v.trim()
        .parse::<T>()
        .map_err(|e| TallyError::BadConfig(format!("{key}={v:?}: {e}")))
}
