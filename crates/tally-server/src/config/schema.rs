use std::time::Duration;

use serde::Deserialize;
use tally_core::error::{Result, TallyError};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default)]
    pub store: StoreSection,

    #[serde(default)]
    pub tracing: TracingSection,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            store: StoreSection::default(),
            tracing: TracingSection::default(),
        }
    }
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.listen.parse::<std::net::SocketAddr>().is_err() {
            return Err(TallyError::BadConfig(format!(
                "listen must be a valid socket address, got {:?}",
                self.listen
            )));
        }
        self.store.validate()?;
        self.tracing.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSection {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_name")]
    pub database: String,

    #[serde(default = "default_name")]
    pub user: String,

    #[serde(default = "default_name")]
    pub password: String,

    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    #[serde(default = "default_max_overflow")]
    pub max_overflow: u32,

    #[serde(default = "default_pool_timeout_secs")]
    pub pool_timeout_secs: u64,

    #[serde(default = "default_pool_recycle_secs")]
    pub pool_recycle_secs: u64,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database: default_name(),
            user: default_name(),
            password: default_name(),
            pool_size: default_pool_size(),
            max_overflow: default_max_overflow(),
            pool_timeout_secs: default_pool_timeout_secs(),
            pool_recycle_secs: default_pool_recycle_secs(),
        }
    }
}

impl StoreSection {
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(TallyError::BadConfig("store.host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(TallyError::BadConfig("store.port must not be 0".into()));
        }
        if !(1..=1000).contains(&self.pool_size) {
            return Err(TallyError::BadConfig(
                "store.pool_size must be between 1 and 1000".into(),
            ));
        }
        if self.max_overflow > 1000 {
            return Err(TallyError::BadConfig(
                "store.max_overflow must not exceed 1000".into(),
            ));
        }
        if self.pool_timeout_secs == 0 {
            return Err(TallyError::BadConfig(
                "store.pool_timeout_secs must be at least 1".into(),
            ));
        }
        if self.pool_recycle_secs == 0 {
            return Err(TallyError::BadConfig(
                "store.pool_recycle_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// P + O: the hard cap on open connections.
    pub fn max_connections(&self) -> u32 {
        self.pool_size + self.max_overflow
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_timeout_secs)
    }

    pub fn recycle_after(&self) -> Duration {
        Duration::from_secs(self.pool_recycle_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TracingSection {
    /// `None` means "not set": tracing follows whether the exporter is compiled in.
    #[serde(default)]
    pub enabled: Option<bool>,

    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_service_name")]
    pub service_name: String,

    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for TracingSection {
    fn default() -> Self {
        Self {
            enabled: None,
            endpoint: None,
            service_name: default_service_name(),
            environment: default_environment(),
        }
    }
}

impl TracingSection {
    pub fn validate(&self) -> Result<()> {
        if self.service_name.trim().is_empty() {
            return Err(TallyError::BadConfig(
                "tracing.service_name must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Collector base URL, if tracing is switched on and a destination is set.
    pub fn active_endpoint(&self) -> Option<&str> {
        if self.enabled == Some(false) {
            return None;
        }
        self.endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_host() -> String {
    "postgres.prod.svc.cluster.local".into()
}
fn default_port() -> u16 {
    5432
}
fn default_name() -> String {
    "counter".into()
}
fn default_pool_size() -> u32 {
    5
}
fn default_max_overflow() -> u32 {
    2
}
fn default_pool_timeout_secs() -> u64 {
    30
}
fn default_pool_recycle_secs() -> u64 {
    300
}
fn default_service_name() -> String {
    "counter-backend".into()
}
fn default_environment() -> String {
    "prod".into()
}
