use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Top-level service configuration, loaded from dugs.toml.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    pub database: DatabaseSection,
    pub war: WarSection,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub url: String,
    pub max_connections: u32,
    /// Upper bound on a single store round trip, in milliseconds.
    pub store_timeout_ms: u64,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: "sqlite:dugs.db?mode=rwc".into(),
            max_connections: 5,
            store_timeout_ms: 5_000,
        }
    }
}

impl DatabaseSection {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms.max(1))
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WarSection {
    pub resolve_interval_secs: u64,
    /// Only resolve wars whose expiry has passed.
    pub require_expiry: bool,
    /// Capacity of the war notification queue.
    pub notification_buffer: usize,
}

impl Default for WarSection {
    fn default() -> Self {
        Self {
            resolve_interval_secs: 30,
            require_expiry: false,
            notification_buffer: 64,
        }
    }
}

impl WarSection {
    pub fn resolve_interval(&self) -> Duration {
        Duration::from_secs(self.resolve_interval_secs.max(1))
    }
}

impl ServerConfig {
    /// Load config from a TOML file. Falls back to defaults if the file doesn't exist.
    /// Environment variables override TOML values.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let mut config = if Path::new(path).exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {path}"))?;
            Self::parse(&contents).with_context(|| format!("failed to parse config file {path}"))?
        } else {
            info!("No config file found at {}, using defaults", path);
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply overrides from `lookup` (the process environment in production).
    /// Values that do not parse are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("DATABASE_URL") {
            self.database.url = v;
        }
        if let Some(v) = lookup("DATABASE_MAX_CONNECTIONS")
            && let Ok(n) = v.parse()
        {
            self.database.max_connections = n;
        }
        if let Some(v) = lookup("STORE_TIMEOUT_MS")
            && let Ok(ms) = v.parse()
        {
            self.database.store_timeout_ms = ms;
        }
        if let Some(v) = lookup("WAR_RESOLVE_INTERVAL_SECS")
            && let Ok(secs) = v.parse()
        {
            self.war.resolve_interval_secs = secs;
        }
        if let Some(v) = lookup("WAR_REQUIRE_EXPIRY")
            && let Ok(flag) = v.parse()
        {
            self.war.require_expiry = flag;
        }
    }
}
