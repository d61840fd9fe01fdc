// Service configuration
// Loaded from an optional TOML file, then overridden by ROOM_RESERVATIONS__* environment
// variables, e.g. ROOM_RESERVATIONS__DATABASE__URL or ROOM_RESERVATIONS__LOGGER__LEVEL.

use std::path::Path;

use anyhow::Context;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::{
    booking::BookingConfig, notify::NotificationConfig, room_client::CatalogClientConfig,
    store::DatabaseConfig,
};

pub const ENV_PREFIX: &str = "ROOM_RESERVATIONS";

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub database: DatabaseConfig,
    pub catalog: CatalogClientConfig,
    pub booking: BookingConfig,
    pub notifications: NotificationConfig,
    pub logger: LoggerConfig,
}

impl ServiceConfig {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .context("failed to read service configuration")?
            .try_deserialize::<ServiceConfig>()
            .context("invalid service configuration")
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub level: Level,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<&Level> for tracing::Level {
    fn from(value: &Level) -> Self {
        match value {
            Level::Trace => tracing::Level::TRACE,
            Level::Debug => tracing::Level::DEBUG,
            Level::Info => tracing::Level::INFO,
            Level::Warn => tracing::Level::WARN,
            Level::Error => tracing::Level::ERROR,
        }
    }
}

/// Installs the global fmt subscriber. Returns false if one was already installed.
pub fn init_logging(config: &LoggerConfig) -> bool {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::from(&config.level))
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::SinkConfig;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.booking.catalog_deadline_ms, 5000);
        assert_eq!(config.catalog.retry.max_retries, 0);
        assert!(config.catalog.replicas.is_empty());
        assert_eq!(config.logger.level, Level::Info);
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!(
            "room_reservations_config_{}.toml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            r#"
[database]
url = "postgres://db.internal/reservations"
max_connections = 20

[[catalog.replicas]]
name = "catalog-a"
url = "http://catalog-a:8080"

[[catalog.replicas]]
name = "catalog-b"
url = "http://catalog-b:8080"

[catalog.retry]
max_retries = 2

[booking]
catalog_deadline_ms = 2000

[notifications]
queue_capacity = 64

[notifications.sink]
kind = "sendgrid"
api_key = "secret"
from_email = "bookings@example.com"
from_name = "Bookings"
to_email = "frontdesk@example.com"
to_name = "Front desk"

[logger]
level = "debug"
"#,
        )
        .unwrap();

        let config = ServiceConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.database.url, "postgres://db.internal/reservations");
        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.catalog.replicas.len(), 2);
        assert_eq!(config.catalog.replicas[1].name, "catalog-b");
        assert_eq!(config.catalog.retry.max_retries, 2);
        // untouched fields keep their defaults
        assert_eq!(config.catalog.retry.initial_backoff_ms, 50);
        assert_eq!(config.booking.catalog_deadline_ms, 2000);
        assert_eq!(config.notifications.queue_capacity, 64);
        assert!(matches!(config.notifications.sink, SinkConfig::Sendgrid(_)));
        assert_eq!(config.logger.level, Level::Debug);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let missing = Path::new("/nonexistent/room_reservations.toml");
        assert!(ServiceConfig::load(Some(missing)).is_err());
    }

    #[test]
    fn test_level_mapping() {
        assert_eq!(tracing::Level::from(&Level::Warn), tracing::Level::WARN);
        assert_eq!(tracing::Level::from(&Level::Trace), tracing::Level::TRACE);
    }

    #[test]
    fn test_init_logging_twice() {
        init_logging(&LoggerConfig::default());
        assert!(!init_logging(&LoggerConfig::default()));
    }
}
