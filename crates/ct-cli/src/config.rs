//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use chrono::TimeDelta;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use ct_core::{Interval, ValidationError};
use ct_db::PoolOptions;
use ct_engine::{EngineConfig, Schedules, schedule};

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// Pool size. Embedded SQLite allows a single writer, so 1 is the default.
    pub max_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self { max_connections: 1 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub aggregation_time: String,
    /// Semicolon-separated cron expressions.
    pub leaderboard_generation_time: String,
    pub leaderboard_scope: String,
    pub leaderboard_enabled: bool,
    /// Zero or less keeps data forever.
    pub data_retention_months: i32,
    pub data_cleanup_time: String,
    pub data_cleanup_dry_run: bool,
    pub keep_summaries_on_cleanup: bool,
    pub summary_cache_ttl_minutes: u64,
    pub summary_cache_capacity: u64,
    /// Zero accepts heartbeats of any age.
    pub heartbeat_max_age_days: i64,
    pub dev_mode: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let schedules = Schedules::default();
        let engine = EngineConfig::default();
        Self {
            aggregation_time: schedules.aggregation,
            leaderboard_generation_time: schedules.leaderboard,
            leaderboard_scope: engine.leaderboard_scope.as_str().to_string(),
            leaderboard_enabled: engine.leaderboard_enabled,
            data_retention_months: engine.data_retention_months,
            data_cleanup_time: schedules.cleanup,
            data_cleanup_dry_run: engine.data_cleanup_dry_run,
            keep_summaries_on_cleanup: engine.keep_summaries_on_cleanup,
            summary_cache_ttl_minutes: engine.summary_cache_ttl.as_secs() / 60,
            summary_cache_capacity: engine.summary_cache_capacity,
            heartbeat_max_age_days: 0,
            dev_mode: false,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("db", &self.db)
            .field("app", &self.app)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("ct.db"),
            db: DbConfig::default(),
            app: AppConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    ///
    /// Later sources win: defaults, `~/.config/ct/config.toml`, the given
    /// file, then `CT_*` environment variables (`__` separates nested keys).
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("CT_").split("__"));

        let mut config: Self = figment.extract()?;
        config.migrate_schedules();
        Ok(config)
    }

    /// Rewrites legacy `HH:MM` and `weekday,HH:MM` schedules to cron.
    fn migrate_schedules(&mut self) {
        let app = &mut self.app;
        for (key, value) in [
            ("app.aggregation_time", &mut app.aggregation_time),
            ("app.data_cleanup_time", &mut app.data_cleanup_time),
        ] {
            migrate(key, value);
        }

        let mut migrated = Vec::new();
        for part in app.leaderboard_generation_time.split(';') {
            let mut part = part.trim().to_string();
            if !part.is_empty() {
                migrate("app.leaderboard_generation_time", &mut part);
                migrated.push(part);
            }
        }
        app.leaderboard_generation_time = migrated.join(";");
    }

    /// Checks the values that would otherwise fail only once a job runs.
    pub fn validate(&self) -> Result<(), ValidationError> {
        schedule::parse(&self.app.aggregation_time)?;
        schedule::parse_list(&self.app.leaderboard_generation_time)?;
        schedule::parse(&self.app.data_cleanup_time)?;
        self.app.leaderboard_scope.parse::<Interval>()?;
        Ok(())
    }

    pub fn engine_config(&self) -> Result<EngineConfig, ValidationError> {
        let app = &self.app;
        let defaults = EngineConfig::default();
        Ok(EngineConfig {
            summary_cache_ttl: StdDuration::from_secs(app.summary_cache_ttl_minutes.max(1) * 60),
            summary_cache_capacity: app.summary_cache_capacity,
            heartbeat_max_age: (app.heartbeat_max_age_days > 0)
                .then(|| TimeDelta::days(app.heartbeat_max_age_days)),
            data_retention_months: app.data_retention_months,
            data_cleanup_dry_run: app.data_cleanup_dry_run,
            keep_summaries_on_cleanup: app.keep_summaries_on_cleanup,
            leaderboard_enabled: app.leaderboard_enabled,
            leaderboard_scope: app.leaderboard_scope.parse()?,
            ..defaults
        })
    }

    pub fn schedules(&self) -> Schedules {
        Schedules {
            aggregation: self.app.aggregation_time.clone(),
            leaderboard: self.app.leaderboard_generation_time.clone(),
            cleanup: self.app.data_cleanup_time.clone(),
        }
    }

    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            max_connections: self.db.max_connections,
            ..PoolOptions::default()
        }
    }
}

fn migrate(key: &str, value: &mut String) {
    match schedule::normalize(value) {
        Ok(normalized) if normalized != value.as_str() => {
            tracing::warn!(
                key,
                from = %value,
                to = %normalized,
                "legacy schedule format, please update your configuration"
            );
            *value = normalized.into_owned();
        }
        Ok(_) => {}
        Err(err) => tracing::debug!(key, error = %err, "schedule left for validation"),
    }
}

/// Returns the platform-specific config directory for ct.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("ct"))
}

/// Returns the platform-specific data directory for ct.
///
/// On Linux: `~/.local/share/ct`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("ct"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(toml: &str) -> Config {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, toml).unwrap();
        Config::load_from(Some(&path)).unwrap()
    }

    #[test]
    fn test_default_config_uses_data_dir_for_db() {
        let config = Config::default();
        let data_dir = dirs_data_path().unwrap();
        assert_eq!(config.database_path, data_dir.join("ct.db"));
        assert_eq!(config.db.max_connections, 1);
    }

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        let engine = config.engine_config().unwrap();
        assert_eq!(engine.leaderboard_scope, Interval::Past7Days);
        assert_eq!(engine.data_retention_months, -1);
        assert_eq!(engine.heartbeat_max_age, None);
    }

    #[test]
    fn file_values_override_defaults() {
        let config = load(
            r#"
            database_path = "/tmp/ct-test.db"

            [app]
            leaderboard_scope = "30_days"
            data_retention_months = 12
            heartbeat_max_age_days = 7
            "#,
        );
        assert_eq!(config.database_path, PathBuf::from("/tmp/ct-test.db"));
        let engine = config.engine_config().unwrap();
        assert_eq!(engine.leaderboard_scope, Interval::Past30Days);
        assert_eq!(engine.data_retention_months, 12);
        assert_eq!(engine.heartbeat_max_age, Some(TimeDelta::days(7)));
    }

    #[test]
    fn legacy_schedules_are_migrated() {
        let config = load(
            r#"
            [app]
            aggregation_time = "02:15"
            leaderboard_generation_time = "06:00; 18:00"
            data_cleanup_time = "sunday,06:00"
            "#,
        );
        assert_eq!(config.app.aggregation_time, "0 15 2 * * *");
        assert_eq!(config.app.leaderboard_generation_time, "0 0 6 * * *;0 0 18 * * *");
        assert_eq!(config.app.data_cleanup_time, "0 0 6 * * Sun");
        config.validate().unwrap();
    }

    #[test]
    fn invalid_cron_fails_validation() {
        let config = load(
            r#"
            [app]
            aggregation_time = "at noon"
            "#,
        );
        assert!(config.validate().is_err());
    }
}
