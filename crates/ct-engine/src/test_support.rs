//! Fixtures shared by the engine's unit tests.

use chrono::{DateTime, TimeDelta, Utc};

use ct_core::{Heartbeat, User, UserId, day};
use ct_db::Database;

use crate::config::EngineConfig;
use crate::engine::Engine;

pub fn utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

pub struct TestEnv {
    pub engine: Engine,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(EngineConfig {
            aggregation_workers: 2,
            ..EngineConfig::default()
        })
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            engine: Engine::new(Database::open_in_memory().unwrap(), config),
        }
    }

    pub fn user(&self, id: &str, tz: &str) -> User {
        let mut user = User::new(UserId::new(id).unwrap(), utc("2024-01-01T00:00:00Z"));
        user.time_zone = day::parse_tz(tz).unwrap();
        self.engine.create_user(&user).unwrap();
        user
    }

    /// Stores one heartbeat per `(time, project)` pair.
    pub fn beats(&self, user: &User, beats: &[(&str, &str)]) {
        let heartbeats: Vec<Heartbeat> = beats
            .iter()
            .map(|(time, project)| heartbeat(user, utc(time), project))
            .collect();
        self.engine.db().insert_heartbeats(&heartbeats).unwrap();
    }

    /// Heartbeats every 30 seconds for `minutes`, adding up to exactly that
    /// much time.
    pub fn session(&self, user: &User, start: &str, minutes: i64, project: &str) {
        let start = utc(start);
        let heartbeats: Vec<Heartbeat> = (0..=minutes * 2)
            .map(|i| heartbeat(user, start + TimeDelta::seconds(i * 30), project))
            .collect();
        self.engine.db().insert_heartbeats(&heartbeats).unwrap();
    }
}

fn heartbeat(user: &User, time: DateTime<Utc>, project: &str) -> Heartbeat {
    let mut heartbeat = Heartbeat::new(user.id.clone(), time, format!("{project}/main.rs"));
    heartbeat.project = project.to_string();
    heartbeat.language = "Rust".to_string();
    heartbeat.editor = "Neovim".to_string();
    heartbeat.operating_system = "Linux".to_string();
    heartbeat.rehash();
    heartbeat
}
