//! Heartbeat ingestion from stdin.

use std::io::{Read, Write};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Deserialize;

use ct_core::HeartbeatPayload;
use ct_engine::{Engine, IngestSource};

use super::util::{load_user, write_json};

/// Plugins send either a single heartbeat or a bulk array.
#[derive(Deserialize)]
#[serde(untagged)]
enum Batch {
    Many(Vec<HeartbeatPayload>),
    One(Box<HeartbeatPayload>),
}

pub fn run<R: Read, W: Write>(
    reader: R,
    writer: &mut W,
    engine: &Engine,
    user: &str,
    user_agent: Option<&str>,
    machine: Option<&str>,
) -> Result<()> {
    let user = load_user(engine, user)?;
    let batch: Batch = serde_json::from_reader(reader).context("failed to parse heartbeats")?;
    let payloads = match batch {
        Batch::Many(payloads) => payloads,
        Batch::One(payload) => vec![*payload],
    };

    let source = IngestSource {
        user_agent,
        machine_name: machine,
        origin: "cli",
    };
    let report = engine.ingest().ingest(&user, &payloads, source, Utc::now())?;
    tracing::info!(
        user = %user.id,
        inserted = report.inserted(),
        skipped = report.skipped(),
        rejected = report.rejected(),
        "ingested heartbeats"
    );
    write_json(writer, &report)
}

#[cfg(test)]
mod tests {
    use ct_core::{User, UserId};
    use ct_db::Database;
    use ct_engine::EngineConfig;

    use super::*;

    fn engine() -> Engine {
        let engine = Engine::new(Database::open_in_memory().unwrap(), EngineConfig::default());
        engine
            .create_user(&User::new(UserId::new("alice").unwrap(), Utc::now()))
            .unwrap();
        engine
    }

    fn ingest(engine: &Engine, input: &str) -> serde_json::Value {
        let mut output = Vec::new();
        let user_agent = Some("wakatime/1.0 (linux) vscode/1.80");
        run(input.as_bytes(), &mut output, engine, "alice", user_agent, None).unwrap();
        serde_json::from_slice(&output).unwrap()
    }

    #[test]
    fn accepts_arrays_and_single_objects() {
        let engine = engine();
        let now = Utc::now().timestamp();
        let batch = format!(
            r#"[{{"entity": "/src/main.rs", "type": "file", "project": "ct", "time": {now}}},
                {{"entity": "/src/lib.rs", "type": "file", "project": "ct", "time": {}}}]"#,
            now - 60
        );
        let report = ingest(&engine, &batch);
        assert_eq!(report["responses"].as_array().unwrap().len(), 2);
        assert_eq!(engine.db().count_heartbeats(None).unwrap(), 2);

        let single = format!(
            r#"{{"entity": "/src/cli.rs", "type": "file", "time": {}}}"#,
            now - 120
        );
        ingest(&engine, &single);
        assert_eq!(engine.db().count_heartbeats(None).unwrap(), 3);
    }

    #[test]
    fn invalid_items_do_not_fail_the_batch() {
        let engine = engine();
        let now = Utc::now().timestamp();
        let batch = format!(
            r#"[{{"entity": "", "type": "file", "time": {now}}},
                {{"entity": "/src/main.rs", "type": "file", "time": {now}}}]"#
        );
        ingest(&engine, &batch);
        assert_eq!(engine.db().count_heartbeats(None).unwrap(), 1);
    }

    #[test]
    fn malformed_input_is_an_error() {
        let engine = engine();
        let mut output = Vec::new();
        assert!(run("not json".as_bytes(), &mut output, &engine, "alice", None, None).is_err());
    }
}
