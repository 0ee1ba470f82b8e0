//! Schema migrations. Applied in numeric order on every startup; each applied
//! version is recorded in `schema_version` so re-runs are no-ops.

use chrono::Utc;
use rusqlite::Connection;
use tracing::info;

use crate::error::{Result, StoreError};

const MIGRATIONS: &[(i64, &str, &str)] = &[
    (1, "001_initial.sql", MIGRATION_001),
    (2, "002_messages_fts.sql", MIGRATION_002),
    (3, "003_task_tracking.sql", MIGRATION_003),
];

const MIGRATION_001: &str = "
    CREATE TABLE IF NOT EXISTS messages (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        upstream_msg_id INTEGER NOT NULL,
        chat_id         INTEGER NOT NULL,
        chat_title      TEXT    NOT NULL DEFAULT '',
        sender_id       INTEGER NOT NULL DEFAULT 0,
        sender_name     TEXT    NOT NULL DEFAULT '',
        text            TEXT    NOT NULL,
        media_kind      TEXT,
        timestamp       TEXT    NOT NULL,
        account         TEXT    NOT NULL DEFAULT '',
        processed       INTEGER NOT NULL DEFAULT 0,
        UNIQUE(upstream_msg_id, chat_id)
    );
    CREATE INDEX IF NOT EXISTS idx_messages_chat_ts ON messages(chat_id, timestamp);
    CREATE INDEX IF NOT EXISTS idx_messages_ts ON messages(timestamp);

    CREATE TABLE IF NOT EXISTS tasks (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        type           TEXT    NOT NULL,
        description    TEXT    NOT NULL,
        who            TEXT,
        deadline       TEXT,
        remind_at      TEXT,
        remind_at_sent TEXT,
        recurrence     TEXT,
        confidence     INTEGER NOT NULL DEFAULT 100,
        source         TEXT    NOT NULL DEFAULT '',
        source_msg_id  INTEGER,
        chat_id        INTEGER,
        sender_id      INTEGER,
        sender_name    TEXT,
        account        TEXT,
        status         TEXT    NOT NULL DEFAULT 'active',
        created_at     TEXT    NOT NULL,
        completed_at   TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);

    CREATE TABLE IF NOT EXISTS settings (
        key        TEXT PRIMARY KEY,
        value      TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS contacts (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        upstream_id INTEGER NOT NULL UNIQUE,
        name        TEXT    NOT NULL,
        created_at  TEXT    NOT NULL
    );

    CREATE TABLE IF NOT EXISTS health_checks (
        module    TEXT PRIMARY KEY,
        status    TEXT NOT NULL,
        error     TEXT,
        timestamp TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS confidence_queue (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        message_id     INTEGER NOT NULL,
        chat_id        INTEGER NOT NULL,
        sender_name    TEXT    NOT NULL,
        text_preview   TEXT    NOT NULL,
        predicted_type TEXT    NOT NULL,
        confidence     INTEGER NOT NULL,
        is_urgent      INTEGER NOT NULL DEFAULT 0,
        resolved       INTEGER NOT NULL DEFAULT 0,
        created_at     TEXT    NOT NULL
    );

    CREATE TABLE IF NOT EXISTS classification_feedback (
        id                   INTEGER PRIMARY KEY AUTOINCREMENT,
        message_id           INTEGER NOT NULL,
        predicted_type       TEXT    NOT NULL,
        actual_type          TEXT    NOT NULL,
        predicted_confidence INTEGER NOT NULL DEFAULT 0,
        user_reason          TEXT,
        created_at           TEXT    NOT NULL
    );

    CREATE TABLE IF NOT EXISTS conversation_turns (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        role       TEXT NOT NULL,
        content    TEXT NOT NULL,
        tool_calls TEXT,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_turns_created ON conversation_turns(created_at);

    CREATE TABLE IF NOT EXISTS daily_summaries (
        date    TEXT PRIMARY KEY,
        summary TEXT NOT NULL,
        stats   TEXT
    );
";

const MIGRATION_002: &str = "
    CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts
        USING fts5(text, content='messages', content_rowid='id');
";

const MIGRATION_003: &str = "
    ALTER TABLE tasks ADD COLUMN track_completion INTEGER NOT NULL DEFAULT 0;
    ALTER TABLE tasks ADD COLUMN last_checked_at TEXT;
    ALTER TABLE tasks ADD COLUMN check_interval_days INTEGER NOT NULL DEFAULT 3;

    CREATE TABLE IF NOT EXISTS deadline_notifications (
        task_id INTEGER NOT NULL,
        date    TEXT    NOT NULL,
        count   INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (task_id, date)
    );
";

/// Apply every migration newer than the recorded schema version.
pub fn apply_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL,
            filename   TEXT NOT NULL
        );",
    )?;

    let current: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    let mut applied = 0;
    for &(version, filename, sql) in MIGRATIONS {
        if version <= current {
            continue;
        }
        conn.execute_batch(sql)
            .map_err(|source| StoreError::Migration { version, source })?;
        conn.execute(
            "INSERT INTO schema_version (version, applied_at, filename) VALUES (?1, ?2, ?3)",
            rusqlite::params![version, Utc::now().to_rfc3339(), filename],
        )?;
        applied += 1;
        info!(%filename, "migration applied");
    }

    if applied == 0 {
        info!(version = current, "schema up to date");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_apply_cleanly() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, MIGRATIONS.last().unwrap().0);
    }

    #[test]
    fn reapplying_is_a_noop() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        apply_migrations(&conn).unwrap();
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows as usize, MIGRATIONS.len());
    }

    #[test]
    fn versions_are_strictly_increasing() {
        let mut prev = 0;
        for &(version, _, _) in MIGRATIONS {
            assert!(version > prev, "migration versions must increase");
            prev = version;
        }
    }
}
