//! Module heartbeats, upserted by each component and read by the watchdog.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::Connection;

use crate::error::Result;
use crate::messages::parse_ts;
use crate::types::HealthRow;

#[derive(Clone)]
pub struct HealthStore {
    conn: Arc<Mutex<Connection>>,
}

impl HealthStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub fn heartbeat(&self, module: &str, status: &str, error: Option<&str>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO health_checks (module, status, error, timestamp)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(module) DO UPDATE SET status = ?2, error = ?3, timestamp = ?4",
            rusqlite::params![module, status, error, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn all(&self) -> Result<Vec<HealthRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT module, status, error, timestamp FROM health_checks ORDER BY module",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(HealthRow {
                module: row.get(0)?,
                status: row.get(1)?,
                error: row.get(2)?,
                timestamp: parse_ts(&row.get::<_, String>(3)?),
            })
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    #[test]
    fn heartbeat_upserts_per_module() {
        let store = Store::open_in_memory().unwrap();
        let health = store.health();
        health.heartbeat("ingest", "ok", None).unwrap();
        health.heartbeat("ingest", "error", Some("session expired")).unwrap();
        health.heartbeat("scheduler", "ok", None).unwrap();

        let rows = health.all().unwrap();
        assert_eq!(rows.len(), 2);
        let ingest = rows.iter().find(|r| r.module == "ingest").unwrap();
        assert_eq!(ingest.status, "error");
        assert_eq!(ingest.error.as_deref(), Some("session expired"));
    }
}
