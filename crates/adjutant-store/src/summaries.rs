//! Persisted daily digests, one row per local date.

use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use rusqlite::Connection;

use crate::error::Result;

#[derive(Clone)]
pub struct SummaryStore {
    conn: Arc<Mutex<Connection>>,
}

impl SummaryStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub fn save(&self, date: NaiveDate, summary: &str, stats: Option<&serde_json::Value>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO daily_summaries (date, summary, stats)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(date) DO UPDATE SET summary = ?2, stats = ?3",
            rusqlite::params![
                date.to_string(),
                summary,
                stats.map(|s| s.to_string()),
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, date: NaiveDate) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let summary = conn
            .query_row(
                "SELECT summary FROM daily_summaries WHERE date = ?1",
                [date.to_string()],
                |row| row.get(0),
            )
            .ok();
        Ok(summary)
    }
}
