//! SQLite persistence layer.
//!
//! One database file, one shared connection behind a mutex, typed store
//! managers per entity. Write authority follows component ownership:
//! ingest writes messages, the task engine writes tasks, the classifier
//! writes the confidence queue, and so on - the managers just make that
//! split visible in the API.

pub mod confidence;
pub mod conversation;
pub mod db;
pub mod error;
pub mod health;
pub mod messages;
pub mod settings;
pub mod summaries;
pub mod tasks;
pub mod types;

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

pub use error::{Result, StoreError};

/// Handle to the opened database. Cheap to clone; every manager shares the
/// same connection.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the database at `path` and apply pending migrations.
    pub fn open(path: &str) -> Result<Self> {
        if let Some(dir) = std::path::Path::new(path).parent() {
            std::fs::create_dir_all(dir).map_err(|e| StoreError::Open(e.to_string()))?;
        }
        let conn = Connection::open(path).map_err(StoreError::from)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        db::apply_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        db::apply_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn messages(&self) -> messages::MessageStore {
        messages::MessageStore::new(self.conn.clone())
    }

    pub fn tasks(&self) -> tasks::TaskStore {
        tasks::TaskStore::new(self.conn.clone())
    }

    pub fn confidence(&self) -> confidence::ConfidenceStore {
        confidence::ConfidenceStore::new(self.conn.clone())
    }

    pub fn settings(&self) -> settings::SettingsStore {
        settings::SettingsStore::new(self.conn.clone())
    }

    pub fn conversation(&self) -> conversation::ConversationStore {
        conversation::ConversationStore::new(self.conn.clone())
    }

    pub fn health(&self) -> health::HealthStore {
        health::HealthStore::new(self.conn.clone())
    }

    pub fn summaries(&self) -> summaries::SummaryStore {
        summaries::SummaryStore::new(self.conn.clone())
    }
}
