//! Key/value settings: ai_mode, whitelist/blacklist, limits, owner preferences.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::Connection;

use crate::error::Result;

pub const KEY_AI_MODE: &str = "ai_mode";
pub const KEY_WHITELIST: &str = "whitelist";
pub const KEY_BLACKLIST: &str = "blacklist";
pub const KEY_URGENT_DAILY_LIMIT: &str = "confidence_daily_limit";
pub const KEY_PREF_ADDRESS: &str = "pref_address";
pub const KEY_PREF_STYLE: &str = "pref_style";
pub const KEY_PREF_EMOJI: &str = "pref_emoji";

#[derive(Clone)]
pub struct SettingsStore {
    conn: Arc<Mutex<Connection>>,
}

impl SettingsStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub fn get(&self, key: &str, default: &str) -> Result<String> {
        let conn = self.conn.lock().unwrap();
        let value: Option<String> = conn
            .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .ok();
        Ok(value.unwrap_or_else(|| default.to_string()))
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO settings (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            rusqlite::params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Chat ids opted in to monitoring.
    pub fn whitelist(&self) -> Result<Vec<i64>> {
        self.id_list(KEY_WHITELIST)
    }

    /// Chat and sender ids opted out entirely.
    pub fn blacklist(&self) -> Result<Vec<i64>> {
        self.id_list(KEY_BLACKLIST)
    }

    /// Add an id to a list setting. Keeps whitelist and blacklist disjoint by
    /// removing the id from the opposite list first. Returns false when the id
    /// was already present.
    pub fn list_add(&self, key: &str, id: i64) -> Result<bool> {
        let opposite = match key {
            KEY_WHITELIST => Some(KEY_BLACKLIST),
            KEY_BLACKLIST => Some(KEY_WHITELIST),
            _ => None,
        };
        if let Some(opp) = opposite {
            self.list_remove(opp, id)?;
        }
        let mut ids = self.id_list(key)?;
        if ids.contains(&id) {
            return Ok(false);
        }
        ids.push(id);
        self.set(key, &serde_json::to_string(&ids)?)?;
        Ok(true)
    }

    /// Remove an id from a list setting. Returns false when it was absent.
    pub fn list_remove(&self, key: &str, id: i64) -> Result<bool> {
        let mut ids = self.id_list(key)?;
        let before = ids.len();
        ids.retain(|&i| i != id);
        if ids.len() == before {
            return Ok(false);
        }
        self.set(key, &serde_json::to_string(&ids)?)?;
        Ok(true)
    }

    pub fn list_clear(&self, key: &str) -> Result<()> {
        self.set(key, "[]")
    }

    fn id_list(&self, key: &str) -> Result<Vec<i64>> {
        let raw = self.get(key, "[]")?;
        // A corrupted setting degrades to an empty list rather than an error.
        Ok(serde_json::from_str(&raw).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    #[test]
    fn get_returns_default_when_unset() {
        let store = Store::open_in_memory().unwrap();
        let settings = store.settings();
        assert_eq!(settings.get(KEY_AI_MODE, "api").unwrap(), "api");
        settings.set(KEY_AI_MODE, "cli").unwrap();
        assert_eq!(settings.get(KEY_AI_MODE, "api").unwrap(), "cli");
    }

    #[test]
    fn list_add_and_remove() {
        let store = Store::open_in_memory().unwrap();
        let settings = store.settings();
        assert!(settings.list_add(KEY_WHITELIST, -100123).unwrap());
        assert!(!settings.list_add(KEY_WHITELIST, -100123).unwrap());
        assert_eq!(settings.whitelist().unwrap(), vec![-100123]);
        assert!(settings.list_remove(KEY_WHITELIST, -100123).unwrap());
        assert!(!settings.list_remove(KEY_WHITELIST, -100123).unwrap());
    }

    #[test]
    fn whitelist_and_blacklist_stay_disjoint() {
        let store = Store::open_in_memory().unwrap();
        let settings = store.settings();
        settings.list_add(KEY_BLACKLIST, 55).unwrap();
        settings.list_add(KEY_WHITELIST, 55).unwrap();
        assert_eq!(settings.whitelist().unwrap(), vec![55]);
        assert!(settings.blacklist().unwrap().is_empty());
    }

    #[test]
    fn corrupt_list_degrades_to_empty() {
        let store = Store::open_in_memory().unwrap();
        let settings = store.settings();
        settings.set(KEY_WHITELIST, "not json").unwrap();
        assert!(settings.whitelist().unwrap().is_empty());
    }
}
