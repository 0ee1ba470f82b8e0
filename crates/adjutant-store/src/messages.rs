//! Message capture and retrieval, including full-text search.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::debug;

use crate::error::Result;
use crate::types::{DmSummaryRow, KnownChat, StoredMessage, StoreStats};

#[derive(Clone)]
pub struct MessageStore {
    conn: Arc<Mutex<Connection>>,
}

/// Fields for inserting one captured message.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub upstream_msg_id: i64,
    pub chat_id: i64,
    pub chat_title: String,
    pub sender_id: i64,
    pub sender_name: String,
    pub text: String,
    pub media_kind: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub account: String,
}

impl MessageStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Persist a message. Returns `None` on a `(upstream_msg_id, chat_id)`
    /// duplicate - the idempotence mechanism for replayed streams.
    pub fn save(&self, msg: &NewMessage) -> Result<Option<i64>> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT INTO messages
             (upstream_msg_id, chat_id, chat_title, sender_id, sender_name,
              text, media_kind, timestamp, account)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(upstream_msg_id, chat_id) DO NOTHING",
            rusqlite::params![
                msg.upstream_msg_id,
                msg.chat_id,
                msg.chat_title,
                msg.sender_id,
                msg.sender_name,
                msg.text,
                msg.media_kind,
                msg.timestamp.to_rfc3339(),
                msg.account,
            ],
        )?;
        if inserted == 0 {
            return Ok(None);
        }
        let id = conn.last_insert_rowid();
        // Keep the FTS index in sync (external-content table, manual sync).
        conn.execute(
            "INSERT INTO messages_fts(rowid, text) VALUES (?1, ?2)",
            rusqlite::params![id, msg.text],
        )?;
        Ok(Some(id))
    }

    pub fn get(&self, id: i64) -> Result<Option<StoredMessage>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT id, upstream_msg_id, chat_id, chat_title, sender_id, sender_name,
                    text, media_kind, timestamp, account, processed
             FROM messages WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map([id], row_to_message)?;
        Ok(rows.next().transpose()?)
    }

    pub fn mark_processed(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("UPDATE messages SET processed = 1 WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Last `limit` messages in a chat, newest first.
    pub fn recent_in_chat(&self, chat_id: i64, limit: usize) -> Result<Vec<StoredMessage>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT id, upstream_msg_id, chat_id, chat_title, sender_id, sender_name,
                    text, media_kind, timestamp, account, processed
             FROM messages WHERE chat_id = ?1
             ORDER BY timestamp DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![chat_id, limit], row_to_message)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Messages in a chat no older than `days` days, newest first, capped.
    pub fn recent_in_chat_window(
        &self,
        chat_id: i64,
        days: i64,
        limit: usize,
    ) -> Result<Vec<StoredMessage>> {
        let since = (Utc::now() - chrono::Duration::days(days)).to_rfc3339();
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT id, upstream_msg_id, chat_id, chat_title, sender_id, sender_name,
                    text, media_kind, timestamp, account, processed
             FROM messages WHERE chat_id = ?1 AND timestamp >= ?2
             ORDER BY timestamp DESC LIMIT ?3",
        )?;
        let rows = stmt.query_map(rusqlite::params![chat_id, since, limit], row_to_message)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Full-text search with substring fallback.
    ///
    /// Tokens shorter than three characters are dropped before building the
    /// FTS query; when nothing usable remains, or the FTS query matches
    /// nothing (stemming misses, index gaps), a plain LIKE scan runs instead.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<StoredMessage>> {
        let tokens: Vec<&str> = query
            .split_whitespace()
            .filter(|w| w.chars().count() > 2)
            .collect();

        if !tokens.is_empty() {
            // Quote each token so punctuation can't break the FTS syntax.
            let fts_query = tokens
                .iter()
                .map(|t| format!("\"{}\"", t.replace('"', "")))
                .collect::<Vec<_>>()
                .join(" ");
            match self.search_fts(&fts_query, limit) {
                Ok(hits) if !hits.is_empty() => return Ok(hits),
                Ok(_) => debug!(%query, "FTS matched nothing — falling back to substring"),
                Err(e) => debug!(%query, error = %e, "FTS query failed — falling back to substring"),
            }
        }
        self.search_like(query, limit)
    }

    fn search_fts(&self, fts_query: &str, limit: usize) -> Result<Vec<StoredMessage>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT m.id, m.upstream_msg_id, m.chat_id, m.chat_title, m.sender_id,
                    m.sender_name, m.text, m.media_kind, m.timestamp, m.account, m.processed
             FROM messages m
             JOIN messages_fts f ON m.id = f.rowid
             WHERE messages_fts MATCH ?1
             ORDER BY rank, m.timestamp DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![fts_query, limit], row_to_message)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    fn search_like(&self, query: &str, limit: usize) -> Result<Vec<StoredMessage>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT id, upstream_msg_id, chat_id, chat_title, sender_id, sender_name,
                    text, media_kind, timestamp, account, processed
             FROM messages WHERE text LIKE '%' || ?1 || '%'
             ORDER BY timestamp DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![query, limit], row_to_message)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Search by sender display name (substring match).
    pub fn search_by_sender(&self, sender_name: &str, limit: usize) -> Result<Vec<StoredMessage>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT id, upstream_msg_id, chat_id, chat_title, sender_id, sender_name,
                    text, media_kind, timestamp, account, processed
             FROM messages WHERE sender_name LIKE '%' || ?1 || '%'
             ORDER BY timestamp DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![sender_name, limit], row_to_message)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Messages since an instant, optionally restricted to specific chats.
    pub fn since(
        &self,
        since: DateTime<Utc>,
        chat_ids: Option<&[i64]>,
        limit: usize,
    ) -> Result<Vec<StoredMessage>> {
        let conn = self.conn.lock().unwrap();
        let since_str = since.to_rfc3339();
        match chat_ids {
            Some(ids) if !ids.is_empty() => {
                // rusqlite has no array binding; the id list is numeric and
                // internally produced, so inline it.
                let id_list = ids
                    .iter()
                    .map(|i| i.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                let sql = format!(
                    "SELECT id, upstream_msg_id, chat_id, chat_title, sender_id, sender_name,
                            text, media_kind, timestamp, account, processed
                     FROM messages
                     WHERE timestamp >= ?1 AND chat_id IN ({id_list})
                     ORDER BY chat_id, timestamp LIMIT ?2"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(rusqlite::params![since_str, limit], row_to_message)?;
                Ok(rows.filter_map(|r| r.ok()).collect())
            }
            _ => {
                let mut stmt = conn.prepare_cached(
                    "SELECT id, upstream_msg_id, chat_id, chat_title, sender_id, sender_name,
                            text, media_kind, timestamp, account, processed
                     FROM messages WHERE timestamp >= ?1
                     ORDER BY timestamp DESC LIMIT ?2",
                )?;
                let rows = stmt.query_map(rusqlite::params![since_str, limit], row_to_message)?;
                Ok(rows.filter_map(|r| r.ok()).collect())
            }
        }
    }

    /// Private-message roll-up since an instant, grouped by sender.
    /// Excludes the owner and any blacklisted senders. DMs are recognised by
    /// `chat_id = sender_id`.
    pub fn dm_summary(
        &self,
        since: DateTime<Utc>,
        owner_id: i64,
        blacklist: &[i64],
        limit: usize,
    ) -> Result<Vec<DmSummaryRow>> {
        let conn = self.conn.lock().unwrap();
        let bl_list = if blacklist.is_empty() {
            "0".to_string()
        } else {
            blacklist
                .iter()
                .map(|i| i.to_string())
                .collect::<Vec<_>>()
                .join(",")
        };
        let sql = format!(
            "SELECT sender_name, COUNT(*) AS msg_count,
                    GROUP_CONCAT(SUBSTR(text, 1, 100), ' | ') AS previews
             FROM messages
             WHERE timestamp >= ?1
               AND sender_id != ?2
               AND sender_id NOT IN ({bl_list})
               AND chat_id = sender_id
             GROUP BY sender_name
             ORDER BY msg_count DESC
             LIMIT ?3"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params![since.to_rfc3339(), owner_id, limit],
            |row| {
                Ok(DmSummaryRow {
                    sender_name: row.get(0)?,
                    msg_count: row.get(1)?,
                    previews: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                })
            },
        )?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Distinct non-private chats seen in the store, busiest first.
    pub fn known_chats(&self, limit: usize) -> Result<Vec<KnownChat>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT chat_id, MAX(chat_title), COUNT(*) AS msg_count
             FROM messages
             WHERE chat_id != sender_id
             GROUP BY chat_id
             ORDER BY msg_count DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit], |row| {
            Ok(KnownChat {
                chat_id: row.get(0)?,
                chat_title: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                msg_count: row.get(2)?,
            })
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn count_since(&self, since: DateTime<Utc>) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE timestamp >= ?1",
            [since.to_rfc3339()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock().unwrap();
        let messages = conn.query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))?;
        let active_tasks = conn.query_row(
            "SELECT COUNT(*) FROM tasks WHERE status = 'active'",
            [],
            |r| r.get(0),
        )?;
        Ok(StoreStats {
            messages,
            active_tasks,
        })
    }

    /// Register an upstream contact. Returns true when the contact was new.
    pub fn record_contact(&self, upstream_id: i64, name: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT INTO contacts (upstream_id, name, created_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(upstream_id) DO NOTHING",
            rusqlite::params![upstream_id, name, Utc::now().to_rfc3339()],
        )?;
        Ok(inserted > 0)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredMessage> {
    let ts: String = row.get(8)?;
    Ok(StoredMessage {
        id: row.get(0)?,
        upstream_msg_id: row.get(1)?,
        chat_id: row.get(2)?,
        chat_title: row.get(3)?,
        sender_id: row.get(4)?,
        sender_name: row.get(5)?,
        text: row.get(6)?,
        media_kind: row.get(7)?,
        timestamp: parse_ts(&ts),
        account: row.get(9)?,
        processed: row.get::<_, i64>(10)? != 0,
    })
}

pub(crate) fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    fn msg(upstream_id: i64, chat_id: i64, sender_id: i64, text: &str) -> NewMessage {
        NewMessage {
            upstream_msg_id: upstream_id,
            chat_id,
            chat_title: "chat".into(),
            sender_id,
            sender_name: "Иван Козлов".into(),
            text: text.into(),
            media_kind: None,
            timestamp: Utc::now(),
            account: "primary".into(),
        }
    }

    #[test]
    fn duplicate_save_is_dropped() {
        let store = Store::open_in_memory().unwrap();
        let messages = store.messages();
        let first = messages.save(&msg(1, 10, 5, "оплати счёт")).unwrap();
        assert!(first.is_some());
        let second = messages.save(&msg(1, 10, 5, "оплати счёт")).unwrap();
        assert!(second.is_none());
        assert_eq!(messages.stats().unwrap().messages, 1);
    }

    #[test]
    fn same_upstream_id_in_other_chat_is_distinct() {
        let store = Store::open_in_memory().unwrap();
        let messages = store.messages();
        assert!(messages.save(&msg(1, 10, 5, "a")).unwrap().is_some());
        assert!(messages.save(&msg(1, 11, 5, "b")).unwrap().is_some());
    }

    #[test]
    fn fts_finds_exact_word() {
        let store = Store::open_in_memory().unwrap();
        let messages = store.messages();
        messages.save(&msg(1, 10, 5, "нужно оплатить счёт 12345")).unwrap();
        messages.save(&msg(2, 10, 5, "про погоду")).unwrap();
        let hits = messages.search("оплатить", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].text.contains("12345"));
    }

    #[test]
    fn short_query_falls_back_to_substring() {
        let store = Store::open_in_memory().unwrap();
        let messages = store.messages();
        messages.save(&msg(1, 10, 5, "встреча в 11")).unwrap();
        // "11" is below the token threshold - substring path must still find it.
        let hits = messages.search("11", 10).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn dm_summary_excludes_owner_and_blacklist() {
        let store = Store::open_in_memory().unwrap();
        let messages = store.messages();
        let since = Utc::now() - chrono::Duration::hours(1);
        // DM: chat_id == sender_id.
        messages.save(&msg(1, 5, 5, "от контакта")).unwrap();
        messages.save(&msg(2, 42, 42, "от владельца")).unwrap();
        messages.save(&msg(3, 66, 66, "от заблокированного")).unwrap();
        let rows = messages.dm_summary(since, 42, &[66], 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].msg_count, 1);
    }

    #[test]
    fn record_contact_reports_first_sighting_only() {
        let store = Store::open_in_memory().unwrap();
        let messages = store.messages();
        assert!(messages.record_contact(7, "Пётр").unwrap());
        assert!(!messages.record_contact(7, "Пётр").unwrap());
    }

    #[test]
    fn processed_flag_round_trips() {
        let store = Store::open_in_memory().unwrap();
        let messages = store.messages();
        let id = messages.save(&msg(1, 10, 5, "текст сообщения")).unwrap().unwrap();
        messages.mark_processed(id).unwrap();
        let recent = messages.recent_in_chat(10, 5).unwrap();
        assert!(recent[0].processed);
    }
}
