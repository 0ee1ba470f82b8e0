//! MEDIUM-band review queue and the classification feedback log.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::Connection;

use crate::error::Result;
use crate::messages::parse_ts;
use crate::types::ConfidenceItem;

#[derive(Clone)]
pub struct ConfidenceStore {
    conn: Arc<Mutex<Connection>>,
}

impl ConfidenceStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub fn enqueue(
        &self,
        message_id: i64,
        chat_id: i64,
        sender_name: &str,
        text_preview: &str,
        predicted_type: &str,
        confidence: i64,
        is_urgent: bool,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO confidence_queue
             (message_id, chat_id, sender_name, text_preview, predicted_type,
              confidence, is_urgent, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                message_id,
                chat_id,
                sender_name,
                text_preview,
                predicted_type,
                confidence,
                is_urgent as i64,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Unresolved non-urgent items, oldest first (the daily batch).
    pub fn pending(&self, limit: usize) -> Result<Vec<ConfidenceItem>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT id, message_id, chat_id, sender_name, text_preview,
                    predicted_type, confidence, is_urgent, resolved, created_at
             FROM confidence_queue
             WHERE resolved = 0 AND is_urgent = 0
             ORDER BY created_at ASC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit], row_to_item)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn get(&self, id: i64) -> Result<Option<ConfidenceItem>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT id, message_id, chat_id, sender_name, text_preview,
                    predicted_type, confidence, is_urgent, resolved, created_at
             FROM confidence_queue WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map([id], row_to_item)?;
        Ok(rows.next().transpose()?)
    }

    /// Resolve an item and log feedback. Returns the item if this call had
    /// effect, `None` if it was already resolved (resolution is one-shot).
    pub fn resolve(&self, id: i64, actual_type: &str) -> Result<Option<ConfidenceItem>> {
        let item = match self.get(id)? {
            Some(item) if !item.resolved => item,
            _ => return Ok(None),
        };
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE confidence_queue SET resolved = 1 WHERE id = ?1 AND resolved = 0",
            [id],
        )?;
        conn.execute(
            "INSERT INTO classification_feedback
             (message_id, predicted_type, actual_type, predicted_confidence, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                item.message_id,
                item.predicted_type,
                actual_type,
                item.confidence,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(Some(item))
    }

    /// Demote an urgent item into the quiet queue so the evening batch picks
    /// it up (the owner pressed "later").
    pub fn mark_not_urgent(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE confidence_queue SET is_urgent = 0 WHERE id = ?1",
            [id],
        )?;
        Ok(())
    }

    /// Mark an item resolved without logging feedback - used when a deferred
    /// prompt is suppressed because the thread resolved itself.
    pub fn mark_resolved_silent(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE confidence_queue SET resolved = 1 WHERE id = ?1 AND resolved = 0",
            [id],
        )?;
        Ok(n > 0)
    }

    /// Append-only feedback record for bands that bypass the queue
    /// (HIGH auto-task buttons, LOW upgrades).
    pub fn record_feedback(
        &self,
        message_id: i64,
        predicted_type: &str,
        actual_type: &str,
        predicted_confidence: i64,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO classification_feedback
             (message_id, predicted_type, actual_type, predicted_confidence, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                message_id,
                predicted_type,
                actual_type,
                predicted_confidence,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Attach the owner's free-text "why" to an existing feedback row.
    pub fn set_feedback_reason(&self, feedback_id: i64, reason: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE classification_feedback SET user_reason = ?1 WHERE id = ?2",
            rusqlite::params![reason, feedback_id],
        )?;
        Ok(())
    }

    pub fn feedback_count(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let n = conn.query_row("SELECT COUNT(*) FROM classification_feedback", [], |r| {
            r.get(0)
        })?;
        Ok(n)
    }
}

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConfidenceItem> {
    Ok(ConfidenceItem {
        id: row.get(0)?,
        message_id: row.get(1)?,
        chat_id: row.get(2)?,
        sender_name: row.get(3)?,
        text_preview: row.get(4)?,
        predicted_type: row.get(5)?,
        confidence: row.get(6)?,
        is_urgent: row.get::<_, i64>(7)? != 0,
        resolved: row.get::<_, i64>(8)? != 0,
        created_at: parse_ts(&row.get::<_, String>(9)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    #[test]
    fn resolve_is_one_shot() {
        let store = Store::open_in_memory().unwrap();
        let queue = store.confidence();
        let id = queue
            .enqueue(1, 10, "Козлов", "глянь договор", "task", 70, false)
            .unwrap();

        let first = queue.resolve(id, "task").unwrap();
        assert!(first.is_some());
        let second = queue.resolve(id, "info").unwrap();
        assert!(second.is_none(), "second resolve must be a no-op");
        assert_eq!(queue.feedback_count().unwrap(), 1);
    }

    #[test]
    fn pending_excludes_urgent_and_resolved() {
        let store = Store::open_in_memory().unwrap();
        let queue = store.confidence();
        queue.enqueue(1, 10, "a", "t1", "task", 60, false).unwrap();
        let urgent = queue.enqueue(2, 10, "b", "t2", "task", 65, true).unwrap();
        let resolved = queue.enqueue(3, 10, "c", "t3", "task", 70, false).unwrap();
        queue.resolve(resolved, "info").unwrap();

        let pending = queue.pending(10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_ne!(pending[0].id, urgent);
    }

    #[test]
    fn feedback_reason_is_attached() {
        let store = Store::open_in_memory().unwrap();
        let queue = store.confidence();
        let fid = queue.record_feedback(5, "task", "info", 92).unwrap();
        queue.set_feedback_reason(fid, "это было обсуждение").unwrap();
        assert_eq!(queue.feedback_count().unwrap(), 1);
    }
}
