//! Owner↔assistant dialogue history: a rolling window compacted by age.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::error::Result;
use crate::messages::parse_ts;
use crate::types::{ConversationTurn, TurnRole};

#[derive(Clone)]
pub struct ConversationStore {
    conn: Arc<Mutex<Connection>>,
}

impl ConversationStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub fn append(&self, role: TurnRole, content: &str, tool_calls: Option<&str>) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO conversation_turns (role, content, tool_calls, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![role.to_string(), content, tool_calls, Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Last `limit` turns in chronological order.
    pub fn recent(&self, limit: usize) -> Result<Vec<ConversationTurn>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT id, role, content, tool_calls, created_at
             FROM conversation_turns
             ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit], row_to_turn)?;
        let mut turns: Vec<ConversationTurn> = rows.filter_map(|r| r.ok()).collect();
        turns.reverse();
        Ok(turns)
    }

    /// Drop turns older than the cutoff. Returns the number removed.
    pub fn compact_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "DELETE FROM conversation_turns WHERE created_at < ?1",
            [cutoff.to_rfc3339()],
        )?;
        Ok(n)
    }
}

fn row_to_turn(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationTurn> {
    let role_str: String = row.get(1)?;
    Ok(ConversationTurn {
        id: row.get(0)?,
        role: role_str.parse().unwrap_or(TurnRole::User),
        content: row.get(2)?,
        tool_calls: row.get(3)?,
        created_at: parse_ts(&row.get::<_, String>(4)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    #[test]
    fn recent_returns_chronological_window() {
        let store = Store::open_in_memory().unwrap();
        let conv = store.conversation();
        conv.append(TurnRole::User, "раз", None).unwrap();
        conv.append(TurnRole::Assistant, "два", None).unwrap();
        conv.append(TurnRole::User, "три", None).unwrap();

        let turns = conv.recent(2).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].content, "два");
        assert_eq!(turns[1].content, "три");
    }

    #[test]
    fn compact_removes_only_old_turns() {
        let store = Store::open_in_memory().unwrap();
        let conv = store.conversation();
        conv.append(TurnRole::User, "свежий", None).unwrap();
        let removed = conv
            .compact_older_than(Utc::now() - chrono::Duration::hours(24))
            .unwrap();
        assert_eq!(removed, 0);
        let removed = conv
            .compact_older_than(Utc::now() + chrono::Duration::seconds(1))
            .unwrap();
        assert_eq!(removed, 1);
        assert!(conv.recent(10).unwrap().is_empty());
    }
}
