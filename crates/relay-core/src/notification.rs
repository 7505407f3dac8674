use crate::error::Result;
use crate::store::ActionStore;
use crate::types::EntityRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// Human-facing audit row mirroring an action request's lifecycle. Created
/// in the same transaction as the request, updated when it resolves, never
/// deleted. This is what a client re-reads when it missed the live event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub correlation_id: String,
    pub category: String,
    pub title: String,
    pub message: String,
    pub requires_action: bool,
    pub status: String,
    pub entity_type: String,
    pub entity_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ActionStore {
    /// Notification history for one entity, newest first.
    pub fn notifications_for_entity(&self, entity: &EntityRef) -> Result<Vec<Notification>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, correlation_id, category, title, message, requires_action,
                    status, entity_type, entity_id, created_at, updated_at
               FROM notifications
              WHERE entity_type = ?1 AND entity_id = ?2
              ORDER BY id DESC",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![entity.entity_type, entity.entity_id],
            map_notification,
        )?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn notification_by_correlation(&self, correlation_id: &str) -> Result<Option<Notification>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, correlation_id, category, title, message, requires_action,
                    status, entity_type, entity_id, created_at, updated_at
               FROM notifications
              WHERE correlation_id = ?1",
        )?;
        let mut rows = stmt.query_map([correlation_id], map_notification)?;
        rows.next().transpose().map_err(Into::into)
    }
}

fn map_notification(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notification> {
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;
    Ok(Notification {
        id: row.get(0)?,
        correlation_id: row.get(1)?,
        category: row.get(2)?,
        title: row.get(3)?,
        message: row.get(4)?,
        requires_action: row.get::<_, i64>(5)? != 0,
        status: row.get(6)?,
        entity_type: row.get(7)?,
        entity_id: row.get(8)?,
        created_at: parse(&created_at, 9)?,
        updated_at: parse(&updated_at, 10)?,
    })
}

fn parse(s: &str, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
