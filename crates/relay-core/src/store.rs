use crate::error::{RelayError, Result};
use crate::types::{ActionRequest, ActionStatus, ActionType, EntityRef, Outcome};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// The partial unique index is the idempotency guard: at most one PENDING
/// row per (entity_type, entity_id, action_type). Acquisition is a single
/// INSERT, never read-then-write, so two racing triggers get exactly one
/// winner from sqlite itself.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS action_requests (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    correlation_id  TEXT NOT NULL UNIQUE,
    action_type     TEXT NOT NULL,
    entity_type     TEXT NOT NULL,
    entity_id       TEXT NOT NULL,
    payload         TEXT NOT NULL,
    status          TEXT NOT NULL,
    result          TEXT,
    error           TEXT,
    created_at      TEXT NOT NULL,
    resolved_at     TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_one_pending_per_key
    ON action_requests (entity_type, entity_id, action_type)
    WHERE status = 'PENDING';

CREATE TABLE IF NOT EXISTS notifications (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    correlation_id  TEXT NOT NULL,
    category        TEXT NOT NULL,
    title           TEXT NOT NULL,
    message         TEXT NOT NULL,
    requires_action INTEGER NOT NULL DEFAULT 0,
    status          TEXT NOT NULL,
    entity_type     TEXT NOT NULL,
    entity_id       TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_notifications_entity
    ON notifications (entity_type, entity_id);
";

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Outcome of applying a worker callback. Callbacks are at-least-once and
/// possibly duplicated; a second callback for an already-terminal request
/// is a `Duplicate`, not an error.
#[derive(Debug, Clone)]
pub enum Resolution {
    Applied(ActionRequest),
    Duplicate(ActionRequest),
}

// ---------------------------------------------------------------------------
// ActionStore
// ---------------------------------------------------------------------------

/// Durable store of action records and their notification companions.
///
/// Cloneable handle over a single sqlite connection. All methods are
/// synchronous; async callers hop over via `tokio::task::spawn_blocking`.
#[derive(Clone)]
pub struct ActionStore {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl ActionStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Atomically acquire the idempotency key and create the PENDING record,
    /// together with its notification row, in one transaction.
    ///
    /// On conflict, returns the existing pending request's metadata so the
    /// caller can render "already in progress" with its age.
    pub fn try_acquire(
        &self,
        entity: &EntityRef,
        action_type: ActionType,
        correlation_id: &str,
        payload: &serde_json::Value,
    ) -> Result<ActionRequest> {
        if entity.entity_type.trim().is_empty() {
            return Err(RelayError::EmptyField("entityType"));
        }
        if entity.entity_id.trim().is_empty() {
            return Err(RelayError::EmptyField("entityId"));
        }
        if correlation_id.trim().is_empty() {
            return Err(RelayError::EmptyField("correlationId"));
        }

        let now = Utc::now().to_rfc3339();
        let payload_json = serde_json::to_string(payload)?;

        let mut conn = self.conn.lock().expect("store lock poisoned");
        let tx = conn.transaction()?;

        let inserted = tx.execute(
            "INSERT INTO action_requests
                 (correlation_id, action_type, entity_type, entity_id, payload, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'PENDING', ?6)",
            rusqlite::params![
                correlation_id,
                action_type.as_str(),
                entity.entity_type,
                entity.entity_id,
                payload_json,
                now,
            ],
        );

        if let Err(e) = inserted {
            drop(tx);
            if is_constraint_violation(&e) {
                // The partial index fired: surface the pending winner.
                if let Some(existing) = Self::query_pending_by_key(&conn, entity, action_type)? {
                    return Err(RelayError::ConflictInProgress {
                        existing: Box::new(existing),
                    });
                }
            }
            return Err(e.into());
        }

        tx.execute(
            "INSERT INTO notifications
                 (correlation_id, category, title, message, requires_action, status,
                  entity_type, entity_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 0, 'PENDING', ?5, ?6, ?7, ?7)",
            rusqlite::params![
                correlation_id,
                action_type.as_str(),
                format!("{} · {}", action_type, entity),
                "Action dispatched, waiting for worker confirmation",
                entity.entity_type,
                entity.entity_id,
                now,
            ],
        )?;

        tx.commit()?;

        Self::query_by_correlation(&conn, correlation_id)?
            .ok_or_else(|| RelayError::UnknownCorrelation(correlation_id.to_string()))
    }

    /// Apply a worker callback. First valid callback transitions the record
    /// to SUCCEEDED/FAILED and stamps `resolved_at`; later callbacks for the
    /// same correlation id are duplicates and leave the store untouched.
    ///
    /// This is the only path that releases the idempotency key for reuse.
    pub fn resolve(
        &self,
        correlation_id: &str,
        outcome: Outcome,
        result_payload: Option<&serde_json::Value>,
    ) -> Result<Resolution> {
        let mut conn = self.conn.lock().expect("store lock poisoned");
        let tx = conn.transaction()?;

        let current = Self::query_by_correlation(&tx, correlation_id)?
            .ok_or_else(|| RelayError::UnknownCorrelation(correlation_id.to_string()))?;

        if current.status.is_terminal() {
            tx.commit()?;
            return Ok(Resolution::Duplicate(current));
        }

        let status = match outcome {
            Outcome::Success => ActionStatus::Succeeded,
            Outcome::Error => ActionStatus::Failed,
        };
        let error = match outcome {
            Outcome::Success => None,
            Outcome::Error => Some(
                result_payload
                    .and_then(|v| v.get("message"))
                    .and_then(|m| m.as_str())
                    .unwrap_or("worker reported failure")
                    .to_string(),
            ),
        };
        let result_json = result_payload.map(serde_json::to_string).transpose()?;
        let now = Utc::now().to_rfc3339();

        tx.execute(
            "UPDATE action_requests
                SET status = ?1, result = ?2, error = ?3, resolved_at = ?4
              WHERE correlation_id = ?5 AND status = 'PENDING'",
            rusqlite::params![status.as_str(), result_json, error, now, correlation_id],
        )?;
        tx.execute(
            "UPDATE notifications
                SET status = ?1, requires_action = ?2, message = ?3, updated_at = ?4
              WHERE correlation_id = ?5",
            rusqlite::params![
                status.as_str(),
                (status == ActionStatus::Failed) as i64,
                match status {
                    ActionStatus::Succeeded => "Action completed".to_string(),
                    _ => error.clone().unwrap_or_else(|| "Action failed".to_string()),
                },
                now,
                correlation_id,
            ],
        )?;

        tx.commit()?;

        let updated = Self::query_by_correlation(&conn, correlation_id)?
            .ok_or_else(|| RelayError::UnknownCorrelation(correlation_id.to_string()))?;
        Ok(Resolution::Applied(updated))
    }

    /// Mark a request FAILED because the dispatch call itself never reached
    /// the worker. Releases the idempotency key immediately — a trigger that
    /// never left the building must not block future retries.
    pub fn mark_dispatch_failed(&self, correlation_id: &str, reason: &str) -> Result<ActionRequest> {
        let mut conn = self.conn.lock().expect("store lock poisoned");
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        let affected = tx.execute(
            "UPDATE action_requests
                SET status = 'FAILED', error = ?1, resolved_at = ?2
              WHERE correlation_id = ?3 AND status = 'PENDING'",
            rusqlite::params![reason, now, correlation_id],
        )?;
        if affected > 0 {
            tx.execute(
                "UPDATE notifications
                    SET status = 'FAILED', requires_action = 1, message = ?1, updated_at = ?2
                  WHERE correlation_id = ?3",
                rusqlite::params![reason, now, correlation_id],
            )?;
        }
        tx.commit()?;

        Self::query_by_correlation(&conn, correlation_id)?
            .ok_or_else(|| RelayError::UnknownCorrelation(correlation_id.to_string()))
    }

    pub fn get_by_correlation(&self, correlation_id: &str) -> Result<Option<ActionRequest>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        Self::query_by_correlation(&conn, correlation_id)
    }

    /// Most recent request for an idempotency key, terminal or not. Used by
    /// the status-query endpoint for reconciliation after a missed live event.
    pub fn latest_by_key(
        &self,
        entity: &EntityRef,
        action_type: ActionType,
    ) -> Result<Option<ActionRequest>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, correlation_id, action_type, entity_type, entity_id, payload,
                    status, result, error, created_at, resolved_at
               FROM action_requests
              WHERE entity_type = ?1 AND entity_id = ?2 AND action_type = ?3
              ORDER BY id DESC LIMIT 1",
        )?;
        let mut rows = stmt.query_map(
            rusqlite::params![entity.entity_type, entity.entity_id, action_type.as_str()],
            map_row,
        )?;
        rows.next().transpose().map_err(Into::into)
    }

    /// PENDING requests older than the given age. Feed for an external
    /// reconciliation job sweeping records whose dispatch crashed mid-flight
    /// or whose worker never called back.
    pub fn stale_pending(&self, older_than: chrono::Duration) -> Result<Vec<ActionRequest>> {
        let cutoff = (Utc::now() - older_than).to_rfc3339();
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, correlation_id, action_type, entity_type, entity_id, payload,
                    status, result, error, created_at, resolved_at
               FROM action_requests
              WHERE status = 'PENDING' AND created_at < ?1
              ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map([cutoff], map_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    // -- internal queries ---------------------------------------------------

    fn query_by_correlation(
        conn: &Connection,
        correlation_id: &str,
    ) -> Result<Option<ActionRequest>> {
        let mut stmt = conn.prepare(
            "SELECT id, correlation_id, action_type, entity_type, entity_id, payload,
                    status, result, error, created_at, resolved_at
               FROM action_requests
              WHERE correlation_id = ?1",
        )?;
        let mut rows = stmt.query_map([correlation_id], map_row)?;
        rows.next().transpose().map_err(Into::into)
    }

    fn query_pending_by_key(
        conn: &Connection,
        entity: &EntityRef,
        action_type: ActionType,
    ) -> Result<Option<ActionRequest>> {
        let mut stmt = conn.prepare(
            "SELECT id, correlation_id, action_type, entity_type, entity_id, payload,
                    status, result, error, created_at, resolved_at
               FROM action_requests
              WHERE entity_type = ?1 AND entity_id = ?2 AND action_type = ?3
                AND status = 'PENDING'",
        )?;
        let mut rows = stmt.query_map(
            rusqlite::params![entity.entity_type, entity.entity_id, action_type.as_str()],
            map_row,
        )?;
        rows.next().transpose().map_err(Into::into)
    }
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ActionRequest> {
    let action_type: String = row.get(2)?;
    let payload: String = row.get(5)?;
    let status: String = row.get(6)?;
    let result: Option<String> = row.get(7)?;
    let created_at: String = row.get(9)?;
    let resolved_at: Option<String> = row.get(10)?;

    Ok(ActionRequest {
        id: row.get(0)?,
        correlation_id: row.get(1)?,
        action_type: action_type.parse().map_err(|e| conversion(2, e))?,
        entity: EntityRef {
            entity_type: row.get(3)?,
            entity_id: row.get(4)?,
        },
        payload: serde_json::from_str(&payload).map_err(|e| conversion(5, e))?,
        status: status.parse().map_err(|e| conversion(6, e))?,
        result: result
            .map(|r| serde_json::from_str(&r))
            .transpose()
            .map_err(|e| conversion(7, e))?,
        error: row.get(8)?,
        created_at: parse_ts(&created_at).map_err(|e| conversion(9, e))?,
        resolved_at: resolved_at
            .map(|ts| parse_ts(&ts))
            .transpose()
            .map_err(|e| conversion(10, e))?,
    })
}

fn parse_ts(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

fn conversion(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ActionStore {
        ActionStore::open_in_memory().unwrap()
    }

    fn candidate_42() -> EntityRef {
        EntityRef::new("candidate", "42")
    }

    fn acquire(store: &ActionStore, correlation_id: &str) -> Result<ActionRequest> {
        store.try_acquire(
            &candidate_42(),
            ActionType::SendMessage,
            correlation_id,
            &serde_json::json!({"subject": "hello"}),
        )
    }

    #[test]
    fn acquire_creates_pending_record() {
        let store = store();
        let req = acquire(&store, "c1").unwrap();
        assert_eq!(req.status, ActionStatus::Pending);
        assert_eq!(req.correlation_id, "c1");
        assert!(req.resolved_at.is_none());
    }

    #[test]
    fn second_acquire_on_same_key_conflicts_with_existing_metadata() {
        let store = store();
        acquire(&store, "c1").unwrap();
        match acquire(&store, "c2") {
            Err(RelayError::ConflictInProgress { existing }) => {
                assert_eq!(existing.correlation_id, "c1");
                assert_eq!(existing.status, ActionStatus::Pending);
                assert!(existing.pending_for(Utc::now()) >= chrono::Duration::zero());
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn different_action_type_on_same_entity_does_not_conflict() {
        let store = store();
        acquire(&store, "c1").unwrap();
        store
            .try_acquire(
                &candidate_42(),
                ActionType::GenerateQuote,
                "c2",
                &serde_json::Value::Null,
            )
            .unwrap();
    }

    #[test]
    fn empty_key_fields_are_rejected() {
        let store = store();
        let err = store
            .try_acquire(
                &EntityRef::new("", "42"),
                ActionType::SendMessage,
                "c1",
                &serde_json::Value::Null,
            )
            .unwrap_err();
        assert!(matches!(err, RelayError::EmptyField("entityType")));
        let err = store
            .try_acquire(
                &EntityRef::new("candidate", "  "),
                ActionType::SendMessage,
                "c1",
                &serde_json::Value::Null,
            )
            .unwrap_err();
        assert!(matches!(err, RelayError::EmptyField("entityId")));
    }

    #[test]
    fn concurrent_acquires_yield_exactly_one_winner() {
        let store = store();
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                store.try_acquire(
                    &EntityRef::new("candidate", "42"),
                    ActionType::SendMessage,
                    &format!("c{i}"),
                    &serde_json::Value::Null,
                )
            }));
        }
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1, "exactly one concurrent trigger must win");
        for r in results.iter().filter(|r| r.is_err()) {
            assert!(matches!(
                r.as_ref().unwrap_err(),
                RelayError::ConflictInProgress { .. }
            ));
        }
    }

    #[test]
    fn resolve_success_stamps_result_and_releases_key() {
        let store = store();
        acquire(&store, "c1").unwrap();
        let resolution = store
            .resolve("c1", Outcome::Success, Some(&serde_json::json!({"sent": true})))
            .unwrap();
        match resolution {
            Resolution::Applied(req) => {
                assert_eq!(req.status, ActionStatus::Succeeded);
                assert!(req.resolved_at.is_some());
                assert_eq!(req.result.unwrap()["sent"], true);
            }
            Resolution::Duplicate(_) => panic!("first callback must apply"),
        }
        // Key is free again.
        acquire(&store, "c2").unwrap();
    }

    #[test]
    fn resolve_error_records_failure_message() {
        let store = store();
        acquire(&store, "c1").unwrap();
        let resolution = store
            .resolve(
                "c1",
                Outcome::Error,
                Some(&serde_json::json!({"message": "SMTP refused"})),
            )
            .unwrap();
        let Resolution::Applied(req) = resolution else {
            panic!("expected applied");
        };
        assert_eq!(req.status, ActionStatus::Failed);
        assert_eq!(req.error.as_deref(), Some("SMTP refused"));
    }

    #[test]
    fn duplicate_callback_is_a_noop() {
        let store = store();
        acquire(&store, "c1").unwrap();
        store.resolve("c1", Outcome::Success, None).unwrap();
        let second = store
            .resolve("c1", Outcome::Error, Some(&serde_json::json!({"message": "late"})))
            .unwrap();
        match second {
            Resolution::Duplicate(req) => {
                // First outcome stands.
                assert_eq!(req.status, ActionStatus::Succeeded);
                assert!(req.error.is_none());
            }
            Resolution::Applied(_) => panic!("second callback must not apply"),
        }
    }

    #[test]
    fn resolve_unknown_correlation_is_rejected() {
        let store = store();
        let err = store.resolve("nope", Outcome::Success, None).unwrap_err();
        assert!(matches!(err, RelayError::UnknownCorrelation(_)));
    }

    #[test]
    fn dispatch_failure_releases_key_immediately() {
        let store = store();
        acquire(&store, "c1").unwrap();
        let req = store
            .mark_dispatch_failed("c1", "connection refused")
            .unwrap();
        assert_eq!(req.status, ActionStatus::Failed);
        assert_eq!(req.error.as_deref(), Some("connection refused"));
        // No permanent lockout.
        acquire(&store, "c2").unwrap();
    }

    #[test]
    fn latest_by_key_returns_most_recent_attempt() {
        let store = store();
        acquire(&store, "c1").unwrap();
        store.mark_dispatch_failed("c1", "boom").unwrap();
        acquire(&store, "c2").unwrap();
        let latest = store
            .latest_by_key(&candidate_42(), ActionType::SendMessage)
            .unwrap()
            .unwrap();
        assert_eq!(latest.correlation_id, "c2");
        assert_eq!(latest.status, ActionStatus::Pending);
    }

    #[test]
    fn stale_pending_filters_by_age() {
        let store = store();
        acquire(&store, "c1").unwrap();
        // A fresh PENDING row is not stale yet at 1h, but is at zero age.
        assert!(store
            .stale_pending(chrono::Duration::hours(1))
            .unwrap()
            .is_empty());
        let stale = store.stale_pending(chrono::Duration::seconds(-1)).unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].correlation_id, "c1");
    }

    #[test]
    fn resolved_requests_are_never_stale() {
        let store = store();
        acquire(&store, "c1").unwrap();
        store.resolve("c1", Outcome::Success, None).unwrap();
        assert!(store
            .stale_pending(chrono::Duration::seconds(-1))
            .unwrap()
            .is_empty());
    }
}
