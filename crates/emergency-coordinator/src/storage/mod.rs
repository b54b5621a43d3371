//! Reference event store.
//!
//! A `SQLite` stand-in for the hosted database the driver application talks
//! to. It holds event rows, the append-only response log and the
//! notification outbox, and exposes the change sequence that
//! [`PollingFeed`](crate::feed::PollingFeed) follows.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::event::{
    DriverResponse, EmergencyResponse, EventId, EventStatus, EventType, OperatorId, ResponseType,
    TriggeredBy,
};
use crate::feed::RawEventRow;
use crate::transition::Classification;

const EVENT_COLUMNS: &str = "id, operator_id, event_time, event_type, triggered_by, details, \
     status, driver_response, response_time, response_notes";

const NEXT_SEQ: &str = "(SELECT COALESCE(MAX(change_seq), 0) + 1 FROM events)";

/// An event about to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    /// Owning operator.
    pub operator_id: OperatorId,
    /// Occurrence time.
    pub event_time: DateTime<Utc>,
    /// What happened.
    pub event_type: EventType,
    /// Who raised it.
    pub triggered_by: TriggeredBy,
    /// Raw device diagnostics.
    pub details: Option<Value>,
}

impl NewEvent {
    /// An event happening now, without diagnostics.
    #[must_use]
    pub fn now(operator_id: OperatorId, event_type: EventType, triggered_by: TriggeredBy) -> Self {
        Self {
            operator_id,
            event_time: Utc::now(),
            event_type,
            triggered_by,
            details: None,
        }
    }
}

/// A notification waiting for the delivery worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboxMessage {
    /// One row per (event, classification).
    pub idempotency_key: String,
    /// Event the message describes.
    pub event_id: EventId,
    /// Kind of message.
    pub classification: Classification,
    /// Message text.
    pub message: String,
    /// When it was queued.
    pub created_at: DateTime<Utc>,
    /// When the delivery worker sent it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
}

/// `SQLite`-backed event store.
///
/// The connection sits behind a mutex so the store can be shared between
/// the recorder, the dispatcher and a polling feed. Every method blocks;
/// async callers go through [`run_blocking`].
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Mutex<Connection>,
}

impl Storage {
    /// Open or create a store at the given path.
    ///
    /// Creates the parent directories if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Mutex::new(conn),
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::internal("storage connection lock poisoned"))
    }

    /// Insert a new pending event and return the stored row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_event(&self, event: &NewEvent) -> Result<RawEventRow> {
        let details = event.details.as_ref().map(Value::to_string);
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO events (operator_id, event_time, event_type, triggered_by, details, status, change_seq)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'pending', {NEXT_SEQ})"
            ),
            params![
                event.operator_id.0,
                event.event_time.to_rfc3339(),
                event.event_type.as_str(),
                event.triggered_by.as_str(),
                details,
            ],
        )?;

        let id = conn.last_insert_rowid();
        debug!(event_id = id, operator_id = %event.operator_id, "Inserted event");
        Self::query_event(&conn, EventId(id))?
            .ok_or_else(|| Error::internal(format!("inserted event {id} not found")))
    }

    /// Get an event row by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_event(&self, event_id: EventId) -> Result<Option<RawEventRow>> {
        let conn = self.conn()?;
        Self::query_event(&conn, event_id)
    }

    fn query_event(conn: &Connection, event_id: EventId) -> Result<Option<RawEventRow>> {
        let row = conn
            .query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"),
                [event_id.0],
                Self::row_to_raw_event,
            )
            .optional()?;
        Ok(row)
    }

    /// List events, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_events(
        &self,
        operator_id: Option<OperatorId>,
        unresolved_only: bool,
        limit: usize,
    ) -> Result<Vec<RawEventRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM events
             WHERE (?1 IS NULL OR operator_id = ?1)
               AND (?2 = 0 OR status IN ('pending', 'emergency_confirmed'))
             ORDER BY event_time DESC, id DESC LIMIT ?3"
        ))?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(
                params![operator_id.map(|o| o.0), unresolved_only, limit_i64],
                Self::row_to_raw_event,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Rows of one operator whose change sequence is past `after_seq`,
    /// oldest change first, paired with their sequence.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn changes_since(
        &self,
        operator_id: OperatorId,
        after_seq: i64,
    ) -> Result<Vec<(i64, RawEventRow)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS}, change_seq FROM events
             WHERE operator_id = ?1 AND change_seq > ?2
             ORDER BY change_seq ASC"
        ))?;

        let rows = stmt
            .query_map(params![operator_id.0, after_seq], |row| {
                Ok((row.get::<_, i64>(10)?, Self::row_to_raw_event(row)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Append one entry to the response log.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn append_response(&self, response: &EmergencyResponse) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            r"
            INSERT INTO responses (event_id, operator_id, response_type, response_time, notes)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
            params![
                response.event_id.0,
                response.operator_id.0,
                response.response_type.as_str(),
                response.response_time.to_rfc3339(),
                response.notes,
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(response_id = id, event_id = %response.event_id, "Appended response");
        Ok(id)
    }

    /// Responses recorded for an event, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn responses_for(&self, event_id: EventId) -> Result<Vec<EmergencyResponse>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r"
            SELECT id, event_id, operator_id, response_type, response_time, notes
            FROM responses WHERE event_id = ?1 ORDER BY id ASC
            ",
        )?;

        let responses = stmt
            .query_map([event_id.0], Self::row_to_response)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(responses)
    }

    /// Overwrite an event's status and last-response fields, returning the
    /// updated row, or `None` if the event does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn patch_event_status(
        &self,
        event_id: EventId,
        status: EventStatus,
        response: &DriverResponse,
    ) -> Result<Option<RawEventRow>> {
        let conn = self.conn()?;
        let affected = conn.execute(
            &format!(
                "UPDATE events SET status = ?1, driver_response = ?2, response_time = ?3,
                     response_notes = ?4, change_seq = {NEXT_SEQ}
                 WHERE id = ?5"
            ),
            params![
                status.as_str(),
                response.response_type.as_str(),
                response.responded_at.to_rfc3339(),
                response.notes,
                event_id.0,
            ],
        )?;

        if affected == 0 {
            return Ok(None);
        }
        Self::query_event(&conn, event_id)
    }

    /// Queue a notification. Returns `false` if the key was already queued.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn enqueue_outbox(&self, message: &OutboxMessage) -> Result<bool> {
        let conn = self.conn()?;
        let affected = conn.execute(
            r"
            INSERT OR IGNORE INTO outbox (idempotency_key, event_id, classification, message, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
            params![
                message.idempotency_key,
                message.event_id.0,
                message.classification.as_str(),
                message.message,
                message.created_at.to_rfc3339(),
            ],
        )?;
        Ok(affected > 0)
    }

    /// Most recent outbox rows, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_outbox(&self, limit: usize) -> Result<Vec<OutboxMessage>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r"
            SELECT idempotency_key, event_id, classification, message, created_at, delivered_at
            FROM outbox ORDER BY created_at DESC, rowid DESC LIMIT ?1
            ",
        )?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map([limit_i64], Self::row_to_outbox)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Mark an outbox row delivered. Returns `false` if unknown or already delivered.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn mark_delivered(&self, idempotency_key: &str) -> Result<bool> {
        let conn = self.conn()?;
        let affected = conn.execute(
            "UPDATE outbox SET delivered_at = ?1 WHERE idempotency_key = ?2 AND delivered_at IS NULL",
            params![Utc::now().to_rfc3339(), idempotency_key],
        )?;
        Ok(affected > 0)
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let conn = self.conn()?;
        let count = |sql: &str| -> Result<i64> { Ok(conn.query_row(sql, [], |row| row.get(0))?) };

        let total_events = count("SELECT COUNT(*) FROM events")?;
        let unresolved_events = count(
            "SELECT COUNT(*) FROM events WHERE status IN ('pending', 'emergency_confirmed')",
        )?;
        let total_responses = count("SELECT COUNT(*) FROM responses")?;
        let undelivered_notifications =
            count("SELECT COUNT(*) FROM outbox WHERE delivered_at IS NULL")?;

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            total_events,
            unresolved_events,
            total_responses,
            undelivered_notifications,
            db_size_bytes,
        })
    }

    fn row_to_raw_event(row: &rusqlite::Row) -> rusqlite::Result<RawEventRow> {
        let details: Option<String> = row.get(5)?;
        let details = details.and_then(|raw| match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(error = %e, "Stored event details are not JSON; keeping raw text");
                Some(Value::String(raw))
            }
        });

        Ok(RawEventRow {
            id: row.get(0)?,
            operator_id: row.get(1)?,
            event_time: row.get(2)?,
            event_type: row.get(3)?,
            triggered_by: row.get(4)?,
            details,
            status: row.get(6)?,
            driver_response: row.get(7)?,
            response_time: row.get(8)?,
            response_notes: row.get(9)?,
        })
    }

    fn row_to_response(row: &rusqlite::Row) -> rusqlite::Result<EmergencyResponse> {
        let response_type_str: String = row.get(3)?;
        let response_time_str: String = row.get(4)?;

        let response_type = response_type_str.parse().unwrap_or_else(|_| {
            warn!(
                "Unknown response type: {}, defaulting to CHECKED",
                response_type_str
            );
            ResponseType::Checked
        });

        Ok(EmergencyResponse {
            id: Some(row.get(0)?),
            event_id: EventId(row.get(1)?),
            operator_id: OperatorId(row.get(2)?),
            response_type,
            response_time: parse_stored_time(&response_time_str),
            notes: row.get(5)?,
        })
    }

    fn row_to_outbox(row: &rusqlite::Row) -> rusqlite::Result<OutboxMessage> {
        let classification_str: String = row.get(2)?;
        let created_at: String = row.get(4)?;
        let delivered_at: Option<String> = row.get(5)?;

        let classification = Classification::from_wire(&classification_str).unwrap_or_else(|| {
            warn!(
                "Unknown classification: {}, defaulting to NEW_EMERGENCY",
                classification_str
            );
            Classification::NewEmergency
        });

        Ok(OutboxMessage {
            idempotency_key: row.get(0)?,
            event_id: EventId(row.get(1)?),
            classification,
            message: row.get(3)?,
            created_at: parse_stored_time(&created_at),
            delivered_at: delivered_at.as_deref().map(parse_stored_time),
        })
    }
}

/// Run `f` against `storage` on tokio's blocking thread pool.
///
/// # Errors
///
/// Returns the error of `f`, or an internal error if the blocking task
/// panicked or was cancelled.
pub async fn run_blocking<T, F>(storage: &Arc<Storage>, f: F) -> Result<T>
where
    F: FnOnce(&Storage) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let storage = Arc::clone(storage);
    tokio::task::spawn_blocking(move || f(&storage))
        .await
        .map_err(|e| Error::internal(format!("storage task join failed: {e}")))?
}

fn parse_stored_time(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

/// Statistics about the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    /// Total number of events.
    pub total_events: i64,
    /// Events still pending or confirmed.
    pub unresolved_events: i64,
    /// Entries in the response log.
    pub total_responses: i64,
    /// Outbox rows not yet delivered.
    pub undelivered_notifications: i64,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_storage() -> Storage {
        Storage::open_in_memory().expect("failed to create test storage")
    }

    fn panic_event(operator: i64) -> NewEvent {
        NewEvent::now(OperatorId(operator), EventType::PanicButton, TriggeredBy::Driver)
    }

    fn response(event_id: EventId, response_type: ResponseType) -> EmergencyResponse {
        EmergencyResponse {
            id: None,
            event_id,
            operator_id: OperatorId(1),
            response_type,
            response_time: Utc::now(),
            notes: Some("on my way".to_string()),
        }
    }

    fn outbox(key: &str, event_id: i64) -> OutboxMessage {
        OutboxMessage {
            idempotency_key: key.to_string(),
            event_id: EventId(event_id),
            classification: Classification::Emergency,
            message: "Emergency confirmed".to_string(),
            created_at: Utc::now(),
            delivered_at: None,
        }
    }

    #[test]
    fn test_insert_and_get_event() {
        let storage = create_test_storage();
        let mut new_event = panic_event(1);
        new_event.details = Some(serde_json::json!({"temperature": 55.5}));

        let row = storage.insert_event(&new_event).unwrap();
        assert_eq!(row.operator_id, 1);
        assert_eq!(row.status.as_deref(), Some("pending"));
        assert_eq!(row.event_type, "PANIC_BUTTON");

        let fetched = storage.get_event(EventId(row.id)).unwrap().unwrap();
        assert_eq!(fetched, row);
        assert_eq!(fetched.details, Some(serde_json::json!({"temperature": 55.5})));
    }

    #[test]
    fn test_get_nonexistent_event() {
        let storage = create_test_storage();
        assert!(storage.get_event(EventId(404)).unwrap().is_none());
    }

    #[test]
    fn test_list_events_filters() {
        let storage = create_test_storage();
        let a = storage.insert_event(&panic_event(1)).unwrap();
        storage.insert_event(&panic_event(1)).unwrap();
        storage.insert_event(&panic_event(2)).unwrap();

        assert_eq!(storage.list_events(None, false, 10).unwrap().len(), 3);
        assert_eq!(storage.list_events(Some(OperatorId(1)), false, 10).unwrap().len(), 2);
        assert_eq!(storage.list_events(None, false, 1).unwrap().len(), 1);

        let reply = DriverResponse {
            response_type: ResponseType::Checked,
            responded_at: Utc::now(),
            notes: None,
        };
        storage
            .patch_event_status(EventId(a.id), EventStatus::Checked, &reply)
            .unwrap();
        assert_eq!(storage.list_events(Some(OperatorId(1)), true, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_changes_since_tracks_inserts_and_patches() {
        let storage = create_test_storage();
        let first = storage.insert_event(&panic_event(1)).unwrap();
        storage.insert_event(&panic_event(2)).unwrap();
        let second = storage.insert_event(&panic_event(1)).unwrap();

        let changes = storage.changes_since(OperatorId(1), 0).unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].1.id, first.id);
        assert_eq!(changes[1].1.id, second.id);
        let cursor = changes[1].0;
        assert!(storage.changes_since(OperatorId(1), cursor).unwrap().is_empty());

        let reply = DriverResponse {
            response_type: ResponseType::Emergency,
            responded_at: Utc::now(),
            notes: None,
        };
        storage
            .patch_event_status(EventId(first.id), EventStatus::EmergencyConfirmed, &reply)
            .unwrap();

        let changes = storage.changes_since(OperatorId(1), cursor).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].1.id, first.id);
        assert_eq!(changes[0].1.status.as_deref(), Some("emergency_confirmed"));
        assert!(changes[0].0 > cursor);
    }

    #[test]
    fn test_patch_event_status() {
        let storage = create_test_storage();
        let row = storage.insert_event(&panic_event(1)).unwrap();
        let reply = DriverResponse {
            response_type: ResponseType::Emergency,
            responded_at: Utc::now(),
            notes: Some("calling school".to_string()),
        };

        let patched = storage
            .patch_event_status(EventId(row.id), EventStatus::EmergencyConfirmed, &reply)
            .unwrap()
            .unwrap();
        assert_eq!(patched.status.as_deref(), Some("emergency_confirmed"));
        assert_eq!(patched.driver_response.as_deref(), Some("EMERGENCY"));
        assert_eq!(patched.response_notes.as_deref(), Some("calling school"));
    }

    #[test]
    fn test_patch_missing_event() {
        let storage = create_test_storage();
        let reply = DriverResponse {
            response_type: ResponseType::Checked,
            responded_at: Utc::now(),
            notes: None,
        };
        assert!(storage
            .patch_event_status(EventId(77), EventStatus::Checked, &reply)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_response_log_is_append_only() {
        let storage = create_test_storage();
        let row = storage.insert_event(&panic_event(1)).unwrap();
        let id = EventId(row.id);

        storage.append_response(&response(id, ResponseType::Emergency)).unwrap();
        storage
            .append_response(&response(id, ResponseType::ConfirmedNormal))
            .unwrap();

        let log = storage.responses_for(id).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].response_type, ResponseType::Emergency);
        assert_eq!(log[1].response_type, ResponseType::ConfirmedNormal);
        assert!(log[0].id.is_some());
    }

    #[test]
    fn test_outbox_is_idempotent() {
        let storage = create_test_storage();
        assert!(storage.enqueue_outbox(&outbox("k1", 1)).unwrap());
        assert!(!storage.enqueue_outbox(&outbox("k1", 1)).unwrap());
        assert!(storage.enqueue_outbox(&outbox("k2", 1)).unwrap());

        let rows = storage.list_outbox(10).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].classification, Classification::Emergency);
    }

    #[test]
    fn test_mark_delivered() {
        let storage = create_test_storage();
        storage.enqueue_outbox(&outbox("k1", 1)).unwrap();

        assert!(storage.mark_delivered("k1").unwrap());
        assert!(!storage.mark_delivered("k1").unwrap());
        assert!(!storage.mark_delivered("missing").unwrap());
        assert!(storage.list_outbox(1).unwrap()[0].delivered_at.is_some());
    }

    #[test]
    fn test_stats() {
        let storage = create_test_storage();
        let row = storage.insert_event(&panic_event(1)).unwrap();
        storage.insert_event(&panic_event(1)).unwrap();
        storage
            .append_response(&response(EventId(row.id), ResponseType::Checked))
            .unwrap();
        storage.enqueue_outbox(&outbox("k", row.id)).unwrap();

        let stats = storage.stats().unwrap();
        assert_eq!(stats.total_events, 2);
        assert_eq!(stats.unresolved_events, 2);
        assert_eq!(stats.total_responses, 1);
        assert_eq!(stats.undelivered_notifications, 1);
        assert_eq!(stats.db_size_bytes, 0);
    }

    #[tokio::test]
    async fn test_run_blocking_returns_result() {
        let storage = Arc::new(create_test_storage());
        let row = run_blocking(&storage, |s| s.insert_event(&panic_event(4)))
            .await
            .unwrap();
        assert_eq!(row.operator_id, 4);
        assert!(storage.get_event(EventId(row.id)).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_run_blocking_propagates_errors() {
        let storage = Arc::new(create_test_storage());
        let err = run_blocking(&storage, |s| {
            s.conn()?.execute("INSERT INTO missing_table VALUES (1)", [])?;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::DatabaseQuery(_)));
    }

    #[tokio::test]
    async fn test_run_blocking_reports_panics() {
        let storage = Arc::new(create_test_storage());
        let err = run_blocking(&storage, |_| -> Result<()> { panic!("boom") })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("join failed"));
    }

    #[test]
    fn test_open_file_based_creates_parent_dirs() {
        let dir = std::env::temp_dir().join(format!("emcoord_test_{}", std::process::id()));
        let db_path = dir.join("nested").join("events.db");
        let _ = std::fs::remove_dir_all(&dir);

        let storage = Storage::open(&db_path).unwrap();
        storage.insert_event(&panic_event(3)).unwrap();
        assert_eq!(storage.path(), db_path);
        assert!(db_path.exists());
        assert!(storage.stats().unwrap().db_size_bytes > 0);

        drop(storage);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
