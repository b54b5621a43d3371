//! `SQLite` schema definitions for the reference event store.

/// SQL statement to create the events table.
///
/// `change_seq` is bumped on every insert and patch; polling feeds use it
/// as their cursor.
pub const CREATE_EVENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    operator_id INTEGER NOT NULL,
    event_time TEXT NOT NULL,
    event_type TEXT NOT NULL,
    triggered_by TEXT NOT NULL DEFAULT 'sensor',
    details TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    driver_response TEXT,
    response_time TEXT,
    response_notes TEXT,
    change_seq INTEGER NOT NULL DEFAULT 0
)
";

/// SQL statement to index events by operator and change sequence.
pub const CREATE_EVENTS_OPERATOR_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_events_operator_seq ON events(operator_id, change_seq)
";

/// SQL statement to index events by status.
pub const CREATE_EVENTS_STATUS_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_events_status ON events(status)
";

/// SQL statement to create the append-only response log.
pub const CREATE_RESPONSES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS responses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id INTEGER NOT NULL,
    operator_id INTEGER NOT NULL,
    response_type TEXT NOT NULL,
    response_time TEXT NOT NULL,
    notes TEXT
)
";

/// SQL statement to index responses by event.
pub const CREATE_RESPONSES_EVENT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_responses_event ON responses(event_id)
";

/// SQL statement to create the notification outbox.
pub const CREATE_OUTBOX_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS outbox (
    idempotency_key TEXT PRIMARY KEY,
    event_id INTEGER NOT NULL,
    classification TEXT NOT NULL,
    message TEXT NOT NULL,
    created_at TEXT NOT NULL,
    delivered_at TEXT
)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// SQL statement to index undelivered outbox rows.
pub const CREATE_OUTBOX_PENDING_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_outbox_pending ON outbox(delivered_at, created_at)
";

/// Base schema (version 1) statements in order.
pub const BASE_STATEMENTS: &[&str] = &[
    CREATE_EVENTS_TABLE,
    CREATE_EVENTS_OPERATOR_INDEX,
    CREATE_EVENTS_STATUS_INDEX,
    CREATE_RESPONSES_TABLE,
    CREATE_RESPONSES_EVENT_INDEX,
    CREATE_METADATA_TABLE,
];

/// Statements added by schema version 2.
pub const OUTBOX_STATEMENTS: &[&str] = &[CREATE_OUTBOX_TABLE, CREATE_OUTBOX_PENDING_INDEX];
