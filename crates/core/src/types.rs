/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Payment intents are keyed by the client-generated idempotency key.
pub type IntentId = uuid::Uuid;

/// A ticket number issued from a pool (1-based).
pub type TicketNumber = i32;
