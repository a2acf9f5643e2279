/// Identifier of a note row. Assigned by the backend, immutable.
pub type NoteId = uuid::Uuid;

/// Identifier of a tag row. Assigned by the backend, immutable.
pub type TagId = uuid::Uuid;

/// Identifier of an authenticated user account.
pub type UserId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
