/// Questionnaire, question, answer and snapshot ids are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// Published version number of a questionnaire; `0` before the first publish.
pub type Version = i32;

/// Snapshot and row timestamps, always UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
