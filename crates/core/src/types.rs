/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Numeric key used for PostgreSQL advisory locks (`pg_try_advisory_lock(bigint)`).
pub type LockKey = i64;
