use chrono::{NaiveDateTime, Utc};

/// Current UTC time as stored in the database.
pub fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}
