use chrono::{DateTime, Utc};
use mongodb::bson::DateTime as BsonDateTime;

/// RFC 3339 rendering of a stored timestamp, as sent to clients.
pub fn to_rfc3339(dt: BsonDateTime) -> String {
    to_chrono(dt).to_rfc3339()
}

pub fn to_chrono(dt: BsonDateTime) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(dt.timestamp_millis()).unwrap_or_default()
}

pub fn days_from_now(days: i64) -> BsonDateTime {
    BsonDateTime::from_millis(Utc::now().timestamp_millis() + days * 24 * 60 * 60 * 1000)
}
