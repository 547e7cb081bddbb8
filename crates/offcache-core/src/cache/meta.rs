//! Well-known metadata keys and scalar encoding.
//!
//! The metadata table stores raw bytes. Scalars written by this crate are
//! JSON numbers, so a dump stays readable and decoding never depends on
//! byte order.

use chrono::{DateTime, TimeZone, Utc};

use crate::error::{OfflineError, Result};

/// Millisecond timestamp of the last processed entity update.
pub const LAST_UPDATE_TIME: &str = "lastUpdateTime";

/// Number of days of mail the cache keeps.
pub const TIME_RANGE_DAYS: &str = "timeRangeDays";

/// Millisecond timestamp of the last `VACUUM`.
pub const LAST_COMPACTION_TIME: &str = "lastCompactionTime";

/// Metadata key holding the stored model version of `app`.
pub fn model_version_key(app: &str) -> String {
    format!("{}-version", app)
}

pub fn encode_number(value: u64) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&value)?)
}

pub fn decode_number(bytes: &[u8]) -> Result<u64> {
    Ok(serde_json::from_slice(bytes)?)
}

pub fn encode_version(version: u32) -> Result<Vec<u8>> {
    encode_number(u64::from(version))
}

pub fn decode_version(bytes: &[u8]) -> Result<u32> {
    let value = decode_number(bytes)?;
    u32::try_from(value)
        .map_err(|_| OfflineError::InvalidInput(format!("Model version out of range: {}", value)))
}

pub fn encode_time(time: DateTime<Utc>) -> Result<Vec<u8>> {
    let millis = u64::try_from(time.timestamp_millis())
        .map_err(|_| OfflineError::InvalidInput(format!("Timestamp before epoch: {}", time)))?;
    encode_number(millis)
}

pub fn decode_time(bytes: &[u8]) -> Result<DateTime<Utc>> {
    let millis = decode_number(bytes)?;
    let millis = i64::try_from(millis)
        .map_err(|_| OfflineError::InvalidInput(format!("Timestamp out of range: {}", millis)))?;
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| OfflineError::InvalidInput(format!("Timestamp out of range: {}", millis)))
}
