//! Navigation records for export
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// One attitude sample, taken from a KM binary sample in `#SKM`
#[derive(Debug, Clone, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Attitude {
    /// The file the sample was read from
    pub source: String,
    /// The time of the sample, in whole seconds
    #[serde(with = "time::serde::timestamp")]
    pub timestamp: OffsetDateTime,
    /// The time of the sample in seconds since the epoch
    pub time: f64,
    /// Roll in degrees, positive port up
    pub roll: f64,
    /// Pitch in degrees, positive bow up
    pub pitch: f64,
    /// Heading in degrees
    pub heading: f64,
    /// Heave in metres, positive up
    pub heave: f64,
    /// KM binary status word
    pub status: u32,
}

/// The position of the vessel reference point, from `#SPO`
#[derive(Debug, Clone, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Position {
    /// The file the fix was read from
    pub source: String,
    /// The time of the fix, in whole seconds
    #[serde(with = "time::serde::timestamp")]
    pub timestamp: OffsetDateTime,
    /// The time of the fix in seconds since the epoch
    pub time: f64,
    /// The latitude in degrees
    pub latitude: f64,
    /// The longitude in degrees
    pub longitude: f64,
    /// Height above the ellipsoid in metres
    pub ellipsoid_height: f64,
    /// Fix quality in metres
    pub quality: f64,
}

/// Avro schema for [`Attitude`]
pub const ATTITUDE_SCHEMA: &str = r#"{"type": "record","namespace": "kmall","name": "attitude","fields": [{"name": "source", "type": "string"},{"name": "timestamp", "type": "long"},{"name": "time", "type": "double"},{"name": "roll", "type": "double"},{"name": "pitch", "type": "double"},{"name": "heading", "type": "double"},{"name": "heave", "type": "double"},{"name": "status", "type": "long"}]}"#;

/// Split fractional epoch seconds into a calendar time
pub(crate) fn datetime(time: f64) -> OffsetDateTime {
    let secs = time.floor();
    let nanos = ((time - secs) * 1.0e9).round() as i64;
    OffsetDateTime::from_unix_timestamp(secs as i64)
        .map(|t| t + time::Duration::nanoseconds(nanos))
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}
