//! Serde helpers mapping internal unix-second timestamps to the ISO 8601
//! strings used by the key record wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

pub fn serialize<S: Serializer>(ts: &i64, serializer: S) -> Result<S::Ok, S::Error> {
    let dt = DateTime::<Utc>::from_timestamp(*ts, 0)
        .ok_or_else(|| serde::ser::Error::custom("timestamp out of range"))?;
    serializer.serialize_str(&dt.to_rfc3339())
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let s = String::deserialize(deserializer)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.timestamp())
        .map_err(|e| D::Error::custom(format!("invalid ISO 8601 timestamp '{}': {}", s, e)))
}

pub mod option {
    use super::*;

    pub fn serialize<S: Serializer>(ts: &Option<i64>, serializer: S) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => super::serialize(ts, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<i64>, D::Error> {
        let s: Option<String> = Option::deserialize(deserializer)?;
        match s {
            None => Ok(None),
            Some(s) => DateTime::parse_from_rfc3339(&s)
                .map(|dt| Some(dt.timestamp()))
                .map_err(|e| {
                    D::Error::custom(format!("invalid ISO 8601 timestamp '{}': {}", s, e))
                }),
        }
    }
}
