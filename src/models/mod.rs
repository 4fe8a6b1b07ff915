//! Catalog records for the flat-file object store.
//!
//! Each struct maps one-to-one onto a CSV row. Field names are renamed to the
//! header columns so the `csv` crate can deserialize rows by header name.

pub mod bucket;
pub mod object;

use chrono::{DateTime, SubsecRound, Utc};

/// Current time truncated to whole seconds, the precision catalogs persist.
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Serde adapter writing timestamps as RFC3339 with second precision.
///
/// Any RFC3339 offset is accepted on read so catalogs written with a local
/// offset still load.
pub(crate) mod rfc3339 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|err| D::Error::custom(format!("invalid RFC3339 timestamp `{raw}`: {err}")))
    }
}
