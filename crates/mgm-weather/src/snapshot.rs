//! Weather snapshot returned by the API, and the normalizer that builds it.
//!
//! The `current`, `hourly` and `daily` payloads are passed through from MGM
//! untouched; only their presence is meaningful here.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Which extraction technique produced a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionMethod {
    /// Read from the AngularJS controller scope
    #[serde(rename = "Angular Scope")]
    AngularScope,
    /// Read from visible text of fixed CSS selectors
    #[serde(rename = "DOM Fallback")]
    DomFallback,
    /// Captured from the page's own API responses
    #[serde(rename = "Network Interception")]
    NetworkInterception,
    /// Fetched from the API endpoints inside the page context
    #[serde(rename = "Direct Page-Context Fetch")]
    DirectFetch,
    /// The strategy ran but found no current conditions
    #[serde(rename = "Failed")]
    Failed,
    #[default]
    #[serde(rename = "Unknown")]
    Unknown,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AngularScope => "Angular Scope",
            Self::DomFallback => "DOM Fallback",
            Self::NetworkInterception => "Network Interception",
            Self::DirectFetch => "Direct Page-Context Fetch",
            Self::Failed => "Failed",
            Self::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields produced by an extraction strategy, before timestamping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawExtraction {
    pub current: Option<Value>,
    pub hourly: Option<Value>,
    pub daily: Option<Value>,
    pub method: Option<ExtractionMethod>,
}

/// Normalized weather payload served by `/api/weather`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherSnapshot {
    pub current: Option<Value>,
    pub hourly: Option<Value>,
    pub daily: Option<Value>,
    pub method: ExtractionMethod,
    #[serde(serialize_with = "to_iso", deserialize_with = "from_iso")]
    pub updated_at: DateTime<Utc>,
}

/// Attach the timestamp and method tag to raw extracted fields.
pub fn normalize(raw: RawExtraction, now: DateTime<Utc>) -> WeatherSnapshot {
    WeatherSnapshot {
        current: raw.current,
        hourly: raw.hourly,
        daily: raw.daily,
        method: raw.method.unwrap_or_default(),
        updated_at: now,
    }
}

/// Format as `2024-05-01T10:00:00.000Z`.
pub fn iso_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn to_iso<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&iso_timestamp(ts))
}

fn from_iso<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(serde::de::Error::custom)
}
