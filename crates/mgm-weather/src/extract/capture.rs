//! Buffer for API responses captured while the page loads.

use super::unwrap_single;
use crate::snapshot::{ExtractionMethod, RawExtraction};
use serde_json::Value;
use std::sync::Mutex;

/// Which snapshot slot an API response belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Current,
    Hourly,
    Daily,
}

impl ResponseKind {
    /// Classify an API URL by its path.
    pub fn classify(url: &str) -> Option<Self> {
        if url.contains("sondurumlar") {
            Some(Self::Current)
        } else if url.contains("saatlik") {
            Some(Self::Hourly)
        } else if url.contains("gunluk") {
            Some(Self::Daily)
        } else {
            None
        }
    }
}

#[derive(Debug, Default)]
struct Slots {
    current: Option<Value>,
    hourly: Option<Value>,
    daily: Option<Value>,
}

/// Collects intercepted responses from the configured API host.
#[derive(Debug)]
pub struct ResponseCapture {
    api_host: String,
    slots: Mutex<Slots>,
}

impl ResponseCapture {
    pub fn new(api_host: impl Into<String>) -> Self {
        Self {
            api_host: api_host.into(),
            slots: Mutex::new(Slots::default()),
        }
    }

    /// Whether a response URL is worth fetching the body for.
    pub fn wants(&self, url: &str) -> Option<ResponseKind> {
        if url.contains(&self.api_host) {
            ResponseKind::classify(url)
        } else {
            None
        }
    }

    /// Store a response body. Non-JSON bodies are ignored.
    ///
    /// Returns whether the body was stored.
    pub fn record(&self, url: &str, body: &str) -> bool {
        let Some(kind) = self.wants(url) else {
            return false;
        };
        let value = match serde_json::from_str::<Value>(body) {
            Ok(Value::Null) => return false,
            Ok(v) => unwrap_single(v),
            Err(e) => {
                log::debug!("Ignoring non-JSON response from {}: {}", url, e);
                return false;
            }
        };
        log::debug!("Captured {:?} response from {}", kind, url);

        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        match kind {
            ResponseKind::Current => slots.current = Some(value),
            ResponseKind::Hourly => slots.hourly = Some(value),
            ResponseKind::Daily => slots.daily = Some(value),
        }
        true
    }

    /// All three slots are filled.
    pub fn is_complete(&self) -> bool {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.current.is_some() && slots.hourly.is_some() && slots.daily.is_some()
    }

    /// Current contents as an extraction result.
    pub fn to_extraction(&self) -> RawExtraction {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let method = if slots.current.is_some() {
            ExtractionMethod::NetworkInterception
        } else {
            ExtractionMethod::Failed
        };
        RawExtraction {
            current: slots.current.clone(),
            hourly: slots.hourly.clone(),
            daily: slots.daily.clone(),
            method: Some(method),
        }
    }
}
