//! Weather data extraction from a loaded MGM page.
//!
//! One strategy is chosen at startup:
//! - `scope`: read the AngularJS controller scope, fall back to DOM text
//! - `dom`: read DOM text only
//! - `intercept`: use the API responses the page fetched while loading
//! - `direct`: call the API endpoints from inside the page
//!
//! Missing data is never an error; it ends up as `null` in the snapshot.

mod capture;
pub mod scripts;

pub use capture::{ResponseCapture, ResponseKind};

use crate::config::{ExtractionConfig, SourceConfig, Strategy};
use crate::error::ScrapeError;
use crate::snapshot::{ExtractionMethod, RawExtraction};
use crate::wait::{poll_until, WaitPolicy};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

/// A loaded page that can run JavaScript.
#[async_trait]
pub trait PageContext: Send + Sync {
    /// Evaluate `script` in the page, awaiting promises, and return the
    /// result by value.
    async fn evaluate(&self, script: &str) -> Result<Value, ScrapeError>;
}

/// Replace a one-element array by its element.
pub fn unwrap_single(value: Value) -> Value {
    match value {
        Value::Array(mut items) if items.len() == 1 => items.remove(0),
        other => other,
    }
}

/// `None` for absent or `null` values.
fn present(value: Option<Value>) -> Option<Value> {
    value.filter(|v| !v.is_null())
}

/// Current conditions come as a list of observations; keep the first.
fn first_observation(value: Option<Value>) -> Option<Value> {
    match present(value)? {
        Value::Array(items) => items.into_iter().find(|v| !v.is_null()),
        other => Some(other),
    }
}

/// Poll until `selector` has visible text or `policy` times out.
///
/// Evaluation errors count as "not yet". Returns whether the content
/// appeared; a timeout is only logged so extraction can still run on
/// whatever the page has.
pub async fn wait_for_content(
    page: &dyn PageContext,
    selector: &str,
    policy: &WaitPolicy,
) -> bool {
    let script = scripts::selector_has_text_script(selector);
    let script = script.as_str();
    let ready = poll_until(policy, move || async move {
        matches!(page.evaluate(script).await, Ok(Value::Bool(true)))
    })
    .await;
    if ready {
        log::debug!("Selector '{}' has content", selector);
    } else {
        log::warn!(
            "Selector '{}' still empty after {}ms, continuing",
            selector,
            policy.timeout_ms
        );
    }
    ready
}

#[derive(Debug, Default, Deserialize)]
struct ScopeResult {
    #[serde(default)]
    found: bool,
    current: Option<Value>,
    hourly: Option<Value>,
    daily: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct DomResult {
    sicaklik: Option<String>,
    nem: Option<String>,
    hadise: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FetchResult {
    current: Option<Value>,
    hourly: Option<Value>,
    daily: Option<Value>,
}

/// Runs the configured strategy against a page.
#[derive(Debug, Clone)]
pub struct Extractor {
    strategy: Strategy,
    source: SourceConfig,
    capture_wait: WaitPolicy,
}

impl Extractor {
    pub fn new(extraction: &ExtractionConfig, source: &SourceConfig) -> Self {
        Self {
            strategy: extraction.strategy,
            source: source.clone(),
            capture_wait: extraction.capture_wait,
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Whether responses must be captured before navigation starts.
    pub fn needs_capture(&self) -> bool {
        self.strategy == Strategy::Intercept
    }

    /// A capture buffer for this source, when the strategy uses one.
    pub fn new_capture(&self) -> Option<ResponseCapture> {
        self.needs_capture()
            .then(|| ResponseCapture::new(self.source.api_host.clone()))
    }

    /// Extract weather data from `page`.
    ///
    /// `capture` must be the buffer from [`Extractor::new_capture`] for the
    /// intercept strategy; it is ignored otherwise.
    pub async fn extract(
        &self,
        page: &dyn PageContext,
        capture: Option<&ResponseCapture>,
    ) -> Result<RawExtraction, ScrapeError> {
        let raw = match self.strategy {
            Strategy::Scope => self.read_scope(page).await?,
            Strategy::Dom => read_dom(page).await?,
            Strategy::Intercept => match capture {
                Some(capture) => self.await_capture(capture).await,
                None => {
                    return Err(ScrapeError::Config(
                        "intercept strategy requires a response capture".to_string(),
                    ))
                }
            },
            Strategy::Direct => self.fetch_direct(page).await?,
        };

        log::info!(
            "Extraction finished: method={}, current={}, hourly={}, daily={}",
            raw.method.unwrap_or_default(),
            raw.current.is_some(),
            raw.hourly.is_some(),
            raw.daily.is_some()
        );
        Ok(raw)
    }

    async fn read_scope(&self, page: &dyn PageContext) -> Result<RawExtraction, ScrapeError> {
        let value = page.evaluate(scripts::SCOPE_SCRIPT).await?;
        let scope: ScopeResult = serde_json::from_value(value)?;
        let hourly = present(scope.hourly);
        let daily = present(scope.daily);

        if scope.found {
            if let Some(current) = first_observation(scope.current) {
                return Ok(RawExtraction {
                    current: Some(current),
                    hourly,
                    daily,
                    method: Some(ExtractionMethod::AngularScope),
                });
            }
            log::warn!("Angular scope has no current conditions, falling back to DOM");
        } else {
            log::warn!("Angular scope not found, falling back to DOM");
        }

        let mut raw = read_dom(page).await?;
        raw.hourly = hourly;
        raw.daily = daily;
        Ok(raw)
    }

    async fn await_capture(&self, capture: &ResponseCapture) -> RawExtraction {
        let complete =
            poll_until(&self.capture_wait, move || async move { capture.is_complete() }).await;
        if !complete {
            log::warn!(
                "Not all API responses captured within {}ms",
                self.capture_wait.timeout_ms
            );
        }
        capture.to_extraction()
    }

    async fn fetch_direct(&self, page: &dyn PageContext) -> Result<RawExtraction, ScrapeError> {
        let script = scripts::direct_fetch_script(&self.source);
        let result: FetchResult = serde_json::from_value(page.evaluate(&script).await?)?;

        let current = present(result.current).map(unwrap_single);
        let method = if current.is_some() {
            ExtractionMethod::DirectFetch
        } else {
            ExtractionMethod::Failed
        };
        Ok(RawExtraction {
            current,
            hourly: present(result.hourly).map(unwrap_single),
            daily: present(result.daily).map(unwrap_single),
            method: Some(method),
        })
    }
}

/// Scrape the current-conditions widgets.
async fn read_dom(page: &dyn PageContext) -> Result<RawExtraction, ScrapeError> {
    let value = page.evaluate(&scripts::dom_script()).await?;
    let dom: DomResult = serde_json::from_value(value)?;

    if dom.sicaklik.is_none() && dom.nem.is_none() && dom.hadise.is_none() {
        log::warn!("No current-conditions elements found on the page");
        return Ok(RawExtraction {
            method: Some(ExtractionMethod::Failed),
            ..Default::default()
        });
    }

    let mut current = Map::new();
    current.insert("sicaklik".into(), json!(dom.sicaklik));
    current.insert("nem".into(), json!(dom.nem));
    current.insert("hadise".into(), json!(dom.hadise));

    Ok(RawExtraction {
        current: Some(Value::Object(current)),
        hourly: None,
        daily: None,
        method: Some(ExtractionMethod::DomFallback),
    })
}
