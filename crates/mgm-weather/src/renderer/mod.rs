//! Headless Chrome page renderer.
//!
//! A [`BrowserSession`] owns one Chrome process and one page. Call
//! [`BrowserSession::close`] when done; dropping a session without closing
//! still kills Chrome and stops the background tasks.

mod network;

pub use network::NetworkActivity;

use crate::config::{BrowserConfig, NavigationConfig};
use crate::error::ScrapeError;
use crate::extract::{wait_for_content, PageContext, ResponseCapture};
use crate::wait::{poll_until, WaitPolicy};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromeConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, EventResponseReceived,
    GetResponseBodyParams, Headers, RequestId, SetExtraHttpHeadersParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// One Chrome process with one open page.
pub struct BrowserSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl BrowserSession {
    /// Start Chrome and open a blank page with identification headers set.
    pub async fn launch(config: &BrowserConfig) -> Result<Self, ScrapeError> {
        let mut builder = ChromeConfig::builder()
            .no_sandbox()
            .launch_timeout(Duration::from_secs(config.launch_timeout_secs));
        if let Some(executable) = &config.executable {
            builder = builder.chrome_executable(executable);
        }
        for arg in config.launch_args() {
            builder = builder.arg(arg);
        }
        let chrome_config = builder.build().map_err(ScrapeError::Launch)?;

        let (mut browser, mut handler) = Browser::launch(chrome_config)
            .await
            .map_err(|e| ScrapeError::Launch(e.to_string()))?;

        // The CDP connection only makes progress while the handler is polled
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    log::debug!("CDP handler error: {}", e);
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let _ = tokio::time::timeout(CLOSE_TIMEOUT, browser.close()).await;
                handler.abort();
                return Err(ScrapeError::Launch(format!("failed to open page: {}", e)));
            }
        };

        let session = Self {
            browser,
            page,
            handler,
            tasks: Mutex::new(Vec::new()),
        };
        session.identify(config).await?;
        Ok(session)
    }

    /// Set the user agent and request headers sent to the site.
    async fn identify(&self, config: &BrowserConfig) -> Result<(), ScrapeError> {
        let mut user_agent = SetUserAgentOverrideParams::new(config.user_agent.clone());
        user_agent.accept_language = config.accept_language.clone();
        self.page
            .execute(user_agent)
            .await
            .map_err(|e| ScrapeError::Launch(format!("failed to set user agent: {}", e)))?;

        let mut headers = Map::new();
        if let Some(lang) = &config.accept_language {
            headers.insert("Accept-Language".into(), Value::String(lang.clone()));
        }
        if let Some(referer) = &config.referer {
            headers.insert("Referer".into(), Value::String(referer.clone()));
        }
        if let Some(origin) = &config.origin {
            headers.insert("Origin".into(), Value::String(origin.clone()));
        }
        if !headers.is_empty() {
            self.page
                .execute(SetExtraHttpHeadersParams::new(Headers::new(Value::Object(
                    headers,
                ))))
                .await
                .map_err(|e| ScrapeError::Launch(format!("failed to set headers: {}", e)))?;
        }
        Ok(())
    }

    fn keep_task(&self, task: JoinHandle<()>) {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(task);
    }

    /// Track in-flight requests from now on.
    async fn watch_network(&self, max_inflight: usize) -> Result<Arc<NetworkActivity>, ScrapeError> {
        let mut started = self.page.event_listener::<EventRequestWillBeSent>().await?;
        let mut finished = self.page.event_listener::<EventLoadingFinished>().await?;
        let mut failed = self.page.event_listener::<EventLoadingFailed>().await?;

        let activity = Arc::new(NetworkActivity::new(max_inflight, Instant::now()));
        let tracker = activity.clone();
        self.keep_task(tokio::spawn(async move {
            loop {
                // Each event kind has its own channel; drain starts first so a
                // request is never seen finishing before it started
                tokio::select! {
                    biased;
                    Some(event) = started.next() => {
                        tracker.request_started(event.request_id.inner());
                    }
                    Some(event) = finished.next() => {
                        tracker.request_done(event.request_id.inner(), Instant::now());
                    }
                    Some(event) = failed.next() => {
                        tracker.request_done(event.request_id.inner(), Instant::now());
                    }
                    else => break,
                }
            }
        }));
        Ok(activity)
    }

    /// Store matching API responses in `capture` as they finish loading.
    ///
    /// Must be called before [`BrowserSession::navigate`].
    pub async fn capture_responses(&self, capture: Arc<ResponseCapture>) -> Result<(), ScrapeError> {
        let mut responses = self.page.event_listener::<EventResponseReceived>().await?;
        let mut finished = self.page.event_listener::<EventLoadingFinished>().await?;
        let page = self.page.clone();

        self.keep_task(tokio::spawn(async move {
            let mut pending: HashMap<String, (RequestId, String)> = HashMap::new();
            // Finished requests whose response event has not been seen yet
            let mut finished_early: HashSet<String> = HashSet::new();
            loop {
                tokio::select! {
                    biased;
                    Some(event) = responses.next() => {
                        if capture.wants(&event.response.url).is_none() {
                            continue;
                        }
                        let id = event.request_id.clone();
                        let url = event.response.url.clone();
                        if finished_early.remove(id.inner()) {
                            read_body(&page, &capture, id, &url).await;
                        } else {
                            pending.insert(id.inner().clone(), (id, url));
                        }
                    }
                    Some(event) = finished.next() => {
                        match pending.remove(event.request_id.inner()) {
                            Some((id, url)) => read_body(&page, &capture, id, &url).await,
                            None => {
                                finished_early.insert(event.request_id.inner().clone());
                            }
                        }
                    }
                    else => break,
                }
            }
        }));
        Ok(())
    }

    /// Load `url` and wait according to `nav`, within `timeout`.
    pub async fn navigate(
        &self,
        url: &str,
        nav: &NavigationConfig,
        timeout: Duration,
    ) -> Result<(), ScrapeError> {
        let deadline = Instant::now() + timeout;
        let activity = match nav.wait_until.max_inflight() {
            Some(max) => Some(self.watch_network(max).await?),
            None => None,
        };

        log::info!("Navigating to {}", url);
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Err(_) => return Err(ScrapeError::Timeout(timeout.as_secs())),
            Ok(Err(e)) => return Err(ScrapeError::Navigation(e.to_string())),
            Ok(Ok(_)) => {}
        }

        if let Some(activity) = activity {
            let quiet = Duration::from_millis(nav.idle_quiet_ms);
            let remaining = deadline.saturating_duration_since(Instant::now());
            let policy = WaitPolicy::fixed(100, remaining.as_millis() as u64);
            let idle = poll_until(&policy, || {
                let activity = activity.clone();
                async move { activity.is_idle(quiet, Instant::now()) }
            })
            .await;
            if !idle {
                log::warn!(
                    "Network never went idle ({} requests in flight)",
                    activity.inflight()
                );
                return Err(ScrapeError::Timeout(timeout.as_secs()));
            }
        }
        Ok(())
    }

    /// Wait for the page's dynamic content. Never fails.
    pub async fn settle(&self, nav: &NavigationConfig) {
        if let Some(selector) = &nav.ready_selector {
            wait_for_content(self, selector, &nav.ready_wait).await;
        }
        if nav.settle_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(nav.settle_delay_ms)).await;
        }
    }

    /// Shut Chrome down and stop background tasks.
    pub async fn close(mut self) {
        self.abort_tasks();
        match tokio::time::timeout(CLOSE_TIMEOUT, self.browser.close()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => log::warn!("Failed to close browser cleanly: {}", e),
            Err(_) => log::warn!("Browser did not close within {:?}", CLOSE_TIMEOUT),
        }
        if let Ok(Err(e)) = tokio::time::timeout(CLOSE_TIMEOUT, self.browser.wait()).await {
            log::debug!("Waiting for browser exit failed: {}", e);
        }
        self.handler.abort();
        log::debug!("Browser closed");
    }

    fn abort_tasks(&self) {
        for task in self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
        {
            task.abort();
        }
    }
}

/// Fetch a captured response's body and hand it to `capture`.
async fn read_body(page: &Page, capture: &ResponseCapture, id: RequestId, url: &str) {
    match page.execute(GetResponseBodyParams::new(id)).await {
        Ok(body) if !body.result.base64_encoded => {
            capture.record(url, &body.result.body);
        }
        Ok(_) => log::debug!("Skipping binary response from {}", url),
        Err(e) => log::debug!("Could not read response body of {}: {}", url, e),
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        // Browser's own drop kills the child process
        self.abort_tasks();
        self.handler.abort();
    }
}

#[async_trait]
impl PageContext for BrowserSession {
    async fn evaluate(&self, script: &str) -> Result<Value, ScrapeError> {
        let params = EvaluateParams::builder()
            .expression(script)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(ScrapeError::Evaluation)?;
        let result = self.page.evaluate_expression(params).await?;
        Ok(result.into_value::<Value>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::extract::scripts::selector_has_text_script;

    // Needs a local Chrome/Chromium.
    // Run with: cargo test -p mgm-weather -- --ignored
    #[tokio::test]
    #[ignore]
    async fn test_launch_evaluate_close() {
        let config = Config::default();
        let session = BrowserSession::launch(&config.browser).await.unwrap();
        let value = session.evaluate("({ sum: 1 + 2 })").await.unwrap();
        assert_eq!(value["sum"], 3);

        let ready = session
            .evaluate(&selector_has_text_script("body"))
            .await
            .unwrap();
        assert_eq!(ready, Value::Bool(false));
        session.close().await;
    }
}
