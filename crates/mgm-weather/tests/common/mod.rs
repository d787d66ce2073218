//! Test helpers for HTTP API integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use mgm_weather::{
    create_router, ManualClock, RawExtraction, ScrapeError, WeatherService, WeatherSource,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

pub const TTL: Duration = Duration::from_secs(300);

/// Weather source that replays scripted results, then repeats the last one.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<RawExtraction, String>>>,
    last: Mutex<Option<Result<RawExtraction, String>>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<RawExtraction, String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Every fetch takes `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WeatherSource for ScriptedSource {
    async fn fetch(&self) -> Result<RawExtraction, ScrapeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        let result = match next {
            Some(result) => {
                *self.last.lock().unwrap() = Some(result.clone());
                result
            }
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .expect("scripted source has no results"),
        };
        result.map_err(ScrapeError::Navigation)
    }
}

/// A running API server backed by a scripted source and a manual clock.
pub struct TestServer {
    pub base_url: String,
    pub source: Arc<ScriptedSource>,
    pub clock: Arc<ManualClock>,
    pub client: reqwest::Client,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(source: ScriptedSource) -> Self {
        let source = Arc::new(source);
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
        ));
        let service = Arc::new(WeatherService::new(source.clone(), clock.clone(), TTL));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, create_router(service)).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            source,
            clock,
            client: reqwest::Client::new(),
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("Request failed")
    }

    pub fn advance(&self, by: Duration) {
        self.clock
            .advance(chrono::Duration::from_std(by).unwrap());
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
