//! The fetch pipeline: render the MGM page, then extract from it.

use crate::config::Config;
use crate::error::ScrapeError;
use crate::extract::Extractor;
use crate::renderer::BrowserSession;
use crate::snapshot::RawExtraction;
use async_trait::async_trait;
use std::sync::Arc;

/// Something that can produce fresh weather data.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn fetch(&self) -> Result<RawExtraction, ScrapeError>;
}

/// Scrapes MGM with a fresh headless Chrome per fetch.
pub struct BrowserScraper {
    config: Arc<Config>,
    extractor: Extractor,
}

impl BrowserScraper {
    pub fn new(config: Arc<Config>) -> Self {
        let extractor = Extractor::new(&config.extraction, &config.source);
        Self { config, extractor }
    }

    async fn scrape(&self, session: &BrowserSession) -> Result<RawExtraction, ScrapeError> {
        let capture = self.extractor.new_capture().map(Arc::new);
        if let Some(capture) = &capture {
            session.capture_responses(capture.clone()).await?;
        }

        session
            .navigate(
                &self.config.source.url,
                &self.config.navigation,
                self.config.navigation_timeout(),
            )
            .await?;
        session.settle(&self.config.navigation).await;

        log::info!(
            "Parsing page content ({} strategy)...",
            self.extractor.strategy().as_str()
        );
        self.extractor.extract(session, capture.as_deref()).await
    }
}

#[async_trait]
impl WeatherSource for BrowserScraper {
    async fn fetch(&self) -> Result<RawExtraction, ScrapeError> {
        log::info!("Launching headless browser...");
        let session = BrowserSession::launch(&self.config.browser).await?;

        let result = self.scrape(&session).await;
        session.close().await;

        if let Err(e) = &result {
            log::error!("Scrape failed: {}", e);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::ExtractionMethod;

    // Hits the live MGM site with a local Chrome.
    // Run with: cargo test -p mgm-weather -- --ignored
    #[tokio::test]
    #[ignore]
    async fn test_live_scrape() {
        let scraper = BrowserScraper::new(Arc::new(Config::default()));
        let raw = scraper.fetch().await.unwrap();
        assert!(raw.method.is_some());
        assert_ne!(raw.method, Some(ExtractionMethod::Unknown));
    }
}
