//! Karaman weather API
//!
//! Scrapes current conditions and forecasts for Karaman from the MGM
//! (Turkish State Meteorological Service) website with headless Chrome and
//! serves them as JSON, cached for a few minutes.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod extract;
pub mod http_server;
pub mod renderer;
pub mod scraper;
pub mod service;
pub mod snapshot;
pub mod wait;

pub use cache::SnapshotCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ConfigError, Strategy};
pub use error::ScrapeError;
pub use http_server::{create_router, run_http_server};
pub use scraper::{BrowserScraper, WeatherSource};
pub use service::WeatherService;
pub use snapshot::{ExtractionMethod, RawExtraction, WeatherSnapshot};
