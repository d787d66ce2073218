//! Karaman weather API server
//!
//! Serves MGM weather data for Karaman over HTTP, scraping the site with
//! headless Chrome at most once per cache period.

use argh::FromArgs;
use mgm_weather::{run_http_server, BrowserScraper, Config, SystemClock, WeatherService};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(FromArgs)]
/// Karaman weather API - MGM data as JSON
struct Args {
    /// path to the YAML configuration file (optional, uses defaults)
    #[argh(option, short = 'c')]
    config: Option<String>,

    /// port to listen on (overrides config and PORT)
    #[argh(option, short = 'p')]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // .env is optional
    let dotenv = dotenvy::dotenv();

    // Initialize logging
    let env = env_logger::Env::default().default_filter_or("info");
    env_logger::init_from_env(env);

    match dotenv {
        Ok(path) => log::debug!("Loaded environment from {}", path.display()),
        Err(e) => log::debug!("No .env loaded: {}", e),
    }

    let args: Args = argh::from_env();

    // Load configuration (or use defaults)
    let mut config = if let Some(config_path) = &args.config {
        match Config::from_file(config_path) {
            Ok(c) => c,
            Err(e) => {
                log::error!("Failed to load config from '{}': {}", config_path, e);
                std::process::exit(1);
            }
        }
    } else {
        log::info!("No config file specified, using defaults");
        Config::default()
    };
    config.apply_env()?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.validate()?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| format!("invalid listen address '{}': {}", config.server.host, e))?;

    log::info!("Source page: {}", config.source.url);
    log::info!(
        "Extraction strategy: {}, cache TTL: {}s, navigation timeout: {}s",
        config.extraction.strategy.as_str(),
        config.cache.ttl_secs,
        config.navigation_timeout().as_secs()
    );
    if config.browser.serverless {
        log::info!("Serverless mode enabled");
    }

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    // Set up Ctrl+C handler
    ctrlc::set_handler({
        let shutdown_tx = shutdown_tx.clone();
        move || {
            log::info!("Received Ctrl+C, shutting down gracefully...");
            shutdown_tx.send(()).ok();
        }
    })?;

    let ttl = config.cache_ttl();
    let config = Arc::new(config);
    let scraper = Arc::new(BrowserScraper::new(config));
    let service = Arc::new(WeatherService::new(scraper, Arc::new(SystemClock), ttl));

    log::info!("Karaman weather API running. Press Ctrl+C to exit.");
    log::info!("  GET /api/weather");

    run_http_server(service, addr, shutdown_rx).await?;

    log::info!("Karaman weather API stopped.");

    Ok(())
}
