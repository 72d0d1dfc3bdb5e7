//! Headless state-graph crawler.
//!
//! Pages are identified by a fingerprint of their normalized DOM rather
//! than by URL, so single-page applications with client-side state
//! changes are crawled as a graph of states connected by the actions
//! (loads, clicks, form fills) that transition between them.

pub mod browser;
pub mod config;
pub mod crawlers;
pub mod diagnostics;
pub mod discovery;
pub mod errors;
pub mod filter;
pub mod graph;
pub mod normalizer;
pub mod state;

// Re-export commonly used types for convenience
pub use config::CrawlerConfig;
pub use crawlers::Crawler;
pub use errors::CrawlError;
pub use graph::CrawlGraph;
pub use state::{Action, ActionKind, PageState};

use std::sync::Arc;

use tokio::sync::mpsc;
use url::Url;

use browser::pool::SessionPool;
use browser::webdriver::WebDriverFactory;
use crawlers::headless::ResultCallback;
use filter::{UrlFilter, UrlFilterConfig};

/// Builder for a crawl against a seed URL.
pub struct Crawl {
    url: String,
    config: CrawlerConfig,
    on_result: Option<ResultCallback>,
}

impl Crawl {
    /// Create a new crawl builder for the given seed URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            config: CrawlerConfig::default(),
            on_result: None,
        }
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: CrawlerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the WebDriver endpoint
    pub fn with_webdriver_url(mut self, url: impl Into<String>) -> Self {
        self.config.webdriver_url = url.into();
        self
    }

    /// Set the maximum action depth
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.config.max_depth = max_depth;
        self
    }

    /// Set the wall-clock crawl budget in seconds
    pub fn with_max_duration(mut self, seconds: u64) -> Self {
        self.config.max_crawl_duration_secs = seconds;
        self
    }

    /// Allow link targets outside the seed's domain
    pub fn with_allow_external(mut self, allow: bool) -> Self {
        self.config.allow_external = allow;
        self
    }

    /// Write crawl diagnostics under the given directory
    pub fn with_diagnostics_dir(mut self, directory: impl Into<String>) -> Self {
        self.config.diagnostics_dir = Some(directory.into());
        self
    }

    /// Observe every newly discovered page state
    pub fn with_on_result(mut self, callback: ResultCallback) -> Self {
        self.on_result = Some(callback);
        self
    }

    /// Run the crawl to completion and return the resulting state graph
    pub async fn run(self) -> Result<CrawlGraph, CrawlError> {
        let seed = Url::parse(&self.url)?;

        // Override the WebDriver URL with an environment variable if provided
        let mut config = self.config;
        if let Ok(webdriver_url) = std::env::var("WEBDRIVER_URL") {
            if !webdriver_url.is_empty() {
                config.webdriver_url = webdriver_url;
            }
        }

        let mut filter_config = UrlFilterConfig::for_seed(&seed, config.allow_external);
        filter_config
            .include_patterns
            .extend(config.include_patterns.iter().cloned());
        filter_config
            .exclude_patterns
            .extend(config.exclude_patterns.iter().cloned());
        let scope = UrlFilter::new(filter_config)?.as_validator();

        let factory = WebDriverFactory::new(&config.webdriver_url);
        let pool = Arc::new(SessionPool::new(Box::new(factory), config.max_browsers));

        let mut crawler = Crawler::new(&config, Arc::clone(&pool), scope)?;
        if let Some(callback) = self.on_result {
            crawler = crawler.with_on_result(callback);
        }

        let outcome = crawler.crawl(&self.url).await;
        pool.close().await;
        outcome?;

        Ok(crawler.into_graph())
    }

    /// Start the crawl in the background and get a receiver for page
    /// states as they are discovered
    pub fn generate(mut self) -> mpsc::UnboundedReceiver<PageState> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.on_result = Some(Box::new(move |state: &PageState| {
            let _ = sender.send(state.clone());
        }));

        tokio::spawn(async move {
            if let Err(err) = self.run().await {
                ::log::error!("Crawl failed: {err}");
            }
        });
        receiver
    }
}
