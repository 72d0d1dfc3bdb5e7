use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::errors::CrawlError;

/// Configuration for the state-graph crawler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// URL for the WebDriver instance
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// Maximum action depth from the blank root; actions discovered
    /// deeper than this are dropped
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Wall-clock budget for a whole crawl, in seconds (0 disables)
    #[serde(default = "default_max_crawl_duration_secs")]
    pub max_crawl_duration_secs: u64,

    /// Consecutive recoverable failures tolerated before the crawl is
    /// abandoned
    #[serde(default = "default_max_failure_count")]
    pub max_failure_count: usize,

    /// Maximum number of concurrent browser sessions
    #[serde(default = "default_max_browsers")]
    pub max_browsers: usize,

    /// Whether to allow crawling external domains/sites
    #[serde(default)]
    pub allow_external: bool,

    /// Regex patterns for URLs to include
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// Regex patterns for URLs to exclude
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Directory for crawl diagnostics; disabled when None
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics_dir: Option<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            max_depth: default_max_depth(),
            max_crawl_duration_secs: default_max_crawl_duration_secs(),
            max_failure_count: default_max_failure_count(),
            max_browsers: default_max_browsers(),
            allow_external: false,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            diagnostics_dir: None,
        }
    }
}

impl CrawlerConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CrawlError> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Self::from_json(&contents)
    }

    /// Parse configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self, CrawlError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Default value for webdriver_url
fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}

/// Default maximum action depth
fn default_max_depth() -> usize {
    3
}

/// Default crawl duration budget (10 minutes)
fn default_max_crawl_duration_secs() -> u64 {
    600
}

/// Default consecutive failure budget
fn default_max_failure_count() -> usize {
    10
}

/// Default number of concurrent browser sessions
fn default_max_browsers() -> usize {
    1
}
