use clap::Parser;
use statewalk::CrawlerConfig;

#[derive(Parser, Debug)]
#[command(name = "statewalk")]
#[command(about = "Headless crawler that maps web applications as a graph of page states")]
#[command(version)]
pub struct Args {
    /// Seed URL to crawl
    pub url: String,

    /// WebDriver endpoint (e.g., ChromeDriver)
    #[arg(long, default_value = "http://localhost:4444")]
    pub webdriver_url: String,

    /// Maximum action depth from the initial page load (0 = unlimited)
    #[arg(short = 'd', long, default_value_t = 3)]
    pub max_depth: usize,

    /// Maximum crawl duration in seconds (0 = unlimited)
    #[arg(long, default_value_t = 600)]
    pub max_duration: u64,

    /// Number of concurrent browser sessions
    #[arg(short, long, default_value_t = 1)]
    pub browsers: usize,

    /// Allow crawling outside the seed URL's domain
    #[arg(long, default_value_t = false)]
    pub allow_external: bool,

    /// Regex patterns for URLs to include
    #[arg(long = "include")]
    pub include_patterns: Vec<String>,

    /// Regex patterns for URLs to exclude
    #[arg(long = "exclude")]
    pub exclude_patterns: Vec<String>,

    /// Write crawl diagnostics (DOM dumps, action log) to this directory
    #[arg(long)]
    pub diagnostics_dir: Option<String>,

    /// Write the crawl graph in DOT format to this file
    #[arg(long)]
    pub graph_out: Option<String>,
}

impl Args {
    /// Convert CLI arguments into a crawler configuration
    pub fn to_config(&self) -> CrawlerConfig {
        CrawlerConfig {
            webdriver_url: self.webdriver_url.clone(),
            max_depth: self.max_depth,
            max_crawl_duration_secs: self.max_duration,
            max_browsers: self.browsers,
            allow_external: self.allow_external,
            include_patterns: self.include_patterns.clone(),
            exclude_patterns: self.exclude_patterns.clone(),
            diagnostics_dir: self.diagnostics_dir.clone(),
            ..CrawlerConfig::default()
        }
    }
}
