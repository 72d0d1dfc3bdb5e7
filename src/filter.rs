use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

/// Callback deciding whether a discovered link target is in crawl scope.
/// Shared by the navigation engine and the action discoverer.
pub type ScopeValidator = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Configuration for URL scope filtering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlFilterConfig {
    /// Whether to allow crawling external domains/sites
    #[serde(default = "default_allow_external")]
    pub allow_external: bool,

    /// Domain restriction for crawling (if None, all domains are allowed if allow_external is true)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_domain: Option<String>,

    /// Path prefix restriction (if None, all paths are allowed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_path_prefix: Option<String>,

    /// Regex patterns for URLs to include (if empty, all URLs are included unless excluded)
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// Regex patterns for URLs to exclude (these take precedence over include patterns)
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

/// Default value for allow_external field (false for safety)
fn default_allow_external() -> bool {
    false
}

impl Default for UrlFilterConfig {
    fn default() -> Self {
        Self {
            allow_external: false,
            required_domain: None,
            required_path_prefix: None,
            include_patterns: Vec::new(),
            exclude_patterns: vec![
                // Static assets carry no application state
                r"\.(jpg|jpeg|png|gif|css|js|ico|svg|woff|woff2|ttf|eot|pdf)$".to_string(),
            ],
        }
    }
}

impl UrlFilterConfig {
    /// Scope config anchored on the host of the seed URL: same-domain
    /// crawling unless `allow_external` is set.
    pub fn for_seed(seed: &Url, allow_external: bool) -> Self {
        Self {
            allow_external,
            required_domain: if allow_external {
                None
            } else {
                seed.domain().map(str::to_string)
            },
            ..Self::default()
        }
    }
}

/// URL filter that uses regex patterns and domain rules to determine
/// which link targets stay in crawl scope
#[derive(Debug)]
pub struct UrlFilter {
    config: UrlFilterConfig,
    include_regexes: Vec<Regex>,
    exclude_regexes: Vec<Regex>,
}

impl Default for UrlFilter {
    fn default() -> Self {
        Self::new(UrlFilterConfig::default()).expect("Default regex patterns should be valid")
    }
}

impl UrlFilter {
    /// Create a new URL filter from configuration
    pub fn new(config: UrlFilterConfig) -> Result<Self, regex::Error> {
        // Compile regex patterns
        let mut include_regexes = Vec::with_capacity(config.include_patterns.len());
        for pattern in &config.include_patterns {
            include_regexes.push(Regex::new(pattern)?);
        }

        let mut exclude_regexes = Vec::with_capacity(config.exclude_patterns.len());
        for pattern in &config.exclude_patterns {
            exclude_regexes.push(Regex::new(pattern)?);
        }

        Ok(Self {
            config,
            include_regexes,
            exclude_regexes,
        })
    }

    /// Determine if a URL should be crawled based on all filtering rules
    pub fn should_crawl(&self, url: &Url) -> bool {
        // Check domain restrictions
        if !self.is_in_domain_scope(url) {
            return false;
        }

        // Check path prefix
        if !self.is_in_path_scope(url) {
            return false;
        }

        // Check regex exclusions (these take precedence)
        let url_str = url.as_str();
        for regex in &self.exclude_regexes {
            if regex.is_match(url_str) {
                return false;
            }
        }

        // If include patterns are specified, at least one must match
        if !self.include_regexes.is_empty() {
            let mut included = false;
            for regex in &self.include_regexes {
                if regex.is_match(url_str) {
                    included = true;
                    break;
                }
            }
            if !included {
                return false;
            }
        }

        // If we've reached here, the URL passed all filters
        true
    }

    /// Check if a URL is within the allowed domain scope
    fn is_in_domain_scope(&self, url: &Url) -> bool {
        // If external domains are allowed and no specific domain is required, all domains are allowed
        if self.config.allow_external && self.config.required_domain.is_none() {
            return true;
        }

        // Otherwise, check if the domain matches the required domain
        if let Some(required_domain) = &self.config.required_domain {
            if let Some(url_domain) = url.domain() {
                return url_domain == required_domain;
            }
            return false; // No domain in URL but domain required
        }

        // If we get here, allow_external is false and no required_domain
        // In this case, we should reject all external domains
        false
    }

    /// Check if a URL is within the required path scope
    fn is_in_path_scope(&self, url: &Url) -> bool {
        if let Some(prefix) = &self.config.required_path_prefix {
            url.path().starts_with(prefix)
        } else {
            true // No path restriction
        }
    }

    /// Wraps the filter as the callback shape the discoverer consumes.
    /// Unparseable URLs are out of scope.
    pub fn as_validator(self) -> ScopeValidator {
        Arc::new(move |raw: &str| match Url::parse(raw) {
            Ok(url) => self.should_crawl(&url),
            Err(_) => false,
        })
    }
}
