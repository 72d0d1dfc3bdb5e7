use thiserror::Error;

/// Errors produced while driving a crawl.
///
/// The engine distinguishes recoverable errors (the current action is
/// abandoned, the loop continues) from loop-fatal ones (the crawl
/// terminates and the error is reported to the caller).
#[derive(Debug, Error)]
pub enum CrawlError {
    /// The target element exists but is not visible or interactable.
    #[error("element not visible")]
    ElementNotVisible,

    /// The target element could not be located on the page.
    #[error("element not found: {0}")]
    ElementNotFound(String),

    /// All backtracking tiers failed to reach the action's origin state.
    #[error("no navigation possible")]
    NoNavigationPossible,

    /// Landed on a state whose fingerprint does not match the expected origin.
    #[error("failed to navigate back to origin page")]
    OriginMismatch,

    /// The page has no content loaded (about:blank or empty URL).
    #[error("page is empty")]
    EmptyPage,

    /// No page state with this fingerprint exists in the crawl graph.
    #[error("page state not found: {0}")]
    StateNotFound(String),

    /// The graph holds both states but no path connects them.
    #[error("target state not reachable: {0}")]
    TargetNotReachable(String),

    /// The engine was asked to execute an action kind it cannot dispatch.
    #[error("unsupported action kind: {0}")]
    UnsupportedAction(String),

    /// A navigation or page-load wait failed.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// Could not establish a WebDriver session for the pool.
    #[error("could not connect to webdriver: {0}")]
    Connect(String),

    #[error("webdriver command failed: {0}")]
    Browser(#[from] fantoccini::error::CmdError),

    #[error("invalid regex pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl CrawlError {
    /// Whether the error only invalidates the current action.
    ///
    /// Recoverable errors are logged at debug level and the loop moves on
    /// to the next queued action; everything else terminates the crawl.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CrawlError::ElementNotVisible
                | CrawlError::ElementNotFound(_)
                | CrawlError::NoNavigationPossible
                | CrawlError::OriginMismatch
                | CrawlError::Navigation(_)
                | CrawlError::TargetNotReachable(_)
        )
    }
}
