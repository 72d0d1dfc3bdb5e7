pub mod pool;
pub mod webdriver;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::CrawlError;
use crate::state::EventListener;

/// URL and title of the currently rendered page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageInfo {
    pub url: String,
    pub title: String,
}

/// One entry of the session's navigation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub url: String,
    pub title: String,
}

/// Ordered navigation history with the index of the current entry.
#[derive(Debug, Clone, Default)]
pub struct NavigationHistory {
    pub entries: Vec<HistoryEntry>,
    pub current_index: usize,
}

/// A previously recorded element re-located on the live page.
#[derive(Debug, Clone, Default)]
pub struct LocatedElement {
    pub visible: bool,
    pub id: String,
    pub classes: String,
    pub text_content: String,
}

/// Result of dispatching a click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    Clicked,
    /// The element takes no pointer events or is covered; treated as a
    /// no-op rather than an error.
    NotInteractable,
}

/// Minimal capability interface over a live browser page.
///
/// The navigation engine, graph and discovery logic depend only on this
/// trait, never on a concrete automation protocol.
#[async_trait]
pub trait BrowserPage: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), CrawlError>;

    /// Waits for the page to settle using the composite load heuristics.
    async fn wait_page_load(&mut self) -> Result<(), CrawlError>;

    async fn info(&mut self) -> Result<PageInfo, CrawlError>;

    async fn html(&mut self) -> Result<String, CrawlError>;

    /// Locates an element by its structural locator. `Ok(None)` means the
    /// element is not present on the current page.
    async fn find_element(&mut self, xpath: &str) -> Result<Option<LocatedElement>, CrawlError>;

    async fn click(&mut self, xpath: &str) -> Result<ClickOutcome, CrawlError>;

    /// Types a value into the element at `xpath`.
    async fn fill(&mut self, xpath: &str, value: &str) -> Result<(), CrawlError>;

    /// Event listeners observed on the live page that cannot be read from
    /// the static markup.
    async fn event_listeners(&mut self) -> Result<Vec<EventListener>, CrawlError>;

    async fn history(&mut self) -> Result<NavigationHistory, CrawlError>;

    /// Moves one step back in the session history.
    async fn back(&mut self) -> Result<(), CrawlError>;

    /// Whether the underlying session is still usable. Disconnected pages
    /// are discarded by the pool instead of recycled.
    fn is_connected(&self) -> bool;

    async fn close(&mut self);
}
