use std::time::Duration;

use async_trait::async_trait;
use fantoccini::{Client, ClientBuilder, Locator};

use crate::browser::pool::PageFactory;
use crate::browser::{
    BrowserPage, ClickOutcome, HistoryEntry, LocatedElement, NavigationHistory, PageInfo,
};
use crate::errors::CrawlError;
use crate::state::{EventListener, HtmlElement};

/// Controls how `wait_page_load` decides that navigation completed.
/// All durations are conservative defaults measured on SPA-heavy pages.
#[derive(Debug, Clone)]
pub struct WaitOptions {
    /// Interval between successive URL polls.
    pub url_poll_interval: Duration,
    /// How long to keep polling before giving up on a URL change.
    pub url_poll_timeout: Duration,
    /// Grace period after a URL change for late requests.
    pub post_change_wait: Duration,
    /// Settle window when no URL change happened.
    pub idle_wait: Duration,
    /// DOM-stable window: the page source must stop changing for this long.
    pub dom_stable_wait: Duration,
    /// Absolute upper bound for all waiting.
    pub max_timeout: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            url_poll_interval: Duration::from_millis(100),
            url_poll_timeout: Duration::from_secs(2),
            post_change_wait: Duration::from_millis(300),
            idle_wait: Duration::from_secs(1),
            dom_stable_wait: Duration::from_secs(1),
            max_timeout: Duration::from_secs(15),
        }
    }
}

/// Script injected after every load. It patches `addEventListener` so
/// listeners attached after injection are recorded (covers SPA
/// re-renders), and exposes a collector that also walks inline `on*`
/// attributes. Listeners attached before injection cannot be observed
/// over WebDriver; discovery independently reads inline attributes from
/// the static markup so the common case does not depend on this script.
const LISTENER_INSTRUMENTATION_JS: &str = r#"
if (!window.__statewalkPatched) {
    window.__statewalkPatched = true;
    window.__statewalkListeners = [];
    const original = EventTarget.prototype.addEventListener;
    EventTarget.prototype.addEventListener = function (type, listener, options) {
        try {
            if (this instanceof Element) {
                window.__statewalkListeners.push({ element: this, type: type });
            }
        } catch (e) {}
        return original.call(this, type, listener, options);
    };
}
function __statewalkXPath(el) {
    const segments = [];
    while (el && el.nodeType === 1) {
        let index = 1;
        let sibling = el.previousElementSibling;
        while (sibling) {
            if (sibling.tagName === el.tagName) { index += 1; }
            sibling = sibling.previousElementSibling;
        }
        segments.unshift(el.tagName.toLowerCase() + '[' + index + ']');
        el = el.parentElement;
    }
    return '/' + segments.join('/');
}
function __statewalkDescribe(el) {
    const attributes = {};
    for (const name of el.getAttributeNames()) {
        attributes[name] = el.getAttribute(name) || '';
    }
    return {
        tag_name: el.tagName.toLowerCase(),
        id: el.id || '',
        classes: el.className && el.className.split ? el.className : '',
        attributes: attributes,
        element_type: el.getAttribute('type') || '',
        text_content: (el.textContent || '').trim(),
        xpath: __statewalkXPath(el)
    };
}
const collected = [];
for (const entry of (window.__statewalkListeners || [])) {
    if (entry.element && entry.element.isConnected) {
        collected.push({ element: __statewalkDescribe(entry.element), listener_type: entry.type });
    }
}
const all = document.querySelectorAll('*');
for (const el of all) {
    for (const name of el.getAttributeNames()) {
        if (name.startsWith('on')) {
            collected.push({ element: __statewalkDescribe(el), listener_type: name.slice(2) });
        }
    }
}
return collected;
"#;

/// A live page driven over the WebDriver protocol via fantoccini.
///
/// WebDriver exposes no session-history listing, so the page records its
/// own ordered history of {URL, title} entries as it navigates.
pub struct WebDriverPage {
    client: Client,
    entries: Vec<HistoryEntry>,
    current_index: usize,
    wait_options: WaitOptions,
    connected: bool,
}

impl WebDriverPage {
    pub fn new(client: Client, wait_options: WaitOptions) -> Self {
        Self {
            client,
            entries: Vec::new(),
            current_index: 0,
            wait_options,
            connected: true,
        }
    }

    /// Marks the session dead when a command failed because the session
    /// itself is gone, so the pool discards this page.
    fn classify(&mut self, err: fantoccini::error::CmdError) -> CrawlError {
        let message = err.to_string();
        if message.contains("Unable to find session") || message.contains("invalid session") {
            ::log::warn!("WebDriver session lost: {message}");
            self.connected = false;
        }
        CrawlError::Browser(err)
    }

    async fn current_location(&mut self) -> Result<HistoryEntry, CrawlError> {
        let url = self
            .client
            .current_url()
            .await
            .map_err(|e| self.classify(e))?;
        let title = self
            .client
            .execute("return document.title;", vec![])
            .await
            .map_err(|e| self.classify(e))?
            .as_str()
            .unwrap_or_default()
            .to_string();
        Ok(HistoryEntry {
            url: url.to_string(),
            title,
        })
    }

    /// Appends the current location to the recorded history unless it is
    /// already the current entry (e.g. after a back navigation or an
    /// in-place SPA update that kept the URL).
    async fn record_location(&mut self) -> Result<(), CrawlError> {
        let location = self.current_location().await?;
        if let Some(current) = self.entries.get(self.current_index) {
            if current.url == location.url {
                return Ok(());
            }
        }
        if !self.entries.is_empty() {
            self.entries.truncate(self.current_index + 1);
        }
        self.entries.push(location);
        self.current_index = self.entries.len() - 1;
        Ok(())
    }

    async fn eval(&mut self, script: &str) -> Result<serde_json::Value, CrawlError> {
        self.client
            .execute(script, vec![])
            .await
            .map_err(|e| self.classify(e))
    }
}

#[async_trait]
impl BrowserPage for WebDriverPage {
    async fn navigate(&mut self, url: &str) -> Result<(), CrawlError> {
        self.client
            .goto(url)
            .await
            .map_err(|e| match self.classify(e) {
                CrawlError::Browser(inner) => CrawlError::Navigation(inner.to_string()),
                other => other,
            })
    }

    async fn wait_page_load(&mut self) -> Result<(), CrawlError> {
        let opts = self.wait_options.clone();
        let deadline = tokio::time::Instant::now() + opts.max_timeout;

        // 1. Wait for the basic load event.
        loop {
            let ready = self.eval("return document.readyState;").await?;
            if ready.as_str() == Some("complete") || tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(opts.url_poll_interval).await;
        }

        // 2. Poll for a URL change, the strongest signal on client-side
        // routed SPAs.
        let start_url = self
            .eval("return window.location.href;")
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string();
        let mut url_changed = false;
        if !start_url.is_empty() {
            let poll_deadline = tokio::time::Instant::now() + opts.url_poll_timeout;
            while tokio::time::Instant::now() < poll_deadline {
                tokio::time::sleep(opts.url_poll_interval).await;
                let current = self.eval("return window.location.href;").await?;
                if current.as_str().unwrap_or_default() != start_url {
                    url_changed = true;
                    break;
                }
            }
        }

        if url_changed {
            // 3a. URL changed: short grace period for late requests.
            tokio::time::sleep(opts.post_change_wait).await;
        } else {
            // 3b. No URL change: settle wait plus a DOM-stable window.
            tokio::time::sleep(opts.idle_wait).await;
            let before = self.client.source().await.map_err(|e| self.classify(e))?;
            tokio::time::sleep(opts.dom_stable_wait).await;
            let after = self.client.source().await.map_err(|e| self.classify(e))?;
            if before.len() != after.len() {
                tokio::time::sleep(opts.dom_stable_wait).await;
            }
        }

        self.record_location().await
    }

    async fn info(&mut self) -> Result<PageInfo, CrawlError> {
        let location = self.current_location().await?;
        Ok(PageInfo {
            url: location.url,
            title: location.title,
        })
    }

    async fn html(&mut self) -> Result<String, CrawlError> {
        self.client.source().await.map_err(|e| self.classify(e))
    }

    async fn find_element(&mut self, xpath: &str) -> Result<Option<LocatedElement>, CrawlError> {
        let element = match self.client.find(Locator::XPath(xpath)).await {
            Ok(element) => element,
            Err(err) if err.is_no_such_element() => return Ok(None),
            Err(err) => return Err(self.classify(err)),
        };
        let visible = element.is_displayed().await.unwrap_or(false);
        let id = element.attr("id").await.unwrap_or(None).unwrap_or_default();
        let classes = element
            .attr("class")
            .await
            .unwrap_or(None)
            .unwrap_or_default();
        let text_content = element.text().await.unwrap_or_default();
        Ok(Some(LocatedElement {
            visible,
            id,
            classes,
            text_content,
        }))
    }

    async fn click(&mut self, xpath: &str) -> Result<ClickOutcome, CrawlError> {
        let element = match self.client.find(Locator::XPath(xpath)).await {
            Ok(element) => element,
            Err(err) if err.is_no_such_element() => {
                return Err(CrawlError::ElementNotFound(xpath.to_string()));
            }
            Err(err) => return Err(self.classify(err)),
        };
        if !element.is_displayed().await.unwrap_or(false) {
            return Ok(ClickOutcome::NotInteractable);
        }
        match element.click().await {
            Ok(()) => Ok(ClickOutcome::Clicked),
            Err(err) => {
                let message = err.to_string();
                // Covered or pointer-events:none targets are a no-op.
                if message.contains("not interactable") || message.contains("intercepted") {
                    Ok(ClickOutcome::NotInteractable)
                } else {
                    Err(self.classify(err))
                }
            }
        }
    }

    async fn fill(&mut self, xpath: &str, value: &str) -> Result<(), CrawlError> {
        let element = match self.client.find(Locator::XPath(xpath)).await {
            Ok(element) => element,
            Err(err) if err.is_no_such_element() => {
                return Err(CrawlError::ElementNotFound(xpath.to_string()));
            }
            Err(err) => return Err(self.classify(err)),
        };
        element.send_keys(value).await.map_err(|e| self.classify(e))
    }

    async fn event_listeners(&mut self) -> Result<Vec<EventListener>, CrawlError> {
        let collected = self.eval(LISTENER_INSTRUMENTATION_JS).await?;
        let raw: Vec<RawListener> = serde_json::from_value(collected)?;
        Ok(raw
            .into_iter()
            .map(|entry| EventListener {
                element: entry.element,
                listener_type: entry.listener_type,
            })
            .collect())
    }

    async fn history(&mut self) -> Result<NavigationHistory, CrawlError> {
        Ok(NavigationHistory {
            entries: self.entries.clone(),
            current_index: self.current_index,
        })
    }

    async fn back(&mut self) -> Result<(), CrawlError> {
        self.client.back().await.map_err(|e| self.classify(e))?;
        self.current_index = self.current_index.saturating_sub(1);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn close(&mut self) {
        if let Err(err) = self.client.clone().close().await {
            ::log::warn!("Failed to close WebDriver client: {err}");
        }
        self.connected = false;
    }
}

#[derive(serde::Deserialize)]
struct RawListener {
    element: HtmlElement,
    listener_type: String,
}

/// Connects new WebDriver sessions for the pool, trying the configured
/// endpoint first and then a list of common fallbacks.
pub struct WebDriverFactory {
    webdriver_url: String,
    wait_options: WaitOptions,
}

impl WebDriverFactory {
    pub fn new(webdriver_url: impl Into<String>) -> Self {
        Self {
            webdriver_url: webdriver_url.into(),
            wait_options: WaitOptions::default(),
        }
    }

    pub fn with_wait_options(mut self, wait_options: WaitOptions) -> Self {
        self.wait_options = wait_options;
        self
    }

    async fn connect(&self) -> Result<Client, CrawlError> {
        match ClientBuilder::native().connect(&self.webdriver_url).await {
            Ok(client) => {
                ::log::debug!("Connected to WebDriver at {}", self.webdriver_url);
                return Ok(client);
            }
            Err(err) => {
                ::log::error!(
                    "Failed to connect to WebDriver at {}: {}",
                    self.webdriver_url,
                    err
                );
            }
        }

        let fallback_urls = [
            "http://localhost:9515", // ChromeDriver default
            "http://localhost:4444", // Selenium / geckodriver default
            "http://127.0.0.1:4444", // IP instead of localhost
        ];
        for url in fallback_urls {
            if url == self.webdriver_url {
                continue;
            }
            ::log::info!("Trying fallback WebDriver URL: {url}");
            if let Ok(client) = ClientBuilder::native().connect(url).await {
                ::log::debug!("Connected to fallback WebDriver at {url}");
                return Ok(client);
            }
        }

        Err(CrawlError::Connect(format!(
            "no WebDriver server reachable (tried {} and fallbacks)",
            self.webdriver_url
        )))
    }
}

#[async_trait]
impl PageFactory for WebDriverFactory {
    async fn create(&self) -> Result<Box<dyn BrowserPage>, CrawlError> {
        let client = self.connect().await?;
        Ok(Box::new(WebDriverPage::new(
            client,
            self.wait_options.clone(),
        )))
    }
}
