use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::browser::{BrowserPage, ClickOutcome, pool::SessionPool};
use crate::config::CrawlerConfig;
use crate::crawlers::backtrack;
use crate::diagnostics::{DiagnosticsWriter, DiskWriter, NoopWriter, PageStatePhase};
use crate::discovery;
use crate::errors::CrawlError;
use crate::filter::ScopeValidator;
use crate::graph::CrawlGraph;
use crate::normalizer::{Normalizer, empty_page_hash, fingerprint};
use crate::state::{Action, ActionKind, InteractionKind, PageState};

/// Values typed into form fields during a fill action, keyed by the
/// input's `type` attribute.
const FORM_FILLING_DATA: &[(&str, &str)] = &[
    ("text", "test"),
    ("number", "5"),
    ("password", "test"),
    ("email", "test@test.com"),
];

/// Observer invoked once for every newly discovered page state.
pub type ResultCallback = Box<dyn Fn(&PageState) + Send + Sync>;

/// Engine limits, derived from [`CrawlerConfig`].
#[derive(Debug, Clone)]
pub struct CrawlerOptions {
    /// Actions deeper than this are dropped from the queue (0 disables).
    pub max_depth: usize,
    /// Wall-clock budget for the whole crawl (None disables).
    pub max_crawl_duration: Option<Duration>,
    /// Consecutive recoverable failures tolerated before giving up
    /// (0 disables).
    pub max_failure_count: usize,
}

impl From<&CrawlerConfig> for CrawlerOptions {
    fn from(config: &CrawlerConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            max_crawl_duration: match config.max_crawl_duration_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            max_failure_count: config.max_failure_count,
        }
    }
}

/// State-graph crawler.
///
/// Drains a queue of actions against pooled browser sessions, verifying
/// before each action that the browser is in the action's origin state
/// (backtracking when it is not), fingerprinting the resulting page and
/// recording states and transitions in the crawl graph.
pub struct Crawler {
    options: CrawlerOptions,
    queue: VecDeque<Action>,
    graph: CrawlGraph,
    unique_actions: HashSet<String>,
    pool: Arc<SessionPool>,
    normalizer: Normalizer,
    scope: ScopeValidator,
    diagnostics: Box<dyn DiagnosticsWriter>,
    on_result: Option<ResultCallback>,
}

impl Crawler {
    pub fn new(
        config: &CrawlerConfig,
        pool: Arc<SessionPool>,
        scope: ScopeValidator,
    ) -> Result<Self, CrawlError> {
        let diagnostics: Box<dyn DiagnosticsWriter> = match &config.diagnostics_dir {
            Some(directory) => {
                ::log::info!("Diagnostics enabled, writing to {directory}");
                Box::new(DiskWriter::new(directory)?)
            }
            None => Box::new(NoopWriter),
        };

        Ok(Self {
            options: CrawlerOptions::from(config),
            queue: VecDeque::new(),
            graph: CrawlGraph::new(),
            unique_actions: HashSet::new(),
            pool,
            normalizer: Normalizer::new()?,
            scope,
            diagnostics,
            on_result: None,
        })
    }

    /// Registers a callback fired for every newly discovered page state.
    pub fn with_on_result(mut self, callback: ResultCallback) -> Self {
        self.on_result = Some(callback);
        self
    }

    /// Replaces the diagnostics sink.
    pub fn with_diagnostics(mut self, diagnostics: Box<dyn DiagnosticsWriter>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn graph(&self) -> &CrawlGraph {
        &self.graph
    }

    pub fn into_graph(self) -> CrawlGraph {
        self.graph
    }

    /// Runs a full crawl starting from `url`. Returns once the queue is
    /// exhausted, a budget is hit, or a loop-fatal error occurs.
    pub async fn crawl(&mut self, url: &str) -> Result<(), CrawlError> {
        let result = self.crawl_loop(url).await;
        if let Err(err) = self.diagnostics.close() {
            ::log::warn!("Failed to flush diagnostics: {err}");
        }
        result
    }

    async fn crawl_loop(&mut self, url: &str) -> Result<(), CrawlError> {
        self.graph
            .add_page_state(PageState::blank_root(empty_page_hash()))?;
        self.queue
            .push_back(Action::load_url(url, empty_page_hash(), 0));

        let deadline = self
            .options
            .max_crawl_duration
            .map(|duration| Instant::now() + duration);
        let mut consecutive_failures = 0usize;

        loop {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    ::log::debug!("Max crawl duration reached, stopping crawl");
                    return Ok(());
                }
            }
            if self.options.max_failure_count > 0
                && consecutive_failures >= self.options.max_failure_count
            {
                ::log::warn!(
                    "Too many consecutive failures ({consecutive_failures}), stopping crawl"
                );
                return Ok(());
            }

            let Some(action) = self.queue.pop_front() else {
                ::log::debug!("No more actions to process");
                return Ok(());
            };
            if self.options.max_depth > 0 && action.depth > self.options.max_depth {
                continue;
            }

            ::log::debug!("Processing action: {action}");

            let pool = Arc::clone(&self.pool);
            let mut page = pool.acquire().await?;
            let step = self.crawl_step(&action, page.as_mut()).await;
            pool.release(page).await;

            match step {
                Ok(()) => consecutive_failures = 0,
                Err(err) if err.is_recoverable() => {
                    ::log::debug!("Skipping action ({err}): {action}");
                    consecutive_failures += 1;
                }
                Err(err) => {
                    ::log::error!("Error processing action {action}: {err}");
                    return Err(err);
                }
            }
        }
    }

    /// Executes one queued action on `page` and folds the outcome into
    /// the graph and the queue.
    async fn crawl_step(
        &mut self,
        action: &Action,
        page: &mut dyn BrowserPage,
    ) -> Result<(), CrawlError> {
        let mut current_hash = page_hash(page, &self.normalizer).await?;

        if !action.origin_id.is_empty() && action.origin_id != current_hash {
            ::log::debug!(
                "Need to navigate back to origin (from {current_hash} to {})",
                action.origin_id
            );
            current_hash = backtrack::navigate_back_to_origin(
                &self.graph,
                &self.normalizer,
                action,
                page,
                &current_hash,
            )
            .await?;
        }

        // Diagnostics are observational only; a failing sink never stops
        // the crawl.
        if let Err(err) = self.diagnostics.log_action(action) {
            ::log::warn!("Failed to log action: {err}");
        }
        execute_action(action, page).await?;

        let mut state = new_page_state(page, Some(action), &self.normalizer).await?;
        if let Err(err) = self
            .diagnostics
            .log_page_state(&state, PageStatePhase::PostAction)
        {
            ::log::warn!("Failed to log page state: {err}");
        }
        state.origin_id = current_hash;

        let navigations =
            discovery::find_navigations(page, &self.scope, &mut self.unique_actions).await?;
        if let Err(err) = self.diagnostics.log_navigations(&state.unique_id, &navigations) {
            ::log::warn!("Failed to log navigations: {err}");
        }

        for mut navigation in navigations {
            navigation.origin_id = state.unique_id.clone();
            navigation.depth = state.depth;
            ::log::debug!("Got new navigation: {navigation}");
            self.queue.push_back(navigation);
        }

        let is_new_state = !self.graph.contains(&state.unique_id);
        self.graph.add_page_state(state.clone())?;
        if is_new_state {
            if let Some(callback) = &self.on_result {
                callback(&state);
            }
        }

        if self.queue.is_empty() {
            ::log::debug!("No new navigations discovered and queue is empty");
        }
        Ok(())
    }
}

/// Fingerprint of the page currently rendered in the browser. A blank
/// page hashes to the empty-page sentinel rather than erroring.
pub(crate) async fn page_hash(
    page: &mut dyn BrowserPage,
    normalizer: &Normalizer,
) -> Result<String, CrawlError> {
    match new_page_state(page, None, normalizer).await {
        Ok(state) => Ok(state.unique_id),
        Err(CrawlError::EmptyPage) => Ok(empty_page_hash()),
        Err(err) => Err(err),
    }
}

/// Captures the current page as a [`PageState`], fingerprinting its
/// normalized DOM.
pub(crate) async fn new_page_state(
    page: &mut dyn BrowserPage,
    action: Option<&Action>,
    normalizer: &Normalizer,
) -> Result<PageState, CrawlError> {
    let info = page.info().await?;
    if info.url.is_empty() || info.url == "about:blank" {
        return Err(CrawlError::EmptyPage);
    }

    let dom = page.html().await?;
    let stripped_dom = normalizer.apply(&dom);
    let unique_id = fingerprint(&stripped_dom);

    Ok(PageState {
        unique_id,
        origin_id: String::new(),
        url: info.url,
        title: info.title,
        dom,
        stripped_dom,
        depth: action.map(|action| action.depth + 1).unwrap_or(0),
        is_root: false,
        navigation_action: action.cloned(),
    })
}

/// Dispatches a single action against the live page and waits for the
/// page to settle.
pub(crate) async fn execute_action(
    action: &Action,
    page: &mut dyn BrowserPage,
) -> Result<(), CrawlError> {
    match &action.kind {
        ActionKind::LoadUrl { url } => {
            page.navigate(url).await?;
            page.wait_page_load().await?;
        }
        ActionKind::FillForm { form } => {
            let mut submit_xpath: Option<&str> = None;
            for field in &form.elements {
                if field.xpath.is_empty() {
                    continue;
                }
                match field.tag_name.as_str() {
                    "input" => {
                        let value = FORM_FILLING_DATA
                            .iter()
                            .find(|(input_type, _)| *input_type == field.element_type)
                            .map(|(_, value)| *value);
                        if let Some(value) = value {
                            page.fill(&field.xpath, value).await?;
                        }
                    }
                    "button" => {
                        if submit_xpath.is_none() && field.element_type == "submit" {
                            submit_xpath = Some(&field.xpath);
                        }
                    }
                    _ => {}
                }
            }
            if let Some(xpath) = submit_xpath {
                if page.click(xpath).await? == ClickOutcome::NotInteractable {
                    return Err(CrawlError::ElementNotVisible);
                }
                page.wait_page_load().await?;
            }
        }
        ActionKind::Interact {
            kind: InteractionKind::LeftClick | InteractionKind::LeftClickDown,
            element,
        } => {
            let located = page
                .find_element(&element.xpath)
                .await?
                .ok_or_else(|| CrawlError::ElementNotFound(element.xpath.clone()))?;
            if !located.visible {
                return Err(CrawlError::ElementNotVisible);
            }
            if page.click(&element.xpath).await? == ClickOutcome::NotInteractable {
                return Err(CrawlError::ElementNotVisible);
            }
            page.wait_page_load().await?;
        }
        ActionKind::Interact { kind, .. } => {
            return Err(CrawlError::UnsupportedAction(kind.to_string()));
        }
    }
    Ok(())
}
