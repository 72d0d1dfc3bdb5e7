use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::browser::pool::{PageFactory, SessionPool};
use crate::browser::{
    BrowserPage, ClickOutcome, HistoryEntry, LocatedElement, NavigationHistory, PageInfo,
};
use crate::config::CrawlerConfig;
use crate::crawlers::{Crawler, backtrack};
use crate::diagnostics::{DiagnosticsWriter, PageStatePhase};
use crate::errors::CrawlError;
use crate::filter::ScopeValidator;
use crate::graph::CrawlGraph;
use crate::normalizer::{Normalizer, empty_page_hash, fingerprint};
use crate::state::{Action, ActionKind, EventListener, HtmlElement, InteractionKind, PageState};

#[derive(Clone)]
struct MockPageDef {
    url: String,
    title: String,
    html: String,
}

/// A scripted site: named pages, URL routing and click transitions.
#[derive(Default)]
struct MockSite {
    pages: HashMap<String, MockPageDef>,
    by_url: HashMap<String, String>,
    clicks: HashMap<(String, String), String>,
    elements: HashMap<(String, String), LocatedElement>,
}

impl MockSite {
    fn add_page(&mut self, key: &str, url: &str, title: &str, html: &str) {
        self.pages.insert(
            key.to_string(),
            MockPageDef {
                url: url.to_string(),
                title: title.to_string(),
                html: html.to_string(),
            },
        );
        self.by_url
            .entry(url.to_string())
            .or_insert_with(|| key.to_string());
    }

    fn add_click(&mut self, from_key: &str, xpath: &str, to_key: &str) {
        self.clicks
            .insert((from_key.to_string(), xpath.to_string()), to_key.to_string());
    }

    fn add_element(&mut self, key: &str, xpath: &str, located: LocatedElement) {
        self.elements
            .insert((key.to_string(), xpath.to_string()), located);
    }
}

#[derive(Default)]
struct Counters {
    navigations: AtomicUsize,
    backs: AtomicUsize,
    clicks: AtomicUsize,
}

struct MockPage {
    site: Arc<MockSite>,
    counters: Arc<Counters>,
    current_key: Option<String>,
    entries: Vec<HistoryEntry>,
    current_index: usize,
}

impl MockPage {
    fn new(site: Arc<MockSite>, counters: Arc<Counters>) -> Self {
        Self {
            site,
            counters,
            current_key: None,
            entries: Vec::new(),
            current_index: 0,
        }
    }

    fn at(mut self, key: &str) -> Self {
        self.move_to(key.to_string());
        self
    }

    fn current(&self) -> Option<&MockPageDef> {
        self.current_key
            .as_ref()
            .and_then(|key| self.site.pages.get(key))
    }

    fn move_to(&mut self, key: String) {
        let def = self.site.pages[&key].clone();
        let same_url = self
            .entries
            .get(self.current_index)
            .is_some_and(|entry| entry.url == def.url);
        if !same_url {
            self.entries.truncate(self.current_index + 1);
            self.entries.push(HistoryEntry {
                url: def.url.clone(),
                title: def.title.clone(),
            });
            self.current_index = self.entries.len() - 1;
        }
        self.current_key = Some(key);
    }
}

#[async_trait]
impl BrowserPage for MockPage {
    async fn navigate(&mut self, url: &str) -> Result<(), CrawlError> {
        self.counters.navigations.fetch_add(1, Ordering::SeqCst);
        let key = self
            .site
            .by_url
            .get(url)
            .cloned()
            .ok_or_else(|| CrawlError::Navigation(format!("no route for {url}")))?;
        self.move_to(key);
        Ok(())
    }

    async fn wait_page_load(&mut self) -> Result<(), CrawlError> {
        Ok(())
    }

    async fn info(&mut self) -> Result<PageInfo, CrawlError> {
        match self.current() {
            Some(def) => Ok(PageInfo {
                url: def.url.clone(),
                title: def.title.clone(),
            }),
            None => Ok(PageInfo {
                url: "about:blank".to_string(),
                title: String::new(),
            }),
        }
    }

    async fn html(&mut self) -> Result<String, CrawlError> {
        Ok(self.current().map(|def| def.html.clone()).unwrap_or_default())
    }

    async fn find_element(&mut self, xpath: &str) -> Result<Option<LocatedElement>, CrawlError> {
        let Some(key) = self.current_key.clone() else {
            return Ok(None);
        };
        if let Some(located) = self.site.elements.get(&(key.clone(), xpath.to_string())) {
            return Ok(Some(located.clone()));
        }
        if self.site.clicks.contains_key(&(key, xpath.to_string())) {
            return Ok(Some(LocatedElement {
                visible: true,
                ..LocatedElement::default()
            }));
        }
        Ok(None)
    }

    async fn click(&mut self, xpath: &str) -> Result<ClickOutcome, CrawlError> {
        self.counters.clicks.fetch_add(1, Ordering::SeqCst);
        let Some(key) = self.current_key.clone() else {
            return Ok(ClickOutcome::NotInteractable);
        };
        if let Some(target) = self.site.clicks.get(&(key, xpath.to_string())).cloned() {
            self.move_to(target);
        }
        Ok(ClickOutcome::Clicked)
    }

    async fn fill(&mut self, _xpath: &str, _value: &str) -> Result<(), CrawlError> {
        Ok(())
    }

    async fn event_listeners(&mut self) -> Result<Vec<EventListener>, CrawlError> {
        Ok(Vec::new())
    }

    async fn history(&mut self) -> Result<NavigationHistory, CrawlError> {
        Ok(NavigationHistory {
            entries: self.entries.clone(),
            current_index: self.current_index,
        })
    }

    async fn back(&mut self) -> Result<(), CrawlError> {
        self.counters.backs.fetch_add(1, Ordering::SeqCst);
        if self.current_index > 0 {
            self.current_index -= 1;
            let url = self.entries[self.current_index].url.clone();
            self.current_key = self.site.by_url.get(&url).cloned();
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }

    async fn close(&mut self) {}
}

struct MockFactory {
    site: Arc<MockSite>,
    counters: Arc<Counters>,
}

#[async_trait]
impl PageFactory for MockFactory {
    async fn create(&self) -> Result<Box<dyn BrowserPage>, CrawlError> {
        Ok(Box::new(MockPage::new(
            Arc::clone(&self.site),
            Arc::clone(&self.counters),
        )))
    }
}

fn allow_all() -> ScopeValidator {
    Arc::new(|_: &str| true)
}

const BUTTON_XPATH: &str = "/html[1]/body[1]/button[1]";

fn state_for(def: &MockPageDef, normalizer: &Normalizer, action: Option<Action>) -> PageState {
    let stripped = normalizer.apply(&def.html);
    PageState {
        unique_id: fingerprint(&stripped),
        origin_id: action
            .as_ref()
            .map(|action| action.origin_id.clone())
            .unwrap_or_default(),
        url: def.url.clone(),
        title: def.title.clone(),
        dom: def.html.clone(),
        stripped_dom: stripped,
        depth: action.as_ref().map(|action| action.depth + 1).unwrap_or(0),
        is_root: false,
        navigation_action: action,
    }
}

fn click_action(origin_id: &str, depth: usize, xpath: &str, id: &str) -> Action {
    Action {
        origin_id: origin_id.to_string(),
        depth,
        kind: ActionKind::Interact {
            kind: InteractionKind::LeftClick,
            element: HtmlElement {
                tag_name: "button".to_string(),
                id: id.to_string(),
                xpath: xpath.to_string(),
                ..Default::default()
            },
        },
    }
}

/// Graph: blank root -> A (load) -> B (click).
fn two_page_graph(
    site: &MockSite,
    normalizer: &Normalizer,
) -> (CrawlGraph, PageState, PageState, Action) {
    let mut graph = CrawlGraph::new();
    graph
        .add_page_state(PageState::blank_root(empty_page_hash()))
        .unwrap();

    let load = Action::load_url(site.pages["a"].url.clone(), empty_page_hash(), 0);
    let state_a = state_for(&site.pages["a"], normalizer, Some(load));
    graph.add_page_state(state_a.clone()).unwrap();

    let click = click_action(&state_a.unique_id, 1, BUTTON_XPATH, "go");
    let state_b = state_for(&site.pages["b"], normalizer, Some(click.clone()));
    graph.add_page_state(state_b.clone()).unwrap();

    (graph, state_a, state_b, click)
}

fn tiered_site() -> MockSite {
    let mut site = MockSite::default();
    site.add_page(
        "a",
        "https://site.test/a",
        "A",
        r#"<html><body><button id="go">Go</button></body></html>"#,
    );
    site.add_page(
        "b",
        "https://site.test/b",
        "B",
        r#"<html><body><p>Done</p></body></html>"#,
    );
    site.add_click("a", BUTTON_XPATH, "b");
    site
}

#[tokio::test]
async fn test_backtrack_element_presence_wins() {
    let normalizer = Normalizer::new().unwrap();
    let mut site = tiered_site();
    // The recorded button is also visible on page B with the same id.
    site.add_element(
        "b",
        BUTTON_XPATH,
        LocatedElement {
            visible: true,
            id: "go".to_string(),
            ..LocatedElement::default()
        },
    );
    let site = Arc::new(site);
    let (graph, state_a, state_b, _) = two_page_graph(&site, &normalizer);

    let counters = Arc::new(Counters::default());
    let mut page = MockPage::new(Arc::clone(&site), Arc::clone(&counters)).at("b");

    // A queued click whose origin is A, executed while the browser sits on B.
    let action = click_action(&state_a.unique_id, 1, BUTTON_XPATH, "go");
    let hash = backtrack::navigate_back_to_origin(
        &graph,
        &normalizer,
        &action,
        &mut page,
        &state_b.unique_id,
    )
    .await
    .unwrap();

    assert_eq!(hash, state_a.unique_id);
    assert_eq!(counters.backs.load(Ordering::SeqCst), 0);
    assert_eq!(counters.navigations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_backtrack_history_wins_over_shortest_path() {
    let normalizer = Normalizer::new().unwrap();
    let site = Arc::new(tiered_site());
    let (graph, state_a, state_b, _) = two_page_graph(&site, &normalizer);

    let counters = Arc::new(Counters::default());
    // Visited A then B; history holds both with B current.
    let mut page = MockPage::new(Arc::clone(&site), Arc::clone(&counters))
        .at("a")
        .at("b");

    // Target element is absent on B, so the element tier fails and the
    // history tier takes over.
    let action = click_action(&state_a.unique_id, 1, "/html[1]/body[1]/div[9]", "other");
    let hash = backtrack::navigate_back_to_origin(
        &graph,
        &normalizer,
        &action,
        &mut page,
        &state_b.unique_id,
    )
    .await
    .unwrap();

    assert_eq!(hash, state_a.unique_id);
    assert_eq!(counters.backs.load(Ordering::SeqCst), 1);
    // Shortest-path replay never ran.
    assert_eq!(counters.navigations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_backtrack_falls_back_to_shortest_path() {
    let normalizer = Normalizer::new().unwrap();
    let mut site = tiered_site();
    // A page the graph has never seen, with no history trail to A.
    site.add_page(
        "c",
        "https://site.test/c",
        "C",
        r#"<html><body><h1>Lost</h1></body></html>"#,
    );
    let site = Arc::new(site);
    let (graph, state_a, _, _) = two_page_graph(&site, &normalizer);

    let counters = Arc::new(Counters::default());
    let mut page = MockPage::new(Arc::clone(&site), Arc::clone(&counters)).at("c");

    let unknown_hash = fingerprint(&normalizer.apply(&site.pages["c"].html));
    let action = click_action(&state_a.unique_id, 1, "/html[1]/body[1]/div[9]", "other");
    let hash =
        backtrack::navigate_back_to_origin(&graph, &normalizer, &action, &mut page, &unknown_hash)
            .await
            .unwrap();

    assert_eq!(hash, state_a.unique_id);
    // Replayed the load action from the blank root.
    assert_eq!(counters.navigations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_backtrack_missing_origin_is_no_navigation() {
    let normalizer = Normalizer::new().unwrap();
    let site = Arc::new(tiered_site());
    let (graph, _, state_b, _) = two_page_graph(&site, &normalizer);

    let counters = Arc::new(Counters::default());
    let mut page = MockPage::new(Arc::clone(&site), counters).at("b");

    let action = click_action("never-seen", 1, BUTTON_XPATH, "go");
    let result = backtrack::navigate_back_to_origin(
        &graph,
        &normalizer,
        &action,
        &mut page,
        &state_b.unique_id,
    )
    .await;

    assert!(matches!(result, Err(CrawlError::NoNavigationPossible)));
}

#[tokio::test]
async fn test_crawl_collapses_dynamic_rerender() {
    // Clicking the button re-renders the page with a fresh timestamp.
    // The normalized fingerprint is unchanged, so no new state appears.
    let mut site = MockSite::default();
    site.add_page(
        "home",
        "https://site.test/",
        "Home",
        r#"<html><body><p>Generated at 12:30:45</p><button id="go">Go</button></body></html>"#,
    );
    site.add_page(
        "home-rerendered",
        "https://site.test/",
        "Home",
        r#"<html><body><p>Generated at 12:31:02</p><button id="go">Go</button></body></html>"#,
    );
    site.add_click("home", BUTTON_XPATH, "home-rerendered");
    site.add_click("home-rerendered", BUTTON_XPATH, "home");
    let site = Arc::new(site);

    let counters = Arc::new(Counters::default());
    let pool = Arc::new(SessionPool::new(
        Box::new(MockFactory {
            site,
            counters: Arc::clone(&counters),
        }),
        1,
    ));

    let results = Arc::new(AtomicUsize::new(0));
    let results_seen = Arc::clone(&results);
    let mut crawler = Crawler::new(&CrawlerConfig::default(), pool, allow_all())
        .unwrap()
        .with_on_result(Box::new(move |_state| {
            results_seen.fetch_add(1, Ordering::SeqCst);
        }));

    crawler.crawl("https://site.test/").await.unwrap();

    let graph = crawler.graph();
    // Blank root plus the single collapsed page state.
    assert_eq!(graph.vertex_count(), 2);
    // The button was clicked exactly once; its re-discovery on the
    // re-rendered page deduplicated against the crawl-wide action set.
    assert_eq!(counters.clicks.load(Ordering::SeqCst), 1);
    assert_eq!(results.load(Ordering::SeqCst), 1);
}

/// Diagnostics sink whose every write fails, as with an unwritable
/// directory that disappears mid-crawl.
struct FailingWriter;

fn diagnostics_io_error() -> CrawlError {
    CrawlError::Io(std::io::Error::other("diagnostics directory gone"))
}

impl DiagnosticsWriter for FailingWriter {
    fn log_action(&self, _action: &Action) -> Result<(), CrawlError> {
        Err(diagnostics_io_error())
    }
    fn log_page_state(&self, _state: &PageState, _phase: PageStatePhase) -> Result<(), CrawlError> {
        Err(diagnostics_io_error())
    }
    fn log_navigations(&self, _state_id: &str, _navigations: &[Action]) -> Result<(), CrawlError> {
        Err(diagnostics_io_error())
    }
    fn close(&self) -> Result<(), CrawlError> {
        Err(diagnostics_io_error())
    }
}

#[tokio::test]
async fn test_crawl_survives_failing_diagnostics() {
    let mut site = MockSite::default();
    site.add_page(
        "home",
        "https://site.test/",
        "Home",
        r#"<html><body><a href="/about">About</a></body></html>"#,
    );
    site.add_page(
        "about",
        "https://site.test/about",
        "About",
        r#"<html><body><h1>About</h1></body></html>"#,
    );
    site.add_click("home", "/html[1]/body[1]/a[1]", "about");
    let site = Arc::new(site);

    let counters = Arc::new(Counters::default());
    let pool = Arc::new(SessionPool::new(
        Box::new(MockFactory {
            site,
            counters: Arc::clone(&counters),
        }),
        1,
    ));

    let mut crawler = Crawler::new(&CrawlerConfig::default(), pool, allow_all())
        .unwrap()
        .with_diagnostics(Box::new(FailingWriter));

    // The sink is observational only; its failures never end the crawl.
    crawler.crawl("https://site.test/").await.unwrap();
    assert_eq!(crawler.graph().vertex_count(), 3);
}

#[tokio::test]
async fn test_crawl_follows_links_across_pages() {
    let mut site = MockSite::default();
    site.add_page(
        "home",
        "https://site.test/",
        "Home",
        r#"<html><body><a href="/about">About</a></body></html>"#,
    );
    site.add_page(
        "about",
        "https://site.test/about",
        "About",
        r#"<html><body><h1>About</h1></body></html>"#,
    );
    // The anchor is a click target on the home page.
    site.add_click("home", "/html[1]/body[1]/a[1]", "about");
    let site = Arc::new(site);

    let counters = Arc::new(Counters::default());
    let pool = Arc::new(SessionPool::new(
        Box::new(MockFactory {
            site,
            counters: Arc::clone(&counters),
        }),
        1,
    ));

    let mut crawler = Crawler::new(&CrawlerConfig::default(), pool, allow_all()).unwrap();
    crawler.crawl("https://site.test/").await.unwrap();

    let graph = crawler.graph();
    // Blank root, home, about.
    assert_eq!(graph.vertex_count(), 3);
    assert_eq!(graph.edge_count(), 2);
}
