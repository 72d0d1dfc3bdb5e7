//! Re-establishing an action's origin state before execution.
//!
//! Three tiers are tried in order of cost:
//!
//! 1. Element presence: if the action's target element is visible on the
//!    current page, the origin is treated as reachable without any
//!    navigation.
//! 2. Session history: when the origin page appears in the browser
//!    history, stepping back is cheaper than replaying actions.
//! 3. Shortest path: replay the action chain from the current state, or
//!    failing that from the blank root, along the crawl graph.

use crate::browser::BrowserPage;
use crate::crawlers::headless::{execute_action, page_hash};
use crate::errors::CrawlError;
use crate::graph::CrawlGraph;
use crate::normalizer::{Normalizer, empty_page_hash};
use crate::state::{Action, HtmlElement, PageState};

/// Brings `page` back to the state named by `action.origin_id`.
/// Returns the verified fingerprint of the page after navigation.
pub(crate) async fn navigate_back_to_origin(
    graph: &CrawlGraph,
    normalizer: &Normalizer,
    action: &Action,
    page: &mut dyn BrowserPage,
    current_hash: &str,
) -> Result<String, CrawlError> {
    let origin_state = graph
        .get_page_state(&action.origin_id)
        .map_err(|_| CrawlError::NoNavigationPossible)?;

    if let Some(element) = action.element() {
        if current_hash != empty_page_hash() {
            match try_element_navigation(page, element, &action.origin_id).await {
                Ok(Some(hash)) => return Ok(hash),
                Ok(None) => {}
                Err(err) => {
                    ::log::debug!("Element-presence navigation failed: {err}");
                }
            }
        }
    }

    match try_history_navigation(page, origin_state, action, normalizer).await {
        Ok(Some(hash)) => return Ok(hash),
        Ok(None) => {}
        Err(err) => {
            ::log::debug!("History navigation failed: {err}");
        }
    }

    try_shortest_path_navigation(graph, normalizer, action, page, current_hash).await
}

/// Tier 1: the target element is already visible on the current page and
/// matches the recorded one.
async fn try_element_navigation(
    page: &mut dyn BrowserPage,
    element: &HtmlElement,
    origin_id: &str,
) -> Result<Option<String>, CrawlError> {
    let Some(located) = page.find_element(&element.xpath).await? else {
        return Ok(None);
    };
    if !located.visible {
        return Ok(None);
    }
    // Loose identity check: any of id, classes or text matching the
    // recorded element is taken as the same control.
    if located.id == element.id
        || located.classes == element.classes
        || located.text_content == element.text_content
    {
        ::log::debug!("Found target element on current page, proceeding without navigation");
        return Ok(Some(origin_id.to_string()));
    }
    Ok(None)
}

/// Tier 2: the origin page sits behind the current history entry; step
/// back to it and verify the fingerprint.
async fn try_history_navigation(
    page: &mut dyn BrowserPage,
    origin: &PageState,
    action: &Action,
    normalizer: &Normalizer,
) -> Result<Option<String>, CrawlError> {
    let history = page.history().await?;
    if history.entries.is_empty() {
        return Ok(None);
    }

    let Some(position) = history
        .entries
        .iter()
        .position(|entry| entry.url == origin.url && entry.title == origin.title)
    else {
        return Ok(None);
    };
    if position >= history.current_index {
        return Ok(None);
    }
    let steps_back = history.current_index - position;

    ::log::debug!("Navigating back using browser history ({steps_back} steps)");
    for _ in 0..steps_back {
        page.back().await?;
    }
    if let Err(err) = page.wait_page_load().await {
        ::log::debug!("Page load wait after history navigation failed: {err}");
    }

    verify_origin(page, normalizer, &action.origin_id)
        .await
        .map(Some)
}

/// Tier 3: replay the shortest action chain from the current state, or
/// from the blank root when the current state has no recorded path.
async fn try_shortest_path_navigation(
    graph: &CrawlGraph,
    normalizer: &Normalizer,
    action: &Action,
    page: &mut dyn BrowserPage,
    current_hash: &str,
) -> Result<String, CrawlError> {
    ::log::debug!(
        "Trying shortest path to origin (from {current_hash} to {})",
        action.origin_id
    );

    let actions = match graph.shortest_path(current_hash, &action.origin_id) {
        Ok(actions) => actions,
        Err(CrawlError::TargetNotReachable(_)) | Err(CrawlError::StateNotFound(_)) => {
            ::log::debug!("Origin not reachable from current state, replaying from blank root");
            graph.shortest_path(&empty_page_hash(), &action.origin_id)?
        }
        Err(err) => return Err(err),
    };

    for replay in &actions {
        execute_action(replay, page).await?;
    }
    verify_origin(page, normalizer, &action.origin_id).await
}

/// Confirms the page now fingerprints to the expected origin.
async fn verify_origin(
    page: &mut dyn BrowserPage,
    normalizer: &Normalizer,
    origin_id: &str,
) -> Result<String, CrawlError> {
    let hash = page_hash(page, normalizer).await?;
    if hash != origin_id {
        return Err(CrawlError::OriginMismatch);
    }
    Ok(hash)
}
