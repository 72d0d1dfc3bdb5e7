use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::browser::BrowserPage;
use crate::errors::CrawlError;
use crate::filter::ScopeValidator;
use crate::state::{Action, ActionKind, HtmlElement, HtmlForm, InteractionKind, interaction_for_listener};

/// CSS selector for all button-like controls.
const BUTTONS_CSS_SELECTOR: &str = "button, input[type='button'], input[type='submit']";
/// CSS selector for all anchor tags.
const LINKS_CSS_SELECTOR: &str = "a";
/// CSS selector for the interactive children of a form.
const FORM_FIELDS_CSS_SELECTOR: &str = "input, textarea, select, button";

/// Logout-style controls across common locales. Triggering one would
/// destroy the active session, so they are never queued.
fn logout_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)(log[\s-]?out|sign[\s-]?out|signout|deconnexion|cerrar[\s-]?sesion|sair|abmelden|uitloggen|exit|disconnect|terminate|end[\s-]?session|salir|desconectar|afmelden|wyloguj|sign[\s-]?off)",
        )
        .unwrap()
    })
}

fn is_logout_control(element: &HtmlElement) -> bool {
    let pattern = logout_pattern();
    pattern.is_match(&element.text_content)
        || element
            .attributes
            .get("href")
            .is_some_and(|href| pattern.is_match(href))
}

/// Whether a control is disabled via the standard attribute, framework
/// CSS classes, or ARIA.
fn is_element_disabled(element: &HtmlElement) -> bool {
    if element.attributes.contains_key("disabled") {
        return true;
    }
    if element
        .classes
        .split_whitespace()
        .any(|class| class == "cursor-not-allowed" || class == "pointer-events-none")
    {
        return true;
    }
    matches!(
        element.attributes.get("aria-disabled").map(String::as_str),
        Some("true") | Some("1")
    )
}

/// Positional XPath of an element, stable for a given render.
fn xpath_for(element: ElementRef) -> String {
    let mut segments = Vec::new();
    let mut node = *element;
    loop {
        let Some(current) = ElementRef::wrap(node) else {
            break;
        };
        let tag = current.value().name();
        let mut index = 1;
        let mut sibling = node.prev_sibling();
        while let Some(prev) = sibling {
            if let Some(prev_element) = ElementRef::wrap(prev) {
                if prev_element.value().name() == tag {
                    index += 1;
                }
            }
            sibling = prev.prev_sibling();
        }
        segments.push(format!("{tag}[{index}]"));
        match node.parent() {
            Some(parent) => node = parent,
            None => break,
        }
    }
    segments.reverse();
    format!("/{}", segments.join("/"))
}

fn describe_element(element: ElementRef) -> HtmlElement {
    let value = element.value();
    let attributes: BTreeMap<String, String> = value
        .attrs()
        .map(|(name, attr_value)| (name.to_string(), attr_value.to_string()))
        .collect();
    HtmlElement {
        tag_name: value.name().to_string(),
        id: value.attr("id").unwrap_or_default().to_string(),
        classes: value.attr("class").unwrap_or_default().to_string(),
        element_type: value.attr("type").unwrap_or_default().to_string(),
        text_content: element.text().collect::<String>().trim().to_string(),
        xpath: xpath_for(element),
        attributes,
    }
}

fn has_form_ancestor(element: ElementRef) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| ancestor.value().name() == "form")
}

/// Resolves a potentially relative href against the current page URL.
fn resolve_url(base: &str, href: &str) -> Option<String> {
    let base_url = Url::parse(base).ok()?;
    base_url.join(href).ok().map(|resolved| resolved.to_string())
}

fn selector(css: &str) -> Selector {
    // All selectors in this module are literals.
    Selector::parse(css).unwrap()
}

/// Scans the rendered page for clickable elements, forms and
/// event-listener-driven controls, producing candidate actions.
///
/// Candidates are unique per page by identity hash, and additionally
/// deduplicated against `seen`, the crawl-scoped set of every action
/// hash ever returned, so the same logical control is never re-queued
/// from multiple visits. Logout-style controls and out-of-scope link
/// targets are dropped here and never reach the queue.
///
/// Enumeration errors from the live page propagate to the caller;
/// partial results are never returned.
pub async fn find_navigations(
    page: &mut dyn BrowserPage,
    scope: &ScopeValidator,
    seen: &mut HashSet<String>,
) -> Result<Vec<Action>, CrawlError> {
    let info = page.info().await?;
    let html = page.html().await?;
    let listeners = page.event_listeners().await?;

    let document = Html::parse_document(&html);
    let mut page_unique: HashSet<String> = HashSet::new();
    let mut candidates: Vec<Action> = Vec::new();

    let mut push_interaction = |kind: InteractionKind,
                                element: HtmlElement,
                                page_unique: &mut HashSet<String>| {
        let hash = element.hash();
        if !page_unique.insert(hash) {
            return;
        }
        if is_logout_control(&element) {
            ::log::debug!("Skipping logout control: {element}");
            return;
        }
        candidates.push(Action {
            origin_id: String::new(),
            depth: 0,
            kind: ActionKind::Interact { kind, element },
        });
    };

    // 1. Button-like elements, excluding disabled controls and buttons
    // that belong to a form (the form action covers those).
    for button in document.select(&selector(BUTTONS_CSS_SELECTOR)) {
        if has_form_ancestor(button) {
            continue;
        }
        let element = describe_element(button);
        if is_element_disabled(&element) {
            continue;
        }
        push_interaction(InteractionKind::LeftClick, element, &mut page_unique);
    }

    // 2. Anchors with an in-scope resolved target.
    for link in document.select(&selector(LINKS_CSS_SELECTOR)) {
        let element = describe_element(link);
        let Some(href) = element.attributes.get("href") else {
            continue;
        };
        if href.is_empty() {
            continue;
        }
        let Some(resolved) = resolve_url(&info.url, href) else {
            continue;
        };
        if !scope(&resolved) {
            ::log::debug!("Scope validator rejected: {resolved}");
            continue;
        }
        push_interaction(InteractionKind::LeftClick, element, &mut page_unique);
    }

    // 3. Elements carrying relevant event listeners, both inline
    // attributes in the markup and listeners reported by the live page.
    for element in document.select(&selector("*")) {
        let described = describe_element(element);
        for (name, _) in described.attributes.iter() {
            let Some(listener_type) = name.strip_prefix("on") else {
                continue;
            };
            if let Some(kind) = interaction_for_listener(listener_type) {
                push_interaction(kind, described.clone(), &mut page_unique);
            }
        }
    }
    for listener in listeners {
        if let Some(kind) = interaction_for_listener(&listener.listener_type) {
            push_interaction(kind, listener.element, &mut page_unique);
        }
    }

    // 4. Forms: one fill action each; their buttons were already
    // excluded from the standalone set above.
    for form_ref in document.select(&selector("form")) {
        let mut fields = Vec::new();
        for field in form_ref.select(&selector(FORM_FIELDS_CSS_SELECTOR)) {
            let element = describe_element(field);
            // Defensive against nested discovery: a form button must
            // never also be queued standalone.
            page_unique.insert(element.hash());
            fields.push(element);
        }
        let value = form_ref.value();
        let form = HtmlForm {
            tag_name: value.name().to_string(),
            id: value.attr("id").unwrap_or_default().to_string(),
            classes: value.attr("class").unwrap_or_default().to_string(),
            attributes: value
                .attrs()
                .map(|(name, attr_value)| (name.to_string(), attr_value.to_string()))
                .collect(),
            action: value.attr("action").unwrap_or_default().to_string(),
            method: value.attr("method").unwrap_or_default().to_string(),
            elements: fields,
            xpath: xpath_for(form_ref),
        };
        let hash = form.hash();
        if !page_unique.insert(hash) {
            continue;
        }
        candidates.push(Action {
            origin_id: String::new(),
            depth: 0,
            kind: ActionKind::FillForm { form },
        });
    }

    // 5. Drop everything already discovered earlier in this crawl.
    let navigations: Vec<Action> = candidates
        .into_iter()
        .filter(|action| seen.insert(action.hash()))
        .collect();

    ::log::debug!(
        "Discovered {} new navigations on {}",
        navigations.len(),
        info.url
    );
    Ok(navigations)
}
