use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A page in the state of the web application as determined by the
/// crawler. It is the vertex of the crawl graph.
///
/// `unique_id` is content-addressed: the fingerprint of the stripped DOM.
/// It is never reassigned after creation; two fetches of different URLs
/// with identical normalized DOM collapse to the same state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageState {
    pub unique_id: String,
    /// Fingerprint of the state this one was reached from. The blank-page
    /// hash for states reached from a fresh browser.
    pub origin_id: String,
    pub url: String,
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub dom: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub stripped_dom: String,
    pub depth: usize,
    #[serde(default)]
    pub is_root: bool,
    /// The action that produced this state. None only for the synthetic
    /// blank root.
    pub navigation_action: Option<Action>,
}

impl PageState {
    /// The synthetic blank-page vertex present at the root of every graph.
    pub fn blank_root(empty_hash: String) -> Self {
        Self {
            unique_id: empty_hash,
            origin_id: String::new(),
            url: "about:blank".to_string(),
            title: String::new(),
            dom: String::new(),
            stripped_dom: String::new(),
            depth: 0,
            is_root: true,
            navigation_action: None,
        }
    }
}

/// Interaction kinds derived from DOM event listener types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    LeftClick,
    LeftClickDown,
    LeftClickUp,
    RightClick,
    DoubleClick,
    Scroll,
    SendKeys,
    KeyUp,
    KeyDown,
    Hover,
    Focus,
    Blur,
    MouseOverAndOut,
    MouseWheel,
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InteractionKind::LeftClick => "left_click",
            InteractionKind::LeftClickDown => "left_click_down",
            InteractionKind::LeftClickUp => "left_click_up",
            InteractionKind::RightClick => "right_click",
            InteractionKind::DoubleClick => "double_click",
            InteractionKind::Scroll => "scroll",
            InteractionKind::SendKeys => "send_keys",
            InteractionKind::KeyUp => "key_up",
            InteractionKind::KeyDown => "key_down",
            InteractionKind::Hover => "hover",
            InteractionKind::Focus => "focus",
            InteractionKind::Blur => "blur",
            InteractionKind::MouseOverAndOut => "mouse_over_and_out",
            InteractionKind::MouseWheel => "mouse_wheel",
        };
        f.write_str(name)
    }
}

/// The payload of an action. Tagged so that illegal combinations (a form
/// fill without a form, a click without an element) cannot be built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    LoadUrl { url: String },
    FillForm { form: HtmlForm },
    Interact { kind: InteractionKind, element: HtmlElement },
}

/// A directed edge of the crawl graph and the unit of the work queue.
///
/// An action must never be executed unless the browser is verified to be
/// in the state named by `origin_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Fingerprint of the page state this action was discovered from.
    pub origin_id: String,
    pub depth: usize,
    pub kind: ActionKind,
}

impl Action {
    pub fn load_url(url: impl Into<String>, origin_id: String, depth: usize) -> Self {
        Self {
            origin_id,
            depth,
            kind: ActionKind::LoadUrl { url: url.into() },
        }
    }

    /// Stable identity of the action, derived from its target.
    pub fn hash(&self) -> String {
        match &self.kind {
            ActionKind::LoadUrl { url } => sha256_hex(&format!("load_url|{url}")),
            ActionKind::FillForm { form } => form.hash(),
            ActionKind::Interact { element, .. } => element.hash(),
        }
    }

    /// The element this action targets, if it has one.
    pub fn element(&self) -> Option<&HtmlElement> {
        match &self.kind {
            ActionKind::Interact { element, .. } => Some(element),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ActionKind::LoadUrl { url } => write!(f, "load_url {url}"),
            ActionKind::FillForm { form } => write!(f, "fill_form on {}", form.describe()),
            ActionKind::Interact { kind, element } => write!(f, "{kind} on {element}"),
        }
    }
}

/// Maps a DOM event listener type to the interaction that triggers it.
/// Unlisted listener types carry no navigation value for the crawler.
pub fn interaction_for_listener(listener_type: &str) -> Option<InteractionKind> {
    let kind = match listener_type {
        // A submit listener fires off a click on the listening control.
        "click" | "submit" => InteractionKind::LeftClick,
        "mousedown" => InteractionKind::LeftClickDown,
        "mouseup" => InteractionKind::LeftClickUp,
        "keydown" | "keypress" => InteractionKind::KeyDown,
        "keyup" => InteractionKind::KeyUp,
        "focus" | "focusin" => InteractionKind::Focus,
        "blur" | "focusout" => InteractionKind::Blur,
        "scroll" => InteractionKind::Scroll,
        "dblclick" => InteractionKind::DoubleClick,
        "contextmenu" => InteractionKind::RightClick,
        "mouseover" | "mouseout" | "mouseenter" | "mouseleave" => InteractionKind::MouseOverAndOut,
        "wheel" => InteractionKind::MouseWheel,
        _ => return None,
    };
    Some(kind)
}

/// Structural description of a DOM element.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HtmlElement {
    pub tag_name: String,
    #[serde(default)]
    pub id: String,
    /// Space-separated class list as it appears in the markup.
    #[serde(default)]
    pub classes: String,
    /// Sorted map so hash input iteration is deterministic.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Value of the `type` attribute, relevant for inputs and buttons.
    #[serde(default)]
    pub element_type: String,
    #[serde(default)]
    pub text_content: String,
    /// Structural locator used to re-find the element across renders.
    #[serde(default)]
    pub xpath: String,
}

impl fmt::Display for HtmlElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag_name)?;
        if !self.id.is_empty() {
            write!(f, "#{}", self.id)?;
        }
        if !self.classes.is_empty() {
            write!(f, ".{}", self.classes)?;
        }
        let text = self.text_content.trim();
        if !text.is_empty() {
            write!(f, " ({text})")?;
        }
        Ok(())
    }
}

/// Attributes whose values are semantic rather than generated. Only these
/// take part in identity hashing; volatile attributes (data-reactid,
/// style, generated ids) never do.
const STABLE_ATTRIBUTES: &[&str] = &[
    "action", "href", "method", "name", "placeholder", "src", "type",
];

/// Generated-looking id values and class tokens. These are excluded from
/// hashing so re-renders with regenerated identifiers still collapse to
/// the same action identity.
fn dynamic_id_and_class_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d+$|^id_\d+|\bclass_\w{8}\b").unwrap())
}

fn push_identity_parts(parts: &mut Vec<String>, id: &str, classes: &str) {
    let pattern = dynamic_id_and_class_pattern();
    if !id.is_empty() && !pattern.is_match(id) {
        parts.push(format!("id:{id}"));
    }
    let stable_classes: Vec<&str> = classes
        .split_whitespace()
        .filter(|class| !pattern.is_match(class))
        .collect();
    if !stable_classes.is_empty() {
        parts.push(format!("class:{}", stable_classes.join(" ")));
    }
}

fn push_stable_attributes(parts: &mut Vec<String>, attributes: &BTreeMap<String, String>) {
    for key in STABLE_ATTRIBUTES {
        if let Some(value) = attributes.get(*key) {
            parts.push(format!("{key}:{value}"));
        }
    }
}

impl HtmlElement {
    /// Identity hash built only from stable attributes. Never raw
    /// outer-HTML: re-renders with regenerated ids and classes must still
    /// collapse to the same identity when semantics are unchanged.
    pub fn hash(&self) -> String {
        let mut parts = vec![self.tag_name.clone()];
        push_identity_parts(&mut parts, &self.id, &self.classes);
        push_stable_attributes(&mut parts, &self.attributes);
        sha256_hex(&parts.join("|"))
    }
}

/// Structural description of a form element.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HtmlForm {
    pub tag_name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub classes: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub method: String,
    pub elements: Vec<HtmlElement>,
    #[serde(default)]
    pub xpath: String,
}

impl HtmlForm {
    /// Form identity folds in the hashes of its child elements, so a form
    /// that gains or loses a field is a different control.
    pub fn hash(&self) -> String {
        let mut parts = vec![self.tag_name.clone()];
        push_identity_parts(&mut parts, &self.id, &self.classes);
        push_stable_attributes(&mut parts, &self.attributes);
        parts.push(format!("action:{}", self.action));
        parts.push(format!("method:{}", self.method));
        for element in &self.elements {
            parts.push(element.hash());
        }
        sha256_hex(&parts.join("|"))
    }

    fn describe(&self) -> String {
        if !self.id.is_empty() {
            format!("{}#{}", self.tag_name, self.id)
        } else if !self.action.is_empty() {
            format!("{} ({})", self.tag_name, self.action)
        } else {
            self.tag_name.clone()
        }
    }
}

/// An event listener attached to a DOM element, either programmatically
/// or through an inline `on*` attribute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventListener {
    pub element: HtmlElement,
    /// DOM event type, e.g. "click" or "keydown".
    pub listener_type: String,
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}
