use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;

use crate::errors::CrawlError;
use crate::state::{Action, PageState};

/// A directed edge: the action that transitioned source into `target`.
#[derive(Debug, Clone)]
struct Edge {
    target: String,
    action: Action,
}

/// Directed, rooted graph over page states keyed by their content
/// fingerprint. Vertices are `PageState`s, edges carry the `Action` that
/// connected them. The synthetic blank-page vertex is always present as
/// the root.
///
/// Vertex and edge insertion is idempotent: a duplicate insert is a
/// no-op, not an error.
#[derive(Debug, Default)]
pub struct CrawlGraph {
    vertices: HashMap<String, PageState>,
    adjacency: HashMap<String, Vec<Edge>>,
}

impl CrawlGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a page state as a vertex, and, when the state carries the
    /// action that produced it, the edge `origin_id -> unique_id` labeled
    /// with that action. The edge source must already exist in the graph.
    pub fn add_page_state(&mut self, state: PageState) -> Result<(), CrawlError> {
        let unique_id = state.unique_id.clone();
        let origin_id = state.origin_id.clone();
        let action = state.navigation_action.clone();

        self.vertices.entry(unique_id.clone()).or_insert(state);

        if let Some(action) = action {
            if !self.vertices.contains_key(&origin_id) {
                return Err(CrawlError::StateNotFound(origin_id));
            }
            let edges = self.adjacency.entry(origin_id).or_default();
            if !edges.iter().any(|edge| edge.target == unique_id) {
                edges.push(Edge {
                    target: unique_id,
                    action,
                });
            }
        }
        Ok(())
    }

    pub fn get_page_state(&self, id: &str) -> Result<&PageState, CrawlError> {
        self.vertices
            .get(id)
            .ok_or_else(|| CrawlError::StateNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.vertices.contains_key(id)
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(Vec::len).sum()
    }

    pub fn states(&self) -> impl Iterator<Item = &PageState> {
        self.vertices.values()
    }

    /// Minimum-edge-count path from `source_id` to `target_id`, returned
    /// as the ordered sequence of edge actions to replay. The blank-root
    /// vertex carries no inbound action and so never appears in the
    /// result.
    ///
    /// Fails with `TargetNotReachable` when both states exist but no path
    /// connects them; callers retry from the blank root as a fallback.
    pub fn shortest_path(
        &self,
        source_id: &str,
        target_id: &str,
    ) -> Result<Vec<Action>, CrawlError> {
        if !self.vertices.contains_key(source_id) {
            return Err(CrawlError::StateNotFound(source_id.to_string()));
        }
        if !self.vertices.contains_key(target_id) {
            return Err(CrawlError::StateNotFound(target_id.to_string()));
        }
        if source_id == target_id {
            return Ok(Vec::new());
        }

        // BFS; every edge has equal cost.
        let mut predecessor: HashMap<&str, (&str, &Action)> = HashMap::new();
        let mut queue = VecDeque::from([source_id]);
        'search: while let Some(current) = queue.pop_front() {
            if let Some(edges) = self.adjacency.get(current) {
                for edge in edges {
                    if edge.target == source_id || predecessor.contains_key(edge.target.as_str()) {
                        continue;
                    }
                    predecessor.insert(edge.target.as_str(), (current, &edge.action));
                    if edge.target == target_id {
                        break 'search;
                    }
                    queue.push_back(edge.target.as_str());
                }
            }
        }

        if !predecessor.contains_key(target_id) {
            return Err(CrawlError::TargetNotReachable(target_id.to_string()));
        }

        let mut actions = Vec::new();
        let mut cursor = target_id;
        while cursor != source_id {
            let (previous, action) = predecessor[cursor];
            actions.push((*action).clone());
            cursor = previous;
        }
        actions.reverse();
        Ok(actions)
    }

    /// Renders the graph in DOT format for offline inspection.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph crawl {\n");
        for (id, state) in &self.vertices {
            let _ = writeln!(
                out,
                "  \"{}\" [label=\"{}\"];",
                &id[..id.len().min(12)],
                state.url
            );
        }
        for (source, edges) in &self.adjacency {
            for edge in edges {
                let _ = writeln!(
                    out,
                    "  \"{}\" -> \"{}\" [label=\"{}\"];",
                    &source[..source.len().min(12)],
                    &edge.target[..edge.target.len().min(12)],
                    edge.action
                );
            }
        }
        out.push_str("}\n");
        out
    }
}
