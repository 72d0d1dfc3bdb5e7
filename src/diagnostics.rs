use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::errors::CrawlError;
use crate::state::{Action, PageState};

/// Whether a page state was captured before or after executing an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatePhase {
    PreAction,
    PostAction,
}

impl PageStatePhase {
    fn as_str(&self) -> &'static str {
        match self {
            PageStatePhase::PreAction => "pre-action",
            PageStatePhase::PostAction => "post-action",
        }
    }
}

/// Sink for crawl diagnostics: every executed action, every observed page
/// state with its DOM dumps, and the navigations discovered per state.
pub trait DiagnosticsWriter: Send + Sync {
    fn log_action(&self, action: &Action) -> Result<(), CrawlError>;
    fn log_page_state(&self, state: &PageState, phase: PageStatePhase) -> Result<(), CrawlError>;
    fn log_navigations(&self, state_id: &str, navigations: &[Action]) -> Result<(), CrawlError>;
    /// Flushes accumulated metadata. Must be called once, at crawl end.
    fn close(&self) -> Result<(), CrawlError>;
}

/// Writer used when diagnostics are disabled.
pub struct NoopWriter;

impl DiagnosticsWriter for NoopWriter {
    fn log_action(&self, _action: &Action) -> Result<(), CrawlError> {
        Ok(())
    }
    fn log_page_state(&self, _state: &PageState, _phase: PageStatePhase) -> Result<(), CrawlError> {
        Ok(())
    }
    fn log_navigations(&self, _state_id: &str, _navigations: &[Action]) -> Result<(), CrawlError> {
        Ok(())
    }
    fn close(&self) -> Result<(), CrawlError> {
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StateMetadata {
    unique_id: String,
    url: String,
    title: String,
    occurrence: usize,
    #[serde(rename = "type")]
    phase: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct NavigationEntry {
    page_state_id: String,
    url: String,
    navigation_count: usize,
    navigations: Vec<Action>,
    timestamp: u64,
}

#[derive(Default)]
struct DiskWriterState {
    // Insertion order preserved for index.json
    order: Vec<String>,
    index: HashMap<String, StateMetadata>,
    actions: Vec<Action>,
}

/// Writes diagnostics under a directory: `actions.json` and `index.json`
/// at the root, plus a per-state subdirectory holding the raw and
/// stripped DOM dumps and the navigations discovered there.
pub struct DiskWriter {
    directory: PathBuf,
    state: Mutex<DiskWriterState>,
}

impl DiskWriter {
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self, CrawlError> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;
        Ok(Self {
            directory,
            state: Mutex::new(DiskWriterState::default()),
        })
    }

    fn state_dir(&self, state_id: &str) -> Result<PathBuf, CrawlError> {
        let dir = self.directory.join(state_id);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

impl DiagnosticsWriter for DiskWriter {
    fn log_action(&self, action: &Action) -> Result<(), CrawlError> {
        let mut state = self.state.lock().unwrap();
        state.actions.push(action.clone());
        Ok(())
    }

    fn log_page_state(&self, page: &PageState, phase: PageStatePhase) -> Result<(), CrawlError> {
        {
            let mut state = self.state.lock().unwrap();
            if let Some(metadata) = state.index.get_mut(&page.unique_id) {
                metadata.occurrence += 1;
                return Ok(());
            }
            state.order.push(page.unique_id.clone());
            state.index.insert(
                page.unique_id.clone(),
                StateMetadata {
                    unique_id: page.unique_id.clone(),
                    url: page.url.clone(),
                    title: page.title.clone(),
                    occurrence: 1,
                    phase: phase.as_str().to_string(),
                },
            );
        }

        // First sighting: dump the DOMs into the state's directory.
        let dir = self.state_dir(&page.unique_id)?;
        fs::write(dir.join("dom.html"), &page.dom)?;
        fs::write(dir.join("stripped-dom.html"), &page.stripped_dom)?;
        Ok(())
    }

    fn log_navigations(&self, state_id: &str, navigations: &[Action]) -> Result<(), CrawlError> {
        let url = {
            let state = self.state.lock().unwrap();
            state
                .index
                .get(state_id)
                .map(|metadata| metadata.url.clone())
                .unwrap_or_default()
        };

        let dir = self.state_dir(state_id)?;
        let path = dir.join("navigations.json");

        let entry = match fs::read_to_string(&path) {
            Ok(existing) => {
                let mut entry: NavigationEntry = serde_json::from_str(&existing)?;
                entry.navigations.extend_from_slice(navigations);
                entry.navigation_count = entry.navigations.len();
                entry.timestamp = unix_timestamp();
                entry
            }
            Err(_) => NavigationEntry {
                page_state_id: state_id.to_string(),
                url,
                navigation_count: navigations.len(),
                navigations: navigations.to_vec(),
                timestamp: unix_timestamp(),
            },
        };

        fs::write(path, serde_json::to_string_pretty(&entry)?)?;
        Ok(())
    }

    fn close(&self) -> Result<(), CrawlError> {
        let state = self.state.lock().unwrap();

        fs::write(
            self.directory.join("actions.json"),
            serde_json::to_string_pretty(&state.actions)?,
        )?;

        let index: Vec<&StateMetadata> = state
            .order
            .iter()
            .filter_map(|id| state.index.get(id))
            .collect();
        fs::write(
            self.directory.join("index.json"),
            serde_json::to_string_pretty(&index)?,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Action, ActionKind};

    fn temp_directory(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!("statewalk-diag-{label}-{}", std::process::id()))
    }

    fn sample_state(id: &str) -> PageState {
        PageState {
            unique_id: id.to_string(),
            origin_id: "origin".to_string(),
            url: format!("https://example.test/{id}"),
            title: id.to_string(),
            dom: "<html></html>".to_string(),
            stripped_dom: "<html></html>".to_string(),
            depth: 1,
            is_root: false,
            navigation_action: None,
        }
    }

    #[test]
    fn test_disk_writer_layout() {
        let dir = temp_directory("layout");
        let writer = DiskWriter::new(&dir).unwrap();

        let state = sample_state("state-a");
        writer
            .log_page_state(&state, PageStatePhase::PostAction)
            .unwrap();
        writer
            .log_action(&Action::load_url("https://example.test/", "origin".into(), 0))
            .unwrap();
        writer
            .log_navigations(
                "state-a",
                &[Action::load_url("https://example.test/next", "state-a".into(), 1)],
            )
            .unwrap();
        writer.close().unwrap();

        assert!(dir.join("actions.json").exists());
        assert!(dir.join("index.json").exists());
        assert!(dir.join("state-a").join("dom.html").exists());
        assert!(dir.join("state-a").join("stripped-dom.html").exists());
        assert!(dir.join("state-a").join("navigations.json").exists());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_repeat_sighting_counts_occurrence() {
        let dir = temp_directory("occurrence");
        let writer = DiskWriter::new(&dir).unwrap();

        let state = sample_state("state-b");
        writer
            .log_page_state(&state, PageStatePhase::PostAction)
            .unwrap();
        writer
            .log_page_state(&state, PageStatePhase::PreAction)
            .unwrap();
        writer.close().unwrap();

        let index: Vec<serde_json::Value> =
            serde_json::from_str(&fs::read_to_string(dir.join("index.json")).unwrap()).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index[0]["occurrence"], 2);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_navigations_appended() {
        let dir = temp_directory("navigations");
        let writer = DiskWriter::new(&dir).unwrap();

        let first = Action::load_url("https://example.test/a", "s".into(), 1);
        let second = Action::load_url("https://example.test/b", "s".into(), 1);
        writer.log_navigations("s", std::slice::from_ref(&first)).unwrap();
        writer.log_navigations("s", std::slice::from_ref(&second)).unwrap();

        let entry: NavigationEntry =
            serde_json::from_str(&fs::read_to_string(dir.join("s/navigations.json")).unwrap())
                .unwrap();
        assert_eq!(entry.navigation_count, 2);
        assert!(matches!(entry.navigations[0].kind, ActionKind::LoadUrl { .. }));

        fs::remove_dir_all(&dir).unwrap();
    }
}
