//! Source-state persistence.

use dashmap::DashMap;
use std::path::{Path, PathBuf};

use super::SourceState;
use crate::errors::StateError;

/// File name of the persisted state inside a flow's state directory.
pub const STATE_FILE: &str = "sources.json";

/// Storage contract for [`SourceState`].
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn StateStore>`.
/// Calls may block; async callers run them on the blocking pool.
#[cfg_attr(test, mockall::automock)]
pub trait StateStore: Send + Sync {
    /// Loads the state of `flow`. Missing state loads as empty.
    fn load(&self, flow: &str) -> Result<SourceState, StateError>;

    /// Replaces the state of `flow`.
    fn save(&self, flow: &str, state: &SourceState) -> Result<(), StateError>;
}

/// JSON files at `<state root>/<flow>/sources.json`.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    root: PathBuf,
}

impl FileStateStore {
    /// Creates a store rooted at a state directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates a store under an engine root directory, matching the
    /// `state` directory of [`FlowPaths`](crate::flow::FlowPaths).
    #[must_use]
    pub fn under(root_dir: &Path) -> Self {
        Self::new(root_dir.join("state"))
    }

    /// Path of the state file of `flow`.
    #[must_use]
    pub fn path(&self, flow: &str) -> PathBuf {
        self.root.join(flow).join(STATE_FILE)
    }

    fn io_error(path: &Path, source: std::io::Error) -> StateError {
        StateError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

impl StateStore for FileStateStore {
    fn load(&self, flow: &str) -> Result<SourceState, StateError> {
        let path = self.path(flow);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(SourceState::default())
            }
            Err(e) => return Err(Self::io_error(&path, e)),
        };
        serde_json::from_slice(&raw).map_err(|source| StateError::Serialization {
            flow: flow.to_string(),
            source,
        })
    }

    fn save(&self, flow: &str, state: &SourceState) -> Result<(), StateError> {
        let path = self.path(flow);
        let dir = self.root.join(flow);
        std::fs::create_dir_all(&dir).map_err(|e| Self::io_error(&dir, e))?;

        let encoded =
            serde_json::to_vec_pretty(state).map_err(|source| StateError::Serialization {
                flow: flow.to_string(),
                source,
            })?;

        // Write-then-rename so readers never observe a truncated file.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, encoded).map_err(|e| Self::io_error(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| Self::io_error(&path, e))
    }
}

/// In-memory state, lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    states: DashMap<String, SourceState>,
}

impl MemoryStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, flow: &str) -> Result<SourceState, StateError> {
        Ok(self
            .states
            .get(flow)
            .map(|s| s.value().clone())
            .unwrap_or_default())
    }

    fn save(&self, flow: &str, state: &SourceState) -> Result<(), StateError> {
        self.states.insert(flow.to_string(), state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowPaths;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn sample() -> SourceState {
        let mut state = SourceState::new();
        state.advance_checkpoint("http://feed", Utc::now());
        state.record_signature("abc", Utc::now());
        state
    }

    #[test]
    fn test_file_store_roundtrip() {
        let root = tempfile::tempdir().unwrap();
        let store = FileStateStore::under(root.path());

        assert_eq!(store.load("news").unwrap(), SourceState::default());

        let state = sample();
        store.save("news", &state).unwrap();
        assert_eq!(store.load("news").unwrap(), state);
        assert!(!store.path("news").with_extension("json.tmp").exists());
    }

    #[test]
    fn test_file_store_matches_flow_layout() {
        let root = tempfile::tempdir().unwrap();
        let store = FileStateStore::under(root.path());
        let paths = FlowPaths::for_flow(root.path(), "news");
        assert_eq!(store.path("news"), paths.state.join(STATE_FILE));
    }

    #[test]
    fn test_file_store_corrupt_state() {
        let root = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(root.path());
        std::fs::create_dir_all(root.path().join("news")).unwrap();
        std::fs::write(store.path("news"), b"{ nope").unwrap();

        let err = store.load("news").unwrap_err();
        assert!(matches!(err, StateError::Serialization { .. }));
    }

    #[test]
    fn test_memory_store_isolates_flows() {
        let store = MemoryStateStore::new();
        store.save("a", &sample()).unwrap();

        assert_eq!(store.load("a").unwrap().checkpoints.len(), 1);
        assert!(store.load("b").unwrap().checkpoints.is_empty());
    }
}
