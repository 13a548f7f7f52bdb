//! Filesystem layout of a flow.

use std::io;
use std::path::{Path, PathBuf};

/// The three per-flow directories, derived from the flow name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowPaths {
    /// Persistent data, kept across restarts.
    pub data: PathBuf,
    /// Source state, kept across restarts.
    pub state: PathBuf,
    /// Scratch space, removed on cleanup.
    pub scratch: PathBuf,
}

impl FlowPaths {
    /// Derives `<root>/data/<name>`, `<root>/state/<name>` and `<root>/tmp/<name>`.
    #[must_use]
    pub fn for_flow(root: &Path, name: &str) -> Self {
        Self {
            data: root.join("data").join(name),
            state: root.join("state").join(name),
            scratch: root.join("tmp").join(name),
        }
    }

    /// Creates the persistent directories if missing.
    ///
    /// Scratch is left to plugins, which create it on demand.
    pub fn ensure_persistent(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.data)?;
        std::fs::create_dir_all(&self.state)
    }

    /// Removes the scratch tree. A missing directory is not an error.
    pub async fn remove_scratch(&self) -> io::Result<()> {
        match tokio::fs::remove_dir_all(&self.scratch).await {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}
