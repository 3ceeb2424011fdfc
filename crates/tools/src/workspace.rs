//! On-disk directories used by a session.

use std::path::{Path, PathBuf};

use tracing::debug;

const SCRIPTS_DIR: &str = "custom_scripts";
const SCREENSHOTS_DIR: &str = "browser_screenshots";
const DOWNLOADS_DIR: &str = "downloads";
const PROFILE_DIR: &str = "browser_profile";

/// Directory layout under the working root.
///
/// The profile directory is never cleaned up so that cookies and logins
/// survive across sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceLayout {
    root: PathBuf,
}

impl WorkspaceLayout {
    /// Creates a layout rooted at `root`. Nothing is touched on disk.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Working root for relative tool paths.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The only place the agent may write script files.
    pub fn scripts_dir(&self) -> PathBuf {
        self.root.join(SCRIPTS_DIR)
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        self.root.join(SCREENSHOTS_DIR)
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.root.join(DOWNLOADS_DIR)
    }

    /// Persistent browser user-data directory.
    pub fn profile_dir(&self) -> PathBuf {
        self.root.join(PROFILE_DIR)
    }

    /// Ensures every directory of the layout exists.
    ///
    /// Safe to call any number of times.
    pub fn prepare(&self) -> std::io::Result<()> {
        for dir in [
            self.root.clone(),
            self.scripts_dir(),
            self.screenshots_dir(),
            self.downloads_dir(),
            self.profile_dir(),
        ] {
            std::fs::create_dir_all(&dir)?;
            debug!(dir = %dir.display(), "Workspace directory ready");
        }
        Ok(())
    }

    /// Resolves a tool-supplied path against the working root.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}
