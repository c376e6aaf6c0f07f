//! The bound project directory and the coverage data accumulated for it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{PilotError, Result};
use crate::model::{CoverageRatio, LineCoverageRecord};

/// State for one project. Created by [`SessionRegistry::initialize`] and
/// replaced wholesale on re-initialization.
#[derive(Debug, Clone)]
pub struct Session {
    project_dir: PathBuf,
    /// Per-class ratios. `None` until aggregation has run at least once.
    pub(crate) coverage_percentage: Option<BTreeMap<String, CoverageRatio>>,
    /// Raw per-line records, keyed by fully qualified class name.
    pub(crate) coverage_stats: BTreeMap<String, Vec<LineCoverageRecord>>,
}

impl Session {
    fn new(project_dir: PathBuf) -> Self {
        Self {
            project_dir,
            coverage_percentage: None,
            coverage_stats: BTreeMap::new(),
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Aggregated ratios, if aggregation has ever run in this session.
    pub fn coverage_percentage(&self) -> Option<&BTreeMap<String, CoverageRatio>> {
        self.coverage_percentage.as_ref()
    }

    pub fn coverage_stats(&self) -> &BTreeMap<String, Vec<LineCoverageRecord>> {
        &self.coverage_stats
    }
}

/// Holds at most one [`Session`]. Every operation except initialization goes
/// through [`SessionRegistry::require`].
#[derive(Debug, Default)]
pub struct SessionRegistry {
    current: Option<Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the registry to `path`, discarding any previous session.
    /// Returns the session, whose `project_dir` is the resolved absolute path.
    pub fn initialize(&mut self, path: impl AsRef<Path>) -> Result<&Session> {
        let path = path.as_ref();
        let resolved = std::path::absolute(path)
            .map_err(|_| PilotError::NotADirectory(path.to_path_buf()))?;
        if !resolved.is_dir() {
            return Err(PilotError::NotADirectory(resolved));
        }

        info!(project = %resolved.display(), "session initialized");
        Ok(&*self.current.insert(Session::new(resolved)))
    }

    pub fn require(&self) -> Result<&Session> {
        self.current.as_ref().ok_or(PilotError::NotInitialized)
    }

    pub fn require_mut(&mut self) -> Result<&mut Session> {
        self.current.as_mut().ok_or(PilotError::NotInitialized)
    }
}
