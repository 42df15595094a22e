// Author: Eshan Roy
// SPDX-License-Identifier: MIT

//! Outcome of a discovery pass.

use std::fmt;
use std::path::PathBuf;

use crate::error::LoadError;

/// What happened to one candidate file.
#[derive(Debug)]
pub(crate) enum FileOutcome {
    Loaded(String),
    /// No manifest: not a module.
    Skipped,
    /// The pass was cancelled before this file was started.
    Cancelled,
    Failed(LoadError),
}

/// Summary of [`ModuleHost::load_all`](super::ModuleHost::load_all).
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Names registered by this pass, in completion order.
    pub loaded: Vec<String>,
    /// Files without a manifest.
    pub skipped: Vec<PathBuf>,
    /// Files not attempted because the pass was cancelled.
    pub cancelled: Vec<PathBuf>,
    /// Files rejected with the reason.
    pub failed: Vec<(PathBuf, LoadError)>,
}

impl LoadReport {
    pub(crate) fn record(&mut self, path: PathBuf, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Loaded(name) => self.loaded.push(name),
            FileOutcome::Skipped => self.skipped.push(path),
            FileOutcome::Cancelled => self.cancelled.push(path),
            FileOutcome::Failed(err) => self.failed.push((path, err)),
        }
    }

    /// Number of candidate files seen.
    pub fn total(&self) -> usize {
        self.loaded.len() + self.skipped.len() + self.cancelled.len() + self.failed.len()
    }

    /// True when no candidate failed and none was left out by cancellation.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty()
    }
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} loaded, {} skipped, {} failed",
            self.loaded.len(),
            self.skipped.len(),
            self.failed.len()
        )?;
        if !self.cancelled.is_empty() {
            write!(f, ", {} cancelled", self.cancelled.len())?;
        }
        Ok(())
    }
}
