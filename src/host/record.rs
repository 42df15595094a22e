// Author: Eshan Roy
// SPDX-License-Identifier: MIT

//! Registry records.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use super::loader::ModuleUnit;
use crate::entry::{ModuleEntryPoint, ModuleInstance};
use crate::manifest::ModuleManifest;

/// A module that loaded and initialized successfully.
pub struct LoadedModule {
    manifest: ModuleManifest,
    path: PathBuf,
    loaded_at: DateTime<Utc>,
    // Field order matters: the instance drops before the unit that maps its code.
    instance: ModuleInstance,
    unit: Box<dyn ModuleUnit>,
}

impl LoadedModule {
    pub(crate) fn new(
        manifest: ModuleManifest,
        instance: ModuleInstance,
        unit: Box<dyn ModuleUnit>,
    ) -> Self {
        Self {
            path: unit.path().to_path_buf(),
            manifest,
            loaded_at: Utc::now(),
            instance,
            unit,
        }
    }

    pub fn manifest(&self) -> &ModuleManifest {
        &self.manifest
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn info(&self) -> LoadedModuleInfo {
        LoadedModuleInfo {
            manifest: self.manifest.clone(),
            path: self.path.clone(),
            loaded_at: self.loaded_at,
        }
    }

    pub(crate) fn entry_point(&mut self) -> &mut dyn ModuleEntryPoint {
        self.instance.entry_point()
    }

    /// Destroy the entry point, then release the isolation context.
    pub(crate) fn release(self) {
        let LoadedModule { instance, unit, .. } = self;
        drop(instance);
        unit.unload();
    }
}

impl fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModule")
            .field("manifest", &self.manifest)
            .field("path", &self.path)
            .field("loaded_at", &self.loaded_at)
            .finish()
    }
}

/// Snapshot of a registry record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadedModuleInfo {
    pub manifest: ModuleManifest,
    pub path: PathBuf,
    pub loaded_at: DateTime<Utc>,
}
