// Author: Eshan Roy
// SPDX-License-Identifier: MIT

//! Module host: discovery, isolated loading, registry and unload.
//!
//! Per-file failures during [`ModuleHost::load_all`] are logged and recorded
//! in the returned [`LoadReport`]; they never abort the pass. A file's
//! registry entry appears only once its entry point has initialized, and a
//! rejected file leaves nothing behind.

mod loader;
mod record;
mod report;


pub use loader::{ModuleLoader, ModuleUnit, NativeLoader, NativeModule};
pub use record::{LoadedModule, LoadedModuleInfo};
pub use report::LoadReport;

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::config::{CollisionPolicy, HostConfig, HostSettings};
use crate::entry::{ModuleState, ABI_VERSION};
use crate::error::{HostError, LoadError, ModuleError, Result, ResultExt};
use crate::manifest::ModuleManifest;
use crate::services::Services;
use report::FileOutcome;

/// Discovers, loads and tracks modules under a root directory.
pub struct ModuleHost {
    root: PathBuf,
    settings: HostSettings,
    loader: Arc<dyn ModuleLoader>,
    registry: RwLock<HashMap<String, LoadedModule>>,
}

impl ModuleHost {
    /// Create a host that loads native shared libraries.
    pub fn new(config: &HostConfig) -> Result<Self> {
        let loader = NativeLoader::new(
            config.host.module_extension(),
            config.isolation.shared.clone(),
        );
        Self::with_loader(config, Arc::new(loader))
    }

    /// Create a host with a custom loader.
    pub fn with_loader(config: &HostConfig, loader: Arc<dyn ModuleLoader>) -> Result<Self> {
        config.validate()?;

        let root = config.host.modules_dir();
        if !root.exists() {
            debug!("Modules directory does not exist, creating: {:?}", root);
            std::fs::create_dir_all(&root).context(format!(
                "Failed to create modules directory {}",
                root.display()
            ))?;
        }

        Ok(Self {
            root,
            settings: config.host.clone(),
            loader,
            registry: RwLock::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Candidate module files under the root, recursively, sorted by path.
    pub fn discover(&self) -> Vec<PathBuf> {
        WalkDir::new(&self.root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping unreadable entry under {:?}: {}", self.root, e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| self.loader.is_candidate(path))
            .collect()
    }

    /// Load every candidate module under the root.
    ///
    /// `services` is handed unchanged to each initializer. Cancelling
    /// `cancel` stops files that have not started yet; modules receive a
    /// child token and decide themselves whether to honor it.
    pub async fn load_all(&self, services: Arc<Services>, cancel: &CancellationToken) -> LoadReport {
        let candidates = self.discover();
        info!(
            "Loading {} candidate module(s) from {:?}",
            candidates.len(),
            self.root
        );

        let concurrency = self.settings.max_concurrent_loads.max(1);
        let outcomes: Vec<(PathBuf, FileOutcome)> = stream::iter(candidates)
            .map(|path| {
                let services = Arc::clone(&services);
                async move {
                    let outcome = self.load_file(&path, services, cancel).await;
                    (path, outcome)
                }
            })
            .buffered(concurrency)
            .collect()
            .await;

        let mut report = LoadReport::default();
        for (path, outcome) in outcomes {
            report.record(path, outcome);
        }

        info!("Module discovery finished: {}", report);
        report
    }

    async fn load_file(
        &self,
        path: &Path,
        services: Arc<Services>,
        cancel: &CancellationToken,
    ) -> FileOutcome {
        if cancel.is_cancelled() {
            debug!("Load cancelled, not starting {:?}", path);
            return FileOutcome::Cancelled;
        }

        match self.try_load_file(path, services, cancel).await {
            Ok(Some(name)) => FileOutcome::Loaded(name),
            Ok(None) => FileOutcome::Skipped,
            Err(e) => {
                trace_state(path, ModuleState::Rejected);
                error!("Failed to load module {}: {}", path.display(), e);
                FileOutcome::Failed(e)
            }
        }
    }

    /// Steps for a single file. Any early return drops the instance before
    /// the unit, so a rejected file's context is always released.
    async fn try_load_file(
        &self,
        path: &Path,
        services: Arc<Services>,
        cancel: &CancellationToken,
    ) -> std::result::Result<Option<String>, LoadError> {
        trace_state(path, ModuleState::Discovered);
        let unit = self.loader.load(path)?;

        let manifest = match unit.manifest()? {
            Some(manifest) => manifest,
            None => {
                warn!("No module manifest in {}, skipping", path.display());
                unit.unload();
                return Ok(None);
            }
        };
        trace_state(path, ModuleState::ManifestValidated);

        let abi = unit.api_version()?;
        if abi != ABI_VERSION {
            return Err(LoadError::AbiMismatch {
                expected: ABI_VERSION,
                actual: abi,
            });
        }

        let mut instance = unit.instantiate()?;
        trace_state(path, ModuleState::Loaded);

        let name = manifest.name.clone();
        trace_state(path, ModuleState::Initializing);
        let init = AssertUnwindSafe(
            instance
                .entry_point()
                .initialize(services, cancel.child_token()),
        )
        .catch_unwind();
        let result = match self.settings.init_timeout() {
            Some(limit) => match tokio::time::timeout(limit, init).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(LoadError::InitializeTimeout {
                        name,
                        millis: self.settings.init_timeout_ms,
                    })
                }
            },
            None => init.await,
        };
        result
            .unwrap_or_else(|payload| Err(panic_error(payload)))
            .map_err(|e| LoadError::InitializeFailed {
                name: name.clone(),
                message: e.to_string(),
            })?;
        trace_state(path, ModuleState::Active);

        info!(
            "Loaded module '{}' v{} ({}) from {}",
            manifest.name,
            manifest.version,
            manifest.id,
            path.display()
        );
        self.register(LoadedModule::new(manifest, instance, unit), cancel)
            .await?;
        Ok(Some(name))
    }

    /// Insert a fully initialized module, applying the collision policy.
    async fn register(
        &self,
        record: LoadedModule,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), LoadError> {
        enum Insert {
            Fresh,
            Replaced(LoadedModule),
            Refused(LoadedModule),
        }

        let name = record.name().to_string();
        let incoming = record.path().to_path_buf();
        let insert = {
            let mut registry = self.registry.write();
            match registry.entry(name.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(record);
                    Insert::Fresh
                }
                Entry::Occupied(mut slot) => match self.settings.on_name_collision {
                    CollisionPolicy::Replace => Insert::Replaced(slot.insert(record)),
                    CollisionPolicy::Reject => Insert::Refused(record),
                },
            }
        };

        match insert {
            Insert::Fresh => Ok(()),
            Insert::Replaced(displaced) => {
                warn!(
                    "Module name '{}' from {} replaces the module loaded from {}",
                    name,
                    incoming.display(),
                    displaced.path().display()
                );
                if let Err(e) = self.teardown(displaced, cancel).await {
                    warn!("Displaced module did not shut down cleanly: {}", e);
                }
                Ok(())
            }
            Insert::Refused(newcomer) => {
                warn!(
                    "Module name '{}' already registered, rejecting {}",
                    name,
                    newcomer.path().display()
                );
                if let Err(e) = self.teardown(newcomer, cancel).await {
                    warn!("Rejected module did not shut down cleanly: {}", e);
                }
                Err(LoadError::NameCollision { name })
            }
        }
    }

    /// Manifests of every loaded module, sorted by name.
    pub fn get_loaded(&self) -> Vec<ModuleManifest> {
        let mut manifests: Vec<ModuleManifest> = self
            .registry
            .read()
            .values()
            .map(|record| record.manifest().clone())
            .collect();
        manifests.sort_by(|a, b| a.name.cmp(&b.name));
        manifests
    }

    /// Snapshot of every registry record, sorted by name.
    pub fn loaded_info(&self) -> Vec<LoadedModuleInfo> {
        let mut infos: Vec<LoadedModuleInfo> =
            self.registry.read().values().map(LoadedModule::info).collect();
        infos.sort_by(|a, b| a.manifest.name.cmp(&b.manifest.name));
        infos
    }

    pub fn get(&self, name: &str) -> Option<LoadedModuleInfo> {
        self.registry.read().get(name).map(LoadedModule::info)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.registry.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.registry.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.read().is_empty()
    }

    /// Shut down and release the module registered as `name`.
    ///
    /// Unknown names are a no-op. The record leaves the registry before
    /// shutdown starts, and the module is torn down even when shutdown
    /// fails; the failure is still returned.
    pub async fn unload(&self, name: &str, cancel: &CancellationToken) -> Result<()> {
        let record = self.registry.write().remove(name);
        let Some(record) = record else {
            debug!("Module '{}' is not loaded, nothing to unload", name);
            return Ok(());
        };

        info!("Unloading module '{}'", name);
        self.teardown(record, cancel).await
    }

    /// Unload every module in name order, collecting shutdown failures.
    pub async fn unload_all(&self, cancel: &CancellationToken) -> Vec<HostError> {
        let mut names: Vec<String> = self.registry.read().keys().cloned().collect();
        names.sort();

        let mut failures = Vec::new();
        for name in names {
            if let Err(e) = self.unload(&name, cancel).await {
                failures.push(e);
            }
        }
        failures
    }

    async fn teardown(&self, mut record: LoadedModule, cancel: &CancellationToken) -> Result<()> {
        let name = record.name().to_string();
        trace_state(record.path(), ModuleState::ShuttingDown);

        let shutdown =
            AssertUnwindSafe(record.entry_point().shutdown(cancel.child_token())).catch_unwind();
        let result = match self.settings.shutdown_timeout() {
            Some(limit) => tokio::time::timeout(limit, shutdown)
                .await
                .unwrap_or_else(|_| {
                    Ok(Err(ModuleError::new(format!(
                        "timed out after {}ms",
                        self.settings.shutdown_timeout_ms
                    ))))
                }),
            None => shutdown.await,
        }
        .unwrap_or_else(|payload| Err(panic_error(payload)));

        let path = record.path().to_path_buf();
        record.release();
        trace_state(&path, ModuleState::Unloaded);

        result.map_err(|e| {
            error!("Module '{}' failed to shut down: {}", name, e);
            HostError::ShutdownFailed {
                name,
                message: e.to_string(),
            }
        })
    }
}

impl Drop for ModuleHost {
    fn drop(&mut self) {
        let remaining = self.registry.get_mut().len();
        if remaining > 0 {
            warn!(
                "Module host dropped with {} module(s) still loaded; releasing without shutdown",
                remaining
            );
        }
    }
}

/// A module panic reported as an ordinary module error.
fn panic_error(payload: Box<dyn Any + Send>) -> ModuleError {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    ModuleError::new(format!("panicked: {}", detail))
}

fn trace_state(path: &Path, state: ModuleState) {
    debug!("{}: {}", path.display(), state);
}
