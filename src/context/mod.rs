// Author: Eshan Roy
// SPDX-License-Identifier: MIT

//! Per-module isolation context.
//!
//! Each module file gets its own context. Dependency resolution only looks
//! at the module's deployment manifest, rooted at the module's own
//! directory, and every library handle opened for the module is owned here
//! and released when the context is unloaded.
//!
//! On glibc a context with private dependencies gets its own link-map
//! namespace (`dlmopen`), so a module binds to its own copy of a dependency
//! even when another module ships a different file with the same soname.
//! Elsewhere on Unix libraries are opened with `RTLD_LOCAL`, which keeps
//! their symbols out of the global namespace but lets the loader reuse an
//! already loaded soname. On Windows they are opened with
//! `LOAD_WITH_ALTERED_SEARCH_PATH`, which roots the search for further
//! dependencies at the module's directory.

mod deployment;
#[cfg(all(target_os = "linux", target_env = "gnu"))]
mod namespace;

pub use deployment::{DeploymentManifest, PrivateDependency, DEPLOYMENT_SUFFIX};

use libloading::Library;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::LoadError;

/// Dependency resolution and code loading scoped to one module file.
pub struct IsolationContext {
    module_path: PathBuf,
    base_dir: PathBuf,
    deployment: DeploymentManifest,
    shared: BTreeSet<String>,
    module: Option<Library>,
    /// Private dependencies in load order.
    dependencies: Vec<(String, Library)>,
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    namespace: namespace::Namespace,
}

impl IsolationContext {
    /// Create a context for `module_path`.
    ///
    /// Identifiers in `shared` are left to the host's default resolution and
    /// are never loaded privately.
    pub fn new(module_path: impl Into<PathBuf>, shared: &[String]) -> Result<Self, LoadError> {
        let module_path = module_path.into();
        let base_dir = module_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let deployment = DeploymentManifest::load_for(&module_path)?;

        Ok(Self {
            module_path,
            base_dir,
            deployment,
            shared: shared.iter().cloned().collect(),
            module: None,
            dependencies: Vec::new(),
            #[cfg(all(target_os = "linux", target_env = "gnu"))]
            namespace: namespace::Namespace::default(),
        })
    }

    pub fn module_path(&self) -> &Path {
        &self.module_path
    }

    pub fn deployment(&self) -> &DeploymentManifest {
        &self.deployment
    }

    /// Find the on-disk artifact for a private dependency.
    ///
    /// Returns `None` for identifiers the deployment manifest does not list,
    /// for shared identifiers, and for listed files that do not exist.
    pub fn resolve(&self, dependency: &str) -> Option<PathBuf> {
        if self.shared.contains(dependency) {
            return None;
        }
        let relative = self.deployment.get(dependency)?;
        let path = self.base_dir.join(relative);
        path.is_file().then_some(path)
    }

    /// Load `path` into this context, preceded by every private dependency
    /// the deployment manifest declares.
    ///
    /// Dependencies are tried in declaration order. One that fails because it
    /// needs a dependency declared after it is retried once that one is in;
    /// loading stops when a full round makes no progress.
    pub fn load_module(&mut self, path: &Path) -> Result<&Library, LoadError> {
        if self.module.is_some() {
            return Err(LoadError::Context {
                path: path.to_path_buf(),
                message: "Context already holds a loaded module".to_string(),
            });
        }

        let mut pending = Vec::new();
        for dep in &self.deployment.dependencies {
            if self.shared.contains(&dep.name) {
                debug!("Dependency '{}' is shared with the host, not loading privately", dep.name);
                continue;
            }
            let dep_path = self
                .resolve(&dep.name)
                .ok_or_else(|| LoadError::DependencyNotFound {
                    name: dep.name.clone(),
                })?;
            pending.push((dep.name.clone(), dep_path));
        }

        while !pending.is_empty() {
            let attempted = pending.len();
            let mut first_error = None;
            let mut deferred = Vec::new();

            for (name, dep_path) in pending {
                match self.open(&dep_path) {
                    Ok(library) => {
                        debug!("Loaded private dependency '{}' from {:?}", name, dep_path);
                        self.dependencies.push((name, library));
                    }
                    Err(e) => {
                        debug!("Deferring private dependency '{}': {}", name, e);
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                        deferred.push((name, dep_path));
                    }
                }
            }

            if deferred.len() == attempted {
                if let Some(err) = first_error {
                    return Err(err);
                }
            }
            pending = deferred;
        }

        debug!("Loading module library: {:?}", path);
        let library = self.open(path)?;
        Ok(self.module.insert(library))
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    fn open(&mut self, path: &Path) -> Result<Library, LoadError> {
        if self.has_private_dependencies() {
            self.namespace.open(path)
        } else {
            open_local(path)
        }
    }

    #[cfg(not(all(target_os = "linux", target_env = "gnu")))]
    fn open(&mut self, path: &Path) -> Result<Library, LoadError> {
        open_local(path)
    }

    /// Whether any declared dependency is loaded privately rather than shared.
    pub fn has_private_dependencies(&self) -> bool {
        self.deployment
            .dependencies
            .iter()
            .any(|dep| !self.shared.contains(&dep.name))
    }

    /// The loaded module library, if any.
    pub fn library(&self) -> Option<&Library> {
        self.module.as_ref()
    }

    /// Identifiers of the private dependencies loaded so far.
    pub fn loaded_dependencies(&self) -> Vec<&str> {
        self.dependencies
            .iter()
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Release every handle loaded through this context.
    pub fn unload(mut self) {
        self.release();
    }

    /// Module first, then dependencies in reverse load order. Safe to call
    /// repeatedly.
    fn release(&mut self) {
        if let Some(library) = self.module.take() {
            drop(library);
            debug!("Released module library: {:?}", self.module_path);
        }
        while let Some((name, library)) = self.dependencies.pop() {
            drop(library);
            debug!("Released private dependency '{}'", name);
        }
    }
}

impl Drop for IsolationContext {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for IsolationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IsolationContext")
            .field("module_path", &self.module_path)
            .field("loaded", &self.module.is_some())
            .field("dependencies", &self.loaded_dependencies())
            .finish()
    }
}

#[cfg(unix)]
fn open_local(path: &Path) -> Result<Library, LoadError> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_LOCAL, RTLD_NOW};

    unsafe { UnixLibrary::open(Some(path), RTLD_NOW | RTLD_LOCAL) }
        .map(Library::from)
        .map_err(|e| library_error(path, e))
}

#[cfg(windows)]
fn open_local(path: &Path) -> Result<Library, LoadError> {
    use libloading::os::windows::{Library as WindowsLibrary, LOAD_WITH_ALTERED_SEARCH_PATH};

    unsafe { WindowsLibrary::load_with_flags(path, LOAD_WITH_ALTERED_SEARCH_PATH) }
        .map(Library::from)
        .map_err(|e| library_error(path, e))
}

#[cfg(not(any(unix, windows)))]
fn open_local(path: &Path) -> Result<Library, LoadError> {
    unsafe { Library::new(path) }.map_err(|e| library_error(path, e))
}

fn library_error(path: &Path, err: impl fmt::Display) -> LoadError {
    LoadError::Library {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn module_dir(root: &Path, name: &str, deps: &str) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(dir.join("native")).unwrap();
        let module = dir.join(format!("lib{}.so", name));
        fs::write(&module, b"not really a library").unwrap();
        fs::write(DeploymentManifest::path_for(&module), deps).unwrap();
        module
    }

    const SQLITE_DEPS: &str = "[dependencies]\nsqlite = \"native/libsqlite3.so\"\n";

    #[test]
    fn test_resolve_uses_module_directory() {
        let root = TempDir::new().unwrap();
        let module = module_dir(root.path(), "echo", SQLITE_DEPS);
        let dep = module.parent().unwrap().join("native/libsqlite3.so");
        fs::write(&dep, b"v1").unwrap();

        let context = IsolationContext::new(&module, &[]).unwrap();
        assert_eq!(context.resolve("sqlite"), Some(dep));
        assert_eq!(context.resolve("zstd"), None);
    }

    #[test]
    fn test_same_identifier_resolves_privately_per_context() {
        let root = TempDir::new().unwrap();
        // The host's own copy must never be picked.
        fs::write(root.path().join("libsqlite3.so"), b"host").unwrap();

        let a = module_dir(root.path(), "alpha", SQLITE_DEPS);
        let b = module_dir(root.path(), "beta", SQLITE_DEPS);
        fs::write(a.parent().unwrap().join("native/libsqlite3.so"), b"v1").unwrap();
        fs::write(b.parent().unwrap().join("native/libsqlite3.so"), b"v2").unwrap();

        let ctx_a = IsolationContext::new(&a, &[]).unwrap();
        let ctx_b = IsolationContext::new(&b, &[]).unwrap();
        let resolved_a = ctx_a.resolve("sqlite").unwrap();
        let resolved_b = ctx_b.resolve("sqlite").unwrap();

        assert_ne!(resolved_a, resolved_b);
        assert!(resolved_a.starts_with(a.parent().unwrap()));
        assert!(resolved_b.starts_with(b.parent().unwrap()));
        assert_eq!(fs::read(resolved_a).unwrap(), b"v1");
        assert_eq!(fs::read(resolved_b).unwrap(), b"v2");
    }

    #[test]
    fn test_shared_identifier_not_resolved() {
        let root = TempDir::new().unwrap();
        let module = module_dir(root.path(), "echo", SQLITE_DEPS);
        fs::write(module.parent().unwrap().join("native/libsqlite3.so"), b"v1").unwrap();

        let context = IsolationContext::new(&module, &["sqlite".to_string()]).unwrap();
        assert_eq!(context.resolve("sqlite"), None);
    }

    #[test]
    fn test_declared_dependency_missing_on_disk() {
        let root = TempDir::new().unwrap();
        let module = module_dir(root.path(), "echo", SQLITE_DEPS);

        let mut context = IsolationContext::new(&module, &[]).unwrap();
        let err = context.load_module(&module).unwrap_err();
        assert!(matches!(err, LoadError::DependencyNotFound { ref name } if name == "sqlite"));
        assert!(context.library().is_none());
    }

    #[test]
    fn test_non_library_file_fails_to_load() {
        let root = TempDir::new().unwrap();
        let module = module_dir(root.path(), "echo", "");

        let mut context = IsolationContext::new(&module, &[]).unwrap();
        let err = context.load_module(&module).unwrap_err();
        assert!(matches!(err, LoadError::Library { .. }));
        context.unload();
    }

    #[test]
    fn test_malformed_deployment_manifest_rejects_context() {
        let root = TempDir::new().unwrap();
        let module = module_dir(root.path(), "echo", "[dependencies]\nsqlite = \"/usr/lib/libsqlite3.so\"\n");
        let err = IsolationContext::new(&module, &[]).unwrap_err();
        assert!(matches!(err, LoadError::Context { .. }));
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    mod native {
        use super::*;
        use std::process::Command;

        /// Compile `source` into a shared library at `output`.
        fn cc(source: &str, output: &Path, link: &[&str]) {
            let source_path = output.with_extension("c");
            fs::write(&source_path, source).unwrap();
            let status = Command::new("cc")
                .args(["-shared", "-fPIC", "-o"])
                .arg(output)
                .arg(&source_path)
                .args(link)
                .status()
                .unwrap();
            assert!(status.success(), "cc failed for {}", output.display());
        }

        fn call(context: &IsolationContext, symbol: &[u8]) -> i32 {
            let library = context.library().unwrap();
            unsafe {
                let function = library.get::<unsafe extern "C" fn() -> i32>(symbol).unwrap();
                function()
            }
        }

        /// `dir/libNAME.so` linked against a private `libdep.so` returning `version`.
        fn module_with_dep(root: &Path, name: &str, version: i32) -> PathBuf {
            let dir = root.join(name);
            let native = dir.join("native");
            fs::create_dir_all(&native).unwrap();

            cc(
                &format!("int native(void) {{ return {}; }}\n", version),
                &native.join("libdep.so"),
                &["-Wl,-soname,libdep.so"],
            );
            let module = dir.join(format!("lib{}.so", name));
            let native_dir = format!("-L{}", native.display());
            cc(
                "extern int native(void);\nint which(void) { return native(); }\n",
                &module,
                &[&native_dir, "-ldep"],
            );
            fs::write(
                DeploymentManifest::path_for(&module),
                "[dependencies]\ndep = \"native/libdep.so\"\n",
            )
            .unwrap();
            module
        }

        #[test]
        fn test_same_soname_binds_to_own_copy() {
            let root = TempDir::new().unwrap();
            let alpha = module_with_dep(root.path(), "alpha", 1);
            let beta = module_with_dep(root.path(), "beta", 2);

            let mut ctx_a = IsolationContext::new(&alpha, &[]).unwrap();
            ctx_a.load_module(&alpha).unwrap();
            let mut ctx_b = IsolationContext::new(&beta, &[]).unwrap();
            ctx_b.load_module(&beta).unwrap();

            assert_eq!((call(&ctx_a, b"which\0"), call(&ctx_b, b"which\0")), (1, 2));
            assert_eq!(ctx_a.loaded_dependencies(), vec!["dep"]);

            ctx_a.unload();
            ctx_b.unload();
        }

        #[test]
        fn test_dependency_declared_before_what_it_needs() {
            let root = TempDir::new().unwrap();
            let dir = root.path().join("chain");
            let native = dir.join("native");
            fs::create_dir_all(&native).unwrap();
            let native_dir = format!("-L{}", native.display());

            cc(
                "int base(void) { return 40; }\n",
                &native.join("libzbase.so"),
                &["-Wl,-soname,libzbase.so"],
            );
            cc(
                "extern int base(void);\nint top(void) { return base() + 2; }\n",
                &native.join("libatop.so"),
                &["-Wl,-soname,libatop.so", &native_dir, "-lzbase"],
            );
            let module = dir.join("libchain.so");
            cc(
                "extern int top(void);\nint which(void) { return top(); }\n",
                &module,
                &[&native_dir, "-latop"],
            );
            fs::write(
                DeploymentManifest::path_for(&module),
                "[dependencies]\natop = \"native/libatop.so\"\nzbase = \"native/libzbase.so\"\n",
            )
            .unwrap();

            let mut context = IsolationContext::new(&module, &[]).unwrap();
            context.load_module(&module).unwrap();

            assert_eq!(call(&context, b"which\0"), 42);
            assert_eq!(context.loaded_dependencies(), vec!["zbase", "atop"]);
        }

        #[test]
        fn test_unresolvable_dependency_reports_loader_error() {
            let root = TempDir::new().unwrap();
            let dir = root.path().join("orphan");
            let native = dir.join("native");
            fs::create_dir_all(&native).unwrap();
            let native_dir = format!("-L{}", native.display());

            cc("int base(void) { return 1; }\n", &native.join("libgone.so"), &["-Wl,-soname,libgone.so"]);
            cc(
                "extern int base(void);\nint top(void) { return base(); }\n",
                &native.join("libtop.so"),
                &[&native_dir, "-lgone"],
            );
            fs::remove_file(native.join("libgone.so")).unwrap();
            let module = dir.join("liborphan.so");
            fs::write(&module, b"").unwrap();
            fs::write(
                DeploymentManifest::path_for(&module),
                "[dependencies]\ntop = \"native/libtop.so\"\n",
            )
            .unwrap();

            let mut context = IsolationContext::new(&module, &[]).unwrap();
            let err = context.load_module(&module).unwrap_err();
            assert!(matches!(err, LoadError::Library { ref message, .. } if message.contains("libgone.so")));
            assert!(context.loaded_dependencies().is_empty());
        }
    }
}
