// Author: Eshan Roy
// SPDX-License-Identifier: MIT

//! Loading a candidate file into an isolation context.

use libloading::{Library, Symbol};
use std::ffi::CStr;
use std::os::raw::c_char;
use std::path::Path;

use crate::context::IsolationContext;
use crate::entry::{exports, DestroyFn, ModuleEntryPoint, ModuleInstance};
use crate::error::LoadError;
use crate::manifest::ModuleManifest;

type ApiVersionFn = unsafe extern "C" fn() -> u32;
type ManifestFn = unsafe extern "C" fn() -> *const c_char;
#[allow(improper_ctypes_definitions)]
type CreateFn = unsafe extern "C" fn() -> *mut dyn ModuleEntryPoint;

/// Turns candidate files into loaded units.
pub trait ModuleLoader: Send + Sync {
    /// Whether a discovered file should be tried as a module.
    fn is_candidate(&self, path: &Path) -> bool;

    /// Create an isolation context for `path` and load the file's code into it.
    fn load(&self, path: &Path) -> Result<Box<dyn ModuleUnit>, LoadError>;
}

/// A module file whose code is loaded into its own isolation context.
///
/// Dropping a unit releases its context.
pub trait ModuleUnit: Send + Sync {
    fn path(&self) -> &Path;

    /// The embedded manifest, or `None` when the file is not a module.
    fn manifest(&self) -> Result<Option<ModuleManifest>, LoadError>;

    /// ABI version the module was built against.
    fn api_version(&self) -> Result<u32, LoadError>;

    /// Create a fresh entry point instance.
    fn instantiate(&self) -> Result<ModuleInstance, LoadError>;

    /// Release the isolation context and everything loaded through it.
    fn unload(self: Box<Self>);
}

/// Loads native shared libraries.
#[derive(Debug, Clone)]
pub struct NativeLoader {
    extension: String,
    shared: Vec<String>,
}

impl NativeLoader {
    pub fn new(extension: impl Into<String>, shared: Vec<String>) -> Self {
        Self {
            extension: extension.into(),
            shared,
        }
    }
}

impl ModuleLoader for NativeLoader {
    fn is_candidate(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension))
    }

    fn load(&self, path: &Path) -> Result<Box<dyn ModuleUnit>, LoadError> {
        let mut context = IsolationContext::new(path, &self.shared)?;
        context.load_module(path)?;
        Ok(Box::new(NativeModule { context }))
    }
}

/// A shared library loaded through its own [`IsolationContext`].
#[derive(Debug)]
pub struct NativeModule {
    context: IsolationContext,
}

impl NativeModule {
    fn library(&self) -> Result<&Library, LoadError> {
        self.context.library().ok_or_else(|| LoadError::Context {
            path: self.context.module_path().to_path_buf(),
            message: "Module library is not loaded".to_string(),
        })
    }

    fn symbol<T>(&self, name: &[u8]) -> Result<Symbol<'_, T>, LoadError> {
        let library = self.library()?;
        unsafe { library.get::<T>(name) }.map_err(|e| LoadError::SymbolNotFound {
            symbol: format!("{}: {}", exports::display(name), e),
        })
    }
}

impl ModuleUnit for NativeModule {
    fn path(&self) -> &Path {
        self.context.module_path()
    }

    fn manifest(&self) -> Result<Option<ModuleManifest>, LoadError> {
        let manifest_fn = match self.symbol::<ManifestFn>(exports::MANIFEST) {
            Ok(symbol) => symbol,
            Err(_) => return Ok(None),
        };

        let raw = unsafe { manifest_fn() };
        if raw.is_null() {
            return Ok(None);
        }

        // The manifest string is static data owned by the library.
        let text = unsafe { CStr::from_ptr(raw) }
            .to_str()
            .map_err(|e| LoadError::InvalidManifest {
                message: format!("Manifest is not valid UTF-8: {}", e),
            })?;

        ModuleManifest::from_toml(text).map(Some)
    }

    fn api_version(&self) -> Result<u32, LoadError> {
        let version_fn = self.symbol::<ApiVersionFn>(exports::API_VERSION)?;
        Ok(unsafe { version_fn() })
    }

    fn instantiate(&self) -> Result<ModuleInstance, LoadError> {
        let create: CreateFn = *self.symbol::<CreateFn>(exports::CREATE)?;
        let destroy: DestroyFn = *self.symbol::<DestroyFn>(exports::DESTROY)?;

        let raw = unsafe { create() };
        if raw.is_null() {
            return Err(LoadError::CreationFailed {
                message: "Module factory returned null".to_string(),
            });
        }

        // The instance is stored ahead of this unit in the registry record,
        // so the library stays mapped until after `destroy` runs.
        Ok(unsafe { ModuleInstance::from_raw(raw, destroy) })
    }

    fn unload(self: Box<Self>) {
        self.context.unload();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_is_candidate_matches_extension() {
        let loader = NativeLoader::new("so", Vec::new());
        assert!(loader.is_candidate(Path::new("/mods/libecho.so")));
        assert!(loader.is_candidate(Path::new("/mods/libecho.SO")));
        assert!(!loader.is_candidate(Path::new("/mods/libecho.deps.toml")));
        assert!(!loader.is_candidate(Path::new("/mods/README")));
    }

    #[test]
    fn test_load_rejects_non_library() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.so");
        fs::write(&path, b"\x7fELF but not really").unwrap();

        let loader = NativeLoader::new("so", Vec::new());
        let err = loader.load(&path).err().unwrap();
        assert!(matches!(err, LoadError::Library { .. }));
    }

    #[test]
    fn test_load_reports_missing_private_dependency() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("libecho.so");
        fs::write(&path, b"").unwrap();
        fs::write(
            dir.path().join("libecho.deps.toml"),
            "[dependencies]\nzstd = \"libzstd.so\"\n",
        )
        .unwrap();

        let loader = NativeLoader::new("so", Vec::new());
        let err = loader.load(&path).err().unwrap();
        assert!(matches!(err, LoadError::DependencyNotFound { .. }));
    }
}
