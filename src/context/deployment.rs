// Author: Eshan Roy
// SPDX-License-Identifier: MIT

//! Side-car deployment manifest listing a module's private dependencies.

use serde::Deserialize;
use std::path::{Component, Path, PathBuf};

use crate::error::LoadError;

/// Suffix of the deployment manifest placed next to a module file.
pub const DEPLOYMENT_SUFFIX: &str = "deps.toml";

/// Private dependencies of one module, in declaration order.
///
/// ```toml
/// [dependencies]
/// sqlite = "native/libsqlite3.so"
/// ```
///
/// Paths are relative to the directory holding the module file. A
/// dependency needed by another one is best declared first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentManifest {
    pub dependencies: Vec<PrivateDependency>,
}

/// One `identifier = "relative/path"` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateDependency {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawDeployment {
    dependencies: toml::Table,
}

impl DeploymentManifest {
    /// Location of the deployment manifest for a module file:
    /// `dir/libecho.so` maps to `dir/libecho.deps.toml`.
    pub fn path_for(module_path: &Path) -> PathBuf {
        let stem = module_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        module_path.with_file_name(format!("{}.{}", stem, DEPLOYMENT_SUFFIX))
    }

    /// Read the deployment manifest next to `module_path`. A module without
    /// one has no private dependencies.
    pub fn load_for(module_path: &Path) -> Result<Self, LoadError> {
        let path = Self::path_for(module_path);
        if !path.exists() {
            return Ok(Self::default());
        }

        tracing::debug!("Reading deployment manifest: {:?}", path);
        let content = std::fs::read_to_string(&path).map_err(|e| LoadError::Context {
            path: path.clone(),
            message: format!("Failed to read deployment manifest: {}", e),
        })?;

        Self::from_toml(&content).map_err(|message| LoadError::Context { path, message })
    }

    /// Parse and check that every path stays inside the module directory.
    pub fn from_toml(content: &str) -> Result<Self, String> {
        let raw: RawDeployment = toml::from_str(content)
            .map_err(|e| format!("Failed to parse deployment manifest: {}", e))?;

        let mut dependencies = Vec::with_capacity(raw.dependencies.len());
        for (name, value) in raw.dependencies {
            let path = match value {
                toml::Value::String(path) => PathBuf::from(path),
                other => {
                    return Err(format!(
                        "Dependency '{}' must be a relative path, found {}",
                        name,
                        other.type_str()
                    ))
                }
            };
            let escapes = path.is_absolute()
                || path
                    .components()
                    .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)));
            if escapes {
                return Err(format!(
                    "Dependency '{}' points outside the module directory: {}",
                    name,
                    path.display()
                ));
            }
            dependencies.push(PrivateDependency { name, path });
        }

        Ok(Self { dependencies })
    }

    /// Relative path declared for `name`.
    pub fn get(&self, name: &str) -> Option<&Path> {
        self.dependencies
            .iter()
            .find(|dep| dep.name == name)
            .map(|dep| dep.path.as_path())
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }
}
