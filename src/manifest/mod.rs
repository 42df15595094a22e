// Author: Eshan Roy
// SPDX-License-Identifier: MIT

//! Module manifest.
//!
//! Every module embeds a manifest declaring its identity. The host reads it
//! through the exported manifest symbol right after the module's code is
//! loaded, and a file without one is not treated as a module.

use serde::{Deserialize, Serialize};

use crate::error::LoadError;

/// Identity of a module, as declared by its author at build time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleManifest {
    /// Stable unique identifier, assigned by the author.
    pub id: String,
    /// Human-readable name. Used as the registry key.
    pub name: String,
    /// Version string. Carried verbatim, never compared by the host.
    #[serde(default)]
    pub version: String,
    /// Module author.
    #[serde(default)]
    pub author: String,
    /// Module description.
    #[serde(default)]
    pub description: String,
}

impl ModuleManifest {
    /// Parse a manifest from TOML and validate it.
    pub fn from_toml(content: &str) -> Result<Self, LoadError> {
        let manifest: ModuleManifest =
            toml::from_str(content).map_err(|e| LoadError::InvalidManifest {
                message: format!("Failed to parse manifest TOML: {}", e),
            })?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Serialize the manifest back into TOML.
    pub fn to_toml(&self) -> String {
        // A struct of plain strings always serializes.
        toml::to_string(self).unwrap_or_default()
    }

    /// Check required fields.
    pub fn validate(&self) -> Result<(), LoadError> {
        if self.id.trim().is_empty() {
            return Err(LoadError::InvalidManifest {
                message: "Module id cannot be empty".to_string(),
            });
        }
        if self.name.trim().is_empty() {
            return Err(LoadError::InvalidManifest {
                message: "Module name cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}
