// Author: Eshan Roy
// SPDX-License-Identifier: MIT

//! modhost - Pluggable Module Host
//!
//! Discovers shared-library modules under a directory, loads each one into
//! its own isolation context, and drives their asynchronous lifecycle.
//!
//! # Features
//!
//! - **Recursive Discovery**: Every file with the module extension under the root
//! - **Isolation Contexts**: Private dependency resolution per module
//! - **Embedded Manifests**: Identity and metadata declared inside the module
//! - **Async Lifecycle**: Initialization and shutdown with timeouts and cancellation
//! - **Batch Resilience**: One broken module never stops the others
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use modhost::{HostConfig, ModuleHost, Services};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> modhost::Result<()> {
//! let config = HostConfig::load()?;
//! let host = ModuleHost::new(&config)?;
//!
//! let cancel = CancellationToken::new();
//! let report = host.load_all(Arc::new(Services::new()), &cancel).await;
//! println!("{}", report);
//!
//! for manifest in host.get_loaded() {
//!     println!("{} v{}", manifest.name, manifest.version);
//! }
//!
//! host.unload_all(&cancel).await;
//! # Ok(())
//! # }
//! ```
//!
//! Modules implement [`ModuleEntryPoint`] and export it with
//! [`declare_module!`].

pub mod cli;
pub mod config;
pub mod context;
pub mod entry;
pub mod error;
pub mod host;
pub mod manifest;
pub mod services;

// Re-exports for convenience
pub use config::HostConfig;
pub use entry::ModuleEntryPoint;
pub use error::{HostError, Result};
pub use host::{LoadReport, ModuleHost};
pub use manifest::ModuleManifest;
pub use services::Services;

/// Version information embedded at compile time.
pub mod version {
    /// The current version of modhost.
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    /// The git SHA at compile time (if available).
    pub const GIT_SHA: Option<&str> = option_env!("VERGEN_GIT_SHA");

    /// The git commit date at compile time (if available).
    pub const GIT_COMMIT_DATE: Option<&str> = option_env!("VERGEN_GIT_COMMIT_DATE");

    /// The rustc version the host was built with. Modules must match it.
    pub const RUSTC_SEMVER: Option<&str> = option_env!("VERGEN_RUSTC_SEMVER");

    /// Get a formatted version string.
    pub fn version_string() -> String {
        format_version(VERSION, GIT_SHA, GIT_COMMIT_DATE)
    }

    fn format_version(version: &str, sha: Option<&str>, date: Option<&str>) -> String {
        let short = sha.map(|sha| &sha[..7.min(sha.len())]);
        match (short, date) {
            (Some(sha), Some(date)) => format!("{} ({} {})", version, sha, date),
            (Some(sha), None) => format!("{} ({})", version, sha),
            _ => version.to_string(),
        }
    }

}
