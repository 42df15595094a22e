// Author: Eshan Roy
// SPDX-License-Identifier: MIT

//! Module entry point contract and the exported-symbol ABI.

mod abi;
mod instance;

pub use abi::{exports, ABI_VERSION};
pub use instance::ModuleInstance;
pub(crate) use instance::DestroyFn;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::ModuleError;
use crate::services::Services;

/// Lifecycle contract every module implements.
///
/// `initialize` is the only place a module performs setup. An error from it
/// means the module failed to load and it is never registered. `shutdown`
/// must release everything the module acquired; the host calls it exactly
/// once per successful unload. Cancellation tokens are advisory.
#[async_trait]
pub trait ModuleEntryPoint: Send + Sync {
    async fn initialize(
        &mut self,
        services: Arc<Services>,
        cancel: CancellationToken,
    ) -> Result<(), ModuleError>;

    async fn shutdown(&mut self, cancel: CancellationToken) -> Result<(), ModuleError>;
}

/// Lifecycle position of a single module file.
///
/// `ManifestValidated` is reached once the file's code is mapped and its
/// manifest checked; `Loaded` once the entry point has been instantiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleState {
    Discovered,
    ManifestValidated,
    Loaded,
    Initializing,
    Active,
    ShuttingDown,
    Unloaded,
    /// Failed before reaching `Active`; never registered.
    Rejected,
}

impl ModuleState {
    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(self, next: ModuleState) -> bool {
        use ModuleState::*;
        match (self, next) {
            (Discovered, ManifestValidated) => true,
            (ManifestValidated, Loaded) => true,
            (Loaded, Initializing) => true,
            (Initializing, Active) => true,
            (Active, ShuttingDown) => true,
            (ShuttingDown, Unloaded) => true,
            (Discovered | ManifestValidated | Loaded | Initializing, Rejected) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ModuleState::Unloaded | ModuleState::Rejected)
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModuleState::Discovered => "discovered",
            ModuleState::ManifestValidated => "manifest-validated",
            ModuleState::Loaded => "loaded",
            ModuleState::Initializing => "initializing",
            ModuleState::Active => "active",
            ModuleState::ShuttingDown => "shutting-down",
            ModuleState::Unloaded => "unloaded",
            ModuleState::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let path = [
            ModuleState::Discovered,
            ModuleState::ManifestValidated,
            ModuleState::Loaded,
            ModuleState::Initializing,
            ModuleState::Active,
            ModuleState::ShuttingDown,
            ModuleState::Unloaded,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
        assert!(ModuleState::Unloaded.is_terminal());
    }

    #[test]
    fn test_no_hot_reload() {
        assert!(!ModuleState::Active.can_transition_to(ModuleState::Initializing));
        assert!(!ModuleState::Active.can_transition_to(ModuleState::Rejected));
        assert!(!ModuleState::Unloaded.can_transition_to(ModuleState::Loaded));
    }

    #[test]
    fn test_rejection_before_active() {
        assert!(ModuleState::Discovered.can_transition_to(ModuleState::Rejected));
        assert!(ModuleState::Initializing.can_transition_to(ModuleState::Rejected));
        assert!(ModuleState::Rejected.is_terminal());
    }
}
