// Author: Eshan Roy
// SPDX-License-Identifier: MIT

//! Error types for the module host.
//!
//! Per-file load failures are collected into a [`LoadReport`](crate::host::LoadReport)
//! and never abort discovery. Only configuration problems and shutdown
//! failures surface as [`HostError`] to the caller.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for host operations.
#[derive(Error, Debug)]
pub enum HostError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    // Module load errors
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    // Module shutdown raised or timed out
    #[error("Module '{name}' failed to shut down: {message}")]
    ShutdownFailed { name: String, message: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error with context
    #[error("{context}: {message}")]
    WithContext { context: String, message: String },
}

/// Configuration-related errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Failed to parse configuration: {message}")]
    ParseError { message: String },

    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors that reject a single candidate module file.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to prepare isolation context for {path}: {message}")]
    Context { path: PathBuf, message: String },

    #[error("Failed to load library {path}: {message}")]
    Library { path: PathBuf, message: String },

    #[error("Symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("Invalid module manifest: {message}")]
    InvalidManifest { message: String },

    #[error("Module ABI mismatch: expected {expected}, got {actual}")]
    AbiMismatch { expected: u32, actual: u32 },

    #[error("Module entry point creation failed: {message}")]
    CreationFailed { message: String },

    #[error("Private dependency '{name}' could not be resolved")]
    DependencyNotFound { name: String },

    #[error("Module '{name}' failed to initialize: {message}")]
    InitializeFailed { name: String, message: String },

    #[error("Module '{name}' did not initialize within {millis}ms")]
    InitializeTimeout { name: String, millis: u64 },

    #[error("A module named '{name}' is already loaded")]
    NameCollision { name: String },
}

/// Error returned by module code across the entry point boundary.
///
/// Only a message is carried so the value never references types owned by
/// the module's library after it is unloaded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ModuleError {
    message: String,
}

impl ModuleError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for ModuleError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for ModuleError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Result type alias for host operations.
pub type Result<T> = std::result::Result<T, HostError>;

/// Extension trait for adding context to errors.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: std::error::Error + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| HostError::WithContext {
            context: context.into(),
            message: e.to_string(),
        })
    }
}
