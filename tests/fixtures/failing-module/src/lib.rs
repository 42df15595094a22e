// Author: Eshan Roy
// SPDX-License-Identifier: MIT

//! Module whose initializer always fails.

use async_trait::async_trait;
use modhost::error::ModuleError;
use modhost::{ModuleEntryPoint, ModuleManifest, Services};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Failing {
    log: Option<PathBuf>,
}

#[async_trait]
impl ModuleEntryPoint for Failing {
    async fn initialize(
        &mut self,
        services: Arc<Services>,
        _cancel: CancellationToken,
    ) -> Result<(), ModuleError> {
        self.log = services.get::<PathBuf>().map(|path| PathBuf::clone(&path));
        Err(ModuleError::new("refusing to start"))
    }

    async fn shutdown(&mut self, _cancel: CancellationToken) -> Result<(), ModuleError> {
        Ok(())
    }
}

impl Drop for Failing {
    fn drop(&mut self) {
        let Some(path) = &self.log else { return };
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "drop:Failing");
        }
    }
}

modhost::declare_module!(
    Failing::default(),
    ModuleManifest {
        id: "fixture.failing".into(),
        name: "Failing".into(),
        version: "0.0.1".into(),
        author: "modhost".into(),
        description: String::new(),
    }
);
