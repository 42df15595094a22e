// Author: Eshan Roy
// SPDX-License-Identifier: MIT

//! Module that appends its lifecycle events to the file given as a
//! `PathBuf` service.

use async_trait::async_trait;
use modhost::error::ModuleError;
use modhost::{ModuleEntryPoint, ModuleManifest, Services};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Echo {
    log: Option<PathBuf>,
}

impl Echo {
    fn record(&self, event: &str) {
        let Some(path) = &self.log else { return };
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", event);
        }
    }
}

#[async_trait]
impl ModuleEntryPoint for Echo {
    async fn initialize(
        &mut self,
        services: Arc<Services>,
        _cancel: CancellationToken,
    ) -> Result<(), ModuleError> {
        self.log = services.get::<PathBuf>().map(|path| PathBuf::clone(&path));
        self.record("init:Echo");
        Ok(())
    }

    async fn shutdown(&mut self, _cancel: CancellationToken) -> Result<(), ModuleError> {
        self.record("shutdown:Echo");
        Ok(())
    }
}

impl Drop for Echo {
    fn drop(&mut self) {
        self.record("drop:Echo");
    }
}

modhost::declare_module!(
    Echo::default(),
    ModuleManifest {
        id: "fixture.echo".into(),
        name: "Echo".into(),
        version: "1.2.3".into(),
        author: "modhost".into(),
        description: "Records its lifecycle".into(),
    }
);
