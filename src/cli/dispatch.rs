// Author: Eshan Roy
// SPDX-License-Identifier: MIT

//! Command dispatch and execution.

use console::style;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::HostConfig;
use crate::error::{HostError, Result, ResultExt};
use crate::host::{LoadReport, LoadedModuleInfo, ModuleHost};
use crate::services::Services;

use super::args::{Cli, Commands, InitArgs};

/// Run the CLI with the given arguments.
pub fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Version => return run_version(),
        Commands::Init(args) => return run_init(args),
        Commands::Scan | Commands::Run => {}
    }

    let mut config = if let Some(config_path) = &cli.config {
        HostConfig::load_from(config_path)?
    } else {
        HostConfig::load()?
    };
    if let Some(dir) = &cli.dir {
        config.host.directory = Some(dir.clone());
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(async {
        match cli.command {
            Commands::Scan => run_scan(&cli, &config).await,
            _ => run_host(&cli, &config).await,
        }
    })
}

/// Load everything once, print the outcome, unload.
async fn run_scan(cli: &Cli, config: &HostConfig) -> Result<()> {
    let host = ModuleHost::new(config)?;
    tracing::debug!("Scanning modules under {:?}", host.root());

    let cancel = CancellationToken::new();
    let report = host.load_all(Arc::new(Services::new()), &cancel).await;
    print_summary(cli, &host, &report)?;

    let failures = host.unload_all(&cancel).await;
    for failure in &failures {
        tracing::warn!("{}", failure);
    }

    if report.failed.is_empty() {
        Ok(())
    } else {
        Err(HostError::WithContext {
            context: "scan".to_string(),
            message: format!("{} module(s) failed to load", report.failed.len()),
        })
    }
}

/// Load everything and keep running until Ctrl-C.
async fn run_host(cli: &Cli, config: &HostConfig) -> Result<()> {
    let host = ModuleHost::new(config)?;
    let cancel = CancellationToken::new();

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let report = host.load_all(Arc::new(Services::new()), &cancel).await;
    print_summary(cli, &host, &report)?;

    if !cancel.is_cancelled() {
        if !cli.is_json() {
            println!("{}", style("Running, press Ctrl-C to stop").dim());
        }
        cancel.cancelled().await;
    }

    // Shutdown gets a fresh token so an interrupted run still stops cleanly.
    let failures = host.unload_all(&CancellationToken::new()).await;
    if failures.is_empty() {
        if !cli.is_json() {
            println!("{} All modules unloaded", style("✓").green());
        }
        Ok(())
    } else {
        for failure in &failures {
            eprintln!("{} {}", style("✗").red(), failure);
        }
        Err(HostError::WithContext {
            context: "run".to_string(),
            message: format!("{} module(s) failed to shut down", failures.len()),
        })
    }
}

#[derive(Serialize)]
struct Summary {
    root: PathBuf,
    loaded: Vec<LoadedModuleInfo>,
    skipped: Vec<PathBuf>,
    cancelled: Vec<PathBuf>,
    failed: Vec<FailedFile>,
}

#[derive(Serialize)]
struct FailedFile {
    path: PathBuf,
    error: String,
}

fn print_summary(cli: &Cli, host: &ModuleHost, report: &LoadReport) -> Result<()> {
    if cli.is_json() {
        let summary = Summary {
            root: host.root().to_path_buf(),
            loaded: host.loaded_info(),
            skipped: report.skipped.clone(),
            cancelled: report.cancelled.clone(),
            failed: report
                .failed
                .iter()
                .map(|(path, err)| FailedFile {
                    path: path.clone(),
                    error: err.to_string(),
                })
                .collect(),
        };
        let json = serde_json::to_string_pretty(&summary).context("Failed to encode summary")?;
        println!("{}", json);
        return Ok(());
    }

    println!(
        "{} {}",
        style("Modules in").bold(),
        style(host.root().display()).cyan()
    );
    for info in host.loaded_info() {
        let manifest = &info.manifest;
        println!(
            "  {} {} {} ({})",
            style("✓").green(),
            style(&manifest.name).bold(),
            style(format!("v{}", manifest.version)).dim(),
            manifest.id
        );
        if !manifest.description.is_empty() {
            println!("      {}", manifest.description);
        }
    }
    for path in &report.skipped {
        println!("  {} {} (no manifest)", style("-").yellow(), path.display());
    }
    for (path, err) in &report.failed {
        println!("  {} {}: {}", style("✗").red(), path.display(), err);
    }
    println!("{}", style(report).dim());
    Ok(())
}

/// Run the version command.
fn run_version() -> Result<()> {
    println!("modhost {}", crate::version::version_string());

    if let Some(sha) = crate::version::GIT_SHA {
        println!("git commit: {}", sha);
    }
    if let Some(date) = crate::version::GIT_COMMIT_DATE {
        println!("commit date: {}", date);
    }
    if let Some(rustc) = crate::version::RUSTC_SEMVER {
        println!("rustc: {}", rustc);
    }
    println!("module abi: {}", crate::entry::ABI_VERSION);

    Ok(())
}

/// Run the init command.
fn run_init(args: &InitArgs) -> Result<()> {
    use crate::config::default::example_config;

    tracing::debug!("Running init command with args: {:?}", args);

    let config_path = std::path::Path::new("modhost.toml");

    if config_path.exists() && !args.force {
        return Err(HostError::WithContext {
            context: "init".to_string(),
            message: "Configuration file already exists. Use --force to overwrite.".to_string(),
        });
    }

    std::fs::write(config_path, example_config()).context("Failed to write configuration")?;

    println!("{} Created modhost.toml", style("✓").green());

    Ok(())
}
