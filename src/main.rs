//! API proxy configuration compiler.
//!
//! # Architecture Overview
//!
//! ```text
//!   service description ──┐
//!   (json / yaml / toml)  │    ┌──────────┐   ┌─────────────────────────┐   ┌───────────┐
//!                         ├───▶│  config  │──▶│        compiler         │──▶│ assembler │──▶ snapshot JSON
//!   compiler options ─────┘    │  loader  │   │ registry → auth/backend │   │ routes    │
//!   (toml)                     └────▲─────┘   │ → control → diagnostics │   │ clusters  │
//!                                   │         └─────────────────────────┘   │ filters   │
//!                              ┌────┴─────┐                                 └─────┬─────┘
//!                              │ watcher  │        ┌───────────┐                  │
//!                              │ (notify) │        │ publisher │◀─────────────────┘
//!                              └──────────┘        │ arc-swap  │──▶ JWKS prefetch
//!                                                  └───────────┘
//! ```
//!
//! One-shot mode compiles once and exits non-zero on any compile error.
//! Watch mode republishes on every input change and keeps the
//! last-known-good snapshot when a change fails to compile.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use tokio::sync::mpsc;

use api_proxy_compiler::compiler::{compile, ConfigPublisher, PublishOutcome};
use api_proxy_compiler::config::{load_inputs, CompileInputs, ConfigWatcher};
use api_proxy_compiler::lifecycle::{wait_for_signal, Shutdown, SignalEvent};
use api_proxy_compiler::observability::{init_logging, init_metrics};
use api_proxy_compiler::ConfigSnapshot;

#[derive(Parser, Debug)]
#[command(name = "api-proxy-compiler")]
#[command(about = "Compile API service descriptions into proxy configuration", long_about = None)]
struct Cli {
    /// Service description (.json, .yaml, .yml or .toml)
    #[arg(short, long)]
    service: PathBuf,

    /// Compiler options (TOML); defaults apply when omitted
    #[arg(short, long)]
    options: Option<PathBuf>,

    /// Where to write the compiled snapshot; stdout when omitted
    #[arg(short = 'O', long)]
    output: Option<PathBuf>,

    /// Keep running and recompile whenever an input changes
    #[arg(short, long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let inputs = load_inputs(&cli.service, cli.options.as_deref())?;
    init_logging(&inputs.options.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "api-proxy-compiler starting");

    if !cli.watch {
        let compiled = compile(&inputs.service, &inputs.options)?;
        write_snapshot(&compiled.snapshot, cli.output.as_deref())?;
        return Ok(());
    }

    let observability = &inputs.options.observability;
    if observability.metrics_enabled {
        match observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %observability.metrics_address,
                "failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let publisher = ConfigPublisher::new().with_shutdown(shutdown.clone());
    publish(&publisher, &inputs, cli.output.as_deref());

    let (watcher, mut updates) = ConfigWatcher::new(&cli.service, cli.options.as_deref());
    let _watch_handle = watcher.run()?;
    let (reload_tx, mut reloads) = mpsc::unbounded_channel();
    tokio::spawn(forward_signals(shutdown.clone(), reload_tx));

    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            Some(inputs) = updates.recv() => {
                publish(&publisher, &inputs, cli.output.as_deref());
            }
            Some(()) = reloads.recv() => match load_inputs(&cli.service, cli.options.as_deref()) {
                Ok(inputs) => publish(&publisher, &inputs, cli.output.as_deref()),
                Err(e) => tracing::error!(error = %e, "reload failed; keeping current config"),
            },
        }
    }

    tracing::info!("shutdown complete");
    Ok(())
}

/// Turns OS signals into reload requests until a shutdown signal arrives.
async fn forward_signals(shutdown: Shutdown, reloads: mpsc::UnboundedSender<()>) {
    loop {
        match wait_for_signal().await {
            Ok(SignalEvent::Reload) => {
                if reloads.send(()).is_err() {
                    break;
                }
            }
            Ok(SignalEvent::Shutdown) => break,
            Err(e) => {
                tracing::error!(error = %e, "signal handler failed");
                break;
            }
        }
    }
    shutdown.trigger();
}

fn publish(publisher: &ConfigPublisher, inputs: &CompileInputs, output: Option<&Path>) {
    match publisher.publish(&inputs.service, &inputs.options) {
        Ok(PublishOutcome::Published { snapshot, .. }) => {
            if let Err(e) = write_snapshot(&snapshot, output) {
                tracing::error!(error = %e, "failed to write snapshot");
            }
        }
        Ok(PublishOutcome::Unchanged) => {}
        Err(errors) => {
            for error in &errors.errors {
                tracing::error!(error = %error, "compile error");
            }
        }
    }
}

fn write_snapshot(snapshot: &ConfigSnapshot, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let json = snapshot.to_json()?;
    match output {
        Some(path) => {
            fs::write(path, json)?;
            tracing::info!(path = %path.display(), config_id = %snapshot.config_id, "snapshot written");
        }
        None => println!("{}", json),
    }
    Ok(())
}
