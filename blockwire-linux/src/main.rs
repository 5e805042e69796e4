// blockwire Linux: serve configured block extensions over HTTP.

mod config;
mod factory;
mod http;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use blockwire_core::{encode_description, Extension, ExtensionFactory, Registries};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;
use crate::factory::ConfigFactory;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_LOG: &str = "blockwire_core=info,blockwire_linux=info";

fn main() -> anyhow::Result<()> {
    let mut config_path: Option<PathBuf> = None;
    let mut describe = false;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("blockwire-linux {}", VERSION);
                return Ok(());
            }
            "--describe" => describe = true,
            "--config" | "-c" => {
                let path = args.next().context("--config needs a path")?;
                config_path = Some(PathBuf::from(path));
            }
            other => anyhow::bail!("unknown argument {other:?}"),
        }
    }

    let cfg = config::load(config_path.as_deref())?;
    init_logging(cfg.log_format)?;

    let registries = Arc::new(Registries::new());
    let definition = cfg.definition(&registries)?;

    if describe {
        let extension = Extension::from_definition(&definition, &cfg.name);
        println!("{}", encode_description(&extension.description(cfg.port))?);
        return Ok(());
    }

    let factory = ExtensionFactory::named(
        &registries,
        &cfg.name,
        ConfigFactory::new(&registries, Arc::clone(&definition), &cfg),
    )?;
    let created = factory.create(None)?;
    let started = match &created.group {
        Some(group) => group.start(),
        None => created.start(),
    };
    if let Err(e) = started {
        created.stop();
        return Err(e.into());
    }
    info!(
        version = VERSION,
        services = ?registries.services.names(),
        blocks = definition.components().len(),
        "blockwire running"
    );

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    rt.block_on(shutdown_signal())?;
    info!("shutting down");
    created.stop();
    Ok(())
}

/// Filter from BLOCKWIRE_LOG, then RUST_LOG, then the default.
fn init_logging(format: LogFormat) -> anyhow::Result<()> {
    let directives = std::env::var("BLOCKWIRE_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| DEFAULT_LOG.to_string());
    let filter = EnvFilter::try_new(&directives)
        .with_context(|| format!("invalid log filter {directives:?}"))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("logging init: {e}"))
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
