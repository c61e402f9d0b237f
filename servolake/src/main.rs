use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Parser;
use servolake_core::ServantDirectory;
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

use crate::{config::Config, factory::rpc_factory, server::Manager};

mod config;
mod demo;
mod factory;
mod server;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path of the config file; a single demo server on port 10000 when absent
    #[clap(short, long, value_parser)]
    config: Option<PathBuf>,
}

#[monoio::main(timer_enabled = true)]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let directory = Arc::new(ServantDirectory::new());
    demo::register(&directory)?;

    // Start workers
    let mut manager = Manager::new(config.runtime.clone());
    let join_handlers = manager.spawn_workers()?;
    tracing::info!("{} workers started", join_handlers.len());

    // Broadcast every server to the workers
    for (name, server) in config.servers {
        let addr = server.listener.socket_addr;
        let factory = Arc::new(rpc_factory(server, directory.clone()));
        let results = manager
            .apply(server::Command::Add {
                name: name.clone(),
                factory,
                addr,
            })
            .await;
        for r in results {
            r?;
        }
        tracing::info!("server {name} started on every worker");
    }

    // Wait for workers
    for h in join_handlers {
        if h.join().is_err() {
            tracing::error!("worker thread panicked");
        }
    }
    directory.destroy();
    Ok(())
}
