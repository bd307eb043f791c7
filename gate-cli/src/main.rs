// Copyright (c) 2025 The release-gate Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use anyhow::Result;
use clap::Parser;
use log::info;
use tokio_util::sync::CancellationToken;

use crate::commands::Operation;
use crate::config::GateConfig;

mod commands;
mod config;
mod validator;

#[derive(Parser)]
#[command(name = "gate")]
#[command(bin_name = "gate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    operation: Operation,

    /// Path to the config file
    ///
    /// `--config /etc/gate.toml`
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log debug messages, unless `RUST_LOG` says otherwise
    #[arg(long, global = true)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_filter = if cli.debug { "debug" } else { "warn" };
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(default_filter));

    let config = GateConfig::new(cli.config)?;

    let cancel = CancellationToken::new();
    let interrupted = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("SIGINT received, cancelling.");
            interrupted.cancel();
        }
    });

    match cli.operation {
        Operation::Validate(target) => commands::validate::run(target, &config, &cancel).await,
        Operation::Inspect(target) => commands::inspect::run(target, &config, &cancel).await,
    }
}
