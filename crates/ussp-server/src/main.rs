// Copyright (C) 2026  winnyboy5
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use ussp_config::ConfigLoader;
use ussp_observability::{init_tracing_with_config, LogConfig, LogFormat};
use ussp_server::{
    build_state, create_router, create_router_with_rate_limit, replication_queue,
    RateLimitConfig,
};

/// USSP storage server
#[derive(Debug, Parser)]
#[command(name = "ussp-server", version, about)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON); defaults apply when absent
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
}

async fn shutdown_signal(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown requested"),
        Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
    }
    shutdown.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new()
        .load_server_config(cli.config.as_deref())
        .await
        .context("failed to load configuration")?;

    let format: LogFormat = config.logging.format.parse()?;
    init_tracing_with_config(
        LogConfig::new()
            .with_format(format)
            .with_level(config.logging.level.as_str())
            .with_targets(config.logging.include_targets),
    )?;

    let state = build_state(&config).await?;
    let shutdown = CancellationToken::new();

    let worker = if config.replication.enabled {
        let queue = replication_queue(&state, &config.replication);
        if config.replication.recover_on_startup {
            queue.recover_stale_jobs().await?;
        }
        Some(queue.spawn(shutdown.clone()))
    } else {
        tracing::info!("Replication worker disabled");
        None
    };

    let app = match &config.rate_limit {
        Some(rate_limit) => {
            let (router, cleanup) =
                create_router_with_rate_limit(Arc::clone(&state), RateLimitConfig::from(rate_limit))?;
            std::thread::spawn(cleanup);
            router
        }
        None => create_router(Arc::clone(&state)),
    };

    let bind_addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("USSP server listening on {}", bind_addr);
    tracing::info!("Press Ctrl+C to stop");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await?;

    shutdown.cancel();
    if let Some(worker) = worker {
        worker.await?;
    }
    Ok(())
}
