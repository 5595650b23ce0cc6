// Copyright 2026 The Turnstream Project
// SPDX-License-Identifier: Apache-2.0

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use turnstream::config;
use turnstream::proxy;
use turnstream::stream::StreamProcessor;
use turnstream::upstream::{ReqwestUpstreamClient, UpstreamClient};

#[derive(Parser)]
#[command(name = "turnstream", about = "Streaming agent response relay")]
struct Cli {
    /// Path to the turnstream.yaml config file
    #[arg(long, default_value = "turnstream.yaml", env = "TURNSTREAM_CONFIG")]
    config: String,

    /// Port to listen on
    #[arg(long, default_value_t = proxy::DEFAULT_PORT, env = "TURNSTREAM_PORT")]
    port: u16,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let addr = SocketAddr::from((proxy::BIND_HOST, cli.port));
    tracing::info!(%addr, "turnstream starting");

    let source = config::FileSource {
        path: std::path::PathBuf::from(cli.config),
    };
    let config = match config::load_config(&source) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        version = %config.version,
        environment = %config.environment,
        upstream = %config.upstream.url(),
        format = ?config.upstream.format,
        default_author = %config.stream.default_author,
        contract_hash = %config.contract_hash,
        "config loaded"
    );

    let http = match reqwest::Client::builder().build() {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("failed to build HTTP client: {e}");
            std::process::exit(1);
        }
    };
    let upstream: Arc<dyn UpstreamClient> =
        Arc::new(ReqwestUpstreamClient::new(http, &config.upstream));

    let app = proxy::build_router(proxy::AppState {
        upstream,
        processor: Arc::new(StreamProcessor::new(config.stream.clone())),
        format: config.upstream.format,
    });

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(%addr, "failed to bind: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(%addr, "turnstream listening");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server error: {e}");
        std::process::exit(1);
    }
}
