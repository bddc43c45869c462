// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # ReviewChain Node
//!
//! Entry point for the `reviewchain-node` binary. Parses CLI arguments,
//! initializes logging, and runs a peer, a tracker, or one client request.
//!
//! The binary supports six subcommands:
//!
//! - `peer`      run a peer (optionally with a Prometheus endpoint)
//! - `tracker`   run the tracker
//! - `submit`    submit a review to a peer
//! - `chain`     fetch and print a peer's chain
//! - `peers`     list the peers registered with a tracker
//! - `version`   print build version information

mod cli;
mod logging;
mod metrics;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;

use reviewchain_protocol::ledger::{Blockchain, Review};
use reviewchain_protocol::network::{
    query_peers, Peer, PeerClient, PeerConfig, ProtocolEngine, Tracker, TrackerConfig,
};

use cli::{Commands, ReviewChainCli};
use logging::{LogFormat, CLIENT_DIRECTIVE, SERVICE_DIRECTIVE};
use metrics::{MetricsState, NodeMetrics};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ReviewChainCli::parse();
    let format = cli.log_format;

    match cli.command {
        Commands::Peer(args) => run_peer(args, format).await,
        Commands::Tracker(args) => run_tracker(args, format).await,
        Commands::Submit(args) => submit(args, format).await,
        Commands::Chain(args) => show_chain(args, format).await,
        Commands::Peers(args) => list_peers(args, format).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Runs a peer until SIGINT/SIGTERM.
async fn run_peer(args: cli::PeerArgs, format: LogFormat) -> Result<()> {
    logging::init_logging(SERVICE_DIRECTIVE, format);

    let config = PeerConfig {
        tracker_addr: args.tracker.address(),
        recv_port: args.port,
        advertise_ip: args.advertise_ip,
        reviews_per_block: args.reviews_per_block,
        ..PeerConfig::default()
    };
    tracing::info!(
        tracker = %config.tracker_addr,
        port = config.recv_port,
        reviews_per_block = config.reviews_per_block,
        "starting peer"
    );

    let peer = Peer::start(config)
        .await
        .with_context(|| format!("failed to start peer on port {}", args.port))?;
    let engine = peer.engine();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let metrics_task = match args.metrics_port {
        Some(port) => Some(spawn_metrics(port, engine, shutdown_rx.clone()).await?),
        None => None,
    };

    let mut peer_task = tokio::spawn(peer.run(shutdown_rx));

    tokio::select! {
        res = &mut peer_task => {
            return res.context("peer task panicked")?.context("peer stopped");
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    if shutdown_tx.send(true).is_err() {
        tracing::debug!("peer already stopped");
    }
    peer_task
        .await
        .context("peer task panicked")?
        .context("peer stopped with an error")?;
    if let Some(task) = metrics_task {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "metrics task ended abnormally");
        }
    }
    tracing::info!("reviewchain-node stopped");
    Ok(())
}

/// Serves `/metrics` until shutdown.
async fn spawn_metrics(
    port: u16,
    engine: Arc<ProtocolEngine>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<tokio::task::JoinHandle<()>> {
    let metrics = NodeMetrics::new().context("failed to create metrics registry")?;
    let router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(MetricsState { metrics, engine });

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {addr}"))?;
    tracing::info!("metrics server listening on {}", addr);

    Ok(tokio::spawn(async move {
        let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        });
        if let Err(e) = serve.await {
            tracing::error!("metrics server error: {}", e);
        }
    }))
}

/// Runs the tracker until SIGINT/SIGTERM.
async fn run_tracker(args: cli::TrackerArgs, format: LogFormat) -> Result<()> {
    logging::init_logging(SERVICE_DIRECTIVE, format);

    let tracker = Tracker::bind(TrackerConfig {
        listen_port: args.port,
        ..TrackerConfig::default()
    })
    .await
    .with_context(|| format!("failed to start tracker on port {}", args.port))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tracker_task = tokio::spawn(tracker.run(shutdown_rx));

    tokio::select! {
        res = &mut tracker_task => {
            return res.context("tracker task panicked")?.context("tracker stopped");
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    if shutdown_tx.send(true).is_err() {
        tracing::debug!("tracker already stopped");
    }
    tracker_task
        .await
        .context("tracker task panicked")?
        .context("tracker stopped with an error")?;
    Ok(())
}

/// Sends one review and waits for the acknowledgment.
async fn submit(args: cli::SubmitArgs, format: LogFormat) -> Result<()> {
    logging::init_logging(CLIENT_DIRECTIVE, format);

    let review = Review::new(args.user, args.subject, args.rating, args.body);
    let client = PeerClient::connect(args.peer)
        .await
        .context("failed to open client socket")?;
    client
        .submit_review(&review)
        .await
        .with_context(|| format!("failed to submit review to {}", client.peer()))?;

    println!("Review submitted to {}.", client.peer());
    Ok(())
}

/// Fetches a peer's chain and prints it.
async fn show_chain(args: cli::ChainArgs, format: LogFormat) -> Result<()> {
    logging::init_logging(CLIENT_DIRECTIVE, format);

    let client = PeerClient::connect(args.peer)
        .await
        .context("failed to open client socket")?;
    let chain = client
        .fetch_chain()
        .await
        .with_context(|| format!("failed to fetch chain from {}", client.peer()))?;

    if args.json {
        println!("{}", chain.to_json_pretty().context("failed to encode chain")?);
    } else {
        print!("{}", render_reviews(&chain)?);
    }
    Ok(())
}

/// The review listing: newest first, each under its block's metadata.
fn render_reviews(chain: &Blockchain) -> Result<String> {
    use std::fmt::Write;

    let reviews = chain.reviews().context("chain holds an unreadable block")?;
    let mut out = String::new();
    writeln!(
        out,
        "Chain height {} ({} reviews)",
        chain.height().map_or_else(|| "-".to_string(), |h| h.to_string()),
        reviews.len()
    )?;

    for (block, review) in reviews.iter().rev() {
        let when = chrono::DateTime::from_timestamp(review.time as i64, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| review.time.to_string());
        writeln!(out)?;
        writeln!(
            out,
            "#{} difficulty={} nonce={} hash={}",
            block.id,
            block.difficulty,
            block.nonce,
            block.hash_short()
        )?;
        writeln!(out, "  {} on {}: {:.1}/5  ({})", review.user, review.subject, review.rating, when)?;
        writeln!(out, "  {}", review.body)?;
    }
    Ok(out)
}

/// Prints the tracker's current peer list.
async fn list_peers(args: cli::PeersArgs, format: LogFormat) -> Result<()> {
    logging::init_logging(CLIENT_DIRECTIVE, format);

    let tracker = args.tracker.address();
    let peers = query_peers(&tracker)
        .await
        .with_context(|| format!("failed to query tracker at {tracker}"))?;

    if peers.is_empty() {
        println!("No peers registered.");
    }
    for peer in peers.iter() {
        println!("{peer}");
    }
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("reviewchain-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol         {}", reviewchain_protocol::config::PROTOCOL_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported. If a handler cannot be
/// installed the error is logged and that signal is never observed.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
