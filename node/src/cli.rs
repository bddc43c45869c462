//! # CLI Interface
//!
//! Defines the command-line argument structure for `reviewchain-node` using
//! `clap` derive. Two subcommands run long-lived processes (`peer`,
//! `tracker`); three are one-shot clients (`submit`, `chain`, `peers`).

use std::net::{IpAddr, SocketAddr};

use clap::builder::TypedValueParser;
use clap::{Args, Parser, Subcommand};

use reviewchain_protocol::config::{
    is_app_port, DEFAULT_PEER_PORT, DEFAULT_REVIEWS_PER_BLOCK, DEFAULT_TRACKER_PORT, MAX_APP_PORT,
    MIN_APP_PORT,
};

use crate::logging::LogFormat;

/// ReviewChain node.
///
/// Runs a peer of the review blockchain or the tracker that introduces peers
/// to each other, and talks to either from the command line.
#[derive(Parser, Debug)]
#[command(
    name = "reviewchain-node",
    about = "ReviewChain peer, tracker and client",
    version,
    propagate_version = true
)]
pub struct ReviewChainCli {
    /// Log output format.
    #[arg(long, global = true, value_enum, env = "REVIEWCHAIN_LOG_FORMAT", default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a peer: register with the tracker, sync the chain, mine reviews.
    Peer(PeerArgs),
    /// Run the tracker.
    Tracker(TrackerArgs),
    /// Submit a review to a peer.
    Submit(SubmitArgs),
    /// Fetch and print a peer's chain.
    Chain(ChainArgs),
    /// Print the peers currently registered with the tracker.
    Peers(PeersArgs),
    /// Print version information and exit.
    Version,
}

/// Where the tracker lives.
#[derive(Args, Debug, Clone)]
pub struct TrackerTarget {
    /// Tracker host name or IP.
    #[arg(long, env = "REVIEWCHAIN_TRACKER_HOST", default_value = "127.0.0.1")]
    pub tracker_host: String,

    /// Tracker TCP port.
    #[arg(long, env = "REVIEWCHAIN_TRACKER_PORT", default_value_t = DEFAULT_TRACKER_PORT, value_parser = app_port)]
    pub tracker_port: u16,
}

impl TrackerTarget {
    pub fn address(&self) -> String {
        format!("{}:{}", self.tracker_host, self.tracker_port)
    }
}

/// Arguments for the `peer` subcommand.
#[derive(Args, Debug)]
pub struct PeerArgs {
    #[command(flatten)]
    pub tracker: TrackerTarget,

    /// UDP port this peer receives on.
    #[arg(long, short = 'p', env = "REVIEWCHAIN_PEER_PORT", default_value_t = DEFAULT_PEER_PORT, value_parser = app_port)]
    pub port: u16,

    /// IP address to advertise to the tracker.
    ///
    /// Defaults to the local address of the connection to the tracker.
    #[arg(long, env = "REVIEWCHAIN_ADVERTISE_IP")]
    pub advertise_ip: Option<IpAddr>,

    /// Pending reviews required before a block is mined.
    #[arg(long, env = "REVIEWCHAIN_REVIEWS_PER_BLOCK", default_value_t = DEFAULT_REVIEWS_PER_BLOCK, value_parser = clap::value_parser!(u64).range(1..).map(|n| n as usize))]
    pub reviews_per_block: usize,

    /// Serve Prometheus metrics on this port.
    #[arg(long, env = "REVIEWCHAIN_METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

/// Arguments for the `tracker` subcommand.
#[derive(Args, Debug)]
pub struct TrackerArgs {
    /// TCP port to listen on.
    #[arg(long, short = 'p', env = "REVIEWCHAIN_TRACKER_PORT", default_value_t = DEFAULT_TRACKER_PORT, value_parser = app_port)]
    pub port: u16,
}

/// Arguments for the `submit` subcommand.
#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Peer to submit to, as `ip:port`.
    #[arg(long, env = "REVIEWCHAIN_PEER")]
    pub peer: SocketAddr,

    /// Reviewer name.
    #[arg(long, short = 'u')]
    pub user: String,

    /// What is being reviewed.
    #[arg(long, short = 's')]
    pub subject: String,

    /// Score from 0 to 5.
    #[arg(long, short = 'r', value_parser = rating)]
    pub rating: f64,

    /// Review text.
    pub body: String,
}

/// Arguments for the `chain` subcommand.
#[derive(Args, Debug)]
pub struct ChainArgs {
    /// Peer to fetch from, as `ip:port`.
    #[arg(long, env = "REVIEWCHAIN_PEER")]
    pub peer: SocketAddr,

    /// Print the raw chain JSON instead of the review listing.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `peers` subcommand.
#[derive(Args, Debug)]
pub struct PeersArgs {
    #[command(flatten)]
    pub tracker: TrackerTarget,
}

/// Parse a port in the application range.
fn app_port(s: &str) -> Result<u16, String> {
    let port: u16 = s.parse().map_err(|_| format!("`{s}` is not a port number"))?;
    if !is_app_port(port) {
        return Err(format!("port must be between {MIN_APP_PORT} and {MAX_APP_PORT}"));
    }
    Ok(port)
}

fn rating(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|_| format!("`{s}` is not a number"))?;
    if !(0.0..=5.0).contains(&value) {
        return Err("rating must be between 0 and 5".to_string());
    }
    Ok(value)
}
