//! mdht - a participating node in the Mainline BitTorrent DHT
//!
//! Runs a long-lived node (`run`), or performs a one-shot peer lookup
//! (`lookup`) or announce (`announce`) against the live network.

mod config;
mod driver;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use mdht_core::{DhtRuntime, Endpoint, Node, NodeId};

use config::Config;

/// A Mainline BitTorrent DHT node
#[derive(Parser)]
#[command(name = "mdht")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug output (implies --verbose)
    #[arg(short, long)]
    debug: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run as a long-lived node: bind, bootstrap, and serve
    Run {
        /// Info-hashes (hex) to keep announced while running
        #[arg(long = "track")]
        track: Vec<String>,
    },

    /// One-shot: bootstrap if needed, get_peers + announce_peer, print peers
    Announce {
        /// 40-character hex info-hash
        info_hash: String,

        /// Local port to advertise for this transfer
        #[arg(short, long)]
        port: u16,
    },

    /// One-shot: get_peers only, print discovered peers
    Lookup {
        /// 40-character hex info-hash
        info_hash: String,
    },
}

fn parse_info_hash(s: &str) -> anyhow::Result<[u8; 20]> {
    let bytes = hex::decode(s).map_err(|e| anyhow::anyhow!("invalid info-hash hex: {e}"))?;
    bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("info-hash must be exactly 20 bytes (40 hex characters)"))
}

fn resolve_node_id(config: &Config) -> anyhow::Result<NodeId> {
    match &config.node_id {
        Some(hex_id) => {
            let bytes = hex::decode(hex_id).map_err(|e| anyhow::anyhow!("invalid node_id hex: {e}"))?;
            NodeId::from_slice(&bytes).map_err(|e| anyhow::anyhow!("invalid node_id: {e}"))
        }
        None => Ok(NodeId::random()),
    }
}

fn load_config(path: Option<&str>) -> anyhow::Result<Config> {
    match path {
        Some(p) => Config::load(std::path::Path::new(p)),
        None => Config::load_or_default(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    let config = load_config(cli.config.as_deref())?;
    config.validate()?;

    let node_id = resolve_node_id(&config)?;
    let runtime = DhtRuntime::bind(node_id, config.listen_addr.port()).await?;
    tracing::info!(%node_id, addr = %config.listen_addr, "bound DHT node");

    match cli.command {
        Commands::Run { track } => {
            let track: Vec<[u8; 20]> = track
                .iter()
                .map(|s| parse_info_hash(s))
                .collect::<anyhow::Result<_>>()?;

            tokio::select! {
                result = mdht_core::dispatcher::run(runtime.clone()) => {
                    result?;
                }
                () = driver::spawn_all(runtime, config, track) => {}
            }
            Ok(())
        }
        Commands::Announce { info_hash, port } => {
            let hash = parse_info_hash(&info_hash)?;
            run_one_shot(runtime, &config, hash, Some(port)).await
        }
        Commands::Lookup { info_hash } => {
            let hash = parse_info_hash(&info_hash)?;
            run_one_shot(runtime, &config, hash, None).await
        }
    }
}

/// Bootstrap, issue `get_peers` (and optionally `announce_peer`) against
/// the current closest-known nodes, then print discovered peers.
async fn run_one_shot(
    runtime: Arc<DhtRuntime>,
    config: &Config,
    info_hash: [u8; 20],
    announce_port: Option<u16>,
) -> anyhow::Result<()> {
    let sender = mdht_core::Sender::new(runtime.clone());
    let dispatch = tokio::spawn(mdht_core::dispatcher::run(runtime.clone()));

    for host in &config.bootstrap_nodes {
        if let Ok(mut addrs) = tokio::net::lookup_host(host).await {
            if let Some(addr) = addrs.next() {
                let _ = sender.send_ping_bootstrap(addr).await;
            }
        }
    }
    tokio::time::sleep(std::time::Duration::from_secs(2)).await;

    let target = NodeId::from_bytes(info_hash);
    let closest = runtime
        .routing()
        .lock()
        .await
        .find_closest_nodes(&target, mdht_core::routing::K);
    for node in &closest {
        let _ = sender.send_get_peers(node, info_hash).await;
    }
    tokio::time::sleep(std::time::Duration::from_secs(2)).await;

    let hash_hex = target.to_string();
    let peers: Vec<Endpoint> = runtime
        .store()
        .lock()
        .await
        .find(&hash_hex)
        .unwrap_or_default();

    if let Some(port) = announce_port {
        let token = runtime
            .store()
            .lock()
            .await
            .find_token(&hash_hex)
            .unwrap_or_default();
        if !token.is_empty() {
            let nodes: Vec<Node> = closest.clone();
            for node in &nodes {
                let _ = sender
                    .send_announce_peer(node, info_hash, port, false, token.clone())
                    .await;
            }
        } else {
            tracing::warn!("no get_peers token collected yet; skipping announce_peer");
        }
    }

    if peers.is_empty() {
        println!("no peers found for {hash_hex}");
    } else {
        for peer in &peers {
            println!("{peer}");
        }
    }

    dispatch.abort();
    Ok(())
}
