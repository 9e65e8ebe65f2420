//! The periodic maintenance loop: bootstrap, bucket refresh, re-announce
//!
//! None of this lives in `mdht-core` — the core only exposes the primitives
//! (`Sender`, `DhtRuntime`, `RoutingTable`) a driver calls through. This
//! mirrors the split the teacher draws between its DHT engine and the
//! binary that schedules work against it.

use std::sync::Arc;
use std::time::Duration;

use mdht_core::routing::K;
use mdht_core::{DhtRuntime, NodeId, Sender};
use tokio::net::lookup_host;
use tokio::time::interval;

use crate::config::Config;

/// Spawn the bootstrap, bucket-refresh, and announce tasks and run them
/// until one of them returns (they don't, barring a panic)
pub async fn spawn_all(runtime: Arc<DhtRuntime>, config: Config, track: Vec<[u8; 20]>) {
    let bootstrap = tokio::spawn(bootstrap_task(runtime.clone(), config.bootstrap_nodes.clone()));
    let bucket_refresh = tokio::spawn(bucket_refresh_task(
        runtime.clone(),
        config.bucket_refresh_secs,
    ));
    let announce = tokio::spawn(announce_task(
        runtime,
        config.announce_interval_secs,
        track,
    ));

    let _ = tokio::join!(bootstrap, bucket_refresh, announce);
}

async fn bootstrap_task(runtime: Arc<DhtRuntime>, bootstrap_nodes: Vec<String>) {
    if bootstrap_nodes.is_empty() {
        return;
    }
    let sender = Sender::new(runtime.clone());
    let mut ticker = interval(Duration::from_secs(30));
    loop {
        ticker.tick().await;
        let known = runtime
            .routing()
            .lock()
            .await
            .find_closest_nodes(&runtime.local_id(), K)
            .len();
        if known >= K {
            continue;
        }
        for host in &bootstrap_nodes {
            match lookup_host(host).await {
                Ok(mut addrs) => {
                    if let Some(addr) = addrs.next() {
                        if let Err(e) = sender.send_ping_bootstrap(addr).await {
                            tracing::warn!("bootstrap ping to {host} failed: {e}");
                        }
                    }
                }
                Err(e) => tracing::warn!("resolving bootstrap node {host} failed: {e}"),
            }
        }
    }
}

async fn bucket_refresh_task(runtime: Arc<DhtRuntime>, bucket_refresh_secs: u64) {
    let sender = Sender::new(runtime.clone());
    let mut ticker = interval(Duration::from_secs(bucket_refresh_secs.max(1)));
    loop {
        ticker.tick().await;
        let targets: Vec<(NodeId, Vec<mdht_core::Node>)> = {
            let table = runtime.routing().lock().await;
            table
                .buckets()
                .iter()
                .filter(|b| b.len() < mdht_core::bucket::CAPACITY)
                .map(|b| (b.midpoint(), b.nodes().iter().cloned().collect()))
                .collect()
        };
        for (target, nodes) in targets {
            for node in nodes {
                if let Ok(addr) = mdht_core::sender::socket_addr_of(&node) {
                    if let Err(e) = sender.send_find_node(addr, target).await {
                        tracing::warn!("bucket-refresh find_node to {addr} failed: {e}");
                    }
                }
            }
        }
    }
}

async fn announce_task(runtime: Arc<DhtRuntime>, announce_interval_secs: u64, track: Vec<[u8; 20]>) {
    if track.is_empty() {
        return;
    }
    let sender = Sender::new(runtime.clone());
    let mut ticker = interval(Duration::from_secs(announce_interval_secs.max(1)));
    loop {
        ticker.tick().await;
        for info_hash in &track {
            let id = NodeId::from_bytes(*info_hash);
            let closest = runtime.routing().lock().await.find_closest_nodes(&id, K);
            for node in &closest {
                if let Err(e) = sender.send_get_peers(node, *info_hash).await {
                    tracing::warn!("re-announce get_peers for {id} failed: {e}");
                }
            }
        }
    }
}
