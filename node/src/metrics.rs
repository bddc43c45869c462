//! # Prometheus Metrics
//!
//! Exposes a running peer's counters and chain state. Scraped by Prometheus
//! at the `/metrics` HTTP endpoint on the port given by `--metrics-port`.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers. Values are
//! pulled from the [`ProtocolEngine`] on every scrape.

use std::sync::Arc;

use axum::http::StatusCode;
use parking_lot::Mutex;
use axum::response::IntoResponse;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

use reviewchain_protocol::network::ProtocolEngine;

/// Holds all Prometheus metric handles for the peer.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Held while counters catch up, so concurrent scrapes cannot both add
    /// the same delta.
    observing: Arc<Mutex<()>>,
    /// Reviews accepted from clients.
    pub reviews_received_total: IntCounter,
    /// Blocks mined and linked by this peer.
    pub blocks_mined_total: IntCounter,
    /// Announced blocks from other peers that were linked.
    pub blocks_accepted_total: IntCounter,
    /// Announced blocks and chains that failed validation.
    pub blocks_rejected_total: IntCounter,
    /// Longer chains adopted from other peers.
    pub chains_adopted_total: IntCounter,
    /// Id of the local tip.
    pub chain_height: IntGauge,
    /// Size of the tracker's last peer list.
    pub known_peers: IntGauge,
    /// Reviews waiting for a block.
    pub pending_reviews: IntGauge,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, prometheus::Error> {
    let metric = IntCounter::new(name, help)?;
    registry.register(Box::new(metric.clone()))?;
    Ok(metric)
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge, prometheus::Error> {
    let metric = IntGauge::new(name, help)?;
    registry.register(Box::new(metric.clone()))?;
    Ok(metric)
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("reviewchain".into()), None)?;
        Ok(Self {
            reviews_received_total: counter(&registry, "reviews_received_total", "Reviews accepted from clients")?,
            blocks_mined_total: counter(&registry, "blocks_mined_total", "Blocks mined and linked locally")?,
            blocks_accepted_total: counter(&registry, "blocks_accepted_total", "Announced blocks linked")?,
            blocks_rejected_total: counter(
                &registry,
                "blocks_rejected_total",
                "Announced blocks and chains that failed validation",
            )?,
            chains_adopted_total: counter(&registry, "chains_adopted_total", "Longer chains adopted from peers")?,
            chain_height: gauge(&registry, "chain_height", "Id of the local tip block")?,
            known_peers: gauge(&registry, "known_peers", "Peers in the tracker's last list")?,
            pending_reviews: gauge(&registry, "pending_reviews", "Reviews waiting for a block")?,
            registry,
            observing: Arc::new(Mutex::new(())),
        })
    }

    /// Bring every metric up to date with the engine.
    pub fn observe(&self, engine: &ProtocolEngine) {
        let _guard = self.observing.lock();
        let stats = engine.stats();
        catch_up(&self.reviews_received_total, stats.reviews_received);
        catch_up(&self.blocks_mined_total, stats.blocks_mined);
        catch_up(&self.blocks_accepted_total, stats.blocks_accepted);
        catch_up(&self.blocks_rejected_total, stats.blocks_rejected);
        catch_up(&self.chains_adopted_total, stats.chains_adopted);

        self.chain_height.set(engine.height().map_or(-1, i64::from));
        self.known_peers.set(engine.peers().read().len() as i64);
        self.pending_reviews.set(engine.pool().len() as i64);
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Counters only go up; advance to `total` if it is ahead.
fn catch_up(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

/// State handed to the axum handler.
#[derive(Clone)]
pub struct MetricsState {
    pub metrics: NodeMetrics,
    pub engine: Arc<ProtocolEngine>,
}

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(state): axum::extract::State<MetricsState>,
) -> impl IntoResponse {
    state.metrics.observe(&state.engine);
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::RwLock;
    use std::thread;
    use reviewchain_protocol::ledger::{Blockchain, Review};
    use reviewchain_protocol::network::{PeerList, PeerMessage};

    #[test]
    fn observe_reflects_engine_state() {
        let peers = PeerList::parse("127.0.0.1:60001;127.0.0.1:60002").unwrap();
        let engine = ProtocolEngine::new(Blockchain::with_genesis(), Arc::new(RwLock::new(peers)), 2);
        let from = "127.0.0.1:60003".parse().unwrap();
        engine.handle(
            PeerMessage::SubmitReview(Review::new("jo", "gym", 4.0, "clean")),
            from,
        );

        let metrics = NodeMetrics::new().unwrap();
        metrics.observe(&engine);
        metrics.observe(&engine);

        assert_eq!(metrics.reviews_received_total.get(), 1);
        assert_eq!(metrics.chain_height.get(), 0);
        assert_eq!(metrics.known_peers.get(), 2);
        assert_eq!(metrics.pending_reviews.get(), 1);

        let text = metrics.encode().unwrap();
        assert!(text.contains("reviewchain_reviews_received_total 1"));
        assert!(text.contains("reviewchain_known_peers 2"));
    }

    #[test]
    fn concurrent_scrapes_do_not_overcount() {
        let engine = Arc::new(ProtocolEngine::new(
            Blockchain::with_genesis(),
            Arc::new(RwLock::new(PeerList::default())),
            100,
        ));
        let from = "127.0.0.1:60003".parse().unwrap();
        for i in 0..5 {
            engine.handle(
                PeerMessage::SubmitReview(Review::new("jo", "gym", 3.0, format!("visit {i}"))),
                from,
            );
        }

        let metrics = NodeMetrics::new().unwrap();
        let scrapers: Vec<_> = (0..8)
            .map(|_| {
                let metrics = metrics.clone();
                let engine = engine.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        metrics.observe(&engine);
                    }
                })
            })
            .collect();
        for scraper in scrapers {
            scraper.join().unwrap();
        }

        assert_eq!(metrics.reviews_received_total.get(), engine.stats().reviews_received);
        assert_eq!(metrics.reviews_received_total.get(), 5);
    }
}
