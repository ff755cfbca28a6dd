//! Reactor metrics using the native Prometheus client.
//!
//! Metrics are domain-specific rather than generic event counters; use
//! traces for event-level granularity.

use prometheus::{register_counter, register_gauge, Counter, Gauge};
use std::sync::OnceLock;

static METRICS: OnceLock<Metrics> = OnceLock::new();

struct Metrics {
    proposals: Counter,
    votes_cast: Counter,
    sets_finalized: Counter,
    sets_expired: Counter,
    maj23_relayed: Counter,
    invalid_messages: Counter,
    peers_connected: Gauge,
}

impl Metrics {
    fn new() -> Self {
        Self {
            proposals: register_counter!(
                "oraclesig_proposals_total",
                "Vote sets proposed by this node"
            )
            .unwrap(),
            votes_cast: register_counter!(
                "oraclesig_votes_cast_total",
                "Own votes added to vote sets"
            )
            .unwrap(),
            sets_finalized: register_counter!(
                "oraclesig_vote_sets_finalized_total",
                "Vote sets that reached a super-majority"
            )
            .unwrap(),
            sets_expired: register_counter!(
                "oraclesig_vote_sets_expired_total",
                "Vote sets archived without a super-majority"
            )
            .unwrap(),
            maj23_relayed: register_counter!(
                "oraclesig_maj23_relayed_total",
                "Finalized vote sets relayed to peers"
            )
            .unwrap(),
            invalid_messages: register_counter!(
                "oraclesig_invalid_messages_total",
                "Dropped wire messages (malformed, invalid, or protocol violations)"
            )
            .unwrap(),
            peers_connected: register_gauge!(
                "oraclesig_peers_connected",
                "Currently connected peers"
            )
            .unwrap(),
        }
    }
}

fn get() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

pub fn record_proposal() {
    get().proposals.inc();
}

pub fn record_vote_cast() {
    get().votes_cast.inc();
}

pub fn record_set_finalized() {
    get().sets_finalized.inc();
}

pub fn record_set_expired() {
    get().sets_expired.inc();
}

pub fn record_maj23_relayed() {
    get().maj23_relayed.inc();
}

pub fn record_invalid_message() {
    get().invalid_messages.inc();
}

pub fn set_peers_connected(count: usize) {
    get().peers_connected.set(count as f64);
}
