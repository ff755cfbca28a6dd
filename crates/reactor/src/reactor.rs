//! The consensus reactor: gossip protocol, proposer tick, and dispatch into
//! the vote-set core.
//!
//! # Protocol
//!
//! On every tick a proposer executes each registered Fn, wraps the result in
//! a fresh vote set carrying its own vote, and broadcasts it on the
//! in-progress channel. Validators receiving a set merge it into their own,
//! add their vote, and rebroadcast; the node whose vote pushes contributing
//! power past two thirds submits the aggregate back to the application and
//! announces the finalized set on the Maj23 channel, which terminates the
//! round's gossip.
//!
//! # Locking
//!
//! A single mutex guards `ReactorState` and every read-modify-write on vote
//! sets, including the persistence that follows; Fn callbacks do not touch
//! reactor state and are permitted inside the critical section. The peer map
//! has its own read-write lock so broadcasts only contend with peer
//! join/leave.

use crate::config::{ChannelId, ReactorConfig, VOTE_SET_CHANNEL, VOTE_SET_MAJ23_CHANNEL};
use crate::hashing;
use crate::metrics;
use crate::peer::{Peer, PeerId};
use crate::storage::{load_reactor_state, save_reactor_state, ReactorDb, StorageError};
use bytes::Bytes;
use oraclesig_types::{
    codec, helpers, FnExecutionRequest, FnExecutionResponse, FnIndividualExecutionResponse,
    FnRegistry, FnVotePayload, FnVoteSet, OracleFn, ReactorState, Signer, StateReader,
    ValidatorSet,
};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Errors fatal to reactor start.
#[derive(Debug, Error)]
pub enum ReactorError {
    #[error("unable to load reactor state: {0}")]
    StateLoad(#[from] StorageError),
}

/// The multi-signature consensus reactor.
///
/// The host P2P layer calls [`Reactor::receive`], [`Reactor::add_peer`], and
/// [`Reactor::remove_peer`] from arbitrary tasks; [`Reactor::start`] spawns
/// the proposer tick. All of it must run inside a tokio runtime.
pub struct Reactor {
    chain_id: String,
    config: ReactorConfig,
    registry: Arc<dyn FnRegistry>,
    signer: Arc<dyn Signer>,
    state_reader: Arc<dyn StateReader>,
    db: Arc<dyn ReactorDb>,

    state: Mutex<ReactorState>,
    peers: RwLock<HashMap<PeerId, Arc<dyn Peer>>>,
    shutdown: watch::Sender<bool>,
}

impl Reactor {
    pub fn new(
        chain_id: impl Into<String>,
        config: ReactorConfig,
        registry: Arc<dyn FnRegistry>,
        signer: Arc<dyn Signer>,
        state_reader: Arc<dyn StateReader>,
        db: Arc<dyn ReactorDb>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            chain_id: chain_id.into(),
            config,
            registry,
            signer,
            state_reader,
            db,
            state: Mutex::new(ReactorState::default()),
            peers: RwLock::new(HashMap::new()),
            shutdown,
        }
    }

    pub fn name(&self) -> &'static str {
        "oraclesig-reactor"
    }

    /// Load persisted state and spawn the progress routine.
    ///
    /// A corrupt state record is fatal; a missing one starts fresh.
    pub fn start(self: &Arc<Self>) -> Result<JoinHandle<()>, ReactorError> {
        let loaded = load_reactor_state(self.db.as_ref())?;
        *self.state.lock().expect("state lock poisoned") = loaded;

        let shutdown_rx = self.shutdown.subscribe();
        let reactor = Arc::clone(self);
        Ok(tokio::spawn(async move {
            reactor.progress_routine(shutdown_rx).await
        }))
    }

    /// Signal the progress routine to exit at its next sleep boundary.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Called by the host when a peer connects.
    pub fn add_peer(&self, peer: Arc<dyn Peer>) {
        let mut peers = self.peers.write().expect("peer map lock poisoned");
        peers.insert(peer.id(), peer);
        metrics::set_peers_connected(peers.len());
    }

    /// Called by the host when a peer disconnects.
    pub fn remove_peer(&self, peer_id: &PeerId) {
        let mut peers = self.peers.write().expect("peer map lock poisoned");
        peers.remove(peer_id);
        metrics::set_peers_connected(peers.len());
    }

    /// Entry point for wire messages.
    ///
    /// `msg_bytes` is only borrowed for the duration of the call; anything
    /// forwarded to another task is copied first.
    pub fn receive(&self, channel: ChannelId, sender: &PeerId, msg_bytes: &[u8]) {
        match channel {
            VOTE_SET_CHANNEL => self.handle_vote_set_message(sender, msg_bytes),
            VOTE_SET_MAJ23_CHANNEL => self.handle_maj23_message(sender, msg_bytes),
            unknown => error!(channel = unknown, "message on unknown channel"),
        }
    }

    /// A copy of the reactor's current state, for host status surfaces.
    pub fn state_snapshot(&self) -> ReactorState {
        self.state.lock().expect("state lock poisoned").clone()
    }

    fn our_validator_index(&self, snapshot: &ValidatorSet) -> Option<usize> {
        snapshot
            .by_address(&self.signer.pub_key().address())
            .map(|(index, _)| index)
    }

    async fn progress_routine(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            // Sleep to the next wall-clock multiple of the interval so all
            // nodes wake in loose lock-step.
            let interval = (self.config.progress_interval.as_secs() as i64).max(1);
            let time_to_sleep = interval - helpers::unix_now().rem_euclid(interval);

            tokio::select! {
                _ = shutdown.changed() => {
                    debug!("progress routine shutting down");
                    return;
                }
                _ = tokio::time::sleep(Duration::from_secs(time_to_sleep as u64)) => {}
            }

            self.on_progress_tick();
        }
    }

    /// One pass of the progress routine: archive expired rounds and, if this
    /// node is the proposer, open new ones. Normally driven by the internal
    /// timer task; exposed for hosts embedding their own scheduler.
    pub fn on_progress_tick(&self) {
        let chain_state = match self.state_reader.load_state() {
            Ok(state) => state,
            Err(e) => {
                error!(error = %e, "unable to load host chain state");
                return;
            }
        };
        let snapshot = &chain_state.validators;

        let our_index = self.our_validator_index(snapshot);
        let we_are_proposer = our_index == Some(snapshot.proposer_index());

        let mut fn_ids = self.registry.get_all();
        fn_ids.sort();

        let eligible = {
            let mut state = self.state.lock().expect("state lock poisoned");
            let mut eligible = Vec::with_capacity(fn_ids.len());

            for fn_id in fn_ids {
                let expired = state
                    .current_vote_sets
                    .get(&fn_id)
                    .map(|current| current.is_expired(self.config.validity_period));
                match expired {
                    None => eligible.push(fn_id),
                    Some(true) => {
                        warn!(fn_id = %fn_id, "archiving expired vote set without super-majority");
                        if let Some(timed_out) = state.current_vote_sets.remove(&fn_id) {
                            state
                                .previous_timed_out_vote_sets
                                .insert(fn_id.clone(), timed_out);
                        }
                        metrics::record_set_expired();
                        // The slot is free again; re-propose in this tick.
                        eligible.push(fn_id);
                    }
                    Some(false) => {
                        warn!(fn_id = %fn_id, "previous aggregation round still pending");
                    }
                }
            }

            if let Err(e) = save_reactor_state(self.db.as_ref(), &state) {
                error!(error = %e, "unable to persist reactor state");
            }

            eligible
        };

        if !we_are_proposer {
            return;
        }
        let Some(validator_index) = our_index else {
            return;
        };

        for fn_id in eligible {
            let Some(oracle_fn) = self.registry.get(&fn_id) else {
                continue;
            };
            self.propose(&fn_id, oracle_fn.as_ref(), snapshot, validator_index);
        }
    }

    /// Execute `oracle_fn` over `ctx` and package the result as this
    /// validator's individual response.
    fn run_oracle(
        &self,
        fn_id: &str,
        oracle_fn: &dyn OracleFn,
        ctx: &[u8],
    ) -> Option<FnIndividualExecutionResponse> {
        let (message, oracle_signature) = match oracle_fn.get_message_and_signature(ctx) {
            Ok(pair) => pair,
            Err(e) => {
                error!(fn_id, error = %e, "fn.get_message_and_signature failed");
                return None;
            }
        };

        let hash = hashing::message_hash(&message);

        if let Err(e) = oracle_fn.map_message(ctx, &hash, &message) {
            error!(fn_id, error = %e, "fn.map_message failed");
            return None;
        }

        Some(FnIndividualExecutionResponse {
            status: 0,
            error: String::new(),
            hash,
            oracle_signature,
        })
    }

    /// Open a new aggregation round for `fn_id` as the proposer.
    fn propose(
        &self,
        fn_id: &str,
        oracle_fn: &dyn OracleFn,
        snapshot: &ValidatorSet,
        validator_index: usize,
    ) {
        let ctx = match oracle_fn.prepare_context() {
            Ok(ctx) => ctx,
            Err(e) => {
                error!(fn_id, error = %e, "fn.prepare_context failed");
                return;
            }
        };
        if ctx.len() > self.config.max_context_size {
            error!(
                fn_id,
                size = ctx.len(),
                max = self.config.max_context_size,
                "execution context too large"
            );
            return;
        }

        let Some(individual) = self.run_oracle(fn_id, oracle_fn, &ctx) else {
            return;
        };

        let request = match FnExecutionRequest::for_registered(fn_id, self.registry.as_ref()) {
            Ok(request) => request,
            Err(e) => {
                error!(fn_id, error = %e, "unable to create execution request");
                return;
            }
        };
        let response =
            FnExecutionResponse::from_individual(&individual, validator_index, snapshot.size());
        let payload = FnVotePayload::new(request, response);

        let mut state = self.state.lock().expect("state lock poisoned");

        let vote_set = match FnVoteSet::new(
            self.chain_id.clone(),
            validator_index,
            ctx.clone(),
            payload,
            self.signer.as_ref(),
            snapshot,
        ) {
            Ok(vote_set) => vote_set,
            Err(e) => {
                error!(fn_id, error = %e, "unable to create vote set");
                return;
            }
        };
        metrics::record_proposal();

        // A one-of-one roster is already final: hand the aggregate straight
        // back without persisting or gossiping.
        if vote_set.is_maj23(snapshot) {
            oracle_fn.submit_multi_signed_message(
                &ctx,
                &vote_set.payload.response.hash,
                &vote_set.payload.response.oracle_signatures,
            );
            metrics::record_set_finalized();
            return;
        }

        let bytes = match codec::encode(&vote_set) {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                error!(fn_id, error = %e, "unable to encode vote set");
                return;
            }
        };

        info!(fn_id, "proposing new vote set");
        state.current_vote_sets.insert(fn_id.to_string(), vote_set);
        if let Err(e) = save_reactor_state(self.db.as_ref(), &state) {
            error!(fn_id, error = %e, "unable to persist reactor state");
        }
        drop(state);

        self.broadcast(VOTE_SET_CHANNEL, bytes, None);
    }

    /// In-progress channel: merge, vote, and pass it on.
    fn handle_vote_set_message(&self, sender: &PeerId, msg_bytes: &[u8]) {
        let chain_state = match self.state_reader.load_state() {
            Ok(state) => state,
            Err(e) => {
                error!(error = %e, "unable to load host chain state");
                return;
            }
        };
        let snapshot = &chain_state.validators;
        let our_index = self.our_validator_index(snapshot);

        let remote: FnVoteSet = match codec::decode(msg_bytes) {
            Ok(vote_set) => vote_set,
            Err(e) => {
                metrics::record_invalid_message();
                error!(peer = %sender, error = %e, "dropping undecodable vote set");
                return;
            }
        };

        if let Err(e) = remote.validate(
            &self.chain_id,
            self.config.max_context_size,
            self.config.validity_period,
            snapshot,
            self.registry.as_ref(),
        ) {
            metrics::record_invalid_message();
            error!(peer = %sender, error = %e, "dropping invalid vote set");
            return;
        }

        // Finalized sets belong on the Maj23 channel.
        if remote.is_maj23(snapshot) {
            metrics::record_invalid_message();
            error!(peer = %sender, "protocol violation: finalized vote set on the in-progress channel");
            return;
        }

        let fn_id = remote.fn_id().to_string();
        let Some(oracle_fn) = self.registry.get(&fn_id) else {
            return;
        };

        let mut state = self.state.lock().expect("state lock poisoned");

        let mut did_we_contribute = false;
        let mut our_set_changed = false;

        match state.current_vote_sets.entry(fn_id.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(remote);
                our_set_changed = true;
            }
            Entry::Occupied(mut entry) => match entry.get_mut().merge(&remote, snapshot) {
                Ok(changed) => {
                    did_we_contribute = changed;
                    our_set_changed = changed;
                }
                Err(e) => {
                    error!(fn_id = %fn_id, peer = %sender, error = %e, "unable to merge remote vote set");
                    return;
                }
            },
        }

        let current = state
            .current_vote_sets
            .get_mut(&fn_id)
            .expect("vote set installed above");

        if let Some(validator_index) = our_index {
            if !current.vote_bitarray.get(validator_index) {
                let ctx = current.execution_context.clone();
                let Some(individual) = self.run_oracle(&fn_id, oracle_fn.as_ref(), &ctx) else {
                    return;
                };
                if let Err(e) =
                    current.add_vote(&individual, snapshot, validator_index, self.signer.as_ref())
                {
                    error!(fn_id = %fn_id, error = %e, "unable to add own vote");
                    return;
                }
                metrics::record_vote_cast();
                did_we_contribute = true;
                our_set_changed = true;
            }
        }

        let finalized = current.is_maj23(snapshot);
        if finalized {
            info!(
                fn_id = %fn_id,
                voting_power = current.total_voting_power,
                "super-majority reached, submitting aggregate"
            );
            oracle_fn.submit_multi_signed_message(
                &current.execution_context,
                &current.payload.response.hash,
                &current.payload.response.oracle_signatures,
            );
            metrics::record_set_finalized();

            let finalized_set = state
                .current_vote_sets
                .remove(&fn_id)
                .expect("vote set installed above");
            state
                .previous_maj23_vote_sets
                .insert(fn_id.clone(), finalized_set);
        }

        if let Err(e) = save_reactor_state(self.db.as_ref(), &state) {
            error!(fn_id = %fn_id, error = %e, "unable to persist reactor state");
        }

        // Nothing changed on our side, so peers already have everything we
        // could announce.
        if !our_set_changed {
            return;
        }

        let our_set = if finalized {
            state.previous_maj23_vote_sets.get(&fn_id)
        } else {
            state.current_vote_sets.get(&fn_id)
        }
        .expect("vote set tracked above");

        let bytes = match codec::encode(our_set) {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                error!(fn_id = %fn_id, error = %e, "unable to encode vote set");
                return;
            }
        };
        drop(state);

        // The sender already has everything we'd echo back unless our own
        // vote went in.
        let exclude = (!did_we_contribute).then(|| sender.clone());
        let channel = if finalized {
            VOTE_SET_MAJ23_CHANNEL
        } else {
            VOTE_SET_CHANNEL
        };
        self.broadcast(channel, bytes, exclude.as_ref());
    }

    /// Maj23 channel: a finalized set supersedes whatever we hold.
    fn handle_maj23_message(&self, sender: &PeerId, msg_bytes: &[u8]) {
        let chain_state = match self.state_reader.load_state() {
            Ok(state) => state,
            Err(e) => {
                error!(error = %e, "unable to load host chain state");
                return;
            }
        };
        let snapshot = &chain_state.validators;

        let remote: FnVoteSet = match codec::decode(msg_bytes) {
            Ok(vote_set) => vote_set,
            Err(e) => {
                metrics::record_invalid_message();
                error!(peer = %sender, error = %e, "dropping undecodable vote set");
                return;
            }
        };

        if let Err(e) = remote.validate(
            &self.chain_id,
            self.config.max_context_size,
            self.config.validity_period,
            snapshot,
            self.registry.as_ref(),
        ) {
            metrics::record_invalid_message();
            error!(peer = %sender, error = %e, "dropping invalid vote set");
            return;
        }

        if !remote.is_maj23(snapshot) {
            metrics::record_invalid_message();
            error!(peer = %sender, "protocol violation: vote set below super-majority on the finalized channel");
            return;
        }

        let fn_id = remote.fn_id().to_string();
        info!(fn_id = %fn_id, "installing finalized vote set from peer");

        {
            let mut state = self.state.lock().expect("state lock poisoned");

            // Ours is at best a subset of the finalized set.
            state.current_vote_sets.remove(&fn_id);
            state.previous_maj23_vote_sets.insert(fn_id, remote);

            if let Err(e) = save_reactor_state(self.db.as_ref(), &state) {
                error!(error = %e, "unable to persist reactor state");
            }
        }
        metrics::record_maj23_relayed();

        // The transport reuses msg_bytes once receive returns; the relay
        // tasks get their own copy.
        let copied = Bytes::copy_from_slice(msg_bytes);
        self.broadcast(VOTE_SET_MAJ23_CHANNEL, copied, Some(sender));
    }

    /// Send `bytes` to every connected peer on `channel`, each send in its
    /// own task with owned captures.
    fn broadcast(&self, channel: ChannelId, bytes: Bytes, exclude: Option<&PeerId>) {
        let peers = self.peers.read().expect("peer map lock poisoned");
        for (peer_id, peer) in peers.iter() {
            if Some(peer_id) == exclude {
                continue;
            }
            let peer = Arc::clone(peer);
            let bytes = bytes.clone();
            tokio::spawn(async move {
                if !peer.send(channel, bytes).await {
                    warn!(peer_id = %peer.id(), channel, "peer send failed");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryFnRegistry;
    use crate::storage::MemDb;
    use oraclesig_types::{ChainState, KeyPair, StateError, Validator};

    struct FixedStateReader(ValidatorSet);

    impl StateReader for FixedStateReader {
        fn load_state(&self) -> Result<ChainState, StateError> {
            Ok(ChainState {
                validators: self.0.clone(),
            })
        }
    }

    fn make_reactor(keys: &[KeyPair], own: usize) -> Reactor {
        let validators = keys
            .iter()
            .map(|k| Validator {
                address: k.public_key().address(),
                pub_key: k.public_key(),
                voting_power: 1,
            })
            .collect();
        let snapshot = ValidatorSet::new(validators, 0);
        Reactor::new(
            "test-chain",
            ReactorConfig::default(),
            Arc::new(InMemoryFnRegistry::new()),
            Arc::new(keys[own].clone()),
            Arc::new(FixedStateReader(snapshot)),
            Arc::new(MemDb::new()),
        )
    }

    #[test]
    fn test_our_validator_index() {
        let keys: Vec<KeyPair> = (0..3).map(|i| KeyPair::from_seed([i + 1; 32])).collect();
        let reactor = make_reactor(&keys, 1);

        let snapshot = reactor.state_reader.load_state().unwrap().validators;
        assert_eq!(reactor.our_validator_index(&snapshot), Some(1));

        let outsider = KeyPair::from_seed([42; 32]);
        let non_validator = Reactor::new(
            "test-chain",
            ReactorConfig::default(),
            Arc::new(InMemoryFnRegistry::new()),
            Arc::new(outsider),
            Arc::new(FixedStateReader(snapshot.clone())),
            Arc::new(MemDb::new()),
        );
        assert_eq!(non_validator.our_validator_index(&snapshot), None);
    }

    #[tokio::test]
    async fn test_unknown_channel_is_dropped() {
        let keys: Vec<KeyPair> = (0..2).map(|i| KeyPair::from_seed([i + 1; 32])).collect();
        let reactor = make_reactor(&keys, 0);

        reactor.receive(0x7f, &PeerId::new("peer-1"), b"whatever");
        assert_eq!(reactor.state_snapshot(), ReactorState::default());
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let keys: Vec<KeyPair> = (0..2).map(|i| KeyPair::from_seed([i + 1; 32])).collect();
        let reactor = Arc::new(make_reactor(&keys, 0));

        let handle = reactor.start().unwrap();
        reactor.stop();
        handle.await.unwrap();
    }
}
