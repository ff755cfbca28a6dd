//! Gossip reactor for off-chain multi-signature aggregation.
//!
//! This crate drives the vote-set protocol on top of a host blockchain's
//! P2P framework:
//!
//! - `Event::ProgressTick` equivalent → archive expired rounds, propose new
//!   ones if this node is the current proposer
//! - Vote set received on `0x50` → validate, merge, add our vote, submit the
//!   aggregate once a super-majority of voting power has contributed
//! - Finalized set received on `0x51` → supersede the local round and relay
//!
//! # Terminology
//!
//! - **Fn**: a deterministic application routine producing
//!   `(message, oracle signature)` from a context snapshot.
//!
//! - **Round**: the lifetime of one vote set per Fn, from proposal to
//!   finalization or expiry. Rounds open on a 120 s wall-clock-aligned tick
//!   and are valid for 119 s, so one round always closes before the next
//!   tick.
//!
//! - **Maj23**: voting power strictly exceeding two thirds of the roster
//!   total. The node whose vote crosses the threshold submits the aggregate
//!   to the application and terminates the round's gossip on the finalized
//!   channel.
//!
//! The host supplies peer lifecycle and transport, the validator roster, a
//! signing key, and a key-value store for crash recovery; the application
//! supplies the Fn registry. All of those enter through traits, so the
//! reactor itself owns nothing but the protocol.

mod config;
mod hashing;
mod metrics;
mod peer;
mod reactor;
mod registry;
mod storage;

pub use config::{
    channel_descriptors, ChannelDescriptor, ChannelId, ReactorConfig, DEFAULT_VALIDITY_PERIOD,
    MAX_CONTEXT_SIZE, MAX_MSG_SIZE, PROGRESS_INTERVAL, VOTE_SET_CHANNEL, VOTE_SET_MAJ23_CHANNEL,
};
pub use hashing::message_hash;
pub use peer::{Peer, PeerId};
pub use reactor::{Reactor, ReactorError};
pub use registry::InMemoryFnRegistry;
pub use storage::{
    load_reactor_state, save_reactor_state, MemDb, ReactorDb, RocksReactorDb, StorageError,
    REACTOR_STATE_KEY,
};
