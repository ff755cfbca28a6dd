//! Core types for the oraclesig consensus reactor.
//!
//! This crate provides the foundational types for off-chain multi-signature
//! aggregation:
//!
//! - **Codec**: tagged, length-prefixed framing over SBOR for all
//!   gossiped/persisted types
//! - **Primitives**: `BitSet`, keys, signatures, validator roster
//! - **Fn-execution messages**: request, individual and aggregate responses,
//!   vote payload
//! - **Vote set**: the per-Fn tally of validator contributions
//! - **Reactor state**: the three per-Fn vote-set maps and their wire form
//! - **Seams**: `Signer`, `StateReader`, `OracleFn`, `FnRegistry` traits
//!   implemented by the host and the application
//!
//! # Design Philosophy
//!
//! This crate is self-contained and does not depend on any other workspace
//! crate, making it the foundation layer. Everything networked lives in the
//! reactor crate on top.

mod bitset;
mod crypto;
mod error;
mod execution;
mod fns;
mod reactor_state;
mod validator;
mod vote_set;

pub mod codec;

pub use bitset::BitSet;
pub use crypto::{KeyPair, PublicKey, SignError, Signature, Signer, ADDRESS_LEN};
pub use error::{CodecError, VoteSetError};
pub use execution::{
    FnExecutionRequest, FnExecutionResponse, FnIndividualExecutionResponse, FnVotePayload,
};
pub use fns::{FnError, FnRegistry, OracleFn};
pub use reactor_state::ReactorState;
pub use validator::{ChainState, StateError, StateReader, Validator, ValidatorSet};
pub use vote_set::FnVoteSet;

/// Helper functions.
pub mod helpers {
    use std::time::{SystemTime, UNIX_EPOCH};

    /// Current wall-clock time as Unix seconds.
    pub fn unix_now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before Unix epoch")
            .as_secs() as i64
    }
}
