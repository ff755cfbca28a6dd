//! The per-Fn vote set: the accumulator of validator contributions for one
//! aggregation round.
//!
//! A vote set is created by the round's proposer (or installed on arrival of
//! a validated remote set) and then only ever mutated by [`FnVoteSet::add_vote`]
//! (our own contribution) or [`FnVoteSet::merge`] (a peer's contributions).
//! Validator identity is positional: three parallel `N`-sized arrays (bit
//! array, validator signatures, validator addresses) share the slot index of
//! the validator-set snapshot frozen at construction.
//!
//! # Sign-bytes
//!
//! Validator `i` signs:
//!
//! ```text
//! "CT:<creationTime>|CD:<chainID>|VA:<validatorAddresses[i]>|PL:"
//!     ++ SEP ++ executionContext ++ SEP ++ payload.sign_bytes(i)
//! ```
//!
//! The embedded slot address pins a signature to its slot, the creation time
//! pins it to one round, and the execution context pins it to the proposer's
//! snapshot.

use crate::bitset::BitSet;
use crate::crypto::{PublicKey, Signature, Signer};
use crate::error::VoteSetError;
use crate::execution::{FnIndividualExecutionResponse, FnVotePayload};
use crate::fns::FnRegistry;
use crate::helpers::unix_now;
use crate::validator::ValidatorSet;
use sbor::prelude::BasicSbor;
use std::time::Duration;

/// Separator between the header prefix, execution context, and payload
/// sign-bytes.
const SIGN_SEPARATOR: [u8; 4] = [0x11, 0x13, 0x17, 0x1d];

/// Per-Fn tally of validator contributions for one round.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct FnVoteSet {
    pub chain_id: String,
    /// Sum of voting power over contributing validators.
    pub total_voting_power: u64,
    /// Unix seconds at construction; starts the validity window.
    pub creation_time: i64,
    /// Bit `i` set ⇔ validator `i` has contributed.
    pub vote_bitarray: BitSet,
    pub payload: FnVotePayload,
    /// Proposer's context snapshot, passed to every Fn execution.
    pub execution_context: Vec<u8>,
    /// Validator `i`'s signature over the slot-`i` sign-bytes.
    pub validator_signatures: Vec<Option<Signature>>,
    /// Roster addresses frozen from the snapshot at construction.
    pub validator_addresses: Vec<Vec<u8>>,
}

impl FnVoteSet {
    /// Create a vote set containing the local validator's own vote.
    pub fn new(
        chain_id: impl Into<String>,
        validator_index: usize,
        execution_context: Vec<u8>,
        payload: FnVotePayload,
        signer: &dyn Signer,
        snapshot: &ValidatorSet,
    ) -> Result<Self, VoteSetError> {
        if !payload.is_valid(snapshot) {
            return Err(VoteSetError::PayloadInvalid);
        }

        let own_power = snapshot
            .by_index(validator_index)
            .map(|v| v.voting_power)
            .ok_or(VoteSetError::InvalidValidatorIndex)?;
        if own_power == 0 {
            return Err(VoteSetError::InvalidValidatorIndex);
        }

        let validator_addresses: Vec<Vec<u8>> =
            snapshot.iter().map(|(_, v)| v.address.clone()).collect();

        let mut vote_bitarray = BitSet::new(snapshot.size());
        vote_bitarray.set(validator_index, true);

        let mut vote_set = Self {
            chain_id: chain_id.into(),
            total_voting_power: own_power,
            creation_time: unix_now(),
            vote_bitarray,
            payload,
            execution_context,
            validator_signatures: vec![None; snapshot.size()],
            validator_addresses,
        };

        let sign_bytes = vote_set.sign_bytes(validator_index)?;
        let signature = signer
            .sign(&sign_bytes)
            .map_err(|e| VoteSetError::Signing(e.to_string()))?;
        vote_set.validator_signatures[validator_index] = Some(signature);

        Ok(vote_set)
    }

    /// The Fn this set is aggregating for.
    pub fn fn_id(&self) -> &str {
        &self.payload.request.fn_id
    }

    /// Canonical sign-bytes for slot `validator_index`.
    pub fn sign_bytes(&self, validator_index: usize) -> Result<Vec<u8>, VoteSetError> {
        let payload_bytes = self.payload.sign_bytes(validator_index)?;
        let address = &self.validator_addresses[validator_index];

        let prefix = format!("CT:{}|CD:{}|VA:", self.creation_time, self.chain_id);
        let mut bytes = Vec::with_capacity(
            prefix.len()
                + address.len()
                + 4
                + 2 * SIGN_SEPARATOR.len()
                + self.execution_context.len()
                + payload_bytes.len(),
        );
        bytes.extend_from_slice(prefix.as_bytes());
        bytes.extend_from_slice(address);
        bytes.extend_from_slice(b"|PL:");
        bytes.extend_from_slice(&SIGN_SEPARATOR);
        bytes.extend_from_slice(&self.execution_context);
        bytes.extend_from_slice(&SIGN_SEPARATOR);
        bytes.extend_from_slice(&payload_bytes);
        Ok(bytes)
    }

    /// Verify validator `validator_index`'s stored signature under `pub_key`.
    pub fn verify_validator_sign(
        &self,
        validator_index: usize,
        pub_key: &PublicKey,
    ) -> Result<(), VoteSetError> {
        if !self.vote_bitarray.get(validator_index) {
            return Err(VoteSetError::VoteNotPresent);
        }
        let signature = self.validator_signatures[validator_index]
            .as_ref()
            .ok_or(VoteSetError::VoteNotPresent)?;

        if pub_key.address() != self.validator_addresses[validator_index] {
            return Err(VoteSetError::InvalidValidatorAddress);
        }

        let sign_bytes = self.sign_bytes(validator_index)?;
        if !pub_key.verify_bytes(&sign_bytes, signature) {
            return Err(VoteSetError::InvalidSignature);
        }
        Ok(())
    }

    /// Whether the validity window has elapsed.
    pub fn is_expired(&self, validity_period: Duration) -> bool {
        self.is_expired_at(validity_period, unix_now())
    }

    /// Expiry check against an explicit clock reading.
    pub fn is_expired_at(&self, validity_period: Duration, now: i64) -> bool {
        now > self.creation_time + validity_period.as_secs() as i64
    }

    /// Whether contributing power is a super-majority of the snapshot.
    pub fn is_maj23(&self, snapshot: &ValidatorSet) -> bool {
        snapshot.has_quorum(self.total_voting_power)
    }

    /// Merge-compatibility: same payload (canonically), same roster shape,
    /// same context, same frozen addresses. Differences in which slots are
    /// signed are expected; differences in anything else are not.
    pub fn canonical_eq(&self, other: &FnVoteSet) -> bool {
        self.payload.canonical_eq(&other.payload)
            && self.validator_signatures.len() == other.validator_signatures.len()
            && self.validator_addresses.len() == other.validator_addresses.len()
            && self.execution_context == other.execution_context
            && self.validator_addresses == other.validator_addresses
    }

    /// Full validation of a set received from a peer. Must be the first call
    /// on any remote set, before it is merged or installed.
    pub fn validate(
        &self,
        chain_id: &str,
        max_context_size: usize,
        validity_period: Duration,
        snapshot: &ValidatorSet,
        registry: &dyn FnRegistry,
    ) -> Result<(), VoteSetError> {
        if !self.payload.is_valid(snapshot) {
            return Err(VoteSetError::PayloadInvalid);
        }

        if registry.get(self.fn_id()).is_none() {
            return Err(VoteSetError::InvalidFnId(self.fn_id().to_string()));
        }

        if self.chain_id != chain_id {
            return Err(VoteSetError::ChainIdMismatch {
                expected: chain_id.to_string(),
                actual: self.chain_id.clone(),
            });
        }

        if self.is_expired(validity_period) {
            return Err(VoteSetError::Expired);
        }

        let roster_size = snapshot.size();
        if self.vote_bitarray.size() != roster_size
            || self.validator_addresses.len() != roster_size
            || self.validator_signatures.len() != roster_size
        {
            return Err(VoteSetError::RosterSizeMismatch);
        }

        if self.execution_context.len() > max_context_size {
            return Err(VoteSetError::ContextTooLarge {
                max: max_context_size,
                actual: self.execution_context.len(),
            });
        }

        let mut calculated_voting_power = 0u64;
        for (i, validator) in snapshot.iter() {
            if self.validator_addresses[i] != validator.address {
                return Err(VoteSetError::InvalidValidatorAddress);
            }
            if !self.vote_bitarray.get(i) {
                continue;
            }
            self.verify_validator_sign(i, &validator.pub_key)?;
            calculated_voting_power += validator.voting_power;
        }

        if self.total_voting_power != calculated_voting_power {
            return Err(VoteSetError::VotingPowerMismatch);
        }

        Ok(())
    }

    /// Merge a peer's contributions into this set.
    ///
    /// Returns whether any slot was filled. The caller is expected to have
    /// validated `other` already; each copied signature is nevertheless
    /// re-verified against the local snapshot's public key, so a diverged
    /// snapshot cannot smuggle an unverifiable slot in. On error the set is
    /// unchanged.
    pub fn merge(
        &mut self,
        other: &FnVoteSet,
        snapshot: &ValidatorSet,
    ) -> Result<bool, VoteSetError> {
        if !self.canonical_eq(other) {
            return Err(VoteSetError::MergeDiffPayload);
        }

        // Verify every incoming slot before committing any of them.
        let mut incoming: Vec<(usize, Signature, u64)> = Vec::new();
        for i in 0..self.vote_bitarray.size() {
            if self.vote_bitarray.get(i) || !other.vote_bitarray.get(i) {
                continue;
            }

            let signature = other.validator_signatures[i]
                .as_ref()
                .ok_or(VoteSetError::VoteNotPresent)?;
            let validator = snapshot
                .by_index(i)
                .ok_or(VoteSetError::InvalidValidatorIndex)?;
            if validator.pub_key.address() != other.validator_addresses[i] {
                return Err(VoteSetError::InvalidValidatorAddress);
            }

            let sign_bytes = other.sign_bytes(i)?;
            if !validator.pub_key.verify_bytes(&sign_bytes, signature) {
                return Err(VoteSetError::InvalidSignature);
            }

            incoming.push((i, signature.clone(), validator.voting_power));
        }

        let has_changed = !incoming.is_empty();
        for (i, signature, voting_power) in incoming {
            // The address copy is redundant when invariants hold, but lets a
            // partially-initialized set recover a full roster from its peer.
            self.validator_addresses[i] = other.validator_addresses[i].clone();
            self.validator_signatures[i] = Some(signature);
            self.vote_bitarray.set(i, true);
            self.total_voting_power += voting_power;
        }

        Ok(has_changed)
    }

    /// Cast the local validator's vote into this set.
    ///
    /// Fills the oracle-signature slot, signs the slot's sign-bytes, and
    /// updates the bit array and voting power. On error the set is
    /// unchanged.
    pub fn add_vote(
        &mut self,
        individual: &FnIndividualExecutionResponse,
        snapshot: &ValidatorSet,
        validator_index: usize,
        signer: &dyn Signer,
    ) -> Result<(), VoteSetError> {
        if self.vote_bitarray.get(validator_index) {
            return Err(VoteSetError::VoteAlreadyCast);
        }

        if !self.payload.response.matches_individual(individual) {
            return Err(VoteSetError::ExecutionMismatch);
        }

        let validator = snapshot
            .by_index(validator_index)
            .ok_or(VoteSetError::InvalidValidatorIndex)?;
        if validator.address != self.validator_addresses[validator_index] {
            return Err(VoteSetError::InvalidValidatorAddress);
        }

        self.payload
            .response
            .add_signature(validator_index, individual.oracle_signature.clone())?;

        // Signing failures roll the oracle signature back so the set stays
        // untouched.
        let signature = self
            .sign_bytes(validator_index)
            .and_then(|bytes| {
                signer
                    .sign(&bytes)
                    .map_err(|e| VoteSetError::Signing(e.to_string()))
            })
            .inspect_err(|_| {
                self.payload.response.oracle_signatures[validator_index] = None;
            })?;

        self.vote_bitarray.set(validator_index, true);
        self.validator_signatures[validator_index] = Some(signature);
        self.total_voting_power += validator.voting_power;

        Ok(())
    }
}
