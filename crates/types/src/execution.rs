//! Fn-execution message types.
//!
//! These are the payload types carried inside a vote set: the execution
//! request (which Fn ran), the per-validator execution result, and the
//! aggregate that accumulates one oracle signature per validator slot.
//!
//! Canonical comparison decides merge compatibility. It deliberately ignores
//! the per-slot oracle signatures: two aggregates for the same round differ
//! only in which slots are filled, and `==` covers full equality where it is
//! needed.

use crate::codec;
use crate::error::{CodecError, VoteSetError};
use crate::fns::FnRegistry;
use crate::validator::ValidatorSet;
use sbor::prelude::BasicSbor;

/// One validator's execution result for a single Fn round.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct FnIndividualExecutionResponse {
    pub status: i64,
    pub error: String,
    pub hash: Vec<u8>,
    pub oracle_signature: Vec<u8>,
}

/// Names the Fn a vote set is aggregating for.
///
/// Only the id participates in canonical equality; the struct exists so the
/// request side of the payload can grow without a wire break.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct FnExecutionRequest {
    pub fn_id: String,
}

impl FnExecutionRequest {
    pub fn new(fn_id: impl Into<String>) -> Self {
        Self {
            fn_id: fn_id.into(),
        }
    }

    /// Build a request, rejecting ids absent from the registry.
    pub fn for_registered(fn_id: &str, registry: &dyn FnRegistry) -> Result<Self, VoteSetError> {
        if registry.get(fn_id).is_none() {
            return Err(VoteSetError::InvalidFnId(fn_id.to_string()));
        }
        Ok(Self::new(fn_id))
    }

    /// Canonical equality: the id matches.
    pub fn canonical_eq(&self, other: &FnExecutionRequest) -> bool {
        self.fn_id == other.fn_id
    }

    pub fn sign_bytes(&self) -> Result<Vec<u8>, CodecError> {
        codec::encode(self)
    }
}

/// The aggregate execution response: one oracle-signature slot per
/// validator, indexed by position in the validator set frozen at creation.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct FnExecutionResponse {
    pub status: i64,
    pub error: String,
    pub hash: Vec<u8>,
    pub oracle_signatures: Vec<Option<Vec<u8>>>,
}

impl FnExecutionResponse {
    /// Build an aggregate from one validator's result, with that
    /// validator's slot filled and all others empty.
    pub fn from_individual(
        individual: &FnIndividualExecutionResponse,
        validator_index: usize,
        roster_size: usize,
    ) -> Self {
        let mut oracle_signatures = vec![None; roster_size];
        oracle_signatures[validator_index] = Some(individual.oracle_signature.clone());
        Self {
            status: individual.status,
            error: individual.error.clone(),
            hash: individual.hash.clone(),
            oracle_signatures,
        }
    }

    /// Structural validity against the current roster: a hash is present and
    /// the slot array matches the roster size.
    pub fn is_valid(&self, snapshot: &ValidatorSet) -> bool {
        !self.hash.is_empty() && self.oracle_signatures.len() == snapshot.size()
    }

    /// Canonical equality: status, error, hash, and slot count match.
    /// Slot contents are intentionally excluded.
    pub fn canonical_eq(&self, other: &FnExecutionResponse) -> bool {
        self.status == other.status
            && self.error == other.error
            && self.hash == other.hash
            && self.oracle_signatures.len() == other.oracle_signatures.len()
    }

    /// Whether a validator's individual result is compatible with this
    /// aggregate.
    pub fn matches_individual(&self, individual: &FnIndividualExecutionResponse) -> bool {
        self.status == individual.status
            && self.error == individual.error
            && self.hash == individual.hash
    }

    /// Sign-bytes for slot `validator_index`: the encoding of the
    /// single-validator view. Including the slot's own oracle signature
    /// prevents a signature from being replayed into another slot.
    pub fn sign_bytes(&self, validator_index: usize) -> Result<Vec<u8>, CodecError> {
        let individual = FnIndividualExecutionResponse {
            status: self.status,
            error: self.error.clone(),
            hash: self.hash.clone(),
            oracle_signature: self.oracle_signatures[validator_index]
                .clone()
                .unwrap_or_default(),
        };
        codec::encode(&individual)
    }

    /// Fill slot `validator_index` with an oracle signature.
    pub fn add_signature(
        &mut self,
        validator_index: usize,
        signature: Vec<u8>,
    ) -> Result<(), VoteSetError> {
        if self.oracle_signatures[validator_index].is_some() {
            return Err(VoteSetError::ResponseSignatureAlreadyPresent);
        }
        self.oracle_signatures[validator_index] = Some(signature);
        Ok(())
    }
}

/// Separator between the request and response sign-bytes.
const PAYLOAD_SIGN_SEPARATOR: u8 = 0x50;

/// The immutable payload of a vote set: request plus aggregate response.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct FnVotePayload {
    pub request: FnExecutionRequest,
    pub response: FnExecutionResponse,
}

impl FnVotePayload {
    pub fn new(request: FnExecutionRequest, response: FnExecutionResponse) -> Self {
        Self { request, response }
    }

    pub fn is_valid(&self, snapshot: &ValidatorSet) -> bool {
        self.response.is_valid(snapshot)
    }

    pub fn canonical_eq(&self, other: &FnVotePayload) -> bool {
        self.request.canonical_eq(&other.request) && self.response.canonical_eq(&other.response)
    }

    pub fn sign_bytes(&self, validator_index: usize) -> Result<Vec<u8>, CodecError> {
        let request_bytes = self.request.sign_bytes()?;
        let response_bytes = self.response.sign_bytes(validator_index)?;

        let mut bytes = Vec::with_capacity(request_bytes.len() + 1 + response_bytes.len());
        bytes.extend_from_slice(&request_bytes);
        bytes.push(PAYLOAD_SIGN_SEPARATOR);
        bytes.extend_from_slice(&response_bytes);
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::validator::Validator;

    fn make_snapshot(size: usize) -> ValidatorSet {
        let validators = (0..size)
            .map(|i| {
                let pair = KeyPair::from_seed([i as u8 + 1; 32]);
                Validator {
                    address: pair.public_key().address(),
                    pub_key: pair.public_key(),
                    voting_power: 1,
                }
            })
            .collect();
        ValidatorSet::new(validators, 0)
    }

    fn make_individual(seed: u8) -> FnIndividualExecutionResponse {
        FnIndividualExecutionResponse {
            status: 0,
            error: String::new(),
            hash: vec![seed; 64],
            oracle_signature: vec![seed, seed + 1],
        }
    }

    #[test]
    fn test_from_individual_fills_one_slot() {
        let response = FnExecutionResponse::from_individual(&make_individual(3), 2, 4);
        assert_eq!(response.oracle_signatures.len(), 4);
        assert_eq!(response.oracle_signatures[2], Some(vec![3, 4]));
        assert!(response.oracle_signatures[0].is_none());
        assert!(response.is_valid(&make_snapshot(4)));
        assert!(!response.is_valid(&make_snapshot(5)));
    }

    #[test]
    fn test_canonical_eq_ignores_slot_contents() {
        let a = FnExecutionResponse::from_individual(&make_individual(3), 0, 4);
        let b = FnExecutionResponse::from_individual(&make_individual(3), 1, 4);
        assert!(a.canonical_eq(&b));
        assert_ne!(a, b);

        let mut c = b.clone();
        c.hash = vec![9; 64];
        assert!(!a.canonical_eq(&c));
    }

    #[test]
    fn test_add_signature_rejects_occupied_slot() {
        let mut response = FnExecutionResponse::from_individual(&make_individual(3), 0, 4);
        response.add_signature(1, vec![7]).unwrap();
        assert_eq!(
            response.add_signature(1, vec![8]),
            Err(VoteSetError::ResponseSignatureAlreadyPresent)
        );
        assert_eq!(
            response.add_signature(0, vec![8]),
            Err(VoteSetError::ResponseSignatureAlreadyPresent)
        );
    }

    #[test]
    fn test_sign_bytes_bind_the_slot() {
        let mut response = FnExecutionResponse::from_individual(&make_individual(3), 0, 4);
        response.add_signature(1, vec![9, 9]).unwrap();
        let slot0 = response.sign_bytes(0).unwrap();
        let slot1 = response.sign_bytes(1).unwrap();
        assert_ne!(slot0, slot1);
    }

    #[test]
    fn test_payload_sign_bytes_cover_request_and_response() {
        let payload = FnVotePayload::new(
            FnExecutionRequest::new("price-feed"),
            FnExecutionResponse::from_individual(&make_individual(3), 0, 4),
        );
        let other = FnVotePayload::new(
            FnExecutionRequest::new("rate-feed"),
            FnExecutionResponse::from_individual(&make_individual(3), 0, 4),
        );
        assert_ne!(
            payload.sign_bytes(0).unwrap(),
            other.sign_bytes(0).unwrap()
        );
        assert!(!payload.canonical_eq(&other));
    }
}
