//! Reactor state: the three per-Fn vote-set maps and their wire form.

use crate::codec;
use crate::error::CodecError;
use crate::vote_set::FnVoteSet;
use sbor::prelude::BasicSbor;
use std::collections::HashMap;

/// The reactor's crash-safe state.
///
/// A vote set lives in exactly one of the three maps: `current_vote_sets`
/// while a round is in flight, then either `previous_maj23_vote_sets`
/// (finalized) or `previous_timed_out_vote_sets` (validity elapsed). Retired
/// sets are kept for peer assistance and are overwritten by the next
/// lifecycle round for the same Fn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReactorState {
    pub current_vote_sets: HashMap<String, FnVoteSet>,
    pub previous_timed_out_vote_sets: HashMap<String, FnVoteSet>,
    pub previous_maj23_vote_sets: HashMap<String, FnVoteSet>,
}

/// Wire form: three parallel sequences. The Fn id is rederived from each
/// set's payload on load, so it is not stored twice.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub(crate) struct ReactorStateRecord {
    pub(crate) current_vote_sets: Vec<FnVoteSet>,
    pub(crate) previous_timed_out_vote_sets: Vec<FnVoteSet>,
    pub(crate) previous_maj23_vote_sets: Vec<FnVoteSet>,
}

fn to_sorted_vec(map: &HashMap<String, FnVoteSet>) -> Vec<FnVoteSet> {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    keys.into_iter().map(|k| map[k].clone()).collect()
}

fn to_map(sets: Vec<FnVoteSet>) -> HashMap<String, FnVoteSet> {
    sets.into_iter()
        .map(|set| (set.fn_id().to_string(), set))
        .collect()
}

impl ReactorState {
    /// Encode for persistence. Maps are flattened in sorted key order so the
    /// encoding of a given state is stable.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        codec::encode(&ReactorStateRecord {
            current_vote_sets: to_sorted_vec(&self.current_vote_sets),
            previous_timed_out_vote_sets: to_sorted_vec(&self.previous_timed_out_vote_sets),
            previous_maj23_vote_sets: to_sorted_vec(&self.previous_maj23_vote_sets),
        })
    }

    /// Decode a persisted state, rekeying each set by its payload's Fn id.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let record: ReactorStateRecord = codec::decode(bytes)?;
        Ok(Self {
            current_vote_sets: to_map(record.current_vote_sets),
            previous_timed_out_vote_sets: to_map(record.previous_timed_out_vote_sets),
            previous_maj23_vote_sets: to_map(record.previous_maj23_vote_sets),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::execution::{
        FnExecutionRequest, FnExecutionResponse, FnIndividualExecutionResponse, FnVotePayload,
    };
    use crate::validator::{Validator, ValidatorSet};

    fn make_vote_set(fn_id: &str) -> FnVoteSet {
        let pair = KeyPair::from_seed([9; 32]);
        let snapshot = ValidatorSet::new(
            vec![Validator {
                address: pair.public_key().address(),
                pub_key: pair.public_key(),
                voting_power: 1,
            }],
            0,
        );
        let individual = FnIndividualExecutionResponse {
            status: 0,
            error: String::new(),
            hash: vec![1; 64],
            oracle_signature: vec![2; 8],
        };
        let payload = FnVotePayload::new(
            FnExecutionRequest::new(fn_id),
            FnExecutionResponse::from_individual(&individual, 0, 1),
        );
        FnVoteSet::new("test-chain", 0, vec![], payload, &pair, &snapshot).unwrap()
    }

    #[test]
    fn test_round_trip_rekeys_by_fn_id() {
        let mut state = ReactorState::default();
        state
            .current_vote_sets
            .insert("alpha".to_string(), make_vote_set("alpha"));
        state
            .current_vote_sets
            .insert("beta".to_string(), make_vote_set("beta"));
        state
            .previous_maj23_vote_sets
            .insert("gamma".to_string(), make_vote_set("gamma"));

        let decoded = ReactorState::decode(&state.encode().unwrap()).unwrap();
        assert_eq!(decoded, state);
        assert!(decoded.previous_timed_out_vote_sets.is_empty());
    }

    #[test]
    fn test_empty_state_round_trips() {
        let state = ReactorState::default();
        let decoded = ReactorState::decode(&state.encode().unwrap()).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_encoding_is_stable() {
        let mut state = ReactorState::default();
        for fn_id in ["zeta", "alpha", "mid"] {
            state
                .current_vote_sets
                .insert(fn_id.to_string(), make_vote_set(fn_id));
        }
        assert_eq!(state.encode().unwrap(), state.encode().unwrap());
    }
}
