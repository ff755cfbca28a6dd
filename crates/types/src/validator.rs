//! Validator roster model and the host state-store seam.
//!
//! The host chain owns validator election; this crate only reads a snapshot
//! of the roster. Validator identity is positional: index `i` in the set is
//! the slot used by bit arrays and signature arrays everywhere else.

use crate::crypto::PublicKey;
use sbor::prelude::BasicSbor;
use thiserror::Error;

/// One validator in the roster.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct Validator {
    pub address: Vec<u8>,
    pub pub_key: PublicKey,
    pub voting_power: u64,
}

/// An ordered validator roster with a designated proposer.
///
/// Iteration order is the slot order; it must be identical on every node
/// for a given height, which the host chain guarantees.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct ValidatorSet {
    validators: Vec<Validator>,
    proposer_index: u64,
}

impl ValidatorSet {
    /// Build a roster. `proposer_index` must be a valid slot.
    pub fn new(validators: Vec<Validator>, proposer_index: usize) -> Self {
        assert!(
            proposer_index < validators.len(),
            "proposer index {proposer_index} out of range for {} validators",
            validators.len()
        );
        Self {
            validators,
            proposer_index: proposer_index as u64,
        }
    }

    pub fn size(&self) -> usize {
        self.validators.len()
    }

    /// Sum of voting power over the whole roster.
    pub fn total_voting_power(&self) -> u64 {
        self.validators.iter().map(|v| v.voting_power).sum()
    }

    /// The current proposer.
    pub fn proposer(&self) -> &Validator {
        &self.validators[self.proposer_index as usize]
    }

    /// Slot index of the current proposer.
    pub fn proposer_index(&self) -> usize {
        self.proposer_index as usize
    }

    /// Look up a validator by address.
    pub fn by_address(&self, address: &[u8]) -> Option<(usize, &Validator)> {
        self.validators
            .iter()
            .enumerate()
            .find(|(_, v)| v.address == address)
    }

    /// Look up a validator by slot index.
    pub fn by_index(&self, index: usize) -> Option<&Validator> {
        self.validators.get(index)
    }

    /// Iterate validators in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Validator)> {
        self.validators.iter().enumerate()
    }

    /// Minimum voting power for a super-majority: strictly more than 2/3.
    pub fn quorum_threshold(&self) -> u64 {
        self.total_voting_power() * 2 / 3 + 1
    }

    /// Whether `voting_power` meets the super-majority threshold.
    pub fn has_quorum(&self, voting_power: u64) -> bool {
        voting_power >= self.quorum_threshold()
    }
}

/// The slice of host-chain state this subsystem reads.
#[derive(Debug, Clone)]
pub struct ChainState {
    pub validators: ValidatorSet,
}

/// Error from the host state store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("host state store unavailable: {0}")]
    Unavailable(String),
}

/// Read-only view of the host chain's state store.
pub trait StateReader: Send + Sync {
    /// Load the current chain state, including the validator roster.
    fn load_state(&self) -> Result<ChainState, StateError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    fn make_validator(seed: u8, power: u64) -> Validator {
        let pair = KeyPair::from_seed([seed; 32]);
        Validator {
            address: pair.public_key().address(),
            pub_key: pair.public_key(),
            voting_power: power,
        }
    }

    fn make_set(powers: &[u64]) -> ValidatorSet {
        let validators = powers
            .iter()
            .enumerate()
            .map(|(i, &p)| make_validator(i as u8 + 1, p))
            .collect();
        ValidatorSet::new(validators, 0)
    }

    #[test]
    fn test_lookup_by_address_and_index() {
        let set = make_set(&[1, 2, 3]);
        let second = set.by_index(1).unwrap().clone();
        let (index, found) = set.by_address(&second.address).unwrap();
        assert_eq!(index, 1);
        assert_eq!(found, &second);
        assert!(set.by_address(b"not-an-address").is_none());
        assert!(set.by_index(3).is_none());
    }

    #[test]
    fn test_quorum_threshold_four_equal_validators() {
        let set = make_set(&[1, 1, 1, 1]);
        assert_eq!(set.total_voting_power(), 4);
        assert_eq!(set.quorum_threshold(), 3);
        assert!(!set.has_quorum(2));
        assert!(set.has_quorum(3));
    }

    #[test]
    fn test_quorum_threshold_three_validators_needs_all() {
        let set = make_set(&[1, 1, 1]);
        assert_eq!(set.quorum_threshold(), 3);
        assert!(!set.has_quorum(2));
        assert!(set.has_quorum(3));
    }

    #[test]
    fn test_quorum_threshold_single_validator() {
        let set = make_set(&[1]);
        assert_eq!(set.quorum_threshold(), 1);
        assert!(set.has_quorum(1));
    }

    #[test]
    fn test_proposer() {
        let validators = vec![make_validator(1, 5), make_validator(2, 7)];
        let set = ValidatorSet::new(validators.clone(), 1);
        assert_eq!(set.proposer(), &validators[1]);
        assert_eq!(set.proposer_index(), 1);
    }
}
