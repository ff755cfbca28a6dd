//! Reactor state persistence.
//!
//! The reactor is the single writer of one well-known key in a key-value
//! store supplied by the host. A RocksDB-backed store is provided for
//! production and an in-memory store for tests and embedding.

use oraclesig_types::{CodecError, ReactorState};
use rocksdb::{Options, DB};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

/// The single key holding the encoded [`ReactorState`].
pub const REACTOR_STATE_KEY: &[u8] = b"reactor:state";

/// Error type for storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying store failure.
    #[error("database error: {0}")]
    Database(String),

    /// The persisted record exists but does not decode.
    #[error("corrupt reactor state: {0}")]
    Corrupt(#[from] CodecError),
}

/// Minimal key-value seam used for reactor persistence.
pub trait ReactorDb: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Atomic put: a concurrent reader sees either the old or the new value.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;
}

/// Persist `state` under the well-known key.
pub fn save_reactor_state(db: &dyn ReactorDb, state: &ReactorState) -> Result<(), StorageError> {
    let encoded = state.encode()?;
    db.put(REACTOR_STATE_KEY, &encoded)
}

/// Load the persisted state.
///
/// A missing record yields an empty state (fresh node); a record that fails
/// to decode is an error, fatal to reactor start.
pub fn load_reactor_state(db: &dyn ReactorDb) -> Result<ReactorState, StorageError> {
    match db.get(REACTOR_STATE_KEY)? {
        Some(bytes) => Ok(ReactorState::decode(&bytes)?),
        None => Ok(ReactorState::default()),
    }
}

/// RocksDB-backed reactor store.
pub struct RocksReactorDb {
    db: DB,
}

impl RocksReactorDb {
    /// Open or create a database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path).map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(Self { db })
    }
}

impl ReactorDb for RocksReactorDb {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.db
            .get(key)
            .map_err(|e| StorageError::Database(e.to_string()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.db
            .put(key, value)
            .map_err(|e| StorageError::Database(e.to_string()))
    }
}

/// In-memory reactor store for tests and embedding.
#[derive(Default)]
pub struct MemDb {
    entries: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemDb {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReactorDb for MemDb {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self
            .entries
            .lock()
            .expect("mem db lock poisoned")
            .get(key)
            .cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.entries
            .lock()
            .expect("mem db lock poisoned")
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oraclesig_types::{
        FnExecutionRequest, FnExecutionResponse, FnIndividualExecutionResponse, FnVotePayload,
        FnVoteSet, KeyPair, Validator, ValidatorSet,
    };
    use tempfile::TempDir;

    fn make_state() -> ReactorState {
        let pair = KeyPair::from_seed([5; 32]);
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
            FnExecutionRequest::new("price-feed"),
            FnExecutionResponse::from_individual(&individual, 0, 1),
        );
        let vote_set =
            FnVoteSet::new("test-chain", 0, vec![], payload, &pair, &snapshot).unwrap();

        let mut state = ReactorState::default();
        state
            .current_vote_sets
            .insert("price-feed".to_string(), vote_set);
        state
    }

    #[test]
    fn test_fresh_db_loads_empty_state() {
        let db = MemDb::new();
        assert_eq!(load_reactor_state(&db).unwrap(), ReactorState::default());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let db = MemDb::new();
        let state = make_state();
        save_reactor_state(&db, &state).unwrap();
        assert_eq!(load_reactor_state(&db).unwrap(), state);
    }

    #[test]
    fn test_corrupt_record_fails_loading() {
        let db = MemDb::new();
        db.put(REACTOR_STATE_KEY, b"not a reactor state").unwrap();
        assert!(matches!(
            load_reactor_state(&db).unwrap_err(),
            StorageError::Corrupt(_)
        ));
    }

    #[test]
    fn test_rocksdb_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let state = make_state();

        {
            let db = RocksReactorDb::open(temp_dir.path()).unwrap();
            save_reactor_state(&db, &state).unwrap();
        }

        let db = RocksReactorDb::open(temp_dir.path()).unwrap();
        assert_eq!(load_reactor_state(&db).unwrap(), state);
    }
}
