//! Cryptographic primitives: keys, signatures, and the signer seam.
//!
//! Consensus signatures are Ed25519. The reactor itself treats oracle
//! signatures as opaque bytes; only validator signatures are verified here.

use ed25519_dalek::{Signer as _, SigningKey, VerifyingKey};
use sbor::prelude::BasicSbor;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Length of a validator address in bytes.
pub const ADDRESS_LEN: usize = 20;

/// Error from a signing backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("signer error: {0}")]
pub struct SignError(pub String);

/// An Ed25519 public key.
///
/// Stored as raw bytes so it can travel through the codec; parsing is
/// deferred to verification time, and a key that fails to parse simply
/// fails verification.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The validator address: the first 20 bytes of SHA-256 of the key.
    pub fn address(&self) -> Vec<u8> {
        let digest = Sha256::digest(&self.0);
        digest[..ADDRESS_LEN].to_vec()
    }

    /// Verify `signature` over `msg` under this key.
    pub fn verify_bytes(&self, msg: &[u8], signature: &Signature) -> bool {
        let Ok(key_bytes) = <[u8; 32]>::try_from(self.0.as_slice()) else {
            return false;
        };
        let Ok(key) = VerifyingKey::from_bytes(&key_bytes) else {
            return false;
        };
        let Ok(sig) = ed25519_dalek::Signature::from_slice(signature.as_bytes()) else {
            return false;
        };
        key.verify_strict(msg, &sig).is_ok()
    }
}

/// A validator signature over vote-set sign-bytes.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct Signature(Vec<u8>);

impl Signature {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// The local signing seam provided by the host.
pub trait Signer: Send + Sync {
    /// The public key matching this signer.
    fn pub_key(&self) -> PublicKey;

    /// Sign `msg` with the local key.
    fn sign(&self, msg: &[u8]) -> Result<Signature, SignError>;
}

/// An in-process Ed25519 keypair.
#[derive(Debug, Clone)]
pub struct KeyPair {
    signing: SigningKey,
}

impl KeyPair {
    /// Generate a fresh keypair from the system RNG.
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut rand::rngs::OsRng),
        }
    }

    /// Deterministic keypair from a 32-byte seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(&seed),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing.verifying_key().to_bytes().to_vec())
    }
}

impl Signer for KeyPair {
    fn pub_key(&self) -> PublicKey {
        self.public_key()
    }

    fn sign(&self, msg: &[u8]) -> Result<Signature, SignError> {
        Ok(Signature(self.signing.sign(msg).to_bytes().to_vec()))
    }
}
