//! Message digest helper.

use sha2::{Digest, Sha512};

/// SHA-512 digest of an Fn-produced message. This is the hash all
/// validators agree on inside the aggregate response.
pub fn message_hash(message: &[u8]) -> Vec<u8> {
    Sha512::digest(message).to_vec()
}
