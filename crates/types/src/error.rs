//! Error types shared across the vote-set core.

use thiserror::Error;

/// Errors from the wire/persistence codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Frame is too short to carry a tag and length prefix.
    #[error("message too short")]
    TooShort,

    /// Tag byte does not name a registered type.
    #[error("unknown wire tag: {0:#04x}")]
    UnknownTag(u8),

    /// Frame carries a registered type other than the one requested.
    #[error("wire tag mismatch: expected {expected:#04x}, got {actual:#04x}")]
    TagMismatch { expected: u8, actual: u8 },

    /// Declared payload length does not match the frame.
    #[error("length prefix mismatch: declared {declared}, got {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// Underlying SBOR encode failure.
    #[error("encode error: {0}")]
    Encode(String),

    /// Underlying SBOR decode failure.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Errors from vote-set construction, validation, and mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoteSetError {
    #[error("invalid validator address for vote")]
    InvalidValidatorAddress,

    #[error("invalid validator signature")]
    InvalidSignature,

    #[error("vote is not present for validator")]
    VoteNotPresent,

    #[error("vote is already cast")]
    VoteAlreadyCast,

    #[error("oracle signature is already present for this slot")]
    ResponseSignatureAlreadyPresent,

    #[error("merging is not allowed, as votes have different payloads")]
    MergeDiffPayload,

    #[error("unknown Fn id: {0}")]
    InvalidFnId(String),

    #[error("execution context exceeds {max} bytes (got {actual})")]
    ContextTooLarge { max: usize, actual: usize },

    #[error("vote payload is invalid for the current validator set")]
    PayloadInvalid,

    #[error("chain id mismatch: expected {expected}, got {actual}")]
    ChainIdMismatch { expected: String, actual: String },

    #[error("vote set has expired")]
    Expired,

    #[error("roster length does not match validator set size")]
    RosterSizeMismatch,

    #[error("total voting power does not match contributing validators")]
    VotingPowerMismatch,

    #[error("individual execution response differs from the aggregate")]
    ExecutionMismatch,

    #[error("invalid validator index")]
    InvalidValidatorIndex,

    #[error("signing failed: {0}")]
    Signing(String),

    #[error(transparent)]
    Codec(#[from] CodecError),
}
