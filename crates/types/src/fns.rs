//! The application seams: oracle functions and their registry.
//!
//! An oracle function ("Fn") is a deterministic application routine: given a
//! context snapshot it always produces the same message. The reactor never
//! inspects messages or oracle signatures; both are opaque bytes.

use std::sync::Arc;
use thiserror::Error;

/// Error returned by an application Fn callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct FnError(pub String);

/// A deterministic application routine registered with the reactor.
///
/// Callbacks receive borrowed buffers; implementations must clone anything
/// they keep past the call.
pub trait OracleFn: Send + Sync {
    /// Produce the context snapshot defining this round's inputs.
    /// Must be at most the reactor's configured context limit (1 KiB).
    fn prepare_context(&self) -> Result<Vec<u8>, FnError>;

    /// Execute over `ctx`, returning `(message, oracle_signature)`.
    /// Deterministic: the same `ctx` must always yield the same message.
    fn get_message_and_signature(&self, ctx: &[u8]) -> Result<(Vec<u8>, Vec<u8>), FnError>;

    /// Cache the `hash -> message` binding so the message can be replayed
    /// once the aggregate is submitted.
    fn map_message(&self, ctx: &[u8], hash: &[u8], message: &[u8]) -> Result<(), FnError>;

    /// Deliver the finalized aggregate. Slot `i` is `None` for validators
    /// that did not contribute. Invoked exactly once per finalized round.
    fn submit_multi_signed_message(
        &self,
        ctx: &[u8],
        hash: &[u8],
        oracle_signatures: &[Option<Vec<u8>>],
    );
}

/// Registry of oracle functions, keyed by Fn id.
///
/// The set of registered Fns is fixed for the lifetime of the reactor.
pub trait FnRegistry: Send + Sync {
    /// All registered Fn ids, in no particular order.
    fn get_all(&self) -> Vec<String>;

    /// Look up an Fn by id.
    fn get(&self, fn_id: &str) -> Option<Arc<dyn OracleFn>>;
}
