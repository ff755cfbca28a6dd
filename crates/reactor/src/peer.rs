//! The peer seam to the host P2P layer.

use crate::config::ChannelId;
use bytes::Bytes;
use std::fmt;

/// Opaque peer identifier assigned by the host P2P layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A connected peer, as exposed by the host P2P layer.
///
/// `send` enqueues on the peer's channel queue and reports whether the
/// message was accepted; the transport itself is thread-safe per the host
/// contract.
#[async_trait::async_trait]
pub trait Peer: Send + Sync {
    fn id(&self) -> PeerId;

    async fn send(&self, channel: ChannelId, bytes: Bytes) -> bool;
}
