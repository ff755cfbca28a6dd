//! Reactor tunables and the P2P channel layout.

use std::time::Duration;

/// Host P2P channel identifier.
pub type ChannelId = u8;

/// Channel carrying in-progress vote sets.
pub const VOTE_SET_CHANNEL: ChannelId = 0x50;

/// Channel carrying finalized (super-majority) vote sets.
pub const VOTE_SET_MAJ23_CHANNEL: ChannelId = 0x51;

/// Maximum wire message size: 1 MiB.
pub const MAX_MSG_SIZE: usize = 1024 * 1024;

/// Maximum execution-context size: 1 KiB.
pub const MAX_CONTEXT_SIZE: usize = 1024;

/// Period of the proposer tick.
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(120);

/// How long a vote set may gather votes before it times out. Kept below the
/// progress interval so one round always ends before the next tick.
pub const DEFAULT_VALIDITY_PERIOD: Duration = Duration::from_secs(119);

/// Reactor configuration.
#[derive(Debug, Clone)]
pub struct ReactorConfig {
    pub progress_interval: Duration,
    pub validity_period: Duration,
    pub max_context_size: usize,
    pub max_msg_size: usize,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            progress_interval: PROGRESS_INTERVAL,
            validity_period: DEFAULT_VALIDITY_PERIOD,
            max_context_size: MAX_CONTEXT_SIZE,
            max_msg_size: MAX_MSG_SIZE,
        }
    }
}

/// Descriptor the host P2P layer uses to provision a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDescriptor {
    pub id: ChannelId,
    pub priority: u32,
    pub send_queue_capacity: usize,
    pub recv_message_capacity: usize,
}

/// The reactor's channels. Priorities are deliberately low so this traffic
/// cannot starve the host chain's own consensus.
pub fn channel_descriptors() -> Vec<ChannelDescriptor> {
    vec![
        ChannelDescriptor {
            id: VOTE_SET_CHANNEL,
            priority: 25,
            send_queue_capacity: 100,
            recv_message_capacity: MAX_MSG_SIZE,
        },
        ChannelDescriptor {
            id: VOTE_SET_MAJ23_CHANNEL,
            priority: 26,
            send_queue_capacity: 100,
            recv_message_capacity: MAX_MSG_SIZE,
        },
    ]
}
