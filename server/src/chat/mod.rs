pub mod channels;
pub mod handlers;

pub use channels::{ChannelBroadcaster, ChannelKind, ChannelSummary, DEFAULT_MAX_CHANNEL_HISTORY};
