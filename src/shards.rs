//! Handlers for sending voice state updates over the main gateway connection.

use crate::{
    error::{JoinError, JoinResult},
    id::*,
};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Trait for a generic shard handle to send voice state updates to Discord.
///
/// This is the control channel a [`Call`] uses to join and leave voice
/// channels; any Discord library can be integrated by implementing it.
///
/// [`Call`]: crate::Call
#[async_trait]
pub trait VoiceUpdate {
    /// Send a voice update message to the inner shard handle.
    ///
    /// A `channel_id` of `None` leaves the current voice channel.
    async fn update_voice_state(
        &self,
        guild_id: GuildId,
        channel_id: Option<ChannelId>,
        self_deaf: bool,
        self_mute: bool,
    ) -> JoinResult<()>;
}

/// A voice state update, as queued by the [`VoiceUpdate`] impl on
/// [`flume::Sender`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct VoiceStateRequest {
    /// Guild whose voice state is changing.
    pub guild_id: GuildId,
    /// Channel to join, or `None` to leave.
    pub channel_id: Option<ChannelId>,
    /// Whether we should appear deafened.
    pub self_deaf: bool,
    /// Whether we should appear muted.
    pub self_mute: bool,
}

impl VoiceStateRequest {
    /// Renders this request as a main gateway `VOICE_STATE_UPDATE` (op 4) message.
    #[must_use]
    pub fn to_gateway_payload(&self) -> Value {
        json!({
            "op": 4,
            "d": {
                "channel_id": self.channel_id,
                "guild_id": self.guild_id,
                "self_deaf": self.self_deaf,
                "self_mute": self.self_mute,
            }
        })
    }
}

/// Forwards each update to whoever owns the receiving end, typically the
/// task driving the main gateway websocket.
#[async_trait]
impl VoiceUpdate for flume::Sender<VoiceStateRequest> {
    async fn update_voice_state(
        &self,
        guild_id: GuildId,
        channel_id: Option<ChannelId>,
        self_deaf: bool,
        self_mute: bool,
    ) -> JoinResult<()> {
        self.send_async(VoiceStateRequest {
            guild_id,
            channel_id,
            self_deaf,
            self_mute,
        })
        .await
        .map_err(|e| JoinError::Gateway(Box::new(e)))
    }
}
