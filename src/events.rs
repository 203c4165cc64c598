//! Notifications from the main Discord gateway which drive a voice handshake.
//!
//! Whatever library owns the main gateway connection should forward its
//! `VOICE_STATE_UPDATE` and `VOICE_SERVER_UPDATE` dispatches into a
//! [`Call`]'s channel as [`GatewayEvent`]s, in the order they were received.
//!
//! [`Call`]: crate::Call

use crate::id::{ChannelId, GuildId, UserId};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// Gateway dispatches consumed by a voice session.
#[derive(Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum GatewayEvent {
    /// A user's voice state changed; for our own user, this carries the
    /// session ID needed to identify with the voice server.
    VoiceStateUpdate {
        /// Guild the state belongs to.
        guild_id: GuildId,
        /// User whose state changed.
        user_id: UserId,
        /// Channel the user is now in, or `None` if they left.
        channel_id: Option<ChannelId>,
        /// Voice session ID.
        session_id: String,
    },
    /// A voice server was allocated to a guild.
    VoiceServerUpdate {
        /// Guild the server was allocated to.
        guild_id: GuildId,
        /// Voice server host, possibly with a port suffix.
        ///
        /// Discord sends `None` while a replacement server is being allocated.
        endpoint: Option<String>,
        /// Voice token.
        token: String,
    },
}

#[derive(Deserialize)]
struct RawStateUpdate {
    guild_id: GuildId,
    user_id: UserId,
    channel_id: Option<ChannelId>,
    session_id: String,
}

#[derive(Deserialize)]
struct RawServerUpdate {
    guild_id: GuildId,
    endpoint: Option<String>,
    token: String,
}

impl GatewayEvent {
    /// Builds an event from a main gateway dispatch, given its event name (`t`)
    /// and body (`d`).
    ///
    /// Returns `Ok(None)` for dispatches unrelated to voice.
    pub fn from_dispatch(kind: &str, data: Value) -> Result<Option<Self>, serde_json::Error> {
        Ok(match kind {
            "VOICE_STATE_UPDATE" => {
                let raw: RawStateUpdate = serde_json::from_value(data)?;
                Some(GatewayEvent::VoiceStateUpdate {
                    guild_id: raw.guild_id,
                    user_id: raw.user_id,
                    channel_id: raw.channel_id,
                    session_id: raw.session_id,
                })
            },
            "VOICE_SERVER_UPDATE" => {
                let raw: RawServerUpdate = serde_json::from_value(data)?;
                Some(GatewayEvent::VoiceServerUpdate {
                    guild_id: raw.guild_id,
                    endpoint: raw.endpoint,
                    token: raw.token,
                })
            },
            _ => None,
        })
    }

    /// Guild this event relates to.
    #[must_use]
    pub fn guild_id(&self) -> GuildId {
        match self {
            GatewayEvent::VoiceStateUpdate { guild_id, .. }
            | GatewayEvent::VoiceServerUpdate { guild_id, .. } => *guild_id,
        }
    }
}

impl fmt::Debug for GatewayEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayEvent::VoiceStateUpdate {
                guild_id,
                user_id,
                channel_id,
                session_id,
            } => f
                .debug_struct("VoiceStateUpdate")
                .field("guild_id", guild_id)
                .field("user_id", user_id)
                .field("channel_id", channel_id)
                .field("session_id", session_id)
                .finish(),
            GatewayEvent::VoiceServerUpdate {
                guild_id, endpoint, ..
            } => f
                .debug_struct("VoiceServerUpdate")
                .field("guild_id", guild_id)
                .field("endpoint", endpoint)
                .field("token", &"<secret>")
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_voice_dispatches() {
        let server = GatewayEvent::from_dispatch(
            "VOICE_SERVER_UPDATE",
            json!({"guild_id": "5", "endpoint": "eu.discord.media:443", "token": "abc"}),
        )
        .unwrap()
        .unwrap();
        assert_eq!(server.guild_id(), GuildId::new(5).unwrap());
        assert!(!format!("{server:?}").contains("abc"));

        let state = GatewayEvent::from_dispatch(
            "VOICE_STATE_UPDATE",
            json!({
                "guild_id": "5",
                "user_id": "6",
                "channel_id": null,
                "session_id": "s",
                "deaf": false,
            }),
        )
        .unwrap();
        assert!(matches!(
            state,
            Some(GatewayEvent::VoiceStateUpdate { channel_id: None, .. })
        ));
    }

    #[test]
    fn other_dispatches_are_skipped() {
        assert!(GatewayEvent::from_dispatch("MESSAGE_CREATE", json!({}))
            .unwrap()
            .is_none());
    }
}
