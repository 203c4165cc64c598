use crate::{
    driver::VoiceState,
    id::{ChannelId, GuildId, UserId},
};
use std::fmt;
use tracing::{debug, warn};

/// Handshake bookkeeping for a single voice session.
///
/// Gathers the two asynchronous gateway notifications (session assignment
/// and server assignment) in whichever order they arrive, and moves from
/// [`VoiceState::AwaitingEndpoint`] to [`VoiceState::Authenticating`] once
/// both are known.
#[derive(Clone)]
pub(crate) struct Handshake {
    state: VoiceState,
    channel_id: ChannelId,
    guild_id: GuildId,
    user_id: UserId,
    endpoint: Option<String>,
    session_id: Option<String>,
    token: Option<String>,
}

impl Handshake {
    pub(crate) fn new(guild_id: GuildId, channel_id: ChannelId, user_id: UserId) -> Self {
        Self {
            state: VoiceState::Disconnected,
            channel_id,
            guild_id,
            user_id,
            endpoint: None,
            session_id: None,
            token: None,
        }
    }

    pub(crate) fn state(&self) -> VoiceState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: VoiceState) {
        self.state = state;
    }

    pub(crate) fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Marks the join request as sent.
    pub(crate) fn begin(&mut self) {
        self.state = VoiceState::AwaitingEndpoint;
    }

    /// Records our session ID. The first one seen is kept.
    pub(crate) fn apply_state_update(
        &mut self,
        guild_id: GuildId,
        user_id: UserId,
        session_id: String,
    ) -> Option<ConnectionInfo> {
        if guild_id != self.guild_id || user_id != self.user_id {
            return None;
        }

        if self.session_id.is_some() {
            debug!("Session ID already recorded; ignoring voice state update.");
            return None;
        }

        self.session_id = Some(session_id);
        self.finalise()
    }

    /// Records the voice server's endpoint and token.
    ///
    /// Updates for other guilds or with an empty token are dropped, as is any
    /// update whose token differs from one we already hold.
    pub(crate) fn apply_server_update(
        &mut self,
        guild_id: GuildId,
        endpoint: &str,
        token: String,
    ) -> Option<ConnectionInfo> {
        if guild_id != self.guild_id || token.is_empty() {
            return None;
        }

        if matches!(&self.token, Some(t) if *t != token) {
            warn!("Ignoring voice server update carrying a different token.");
            return None;
        }

        self.endpoint = Some(strip_port(endpoint).to_string());
        self.token = Some(token);
        self.finalise()
    }

    fn finalise(&mut self) -> Option<ConnectionInfo> {
        if self.state != VoiceState::AwaitingEndpoint {
            return None;
        }

        match (&self.endpoint, &self.session_id, &self.token) {
            (Some(endpoint), Some(session_id), Some(token)) => {
                self.state = VoiceState::Authenticating;

                Some(ConnectionInfo {
                    channel_id: Some(self.channel_id),
                    endpoint: endpoint.clone(),
                    guild_id: self.guild_id,
                    session_id: session_id.clone(),
                    token: token.clone(),
                    user_id: self.user_id,
                })
            },
            _ => None,
        }
    }
}

impl fmt::Debug for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handshake")
            .field("state", &self.state)
            .field("channel_id", &self.channel_id)
            .field("guild_id", &self.guild_id)
            .field("user_id", &self.user_id)
            .field("endpoint", &self.endpoint)
            .field("session_id", &self.session_id)
            .field("token_is_some", &self.token.is_some())
            .finish()
    }
}

/// Parameters and information needed to start communicating with Discord's
/// voice servers.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct ConnectionInfo {
    /// ID of the voice channel being joined, if it is known.
    ///
    /// This is not needed to establish a connection, but can be useful
    /// for book-keeping.
    pub channel_id: Option<ChannelId>,
    /// Host of the voice websocket gateway server assigned to this call,
    /// without any port suffix.
    pub endpoint: String,
    /// ID of the target voice channel's parent guild.
    ///
    /// Bots cannot connect to a guildless (i.e., direct message) voice call.
    pub guild_id: GuildId,
    /// Unique string describing this session for validation/authentication purposes.
    pub session_id: String,
    /// Ephemeral secret used to validate the above session.
    pub token: String,
    /// UserID of this bot.
    pub user_id: UserId,
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("channel_id", &self.channel_id)
            .field("endpoint", &self.endpoint)
            .field("guild_id", &self.guild_id)
            .field("session_id", &self.session_id)
            .field("token", &"<secret>")
            .field("user_id", &self.user_id)
            .finish()
    }
}

fn strip_port(endpoint: &str) -> &str {
    endpoint.split(':').next().unwrap_or(endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guild() -> GuildId {
        GuildId::new(10).unwrap()
    }

    fn user() -> UserId {
        UserId::new(20).unwrap()
    }

    fn handshake() -> Handshake {
        let mut hs = Handshake::new(guild(), ChannelId::new(30).unwrap(), user());
        hs.begin();
        hs
    }

    #[test]
    fn order_of_notifications_does_not_matter() {
        let mut a = handshake();
        assert!(a.apply_state_update(guild(), user(), "s".into()).is_none());
        let info_a = a
            .apply_server_update(guild(), "voice.example:443", "t".into())
            .unwrap();

        let mut b = handshake();
        assert!(b
            .apply_server_update(guild(), "voice.example:443", "t".into())
            .is_none());
        let info_b = b.apply_state_update(guild(), user(), "s".into()).unwrap();

        assert_eq!(info_a, info_b);
        assert_eq!(a.state(), VoiceState::Authenticating);
        assert_eq!(b.state(), VoiceState::Authenticating);
        assert_eq!(info_a.endpoint, "voice.example");
    }

    #[test]
    fn foreign_and_empty_updates_are_ignored() {
        let mut hs = handshake();
        let other_guild = GuildId::new(11).unwrap();
        let other_user = UserId::new(21).unwrap();

        assert!(hs.apply_state_update(other_guild, user(), "x".into()).is_none());
        assert!(hs.apply_state_update(guild(), other_user, "x".into()).is_none());
        assert!(hs.apply_server_update(other_guild, "a", "t".into()).is_none());
        assert!(hs.apply_server_update(guild(), "a", String::new()).is_none());

        assert!(hs.session_id.is_none());
        assert!(hs.token.is_none());
        assert_eq!(hs.state(), VoiceState::AwaitingEndpoint);
    }

    #[test]
    fn stale_token_cannot_hijack_handshake() {
        let mut hs = handshake();
        hs.apply_server_update(guild(), "first.example", "t1".into());
        hs.apply_server_update(guild(), "second.example", "t2".into());

        assert_eq!(hs.token.as_deref(), Some("t1"));
        assert_eq!(hs.endpoint.as_deref(), Some("first.example"));

        let info = hs.apply_state_update(guild(), user(), "s".into()).unwrap();
        assert_eq!(info.token, "t1");
    }

    #[test]
    fn first_session_id_wins() {
        let mut hs = handshake();
        hs.apply_state_update(guild(), user(), "first".into());
        hs.apply_state_update(guild(), user(), "second".into());

        let info = hs.apply_server_update(guild(), "a", "t".into()).unwrap();
        assert_eq!(info.session_id, "first");
    }

    #[test]
    fn completes_only_once() {
        let mut hs = handshake();
        hs.apply_state_update(guild(), user(), "s".into());
        assert!(hs.apply_server_update(guild(), "a", "t".into()).is_some());
        assert!(hs.apply_server_update(guild(), "a", "t".into()).is_none());
    }

    #[test]
    fn debug_hides_token() {
        let mut hs = handshake();
        hs.apply_server_update(guild(), "a", "hunter2".into());
        assert!(!format!("{hs:?}").contains("hunter2"));
    }
}
