//! Bodies of individual voice gateway messages.

use crate::id::{GuildId, UserId};
use serde::{de::Error as DeError, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::{fmt, net::IpAddr};

/// Opens a voice session on a freshly connected signalling socket.
#[derive(Clone, Deserialize, Eq, PartialEq, Serialize)]
pub struct Identify {
    /// Guild containing the target voice channel.
    pub server_id: GuildId,
    /// Session ID handed out by the main gateway.
    pub session_id: String,
    /// Voice token handed out by the main gateway.
    pub token: String,
    /// ID of the connecting user.
    pub user_id: UserId,
}

impl fmt::Debug for Identify {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identify")
            .field("server_id", &self.server_id)
            .field("session_id", &self.session_id)
            .field("token", &"<secret>")
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Declares the transport, externally visible address and encryption mode
/// this client will use for voice data.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SelectProtocol {
    /// Transport protocol; always `"udp"`.
    pub protocol: String,
    /// Address and mode details.
    pub data: ProtocolData,
}

/// Externally visible UDP address and chosen encryption mode.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ProtocolData {
    /// Our IP as seen by the voice server.
    pub address: IpAddr,
    /// Negotiated encryption mode.
    pub mode: String,
    /// Our UDP port as seen by the voice server.
    pub port: u16,
}

/// Server acceptance of an [`Identify`], describing the UDP media endpoint.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Ready {
    /// Source identifier assigned to this client's stream.
    pub ssrc: u32,
    /// UDP port of the voice server.
    pub port: u16,
    /// IP of the voice server, when given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// Encryption modes offered by the server.
    #[serde(default)]
    pub modes: Vec<String>,
    /// Interval (ms) between heartbeats, when not delivered via [`Hello`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval: Option<f64>,
}

/// Keepalive message, carrying an opaque nonce.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Heartbeat {
    /// Nonce to be echoed in the matching [`HeartbeatAck`].
    pub nonce: u64,
}

/// Acknowledgement of a [`Heartbeat`].
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct HeartbeatAck {
    /// Nonce of the acknowledged heartbeat.
    pub nonce: u64,
}

/// Symmetric key material for the negotiated encryption mode.
#[derive(Clone, Deserialize, Eq, PartialEq, Serialize)]
pub struct SessionDescription {
    /// Encryption mode confirmed by the server.
    pub mode: String,
    /// Secret key for voice packet encryption.
    pub secret_key: Vec<u8>,
}

impl fmt::Debug for SessionDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionDescription")
            .field("mode", &self.mode)
            .field("secret_key", &"<secret>")
            .finish()
    }
}

/// Speaking indicator for a single SSRC.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Speaking {
    /// Whether the sender is currently transmitting audio.
    #[serde(deserialize_with = "speaking_flag", serialize_with = "speaking_bits")]
    pub speaking: bool,
    /// Speaking delay, always `0` for bots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u32>,
    /// SSRC of the stream whose state has changed.
    pub ssrc: u32,
    /// User owning `ssrc`, present on messages from the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

/// First message sent by the server, carrying the heartbeat interval.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct Hello {
    /// Interval (ms) between heartbeats.
    pub heartbeat_interval: f64,
}

/// Notice that another user has left the voice channel.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ClientDisconnect {
    /// ID of the departed user.
    pub user_id: UserId,
}

// Servers have sent both `true`/`false` and the bitflag form (1 = microphone).
fn speaking_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Bool(b) => Ok(b),
        Value::Number(n) => n
            .as_u64()
            .map(|flags| flags != 0)
            .ok_or_else(|| D::Error::custom("speaking flags must be unsigned")),
        other => Err(D::Error::custom(format!(
            "expected bool or integer speaking state, got {other}"
        ))),
    }
}

// Sent in bitflag form: microphone (1) or nothing (0).
fn speaking_bits<S: Serializer>(speaking: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(u8::from(*speaking))
}
