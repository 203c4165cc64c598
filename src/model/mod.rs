//! Messages exchanged with Discord's voice signalling gateway.
//!
//! Every message is an `{"op": <opcode>, "d": <body>}` record. Known opcodes
//! map onto [`Event`] variants; anything else is preserved as
//! [`Event::Unknown`] so that receivers can skip it.

pub mod payload;

use self::payload::*;
use serde::{
    de::{DeserializeOwned, Error as DeError},
    ser::SerializeStruct,
    Deserialize,
    Deserializer,
    Serialize,
    Serializer,
};
use serde_json::Value;

/// Voice gateway opcodes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum OpCode {
    /// Client: begin a voice session.
    Identify = 0,
    /// Client: choose transport and encryption.
    SelectProtocol = 1,
    /// Server: session accepted, UDP details follow.
    Ready = 2,
    /// Client: keepalive.
    Heartbeat = 3,
    /// Server: key material.
    SessionDescription = 4,
    /// Both: speaking indicator.
    Speaking = 5,
    /// Server: keepalive acknowledged.
    HeartbeatAck = 6,
    /// Client: resume a dropped session.
    Resume = 7,
    /// Server: heartbeat interval.
    Hello = 8,
    /// Server: resume accepted.
    Resumed = 9,
    /// Server: another user left the call.
    ClientDisconnect = 13,
}

impl OpCode {
    /// Maps a raw opcode onto a known value.
    #[must_use]
    pub fn from_u8(op: u8) -> Option<Self> {
        use OpCode::*;
        Some(match op {
            0 => Identify,
            1 => SelectProtocol,
            2 => Ready,
            3 => Heartbeat,
            4 => SessionDescription,
            5 => Speaking,
            6 => HeartbeatAck,
            7 => Resume,
            8 => Hello,
            9 => Resumed,
            13 => ClientDisconnect,
            _ => return None,
        })
    }
}

/// A single voice gateway message.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Event {
    /// See [`Identify`].
    Identify(Identify),
    /// See [`SelectProtocol`].
    SelectProtocol(SelectProtocol),
    /// See [`Ready`].
    Ready(Ready),
    /// See [`Heartbeat`].
    Heartbeat(Heartbeat),
    /// See [`SessionDescription`].
    SessionDescription(SessionDescription),
    /// See [`Speaking`].
    Speaking(Speaking),
    /// See [`HeartbeatAck`].
    HeartbeatAck(HeartbeatAck),
    /// See [`Hello`].
    Hello(Hello),
    /// Acknowledgement of a session resume.
    Resumed,
    /// See [`ClientDisconnect`].
    ClientDisconnect(ClientDisconnect),
    /// A message whose opcode is unknown or unsupported by this library.
    Unknown(u8),
}

impl Event {
    /// Returns the raw opcode of this message.
    #[must_use]
    pub fn op(&self) -> u8 {
        use Event::*;
        let op = match self {
            Identify(_) => OpCode::Identify,
            SelectProtocol(_) => OpCode::SelectProtocol,
            Ready(_) => OpCode::Ready,
            Heartbeat(_) => OpCode::Heartbeat,
            SessionDescription(_) => OpCode::SessionDescription,
            Speaking(_) => OpCode::Speaking,
            HeartbeatAck(_) => OpCode::HeartbeatAck,
            Hello(_) => OpCode::Hello,
            Resumed => OpCode::Resumed,
            ClientDisconnect(_) => OpCode::ClientDisconnect,
            Unknown(op) => return *op,
        };

        op as u8
    }
}

macro_rules! impl_from_payload {
    ($($Payload:ident),*) => {
        $(
            impl From<$Payload> for Event {
                fn from(val: $Payload) -> Self {
                    Event::$Payload(val)
                }
            }
        )*
    };
}

impl_from_payload!(
    Identify,
    SelectProtocol,
    Ready,
    Heartbeat,
    SessionDescription,
    Speaking,
    HeartbeatAck,
    Hello,
    ClientDisconnect
);

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Event", 2)?;
        s.serialize_field("op", &self.op())?;

        use Event::*;
        match self {
            Identify(d) => s.serialize_field("d", d)?,
            SelectProtocol(d) => s.serialize_field("d", d)?,
            Ready(d) => s.serialize_field("d", d)?,
            Heartbeat(d) => s.serialize_field("d", d)?,
            SessionDescription(d) => s.serialize_field("d", d)?,
            Speaking(d) => s.serialize_field("d", d)?,
            HeartbeatAck(d) => s.serialize_field("d", d)?,
            Hello(d) => s.serialize_field("d", d)?,
            ClientDisconnect(d) => s.serialize_field("d", d)?,
            Resumed | Unknown(_) => s.serialize_field("d", &())?,
        }

        s.end()
    }
}

#[derive(Deserialize)]
struct RawEvent {
    op: u8,
    #[serde(default)]
    d: Value,
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let RawEvent { op, d } = RawEvent::deserialize(deserializer)?;

        Ok(match OpCode::from_u8(op) {
            Some(OpCode::Identify) => Event::Identify(body::<_, D::Error>(d)?),
            Some(OpCode::SelectProtocol) => Event::SelectProtocol(body::<_, D::Error>(d)?),
            Some(OpCode::Ready) => Event::Ready(body::<_, D::Error>(d)?),
            Some(OpCode::Heartbeat) => Event::Heartbeat(body::<_, D::Error>(d)?),
            Some(OpCode::SessionDescription) =>
                Event::SessionDescription(body::<_, D::Error>(d)?),
            Some(OpCode::Speaking) => Event::Speaking(body::<_, D::Error>(d)?),
            Some(OpCode::HeartbeatAck) => Event::HeartbeatAck(body::<_, D::Error>(d)?),
            Some(OpCode::Hello) => Event::Hello(body::<_, D::Error>(d)?),
            Some(OpCode::Resumed) => Event::Resumed,
            Some(OpCode::ClientDisconnect) => Event::ClientDisconnect(body::<_, D::Error>(d)?),
            Some(OpCode::Resume) | None => Event::Unknown(op),
        })
    }
}

fn body<T: DeserializeOwned, E: DeError>(d: Value) -> Result<T, E> {
    serde_json::from_value(d).map_err(E::custom)
}
