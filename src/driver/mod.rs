//! Runner for a voice session.
//!
//! Each session is split into cooperating tasks:
//!  * a session task, which owns the handshake and session secrets,
//!  * a websocket task, which reads and writes the voice gateway and heartbeats,
//!  * a UDP receive task, which drains whatever the voice server sends us.
//!
//! Outbound audio bypasses all of these: a [`Transmitter`] writes straight to
//! the session's [`UdpTransport`] once the handshake has keyed it.

pub(crate) mod connection;
mod crypto;
pub(crate) mod tasks;
mod udp;

pub use crypto::CryptoMode;
pub(crate) use crypto::TAG_SIZE;
pub use udp::UdpTransport;

#[cfg(test)]
pub(crate) use crypto::test_util as crypto_test_util;
#[cfg(test)]
pub(crate) use udp::test_util as udp_test_util;

use crate::player::FrameSink;
use async_trait::async_trait;
use connection::error::{Error, Result};
use flume::Sender;
use std::sync::Arc;
use tasks::message::CoreMessage;
use tokio::sync::Mutex;

/// Progress of a voice session.
///
/// States only ever move forward in declaration order during a handshake,
/// and return to [`Disconnected`] on teardown. Losing the voice gateway after
/// [`Connected`] leaves the state untouched.
///
/// [`Disconnected`]: VoiceState::Disconnected
/// [`Connected`]: VoiceState::Connected
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum VoiceState {
    /// No session is active.
    #[default]
    Disconnected,
    /// A join request was sent; waiting on the session and server assignments.
    AwaitingEndpoint,
    /// The voice gateway is being dialled and identified with.
    Authenticating,
    /// The voice server accepted us. Covers UDP discovery, protocol selection
    /// and waiting on key material.
    Connecting,
    /// Fully established: audio may be sent.
    Connected,
    /// Reserved. Sessions are never placed in this state.
    VoiceConnecting,
    /// Reserved. Sessions are never placed in this state.
    VoiceConnected,
}

impl VoiceState {
    /// Whether audio may be sent in this state.
    #[must_use]
    pub fn is_connected(self) -> bool {
        self == VoiceState::Connected
    }
}

/// Snapshot of a session shared with its [`Call`](crate::Call).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct Status {
    pub(crate) state: VoiceState,
    pub(crate) ssrc: Option<u32>,
}

/// Shared slot holding a session's UDP transport, once discovered.
pub(crate) type TransportSlot = Arc<Mutex<Option<UdpTransport>>>;

/// Handle for sending audio over a connected voice session.
///
/// Cloning is cheap. A transmitter stays valid until its session is torn
/// down, after which every send fails with [`Error::NotConnected`].
#[derive(Clone, Debug)]
pub struct Transmitter {
    core: Sender<CoreMessage>,
    transport: TransportSlot,
}

impl Transmitter {
    pub(crate) fn new(core: Sender<CoreMessage>, transport: TransportSlot) -> Self {
        Self { core, transport }
    }

    /// Sets whether we are transmitting audio, as seen by other call members.
    pub fn set_speaking(&self, speaking: bool) {
        drop(self.core.send(CoreMessage::Speaking(speaking)));
    }

    /// Encrypts and sends one encoded frame, then advances the RTP counters
    /// by `frame_size` samples.
    pub async fn send_frame(&self, payload: &[u8], frame_size: u32) -> Result<()> {
        let mut slot = self.transport.lock().await;
        let transport = slot.as_mut().ok_or(Error::NotConnected)?;

        transport.send_encrypted(payload).await?;
        transport.advance(frame_size);

        Ok(())
    }
}

#[async_trait]
impl FrameSink for Transmitter {
    async fn speaking(&mut self, speaking: bool) {
        self.set_speaking(speaking);
    }

    async fn send_frame(&mut self, payload: &[u8], frame_size: u32) -> Result<()> {
        Transmitter::send_frame(self, payload, frame_size).await
    }
}
