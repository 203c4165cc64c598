#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
//! Voicelink is an async voice transport for Discord, written in Rust.
//!
//! The library covers everything between "please join this channel" and
//! encrypted audio on the wire:
//!  * a [`Call`] which asks your gateway connection to join a voice channel,
//!  then consumes the resulting [`GatewayEvent`]s to drive the voice
//!  handshake (identify, UDP IP discovery, protocol selection and keying),
//!  * a [`UdpTransport`] which frames audio as RTP and seals it with
//!  `xsalsa20_poly1305`,
//!  * and a [`Player`] which paces 20ms frames of PCM from any [`Input`]
//!  (including `ffmpeg`) through an Opus encoder onto a connected call.
//!
//! Voicelink does not own a gateway connection. Any client able to send
//! opcode 4 voice state updates (see [`VoiceUpdate`]) and to forward
//! `VOICE_STATE_UPDATE`/`VOICE_SERVER_UPDATE` dispatches can drive a [`Call`].
//!
//! ```no_run
//! # use voicelink::{
//! #     constants::CONNECT_TIMEOUT,
//! #     events::GatewayEvent,
//! #     id::{ChannelId, GuildId, UserId},
//! #     input,
//! #     shards::VoiceStateRequest,
//! #     Call,
//! #     Player,
//! # };
//! # use std::sync::Arc;
//! # async fn doc(
//! #     requests: flume::Sender<VoiceStateRequest>,
//! #     events: flume::Receiver<GatewayEvent>,
//! #     (guild, channel, user): (GuildId, ChannelId, UserId),
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let mut call = Call::new(guild, channel, user, Arc::new(requests), events);
//! call.connect(CONNECT_TIMEOUT).await?;
//!
//! if let Some(tx) = call.transmitter() {
//!     let player = Player::opus(input::ffmpeg("song.mp3")?, tx, call.config())?;
//!     player.start().wait().await?;
//! }
//!
//! call.disconnect().await?;
//! # Ok(())
//! # }
//! ```
//!
//! [`UdpTransport`]: driver::UdpTransport
//! [`GatewayEvent`]: events::GatewayEvent
//! [`Input`]: input::Input
//! [`VoiceUpdate`]: shards::VoiceUpdate

#![warn(clippy::pedantic)]
#![allow(
    // Allowed as they are too pedantic
    clippy::module_name_repetitions,
    clippy::wildcard_imports,
    clippy::too_many_lines,
    clippy::cast_lossless,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc,
)]

pub mod codec;
mod config;
pub mod constants;
pub mod driver;
pub mod error;
pub mod events;
mod handler;
pub mod id;
pub(crate) mod info;
pub mod input;
pub mod model;
pub mod packet;
pub mod player;
pub mod shards;
pub mod ws;

pub use crate::{
    config::Config,
    driver::{CryptoMode, Transmitter, VoiceState},
    error::{JoinError, JoinResult},
    handler::Call,
    info::ConnectionInfo,
    player::{Player, PlayerHandle},
};
