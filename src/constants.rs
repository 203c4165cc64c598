//! Constants affecting session handling, packet framing and audio pacing.

use audiopus::{Bitrate, SampleRate};
use std::time::Duration;

/// The voice gateway version used by the library.
pub const VOICE_GATEWAY_VERSION: u8 = 4;

/// Sample rate of audio to be sent to Discord.
pub const SAMPLE_RATE: SampleRate = SampleRate::Hz48000;

/// Sample rate of audio to be sent to Discord.
pub const SAMPLE_RATE_RAW: usize = 48_000;

/// Number of audio frames/packets to be sent per second.
pub const AUDIO_FRAME_RATE: usize = 50;

/// Length of time between any two audio frames.
pub const TIMESTEP_LENGTH: Duration = Duration::from_millis(1000 / AUDIO_FRAME_RATE as u64);

/// Default bitrate for audio.
pub const DEFAULT_BITRATE: Bitrate = Bitrate::BitsPerSecond(128_000);

/// Number of audio channels in any sent PCM stream.
pub const CHANNEL_COUNT: usize = 2;

/// Number of samples in one complete frame of audio per channel.
///
/// This is equally the number of stereo (joint) samples in an audio frame.
pub const MONO_FRAME_SIZE: usize = SAMPLE_RATE_RAW / AUDIO_FRAME_RATE;

/// Number of individual samples in one complete frame of stereo audio.
pub const STEREO_FRAME_SIZE: usize = CHANNEL_COUNT * MONO_FRAME_SIZE;

/// Number of bytes in one complete frame of raw `i16`-encoded stereo audio.
pub const STEREO_FRAME_BYTE_SIZE: usize = STEREO_FRAME_SIZE * std::mem::size_of::<i16>();

/// Maximum packet size for a voice packet.
///
/// Set a safe amount below the Ethernet MTU to avoid fragmentation/rejection.
pub const VOICE_PACKET_MAX: usize = 1460;

/// Size of both the IP discovery request and its response.
pub const DISCOVERY_PACKET_LEN: usize = 70;

/// Length of the fixed RTP header preceding every voice packet.
pub const RTP_HEADER_LEN: usize = 12;

/// First RTP header byte: version 2, no padding, extension or CSRCs.
pub const RTP_VERSION_BYTE: u8 = 0x80;

/// Second RTP header byte: payload type 120 (dynamic), marker unset.
pub const RTP_PROFILE_TYPE: u8 = 0x78;

/// Time allowed for Discord to propagate a freshly announced SSRC after
/// toggling the speaking state during the handshake.
pub const SPEAKING_SETTLE_DELAY: Duration = Duration::from_millis(250);

/// Default time to wait for a reply to an IP discovery request.
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time to wait for a full voice connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Size of the buffer used to drain received UDP datagrams.
pub(crate) const UDP_RECV_BUFFER: usize = 4096;
