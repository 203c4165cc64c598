//! Frame encoders turning raw PCM into voice packet payloads.

use crate::{constants::*, driver::TAG_SIZE};
use audiopus::{
    coder::Encoder as AudiopusEncoder,
    Application as CodingMode,
    Bitrate,
    Channels,
    Error as OpusError,
};
use byteorder::{ByteOrder, LittleEndian};
use std::{error::Error as StdError, fmt};

/// Largest encoded frame which still fits in a voice packet.
pub const MAX_ENCODED_FRAME: usize = VOICE_PACKET_MAX - RTP_HEADER_LEN - TAG_SIZE;

/// Compresses fixed-length frames of interleaved, little-endian `i16` PCM.
pub trait FrameEncoder: Send {
    /// Samples per channel in each frame.
    fn frame_size(&self) -> usize {
        MONO_FRAME_SIZE
    }

    /// Number of interleaved channels.
    fn channels(&self) -> usize {
        CHANNEL_COUNT
    }

    /// Bytes of PCM consumed per frame.
    fn frame_byte_length(&self) -> usize {
        self.frame_size() * self.channels() * std::mem::size_of::<i16>()
    }

    /// Encodes exactly one frame of PCM.
    fn encode(&mut self, pcm: &[u8]) -> Result<Vec<u8>, CodecError>;
}

/// 48kHz stereo Opus encoder, tuned for music.
pub struct OpusEncoder {
    encoder: AudiopusEncoder,
    samples: Vec<i16>,
}

impl OpusEncoder {
    /// Creates an encoder targeting `bitrate`.
    pub fn new(bitrate: Bitrate) -> Result<Self, CodecError> {
        let mut encoder = AudiopusEncoder::new(SAMPLE_RATE, Channels::Stereo, CodingMode::Audio)?;
        encoder.set_bitrate(bitrate)?;

        Ok(Self {
            encoder,
            samples: vec![0; STEREO_FRAME_SIZE],
        })
    }

    /// Changes the target bitrate of subsequent frames.
    pub fn set_bitrate(&mut self, bitrate: Bitrate) -> Result<(), CodecError> {
        self.encoder.set_bitrate(bitrate).map_err(Into::into)
    }
}

impl FrameEncoder for OpusEncoder {
    fn encode(&mut self, pcm: &[u8]) -> Result<Vec<u8>, CodecError> {
        let expected = self.frame_byte_length();
        if pcm.len() != expected {
            return Err(CodecError::FrameLength {
                expected,
                actual: pcm.len(),
            });
        }

        LittleEndian::read_i16_into(pcm, &mut self.samples);

        let mut out = vec![0u8; MAX_ENCODED_FRAME];
        let len = self.encoder.encode(&self.samples, &mut out)?;
        out.truncate(len);

        Ok(out)
    }
}

impl fmt::Debug for OpusEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpusEncoder").finish_non_exhaustive()
    }
}

/// Errors raised while encoding audio frames.
#[derive(Debug)]
#[non_exhaustive]
pub enum CodecError {
    /// The frame handed to the encoder had the wrong size.
    FrameLength {
        /// Bytes per frame the encoder requires.
        expected: usize,
        /// Bytes actually supplied.
        actual: usize,
    },
    /// libopus failed to create an encoder or encode a frame.
    Opus(OpusError),
}

impl From<OpusError> for CodecError {
    fn from(e: OpusError) -> Self {
        CodecError::Opus(e)
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to encode audio frame: ")?;
        match self {
            CodecError::FrameLength { expected, actual } =>
                write!(f, "expected {expected}B of PCM, got {actual}B"),
            CodecError::Opus(e) => write!(f, "{e}"),
        }
    }
}

impl StdError for CodecError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            CodecError::Opus(e) => Some(e),
            CodecError::FrameLength { .. } => None,
        }
    }
}
