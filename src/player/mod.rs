//! Real-time playback of a PCM source over a voice session.
//!
//! A [`Player`] pulls one frame of PCM at a time from an [`Input`], encodes it,
//! and hands it to a [`FrameSink`] (usually a [`Transmitter`]). Frames are
//! scheduled against the instant playback began rather than the previous
//! frame, so slow sends never accumulate drift.
//!
//! [`Transmitter`]: crate::driver::Transmitter

use crate::{
    codec::{CodecError, FrameEncoder, OpusEncoder},
    constants::TIMESTEP_LENGTH,
    driver::connection::error::Error as ConnectionError,
    input::Input,
    Config,
};
use async_trait::async_trait;
use std::{
    error::Error as StdError,
    fmt,
    io::{Error as IoError, ErrorKind as IoErrorKind},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::{
    io::AsyncReadExt,
    select,
    spawn,
    sync::Notify,
    task::JoinHandle,
    time::{sleep_until, Duration, Instant},
};
use tracing::{debug, instrument, warn};

/// Destination for encoded audio frames.
#[async_trait]
pub trait FrameSink: Send {
    /// Announces whether audio is about to flow.
    async fn speaking(&mut self, speaking: bool);

    /// Sends one encoded frame, covering `frame_size` samples per channel.
    async fn send_frame(&mut self, payload: &[u8], frame_size: u32)
        -> Result<(), ConnectionError>;
}

/// How a playback run came to an end.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum PlaybackEnd {
    /// The source ran out of complete frames.
    Finished,
    /// [`PlayerHandle::stop`] was called.
    Stopped,
}

/// Summary of a completed playback run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Played {
    /// Number of frames handed to the sink.
    pub frames: u64,
    /// Why playback ended.
    pub end: PlaybackEnd,
}

#[derive(Debug, Default)]
struct Shared {
    stopped: AtomicBool,
    wake: Notify,
}

/// Paced playback of one audio source.
pub struct Player {
    input: Input,
    encoder: Box<dyn FrameEncoder>,
    sink: Box<dyn FrameSink>,
    shared: Arc<Shared>,
}

impl Player {
    /// Creates a player from its three parts.
    pub fn new(
        input: Input,
        encoder: impl FrameEncoder + 'static,
        sink: impl FrameSink + 'static,
    ) -> Self {
        Self {
            input,
            encoder: Box::new(encoder),
            sink: Box::new(sink),
            shared: Arc::default(),
        }
    }

    /// Creates a player encoding to Opus at the bitrate set in `config`.
    pub fn opus(
        input: Input,
        sink: impl FrameSink + 'static,
        config: &Config,
    ) -> Result<Self, CodecError> {
        Ok(Self::new(input, OpusEncoder::new(config.bitrate)?, sink))
    }

    /// Runs playback on a background task.
    #[must_use]
    pub fn start(self) -> PlayerHandle {
        let shared = self.shared.clone();
        let task = spawn(self.play());

        PlayerHandle { shared, task }
    }

    /// Runs playback to completion on the current task.
    #[instrument(skip(self))]
    pub async fn play(mut self) -> Result<Played, PlayError> {
        let frame_size = self.encoder.frame_size();
        let mut frame = vec![0u8; self.encoder.frame_byte_length()];
        let mut frames = 0;

        self.sink.speaking(true).await;

        let start = Instant::now();
        let mut offset = Duration::ZERO;

        let out = loop {
            if self.shared.stopped.load(Ordering::Acquire) {
                break Ok(PlaybackEnd::Stopped);
            }

            match self.input.read_exact(&mut frame).await {
                Ok(_) => {},
                Err(e) if e.kind() == IoErrorKind::UnexpectedEof =>
                    break Ok(PlaybackEnd::Finished),
                Err(e) => break Err(PlayError::Io(e)),
            }

            let packet = match self.encoder.encode(&frame) {
                Ok(packet) => packet,
                Err(e) => break Err(PlayError::Codec(e)),
            };

            if let Err(e) = self.sink.send_frame(&packet, frame_size as u32).await {
                break Err(PlayError::Transport(e));
            }
            frames += 1;

            offset += TIMESTEP_LENGTH;
            select! {
                () = sleep_until(start + offset) => {},
                () = self.shared.wake.notified() => {},
            }
        };

        self.sink.speaking(false).await;

        if let Err(e) = self.input.finish().await {
            warn!("Audio source did not exit cleanly: {}.", e);
        }

        match out {
            Ok(end) => {
                debug!("Playback ended ({:?}) after {} frames.", end, frames);
                Ok(Played { frames, end })
            },
            Err(e) => {
                warn!("Playback failed after {} frames: {}.", frames, e);
                Err(e)
            },
        }
    }
}

impl fmt::Debug for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Player")
            .field("input", &self.input)
            .field("stopped", &self.shared.stopped)
            .finish_non_exhaustive()
    }
}

/// Control over a player running in the background.
#[derive(Debug)]
pub struct PlayerHandle {
    shared: Arc<Shared>,
    task: JoinHandle<Result<Played, PlayError>>,
}

impl PlayerHandle {
    /// Asks playback to end before its next frame.
    ///
    /// A frame already being sent is allowed to complete.
    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::Release);
        self.shared.wake.notify_one();
    }

    /// Whether the playback task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for playback to end.
    pub async fn wait(self) -> Result<Played, PlayError> {
        self.task.await.map_err(|_| PlayError::Dropped)?
    }
}

/// Errors which end playback early.
#[derive(Debug)]
#[non_exhaustive]
pub enum PlayError {
    /// The playback task panicked or was cancelled.
    Dropped,
    /// Reading from the audio source failed.
    Io(IoError),
    /// A frame could not be encoded.
    Codec(CodecError),
    /// The voice session rejected a frame, usually because it was torn down.
    Transport(ConnectionError),
}

impl From<IoError> for PlayError {
    fn from(e: IoError) -> Self {
        PlayError::Io(e)
    }
}

impl From<CodecError> for PlayError {
    fn from(e: CodecError) -> Self {
        PlayError::Codec(e)
    }
}

impl From<ConnectionError> for PlayError {
    fn from(e: ConnectionError) -> Self {
        PlayError::Transport(e)
    }
}

impl fmt::Display for PlayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "playback failed: ")?;
        match self {
            PlayError::Dropped => write!(f, "player task ended unexpectedly"),
            PlayError::Io(e) => write!(f, "{e}"),
            PlayError::Codec(e) => write!(f, "{e}"),
            PlayError::Transport(e) => write!(f, "{e}"),
        }
    }
}

impl StdError for PlayError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            PlayError::Dropped => None,
            PlayError::Io(e) => Some(e),
            PlayError::Codec(e) => Some(e),
            PlayError::Transport(e) => Some(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{MONO_FRAME_SIZE, STEREO_FRAME_BYTE_SIZE};
    use std::sync::Mutex;
    use tokio::{process::Command, time::sleep};

    /// Keeps the first few bytes of each frame so tests can tell frames apart.
    struct Truncate;

    impl FrameEncoder for Truncate {
        fn encode(&mut self, pcm: &[u8]) -> Result<Vec<u8>, CodecError> {
            Ok(pcm[..4].to_vec())
        }
    }

    #[derive(Debug, PartialEq)]
    enum Seen {
        Speaking(bool),
        Frame(Duration, Vec<u8>, u32),
    }

    #[derive(Clone)]
    struct Recorder {
        seen: Arc<Mutex<Vec<Seen>>>,
        origin: Instant,
        send_delays: Vec<Duration>,
        fail_after: Option<usize>,
        sent: usize,
    }

    impl Recorder {
        fn new(send_delay: Duration) -> Self {
            Self {
                seen: Arc::default(),
                origin: Instant::now(),
                send_delays: vec![send_delay],
                fail_after: None,
                sent: 0,
            }
        }

        fn frame_times(&self) -> Vec<Duration> {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .filter_map(|s| match s {
                    Seen::Frame(at, ..) => Some(*at),
                    Seen::Speaking(_) => None,
                })
                .collect()
        }

        fn speaking(&self) -> Vec<bool> {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .filter_map(|s| match s {
                    Seen::Speaking(v) => Some(*v),
                    Seen::Frame(..) => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl FrameSink for Recorder {
        async fn speaking(&mut self, speaking: bool) {
            self.seen.lock().unwrap().push(Seen::Speaking(speaking));
        }

        async fn send_frame(
            &mut self,
            payload: &[u8],
            frame_size: u32,
        ) -> Result<(), ConnectionError> {
            if self.fail_after == Some(self.sent) {
                return Err(ConnectionError::NotConnected);
            }

            let at = Instant::now() - self.origin;
            self.seen
                .lock()
                .unwrap()
                .push(Seen::Frame(at, payload.to_vec(), frame_size));

            let delay = self
                .send_delays
                .get(self.sent)
                .or(self.send_delays.last())
                .copied()
                .unwrap_or_default();
            self.sent += 1;
            sleep(delay).await;

            Ok(())
        }
    }

    fn pcm(frames: usize, extra: usize) -> Vec<u8> {
        let mut out = vec![0u8; frames * STEREO_FRAME_BYTE_SIZE + extra];
        for (i, frame) in out.chunks_mut(STEREO_FRAME_BYTE_SIZE).enumerate() {
            frame[0] = i as u8;
        }
        out
    }

    fn source(bytes: Vec<u8>) -> Input {
        Input::from_reader(std::io::Cursor::new(bytes))
    }

    fn assert_near(actual: Duration, expected: Duration) {
        let diff = if actual > expected {
            actual - expected
        } else {
            expected - actual
        };
        assert!(
            diff <= Duration::from_millis(1),
            "expected {expected:?}, got {actual:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn frames_are_paced_from_playback_start() {
        let sink = Recorder::new(Duration::from_millis(7));
        let player = Player::new(source(pcm(12, 0)), Truncate, sink.clone());

        let played = player.play().await.unwrap();
        assert_eq!(played, Played {
            frames: 12,
            end: PlaybackEnd::Finished
        });

        let times = sink.frame_times();
        assert_eq!(times.len(), 12);
        for (k, at) in times.iter().enumerate() {
            assert_near(*at - times[0], TIMESTEP_LENGTH * k as u32);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn late_frames_catch_up_without_drift() {
        let mut sink = Recorder::new(Duration::ZERO);
        sink.send_delays = vec![
            Duration::ZERO,
            Duration::from_millis(45),
            Duration::ZERO,
            Duration::ZERO,
            Duration::ZERO,
        ];
        let player = Player::new(source(pcm(5, 0)), Truncate, sink.clone());
        player.play().await.unwrap();

        let times = sink.frame_times();
        let start = times[0];
        let rel: Vec<_> = times.iter().map(|t| *t - start).collect();

        assert_near(rel[1], Duration::from_millis(20));
        // Frames 2 and 3 are overdue once the slow send returns, and go out back to back.
        assert_near(rel[2], Duration::from_millis(65));
        assert_near(rel[3], Duration::from_millis(65));
        assert_near(rel[4], Duration::from_millis(80));
    }

    #[tokio::test(start_paused = true)]
    async fn partial_trailing_frame_is_dropped() {
        let sink = Recorder::new(Duration::ZERO);
        let player = Player::new(source(pcm(3, 100)), Truncate, sink.clone());

        let played = player.play().await.unwrap();
        assert_eq!(played.frames, 3);
        assert_eq!(played.end, PlaybackEnd::Finished);
        assert_eq!(sink.speaking(), [true, false]);

        let seen = sink.seen.lock().unwrap();
        assert_eq!(seen[0], Seen::Speaking(true));
        assert!(matches!(
            &seen[1],
            Seen::Frame(_, p, n) if p[0] == 0 && *n == MONO_FRAME_SIZE as u32
        ));
        assert!(matches!(&seen[3], Seen::Frame(_, p, _) if p[0] == 2));
        assert_eq!(seen[4], Seen::Speaking(false));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_source_still_toggles_speaking() {
        let sink = Recorder::new(Duration::ZERO);
        let player = Player::new(Input::from_reader(&b""[..]), Truncate, sink.clone());

        assert_eq!(player.play().await.unwrap().frames, 0);
        assert_eq!(sink.speaking(), [true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_interrupts_the_frame_wait() {
        let sink = Recorder::new(Duration::ZERO);
        let player = Player::new(
            Input::from_reader(tokio::io::repeat(0)),
            Truncate,
            sink.clone(),
        );
        let handle = player.start();

        sleep(Duration::from_millis(110)).await;
        handle.stop();
        let played = handle.wait().await.unwrap();

        assert_eq!(played.end, PlaybackEnd::Stopped);
        assert!((5..=7).contains(&played.frames), "{played:?}");
        assert_eq!(sink.speaking(), [true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_ends_playback() {
        let mut sink = Recorder::new(Duration::ZERO);
        sink.fail_after = Some(2);
        let player = Player::new(
            Input::from_reader(tokio::io::repeat(0)),
            Truncate,
            sink.clone(),
        );

        let err = player.play().await.unwrap_err();
        assert!(matches!(
            err,
            PlayError::Transport(ConnectionError::NotConnected)
        ));
        assert_eq!(sink.frame_times().len(), 2);
        assert_eq!(sink.speaking(), [true, false]);
    }

    #[tokio::test]
    async fn process_sources_are_reaped() {
        let bytes = (2 * STEREO_FRAME_BYTE_SIZE + 10).to_string();
        let input = Input::from_command(Command::new("head").args(["-c", &bytes, "/dev/zero"]))
            .unwrap();
        let sink = Recorder::new(Duration::ZERO);

        let played = Player::new(input, Truncate, sink.clone()).play().await.unwrap();
        assert_eq!(played.frames, 2);
        assert_eq!(sink.speaking(), [true, false]);
    }

    #[tokio::test]
    async fn opus_players_use_configured_bitrate() {
        let sink = Recorder::new(Duration::ZERO);
        let player = Player::opus(
            source(pcm(1, 0)),
            sink.clone(),
            &Config::default(),
        )
        .unwrap();

        assert_eq!(player.play().await.unwrap().frames, 1);
    }
}
