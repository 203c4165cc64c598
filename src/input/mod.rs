//! Raw PCM sources for playback.
//!
//! Every source must yield interleaved, little-endian, signed 16-bit stereo
//! samples at 48kHz. Decoding and resampling are left to external programs
//! such as `ffmpeg`.

mod child;

pub use self::child::ChildContainer;

use std::{
    ffi::OsStr,
    fmt,
    io::Result as IoResult,
    pin::Pin,
    process::Stdio,
    task::{Context, Poll},
};
use tokio::{
    io::{AsyncRead, ReadBuf},
    process::Command,
};
use tracing::{debug, instrument};

const FFMPEG_ARGS: [&str; 12] = [
    "-f",
    "s16le",
    "-ac",
    "2",
    "-ar",
    "48000",
    "-acodec",
    "pcm_s16le",
    "-nostdin",
    "-loglevel",
    "fatal",
    "-",
];

/// A stream of raw PCM audio.
pub enum Input {
    /// Any in-memory or streamed byte source.
    Raw(Box<dyn AsyncRead + Unpin + Send>),
    /// The output of a child process, which is awaited once playback ends.
    Process(ChildContainer),
}

impl Input {
    /// Wraps any byte source.
    pub fn from_reader(reader: impl AsyncRead + Unpin + Send + 'static) -> Self {
        Input::Raw(Box::new(reader))
    }

    /// Spawns `command` with a piped stdout, and reads audio from it.
    pub fn from_command(command: &mut Command) -> IoResult<Self> {
        let child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        ChildContainer::new(child).map(Input::Process)
    }

    /// Whether this source is backed by a child process.
    #[must_use]
    pub fn is_process(&self) -> bool {
        matches!(self, Input::Process(_))
    }

    /// Releases the source, waiting for any backing process to exit.
    pub(crate) async fn finish(self) -> IoResult<()> {
        if let Input::Process(child) = self {
            child.wait().await?;
        }

        Ok(())
    }
}

impl AsyncRead for Input {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<IoResult<()>> {
        match self.get_mut() {
            Input::Raw(reader) => Pin::new(reader).poll_read(cx, buf),
            Input::Process(child) => Pin::new(child).poll_read(cx, buf),
        }
    }
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Input::Raw(_) => f.write_str("Input::Raw"),
            Input::Process(child) => f.debug_tuple("Input::Process").field(child).finish(),
        }
    }
}

/// Opens any file or URL `ffmpeg` understands as a PCM stream.
#[instrument]
pub fn ffmpeg<P: AsRef<OsStr> + fmt::Debug>(path: P) -> IoResult<Input> {
    let mut command = ffmpeg_command(path.as_ref());
    debug!("Spawning ffmpeg.");

    Input::from_command(command.stderr(Stdio::null()))
}

fn ffmpeg_command(path: &OsStr) -> Command {
    let mut command = Command::new("ffmpeg");
    command.arg("-i").arg(path).args(FFMPEG_ARGS);
    command
}
