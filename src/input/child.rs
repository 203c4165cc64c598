use std::{
    io::{Error as IoError, ErrorKind, Result as IoResult},
    pin::Pin,
    process::ExitStatus,
    task::{Context, Poll},
};
use tokio::{
    io::{AsyncRead, ReadBuf},
    process::{Child, ChildStdout},
};
use tracing::debug;

/// Handle for a child process whose stdout is an audio byte source.
///
/// The process is killed if the container is dropped without being awaited,
/// so spawn it with [`kill_on_drop`] set.
///
/// [`kill_on_drop`]: tokio::process::Command::kill_on_drop
#[derive(Debug)]
pub struct ChildContainer {
    child: Child,
    stdout: Option<ChildStdout>,
}

impl ChildContainer {
    /// Takes ownership of a spawned process, which must have a piped stdout.
    pub fn new(mut child: Child) -> IoResult<Self> {
        let stdout = child.stdout.take().ok_or_else(|| {
            IoError::new(ErrorKind::BrokenPipe, "child process has no piped stdout")
        })?;

        Ok(Self {
            child,
            stdout: Some(stdout),
        })
    }

    /// Closes our end of the pipe and waits for the process to exit.
    pub async fn wait(mut self) -> IoResult<ExitStatus> {
        // A process blocked writing to a full pipe only exits once we hang up.
        self.stdout = None;

        let status = self.child.wait().await?;
        debug!("Child process exited: {}.", status);

        Ok(status)
    }
}

impl AsyncRead for ChildContainer {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<IoResult<()>> {
        match self.stdout.as_mut() {
            Some(stdout) => Pin::new(stdout).poll_read(cx, buf),
            None => Poll::Ready(Ok(())),
        }
    }
}
