//! Session and gateway error handling.

use std::{error::Error, fmt};

#[derive(Debug)]
#[non_exhaustive]
/// Error returned when a [`Call`] is unable to establish a voice session.
///
/// [`Call`]: crate::Call
pub enum JoinError {
    /// The session task ended, or the request was replaced, before an
    /// answer arrived.
    Dropped,
    /// The voice session was not fully established in the time given
    /// to [`Call::connect`].
    ///
    /// This can occur if a message is lost by the Discord client
    /// between restarts, or if Discord's gateway believes that
    /// this bot is still in the channel it attempts to join.
    ///
    /// *Users should `leave` the server on the gateway before
    /// re-attempting connection.*
    ///
    /// [`Call::connect`]: crate::Call::connect
    HandshakeTimeout,
    /// The voice server never answered UDP IP discovery.
    ///
    /// The session has already been torn down when this is returned.
    DiscoveryTimeout,
    /// The handshake failed for another reason.
    ///
    /// *Users should `leave` the server on the gateway before
    /// re-attempting connection.*
    Driver(ConnectionError),
    /// The control channel refused our voice state update.
    Gateway(Box<dyn Error + Send + Sync>),
}

impl JoinError {
    /// Indicates whether this failure may have left (or been
    /// caused by) Discord's gateway state being in an
    /// inconsistent state.
    ///
    /// Failure to `leave` before rejoining may cause further
    /// timeouts.
    pub fn should_leave_server(&self) -> bool {
        matches!(
            self,
            JoinError::HandshakeTimeout | JoinError::DiscoveryTimeout | JoinError::Driver(_)
        )
    }
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to Join Voice channel: ")?;
        match self {
            JoinError::Dropped => write!(f, "request was cancelled/dropped."),
            JoinError::HandshakeTimeout => write!(f, "voice handshake timed out."),
            JoinError::DiscoveryTimeout => write!(f, "UDP IP discovery timed out."),
            JoinError::Driver(t) => write!(f, "internal driver error {}.", t),
            JoinError::Gateway(t) => write!(f, "gateway failure {}.", t),
        }
    }
}

impl Error for JoinError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            JoinError::Driver(e) => Some(e),
            JoinError::Gateway(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<ConnectionError> for JoinError {
    fn from(e: ConnectionError) -> Self {
        match e {
            ConnectionError::DiscoveryTimeout => JoinError::DiscoveryTimeout,
            e => JoinError::Driver(e),
        }
    }
}

/// Convenience type for Discord gateway error handling.
pub type JoinResult<T> = Result<T, JoinError>;

pub use crate::{
    codec::CodecError,
    driver::connection::error::{Error as ConnectionError, Result as ConnectionResult},
    player::PlayError,
    ws::Error as WsError,
};
