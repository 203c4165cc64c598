//! Connection errors and convenience types.

use crate::ws::Error as WsError;
use std::{error::Error as StdError, fmt, io::Error as IoError};
use xsalsa20poly1305::aead::Error as CryptoError;

/// Errors encountered while establishing or using a voice connection.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// An error occurred during encryption of a voice packet.
    Crypto(CryptoError),
    /// The secret key given by the server had the wrong length.
    CryptoInvalidLength,
    /// Server did not return the expected crypto mode during negotiation.
    CryptoModeInvalid,
    /// The voice server did not answer IP discovery in time.
    DiscoveryTimeout,
    /// An indicator that an endpoint URL was invalid.
    EndpointUrl,
    /// Discord failed to correctly respond to IP discovery.
    IllegalDiscoveryResponse,
    /// Could not parse Discord's view of our IP.
    IllegalIp,
    /// Miscellaneous I/O error.
    Io(IoError),
    /// The UDP transport has been torn down, or was never keyed.
    NotConnected,
    /// Error communicating with the voice server over WebSocket.
    Ws(WsError),
}

impl From<CryptoError> for Error {
    fn from(e: CryptoError) -> Self {
        Error::Crypto(e)
    }
}

impl From<IoError> for Error {
    fn from(e: IoError) -> Error {
        Error::Io(e)
    }
}

impl From<WsError> for Error {
    fn from(e: WsError) -> Error {
        Error::Ws(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to connect to Discord RTP server: ")?;
        use Error::*;
        match self {
            Crypto(e) => fmt::Display::fmt(e, f),
            CryptoInvalidLength => write!(f, "server sent a secret key of invalid length"),
            CryptoModeInvalid => write!(f, "server changed negotiated encryption mode"),
            DiscoveryTimeout => write!(f, "IP discovery/NAT punching received no response"),
            EndpointUrl => write!(f, "endpoint URL received from gateway was invalid"),
            IllegalDiscoveryResponse => write!(f, "IP discovery/NAT punching response was invalid"),
            IllegalIp => write!(f, "IP discovery/NAT punching response had bad IP value"),
            Io(e) => fmt::Display::fmt(e, f),
            NotConnected => write!(f, "voice transport is not connected"),
            Ws(e) => write!(f, "websocket issue ({e})."),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Ws(e) => Some(e),
            _ => None,
        }
    }
}

/// Convenience type for Discord voice/driver connection error handling.
pub type Result<T> = std::result::Result<T, Error>;
