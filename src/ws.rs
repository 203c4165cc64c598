//! Signalling websocket plumbing.
//!
//! Opening the socket is delegated to a [`Connector`], and message framing to
//! an [`Encoding`]. The defaults speak JSON over a TLS websocket, but both can
//! be swapped through [`Config`](crate::Config).

use crate::model::Event;
use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde_json::Error as JsonError;
use std::{fmt, pin::Pin};
use tokio_tungstenite::tungstenite::{
    error::Error as TungsteniteError,
    protocol::CloseFrame,
    Message,
};
use tracing::{debug, instrument};
use url::Url;

/// Outgoing half of a signalling connection.
pub type WsSink = Pin<Box<dyn Sink<Message, Error = TungsteniteError> + Send>>;

/// Incoming half of a signalling connection.
pub type WsSource =
    Pin<Box<dyn Stream<Item = std::result::Result<Message, TungsteniteError>> + Send>>;

/// Source of signalling connections to a voice server.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a new websocket to `url`, split into its send and receive halves.
    async fn connect(&self, url: Url) -> Result<(WsSink, WsSource)>;
}

/// Default [`Connector`], opening real websockets via `tokio-tungstenite`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    #[instrument(skip(self))]
    async fn connect(&self, url: Url) -> Result<(WsSink, WsSource)> {
        let (stream, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let (sink, source) = stream.split();
        let sink: WsSink = Box::pin(sink);
        let source: WsSource = Box::pin(source);

        Ok((sink, source))
    }
}

/// Converts between signalling messages and websocket frames.
pub trait Encoding: Send + Sync {
    /// Frames a message for sending.
    fn encode(&self, value: &Event) -> Result<Message>;

    /// Parses a received frame.
    ///
    /// Frames carrying no message (pings, pongs, empty frames) yield `Ok(None)`.
    fn decode(&self, message: Message) -> Result<Option<Event>>;
}

/// JSON text framing, as spoken by Discord's voice gateway.
#[derive(Clone, Copy, Debug, Default)]
pub struct Json;

impl Encoding for Json {
    fn encode(&self, value: &Event) -> Result<Message> {
        Ok(Message::Text(serde_json::to_string(value)?))
    }

    fn decode(&self, message: Message) -> Result<Option<Event>> {
        let payload = match message {
            Message::Text(payload) => payload.into_bytes(),
            Message::Binary(bytes) => bytes,
            Message::Close(frame) => return Err(Error::WsClosed(frame)),
            // Ping/Pong message behaviour is internally handled by tungstenite.
            _ => return Ok(None),
        };

        serde_json::from_slice(&payload).map(Some).map_err(|e| {
            debug!(
                "Unexpected JSON for opcode {:?}: {}.",
                opcode_of(&payload),
                describe_json_error(&e),
            );
            e.into()
        })
    }
}

/// Reads the opcode of an otherwise undecodable message.
///
/// Payloads may hold key material, so only the opcode is ever reported.
fn opcode_of(payload: &[u8]) -> Option<u64> {
    serde_json::from_slice::<serde_json::Value>(payload)
        .ok()?
        .get("op")?
        .as_u64()
}

/// Describes a JSON failure by position only.
///
/// `serde_json`'s own messages quote offending values, which could be a key.
fn describe_json_error(e: &JsonError) -> String {
    format!(
        "{:?} error at line {}, column {}",
        e.classify(),
        e.line(),
        e.column()
    )
}

/// Convenience type for signalling error handling.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while reading from or writing to a signalling connection.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// A message could not be (de)serialised by the active [`Encoding`].
    Json(JsonError),
    /// The underlying websocket failed.
    Ws(TungsteniteError),
    /// The server closed the connection.
    WsClosed(Option<CloseFrame<'static>>),
}

impl From<JsonError> for Error {
    fn from(e: JsonError) -> Error {
        Error::Json(e)
    }
}

impl From<TungsteniteError> for Error {
    fn from(e: TungsteniteError) -> Error {
        Error::Ws(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Json(e) =>
                write!(f, "malformed signalling message ({})", describe_json_error(e)),
            Error::Ws(e) => write!(f, "websocket failure: {e}"),
            Error::WsClosed(Some(frame)) =>
                write!(f, "websocket closed ({}: {})", frame.code, frame.reason),
            Error::WsClosed(None) => write!(f, "websocket closed"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Json(e) => Some(e),
            Error::Ws(e) => Some(e),
            Error::WsClosed(_) => None,
        }
    }
}

/// Frames `value` with `encoding` and pushes it onto `sink`.
pub(crate) async fn send_event(
    sink: &mut WsSink,
    encoding: &dyn Encoding,
    value: &Event,
) -> Result<()> {
    let msg = encoding.encode(value)?;
    sink.send(msg).await.map_err(Error::from)
}
