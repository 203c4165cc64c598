use crate::{
    constants::*,
    driver::CryptoMode,
    ws::{Connector, Encoding, Json, TungsteniteConnector},
};
use audiopus::Bitrate;
use derivative::Derivative;
use std::{sync::Arc, time::Duration};

/// Configuration for calls and their voice sessions.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
#[non_exhaustive]
pub struct Config {
    /// Selected tagging mode for voice packet encryption.
    ///
    /// Defaults to [`CryptoMode::Normal`].
    ///
    /// Changes to this field will not apply to a session which is already
    /// connected, but will apply to subsequent sessions.
    pub crypto_mode: CryptoMode,

    /// Configures the amount of time to wait for the voice server to answer
    /// UDP IP discovery.
    ///
    /// Defaults to 10 seconds.
    pub discovery_timeout: Duration,

    /// Configures how long to wait after announcing our SSRC (by toggling the
    /// speaking state on and off) before reporting the session as connected.
    ///
    /// Without this pause, other members of the call may not learn the new
    /// SSRC in time to hear the first frames. Defaults to 250ms.
    pub speaking_settle: Duration,

    /// Bitrate used by [`OpusEncoder`]s built from this config.
    ///
    /// Defaults to 128kbps.
    ///
    /// [`OpusEncoder`]: crate::codec::OpusEncoder
    pub bitrate: Bitrate,

    #[derivative(Debug = "ignore")]
    /// Framing used for voice gateway messages.
    ///
    /// Defaults to [`Json`].
    pub encoding: Arc<dyn Encoding>,

    #[derivative(Debug = "ignore")]
    /// Source of voice gateway websocket connections.
    ///
    /// Defaults to [`TungsteniteConnector`], which dials `wss://` URLs.
    pub connector: Arc<dyn Connector>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            crypto_mode: CryptoMode::Normal,
            discovery_timeout: DISCOVERY_TIMEOUT,
            speaking_settle: SPEAKING_SETTLE_DELAY,
            bitrate: DEFAULT_BITRATE,
            encoding: Arc::new(Json),
            connector: Arc::new(TungsteniteConnector),
        }
    }
}

impl Config {
    /// Sets this `Config`'s chosen cryptographic tagging scheme.
    #[must_use]
    pub fn crypto_mode(mut self, crypto_mode: CryptoMode) -> Self {
        self.crypto_mode = crypto_mode;
        self
    }

    /// Sets this `Config`'s timeout for UDP IP discovery.
    #[must_use]
    pub fn discovery_timeout(mut self, discovery_timeout: Duration) -> Self {
        self.discovery_timeout = discovery_timeout;
        self
    }

    /// Sets this `Config`'s post-handshake speaking settle delay.
    #[must_use]
    pub fn speaking_settle(mut self, speaking_settle: Duration) -> Self {
        self.speaking_settle = speaking_settle;
        self
    }

    /// Sets this `Config`'s Opus bitrate.
    #[must_use]
    pub fn bitrate(mut self, bitrate: Bitrate) -> Self {
        self.bitrate = bitrate;
        self
    }

    /// Sets this `Config`'s voice gateway message encoding.
    #[must_use]
    pub fn encoding(mut self, encoding: Arc<dyn Encoding>) -> Self {
        self.encoding = encoding;
        self
    }

    /// Sets this `Config`'s voice gateway connector.
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }
}
