use crate::{
    driver::{
        tasks::{self, message::CoreMessage, Session},
        Status,
        Transmitter,
        TransportSlot,
        VoiceState,
    },
    error::{JoinError, JoinResult},
    events::GatewayEvent,
    id::{ChannelId, GuildId, UserId},
    info::Handshake,
    shards::VoiceUpdate,
    Config,
};
use derivative::Derivative;
use flume::{Receiver, Sender};
use std::{sync::Arc, time::Duration};
use tokio::{sync::watch, task::JoinHandle, time::timeout};
use tracing::{debug, info, instrument, warn};

/// The Call handler is responsible for a single voice session, acting
/// as a clean API above the inner session tasks and gateway message management.
///
/// Gateway dispatches relevant to voice must be forwarded into the
/// [`GatewayEvent`] channel given at creation, and the [`VoiceUpdate`] handle
/// must reach the same gateway connection.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Call {
    config: Config,

    channel_id: ChannelId,
    guild_id: GuildId,
    user_id: UserId,
    /// Whether the current handler is set to deafen voice connections.
    self_deaf: bool,
    /// Whether the current handler is set to mute voice connections.
    self_mute: bool,
    /// Whether a join request has been sent without a matching leave.
    joined: bool,

    #[derivative(Debug = "ignore")]
    ws: Arc<dyn VoiceUpdate + Send + Sync>,
    events: Receiver<GatewayEvent>,

    core: Option<Sender<CoreMessage>>,
    task: Option<JoinHandle<()>>,
    transport: TransportSlot,
    status: Arc<watch::Sender<Status>>,
}

impl Call {
    /// Creates a new Call for `channel_id`, which will send voice state updates
    /// via `ws` and learn of its voice server through `events`.
    #[inline]
    #[instrument(skip(ws, events))]
    pub fn new(
        guild_id: GuildId,
        channel_id: ChannelId,
        user_id: UserId,
        ws: Arc<dyn VoiceUpdate + Send + Sync>,
        events: Receiver<GatewayEvent>,
    ) -> Self {
        Self::from_config(guild_id, channel_id, user_id, ws, events, Config::default())
    }

    /// Creates a new Call, configuring its sessions as specified.
    #[instrument(skip(ws, events))]
    pub fn from_config(
        guild_id: GuildId,
        channel_id: ChannelId,
        user_id: UserId,
        ws: Arc<dyn VoiceUpdate + Send + Sync>,
        events: Receiver<GatewayEvent>,
        config: Config,
    ) -> Self {
        let (status, _) = watch::channel(Status::default());

        Call {
            config,
            channel_id,
            guild_id,
            user_id,
            self_deaf: false,
            self_mute: false,
            joined: false,
            ws,
            events,
            core: None,
            task: None,
            transport: TransportSlot::default(),
            status: Arc::new(status),
        }
    }

    /// Joins the voice channel and performs the full voice handshake, waiting
    /// up to `timeout` for the session to become usable.
    ///
    /// Any session already in progress is torn down first.
    ///
    /// On [`JoinError::HandshakeTimeout`] the session is left running, so
    /// that the caller may inspect [`state`] before calling [`disconnect`].
    /// Any other failure disconnects automatically.
    ///
    /// [`state`]: Call::state
    /// [`disconnect`]: Call::disconnect
    #[instrument(skip(self))]
    pub async fn connect(&mut self, timeout_after: Duration) -> JoinResult<()> {
        self.leave_local().await;

        let stale = self.events.drain().count();
        if stale > 0 {
            debug!("Discarded {} stale gateway events.", stale);
        }

        let mut handshake = Handshake::new(self.guild_id, self.channel_id, self.user_id);
        handshake.begin();

        self.status.send_replace(Status {
            state: VoiceState::AwaitingEndpoint,
            ssrc: None,
        });

        let (core_tx, core_rx) = flume::unbounded();
        let (result_tx, result_rx) = flume::bounded(1);

        self.task = Some(tasks::start(Session::new(
            self.config.clone(),
            handshake,
            self.events.clone(),
            (core_tx.clone(), core_rx),
            result_tx,
            self.transport.clone(),
            self.status.clone(),
        )));
        self.core = Some(core_tx);

        if let Err(e) = self
            .ws
            .update_voice_state(
                self.guild_id,
                Some(self.channel_id),
                self.self_deaf,
                self.self_mute,
            )
            .await
        {
            self.leave_local().await;
            return Err(e);
        }
        self.joined = true;

        let res = match timeout(timeout_after, result_rx.recv_async()).await {
            Err(_) => return Err(JoinError::HandshakeTimeout),
            Ok(Err(flume::RecvError::Disconnected)) => Err(JoinError::Dropped),
            Ok(Ok(res)) => res.map_err(JoinError::from),
        };

        if let Err(why) = res {
            if let Err(e) = self.disconnect().await {
                warn!("Failed to leave voice channel after failed join: {}.", e);
            }
            return Err(why);
        }

        info!("Voice session established in {}.", self.channel_id);
        Ok(())
    }

    /// Leaves the current voice channel, tearing down the session.
    ///
    /// This is idempotent: the gateway hears about our departure at most once
    /// per successful join request.
    #[instrument(skip(self))]
    pub async fn disconnect(&mut self) -> JoinResult<()> {
        self.leave_local().await;

        // Only send an update if we were in a voice channel.
        if self.joined {
            self.joined = false;
            self.ws
                .update_voice_state(self.guild_id, None, self.self_deaf, self.self_mute)
                .await?;
            info!("Left voice channel {}.", self.channel_id);
        }

        Ok(())
    }

    async fn leave_local(&mut self) {
        self.core = None;

        if let Some(task) = self.task.take() {
            task.abort();
            drop(task.await);
        }

        if let Some(mut transport) = self.transport.lock().await.take() {
            transport.disconnect();
        }

        self.status.send_replace(Status::default());
    }

    /// Sets whether we are transmitting audio.
    ///
    /// Has no effect unless a voice server has accepted this session.
    #[instrument(skip(self))]
    pub fn set_speaking(&self, speaking: bool) {
        if let Some(core) = &self.core {
            drop(core.send(CoreMessage::Speaking(speaking)));
        }
    }

    /// Sets whether the current connection is to be muted.
    ///
    /// If there is no live voice connection, then this only acts as a settings
    /// update for future connections.
    #[instrument(skip(self))]
    pub async fn mute(&mut self, mute: bool) -> JoinResult<()> {
        self.self_mute = mute;

        self.update().await
    }

    /// Returns whether the current connection is self-muted in this server.
    #[must_use]
    pub fn is_mute(&self) -> bool {
        self.self_mute
    }

    /// Sets whether the current connection is to be deafened.
    ///
    /// If there is no live voice connection, then this only acts as a settings
    /// update for future connections.
    ///
    /// This is purely cosmetic: received audio is never processed.
    #[instrument(skip(self))]
    pub async fn deafen(&mut self, deaf: bool) -> JoinResult<()> {
        self.self_deaf = deaf;

        self.update().await
    }

    /// Returns whether the current connection is self-deafened in this server.
    #[must_use]
    pub fn is_deaf(&self) -> bool {
        self.self_deaf
    }

    /// Current progress of the voice session.
    #[must_use]
    pub fn state(&self) -> VoiceState {
        self.status.borrow().state
    }

    /// SSRC assigned to this session by the voice server, once known.
    #[must_use]
    pub fn ssrc(&self) -> Option<u32> {
        self.status.borrow().ssrc
    }

    /// Returns a handle for sending audio, if the session is connected.
    #[must_use]
    pub fn transmitter(&self) -> Option<Transmitter> {
        if !self.state().is_connected() {
            return None;
        }

        self.core
            .as_ref()
            .map(|core| Transmitter::new(core.clone(), self.transport.clone()))
    }

    /// Guild this call belongs to.
    #[must_use]
    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Voice channel this call joins.
    #[must_use]
    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    /// Access this call handler's configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Set this call handler's configuration.
    ///
    /// Changes apply from the next call to [`connect`](Call::connect).
    pub fn set_config(&mut self, config: Config) {
        self.config = config;
    }

    /// Send an update for the current session over WS.
    #[instrument(skip(self))]
    async fn update(&mut self) -> JoinResult<()> {
        if !self.joined {
            return Ok(());
        }

        self.ws
            .update_voice_state(
                self.guild_id,
                Some(self.channel_id),
                self.self_deaf,
                self.self_mute,
            )
            .await
    }
}

impl Drop for Call {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }

        if let Ok(mut slot) = self.transport.try_lock() {
            if let Some(mut transport) = slot.take() {
                transport.disconnect();
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use crate::{
        model::Event,
        ws::{Connector, Encoding, Json, Result as WsResult, WsSink, WsSource},
    };
    use async_trait::async_trait;
    use futures::{
        channel::mpsc::{self, UnboundedReceiver, UnboundedSender},
        SinkExt,
        StreamExt,
    };
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use tokio_tungstenite::tungstenite::{Error as TungsteniteError, Message};
    use url::Url;

    /// Voice server end of an in-memory websocket.
    pub(crate) struct FakeServer {
        pub(crate) url: Url,
        rx: UnboundedReceiver<Message>,
        tx: UnboundedSender<Result<Message, TungsteniteError>>,
    }

    impl FakeServer {
        /// Next message from the client, skipping heartbeats.
        pub(crate) async fn recv(&mut self) -> Event {
            loop {
                let msg = self.rx.next().await.expect("client hung up");
                match Json.decode(msg).unwrap() {
                    Some(Event::Heartbeat(_)) | None => continue,
                    Some(ev) => return ev,
                }
            }
        }

        /// Waits for the client to drop its end, discarding anything it sends.
        pub(crate) async fn hung_up(&mut self) {
            while self.rx.next().await.is_some() {}
        }

        pub(crate) fn send(&self, ev: impl Into<Event>) {
            self.tx
                .unbounded_send(Ok(Json.encode(&ev.into()).unwrap()))
                .unwrap();
        }

        pub(crate) fn send_raw(&self, msg: Message) {
            self.tx.unbounded_send(Ok(msg)).unwrap();
        }
    }

    /// Connector handing each dialled websocket to the test as a [`FakeServer`].
    pub(crate) struct MockConnector {
        servers: flume::Sender<FakeServer>,
        pub(crate) dials: Arc<AtomicUsize>,
    }

    impl MockConnector {
        pub(crate) fn new() -> (Self, flume::Receiver<FakeServer>) {
            let (servers, rx) = flume::unbounded();
            let conn = Self {
                servers,
                dials: Arc::default(),
            };
            (conn, rx)
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn connect(&self, url: Url) -> WsResult<(WsSink, WsSource)> {
            self.dials.fetch_add(1, Ordering::SeqCst);

            let (client_tx, server_rx) = mpsc::unbounded();
            let (server_tx, client_rx) = mpsc::unbounded();

            self.servers
                .send(FakeServer {
                    url,
                    rx: server_rx,
                    tx: server_tx,
                })
                .map_err(|_| TungsteniteError::ConnectionClosed)?;

            let sink: WsSink =
                Box::pin(client_tx.sink_map_err(|_| TungsteniteError::ConnectionClosed));
            let source: WsSource = Box::pin(client_rx);

            Ok((sink, source))
        }
    }
}
