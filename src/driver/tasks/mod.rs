#![allow(missing_docs)]

pub mod message;
pub(crate) mod udp_rx;
pub(crate) mod ws;

use super::{
    connection::error::{Error as ConnectionError, Result},
    Status,
    TransportSlot,
    UdpTransport,
    VoiceState,
};
use crate::{
    constants::VOICE_GATEWAY_VERSION,
    events::GatewayEvent,
    info::{ConnectionInfo, Handshake},
    model::{
        payload::{Identify, ProtocolData, SelectProtocol, Speaking},
        Event,
    },
    ws::Error as WsError,
    Config,
};
use flume::{Receiver, Sender};
use message::*;
use std::sync::Arc;
use tokio::{select, spawn, sync::watch, task::JoinHandle, time::sleep};
use tracing::{debug, error, info, instrument, trace, warn};
use url::Url;
use ws::AuxNetwork;

/// Everything a session task needs, handed over by its [`Call`](crate::Call).
pub(crate) struct Session {
    config: Config,
    handshake: Handshake,

    events: Receiver<GatewayEvent>,
    events_open: bool,
    rx: Receiver<CoreMessage>,
    core: Sender<CoreMessage>,
    result_tx: Option<Sender<Result<()>>>,

    ws: Option<Sender<WsMessage>>,
    host: Option<String>,
    ssrc: Option<u32>,
    speaking: bool,

    transport: TransportSlot,
    status: Arc<watch::Sender<Status>>,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: Config,
        handshake: Handshake,
        events: Receiver<GatewayEvent>,
        (core, rx): (Sender<CoreMessage>, Receiver<CoreMessage>),
        result_tx: Sender<Result<()>>,
        transport: TransportSlot,
        status: Arc<watch::Sender<Status>>,
    ) -> Self {
        Self {
            config,
            handshake,

            events,
            events_open: true,
            rx,
            core,
            result_tx: Some(result_tx),

            ws: None,
            host: None,
            ssrc: None,
            speaking: false,

            transport,
            status,
        }
    }

    #[instrument(skip(self))]
    async fn run(&mut self) {
        self.update_state(self.handshake.state());

        loop {
            let res = select! {
                ev = self.events.recv_async(), if self.events_open => match ev {
                    Ok(ev) => self.process_gateway(ev).await,
                    Err(flume::RecvError::Disconnected) => {
                        debug!("Gateway event source closed.");
                        self.events_open = false;
                        Ok(())
                    },
                },
                msg = self.rx.recv_async() => match msg {
                    Ok(CoreMessage::Ws(value)) => self.process_ws(*value).await,
                    Ok(CoreMessage::WsClosed(reason)) => self.ws_closed(reason),
                    Ok(CoreMessage::Speaking(speaking)) => {
                        self.set_speaking(speaking);
                        Ok(())
                    },
                    Err(flume::RecvError::Disconnected) => break,
                },
            };

            if let Err(why) = res {
                self.fail(why).await;
                break;
            }
        }
    }

    async fn process_gateway(&mut self, ev: GatewayEvent) -> Result<()> {
        let guild_id = self.handshake.guild_id();
        let info = match ev {
            GatewayEvent::VoiceStateUpdate {
                guild_id,
                user_id,
                session_id,
                ..
            } => self
                .handshake
                .apply_state_update(guild_id, user_id, session_id),
            GatewayEvent::VoiceServerUpdate {
                guild_id,
                endpoint: Some(endpoint),
                token,
            } => self
                .handshake
                .apply_server_update(guild_id, &endpoint, token),
            GatewayEvent::VoiceServerUpdate { .. } => {
                debug!("Voice server for {} is being reallocated.", guild_id);
                None
            },
        };

        match info {
            Some(info) => self.authenticate(info).await,
            None => Ok(()),
        }
    }

    async fn authenticate(&mut self, info: ConnectionInfo) -> Result<()> {
        self.update_state(VoiceState::Authenticating);

        let url = generate_url(&info.endpoint)?;
        info!("Connecting to voice gateway: {}.", url);

        let halves = self.config.connector.connect(url).await?;
        let (ws_tx, ws_rx) = flume::unbounded();
        let aux = AuxNetwork::new(
            ws_rx,
            self.core.clone(),
            halves,
            self.config.encoding.clone(),
        );
        spawn(ws::runner(aux));

        self.ws = Some(ws_tx);
        self.host = Some(info.endpoint);

        self.send_ws(Identify {
            server_id: info.guild_id,
            session_id: info.session_id,
            token: info.token,
            user_id: info.user_id,
        });

        Ok(())
    }

    async fn process_ws(&mut self, value: Event) -> Result<()> {
        match value {
            Event::Ready(ready) => {
                if self.handshake.state() != VoiceState::Authenticating {
                    debug!("Ignoring READY in state {:?}.", self.handshake.state());
                    return Ok(());
                }

                info!("Voice session ready with SSRC {}.", ready.ssrc);
                self.ssrc = Some(ready.ssrc);
                self.status.send_modify(|s| s.ssrc = Some(ready.ssrc));
                self.update_state(VoiceState::Connecting);

                if let Some(interval) = ready.heartbeat_interval {
                    self.set_keepalive(interval);
                }

                let host = self.host.clone().ok_or(ConnectionError::EndpointUrl)?;
                let (transport, address, port) = UdpTransport::discover(
                    &host,
                    ready.port,
                    ready.ssrc,
                    self.config.crypto_mode,
                    self.config.discovery_timeout,
                )
                .await?;
                *self.transport.lock().await = Some(transport);

                self.send_ws(SelectProtocol {
                    protocol: "udp".into(),
                    data: ProtocolData {
                        address,
                        mode: self.config.crypto_mode.to_request_str().into(),
                        port,
                    },
                });
            },
            Event::Hello(hello) => self.set_keepalive(hello.heartbeat_interval),
            Event::SessionDescription(desc) => {
                if self.handshake.state() != VoiceState::Connecting {
                    debug!(
                        "Ignoring SESSION_DESCRIPTION in state {:?}.",
                        self.handshake.state()
                    );
                    return Ok(());
                }

                if desc.mode != self.config.crypto_mode.to_request_str() {
                    return Err(ConnectionError::CryptoModeInvalid);
                }

                self.transport
                    .lock()
                    .await
                    .as_mut()
                    .ok_or(ConnectionError::NotConnected)?
                    .set_secret_key(&desc.secret_key)?;

                // Announce our SSRC to other call members before any audio flows.
                self.set_speaking(true);
                self.set_speaking(false);
                sleep(self.config.speaking_settle).await;

                self.update_state(VoiceState::Connected);
                info!("Connected to: {}.", self.host.as_deref().unwrap_or_default());

                if let Some(tx) = self.result_tx.take() {
                    // Other side may not be listening: this is fine.
                    drop(tx.send(Ok(())));
                }
            },
            Event::Speaking(ev) => {
                debug!(
                    "SSRC {} (user {:?}) speaking: {}.",
                    ev.ssrc, ev.user_id, ev.speaking
                );
            },
            Event::ClientDisconnect(ev) => {
                debug!("User {} left the call.", ev.user_id);
            },
            Event::Unknown(op) => {
                debug!("Ignoring message with unknown opcode {}.", op);
            },
            other => {
                trace!("Received other websocket data: {:?}", other);
            },
        }

        Ok(())
    }

    /// Handles loss of the signalling websocket.
    ///
    /// Mid-handshake this aborts the attempt. Once connected, the UDP transport
    /// and its key stay usable until the caller disconnects.
    fn ws_closed(&mut self, reason: WsError) -> Result<()> {
        if self.handshake.state() != VoiceState::Connected {
            return Err(reason.into());
        }

        warn!(
            "Voice gateway connection lost ({}); keeping UDP transport, not reconnecting.",
            reason
        );

        // The websocket task has already exited, which also ends its heartbeat.
        self.ws = None;

        Ok(())
    }

    fn set_speaking(&mut self, speaking: bool) {
        let Some(ssrc) = self.ssrc else {
            debug!("Not attached to a voice server; ignoring speaking state.");
            return;
        };

        if self.speaking == speaking {
            return;
        }

        self.speaking = speaking;
        info!("Changing speaking state to {}.", speaking);
        self.send_ws(Speaking {
            speaking,
            delay: Some(0),
            ssrc,
            user_id: None,
        });
    }

    fn set_keepalive(&self, interval: f64) {
        if let Some(ws) = &self.ws {
            drop(ws.send(WsMessage::SetKeepalive(interval)));
        }
    }

    fn send_ws(&self, value: impl Into<Event>) {
        if let Some(ws) = &self.ws {
            drop(ws.send(WsMessage::Send(Box::new(value.into()))));
        }
    }

    fn update_state(&mut self, state: VoiceState) {
        self.handshake.set_state(state);
        self.status.send_modify(|s| s.state = state);
    }

    async fn fail(&mut self, why: ConnectionError) {
        error!("Voice session failed: {}.", why);

        // Dropping the sender closes the websocket and stops its heartbeat.
        self.ws = None;
        if let Some(mut transport) = self.transport.lock().await.take() {
            transport.disconnect();
        }

        self.ssrc = None;
        self.speaking = false;
        self.handshake.set_state(VoiceState::Disconnected);
        self.status.send_replace(Status::default());

        if let Some(tx) = self.result_tx.take() {
            drop(tx.send(Err(why)));
        }
    }
}

pub(crate) fn start(session: Session) -> JoinHandle<()> {
    spawn(async move {
        trace!("Session started.");
        runner(session).await;
        trace!("Session finished.");
    })
}

#[instrument(skip(session))]
async fn runner(mut session: Session) {
    session.run().await;
}

fn generate_url(endpoint: &str) -> Result<Url> {
    Url::parse(&format!("wss://{endpoint}/?v={VOICE_GATEWAY_VERSION}"))
        .or(Err(ConnectionError::EndpointUrl))
}
