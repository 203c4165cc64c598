use super::message::*;
use crate::{
    model::{payload::Heartbeat, Event as GatewayEvent},
    ws::{send_event, Encoding, Error as WsError, WsSink, WsSource},
};
use flume::{Receiver, Sender};
use futures::{SinkExt, StreamExt};
use rand::random;
use std::{sync::Arc, time::Duration};
use tokio::{
    select,
    time::{sleep_until, Instant},
};
use tracing::{debug, info, instrument, trace, warn};

/// Owner of one voice gateway websocket.
///
/// Forwards every decoded message to the session task in receipt order,
/// sends whatever the session task queues, and keeps the connection alive
/// once a heartbeat interval is known.
pub(crate) struct AuxNetwork {
    rx: Receiver<WsMessage>,
    core: Sender<CoreMessage>,
    sink: WsSink,
    source: WsSource,
    encoding: Arc<dyn Encoding>,

    heartbeat_interval: Option<Duration>,
    last_heartbeat_nonce: Option<u64>,
}

impl AuxNetwork {
    pub(crate) fn new(
        rx: Receiver<WsMessage>,
        core: Sender<CoreMessage>,
        (sink, source): (WsSink, WsSource),
        encoding: Arc<dyn Encoding>,
    ) -> Self {
        Self {
            rx,
            core,
            sink,
            source,
            encoding,

            heartbeat_interval: None,
            last_heartbeat_nonce: None,
        }
    }

    #[instrument(skip(self))]
    async fn run(&mut self) {
        let mut next_heartbeat = None;

        loop {
            let hb = sleep_until(next_heartbeat.unwrap_or_else(Instant::now));

            let ws_error = select! {
                () = hb, if next_heartbeat.is_some() => {
                    next_heartbeat = self.next_heartbeat();
                    self.send_heartbeat().await.err()
                },
                ws_msg = self.source.next() => match ws_msg {
                    Some(Ok(msg)) => match self.encoding.decode(msg) {
                        Ok(Some(value)) => {
                            self.process_ws(value);
                            None
                        },
                        Ok(None) => None,
                        Err(e @ WsError::WsClosed(_)) => Some(e),
                        Err(e) => {
                            warn!("Dropping undecodable voice gateway message: {e}.");
                            None
                        },
                    },
                    Some(Err(e)) => Some(e.into()),
                    None => Some(WsError::WsClosed(None)),
                },
                inner_msg = self.rx.recv_async() => match inner_msg {
                    Ok(WsMessage::Send(value)) =>
                        send_event(&mut self.sink, self.encoding.as_ref(), &value).await.err(),
                    Ok(WsMessage::SetKeepalive(keepalive)) => {
                        if keepalive.is_finite() && keepalive > 0.0 {
                            info!("WS heartbeat duration {}ms.", keepalive);
                            self.heartbeat_interval =
                                Some(Duration::from_secs_f64(keepalive / 1000.0));
                            next_heartbeat = self.next_heartbeat();
                        } else {
                            warn!("Ignoring invalid heartbeat interval {}.", keepalive);
                        }
                        None
                    },
                    Err(flume::RecvError::Disconnected) => {
                        // Session is gone: close politely, but nobody is left to tell.
                        if let Err(e) = self.sink.close().await {
                            debug!("Error closing voice gateway websocket: {e}.");
                        }
                        break;
                    },
                },
            };

            if let Some(e) = ws_error {
                drop(self.core.send(CoreMessage::WsClosed(e)));
                break;
            }
        }
    }

    fn next_heartbeat(&self) -> Option<Instant> {
        self.heartbeat_interval.map(|i| Instant::now() + i)
    }

    async fn send_heartbeat(&mut self) -> Result<(), WsError> {
        let nonce = random::<u64>();
        self.last_heartbeat_nonce = Some(nonce);

        trace!("Sent heartbeat {}.", nonce);

        send_event(
            &mut self.sink,
            self.encoding.as_ref(),
            &GatewayEvent::from(Heartbeat { nonce }),
        )
        .await
    }

    fn process_ws(&mut self, value: GatewayEvent) {
        match value {
            GatewayEvent::HeartbeatAck(ev) => {
                if let Some(nonce) = self.last_heartbeat_nonce.take() {
                    if ev.nonce == nonce {
                        trace!("Heartbeat ACK received.");
                    } else {
                        warn!(
                            "Heartbeat nonce mismatch! Expected {}, saw {}.",
                            nonce, ev.nonce
                        );
                    }
                }
            },
            other => {
                drop(self.core.send(CoreMessage::Ws(Box::new(other))));
            },
        }
    }
}

#[instrument(skip(aux))]
pub(crate) async fn runner(mut aux: AuxNetwork) {
    trace!("WS thread started.");
    aux.run().await;
    trace!("WS thread finished.");
}
