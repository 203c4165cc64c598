use crate::constants::UDP_RECV_BUFFER;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{instrument, trace, warn};

/// Drains datagrams sent back by the voice server.
///
/// Inbound audio is not handled, so payloads are discarded. Runs until the
/// socket fails or the owning transport aborts the task.
#[instrument(skip(udp_socket))]
pub(crate) async fn runner(udp_socket: Arc<UdpSocket>) {
    trace!("UDP receive handle started.");

    let mut buf = [0u8; UDP_RECV_BUFFER];
    loop {
        match udp_socket.recv_from(&mut buf).await {
            Ok((len, addr)) => trace!("Discarding {len}B datagram from {addr}."),
            Err(e) => {
                warn!("UDP receive failed: {e}.");
                break;
            },
        }
    }

    trace!("UDP receive handle stopped.");
}
