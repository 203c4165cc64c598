//! UDP media transport: IP discovery and encrypted packet sending.

use super::{
    connection::error::{Error, Result},
    crypto::CryptoMode,
    tasks::udp_rx,
};
use crate::{
    constants::*,
    packet::{discovery_request, parse_discovery_response, rtp_header, RtpCounters},
};
use byteorder::{BigEndian, ByteOrder};
use std::{
    fmt,
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};
use tokio::{
    net::{lookup_host, UdpSocket},
    spawn,
    task::JoinHandle,
    time::timeout,
};
use tracing::{debug, info, instrument};
use xsalsa20poly1305::XSalsa20Poly1305 as Cipher;

/// A voice server's UDP endpoint, owned by exactly one session.
///
/// The remote address is fixed by [`discover`], after which the transport
/// only needs a key before it can send audio. Sequence number and timestamp
/// are *not* advanced by [`send_encrypted`]: callers must [`advance`] them by
/// the exact number of samples in each frame they send.
///
/// [`discover`]: UdpTransport::discover
/// [`send_encrypted`]: UdpTransport::send_encrypted
/// [`advance`]: UdpTransport::advance
pub struct UdpTransport {
    socket: Option<Arc<UdpSocket>>,
    remote: SocketAddr,
    ssrc: u32,
    counters: RtpCounters,
    crypto_mode: CryptoMode,
    cipher: Option<Cipher>,
    rx_task: Option<JoinHandle<()>>,
    packet: Vec<u8>,
}

impl UdpTransport {
    /// Binds a local socket and asks the voice server at `(host, port)` how it
    /// sees us, waiting up to `wait` for an answer.
    ///
    /// On success, returns the transport along with our externally visible
    /// IP and port, and starts draining any datagrams the server sends back.
    #[instrument(skip(crypto_mode, wait))]
    pub async fn discover(
        host: &str,
        port: u16,
        ssrc: u32,
        crypto_mode: CryptoMode,
        wait: Duration,
    ) -> Result<(Self, IpAddr, u16)> {
        let remote = lookup_host((host, port))
            .await?
            .next()
            .ok_or(Error::EndpointUrl)?;

        let local: SocketAddr = if remote.is_ipv4() {
            ([0u8; 4], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };

        let socket = UdpSocket::bind(local).await?;
        socket.send_to(&discovery_request(ssrc), remote).await?;

        let mut bytes = [0u8; DISCOVERY_PACKET_LEN];
        let (len, _addr) = timeout(wait, socket.recv_from(&mut bytes))
            .await
            .map_err(|_| Error::DiscoveryTimeout)??;

        if len >= 4 && BigEndian::read_u32(&bytes[..4]) != ssrc {
            debug!("Discovery response did not echo our SSRC; ignoring.");
        }

        let (address, external_port) = parse_discovery_response(&bytes[..len])?;
        info!("Discovered external address {}:{}.", address, external_port);

        let socket = Arc::new(socket);
        let rx_task = spawn(udp_rx::runner(socket.clone()));

        let transport = Self {
            socket: Some(socket),
            remote,
            ssrc,
            counters: RtpCounters::default(),
            crypto_mode,
            cipher: None,
            rx_task: Some(rx_task),
            packet: Vec::with_capacity(VOICE_PACKET_MAX),
        };

        Ok((transport, address, external_port))
    }

    /// Address of the voice server.
    #[must_use]
    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// SSRC stamped on every sent packet.
    #[must_use]
    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    /// Sequence number of the next packet.
    #[must_use]
    pub fn sequence(&self) -> u16 {
        self.counters.sequence()
    }

    /// RTP timestamp of the next packet.
    #[must_use]
    pub fn timestamp(&self) -> u32 {
        self.counters.timestamp()
    }

    /// Moves the sequence on by one, and the timestamp by `frame_size` samples.
    pub fn advance(&mut self, frame_size: u32) {
        self.counters.advance(frame_size);
    }

    /// Whether the socket is still open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    /// Whether a secret key has been installed.
    #[must_use]
    pub fn is_keyed(&self) -> bool {
        self.cipher.is_some()
    }

    /// Installs the secret key from the voice server's session description,
    /// after which [`send_encrypted`] may be used.
    ///
    /// The first key sticks: later calls are ignored.
    ///
    /// [`send_encrypted`]: UdpTransport::send_encrypted
    pub fn set_secret_key(&mut self, secret_key: &[u8]) -> Result<()> {
        if self.cipher.is_some() {
            debug!("Secret key already installed; ignoring replacement.");
            return Ok(());
        }

        self.cipher = Some(
            self.crypto_mode
                .cipher(secret_key)
                .ok_or(Error::CryptoInvalidLength)?,
        );

        Ok(())
    }

    /// Encrypts `payload` under the current header and sends it as one datagram.
    pub async fn send_encrypted(&mut self, payload: &[u8]) -> Result<()> {
        let (Some(socket), Some(cipher)) = (&self.socket, &self.cipher) else {
            return Err(Error::NotConnected);
        };

        let header = rtp_header(
            self.counters.sequence(),
            self.counters.timestamp(),
            self.ssrc,
        );

        self.crypto_mode
            .encrypt_packet(cipher, &header, payload, &mut self.packet)?;
        socket.send_to(&self.packet, self.remote).await?;

        Ok(())
    }

    /// Stops the receive loop, forgets the key and releases the socket.
    ///
    /// Calling this more than once has no further effect.
    pub fn disconnect(&mut self) {
        if let Some(task) = self.rx_task.take() {
            task.abort();
        }

        self.cipher = None;

        if self.socket.take().is_some() {
            debug!("UDP transport to {} closed.", self.remote);
        }
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UdpTransport")
            .field("remote", &self.remote)
            .field("ssrc", &self.ssrc)
            .field("counters", &self.counters)
            .field("crypto_mode", &self.crypto_mode)
            .field("keyed", &self.cipher.is_some())
            .field("connected", &self.socket.is_some())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;
    use byteorder::LittleEndian;

    /// Answers one discovery request on `server` as a voice server would,
    /// returning the SSRC it carried.
    pub(crate) async fn answer_discovery(server: &UdpSocket, ip: &str, port: u16) -> u32 {
        let mut buf = [0u8; DISCOVERY_PACKET_LEN];
        let (len, peer) = server.recv_from(&mut buf).await.unwrap();
        assert_eq!(len, DISCOVERY_PACKET_LEN);
        let ssrc = BigEndian::read_u32(&buf[..4]);

        let mut resp = [0u8; DISCOVERY_PACKET_LEN];
        resp[..4].copy_from_slice(&buf[..4]);
        resp[4..4 + ip.len()].copy_from_slice(ip.as_bytes());
        LittleEndian::write_u16(&mut resp[DISCOVERY_PACKET_LEN - 2..], port);
        server.send_to(&resp, peer).await.unwrap();

        ssrc
    }
}

#[cfg(test)]
mod tests {
    use super::{test_util::answer_discovery, *};
    use crate::driver::crypto::test_util::decrypt_packet;

    async fn loopback() -> (UdpSocket, u16) {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();
        (server, port)
    }

    #[tokio::test]
    async fn discovery_reports_external_address() {
        let (server, port) = loopback().await;
        let responder = tokio::spawn(async move { answer_discovery(&server, "203.0.113.7", 51000).await });

        let (transport, ip, ext_port) = UdpTransport::discover(
            "127.0.0.1",
            port,
            0xABCD,
            CryptoMode::Normal,
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(responder.await.unwrap(), 0xABCD);
        assert_eq!(ip, "203.0.113.7".parse::<IpAddr>().unwrap());
        assert_eq!(ext_port, 51000);
        assert!(transport.is_connected());
        assert!(!transport.is_keyed());
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let (_server, port) = loopback().await;

        let res = UdpTransport::discover(
            "127.0.0.1",
            port,
            1,
            CryptoMode::Normal,
            Duration::from_millis(100),
        )
        .await;

        assert!(matches!(res, Err(Error::DiscoveryTimeout)));
    }

    #[tokio::test]
    async fn sends_encrypted_frames_without_advancing() {
        let (server, port) = loopback().await;
        let responder = tokio::spawn(async move {
            answer_discovery(&server, "127.0.0.1", 4000).await;
            server
        });

        let (mut transport, _, _) = UdpTransport::discover(
            "127.0.0.1",
            port,
            77,
            CryptoMode::Normal,
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        let server = responder.await.unwrap();

        assert!(matches!(
            transport.send_encrypted(b"early").await,
            Err(Error::NotConnected)
        ));

        transport.set_secret_key(&[9u8; 32]).unwrap();
        transport.send_encrypted(b"frame-one").await.unwrap();
        transport.send_encrypted(b"frame-one-again").await.unwrap();
        transport.advance(960);
        transport.send_encrypted(b"frame-two").await.unwrap();

        let cipher = CryptoMode::Normal.cipher(&[9u8; 32]).unwrap();
        let mut buf = [0u8; VOICE_PACKET_MAX];
        let mut headers = vec![];
        for expected in [&b"frame-one"[..], b"frame-one-again", b"frame-two"] {
            let (len, _) = server.recv_from(&mut buf).await.unwrap();
            assert_eq!(decrypt_packet(&cipher, &buf[..len]).unwrap(), expected);
            headers.push(buf[..RTP_HEADER_LEN].to_vec());
        }

        assert_eq!(headers[0], rtp_header(0, 0, 77));
        assert_eq!(headers[1], rtp_header(0, 0, 77));
        assert_eq!(headers[2], rtp_header(1, 960, 77));
    }

    #[tokio::test]
    async fn keys_are_length_checked_and_never_replaced() {
        let (server, port) = loopback().await;
        let responder = tokio::spawn(async move {
            answer_discovery(&server, "127.0.0.1", 4000).await;
            server
        });

        let (mut transport, _, _) = UdpTransport::discover(
            "127.0.0.1",
            port,
            5,
            CryptoMode::Normal,
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        let server = responder.await.unwrap();

        assert!(matches!(
            transport.set_secret_key(&[3u8; 16]),
            Err(Error::CryptoInvalidLength)
        ));
        assert!(!transport.is_keyed());

        transport.set_secret_key(&[3u8; 32]).unwrap();
        transport.set_secret_key(&[4u8; 32]).unwrap();
        transport.send_encrypted(b"keyed").await.unwrap();

        let mut buf = [0u8; VOICE_PACKET_MAX];
        let (len, _) = server.recv_from(&mut buf).await.unwrap();
        let first = CryptoMode::Normal.cipher(&[3u8; 32]).unwrap();
        assert_eq!(decrypt_packet(&first, &buf[..len]).unwrap(), b"keyed");
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let (server, port) = loopback().await;
        tokio::spawn(async move { answer_discovery(&server, "127.0.0.1", 4000).await });

        let (mut transport, _, _) = UdpTransport::discover(
            "127.0.0.1",
            port,
            1,
            CryptoMode::Normal,
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        transport.set_secret_key(&[1u8; 32]).unwrap();

        transport.disconnect();
        transport.disconnect();

        assert!(!transport.is_connected());
        assert!(!transport.is_keyed());
        assert!(matches!(
            transport.send_encrypted(b"late").await,
            Err(Error::NotConnected)
        ));
    }
}
