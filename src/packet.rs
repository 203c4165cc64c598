//! Hand-built voice packet formats: IP discovery and RTP headers.
//!
//! Everything here is pure and allocation-free, so that the transport only
//! has to worry about sockets and keys.

use crate::{constants::*, driver::connection::error::Error};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::{net::IpAddr, num::Wrapping, str::FromStr};

/// Length of an XSalsa20 nonce.
pub const NONCE_LEN: usize = 24;

/// Builds a discovery request: the SSRC (big-endian) followed by zeroes.
#[must_use]
pub fn discovery_request(ssrc: u32) -> [u8; DISCOVERY_PACKET_LEN] {
    let mut bytes = [0u8; DISCOVERY_PACKET_LEN];
    BigEndian::write_u32(&mut bytes[..4], ssrc);
    bytes
}

/// Parses a discovery response into our externally visible address.
///
/// Bytes `[4..len-2]` hold a NUL-terminated ASCII IP, and the final two bytes
/// hold the port (little-endian). The leading four bytes are not inspected.
pub fn parse_discovery_response(bytes: &[u8]) -> Result<(IpAddr, u16), Error> {
    // Need at least one byte of address between the SSRC and the port.
    if bytes.len() < 7 {
        return Err(Error::IllegalDiscoveryResponse);
    }

    let (head, port_bytes) = bytes.split_at(bytes.len() - 2);
    let address_raw = &head[4..];

    let nul_byte_index = address_raw
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(address_raw.len());

    let address_str =
        std::str::from_utf8(&address_raw[..nul_byte_index]).map_err(|_| Error::IllegalIp)?;
    let address = IpAddr::from_str(address_str).map_err(|_| Error::IllegalIp)?;

    Ok((address, LittleEndian::read_u16(port_bytes)))
}

/// Builds the fixed 12-byte RTP header for a voice packet.
#[must_use]
pub fn rtp_header(sequence: u16, timestamp: u32, ssrc: u32) -> [u8; RTP_HEADER_LEN] {
    let mut header = [0u8; RTP_HEADER_LEN];
    header[0] = RTP_VERSION_BYTE;
    header[1] = RTP_PROFILE_TYPE;
    BigEndian::write_u16(&mut header[2..4], sequence);
    BigEndian::write_u32(&mut header[4..8], timestamp);
    BigEndian::write_u32(&mut header[8..12], ssrc);
    header
}

/// Derives a packet nonce: the RTP header padded with zeroes.
///
/// Receivers rebuild this from the header, so it is never transmitted.
#[must_use]
pub fn nonce_from_header(header: &[u8; RTP_HEADER_LEN]) -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    nonce[..RTP_HEADER_LEN].copy_from_slice(header);
    nonce
}

/// RTP sequence number and timestamp of the next packet to be sent.
///
/// Both wrap silently: sequence modulo 2^16, timestamp modulo 2^32.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RtpCounters {
    sequence: Wrapping<u16>,
    timestamp: Wrapping<u32>,
}

impl RtpCounters {
    /// Creates counters starting from the given values.
    #[must_use]
    pub fn new(sequence: u16, timestamp: u32) -> Self {
        Self {
            sequence: Wrapping(sequence),
            timestamp: Wrapping(timestamp),
        }
    }

    /// Current sequence number.
    #[must_use]
    pub fn sequence(&self) -> u16 {
        self.sequence.0
    }

    /// Current timestamp.
    #[must_use]
    pub fn timestamp(&self) -> u32 {
        self.timestamp.0
    }

    /// Moves on to the next packet, which starts `frame_size` samples later.
    pub fn advance(&mut self, frame_size: u32) {
        self.sequence += Wrapping(1);
        self.timestamp += Wrapping(frame_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_for(ip: &str, port: u16) -> [u8; DISCOVERY_PACKET_LEN] {
        let mut bytes = [0u8; DISCOVERY_PACKET_LEN];
        BigEndian::write_u32(&mut bytes[..4], 0xDEAD_BEEF);
        bytes[4..4 + ip.len()].copy_from_slice(ip.as_bytes());
        LittleEndian::write_u16(&mut bytes[DISCOVERY_PACKET_LEN - 2..], port);
        bytes
    }

    #[test]
    fn discovery_request_layout() {
        let req = discovery_request(0x0102_0304);
        assert_eq!(req.len(), 70);
        assert_eq!(&req[..4], &[1, 2, 3, 4]);
        assert!(req[4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn discovery_response_parses_back() {
        let (ip, port) = parse_discovery_response(&response_for("203.0.113.7", 51000)).unwrap();
        assert_eq!(ip, "203.0.113.7".parse::<IpAddr>().unwrap());
        assert_eq!(port, 51000);
    }

    #[test]
    fn discovery_response_ignores_leading_bytes() {
        let mut resp = response_for("10.0.0.1", 1);
        resp[..4].copy_from_slice(&[9, 9, 9, 9]);
        assert!(parse_discovery_response(&resp).is_ok());
    }

    #[test]
    fn discovery_response_rejects_garbage() {
        assert!(matches!(
            parse_discovery_response(&[0u8; 4]),
            Err(Error::IllegalDiscoveryResponse)
        ));
        assert!(matches!(
            parse_discovery_response(&response_for("not-an-ip", 80)),
            Err(Error::IllegalIp)
        ));
    }

    #[test]
    fn rtp_header_is_big_endian() {
        let header = rtp_header(0x0102, 0x0304_0506, 0x0708_090A);
        assert_eq!(header, [0x80, 0x78, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
    }

    #[test]
    fn nonce_pads_header_with_zeroes() {
        for header in [
            rtp_header(0, 0, 0),
            rtp_header(u16::MAX, u32::MAX, u32::MAX),
            rtp_header(513, 960, 42),
        ] {
            let nonce = nonce_from_header(&header);
            assert_eq!(nonce.len(), 24);
            assert_eq!(&nonce[..12], &header[..]);
            assert_eq!(&nonce[12..], &[0u8; 12]);
        }
    }

    #[test]
    fn counters_wrap() {
        for (seq, ts, n) in [
            (0u16, 0u32, 10u32),
            (u16::MAX - 3, u32::MAX - 960, 7),
            (40_000, 4_000_000_000, 70_000),
        ] {
            let mut counters = RtpCounters::new(seq, ts);
            for _ in 0..n {
                counters.advance(960);
            }

            assert_eq!(
                u32::from(counters.sequence()),
                (u32::from(seq) + n) % 65_536
            );
            assert_eq!(
                u64::from(counters.timestamp()),
                (u64::from(ts) + u64::from(n) * 960) % (1 << 32)
            );
        }
    }
}
