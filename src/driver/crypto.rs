//! Encryption schemes supported by Discord's secure RTP negotiation.

use crate::{
    constants::RTP_HEADER_LEN,
    packet::nonce_from_header,
};
use xsalsa20poly1305::{
    aead::{AeadInPlace, Error as CryptoError, KeyInit},
    Nonce,
    XSalsa20Poly1305 as Cipher,
};

/// Length of the Poly1305 authentication tag prefixed to every payload.
pub const TAG_SIZE: usize = 16;

/// Variants of the XSalsa20Poly1305 encryption scheme.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum CryptoMode {
    /// The RTP header is used as the source of nonce bytes for the packet.
    ///
    /// Equivalent to a nonce of at most 48b (6B) at no extra packet overhead:
    /// the RTP sequence number and timestamp are the varying quantities.
    #[default]
    Normal,
}

impl CryptoMode {
    /// Returns the name of a mode as it will appear during negotiation.
    #[must_use]
    pub fn to_request_str(self) -> &'static str {
        match self {
            CryptoMode::Normal => "xsalsa20_poly1305",
        }
    }

    /// Calculates the number of additional bytes required compared
    /// to an unencrypted payload.
    #[must_use]
    pub fn payload_overhead(self) -> usize {
        TAG_SIZE
    }

    /// Builds a cipher from server-provided key material.
    pub(crate) fn cipher(self, secret_key: &[u8]) -> Option<Cipher> {
        Cipher::new_from_slice(secret_key).ok()
    }

    /// Writes `header ++ tag ++ ciphertext(payload)` into `out`.
    ///
    /// The nonce is derived from `header`, matching the NaCl secretbox layout
    /// Discord expects.
    pub(crate) fn encrypt_packet(
        self,
        cipher: &Cipher,
        header: &[u8; RTP_HEADER_LEN],
        payload: &[u8],
        out: &mut Vec<u8>,
    ) -> Result<(), CryptoError> {
        let nonce = nonce_from_header(header);

        out.clear();
        out.reserve(RTP_HEADER_LEN + self.payload_overhead() + payload.len());
        out.extend_from_slice(header);
        out.extend_from_slice(&[0u8; TAG_SIZE]);
        out.extend_from_slice(payload);

        let (head, body) = out.split_at_mut(RTP_HEADER_LEN + TAG_SIZE);
        let tag = cipher.encrypt_in_place_detached(Nonce::from_slice(&nonce), b"", body)?;
        head[RTP_HEADER_LEN..].copy_from_slice(&tag);

        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::{test_util::decrypt_packet, *};
    use crate::packet::rtp_header;

    #[test]
    fn symmetric_encrypt_decrypt() {
        const TRUE_PAYLOAD: [u8; 8] = [1, 2, 3, 4, 5, 6, 7, 8];
        let mode = CryptoMode::Normal;
        let cipher = mode.cipher(&[7u8; 32]).unwrap();
        let header = rtp_header(1, 960, 42);

        let mut pkt = vec![];
        mode.encrypt_packet(&cipher, &header, &TRUE_PAYLOAD, &mut pkt)
            .unwrap();

        assert_eq!(pkt.len(), RTP_HEADER_LEN + TAG_SIZE + TRUE_PAYLOAD.len());
        assert_eq!(&pkt[..RTP_HEADER_LEN], &header[..]);
        assert_ne!(&pkt[RTP_HEADER_LEN + TAG_SIZE..], &TRUE_PAYLOAD[..]);
        assert_eq!(decrypt_packet(&cipher, &pkt).unwrap(), TRUE_PAYLOAD);
    }

    #[test]
    fn tampered_header_fails_authentication() {
        let mode = CryptoMode::Normal;
        let cipher = mode.cipher(&[3u8; 32]).unwrap();

        let mut pkt = vec![];
        mode.encrypt_packet(&cipher, &rtp_header(5, 5, 5), b"opus", &mut pkt)
            .unwrap();
        pkt[3] ^= 1;

        assert!(decrypt_packet(&cipher, &pkt).is_err());
    }

    #[test]
    fn short_keys_are_rejected() {
        assert!(CryptoMode::Normal.cipher(&[0u8; 16]).is_none());
    }

    #[test]
    fn mode_names_match_negotiation() {
        assert_eq!(CryptoMode::Normal.to_request_str(), "xsalsa20_poly1305");
    }
}
