//! Per-frame AES-256-CBC encryption with an HMAC-SHA256 trailer, keyed by an
//! ECDH-derived shared secret.
//!
//! Referentially transparent like the reference crate's message-key
//! encryption: the only inputs are the keys, the sequence number, and the
//! bytes to seal. The IV is derived from the sequence number instead of
//! drawn from an RNG (see the decision recorded for SPEC_FULL.md Open
//! Question 5), so two calls with the same sequence number and plaintext
//! always produce the same ciphertext - useful for deterministic tests, and
//! safe here because a session never reuses a sequence number.

use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::errors::{CryptoError, Result};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// HMAC trailer length this implementation negotiates (`ConnectResponse.hmac_size`).
pub const HMAC_SIZE: usize = 32;

const ENC_KEY_INFO: &[u8] = b"cdp-session-core/v1/enc";
const MAC_KEY_INFO: &[u8] = b"cdp-session-core/v1/mac";

/// AES-256-CBC + HMAC-SHA256 over a single session's shared secret.
///
/// Holds two keys split from the ECDH shared secret via HKDF-SHA256: one for
/// AES, one for HMAC and IV derivation. Never constructed directly from
/// caller-supplied key bytes; always via [`Cryptor::new`] from the output of
/// [`crate::EncryptionInfo::generate_shared_secret`].
pub struct Cryptor {
    enc_key: [u8; 32],
    mac_key: [u8; 32],
}

impl Cryptor {
    /// Split a 32-byte shared secret into independent AES and HMAC keys.
    #[must_use]
    pub fn new(shared_secret: &[u8; 32]) -> Self {
        let hkdf = Hkdf::<Sha256>::new(None, shared_secret);
        let mut enc_key = [0u8; 32];
        let mut mac_key = [0u8; 32];
        #[allow(clippy::expect_used)]
        hkdf.expand(ENC_KEY_INFO, &mut enc_key).expect("32 bytes is a valid HKDF-SHA256 output length");
        #[allow(clippy::expect_used)]
        hkdf.expand(MAC_KEY_INFO, &mut mac_key).expect("32 bytes is a valid HKDF-SHA256 output length");
        Self { enc_key, mac_key }
    }

    fn derive_iv(&self, sequence_number: u32) -> [u8; 16] {
        #[allow(clippy::expect_used)]
        let mut mac = HmacSha256::new_from_slice(&self.mac_key).expect("HMAC accepts keys of any length");
        mac.update(&sequence_number.to_be_bytes());
        let mut iv = [0u8; 16];
        iv.copy_from_slice(&mac.finalize().into_bytes()[..16]);
        iv
    }

    /// Encrypt `plaintext` under the sequence-derived IV. Returns ciphertext
    /// only; pair with [`Self::seal_hmac`] to get the trailer.
    #[must_use]
    pub fn encrypt(&self, plaintext: &[u8], sequence_number: u32) -> Vec<u8> {
        let iv = self.derive_iv(sequence_number);
        Aes256CbcEnc::new((&self.enc_key).into(), (&iv).into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
    }

    /// Compute the HMAC trailer over `associated_data || ciphertext`,
    /// truncated to `hmac_size` bytes.
    ///
    /// `associated_data` is the fully-formed outbound header plus
    /// additional-header TLVs (see `cdp-core::session`); it binds the
    /// trailer to exactly what's on the wire, not just the payload.
    #[must_use]
    pub fn seal_hmac(&self, associated_data: &[u8], ciphertext: &[u8], hmac_size: usize) -> Vec<u8> {
        #[allow(clippy::expect_used)]
        let mut mac = HmacSha256::new_from_slice(&self.mac_key).expect("HMAC accepts keys of any length");
        mac.update(associated_data);
        mac.update(ciphertext);
        let full = mac.finalize().into_bytes();
        full[..hmac_size.min(HMAC_SIZE)].to_vec()
    }

    /// Verify the HMAC trailer and decrypt `ciphertext`.
    ///
    /// # Errors
    ///
    /// [`CryptoError::AuthenticationFailed`] if the trailer doesn't match
    /// (constant-time compare), or [`CryptoError::MalformedCiphertext`] if
    /// the ciphertext isn't validly padded once decrypted.
    pub fn decrypt(
        &self,
        associated_data: &[u8],
        ciphertext: &[u8],
        hmac_trailer: &[u8],
        sequence_number: u32,
    ) -> Result<Vec<u8>> {
        let expected = self.seal_hmac(associated_data, ciphertext, hmac_trailer.len());
        if !bool::from(expected.as_slice().ct_eq(hmac_trailer)) {
            return Err(CryptoError::AuthenticationFailed);
        }

        let iv = self.derive_iv(sequence_number);
        Aes256CbcDec::new((&self.enc_key).into(), (&iv).into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| CryptoError::MalformedCiphertext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cryptor() -> Cryptor {
        Cryptor::new(&[0x42; 32])
    }

    #[test]
    fn encrypt_decrypt_round_trips() {
        let c = cryptor();
        let plaintext = b"hello connected devices";
        let ciphertext = c.encrypt(plaintext, 1);
        let hmac = c.seal_hmac(b"header-bytes", &ciphertext, HMAC_SIZE);

        let decrypted = c.decrypt(b"header-bytes", &ciphertext, &hmac, 1).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn empty_plaintext_round_trips() {
        let c = cryptor();
        let ciphertext = c.encrypt(b"", 0);
        let hmac = c.seal_hmac(b"", &ciphertext, HMAC_SIZE);
        assert_eq!(c.decrypt(b"", &ciphertext, &hmac, 0).unwrap(), b"");
    }

    #[test]
    fn same_sequence_and_plaintext_produce_identical_ciphertext() {
        let c = cryptor();
        assert_eq!(c.encrypt(b"repeat me", 7), c.encrypt(b"repeat me", 7));
    }

    #[test]
    fn different_sequence_numbers_change_ciphertext() {
        let c = cryptor();
        assert_ne!(c.encrypt(b"repeat me", 7), c.encrypt(b"repeat me", 8));
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let c = cryptor();
        let mut ciphertext = c.encrypt(b"integrity matters", 3);
        let hmac = c.seal_hmac(b"aad", &ciphertext, HMAC_SIZE);
        ciphertext[0] ^= 0xFF;

        assert_eq!(c.decrypt(b"aad", &ciphertext, &hmac, 3), Err(CryptoError::AuthenticationFailed));
    }

    #[test]
    fn tampered_associated_data_fails_authentication() {
        let c = cryptor();
        let ciphertext = c.encrypt(b"bound to the header", 5);
        let hmac = c.seal_hmac(b"original-header", &ciphertext, HMAC_SIZE);

        assert_eq!(
            c.decrypt(b"different-header", &ciphertext, &hmac, 5),
            Err(CryptoError::AuthenticationFailed)
        );
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let c = cryptor();
        let other = Cryptor::new(&[0x99; 32]);
        let ciphertext = c.encrypt(b"secret", 1);
        let hmac = c.seal_hmac(b"aad", &ciphertext, HMAC_SIZE);

        assert_eq!(other.decrypt(b"aad", &ciphertext, &hmac, 1), Err(CryptoError::AuthenticationFailed));
    }

    #[test]
    fn truncated_hmac_size_is_honored_on_both_sides() {
        let c = cryptor();
        let ciphertext = c.encrypt(b"short trailer", 2);
        let hmac = c.seal_hmac(b"aad", &ciphertext, 16);
        assert_eq!(hmac.len(), 16);
        assert_eq!(c.decrypt(b"aad", &ciphertext, &hmac, 2).unwrap(), b"short trailer");
    }
}
