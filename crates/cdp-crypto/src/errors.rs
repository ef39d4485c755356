//! Key-agreement and frame-encryption errors.

use thiserror::Error;

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors raised while deriving key material or sealing/opening a frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// The remote party's advertised public key isn't a valid point on P-256.
    #[error("remote public key is not a valid P-256 point")]
    InvalidRemotePublicKey,

    /// HKDF was asked to expand to an output length it can't produce.
    #[error("HKDF expand failed: output too long for the underlying hash")]
    KeyDerivationFailed,

    /// HMAC verification failed: the frame was tampered with, the keys are
    /// mismatched, or the associated data the caller supplied doesn't match
    /// what the sender used.
    #[error("HMAC verification failed")]
    AuthenticationFailed,

    /// Ciphertext length isn't a multiple of the AES block size, or is too
    /// short to contain valid PKCS#7 padding.
    #[error("ciphertext is malformed: not a valid padded block sequence")]
    MalformedCiphertext,
}
