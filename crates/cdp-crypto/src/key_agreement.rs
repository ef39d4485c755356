//! ECDH key agreement on P-256, plus the HKDF-SHA256 shared-secret and
//! device-authentication-thumbprint derivations built on top of it.
//!
//! Mirrors the reference crate's pure-function philosophy: key generation
//! takes caller-supplied randomness (`cdp_core::Environment::random_bytes`
//! is the production source) instead of reaching for an RNG internally, so
//! the whole handshake stays deterministic under test.

use hkdf::Hkdf;
use p256::{PublicKey, SecretKey, ecdh::diffie_hellman, elliptic_curve::sec1::ToEncodedPoint};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::errors::{CryptoError, Result};

/// Fixed HKDF `info` string for the session shared-secret derivation.
///
/// Not a wire-compatibility claim (see the decision recorded for SPEC_FULL.md
/// Open Question 1); this implementation's own label.
const SHARED_SECRET_INFO: &[u8] = b"cdp-session-core/v1";

/// An ECDH keypair (or a wrapped remote public key) plus the 64-byte
/// handshake nonce carried alongside it in `ConnectRequest`/`ConnectResponse`.
#[derive(Clone)]
pub struct EncryptionInfo {
    secret_key: Option<SecretKey>,
    public_key: PublicKey,
    nonce: [u8; 64],
}

impl EncryptionInfo {
    /// Generate a fresh local keypair from caller-supplied randomness.
    ///
    /// `scalar_bytes` must be a valid non-zero P-256 scalar; `nonce` is
    /// carried verbatim into the handshake.
    ///
    /// # Errors
    ///
    /// [`CryptoError::InvalidRemotePublicKey`] if `scalar_bytes` isn't a
    /// valid P-256 private scalar (reused here since this is also, in
    /// effect, a malformed-point rejection).
    pub fn create(scalar_bytes: [u8; 32], nonce: [u8; 64]) -> Result<Self> {
        let secret_key =
            SecretKey::from_bytes((&scalar_bytes).into()).map_err(|_| CryptoError::InvalidRemotePublicKey)?;
        let public_key = secret_key.public_key();
        Ok(Self { secret_key: Some(secret_key), public_key, nonce })
    }

    /// Wrap a peer's advertised public key (uncompressed affine coordinates)
    /// and nonce. Holds no secret scalar; only usable as the `remote`
    /// argument to [`Self::generate_shared_secret`].
    ///
    /// # Errors
    ///
    /// [`CryptoError::InvalidRemotePublicKey`] if `(x, y)` isn't a point on
    /// P-256.
    pub fn from_remote(x: [u8; 32], y: [u8; 32], nonce: [u8; 64]) -> Result<Self> {
        let encoded = p256::EncodedPoint::from_affine_coordinates(&x.into(), &y.into(), false);
        let public_key =
            PublicKey::from_sec1_bytes(encoded.as_bytes()).map_err(|_| CryptoError::InvalidRemotePublicKey)?;
        Ok(Self { secret_key: None, public_key, nonce })
    }

    /// This side's 64-byte handshake nonce.
    #[must_use]
    pub fn nonce(&self) -> [u8; 64] {
        self.nonce
    }

    /// This side's public key as uncompressed affine `(x, y)` coordinates.
    #[must_use]
    pub fn public_key_xy(&self) -> ([u8; 32], [u8; 32]) {
        let encoded = self.public_key.to_encoded_point(false);
        let mut x = [0u8; 32];
        let mut y = [0u8; 32];
        #[allow(clippy::expect_used)]
        {
            x.copy_from_slice(encoded.x().expect("uncompressed point always has an x coordinate"));
            y.copy_from_slice(encoded.y().expect("uncompressed point always has a y coordinate"));
        }
        (x, y)
    }

    /// Derive the 32-byte session shared secret: ECDH over `(self, remote)`
    /// followed by HKDF-SHA256, salted by both nonces in a canonical
    /// (lexicographically smaller first) order so both sides of a handshake
    /// derive the same salt regardless of which one is `self`.
    ///
    /// `self` must hold a secret scalar (built via [`Self::create`]);
    /// `remote` supplies only its public key.
    ///
    /// # Errors
    ///
    /// [`CryptoError::KeyDerivationFailed`] if `self` has no secret scalar,
    /// or if HKDF expansion fails (unreachable for a 32-byte output).
    pub fn generate_shared_secret(&self, remote: &Self) -> Result<[u8; 32]> {
        let secret_key = self.secret_key.as_ref().ok_or(CryptoError::KeyDerivationFailed)?;
        let shared_point = diffie_hellman(&secret_key.to_nonzero_scalar(), remote.public_key.as_affine());
        let mut x_coordinate = shared_point.raw_secret_bytes().to_vec();

        // Salt must be identical on both sides of the handshake regardless of which
        // side is `self`, so the two nonces are ordered canonically (lexicographically
        // smaller first) rather than self-first.
        let mut salt = Vec::with_capacity(128);
        if self.nonce <= remote.nonce {
            salt.extend_from_slice(&self.nonce);
            salt.extend_from_slice(&remote.nonce);
        } else {
            salt.extend_from_slice(&remote.nonce);
            salt.extend_from_slice(&self.nonce);
        }

        let hkdf = Hkdf::<Sha256>::new(Some(&salt), &x_coordinate);
        let mut shared_secret = [0u8; 32];
        hkdf.expand(SHARED_SECRET_INFO, &mut shared_secret).map_err(|_| CryptoError::KeyDerivationFailed)?;

        x_coordinate.zeroize();
        Ok(shared_secret)
    }
}

/// Compute the device-authentication thumbprint over `(local_nonce,
/// remote_nonce)`: `SHA-256(local_nonce || remote_nonce)`.
///
/// Unspecified by the source protocol (see the decision recorded for
/// SPEC_FULL.md Open Question 7); this implementation's own choice.
#[must_use]
pub fn compute_thumbprint(local_nonce: &[u8; 64], remote_nonce: &[u8; 64]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(local_nonce);
    hasher.update(remote_nonce);
    hasher.finalize().into()
}
