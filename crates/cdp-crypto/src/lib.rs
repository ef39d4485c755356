//! Connected-devices session-core cryptography.
//!
//! Pure functions with deterministic outputs wherever the protocol allows
//! it. Callers (`cdp-core`, via its `Environment` trait) provide random bytes
//! at the one point randomness is actually needed - key-agreement scalar and
//! nonce generation - so the handshake and the per-frame cryptor stay
//! reproducible under test.
//!
//! # Key lifecycle
//!
//! ```text
//! Environment::random_bytes
//!        │
//!        ▼
//! EncryptionInfo::create → (P-256 keypair, 64-byte nonce)
//!        │
//!        ▼  ECDH(local.secret, remote.public) + HKDF-SHA256(both nonces)
//! generate_shared_secret → 32-byte shared secret
//!        │
//!        ▼  HKDF-SHA256 split
//! Cryptor → (AES-256 key, HMAC-SHA256 key)
//!        │
//!        ▼
//! encrypt / decrypt → per-frame ciphertext + HMAC trailer
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cryptor;
pub mod errors;
pub mod key_agreement;

pub use cryptor::{Cryptor, HMAC_SIZE};
pub use errors::{CryptoError, Result};
pub use key_agreement::{EncryptionInfo, compute_thumbprint};
