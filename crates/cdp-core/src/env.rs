//! Environment abstraction for deterministic testing.
//!
//! Decouples the session core from system resources (time, randomness, the
//! local network address advertised during transport upgrade). This is what
//! lets `cdp-harness` drive the handshake and channel-open scenarios with a
//! seeded, instantly-replayable fake while `cdp-server` supplies real OS
//! entropy and a real clock.

use std::time::Duration;

/// Abstract environment providing time, randomness, and the one piece of
/// platform information the session core needs: its own address.
///
/// # Invariants
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards.
/// - `random_bytes()` uses cryptographically secure entropy in production.
/// - Methods are infallible except in exceptional circumstances (e.g. OS
///   entropy exhaustion).
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`; simulation
    /// environments may use virtual time.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration. The only async method on this
    /// trait; reserved for driver code (reconnect backoff, etc.), never
    /// called from the session state machine itself.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Given the same RNG seed, this produces the same sequence of bytes.
    /// - Uses cryptographically secure RNG in production.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Local address to advertise as the TCP endpoint in an `UpgradeResponse`.
    fn local_ip(&self) -> String;
}
