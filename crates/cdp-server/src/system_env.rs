//! Production [`Environment`] implementation using system time, OS entropy,
//! and the host's outbound-interface address.

use std::{net::UdpSocket, time::Duration};

use cdp_core::Environment;

/// Production environment: real monotonic time, `getrandom` entropy, and a
/// best-effort local IP address for the `UpgradeResponse` TCP endpoint.
#[derive(Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Build a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable - server cannot operate securely");
    }

    fn local_ip(&self) -> String {
        local_ip_best_effort().unwrap_or_else(|| "127.0.0.1".to_string())
    }
}

/// Best-effort discovery of the address this host would use to reach the
/// wider network, via the "connect a UDP socket, read it back" trick (no
/// packets are actually sent; `connect` on a UDP socket only picks a route).
fn local_ip_best_effort() -> Option<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    Some(socket.local_addr().ok()?.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_env_time_advances() {
        let env = SystemEnv::new();
        let t1 = env.now();
        std::thread::sleep(Duration::from_millis(5));
        let t2 = env.now();
        assert!(t2 > t1);
    }

    #[test]
    fn system_env_random_bytes_fills_buffer() {
        let env = SystemEnv::new();
        let mut bytes = [0u8; 64];
        env.random_bytes(&mut bytes);
        assert!(bytes.iter().any(|&b| b != 0));
    }
}
