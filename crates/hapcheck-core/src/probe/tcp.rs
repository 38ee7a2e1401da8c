//! Raw TCP reachability of the HAP port.

use super::{names, Probe};
use crate::config::ConnectionTarget;
use crate::error::{ProbeError, ProbeResult};
use crate::outcome::ProbeOutcome;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::debug;

/// Marker that identifies an HTTP (and therefore HAP) response.
const PROTOCOL_MARKER: &[u8] = b"HTTP";

/// Connects to the HAP port and checks the peer answers like an HTTP server.
///
/// HAP runs over HTTP/1.1 until pairing switches the session to an encrypted
/// channel, so a plain `GET /` must get some HTTP status line back.
#[derive(Debug, Clone, Default)]
pub struct TcpReachabilityProbe {
    /// Only check that the port accepts connections; send nothing.
    connect_only: bool,
}

impl TcpReachabilityProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plain port check without the request/response exchange.
    pub fn connect_only() -> Self {
        Self { connect_only: true }
    }

    /// Connect, request and read share one deadline `timeout` from now.
    async fn check(&self, target: &ConnectionTarget, timeout: Duration) -> ProbeResult<ProbeOutcome> {
        let deadline = Instant::now() + timeout;
        let addr = format!("{}:{}", target.host, target.hap_port);
        let mut stream = connect(&addr, deadline, timeout).await?;

        if self.connect_only {
            return Ok(ProbeOutcome::pass(format!("{} is accepting connections", addr)));
        }

        let request = format!("GET / HTTP/1.1\r\nHost: {}\r\n\r\n", target.host);
        tokio::time::timeout_at(deadline, stream.write_all(request.as_bytes()))
            .await
            .map_err(|_| ProbeError::Connectivity(format!("write to {} timed out", addr)))?
            .map_err(|e| ProbeError::Connectivity(format!("write to {} failed: {}", addr, e)))?;

        let mut buf = [0u8; 1024];
        let n = match tokio::time::timeout_at(deadline, stream.read(&mut buf)).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                return Err(ProbeError::Connectivity(format!(
                    "read from {} failed: {}",
                    addr, e
                )))
            }
            Err(_) => {
                return Ok(ProbeOutcome::from(ProbeError::Protocol(format!(
                    "non-protocol response: no response from {} within {:?}",
                    addr, timeout
                ))))
            }
        };

        if n == 0 {
            return Ok(ProbeOutcome::from(ProbeError::Protocol(format!(
                "non-protocol response: {} closed the connection without a reply",
                addr
            ))));
        }

        debug!(addr = %addr, bytes = n, "HAP port replied");
        if contains(&buf[..n], PROTOCOL_MARKER) {
            Ok(ProbeOutcome::pass(format!("{} answered with {} bytes of HTTP", addr, n)))
        } else {
            Ok(ProbeOutcome::from(ProbeError::Protocol(format!(
                "non-protocol response: {} bytes from {} without an HTTP header",
                n, addr
            ))))
        }
    }
}

async fn connect(addr: &str, deadline: Instant, timeout: Duration) -> ProbeResult<TcpStream> {
    match tokio::time::timeout_at(deadline, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(ProbeError::Connectivity(format!(
            "cannot connect to {}: {} (error code {})",
            addr,
            e,
            e.raw_os_error()
                .map(|c| c.to_string())
                .unwrap_or_else(|| format!("{:?}", e.kind()))
        ))),
        Err(_) => Err(ProbeError::Connectivity(format!(
            "connection to {} timed out after {:?}",
            addr, timeout
        ))),
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[async_trait]
impl Probe for TcpReachabilityProbe {
    fn name(&self) -> &str {
        names::TCP_CONNECTION
    }

    fn title(&self) -> &str {
        if self.connect_only {
            "HAP port listening"
        } else {
            "TCP connection to HAP port"
        }
    }

    async fn run(&self, target: &ConnectionTarget, timeout: Duration) -> ProbeOutcome {
        self.check(target, timeout).await.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_marker() {
        assert!(contains(b"HTTP/1.1 200 OK\r\n", PROTOCOL_MARKER));
        assert!(contains(b"xxHTTPxx", PROTOCOL_MARKER));
        assert!(!contains(b"SSH-2.0-OpenSSH", PROTOCOL_MARKER));
        assert!(!contains(b"HT", PROTOCOL_MARKER));
    }

    #[tokio::test]
    async fn test_connect_gives_up_at_deadline() {
        // Unroutable: either hangs until the deadline or fails at once.
        let start = std::time::Instant::now();
        let deadline = Instant::now() + Duration::from_millis(200);
        let err = connect("10.255.255.1:51826", deadline, Duration::from_millis(200))
            .await
            .map(|_| ())
            .unwrap_err();
        assert_eq!(err.kind(), "connectivity");
        assert!(start.elapsed() < Duration::from_secs(1), "took {:?}", start.elapsed());
    }

    #[test]
    fn test_titles() {
        assert_eq!(TcpReachabilityProbe::new().name(), "tcp_connection");
        assert_eq!(TcpReachabilityProbe::connect_only().title(), "HAP port listening");
    }
}
