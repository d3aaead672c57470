// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Jump Tunnel Contributors

// Network utility functions

use std::net::{Ipv4Addr, SocketAddr};

use tokio::net::TcpListener;

/// Interface every local forward is bound on
pub const LOCALHOST: Ipv4Addr = Ipv4Addr::LOCALHOST;

/// Join host and port, bracketing IPv6 literals ("[::1]:22")
pub fn format_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Probe whether a local TCP port can currently be bound
///
/// The probe socket is released immediately, so the answer may be stale by
/// the time the caller binds for real.
pub fn is_port_available(port: u16) -> bool {
    std::net::TcpListener::bind(SocketAddr::from((LOCALHOST, port))).is_ok()
}

/// Bind a listening socket on the loopback interface
pub async fn bind_listener(port: u16) -> std::io::Result<TcpListener> {
    TcpListener::bind(SocketAddr::from((LOCALHOST, port))).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_host_port() {
        assert_eq!(format_host_port("example.com", 22), "example.com:22");
        assert_eq!(format_host_port("10.0.0.5", 443), "10.0.0.5:443");
        assert_eq!(format_host_port("::1", 22), "[::1]:22");
        assert_eq!(format_host_port("[::1]", 22), "[::1]:22");
    }

    #[tokio::test]
    async fn test_port_availability_follows_listener() {
        let listener = bind_listener(0).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(!is_port_available(port));

        drop(listener);
        assert!(is_port_available(port));
    }

    #[tokio::test]
    async fn test_bind_listener_is_loopback() {
        let listener = bind_listener(0).await.unwrap();
        assert!(listener.local_addr().unwrap().ip().is_loopback());
    }
}
