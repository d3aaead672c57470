// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Jump Tunnel Contributors

// Jump Tunnel - Port Allocation
// Finds the first locally bindable port at or above a configured start

use jump_tunnel_common::{is_port_available, Error, Result};
use tracing::debug;

/// Scan upward from `start` to 65535 for a port that can be bound right now
pub fn find_free_port(start: u16) -> Result<u16> {
    if start == 0 {
        return Err(Error::Config(
            "Port range start must be greater than 0".to_string(),
        ));
    }

    let port = (start..=u16::MAX)
        .find(|port| is_port_available(*port))
        .ok_or(Error::PortsExhausted { start })?;

    debug!("Found free local port {} (scan started at {})", port, start);
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_skips_occupied_port() {
        // The held port must be stepped over
        let first = TcpListener::bind("127.0.0.1:0").unwrap();
        let start = first.local_addr().unwrap().port();

        let port = find_free_port(start).unwrap();
        assert!(port > start);
    }

    #[test]
    fn test_exhausted_range() {
        // 65535 is the whole range; occupy it (or find it already occupied)
        let _guard = TcpListener::bind("127.0.0.1:65535");

        let err = find_free_port(u16::MAX).unwrap_err();
        assert!(matches!(err, Error::PortsExhausted { start: 65535 }));
    }

    #[test]
    fn test_zero_start_rejected() {
        assert!(matches!(find_free_port(0), Err(Error::Config(_))));
    }
}
