// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Jump Tunnel Contributors

// Resolution, concurrency and teardown behavior of TunnelConnection

use std::collections::HashSet;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use jump_tunnel::test_support::{
    connect_and_read_header, spawn_echo_server, LoopbackConnector, LoopbackSession,
};
use jump_tunnel::{find_free_port, Error, RemoteEndpoint, TunnelConnection, TunnelPhase};
use jump_tunnel_common::is_port_available;

async fn open_tunnel(port_range_start: u16) -> (TunnelConnection, Arc<LoopbackSession>) {
    let echo = spawn_echo_server().await.unwrap();
    let session = LoopbackSession::new(echo);
    let connector = Arc::new(LoopbackConnector::new(session.clone()));
    let tunnel = TunnelConnection::open(connector, port_range_start)
        .await
        .unwrap();
    (tunnel, session)
}

#[tokio::test]
async fn test_repeated_resolve_reuses_forward() {
    let (tunnel, _session) = open_tunnel(32000).await;
    let remote = RemoteEndpoint::new("10.0.0.5", 443);

    let first = tunnel.resolve(&remote).await.unwrap();
    for _ in 0..5 {
        assert_eq!(tunnel.resolve(&remote).await.unwrap(), first);
    }

    assert_eq!(tunnel.forwards().await, vec![(remote, first)]);
    tunnel.close().await;
}

#[tokio::test]
async fn test_resolve_allocates_next_free_port_and_relays() {
    let (tunnel, session) = open_tunnel(32100).await;
    let first_remote = RemoteEndpoint::new("10.0.0.5", 443);
    let second_remote = RemoteEndpoint::new("10.0.0.6", 443);

    let expected_first = find_free_port(32100).unwrap();
    let first = tunnel.resolve(&first_remote).await.unwrap();
    assert_eq!(first.port(), expected_first);
    assert_eq!(first.address(), format!("localhost:{}", expected_first));
    assert_eq!(tunnel.resolve(&first_remote).await.unwrap(), first);

    let expected_second = find_free_port(32100).unwrap();
    assert!(expected_second > expected_first);
    let second = tunnel.resolve(&second_remote).await.unwrap();
    assert_eq!(second.port(), expected_second);

    for (binding, remote) in [(first, &first_remote), (second, &second_remote)] {
        let (header, mut stream) = connect_and_read_header(binding).await.unwrap();
        assert_eq!(header, remote.to_string());

        stream.write_all(b"hello through the jump host").await.unwrap();
        let mut buf = vec![0u8; 27];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, b"hello through the jump host");
    }
    assert_eq!(session.channels_opened(), 2);

    tunnel.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_distinct_endpoints_get_distinct_ports() {
    const RESOLVERS: u8 = 16;
    let (tunnel, _session) = open_tunnel(32200).await;
    let tunnel = Arc::new(tunnel);

    let handles: Vec<_> = (0..RESOLVERS)
        .map(|i| {
            let tunnel = tunnel.clone();
            tokio::spawn(async move {
                let remote = RemoteEndpoint::new(format!("10.0.1.{}", i), 443);
                tunnel.resolve(&remote).await.unwrap()
            })
        })
        .collect();

    let mut ports = HashSet::new();
    for handle in handles {
        ports.insert(handle.await.unwrap().port());
    }

    assert_eq!(ports.len(), RESOLVERS as usize);
    assert_eq!(tunnel.forwards().await.len(), RESOLVERS as usize);
    tunnel.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_same_endpoint_starts_one_forward() {
    let (tunnel, _session) = open_tunnel(32300).await;
    let tunnel = Arc::new(tunnel);
    let remote = RemoteEndpoint::new("db.internal", 5432);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let tunnel = tunnel.clone();
            let remote = remote.clone();
            tokio::spawn(async move { tunnel.resolve(&remote).await.unwrap() })
        })
        .collect();

    let mut bindings = HashSet::new();
    for handle in handles {
        bindings.insert(handle.await.unwrap());
    }

    assert_eq!(bindings.len(), 1);
    assert_eq!(tunnel.forwards().await.len(), 1);
    tunnel.close().await;
}

#[tokio::test]
async fn test_exhausted_range_starts_no_forward() {
    // 65535 alone is the range; hold it (it may already be taken, which is fine)
    let _guard = std::net::TcpListener::bind("127.0.0.1:65535");
    let (tunnel, session) = open_tunnel(u16::MAX).await;

    let err = tunnel
        .resolve(&RemoteEndpoint::new("10.0.0.5", 443))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::PortsExhausted { start: 65535 }));
    assert!(tunnel.forwards().await.is_empty());
    assert_eq!(session.channels_opened(), 0);
    // Exhaustion does not tear the connection down
    assert_eq!(tunnel.phase().await, TunnelPhase::Connected);
    tunnel.close().await;
}

#[tokio::test]
async fn test_close_stops_every_forward() {
    let (tunnel, session) = open_tunnel(32400).await;

    let mut clients = Vec::new();
    let mut bindings = Vec::new();
    for i in 0..4 {
        let binding = tunnel
            .resolve(&RemoteEndpoint::new(format!("10.0.2.{}", i), 8080))
            .await
            .unwrap();
        let (_, stream) = connect_and_read_header(binding).await.unwrap();
        clients.push(stream);
        bindings.push(binding);
    }

    tunnel.close().await;

    assert_eq!(tunnel.phase().await, TunnelPhase::Closed);
    assert!(tunnel.forwards().await.is_empty());
    assert_eq!(session.disconnects(), 1);
    for binding in &bindings {
        assert!(is_port_available(binding.port()), "{} still bound", binding);
    }
    for mut client in clients {
        let mut buf = [0u8; 1];
        assert!(matches!(client.read(&mut buf).await, Ok(0) | Err(_)));
    }
}

#[tokio::test]
async fn test_closed_tunnel_rejects_further_use() {
    let (tunnel, session) = open_tunnel(32500).await;
    let remote = RemoteEndpoint::new("10.0.0.5", 443);
    tunnel.resolve(&remote).await.unwrap();

    tunnel.close().await;
    tunnel.close().await;

    assert!(matches!(tunnel.resolve(&remote).await, Err(Error::Closed)));
    assert!(matches!(tunnel.connect().await, Err(Error::Closed)));
    assert_eq!(session.disconnects(), 1);
}
