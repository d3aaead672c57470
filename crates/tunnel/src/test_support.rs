// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Jump Tunnel Contributors

//! Test utilities: an in-process stand-in for the SSH session.
//!
//! [`LoopbackSession`] "forwards" every channel to a local echo server and
//! first writes the requested remote endpoint followed by a newline, so a
//! test connecting to a forward reads back which endpoint it reached before
//! its own bytes are echoed.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use jump_tunnel_common::{Error, LocalBinding, RemoteEndpoint, Result};

use crate::session::{ForwardStream, ForwardingSession, SessionConnector};

/// Session double relaying every channel to a fixed local address
#[derive(Debug)]
pub struct LoopbackSession {
    target: SocketAddr,
    channels_opened: AtomicUsize,
    fail_channels: AtomicBool,
    disconnects: AtomicUsize,
}

impl LoopbackSession {
    pub fn new(target: SocketAddr) -> Arc<Self> {
        Arc::new(Self {
            target,
            channels_opened: AtomicUsize::new(0),
            fail_channels: AtomicBool::new(false),
            disconnects: AtomicUsize::new(0),
        })
    }

    /// Number of channel open attempts, failed ones included
    pub fn channels_opened(&self) -> usize {
        self.channels_opened.load(Ordering::SeqCst)
    }

    /// Make subsequent channel opens fail like a remote refusal would
    pub fn fail_channels(&self, fail: bool) {
        self.fail_channels.store(fail, Ordering::SeqCst);
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ForwardingSession for LoopbackSession {
    async fn open_forward_channel(
        &self,
        remote: &RemoteEndpoint,
        _originator: SocketAddr,
    ) -> Result<Box<dyn ForwardStream>> {
        self.channels_opened.fetch_add(1, Ordering::SeqCst);
        if self.fail_channels.load(Ordering::SeqCst) {
            return Err(Error::SshConnection(format!(
                "channel to {} administratively prohibited",
                remote
            )));
        }

        let mut stream = TcpStream::connect(self.target).await?;
        stream.write_all(format!("{}\n", remote).as_bytes()).await?;
        Ok(Box::new(stream))
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector handing out one shared [`LoopbackSession`]
pub struct LoopbackConnector {
    session: Arc<LoopbackSession>,
    connects: AtomicUsize,
}

impl LoopbackConnector {
    pub fn new(session: Arc<LoopbackSession>) -> Self {
        Self {
            session,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionConnector for Arc<LoopbackConnector> {
    async fn connect(&self) -> Result<Arc<dyn ForwardingSession>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.session.clone())
    }

    fn describe(&self) -> String {
        format!("loopback:{}", self.session.target)
    }
}

/// Echo server on an ephemeral loopback port
pub async fn spawn_echo_server() -> std::io::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });

    Ok(addr)
}

/// Connect to a forward and read the endpoint header written by [`LoopbackSession`]
pub async fn connect_and_read_header(
    binding: LocalBinding,
) -> std::io::Result<(String, TcpStream)> {
    let stream = TcpStream::connect(binding.socket_addr()).await?;
    let mut reader = BufReader::new(stream);

    let mut header = String::new();
    reader.read_line(&mut header).await?;
    if !header.ends_with('\n') {
        return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof));
    }
    header.pop();

    // Nothing else is echoed until the caller writes, so the buffer is empty
    Ok((header, reader.into_inner()))
}
