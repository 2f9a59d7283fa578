// Copyright 2025 Dustin McAfee
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Transport plumbing for a client session.
//!
//! The session core never touches a socket. Outbound, every component
//! writes through a [`MessageSink`]: a fire-and-forget byte queue that
//! preserves send order and fails with
//! [`RfbError::Disconnected`] once the transport is torn down. Inbound,
//! [`VncConnection`] owns the TCP stream and pumps received segments into
//! the state machine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use log::{error, info};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::client::RfbClient;
use crate::config::ClientConfig;
use crate::controller::InputHandle;
use crate::error::{Result, RfbError};
use crate::observer::RfbObserver;

/// Fire-and-forget outbound byte queue shared by the session components.
///
/// Sends are serialized in the order they are issued; the connection driver
/// drains the queue onto the socket. Cloning yields another handle to the
/// same queue.
#[derive(Debug, Clone)]
pub struct MessageSink {
    tx: mpsc::UnboundedSender<Bytes>,
    connected: Arc<AtomicBool>,
}

impl MessageSink {
    /// Creates a sink and the receiver the connection driver drains.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self { tx, connected: Arc::new(AtomicBool::new(true)) };
        (sink, rx)
    }

    /// Queues bytes for transmission.
    ///
    /// # Errors
    ///
    /// Fails with [`RfbError::Disconnected`] once the transport has closed.
    pub fn send(&self, data: Bytes) -> Result<()> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(RfbError::Disconnected);
        }
        self.tx.send(data).map_err(|_| RfbError::Disconnected)
    }

    /// Marks the transport closed. Idempotent; subsequent sends fail.
    pub fn close(&self) {
        self.connected.store(false, Ordering::Release);
    }

    /// Whether the transport is still up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

/// A VNC client connection over TCP.
///
/// Construct with [`VncConnection::connect`], then drive the session with
/// [`VncConnection::run`]. One connection is one session; dropping the
/// connection tears both down.
pub struct VncConnection {
    stream: TcpStream,
    client: RfbClient,
    outbound: mpsc::UnboundedReceiver<Bytes>,
}

impl VncConnection {
    /// Connects to a VNC server and prepares a client session with the
    /// given observer attached.
    ///
    /// Nagle's algorithm is disabled so input events reach the server
    /// immediately.
    ///
    /// # Arguments
    ///
    /// * `host` - Server host name or address.
    /// * `port` - Server port (conventionally 5900).
    /// * `config` - Session configuration.
    /// * `observer` - Receives framebuffer updates for this session.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from establishing the TCP connection.
    pub async fn connect(
        host: &str,
        port: u16,
        config: ClientConfig,
        observer: Box<dyn RfbObserver>,
    ) -> Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        info!("Connected to {}:{}", host, port);

        let (sink, outbound) = MessageSink::channel();
        let mut client = RfbClient::new(config, sink);
        client.add_observer(observer);
        client.on_connect();
        Ok(Self { stream, client, outbound })
    }

    /// The session state machine (for negotiated parameters).
    #[must_use]
    pub fn session(&self) -> &RfbClient {
        &self.client
    }

    /// An attached input handle for application code.
    #[must_use]
    pub fn input_handle(&self) -> InputHandle {
        self.client.controller().input_handle()
    }

    /// Drives the session until the server disconnects or a protocol
    /// error terminates it.
    ///
    /// Inbound segments are fed to the state machine as they arrive;
    /// outbound messages are written in the order they were queued.
    ///
    /// # Errors
    ///
    /// Returns the session's fatal error, or any I/O error from the
    /// socket. A clean server-side close returns `Ok(())`.
    pub async fn run(mut self) -> Result<()> {
        let mut buf = BytesMut::with_capacity(4096);
        loop {
            tokio::select! {
                result = self.stream.read_buf(&mut buf) => {
                    if result? == 0 {
                        info!("Server closed the connection");
                        self.client.on_disconnect();
                        return Ok(());
                    }
                    let segment = buf.split();
                    if let Err(e) = self.client.on_bytes(&segment) {
                        error!("Session terminated: {e}");
                        self.client.on_disconnect();
                        return Err(e);
                    }
                }
                message = self.outbound.recv() => {
                    match message {
                        Some(bytes) => self.stream.write_all(&bytes).await?,
                        None => return Ok(()),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        self, PixelFormat, Rectangle, ServerInit, ENCODING_RAW, SECURITY_TYPE_NONE,
    };
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    #[test]
    fn test_sink_sends_in_order() {
        let (sink, mut rx) = MessageSink::channel();
        sink.send(Bytes::from_static(&[1])).unwrap();
        sink.send(Bytes::from_static(&[2])).unwrap();
        assert_eq!(&rx.try_recv().unwrap()[..], &[1]);
        assert_eq!(&rx.try_recv().unwrap()[..], &[2]);
    }

    #[test]
    fn test_sink_close_is_idempotent_and_fails_sends() {
        let (sink, _rx) = MessageSink::channel();
        assert!(sink.is_connected());
        sink.close();
        sink.close();
        assert!(!sink.is_connected());
        match sink.send(Bytes::from_static(&[0])) {
            Err(RfbError::Disconnected) => {}
            other => panic!("expected Disconnected, got {:?}", other),
        }
    }

    #[test]
    fn test_clones_share_the_connected_flag() {
        let (sink, _rx) = MessageSink::channel();
        let clone = sink.clone();
        sink.close();
        assert!(!clone.is_connected());
    }

    struct Recorder {
        log: Arc<Mutex<Vec<(u16, u16, Vec<u8>)>>>,
    }

    impl RfbObserver for Recorder {
        fn on_update(
            &mut self,
            width: u16,
            height: u16,
            _x: u16,
            _y: u16,
            _pixel_format: &PixelFormat,
            _encoding: i32,
            data: &[u8],
        ) {
            self.log.lock().unwrap().push((width, height, data.to_vec()));
        }
    }

    /// Full handshake and one Raw update against an in-process server.
    #[tokio::test]
    async fn test_loopback_session_delivers_rectangle() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();

            stream.write_all(b"RFB 003.008\n").await.unwrap();
            let mut echo = [0u8; 12];
            stream.read_exact(&mut echo).await.unwrap();
            assert_eq!(&echo, b"RFB 003.008\n");

            stream.write_all(&[1, SECURITY_TYPE_NONE]).await.unwrap();
            let mut choice = [0u8; 1];
            stream.read_exact(&mut choice).await.unwrap();
            assert_eq!(choice[0], SECURITY_TYPE_NONE);

            stream.write_all(&[0, 0, 0, 0]).await.unwrap();
            let mut shared = [0u8; 1];
            stream.read_exact(&mut shared).await.unwrap();
            assert_eq!(shared[0], 0);

            let mut init = BytesMut::new();
            ServerInit {
                framebuffer_width: 4,
                framebuffer_height: 2,
                pixel_format: PixelFormat::rgba32(),
            }
            .write_to(&mut init);
            stream.write_all(&init).await.unwrap();
            stream.write_all(&[0, 0, 0, 4, b'T', b'e', b's', b't']).await.unwrap();

            // SetPixelFormat (20) + SetEncodings (8) + full update request (10).
            let mut post = [0u8; 38];
            stream.read_exact(&mut post).await.unwrap();
            assert_eq!(
                &post[28..],
                &protocol::framebuffer_update_request_message(false, 0, 0, 4, 2)[..]
            );

            // One full-frame Raw rectangle: 4x2 at 32bpp = 32 bytes.
            stream.write_all(&[0, 0, 0, 1]).await.unwrap();
            let mut update = BytesMut::new();
            Rectangle { x: 0, y: 0, width: 4, height: 2, encoding: ENCODING_RAW }
                .write_header(&mut update);
            stream.write_all(&update).await.unwrap();
            stream.write_all(&[0x5a; 32]).await.unwrap();

            // Consuming the update triggers exactly one incremental request.
            let mut request = [0u8; 10];
            stream.read_exact(&mut request).await.unwrap();
            assert_eq!(
                &request[..],
                &protocol::framebuffer_update_request_message(true, 0, 0, 4, 2)[..]
            );
            // Dropping the stream disconnects the client.
        });

        let log = Arc::new(Mutex::new(Vec::new()));
        let connection = VncConnection::connect(
            &addr.ip().to_string(),
            addr.port(),
            ClientConfig::default(),
            Box::new(Recorder { log: log.clone() }),
        )
        .await
        .unwrap();
        connection.run().await.unwrap();
        server.await.unwrap();

        let updates = log.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!((updates[0].0, updates[0].1), (4, 2));
        assert_eq!(updates[0].2, vec![0x5a; 32]);
    }
}
