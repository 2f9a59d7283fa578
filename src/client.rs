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

//! VNC client session state machine.
//!
//! This module drives one client session through the RFB handshake and the
//! steady-state update loop:
//!
//! 1. **Protocol Version** - read the server banner, echo the negotiated
//!    version (unknown banners negotiate as 3.8)
//! 2. **Security Handshake** - pick a scheme from the server's list (or the
//!    imposed word on 3.3), await the result
//! 3. **Initialization** - `ClientInit`/`ServerInit` exchange, desktop name,
//!    then announce pixel format and encodings
//! 4. **Update Loop** - request framebuffer updates and consume rectangle
//!    headers and Raw bodies, fanning each rectangle out through the
//!    [`Controller`]
//!
//! The machine is event-driven and does no I/O of its own: the transport
//! layer calls [`RfbClient::on_connect`], feeds inbound segments to
//! [`RfbClient::on_bytes`] and signals [`RfbClient::on_disconnect`].
//! Outbound messages go through the session's [`MessageSink`]. Each state
//! declares how many bytes it needs next; between those expectations the
//! session is suspended, so a handler always sees exactly the bytes it
//! asked for.

use bytes::Bytes;
use log::{debug, error, info};

use crate::config::ClientConfig;
use crate::controller::Controller;
use crate::dispatch::{Dispatcher, HeaderWidth};
use crate::error::{Result, RfbError};
use crate::observer::RfbObserver;
use crate::protocol::{
    self, PixelFormat, ProtocolVersion, Rectangle, ServerInit, ENCODING_RAW,
    SECURITY_RESULT_OK, SECURITY_TYPE_INVALID, SECURITY_TYPE_NONE,
    SERVER_MSG_FRAMEBUFFER_UPDATE,
};
use crate::stream::StreamBuffer;
use crate::transport::MessageSink;

/// The byte sequence the session is currently waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientState {
    ProtocolVersion,
    SecurityImposed,
    SecurityList,
    SecurityResult,
    SecurityFailReason,
    ServerInit,
    ServerName,
    ServerOrder,
    UpdateHeader,
    RectHeader,
    RectBody,
}

/// A single VNC client session.
///
/// Owns all per-session state (negotiated version, security level, server
/// parameters, the rectangle currently being read) and the [`Controller`]
/// that user code interacts with. Constructed at connection establishment
/// and discarded on disconnect; handlers run to completion on one event
/// loop, so no internal locking is needed.
pub struct RfbClient {
    buffer: StreamBuffer,
    dispatcher: Dispatcher<ClientState>,
    sink: MessageSink,
    controller: Controller,
    shared: bool,
    security_preference: Vec<u8>,
    version: ProtocolVersion,
    security_level: u8,
    pixel_format: PixelFormat,
    server_init: ServerInit,
    server_name: String,
    remaining_rects: u16,
    current_rect: Option<Rectangle>,
}

impl RfbClient {
    /// Creates a session configured as a client.
    ///
    /// The session starts idle; the transport layer calls
    /// [`on_connect`](Self::on_connect) once the byte stream is up.
    #[must_use]
    pub fn new(config: ClientConfig, sink: MessageSink) -> Self {
        let controller = Controller::new(sink.clone());
        Self {
            buffer: StreamBuffer::new(),
            dispatcher: Dispatcher::new(),
            sink,
            controller,
            shared: config.shared,
            security_preference: config.security_preference,
            version: ProtocolVersion::Rfb38,
            security_level: SECURITY_TYPE_INVALID,
            pixel_format: config.preferred_pixel_format,
            server_init: ServerInit::default(),
            server_name: String::new(),
            remaining_rects: 0,
            current_rect: None,
        }
    }

    /// The session controller.
    #[must_use]
    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// The session controller, mutably (for observer registration).
    pub fn controller_mut(&mut self) -> &mut Controller {
        &mut self.controller
    }

    /// Registers an observer with the session controller.
    pub fn add_observer(&mut self, observer: Box<dyn RfbObserver>) {
        self.controller.add_observer(observer);
    }

    /// The negotiated protocol version.
    #[must_use]
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// The negotiated security scheme.
    #[must_use]
    pub fn security_level(&self) -> u8 {
        self.security_level
    }

    /// The server's initialization parameters (zero-size until received).
    #[must_use]
    pub fn server_init(&self) -> &ServerInit {
        &self.server_init
    }

    /// The server's desktop name (empty until received).
    #[must_use]
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// The pixel format rectangle bodies are delivered in.
    #[must_use]
    pub fn pixel_format(&self) -> &PixelFormat {
        &self.pixel_format
    }

    /// Transport callback: the byte stream is established.
    ///
    /// The server speaks first, so this only arms the banner expectation.
    pub fn on_connect(&mut self) {
        debug!("Transport connected, awaiting protocol banner");
        self.dispatcher.expect(ProtocolVersion::WIRE_SIZE, ClientState::ProtocolVersion);
    }

    /// Transport callback: inbound bytes arrived.
    ///
    /// Appends the segment to the stream buffer and runs every expectation
    /// it can satisfy. A segment may complete several expectations (a whole
    /// framebuffer update in one TCP segment) or none (a partial record);
    /// leftover bytes stay queued.
    ///
    /// # Errors
    ///
    /// Handshake and protocol violations terminate the session:
    /// [`RfbError::Negotiation`], [`RfbError::PeerError`],
    /// [`RfbError::InvalidExpectedData`]. The transport layer is expected
    /// to disconnect on any error.
    pub fn on_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.buffer.append(data);
        while let Some((state, chunk)) = self.dispatcher.poll(&mut self.buffer)? {
            self.dispatch(state, chunk)?;
        }
        Ok(())
    }

    /// Transport callback: the byte stream is gone.
    ///
    /// Invalidates the pending expectation and closes the outbound sink so
    /// later sends fail with [`RfbError::Disconnected`]. Idempotent.
    pub fn on_disconnect(&mut self) {
        self.dispatcher.cancel();
        self.sink.close();
    }

    fn dispatch(&mut self, state: ClientState, mut data: StreamBuffer) -> Result<()> {
        match state {
            ClientState::ProtocolVersion => self.recv_protocol_version(&mut data),
            ClientState::SecurityImposed => self.recv_security_imposed(&mut data),
            ClientState::SecurityList => self.recv_security_list(&mut data),
            ClientState::SecurityResult => self.recv_security_result(&mut data),
            ClientState::SecurityFailReason => self.recv_security_fail_reason(&mut data),
            ClientState::ServerInit => self.recv_server_init(&mut data),
            ClientState::ServerName => self.recv_server_name(&mut data),
            ClientState::ServerOrder => self.recv_server_order(&mut data),
            ClientState::UpdateHeader => self.recv_update_header(&mut data),
            ClientState::RectHeader => self.recv_rect_header(&mut data),
            ClientState::RectBody => self.recv_rect_body(&mut data),
        }
    }

    /// Reads the server banner and echoes the version this session will
    /// speak. Unknown banners are answered with 3.8, the best version we
    /// can handle.
    fn recv_protocol_version(&mut self, data: &mut StreamBuffer) -> Result<()> {
        let banner = data.read_bytes(ProtocolVersion::WIRE_SIZE)?;
        self.version = ProtocolVersion::from_wire(&banner);
        if self.version == ProtocolVersion::Unknown {
            info!(
                "Unknown protocol banner {:?}, negotiating as 3.8",
                protocol::latin1_to_string(&banner)
            );
            self.version = ProtocolVersion::Rfb38;
        }
        self.send_bytes(self.version.as_wire())?;

        if self.version == ProtocolVersion::Rfb33 {
            // 3.3 servers impose the security scheme in a single word.
            self.dispatcher.expect(4, ClientState::SecurityImposed);
        } else {
            self.dispatcher.expect_with_header(HeaderWidth::U8, ClientState::SecurityList);
        }
        Ok(())
    }

    /// Handles the server-imposed security word of RFB 3.3. Only the None
    /// scheme is supported on this path.
    fn recv_security_imposed(&mut self, data: &mut StreamBuffer) -> Result<()> {
        let scheme = data.read_u32()?;
        if scheme == u32::from(SECURITY_TYPE_NONE) {
            info!("Server imposed security scheme None");
            self.security_level = SECURITY_TYPE_NONE;
            return self.send_client_init();
        }
        if scheme == u32::from(SECURITY_TYPE_INVALID) {
            return Err(RfbError::Negotiation("server rejected the connection".into()));
        }
        Err(RfbError::Negotiation(format!(
            "unsupported imposed security scheme {scheme}"
        )))
    }

    /// Picks a scheme from the server's offer list, preferring the
    /// strongest one the session accepts, and sends the choice back.
    fn recv_security_list(&mut self, data: &mut StreamBuffer) -> Result<()> {
        let mut offered = Vec::with_capacity(data.available());
        while data.available() > 0 {
            offered.push(data.read_u8()?);
        }

        let chosen = self
            .security_preference
            .iter()
            .copied()
            .find(|scheme| *scheme != SECURITY_TYPE_INVALID && offered.contains(scheme));
        let Some(level) = chosen else {
            return Err(RfbError::Negotiation(format!(
                "no mutually supported security scheme in {offered:?}"
            )));
        };

        debug!("Server offered security schemes {:?}, chose {}", offered, level);
        self.security_level = level;
        self.send_bytes(&[level])?;
        self.dispatcher.expect(4, ClientState::SecurityResult);
        Ok(())
    }

    /// Handles the security result word: success continues to ClientInit,
    /// failure terminates (on 3.8, after collecting the server's reason).
    fn recv_security_result(&mut self, data: &mut StreamBuffer) -> Result<()> {
        let result = data.read_u32()?;
        if result == SECURITY_RESULT_OK {
            info!("Security handshake succeeded (scheme {})", self.security_level);
            return self.send_client_init();
        }

        error!("Server reported security failure (result {})", result);
        if self.version == ProtocolVersion::Rfb38 {
            self.dispatcher.expect_with_header(HeaderWidth::U32, ClientState::SecurityFailReason);
            return Ok(());
        }
        // Pre-3.8 servers do not send a reason string.
        Err(RfbError::PeerError("authentication failed".into()))
    }

    /// Terminal state: the server's reason for failing the handshake.
    fn recv_security_fail_reason(&mut self, data: &mut StreamBuffer) -> Result<()> {
        let reason = protocol::latin1_to_string(&data.take_remaining());
        Err(RfbError::PeerError(reason))
    }

    /// Sends the shared-access flag and awaits the server's init message.
    fn send_client_init(&mut self) -> Result<()> {
        self.send_bytes(&[u8::from(self.shared)])?;
        self.dispatcher.expect(ServerInit::WIRE_SIZE, ClientState::ServerInit);
        Ok(())
    }

    /// Stores the framebuffer geometry and arms for the desktop name.
    fn recv_server_init(&mut self, data: &mut StreamBuffer) -> Result<()> {
        self.server_init = ServerInit::read_from(data)?;
        info!(
            "Server framebuffer {}x{}, native format {}bpp",
            self.server_init.framebuffer_width,
            self.server_init.framebuffer_height,
            self.server_init.pixel_format.bits_per_pixel
        );
        self.dispatcher.expect_with_header(HeaderWidth::U32, ClientState::ServerName);
        Ok(())
    }

    /// Completes the handshake: stores the desktop name, announces the
    /// client's pixel format and encodings, and requests the first full
    /// framebuffer update.
    fn recv_server_name(&mut self, data: &mut StreamBuffer) -> Result<()> {
        self.server_name = protocol::latin1_to_string(&data.take_remaining());
        info!("Connected to {:?}", self.server_name);

        self.sink.send(protocol::set_pixel_format_message(&self.pixel_format).freeze())?;
        self.sink.send(protocol::set_encodings_message(&[ENCODING_RAW])?.freeze())?;
        self.send_update_request(false)?;
        self.dispatcher.expect(1, ClientState::ServerOrder);
        Ok(())
    }

    /// Dispatches on the server message type byte. Only framebuffer
    /// updates are negotiated, so anything else is a protocol violation.
    fn recv_server_order(&mut self, data: &mut StreamBuffer) -> Result<()> {
        let order = data.read_u8()?;
        if order != SERVER_MSG_FRAMEBUFFER_UPDATE {
            return Err(RfbError::InvalidExpectedData(format!(
                "unsupported server message type {order}"
            )));
        }
        self.dispatcher.expect(3, ClientState::UpdateHeader);
        Ok(())
    }

    /// Reads the rectangle count of a framebuffer update.
    fn recv_update_header(&mut self, data: &mut StreamBuffer) -> Result<()> {
        data.skip(1)?; // padding
        self.remaining_rects = data.read_u16()?;
        debug!("Framebuffer update with {} rectangles", self.remaining_rects);
        if self.remaining_rects == 0 {
            // An empty update still completes the request/response cycle.
            self.send_update_request(true)?;
            self.dispatcher.expect(1, ClientState::ServerOrder);
        } else {
            self.dispatcher.expect(Rectangle::HEADER_SIZE, ClientState::RectHeader);
        }
        Ok(())
    }

    /// Reads one rectangle header and arms for its Raw body, sized by the
    /// pixel format this client sent.
    fn recv_rect_header(&mut self, data: &mut StreamBuffer) -> Result<()> {
        let rect = Rectangle::read_from(data)?;
        if rect.encoding != ENCODING_RAW {
            return Err(RfbError::InvalidExpectedData(format!(
                "unsupported encoding {}",
                rect.encoding
            )));
        }
        let body_len = rect.raw_body_len(&self.pixel_format);
        self.dispatcher.expect(body_len, ClientState::RectBody);
        self.current_rect = Some(rect);
        Ok(())
    }

    /// Delivers one rectangle body to the observers. After the last
    /// rectangle of an update, exactly one incremental follow-up request
    /// is issued.
    fn recv_rect_body(&mut self, data: &mut StreamBuffer) -> Result<()> {
        let rect = self.current_rect.take().ok_or_else(|| {
            RfbError::InvalidExpectedData("rectangle body without pending header".into())
        })?;
        let body = data.take_remaining();
        self.controller.recv_rectangle(&rect, &self.pixel_format, &body);

        self.remaining_rects -= 1;
        if self.remaining_rects > 0 {
            self.dispatcher.expect(Rectangle::HEADER_SIZE, ClientState::RectHeader);
        } else {
            self.send_update_request(true)?;
            self.dispatcher.expect(1, ClientState::ServerOrder);
        }
        Ok(())
    }

    /// Requests an update covering the whole framebuffer.
    fn send_update_request(&mut self, incremental: bool) -> Result<()> {
        let msg = protocol::framebuffer_update_request_message(
            incremental,
            0,
            0,
            self.server_init.framebuffer_width,
            self.server_init.framebuffer_height,
        );
        self.sink.send(msg.freeze())
    }

    fn send_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.sink.send(Bytes::copy_from_slice(bytes))
    }
}
