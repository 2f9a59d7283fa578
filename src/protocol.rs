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

//! VNC Remote Framebuffer (RFB) protocol constants and structures.
//!
//! This module provides the fundamental building blocks for VNC protocol
//! communication from the client side: protocol version negotiation, message
//! types, security handshake values, the Raw encoding, and the composite
//! record types exchanged during a session. It implements the client subset
//! of the RFB protocol as specified in RFC 6143.
//!
//! # Protocol Overview
//!
//! The VNC RFB protocol operates in the following phases:
//! 1. **Protocol Version** - Server and client agree on protocol version
//! 2. **Security Handshake** - Authentication method selection and execution
//! 3. **Initialization** - Exchange of framebuffer parameters and capabilities
//! 4. **Normal Operation** - Ongoing message exchange for input events and screen updates
//!
//! All multi-byte integers are big-endian on the wire. Every record type
//! carries a `write_to`/`read_from` pair that serializes its fields in
//! declared order, padding included.

use bytes::{BufMut, BytesMut};

use crate::error::{Result, RfbError};
use crate::stream::StreamBuffer;

// Client-to-Server Message Types

/// Message type: Client requests to change the pixel format.
///
/// Sent once after initialization so the server delivers framebuffer
/// updates in the client's preferred layout.
pub const CLIENT_MSG_SET_PIXEL_FORMAT: u8 = 0;

/// Message type: Client specifies supported encodings.
///
/// The client sends a list of encoding types it supports, ordered by
/// preference. This client only ever advertises Raw.
pub const CLIENT_MSG_SET_ENCODINGS: u8 = 2;

/// Message type: Client requests a framebuffer update.
///
/// The client can request either an incremental update (changes only) or
/// a full refresh of a specified rectangular region.
pub const CLIENT_MSG_FRAMEBUFFER_UPDATE_REQUEST: u8 = 3;

/// Message type: Client sends a keyboard event.
///
/// Contains information about a key press or release event, including
/// the key symbol and the press/release state.
pub const CLIENT_MSG_KEY_EVENT: u8 = 4;

/// Message type: Client sends a pointer (mouse) event.
///
/// Contains the current pointer position and button state.
pub const CLIENT_MSG_POINTER_EVENT: u8 = 5;

/// Message type: Client sends cut text (clipboard data).
///
/// Allows the client to transfer clipboard contents to the server.
pub const CLIENT_MSG_CLIENT_CUT_TEXT: u8 = 6;

// Server-to-Client Message Types

/// Message type: Server sends a framebuffer update.
///
/// Contains one or more rectangles of pixel data representing screen
/// changes. The only server order this client accepts.
pub const SERVER_MSG_FRAMEBUFFER_UPDATE: u8 = 0;

/// Message type: Server sets colour map entries.
///
/// Only meaningful for indexed colour modes, which this true-colour
/// client does not negotiate.
#[allow(dead_code)]
pub const SERVER_MSG_SET_COLOUR_MAP_ENTRIES: u8 = 1;

/// Message type: Server sends a bell (beep) notification.
#[allow(dead_code)]
pub const SERVER_MSG_BELL: u8 = 2;

/// Message type: Server sends cut text (clipboard data).
#[allow(dead_code)]
pub const SERVER_MSG_SERVER_CUT_TEXT: u8 = 3;

// Encoding Types

/// Encoding type: Raw pixel data.
///
/// The simplest encoding that sends uncompressed pixel data directly.
/// High bandwidth but universally supported, and the only encoding this
/// client negotiates.
pub const ENCODING_RAW: i32 = 0;

// Security Types

/// Security type: Invalid/Unknown.
///
/// Indicates an error or unsupported security mechanism.
pub const SECURITY_TYPE_INVALID: u8 = 0;

/// Security type: None (no authentication).
///
/// No authentication is required. The connection proceeds directly
/// to the initialization phase.
pub const SECURITY_TYPE_NONE: u8 = 1;

/// Security type: VNC Authentication.
///
/// Standard VNC authentication using DES-encrypted challenge-response.
/// This client recognizes the scheme during negotiation but does not
/// implement the challenge-response exchange.
pub const SECURITY_TYPE_VNC_AUTH: u8 = 2;

// Security Results

/// Security result: Authentication successful.
pub const SECURITY_RESULT_OK: u32 = 0;

/// Security result: Authentication failed.
///
/// On RFB 3.8 a length-prefixed reason string follows.
pub const SECURITY_RESULT_FAILED: u32 = 1;

// Pointer button masks

/// Pointer button mask: button 1 (left).
pub const POINTER_BUTTON1: u8 = 0x1;

/// Pointer button mask: button 2 (middle).
pub const POINTER_BUTTON2: u8 = 0x2;

/// Pointer button mask: button 3 (right).
pub const POINTER_BUTTON3: u8 = 0x4;

/// RFB protocol versions relevant to the handshake.
///
/// The server opens the connection with a 12-byte ASCII banner; the three
/// versions below are the ones with distinct handshake behaviour. Anything
/// else parses as [`ProtocolVersion::Unknown`] and negotiates as 3.8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    /// RFB 3.3: the server imposes the security type.
    Rfb33,
    /// RFB 3.7: the server offers a security type list.
    Rfb37,
    /// RFB 3.8: like 3.7, plus reason strings on failure.
    Rfb38,
    /// Unrecognized banner.
    Unknown,
}

impl ProtocolVersion {
    /// Wire size of the version banner.
    pub const WIRE_SIZE: usize = 12;

    /// Parses a 12-byte version banner.
    #[must_use]
    pub fn from_wire(banner: &[u8]) -> Self {
        match banner {
            b"RFB 003.003\n" => Self::Rfb33,
            b"RFB 003.007\n" => Self::Rfb37,
            b"RFB 003.008\n" => Self::Rfb38,
            _ => Self::Unknown,
        }
    }

    /// The 12-byte banner for this version.
    ///
    /// `Unknown` yields the 3.8 banner: an unrecognized server banner is
    /// answered with the best version this client speaks.
    #[must_use]
    pub fn as_wire(&self) -> &'static [u8; 12] {
        match self {
            Self::Rfb33 => b"RFB 003.003\n",
            Self::Rfb37 => b"RFB 003.007\n",
            Self::Rfb38 | Self::Unknown => b"RFB 003.008\n",
        }
    }
}

/// Represents the pixel format of the VNC framebuffer.
///
/// This struct defines how pixel data is interpreted, including color depth,
/// endianness, and RGB component details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelFormat {
    /// Number of bits per pixel.
    pub bits_per_pixel: u8,
    /// Depth of the pixel in bits.
    pub depth: u8,
    /// Flag indicating if the pixel data is big-endian (1) or little-endian (0).
    pub big_endian_flag: u8,
    /// Flag indicating if the pixel format is true-colour (1) or colormapped (0).
    pub true_colour_flag: u8,
    /// Maximum red color value.
    pub red_max: u16,
    /// Maximum green color value.
    pub green_max: u16,
    /// Maximum blue color value.
    pub blue_max: u16,
    /// Number of shifts to apply to get the red color component.
    pub red_shift: u8,
    /// Number of shifts to apply to get the green color component.
    pub green_shift: u8,
    /// Number of shifts to apply to get the blue color component.
    pub blue_shift: u8,
}

impl PixelFormat {
    /// Serialized size on the wire, padding included.
    pub const WIRE_SIZE: usize = 16;

    /// Creates the 32-bit BGRA pixel format this client requests by default.
    ///
    /// Little-endian true colour with red in bits 16-23, which is the
    /// native layout of most servers (pixel bytes arrive as B, G, R, X).
    #[must_use]
    pub fn bgra32() -> Self {
        Self {
            bits_per_pixel: 32,
            depth: 24,
            big_endian_flag: 0,
            true_colour_flag: 1,
            red_max: 255,
            green_max: 255,
            blue_max: 255,
            red_shift: 16,
            green_shift: 8,
            blue_shift: 0,
        }
    }

    /// Creates a standard 32-bit RGBA pixel format.
    ///
    /// # Returns
    ///
    /// A `PixelFormat` instance configured for 32-bit RGBA.
    #[must_use]
    pub fn rgba32() -> Self {
        Self {
            red_shift: 0,
            blue_shift: 16,
            ..Self::bgra32()
        }
    }

    /// Bytes each pixel occupies in a Raw rectangle body.
    #[must_use]
    pub fn bytes_per_pixel(&self) -> usize {
        usize::from(self.bits_per_pixel) / 8
    }

    /// Writes the pixel format data into a `BytesMut` buffer.
    ///
    /// This function serializes the `PixelFormat` into the RFB protocol format.
    ///
    /// # Arguments
    ///
    /// * `buf` - A mutable reference to the `BytesMut` buffer to write into.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8(self.bits_per_pixel);
        buf.put_u8(self.depth);
        buf.put_u8(self.big_endian_flag);
        buf.put_u8(self.true_colour_flag);
        buf.put_u16(self.red_max);
        buf.put_u16(self.green_max);
        buf.put_u16(self.blue_max);
        buf.put_u8(self.red_shift);
        buf.put_u8(self.green_shift);
        buf.put_u8(self.blue_shift);
        buf.put_bytes(0, 3); // padding
    }

    /// Reads and deserializes a `PixelFormat` from a stream buffer.
    ///
    /// # Arguments
    ///
    /// * `buf` - The stream buffer to read from.
    ///
    /// # Errors
    ///
    /// Returns [`RfbError::InvalidSize`] if fewer than 16 bytes remain.
    pub fn read_from(buf: &mut StreamBuffer) -> Result<Self> {
        let pf = Self {
            bits_per_pixel: buf.read_u8()?,
            depth: buf.read_u8()?,
            big_endian_flag: buf.read_u8()?,
            true_colour_flag: buf.read_u8()?,
            red_max: buf.read_u16()?,
            green_max: buf.read_u16()?,
            blue_max: buf.read_u16()?,
            red_shift: buf.read_u8()?,
            green_shift: buf.read_u8()?,
            blue_shift: buf.read_u8()?,
        };
        buf.skip(3)?; // padding
        Ok(pf)
    }
}

impl Default for PixelFormat {
    fn default() -> Self {
        Self::bgra32()
    }
}

/// Represents the `ServerInit` message received during VNC initialization.
///
/// Sent by the server after security negotiation completes, providing the
/// framebuffer dimensions and the server's native pixel format. The desktop
/// name that follows on the wire is length-prefixed and is consumed as a
/// separate expectation, so it is not part of this record.
#[derive(Debug, Clone)]
pub struct ServerInit {
    /// The width of the framebuffer in pixels.
    pub framebuffer_width: u16,
    /// The height of the framebuffer in pixels.
    pub framebuffer_height: u16,
    /// The pixel format used by the framebuffer.
    pub pixel_format: PixelFormat,
}

impl ServerInit {
    /// Serialized size on the wire (width, height, pixel format).
    pub const WIRE_SIZE: usize = 20;

    /// Reads the fixed-size head of a `ServerInit` message.
    ///
    /// # Errors
    ///
    /// Returns [`RfbError::InvalidSize`] if fewer than 20 bytes remain.
    pub fn read_from(buf: &mut StreamBuffer) -> Result<Self> {
        Ok(Self {
            framebuffer_width: buf.read_u16()?,
            framebuffer_height: buf.read_u16()?,
            pixel_format: PixelFormat::read_from(buf)?,
        })
    }

    /// Serializes the record in wire order.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u16(self.framebuffer_width);
        buf.put_u16(self.framebuffer_height);
        self.pixel_format.write_to(buf);
    }
}

impl Default for ServerInit {
    /// A zero-size framebuffer, used as session state before the server's
    /// init message arrives.
    fn default() -> Self {
        Self {
            framebuffer_width: 0,
            framebuffer_height: 0,
            pixel_format: PixelFormat::default(),
        }
    }
}

/// Represents a rectangle header in a framebuffer update message.
///
/// Each framebuffer update can contain multiple rectangles, each with its own
/// encoding type. The rectangle header specifies the position, dimensions,
/// and encoding of the pixel data that follows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rectangle {
    /// X coordinate of the top-left corner.
    pub x: u16,
    /// Y coordinate of the top-left corner.
    pub y: u16,
    /// Width of the rectangle in pixels.
    pub width: u16,
    /// Height of the rectangle in pixels.
    pub height: u16,
    /// The encoding type used for this rectangle's pixel data.
    pub encoding: i32,
}

impl Rectangle {
    /// Serialized size of the header on the wire.
    pub const HEADER_SIZE: usize = 12;

    /// Reads a rectangle header from a stream buffer.
    ///
    /// # Errors
    ///
    /// Returns [`RfbError::InvalidSize`] if fewer than 12 bytes remain.
    pub fn read_from(buf: &mut StreamBuffer) -> Result<Self> {
        Ok(Self {
            x: buf.read_u16()?,
            y: buf.read_u16()?,
            width: buf.read_u16()?,
            height: buf.read_u16()?,
            encoding: buf.read_i32()?,
        })
    }

    /// Writes the rectangle header to a byte buffer.
    ///
    /// The header format is:
    /// - 2 bytes: x position
    /// - 2 bytes: y position
    /// - 2 bytes: width
    /// - 2 bytes: height
    /// - 4 bytes: encoding type (signed 32-bit integer)
    ///
    /// # Arguments
    ///
    /// * `buf` - The buffer to write the header into.
    pub fn write_header(&self, buf: &mut BytesMut) {
        buf.put_u16(self.x);
        buf.put_u16(self.y);
        buf.put_u16(self.width);
        buf.put_u16(self.height);
        buf.put_i32(self.encoding);
    }

    /// Body size in bytes of this rectangle under Raw encoding.
    ///
    /// Raw bodies carry `width * height` pixels in the pixel format the
    /// client last sent, with no compression.
    #[must_use]
    pub fn raw_body_len(&self, pixel_format: &PixelFormat) -> usize {
        usize::from(self.width) * usize::from(self.height) * pixel_format.bytes_per_pixel()
    }
}

/// Builds a `SetPixelFormat` message (type, 3 padding bytes, format).
#[must_use]
pub fn set_pixel_format_message(pixel_format: &PixelFormat) -> BytesMut {
    let mut msg = BytesMut::with_capacity(20);
    msg.put_u8(CLIENT_MSG_SET_PIXEL_FORMAT);
    msg.put_bytes(0, 3); // padding
    pixel_format.write_to(&mut msg);
    msg
}

/// Builds a `SetEncodings` message advertising the given encodings in
/// preference order.
///
/// # Errors
///
/// Returns [`RfbError::InvalidValue`] if the list does not fit the u16
/// count field.
pub fn set_encodings_message(encodings: &[i32]) -> Result<BytesMut> {
    let count = u16::try_from(encodings.len())
        .map_err(|_| RfbError::InvalidValue(format!("{} encodings exceed u16 count", encodings.len())))?;
    let mut msg = BytesMut::with_capacity(4 + encodings.len() * 4);
    msg.put_u8(CLIENT_MSG_SET_ENCODINGS);
    msg.put_u8(0); // padding
    msg.put_u16(count);
    for encoding in encodings {
        msg.put_i32(*encoding);
    }
    Ok(msg)
}

/// Builds a `FramebufferUpdateRequest` message for the given region.
///
/// `incremental` asks the server for changes since the last update only;
/// a non-incremental request forces a full refresh of the region.
#[must_use]
pub fn framebuffer_update_request_message(
    incremental: bool,
    x: u16,
    y: u16,
    width: u16,
    height: u16,
) -> BytesMut {
    let mut msg = BytesMut::with_capacity(10);
    msg.put_u8(CLIENT_MSG_FRAMEBUFFER_UPDATE_REQUEST);
    msg.put_u8(u8::from(incremental));
    msg.put_u16(x);
    msg.put_u16(y);
    msg.put_u16(width);
    msg.put_u16(height);
    msg
}

/// Builds a `KeyEvent` message (down flag, 2 padding bytes, keysym).
#[must_use]
pub fn key_event_message(down: bool, key: u32) -> BytesMut {
    let mut msg = BytesMut::with_capacity(8);
    msg.put_u8(CLIENT_MSG_KEY_EVENT);
    msg.put_u8(u8::from(down));
    msg.put_u16(0); // padding
    msg.put_u32(key);
    msg
}

/// Builds a `PointerEvent` message (button mask, position).
#[must_use]
pub fn pointer_event_message(button_mask: u8, x: u16, y: u16) -> BytesMut {
    let mut msg = BytesMut::with_capacity(6);
    msg.put_u8(CLIENT_MSG_POINTER_EVENT);
    msg.put_u8(button_mask);
    msg.put_u16(x);
    msg.put_u16(y);
    msg
}

/// Builds a `ClientCutText` message (3 padding bytes, length, text bytes).
///
/// # Errors
///
/// Returns [`RfbError::InvalidValue`] if the text does not fit the u32
/// length field.
pub fn client_cut_text_message(text: &str) -> Result<BytesMut> {
    let length = u32::try_from(text.len())
        .map_err(|_| RfbError::InvalidValue(format!("cut text of {} bytes exceeds u32 length", text.len())))?;
    let mut msg = BytesMut::with_capacity(8 + text.len());
    msg.put_u8(CLIENT_MSG_CLIENT_CUT_TEXT);
    msg.put_bytes(0, 3); // padding
    msg.put_u32(length);
    msg.put_slice(text.as_bytes());
    Ok(msg)
}

/// Decodes RFB string bytes.
///
/// Strings in the core protocol are ASCII or Latin-1, both of which embed
/// directly into Unicode code points.
#[must_use]
pub fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| char::from(*b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse() {
        assert_eq!(ProtocolVersion::from_wire(b"RFB 003.003\n"), ProtocolVersion::Rfb33);
        assert_eq!(ProtocolVersion::from_wire(b"RFB 003.007\n"), ProtocolVersion::Rfb37);
        assert_eq!(ProtocolVersion::from_wire(b"RFB 003.008\n"), ProtocolVersion::Rfb38);
        assert_eq!(ProtocolVersion::from_wire(b"RFB 002.000\n"), ProtocolVersion::Unknown);
    }

    #[test]
    fn test_version_banner_length() {
        for version in [
            ProtocolVersion::Rfb33,
            ProtocolVersion::Rfb37,
            ProtocolVersion::Rfb38,
            ProtocolVersion::Unknown,
        ] {
            assert_eq!(version.as_wire().len(), ProtocolVersion::WIRE_SIZE);
        }
        // Unknown banners are answered with the best version we speak.
        assert_eq!(ProtocolVersion::Unknown.as_wire(), b"RFB 003.008\n");
    }

    #[test]
    fn test_default_pixel_format_bytes() {
        let mut buf = BytesMut::new();
        PixelFormat::default().write_to(&mut buf);
        assert_eq!(
            &buf[..],
            &[
                32, 24, 0, 1, // bpp, depth, little-endian, true colour
                0x00, 0xff, 0x00, 0xff, 0x00, 0xff, // max values
                16, 8, 0, // shifts
                0, 0, 0, // padding
            ]
        );
    }

    #[test]
    fn test_pixel_format_round_trip() {
        let format = PixelFormat {
            bits_per_pixel: 16,
            depth: 16,
            big_endian_flag: 1,
            true_colour_flag: 1,
            red_max: 31,
            green_max: 63,
            blue_max: 31,
            red_shift: 11,
            green_shift: 5,
            blue_shift: 0,
        };
        let mut buf = BytesMut::new();
        format.write_to(&mut buf);
        assert_eq!(buf.len(), PixelFormat::WIRE_SIZE);

        let mut stream = StreamBuffer::from(&buf[..]);
        let decoded = PixelFormat::read_from(&mut stream).unwrap();
        assert_eq!(decoded, format);
        assert_eq!(stream.available(), 0);
    }

    #[test]
    fn test_server_init_parse() {
        let mut bytes = vec![0x00, 0x40, 0x00, 0x30]; // 64x48
        let mut pf = BytesMut::new();
        PixelFormat::rgba32().write_to(&mut pf);
        bytes.extend_from_slice(&pf);

        let mut stream = StreamBuffer::from(&bytes[..]);
        let init = ServerInit::read_from(&mut stream).unwrap();
        assert_eq!(init.framebuffer_width, 64);
        assert_eq!(init.framebuffer_height, 48);
        assert_eq!(init.pixel_format, PixelFormat::rgba32());
    }

    #[test]
    fn test_rectangle_round_trip() {
        let rect = Rectangle { x: 3, y: 7, width: 640, height: 480, encoding: ENCODING_RAW };
        let mut buf = BytesMut::new();
        rect.write_header(&mut buf);
        assert_eq!(buf.len(), Rectangle::HEADER_SIZE);

        let mut stream = StreamBuffer::from(&buf[..]);
        assert_eq!(Rectangle::read_from(&mut stream).unwrap(), rect);
    }

    #[test]
    fn test_rectangle_negative_encoding_bytes() {
        let rect = Rectangle { x: 0, y: 0, width: 1, height: 1, encoding: -1 };
        let mut buf = BytesMut::new();
        rect.write_header(&mut buf);
        assert_eq!(&buf[8..12], &[0xff, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn test_raw_body_len() {
        let rect = Rectangle { x: 0, y: 0, width: 10, height: 5, encoding: ENCODING_RAW };
        assert_eq!(rect.raw_body_len(&PixelFormat::default()), 200);
    }

    #[test]
    fn test_set_pixel_format_message_layout() {
        let msg = set_pixel_format_message(&PixelFormat::default());
        assert_eq!(msg.len(), 20);
        assert_eq!(msg[0], CLIENT_MSG_SET_PIXEL_FORMAT);
        assert_eq!(&msg[1..4], &[0, 0, 0]); // padding
        assert_eq!(msg[4], 32); // bits per pixel
    }

    #[test]
    fn test_set_encodings_message_layout() {
        let msg = set_encodings_message(&[ENCODING_RAW]).unwrap();
        assert_eq!(&msg[..], &[2, 0, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_update_request_message_layout() {
        let msg = framebuffer_update_request_message(false, 0, 0, 64, 48);
        assert_eq!(&msg[..], &[3, 0, 0, 0, 0, 0, 0x00, 0x40, 0x00, 0x30]);

        let incremental = framebuffer_update_request_message(true, 0, 0, 64, 48);
        assert_eq!(incremental[1], 1);
    }

    #[test]
    fn test_key_event_message_layout() {
        let msg = key_event_message(true, 0x41);
        assert_eq!(&msg[..], &[4, 1, 0, 0, 0x00, 0x00, 0x00, 0x41]);
    }

    #[test]
    fn test_pointer_event_message_layout() {
        let msg = pointer_event_message(POINTER_BUTTON1 | POINTER_BUTTON3, 0x1234, 2);
        assert_eq!(&msg[..], &[5, 0x05, 0x12, 0x34, 0x00, 0x02]);
    }

    #[test]
    fn test_cut_text_message_layout() {
        let msg = client_cut_text_message("hi").unwrap();
        assert_eq!(&msg[..], &[6, 0, 0, 0, 0, 0, 0, 2, b'h', b'i']);
    }

    #[test]
    fn test_latin1_decoding() {
        assert_eq!(latin1_to_string(b"Test"), "Test");
        assert_eq!(latin1_to_string(&[0x63, 0x61, 0x66, 0xe9]), "caf\u{e9}");
    }
}
