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

//! Inbound byte buffering with a typed read cursor.
//!
//! Transport segments are appended as they arrive; reads consume from the
//! front in wire order. Every read is length-checked so a handler that asks
//! for more than the dispatcher awaited fails loudly with
//! [`RfbError::InvalidSize`] instead of panicking inside the `bytes` crate.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::{Result, RfbError};

/// Append-only inbound byte buffer with a monotonically advancing read
/// cursor.
///
/// All multi-byte reads are big-endian, matching RFB network order.
#[derive(Debug, Default)]
pub struct StreamBuffer {
    buf: BytesMut,
}

impl StreamBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self { buf: BytesMut::new() }
    }

    /// Appends inbound bytes behind the read cursor.
    pub fn append(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Number of unread bytes remaining.
    #[must_use]
    pub fn available(&self) -> usize {
        self.buf.len()
    }

    fn check(&self, needed: usize) -> Result<()> {
        if self.buf.len() < needed {
            return Err(RfbError::InvalidSize { needed, available: self.buf.len() });
        }
        Ok(())
    }

    /// Consumes one byte.
    ///
    /// # Errors
    ///
    /// Returns [`RfbError::InvalidSize`] if the buffer is empty.
    pub fn read_u8(&mut self) -> Result<u8> {
        self.check(1)?;
        Ok(self.buf.get_u8())
    }

    /// Consumes a big-endian `u16`.
    ///
    /// # Errors
    ///
    /// Returns [`RfbError::InvalidSize`] if fewer than 2 bytes remain.
    pub fn read_u16(&mut self) -> Result<u16> {
        self.check(2)?;
        Ok(self.buf.get_u16())
    }

    /// Consumes a big-endian `u32`.
    ///
    /// # Errors
    ///
    /// Returns [`RfbError::InvalidSize`] if fewer than 4 bytes remain.
    pub fn read_u32(&mut self) -> Result<u32> {
        self.check(4)?;
        Ok(self.buf.get_u32())
    }

    /// Consumes a big-endian `i32`.
    ///
    /// # Errors
    ///
    /// Returns [`RfbError::InvalidSize`] if fewer than 4 bytes remain.
    pub fn read_i32(&mut self) -> Result<i32> {
        self.check(4)?;
        Ok(self.buf.get_i32())
    }

    /// Consumes and discards `count` bytes (padding fields).
    ///
    /// # Errors
    ///
    /// Returns [`RfbError::InvalidSize`] if fewer than `count` bytes remain.
    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.check(count)?;
        self.buf.advance(count);
        Ok(())
    }

    /// Consumes exactly `count` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RfbError::InvalidSize`] if fewer than `count` bytes remain.
    pub fn read_bytes(&mut self, count: usize) -> Result<Bytes> {
        self.check(count)?;
        Ok(self.buf.split_to(count).freeze())
    }

    /// Carves off the first `needed` bytes into their own buffer, leaving
    /// the excess queued for the next expectation.
    ///
    /// The dispatcher uses this to hand each handler exactly the bytes it
    /// awaited, no matter how large the transport segment was.
    pub(crate) fn split_front(&mut self, needed: usize) -> Result<StreamBuffer> {
        self.check(needed)?;
        Ok(StreamBuffer { buf: self.buf.split_to(needed) })
    }

    /// All unread bytes, without consuming them.
    #[must_use]
    pub fn peek(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes every remaining byte.
    #[must_use]
    pub fn take_remaining(&mut self) -> Bytes {
        self.buf.split().freeze()
    }
}

impl From<&[u8]> for StreamBuffer {
    fn from(data: &[u8]) -> Self {
        let mut buf = Self::new();
        buf.append(data);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_big_endian_reads() {
        let mut buf = StreamBuffer::from(&[0x12, 0x34, 0x01, 0x02, 0x03, 0x04, 0xff, 0xff, 0xff, 0xff][..]);
        assert_eq!(buf.read_u16().unwrap(), 0x1234);
        assert_eq!(buf.read_u32().unwrap(), 0x0102_0304);
        assert_eq!(buf.read_i32().unwrap(), -1);
        assert_eq!(buf.available(), 0);
    }

    #[test]
    fn test_underrun_is_invalid_size() {
        let mut buf = StreamBuffer::from(&[0xab][..]);
        match buf.read_u32() {
            Err(RfbError::InvalidSize { needed: 4, available: 1 }) => {}
            other => panic!("expected InvalidSize, got {:?}", other),
        }
        // The failed read must not consume anything.
        assert_eq!(buf.read_u8().unwrap(), 0xab);
    }

    #[test]
    fn test_append_extends_behind_cursor() {
        let mut buf = StreamBuffer::from(&[0x00][..]);
        buf.append(&[0x2a]);
        assert_eq!(buf.available(), 2);
        assert_eq!(buf.read_u16().unwrap(), 0x002a);
    }

    #[test]
    fn test_split_front_retains_excess() {
        let mut buf = StreamBuffer::from(&[1, 2, 3, 4, 5][..]);
        let mut front = buf.split_front(2).unwrap();
        assert_eq!(front.read_u16().unwrap(), 0x0102);
        assert_eq!(front.available(), 0);
        assert_eq!(buf.peek(), &[3, 4, 5]);
    }

    #[test]
    fn test_skip_consumes_padding() {
        let mut buf = StreamBuffer::from(&[0, 0, 0, 7][..]);
        buf.skip(3).unwrap();
        assert_eq!(buf.read_u8().unwrap(), 7);
    }
}
