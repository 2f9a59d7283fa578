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

//! Pull-model expectation dispatcher.
//!
//! The RFB handshake is a sequence of fixed-size reads where each state
//! knows exactly how many bytes it needs next. The dispatcher holds at most
//! one pending expectation - "N bytes, then hand them to state S" - and
//! resolves it once the stream buffer has queued enough data. Handlers run
//! to completion and arm the next expectation before returning; between
//! expectations the session is suspended.
//!
//! A two-tier variant first reads a 1/2/4-byte big-endian length header and
//! then re-arms itself for the body, which is how the protocol's
//! length-prefixed strings and lists are consumed.

use crate::error::Result;
use crate::stream::StreamBuffer;

/// Width of a length-prefix header.
///
/// The protocol only ever prefixes with 1, 2 or 4 bytes; other widths are
/// unrepresentable rather than checked at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderWidth {
    /// One-byte length prefix.
    U8,
    /// Two-byte big-endian length prefix.
    U16,
    /// Four-byte big-endian length prefix.
    U32,
}

impl HeaderWidth {
    /// Bytes the header itself occupies.
    #[must_use]
    pub fn size(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }

    fn read(self, buf: &mut StreamBuffer) -> Result<usize> {
        Ok(match self {
            Self::U8 => usize::from(buf.read_u8()?),
            Self::U16 => usize::from(buf.read_u16()?),
            Self::U32 => buf.read_u32()? as usize,
        })
    }
}

#[derive(Debug)]
enum Pending<S> {
    Bytes { needed: usize, state: S },
    Header { width: HeaderWidth, state: S },
}

/// Drives a state machine from an asynchronous byte stream.
///
/// Holds the single `(needed bytes, next state)` pair the session is
/// suspended on. [`Dispatcher::poll`] yields `(state, chunk)` pairs as long
/// as the buffer can satisfy the pending expectation; bytes beyond the
/// expectation stay queued for the next arming.
#[derive(Debug)]
pub struct Dispatcher<S> {
    pending: Option<Pending<S>>,
}

impl<S> Dispatcher<S> {
    /// Creates a dispatcher with nothing armed.
    #[must_use]
    pub fn new() -> Self {
        Self { pending: None }
    }

    /// Arms a fixed-size expectation: when `needed` bytes are available,
    /// hand exactly that many to `state`.
    ///
    /// Replaces any previously armed expectation.
    pub fn expect(&mut self, needed: usize, state: S) {
        self.pending = Some(Pending::Bytes { needed, state });
    }

    /// Arms a two-tier expectation: read a `width`-byte big-endian length
    /// L, then hand the following L bytes to `state`.
    pub fn expect_with_header(&mut self, width: HeaderWidth, state: S) {
        self.pending = Some(Pending::Header { width, state });
    }

    /// Drops the pending expectation, leaving the session suspended for
    /// good. Used on disconnect.
    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// Whether an expectation is currently armed.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    /// Attempts to resolve the pending expectation against the buffer.
    ///
    /// Returns `Ok(Some((state, chunk)))` when enough bytes were queued:
    /// `chunk` holds exactly the awaited bytes and the expectation is
    /// disarmed (the handler is responsible for arming the next one).
    /// Returns `Ok(None)` on under-run or when nothing is armed; the
    /// buffered bytes are retained either way.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::RfbError::InvalidSize`] only on internal misuse;
    /// an under-run is not an error.
    pub fn poll(&mut self, buffer: &mut StreamBuffer) -> Result<Option<(S, StreamBuffer)>> {
        loop {
            match self.pending.take() {
                None => return Ok(None),
                Some(Pending::Header { width, state }) => {
                    if buffer.available() < width.size() {
                        self.pending = Some(Pending::Header { width, state });
                        return Ok(None);
                    }
                    let needed = width.read(buffer)?;
                    // Re-arm for the body and fall through to the size check.
                    self.pending = Some(Pending::Bytes { needed, state });
                }
                Some(Pending::Bytes { needed, state }) => {
                    if buffer.available() < needed {
                        self.pending = Some(Pending::Bytes { needed, state });
                        return Ok(None);
                    }
                    let chunk = buffer.split_front(needed)?;
                    return Ok(Some((state, chunk)));
                }
            }
        }
    }
}

impl<S> Default for Dispatcher<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum State {
        Banner,
        Body,
    }

    #[test]
    fn test_expect_fires_at_exactly_n() {
        let mut dispatcher = Dispatcher::new();
        let mut buffer = StreamBuffer::new();
        dispatcher.expect(4, State::Banner);

        buffer.append(&[1, 2, 3]);
        assert!(dispatcher.poll(&mut buffer).unwrap().is_none());
        assert!(dispatcher.is_armed());

        buffer.append(&[4, 5]);
        let (state, chunk) = dispatcher.poll(&mut buffer).unwrap().unwrap();
        assert_eq!(state, State::Banner);
        assert_eq!(chunk.peek(), &[1, 2, 3, 4]);
        // The fifth byte stays queued for the next expectation.
        assert_eq!(buffer.peek(), &[5]);
        assert!(!dispatcher.is_armed());
    }

    #[test]
    fn test_zero_byte_expectation_fires_immediately() {
        let mut dispatcher = Dispatcher::new();
        let mut buffer = StreamBuffer::new();
        dispatcher.expect(0, State::Body);

        let (state, chunk) = dispatcher.poll(&mut buffer).unwrap().unwrap();
        assert_eq!(state, State::Body);
        assert_eq!(chunk.available(), 0);
    }

    #[test]
    fn test_header_expectation_reads_length_then_body() {
        let mut dispatcher = Dispatcher::new();
        let mut buffer = StreamBuffer::new();
        dispatcher.expect_with_header(HeaderWidth::U8, State::Body);

        // Header alone is not enough to fire.
        buffer.append(&[3]);
        assert!(dispatcher.poll(&mut buffer).unwrap().is_none());

        buffer.append(&[10, 20, 30, 40]);
        let (state, chunk) = dispatcher.poll(&mut buffer).unwrap().unwrap();
        assert_eq!(state, State::Body);
        assert_eq!(chunk.peek(), &[10, 20, 30]);
        assert_eq!(buffer.peek(), &[40]);
    }

    #[test]
    fn test_u32_header_expectation() {
        let mut dispatcher = Dispatcher::new();
        let mut buffer = StreamBuffer::new();
        dispatcher.expect_with_header(HeaderWidth::U32, State::Body);

        buffer.append(&[0, 0, 0, 4, b'T', b'e', b's', b't']);
        let (_, chunk) = dispatcher.poll(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.peek(), b"Test");
    }

    #[test]
    fn test_header_and_body_across_segments() {
        let mut dispatcher = Dispatcher::new();
        let mut buffer = StreamBuffer::new();
        dispatcher.expect_with_header(HeaderWidth::U16, State::Body);

        buffer.append(&[0x00]);
        assert!(dispatcher.poll(&mut buffer).unwrap().is_none());
        buffer.append(&[0x02]);
        assert!(dispatcher.poll(&mut buffer).unwrap().is_none());
        buffer.append(&[0xaa, 0xbb]);
        let (_, chunk) = dispatcher.poll(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.peek(), &[0xaa, 0xbb]);
    }

    #[test]
    fn test_cancel_disarms() {
        let mut dispatcher = Dispatcher::new();
        let mut buffer = StreamBuffer::from(&[1, 2, 3, 4][..]);
        dispatcher.expect(4, State::Banner);
        dispatcher.cancel();
        assert!(!dispatcher.is_armed());
        assert!(dispatcher.poll(&mut buffer).unwrap().is_none());
        // Cancelled expectations leave the buffer untouched.
        assert_eq!(buffer.available(), 4);
    }
}
