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

//! Bridges the session state machine to user code.
//!
//! The controller is the only component applications interact with. Inbound,
//! it fans decoded framebuffer rectangles out to registered observers in
//! registration order. Outbound, it marshals key, pointer and cut-text
//! events into protocol messages and hands them to the transport.
//!
//! Input marshaling is forgiving: a locally malformed event is logged and
//! dropped rather than killing the session. Most invalid events are already
//! unrepresentable here (the wire fields are fixed-width integers); the
//! checks that remain, such as cut-text length and mouse button range,
//! follow the same policy.

use log::warn;

use crate::error::{Result, RfbError};
use crate::observer::RfbObserver;
use crate::protocol::{self, PixelFormat, Rectangle};
use crate::transport::MessageSink;

/// Maps a logical mouse button number to its RFB pointer mask bit.
///
/// Button 0 means "no button"; buttons 1 through 8 map to bits 0 through 7.
fn button_mask(button: u8) -> Result<u8> {
    match button {
        0 => Ok(0),
        1..=8 => Ok(1 << (button - 1)),
        _ => Err(RfbError::InvalidValue(format!("mouse button {button} out of range"))),
    }
}

/// Observer-side link back to the controller.
///
/// Handed to an observer when it is registered. The handle is non-owning:
/// it does not keep the session alive, and sends fail with
/// [`RfbError::Disconnected`] once the transport is gone. A handle that was
/// never attached (the `Default` value) fails every send with
/// [`RfbError::Unregistered`].
#[derive(Debug, Clone, Default)]
pub struct InputHandle {
    sink: Option<MessageSink>,
}

impl InputHandle {
    pub(crate) fn attached(sink: MessageSink) -> Self {
        Self { sink: Some(sink) }
    }

    fn sink(&self) -> Result<&MessageSink> {
        self.sink.as_ref().ok_or(RfbError::Unregistered)
    }

    /// Whether this handle has been attached to a controller.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.sink.is_some()
    }

    /// Sends a key press or release.
    ///
    /// # Errors
    ///
    /// Fails with [`RfbError::Unregistered`] before attachment and
    /// [`RfbError::Disconnected`] after transport teardown.
    pub fn key_event(&self, down: bool, key: u32) -> Result<()> {
        self.sink()?.send(protocol::key_event_message(down, key).freeze())
    }

    /// Sends a pointer event with an explicit button mask.
    ///
    /// # Errors
    ///
    /// Fails with [`RfbError::Unregistered`] before attachment and
    /// [`RfbError::Disconnected`] after transport teardown.
    pub fn pointer_event(&self, button_mask: u8, x: u16, y: u16) -> Result<()> {
        self.sink()?.send(protocol::pointer_event_message(button_mask, x, y).freeze())
    }

    /// Sends a pointer event for a logical button number.
    ///
    /// Button 1 maps to mask 0x01, button n to `1 << (n - 1)`, button 0 to
    /// no buttons. An out-of-range button is logged and dropped.
    ///
    /// # Errors
    ///
    /// Fails with [`RfbError::Unregistered`] before attachment and
    /// [`RfbError::Disconnected`] after transport teardown.
    pub fn mouse_event(&self, button: u8, x: u16, y: u16) -> Result<()> {
        let sink = self.sink()?;
        match button_mask(button) {
            Ok(mask) => sink.send(protocol::pointer_event_message(mask, x, y).freeze()),
            Err(e) => {
                warn!("Discarding invalid mouse event: {e}");
                Ok(())
            }
        }
    }

    /// Sends clipboard text to the server.
    ///
    /// # Errors
    ///
    /// Fails with [`RfbError::Unregistered`] before attachment and
    /// [`RfbError::Disconnected`] after transport teardown.
    pub fn cut_text(&self, text: &str) -> Result<()> {
        let sink = self.sink()?;
        match protocol::client_cut_text_message(text) {
            Ok(msg) => sink.send(msg.freeze()),
            Err(e) => {
                warn!("Discarding invalid cut text event: {e}");
                Ok(())
            }
        }
    }
}

/// Fans framebuffer updates out to observers and marshals input events
/// into protocol messages.
///
/// One controller exists per session, owned by the session state machine.
/// Observers are owned by the controller and torn down with it, so a
/// registered observer never outlives the callbacks it receives.
pub struct Controller {
    sink: MessageSink,
    observers: Vec<Box<dyn RfbObserver>>,
}

impl Controller {
    pub(crate) fn new(sink: MessageSink) -> Self {
        Self { sink, observers: Vec::new() }
    }

    /// Registers an observer and hands it its [`InputHandle`].
    ///
    /// Observers receive updates in registration order.
    pub fn add_observer(&mut self, mut observer: Box<dyn RfbObserver>) {
        observer.attached(InputHandle::attached(self.sink.clone()));
        self.observers.push(observer);
    }

    /// An attached input handle for application code that is not an
    /// observer.
    #[must_use]
    pub fn input_handle(&self) -> InputHandle {
        InputHandle::attached(self.sink.clone())
    }

    /// Delivers one decoded rectangle to every observer, in registration
    /// order.
    pub(crate) fn recv_rectangle(&mut self, rect: &Rectangle, pixel_format: &PixelFormat, data: &[u8]) {
        for observer in &mut self.observers {
            observer.on_update(
                rect.width,
                rect.height,
                rect.x,
                rect.y,
                pixel_format,
                rect.encoding,
                data,
            );
        }
    }

    /// Sends a key press or release.
    ///
    /// # Errors
    ///
    /// Fails with [`RfbError::Disconnected`] after transport teardown.
    pub fn send_key_event(&self, down: bool, key: u32) -> Result<()> {
        self.sink.send(protocol::key_event_message(down, key).freeze())
    }

    /// Sends a pointer event.
    ///
    /// # Errors
    ///
    /// Fails with [`RfbError::Disconnected`] after transport teardown.
    pub fn send_pointer_event(&self, button_mask: u8, x: u16, y: u16) -> Result<()> {
        self.sink.send(protocol::pointer_event_message(button_mask, x, y).freeze())
    }

    /// Sends clipboard text. Text too large for the wire is logged and
    /// dropped.
    ///
    /// # Errors
    ///
    /// Fails with [`RfbError::Disconnected`] after transport teardown.
    pub fn send_cut_text(&self, text: &str) -> Result<()> {
        match protocol::client_cut_text_message(text) {
            Ok(msg) => self.sink.send(msg.freeze()),
            Err(e) => {
                warn!("Discarding invalid cut text event: {e}");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ENCODING_RAW;
    use std::sync::{Arc, Mutex};

    struct Recorder {
        tag: u8,
        log: Arc<Mutex<Vec<(u8, u16, u16, Vec<u8>)>>>,
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
            self.log.lock().unwrap().push((self.tag, width, height, data.to_vec()));
        }
    }

    #[test]
    fn test_button_mapping() {
        assert_eq!(button_mask(0).unwrap(), 0);
        assert_eq!(button_mask(1).unwrap(), 1);
        assert_eq!(button_mask(2).unwrap(), 2);
        assert_eq!(button_mask(3).unwrap(), 4);
        assert_eq!(button_mask(4).unwrap(), 8);
        assert_eq!(button_mask(8).unwrap(), 0x80);
        assert!(button_mask(9).is_err());
    }

    #[test]
    fn test_key_event_before_attach_fails() {
        let handle = InputHandle::default();
        match handle.key_event(true, 0x41) {
            Err(RfbError::Unregistered) => {}
            other => panic!("expected Unregistered, got {:?}", other),
        }
    }

    #[test]
    fn test_attached_handle_sends_wire_bytes() {
        let (sink, mut rx) = MessageSink::channel();
        let handle = InputHandle::attached(sink);

        handle.key_event(true, 0x41).unwrap();
        handle.mouse_event(3, 10, 20).unwrap();

        assert_eq!(&rx.try_recv().unwrap()[..], &[4, 1, 0, 0, 0, 0, 0, 0x41]);
        assert_eq!(&rx.try_recv().unwrap()[..], &[5, 4, 0, 10, 0, 20]);
    }

    #[test]
    fn test_invalid_mouse_button_dropped_non_fatally() {
        let (sink, mut rx) = MessageSink::channel();
        let handle = InputHandle::attached(sink);

        handle.mouse_event(9, 0, 0).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_observer_fanout_in_registration_order() {
        let (sink, _rx) = MessageSink::channel();
        let mut controller = Controller::new(sink);
        let log = Arc::new(Mutex::new(Vec::new()));

        controller.add_observer(Box::new(Recorder { tag: 1, log: log.clone() }));
        controller.add_observer(Box::new(Recorder { tag: 2, log: log.clone() }));

        let rect = Rectangle { x: 0, y: 0, width: 2, height: 2, encoding: ENCODING_RAW };
        controller.recv_rectangle(&rect, &PixelFormat::default(), &[0xaa; 16]);

        let entries = log.lock().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, 1);
        assert_eq!(entries[1].0, 2);
        assert_eq!(entries[0].3.len(), 16);
    }

    #[test]
    fn test_send_after_close_fails_disconnected() {
        let (sink, _rx) = MessageSink::channel();
        let controller = Controller::new(sink.clone());
        sink.close();
        match controller.send_key_event(true, 0x41) {
            Err(RfbError::Disconnected) => {}
            other => panic!("expected Disconnected, got {:?}", other),
        }
    }
}
