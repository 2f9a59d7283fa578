//! Observer contract for rendering layers.

use crate::controller::InputHandle;
use crate::protocol::PixelFormat;

/// Receives framebuffer updates from a VNC session.
///
/// An observer is registered with the session's
/// [`Controller`](crate::controller::Controller) before the connection is
/// driven. On registration it is handed an [`InputHandle`], its non-owning
/// link back to the controller, through which it may emit key and pointer
/// events. The handle does not keep the session alive; once the transport
/// disconnects, sends through it fail.
pub trait RfbObserver: Send {
    /// Called once when the observer is registered with a controller.
    ///
    /// The default implementation discards the handle, for observers that
    /// only render and never send input.
    fn attached(&mut self, inputs: InputHandle) {
        let _ = inputs;
    }

    /// Delivers one framebuffer rectangle.
    ///
    /// `data` is the raw rectangle body; the observer interprets it using
    /// `pixel_format` and `encoding`. Heavy decoding work should be
    /// offloaded - this runs on the session's event loop.
    ///
    /// # Arguments
    ///
    /// * `width` - Width of the rectangle in pixels.
    /// * `height` - Height of the rectangle in pixels.
    /// * `x` - X coordinate of the top-left corner.
    /// * `y` - Y coordinate of the top-left corner.
    /// * `pixel_format` - The pixel format the client negotiated.
    /// * `encoding` - The encoding of `data` (always Raw for this client).
    /// * `data` - The rectangle body bytes.
    #[allow(clippy::too_many_arguments)]
    fn on_update(
        &mut self,
        width: u16,
        height: u16,
        x: u16,
        y: u16,
        pixel_format: &PixelFormat,
        encoding: i32,
        data: &[u8],
    );
}
