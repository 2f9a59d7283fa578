//! Per-session client configuration.

use crate::protocol::{PixelFormat, SECURITY_TYPE_NONE, SECURITY_TYPE_VNC_AUTH};

/// Configuration for a VNC client session.
///
/// The defaults match what a stock viewer sends: 32-bit little-endian true
/// colour, exclusive desktop access, and the strongest mutually supported
/// security scheme.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Pixel format the client asks the server to deliver updates in.
    pub preferred_pixel_format: PixelFormat,
    /// Whether to request shared (non-exclusive) access to the desktop.
    pub shared: bool,
    /// Security schemes the client will accept, in preference order.
    ///
    /// The first scheme also offered by the server wins. The default
    /// prefers VNC authentication over None, i.e. the numerically highest
    /// supported scheme.
    pub security_preference: Vec<u8>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            preferred_pixel_format: PixelFormat::default(),
            shared: false,
            security_preference: vec![SECURITY_TYPE_VNC_AUTH, SECURITY_TYPE_NONE],
        }
    }
}
