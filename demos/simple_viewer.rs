//! Simple VNC viewer example.
//!
//! This example connects to a VNC server and logs every framebuffer
//! rectangle it receives.
//!
//! Usage:
//!   cargo run --example simple_viewer [host] [port]
//!
//! Defaults to localhost:5900.

use rustvncclient::{ClientConfig, PixelFormat, RfbObserver, VncConnection, DEFAULT_PORT};
use std::error::Error;

struct RectLogger {
    rects: u64,
    bytes: u64,
}

impl RfbObserver for RectLogger {
    fn on_update(
        &mut self,
        width: u16,
        height: u16,
        x: u16,
        y: u16,
        pixel_format: &PixelFormat,
        _encoding: i32,
        data: &[u8],
    ) {
        self.rects += 1;
        self.bytes += data.len() as u64;
        println!(
            "rect #{}: {}x{} at ({}, {}), {}bpp, {} bytes (session total {} bytes)",
            self.rects, width, height, x, y, pixel_format.bits_per_pixel, data.len(), self.bytes
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize logging
    env_logger::init();

    let host = std::env::args().nth(1).unwrap_or_else(|| "127.0.0.1".to_string());
    let port = std::env::args()
        .nth(2)
        .map(|p| p.parse())
        .transpose()?
        .unwrap_or(DEFAULT_PORT);

    println!("Connecting to {}:{}...", host, port);

    let connection = VncConnection::connect(
        &host,
        port,
        ClientConfig::default(),
        Box::new(RectLogger { rects: 0, bytes: 0 }),
    )
    .await?;

    // Run until the server disconnects (Ctrl+C to quit)
    connection.run().await?;

    Ok(())
}
