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


//! # rustvncclient
//!
//! A pure Rust implementation of a VNC (Virtual Network Computing) client
//! protocol core.
//!
//! This library implements the client side of the RFB (Remote Framebuffer)
//! protocol (RFC 6143): version negotiation for RFB 3.3/3.7/3.8, security
//! scheme selection (None end-to-end, VNC authentication framing), the
//! initialization exchange, and the steady-state framebuffer update loop
//! with Raw-encoded rectangles. Wire encoding is byte-exact big-endian.
//!
//! ## Features
//!
//! - **Event-driven core**: the session is a pull-model state machine that
//!   declares how many bytes it needs next; the transport feeds it segments
//!   of any size
//! - **Observer fan-out**: rectangle deliveries reach registered observers
//!   in registration order, with raw pixel bytes and the negotiated format
//! - **Input marshaling**: key, pointer and cut-text events are encoded and
//!   queued without blocking, and bad local input never kills the session
//! - **Async transport**: a Tokio TCP driver is included, but the core runs
//!   against any byte stream
//! - **Memory safe**: pure Rust with zero unsafe code
//!
//! ## Quick Start
//!
//! ```no_run
//! use rustvncclient::{ClientConfig, PixelFormat, RfbObserver, VncConnection};
//!
//! struct Logger;
//!
//! impl RfbObserver for Logger {
//!     fn on_update(
//!         &mut self,
//!         width: u16,
//!         height: u16,
//!         x: u16,
//!         y: u16,
//!         _pixel_format: &PixelFormat,
//!         _encoding: i32,
//!         data: &[u8],
//!     ) {
//!         println!("rect {}x{} at ({}, {}): {} bytes", width, height, x, y, data.len());
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Connect and attach an observer for framebuffer updates
//!     let connection = VncConnection::connect(
//!         "127.0.0.1",
//!         5900,
//!         ClientConfig::default(),
//!         Box::new(Logger),
//!     )
//!     .await?;
//!
//!     // Input events can be sent from other tasks via a cloned handle
//!     let _inputs = connection.input_handle();
//!
//!     // Drive the session until the server disconnects
//!     connection.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           Your Application              │
//! │                                         │
//! │  • Implement RfbObserver                │
//! │  • Send input events                    │
//! │  • Control connection lifecycle         │
//! └──────────────────┬──────────────────────┘
//!                    │
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │        VncConnection (Public)           │
//! │                                         │
//! │  • TCP transport                        │
//! │  • Inbound segment pump                 │
//! │  • Outbound message queue               │
//! └──────────────────┬──────────────────────┘
//!                    │
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │       RfbClient (State Machine)         │
//! │                                         │
//! │  • Handshake graph (3.3/3.7/3.8)        │
//! │  • Expectation dispatcher               │
//! │  • Update loop + request cadence        │
//! └──────────────────┬──────────────────────┘
//!                    │
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │         Controller + Observers          │
//! │                                         │
//! │  • Rectangle fan-out                    │
//! │  • Key/pointer/cut-text marshaling      │
//! └─────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod observer;
pub mod protocol;
pub mod stream;
pub mod transport;

// Internal modules
mod client;

// Re-exports
pub use client::RfbClient;
pub use config::ClientConfig;
pub use controller::{Controller, InputHandle};
pub use error::{Result, RfbError};
pub use observer::RfbObserver;
pub use protocol::{PixelFormat, ProtocolVersion, Rectangle, ServerInit};
pub use transport::{MessageSink, VncConnection};

/// VNC protocol version.
pub const PROTOCOL_VERSION: &str = "RFB 003.008\n";

/// Default VNC port.
pub const DEFAULT_PORT: u16 = 5900;
