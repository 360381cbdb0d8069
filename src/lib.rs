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
//! An embeddable Remote Framebuffer (RFB/VNC) **client** library: the
//! protocol core that sits behind a viewer application, not a viewer itself.
//! It speaks RFB 3.3/3.7/3.8 to a server, decodes framebuffer updates into an
//! in-memory surface the host can read, and forwards host-originated input
//! back to the server.
//!
//! ## What this crate does
//!
//! - Negotiates the version/security/init handshake, including VNC
//!   (DES-challenge) authentication and the Tight tunnel/auth capability
//!   exchange.
//! - Decodes Raw, CopyRect, RRE, CoRRE, Hextile, zlib, ZRLE and the Rich
//!   Cursor pseudo-encoding into a shared framebuffer and cursor buffer.
//! - Runs one `tokio` task per connection (the worker), leaving the host free
//!   to drive its own event loop on its own thread.
//! - Exposes a single [`context::Context`] as the host embedding surface:
//!   connect, disconnect, poll or subscribe to events, send key/pointer/
//!   clipboard input, and take scoped RAII access to the framebuffer/cursor.
//!
//! ## What it does not do
//!
//! No rendering, no window/input-device integration, no keymap tables
//! between host keycodes and X11 keysyms, no VNC *server* role, and no
//! bundled TLS implementation for Anonymous-TLS/VeNCrypt (the transport
//! accepts any `AsyncRead + AsyncWrite` the host supplies once a TLS context
//! has been negotiated externally).
//!
//! ## Quick start
//!
//! ```no_run
//! use std::time::Duration;
//! use rustvncclient::context::{Context, ConnectionConfigBuilder, EventDelivery};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let context = Context::new(EventDelivery::Polling);
//!     let config = ConnectionConfigBuilder::new("203.0.113.5", 5900)
//!         .password("hunter2")
//!         .connect_timeout(Duration::from_secs(5))
//!         .build()?;
//!     context.connect(&config)?;
//!
//!     // Drain events from whatever loop the host already runs.
//!     while let Some(event) = context.poll_event() {
//!         println!("{event:?}");
//!     }
//!
//!     context.destroy().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
mod decoder;
mod des;
pub mod error;
pub mod events;
pub mod framebuffer;
mod handshake;
pub mod protocol;
pub mod quality;
mod security;
mod transport;
mod wire;
mod worker;

pub use context::{Context, ConnectionConfig, ConnectionConfigBuilder, EventDelivery};
pub use error::{Result, VncError};
pub use events::{CallbackSink, Event, EventQueue, EventSink};
pub use framebuffer::{Cursor, CursorGuard, Framebuffer, FramebufferGuard};
pub use protocol::PixelFormat;
pub use quality::QualityProfile;

/// Default VNC port (display `:0`).
pub const DEFAULT_PORT: u16 = protocol::DEFAULT_PORT;
