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

//! The connection worker (component C6): one `tokio` task per [`crate::context::Context`],
//! running the state machine described in `SPEC_FULL.md` §4.6.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{Buf, BufMut, BytesMut};
use log::{info, warn};
use tokio::sync::Notify;

use crate::decoder::{self, DecoderState};
use crate::error::VncError;
use crate::events::{ConnectedInfo, Event, EventSink};
use crate::framebuffer::SharedSurfaces;
use crate::handshake;
use crate::protocol::{
    limits, CLIENT_MSG_CLIENT_CUT_TEXT, CLIENT_MSG_FRAMEBUFFER_UPDATE_REQUEST, CLIENT_MSG_KEY_EVENT,
    CLIENT_MSG_POINTER_EVENT, CLIENT_MSG_SET_PIXEL_FORMAT, SERVER_MSG_BELL, SERVER_MSG_FRAMEBUFFER_UPDATE,
    SERVER_MSG_SERVER_CUT_TEXT, SERVER_MSG_SET_COLOUR_MAP_ENTRIES,
};
use crate::quality::QualityProfile;
use crate::transport::Transport;

/// The worker's connection state, mirrored to the host only through events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket open; waiting for a host `connect()` call.
    NotConnected,
    /// A connect request is queued; the handshake has not started yet.
    StartConnection,
    /// The handshake succeeded; normal message exchange is under way.
    Connected,
}

/// Parameters for a pending connect request, set by the host and consumed
/// once by the worker.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    /// Hostname or address to dial.
    pub host: String,
    /// TCP port to dial.
    pub port: u16,
    /// Password used for VNC/Tight authentication, if the server asks for one.
    pub password: Vec<u8>,
    /// Whether to request a shared (non-exclusive) session.
    pub shared_access: bool,
    /// Initial pixel format quality preference.
    pub quality: QualityProfile,
    /// Connect timeout.
    pub timeout: Duration,
}

/// State shared between the host and the worker task, behind one mutex.
#[derive(Default)]
pub struct WorkerSharedData {
    /// Current state, set by the worker, read by the host.
    pub state: ConnectionStateSlot,
    /// Set by the host to request a new connection; taken by the worker.
    pub connect_request: Option<ConnectRequest>,
    /// Set by the host to request teardown of the current connection attempt.
    pub abort: bool,
    /// Set once, from the destructor only; supersedes any reconnect.
    pub want_quit: bool,
    /// When set, input events are dropped instead of queued.
    pub viewonly: bool,
    /// A newly chosen quality profile, collapsing any previous pending one.
    pub pending_pixel_format: Option<QualityProfile>,
    /// Queued outbound key events, oldest first.
    pub pending_keys: VecDeque<(bool, u32)>,
    /// Queued outbound pointer events, oldest first.
    pub pending_pointer: VecDeque<(u16, u16, u8)>,
    /// Set by the host to request a `FramebufferUpdateRequest`; `bool` is `incremental`.
    pub pending_update_request: Option<(bool, u16, u16, u16, u16)>,
    /// Queued outbound clipboard pushes (`ClientCutText`), oldest first.
    pub pending_cut_text: VecDeque<String>,
    /// Five opaque host-owned slots (see `Context::set_user_data`).
    pub user_data: [usize; 5],
}

/// A small wrapper so `ConnectionState` has a sensible `Default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStateSlot(pub ConnectionState);

impl Default for ConnectionStateSlot {
    fn default() -> Self {
        Self(ConnectionState::NotConnected)
    }
}

/// Byte-traffic counters exposed to the host independent of the shared mutex.
#[derive(Default)]
pub struct Counters {
    /// Total bytes sent on the current (or most recent) transport.
    pub bytes_sent: Arc<AtomicU64>,
    /// Total bytes received on the current (or most recent) transport.
    pub bytes_received: Arc<AtomicU64>,
}

/// Runs the worker's main loop until `want_quit` is observed. Spawned once
/// per `Context` with `tokio::spawn`.
pub async fn run(
    shared: Arc<Mutex<WorkerSharedData>>,
    surfaces: Arc<SharedSurfaces>,
    events: Arc<dyn EventSink>,
    cancel: Arc<Notify>,
    counters: Arc<Counters>,
) {
    info!("connection worker starting");
    events.on_event(Event::ThreadStarted("vnc-worker".to_string()));

    let mut decoder_state = DecoderState::new();

    loop {
        let (state, abort, want_quit, connect_request) = {
            let mut guard = shared.lock().expect("worker mutex poisoned");
            let abort = guard.abort;
            let want_quit = guard.want_quit;
            guard.abort = false;
            let connect_request = if matches!(guard.state.0, ConnectionState::NotConnected) {
                guard.connect_request.take()
            } else {
                None
            };
            (guard.state.0, abort, want_quit, connect_request)
        };

        if want_quit {
            break;
        }

        if abort {
            match state {
                ConnectionState::StartConnection => {
                    set_state(&shared, ConnectionState::NotConnected);
                    continue;
                }
                ConnectionState::Connected => {
                    events.on_event(Event::Disconnected {
                        hostname: String::new(),
                        port: 0,
                        graceful: true,
                        error: None,
                    });
                    events.clear();
                    set_state(&shared, ConnectionState::NotConnected);
                    continue;
                }
                ConnectionState::NotConnected => {}
            }
        }

        match state {
            ConnectionState::NotConnected => {
                if let Some(request) = connect_request {
                    set_state(&shared, ConnectionState::StartConnection);
                    run_connection(
                        &shared,
                        &surfaces,
                        &events,
                        &cancel,
                        &counters,
                        &mut decoder_state,
                        request,
                    )
                    .await;
                } else {
                    cancel.notified().await;
                }
            }
            ConnectionState::StartConnection | ConnectionState::Connected => {
                // Reached only if a stray iteration observes a state the
                // host hasn't acted on yet (e.g. between connect() and this
                // task's next scheduling); yield once and retry.
                tokio::task::yield_now().await;
            }
        }
    }

    events.on_event(Event::ThreadAboutToStop("vnc-worker".to_string()));
    info!("connection worker stopping");
}

fn set_state(shared: &Mutex<WorkerSharedData>, state: ConnectionState) {
    shared.lock().expect("worker mutex poisoned").state.0 = state;
}

#[allow(clippy::too_many_arguments)]
async fn run_connection(
    shared: &Mutex<WorkerSharedData>,
    surfaces: &Arc<SharedSurfaces>,
    events: &Arc<dyn EventSink>,
    cancel: &Notify,
    counters: &Counters,
    decoder_state: &mut DecoderState,
    request: ConnectRequest,
) {
    let host = request.host.clone();
    let port = request.port;

    let connect_result = Transport::connect(
        &host,
        port,
        request.timeout,
        cancel,
        counters.bytes_sent.clone(),
        counters.bytes_received.clone(),
    )
    .await;

    let mut transport = match connect_result {
        Ok(t) => t,
        Err(e) => {
            fail_connection(events, &host, port, e);
            set_state(shared, ConnectionState::NotConnected);
            return;
        }
    };

    let handshake_result =
        handshake::run(&mut transport, &request.password, request.shared_access, &request.quality, cancel)
            .await;

    let handshake_result = match handshake_result {
        Ok(r) => r,
        Err(e) => {
            fail_connection(events, &host, port, e);
            set_state(shared, ConnectionState::NotConnected);
            return;
        }
    };

    surfaces
        .framebuffer_mut()
        .resize(handshake_result.framebuffer_width, handshake_result.framebuffer_height);

    events.on_event(Event::ConnectResult {
        hostname: host.clone(),
        port,
        result: Ok(ConnectedInfo {
            framebuffer_width: handshake_result.framebuffer_width,
            framebuffer_height: handshake_result.framebuffer_height,
            desktop_name: handshake_result.desktop_name.clone(),
            pixel_format: handshake_result.communication_pixel_format,
            security_type: handshake_result.security_type,
        }),
    });

    set_state(shared, ConnectionState::Connected);

    let mut format = handshake_result.communication_pixel_format;
    let outcome = connected_loop(shared, surfaces, events, cancel, decoder_state, &mut transport, &mut format).await;

    set_state(shared, ConnectionState::NotConnected);
    let error = outcome.err().map(|e| e.truncated_message());
    events.on_event(Event::Disconnected { hostname: host, port, graceful: error.is_none(), error });
    decoder_state.reset();
}

fn fail_connection(events: &dyn EventSink, hostname: &str, port: u16, error: VncError) {
    warn!("connect to {hostname}:{port} failed: {error}");
    let message = error.truncated_message();
    events.on_event(Event::ConnectResult { hostname: hostname.to_string(), port, result: Err(message.clone()) });
    events.on_event(Event::Disconnected {
        hostname: hostname.to_string(),
        port,
        graceful: false,
        error: Some(message),
    });
}

async fn connected_loop(
    shared: &Mutex<WorkerSharedData>,
    surfaces: &Arc<SharedSurfaces>,
    events: &Arc<dyn EventSink>,
    cancel: &Notify,
    decoder_state: &mut DecoderState,
    transport: &mut Transport,
    format: &mut crate::protocol::PixelFormat,
) -> crate::error::Result<()> {
    loop {
        let (abort, want_quit, pixel_format, keys, pointer, update_request, cut_text) = {
            let mut guard = shared.lock().expect("worker mutex poisoned");
            let abort = guard.abort;
            let want_quit = guard.want_quit;
            guard.abort = false;
            let pixel_format = guard.pending_pixel_format.take();
            let keys: Vec<_> = guard.pending_keys.drain(..).collect();
            let pointer: Vec<_> = guard.pending_pointer.drain(..).collect();
            let update_request = guard.pending_update_request.take();
            let cut_text: Vec<_> = guard.pending_cut_text.drain(..).collect();
            (abort, want_quit, pixel_format, keys, pointer, update_request, cut_text)
        };

        if abort || want_quit {
            return Ok(());
        }

        if let Some(quality) = pixel_format {
            let new_format = derive_format(&quality, format);
            write_set_pixel_format(transport, &new_format).await?;
            *format = new_format;
        }

        for (down, keysym) in keys {
            write_key_event(transport, down, keysym).await?;
        }
        for (x, y, mask) in pointer {
            write_pointer_event(transport, x, y, mask).await?;
        }
        if let Some((incremental, x, y, w, h)) = update_request {
            write_update_request(transport, incremental, x, y, w, h).await?;
        }
        for text in cut_text {
            write_client_cut_text(transport, &text).await?;
        }

        match transport.wait_readable(Some(Duration::from_millis(250)), cancel).await {
            crate::transport::WaitOutcome::Ready => {
                dispatch_one_message(transport, format, surfaces, events, decoder_state).await?;
            }
            crate::transport::WaitOutcome::Timeout => continue,
            crate::transport::WaitOutcome::Cancelled => return Ok(()),
        }
    }
}

fn derive_format(quality: &QualityProfile, current: &crate::protocol::PixelFormat) -> crate::protocol::PixelFormat {
    use crate::protocol::PixelFormat;
    match quality {
        QualityProfile::Low => PixelFormat::rgb332(),
        QualityProfile::Medium => PixelFormat::rgb565(),
        QualityProfile::Best => PixelFormat::xrgb8888(),
        QualityProfile::ServerDefault => *current,
        QualityProfile::Custom(custom) => {
            if custom.is_valid_for_send() && !custom.is_palette_mode() {
                *custom
            } else {
                PixelFormat::fallback_for_bpp(custom.bits_per_pixel)
            }
        }
    }
}

async fn dispatch_one_message(
    transport: &mut Transport,
    format: &crate::protocol::PixelFormat,
    surfaces: &SharedSurfaces,
    events: &dyn EventSink,
    decoder_state: &mut DecoderState,
) -> crate::error::Result<()> {
    let mut type_buf = [0u8; 1];
    transport.read_exact(&mut type_buf).await?;

    match type_buf[0] {
        SERVER_MSG_FRAMEBUFFER_UPDATE => {
            decoder::read_framebuffer_update(transport, format, surfaces, events, decoder_state).await
        }
        SERVER_MSG_SET_COLOUR_MAP_ENTRIES => {
            let mut header = [0u8; 5];
            transport.read_exact(&mut header).await?;
            let count = u16::from_be_bytes([header[3], header[4]]);
            let mut entries = vec![0u8; usize::from(count) * 6];
            transport.read_exact(&mut entries).await?;
            info!("server sent {count} colour map entries (parsed, not applied)");
            Ok(())
        }
        SERVER_MSG_BELL => {
            events.on_event(Event::Bell);
            Ok(())
        }
        SERVER_MSG_SERVER_CUT_TEXT => {
            let mut header = [0u8; 7];
            transport.read_exact(&mut header).await?;
            let len = u32::from_be_bytes([header[3], header[4], header[5], header[6]]) as usize;
            let capped = len.min(limits::MAX_CUT_TEXT_LEN);
            let mut text = vec![0u8; capped];
            transport.read_exact(&mut text).await?;
            if len > capped {
                let mut discard = vec![0u8; len - capped];
                transport.read_exact(&mut discard).await?;
            }
            let latin1 = text.iter().map(|&b| b as char).collect::<String>();
            events.on_event(Event::CutText(latin1));
            Ok(())
        }
        other => Err(VncError::ProtocolError(format!("unknown server message type {other}"))),
    }
}

async fn write_set_pixel_format(transport: &mut Transport, format: &crate::protocol::PixelFormat) -> crate::error::Result<()> {
    let mut buf = BytesMut::with_capacity(20);
    buf.put_u8(CLIENT_MSG_SET_PIXEL_FORMAT);
    buf.put_bytes(0, 3);
    format.write_to(&mut buf);
    transport.write_all(&buf).await
}

async fn write_key_event(transport: &mut Transport, down: bool, keysym: u32) -> crate::error::Result<()> {
    let mut buf = BytesMut::with_capacity(8);
    buf.put_u8(CLIENT_MSG_KEY_EVENT);
    buf.put_u8(u8::from(down));
    buf.put_u16(0);
    buf.put_u32(keysym);
    transport.write_all(&buf).await
}

async fn write_pointer_event(transport: &mut Transport, x: u16, y: u16, button_mask: u8) -> crate::error::Result<()> {
    let mut buf = BytesMut::with_capacity(6);
    buf.put_u8(CLIENT_MSG_POINTER_EVENT);
    buf.put_u8(button_mask);
    buf.put_u16(x);
    buf.put_u16(y);
    transport.write_all(&buf).await
}

async fn write_update_request(
    transport: &mut Transport,
    incremental: bool,
    x: u16,
    y: u16,
    w: u16,
    h: u16,
) -> crate::error::Result<()> {
    let mut buf = BytesMut::with_capacity(10);
    buf.put_u8(CLIENT_MSG_FRAMEBUFFER_UPDATE_REQUEST);
    buf.put_u8(u8::from(incremental));
    buf.put_u16(x);
    buf.put_u16(y);
    buf.put_u16(w);
    buf.put_u16(h);
    transport.write_all(&buf).await
}

/// Writes client cut text (host clipboard push); exposed for `Context` to
/// call directly since it needs no worker-loop ordering against events.
pub async fn write_client_cut_text(transport: &mut Transport, text: &str) -> crate::error::Result<()> {
    let bytes: Vec<u8> = text.chars().map(|c| c as u8).collect();
    let capped = &bytes[..bytes.len().min(limits::MAX_CUT_TEXT_LEN)];
    let mut buf = BytesMut::with_capacity(8 + capped.len());
    buf.put_u8(CLIENT_MSG_CLIENT_CUT_TEXT);
    buf.put_bytes(0, 3);
    buf.put_u32(capped.len() as u32);
    buf.put_slice(capped);
    transport.write_all(&buf).await
}
