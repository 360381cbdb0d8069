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

//! The host embedding surface (component C7): [`Context`], the root object a
//! host constructs, connects, polls, and eventually destroys.
//!
//! A `Context` owns one worker task (spawned with `tokio::spawn`, one per
//! context, per `SPEC_FULL.md` §9), the shared framebuffer/cursor surfaces,
//! and either an internal polling queue or a host-supplied [`EventSink`] for
//! event delivery. It must be used from a single host thread at a time; the
//! worker runs independently on whatever runtime it was spawned from.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::error::{Result, VncError};
use crate::events::{Event, EventQueue, EventSink};
use crate::framebuffer::{CursorGuard, FramebufferGuard, SharedSurfaces};
use crate::protocol::limits;
use crate::quality::QualityProfile;
use crate::worker::{self, ConnectRequest, ConnectionState, Counters, WorkerSharedData};

const LATENCY_PROBE_WINDOW: usize = 32;

/// Per-connect-attempt parameters, produced only by [`ConnectionConfigBuilder`]
/// so that every bound is checked once, before any socket is opened.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    host: String,
    port: u16,
    password: Vec<u8>,
    shared_access: bool,
    viewonly: bool,
    quality: QualityProfile,
    connect_timeout: Duration,
}

impl ConnectionConfig {
    /// The host name or address this configuration dials.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The TCP port this configuration dials.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether the connection starts in view-only mode.
    #[must_use]
    pub fn viewonly(&self) -> bool {
        self.viewonly
    }
}

/// Builder for [`ConnectionConfig`].
///
/// ```
/// use rustvncclient::context::ConnectionConfigBuilder;
///
/// let config = ConnectionConfigBuilder::new("203.0.113.5", 5900)
///     .password("hunter2")
///     .viewonly(true)
///     .build()
///     .unwrap();
/// assert!(config.viewonly());
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfigBuilder {
    host: String,
    port: u16,
    password: Vec<u8>,
    shared_access: bool,
    viewonly: bool,
    quality: QualityProfile,
    connect_timeout: Duration,
}

impl ConnectionConfigBuilder {
    /// Starts a builder for `host:port`, with shared access on, view-only
    /// off, [`QualityProfile::default`] and a 10-second connect timeout.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            password: Vec::new(),
            shared_access: true,
            viewonly: false,
            quality: QualityProfile::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Sets the password sent for VNC/Tight authentication, if the server asks.
    #[must_use]
    pub fn password(mut self, password: impl Into<Vec<u8>>) -> Self {
        self.password = password.into();
        self
    }

    /// Whether to request shared (non-exclusive) access in `ClientInit`.
    #[must_use]
    pub fn shared_access(mut self, shared_access: bool) -> Self {
        self.shared_access = shared_access;
        self
    }

    /// Whether input events are dropped instead of sent to the server.
    #[must_use]
    pub fn viewonly(mut self, viewonly: bool) -> Self {
        self.viewonly = viewonly;
        self
    }

    /// The initial pixel-format quality preference.
    #[must_use]
    pub fn quality(mut self, quality: QualityProfile) -> Self {
        self.quality = quality;
        self
    }

    /// How long to wait for the TCP connect before giving up.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Validates the accumulated parameters, returning
    /// [`VncError::InvalidOperation`] if any bound is violated. No socket is
    /// opened here or by a failed call.
    pub fn build(self) -> Result<ConnectionConfig> {
        if self.host.is_empty() {
            return Err(VncError::InvalidOperation("host must not be empty".to_string()));
        }
        if self.host.len() > limits::MAX_HOSTNAME_LEN {
            return Err(VncError::InvalidOperation(format!(
                "host name of {} bytes exceeds the {}-byte cap",
                self.host.len(),
                limits::MAX_HOSTNAME_LEN
            )));
        }
        if self.password.len() > limits::MAX_PASSWORD_LEN {
            return Err(VncError::InvalidOperation(format!(
                "password of {} bytes exceeds the {}-byte cap",
                self.password.len(),
                limits::MAX_PASSWORD_LEN
            )));
        }
        Ok(ConnectionConfig {
            host: self.host,
            port: self.port,
            password: self.password,
            shared_access: self.shared_access,
            viewonly: self.viewonly,
            quality: self.quality,
            connect_timeout: self.connect_timeout,
        })
    }
}

/// How the worker delivers events to the host (§4.6/§9).
pub enum EventDelivery {
    /// Accumulate events in an internal bounded queue, drained by [`Context::poll_event`].
    Polling,
    /// Invoke the given sink synchronously from the worker task for each event.
    /// The implementation must not block for long; it runs on the worker's task.
    Callback(Arc<dyn EventSink>),
}

#[derive(Default)]
struct LatencyProbeState {
    enabled: bool,
    pending: Option<Instant>,
    samples: std::collections::VecDeque<Duration>,
}

impl LatencyProbeState {
    fn record(&mut self, elapsed: Duration) {
        if self.samples.len() >= LATENCY_PROBE_WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(elapsed);
    }

    fn average(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let total: Duration = self.samples.iter().sum();
        Some(total / self.samples.len() as u32)
    }
}

/// Wraps the host's chosen [`EventSink`] to piggyback the optional latency
/// probe (C8, §4.7) on the `FramebufferUpdateRequest`/`FramebufferUpdateRequestFinished`
/// pairing, without affecting wire behaviour or what the host's sink observes.
struct ProbeSink {
    inner: Arc<dyn EventSink>,
    state: Mutex<LatencyProbeState>,
}

impl ProbeSink {
    fn new(inner: Arc<dyn EventSink>) -> Self {
        Self { inner, state: Mutex::new(LatencyProbeState::default()) }
    }

    fn mark_request(&self) {
        let mut state = self.state.lock().expect("latency probe mutex poisoned");
        if state.enabled {
            state.pending = Some(Instant::now());
        }
    }

    fn set_enabled(&self, enabled: bool) {
        let mut state = self.state.lock().expect("latency probe mutex poisoned");
        state.enabled = enabled;
        if !enabled {
            state.pending = None;
        }
    }

    fn average(&self) -> Option<Duration> {
        self.state.lock().expect("latency probe mutex poisoned").average()
    }
}

impl EventSink for ProbeSink {
    fn on_event(&self, event: Event) {
        if matches!(event, Event::FramebufferUpdateRequestFinished) {
            let mut state = self.state.lock().expect("latency probe mutex poisoned");
            if let Some(start) = state.pending.take() {
                let elapsed = start.elapsed();
                state.record(elapsed);
            }
        }
        self.inner.on_event(event);
    }

    fn clear(&self) {
        self.inner.clear();
    }
}

/// The root object the host interacts with. Holds one worker, one event
/// queue (or callback sink), opaque host user-data slots, and the shared
/// framebuffer/cursor surfaces.
pub struct Context {
    shared: Arc<Mutex<WorkerSharedData>>,
    surfaces: Arc<SharedSurfaces>,
    queue: Option<Arc<EventQueue>>,
    cancel: Arc<Notify>,
    counters: Arc<Counters>,
    probe: Arc<ProbeSink>,
    worker: Option<JoinHandle<()>>,
}

impl Context {
    /// Creates a context and spawns its worker task on the current `tokio`
    /// runtime. No socket is opened until [`Context::connect`] is called.
    #[must_use]
    pub fn new(delivery: EventDelivery) -> Self {
        let shared = Arc::new(Mutex::new(WorkerSharedData::default()));
        let surfaces = SharedSurfaces::new(0, 0);
        let cancel = Arc::new(Notify::new());
        let counters = Arc::new(Counters::default());

        let (queue, inner_sink): (Option<Arc<EventQueue>>, Arc<dyn EventSink>) = match delivery {
            EventDelivery::Polling => {
                let queue = Arc::new(EventQueue::new());
                (Some(queue.clone()), queue as Arc<dyn EventSink>)
            }
            EventDelivery::Callback(sink) => (None, sink),
        };
        let probe = Arc::new(ProbeSink::new(inner_sink));

        let worker = tokio::spawn(worker::run(
            shared.clone(),
            surfaces.clone(),
            probe.clone() as Arc<dyn EventSink>,
            cancel.clone(),
            counters.clone(),
        ));

        Self { shared, surfaces, queue, cancel, counters, probe, worker: Some(worker) }
    }

    /// Queues a connect attempt. Returns immediately; the outcome arrives as
    /// an [`Event::ConnectResult`]. Fails synchronously only if a connection
    /// is already active or pending.
    pub fn connect(&self, config: &ConnectionConfig) -> Result<()> {
        let mut guard = self.shared.lock().expect("worker mutex poisoned");
        if !matches!(guard.state.0, ConnectionState::NotConnected) || guard.connect_request.is_some() {
            return Err(VncError::InvalidOperation("a connection is already active".to_string()));
        }
        guard.viewonly = config.viewonly;
        guard.connect_request = Some(ConnectRequest {
            host: config.host.clone(),
            port: config.port,
            password: config.password.clone(),
            shared_access: config.shared_access,
            quality: config.quality,
            timeout: config.connect_timeout,
        });
        drop(guard);
        self.cancel.notify_one();
        Ok(())
    }

    /// Tears down the current connection attempt or session. A no-op if
    /// already disconnected. The outcome arrives as an [`Event::Disconnected`]
    /// with `graceful: true`.
    pub fn disconnect(&self) {
        self.shared.lock().expect("worker mutex poisoned").abort = true;
        self.cancel.notify_one();
    }

    /// Whether the worker has completed the handshake and is exchanging
    /// framebuffer messages.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self.shared.lock().expect("worker mutex poisoned").state.0, ConnectionState::Connected)
    }

    /// Queues a `FramebufferUpdateRequest` for `{x, y, width, height}`.
    pub fn request_framebuffer_update(&self, x: u16, y: u16, width: u16, height: u16, incremental: bool) {
        self.probe.mark_request();
        self.shared.lock().expect("worker mutex poisoned").pending_update_request =
            Some((incremental, x, y, width, height));
        self.cancel.notify_one();
    }

    /// Queues a full, non-incremental `FramebufferUpdateRequest` covering the
    /// whole current framebuffer.
    pub fn request_framebuffer_update_full(&self) {
        let (width, height) = {
            let fb = self.surfaces.framebuffer_mut();
            (fb.width(), fb.height())
        };
        self.request_framebuffer_update(0, 0, width, height, false);
    }

    /// Pops the oldest queued event, if any. Always returns `None` when the
    /// context was constructed with [`EventDelivery::Callback`].
    pub fn poll_event(&self) -> Option<Event> {
        self.queue.as_ref().and_then(|queue| queue.pop())
    }

    /// Queues a `KeyEvent`. Dropped silently (not queued) while view-only.
    pub fn send_key_event(&self, down: bool, keysym: u32) {
        let mut guard = self.shared.lock().expect("worker mutex poisoned");
        if guard.viewonly {
            return;
        }
        guard.pending_keys.push_back((down, keysym));
        drop(guard);
        self.cancel.notify_one();
    }

    /// Queues a `PointerEvent`, clamping `{x, y}` to the current framebuffer
    /// rectangle. Dropped silently (not queued) while view-only.
    pub fn send_pointer_event(&self, x: u16, y: u16, button_mask: u8) {
        let (max_x, max_y) = {
            let fb = self.surfaces.framebuffer_mut();
            (fb.width().saturating_sub(1), fb.height().saturating_sub(1))
        };
        let mut guard = self.shared.lock().expect("worker mutex poisoned");
        if guard.viewonly {
            return;
        }
        guard.pending_pointer.push_back((x.min(max_x), y.min(max_y), button_mask));
        drop(guard);
        self.cancel.notify_one();
    }

    /// Queues a `ClientCutText` (clipboard push). Dropped silently while
    /// view-only; rejected if `text` exceeds the clipboard size cap.
    pub fn send_cut_text(&self, text: &str) -> Result<()> {
        if text.len() > limits::MAX_CUT_TEXT_LEN {
            return Err(VncError::InvalidOperation(format!(
                "clipboard text of {} bytes exceeds the {}-byte cap",
                text.len(),
                limits::MAX_CUT_TEXT_LEN
            )));
        }
        let mut guard = self.shared.lock().expect("worker mutex poisoned");
        if guard.viewonly {
            return Ok(());
        }
        guard.pending_cut_text.push_back(text.to_string());
        drop(guard);
        self.cancel.notify_one();
        Ok(())
    }

    /// Requests a pixel-format change on the live connection; collapses with
    /// any not-yet-sent previous request.
    pub fn set_quality(&self, quality: QualityProfile) {
        self.shared.lock().expect("worker mutex poisoned").pending_pixel_format = Some(quality);
        self.cancel.notify_one();
    }

    /// Sets the view-only flag. When set, [`Context::send_key_event`],
    /// [`Context::send_pointer_event`] and [`Context::send_cut_text`] drop
    /// their input silently instead of queueing it.
    pub fn set_viewonly(&self, viewonly: bool) {
        self.shared.lock().expect("worker mutex poisoned").viewonly = viewonly;
    }

    /// Whether the view-only flag is currently set.
    #[must_use]
    pub fn is_viewonly(&self) -> bool {
        self.shared.lock().expect("worker mutex poisoned").viewonly
    }

    /// Stores an opaque value in one of 5 host-owned slots (`0..5`).
    pub fn set_user_data(&self, slot: usize, value: usize) -> Result<()> {
        let mut guard = self.shared.lock().expect("worker mutex poisoned");
        let target = guard
            .user_data
            .get_mut(slot)
            .ok_or_else(|| VncError::InvalidOperation(format!("user-data slot {slot} is out of range (0..5)")))?;
        *target = value;
        Ok(())
    }

    /// Reads back a value previously stored with [`Context::set_user_data`];
    /// `0` if never set.
    pub fn get_user_data(&self, slot: usize) -> Result<usize> {
        let guard = self.shared.lock().expect("worker mutex poisoned");
        guard
            .user_data
            .get(slot)
            .copied()
            .ok_or_else(|| VncError::InvalidOperation(format!("user-data slot {slot} is out of range (0..5)")))
    }

    /// Takes the scoped, RAII framebuffer acquisition: blocks the worker from
    /// writing for as long as the guard is held, and releases automatically
    /// on drop.
    #[must_use]
    pub fn acquire_framebuffer(&self) -> FramebufferGuard<'_> {
        FramebufferGuard::new(self.surfaces.framebuffer_mut())
    }

    /// Takes the scoped, RAII cursor acquisition. See [`Context::acquire_framebuffer`].
    #[must_use]
    pub fn acquire_cursor(&self) -> CursorGuard<'_> {
        CursorGuard::new(self.surfaces.cursor_mut())
    }

    /// Total bytes written to the transport so far (reset on each new
    /// connection attempt).
    #[must_use]
    pub fn bytes_sent(&self) -> u64 {
        self.counters.bytes_sent.load(Ordering::Relaxed)
    }

    /// Total bytes read from the transport so far (reset on each new
    /// connection attempt).
    #[must_use]
    pub fn bytes_received(&self) -> u64 {
        self.counters.bytes_received.load(Ordering::Relaxed)
    }

    /// Enables or disables the optional latency probe (C8, §4.7). Disabled by
    /// default; has no effect on wire behaviour.
    pub fn set_latency_probe_enabled(&self, enabled: bool) {
        self.probe.set_enabled(enabled);
    }

    /// The rolling average round-trip time over the most recent completed
    /// `FramebufferUpdateRequest`/`FramebufferUpdateRequestFinished` pairs,
    /// or `None` if the probe is disabled or no sample has completed yet.
    #[must_use]
    pub fn average_latency(&self) -> Option<Duration> {
        self.probe.average()
    }

    /// Interrupts and joins the worker task, then consumes the context. The
    /// graceful counterpart to letting a `Context` simply drop, which can
    /// only best-effort abort the task since `Drop` cannot await.
    pub async fn destroy(mut self) {
        self.shared.lock().expect("worker mutex poisoned").want_quit = true;
        self.cancel.notify_one();
        if let Some(handle) = self.worker.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.shared.lock() {
            guard.want_quit = true;
        }
        self.cancel.notify_one();
        // Best-effort only: Drop cannot await the worker's graceful exit, so
        // a context dropped without calling `destroy` aborts the task instead
        // of joining it.
        if let Some(handle) = self.worker.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_rejects_empty_host() {
        let result = ConnectionConfigBuilder::new("", 5900).build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_rejects_oversized_password() {
        let result = ConnectionConfigBuilder::new("localhost", 5900)
            .password(vec![0u8; limits::MAX_PASSWORD_LEN + 1])
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_accepts_reasonable_config() {
        let config = ConnectionConfigBuilder::new("localhost", 5900)
            .password("secret")
            .viewonly(true)
            .build()
            .unwrap();
        assert_eq!(config.host(), "localhost");
        assert_eq!(config.port(), 5900);
        assert!(config.viewonly());
    }

    #[test]
    fn latency_probe_defaults_to_no_sample() {
        let sink = Arc::new(EventQueue::new()) as Arc<dyn EventSink>;
        let probe = ProbeSink::new(sink);
        assert_eq!(probe.average(), None);
        probe.on_event(Event::FramebufferUpdateRequestFinished);
        assert_eq!(probe.average(), None, "disabled probe must not record a sample");
    }

    #[test]
    fn latency_probe_records_round_trip_once_enabled() {
        let sink = Arc::new(EventQueue::new()) as Arc<dyn EventSink>;
        let probe = ProbeSink::new(sink);
        probe.set_enabled(true);
        probe.mark_request();
        probe.on_event(Event::FramebufferUpdateRequestFinished);
        assert!(probe.average().is_some());
    }

    #[tokio::test]
    async fn context_starts_not_connected_and_destroys_cleanly() {
        let context = Context::new(EventDelivery::Polling);
        assert!(!context.is_connected());
        assert!(context.poll_event().is_none());
        context.destroy().await;
    }

    #[tokio::test]
    async fn viewonly_drops_input_before_queueing() {
        let context = Context::new(EventDelivery::Polling);
        context.set_viewonly(true);
        context.send_key_event(true, 0x41);
        context.send_pointer_event(0, 0, 0);
        assert_eq!(context.shared.lock().unwrap().pending_keys.len(), 0);
        assert_eq!(context.shared.lock().unwrap().pending_pointer.len(), 0);
        context.destroy().await;
    }

    #[tokio::test]
    async fn user_data_round_trips_and_rejects_out_of_range() {
        let context = Context::new(EventDelivery::Polling);
        context.set_user_data(2, 0xDEAD_BEEF).unwrap();
        assert_eq!(context.get_user_data(2).unwrap(), 0xDEAD_BEEF);
        assert!(context.set_user_data(5, 0).is_err());
        assert!(context.get_user_data(5).is_err());
        context.destroy().await;
    }
}
