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

//! Events the worker produces and the host consumes, either by polling or
//! through a host-supplied [`EventSink`].

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::protocol::PixelFormat;

/// The maximum number of queued events retained before the oldest is
/// dropped to bound memory under a host that stops polling.
pub const MAX_QUEUED_EVENTS: usize = 10_000;

/// A single event produced by the connection worker.
#[derive(Debug, Clone)]
pub enum Event {
    /// The outcome of a `connect()` call: `Ok` carries the negotiated
    /// parameters, `Err` the reason the attempt failed.
    ConnectResult {
        /// Host that was dialed.
        hostname: String,
        /// Port that was dialed.
        port: u16,
        /// `Ok(..)` on success, `Err(message)` on failure.
        result: Result<ConnectedInfo, String>,
    },
    /// The connection ended, gracefully or otherwise.
    Disconnected {
        /// Host that was connected to.
        hostname: String,
        /// Port that was connected to.
        port: u16,
        /// Whether this was a host-initiated `disconnect()` rather than a
        /// protocol error or peer close.
        graceful: bool,
        /// Present when the disconnection was caused by an error.
        error: Option<String>,
    },
    /// A rectangle of the framebuffer was updated.
    FramebufferUpdated {
        /// Left edge of the updated rectangle.
        x: u16,
        /// Top edge of the updated rectangle.
        y: u16,
        /// Width of the updated rectangle.
        width: u16,
        /// Height of the updated rectangle.
        height: u16,
    },
    /// The server has finished responding to one `FramebufferUpdateRequest`.
    FramebufferUpdateRequestFinished,
    /// The server rang the bell.
    Bell,
    /// The server pushed new clipboard text (Latin-1, bounded length).
    CutText(String),
    /// The cursor shape or hotspot changed.
    CursorUpdated,
    /// The worker task has started and entered its main loop.
    ThreadStarted(String),
    /// The worker task is about to stop.
    ThreadAboutToStop(String),
}

/// The negotiated parameters of a successful connection, embedded in a
/// [`Event::ConnectResult`].
#[derive(Debug, Clone)]
pub struct ConnectedInfo {
    /// Framebuffer width.
    pub framebuffer_width: u16,
    /// Framebuffer height.
    pub framebuffer_height: u16,
    /// Desktop name reported by the server.
    pub desktop_name: String,
    /// The pixel format this client requested via `SetPixelFormat`.
    pub pixel_format: PixelFormat,
    /// The security type that was negotiated.
    pub security_type: u8,
}

/// A bounded, mutex-protected FIFO of events, drained by `poll_event` or by
/// a host-supplied [`EventSink`].
#[derive(Default)]
pub struct EventQueue {
    inner: Mutex<VecDeque<Event>>,
}

impl EventQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self { inner: Mutex::new(VecDeque::new()) }
    }

    /// Pushes an event, dropping the oldest queued event first if the queue
    /// is already at [`MAX_QUEUED_EVENTS`].
    pub fn push(&self, event: Event) {
        let mut queue = self.inner.lock().expect("event queue mutex poisoned");
        if queue.len() >= MAX_QUEUED_EVENTS {
            queue.pop_front();
        }
        queue.push_back(event);
    }

    /// Pops the oldest queued event, if any.
    pub fn pop(&self) -> Option<Event> {
        self.inner.lock().expect("event queue mutex poisoned").pop_front()
    }

    /// Drops every queued event without returning them (used when the
    /// worker's state transitions away from `Connected`).
    pub fn clear(&self) {
        self.inner.lock().expect("event queue mutex poisoned").clear();
    }

    /// Number of events currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("event queue mutex poisoned").len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A capability a host can implement to receive events as callbacks instead
/// of polling. The worker calls [`EventSink::on_event`] synchronously from
/// its own task, so an implementation must not block for long.
pub trait EventSink: Send + Sync {
    /// Called once per produced event, in order.
    fn on_event(&self, event: Event);

    /// Discards any events not yet delivered to the host. A no-op for
    /// callback-mode sinks, which have no buffer to discard from.
    fn clear(&self) {}
}

impl EventSink for EventQueue {
    fn on_event(&self, event: Event) {
        self.push(event);
    }

    fn clear(&self) {
        EventQueue::clear(self);
    }
}

/// Adapts a plain closure into an [`EventSink`], for hosts that configure
/// callback-mode delivery instead of polling.
pub struct CallbackSink<F>(F)
where
    F: Fn(Event) + Send + Sync;

impl<F> CallbackSink<F>
where
    F: Fn(Event) + Send + Sync,
{
    /// Wraps `callback`, which is invoked once per event, in worker-task order.
    pub fn new(callback: F) -> Self {
        Self(callback)
    }
}

impl<F> EventSink for CallbackSink<F>
where
    F: Fn(Event) + Send + Sync,
{
    fn on_event(&self, event: Event) {
        (self.0)(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_oldest_when_full() {
        let queue = EventQueue::new();
        for _ in 0..MAX_QUEUED_EVENTS {
            queue.push(Event::Bell);
        }
        queue.push(Event::FramebufferUpdateRequestFinished);
        assert_eq!(queue.len(), MAX_QUEUED_EVENTS);
        // The newest event must have survived the eviction.
        let mut last = None;
        while let Some(event) = queue.pop() {
            last = Some(event);
        }
        assert!(matches!(last, Some(Event::FramebufferUpdateRequestFinished)));
    }

    #[test]
    fn clear_empties_queue() {
        let queue = EventQueue::new();
        queue.push(Event::Bell);
        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn callback_sink_invokes_closure() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let count = Arc::new(AtomicUsize::new(0));
        let counted = count.clone();
        let sink = CallbackSink::new(move |_event| {
            counted.fetch_add(1, Ordering::SeqCst);
        });
        sink.on_event(Event::Bell);
        sink.on_event(Event::FramebufferUpdateRequestFinished);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
