//! Consumer connection state
//!
//! A condition-variable cell updated from the watchdog thread (standing in for
//! the host's attach/detach callbacks) and read by producer threads. Closing
//! the cell wakes every waiter, which is how deleting a camera cancels a
//! pending [`ConnectionState::wait`].

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::trace;

/// How a [`ConnectionState::wait`] call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A consumer is attached
    Connected,
    /// The timeout elapsed without a consumer
    TimedOut,
    /// The state was closed while waiting
    Closed,
}

#[derive(Debug, Default)]
struct Inner {
    connected: bool,
    closed: bool,
}

/// Connected/disconnected flag with blocking wait support
///
/// Attach is a saturating boolean: a second attach while connected changes
/// nothing, and any detach disconnects.
#[derive(Debug, Default)]
pub struct ConnectionState {
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-blocking snapshot
    pub fn is_connected(&self) -> bool {
        self.inner.lock().connected
    }

    /// Record a consumer attach
    pub fn attach(&self) {
        self.set_connected(true);
    }

    /// Record a consumer detach
    pub fn detach(&self) {
        self.set_connected(false);
    }

    /// Apply an observed connected flag; returns true if the state changed
    pub fn set_connected(&self, connected: bool) -> bool {
        let mut inner = self.inner.lock();
        if inner.closed || inner.connected == connected {
            return false;
        }
        inner.connected = connected;
        trace!("Connection state -> {}", connected);
        if connected {
            self.changed.notify_all();
        }
        true
    }

    /// Block until connected, timed out, or closed
    ///
    /// `None` waits forever. `Some(Duration::ZERO)` checks once and returns.
    /// A timeout too large to represent as a deadline also waits forever.
    /// The check and the wait happen under the same lock, so an attach that
    /// races with the start of the call is never missed.
    pub fn wait(&self, timeout: Option<Duration>) -> WaitOutcome {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut inner = self.inner.lock();
        loop {
            if inner.closed {
                return WaitOutcome::Closed;
            }
            if inner.connected {
                return WaitOutcome::Connected;
            }
            match deadline {
                None => self.changed.wait(&mut inner),
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return WaitOutcome::TimedOut;
                    }
                    // Spurious wakeups and timeouts both loop back to re-check
                    let _ = self.changed.wait_until(&mut inner, deadline);
                }
            }
        }
    }

    /// Mark closed and wake all waiters; further attaches are ignored
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.connected = false;
        self.changed.notify_all();
    }
}
