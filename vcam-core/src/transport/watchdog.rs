//! Producer heartbeat and consumer-side liveness
//!
//! The producer runs a [`Watchdog`] thread that bumps the header heartbeat
//! and forwards the consumer `connected` flag into the camera's
//! [`ConnectionState`]. Consumers feed the heartbeat they read into a
//! [`HeartbeatMonitor`] to tell a live producer from one that crashed without
//! unregistering.

use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::FrameTransport;
use crate::connection::ConnectionState;
use crate::error::{Result, VcamError};

/// Watchdog tick period
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(20);

/// A producer whose heartbeat has not moved for this long is dead
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_millis(500);

/// Background thread keeping a registered device alive
pub struct Watchdog {
    thread: Option<JoinHandle<()>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl Watchdog {
    /// Start ticking every [`HEARTBEAT_INTERVAL`]
    pub fn spawn(
        transport: Arc<dyn FrameTransport>,
        connection: Arc<ConnectionState>,
    ) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("vcam-watchdog".into())
            .spawn(move || {
                let mut failing = false;
                loop {
                    match tick(transport.as_ref(), &connection) {
                        Ok(()) => failing = false,
                        Err(e) if !failing => {
                            warn!("Watchdog tick failed: {}", e);
                            failing = true;
                        }
                        Err(_) => {}
                    }
                    match shutdown_rx.recv_timeout(HEARTBEAT_INTERVAL) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        _ => break,
                    }
                }
                debug!("Watchdog stopped");
            })
            .map_err(|e| VcamError::registration(format!("failed to start watchdog: {}", e)))?;

        Ok(Self {
            thread: Some(thread),
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// Stop and join the thread; safe to call more than once
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

fn tick(transport: &dyn FrameTransport, connection: &ConnectionState) -> Result<()> {
    transport.heartbeat()?;
    let attached = transport.consumer_attached()?;
    if connection.set_connected(attached) {
        if attached {
            info!("Consumer attached");
        } else {
            info!("Consumer detached");
        }
    }
    Ok(())
}

/// Tracks a producer heartbeat counter as seen by a consumer
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    last_value: Option<u32>,
    last_change: Instant,
    timeout: Duration,
}

impl HeartbeatMonitor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            last_value: None,
            last_change: Instant::now(),
            timeout,
        }
    }

    /// Record the current heartbeat; returns whether the producer is alive
    pub fn observe(&mut self, heartbeat: u32) -> bool {
        self.observe_at(heartbeat, Instant::now())
    }

    /// [`observe`](Self::observe) with an explicit clock
    pub fn observe_at(&mut self, heartbeat: u32, now: Instant) -> bool {
        if self.last_value != Some(heartbeat) {
            self.last_value = Some(heartbeat);
            self.last_change = now;
        }
        now.saturating_duration_since(self.last_change) < self.timeout
    }
}

impl Default for HeartbeatMonitor {
    fn default() -> Self {
        Self::new(HEARTBEAT_TIMEOUT)
    }
}
