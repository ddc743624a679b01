//! Periodic retransmission timer.
//!
//! The core never sleeps: [`crate::transfer::DataTransfer::check_retransmissions`]
//! must be polled.  This module provides the polling loop as a tokio task for
//! callers that would rather be told:
//! - [`RetransmitTimer`] — snapshot of a connection's timeout policy plus a
//!   clone of its [`RetransmissionQueue`] handle.
//! - [`RetransmitTimer::spawn`] — starts the scan task and returns a
//!   [`TimerHandle`] and a channel of [`RetransmitEvent`]s.
//!
//! The task scans every [`TimerConfig::scan_interval`], forwards each due
//! entry as [`RetransmitEvent::Resend`], and the first time any entry has
//! exhausted its attempts it sends one [`RetransmitEvent::Exhausted`] and
//! stops.  It also stops when the receiver is dropped.
//!
//! The timeout and attempt limit are copied when the timer is built; later
//! changes on the CCB do not reach a running task.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::connection::ConnectionControlBlock;
use crate::retransmit::{RetransmissionEntry, RetransmissionQueue};

/// Depth of the event channel between the scan task and its consumer.
const EVENT_CHANNEL_DEPTH: usize = 64;

/// Adjustable timer parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerConfig {
    /// How often the queue is scanned.
    pub scan_interval: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_millis(100),
        }
    }
}

/// Something the caller must act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetransmitEvent {
    /// Transmit this segment again.  `attempts` already counts the resend.
    Resend(RetransmissionEntry),
    /// These segments timed out after their last permitted attempt.  The
    /// connection should be considered failed; the task has stopped.
    Exhausted(Vec<RetransmissionEntry>),
}

/// A not-yet-running retransmission timer for one connection.
#[derive(Debug, Clone)]
pub struct RetransmitTimer {
    queue: RetransmissionQueue,
    timeout: Duration,
    max_attempts: u32,
    config: TimerConfig,
}

impl RetransmitTimer {
    pub fn new(ccb: &ConnectionControlBlock) -> Self {
        Self::with_config(ccb, TimerConfig::default())
    }

    pub fn with_config(ccb: &ConnectionControlBlock, config: TimerConfig) -> Self {
        Self {
            queue: ccb.retransmission_queue.clone(),
            timeout: ccb.retransmission_timeout,
            max_attempts: ccb.max_retransmission_attempts,
            config,
        }
    }

    /// Start scanning on the current tokio runtime.
    ///
    /// Must be called from within a runtime context.
    pub fn spawn(self) -> (TimerHandle, mpsc::Receiver<RetransmitEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_DEPTH);
        let task = tokio::spawn(self.scan_loop(tx));
        (TimerHandle { task }, rx)
    }

    async fn scan_loop(self, tx: mpsc::Sender<RetransmitEvent>) {
        let mut ticker = tokio::time::interval(self.config.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            for entry in self.queue.get_timeout_entries(self.timeout, self.max_attempts) {
                log::debug!(
                    "[timer] resend seq={} attempt={}",
                    entry.header.sequence_number,
                    entry.attempts
                );
                if tx.send(RetransmitEvent::Resend(entry)).await.is_err() {
                    return;
                }
            }

            let dead = self.queue.exhausted(self.timeout, self.max_attempts);
            if !dead.is_empty() {
                log::warn!(
                    "[timer] {} segment(s) exhausted {} attempt(s); giving up",
                    dead.len(),
                    self.max_attempts
                );
                let _ = tx.send(RetransmitEvent::Exhausted(dead)).await;
                return;
            }
        }
    }
}

/// Owner of a running scan task.  Dropping it stops the task.
#[derive(Debug)]
pub struct TimerHandle {
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Stop the scan task.  The event channel closes once it has unwound.
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// `true` once the task has stopped for any reason.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
