//! Outstanding-segment bookkeeping for timeout-driven retransmission.
//!
//! [`RetransmissionQueue`] holds every segment that has been emitted but not
//! yet covered by a cumulative ACK.  It never touches a socket; callers poll
//! [`RetransmissionQueue::get_timeout_entries`] and resend what it returns.
//!
//! # Contract
//!
//! - Entries are kept in send order (front = oldest).
//! - ACKs are **cumulative**: `remove(K)` retires every entry whose sequence
//!   span ends at or before `K`.  SYN and FIN each count as one byte.
//! - A timeout scan refreshes `sent_time` and bumps `attempts` for each
//!   entry it returns.  Entries that already reached the attempt limit are
//!   left in place and simply stop being returned; [`exhausted`] reports
//!   them so the caller can fail the connection.
//!
//! The queue is a cheap `Clone` handle around a single mutex, so the data
//! path and a periodic timer task may hold it at the same time.
//!
//! [`exhausted`]: RetransmissionQueue::exhausted

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::packet::{seq_le, SegmentHeader};

// ---------------------------------------------------------------------------
// RetransmissionEntry
// ---------------------------------------------------------------------------

/// A segment that has been sent but not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetransmissionEntry {
    /// Header exactly as it was emitted.
    pub header: SegmentHeader,
    /// Payload, absent for control segments (SYN, SYN-ACK, FIN).
    pub data: Option<Vec<u8>>,
    /// Wall-clock time of the most recent transmission.
    pub sent_time: Instant,
    /// How many times this segment has been transmitted (1 = first send).
    pub attempts: u32,
}

impl RetransmissionEntry {
    /// Payload bytes, empty for control segments.
    pub fn payload(&self) -> &[u8] {
        self.data.as_deref().unwrap_or_default()
    }

    /// First sequence number **after** this segment.
    pub fn sequence_end(&self) -> u32 {
        self.header
            .sequence_number
            .wrapping_add(self.header.sequence_len(self.payload().len()))
    }
}

// ---------------------------------------------------------------------------
// RetransmissionQueue
// ---------------------------------------------------------------------------

/// Thread-safe queue of unacknowledged segments.
#[derive(Debug, Clone, Default)]
pub struct RetransmissionQueue {
    inner: Arc<Mutex<VecDeque<RetransmissionEntry>>>,
}

impl RetransmissionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    // Every mutation below completes under a single guard, so a panic in
    // another holder cannot leave the deque half-updated.
    fn entries(&self) -> MutexGuard<'_, VecDeque<RetransmissionEntry>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a just-emitted segment (first transmission).
    pub fn add(&self, header: SegmentHeader, data: Option<Vec<u8>>) {
        let entry = RetransmissionEntry {
            header,
            data,
            sent_time: Instant::now(),
            attempts: 1,
        };
        log::trace!(
            "[rtx] + seq={} end={}",
            entry.header.sequence_number,
            entry.sequence_end()
        );
        self.entries().push_back(entry);
    }

    /// Retire every entry fully covered by the cumulative `ack_number`.
    ///
    /// Returns the number of entries removed.
    pub fn remove(&self, ack_number: u32) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|e| !seq_le(e.sequence_end(), ack_number));
        let removed = before - entries.len();
        if removed > 0 {
            log::trace!("[rtx] - {removed} entry(ies) retired by ack={ack_number}");
        }
        removed
    }

    /// Scan for entries older than `timeout` that may still be resent.
    ///
    /// Each returned entry has already had its `sent_time` reset to now and
    /// its `attempts` incremented; the result holds snapshots of the updated
    /// entries.  Entries with `attempts >= max_attempts` are skipped and left
    /// untouched.
    pub fn get_timeout_entries(&self, timeout: Duration, max_attempts: u32) -> Vec<RetransmissionEntry> {
        let now = Instant::now();
        let mut due = Vec::new();

        for entry in self.entries().iter_mut() {
            if now.duration_since(entry.sent_time) > timeout && entry.attempts < max_attempts {
                entry.sent_time = now;
                entry.attempts += 1;
                due.push(entry.clone());
            }
        }

        if !due.is_empty() {
            log::debug!("[rtx] timeout — {} segment(s) due for resend", due.len());
        }
        due
    }

    /// Entries that timed out again after their final permitted attempt.
    ///
    /// Read-only: nothing is removed or refreshed.
    pub fn exhausted(&self, timeout: Duration, max_attempts: u32) -> Vec<RetransmissionEntry> {
        let now = Instant::now();
        self.entries()
            .iter()
            .filter(|e| e.attempts >= max_attempts && now.duration_since(e.sent_time) > timeout)
            .cloned()
            .collect()
    }

    /// Number of outstanding entries.
    pub fn size(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Copy of every outstanding entry, oldest first.
    pub fn snapshot(&self) -> Vec<RetransmissionEntry> {
        self.entries().iter().cloned().collect()
    }

    /// Drop every outstanding entry.
    pub fn clear(&self) {
        self.entries().clear();
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
