//! Per-connection control block.
//!
//! A [`ConnectionControlBlock`] (CCB) owns the complete state for one
//! connection attempt:
//! - Endpoint addresses.
//! - Send/receive sequence counters (`SND.NXT`, `SND.UNA`, `RCV.NXT`).
//! - The current [`ConnectionState`].
//! - Application byte buffers and the [`RetransmissionQueue`].
//!
//! The CCB itself has no protocol logic.  It is driven by the borrowing
//! handles in [`crate::handshake`], [`crate::transfer`] and
//! [`crate::teardown`]; each operation either succeeds and moves the block
//! forward, or fails with a [`ConnError`] and leaves it untouched.
//!
//! A CCB is not synchronised.  Whoever drives a connection must serialise
//! access to it; only the retransmission queue may be shared.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;

use crate::packet::SegmentHeader;
use crate::retransmit::RetransmissionQueue;
use crate::state::ConnectionState;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Adjustable per-connection parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Receive window advertised in every emitted segment.
    pub recv_window: u16,
    /// Age after which an unacknowledged segment is due for resend.
    pub retransmission_timeout: Duration,
    /// Total transmissions allowed per segment, first send included.
    pub max_retransmission_attempts: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            recv_window: 65_535,
            retransmission_timeout: Duration::from_secs(1),
            max_retransmission_attempts: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Protocol failures reported synchronously by the CCB operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnError {
    /// The operation is not valid in the block's current state.
    #[error("{op} is not valid in state {state}")]
    InvalidState {
        op: &'static str,
        state: ConnectionState,
    },
    /// A peer segment carried the wrong sequence number.
    #[error("invalid sequence number: expected {expected}, got {got}")]
    InvalidSequenceNumber { expected: u32, got: u32 },
    /// A peer segment acknowledged something outside `[low, high]`.
    #[error("invalid ACK number {got}: expected {}", expected_acks(.low, .high))]
    InvalidAckNumber { got: u32, low: u32, high: u32 },
    /// Data arrived ahead of (or behind) `RCV.NXT`; nothing is reassembled.
    #[error("out-of-order packet: expected seq {expected}, got {got}")]
    OutOfOrderPacket { expected: u32, got: u32 },
    #[error("cannot send an empty payload")]
    EmptyPayload,
    #[error("unexpected FIN in state {0}")]
    UnexpectedFin(ConnectionState),
    #[error("unexpected ACK of FIN in state {0}")]
    UnexpectedAck(ConnectionState),
}

impl ConnError {
    /// An ACK check that accepts exactly one value.
    pub(crate) fn bad_ack(expected: u32, got: u32) -> Self {
        Self::InvalidAckNumber {
            got,
            low: expected,
            high: expected,
        }
    }
}

fn expected_acks(low: &u32, high: &u32) -> String {
    if low == high {
        low.to_string()
    } else {
        format!("between {low} and {high}")
    }
}

// ---------------------------------------------------------------------------
// ConnectionControlBlock
// ---------------------------------------------------------------------------

/// Mutable state of one connection.
#[derive(Debug)]
pub struct ConnectionControlBlock {
    pub local_addr: SocketAddr,
    pub remote_addr: SocketAddr,

    /// Next sequence number to send (`SND.NXT`).
    pub send_next: u32,
    /// Oldest unacknowledged sequence number (`SND.UNA`).
    pub send_unack: u32,
    /// Next sequence number expected from the peer (`RCV.NXT`).
    pub recv_next: u32,
    /// Advertised receive window.
    pub recv_window: u16,

    state: ConnectionState,
    /// Set once the block has left CLOSED and come back to it.
    retired: bool,

    pub(crate) send_buffer: Vec<u8>,
    pub(crate) recv_buffer: Vec<u8>,

    /// Shared handle; clone it to hand the queue to a timer task.
    pub retransmission_queue: RetransmissionQueue,
    pub retransmission_timeout: Duration,
    pub max_retransmission_attempts: u32,
}

impl ConnectionControlBlock {
    /// Create a block in [`ConnectionState::Closed`] with the default
    /// [`ConnectionConfig`].
    pub fn new(local_addr: SocketAddr, remote_addr: SocketAddr) -> Self {
        Self::with_config(local_addr, remote_addr, ConnectionConfig::default())
    }

    pub fn with_config(local_addr: SocketAddr, remote_addr: SocketAddr, config: ConnectionConfig) -> Self {
        Self {
            local_addr,
            remote_addr,
            send_next: 0,
            send_unack: 0,
            recv_next: 0,
            recv_window: config.recv_window,
            state: ConnectionState::Closed,
            retired: false,
            send_buffer: Vec::new(),
            recv_buffer: Vec::new(),
            retransmission_queue: RetransmissionQueue::new(),
            retransmission_timeout: config.retransmission_timeout,
            max_retransmission_attempts: config.max_retransmission_attempts,
        }
    }

    /// Draw a fresh Initial Sequence Number from the thread-local CSPRNG.
    pub fn generate_isn(&self) -> u32 {
        rand::rng().random()
    }

    /// Current FSM state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Overwrite the FSM state.
    ///
    /// The handshake handles call this for every transition.  It is public
    /// so an outer socket layer can place a block in LISTEN or restore test
    /// fixtures; entering CLOSED from any other state retires the block.
    pub fn set_state(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        log::debug!("[ccb] {} → {}", self.state, next);
        if next == ConnectionState::Closed {
            self.retired = true;
        }
        self.state = next;
    }

    /// `true` once the block has completed a lifecycle and reached CLOSED
    /// again.  A retired block cannot be reopened.
    pub fn is_retired(&self) -> bool {
        self.retired
    }

    /// Build an outbound header addressed to the peer and advertising our
    /// receive window.
    pub(crate) fn segment(&self, flags: u8, seq: u32, ack: u32) -> SegmentHeader {
        let mut header = SegmentHeader::new(self.local_addr.port(), self.remote_addr.port());
        header.sequence_number = seq;
        header.ack_number = ack;
        header.set_flags(flags);
        header.window_size = self.recv_window;
        header
    }
}

impl fmt::Display for ConnectionControlBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CCB[{} -> {}, state={}, snd.una={}, snd.nxt={}, rcv.nxt={}]",
            self.local_addr,
            self.remote_addr,
            self.state,
            self.send_unack,
            self.send_next,
            self.recv_next
        )
    }
}
