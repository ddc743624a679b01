//! Connection finite-state machine (FSM) types.
//!
//! This module defines every state a
//! [`ConnectionControlBlock`](crate::connection::ConnectionControlBlock) can
//! occupy, mirroring the TCP state diagram (RFC 793 §3.2).  Transitions are
//! *not* implemented here; they live in [`crate::handshake`],
//! [`crate::transfer`] and [`crate::teardown`], each of which matches on the
//! current variant.
//!
//! ```text
//!                 start_client              handle_syn_ack
//!   CLOSED ───────────────────▶ SYN_SENT ──────────────────┐
//!     │ listen                                             ▼
//!     ▼        handle_syn                 handle_ack
//!   LISTEN ──────────────────▶ SYN_RECEIVED ──────────▶ ESTABLISHED
//!                                                          │    │
//!                                               close()    │    │ handle_fin
//!                           ┌──────────────────────────────┘    ▼
//!                           ▼                               CLOSE_WAIT
//!   FIN_WAIT_2 ◀─ack── FIN_WAIT_1 ──fin──▶ CLOSING              │ close
//!       │ fin                                 │ ack             ▼
//!       ▼                                     ▼             LAST_ACK
//!   TIME_WAIT ◀───────────────────────────────┘                 │ ack
//!       │ expire                                                ▼
//!       └─────────────────────────────────────────────────▶ CLOSED
//! ```

use std::fmt;

/// All possible states of the connection FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No connection exists; initial and final state.
    #[default]
    Closed,
    /// Waiting for a SYN from any peer.
    Listen,
    /// SYN has been sent; waiting for SYN-ACK.
    SynSent,
    /// SYN received; SYN-ACK sent; waiting for ACK.
    SynReceived,
    /// Three-way handshake complete; data transfer in progress.
    Established,
    /// Local side sent FIN; waiting for its ACK or the peer's FIN.
    FinWait1,
    /// ACK of local FIN received; waiting for peer's FIN.
    FinWait2,
    /// Peer's FIN received; local close pending.
    CloseWait,
    /// Both sides sent FIN simultaneously; waiting for ACK of ours.
    Closing,
    /// Waiting for final ACK of our FIN after a passive close.
    LastAck,
    /// Waiting 2×MSL before the block may be discarded.
    TimeWait,
}

impl ConnectionState {
    /// Every state, in RFC 793 order.
    pub const ALL: [ConnectionState; 11] = [
        Self::Closed,
        Self::Listen,
        Self::SynSent,
        Self::SynReceived,
        Self::Established,
        Self::FinWait1,
        Self::FinWait2,
        Self::CloseWait,
        Self::Closing,
        Self::LastAck,
        Self::TimeWait,
    ];

    /// The RFC 793 spelling of the state.
    pub fn name(self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Listen => "LISTEN",
            Self::SynSent => "SYN_SENT",
            Self::SynReceived => "SYN_RECEIVED",
            Self::Established => "ESTABLISHED",
            Self::FinWait1 => "FIN_WAIT_1",
            Self::FinWait2 => "FIN_WAIT_2",
            Self::CloseWait => "CLOSE_WAIT",
            Self::Closing => "CLOSING",
            Self::LastAck => "LAST_ACK",
            Self::TimeWait => "TIME_WAIT",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
