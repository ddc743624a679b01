//! `tiny-tcp` — the connection-management core of a TCP-like transport.
//!
//! # Architecture
//!
//! ```text
//!   OpenHandshake     DataTransfer     CloseHandshake
//!   (CLOSED→ESTAB)    (ESTABLISHED)    (ESTAB→CLOSED)
//!        │                 │                 │
//!        └────── &mut ─────┼───── &mut ──────┘
//!                          ▼
//!             ┌──────────────────────────┐
//!             │  ConnectionControlBlock  │
//!             │  seq counters, state,    │
//!             │  buffers                 │
//!             └────────────┬─────────────┘
//!                          │ owns (Clone handle)
//!             ┌────────────▼─────────────┐        ┌────────────────┐
//!             │   RetransmissionQueue    │◀───────│ RetransmitTimer│
//!             │   (Arc<Mutex<..>>)       │  scan  │  (tokio task)  │
//!             └──────────────────────────┘        └────────────────┘
//! ```
//!
//! Nothing here performs I/O.  Every operation consumes and/or returns
//! [`packet::SegmentHeader`] values; moving them across a network is the
//! caller's job.
//!
//! Each module has a single responsibility:
//! - [`packet`]      — header layout, flags, 20-byte codec, sequence helpers
//! - [`state`]       — finite-state-machine states
//! - [`connection`]  — per-connection control block, config, error type
//! - [`retransmit`]  — queue of unacknowledged segments
//! - [`handshake`]   — three-way open
//! - [`transfer`]    — in-order data send/receive and cumulative ACKs
//! - [`teardown`]    — four-way close
//! - [`timer`]       — optional periodic retransmission scan on tokio

pub mod connection;
pub mod handshake;
pub mod packet;
pub mod retransmit;
pub mod state;
pub mod teardown;
pub mod timer;
pub mod transfer;

pub use connection::{ConnError, ConnectionConfig, ConnectionControlBlock};
pub use handshake::OpenHandshake;
pub use packet::{flags, PacketError, Segment, SegmentHeader};
pub use retransmit::{RetransmissionEntry, RetransmissionQueue};
pub use state::ConnectionState;
pub use teardown::CloseHandshake;
pub use timer::{RetransmitEvent, RetransmitTimer, TimerConfig, TimerHandle};
pub use transfer::DataTransfer;
