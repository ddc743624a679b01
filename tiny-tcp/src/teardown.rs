//! Four-way close handshake.
//!
//! [`CloseHandshake`] borrows a [`ConnectionControlBlock`] and moves it from
//! ESTABLISHED to CLOSED along one of three paths:
//!
//! | path         | local transitions                                   |
//! |--------------|-----------------------------------------------------|
//! | active       | ESTABLISHED → FIN_WAIT_1 → FIN_WAIT_2 → TIME_WAIT   |
//! | passive      | ESTABLISHED → CLOSE_WAIT → LAST_ACK → CLOSED        |
//! | simultaneous | ESTABLISHED → FIN_WAIT_1 → CLOSING → TIME_WAIT      |
//!
//! TIME_WAIT → CLOSED happens through [`CloseHandshake::expire_time_wait`];
//! the 2×MSL timer that triggers it is the caller's.
//!
//! A FIN consumes one sequence number in each direction.

use crate::connection::{ConnError, ConnectionControlBlock};
use crate::packet::{flags, SegmentHeader};
use crate::state::ConnectionState;

/// Where a peer FIN takes us, or `None` if a FIN is not acceptable.
fn after_peer_fin(state: ConnectionState) -> Option<ConnectionState> {
    match state {
        ConnectionState::Established => Some(ConnectionState::CloseWait),
        ConnectionState::FinWait1 => Some(ConnectionState::Closing),
        ConnectionState::FinWait2 => Some(ConnectionState::TimeWait),
        _ => None,
    }
}

/// Where the ACK of our FIN takes us, or `None` if no FIN is outstanding.
fn after_fin_acked(state: ConnectionState) -> Option<ConnectionState> {
    match state {
        ConnectionState::FinWait1 => Some(ConnectionState::FinWait2),
        ConnectionState::Closing => Some(ConnectionState::TimeWait),
        ConnectionState::LastAck => Some(ConnectionState::Closed),
        _ => None,
    }
}

/// Drives the connection-termination half of the FSM.
pub struct CloseHandshake<'a> {
    ccb: &'a mut ConnectionControlBlock,
}

impl<'a> CloseHandshake<'a> {
    pub fn new(ccb: &'a mut ConnectionControlBlock) -> Self {
        Self { ccb }
    }

    /// Active close: emit FIN, ESTABLISHED → FIN_WAIT_1.
    pub fn close(&mut self) -> Result<SegmentHeader, ConnError> {
        match self.ccb.state() {
            ConnectionState::Established => {}
            state => return Err(ConnError::InvalidState { op: "close", state }),
        }
        let fin = self.emit_fin();
        self.ccb.set_state(ConnectionState::FinWait1);
        Ok(fin)
    }

    /// Consume the peer's FIN and return the ACK to send back.
    pub fn handle_fin(&mut self, incoming: &SegmentHeader) -> Result<SegmentHeader, ConnError> {
        let state = self.ccb.state();
        let next = after_peer_fin(state).ok_or(ConnError::UnexpectedFin(state))?;
        if incoming.sequence_number != self.ccb.recv_next {
            return Err(ConnError::InvalidSequenceNumber {
                expected: self.ccb.recv_next,
                got: incoming.sequence_number,
            });
        }

        self.ccb.recv_next = self.ccb.recv_next.wrapping_add(1);
        let ack = self.ccb.segment(flags::ACK, self.ccb.send_next, self.ccb.recv_next);
        self.ccb.set_state(next);

        log::debug!(
            "[close] ← FIN seq={}; → ACK ack={}",
            incoming.sequence_number,
            self.ccb.recv_next
        );
        Ok(ack)
    }

    /// Consume the peer's ACK of our FIN.
    pub fn handle_fin_ack(&mut self, incoming: &SegmentHeader) -> Result<(), ConnError> {
        let state = self.ccb.state();
        let next = after_fin_acked(state).ok_or(ConnError::UnexpectedAck(state))?;
        if incoming.ack_number != self.ccb.send_next {
            return Err(ConnError::bad_ack(self.ccb.send_next, incoming.ack_number));
        }

        self.ccb.send_unack = incoming.ack_number;
        self.ccb.retransmission_queue.remove(incoming.ack_number);
        self.ccb.set_state(next);

        log::debug!("[close] ← ACK of FIN ack={}", incoming.ack_number);
        Ok(())
    }

    /// Finish a passive close: emit our FIN, CLOSE_WAIT → LAST_ACK.
    pub fn close_from_close_wait(&mut self) -> Result<SegmentHeader, ConnError> {
        match self.ccb.state() {
            ConnectionState::CloseWait => {}
            state => {
                return Err(ConnError::InvalidState {
                    op: "close_from_close_wait",
                    state,
                })
            }
        }
        let fin = self.emit_fin();
        self.ccb.set_state(ConnectionState::LastAck);
        Ok(fin)
    }

    /// TIME_WAIT → CLOSED once the caller's 2×MSL timer has run out.
    pub fn expire_time_wait(&mut self) -> Result<(), ConnError> {
        match self.ccb.state() {
            ConnectionState::TimeWait => {
                self.ccb.set_state(ConnectionState::Closed);
                Ok(())
            }
            state => Err(ConnError::InvalidState {
                op: "expire_time_wait",
                state,
            }),
        }
    }

    pub fn can_send_data(&self) -> bool {
        self.ccb.state() == ConnectionState::Established
    }

    pub fn can_receive_data(&self) -> bool {
        matches!(
            self.ccb.state(),
            ConnectionState::Established | ConnectionState::CloseWait
        )
    }

    pub fn is_closed(&self) -> bool {
        self.ccb.state() == ConnectionState::Closed
    }

    fn emit_fin(&mut self) -> SegmentHeader {
        let seq = self.ccb.send_next;
        let fin = self.ccb.segment(flags::FIN | flags::ACK, seq, self.ccb.recv_next);
        self.ccb.retransmission_queue.add(fin, None);
        self.ccb.send_next = seq.wrapping_add(1);
        log::debug!("[close] → FIN seq={seq} ack={}", self.ccb.recv_next);
        fin
    }
}
