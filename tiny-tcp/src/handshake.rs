//! Three-way open handshake.
//!
//! [`OpenHandshake`] borrows a [`ConnectionControlBlock`] and moves it from
//! CLOSED/LISTEN to ESTABLISHED:
//!
//! ```text
//!  client                                   server
//!  CLOSED                                   LISTEN
//!    │ start_client ── SYN seq=x ─────────▶   │ handle_syn
//!  SYN_SENT                                 SYN_RECEIVED
//!    │ handle_syn_ack ◀── SYN-ACK seq=y ack=x+1
//!  ESTABLISHED ─────── ACK seq=x+1 ack=y+1 ─▶ │ handle_ack
//!                                           ESTABLISHED
//! ```
//!
//! Every method returns the segment the caller must transmit (if any).
//! Emitted SYN and SYN-ACK segments are recorded in the retransmission queue
//! and retired by the peer's cumulative ACK.

use crate::connection::{ConnError, ConnectionControlBlock};
use crate::packet::{flags, SegmentHeader};
use crate::state::ConnectionState;

/// Drives the connection-establishment half of the FSM.
pub struct OpenHandshake<'a> {
    ccb: &'a mut ConnectionControlBlock,
}

impl<'a> OpenHandshake<'a> {
    pub fn new(ccb: &'a mut ConnectionControlBlock) -> Self {
        Self { ccb }
    }

    /// Passive open: CLOSED → LISTEN.
    pub fn listen(&mut self) -> Result<(), ConnError> {
        self.require_fresh("listen")?;
        self.ccb.set_state(ConnectionState::Listen);
        Ok(())
    }

    /// Active open: pick an ISN, emit SYN, CLOSED → SYN_SENT.
    pub fn start_client(&mut self) -> Result<SegmentHeader, ConnError> {
        self.require_fresh("start_client")?;

        let isn = self.ccb.generate_isn();
        self.ccb.send_unack = isn;
        self.ccb.send_next = isn.wrapping_add(1);

        let syn = self.ccb.segment(flags::SYN, isn, 0);
        self.ccb.retransmission_queue.add(syn, None);
        self.ccb.set_state(ConnectionState::SynSent);

        log::debug!("[open] → SYN seq={isn}");
        Ok(syn)
    }

    /// Server side: consume the peer's SYN, emit SYN-ACK,
    /// LISTEN → SYN_RECEIVED.
    pub fn handle_syn(&mut self, incoming: &SegmentHeader) -> Result<SegmentHeader, ConnError> {
        match self.ccb.state() {
            ConnectionState::Listen => {}
            state => return Err(ConnError::InvalidState { op: "handle_syn", state }),
        }

        self.ccb.recv_next = incoming.sequence_number.wrapping_add(1);

        let isn = self.ccb.generate_isn();
        self.ccb.send_unack = isn;
        self.ccb.send_next = isn.wrapping_add(1);

        let syn_ack = self.ccb.segment(flags::SYN | flags::ACK, isn, self.ccb.recv_next);
        self.ccb.retransmission_queue.add(syn_ack, None);
        self.ccb.set_state(ConnectionState::SynReceived);

        log::debug!(
            "[open] ← SYN seq={}; → SYN-ACK seq={isn} ack={}",
            incoming.sequence_number,
            self.ccb.recv_next
        );
        Ok(syn_ack)
    }

    /// Client side: consume the SYN-ACK, emit the final ACK,
    /// SYN_SENT → ESTABLISHED.
    pub fn handle_syn_ack(&mut self, incoming: &SegmentHeader) -> Result<SegmentHeader, ConnError> {
        match self.ccb.state() {
            ConnectionState::SynSent => {}
            state => return Err(ConnError::InvalidState { op: "handle_syn_ack", state }),
        }
        if incoming.ack_number != self.ccb.send_next {
            log::debug!(
                "[open] ← SYN-ACK rejected: ack={} expected {}",
                incoming.ack_number,
                self.ccb.send_next
            );
            return Err(ConnError::bad_ack(self.ccb.send_next, incoming.ack_number));
        }

        self.ccb.recv_next = incoming.sequence_number.wrapping_add(1);
        self.ccb.send_unack = incoming.ack_number;

        let ack = self.ccb.segment(flags::ACK, self.ccb.send_next, self.ccb.recv_next);
        self.ccb.retransmission_queue.remove(incoming.ack_number);
        self.ccb.set_state(ConnectionState::Established);

        log::debug!(
            "[open] ← SYN-ACK seq={}; → ACK ack={}",
            incoming.sequence_number,
            self.ccb.recv_next
        );
        Ok(ack)
    }

    /// Server side: consume the final ACK, SYN_RECEIVED → ESTABLISHED.
    pub fn handle_ack(&mut self, incoming: &SegmentHeader) -> Result<(), ConnError> {
        match self.ccb.state() {
            ConnectionState::SynReceived => {}
            state => return Err(ConnError::InvalidState { op: "handle_ack", state }),
        }
        if incoming.ack_number != self.ccb.send_next {
            return Err(ConnError::bad_ack(self.ccb.send_next, incoming.ack_number));
        }
        if incoming.sequence_number != self.ccb.recv_next {
            return Err(ConnError::InvalidSequenceNumber {
                expected: self.ccb.recv_next,
                got: incoming.sequence_number,
            });
        }

        self.ccb.send_unack = incoming.ack_number;
        self.ccb.retransmission_queue.remove(incoming.ack_number);
        self.ccb.set_state(ConnectionState::Established);

        log::debug!("[open] ← ACK ack={}; established", incoming.ack_number);
        Ok(())
    }

    /// Opening is only allowed from a CLOSED block that has never been used.
    fn require_fresh(&self, op: &'static str) -> Result<(), ConnError> {
        match self.ccb.state() {
            ConnectionState::Closed if !self.ccb.is_retired() => Ok(()),
            state => Err(ConnError::InvalidState { op, state }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn ccb() -> ConnectionControlBlock {
        let local: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let remote: SocketAddr = "127.0.0.1:9090".parse().unwrap();
        ConnectionControlBlock::new(local, remote)
    }

    #[test]
    fn start_client_emits_syn() {
        let mut c = ccb();
        let syn = OpenHandshake::new(&mut c).start_client().unwrap();

        assert!(syn.has_flags(flags::SYN));
        assert!(!syn.has_flags(flags::ACK));
        assert_eq!(syn.window_size, 65535);
        assert_eq!(c.state(), ConnectionState::SynSent);
        assert_eq!(c.send_unack, syn.sequence_number);
        assert_eq!(c.send_next, syn.sequence_number.wrapping_add(1));
        assert_eq!(c.retransmission_queue.size(), 1);
    }

    #[test]
    fn start_client_requires_closed() {
        let mut c = ccb();
        c.set_state(ConnectionState::Listen);
        let err = OpenHandshake::new(&mut c).start_client().unwrap_err();
        assert_eq!(
            err,
            ConnError::InvalidState {
                op: "start_client",
                state: ConnectionState::Listen
            }
        );
        assert!(c.retransmission_queue.is_empty());
    }

    #[test]
    fn retired_block_cannot_reopen() {
        let mut c = ccb();
        c.set_state(ConnectionState::Established);
        c.set_state(ConnectionState::Closed);

        let mut open = OpenHandshake::new(&mut c);
        assert!(matches!(open.start_client(), Err(ConnError::InvalidState { .. })));
        assert!(matches!(open.listen(), Err(ConnError::InvalidState { .. })));
    }

    #[test]
    fn handle_syn_requires_listen() {
        let mut c = ccb();
        let syn = SegmentHeader::new(9090, 8080);
        let err = OpenHandshake::new(&mut c).handle_syn(&syn).unwrap_err();
        assert!(matches!(err, ConnError::InvalidState { op: "handle_syn", .. }));
        assert_eq!(c.state(), ConnectionState::Closed);
    }

    #[test]
    fn handle_syn_emits_syn_ack() {
        let mut c = ccb();
        let mut open = OpenHandshake::new(&mut c);
        open.listen().unwrap();

        let mut syn = SegmentHeader::new(9090, 8080);
        syn.sequence_number = 4000;
        syn.set_flags(flags::SYN);
        let syn_ack = open.handle_syn(&syn).unwrap();

        assert!(syn_ack.has_flags(flags::SYN | flags::ACK));
        assert_eq!(syn_ack.ack_number, 4001);
        assert_eq!(c.recv_next, 4001);
        assert_eq!(c.send_next, syn_ack.sequence_number.wrapping_add(1));
        assert_eq!(c.state(), ConnectionState::SynReceived);
        assert_eq!(c.retransmission_queue.size(), 1);
    }

    #[test]
    fn bad_syn_ack_leaves_state_unchanged() {
        let mut c = ccb();
        c.set_state(ConnectionState::SynSent);
        c.send_next = 1000;
        c.send_unack = 999;

        let mut syn_ack = SegmentHeader::new(9090, 8080);
        syn_ack.sequence_number = 2000;
        syn_ack.ack_number = 999;
        syn_ack.set_flags(flags::SYN | flags::ACK);

        let err = OpenHandshake::new(&mut c).handle_syn_ack(&syn_ack).unwrap_err();
        assert_eq!(err, ConnError::bad_ack(1000, 999));
        assert_eq!(c.state(), ConnectionState::SynSent);
        assert_eq!(c.recv_next, 0);
    }

    #[test]
    fn final_ack_checks_ack_then_sequence() {
        let mut c = ccb();
        c.set_state(ConnectionState::SynReceived);
        c.send_next = 5001;
        c.recv_next = 3001;

        let mut ack = SegmentHeader::new(9090, 8080);
        ack.sequence_number = 3001;
        ack.ack_number = 5000;
        let err = OpenHandshake::new(&mut c).handle_ack(&ack).unwrap_err();
        assert_eq!(err, ConnError::bad_ack(5001, 5000));

        ack.ack_number = 5001;
        ack.sequence_number = 3002;
        let err = OpenHandshake::new(&mut c).handle_ack(&ack).unwrap_err();
        assert_eq!(
            err,
            ConnError::InvalidSequenceNumber {
                expected: 3001,
                got: 3002
            }
        );
        assert_eq!(c.state(), ConnectionState::SynReceived);

        ack.sequence_number = 3001;
        OpenHandshake::new(&mut c).handle_ack(&ack).unwrap();
        assert_eq!(c.state(), ConnectionState::Established);
    }

    #[test]
    fn handshake_ops_reject_established() {
        let mut c = ccb();
        c.set_state(ConnectionState::Established);
        let h = SegmentHeader::new(9090, 8080);

        let mut open = OpenHandshake::new(&mut c);
        assert!(matches!(open.handle_syn_ack(&h), Err(ConnError::InvalidState { .. })));
        assert!(matches!(open.handle_ack(&h), Err(ConnError::InvalidState { .. })));
        assert!(matches!(open.handle_syn(&h), Err(ConnError::InvalidState { .. })));
    }
}
