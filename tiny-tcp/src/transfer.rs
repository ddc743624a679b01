//! Reliable in-order data transfer over an established connection.
//!
//! [`DataTransfer`] borrows a [`ConnectionControlBlock`] in ESTABLISHED and
//! provides both halves of the data path:
//!
//! - **Send**: stamp the payload with `SND.NXT`, record it in the
//!   retransmission queue, advance `SND.NXT` by its length.
//! - **Receive**: accept a segment only if it starts exactly at `RCV.NXT`
//!   (there is no reassembly buffer), append it to the receive buffer,
//!   answer with a cumulative ACK.
//! - **ACK processing**: any ack in `[SND.UNA, SND.NXT]` advances `SND.UNA`
//!   and retires every queue entry it fully covers.
//!
//! ```text
//!  send_unack          send_next
//!      │                   │
//!  ────┼───────────────────┼──────────────────▶ seq space
//!      │ <── in flight ──▶ │ <── sendable ───▶
//! ```
//!
//! Retransmission is poll-based: call [`DataTransfer::check_retransmissions`]
//! periodically (or run a [`crate::timer::RetransmitTimer`]) and resend the
//! entries it returns.

use std::time::Duration;

use crate::connection::{ConnError, ConnectionControlBlock};
use crate::packet::{flags, seq_le, SegmentHeader};
use crate::retransmit::RetransmissionEntry;
use crate::state::ConnectionState;

/// Data-path operations on one connection.
pub struct DataTransfer<'a> {
    ccb: &'a mut ConnectionControlBlock,
}

impl<'a> DataTransfer<'a> {
    pub fn new(ccb: &'a mut ConnectionControlBlock) -> Self {
        Self { ccb }
    }

    /// Build a data segment for `data` and record it for retransmission.
    ///
    /// The returned header carries `ACK|PSH`; the caller transmits it with
    /// `data` as payload.
    pub fn send(&mut self, data: &[u8]) -> Result<SegmentHeader, ConnError> {
        self.require_established("send")?;
        if data.is_empty() {
            return Err(ConnError::EmptyPayload);
        }

        let seq = self.ccb.send_next;
        let header = self.ccb.segment(flags::ACK | flags::PSH, seq, self.ccb.recv_next);

        self.ccb.send_buffer.extend_from_slice(data);
        self.ccb.retransmission_queue.add(header, Some(data.to_vec()));
        self.ccb.send_next = seq.wrapping_add(data.len() as u32);

        log::debug!(
            "[data] → DATA seq={seq} len={} in_flight={}",
            data.len(),
            self.ccb.retransmission_queue.size()
        );
        Ok(header)
    }

    /// Accept an in-order data segment and return the ACK to send back.
    pub fn receive(&mut self, incoming: &SegmentHeader, data: &[u8]) -> Result<SegmentHeader, ConnError> {
        self.require_established("receive")?;
        if incoming.sequence_number != self.ccb.recv_next {
            log::debug!(
                "[data] ← DATA seq={} dropped: expected {}",
                incoming.sequence_number,
                self.ccb.recv_next
            );
            return Err(ConnError::OutOfOrderPacket {
                expected: self.ccb.recv_next,
                got: incoming.sequence_number,
            });
        }

        self.ccb.recv_buffer.extend_from_slice(data);
        self.ccb.recv_next = self.ccb.recv_next.wrapping_add(data.len() as u32);

        log::debug!(
            "[data] ← DATA seq={} len={}; → ACK ack={}",
            incoming.sequence_number,
            data.len(),
            self.ccb.recv_next
        );
        Ok(self.ccb.segment(flags::ACK, self.ccb.send_next, self.ccb.recv_next))
    }

    /// Process a cumulative ACK for data we sent.
    pub fn receive_ack(&mut self, incoming: &SegmentHeader) -> Result<(), ConnError> {
        self.require_established("receive_ack")?;

        let ack = incoming.ack_number;
        let (una, nxt) = (self.ccb.send_unack, self.ccb.send_next);
        if !seq_le(una, ack) || !seq_le(ack, nxt) {
            return Err(ConnError::InvalidAckNumber {
                got: ack,
                low: una,
                high: nxt,
            });
        }

        self.ccb.send_unack = ack;
        let retired = self.ccb.retransmission_queue.remove(ack);
        log::debug!("[data] ← ACK ack={ack} (retired {retired} seg)");
        Ok(())
    }

    /// Entries due for resend under the block's timeout policy.
    ///
    /// Each returned entry has been re-stamped and its attempt count bumped.
    /// Entries that used up `max_retransmission_attempts` are never returned;
    /// see [`DataTransfer::retransmissions_exhausted`].
    pub fn check_retransmissions(&self) -> Vec<RetransmissionEntry> {
        self.ccb.retransmission_queue.get_timeout_entries(
            self.ccb.retransmission_timeout,
            self.ccb.max_retransmission_attempts,
        )
    }

    /// `true` when some segment timed out after its final permitted attempt.
    /// The caller should treat the connection as failed.
    pub fn retransmissions_exhausted(&self) -> bool {
        let dead = self.ccb.retransmission_queue.exhausted(
            self.ccb.retransmission_timeout,
            self.ccb.max_retransmission_attempts,
        );
        if let Some(first) = dead.first() {
            log::warn!(
                "[data] {} segment(s) exhausted retransmission, oldest seq={}",
                dead.len(),
                first.header.sequence_number
            );
        }
        !dead.is_empty()
    }

    /// Copy of everything handed to [`DataTransfer::send`] so far.
    pub fn send_buffer(&self) -> Vec<u8> {
        self.ccb.send_buffer.clone()
    }

    /// Copy of everything accepted by [`DataTransfer::receive`] and not yet
    /// cleared.
    pub fn receive_buffer(&self) -> Vec<u8> {
        self.ccb.recv_buffer.clone()
    }

    /// Discard received bytes once the application has consumed them.
    pub fn clear_receive_buffer(&mut self) {
        self.ccb.recv_buffer.clear();
    }

    pub fn retransmission_queue_size(&self) -> usize {
        self.ccb.retransmission_queue.size()
    }

    pub fn set_retransmission_timeout(&mut self, timeout: Duration) {
        self.ccb.retransmission_timeout = timeout;
    }

    pub fn set_max_retransmission_attempts(&mut self, max_attempts: u32) {
        self.ccb.max_retransmission_attempts = max_attempts;
    }

    fn require_established(&self, op: &'static str) -> Result<(), ConnError> {
        match self.ccb.state() {
            ConnectionState::Established => Ok(()),
            state => Err(ConnError::InvalidState { op, state }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::thread;

    fn established(send_next: u32, recv_next: u32) -> ConnectionControlBlock {
        let local: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let remote: SocketAddr = "127.0.0.1:9090".parse().unwrap();
        let mut ccb = ConnectionControlBlock::new(local, remote);
        ccb.set_state(ConnectionState::Established);
        ccb.send_next = send_next;
        ccb.send_unack = send_next;
        ccb.recv_next = recv_next;
        ccb
    }

    fn data_header(seq: u32) -> SegmentHeader {
        let mut h = SegmentHeader::new(9090, 8080);
        h.sequence_number = seq;
        h.set_flags(flags::ACK | flags::PSH);
        h
    }

    #[test]
    fn send_stamps_and_advances() {
        let mut ccb = established(1000, 2000);
        let mut dt = DataTransfer::new(&mut ccb);

        let h = dt.send(b"Hello, TCP!").unwrap();
        assert_eq!(h.sequence_number, 1000);
        assert_eq!(h.ack_number, 2000);
        assert!(h.has_flags(flags::ACK | flags::PSH));
        assert_eq!(h.window_size, 65535);
        assert_eq!(dt.send_buffer(), b"Hello, TCP!");
        assert_eq!(dt.retransmission_queue_size(), 1);
        assert_eq!(ccb.send_next, 1011);
        assert_eq!(ccb.send_unack, 1000);
    }

    #[test]
    fn send_rejects_empty_payload() {
        let mut ccb = established(1000, 2000);
        let err = DataTransfer::new(&mut ccb).send(b"").unwrap_err();
        assert_eq!(err, ConnError::EmptyPayload);
        assert_eq!(ccb.send_next, 1000);
        assert!(ccb.retransmission_queue.is_empty());
    }

    #[test]
    fn data_ops_require_established() {
        let mut ccb = established(1000, 2000);
        ccb.set_state(ConnectionState::CloseWait);
        let mut dt = DataTransfer::new(&mut ccb);

        assert!(matches!(dt.send(b"x"), Err(ConnError::InvalidState { op: "send", .. })));
        assert!(matches!(
            dt.receive(&data_header(2000), b"x"),
            Err(ConnError::InvalidState { op: "receive", .. })
        ));
        assert!(matches!(
            dt.receive_ack(&data_header(2000)),
            Err(ConnError::InvalidState { op: "receive_ack", .. })
        ));
    }

    #[test]
    fn receive_in_order_builds_ack() {
        let mut ccb = established(1000, 2000);
        let mut dt = DataTransfer::new(&mut ccb);

        let ack = dt.receive(&data_header(2000), b"Hello, TCP!").unwrap();
        assert_eq!(ack.sequence_number, 1000);
        assert_eq!(ack.ack_number, 2011);
        assert_eq!(ack.flags, flags::ACK);
        assert_eq!(dt.receive_buffer(), b"Hello, TCP!");
        assert_eq!(ccb.recv_next, 2011);
    }

    #[test]
    fn out_of_order_segment_rejected() {
        let mut ccb = established(1000, 2000);
        let err = DataTransfer::new(&mut ccb)
            .receive(&data_header(2050), b"future")
            .unwrap_err();
        assert_eq!(
            err,
            ConnError::OutOfOrderPacket {
                expected: 2000,
                got: 2050
            }
        );
        assert_eq!(ccb.recv_next, 2000);
        assert!(ccb.recv_buffer.is_empty());
    }

    #[test]
    fn receive_ack_window_bounds() {
        let mut ccb = established(1000, 2000);
        let mut dt = DataTransfer::new(&mut ccb);
        dt.send(b"0123456789").unwrap();

        let mut ack = SegmentHeader::new(9090, 8080);
        ack.set_flags(flags::ACK);

        ack.ack_number = 999;
        assert!(matches!(dt.receive_ack(&ack), Err(ConnError::InvalidAckNumber { .. })));
        ack.ack_number = 1011;
        assert_eq!(
            dt.receive_ack(&ack),
            Err(ConnError::InvalidAckNumber {
                got: 1011,
                low: 1000,
                high: 1010
            })
        );

        // A partial ack moves SND.UNA but keeps the segment queued.
        ack.ack_number = 1005;
        dt.receive_ack(&ack).unwrap();
        assert_eq!(dt.retransmission_queue_size(), 1);

        ack.ack_number = 1010;
        dt.receive_ack(&ack).unwrap();
        assert_eq!(dt.retransmission_queue_size(), 0);
        assert_eq!(ccb.send_unack, 1010);
    }

    #[test]
    fn cumulative_ack_retires_several_segments() {
        let mut ccb = established(0, 0);
        let mut dt = DataTransfer::new(&mut ccb);
        for _ in 0..3 {
            dt.send(&[0u8; 5]).unwrap();
        }
        assert_eq!(dt.retransmission_queue_size(), 3);

        let mut ack = SegmentHeader::new(9090, 8080);
        ack.ack_number = 15;
        dt.receive_ack(&ack).unwrap();
        assert_eq!(dt.retransmission_queue_size(), 0);
    }

    #[test]
    fn sequence_numbers_wrap() {
        let start = u32::MAX - 2;
        let mut ccb = established(start, 0);
        let mut dt = DataTransfer::new(&mut ccb);
        dt.send(b"abcde").unwrap();

        let mut ack = SegmentHeader::new(9090, 8080);
        ack.ack_number = start.wrapping_add(5);
        dt.receive_ack(&ack).unwrap();
        assert_eq!(dt.retransmission_queue_size(), 0);
        assert_eq!(ccb.send_next, 2);
        assert_eq!(ccb.send_unack, 2);
    }

    #[test]
    fn clear_receive_buffer_truncates() {
        let mut ccb = established(0, 0);
        let mut dt = DataTransfer::new(&mut ccb);
        dt.receive(&data_header(0), b"abc").unwrap();

        let copy = dt.receive_buffer();
        dt.clear_receive_buffer();
        assert!(dt.receive_buffer().is_empty());
        assert_eq!(copy, b"abc");
        // RCV.NXT is unaffected by the application consuming data.
        assert_eq!(ccb.recv_next, 3);
    }

    #[test]
    fn retransmission_policy_is_applied() {
        let mut ccb = established(1000, 2000);
        let mut dt = DataTransfer::new(&mut ccb);
        dt.set_retransmission_timeout(Duration::from_millis(20));
        dt.set_max_retransmission_attempts(2);
        dt.send(b"payload").unwrap();

        assert!(dt.check_retransmissions().is_empty());

        thread::sleep(Duration::from_millis(30));
        let due = dt.check_retransmissions();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].attempts, 2);
        assert_eq!(due[0].payload(), b"payload");
        assert!(!dt.retransmissions_exhausted());

        thread::sleep(Duration::from_millis(30));
        assert!(dt.check_retransmissions().is_empty());
        assert!(dt.retransmissions_exhausted());
        assert_eq!(dt.retransmission_queue_size(), 1);
    }
}
