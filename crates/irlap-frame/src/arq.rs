use std::collections::VecDeque;

use bytes::Bytes;

use crate::codec::ns_of;

/// Sent-but-unacknowledged Information frames, oldest first.
///
/// Entries are immutable snapshots taken at send time. Retransmissions copy
/// an entry before touching its header, so an in-flight frame never aliases
/// the stored one.
#[derive(Debug, Clone, Default)]
pub struct RetransmitQueue {
    entries: VecDeque<Bytes>,
}

impl RetransmitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sent frame.
    pub fn push(&mut self, frame: Bytes) {
        self.entries.push_back(frame);
    }

    /// The oldest unacknowledged frame.
    pub fn front(&self) -> Option<&Bytes> {
        self.entries.front()
    }

    pub fn get(&self, index: usize) -> Option<&Bytes> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bytes> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry; returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }

    /// Drop entries from the head until the head's Ns equals `nr`.
    ///
    /// Returns how many were dropped. The head is left in place once it is
    /// the frame the peer expects next.
    pub fn ack_up_to(&mut self, nr: u8) -> usize {
        let mut dropped = 0;
        while let Some(head) = self.entries.front() {
            if head.get(1).map(|&control| ns_of(control)) == Some(nr & 0x07) {
                break;
            }
            self.entries.pop_front();
            dropped += 1;
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::i_control;

    fn frame(ns: u8) -> Bytes {
        Bytes::from(vec![0x02, i_control(ns, 0, false), ns])
    }

    fn queue_of(seqs: &[u8]) -> RetransmitQueue {
        let mut queue = RetransmitQueue::new();
        for &ns in seqs {
            queue.push(frame(ns));
        }
        queue
    }

    #[test]
    fn keeps_send_order() {
        let queue = queue_of(&[5, 6, 7, 0]);
        let seqs: Vec<u8> = queue.iter().map(|f| ns_of(f[1])).collect();
        assert_eq!(seqs, vec![5, 6, 7, 0]);
        assert_eq!(queue.front().map(|f| ns_of(f[1])), Some(5));
    }

    #[test]
    fn ack_drops_through_nr_minus_one() {
        let mut queue = queue_of(&[2, 3, 4, 5]);
        assert_eq!(queue.ack_up_to(4), 2);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.front().map(|f| ns_of(f[1])), Some(4));
    }

    #[test]
    fn ack_wraps_modulo_eight() {
        let mut queue = queue_of(&[6, 7, 0, 1]);
        assert_eq!(queue.ack_up_to(0), 2);
        assert_eq!(queue.front().map(|f| ns_of(f[1])), Some(0));
    }

    #[test]
    fn ack_of_head_drops_nothing() {
        let mut queue = queue_of(&[3, 4]);
        assert_eq!(queue.ack_up_to(3), 0);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn ack_past_everything_empties() {
        let mut queue = queue_of(&[3, 4]);
        assert_eq!(queue.ack_up_to(5), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn clear_reports_count() {
        let mut queue = queue_of(&[1, 2, 3]);
        assert_eq!(queue.clear(), 3);
        assert!(queue.is_empty());
        assert_eq!(queue.clear(), 0);
    }
}
