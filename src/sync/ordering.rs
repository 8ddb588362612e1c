//! In-order delivery of sequenced peer input

use std::collections::BTreeMap;

use tracing::warn;

/// Max out-of-order items held per peer
pub const MAX_PENDING: usize = 32;

/// Releases items strictly in sequence order. Duplicates and stale
/// sequence numbers are dropped, gaps are held until filled. When more
/// than [`MAX_PENDING`] items wait on a gap, the gap is given up and
/// delivery resumes from the earliest held item.
#[derive(Debug)]
pub struct SequenceBuffer<T> {
    next_seq: u32,
    pending: BTreeMap<u32, T>,
    capacity: usize,
}

impl<T> SequenceBuffer<T> {
    /// Buffer expecting `first_seq` as its first item
    pub fn new(first_seq: u32) -> Self {
        Self::with_capacity(first_seq, MAX_PENDING)
    }

    pub fn with_capacity(first_seq: u32, capacity: usize) -> Self {
        Self {
            next_seq: first_seq,
            pending: BTreeMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Sequence number the buffer is waiting for
    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Accept `item` tagged `seq` and return everything now deliverable,
    /// in order.
    pub fn push(&mut self, seq: u32, item: T) -> Vec<T> {
        if seq < self.next_seq || self.pending.contains_key(&seq) {
            return Vec::new();
        }
        self.pending.insert(seq, item);

        if self.pending.len() > self.capacity {
            if let Some(&earliest) = self.pending.keys().next() {
                warn!(
                    expected = self.next_seq,
                    resumed_at = earliest,
                    "Sequence gap abandoned"
                );
                self.next_seq = earliest;
            }
        }

        let mut ready = Vec::new();
        while let Some(item) = self.pending.remove(&self.next_seq) {
            ready.push(item);
            self.next_seq = self.next_seq.wrapping_add(1);
        }
        ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_in_order() {
        let mut buf = SequenceBuffer::new(1);
        assert_eq!(buf.push(1, 'a'), vec!['a']);
        assert_eq!(buf.push(2, 'b'), vec!['b']);
        assert_eq!(buf.next_seq(), 3);
    }

    #[test]
    fn holds_gaps_until_filled() {
        let mut buf = SequenceBuffer::new(1);
        assert!(buf.push(3, 'c').is_empty());
        assert!(buf.push(2, 'b').is_empty());
        assert_eq!(buf.pending(), 2);
        assert_eq!(buf.push(1, 'a'), vec!['a', 'b', 'c']);
        assert_eq!(buf.pending(), 0);
    }

    #[test]
    fn drops_duplicates_and_stale() {
        let mut buf = SequenceBuffer::new(1);
        buf.push(1, 'a');
        assert!(buf.push(1, 'x').is_empty());
        assert!(buf.push(3, 'c').is_empty());
        assert!(buf.push(3, 'y').is_empty());
        assert_eq!(buf.push(2, 'b'), vec!['b', 'c']);
    }

    #[test]
    fn overflow_skips_the_gap() {
        let mut buf = SequenceBuffer::with_capacity(1, 2);
        assert!(buf.push(5, 'e').is_empty());
        assert!(buf.push(6, 'f').is_empty());
        assert_eq!(buf.push(8, 'h'), vec!['e', 'f']);
        assert_eq!(buf.next_seq(), 7);
        // seq 1 is stale now
        assert!(buf.push(1, 'a').is_empty());
        assert_eq!(buf.push(7, 'g'), vec!['g', 'h']);
    }
}
