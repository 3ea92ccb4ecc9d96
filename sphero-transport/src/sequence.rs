//! Per-connection sequence numbers

use std::sync::atomic::{AtomicU8, Ordering};

/// Assigns the correlation number of every generated command.
///
/// Starts at 0 and wraps at 256 (the width of the wire field).
#[derive(Debug, Default)]
pub struct SequenceCounter {
    next: AtomicU8,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next sequence number
    pub fn next(&self) -> u8 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Sequence number the next command will get
    pub fn peek(&self) -> u8 {
        self.next.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_from_zero_and_wraps() {
        let counter = SequenceCounter::new();
        assert_eq!(counter.next(), 0);
        assert_eq!(counter.next(), 1);
        for _ in 2..=255 {
            counter.next();
        }
        assert_eq!(counter.peek(), 0);
        assert_eq!(counter.next(), 0);
    }
}
