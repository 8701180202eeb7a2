use std::sync::atomic::{AtomicU64, Ordering};

/// Source of per-request sequence numbers.
///
/// Sequence numbers start from a random base so ids do not repeat across
/// restarts; within one process they are strictly increasing.
pub(crate) struct RequestIdGenerator {
    base: u64,
    counter: AtomicU64,
}

impl RequestIdGenerator {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self::with_base(fastrand::u64(..) & 0xffff_ffff_0000_0000)
    }

    #[must_use]
    pub(crate) fn with_base(base: u64) -> Self {
        Self {
            base,
            counter: AtomicU64::new(1),
        }
    }

    pub(crate) fn next_seq(&self) -> u64 {
        self.base
            .wrapping_add(self.counter.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_increasing_from_base() {
        let ids = RequestIdGenerator::with_base(0x100);
        assert_eq!(ids.next_seq(), 0x101);
        assert_eq!(ids.next_seq(), 0x102);
    }

    #[test]
    fn random_base_keeps_low_bits_clear() {
        let ids = RequestIdGenerator::new();
        assert_eq!(ids.next_seq() & 0xffff_ffff, 1);
    }
}
