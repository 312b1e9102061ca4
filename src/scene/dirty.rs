/// Per-object staleness counter for ring-buffered constants.
///
/// Every ring slot holds its own copy of an object's constants, so a change
/// has to be written `ring_depth` times, once per slot as each comes around.
/// The counter starts at the ring depth, is reset to it on every change and
/// is decremented each time one slot receives the new data. A non-zero value
/// means at least one slot is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyCounter {
    remaining: u32,
    ring_depth: u32,
}

impl DirtyCounter {
    /// A fresh counter: every slot still needs the initial upload.
    #[must_use]
    pub const fn new(ring_depth: u32) -> Self {
        Self { remaining: ring_depth, ring_depth }
    }

    /// Marks all slots stale.
    #[inline]
    pub fn mark(&mut self) {
        self.remaining = self.ring_depth;
    }

    #[inline]
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.remaining > 0
    }

    /// Records that the current slot received the latest data.
    #[inline]
    pub fn consume(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
    }

    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_down_once_per_slot() {
        let mut c = DirtyCounter::new(3);
        for expected in [2, 1, 0, 0] {
            assert_eq!(c.is_dirty(), c.remaining() > 0);
            c.consume();
            assert_eq!(c.remaining(), expected);
        }
        assert!(!c.is_dirty());
    }

    #[test]
    fn mark_restarts_the_countdown() {
        let mut c = DirtyCounter::new(3);
        c.consume();
        c.consume();
        c.mark();
        assert_eq!(c.remaining(), 3);
    }
}
