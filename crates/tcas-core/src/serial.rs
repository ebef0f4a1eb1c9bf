//! Sequential serial-number minting.

use std::sync::atomic::{AtomicU32, Ordering};

/// Render a serial for a zero-based sequence number, e.g. `p0`, `ap3`.
pub fn serial(prefix: &str, n: u32) -> String {
    format!("{prefix}{n}")
}

/// Thread-safe counter handing out sequential serials for one prefix.
#[derive(Debug, Default)]
pub struct SerialCounter {
    next: AtomicU32,
}

impl SerialCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint the next serial in the sequence.
    pub fn mint(&self, prefix: &str) -> String {
        serial(prefix, self.next.fetch_add(1, Ordering::SeqCst))
    }

    /// How many serials have been handed out so far.
    pub fn minted(&self) -> u32 {
        self.next.load(Ordering::SeqCst)
    }

    /// Restart the sequence from zero.
    pub fn reset(&self) {
        self.next.store(0, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mints_sequentially_per_prefix() {
        let planes = SerialCounter::new();
        assert_eq!(planes.mint("p"), "p0");
        assert_eq!(planes.mint("p"), "p1");
        assert_eq!(planes.minted(), 2);

        planes.reset();
        assert_eq!(planes.mint("p"), "p0");
    }
}
