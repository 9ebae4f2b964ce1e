//! Injectable randomness seam for [`crate::router::Router::choose_proxy_target`].

use rand::Rng;

/// A source of uniform random indices in `0..n`. A trait object so tests can
/// swap in a fixed sequence without generics leaking through the router's
/// public API.
pub trait RandSource: Send {
    /// A uniform random value in `0..n`. `n` is always > 0.
    fn intn(&mut self, n: usize) -> usize;
}

/// Production randomness: `rand::thread_rng()` on every call.
#[derive(Default)]
pub struct ThreadRandSource;

impl RandSource for ThreadRandSource {
    fn intn(&mut self, n: usize) -> usize {
        rand::thread_rng().gen_range(0..n)
    }
}

/// Deterministic randomness for tests: cycles through a fixed sequence of
/// values, wrapping modulo `n` at each call so out-of-range sequences still
/// produce valid indices.
pub struct SequenceRandSource {
    sequence: Vec<usize>,
    next: usize,
}

impl SequenceRandSource {
    pub fn new(sequence: impl Into<Vec<usize>>) -> Self {
        Self {
            sequence: sequence.into(),
            next: 0,
        }
    }
}

impl RandSource for SequenceRandSource {
    fn intn(&mut self, n: usize) -> usize {
        let value = self.sequence[self.next % self.sequence.len()];
        self.next += 1;
        value % n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_source_cycles_and_wraps() {
        let mut src = SequenceRandSource::new(vec![0, 3, 5]);
        assert_eq!(src.intn(2), 0);
        assert_eq!(src.intn(2), 1); // 3 % 2
        assert_eq!(src.intn(2), 1); // 5 % 2
        assert_eq!(src.intn(2), 0); // wraps back to 0
    }
}
