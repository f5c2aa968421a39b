//! Preallocated measurement buffers for the hot timing loop.
//!
//! The engine must not allocate between timed iterations: a buffer growth in
//! the middle of a measurement stage shows up in the very numbers being
//! measured. [`MeasurementPool`] front-loads all allocation into engine
//! construction.

use crate::types::Measurement;

/// Fixed-capacity arena of preallocated measurement buffers.
///
/// `next_buffer()` pops one buffer; buffers are never handed back. The arena
/// is sized so that the maximum number of simultaneously live buffers one
/// engine instance needs (the running sample plus the statistics window)
/// never exceeds `capacity` - running out means the engine itself is buggy,
/// and the pool panics rather than allocating behind the loop's back.
///
/// Not thread-safe: one pool per engine instance, never shared.
#[derive(Debug)]
pub struct MeasurementPool {
    buffers: Vec<Vec<Measurement>>,
}

impl MeasurementPool {
    /// Preallocate `capacity` buffers, each with room for `buffer_capacity`
    /// measurements.
    pub fn new(capacity: usize, buffer_capacity: usize) -> Self {
        let buffers = (0..capacity)
            .map(|_| Vec::with_capacity(buffer_capacity))
            .collect();
        Self { buffers }
    }

    /// Pop one empty buffer with the reserved capacity.
    ///
    /// # Panics
    ///
    /// Panics when the arena is exhausted; the pool is sized for the
    /// engine's worst case, so exhaustion is an internal invariant
    /// violation, not a runtime condition.
    pub fn next_buffer(&mut self) -> Vec<Measurement> {
        self.buffers
            .pop()
            .expect("measurement pool exhausted: more live buffers than the engine was sized for")
    }

    /// Number of buffers still available.
    pub fn remaining(&self) -> usize {
        self.buffers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Measurement, Stage};

    #[test]
    fn test_buffers_arrive_empty_with_reserved_capacity() {
        let mut pool = MeasurementPool::new(2, 100);
        let buffer = pool.next_buffer();
        assert!(buffer.is_empty());
        assert!(buffer.capacity() >= 100);
    }

    #[test]
    fn test_hands_out_exactly_capacity_buffers() {
        let mut pool = MeasurementPool::new(3, 10);
        assert_eq!(pool.remaining(), 3);
        for expected_left in (0..3).rev() {
            let _ = pool.next_buffer();
            assert_eq!(pool.remaining(), expected_left);
        }
    }

    #[test]
    #[should_panic(expected = "measurement pool exhausted")]
    fn test_exhaustion_is_a_caller_bug() {
        let mut pool = MeasurementPool::new(1, 10);
        let _live = pool.next_buffer();
        let _ = pool.next_buffer();
    }

    #[test]
    fn test_no_growth_within_reserved_capacity() {
        let mut pool = MeasurementPool::new(1, 64);
        let mut buffer = pool.next_buffer();
        let before = buffer.capacity();
        for i in 0..64 {
            buffer.push(Measurement::new(Stage::MainTarget, 1, i + 1, 16, 100.0));
        }
        assert_eq!(buffer.capacity(), before);
    }
}
