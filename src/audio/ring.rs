use std::sync::{Mutex, MutexGuard};

/// Latest captured block of normalized mono samples.
///
/// The capture thread replaces the whole block on every publish and the analyzer copies it out.
/// Both sides only hold the lock for the duration of a memory copy, so a reader always sees a
/// complete block from a single publish.
pub struct SampleRing {
    state: Mutex<RingState>,
    capacity: usize,
}

struct RingState {
    samples: Vec<f32>,
    /// Number of blocks published so far
    sequence: u64,
}

impl SampleRing {
    /// Zero-filled ring, so reads before the first publish see silence.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(RingState {
                samples: vec![0.0; capacity],
                sequence: 0,
            }),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Overwrite the ring with `block`, which must be exactly `capacity` samples long.
    pub fn publish(&self, block: &[f32]) {
        debug_assert_eq!(block.len(), self.capacity);
        let mut state = self.lock();
        state.samples.copy_from_slice(block);
        state.sequence += 1;
    }

    /// Fill `dest` from the ring, wrapping around when `dest` is longer than the ring.
    ///
    /// Returns the sequence number of the block that was copied.
    pub fn copy_into(&self, dest: &mut [f32]) -> u64 {
        let state = self.lock();
        for chunk in dest.chunks_mut(self.capacity) {
            chunk.copy_from_slice(&state.samples[..chunk.len()]);
        }
        state.sequence
    }

    pub fn sequence(&self) -> u64 {
        self.lock().sequence
    }

    // A panic on the other side can't leave a half-written block: both sides only copy.
    fn lock(&self) -> MutexGuard<'_, RingState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
