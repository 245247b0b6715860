//! Trajectory storage for reinforcement training

use std::collections::VecDeque;

/// One observed (or simulated) state transition.
///
/// Immutable once created; owned by the buffer until the trainer consumes
/// it.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: [f64; 2],
    pub action: usize,
    pub reward: f64,
    pub next_state: [f64; 2],
    pub done: bool,
}

/// Fixed-capacity FIFO transition buffer, oldest dropped first.
#[derive(Debug)]
pub struct TrajectoryBuffer {
    capacity: usize,
    data: VecDeque<Transition>,
}

impl TrajectoryBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            data: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn add(&mut self, transition: Transition) {
        if self.data.len() >= self.capacity {
            self.data.pop_front();
        }
        self.data.push_back(transition);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Insertion-order iteration, for deterministic training.
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.data.iter()
    }
}

impl Default for TrajectoryBuffer {
    fn default() -> Self {
        Self::new(256)
    }
}
