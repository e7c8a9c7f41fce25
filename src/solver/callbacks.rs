//! Scheduled callback queue.
//!
//! A priority queue of (time, kind) entries drives everything that
//! happens between integrator spans: allocation solves, rating curve
//! switches, forcing refreshes at interpolation breakpoints, and output
//! saves. Entries at the same time run in the kind order declared below.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Callback kinds, in their same-time execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum CallbackKind {
    Allocation,
    RatingCurveSwitch,
    ForcingUpdate,
    Save,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Scheduled {
    pub t: f64,
    pub kind: CallbackKind,
}

impl Eq for Scheduled {}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.t
            .total_cmp(&other.t)
            .then(self.kind.cmp(&other.kind))
    }
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
pub struct CallbackQueue {
    heap: BinaryHeap<Reverse<Scheduled>>,
}

impl CallbackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, t: f64, kind: CallbackKind) {
        self.heap.push(Reverse(Scheduled { t, kind }));
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Time of the next scheduled entry.
    pub fn next_time(&self) -> Option<f64> {
        self.heap.peek().map(|Reverse(s)| s.t)
    }

    /// Pop every entry scheduled at the given time, in execution order.
    pub fn pop_due(&mut self, t: f64) -> Vec<Scheduled> {
        let mut due = vec![];
        while let Some(Reverse(s)) = self.heap.peek() {
            if s.t <= t {
                due.push(self.heap.pop().unwrap().0);
            } else {
                break;
            }
        }
        due
    }
}
