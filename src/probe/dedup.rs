//! Per-run set of candidates already dispatched

use parking_lot::Mutex;
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct CandidateRegistry {
    seen: Mutex<HashSet<String>>,
}

impl CandidateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the candidate, returning `false` if it was already seen
    pub fn try_insert(&self, candidate: &str) -> bool {
        let mut seen = self.seen.lock();
        if seen.contains(candidate) {
            return false;
        }
        seen.insert(candidate.to_string())
    }

    pub fn contains(&self, candidate: &str) -> bool {
        self.seen.lock().contains(candidate)
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }
}
