//! Sliding-window occurrence counts used to detect a thread stuck
//! repeating the same small set of source locations.

use std::collections::{HashMap, VecDeque};

/// Tracks the last [`PosCount::RECENT_COUNT`] logged positions for one
/// thread, along with how many times each distinct position appears in
/// that window. `entropy()` turns the window into a single number: low
/// entropy means the thread has been cycling through few distinct
/// positions, which is exactly what a tight loop looks like.
#[derive(Debug, Default)]
pub struct PosCount {
    counts: HashMap<String, u32>,
    window: VecDeque<String>,
}

impl PosCount {
    pub const RECENT_COUNT: usize = 1000;

    pub fn new() -> Self {
        PosCount::default()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn add_new(&mut self, loc: String) {
        *self.counts.entry(loc.clone()).or_insert(0) += 1;
        self.window.push_back(loc);
        if self.window.len() > Self::RECENT_COUNT {
            if let Some(evicted) = self.window.pop_front() {
                self.remove_one(&evicted);
            }
        }
    }

    fn remove_one(&mut self, loc: &str) {
        if let Some(v) = self.counts.get_mut(loc) {
            if *v <= 1 {
                self.counts.remove(loc);
            } else {
                *v -= 1;
            }
        }
    }

    /// Shannon entropy, in nats, of the position distribution over the
    /// current window.
    pub fn entropy(&self) -> f64 {
        let n = self.window.len() as f64;
        if n == 0.0 {
            return 0.0;
        }
        self.counts
            .values()
            .map(|&v| {
                let p = v as f64 / n;
                -p * p.ln()
            })
            .sum()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
        self.window.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_repeated_position_has_zero_entropy() {
        let mut pc = PosCount::new();
        for _ in 0..50 {
            pc.add_new("1 > a.c:10".to_string());
        }
        assert_eq!(pc.entropy(), 0.0);
    }

    #[test]
    fn many_distinct_positions_raise_entropy() {
        let mut pc = PosCount::new();
        for i in 0..50 {
            pc.add_new(format!("1 > a.c:{i}"));
        }
        assert!(pc.entropy() > 3.0);
    }

    #[test]
    fn window_evicts_oldest_past_recent_count() {
        let mut pc = PosCount::new();
        for i in 0..(PosCount::RECENT_COUNT + 10) {
            pc.add_new(format!("loc-{i}"));
        }
        assert_eq!(pc.len(), PosCount::RECENT_COUNT);
    }

    #[test]
    fn clear_resets_to_empty() {
        let mut pc = PosCount::new();
        pc.add_new("x".to_string());
        pc.clear();
        assert!(pc.is_empty());
        assert_eq!(pc.entropy(), 0.0);
    }
}
