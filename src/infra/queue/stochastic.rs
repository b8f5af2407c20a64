//! Weighted-random queue discipline.

use std::collections::HashMap;
use std::hash::Hash;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::UpdateablePriorityQueue;

/// Queue used by the weighted scheduling policies.
///
/// `poll` selects an entry with probability proportional to its weight among
/// the entries currently queued, i.e. sampling without replacement across
/// successive polls. Weights are updatable in place; a zero weight is
/// clamped to one so every entry stays reachable.
pub struct StochasticPriorityQueue<T> {
    rng: StdRng,
    entries: Vec<(T, u64)>,
    positions: HashMap<T, usize>,
    total_weight: u128,
}

impl<T: Clone + Eq + Hash> StochasticPriorityQueue<T> {
    /// Create an empty queue with an OS-seeded generator.
    #[must_use]
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    /// Create an empty queue with a fixed seed, for deterministic tests.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            entries: Vec::new(),
            positions: HashMap::new(),
            total_weight: 0,
        }
    }

    fn remove_at(&mut self, position: usize) -> (T, u64) {
        let (item, weight) = self.entries.swap_remove(position);
        self.positions.remove(&item);
        if let Some((moved, _)) = self.entries.get(position) {
            self.positions.insert(moved.clone(), position);
        }
        self.total_weight -= u128::from(weight);
        (item, weight)
    }

    fn max_weight_position(&self) -> Option<usize> {
        self.entries
            .iter()
            .enumerate()
            .max_by_key(|(_, (_, weight))| *weight)
            .map(|(position, _)| position)
    }
}

impl<T: Clone + Eq + Hash> Default for StochasticPriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Eq + Hash + Send> UpdateablePriorityQueue<T> for StochasticPriorityQueue<T> {
    fn add_or_update(&mut self, item: T, priority: u64) -> bool {
        let weight = priority.max(1);
        if let Some(&position) = self.positions.get(&item) {
            let old = self.entries[position].1;
            self.entries[position].1 = weight;
            self.total_weight = self.total_weight - u128::from(old) + u128::from(weight);
            return false;
        }
        self.positions.insert(item.clone(), self.entries.len());
        self.entries.push((item, weight));
        self.total_weight += u128::from(weight);
        true
    }

    fn contains(&self, item: &T) -> bool {
        self.positions.contains_key(item)
    }

    fn remove(&mut self, item: &T) -> bool {
        match self.positions.get(item) {
            Some(&position) => {
                self.remove_at(position);
                true
            }
            None => false,
        }
    }

    fn poll_entry(&mut self) -> Option<(T, u64)> {
        if self.entries.is_empty() {
            return None;
        }
        let target = self.rng.random_range(0..self.total_weight);
        let mut accumulated: u128 = 0;
        let mut selected = self.entries.len() - 1;
        for (position, (_, weight)) in self.entries.iter().enumerate() {
            accumulated += u128::from(*weight);
            if target < accumulated {
                selected = position;
                break;
            }
        }
        Some(self.remove_at(selected))
    }

    fn peek(&self) -> Option<&T> {
        self.max_weight_position()
            .map(|position| &self.entries[position].0)
    }

    fn peek_priority(&self) -> Option<u64> {
        self.max_weight_position()
            .map(|position| self.entries[position].1)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn iter(&self) -> Box<dyn Iterator<Item = &T> + '_> {
        Box::new(self.entries.iter().map(|(item, _)| item))
    }
}
