//! Keyed table of cooperative routines polled once per tick.
//!
//! Each key owns at most one running routine. Starting a routine for a key
//! that already has one replaces it and hands the superseded state back to the
//! caller so it can be cleaned up. Every start allocates a fresh
//! [`Generation`] so log lines can tell successive runs for one key apart.

use std::collections::BTreeMap;

/// Monotonic stamp identifying one particular start of a routine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(u64);

impl Generation {
    /// Retrieves the numeric representation of the generation.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

/// Routines keyed by the unit or team they drive.
#[derive(Clone, Debug)]
pub struct RoutineTable<K, S> {
    entries: BTreeMap<K, S>,
    next_generation: u64,
}

impl<K, S> Default for RoutineTable<K, S> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_generation: 0,
        }
    }
}

impl<K, S> RoutineTable<K, S>
where
    K: Ord + Copy,
{
    /// Creates an empty routine table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a routine for `key`, stopping any routine already running for it.
    ///
    /// Returns the generation of the new routine and the superseded state.
    pub fn start(&mut self, key: K, state: S) -> (Generation, Option<S>) {
        let generation = Generation(self.next_generation);
        self.next_generation += 1;
        (generation, self.entries.insert(key, state))
    }

    /// Stops the routine running for `key`, returning its state.
    pub fn cancel(&mut self, key: K) -> Option<S> {
        self.entries.remove(&key)
    }

    /// Stops every routine, returning their states in key order.
    pub fn cancel_all(&mut self) -> Vec<(K, S)> {
        std::mem::take(&mut self.entries).into_iter().collect()
    }

    /// State of the routine running for `key`.
    #[must_use]
    pub fn get(&self, key: K) -> Option<&S> {
        self.entries.get(&key)
    }

    /// Mutable state of the routine running for `key`.
    pub fn get_mut(&mut self, key: K) -> Option<&mut S> {
        self.entries.get_mut(&key)
    }

    /// Reports whether a routine is running for `key`.
    #[must_use]
    pub fn contains(&self, key: K) -> bool {
        self.entries.contains_key(&key)
    }

    /// Keys with a running routine, in order.
    #[must_use]
    pub fn keys(&self) -> Vec<K> {
        self.entries.keys().copied().collect()
    }

    /// Iterator over running routines in key order.
    pub fn iter(&self) -> impl Iterator<Item = (K, &S)> {
        self.entries.iter().map(|(key, state)| (*key, state))
    }

    /// Number of running routines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Reports whether no routine is running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::RoutineTable;

    #[test]
    fn restarting_a_key_replaces_the_previous_routine() {
        let mut table: RoutineTable<u32, &str> = RoutineTable::new();
        let (first, previous) = table.start(7, "first");
        assert!(previous.is_none());

        let (second, previous) = table.start(7, "second");
        assert_eq!(previous, Some("first"));
        assert_eq!(table.len(), 1);
        assert!(second.get() > first.get());
        assert_eq!(table.get(7), Some(&"second"));
    }

    #[test]
    fn cancel_removes_only_the_requested_key() {
        let mut table: RoutineTable<u32, u8> = RoutineTable::new();
        let _ = table.start(1, 10);
        let _ = table.start(2, 20);

        assert_eq!(table.cancel(1), Some(10));
        assert_eq!(table.cancel(1), None);
        assert_eq!(table.keys(), vec![2]);
    }

    #[test]
    fn cancel_all_drains_in_key_order() {
        let mut table: RoutineTable<u32, u8> = RoutineTable::new();
        let _ = table.start(5, 50);
        let _ = table.start(3, 30);

        assert_eq!(table.cancel_all(), vec![(3, 30), (5, 50)]);
        assert!(table.is_empty());
    }
}
