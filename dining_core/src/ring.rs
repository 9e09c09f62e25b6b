//! Resource Ring - the only shared mutable state of the simulation.
//!
//! N exclusive resources arranged in a cycle. Resource `i` sits between
//! philosopher `i - 1` (its right hand) and philosopher `i` (its left
//! hand). Acquisition is all-or-nothing on a pair: a philosopher never
//! holds one resource while waiting for the other, which is what keeps
//! the classic circular-wait deadlock out of the engine.
//!
//! All mutation goes through `&mut self`; the engine keeps the ring behind
//! a single `Mutex`, so a check-and-set can never interleave with another.

use tracing::error;

/// Availability of the N resources at the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRing {
    /// `true` = available
    available: Vec<bool>,
}

impl ResourceRing {
    /// Creates a ring of `len` available resources.
    pub fn new(len: usize) -> Self {
        Self {
            available: vec![true; len],
        }
    }

    /// Number of resources in the ring.
    pub fn len(&self) -> usize {
        self.available.len()
    }

    /// Returns true if the ring has no resources.
    pub fn is_empty(&self) -> bool {
        self.available.is_empty()
    }

    /// Returns true if resource `index` is available.
    pub fn is_available(&self, index: usize) -> bool {
        self.available[index]
    }

    /// Availability of every resource, by index.
    pub fn availability(&self) -> &[bool] {
        &self.available
    }

    /// Number of resources currently held.
    pub fn held_count(&self) -> usize {
        self.available.iter().filter(|a| !**a).count()
    }

    /// Claims both resources, or neither.
    ///
    /// Returns true and marks both unavailable only if both were available;
    /// otherwise leaves the ring untouched and returns false. Never waits.
    pub fn try_acquire_pair(&mut self, left: usize, right: usize) -> bool {
        debug_assert_ne!(left, right, "a pair must name two distinct resources");

        if !(self.available[left] && self.available[right]) {
            return false;
        }
        self.available[left] = false;
        self.available[right] = false;
        true
    }

    /// Returns both resources to the ring.
    ///
    /// Must follow a successful `try_acquire_pair` for the same pair.
    /// Releasing a resource that is not held is a logic defect: it panics in
    /// debug builds and is logged in release builds.
    pub fn release_pair(&mut self, left: usize, right: usize) {
        let held = !self.available[left] && !self.available[right];
        debug_assert!(
            held,
            "release of pair ({left}, {right}) that is not held: {:?}",
            self.available
        );
        if !held {
            error!(left, right, "release of a resource pair that is not held");
        }
        self.available[left] = true;
        self.available[right] = true;
    }

    /// Marks every resource available again.
    pub fn restore_all(&mut self) {
        self.available.iter_mut().for_each(|a| *a = true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_acquire_marks_both_unavailable() {
        let mut ring = ResourceRing::new(5);
        assert!(ring.try_acquire_pair(0, 1));

        assert_eq!(ring.availability(), &[false, false, true, true, true]);
        assert_eq!(ring.held_count(), 2);
    }

    #[test]
    fn test_acquire_is_all_or_nothing() {
        let mut ring = ResourceRing::new(5);
        assert!(ring.try_acquire_pair(1, 2));

        // Neighbour on the left shares resource 1
        assert!(!ring.try_acquire_pair(0, 1));
        assert!(ring.is_available(0), "failed acquire must not claim the free half");

        // Neighbour on the right shares resource 2
        assert!(!ring.try_acquire_pair(2, 3));
        assert!(ring.is_available(3));
    }

    #[test]
    fn test_release_frees_pair() {
        let mut ring = ResourceRing::new(5);
        assert!(ring.try_acquire_pair(4, 0));
        ring.release_pair(4, 0);

        assert_eq!(ring.held_count(), 0);
        assert!(ring.try_acquire_pair(0, 1));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "not held")]
    fn test_release_without_acquire_panics_in_debug() {
        let mut ring = ResourceRing::new(3);
        ring.release_pair(0, 1);
    }

    #[test]
    fn test_restore_all() {
        let mut ring = ResourceRing::new(4);
        assert!(ring.try_acquire_pair(0, 1));
        assert!(ring.try_acquire_pair(2, 3));
        ring.restore_all();

        assert_eq!(ring, ResourceRing::new(4));
    }

    proptest! {
        /// Whatever order seats try to grab their pairs in, no resource is
        /// ever handed to two seats at once.
        #[test]
        fn prop_no_resource_held_twice(
            n in 2usize..12,
            ops in proptest::collection::vec((0usize..64, any::<bool>()), 1..200),
        ) {
            let mut ring = ResourceRing::new(n);
            let mut holder: Vec<Option<usize>> = vec![None; n];
            let mut eating = vec![false; n];

            for (raw, wants_release) in ops {
                let seat = raw % n;
                let (left, right) = (seat, (seat + 1) % n);

                if eating[seat] && wants_release {
                    ring.release_pair(left, right);
                    holder[left] = None;
                    holder[right] = None;
                    eating[seat] = false;
                } else if !eating[seat] {
                    let free = holder[left].is_none() && holder[right].is_none();
                    let got = ring.try_acquire_pair(left, right);
                    prop_assert_eq!(got, free);
                    if got {
                        holder[left] = Some(seat);
                        holder[right] = Some(seat);
                        eating[seat] = true;
                    }
                }

                for (i, h) in holder.iter().enumerate() {
                    prop_assert_eq!(ring.is_available(i), h.is_none());
                }
                let eaters = eating.iter().filter(|e| **e).count();
                prop_assert!(eaters <= n / 2);
                prop_assert_eq!(ring.held_count(), 2 * eaters);
            }
        }
    }
}
