use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::hash::Hash;

use super::protocol::sequence_greater_than;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdmissionPolicy {
    /// Plain integer comparison; a wrapped sequence number is stale forever.
    #[default]
    Strict,
    /// Half-range modular comparison, survives `u32` wraparound.
    Wrapping,
}

impl AdmissionPolicy {
    pub fn is_newer(self, sequence: u32, last: u32) -> bool {
        match self {
            AdmissionPolicy::Strict => sequence > last,
            AdmissionPolicy::Wrapping => sequence_greater_than(sequence, last),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SequenceTracker {
    last_accepted: u32,
    policy: AdmissionPolicy,
}

impl SequenceTracker {
    /// Starts tracking a sender whose first datagram carried `first`.
    pub fn new(first: u32, policy: AdmissionPolicy) -> Self {
        Self {
            last_accepted: first,
            policy,
        }
    }

    pub fn admit(&mut self, sequence: u32) -> bool {
        if !self.policy.is_newer(sequence, self.last_accepted) {
            return false;
        }
        self.last_accepted = sequence;
        true
    }

    pub fn last_accepted(&self) -> u32 {
        self.last_accepted
    }
}

/// Per-sender admission state. Accepted sequence numbers of one sender form
/// a strictly increasing subsequence of what arrived from it.
#[derive(Debug)]
pub struct SequenceTable<K> {
    trackers: HashMap<K, SequenceTracker>,
    policy: AdmissionPolicy,
}

impl<K: Eq + Hash> SequenceTable<K> {
    pub fn new(policy: AdmissionPolicy) -> Self {
        Self {
            trackers: HashMap::new(),
            policy,
        }
    }

    pub fn admit(&mut self, sender: K, sequence: u32) -> bool {
        match self.trackers.entry(sender) {
            Entry::Occupied(mut entry) => entry.get_mut().admit(sequence),
            Entry::Vacant(entry) => {
                entry.insert(SequenceTracker::new(sequence, self.policy));
                true
            }
        }
    }

    pub fn last_accepted(&self, sender: &K) -> Option<u32> {
        self.trackers.get(sender).map(SequenceTracker::last_accepted)
    }

    pub fn remove(&mut self, sender: &K) -> Option<SequenceTracker> {
        self.trackers.remove(sender)
    }

    pub fn clear(&mut self) {
        self.trackers.clear();
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }

    pub fn policy(&self) -> AdmissionPolicy {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accepted(table: &mut SequenceTable<u8>, sender: u8, arrivals: &[u32]) -> Vec<u32> {
        arrivals
            .iter()
            .copied()
            .filter(|&seq| table.admit(sender, seq))
            .collect()
    }

    #[test]
    fn test_admission_drops_stale_and_duplicates() {
        let mut table = SequenceTable::new(AdmissionPolicy::Strict);
        assert_eq!(accepted(&mut table, 1, &[5, 3, 6, 6, 4, 7]), vec![5, 6, 7]);
        assert_eq!(table.last_accepted(&1), Some(7));
    }

    #[test]
    fn test_first_datagram_always_accepted() {
        let mut table = SequenceTable::new(AdmissionPolicy::Strict);
        assert!(table.is_empty());
        assert!(table.admit(1, 0));
        assert!(!table.admit(1, 0));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_senders_are_independent() {
        let mut table = SequenceTable::new(AdmissionPolicy::Strict);

        assert!(table.admit(1, 10));
        assert!(table.admit(2, 3));
        assert!(!table.admit(1, 4));
        assert!(table.admit(2, 4));

        table.remove(&1);
        assert!(table.admit(1, 4));
    }

    #[test]
    fn test_strict_policy_rejects_wrapped_sequence() {
        let mut tracker = SequenceTracker::new(u32::MAX - 1, AdmissionPolicy::Strict);
        assert!(tracker.admit(u32::MAX));
        assert!(!tracker.admit(0));
        assert!(!tracker.admit(1));
    }

    #[test]
    fn test_wrapping_policy_accepts_wrapped_sequence() {
        let mut tracker = SequenceTracker::new(u32::MAX - 1, AdmissionPolicy::Wrapping);
        assert!(tracker.admit(u32::MAX));
        assert!(tracker.admit(0));
        assert!(tracker.admit(1));
        assert!(!tracker.admit(u32::MAX));
        assert_eq!(tracker.last_accepted(), 1);
    }
}
