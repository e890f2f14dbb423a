//! Pending Interest Table: Name -> `{incoming_faces, first_arrival,
//! is_fwd, outgoing_face, local_app}`, exact-match keying. A PIT entry
//! exists iff at least one peer awaits Content for that name and the
//! request is in flight upstream or toward a local app.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use udcn_common::{FaceId, Name, UdcnMetrics};

#[derive(Debug, Clone)]
pub struct PitEntry {
    pub incoming_faces: HashSet<FaceId>,
    pub first_arrival: Instant,
    pub is_fwd: bool,
    pub outgoing_face: Option<FaceId>,
    pub local_app: bool,
}

impl PitEntry {
    fn new(face: FaceId, outgoing_face: Option<FaceId>, local_app: bool) -> Self {
        let mut incoming_faces = HashSet::new();
        incoming_faces.insert(face);
        Self {
            incoming_faces,
            first_arrival: Instant::now(),
            is_fwd: outgoing_face.is_some(),
            outgoing_face,
            local_app,
        }
    }
}

/// Exact-match Pending Interest Table.
#[derive(Default)]
pub struct PendingInterestTable {
    entries: HashMap<Name, PitEntry>,
}

impl PendingInterestTable {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, name: &Name) -> Option<&PitEntry> {
        self.entries.get(name)
    }

    /// Aggregates an Interest arriving from `face` for `name`: if an
    /// entry already exists, adds `face` to its incoming set and returns
    /// `false` (the caller must not re-forward). Otherwise creates a new
    /// entry and returns `true` (the caller should forward).
    pub fn add_or_aggregate(
        &mut self,
        name: Name,
        face: FaceId,
        outgoing_face: Option<FaceId>,
        local_app: bool,
    ) -> bool {
        if let Some(entry) = self.entries.get_mut(&name) {
            entry.incoming_faces.insert(face);
            false
        } else {
            self.entries
                .insert(name, PitEntry::new(face, outgoing_face, local_app));
            true
        }
    }

    /// Removes and returns the entry for `name`, satisfied by Content or
    /// Nack.
    pub fn remove(&mut self, name: &Name) -> Option<PitEntry> {
        self.entries.remove(name)
    }

    pub fn contains(&self, name: &Name) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evicts every entry older than `timeout`. Returns `(name, entry)`
    /// for each eviction so the caller can Nack every waiter.
    pub fn age(&mut self, timeout: Duration) -> Vec<(Name, PitEntry)> {
        let now = Instant::now();
        let expired: Vec<Name> = self
            .entries
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.first_arrival) >= timeout)
            .map(|(name, _)| name.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|name| self.entries.remove(&name).map(|entry| (name, entry)))
            .collect()
    }

    pub fn record_metrics(&self, metrics: &UdcnMetrics) {
        metrics.pit_size.set(self.len() as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_interest_forwards_second_aggregates() {
        let mut pit = PendingInterestTable::new();
        let name = Name::from_string("/foo/bar");
        let should_forward = pit.add_or_aggregate(name.clone(), FaceId(1), Some(FaceId(9)), false);
        assert!(should_forward);
        let should_forward_again =
            pit.add_or_aggregate(name.clone(), FaceId(2), Some(FaceId(9)), false);
        assert!(!should_forward_again);

        let entry = pit.get(&name).unwrap();
        assert_eq!(entry.incoming_faces.len(), 2);
        assert!(entry.incoming_faces.contains(&FaceId(1)));
        assert!(entry.incoming_faces.contains(&FaceId(2)));
    }

    #[test]
    fn remove_clears_the_entry() {
        let mut pit = PendingInterestTable::new();
        let name = Name::from_string("/foo");
        pit.add_or_aggregate(name.clone(), FaceId(1), None, false);
        assert!(pit.remove(&name).is_some());
        assert!(!pit.contains(&name));
    }

    #[test]
    fn ageing_evicts_only_entries_past_timeout() {
        let mut pit = PendingInterestTable::new();
        let old = Name::from_string("/old");
        pit.add_or_aggregate(old.clone(), FaceId(1), None, false);
        std::thread::sleep(Duration::from_millis(5));
        let fresh = Name::from_string("/fresh");
        pit.add_or_aggregate(fresh.clone(), FaceId(1), None, false);

        let evicted = pit.age(Duration::from_millis(3));
        let evicted_names: Vec<_> = evicted.into_iter().map(|(n, _)| n).collect();
        assert_eq!(evicted_names, vec![old]);
        assert!(pit.contains(&fresh));
    }
}
