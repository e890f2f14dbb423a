//! Forwarding Information Base: NamePrefix -> FaceId, longest-prefix
//! match. Entries are kept sorted by descending prefix length so the
//! first match found is always the longest; no duplicate prefixes.

use udcn_common::{FaceId, Name, UdcnMetrics};

/// Longest-prefix-match forwarding table.
#[derive(Default)]
pub struct ForwardingInformationBase {
    // Sorted by descending `prefix.len()`.
    entries: Vec<(Name, FaceId)>,
}

impl ForwardingInformationBase {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Inserts or updates the face bound to `prefix`, re-sorting to
    /// preserve the descending-length invariant.
    pub fn insert(&mut self, prefix: Name, face: FaceId) {
        if let Some(entry) = self.entries.iter_mut().find(|(p, _)| p == &prefix) {
            entry.1 = face;
            return;
        }
        self.entries.push((prefix, face));
        self.entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    }

    pub fn remove(&mut self, prefix: &Name) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(p, _)| p != prefix);
        self.entries.len() != before
    }

    /// Returns the face bound to the longest prefix of `self` that is a
    /// prefix of `name`.
    pub fn lookup(&self, name: &Name) -> Option<FaceId> {
        self.entries
            .iter()
            .find(|(prefix, _)| prefix.is_prefix_of(name))
            .map(|(_, face)| *face)
    }

    pub fn entries(&self) -> &[(Name, FaceId)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn record_metrics(&self, metrics: &UdcnMetrics) {
        metrics.fib_size.set(self.len() as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_prefix_wins() {
        let mut fib = ForwardingInformationBase::new();
        fib.insert(Name::from_string("/a"), FaceId(1));
        fib.insert(Name::from_string("/a/b"), FaceId(2));

        assert_eq!(fib.lookup(&Name::from_string("/a/b/c")), Some(FaceId(2)));
        assert_eq!(fib.lookup(&Name::from_string("/a/x")), Some(FaceId(1)));
        assert_eq!(fib.lookup(&Name::from_string("/other")), None);
    }

    #[test]
    fn insert_is_idempotent_on_prefix() {
        let mut fib = ForwardingInformationBase::new();
        fib.insert(Name::from_string("/a"), FaceId(1));
        fib.insert(Name::from_string("/a"), FaceId(2));
        assert_eq!(fib.len(), 1);
        assert_eq!(fib.lookup(&Name::from_string("/a")), Some(FaceId(2)));
    }

    #[test]
    fn remove_drops_the_route() {
        let mut fib = ForwardingInformationBase::new();
        fib.insert(Name::from_string("/a"), FaceId(1));
        assert!(fib.remove(&Name::from_string("/a")));
        assert_eq!(fib.lookup(&Name::from_string("/a")), None);
    }
}
