//! The NFN Computation Table: tracks every in-flight expression
//! evaluation from the Interest that started it through to its final
//! Content or Nack, per spec.md §4.2's state machine.
//!
//! ```text
//! RECEIVED -> FWD -> PENDING_DATA -> EXEC -> FINISHED
//!                  \            \-> REWRITE -> FINISHED
//!                   `-> EXEC (required_data already empty)
//! any state -> FAILED
//! ```
//!
//! The table is keyed by the full NFN network name. Entries never need
//! to track which face asked for a result: the ICN layer's Pending
//! Interest Table already aggregates repeat Interests for the same name
//! before they reach here, and a single Content/Nack sent back down
//! satisfies every one of them regardless of how many faces it fans out
//! to on the way.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use udcn_common::Name;

use crate::ast::Expr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputationState {
    /// Interest just arrived and was parsed.
    Received,
    /// Forwarded interests for missing dependencies are outstanding.
    PendingData,
    /// Running on an executor.
    Exec,
    /// Delegated to a peer forwarder; waiting on its reply.
    Rewrite,
    /// Produced a Content reply.
    Finished,
    /// Produced a Nack; terminal.
    Failed,
}

#[derive(Debug, Clone)]
pub struct ComputationEntry {
    pub name: Name,
    pub prefix: Name,
    pub expr: Expr,
    pub state: ComputationState,
    /// Dependencies this computation is still waiting on.
    pub outstanding: HashSet<Name>,
    /// Values already fetched, keyed by the `NameRef` they satisfy.
    pub resolved: HashMap<Name, crate::executor::ExecValue>,
    pub created_at: Instant,
    pub last_touched: Instant,
}

impl ComputationEntry {
    fn new(name: Name, prefix: Name, expr: Expr) -> Self {
        let now = Instant::now();
        Self {
            name,
            prefix,
            expr,
            state: ComputationState::Received,
            outstanding: HashSet::new(),
            resolved: HashMap::new(),
            created_at: now,
            last_touched: now,
        }
    }

    fn touch(&mut self) {
        self.last_touched = Instant::now();
    }
}

/// Owns every in-flight computation, keyed by its full network name
/// (including the `NFN` tail).
#[derive(Debug, Default)]
pub struct NfnComputationTable {
    entries: HashMap<Name, ComputationEntry>,
}

impl NfnComputationTable {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registers a new computation for `name`, or returns `false` if one
    /// is already in flight (not yet `Finished`/`Failed`) for it. A
    /// terminal entry for the same name is replaced by a fresh one.
    pub fn start(&mut self, name: &Name, prefix: &Name, expr: &Expr) -> bool {
        if let Some(entry) = self.entries.get(name) {
            if !matches!(entry.state, ComputationState::Finished | ComputationState::Failed) {
                return false;
            }
        }
        self.entries
            .insert(name.clone(), ComputationEntry::new(name.clone(), prefix.clone(), expr.clone()));
        true
    }

    pub fn get(&self, name: &Name) -> Option<&ComputationEntry> {
        self.entries.get(name)
    }

    pub fn get_mut(&mut self, name: &Name) -> Option<&mut ComputationEntry> {
        self.entries.get_mut(name)
    }

    pub fn set_state(&mut self, name: &Name, state: ComputationState) {
        if let Some(entry) = self.entries.get_mut(name) {
            entry.state = state;
            entry.touch();
        }
    }

    pub fn is_running(&self, name: &Name) -> bool {
        self.entries.get(name).map_or(false, |e| {
            !matches!(e.state, ComputationState::Finished | ComputationState::Failed)
        })
    }

    pub fn remove(&mut self, name: &Name) -> Option<ComputationEntry> {
        self.entries.remove(name)
    }

    /// Drops terminal entries older than `grace`, returning their names
    /// so the caller can clean up any other bookkeeping tied to them.
    pub fn sweep_finished(&mut self, grace: Duration) -> Vec<Name> {
        let now = Instant::now();
        let stale: Vec<Name> = self
            .entries
            .iter()
            .filter(|(_, e)| {
                matches!(e.state, ComputationState::Finished | ComputationState::Failed)
                    && now.duration_since(e.last_touched) >= grace
            })
            .map(|(name, _)| name.clone())
            .collect();
        for name in &stale {
            self.entries.remove(name);
        }
        stale
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Literal;

    fn dummy_expr() -> Expr {
        Expr::Literal(Literal::Int(1))
    }

    #[test]
    fn start_rejects_a_second_in_flight_request_for_the_same_name() {
        let mut table = NfnComputationTable::new();
        let name = Name::from_string("/lib/f()/NFN");
        let prefix = Name::from_string("/lib");

        assert!(table.start(&name, &prefix, &dummy_expr()));
        assert!(!table.start(&name, &prefix, &dummy_expr()));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn finished_entry_can_be_started_again() {
        let mut table = NfnComputationTable::new();
        let name = Name::from_string("/lib/f()/NFN");
        let prefix = Name::from_string("/lib");
        table.start(&name, &prefix, &dummy_expr());
        table.set_state(&name, ComputationState::Finished);

        assert!(table.start(&name, &prefix, &dummy_expr()));
        assert_eq!(table.get(&name).unwrap().state, ComputationState::Received);
    }

    #[test]
    fn is_running_reflects_terminal_states() {
        let mut table = NfnComputationTable::new();
        let name = Name::from_string("/lib/f()/NFN");
        let prefix = Name::from_string("/lib");
        table.start(&name, &prefix, &dummy_expr());
        assert!(table.is_running(&name));
        table.set_state(&name, ComputationState::Failed);
        assert!(!table.is_running(&name));
        assert!(!table.is_running(&Name::from_string("/unknown/NFN")));
    }

    #[test]
    fn sweep_finished_removes_only_stale_terminal_entries() {
        let mut table = NfnComputationTable::new();
        let finished_name = Name::from_string("/lib/f()/NFN");
        let running_name = Name::from_string("/lib/g()/NFN");
        let prefix = Name::from_string("/lib");

        table.start(&finished_name, &prefix, &dummy_expr());
        table.set_state(&finished_name, ComputationState::Finished);
        table.start(&running_name, &prefix, &dummy_expr());

        let swept = table.sweep_finished(Duration::from_secs(0));
        assert_eq!(swept, vec![finished_name.clone()]);
        assert!(table.get(&finished_name).is_none());
        assert!(table.get(&running_name).is_some());
    }
}
