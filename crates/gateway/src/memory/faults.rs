//! Failure and latency injection for [`MemoryBackend`](super::MemoryBackend).

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Row operations a fault can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListNotes,
    InsertNote,
    UpdateNote,
    DeleteNote,
    ListTags,
    FindTag,
    CreateOrGetTag,
    DeleteTag,
    InsertNoteTag,
    DeleteNoteTag,
    Subscribe,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    /// Fail the next `n` calls.
    Times(u32),
    Always,
}

/// Per-operation failures, latencies and call counters.
#[derive(Debug, Default)]
pub(crate) struct FaultPlan {
    failures: HashMap<Operation, Failure>,
    latency: HashMap<Operation, Duration>,
    calls: HashMap<Operation, usize>,
}

impl FaultPlan {
    pub(crate) fn fail_next(&mut self, op: Operation, times: u32) {
        self.failures.insert(op, Failure::Times(times));
    }

    pub(crate) fn fail_always(&mut self, op: Operation) {
        self.failures.insert(op, Failure::Always);
    }

    pub(crate) fn set_latency(&mut self, op: Operation, delay: Duration) {
        self.latency.insert(op, delay);
    }

    pub(crate) fn clear(&mut self) {
        self.failures.clear();
        self.latency.clear();
    }

    pub(crate) fn calls(&self, op: Operation) -> usize {
        self.calls.get(&op).copied().unwrap_or(0)
    }

    /// Record a call to `op`. Returns the latency to apply and whether
    /// the call must fail.
    pub(crate) fn on_call(&mut self, op: Operation) -> (Option<Duration>, bool) {
        *self.calls.entry(op).or_default() += 1;

        let fail = match self.failures.get_mut(&op) {
            Some(Failure::Always) => true,
            Some(Failure::Times(n)) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        };
        if matches!(self.failures.get(&op), Some(Failure::Times(0))) {
            self.failures.remove(&op);
        }
        (self.latency.get(&op).copied(), fail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_next_is_consumed() {
        let mut plan = FaultPlan::default();
        plan.fail_next(Operation::UpdateNote, 2);

        assert!(plan.on_call(Operation::UpdateNote).1);
        assert!(plan.on_call(Operation::UpdateNote).1);
        assert!(!plan.on_call(Operation::UpdateNote).1);
        assert!(!plan.on_call(Operation::DeleteNote).1);
        assert_eq!(plan.calls(Operation::UpdateNote), 3);
    }

    #[test]
    fn fail_always_until_cleared() {
        let mut plan = FaultPlan::default();
        plan.fail_always(Operation::ListTags);
        plan.set_latency(Operation::ListTags, Duration::from_millis(5));

        assert_eq!(
            plan.on_call(Operation::ListTags),
            (Some(Duration::from_millis(5)), true)
        );
        assert!(plan.on_call(Operation::ListTags).1);

        plan.clear();
        assert_eq!(plan.on_call(Operation::ListTags), (None, false));
        assert_eq!(plan.calls(Operation::ListTags), 3);
    }
}
