//! Ledger of in-flight local mutations, keyed by note id.
//!
//! Every optimistic mutation takes a [`Ticket`] before its request is
//! sent. When the request fails, the mutation may only be rolled back if
//! its ticket is still the newest one for that note; otherwise a later
//! local change has already superseded it.

use std::collections::HashMap;

use keepmd_core::types::NoteId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ticket {
    note_id: NoteId,
    seq: u64,
}

#[derive(Debug, Default)]
pub(crate) struct PendingLedger {
    next_seq: u64,
    /// Newest ticket per note.
    latest: HashMap<NoteId, u64>,
    in_flight: HashMap<NoteId, usize>,
}

impl PendingLedger {
    pub(crate) fn begin(&mut self, note_id: NoteId) -> Ticket {
        self.next_seq += 1;
        self.latest.insert(note_id, self.next_seq);
        *self.in_flight.entry(note_id).or_default() += 1;
        Ticket {
            note_id,
            seq: self.next_seq,
        }
    }

    /// Close `ticket`. Returns whether it was still the newest for its note.
    pub(crate) fn finish(&mut self, ticket: Ticket) -> bool {
        let newest = self.latest.get(&ticket.note_id) == Some(&ticket.seq);

        if let Some(count) = self.in_flight.get_mut(&ticket.note_id) {
            *count -= 1;
            if *count == 0 {
                self.in_flight.remove(&ticket.note_id);
                self.latest.remove(&ticket.note_id);
            }
        }
        newest
    }

    pub(crate) fn has_pending(&self, note_id: NoteId) -> bool {
        self.in_flight.contains_key(&note_id)
    }
}
