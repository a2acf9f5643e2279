//! The store's observable state.

use keepmd_core::activity::ActivityMap;
use keepmd_core::filter::{NoteFilter, NoteGrid};
use keepmd_core::note::Note;
use keepmd_core::tag::Tag;
use keepmd_core::types::{NoteId, TagId};

/// Snapshot of everything the view layer renders from.
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    /// Pinned first, newest first as of the last fetch. Incremental
    /// updates patch in place and do not re-sort.
    pub notes: Vec<Note>,
    /// Sorted by name.
    pub tags: Vec<Tag>,
    pub is_loading: bool,
    pub filter: NoteFilter,
    /// Whether a realtime subscription is active.
    pub subscribed: bool,
    pub(crate) loads_in_flight: usize,
}

impl StoreState {
    pub fn note(&self, id: NoteId) -> Option<&Note> {
        self.notes.iter().find(|n| n.id == id)
    }

    pub fn tag(&self, id: TagId) -> Option<&Tag> {
        self.tags.iter().find(|t| t.id == id)
    }

    pub(crate) fn note_mut(&mut self, id: NoteId) -> Option<&mut Note> {
        self.notes.iter_mut().find(|n| n.id == id)
    }

    /// Notes passing the current filter, in list order.
    pub fn visible_notes(&self) -> Vec<&Note> {
        self.filter.visible(&self.notes)
    }

    /// The visible notes split into pinned and other groups.
    pub fn grid(&self) -> NoteGrid<'_> {
        self.filter.grid(&self.notes)
    }

    /// Creation activity over all notes, in the filter's time zone.
    pub fn activity(&self) -> ActivityMap {
        ActivityMap::from_notes(&self.notes, self.filter.utc_offset)
    }

    pub(crate) fn begin_load(&mut self) {
        self.loads_in_flight += 1;
        self.is_loading = true;
    }

    pub(crate) fn end_load(&mut self) {
        self.loads_in_flight = self.loads_in_flight.saturating_sub(1);
        self.is_loading = self.loads_in_flight > 0;
    }

    /// Insert `tag` keeping name order. Returns `false` if its id is
    /// already present.
    pub(crate) fn insert_tag_sorted(&mut self, tag: Tag) -> bool {
        if self.tags.iter().any(|t| t.id == tag.id) {
            return false;
        }
        let pos = self.tags.partition_point(|t| t.name <= tag.name);
        self.tags.insert(pos, tag);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn tag(name: &str) -> Tag {
        Tag {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            name: name.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn tags_stay_sorted_and_unique() {
        let mut state = StoreState::default();
        let b = tag("beta");
        assert!(state.insert_tag_sorted(b.clone()));
        assert!(state.insert_tag_sorted(tag("alpha")));
        assert!(state.insert_tag_sorted(tag("gamma")));
        assert!(!state.insert_tag_sorted(b));

        let names: Vec<_> = state.tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["alpha", "beta", "gamma"]);
    }

    #[test]
    fn loading_tracks_overlapping_loads() {
        let mut state = StoreState::default();
        state.begin_load();
        state.begin_load();
        state.end_load();
        assert!(state.is_loading);
        state.end_load();
        assert!(!state.is_loading);
        state.end_load();
        assert!(!state.is_loading);
    }
}
