//! The derived note view: which notes are visible and in what groups.
//!
//! The view is recomputed from the full note list whenever it is needed;
//! nothing here is cached.

use std::collections::BTreeSet;

use chrono::{FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::note::Note;
use crate::types::TagId;

/// How a note's tags are compared against the selected tag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagMatch {
    /// At least one selected tag is present on the note.
    #[default]
    Any,
    /// Every selected tag is present on the note.
    All,
}

impl TagMatch {
    /// Whether a note carrying `note_tags` passes for `selected`.
    ///
    /// An empty selection matches every note in both modes.
    pub fn matches(self, selected: &[TagId], note: &Note) -> bool {
        if selected.is_empty() {
            return true;
        }
        match self {
            TagMatch::Any => selected.iter().any(|id| note.has_tag(*id)),
            TagMatch::All => selected.iter().all(|id| note.has_tag(*id)),
        }
    }
}

/// UI filter state owned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteFilter {
    /// Case-insensitive substring matched against note content.
    pub search_query: String,
    pub selected_tags: Vec<TagId>,
    pub tag_match: TagMatch,
    /// `false` shows only live notes, `true` only archived ones.
    pub show_archived: bool,
    /// Calendar days a note's creation day must fall on. Empty means any day.
    pub selected_dates: BTreeSet<NaiveDate>,
    /// Offset used to turn `created_at` into a calendar day.
    pub utc_offset: FixedOffset,
}

impl Default for NoteFilter {
    fn default() -> Self {
        Self {
            search_query: String::new(),
            selected_tags: Vec::new(),
            tag_match: TagMatch::Any,
            show_archived: false,
            selected_dates: BTreeSet::new(),
            utc_offset: Utc.fix(),
        }
    }
}

impl NoteFilter {
    /// Whether `note` belongs to the visible set.
    pub fn matches(&self, note: &Note) -> bool {
        if note.is_archived != self.show_archived {
            return false;
        }

        // The query is matched verbatim; surrounding whitespace counts.
        if !self.search_query.is_empty()
            && !note
                .content
                .to_lowercase()
                .contains(&self.search_query.to_lowercase())
        {
            return false;
        }

        if !self.tag_match.matches(&self.selected_tags, note) {
            return false;
        }

        if !self.selected_dates.is_empty() && !self.selected_dates.contains(&self.day_of(note)) {
            return false;
        }

        true
    }

    /// Calendar day on which `note` was created, in the filter's offset.
    pub fn day_of(&self, note: &Note) -> NaiveDate {
        note.created_at.with_timezone(&self.utc_offset).date_naive()
    }

    /// Notes passing the filter, in list order.
    pub fn visible<'a>(&self, notes: &'a [Note]) -> Vec<&'a Note> {
        notes.iter().filter(|n| self.matches(n)).collect()
    }

    /// Filter and partition into pinned and other notes.
    pub fn grid<'a>(&self, notes: &'a [Note]) -> NoteGrid<'a> {
        let (pinned, others): (Vec<&Note>, Vec<&Note>) =
            self.visible(notes).into_iter().partition(|n| n.is_pinned);
        NoteGrid {
            pinned,
            others,
            empty_reason: None,
        }
        .with_empty_reason(notes.is_empty(), self.show_archived)
    }

    /// Whether any filter differs from its default.
    pub fn is_active(&self) -> bool {
        !self.search_query.is_empty()
            || !self.selected_tags.is_empty()
            || self.show_archived
            || !self.selected_dates.is_empty()
    }

    /// Reset every filter except the day offset.
    pub fn clear(&mut self) {
        *self = Self {
            utc_offset: self.utc_offset,
            ..Self::default()
        };
    }
}

/// Why a grid has nothing to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyGridReason {
    /// The user has no notes at all.
    NoNotes,
    /// The archive view is open and nothing is archived (or matches).
    NoArchivedNotes,
    /// Notes exist but none pass the current filters.
    NoMatches,
}

/// The visible notes split into display groups, pinned first.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteGrid<'a> {
    pub pinned: Vec<&'a Note>,
    pub others: Vec<&'a Note>,
    pub empty_reason: Option<EmptyGridReason>,
}

impl<'a> NoteGrid<'a> {
    fn with_empty_reason(mut self, no_notes: bool, show_archived: bool) -> Self {
        if self.is_empty() {
            self.empty_reason = Some(if no_notes {
                EmptyGridReason::NoNotes
            } else if show_archived {
                EmptyGridReason::NoArchivedNotes
            } else {
                EmptyGridReason::NoMatches
            });
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.pinned.is_empty() && self.others.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pinned.len() + self.others.len()
    }

    /// Pinned notes followed by the rest.
    pub fn iter(&self) -> impl Iterator<Item = &'a Note> + '_ {
        self.pinned.iter().chain(self.others.iter()).copied()
    }
}
