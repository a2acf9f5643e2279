//! The client data store.
//!
//! [`NotesStore`] caches the signed-in user's notes and tags, applies
//! local mutations optimistically, and reconciles against realtime
//! change events (see [`crate::realtime`]). It is an explicit context
//! object: construct one per session and hand clones to whoever needs
//! it.
//!
//! Backend failures are logged and never returned. Optimistic mutations
//! are rolled back on failure unless a newer local mutation of the same
//! note has superseded them.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{Duration, NaiveDate, Utc};
use keepmd_core::activity::ActivityMap;
use keepmd_core::filter::{NoteFilter, TagMatch};
use keepmd_core::note::{NewNote, Note, NotePatch};
use keepmd_core::tag::{NewTag, NoteTag};
use keepmd_core::types::{NoteId, TagId, Timestamp, UserId};
use keepmd_core::validation::{validate_note_content, validate_tag_name};
use keepmd_gateway::NotesBackend;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::notice::Notices;
use crate::pending::PendingLedger;
use crate::state::StoreState;

/// The active realtime subscription of a store.
pub(crate) struct SubscriptionHandle {
    pub(crate) user_id: UserId,
    pub(crate) cancel: CancellationToken,
    pub(crate) task: JoinHandle<()>,
}

pub(crate) struct Inner {
    pub(crate) backend: Arc<dyn NotesBackend>,
    pub(crate) state: watch::Sender<StoreState>,
    pub(crate) pending: Mutex<PendingLedger>,
    pub(crate) subscription: Mutex<Option<SubscriptionHandle>>,
    pub(crate) notices: Notices,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let handle = self
            .subscription
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.cancel.cancel();
        }
    }
}

/// Process-wide cache of one user's notes and tags. Cheap to clone.
#[derive(Clone)]
pub struct NotesStore {
    pub(crate) inner: Arc<Inner>,
}

impl NotesStore {
    pub fn new(backend: Arc<dyn NotesBackend>) -> Self {
        Self::with_notices(backend, Notices::default())
    }

    /// Create a store that reports validation failures on `notices`.
    pub fn with_notices(backend: Arc<dyn NotesBackend>, notices: Notices) -> Self {
        let (state, _) = watch::channel(StoreState::default());
        Self {
            inner: Arc::new(Inner {
                backend,
                state,
                pending: Mutex::new(PendingLedger::default()),
                subscription: Mutex::new(None),
                notices,
            }),
        }
    }

    // ---- reading ----

    /// A receiver that observes every state change.
    pub fn watch(&self) -> watch::Receiver<StoreState> {
        self.inner.state.subscribe()
    }

    /// A copy of the current state.
    pub fn snapshot(&self) -> StoreState {
        self.inner.state.borrow().clone()
    }

    /// Run `f` against the current state without copying it.
    pub fn with_state<R>(&self, f: impl FnOnce(&StoreState) -> R) -> R {
        f(&self.inner.state.borrow())
    }

    pub fn note(&self, id: NoteId) -> Option<Note> {
        self.with_state(|s| s.note(id).cloned())
    }

    /// Notes passing the current filter, in list order.
    pub fn visible_notes(&self) -> Vec<Note> {
        self.with_state(|s| s.visible_notes().into_iter().cloned().collect())
    }

    /// Creation activity over all cached notes.
    pub fn activity(&self) -> ActivityMap {
        self.with_state(StoreState::activity)
    }

    /// Whether a local mutation of `id` is awaiting its backend response.
    pub fn has_pending(&self, id: NoteId) -> bool {
        self.pending().has_pending(id)
    }

    pub fn notices(&self) -> &Notices {
        &self.inner.notices
    }

    // ---- fetching ----

    /// Replace the note list with the backend's.
    pub async fn fetch_notes(&self, user_id: UserId) {
        let load = LoadGuard::begin(&self.inner.state);

        match self.inner.backend.list_notes(user_id).await {
            Ok(notes) => {
                tracing::debug!(user_id = %user_id, count = notes.len(), "Fetched notes");
                load.finish(|s| s.notes = notes);
            }
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "Error fetching notes");
                load.finish(|_| {});
            }
        }
    }

    /// Replace the tag list with the backend's.
    pub async fn fetch_tags(&self, user_id: UserId) {
        match self.inner.backend.list_tags(user_id).await {
            Ok(tags) => {
                tracing::debug!(user_id = %user_id, count = tags.len(), "Fetched tags");
                self.inner.state.send_modify(|s| s.tags = tags);
            }
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "Error fetching tags");
            }
        }
    }

    // ---- notes ----

    /// Create a note. It appears locally once the backend has stored it.
    ///
    /// Returns the stored note, or `None` if validation or the request
    /// failed.
    pub async fn add_note(&self, note: NewNote) -> Option<Note> {
        if let Err(e) = validate_note_content(&note.content) {
            tracing::warn!(error = %e, "Rejected note");
            self.inner.notices.error(e.to_string());
            return None;
        }

        match self.inner.backend.insert_note(&note).await {
            Ok(mut created) => {
                created.tags.clear();
                let local = created.clone();
                // A realtime insert may have delivered it already.
                self.inner.state.send_if_modified(|s| {
                    if s.note(local.id).is_some() {
                        return false;
                    }
                    s.notes.insert(0, local);
                    true
                });
                tracing::info!(note_id = %created.id, "Note added");
                Some(created)
            }
            Err(e) => {
                tracing::error!(user_id = %note.user_id, error = %e, "Error adding note");
                None
            }
        }
    }

    /// Patch a note locally and on the backend, stamping `updated_at`.
    pub async fn update_note(&self, id: NoteId, patch: NotePatch) {
        if patch.is_empty() {
            return;
        }

        let mut updated_at = Utc::now();
        let mut prior: Option<(NotePatch, Timestamp)> = None;
        self.inner.state.send_if_modified(|s| {
            let Some(note) = s.note_mut(id) else {
                return false;
            };
            updated_at = next_timestamp(note.updated_at);
            prior = Some((note.capture(&patch), note.updated_at));
            note.apply_patch(&patch, updated_at);
            true
        });

        let ticket = self.pending().begin(id);
        let result = self.inner.backend.update_note(id, &patch, updated_at).await;
        let newest = self.pending().finish(ticket);

        if let Err(e) = result {
            tracing::error!(note_id = %id, error = %e, "Error updating note");
            match prior {
                Some((undo, prior_updated_at)) if newest => {
                    self.inner.state.send_if_modified(|s| match s.note_mut(id) {
                        Some(note) => {
                            note.apply_patch(&undo, prior_updated_at);
                            true
                        }
                        None => false,
                    });
                    tracing::debug!(note_id = %id, "Rolled back note update");
                }
                _ => {}
            }
        }
    }

    /// Remove a note locally and on the backend. On failure it is put
    /// back where it was.
    pub async fn delete_note(&self, id: NoteId) {
        let mut removed: Option<(usize, Note)> = None;
        self.inner.state.send_if_modified(|s| {
            let Some(pos) = s.notes.iter().position(|n| n.id == id) else {
                return false;
            };
            removed = Some((pos, s.notes.remove(pos)));
            true
        });

        let ticket = self.pending().begin(id);
        let result = self.inner.backend.delete_note(id).await;
        let newest = self.pending().finish(ticket);

        match result {
            Ok(()) => tracing::info!(note_id = %id, "Note deleted"),
            Err(e) => {
                tracing::error!(note_id = %id, error = %e, "Error deleting note");
                if let (Some((pos, note)), true) = (removed, newest) {
                    self.inner.state.send_if_modified(|s| {
                        if s.note(note.id).is_some() {
                            return false;
                        }
                        let pos = pos.min(s.notes.len());
                        s.notes.insert(pos, note);
                        true
                    });
                }
            }
        }
    }

    /// Flip `is_pinned`. A no-op when the note is not cached.
    pub async fn toggle_pinned(&self, id: NoteId) {
        let Some(pinned) = self.with_state(|s| s.note(id).map(|n| n.is_pinned)) else {
            tracing::debug!(note_id = %id, "Toggle pinned on unknown note");
            return;
        };
        self.update_note(id, NotePatch::pinned(!pinned)).await;
    }

    /// Flip `is_archived`. A no-op when the note is not cached.
    pub async fn toggle_archived(&self, id: NoteId) {
        let Some(archived) = self.with_state(|s| s.note(id).map(|n| n.is_archived)) else {
            tracing::debug!(note_id = %id, "Toggle archived on unknown note");
            return;
        };
        self.update_note(id, NotePatch::archived(!archived)).await;
    }

    // ---- tags ----

    /// Return the id of the user's tag named `name`, creating it if it
    /// does not exist yet.
    pub async fn add_tag(&self, name: &str, user_id: UserId) -> Option<TagId> {
        if let Err(e) = validate_tag_name(name) {
            tracing::warn!(error = %e, "Rejected tag");
            self.inner.notices.error(e.to_string());
            return None;
        }

        match self
            .inner
            .backend
            .create_or_get_tag(&NewTag::new(user_id, name))
            .await
        {
            Ok(tag) => {
                let id = tag.id;
                self.inner.state.send_if_modified(|s| s.insert_tag_sorted(tag));
                Some(id)
            }
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "Error adding tag");
                None
            }
        }
    }

    /// Delete a tag. On success it disappears from the tag list, the tag
    /// filter, and every cached note.
    pub async fn delete_tag(&self, id: TagId) {
        if let Err(e) = self.inner.backend.delete_tag(id).await {
            tracing::error!(tag_id = %id, error = %e, "Error deleting tag");
            return;
        }

        self.inner.state.send_modify(|s| {
            s.tags.retain(|t| t.id != id);
            s.filter.selected_tags.retain(|t| *t != id);
            for note in &mut s.notes {
                note.tags.retain(|t| t.id != id);
            }
        });
        tracing::info!(tag_id = %id, "Tag deleted");
    }

    /// Attach a tag to a note.
    ///
    /// The association is always written; the local tag list only gains
    /// the tag if it does not already show it.
    pub async fn add_tag_to_note(&self, note_id: NoteId, tag_id: TagId) {
        let mut attached = false;
        self.inner.state.send_if_modified(|s| {
            let Some(tag) = s.tag(tag_id).cloned() else {
                return false;
            };
            let Some(note) = s.note_mut(note_id) else {
                return false;
            };
            if note.has_tag(tag_id) {
                return false;
            }
            note.tags.push(tag);
            attached = true;
            true
        });

        let ticket = self.pending().begin(note_id);
        let result = self
            .inner
            .backend
            .insert_note_tag(NoteTag::new(note_id, tag_id))
            .await;
        let newest = self.pending().finish(ticket);

        if let Err(e) = result {
            tracing::error!(note_id = %note_id, tag_id = %tag_id, error = %e, "Error adding tag to note");
            if attached && newest {
                self.inner.state.send_if_modified(|s| match s.note_mut(note_id) {
                    Some(note) => {
                        let before = note.tags.len();
                        note.tags.retain(|t| t.id != tag_id);
                        note.tags.len() != before
                    }
                    None => false,
                });
            }
        }
    }

    /// Detach a tag from a note. Removing a tag the note does not carry
    /// leaves it unchanged.
    pub async fn remove_tag_from_note(&self, note_id: NoteId, tag_id: TagId) {
        let mut removed = None;
        self.inner.state.send_if_modified(|s| {
            let Some(note) = s.note_mut(note_id) else {
                return false;
            };
            let Some(pos) = note.tags.iter().position(|t| t.id == tag_id) else {
                return false;
            };
            removed = Some((pos, note.tags.remove(pos)));
            true
        });

        let ticket = self.pending().begin(note_id);
        let result = self
            .inner
            .backend
            .delete_note_tag(NoteTag::new(note_id, tag_id))
            .await;
        let newest = self.pending().finish(ticket);

        if let Err(e) = result {
            tracing::error!(note_id = %note_id, tag_id = %tag_id, error = %e, "Error removing tag from note");
            if let (Some((pos, tag)), true) = (removed, newest) {
                self.inner.state.send_if_modified(|s| match s.note_mut(note_id) {
                    Some(note) if !note.has_tag(tag_id) => {
                        let pos = pos.min(note.tags.len());
                        note.tags.insert(pos, tag);
                        true
                    }
                    _ => false,
                });
            }
        }
    }

    // ---- filters ----

    pub fn set_search_query(&self, query: impl Into<String>) {
        let query = query.into();
        self.update_filter(|f| replace(&mut f.search_query, query));
    }

    pub fn set_selected_tags(&self, tags: Vec<TagId>) {
        self.update_filter(|f| replace(&mut f.selected_tags, tags));
    }

    /// Add `tag` to the selection, or remove it if already selected.
    pub fn toggle_selected_tag(&self, tag: TagId) {
        self.update_filter(|f| {
            match f.selected_tags.iter().position(|t| *t == tag) {
                Some(pos) => {
                    f.selected_tags.remove(pos);
                }
                None => f.selected_tags.push(tag),
            }
            true
        });
    }

    pub fn set_tag_match(&self, mode: TagMatch) {
        self.update_filter(|f| replace(&mut f.tag_match, mode));
    }

    pub fn toggle_show_archived(&self) {
        self.update_filter(|f| {
            f.show_archived = !f.show_archived;
            true
        });
    }

    /// Restrict to a single day, or lift the date restriction with `None`.
    pub fn set_date_filter(&self, date: Option<NaiveDate>) {
        let dates: BTreeSet<NaiveDate> = date.into_iter().collect();
        self.update_filter(|f| replace(&mut f.selected_dates, dates));
    }

    pub fn set_selected_dates(&self, dates: impl IntoIterator<Item = NaiveDate>) {
        let dates: BTreeSet<NaiveDate> = dates.into_iter().collect();
        self.update_filter(|f| replace(&mut f.selected_dates, dates));
    }

    /// Reset search, tag, archive and date filters.
    pub fn clear_filters(&self) {
        self.update_filter(|f| {
            let before = f.clone();
            f.clear();
            *f != before
        });
    }

    // ---- private helpers ----

    pub(crate) fn pending(&self) -> MutexGuard<'_, PendingLedger> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn update_filter(&self, f: impl FnOnce(&mut NoteFilter) -> bool) {
        self.inner.state.send_if_modified(|s| f(&mut s.filter));
    }
}

/// One entry in the in-flight load count.
///
/// The count is released when the guard is finished or dropped, so a
/// fetch whose future is cancelled mid-request still clears `is_loading`.
struct LoadGuard<'a> {
    state: &'a watch::Sender<StoreState>,
    open: bool,
}

impl<'a> LoadGuard<'a> {
    fn begin(state: &'a watch::Sender<StoreState>) -> Self {
        state.send_modify(StoreState::begin_load);
        Self { state, open: true }
    }

    /// Apply `f` and close the load in a single notification.
    fn finish(mut self, f: impl FnOnce(&mut StoreState)) {
        self.open = false;
        self.state.send_modify(|s| {
            f(s);
            s.end_load();
        });
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        if self.open {
            self.state.send_modify(StoreState::end_load);
        }
    }
}

/// Assign `value` to `slot`, reporting whether it changed.
fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

/// A timestamp for a local mutation, strictly after `previous`.
fn next_timestamp(previous: Timestamp) -> Timestamp {
    Utc::now().max(previous + Duration::microseconds(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_timestamp_is_strictly_later() {
        let future = Utc::now() + Duration::hours(1);
        assert!(next_timestamp(future) > future);

        let past = Utc::now() - Duration::hours(1);
        assert!(next_timestamp(past) > past);
    }

    #[test]
    fn dropped_load_guard_clears_loading() {
        let (state, _rx) = watch::channel(StoreState::default());

        let outer = LoadGuard::begin(&state);
        drop(LoadGuard::begin(&state));
        assert!(state.borrow().is_loading);

        outer.finish(|_| {});
        assert!(!state.borrow().is_loading);
    }

    #[test]
    fn replace_reports_change() {
        let mut value = 1;
        assert!(!replace(&mut value, 1));
        assert!(replace(&mut value, 2));
        assert_eq!(value, 2);
    }
}
