//! Row storage and change subscriptions for notes, tags and their
//! association.

use async_trait::async_trait;
use keepmd_core::note::{NewNote, Note, NotePatch};
use keepmd_core::tag::{NewTag, NoteTag, Tag};
use keepmd_core::types::{NoteId, TagId, Timestamp, UserId};
use keepmd_events::{ChangeBinding, Subscription};

use crate::error::GatewayResult;

/// Row-level access to the `notes`, `tags` and `note_tags` tables.
///
/// Implementations scope nothing on their own: callers pass the owning
/// user explicitly wherever a read is per-user.
#[async_trait]
pub trait NotesBackend: Send + Sync {
    /// All notes owned by `user_id` with their tags joined in, pinned
    /// first, then newest first.
    async fn list_notes(&self, user_id: UserId) -> GatewayResult<Vec<Note>>;

    /// Insert a note and return the stored row (tags empty).
    async fn insert_note(&self, note: &NewNote) -> GatewayResult<Note>;

    /// Apply `patch` to note `id` and set its `updated_at`.
    async fn update_note(
        &self,
        id: NoteId,
        patch: &NotePatch,
        updated_at: Timestamp,
    ) -> GatewayResult<()>;

    async fn delete_note(&self, id: NoteId) -> GatewayResult<()>;

    /// All tags owned by `user_id`, sorted by name.
    async fn list_tags(&self, user_id: UserId) -> GatewayResult<Vec<Tag>>;

    /// The tag named exactly `name` owned by `user_id`, if any.
    async fn find_tag(&self, user_id: UserId, name: &str) -> GatewayResult<Option<Tag>>;

    /// Insert a tag, or return the existing row when `(user_id, name)`
    /// is already taken. Atomic on the backend.
    async fn create_or_get_tag(&self, tag: &NewTag) -> GatewayResult<Tag>;

    async fn delete_tag(&self, id: TagId) -> GatewayResult<()>;

    async fn insert_note_tag(&self, link: NoteTag) -> GatewayResult<()>;

    async fn delete_note_tag(&self, link: NoteTag) -> GatewayResult<()>;

    /// Open a change stream on `channel` delivering events that match
    /// any of `bindings`.
    async fn subscribe(
        &self,
        channel: &str,
        bindings: Vec<ChangeBinding>,
    ) -> GatewayResult<Subscription>;
}
