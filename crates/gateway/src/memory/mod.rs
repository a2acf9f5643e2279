//! A complete in-process backend.
//!
//! [`MemoryBackend`] keeps the three tables in memory, publishes every
//! row change on a [`ChangeBus`] and serves subscriptions from it, and
//! runs a small account service (see [`auth`]). It backs offline runs
//! of the binary and every store test; [`Operation`] faults let tests
//! fail or delay individual calls.
//!
//! Row access is not scoped to the signed-in user. Callers pass the
//! owner explicitly, as they do against the hosted backend.

mod auth;
mod faults;

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use keepmd_core::note::{NewNote, Note, NotePatch};
use keepmd_core::tag::{NewTag, NoteTag, Tag};
use keepmd_core::types::{NoteId, TagId, Timestamp, UserId};
use keepmd_events::{
    subscription_channel, ChangeBinding, ChangeBus, ChangeEvent, Subscription, SubscriptionFeed,
    Table,
};
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

pub use auth::AuthMail;
pub use faults::Operation;

use self::auth::Accounts;
use self::faults::FaultPlan;
use crate::backend::NotesBackend;
use crate::error::{GatewayError, GatewayResult};

#[derive(Debug, Default)]
struct Tables {
    notes: Vec<Note>,
    tags: Vec<Tag>,
    note_tags: Vec<NoteTag>,
    /// Last timestamp handed out; keeps `created_at` strictly increasing.
    clock: Option<Timestamp>,
}

impl Tables {
    fn now(&mut self) -> Timestamp {
        let now = Utc::now();
        let next = match self.clock {
            Some(last) if now <= last => last + chrono::Duration::microseconds(1),
            _ => now,
        };
        self.clock = Some(next);
        next
    }

    /// Remove every association matching `pred`, returning the removed rows.
    fn unlink(&mut self, pred: impl Fn(&NoteTag) -> bool) -> Vec<NoteTag> {
        let (removed, kept): (Vec<NoteTag>, Vec<NoteTag>) =
            self.note_tags.drain(..).partition(|l| pred(l));
        self.note_tags = kept;
        removed
    }
}

/// In-process implementation of both backend traits.
pub struct MemoryBackend {
    tables: Mutex<Tables>,
    accounts: Mutex<Accounts>,
    faults: Mutex<FaultPlan>,
    bus: ChangeBus,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// An empty backend that requires e-mail confirmation on sign-up.
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            accounts: Mutex::new(Accounts::new(true)),
            faults: Mutex::new(FaultPlan::default()),
            bus: ChangeBus::default(),
        }
    }

    /// An empty backend whose sign-ups are signed in immediately.
    pub fn without_email_confirmation() -> Self {
        let backend = Self::new();
        backend.accounts().require_confirmation = false;
        backend
    }

    /// The bus every row change is published on. Publishing directly
    /// simulates changes made by other sessions.
    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    // ---- fault injection ----

    /// Fail the next `times` calls to `op`.
    pub fn fail_next(&self, op: Operation, times: u32) {
        self.faults().fail_next(op, times);
    }

    pub fn fail_always(&self, op: Operation) {
        self.faults().fail_always(op);
    }

    /// Delay every call to `op` by `delay` before it runs.
    pub fn set_latency(&self, op: Operation, delay: Duration) {
        self.faults().set_latency(op, delay);
    }

    /// Remove all injected failures and latencies.
    pub fn clear_faults(&self) {
        self.faults().clear();
    }

    /// How many times `op` has been called, failed calls included.
    pub fn calls(&self, op: Operation) -> usize {
        self.faults().calls(op)
    }

    // ---- direct table access ----

    /// Number of stored association rows.
    pub fn note_tag_count(&self) -> usize {
        self.tables().note_tags.len()
    }

    /// A stored note by id, tags not joined.
    pub fn note(&self, id: NoteId) -> Option<Note> {
        self.tables().notes.iter().find(|n| n.id == id).cloned()
    }

    // ---- private helpers ----

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn accounts(&self) -> MutexGuard<'_, Accounts> {
        self.accounts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn faults(&self) -> MutexGuard<'_, FaultPlan> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply the fault plan for one call.
    async fn enter(&self, op: Operation) -> GatewayResult<()> {
        let (delay, fail) = self.faults().on_call(op);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            tracing::debug!(operation = %op, "Injecting backend failure");
            return Err(GatewayError::Injected(format!("{op} failed")));
        }
        Ok(())
    }

    fn publish_unlinked(&self, removed: Vec<NoteTag>) -> GatewayResult<()> {
        for link in removed {
            self.bus
                .publish(ChangeEvent::delete(Table::NoteTags, serde_json::to_value(link)?));
        }
        Ok(())
    }
}

/// A note as a raw `notes` row: no joined tags.
fn note_row(note: &Note) -> GatewayResult<Value> {
    let mut row = serde_json::to_value(note)?;
    if let Some(obj) = row.as_object_mut() {
        obj.remove("tags");
    }
    Ok(row)
}

#[async_trait]
impl NotesBackend for MemoryBackend {
    async fn list_notes(&self, user_id: UserId) -> GatewayResult<Vec<Note>> {
        self.enter(Operation::ListNotes).await?;
        let tables = self.tables();

        let mut notes: Vec<Note> = tables
            .notes
            .iter()
            .filter(|n| n.user_id == user_id)
            .map(|n| {
                let mut note = n.clone();
                note.tags = tables
                    .note_tags
                    .iter()
                    .filter(|l| l.note_id == n.id)
                    .filter_map(|l| tables.tags.iter().find(|t| t.id == l.tag_id).cloned())
                    .collect();
                note
            })
            .collect();

        notes.sort_by(|a, b| {
            b.is_pinned
                .cmp(&a.is_pinned)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(notes)
    }

    async fn insert_note(&self, new: &NewNote) -> GatewayResult<Note> {
        self.enter(Operation::InsertNote).await?;

        let note = {
            let mut tables = self.tables();
            let now = tables.now();
            let note = Note {
                id: Uuid::new_v4(),
                user_id: new.user_id,
                content: new.content.clone(),
                color: new.color,
                is_pinned: new.is_pinned,
                is_archived: new.is_archived,
                created_at: now,
                updated_at: now,
                tags: Vec::new(),
            };
            tables.notes.push(note.clone());
            note
        };

        self.bus.publish(ChangeEvent::insert(Table::Notes, note_row(&note)?));
        tracing::debug!(note_id = %note.id, "Note inserted");
        Ok(note)
    }

    async fn update_note(
        &self,
        id: NoteId,
        patch: &NotePatch,
        updated_at: Timestamp,
    ) -> GatewayResult<()> {
        self.enter(Operation::UpdateNote).await?;

        let updated = {
            let mut tables = self.tables();
            tables.notes.iter_mut().find(|n| n.id == id).map(|note| {
                note.apply_patch(patch, updated_at);
                note.clone()
            })
        };

        // Updating a missing row matches nothing and is not an error.
        if let Some(note) = updated {
            self.bus.publish(ChangeEvent::update(Table::Notes, note_row(&note)?));
        }
        Ok(())
    }

    async fn delete_note(&self, id: NoteId) -> GatewayResult<()> {
        self.enter(Operation::DeleteNote).await?;

        let (deleted, unlinked) = {
            let mut tables = self.tables();
            let Some(pos) = tables.notes.iter().position(|n| n.id == id) else {
                return Ok(());
            };
            let deleted = tables.notes.remove(pos);
            let unlinked = tables.unlink(|l| l.note_id == id);
            (deleted, unlinked)
        };

        self.publish_unlinked(unlinked)?;
        self.bus.publish(ChangeEvent::delete(Table::Notes, note_row(&deleted)?));
        Ok(())
    }

    async fn list_tags(&self, user_id: UserId) -> GatewayResult<Vec<Tag>> {
        self.enter(Operation::ListTags).await?;
        let mut tags: Vec<Tag> = self
            .tables()
            .tags
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        keepmd_core::tag::sort_by_name(&mut tags);
        Ok(tags)
    }

    async fn find_tag(&self, user_id: UserId, name: &str) -> GatewayResult<Option<Tag>> {
        self.enter(Operation::FindTag).await?;
        Ok(self
            .tables()
            .tags
            .iter()
            .find(|t| t.user_id == user_id && t.name == name)
            .cloned())
    }

    async fn create_or_get_tag(&self, new: &NewTag) -> GatewayResult<Tag> {
        self.enter(Operation::CreateOrGetTag).await?;

        let created = {
            let mut tables = self.tables();
            if let Some(existing) = tables
                .tags
                .iter()
                .find(|t| t.user_id == new.user_id && t.name == new.name)
            {
                return Ok(existing.clone());
            }
            let tag = Tag {
                id: Uuid::new_v4(),
                user_id: new.user_id,
                name: new.name.clone(),
                created_at: tables.now(),
            };
            tables.tags.push(tag.clone());
            tag
        };

        self.bus
            .publish(ChangeEvent::insert(Table::Tags, serde_json::to_value(&created)?));
        Ok(created)
    }

    async fn delete_tag(&self, id: TagId) -> GatewayResult<()> {
        self.enter(Operation::DeleteTag).await?;

        let (deleted, unlinked) = {
            let mut tables = self.tables();
            let Some(pos) = tables.tags.iter().position(|t| t.id == id) else {
                return Ok(());
            };
            let deleted = tables.tags.remove(pos);
            let unlinked = tables.unlink(|l| l.tag_id == id);
            (deleted, unlinked)
        };

        self.publish_unlinked(unlinked)?;
        self.bus
            .publish(ChangeEvent::delete(Table::Tags, serde_json::to_value(&deleted)?));
        Ok(())
    }

    async fn insert_note_tag(&self, link: NoteTag) -> GatewayResult<()> {
        self.enter(Operation::InsertNoteTag).await?;

        {
            let mut tables = self.tables();
            let note_exists = tables.notes.iter().any(|n| n.id == link.note_id);
            let tag_exists = tables.tags.iter().any(|t| t.id == link.tag_id);
            if !note_exists || !tag_exists {
                return Err(GatewayError::Conflict(
                    "insert or update on table \"note_tags\" violates foreign key constraint"
                        .into(),
                ));
            }
            if tables.note_tags.contains(&link) {
                return Err(GatewayError::Conflict(
                    "duplicate key value violates unique constraint \"note_tags_pkey\"".into(),
                ));
            }
            tables.note_tags.push(link);
        }

        self.bus
            .publish(ChangeEvent::insert(Table::NoteTags, serde_json::to_value(link)?));
        Ok(())
    }

    async fn delete_note_tag(&self, link: NoteTag) -> GatewayResult<()> {
        self.enter(Operation::DeleteNoteTag).await?;
        let removed = self.tables().unlink(|l| *l == link);
        self.publish_unlinked(removed)
    }

    async fn subscribe(
        &self,
        channel: &str,
        bindings: Vec<ChangeBinding>,
    ) -> GatewayResult<Subscription> {
        self.enter(Operation::Subscribe).await?;

        // Subscribe to the bus before returning so no change published
        // after this call is missed.
        let receiver = self.bus.subscribe();
        let (feed, subscription) = subscription_channel(channel);
        tokio::spawn(forward_changes(receiver, bindings, feed));
        tracing::debug!(channel, "Memory subscription opened");
        Ok(subscription)
    }
}

/// Forward bus events matching any binding until the subscriber leaves.
async fn forward_changes(
    mut receiver: broadcast::Receiver<ChangeEvent>,
    bindings: Vec<ChangeBinding>,
    feed: SubscriptionFeed,
) {
    loop {
        tokio::select! {
            _ = feed.cancelled() => break,
            received = receiver.recv() => match received {
                Ok(event) => {
                    if bindings.iter().any(|b| b.matches(&event)) && !feed.send(event) {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Memory subscription lagged, changes dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}
