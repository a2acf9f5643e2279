//! Realtime reconciliation.
//!
//! The store opens one channel per signed-in user carrying three
//! bindings: the user's notes, the user's tags, and all `note_tags`
//! rows. Note events are applied in place; tag and association events
//! trigger a refetch, since association rows carry no user id and a
//! tag rename must reach every note that carries it.

use std::sync::{Arc, PoisonError, Weak};

use keepmd_core::note::Note;
use keepmd_core::types::UserId;
use keepmd_events::{ChangeBinding, ChangeEvent, ChangeFilter, RowChange, Subscription, Table};
use serde_json::Value;

use crate::store::{Inner, NotesStore, SubscriptionHandle};

/// Name of the channel the store listens on.
pub const CHANNEL_NAME: &str = "notes-changes";

/// Bindings for `user_id`'s channel.
pub fn bindings_for(user_id: UserId) -> Vec<ChangeBinding> {
    vec![
        ChangeBinding::filtered(Table::Notes, ChangeFilter::eq("user_id", user_id)),
        ChangeBinding::filtered(Table::Tags, ChangeFilter::eq("user_id", user_id)),
        ChangeBinding::table(Table::NoteTags),
    ]
}

impl NotesStore {
    /// Start applying remote changes for `user_id`.
    ///
    /// Any previous subscription is torn down first, so calling this
    /// again (for instance after switching users) never leaves two
    /// channels open.
    pub async fn setup_realtime_subscription(&self, user_id: UserId) {
        self.cleanup_subscription();

        let subscription = match self
            .inner
            .backend
            .subscribe(CHANNEL_NAME, bindings_for(user_id))
            .await
        {
            Ok(subscription) => subscription,
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "Error subscribing to changes");
                return;
            }
        };

        let cancel = subscription.cancel_token();
        let task = tokio::spawn(event_loop(
            Arc::downgrade(&self.inner),
            subscription,
            user_id,
        ));

        let previous = self
            .inner
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(SubscriptionHandle {
                user_id,
                cancel,
                task,
            });
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }

        self.inner.state.send_if_modified(|s| !std::mem::replace(&mut s.subscribed, true));
        tracing::info!(user_id = %user_id, channel = CHANNEL_NAME, "Realtime subscription active");
    }

    /// Stop applying remote changes. Safe to call when not subscribed.
    pub fn cleanup_subscription(&self) {
        let handle = self
            .inner
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(handle) = handle {
            handle.cancel.cancel();
            handle.task.abort();
            tracing::info!(user_id = %handle.user_id, "Realtime subscription closed");
        }
        self.inner.state.send_if_modified(|s| std::mem::replace(&mut s.subscribed, false));
    }

    /// The user the active subscription belongs to.
    pub fn subscribed_user(&self) -> Option<UserId> {
        self.inner
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|h| h.user_id)
    }

    /// Reconcile one remote change into the cache.
    pub async fn apply_change(&self, user_id: UserId, event: ChangeEvent) {
        tracing::debug!(
            table = %event.table,
            kind = ?event.change.kind(),
            "Realtime change"
        );

        match event.table {
            Table::Notes => self.apply_note_change(event.change),
            Table::Tags => self.fetch_tags(user_id).await,
            Table::NoteTags => self.fetch_notes(user_id).await,
        }
    }

    fn apply_note_change(&self, change: RowChange) {
        match change {
            RowChange::Insert { new } => {
                let note = match Note::from_row(new) {
                    Ok(note) => note,
                    Err(e) => {
                        tracing::warn!(error = %e, "Ignoring malformed note insert");
                        return;
                    }
                };
                self.inner.state.send_if_modified(|s| {
                    if s.note(note.id).is_some() {
                        return false;
                    }
                    s.notes.insert(0, note);
                    true
                });
            }
            RowChange::Update { new } => {
                let Some((id, row)) = keyed_row(&new) else {
                    tracing::warn!("Ignoring note update without id");
                    return;
                };
                self.inner.state.send_if_modified(|s| {
                    let Some(note) = s.note_mut(id) else {
                        return false;
                    };
                    let mut merged = note.clone();
                    match merged.merge_row(row) {
                        Ok(()) => {
                            *note = merged;
                            true
                        }
                        Err(e) => {
                            tracing::warn!(note_id = %id, error = %e, "Ignoring malformed note update");
                            false
                        }
                    }
                });
            }
            RowChange::Delete { old } => {
                let Some((id, _)) = keyed_row(&old) else {
                    tracing::warn!("Ignoring note delete without id");
                    return;
                };
                self.inner.state.send_if_modified(|s| {
                    let before = s.notes.len();
                    s.notes.retain(|n| n.id != id);
                    s.notes.len() != before
                });
            }
        }
    }
}

/// The row object and its parsed `id` column.
fn keyed_row(row: &Value) -> Option<(uuid::Uuid, &serde_json::Map<String, Value>)> {
    let object = row.as_object()?;
    let id = object.get("id")?.as_str()?.parse().ok()?;
    Some((id, object))
}

async fn event_loop(store: Weak<Inner>, mut subscription: Subscription, user_id: UserId) {
    while let Some(event) = subscription.next().await {
        let Some(inner) = store.upgrade() else {
            break;
        };
        NotesStore { inner }.apply_change(user_id, event).await;
    }
    tracing::debug!(user_id = %user_id, "Realtime event loop finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn bindings_scope_notes_and_tags_to_user() {
        let user = Uuid::new_v4();
        let bindings = bindings_for(user);
        assert_eq!(bindings.len(), 3);

        let mine = ChangeEvent::insert(Table::Notes, json!({ "user_id": user.to_string() }));
        let theirs = ChangeEvent::insert(Table::Tags, json!({ "user_id": Uuid::new_v4().to_string() }));
        let link = ChangeEvent::delete(Table::NoteTags, json!({ "note_id": "x", "tag_id": "y" }));

        assert!(bindings.iter().any(|b| b.matches(&mine)));
        assert!(!bindings.iter().any(|b| b.matches(&theirs)));
        assert!(bindings.iter().any(|b| b.matches(&link)));
    }

    #[test]
    fn keyed_row_requires_uuid_id() {
        let id = Uuid::new_v4();
        assert_eq!(keyed_row(&json!({ "id": id.to_string() })).map(|(i, _)| i), Some(id));
        assert!(keyed_row(&json!({ "id": "abc" })).is_none());
        assert!(keyed_row(&json!({})).is_none());
        assert!(keyed_row(&json!("x")).is_none());
    }
}
