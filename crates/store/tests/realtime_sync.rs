//! Realtime reconciliation: remote changes flowing into the store cache.

mod common;

use keepmd_core::note::{NewNote, NoteColor, NotePatch};
use keepmd_core::tag::{NewTag, NoteTag};
use keepmd_events::{ChangeEvent, Table};
use keepmd_gateway::{NotesBackend, Operation};
use serde_json::json;

use common::{contents, settle, wait_until, Harness};

// ---------------------------------------------------------------------------
// Test: a delete event removes the matching note
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_event_removes_note() {
    let h = Harness::new();
    let notes = h.with_notes(&["abc", "def"]).await;

    h.store
        .apply_change(
            h.user,
            ChangeEvent::delete(Table::Notes, json!({ "id": notes[0].id.to_string() })),
        )
        .await;

    let state = h.store.snapshot();
    assert!(state.note(notes[0].id).is_none());
    assert_eq!(contents(&state), ["def"]);

    // A second delete of the same id changes nothing.
    h.store
        .apply_change(
            h.user,
            ChangeEvent::delete(Table::Notes, json!({ "id": notes[0].id.to_string() })),
        )
        .await;
    assert_eq!(h.store.snapshot().notes.len(), 1);
}

// ---------------------------------------------------------------------------
// Test: an insert event is applied once per id
// ---------------------------------------------------------------------------

#[tokio::test]
async fn insert_event_is_idempotent() {
    let h = Harness::new();
    h.with_notes(&["existing"]).await;
    let remote = h.seed_note("from elsewhere").await;
    let row = {
        let mut row = serde_json::to_value(&remote).unwrap();
        row.as_object_mut().unwrap().remove("tags");
        row
    };

    for _ in 0..2 {
        h.store
            .apply_change(h.user, ChangeEvent::insert(Table::Notes, row.clone()))
            .await;
    }

    let state = h.store.snapshot();
    assert_eq!(contents(&state), ["from elsewhere", "existing"]);
}

// ---------------------------------------------------------------------------
// Test: an update event merges the columns it carries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn update_event_merges_present_columns() {
    let h = Harness::new();
    let note = h.with_notes(&["before"]).await.remove(0);
    let tag = h.store.add_tag("kept", h.user).await.unwrap();
    h.store.add_tag_to_note(note.id, tag).await;

    h.store
        .apply_change(
            h.user,
            ChangeEvent::update(
                Table::Notes,
                json!({ "id": note.id.to_string(), "content": "after", "is_pinned": true }),
            ),
        )
        .await;

    let local = h.store.note(note.id).unwrap();
    assert_eq!(local.content, "after");
    assert!(local.is_pinned);
    assert_eq!(local.color, note.color);
    assert_eq!(local.tags.len(), 1);
}

#[tokio::test]
async fn malformed_events_are_ignored() {
    let h = Harness::new();
    let note = h.with_notes(&["steady"]).await.remove(0);
    let before = h.store.snapshot().notes;

    h.store
        .apply_change(h.user, ChangeEvent::insert(Table::Notes, json!({ "id": 7 })))
        .await;
    h.store
        .apply_change(
            h.user,
            ChangeEvent::update(
                Table::Notes,
                json!({ "id": note.id.to_string(), "is_pinned": "yes" }),
            ),
        )
        .await;
    h.store
        .apply_change(h.user, ChangeEvent::delete(Table::Notes, json!({})))
        .await;

    assert_eq!(h.store.snapshot().notes, before);
}

// ---------------------------------------------------------------------------
// Test: tag and association events trigger refetches
// ---------------------------------------------------------------------------

#[tokio::test]
async fn tag_events_refetch_tags_and_link_events_refetch_notes() {
    let h = Harness::new();
    h.with_notes(&["n"]).await;
    let tags_before = h.backend.calls(Operation::ListTags);
    let notes_before = h.backend.calls(Operation::ListNotes);

    h.store
        .apply_change(h.user, ChangeEvent::insert(Table::Tags, json!({})))
        .await;
    h.store
        .apply_change(h.user, ChangeEvent::delete(Table::NoteTags, json!({})))
        .await;

    assert_eq!(h.backend.calls(Operation::ListTags), tags_before + 1);
    assert_eq!(h.backend.calls(Operation::ListNotes), notes_before + 1);
}

// ---------------------------------------------------------------------------
// Test: changes made by another client arrive through the subscription
// ---------------------------------------------------------------------------

#[tokio::test]
async fn subscription_applies_remote_changes() {
    let h = Harness::new();
    let notes = h.with_notes(&["shared"]).await;
    h.store.setup_realtime_subscription(h.user).await;
    assert!(h.store.snapshot().subscribed);

    let remote = h
        .backend
        .insert_note(&NewNote::new(h.user, "remote", NoteColor::Yellow))
        .await
        .unwrap();
    wait_until(&h.store, |s| s.note(remote.id).is_some()).await;

    h.backend
        .update_note(notes[0].id, &NotePatch::archived(true), chrono::Utc::now())
        .await
        .unwrap();
    wait_until(&h.store, |s| s.note(notes[0].id).is_some_and(|n| n.is_archived)).await;

    h.backend.delete_note(remote.id).await.unwrap();
    wait_until(&h.store, |s| s.note(remote.id).is_none()).await;

    let tag = h
        .backend
        .create_or_get_tag(&NewTag::new(h.user, "remote-tag"))
        .await
        .unwrap();
    wait_until(&h.store, |s| s.tag(tag.id).is_some()).await;

    h.backend
        .insert_note_tag(NoteTag::new(notes[0].id, tag.id))
        .await
        .unwrap();
    wait_until(&h.store, |s| {
        s.note(notes[0].id).is_some_and(|n| n.has_tag(tag.id))
    })
    .await;

    h.store.cleanup_subscription();
}

// ---------------------------------------------------------------------------
// Test: other users' rows never reach the store
// ---------------------------------------------------------------------------

#[tokio::test]
async fn other_users_changes_are_filtered() {
    let h = Harness::new();
    h.store.setup_realtime_subscription(h.user).await;

    let stranger = uuid::Uuid::new_v4();
    h.backend
        .insert_note(&NewNote::new(stranger, "not mine", NoteColor::White))
        .await
        .unwrap();
    let mine = h
        .backend
        .insert_note(&NewNote::new(h.user, "mine", NoteColor::White))
        .await
        .unwrap();

    let state = wait_until(&h.store, |s| s.note(mine.id).is_some()).await;
    assert_eq!(contents(&state), ["mine"]);
}

// ---------------------------------------------------------------------------
// Test: a note added locally while subscribed appears exactly once
// ---------------------------------------------------------------------------

#[tokio::test]
async fn local_add_and_echo_do_not_duplicate() {
    let h = Harness::new();
    h.store.setup_realtime_subscription(h.user).await;

    let created = h
        .store
        .add_note(NewNote::new(h.user, "echoed", NoteColor::Blue))
        .await
        .unwrap();
    settle().await;

    let state = h.store.snapshot();
    assert_eq!(state.notes.iter().filter(|n| n.id == created.id).count(), 1);
}

// ---------------------------------------------------------------------------
// Test: cleanup is idempotent and stops delivery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cleanup_stops_delivery_and_is_idempotent() {
    let h = Harness::new();
    h.store.cleanup_subscription();

    h.store.setup_realtime_subscription(h.user).await;
    assert_eq!(h.store.subscribed_user(), Some(h.user));

    h.store.cleanup_subscription();
    h.store.cleanup_subscription();
    assert!(!h.store.snapshot().subscribed);
    assert_eq!(h.store.subscribed_user(), None);

    h.seed_note("after cleanup").await;
    settle().await;
    assert!(h.store.snapshot().notes.is_empty());
}

// ---------------------------------------------------------------------------
// Test: cleanup during an event-driven refetch still clears is_loading
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cleanup_mid_refetch_clears_loading() {
    let h = Harness::new();
    let notes = h.with_notes(&["slow"]).await;
    let tag = h
        .backend
        .create_or_get_tag(&NewTag::new(h.user, "slow-tag"))
        .await
        .unwrap();
    h.store.setup_realtime_subscription(h.user).await;

    h.backend
        .set_latency(Operation::ListNotes, std::time::Duration::from_millis(300));
    h.backend
        .insert_note_tag(NoteTag::new(notes[0].id, tag.id))
        .await
        .unwrap();
    wait_until(&h.store, |s| s.is_loading).await;

    h.store.cleanup_subscription();
    h.backend.clear_faults();
    wait_until(&h.store, |s| !s.is_loading).await;

    h.store.fetch_notes(h.user).await;
    let state = h.store.snapshot();
    assert!(!state.is_loading);
    assert!(state.note(notes[0].id).is_some_and(|n| n.has_tag(tag.id)));
}

// ---------------------------------------------------------------------------
// Test: subscribing again replaces the previous channel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn resubscribe_keeps_a_single_channel() {
    let h = Harness::new();
    h.store.setup_realtime_subscription(h.user).await;
    h.store.setup_realtime_subscription(h.user).await;

    let remote = h.seed_note("once").await;
    wait_until(&h.store, |s| s.note(remote.id).is_some()).await;
    settle().await;

    assert_eq!(h.store.snapshot().notes.len(), 1);
    assert_eq!(h.backend.calls(Operation::Subscribe), 2);
}

#[tokio::test]
async fn failed_subscribe_leaves_store_unsubscribed() {
    let h = Harness::new();
    h.backend.fail_next(Operation::Subscribe, 1);

    h.store.setup_realtime_subscription(h.user).await;

    assert!(!h.store.snapshot().subscribed);
    assert_eq!(h.store.subscribed_user(), None);
}
