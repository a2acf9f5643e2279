//! Shared fixtures for store integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use keepmd_core::note::{NewNote, Note, NoteColor};
use keepmd_core::types::UserId;
use keepmd_gateway::{MemoryBackend, NotesBackend};
use keepmd_store::{NotesStore, Notices, StoreState};

pub const EMAIL: &str = "ada@example.com";
pub const PASSWORD: &str = "correct horse";

/// A store on top of a fresh in-memory backend with one seeded user.
pub struct Harness {
    pub backend: Arc<MemoryBackend>,
    pub store: NotesStore,
    pub notices: Notices,
    pub user: UserId,
}

impl Harness {
    pub fn new() -> Self {
        let backend = Arc::new(MemoryBackend::new());
        let user = backend
            .seed_user(EMAIL, PASSWORD)
            .expect("seed user")
            .id;
        let notices = Notices::default();
        let store = NotesStore::with_notices(backend.clone(), notices.clone());
        Self {
            backend,
            store,
            notices,
            user,
        }
    }

    /// Insert a note straight into the backend, bypassing the store.
    pub async fn seed_note(&self, content: &str) -> Note {
        self.backend
            .insert_note(&NewNote::new(self.user, content, NoteColor::White))
            .await
            .expect("seed note")
    }

    /// Seed notes and load them into the store.
    pub async fn with_notes(&self, contents: &[&str]) -> Vec<Note> {
        let mut notes = Vec::new();
        for content in contents {
            notes.push(self.seed_note(content).await);
        }
        self.store.fetch_notes(self.user).await;
        notes
    }
}

/// Wait until the store state satisfies `pred`, returning that state.
pub async fn wait_until(store: &NotesStore, pred: impl Fn(&StoreState) -> bool) -> StoreState {
    let mut rx = store.watch();
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if pred(&rx.borrow_and_update()) {
                return rx.borrow().clone();
            }
            rx.changed().await.expect("store dropped");
        }
    })
    .await
    .expect("store state not reached in time")
}

/// Let spawned tasks (change forwarders, event loops) run.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

pub fn contents(state: &StoreState) -> Vec<&str> {
    state.notes.iter().map(|n| n.content.as_str()).collect()
}
