//! Tag rows and the note-tag association.

use serde::{Deserialize, Serialize};

use crate::types::{NoteId, TagId, Timestamp, UserId};

/// A row from the `tags` table.
///
/// Tags are per-user namespaces: two users may own tags with the same
/// name, and those are distinct rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub user_id: UserId,
    pub name: String,
    pub created_at: Timestamp,
}

/// Insert payload for the `tags` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTag {
    pub user_id: UserId,
    pub name: String,
}

impl NewTag {
    pub fn new(user_id: UserId, name: &str) -> Self {
        Self {
            user_id,
            name: normalize_tag_name(name),
        }
    }
}

/// A row from the `note_tags` junction table.
///
/// Has no identity of its own beyond the pair of foreign keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoteTag {
    pub note_id: NoteId,
    pub tag_id: TagId,
}

impl NoteTag {
    pub fn new(note_id: NoteId, tag_id: TagId) -> Self {
        Self { note_id, tag_id }
    }
}

/// Normalize a user-typed tag name before lookup or insert.
///
/// Only surrounding whitespace is removed; casing is preserved because
/// uniqueness is enforced on the exact `(user_id, name)` pair.
pub fn normalize_tag_name(name: &str) -> String {
    name.trim().to_string()
}

/// Sort tags by name, the order the tag list is always presented in.
pub fn sort_by_name(tags: &mut [Tag]) {
    tags.sort_by(|a, b| a.name.cmp(&b.name));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_whitespace_only() {
        assert_eq!(normalize_tag_name("  Work  "), "Work");
        assert_eq!(normalize_tag_name("to do"), "to do");
    }

    #[test]
    fn new_tag_normalizes_name() {
        let user = uuid::Uuid::new_v4();
        let tag = NewTag::new(user, "\tideas\n");
        assert_eq!(tag.name, "ideas");
        assert_eq!(tag.user_id, user);
    }
}
