//! Note rows, insert/update payloads, and the background color palette.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::tag::Tag;
use crate::types::{NoteId, TagId, Timestamp, UserId};

// ---------------------------------------------------------------------------
// Color palette
// ---------------------------------------------------------------------------

/// Fixed palette of note background colors.
///
/// Stored on the backend as the light-mode background token
/// (`bg-white`, `bg-red-100`, ...). Rows written by older clients carry
/// the full class string (`"bg-white dark:bg-zinc-800"`); only its first
/// token is significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NoteColor {
    #[default]
    White,
    Red,
    Orange,
    Yellow,
    Green,
    Blue,
    Purple,
    Pink,
}

impl NoteColor {
    /// Every palette entry in picker order.
    pub const ALL: [NoteColor; 8] = [
        NoteColor::White,
        NoteColor::Red,
        NoteColor::Orange,
        NoteColor::Yellow,
        NoteColor::Green,
        NoteColor::Blue,
        NoteColor::Purple,
        NoteColor::Pink,
    ];

    /// The persisted background token.
    pub fn token(self) -> &'static str {
        match self {
            NoteColor::White => "bg-white",
            NoteColor::Red => "bg-red-100",
            NoteColor::Orange => "bg-orange-100",
            NoteColor::Yellow => "bg-yellow-100",
            NoteColor::Green => "bg-green-100",
            NoteColor::Blue => "bg-blue-100",
            NoteColor::Purple => "bg-purple-100",
            NoteColor::Pink => "bg-pink-100",
        }
    }

    /// Background token used when the dark theme is active.
    pub fn dark_token(self) -> &'static str {
        match self {
            NoteColor::White => "bg-zinc-800",
            NoteColor::Red => "bg-red-900",
            NoteColor::Orange => "bg-orange-900",
            NoteColor::Yellow => "bg-yellow-900",
            NoteColor::Green => "bg-green-900",
            NoteColor::Blue => "bg-blue-900",
            NoteColor::Purple => "bg-purple-900",
            NoteColor::Pink => "bg-pink-900",
        }
    }

    /// Parse a stored color value. Accepts a bare token or a full class
    /// string whose first token is a palette token.
    pub fn from_token(value: &str) -> Option<Self> {
        let first = value.split_whitespace().next()?;
        Self::ALL.into_iter().find(|c| c.token() == first)
    }
}

impl Serialize for NoteColor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.token())
    }
}

impl<'de> Deserialize<'de> for NoteColor {
    /// Unknown tokens fall back to the default color so that a single
    /// row with a retired palette entry cannot fail a whole fetch.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_token(&raw).unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Note
// ---------------------------------------------------------------------------

/// A row from the `notes` table, with its tags materialized from the
/// `note_tags` join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub user_id: UserId,
    pub content: String,
    pub color: NoteColor,
    pub is_pinned: bool,
    pub is_archived: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Derived from the join; absent on raw `notes` rows.
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl Note {
    /// Decode a raw `notes` row (as delivered by a realtime insert event).
    /// The tag list starts out empty.
    pub fn from_row(row: Value) -> Result<Self, serde_json::Error> {
        let mut note: Note = serde_json::from_value(row)?;
        note.tags.clear();
        Ok(note)
    }

    pub fn has_tag(&self, tag_id: TagId) -> bool {
        self.tags.iter().any(|t| t.id == tag_id)
    }

    /// Apply a patch and stamp `updated_at`.
    pub fn apply_patch(&mut self, patch: &NotePatch, updated_at: Timestamp) {
        if let Some(content) = &patch.content {
            self.content = content.clone();
        }
        if let Some(color) = patch.color {
            self.color = color;
        }
        if let Some(is_pinned) = patch.is_pinned {
            self.is_pinned = is_pinned;
        }
        if let Some(is_archived) = patch.is_archived {
            self.is_archived = is_archived;
        }
        self.updated_at = updated_at;
    }

    /// Current values of exactly the fields `patch` touches.
    ///
    /// Applying the returned patch undoes `patch`.
    pub fn capture(&self, patch: &NotePatch) -> NotePatch {
        NotePatch {
            content: patch.content.as_ref().map(|_| self.content.clone()),
            color: patch.color.map(|_| self.color),
            is_pinned: patch.is_pinned.map(|_| self.is_pinned),
            is_archived: patch.is_archived.map(|_| self.is_archived),
        }
    }

    /// Merge the columns present in a realtime row object into this note.
    ///
    /// Columns missing from `row` are left untouched, as are `id` and
    /// the derived `tags` list. Unknown columns are ignored.
    pub fn merge_row(&mut self, row: &Map<String, Value>) -> Result<(), serde_json::Error> {
        for (column, value) in row {
            match column.as_str() {
                "user_id" => self.user_id = serde_json::from_value(value.clone())?,
                "content" => self.content = serde_json::from_value(value.clone())?,
                "color" => self.color = serde_json::from_value(value.clone())?,
                "is_pinned" => self.is_pinned = serde_json::from_value(value.clone())?,
                "is_archived" => self.is_archived = serde_json::from_value(value.clone())?,
                "created_at" => self.created_at = serde_json::from_value(value.clone())?,
                "updated_at" => self.updated_at = serde_json::from_value(value.clone())?,
                _ => {}
            }
        }
        Ok(())
    }
}

/// Insert payload for the `notes` table. Server-generated columns
/// (`id`, timestamps) and the derived tag list are omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNote {
    pub user_id: UserId,
    pub content: String,
    pub color: NoteColor,
    pub is_pinned: bool,
    pub is_archived: bool,
}

impl NewNote {
    /// A fresh, unpinned, unarchived note.
    pub fn new(user_id: UserId, content: impl Into<String>, color: NoteColor) -> Self {
        Self {
            user_id,
            content: content.into(),
            color,
            is_pinned: false,
            is_archived: false,
        }
    }
}

/// Any subset of a note's mutable columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<NoteColor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_pinned: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_archived: Option<bool>,
}

impl NotePatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn pinned(is_pinned: bool) -> Self {
        Self {
            is_pinned: Some(is_pinned),
            ..Default::default()
        }
    }

    pub fn archived(is_archived: bool) -> Self {
        Self {
            is_archived: Some(is_archived),
            ..Default::default()
        }
    }

    pub fn with_color(mut self, color: NoteColor) -> Self {
        self.color = Some(color);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.color.is_none()
            && self.is_pinned.is_none()
            && self.is_archived.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn sample_note() -> Note {
        let now = Utc::now();
        Note {
            id: uuid::Uuid::new_v4(),
            user_id: uuid::Uuid::new_v4(),
            content: "Hello **world**".to_string(),
            color: NoteColor::White,
            is_pinned: false,
            is_archived: false,
            created_at: now,
            updated_at: now,
            tags: Vec::new(),
        }
    }

    #[test]
    fn color_accepts_full_class_string() {
        assert_eq!(
            NoteColor::from_token("bg-red-100 dark:bg-red-900"),
            Some(NoteColor::Red)
        );
        assert_eq!(NoteColor::from_token("bg-white"), Some(NoteColor::White));
        assert_eq!(NoteColor::from_token(""), None);
    }

    #[test]
    fn color_serializes_as_token_and_tolerates_unknown() {
        assert_eq!(json!(NoteColor::Blue), json!("bg-blue-100"));
        let parsed: NoteColor = serde_json::from_value(json!("bg-teal-100")).unwrap();
        assert_eq!(parsed, NoteColor::White);
    }

    #[test]
    fn apply_patch_touches_only_patched_fields() {
        let mut note = sample_note();
        let before = note.clone();
        let later = before.updated_at + Duration::seconds(5);

        note.apply_patch(&NotePatch::pinned(true), later);

        assert!(note.is_pinned);
        assert_eq!(note.content, before.content);
        assert_eq!(note.color, before.color);
        assert_eq!(note.is_archived, before.is_archived);
        assert_eq!(note.updated_at, later);
    }

    #[test]
    fn capture_produces_inverse_patch() {
        let mut note = sample_note();
        let patch = NotePatch::content("changed").with_color(NoteColor::Green);
        let undo = note.capture(&patch);

        note.apply_patch(&patch, Utc::now());
        note.apply_patch(&undo, Utc::now());

        assert_eq!(note.content, "Hello **world**");
        assert_eq!(note.color, NoteColor::White);
        assert!(undo.is_pinned.is_none());
    }

    #[test]
    fn merge_row_leaves_missing_columns_untouched() {
        let mut note = sample_note();
        let tag = Tag {
            id: uuid::Uuid::new_v4(),
            user_id: note.user_id,
            name: "work".into(),
            created_at: Utc::now(),
        };
        note.tags.push(tag);

        let row = json!({ "id": note.id, "is_archived": true, "extra": 1 });
        note.merge_row(row.as_object().unwrap()).unwrap();

        assert!(note.is_archived);
        assert_eq!(note.content, "Hello **world**");
        assert_eq!(note.tags.len(), 1);
    }

    #[test]
    fn from_row_starts_without_tags() {
        let note = sample_note();
        let mut row = serde_json::to_value(&note).unwrap();
        row.as_object_mut().unwrap().remove("tags");

        let decoded = Note::from_row(row).unwrap();
        assert!(decoded.tags.is_empty());
        assert_eq!(decoded.id, note.id);
    }

    #[test]
    fn patch_serialization_skips_absent_fields() {
        let value = serde_json::to_value(NotePatch::archived(true)).unwrap();
        assert_eq!(value, json!({ "is_archived": true }));
        assert!(NotePatch::default().is_empty());
    }
}
