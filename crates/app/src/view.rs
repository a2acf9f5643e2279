//! Plain-text rendering of the note grid.

use std::fmt::Write;

use keepmd_core::filter::{EmptyGridReason, NoteGrid};
use keepmd_core::note::Note;
use keepmd_store::StoreState;

/// Characters of a note's first line shown in the grid.
const PREVIEW_CHARS: usize = 60;

pub fn empty_message(reason: EmptyGridReason) -> &'static str {
    match reason {
        EmptyGridReason::NoNotes => "Notes you add appear here",
        EmptyGridReason::NoArchivedNotes => "Your archived notes appear here",
        EmptyGridReason::NoMatches => "No matching results",
    }
}

/// Render the visible grid for the terminal.
///
/// Section headings are only shown when there are pinned notes.
pub fn render(state: &StoreState) -> String {
    let grid = state.grid();
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{} ({} of {} notes{})",
        if state.filter.show_archived { "Archive" } else { "Notes" },
        grid.len(),
        state.notes.len(),
        if state.is_loading { ", loading" } else { "" },
    );

    render_grid(&mut out, &grid);
    out
}

fn render_grid(out: &mut String, grid: &NoteGrid<'_>) {
    if let Some(reason) = grid.empty_reason {
        let _ = writeln!(out, "  {}", empty_message(reason));
        return;
    }

    if grid.pinned.is_empty() {
        render_section(out, &grid.others);
        return;
    }

    let _ = writeln!(out, "Pinned");
    render_section(out, &grid.pinned);
    if !grid.others.is_empty() {
        let _ = writeln!(out, "Others");
        render_section(out, &grid.others);
    }
}

fn render_section(out: &mut String, notes: &[&Note]) {
    for note in notes {
        let _ = writeln!(out, "  {}", note_line(note));
    }
}

/// One-line summary: color, preview of the first line, tags.
pub fn note_line(note: &Note) -> String {
    let first_line = note.content.lines().next().unwrap_or_default().trim();
    let mut preview: String = first_line.chars().take(PREVIEW_CHARS).collect();
    if first_line.chars().count() > PREVIEW_CHARS || note.content.trim().lines().count() > 1 {
        preview.push_str("...");
    }

    let mut line = format!("[{}] {preview}", note.color.token());
    for tag in &note.tags {
        let _ = write!(line, " #{}", tag.name);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use keepmd_core::note::NoteColor;
    use keepmd_core::tag::Tag;
    use uuid::Uuid;

    fn note(content: &str, pinned: bool) -> Note {
        let now = Utc::now();
        Note {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            content: content.to_string(),
            color: NoteColor::White,
            is_pinned: pinned,
            is_archived: false,
            created_at: now,
            updated_at: now,
            tags: Vec::new(),
        }
    }

    #[test]
    fn empty_store_shows_placeholder() {
        let text = render(&StoreState::default());
        assert!(text.contains("Notes you add appear here"));
    }

    #[test]
    fn pinned_section_comes_first() {
        let mut state = StoreState::default();
        state.notes = vec![note("plain", false), note("pinned", true)];
        let text = render(&state);

        let pinned = text.find("Pinned").unwrap();
        let others = text.find("Others").unwrap();
        assert!(pinned < text.find("pinned").unwrap());
        assert!(others > pinned);
        assert!(text.find("plain").unwrap() > others);
    }

    #[test]
    fn no_headings_without_pinned_notes() {
        let mut state = StoreState::default();
        state.notes = vec![note("a", false)];
        let text = render(&state);
        assert!(!text.contains("Pinned"));
        assert!(!text.contains("Others"));
    }

    #[test]
    fn note_line_shows_color_preview_and_tags() {
        let mut n = note("# Shopping\n- milk", false);
        n.color = NoteColor::Yellow;
        n.tags.push(Tag {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            name: "home".into(),
            created_at: Utc::now(),
        });

        let line = note_line(&n);
        assert!(line.starts_with(&format!("[{}] # Shopping...", NoteColor::Yellow.token())));
        assert!(line.ends_with("#home"));
    }
}
