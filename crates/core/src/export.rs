//! Markdown export: which notes to write and what to call the files.
//!
//! Archived notes are never exported. Packaging the files (single
//! download, zip, directory) is left to the caller.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{CoreError, CoreResult};
use crate::filter::TagMatch;
use crate::note::Note;
use crate::types::TagId;

/// Markdown emphasis characters dropped when deriving a title.
static MARKUP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[#*`]").expect("valid regex"));

/// Characters that are unsafe in file names on common platforms.
static UNSAFE_FILENAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[/\\?%*:|"<>]"#).expect("valid regex"));

/// Titles shorter than this fall through to the next strategy.
const MIN_TITLE_CHARS: usize = 3;

/// Characters of content used for the fallback title.
const FALLBACK_TITLE_CHARS: usize = 20;

/// Maximum characters kept from the title in a file name.
const MAX_FILENAME_STEM_CHARS: usize = 50;

/// Name of the directory multi-note exports are placed under.
pub const EXPORT_FOLDER: &str = "notes";

/// One markdown file ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub filename: String,
    pub content: String,
}

/// Notes for "download all": every non-archived note.
pub fn select_all(notes: &[Note]) -> Vec<&Note> {
    notes.iter().filter(|n| !n.is_archived).collect()
}

/// Notes for "download selected": non-archived notes matching the tag
/// selection under `mode`.
///
/// An empty selection is rejected rather than treated as "everything".
pub fn select_by_tags<'a>(
    notes: &'a [Note],
    selected: &[TagId],
    mode: TagMatch,
) -> CoreResult<Vec<&'a Note>> {
    if selected.is_empty() {
        return Err(CoreError::Validation(
            "Please select at least one tag".into(),
        ));
    }
    Ok(notes
        .iter()
        .filter(|n| !n.is_archived && mode.matches(selected, n))
        .collect())
}

/// Human-readable title for a note.
///
/// Uses the first line without markdown markers, then the first few
/// characters of content, then `note-<id prefix>`.
pub fn export_title(note: &Note) -> String {
    let first_line = note.content.lines().next().unwrap_or_default();
    let title = MARKUP_RE.replace_all(first_line, "").trim().to_string();
    if title.chars().count() >= MIN_TITLE_CHARS {
        return title;
    }

    let head: String = note.content.chars().take(FALLBACK_TITLE_CHARS).collect();
    let title = MARKUP_RE
        .replace_all(&head.replace('\n', " "), " ")
        .trim()
        .to_string();
    if title.chars().count() >= MIN_TITLE_CHARS {
        return title;
    }

    let id = note.id.simple().to_string();
    format!("note-{}", &id[..8])
}

/// Safe `.md` file name for a note.
pub fn export_filename(note: &Note) -> String {
    let stem: String = export_title(note)
        .chars()
        .take(MAX_FILENAME_STEM_CHARS)
        .collect();
    format!("{}.md", UNSAFE_FILENAME_RE.replace_all(&stem, "-"))
}

/// Build the files for a set of notes.
///
/// Colliding names get a numeric suffix (`title-2.md`) so no note
/// silently overwrites another.
pub fn export_files(notes: &[&Note]) -> Vec<ExportFile> {
    let mut used = HashSet::new();
    notes
        .iter()
        .map(|note| {
            let base = export_filename(note);
            let mut filename = base.clone();
            let mut n = 2;
            while !used.insert(filename.clone()) {
                let stem = base.trim_end_matches(".md");
                filename = format!("{stem}-{n}.md");
                n += 1;
            }
            ExportFile {
                filename,
                content: note.content.clone(),
            }
        })
        .collect()
}
