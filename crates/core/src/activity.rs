//! Note activity counts for the calendar filter.
//!
//! Every note contributes one count to its creation day, month and
//! year. Keys are `yyyy-MM-dd`, `yyyy-MM` and `yyyy`.

use std::collections::HashMap;

use chrono::{Datelike, FixedOffset, NaiveDate};

use crate::note::Note;

/// Granularity of a calendar cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityScale {
    Day,
    Month,
    Year,
}

/// Note counts per day, month and year.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityMap {
    counts: HashMap<String, usize>,
}

impl ActivityMap {
    /// Build the map from a note list, bucketing by `offset` local time.
    pub fn from_notes(notes: &[Note], offset: FixedOffset) -> Self {
        let mut counts = HashMap::new();
        for note in notes {
            let day = note.created_at.with_timezone(&offset).date_naive();
            for scale in [ActivityScale::Day, ActivityScale::Month, ActivityScale::Year] {
                *counts.entry(key_for(day, scale)).or_insert(0) += 1;
            }
        }
        Self { counts }
    }

    /// Number of notes created in the cell containing `date`.
    pub fn count(&self, date: NaiveDate, scale: ActivityScale) -> usize {
        self.counts.get(&key_for(date, scale)).copied().unwrap_or(0)
    }

    /// Highlight intensity (0-3) of the cell containing `date`.
    pub fn level(&self, date: NaiveDate, scale: ActivityScale) -> u8 {
        activity_level(self.count(date, scale))
    }
}

/// Map a raw count onto the 0-3 highlight scale.
pub fn activity_level(count: usize) -> u8 {
    match count {
        0 => 0,
        1..=2 => 1,
        3..=5 => 2,
        _ => 3,
    }
}

fn key_for(date: NaiveDate, scale: ActivityScale) -> String {
    match scale {
        ActivityScale::Day => date.format("%Y-%m-%d").to_string(),
        ActivityScale::Month => format!("{:04}-{:02}", date.year(), date.month()),
        ActivityScale::Year => format!("{:04}", date.year()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::NoteColor;
    use chrono::{Offset, TimeZone, Utc};

    fn note_on(y: i32, m: u32, d: u32) -> Note {
        let at = Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap();
        Note {
            id: uuid::Uuid::new_v4(),
            user_id: uuid::Uuid::nil(),
            content: "x".into(),
            color: NoteColor::White,
            is_pinned: false,
            is_archived: false,
            created_at: at,
            updated_at: at,
            tags: Vec::new(),
        }
    }

    #[test]
    fn counts_roll_up_into_month_and_year() {
        let notes = vec![note_on(2024, 5, 1), note_on(2024, 5, 1), note_on(2024, 6, 3)];
        let map = ActivityMap::from_notes(&notes, Utc.fix());
        let may_first = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

        assert_eq!(map.count(may_first, ActivityScale::Day), 2);
        assert_eq!(map.count(may_first, ActivityScale::Month), 2);
        assert_eq!(map.count(may_first, ActivityScale::Year), 3);
        assert_eq!(
            map.count(NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(), ActivityScale::Year),
            0
        );
    }

    #[test]
    fn level_thresholds() {
        assert_eq!(activity_level(0), 0);
        assert_eq!(activity_level(1), 1);
        assert_eq!(activity_level(2), 1);
        assert_eq!(activity_level(3), 2);
        assert_eq!(activity_level(5), 2);
        assert_eq!(activity_level(6), 3);
    }
}
