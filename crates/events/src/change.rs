//! Row-level change events delivered by the realtime stream.

use std::fmt;

use chrono::Utc;
use keepmd_core::types::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// Backend tables a client can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Notes,
    Tags,
    NoteTags,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Table::Notes => "notes",
            Table::Tags => "tags",
            Table::NoteTags => "note_tags",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "notes" => Some(Table::Notes),
            "tags" => Some(Table::Tags),
            "note_tags" => Some(Table::NoteTags),
            _ => None,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RowChange / ChangeEvent
// ---------------------------------------------------------------------------

/// Kind of row change, as named on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A single row change.
///
/// Inserts and updates carry the new row; deletes carry the old row,
/// which may hold only the primary key columns.
#[derive(Debug, Clone, PartialEq)]
pub enum RowChange {
    Insert { new: Value },
    Update { new: Value },
    Delete { old: Value },
}

impl RowChange {
    pub fn kind(&self) -> ChangeKind {
        match self {
            RowChange::Insert { .. } => ChangeKind::Insert,
            RowChange::Update { .. } => ChangeKind::Update,
            RowChange::Delete { .. } => ChangeKind::Delete,
        }
    }

    /// The row the change is about: new for insert/update, old for delete.
    pub fn row(&self) -> &Value {
        match self {
            RowChange::Insert { new } | RowChange::Update { new } => new,
            RowChange::Delete { old } => old,
        }
    }
}

/// A change to one row of one table.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub table: Table,
    pub change: RowChange,
    pub commit_timestamp: Timestamp,
}

impl ChangeEvent {
    /// Create an event stamped with the current time.
    pub fn new(table: Table, change: RowChange) -> Self {
        Self {
            table,
            change,
            commit_timestamp: Utc::now(),
        }
    }

    pub fn insert(table: Table, new: Value) -> Self {
        Self::new(table, RowChange::Insert { new })
    }

    pub fn update(table: Table, new: Value) -> Self {
        Self::new(table, RowChange::Update { new })
    }

    pub fn delete(table: Table, old: Value) -> Self {
        Self::new(table, RowChange::Delete { old })
    }
}

// ---------------------------------------------------------------------------
// Filters and bindings
// ---------------------------------------------------------------------------

/// Equality predicate on a single column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    pub column: String,
    pub value: String,
}

impl ChangeFilter {
    pub fn eq(column: impl Into<String>, value: impl fmt::Display) -> Self {
        Self {
            column: column.into(),
            value: value.to_string(),
        }
    }

    /// Whether `row` has `column` equal to the filter value.
    ///
    /// String columns compare verbatim; other JSON values compare by
    /// their JSON text (`true`, `42`).
    pub fn matches(&self, row: &Value) -> bool {
        match row.get(&self.column) {
            Some(Value::String(s)) => *s == self.value,
            Some(Value::Null) | None => false,
            Some(other) => other.to_string() == self.value,
        }
    }
}

impl fmt::Display for ChangeFilter {
    /// Wire form, e.g. `user_id=eq.42`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=eq.{}", self.column, self.value)
    }
}

/// One table (optionally filtered) a subscription listens to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeBinding {
    pub table: Table,
    pub filter: Option<ChangeFilter>,
}

impl ChangeBinding {
    /// Every change on `table`.
    pub fn table(table: Table) -> Self {
        Self {
            table,
            filter: None,
        }
    }

    /// Changes on `table` whose row satisfies `filter`.
    pub fn filtered(table: Table, filter: ChangeFilter) -> Self {
        Self {
            table,
            filter: Some(filter),
        }
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        event.table == self.table
            && self
                .filter
                .as_ref()
                .map_or(true, |f| f.matches(event.change.row()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_renders_wire_form() {
        let filter = ChangeFilter::eq("user_id", "abc");
        assert_eq!(filter.to_string(), "user_id=eq.abc");
    }

    #[test]
    fn filter_matches_strings_and_scalars() {
        let row = json!({ "user_id": "abc", "is_pinned": true, "n": 3 });
        assert!(ChangeFilter::eq("user_id", "abc").matches(&row));
        assert!(!ChangeFilter::eq("user_id", "xyz").matches(&row));
        assert!(ChangeFilter::eq("is_pinned", true).matches(&row));
        assert!(ChangeFilter::eq("n", 3).matches(&row));
        assert!(!ChangeFilter::eq("missing", "x").matches(&row));
    }

    #[test]
    fn binding_checks_table_and_filter() {
        let binding =
            ChangeBinding::filtered(Table::Notes, ChangeFilter::eq("user_id", "u1"));
        let mine = ChangeEvent::insert(Table::Notes, json!({ "user_id": "u1" }));
        let theirs = ChangeEvent::insert(Table::Notes, json!({ "user_id": "u2" }));
        let other_table = ChangeEvent::insert(Table::Tags, json!({ "user_id": "u1" }));

        assert!(binding.matches(&mine));
        assert!(!binding.matches(&theirs));
        assert!(!binding.matches(&other_table));
        assert!(ChangeBinding::table(Table::Tags).matches(&other_table));
    }

    #[test]
    fn delete_filters_on_old_row() {
        let binding =
            ChangeBinding::filtered(Table::Notes, ChangeFilter::eq("user_id", "u1"));
        let event = ChangeEvent::delete(Table::Notes, json!({ "id": "n1", "user_id": "u1" }));
        assert_eq!(event.change.kind(), ChangeKind::Delete);
        assert!(binding.matches(&event));
    }

    #[test]
    fn table_names_round_trip() {
        for table in [Table::Notes, Table::Tags, Table::NoteTags] {
            assert_eq!(Table::parse(table.as_str()), Some(table));
        }
        assert_eq!(Table::parse("users"), None);
    }
}
