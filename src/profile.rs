//! Quick dataset profile: shape, inferred column types and missing counts.

use std::fmt;

use serde::Serialize;

use crate::{data::Value, dataset::RawTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnType {
    Empty,
    String,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
}

impl ColumnType {
    pub fn as_str(self) -> &'static str {
        match self {
            ColumnType::Empty => "Empty",
            ColumnType::String => "String",
            ColumnType::Integer => "Integer",
            ColumnType::Float => "Float",
            ColumnType::Boolean => "Boolean",
            ColumnType::Date => "Date",
            ColumnType::DateTime => "DateTime",
        }
    }

    fn of(value: &Value) -> Self {
        match value {
            Value::String(_) => ColumnType::String,
            Value::Integer(_) => ColumnType::Integer,
            Value::Float(_) => ColumnType::Float,
            Value::Boolean(_) => ColumnType::Boolean,
            Value::Date(_) => ColumnType::Date,
            Value::DateTime(_) => ColumnType::DateTime,
        }
    }

    /// Widens two observed types into one that covers both.
    fn merge(self, other: Self) -> Self {
        use ColumnType::*;
        match (self, other) {
            (Empty, other) | (other, Empty) => other,
            (a, b) if a == b => a,
            (Integer, Float) | (Float, Integer) => Float,
            (Date, DateTime) | (DateTime, Date) => DateTime,
            _ => String,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const NO_DATA_MESSAGE: &str = "No data loaded";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnProfile {
    pub name: String,
    pub data_type: ColumnType,
    pub missing: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuickProfile {
    pub rows: usize,
    pub columns: usize,
    pub column_profiles: Vec<ColumnProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

impl QuickProfile {
    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.column_profiles
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.data_type)
    }

    /// Columns holding at least one null cell.
    pub fn missing_values(&self) -> impl Iterator<Item = (&str, usize)> {
        self.column_profiles
            .iter()
            .filter(|c| c.missing > 0)
            .map(|c| (c.name.as_str(), c.missing))
    }
}

pub fn quick_profile(table: &RawTable) -> QuickProfile {
    let column_profiles = table
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let (data_type, missing) =
                table
                    .cells(idx)
                    .fold((ColumnType::Empty, 0usize), |(ty, missing), value| match value {
                        Some(value) => (ty.merge(ColumnType::of(value)), missing),
                        None => (ty, missing + 1),
                    });
            ColumnProfile {
                name: name.clone(),
                data_type,
                missing,
            }
        })
        .collect();
    QuickProfile {
        rows: table.row_count(),
        columns: table.column_count(),
        column_profiles,
        message: table.is_empty().then_some(NO_DATA_MESSAGE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_widened_types_and_missing_counts() {
        let table = RawTable::from_text_rows(
            ["id", "price", "when", "flag", "note", "blank"],
            vec![
                vec!["1", "2", "2024-01-01", "true", "x", ""],
                vec!["2", "2.5", "2024-01-02 10:00:00", "false", "7", "NA"],
                vec!["", "3", "2024-01-03", "", "y", ""],
            ],
        )
        .unwrap();
        let profile = quick_profile(&table);
        assert_eq!(profile.rows, 3);
        assert_eq!(profile.columns, 6);
        assert_eq!(profile.column_type("id"), Some(ColumnType::Integer));
        assert_eq!(profile.column_type("price"), Some(ColumnType::Float));
        assert_eq!(profile.column_type("when"), Some(ColumnType::DateTime));
        assert_eq!(profile.column_type("flag"), Some(ColumnType::Boolean));
        assert_eq!(profile.column_type("note"), Some(ColumnType::String));
        assert_eq!(profile.column_type("blank"), Some(ColumnType::Empty));
        let missing: Vec<_> = profile.missing_values().collect();
        assert_eq!(missing, vec![("id", 1), ("flag", 1), ("blank", 3)]);
        assert!(profile.message.is_none());
    }

    #[test]
    fn empty_table_reports_no_data() {
        let table = RawTable::new(vec!["a".into(), "b".into()]);
        let profile = quick_profile(&table);
        assert_eq!(profile.rows, 0);
        assert_eq!(profile.columns, 2);
        assert_eq!(profile.message, Some(NO_DATA_MESSAGE));
    }
}
