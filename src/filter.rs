//! Global row filters: date range, categorical selections and generic
//! `column op value` conditions.

use std::{cmp::Ordering, fmt};

use anyhow::{Result, anyhow, bail};
use chrono::NaiveDate;
use log::debug;
use serde::Serialize;

use crate::{
    data::{Value, infer_value},
    dataset::RawTable,
    mapping::{ColumnMapping, Role},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ComparisonOperator {
    Eq,
    NotEq,
    Gt,
    Ge,
    Lt,
    Le,
    Contains,
    StartsWith,
    EndsWith,
}

impl ComparisonOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            ComparisonOperator::Eq => "=",
            ComparisonOperator::NotEq => "!=",
            ComparisonOperator::Gt => ">",
            ComparisonOperator::Ge => ">=",
            ComparisonOperator::Lt => "<",
            ComparisonOperator::Le => "<=",
            ComparisonOperator::Contains => "contains",
            ComparisonOperator::StartsWith => "startswith",
            ComparisonOperator::EndsWith => "endswith",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FilterCondition {
    pub column: String,
    pub operator: ComparisonOperator,
    pub raw_value: String,
}

impl fmt::Display for FilterCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.column, self.operator.symbol(), self.raw_value)
    }
}

pub fn parse_filters(filters: &[String]) -> Result<Vec<FilterCondition>> {
    filters.iter().map(|f| parse_filter(f)).collect()
}

pub fn parse_filter(filter: &str) -> Result<FilterCondition> {
    let trimmed = filter.trim();
    if trimmed.is_empty() {
        bail!("Empty filter expression");
    }

    let lowered = trimmed.to_ascii_lowercase();
    for (needle, op) in [
        (" contains ", ComparisonOperator::Contains),
        (" startswith ", ComparisonOperator::StartsWith),
        (" endswith ", ComparisonOperator::EndsWith),
    ] {
        if let Some(idx) = lowered.find(needle) {
            return condition(&trimmed[..idx], op, &trimmed[idx + needle.len()..]);
        }
    }

    for (needle, op) in [
        ("!=", ComparisonOperator::NotEq),
        (">=", ComparisonOperator::Ge),
        ("<=", ComparisonOperator::Le),
        ("=", ComparisonOperator::Eq),
        (">", ComparisonOperator::Gt),
        ("<", ComparisonOperator::Lt),
    ] {
        if let Some(idx) = trimmed.find(needle) {
            return condition(&trimmed[..idx], op, &trimmed[idx + needle.len()..]);
        }
    }

    Err(anyhow!("Failed to parse filter expression '{trimmed}'"))
}

fn condition(left: &str, operator: ComparisonOperator, right: &str) -> Result<FilterCondition> {
    let column = left.trim();
    if column.is_empty() {
        bail!("Filter expression is missing a column name");
    }
    Ok(FilterCondition {
        column: column.to_string(),
        operator,
        raw_value: unquote(right.trim()).to_string(),
    })
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2
            && let Some(inner) = value
                .strip_prefix(quote)
                .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

/// Filters selected for one analysis run. Empty selections are no-ops.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FilterSet {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub products: Vec<String>,
    pub channels: Vec<String>,
    pub customers: Vec<String>,
    pub conditions: Vec<FilterCondition>,
}

/// What a [`FilterSet`] actually constrained on a given table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct ActiveFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_range: Option<(Option<NaiveDate>, Option<NaiveDate>)>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub products: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub customers: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<String>,
}

impl ActiveFilters {
    pub fn is_empty(&self) -> bool {
        self.date_range.is_none()
            && self.products.is_empty()
            && self.channels.is_empty()
            && self.customers.is_empty()
            && self.conditions.is_empty()
    }

    /// One human-readable line per active filter.
    pub fn describe(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some((from, to)) = &self.date_range {
            let bound =
                |d: &Option<NaiveDate>| d.map_or_else(|| "…".to_string(), |d| d.to_string());
            lines.push(format!("Date range: {} to {}", bound(from), bound(to)));
        }
        for (label, values) in [
            ("Products", &self.products),
            ("Channels", &self.channels),
            ("Customers", &self.customers),
        ] {
            if !values.is_empty() {
                lines.push(format!("{label}: {}", values.join(", ")));
            }
        }
        lines.extend(self.conditions.iter().map(|c| format!("Where: {c}")));
        lines
    }
}

struct Selection<'a> {
    index: usize,
    values: &'a [String],
}

enum Operand {
    Number(f64),
    Moment(chrono::NaiveDateTime),
    Text(String),
}

struct ResolvedCondition<'a> {
    index: usize,
    condition: &'a FilterCondition,
    operand: Option<Value>,
}

impl FilterSet {
    pub fn is_empty(&self) -> bool {
        self.date_from.is_none()
            && self.date_to.is_none()
            && self.products.is_empty()
            && self.channels.is_empty()
            && self.customers.is_empty()
            && self.conditions.is_empty()
    }

    /// Returns the rows that pass every applicable filter together with a
    /// description of the filters that were applied.
    pub fn apply(
        &self,
        table: &RawTable,
        mapping: &ColumnMapping,
    ) -> Result<(RawTable, ActiveFilters)> {
        let mut active = ActiveFilters::default();

        let date_index = if self.date_from.is_some() || self.date_to.is_some() {
            match mapping.resolve(table, Role::Date) {
                Some(index) => {
                    active.date_range = Some((self.date_from, self.date_to));
                    Some(index)
                }
                None => {
                    debug!("Ignoring date range filter: no date column mapped");
                    None
                }
            }
        } else {
            None
        };

        let mut selections = Vec::new();
        for (role, values, slot) in [
            (Role::Product, &self.products, &mut active.products),
            (Role::Channel, &self.channels, &mut active.channels),
            (Role::CustomerId, &self.customers, &mut active.customers),
        ] {
            if values.is_empty() {
                continue;
            }
            match mapping.resolve(table, role) {
                Some(index) => {
                    slot.clone_from(values);
                    selections.push(Selection { index, values });
                }
                None => debug!("Ignoring {role} filter: no {role} column mapped"),
            }
        }

        let conditions = self
            .conditions
            .iter()
            .map(|condition| {
                let index = table.column_index(&condition.column).ok_or_else(|| {
                    anyhow!("Column '{}' not found for filter", condition.column)
                })?;
                Ok(ResolvedCondition {
                    index,
                    condition,
                    operand: infer_value(&condition.raw_value),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        active.conditions = self.conditions.iter().map(ToString::to_string).collect();

        let filtered = table.retain_rows(|row| {
            if let Some(index) = date_index {
                let Some(date) = row[index].as_ref().and_then(Value::to_datetime).map(|m| m.date())
                else {
                    return false;
                };
                if self.date_from.is_some_and(|from| date < from)
                    || self.date_to.is_some_and(|to| date > to)
                {
                    return false;
                }
            }
            let selected = selections.iter().all(|selection| {
                row[selection.index]
                    .as_ref()
                    .is_some_and(|value| selection.values.contains(&value.as_display()))
            });
            selected
                && conditions
                    .iter()
                    .all(|resolved| evaluate_condition(resolved, row[resolved.index].as_ref()))
        });
        debug!(
            "Filters kept {} of {} row(s)",
            filtered.row_count(),
            table.row_count()
        );
        Ok((filtered, active))
    }
}

fn operand(value: &Value) -> Operand {
    if let Some(number) = value.to_number()
        && matches!(value, Value::Integer(_) | Value::Float(_))
    {
        return Operand::Number(number);
    }
    match value.to_datetime() {
        Some(moment) if matches!(value, Value::Date(_) | Value::DateTime(_)) => {
            Operand::Moment(moment)
        }
        _ => Operand::Text(value.as_display()),
    }
}

fn compare(left: &Value, right: &Value) -> Ordering {
    match (operand(left), operand(right)) {
        (Operand::Number(a), Operand::Number(b)) => a.total_cmp(&b),
        (Operand::Moment(a), Operand::Moment(b)) => a.cmp(&b),
        _ => left.as_display().cmp(&right.as_display()),
    }
}

fn evaluate_condition(resolved: &ResolvedCondition<'_>, cell: Option<&Value>) -> bool {
    use ComparisonOperator::*;
    let condition = resolved.condition;
    match condition.operator {
        Contains | StartsWith | EndsWith => {
            let haystack = cell.map(Value::as_display).unwrap_or_default();
            let needle = condition.raw_value.as_str();
            match condition.operator {
                Contains => haystack.contains(needle),
                StartsWith => haystack.starts_with(needle),
                _ => haystack.ends_with(needle),
            }
        }
        Eq | NotEq | Gt | Ge | Lt | Le => match (cell, resolved.operand.as_ref()) {
            (Some(left), Some(right)) => {
                let ordering = compare(left, right);
                match condition.operator {
                    Eq => ordering == Ordering::Equal,
                    NotEq => ordering != Ordering::Equal,
                    Gt => ordering == Ordering::Greater,
                    Ge => ordering != Ordering::Less,
                    Lt => ordering == Ordering::Less,
                    _ => ordering != Ordering::Greater,
                }
            }
            (None, None) => matches!(condition.operator, Eq | Ge | Le),
            _ => matches!(condition.operator, NotEq),
        },
    }
}
