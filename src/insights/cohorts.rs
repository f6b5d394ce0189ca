//! Monthly retention cohorts keyed by first purchase month.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Serialize, Serializer, ser::SerializeMap};

use super::{AggregateResult, InsightOutput, cell, ensure_rows};
use crate::{
    data::{Month, Value},
    dataset::RawTable,
    mapping::{ColumnMapping, Role},
};

/// One cohort's retention curve. `retention[k]` is the share of the cohort's
/// customers active `k` months after their first purchase.
#[derive(Debug, Clone, PartialEq)]
pub struct CohortRow {
    pub cohort: Month,
    pub retention: Vec<f64>,
}

impl Serialize for CohortRow {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.retention.len() + 1))?;
        map.serialize_entry("cohort", &self.cohort)?;
        for (offset, share) in self.retention.iter().enumerate() {
            map.serialize_entry(&offset.to_string(), share)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortReport {
    pub retention: Vec<CohortRow>,
}

pub fn monthly_retention_cohort(table: &RawTable, mapping: &ColumnMapping) -> AggregateResult {
    let [date, customer] = mapping.require(
        table,
        [Role::Date, Role::CustomerId],
        "Need date and customer_id",
    )?;
    ensure_rows(table)?;

    let activity: Vec<(&Value, Month)> = table
        .rows()
        .iter()
        .filter_map(|row| {
            let customer_id = cell(row, customer)?;
            let moment = cell(row, date).and_then(Value::to_datetime)?;
            Some((customer_id, Month::of(&moment)))
        })
        .collect();

    let mut first_month: BTreeMap<&Value, Month> = BTreeMap::new();
    for &(customer_id, month) in &activity {
        first_month
            .entry(customer_id)
            .and_modify(|first| *first = (*first).min(month))
            .or_insert(month);
    }

    let mut active: BTreeMap<Month, BTreeMap<usize, BTreeSet<&Value>>> = BTreeMap::new();
    let mut width = 0usize;
    for &(customer_id, month) in &activity {
        let Some(&cohort) = first_month.get(customer_id) else {
            continue;
        };
        let Ok(offset) = usize::try_from(month.months_since(cohort)) else {
            continue;
        };
        width = width.max(offset + 1);
        active
            .entry(cohort)
            .or_default()
            .entry(offset)
            .or_default()
            .insert(customer_id);
    }

    let retention = active
        .into_iter()
        .map(|(cohort, offsets)| {
            let size = offsets.get(&0).map_or(0, BTreeSet::len);
            let retention = (0..width)
                .map(|offset| match offsets.get(&offset) {
                    Some(customers) if size > 0 => customers.len() as f64 / size as f64,
                    _ => 0.0,
                })
                .collect();
            CohortRow { cohort, retention }
        })
        .collect();
    Ok(InsightOutput::Cohorts(CohortReport { retention }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insights::InsightError;

    fn mapping() -> ColumnMapping {
        ColumnMapping {
            date: Some("date".into()),
            customer_id: Some("customer".into()),
            ..ColumnMapping::default()
        }
    }

    fn cohorts_of(table: &RawTable) -> Vec<CohortRow> {
        match monthly_retention_cohort(table, &mapping()).unwrap() {
            InsightOutput::Cohorts(report) => report.retention,
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[test]
    fn builds_retention_matrix() {
        let table = RawTable::from_text_rows(
            ["date", "customer"],
            vec![
                vec!["2024-01-05", "a"],
                vec!["2024-01-09", "b"],
                vec!["2024-02-14", "a"],
                vec!["2024-03-01", "b"],
                vec!["2024-03-20", "b"],
                vec!["2024-02-02", "c"],
                vec!["bad", "d"],
                vec!["2024-02-02", ""],
            ],
        )
        .unwrap();
        let rows = cohorts_of(&table);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].cohort.to_string(), "2024-01");
        assert_eq!(rows[0].retention, vec![1.0, 0.5, 0.5]);
        assert_eq!(rows[1].cohort.to_string(), "2024-02");
        assert_eq!(rows[1].retention, vec![1.0, 0.0, 0.0]);
        for row in &rows {
            assert_eq!(row.retention[0], 1.0);
        }
    }

    #[test]
    fn serializes_offsets_as_keys() {
        let row = CohortRow {
            cohort: Month::new(2024, 1).unwrap(),
            retention: vec![1.0, 0.25],
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["cohort"], "2024-01");
        assert_eq!(json["0"], 1.0);
        assert_eq!(json["1"], 0.25);
    }

    #[test]
    fn requires_date_and_customer() {
        let table = RawTable::from_text_rows(["date"], vec![vec!["2024-01-01"]]).unwrap();
        assert_eq!(
            monthly_retention_cohort(&table, &mapping()).unwrap_err(),
            InsightError::MissingFields("Need date and customer_id")
        );
    }
}
