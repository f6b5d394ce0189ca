//! Monthly revenue trend.

use std::collections::BTreeMap;

use serde::Serialize;

use super::{AggregateResult, InsightOutput, cell, ensure_rows};
use crate::{
    data::{Month, Value},
    dataset::RawTable,
    mapping::{ColumnMapping, Role},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyRevenue {
    pub month: Month,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendReport {
    pub table: Vec<MonthlyRevenue>,
}

pub fn monthly_revenue_trend(table: &RawTable, mapping: &ColumnMapping) -> AggregateResult {
    let [date, amount] =
        mapping.require(table, [Role::Date, Role::Amount], "Need date and amount")?;
    ensure_rows(table)?;
    Ok(InsightOutput::Trend(TrendReport {
        table: monthly_revenue(table, date, amount),
    }))
}

/// Revenue per calendar month from the first to the last observed month.
/// Rows without a parseable date or a numeric amount are dropped; months in
/// between with no rows carry zero revenue.
pub(crate) fn monthly_revenue(table: &RawTable, date: usize, amount: usize) -> Vec<MonthlyRevenue> {
    let mut totals: BTreeMap<Month, f64> = BTreeMap::new();
    for row in table.rows() {
        let Some(moment) = cell(row, date).and_then(Value::to_datetime) else {
            continue;
        };
        let Some(value) = cell(row, amount).and_then(Value::to_number) else {
            continue;
        };
        *totals.entry(Month::of(&moment)).or_insert(0.0) += value;
    }

    let (Some(&first), Some(&last)) = (totals.keys().next(), totals.keys().next_back()) else {
        return Vec::new();
    };
    first
        .through(last)
        .map(|month| MonthlyRevenue {
            month,
            revenue: totals.get(&month).copied().unwrap_or(0.0),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insights::InsightError;

    fn mapping() -> ColumnMapping {
        ColumnMapping {
            date: Some("when".into()),
            amount: Some("amount".into()),
            ..ColumnMapping::default()
        }
    }

    fn trend_of(table: &RawTable) -> Vec<MonthlyRevenue> {
        match monthly_revenue_trend(table, &mapping()).unwrap() {
            InsightOutput::Trend(report) => report.table,
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[test]
    fn groups_by_month_in_order() {
        let table = RawTable::from_text_rows(
            ["when", "amount"],
            vec![
                vec!["2024-03-15", "30"],
                vec!["2024-01-02", "10"],
                vec!["2024-01-28 09:30:00", "5"],
                vec!["not a date", "1000"],
                vec!["2024-03-01", "n/a"],
            ],
        )
        .unwrap();
        let trend = trend_of(&table);
        let months: Vec<String> = trend.iter().map(|p| p.month.to_string()).collect();
        assert_eq!(months, vec!["2024-01", "2024-02", "2024-03"]);
        assert_eq!(trend[0].revenue, 15.0);
        assert_eq!(trend[1].revenue, 0.0);
        assert_eq!(trend[2].revenue, 30.0);
    }

    #[test]
    fn us_style_dates_land_in_their_month() {
        let table = RawTable::from_text_rows(
            ["when", "amount"],
            vec![vec!["01/02/2024", "10"], vec!["01/03/2024", "5"]],
        )
        .unwrap();
        let trend = trend_of(&table);
        assert_eq!(trend.len(), 1);
        assert_eq!(trend[0].month.to_string(), "2024-01");
        assert_eq!(trend[0].revenue, 15.0);
    }

    #[test]
    fn unparseable_dates_give_empty_table() {
        let table =
            RawTable::from_text_rows(["when", "amount"], vec![vec!["soon", "1"]]).unwrap();
        assert!(trend_of(&table).is_empty());
    }

    #[test]
    fn requires_date_and_amount() {
        let table = RawTable::from_text_rows(["amount"], vec![vec!["1"]]).unwrap();
        assert_eq!(
            monthly_revenue_trend(&table, &mapping()).unwrap_err(),
            InsightError::MissingFields("Need date and amount")
        );
    }

    #[test]
    fn empty_table_is_an_error() {
        let table = RawTable::new(vec!["when".into(), "amount".into()]);
        assert_eq!(
            monthly_revenue_trend(&table, &mapping()).unwrap_err(),
            InsightError::EmptyTable
        );
    }
}
