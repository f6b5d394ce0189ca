//! Headline KPIs. Degrades field by field instead of failing.

use std::collections::BTreeMap;

use serde::Serialize;

use super::{AggregateResult, InsightOutput, cell, count_distinct, sum_numeric};
use crate::{
    dataset::RawTable,
    mapping::{ColumnMapping, Role},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpis {
    pub total_sales: Option<f64>,
    pub num_orders: usize,
    pub num_customers: Option<usize>,
    pub avg_order_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiReport {
    pub kpis: Kpis,
}

pub fn compute_kpis(table: &RawTable, mapping: &ColumnMapping) -> AggregateResult {
    let amount = mapping.resolve(table, Role::Amount);
    let order = mapping.resolve(table, Role::OrderId);
    let customer = mapping.resolve(table, Role::CustomerId);

    let total_sales = amount
        .filter(|_| !table.is_empty())
        .map(|idx| sum_numeric(table.cells(idx)));
    let num_orders = match order {
        Some(idx) => count_distinct(table.cells(idx)),
        None => table.row_count(),
    };
    let num_customers = customer.map(|idx| count_distinct(table.cells(idx)));
    let avg_order_value = match (amount, order) {
        (Some(amount), Some(order)) => mean_order_value(table, amount, order),
        _ => None,
    };

    Ok(InsightOutput::Kpis(KpiReport {
        kpis: Kpis {
            total_sales,
            num_orders,
            num_customers,
            avg_order_value,
        },
    }))
}

fn mean_order_value(table: &RawTable, amount: usize, order: usize) -> Option<f64> {
    let mut per_order = BTreeMap::new();
    for row in table.rows() {
        let Some(order_id) = cell(row, order) else {
            continue;
        };
        let value = cell(row, amount).and_then(|v| v.to_number()).unwrap_or(0.0);
        *per_order.entry(order_id).or_insert(0.0) += value;
    }
    if per_order.is_empty() {
        return None;
    }
    Some(per_order.values().sum::<f64>() / per_order.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kpis_of(table: &RawTable, mapping: &ColumnMapping) -> Kpis {
        match compute_kpis(table, mapping).unwrap() {
            InsightOutput::Kpis(report) => report.kpis,
            other => panic!("unexpected output {other:?}"),
        }
    }

    fn sample() -> RawTable {
        RawTable::from_text_rows(
            ["order", "customer", "amount"],
            vec![
                vec!["o1", "alice", "10"],
                vec!["o1", "alice", "15"],
                vec!["o2", "bob", "25"],
                vec!["o3", "alice", "oops"],
                vec!["", "carol", "5"],
            ],
        )
        .unwrap()
    }

    #[test]
    fn total_sales_is_null_without_amount() {
        let kpis = kpis_of(&sample(), &ColumnMapping::default());
        assert_eq!(kpis.total_sales, None);
        assert_eq!(kpis.num_orders, 5);
        assert_eq!(kpis.num_customers, None);
        assert_eq!(kpis.avg_order_value, None);
    }

    #[test]
    fn computes_all_fields_when_mapped() {
        let mapping = ColumnMapping {
            order_id: Some("order".into()),
            customer_id: Some("customer".into()),
            amount: Some("amount".into()),
            ..ColumnMapping::default()
        };
        let kpis = kpis_of(&sample(), &mapping);
        assert_eq!(kpis.total_sales, Some(55.0));
        assert_eq!(kpis.num_orders, 3);
        assert_eq!(kpis.num_customers, Some(3));
        // o1 = 25, o2 = 25, o3 = 0
        let aov = kpis.avg_order_value.unwrap();
        assert!((aov - 50.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn uniform_orders_average_equals_total_over_orders() {
        let table = RawTable::from_text_rows(
            ["order", "amount"],
            vec![vec!["a", "20"], vec!["b", "20"], vec!["c", "20"]],
        )
        .unwrap();
        let mapping = ColumnMapping {
            order_id: Some("order".into()),
            amount: Some("amount".into()),
            ..ColumnMapping::default()
        };
        let kpis = kpis_of(&table, &mapping);
        let expected = kpis.total_sales.unwrap() / kpis.num_orders as f64;
        assert!((kpis.avg_order_value.unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn empty_table_yields_null_total() {
        let table = RawTable::new(vec!["amount".into()]);
        let mapping = ColumnMapping {
            amount: Some("amount".into()),
            ..ColumnMapping::default()
        };
        let kpis = kpis_of(&table, &mapping);
        assert_eq!(kpis.total_sales, None);
        assert_eq!(kpis.num_orders, 0);
    }
}
