//! Best and worst selling products by revenue.

use std::collections::BTreeMap;

use serde::Serialize;

use super::{AggregateResult, InsightOutput, cell, ensure_rows};
use crate::{
    data::Value,
    dataset::RawTable,
    mapping::{ColumnMapping, Role},
};

pub const PRODUCT_LIMIT: usize = 15;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductRevenue {
    pub product: String,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductReport {
    pub table: Vec<ProductRevenue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ranking {
    Top,
    Bottom,
}

pub fn top_products(table: &RawTable, mapping: &ColumnMapping) -> AggregateResult {
    ranked_products(table, mapping, Ranking::Top)
}

pub fn bottom_products(table: &RawTable, mapping: &ColumnMapping) -> AggregateResult {
    ranked_products(table, mapping, Ranking::Bottom)
}

fn ranked_products(table: &RawTable, mapping: &ColumnMapping, ranking: Ranking) -> AggregateResult {
    let [product, amount] = mapping.require(
        table,
        [Role::Product, Role::Amount],
        "Need product and amount",
    )?;
    ensure_rows(table)?;

    let mut groups = revenue_by(table, product, amount);
    // Stable sort: equal revenue keeps ascending key order.
    match ranking {
        Ranking::Top => groups.sort_by(|a, b| b.1.total_cmp(&a.1)),
        Ranking::Bottom => groups.sort_by(|a, b| a.1.total_cmp(&b.1)),
    }
    let table = groups
        .into_iter()
        .take(PRODUCT_LIMIT)
        .map(|(product, revenue)| ProductRevenue { product, revenue })
        .collect();
    Ok(InsightOutput::Products(ProductReport { table }))
}

/// Summed numeric `amount` per non-null `key`, in ascending key order. Keys
/// whose amounts are all non-numeric sum to zero.
pub(crate) fn revenue_by(table: &RawTable, key: usize, amount: usize) -> Vec<(String, f64)> {
    let mut totals: BTreeMap<&Value, f64> = BTreeMap::new();
    for row in table.rows() {
        let Some(group) = cell(row, key) else {
            continue;
        };
        let value = cell(row, amount).and_then(Value::to_number).unwrap_or(0.0);
        *totals.entry(group).or_insert(0.0) += value;
    }
    totals
        .into_iter()
        .map(|(group, revenue)| (group.as_display(), revenue))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insights::InsightError;

    fn mapping() -> ColumnMapping {
        ColumnMapping {
            product: Some("sku".into()),
            amount: Some("amount".into()),
            ..ColumnMapping::default()
        }
    }

    fn rows_of(result: AggregateResult) -> Vec<(String, f64)> {
        match result.unwrap() {
            InsightOutput::Products(report) => report
                .table
                .into_iter()
                .map(|row| (row.product, row.revenue))
                .collect(),
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[test]
    fn ranks_products_both_ways() {
        let table = RawTable::from_text_rows(
            ["sku", "amount"],
            vec![
                vec!["b", "10"],
                vec!["a", "30"],
                vec!["c", "10"],
                vec!["a", "5"],
                vec!["", "99"],
            ],
        )
        .unwrap();
        let top = rows_of(top_products(&table, &mapping()));
        assert_eq!(
            top,
            vec![
                ("a".to_string(), 35.0),
                ("b".to_string(), 10.0),
                ("c".to_string(), 10.0)
            ]
        );
        let bottom = rows_of(bottom_products(&table, &mapping()));
        assert_eq!(bottom[0], ("b".to_string(), 10.0));
        assert_eq!(bottom[2], ("a".to_string(), 35.0));
    }

    #[test]
    fn truncates_to_limit() {
        let rows: Vec<Vec<String>> = (0..40)
            .map(|i| vec![format!("p{i:02}"), i.to_string()])
            .collect();
        let table = RawTable::from_text_rows(["sku", "amount"], rows).unwrap();
        let top = rows_of(top_products(&table, &mapping()));
        assert_eq!(top.len(), PRODUCT_LIMIT);
        assert_eq!(top[0].0, "p39");
    }

    #[test]
    fn requires_product_and_amount() {
        let table = RawTable::from_text_rows(["sku"], vec![vec!["a"]]).unwrap();
        assert_eq!(
            top_products(&table, &mapping()).unwrap_err(),
            InsightError::MissingFields("Need product and amount")
        );
    }
}
