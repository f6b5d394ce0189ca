//! Repeat-purchase rate.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::{AggregateResult, InsightOutput, cell};
use crate::{
    data::Value,
    dataset::RawTable,
    mapping::{ColumnMapping, Role},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerOrders {
    pub customer_id: String,
    pub num_orders: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepeatRateReport {
    pub repeat_rate: f64,
    pub table: Vec<CustomerOrders>,
}

/// Share of customers with more than one order. Orders are distinct order ids
/// when `order_id` is mapped, rows otherwise.
pub fn repeat_rate(table: &RawTable, mapping: &ColumnMapping) -> AggregateResult {
    let [customer] = mapping.require(table, [Role::CustomerId], "Need customer_id")?;
    let order = mapping.resolve(table, Role::OrderId);

    let mut orders: BTreeMap<&Value, BTreeSet<&Value>> = BTreeMap::new();
    let mut rows: BTreeMap<&Value, usize> = BTreeMap::new();
    for row in table.rows() {
        let Some(customer_id) = cell(row, customer) else {
            continue;
        };
        *rows.entry(customer_id).or_insert(0) += 1;
        let ids = orders.entry(customer_id).or_default();
        if let Some(order_id) = order.and_then(|idx| cell(row, idx)) {
            ids.insert(order_id);
        }
    }

    let table: Vec<CustomerOrders> = rows
        .into_iter()
        .map(|(customer_id, row_count)| {
            let num_orders = match order {
                Some(_) => orders.get(customer_id).map_or(0, BTreeSet::len),
                None => row_count,
            };
            CustomerOrders {
                customer_id: customer_id.as_display(),
                num_orders,
            }
        })
        .collect();

    let repeaters = table.iter().filter(|c| c.num_orders > 1).count();
    let repeat_rate = if table.is_empty() {
        0.0
    } else {
        repeaters as f64 / table.len() as f64
    };
    Ok(InsightOutput::RepeatRate(RepeatRateReport { repeat_rate, table }))
}
