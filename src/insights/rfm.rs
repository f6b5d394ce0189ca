//! Recency / Frequency / Monetary segmentation with tertile scores.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

use super::{AggregateResult, InsightOutput, cell, ensure_rows};
use crate::{
    data::Value,
    dataset::RawTable,
    mapping::{ColumnMapping, Role},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RfmRow {
    #[serde(rename = "CustomerID")]
    pub customer_id: String,
    /// Whole days between the customer's last purchase and the snapshot.
    #[serde(rename = "Recency")]
    pub recency: i64,
    #[serde(rename = "Frequency")]
    pub frequency: usize,
    #[serde(rename = "Monetary")]
    pub monetary: f64,
    #[serde(rename = "RFM_Score")]
    pub score: u16,
}

impl RfmRow {
    pub fn recency_score(&self) -> u16 {
        self.score / 100
    }

    pub fn frequency_score(&self) -> u16 {
        self.score / 10 % 10
    }

    pub fn monetary_score(&self) -> u16 {
        self.score % 10
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RfmReport {
    pub table: Vec<RfmRow>,
}

struct Purchases {
    last: NaiveDateTime,
    frequency: usize,
    monetary: f64,
}

pub fn rfm_segments(table: &RawTable, mapping: &ColumnMapping) -> AggregateResult {
    let [date, customer, amount] = mapping.require(
        table,
        [Role::Date, Role::CustomerId, Role::Amount],
        "Need date, customer_id, amount",
    )?;
    ensure_rows(table)?;

    let mut customers: BTreeMap<&Value, Purchases> = BTreeMap::new();
    for row in table.rows() {
        let Some(customer_id) = cell(row, customer) else {
            continue;
        };
        let Some(moment) = cell(row, date).and_then(Value::to_datetime) else {
            continue;
        };
        let Some(value) = cell(row, amount).and_then(Value::to_number) else {
            continue;
        };
        customers
            .entry(customer_id)
            .and_modify(|p| {
                p.last = p.last.max(moment);
                p.frequency += 1;
                p.monetary += value;
            })
            .or_insert(Purchases {
                last: moment,
                frequency: 1,
                monetary: value,
            });
    }

    let Some(latest) = customers.values().map(|p| p.last).max() else {
        return Ok(InsightOutput::Rfm(RfmReport { table: Vec::new() }));
    };
    let snapshot = latest + Duration::days(1);

    let recency: Vec<i64> = customers
        .values()
        .map(|p| (snapshot - p.last).num_days())
        .collect();
    let frequency: Vec<usize> = customers.values().map(|p| p.frequency).collect();
    let monetary: Vec<f64> = customers.values().map(|p| p.monetary).collect();

    let r_scores = tertiles(&recency, |a, b| a.cmp(b));
    let f_scores = tertiles(&frequency, |a, b| a.cmp(b));
    let m_scores = tertiles(&monetary, |a, b| a.total_cmp(b));

    let table = customers
        .into_iter()
        .enumerate()
        .map(|(i, (customer_id, purchases))| RfmRow {
            customer_id: customer_id.as_display(),
            recency: recency[i],
            frequency: purchases.frequency,
            monetary: purchases.monetary,
            score: (4 - r_scores[i]) * 100 + f_scores[i] * 10 + m_scores[i],
        })
        .collect();
    Ok(InsightOutput::Rfm(RfmReport { table }))
}

/// Bucket 1..=3 per value. Values are ranked ascending with ties broken by
/// position, then the ranks are cut at the interpolated edges
/// `1 + k(n-1)/3` into right-closed bins.
fn tertiles<T, F>(values: &[T], compare: F) -> Vec<u16>
where
    F: Fn(&T, &T) -> std::cmp::Ordering,
{
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| compare(&values[a], &values[b]));

    let span = n.saturating_sub(1) as f64;
    let lower = 1.0 + span / 3.0;
    let upper = 1.0 + 2.0 * span / 3.0;

    let mut buckets = vec![1; n];
    for (position, &index) in order.iter().enumerate() {
        let rank = (position + 1) as f64;
        buckets[index] = if rank <= lower {
            1
        } else if rank <= upper {
            2
        } else {
            3
        };
    }
    buckets
}
