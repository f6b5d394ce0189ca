//! Flat three-month forecast from a trailing moving average.

use serde::Serialize;

use super::{AggregateResult, InsightOutput, ensure_rows, trend::monthly_revenue};
use crate::{
    data::Month,
    dataset::RawTable,
    mapping::{ColumnMapping, Role},
};

pub const HORIZON: usize = 3;
const WINDOW: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPoint {
    pub month: Month,
    pub revenue: f64,
    pub ma3: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub month: Month,
    pub forecast: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastReport {
    pub history: Vec<HistoryPoint>,
    pub forecast: Vec<ForecastPoint>,
}

pub fn naive_forecast(table: &RawTable, mapping: &ColumnMapping) -> AggregateResult {
    let [date, amount] =
        mapping.require(table, [Role::Date, Role::Amount], "Need date and amount")?;
    ensure_rows(table)?;

    let series = monthly_revenue(table, date, amount);
    let revenues: Vec<f64> = series.iter().map(|point| point.revenue).collect();
    let history: Vec<HistoryPoint> = series
        .iter()
        .enumerate()
        .map(|(i, point)| HistoryPoint {
            month: point.month,
            revenue: point.revenue,
            ma3: (i + 1 >= WINDOW)
                .then(|| revenues[i + 1 - WINDOW..=i].iter().sum::<f64>() / WINDOW as f64),
        })
        .collect();

    let level = match history.last().and_then(|point| point.ma3) {
        Some(ma3) => ma3,
        None if revenues.is_empty() => 0.0,
        None => revenues.iter().sum::<f64>() / revenues.len() as f64,
    };
    let forecast = history
        .last()
        .map(|point| {
            std::iter::successors(Some(point.month.succ()), |month| Some(month.succ()))
                .take(HORIZON)
                .map(|month| ForecastPoint {
                    month,
                    forecast: level,
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(InsightOutput::Forecast(ForecastReport { history, forecast }))
}
