//! Insight aggregation engine.
//!
//! Each aggregator is a pure function of a [`RawTable`] and a
//! [`ColumnMapping`]. The [`InsightRegistry`] runs the fixed set of eight in
//! order and isolates their failures, so an [`InsightBundle`] always carries a
//! slot for every aggregator name even when individual slots hold an error.

use std::{
    cell::Cell,
    collections::BTreeSet,
    panic::{self, AssertUnwindSafe},
    sync::OnceLock,
};

use clap::ValueEnum;
use log::{debug, warn};
use serde::{Serialize, Serializer, ser::SerializeMap};
use thiserror::Error;

use crate::{data::Value, dataset::RawTable, mapping::ColumnMapping};

pub mod cohorts;
pub mod customers;
pub mod forecast;
pub mod kpis;
pub mod products;
pub mod rfm;
pub mod trend;

pub use cohorts::{CohortReport, CohortRow};
pub use customers::{CustomerOrders, RepeatRateReport};
pub use forecast::{ForecastPoint, ForecastReport, HistoryPoint};
pub use kpis::{KpiReport, Kpis};
pub use products::{ProductReport, ProductRevenue};
pub use rfm::{RfmReport, RfmRow};
pub use trend::{MonthlyRevenue, TrendReport};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InsightError {
    /// A required role is unmapped or its column is absent.
    #[error("{0}")]
    MissingFields(&'static str),
    #[error("No rows to aggregate")]
    EmptyTable,
    #[error("{0}")]
    Failed(String),
}

/// The result shapes produced by the aggregators. Serializes to the nested
/// key layout downstream consumers read (`kpis`, `table`, `retention`,
/// `history`/`forecast`, `repeat_rate`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InsightOutput {
    Kpis(KpiReport),
    Trend(TrendReport),
    Products(ProductReport),
    RepeatRate(RepeatRateReport),
    Cohorts(CohortReport),
    Rfm(RfmReport),
    Forecast(ForecastReport),
}

impl InsightOutput {
    /// Headline line printed above the table, if the output has one.
    pub fn summary(&self) -> Option<String> {
        match self {
            InsightOutput::RepeatRate(report) => {
                Some(format!("repeat_rate: {:.1}%", report.repeat_rate * 100.0))
            }
            _ => None,
        }
    }

    /// Flattens the output into display headers and rows.
    pub fn tabulate(&self) -> (Vec<String>, Vec<Vec<String>>) {
        let headers = |names: &[&str]| names.iter().map(|n| n.to_string()).collect::<Vec<_>>();
        match self {
            InsightOutput::Kpis(report) => {
                let k = &report.kpis;
                let optional = |value: Option<String>| value.unwrap_or_else(|| "n/a".to_string());
                (
                    headers(&["kpi", "value"]),
                    vec![
                        vec![
                            "total_sales".into(),
                            optional(k.total_sales.map(format_number)),
                        ],
                        vec!["num_orders".into(), k.num_orders.to_string()],
                        vec![
                            "num_customers".into(),
                            optional(k.num_customers.map(|n| n.to_string())),
                        ],
                        vec![
                            "avg_order_value".into(),
                            optional(k.avg_order_value.map(format_number)),
                        ],
                    ],
                )
            }
            InsightOutput::Trend(report) => (
                headers(&["month", "revenue"]),
                report
                    .table
                    .iter()
                    .map(|p| vec![p.month.to_string(), format_number(p.revenue)])
                    .collect(),
            ),
            InsightOutput::Products(report) => (
                headers(&["product", "revenue"]),
                report
                    .table
                    .iter()
                    .map(|p| vec![p.product.clone(), format_number(p.revenue)])
                    .collect(),
            ),
            InsightOutput::RepeatRate(report) => (
                headers(&["customer_id", "num_orders"]),
                report
                    .table
                    .iter()
                    .map(|c| vec![c.customer_id.clone(), c.num_orders.to_string()])
                    .collect(),
            ),
            InsightOutput::Cohorts(report) => {
                let width = report.retention.first().map_or(0, |row| row.retention.len());
                let mut names = vec!["cohort".to_string()];
                names.extend((0..width).map(|offset| offset.to_string()));
                let rows = report
                    .retention
                    .iter()
                    .map(|row| {
                        std::iter::once(row.cohort.to_string())
                            .chain(row.retention.iter().map(|share| format!("{share:.2}")))
                            .collect()
                    })
                    .collect();
                (names, rows)
            }
            InsightOutput::Rfm(report) => (
                headers(&["CustomerID", "Recency", "Frequency", "Monetary", "RFM_Score"]),
                report
                    .table
                    .iter()
                    .map(|r| {
                        vec![
                            r.customer_id.clone(),
                            r.recency.to_string(),
                            r.frequency.to_string(),
                            format_number(r.monetary),
                            r.score.to_string(),
                        ]
                    })
                    .collect(),
            ),
            InsightOutput::Forecast(report) => (
                headers(&["month", "revenue", "ma3", "forecast"]),
                report
                    .history
                    .iter()
                    .map(|p| {
                        vec![
                            p.month.to_string(),
                            format_number(p.revenue),
                            p.ma3.map(format_number).unwrap_or_default(),
                            String::new(),
                        ]
                    })
                    .chain(report.forecast.iter().map(|p| {
                        vec![
                            p.month.to_string(),
                            String::new(),
                            String::new(),
                            format_number(p.forecast),
                        ]
                    }))
                    .collect(),
            ),
        }
    }
}

/// Whole numbers print without decimals; everything else with two.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

pub type AggregateResult = Result<InsightOutput, InsightError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum Aggregator {
    Kpis,
    Trend,
    TopProducts,
    BottomProducts,
    RepeatRate,
    Cohorts,
    Rfm,
    Forecast,
}

impl Aggregator {
    pub const ALL: [Aggregator; 8] = [
        Aggregator::Kpis,
        Aggregator::Trend,
        Aggregator::TopProducts,
        Aggregator::BottomProducts,
        Aggregator::RepeatRate,
        Aggregator::Cohorts,
        Aggregator::Rfm,
        Aggregator::Forecast,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Aggregator::Kpis => "kpis",
            Aggregator::Trend => "trend",
            Aggregator::TopProducts => "top_products",
            Aggregator::BottomProducts => "bottom_products",
            Aggregator::RepeatRate => "repeat_rate",
            Aggregator::Cohorts => "cohorts",
            Aggregator::Rfm => "rfm",
            Aggregator::Forecast => "forecast",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|agg| agg.name() == name)
    }

    pub fn compute(self, table: &RawTable, mapping: &ColumnMapping) -> AggregateResult {
        match self {
            Aggregator::Kpis => kpis::compute_kpis(table, mapping),
            Aggregator::Trend => trend::monthly_revenue_trend(table, mapping),
            Aggregator::TopProducts => products::top_products(table, mapping),
            Aggregator::BottomProducts => products::bottom_products(table, mapping),
            Aggregator::RepeatRate => customers::repeat_rate(table, mapping),
            Aggregator::Cohorts => cohorts::monthly_retention_cohort(table, mapping),
            Aggregator::Rfm => rfm::rfm_segments(table, mapping),
            Aggregator::Forecast => forecast::naive_forecast(table, mapping),
        }
    }
}

/// Ordered set of aggregators run against one (table, mapping) pair.
#[derive(Debug, Clone)]
pub struct InsightRegistry {
    aggregators: Vec<Aggregator>,
}

impl Default for InsightRegistry {
    fn default() -> Self {
        Self {
            aggregators: Aggregator::ALL.to_vec(),
        }
    }
}

impl InsightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn aggregators(&self) -> &[Aggregator] {
        &self.aggregators
    }

    /// Runs every aggregator. A panicking aggregator yields
    /// [`InsightError::Failed`] in its own slot; the others still run.
    pub fn run_all(&self, table: &RawTable, mapping: &ColumnMapping) -> InsightBundle {
        let results = self
            .aggregators
            .iter()
            .map(|&aggregator| {
                let outcome = isolate(|| aggregator.compute(table, mapping));
                match &outcome {
                    Ok(_) => debug!("Insight '{}' computed", aggregator.name()),
                    Err(err) => warn!("Insight '{}' unavailable: {err}", aggregator.name()),
                }
                (aggregator, outcome)
            })
            .collect();
        InsightBundle { results }
    }
}

thread_local! {
    static ISOLATING: Cell<bool> = const { Cell::new(false) };
}

static QUIET_PANIC_HOOK: OnceLock<()> = OnceLock::new();

/// Wraps the process panic hook once so panics raised inside [`isolate`] are
/// reported only through the failed slot's `warn!`. Other panics still reach
/// the previous hook.
fn install_quiet_panic_hook() {
    QUIET_PANIC_HOOK.get_or_init(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if !ISOLATING.with(Cell::get) {
                previous(info);
            }
        }));
    });
}

fn isolate<F>(compute: F) -> AggregateResult
where
    F: FnOnce() -> AggregateResult,
{
    install_quiet_panic_hook();
    ISOLATING.with(|flag| flag.set(true));
    let outcome = panic::catch_unwind(AssertUnwindSafe(compute));
    ISOLATING.with(|flag| flag.set(false));
    outcome.unwrap_or_else(|payload| Err(InsightError::Failed(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "aggregator panicked".to_string()
    }
}

/// Aggregator name → result for one analysis run.
#[derive(Debug, Clone, PartialEq)]
pub struct InsightBundle {
    results: Vec<(Aggregator, AggregateResult)>,
}

impl InsightBundle {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Aggregator, &AggregateResult)> {
        self.results.iter().map(|(agg, result)| (*agg, result))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.results.iter().map(|(agg, _)| agg.name())
    }

    pub fn get(&self, aggregator: Aggregator) -> Option<&AggregateResult> {
        self.results
            .iter()
            .find(|(agg, _)| *agg == aggregator)
            .map(|(_, result)| result)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&AggregateResult> {
        Aggregator::from_name(name).and_then(|agg| self.get(agg))
    }

    pub fn failures(&self) -> impl Iterator<Item = (Aggregator, &InsightError)> {
        self.results
            .iter()
            .filter_map(|(agg, result)| result.as_ref().err().map(|err| (*agg, err)))
    }

    fn output(&self, aggregator: Aggregator) -> Option<&InsightOutput> {
        self.get(aggregator).and_then(|result| result.as_ref().ok())
    }

    pub fn kpis(&self) -> Option<&Kpis> {
        match self.output(Aggregator::Kpis)? {
            InsightOutput::Kpis(report) => Some(&report.kpis),
            _ => None,
        }
    }

    pub fn trend(&self) -> Option<&[MonthlyRevenue]> {
        match self.output(Aggregator::Trend)? {
            InsightOutput::Trend(report) => Some(&report.table),
            _ => None,
        }
    }

    pub fn top_products(&self) -> Option<&[ProductRevenue]> {
        match self.output(Aggregator::TopProducts)? {
            InsightOutput::Products(report) => Some(&report.table),
            _ => None,
        }
    }

    pub fn rfm(&self) -> Option<&[RfmRow]> {
        match self.output(Aggregator::Rfm)? {
            InsightOutput::Rfm(report) => Some(&report.table),
            _ => None,
        }
    }

    pub fn forecast(&self) -> Option<&ForecastReport> {
        match self.output(Aggregator::Forecast)? {
            InsightOutput::Forecast(report) => Some(report),
            _ => None,
        }
    }

    /// Subset holding only `aggregators`, in bundle order. An empty slice
    /// keeps everything.
    pub fn select(&self, aggregators: &[Aggregator]) -> InsightBundle {
        let results = self
            .results
            .iter()
            .filter(|(agg, _)| aggregators.is_empty() || aggregators.contains(agg))
            .cloned()
            .collect();
        InsightBundle { results }
    }

    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

impl Serialize for InsightBundle {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.results.len()))?;
        for (aggregator, result) in &self.results {
            match result {
                Ok(output) => map.serialize_entry(aggregator.name(), output)?,
                Err(err) => map.serialize_entry(aggregator.name(), &ErrorMarker::from(err))?,
            }
        }
        map.end()
    }
}

#[derive(Serialize)]
struct ErrorMarker {
    error: String,
}

impl From<&InsightError> for ErrorMarker {
    fn from(err: &InsightError) -> Self {
        Self {
            error: err.to_string(),
        }
    }
}

pub(crate) fn cell(row: &[Option<Value>], index: usize) -> Option<&Value> {
    row.get(index).and_then(Option::as_ref)
}

pub(crate) fn ensure_rows(table: &RawTable) -> Result<(), InsightError> {
    if table.is_empty() {
        Err(InsightError::EmptyTable)
    } else {
        Ok(())
    }
}

pub(crate) fn count_distinct<'a>(cells: impl Iterator<Item = Option<&'a Value>>) -> usize {
    cells.flatten().collect::<BTreeSet<_>>().len()
}

pub(crate) fn sum_numeric<'a>(cells: impl Iterator<Item = Option<&'a Value>>) -> f64 {
    cells.flatten().filter_map(Value::to_number).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{Industry, suggest_mapping};

    fn orders() -> RawTable {
        RawTable::from_text_rows(
            ["order_date", "order_id", "customer", "product", "amount", "channel"],
            vec![
                vec!["2024-01-03", "A1", "c1", "Widget", "100", "web"],
                vec!["2024-01-20", "A2", "c2", "Gadget", "50", "store"],
                vec!["2024-02-11", "A3", "c1", "Widget", "75", "web"],
                vec!["2024-03-02", "A4", "c3", "Gizmo", "20", "web"],
            ],
        )
        .unwrap()
    }

    #[test]
    fn run_all_returns_every_registered_name() {
        let table = orders();
        let mapping = suggest_mapping(table.columns(), Industry::Generic);
        let bundle = InsightRegistry::new().run_all(&table, &mapping);
        assert_eq!(bundle.len(), 8);
        let names: Vec<_> = bundle.names().collect();
        assert_eq!(
            names,
            vec![
                "kpis",
                "trend",
                "top_products",
                "bottom_products",
                "repeat_rate",
                "cohorts",
                "rfm",
                "forecast"
            ]
        );
        assert_eq!(bundle.failures().count(), 0);
    }

    #[test]
    fn run_all_isolates_missing_fields() {
        let table = orders();
        let mapping = ColumnMapping {
            amount: Some("amount".into()),
            ..ColumnMapping::default()
        };
        let bundle = InsightRegistry::new().run_all(&table, &mapping);
        assert_eq!(bundle.len(), 8);
        assert!(bundle.get(Aggregator::Kpis).unwrap().is_ok());
        assert_eq!(
            bundle.get(Aggregator::Trend).unwrap().as_ref().unwrap_err(),
            &InsightError::MissingFields("Need date and amount")
        );
        assert_eq!(bundle.failures().count(), 7);
    }

    #[test]
    fn bundle_serializes_nested_shapes() {
        let table = orders();
        let mapping = suggest_mapping(table.columns(), Industry::Generic);
        let json = InsightRegistry::new()
            .run_all(&table, &mapping)
            .to_json()
            .unwrap();
        assert_eq!(json["kpis"]["kpis"]["total_sales"], 245.0);
        assert_eq!(json["trend"]["table"][0]["month"], "2024-01");
        assert_eq!(json["top_products"]["table"][0]["product"], "Widget");
        assert!(json["repeat_rate"]["repeat_rate"].is_number());
        assert_eq!(json["cohorts"]["retention"][0]["0"], 1.0);
        assert!(json["rfm"]["table"][0]["RFM_Score"].is_number());
        assert_eq!(json["forecast"]["forecast"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn error_slots_serialize_as_error_marker() {
        let table = orders();
        let json = InsightRegistry::new()
            .run_all(&table, &ColumnMapping::default())
            .to_json()
            .unwrap();
        assert_eq!(json["rfm"]["error"], "Need date, customer_id, amount");
        assert!(json["kpis"]["kpis"]["total_sales"].is_null());
    }

    #[test]
    fn tabulates_outputs_for_display() {
        let table = orders();
        let mapping = suggest_mapping(table.columns(), Industry::Generic);
        let bundle = InsightRegistry::new().run_all(&table, &mapping);

        let (headers, rows) = bundle.get(Aggregator::Kpis).unwrap().as_ref().unwrap().tabulate();
        assert_eq!(headers, vec!["kpi", "value"]);
        assert_eq!(rows[0], vec!["total_sales", "245"]);

        let (headers, rows) = bundle.get(Aggregator::Cohorts).unwrap().as_ref().unwrap().tabulate();
        assert_eq!(headers[0], "cohort");
        assert_eq!(rows[0][1], "1.00");

        let forecast = bundle.get(Aggregator::Forecast).unwrap().as_ref().unwrap();
        let (_, rows) = forecast.tabulate();
        assert_eq!(rows.len(), 3 + 3);

        let repeat = bundle.get(Aggregator::RepeatRate).unwrap().as_ref().unwrap();
        assert_eq!(repeat.summary().as_deref(), Some("repeat_rate: 33.3%"));
    }

    #[test]
    fn empty_table_is_total_and_idempotent() {
        let table = RawTable::new(
            ["order_date", "order_id", "customer", "product", "amount", "channel"]
                .map(String::from)
                .to_vec(),
        );
        let mapping = suggest_mapping(table.columns(), Industry::Generic);
        assert!(mapping.dangling(&table).is_empty());
        let registry = InsightRegistry::new();
        let bundle = registry.run_all(&table, &mapping);

        assert_eq!(bundle.len(), 8);
        let kpis = bundle.kpis().unwrap();
        assert_eq!(kpis.total_sales, None);
        assert_eq!(kpis.num_orders, 0);
        for aggregator in [
            Aggregator::Trend,
            Aggregator::TopProducts,
            Aggregator::BottomProducts,
            Aggregator::Cohorts,
            Aggregator::Rfm,
            Aggregator::Forecast,
        ] {
            assert_eq!(
                bundle.get(aggregator),
                Some(&Err(InsightError::EmptyTable)),
                "{}",
                aggregator.name()
            );
        }
        match bundle.get(Aggregator::RepeatRate) {
            Some(Ok(InsightOutput::RepeatRate(report))) => {
                assert_eq!(report.repeat_rate, 0.0);
                assert!(report.table.is_empty());
            }
            other => panic!("unexpected repeat_rate {other:?}"),
        }

        assert_eq!(registry.run_all(&table, &mapping), bundle);
        let populated = orders();
        assert_eq!(
            registry.run_all(&populated, &mapping),
            registry.run_all(&populated, &mapping)
        );
    }

    #[test]
    fn isolate_turns_panics_into_failed_slots() {
        let outcome = isolate(|| panic!("aggregator exploded"));
        assert_eq!(
            outcome,
            Err(InsightError::Failed("aggregator exploded".to_string()))
        );
        assert!(!ISOLATING.with(Cell::get));

        let formatted = isolate(|| panic!("bad row {}", 7));
        assert_eq!(formatted, Err(InsightError::Failed("bad row 7".to_string())));
        assert!(matches!(isolate(|| Err(InsightError::EmptyTable)), Err(InsightError::EmptyTable)));
    }

    #[test]
    fn formats_numbers_for_display() {
        assert_eq!(format_number(245.0), "245");
        assert_eq!(format_number(83.333_333), "83.33");
        assert_eq!(format_number(-1.5), "-1.50");
    }

    #[test]
    fn aggregator_names_round_trip() {
        for aggregator in Aggregator::ALL {
            assert_eq!(Aggregator::from_name(aggregator.name()), Some(aggregator));
        }
        assert_eq!(Aggregator::from_name("churn"), None);
    }
}
