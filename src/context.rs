//! Compact Markdown "context pack" summarising a dataset for downstream
//! assistants: KPIs, recent trend, anomalies, top groups and schema. Built from
//! aggregates only; no raw rows are included.

use std::collections::BTreeMap;

use itertools::Itertools;
use serde::Serialize;

use crate::{
    data::{Month, Value},
    dataset::RawTable,
    insights::{InsightBundle, MonthlyRevenue, cell, format_number, products::revenue_by},
    mapping::{ColumnMapping, Role},
    profile::quick_profile,
    table::render_markdown_table,
};

pub const ANOMALY_Z_THRESHOLD: f64 = 2.0;
const MIN_ANOMALY_POINTS: usize = 3;
const SCHEMA_COLUMN_LIMIT: usize = 12;
const RECENT_MONTHS: usize = 6;
const BREAKDOWN_LIMIT: usize = 10;

pub const EMPTY_REASONS_PACK: &str = "### SQL Pack\n- n/a";

pub const EMPTY_CONTEXT_PACK: &str =
    "### KPIs\n- No data\n\n### Monthly Trend (compact)\n- n/a\n\n### Schema\n- n/a";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextOptions {
    pub max_trend_points: usize,
    pub top_n: usize,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            max_trend_points: 12,
            top_n: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anomaly {
    pub month: Month,
    pub revenue: f64,
    pub z_score: f64,
}

/// Months whose revenue lies more than `threshold` population standard
/// deviations from the mean. Needs at least three points; a flat series has
/// no anomalies.
pub fn detect_anomalies(series: &[MonthlyRevenue], threshold: f64) -> Vec<Anomaly> {
    if series.len() < MIN_ANOMALY_POINTS {
        return Vec::new();
    }
    let n = series.len() as f64;
    let mean = series.iter().map(|p| p.revenue).sum::<f64>() / n;
    let variance = series
        .iter()
        .map(|p| (p.revenue - mean).powi(2))
        .sum::<f64>()
        / n;
    let std = variance.sqrt();
    if std <= 0.0 {
        return Vec::new();
    }
    series
        .iter()
        .filter_map(|p| {
            let z_score = (p.revenue - mean) / std;
            (z_score.abs() > threshold).then_some(Anomaly {
                month: p.month,
                revenue: p.revenue,
                z_score,
            })
        })
        .collect()
}

/// `$1,234` style rounding to whole units.
pub fn format_money(value: f64) -> String {
    let rounded = value.round();
    let sign = if rounded < 0.0 { "-" } else { "" };
    format!("{sign}${}", group_thousands(rounded.abs() as u64))
}

pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

fn latest_change(series: &[MonthlyRevenue]) -> Option<(Month, f64)> {
    let [.., previous, last] = series else {
        return None;
    };
    let change = (last.revenue - previous.revenue) / previous.revenue.max(1e-9);
    Some((last.month, change))
}

pub fn build_context_pack(
    table: &RawTable,
    mapping: &ColumnMapping,
    bundle: &InsightBundle,
    options: &ContextOptions,
) -> String {
    if table.is_empty() {
        return EMPTY_CONTEXT_PACK.to_string();
    }
    let mut lines: Vec<String> = Vec::new();

    lines.push("### KPIs".to_string());
    match bundle.kpis() {
        Some(kpis) => {
            if let Some(total) = kpis.total_sales {
                lines.push(format!("- Total Sales: **{}**", format_money(total)));
            }
            lines.push(format!(
                "- Orders: **{}**",
                group_thousands(kpis.num_orders as u64)
            ));
            if let Some(customers) = kpis.num_customers {
                lines.push(format!(
                    "- Customers: **{}**",
                    group_thousands(customers as u64)
                ));
            }
            if let Some(aov) = kpis.avg_order_value {
                lines.push(format!("- Avg Order Value: **{}**", format_money(aov)));
            }
        }
        None => lines.push("- No KPIs available".to_string()),
    }

    let trend = bundle.trend().unwrap_or_default();
    lines.push("\n### Monthly Trend (compact)".to_string());
    if trend.is_empty() {
        lines.push("- n/a".to_string());
    } else {
        let start = trend.len().saturating_sub(options.max_trend_points);
        lines.extend(
            trend[start..]
                .iter()
                .map(|p| format!("- {}: {}", p.month, format_money(p.revenue))),
        );
    }

    if let Some((month, change)) = latest_change(trend) {
        let arrow = if change > 0.0 { "↑" } else { "↓" };
        lines.push(format!(
            "\n**Latest change ({month})**: {arrow} {:.1}%",
            change.abs() * 100.0
        ));
    }

    let anomalies = detect_anomalies(trend, ANOMALY_Z_THRESHOLD);
    if !anomalies.is_empty() {
        lines.push("\n### Anomalies".to_string());
        lines.extend(anomalies.iter().map(|a| {
            let direction = if a.z_score > 0.0 { "above" } else { "below" };
            format!(
                "- {}: {} ({direction} average, z = {:.1})",
                a.month,
                format_money(a.revenue),
                a.z_score
            )
        }));
    }

    if let Some(amount) = mapping.resolve(table, Role::Amount) {
        for (role, heading) in [(Role::Product, "Top Products"), (Role::Channel, "Top Channels")] {
            let Some(key) = mapping.resolve(table, role) else {
                continue;
            };
            let mut groups = revenue_by(table, key, amount);
            groups.sort_by(|a, b| b.1.total_cmp(&a.1));
            if groups.is_empty() {
                continue;
            }
            lines.push(format!("\n### {heading}"));
            lines.extend(
                groups
                    .iter()
                    .take(options.top_n)
                    .map(|(name, revenue)| format!("- {name}: {}", format_money(*revenue))),
            );
        }
    }

    lines.push("\n### Schema".to_string());
    let profile = quick_profile(table);
    lines.extend(
        profile
            .column_profiles
            .iter()
            .take(SCHEMA_COLUMN_LIMIT)
            .map(|c| format!("- {}: {}", c.name, c.data_type)),
    );
    if profile.columns > SCHEMA_COLUMN_LIMIT {
        lines.push(format!("- … (+{} more)", profile.columns - SCHEMA_COLUMN_LIMIT));
    }

    lines.iter().join("\n")
}

/// Revenue per observed month, skipping rows without a parseable date.
/// Non-numeric amounts count as zero.
fn observed_monthly_revenue(table: &RawTable, date: usize, amount: usize) -> BTreeMap<Month, f64> {
    let mut totals = BTreeMap::new();
    for row in table.rows() {
        let Some(moment) = cell(row, date).and_then(Value::to_datetime) else {
            continue;
        };
        let value = cell(row, amount).and_then(Value::to_number).unwrap_or(0.0);
        *totals.entry(Month::of(&moment)).or_insert(0.0) += value;
    }
    totals
}

fn revenue_table(label: &str, rows: &[(String, f64)]) -> String {
    let headers = [label.to_string(), "revenue".to_string()];
    let rows: Vec<Vec<String>> = rows
        .iter()
        .map(|(key, revenue)| vec![key.clone(), format_number(*revenue)])
        .collect();
    render_markdown_table(&headers, &rows).trim_end().to_string()
}

/// SQL-style drill-down: revenue for the last six observed months, then the
/// top products and channels of the latest month.
pub fn reasons_pack(table: &RawTable, mapping: &ColumnMapping) -> String {
    let Some(amount) = mapping.resolve(table, Role::Amount) else {
        return EMPTY_REASONS_PACK.to_string();
    };
    if table.is_empty() {
        return EMPTY_REASONS_PACK.to_string();
    }
    let mut sections = vec!["### SQL Pack".to_string()];
    let Some(date) = mapping.resolve(table, Role::Date) else {
        return sections.join("\n\n");
    };

    let totals = observed_monthly_revenue(table, date, amount);
    let Some(&latest) = totals.keys().next_back() else {
        return sections.join("\n\n");
    };
    let recent: Vec<(String, f64)> = totals
        .iter()
        .skip(totals.len().saturating_sub(RECENT_MONTHS))
        .map(|(month, revenue)| (month.to_string(), *revenue))
        .collect();
    sections.push("**Recent Months (Revenue)**".to_string());
    sections.push(revenue_table("month", &recent));

    let last_month = table.retain_rows(|row| {
        cell(row, date)
            .and_then(Value::to_datetime)
            .is_some_and(|moment| Month::of(&moment) == latest)
    });
    for (role, heading) in [(Role::Product, "Top Products"), (Role::Channel, "Top Channels")] {
        let Some(key) = mapping.resolve(table, role) else {
            continue;
        };
        let mut groups = revenue_by(&last_month, key, amount);
        groups.sort_by(|a, b| b.1.total_cmp(&a.1));
        groups.truncate(BREAKDOWN_LIMIT);
        sections.push(format!("**{latest} {heading}**"));
        sections.push(revenue_table(role.as_str(), &groups));
    }
    sections.join("\n\n")
}
