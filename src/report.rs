//! Static single-file HTML executive report.

use std::{fmt::Write as _, fs, path::Path};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use log::info;

use crate::{
    config::AppConfig,
    filter::ActiveFilters,
    insights::{InsightBundle, Kpis},
};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";
const NO_DATA: &str = "<i>No data</i>";

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn html_table(headers: &[&str], rows: &[Vec<String>], limit: usize) -> String {
    if rows.is_empty() {
        return NO_DATA.to_string();
    }
    let mut html = String::from("<table>\n<thead><tr>");
    for header in headers {
        let _ = write!(html, "<th>{}</th>", escape_html(header));
    }
    html.push_str("</tr></thead>\n<tbody>\n");
    for row in rows.iter().take(limit) {
        html.push_str("<tr>");
        for cell in row {
            let _ = write!(html, "<td>{}</td>", escape_html(cell));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</tbody>\n</table>");
    html
}

fn optional(value: Option<impl ToString>) -> String {
    value.map_or_else(|| "None".to_string(), |v| v.to_string())
}

fn kpi_lines(kpis: &Kpis) -> String {
    [
        format!("total_sales: {}", optional(kpis.total_sales)),
        format!("num_orders: {}", kpis.num_orders),
        format!("num_customers: {}", optional(kpis.num_customers)),
        format!("avg_order_value: {}", optional(kpis.avg_order_value)),
    ]
    .join("\n")
}

pub fn render_html_report(
    bundle: &InsightBundle,
    filters: &ActiveFilters,
    config: &AppConfig,
    generated_at: NaiveDateTime,
) -> String {
    let limit = config.report.max_table_rows;
    let kpis = bundle
        .kpis()
        .map(|k| format!("<pre>{}</pre>", escape_html(&kpi_lines(k))))
        .unwrap_or_else(|| NO_DATA.to_string());
    let trend = bundle.trend().map_or_else(
        || NO_DATA.to_string(),
        |points| {
            let rows: Vec<Vec<String>> = points
                .iter()
                .map(|p| vec![p.month.to_string(), p.revenue.to_string()])
                .collect();
            html_table(&["month", "revenue"], &rows, limit)
        },
    );
    let top = bundle.top_products().map_or_else(
        || NO_DATA.to_string(),
        |products| {
            let rows: Vec<Vec<String>> = products
                .iter()
                .map(|p| vec![p.product.clone(), p.revenue.to_string()])
                .collect();
            html_table(&["product", "revenue"], &rows, limit)
        },
    );
    let rfm = bundle.rfm().map_or_else(
        || NO_DATA.to_string(),
        |segments| {
            let rows: Vec<Vec<String>> = segments
                .iter()
                .map(|r| {
                    vec![
                        r.customer_id.clone(),
                        r.recency.to_string(),
                        r.frequency.to_string(),
                        r.monetary.to_string(),
                        r.score.to_string(),
                    ]
                })
                .collect();
            html_table(
                &["CustomerID", "Recency", "Frequency", "Monetary", "RFM_Score"],
                &rows,
                limit,
            )
        },
    );

    let title = escape_html(&config.app_name);
    let mut html = String::new();
    let _ = writeln!(html, "<!DOCTYPE html>");
    let _ = writeln!(
        html,
        "<html><head><meta charset=\"utf-8\"><title>{title} Report</title>"
    );
    let _ = writeln!(
        html,
        "<style>\nbody{{font-family:system-ui,\"Segoe UI\",Roboto,Helvetica,Arial,sans-serif;\
         margin:40px;color:#0f172a}}\n\
         h1{{margin:0 0 6px 0;color:{primary}}} h2{{color:{primary}}} .sec{{margin-top:24px}}\n\
         .card{{border:1px solid #e5e7eb;border-radius:12px;padding:16px;margin:8px 0;\
         background:#fff}}\n\
         small{{color:{secondary}}} table{{border-collapse:collapse}} \
         th,td{{border:1px solid #e5e7eb;padding:4px 8px;text-align:left}}\n\
         </style></head><body>",
        primary = escape_html(&config.theme.primary_color),
        secondary = escape_html(&config.theme.secondary_color),
    );
    let _ = writeln!(html, "<h1>{title} Executive Report</h1>");
    let _ = writeln!(
        html,
        "<small>Generated: {}</small>",
        generated_at.format(TIMESTAMP_FORMAT)
    );
    if !filters.is_empty() {
        let items: String = filters
            .describe()
            .iter()
            .map(|line| format!("<li>{}</li>", escape_html(line)))
            .collect();
        let _ = writeln!(
            html,
            "<div class=\"sec card\"><h2>Active Filters</h2><ul>{items}</ul></div>"
        );
    }
    let _ = writeln!(html, "<div class=\"sec card\"><h2>KPIs</h2>{kpis}</div>");
    let _ = writeln!(
        html,
        "<div class=\"sec card\"><h2>Monthly Revenue Trend</h2>{trend}</div>"
    );
    let _ = writeln!(html, "<div class=\"sec card\"><h2>Top Products</h2>{top}</div>");
    let _ = writeln!(html, "<div class=\"sec card\"><h2>RFM (sample)</h2>{rfm}</div>");
    let _ = writeln!(html, "</body></html>");
    html
}

pub fn write_html_report(
    path: &Path,
    bundle: &InsightBundle,
    filters: &ActiveFilters,
    config: &AppConfig,
    generated_at: NaiveDateTime,
) -> Result<()> {
    let html = render_html_report(bundle, filters, config, generated_at);
    fs::write(path, html).with_context(|| format!("Writing report {path:?}"))?;
    info!("Report written to {}", path.display());
    Ok(())
}
