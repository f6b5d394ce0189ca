use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::{data::parse_naive_date, insights::Aggregator, mapping::Industry};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Sales insights from tabular order data",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Suggest which columns hold dates, amounts, orders, customers, products and channels
    Suggest(SuggestArgs),
    /// Show row/column counts, inferred column types and missing values
    Profile(ProfileArgs),
    /// Compute KPIs, trend, products, repeat rate, cohorts, RFM and forecast
    Insights(InsightsArgs),
    /// Write a static HTML executive report
    Report(ReportArgs),
    /// Print a compact Markdown summary of the dataset and its insights
    Context(ContextArgs),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
}

#[derive(Debug, Args)]
pub struct DatasetArgs {
    /// Input data file (.csv, .tsv, .txt, .xlsx/.xls or .parquet; `-` reads stdin as text)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Field delimiter (supports ',', 'tab', ';', '|'); sniffed from the header when omitted
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// YAML configuration file (falls back to $OMNI_INSIGHTS_CONFIG, then defaults)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Industry preset for the dataset
    #[arg(long, value_enum, default_value_t = Industry::Generic)]
    pub industry: Industry,
}

#[derive(Debug, Args, Default)]
pub struct MappingArgs {
    /// YAML file with a confirmed column mapping (replaces the suggestion)
    #[arg(long = "mapping")]
    pub mapping_file: Option<PathBuf>,
    /// Column holding the transaction date (`none` to unmap)
    #[arg(long)]
    pub date: Option<String>,
    /// Column holding the monetary amount (`none` to unmap)
    #[arg(long)]
    pub amount: Option<String>,
    /// Column holding the order identifier (`none` to unmap)
    #[arg(long = "order-id")]
    pub order_id: Option<String>,
    /// Column holding the customer identifier (`none` to unmap)
    #[arg(long = "customer-id")]
    pub customer_id: Option<String>,
    /// Column holding the product name or SKU (`none` to unmap)
    #[arg(long)]
    pub product: Option<String>,
    /// Column holding the sales channel (`none` to unmap)
    #[arg(long)]
    pub channel: Option<String>,
}

#[derive(Debug, Args, Default)]
pub struct FilterArgs {
    /// Keep rows dated on or after this day (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub from: Option<NaiveDate>,
    /// Keep rows dated on or before this day (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub to: Option<NaiveDate>,
    /// Keep only these products (comma-separated or repeated)
    #[arg(long = "product-filter", value_delimiter = ',', action = clap::ArgAction::Append)]
    pub products: Vec<String>,
    /// Keep only these channels (comma-separated or repeated)
    #[arg(long = "channel-filter", value_delimiter = ',', action = clap::ArgAction::Append)]
    pub channels: Vec<String>,
    /// Keep only these customers (comma-separated or repeated)
    #[arg(long = "customer-filter", value_delimiter = ',', action = clap::ArgAction::Append)]
    pub customers: Vec<String>,
    /// Row-level filters such as `amount>=100` or `region = north`
    #[arg(long = "filter", action = clap::ArgAction::Append)]
    pub filters: Vec<String>,
}

#[derive(Debug, Args)]
pub struct AnalysisArgs {
    #[command(flatten)]
    pub dataset: DatasetArgs,
    #[command(flatten)]
    pub mapping: MappingArgs,
    #[command(flatten)]
    pub filters: FilterArgs,
}

#[derive(Debug, Args)]
pub struct SuggestArgs {
    #[command(flatten)]
    pub dataset: DatasetArgs,
    /// Output format for the suggested mapping
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

#[derive(Debug, Args)]
pub struct ProfileArgs {
    #[command(flatten)]
    pub dataset: DatasetArgs,
    /// Emit the profile as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct InsightsArgs {
    #[command(flatten)]
    pub analysis: AnalysisArgs,
    /// Emit the insight bundle as JSON
    #[arg(long)]
    pub json: bool,
    /// Restrict output to these insights (comma-separated or repeated)
    #[arg(long, value_enum, value_delimiter = ',', action = clap::ArgAction::Append)]
    pub only: Vec<Aggregator>,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    #[command(flatten)]
    pub analysis: AnalysisArgs,
    /// Destination HTML file
    #[arg(short = 'o', long = "output", default_value = "omniinsights_report.html")]
    pub output: PathBuf,
}

#[derive(Debug, Args)]
pub struct ContextArgs {
    #[command(flatten)]
    pub analysis: AnalysisArgs,
    /// Number of most recent months listed in the trend section
    #[arg(long = "max-trend-points", default_value_t = 12)]
    pub max_trend_points: usize,
    /// Number of products and channels listed
    #[arg(long = "top-n", default_value_t = 5)]
    pub top_n: usize,
    /// Append recent monthly revenue and the latest month's top products and channels
    #[arg(long = "sql-pack")]
    pub sql_pack: bool,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate, String> {
    parse_naive_date(value.trim()).map_err(|err| err.to_string())
}
