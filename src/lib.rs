pub mod cache;
pub mod cli;
pub mod config;
pub mod context;
pub mod data;
pub mod dataset;
pub mod filter;
pub mod formats;
pub mod insights;
pub mod io_utils;
pub mod mapping;
pub mod profile;
pub mod report;
pub mod session;
pub mod table;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{
        AnalysisArgs, Cli, Commands, ContextArgs, DatasetArgs, FilterArgs, InsightsArgs,
        MappingArgs, OutputFormat, ProfileArgs, ReportArgs, SuggestArgs,
    },
    config::AppConfig,
    context::ContextOptions,
    dataset::RawTable,
    filter::FilterSet,
    io_utils::LoadOptions,
    mapping::{ColumnMapping, Role, suggest_mapping},
    session::{Analysis, AnalysisSession},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("omni_insights", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Suggest(args) => handle_suggest(&args),
        Commands::Profile(args) => handle_profile(&args),
        Commands::Insights(args) => handle_insights(&args),
        Commands::Report(args) => handle_report(&args),
        Commands::Context(args) => handle_context(&args),
    }
}

fn load_dataset(args: &DatasetArgs) -> Result<(AppConfig, RawTable)> {
    let config = AppConfig::resolve(args.config.as_deref());
    let options = LoadOptions {
        delimiter: args.delimiter,
        encoding: io_utils::resolve_encoding(args.input_encoding.as_deref())?,
        limits: config.limits.clone(),
    };
    info!(
        "Loading '{}' (delimiter {})",
        args.input.display(),
        args.delimiter
            .map_or_else(|| "auto".to_string(), printable_delimiter)
    );
    let table = io_utils::load_table(&args.input, &options)?;
    Ok((config, table))
}

/// Suggested (or file-provided) mapping with command-line overrides applied.
fn resolve_mapping(
    table: &RawTable,
    dataset: &DatasetArgs,
    args: &MappingArgs,
) -> Result<ColumnMapping> {
    let mut mapping = match &args.mapping_file {
        Some(path) => config::load_yaml::<ColumnMapping>(path)
            .with_context(|| format!("Loading column mapping from {path:?}"))?,
        None => suggest_mapping(table.columns(), dataset.industry),
    };
    for (role, value) in [
        (Role::Date, &args.date),
        (Role::Amount, &args.amount),
        (Role::OrderId, &args.order_id),
        (Role::CustomerId, &args.customer_id),
        (Role::Product, &args.product),
        (Role::Channel, &args.channel),
    ] {
        let Some(value) = value else {
            continue;
        };
        let column = value.trim();
        if column.eq_ignore_ascii_case("none") {
            mapping = mapping.with(role, None);
        } else if table.has_column(column) {
            mapping = mapping.with(role, Some(column.to_string()));
        } else {
            bail!("Column '{column}' for {} not found in dataset", role.label());
        }
    }
    debug!("Resolved mapping: {mapping:?}");
    Ok(mapping)
}

fn resolve_filters(args: &FilterArgs) -> Result<FilterSet> {
    if let (Some(from), Some(to)) = (args.from, args.to)
        && from > to
    {
        bail!("--from {from} is after --to {to}");
    }
    let clean = |values: &[String]| {
        values
            .iter()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect::<Vec<_>>()
    };
    Ok(FilterSet {
        date_from: args.from,
        date_to: args.to,
        products: clean(&args.products),
        channels: clean(&args.channels),
        customers: clean(&args.customers),
        conditions: filter::parse_filters(&args.filters)?,
    })
}

fn run_analysis(args: &AnalysisArgs) -> Result<(AppConfig, Analysis)> {
    let (config, table) = load_dataset(&args.dataset)?;
    let mapping = resolve_mapping(&table, &args.dataset, &args.mapping)?;
    let filters = resolve_filters(&args.filters)?;
    let mut session = AnalysisSession::new(
        table,
        mapping,
        args.dataset.industry,
        config.cache.capacity,
    );
    let analysis = session.analyze(&filters)?;
    Ok((config, analysis))
}

fn handle_suggest(args: &SuggestArgs) -> Result<()> {
    let (_, dataset) = load_dataset(&args.dataset)?;
    let mapping = suggest_mapping(dataset.columns(), args.dataset.industry);
    match args.format {
        OutputFormat::Table => {
            let rows = Role::ALL
                .into_iter()
                .map(|role| {
                    vec![
                        role.as_str().to_string(),
                        mapping.get(role).unwrap_or("-").to_string(),
                    ]
                })
                .collect::<Vec<_>>();
            table::print_table(&["role".to_string(), "column".to_string()], &rows);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&mapping)?),
        OutputFormat::Yaml => print!("{}", config::to_yaml_string(&mapping)?),
    }
    Ok(())
}

fn handle_profile(args: &ProfileArgs) -> Result<()> {
    let (_, dataset) = load_dataset(&args.dataset)?;
    let profile = profile::quick_profile(&dataset);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
        return Ok(());
    }
    println!("rows: {}", profile.rows);
    println!("columns: {}", profile.columns);
    if let Some(message) = profile.message {
        println!("{message}");
    }
    let rows = profile
        .column_profiles
        .iter()
        .map(|c| vec![c.name.clone(), c.data_type.to_string(), c.missing.to_string()])
        .collect::<Vec<_>>();
    table::print_table(
        &["column".to_string(), "type".to_string(), "missing".to_string()],
        &rows,
    );
    Ok(())
}

fn handle_insights(args: &InsightsArgs) -> Result<()> {
    let (_, analysis) = run_analysis(&args.analysis)?;
    let bundle = analysis.bundle.select(&args.only);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&bundle)?);
        return Ok(());
    }
    for line in analysis.filters.describe() {
        println!("filter: {line}");
    }
    for (aggregator, result) in bundle.iter() {
        println!("== {} ==", aggregator.name());
        match result {
            Ok(output) => {
                if let Some(summary) = output.summary() {
                    println!("{summary}");
                }
                let (headers, rows) = output.tabulate();
                table::print_table(&headers, &rows);
            }
            Err(err) => println!("unavailable: {err}"),
        }
        println!();
    }
    Ok(())
}

fn handle_report(args: &ReportArgs) -> Result<()> {
    let (config, analysis) = run_analysis(&args.analysis)?;
    report::write_html_report(
        &args.output,
        &analysis.bundle,
        &analysis.filters,
        &config,
        Local::now().naive_local(),
    )
}

fn handle_context(args: &ContextArgs) -> Result<()> {
    let (_, analysis) = run_analysis(&args.analysis)?;
    let options = ContextOptions {
        max_trend_points: args.max_trend_points,
        top_n: args.top_n,
    };
    let pack = context::build_context_pack(
        &analysis.table,
        &analysis.mapping,
        &analysis.bundle,
        &options,
    );
    println!("{pack}");
    if args.sql_pack {
        println!();
        println!("{}", context::reasons_pack(&analysis.table, &analysis.mapping));
    }
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
