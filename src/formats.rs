//! Columnar and spreadsheet inputs. Parquet files are read through polars,
//! Excel workbooks through calamine (first worksheet, first row as header).
//! Both end up in the same [`RawTable`] as delimited text.

use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use calamine::{Data, Reader, open_workbook_auto};
use chrono::{DateTime, NaiveTime};
use polars::prelude::{AnyValue, LazyFrame, ScanArgsParquet, TimeUnit};

use crate::{
    data::{Value, infer_value},
    dataset::RawTable,
};

/// How a file's extension says it should be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Delimited,
    Excel,
    Parquet,
}

impl InputFormat {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "csv" | "tsv" | "txt" => Some(InputFormat::Delimited),
            "xlsx" | "xls" | "xlsm" | "xlsb" | "ods" => Some(InputFormat::Excel),
            "parquet" => Some(InputFormat::Parquet),
            _ => None,
        }
    }

    pub fn of(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

pub fn read_parquet(path: &Path, max_rows: usize) -> Result<RawTable> {
    let frame = LazyFrame::scan_parquet(path, ScanArgsParquet::default())
        .with_context(|| format!("Scanning parquet file {path:?}"))?
        .collect()
        .with_context(|| format!("Reading parquet file {path:?}"))?;
    if frame.height() > max_rows {
        bail!("Input has more than {max_rows} data rows");
    }
    let columns: Vec<String> = frame
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    let mut table = RawTable::new(columns);
    for idx in 0..frame.height() {
        let row = frame
            .get_columns()
            .iter()
            .map(|series| series.get(idx).map(parquet_cell))
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Reading parquet row {}", idx + 1))?;
        table.push_row(row)?;
    }
    Ok(table)
}

pub(crate) fn parquet_cell(value: AnyValue<'_>) -> Option<Value> {
    match value {
        AnyValue::Null => None,
        AnyValue::Boolean(b) => Some(Value::Boolean(b)),
        AnyValue::String(s) => infer_value(s),
        AnyValue::StringOwned(s) => infer_value(s.as_str()),
        AnyValue::Int8(i) => Some(Value::Integer(i.into())),
        AnyValue::Int16(i) => Some(Value::Integer(i.into())),
        AnyValue::Int32(i) => Some(Value::Integer(i.into())),
        AnyValue::Int64(i) => Some(Value::Integer(i)),
        AnyValue::UInt8(u) => Some(Value::Integer(u.into())),
        AnyValue::UInt16(u) => Some(Value::Integer(u.into())),
        AnyValue::UInt32(u) => Some(Value::Integer(u.into())),
        AnyValue::UInt64(u) => {
            Some(i64::try_from(u).map_or(Value::Float(u as f64), Value::Integer))
        }
        AnyValue::Float32(f) => finite(f.into()),
        AnyValue::Float64(f) => finite(f),
        AnyValue::Date(days) => DateTime::from_timestamp(i64::from(days) * 86_400, 0)
            .map(|dt| Value::Date(dt.date_naive())),
        AnyValue::Datetime(ts, unit, _) => {
            let micros = match unit {
                TimeUnit::Nanoseconds => ts / 1_000,
                TimeUnit::Microseconds => ts,
                TimeUnit::Milliseconds => ts.saturating_mul(1_000),
            };
            DateTime::from_timestamp_micros(micros).map(|dt| Value::DateTime(dt.naive_utc()))
        }
        other => infer_value(other.to_string().trim_matches('"')),
    }
}

fn finite(value: f64) -> Option<Value> {
    value.is_finite().then_some(Value::Float(value))
}

pub fn read_excel(path: &Path, max_rows: usize) -> Result<RawTable> {
    let mut workbook =
        open_workbook_auto(path).with_context(|| format!("Opening workbook {path:?}"))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow!("Workbook {} has no worksheets", path.display()))?
        .with_context(|| format!("Reading first worksheet of {path:?}"))?;

    let mut rows = range.rows();
    let columns: Vec<String> = rows
        .next()
        .map(|header| header.iter().map(|cell| cell.to_string().trim().to_string()).collect())
        .unwrap_or_default();
    if columns.is_empty() || columns.iter().all(String::is_empty) {
        bail!("Input has no header row");
    }
    let width = columns.len();
    let mut table = RawTable::new(columns);
    for cells in rows {
        if table.row_count() == max_rows {
            bail!("Input has more than {max_rows} data rows");
        }
        let mut row: Vec<_> = cells.iter().take(width).map(excel_cell).collect();
        row.resize(width, None);
        table.push_row(row)?;
    }
    Ok(table)
}

pub(crate) fn excel_cell(cell: &Data) -> Option<Value> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::Int(i) => Some(Value::Integer(*i)),
        Data::Float(f) => finite(*f),
        Data::Bool(b) => Some(Value::Boolean(*b)),
        Data::String(s) => infer_value(s),
        Data::DateTime(moment) => moment.as_datetime().map(|dt| {
            if dt.time() == NaiveTime::MIN {
                Value::Date(dt.date())
            } else {
                Value::DateTime(dt)
            }
        }),
        other => infer_value(&other.to_string()),
    }
}
