//! Dataset loading: file checks, decoding, delimiter resolution and parsing.
//!
//! Input files are size-checked before they are read, decoded as a whole via
//! `encoding_rs` (UTF-8 by default), and parsed with the `csv` crate in
//! flexible mode so ragged rows can be padded or truncated to the header
//! width. The `-` path reads standard input and skips the extension check.
//! Excel and Parquet files are handed to [`crate::formats`].

use std::{
    fs::{self, File},
    io::{self, BufReader, Read},
    path::Path,
};

use anyhow::{Context, Result, anyhow, bail};
use encoding_rs::{Encoding, UTF_8};
use log::{debug, info};

use crate::{
    config::LimitsConfig,
    data::infer_value,
    dataset::RawTable,
    formats::{self, InputFormat},
};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';
pub const SUPPORTED_EXTENSIONS: &[&str] =
    &["csv", "tsv", "txt", "xlsx", "xls", "xlsm", "xlsb", "ods", "parquet"];
const SNIFF_CANDIDATES: [u8; 4] = [b',', b';', b'\t', b'|'];

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

/// Explicit delimiter, else tab for `.tsv`, else the first of `,` `;` tab `|`
/// found in the header line, else comma.
pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>, sample: &str) -> u8 {
    if let Some(delimiter) = provided {
        return delimiter;
    }
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => sniff_delimiter(sample),
    }
}

pub fn sniff_delimiter(sample: &str) -> u8 {
    let first_line = sample.lines().next().unwrap_or_default();
    SNIFF_CANDIDATES
        .into_iter()
        .find(|candidate| first_line.as_bytes().contains(candidate))
        .unwrap_or(DEFAULT_CSV_DELIMITER)
}

/// Rejects unsupported extensions and files larger than the configured limit.
pub fn validate_input_file(path: &Path, limits: &LimitsConfig) -> Result<()> {
    if is_dash(path) {
        return Ok(());
    }
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        bail!("Unsupported file type: {}", path.display());
    }
    let metadata =
        fs::metadata(path).with_context(|| format!("Reading metadata for {path:?}"))?;
    let limit = limits.max_file_size_bytes();
    if metadata.len() > limit {
        bail!(
            "File {} is {} bytes, above the {} MB limit",
            path.display(),
            metadata.len(),
            limits.max_file_size_mb
        );
    }
    Ok(())
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    if is_dash(path) {
        io::stdin()
            .lock()
            .read_to_end(&mut buf)
            .context("Reading standard input")?;
    } else {
        BufReader::new(File::open(path).with_context(|| format!("Opening input file {path:?}"))?)
            .read_to_end(&mut buf)
            .with_context(|| format!("Reading input file {path:?}"))?;
    }
    Ok(buf)
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub delimiter: Option<u8>,
    pub encoding: &'static Encoding,
    pub limits: LimitsConfig,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            encoding: UTF_8,
            limits: LimitsConfig::default(),
        }
    }
}

pub fn load_table(path: &Path, options: &LoadOptions) -> Result<RawTable> {
    validate_input_file(path, &options.limits)?;
    let table = match InputFormat::of(path) {
        Some(InputFormat::Excel) => formats::read_excel(path, options.limits.max_rows)?,
        Some(InputFormat::Parquet) => formats::read_parquet(path, options.limits.max_rows)?,
        Some(InputFormat::Delimited) | None => load_delimited(path, options)?,
    };
    info!(
        "Loaded {} row(s) x {} column(s) from {}",
        table.row_count(),
        table.column_count(),
        path.display()
    );
    Ok(table)
}

fn load_delimited(path: &Path, options: &LoadOptions) -> Result<RawTable> {
    let bytes = read_input(path)?;
    let text = decode_bytes(&bytes, options.encoding)
        .with_context(|| format!("Decoding {}", path.display()))?;
    let delimiter = resolve_input_delimiter(path, options.delimiter, &text);
    debug!(
        "Parsing {} with delimiter {:?}",
        path.display(),
        char::from(delimiter)
    );
    parse_table(&text, delimiter, options.limits.max_rows)
        .with_context(|| format!("Parsing {}", path.display()))
}

/// Parses delimited text whose first record is the header.
pub fn parse_table(text: &str, delimiter: u8, max_rows: usize) -> Result<RawTable> {
    let mut reader = open_csv_reader(text.as_bytes(), delimiter);
    let columns: Vec<String> = reader
        .headers()
        .context("Reading header row")?
        .iter()
        .map(|name| name.trim().to_string())
        .collect();
    if columns.is_empty() || columns.iter().all(String::is_empty) {
        bail!("Input has no header row");
    }
    let width = columns.len();
    let mut table = RawTable::new(columns);
    for (idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Reading row {}", idx + 2))?;
        if table.row_count() == max_rows {
            bail!("Input has more than {max_rows} data rows");
        }
        let mut row: Vec<_> = record.iter().take(width).map(infer_value).collect();
        row.resize(width, None);
        table.push_row(row)?;
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;

    #[test]
    fn sniffs_first_candidate_in_header() {
        assert_eq!(sniff_delimiter("a;b;c\n1;2;3"), b';');
        assert_eq!(sniff_delimiter("a|b\n"), b'|');
        assert_eq!(sniff_delimiter("a,b;c"), b',');
        assert_eq!(sniff_delimiter("single"), b',');
        assert_eq!(sniff_delimiter(""), b',');
    }

    #[test]
    fn tsv_extension_wins_over_sniffing() {
        assert_eq!(
            resolve_input_delimiter(Path::new("x.tsv"), None, "a,b"),
            DEFAULT_TSV_DELIMITER
        );
        assert_eq!(resolve_input_delimiter(Path::new("x.csv"), Some(b'|'), "a,b"), b'|');
    }

    #[test]
    fn ragged_rows_are_padded_and_truncated() {
        let table = parse_table("a,b,c\n1,2\n3,4,5,6\n", b',', 100).unwrap();
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.rows()[0], vec![Some(Value::Integer(1)), Some(Value::Integer(2)), None]);
        assert_eq!(table.rows()[1].len(), 3);
    }

    #[test]
    fn row_limit_is_enforced() {
        assert!(parse_table("a\n1\n2\n3\n", b',', 2).is_err());
        assert_eq!(parse_table("a\n1\n2\n", b',', 2).unwrap().row_count(), 2);
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let err = validate_input_file(Path::new("sales.json"), &LimitsConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("Unsupported file type"));
    }

    #[test]
    fn parquet_files_load_through_the_same_entry_point() {
        use polars::prelude::{NamedFrom, ParquetWriter, df};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.parquet");
        let mut frame = df!(
            "order_date" => ["2024-03-01", "2024-03-09"],
            "amount" => [10i64, 32],
        )
        .unwrap();
        ParquetWriter::new(File::create(&path).unwrap())
            .finish(&mut frame)
            .unwrap();

        let table = load_table(&path, &LoadOptions::default()).unwrap();
        assert_eq!(table.columns(), ["order_date", "amount"]);
        assert_eq!(table.rows()[1][1], Some(Value::Integer(32)));
    }

    #[test]
    fn oversized_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.csv");
        fs::write(&path, vec![b'x'; 2 * 1024 * 1024]).unwrap();
        let limits = LimitsConfig {
            max_file_size_mb: 1,
            ..LimitsConfig::default()
        };
        assert!(validate_input_file(&path, &limits).is_err());
    }

    #[test]
    fn decodes_non_utf8_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latin.csv");
        fs::write(&path, b"name,amount\ncaf\xe9,3\n").unwrap();
        let options = LoadOptions {
            encoding: resolve_encoding(Some("windows-1252")).unwrap(),
            ..LoadOptions::default()
        };
        let table = load_table(&path, &options).unwrap();
        assert_eq!(table.rows()[0][0], Some(Value::String("café".into())));
    }
}
