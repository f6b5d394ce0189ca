//! Cell values, coercions and calendar months.
//!
//! Every cell of a [`crate::dataset::RawTable`] is an `Option<Value>`. Values are
//! inferred once at load time; aggregators then coerce them on demand with
//! [`Value::to_number`] and [`Value::to_datetime`], treating anything that does
//! not coerce as missing for that computation only.

use std::{cmp::Ordering, fmt};

use anyhow::{Result, anyhow};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Serialize, Serializer};

/// Tokens that load as a null cell, compared after trimming.
pub const NA_TOKENS: &[&str] = &[
    "NA", "N/A", "n/a", "NaN", "nan", "null", "NULL", "None", "<NA>", "#N/A",
];

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    (*f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
            Value::Boolean(b) => b.to_string(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    /// Numeric view of the cell. Strings are parsed after trimming; booleans
    /// and temporal values are not numbers.
    pub fn to_number(&self) -> Option<f64> {
        let number = match self {
            Value::Integer(i) => *i as f64,
            Value::Float(f) => *f,
            Value::String(s) => s.trim().parse::<f64>().ok()?,
            Value::Boolean(_) | Value::Date(_) | Value::DateTime(_) => return None,
        };
        number.is_finite().then_some(number)
    }

    /// Temporal view of the cell. Dates become midnight.
    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Date(d) => Some(d.and_time(NaiveTime::MIN)),
            Value::DateTime(dt) => Some(*dt),
            Value::String(s) => {
                let trimmed = s.trim();
                parse_naive_datetime(trimmed)
                    .or_else(|_| parse_naive_date(trimmed).map(|d| d.and_time(NaiveTime::MIN)))
                    .ok()
            }
            Value::Integer(_) | Value::Float(_) | Value::Boolean(_) => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Boolean(_) => 0,
            Value::Integer(_) | Value::Float(_) => 1,
            Value::Date(_) | Value::DateTime(_) => 2,
            Value::String(_) => 3,
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Integer(a), Value::Float(b)) => (*a as f64).total_cmp(b),
            (Value::Float(a), Value::Integer(b)) => a.total_cmp(&(*b as f64)),
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Date(_) | Value::DateTime(_), Value::Date(_) | Value::DateTime(_)) => {
                self.to_datetime().cmp(&other.to_datetime())
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

pub fn parse_naive_date(value: &str) -> Result<NaiveDate> {
    // Slash dates are month-first; day-first only when the month-first read fails.
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y", "%Y/%m/%d", "%d-%m-%Y"];
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as date"))
}

pub fn parse_naive_datetime(value: &str) -> Result<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%m/%d/%Y %H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as datetime"))
}

/// Infers a cell from raw text: NA tokens and blanks are null, then integer,
/// float, boolean, datetime, date and finally string.
pub fn infer_value(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || NA_TOKENS.contains(&trimmed) {
        return None;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Some(Value::Integer(i));
    }
    if let Ok(f) = trimmed.parse::<f64>()
        && f.is_finite()
    {
        return Some(Value::Float(f));
    }
    if trimmed.eq_ignore_ascii_case("true") {
        return Some(Value::Boolean(true));
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return Some(Value::Boolean(false));
    }
    if let Ok(dt) = parse_naive_datetime(trimmed) {
        return Some(Value::DateTime(dt));
    }
    if let Ok(d) = parse_naive_date(trimmed) {
        return Some(Value::Date(d));
    }
    Some(Value::String(trimmed.to_string()))
}

/// A calendar month, ordered chronologically and rendered as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Month {
    year: i32,
    month: u32,
}

impl Month {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn of(moment: &NaiveDateTime) -> Self {
        Self {
            year: moment.year(),
            month: moment.month(),
        }
    }

    pub fn year(self) -> i32 {
        self.year
    }

    pub fn month(self) -> u32 {
        self.month
    }

    pub fn succ(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Number of months from `earlier` to `self`; negative if `self` is earlier.
    pub fn months_since(self, earlier: Month) -> i64 {
        i64::from(self.year - earlier.year) * 12 + i64::from(self.month) - i64::from(earlier.month)
    }

    /// Every month from `self` to `last`, both inclusive.
    pub fn through(self, last: Month) -> impl Iterator<Item = Month> {
        std::iter::successors(Some(self), move |current| {
            (*current < last).then(|| current.succ())
        })
        .take_while(move |current| *current <= last)
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for Month {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_naive_date_supports_multiple_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap();
        assert_eq!(parse_naive_date("2024-05-06").unwrap(), expected);
        assert_eq!(parse_naive_date("05/06/2024").unwrap(), expected);
        assert_eq!(parse_naive_date("2024/05/06").unwrap(), expected);
    }

    #[test]
    fn slash_dates_read_month_first() {
        assert_eq!(
            parse_naive_date("01/02/2024").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );
        assert_eq!(
            parse_naive_date("25/12/2024").unwrap(),
            NaiveDate::from_ymd_opt(2024, 12, 25).unwrap()
        );
        assert_eq!(
            parse_naive_datetime("01/03/2024 08:00:00").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 3)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap()
        );
    }

    #[test]
    fn parse_naive_datetime_supports_multiple_formats() {
        let expected =
            NaiveDateTime::parse_from_str("2024-05-06 14:30:00", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(
            parse_naive_datetime("2024-05-06T14:30:00").unwrap(),
            expected
        );
        assert_eq!(
            parse_naive_datetime("05/06/2024 14:30:00").unwrap(),
            expected
        );
        assert_eq!(parse_naive_datetime("2024-05-06 14:30").unwrap(), expected);
    }

    #[test]
    fn infer_value_treats_na_tokens_as_null() {
        assert_eq!(infer_value(""), None);
        assert_eq!(infer_value("  "), None);
        assert_eq!(infer_value("N/A"), None);
        assert_eq!(infer_value("nan"), None);
        assert_eq!(infer_value("42"), Some(Value::Integer(42)));
        assert_eq!(infer_value("4.5"), Some(Value::Float(4.5)));
        assert_eq!(infer_value("TRUE"), Some(Value::Boolean(true)));
        assert!(matches!(infer_value("2024-01-05"), Some(Value::Date(_))));
        assert!(matches!(
            infer_value("2024-01-05 10:00:00"),
            Some(Value::DateTime(_))
        ));
        assert_eq!(
            infer_value(" widget "),
            Some(Value::String("widget".to_string()))
        );
    }

    #[test]
    fn to_number_coerces_strings_and_rejects_noise() {
        assert_eq!(Value::String(" 12.5 ".into()).to_number(), Some(12.5));
        assert_eq!(Value::String("twelve".into()).to_number(), None);
        assert_eq!(Value::Boolean(true).to_number(), None);
        assert_eq!(Value::Integer(3).to_number(), Some(3.0));
    }

    #[test]
    fn to_datetime_accepts_dates_and_date_strings() {
        let midnight = NaiveDate::from_ymd_opt(2024, 2, 1)
            .unwrap()
            .and_time(NaiveTime::MIN);
        assert_eq!(
            Value::Date(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()).to_datetime(),
            Some(midnight)
        );
        assert_eq!(
            Value::String("2024-02-01".into()).to_datetime(),
            Some(midnight)
        );
        assert_eq!(Value::String("soon".into()).to_datetime(), None);
        assert_eq!(Value::Integer(20240201).to_datetime(), None);
    }

    #[test]
    fn numeric_values_compare_across_variants() {
        assert_eq!(Value::Integer(2), Value::Float(2.0));
        assert!(Value::Integer(2) < Value::Float(2.5));
        assert!(Value::Integer(10) < Value::String("1".into()));
    }

    #[test]
    fn month_arithmetic_wraps_years() {
        let dec = Month::new(2023, 12).unwrap();
        assert_eq!(dec.succ(), Month::new(2024, 1).unwrap());
        assert_eq!(Month::new(2024, 3).unwrap().months_since(dec), 3);
        assert_eq!(dec.to_string(), "2023-12");
        let span: Vec<_> = dec.through(Month::new(2024, 2).unwrap()).collect();
        assert_eq!(span.len(), 3);
        assert!(Month::new(2024, 13).is_none());
        assert_eq!(Month::new(2024, 2).unwrap().through(dec).count(), 0);
    }
}
