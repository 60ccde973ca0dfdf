use chrono::{NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, StringRecord};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

use crate::error::{ForecastError, Result};

pub const TIMESTAMP_COLUMN: &str = "timestamp";
/// Column name used by exports from the Moscow (VDNKh) weather station archive.
pub const LEGACY_TIMESTAMP_COLUMN: &str = "Местное время в Москве (ВДНХ)";
pub const TEMPERATURE_COLUMN: &str = "T";

const DATETIME_FORMATS: &[&str] = &[
    "%d.%m.%Y %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
];

/// Cells read as a missing reading, matching the usual CSV null markers.
const MISSING_MARKERS: &[&str] = &[
    "NA", "N/A", "n/a", "#N/A", "NaN", "nan", "-NaN", "-nan", "null", "NULL", "None", "<NA>",
];

const DATE_FORMATS: &[&str] = &["%d.%m.%Y", "%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d"];

/// One raw row of the historical file. An empty or null-marker temperature cell is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub timestamp: NaiveDateTime,
    pub temperature: Option<f64>,
}

pub fn read_observations<P: AsRef<Path>>(path: P) -> Result<Vec<Observation>> {
    let file = File::open(path.as_ref())?;
    read_observations_from(file)
}

/// Reads semicolon-delimited records with a header row.
pub fn read_observations_from<R: Read>(reader: R) -> Result<Vec<Observation>> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let timestamp_idx = column_index(&headers, TIMESTAMP_COLUMN)
        .or_else(|| column_index(&headers, LEGACY_TIMESTAMP_COLUMN))
        .ok_or_else(|| ForecastError::MissingColumn(TIMESTAMP_COLUMN.to_string()))?;
    let temperature_idx = column_index(&headers, TEMPERATURE_COLUMN)
        .ok_or_else(|| ForecastError::MissingColumn(TEMPERATURE_COLUMN.to_string()))?;

    let mut observations = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();

        let raw_timestamp = record.get(timestamp_idx).unwrap_or("").trim();
        let timestamp = parse_day_first(raw_timestamp).ok_or_else(|| ForecastError::Timestamp {
            value: raw_timestamp.to_string(),
            line,
        })?;

        let raw_temperature = record.get(temperature_idx).unwrap_or("").trim();
        let temperature = parse_temperature(raw_temperature).map_err(|_| ForecastError::Temperature {
            value: raw_temperature.to_string(),
            line,
        })?;

        observations.push(Observation {
            timestamp,
            temperature,
        });
    }

    debug!(rows = observations.len(), "historical records loaded");
    Ok(observations)
}

/// Empty cells, null markers and non-finite numbers are missing readings.
fn parse_temperature(raw: &str) -> std::result::Result<Option<f64>, std::num::ParseFloatError> {
    if raw.is_empty() || MISSING_MARKERS.contains(&raw) {
        return Ok(None);
    }
    let value = raw.parse::<f64>()?;
    Ok(value.is_finite().then_some(value))
}

fn column_index(headers: &StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h.trim() == name)
}

/// Parses a timestamp, reading ambiguous dates as day-first.
pub fn parse_day_first(value: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}
