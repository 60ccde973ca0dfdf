use csv::WriterBuilder;
use std::path::{Path, PathBuf};
use tracing::info;

use super::forecast::YearForecast;
use crate::error::Result;

pub const EXPORT_HEADER: [&str; 2] = ["Month", "Temperature"];

/// Writes `Month;Temperature` followed by one row per month (three decimals).
///
/// A path without a `.txt` or `.csv` extension gets `.txt` appended. Returns the
/// path actually written.
pub fn export_forecast<P: AsRef<Path>>(forecast: &YearForecast, path: P) -> Result<PathBuf> {
    let path = with_export_extension(path.as_ref());
    let mut wtr = WriterBuilder::new().delimiter(b';').from_path(&path)?;

    wtr.write_record(EXPORT_HEADER)?;
    for (month, temp) in forecast.months() {
        let value = format!("{temp:.3}");
        wtr.write_record([month, value.as_str()])?;
    }
    wtr.flush()?;

    info!(year = forecast.year, path = %path.display(), "forecast exported");
    Ok(path)
}

fn with_export_extension(path: &Path) -> PathBuf {
    match path.extension().and_then(|e| e.to_str()) {
        Some("txt") | Some("csv") => path.to_path_buf(),
        _ => {
            let mut name = path.as_os_str().to_os_string();
            name.push(".txt");
            PathBuf::from(name)
        }
    }
}
