use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::records::Observation;

/// Mean observed temperature for one calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonthlySample {
    pub year: i32,
    pub month: u32,
    pub mean_temperature: f64,
}

/// Groups observations by (year, month) and averages the temperatures.
///
/// Output is ordered by (year, month). Rows without a temperature do not count
/// towards the mean, and a month with no temperatures at all is dropped.
pub fn aggregate_monthly(observations: &[Observation]) -> Vec<MonthlySample> {
    let mut groups: BTreeMap<(i32, u32), (f64, usize)> = BTreeMap::new();

    for obs in observations {
        let Some(temperature) = obs.temperature.filter(|t| t.is_finite()) else {
            continue;
        };
        let entry = groups
            .entry((obs.timestamp.year(), obs.timestamp.month()))
            .or_insert((0.0, 0));
        entry.0 += temperature;
        entry.1 += 1;
    }

    groups
        .into_iter()
        .map(|((year, month), (sum, count))| MonthlySample {
            year,
            month,
            mean_temperature: sum / count as f64,
        })
        .collect()
}
