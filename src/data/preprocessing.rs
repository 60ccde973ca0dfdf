use ndarray::{Array2, ErrorKind, ShapeError};
use std::path::Path;
use tracing::info;

use super::aggregate::{aggregate_monthly, MonthlySample};
use super::records::read_observations;
use super::scaler::MinMaxScaler;
use crate::error::Result;

/// Scaled features/targets together with the scalers fitted on them.
pub struct ScaledData {
    pub x: Array2<f64>,
    pub y: Array2<f64>,
    pub scaler_x: MinMaxScaler,
    pub scaler_y: MinMaxScaler,
}

/// Two-column (year, month) feature matrix.
pub fn feature_matrix(years: &[i32], months: &[u32]) -> Result<Array2<f64>> {
    if years.len() != months.len() {
        return Err(ShapeError::from_kind(ErrorKind::IncompatibleShape).into());
    }
    let flat: Vec<f64> = years
        .iter()
        .zip(months)
        .flat_map(|(&y, &m)| [y as f64, m as f64])
        .collect();
    Ok(Array2::from_shape_vec((years.len(), 2), flat)?)
}

/// Fits fresh scalers on the features and the target column and applies them.
pub fn scale_samples(years: &[i32], months: &[u32], temperatures: &[f64]) -> Result<ScaledData> {
    let x = feature_matrix(years, months)?;
    if temperatures.len() != x.nrows() {
        return Err(ShapeError::from_kind(ErrorKind::IncompatibleShape).into());
    }
    let y = Array2::from_shape_vec((temperatures.len(), 1), temperatures.to_vec())?;

    let (scaler_x, x) = MinMaxScaler::fit_transform(&x)?;
    let (scaler_y, y) = MinMaxScaler::fit_transform(&y)?;

    Ok(ScaledData {
        x,
        y,
        scaler_x,
        scaler_y,
    })
}

pub fn scale_monthly(samples: &[MonthlySample]) -> Result<ScaledData> {
    let years: Vec<i32> = samples.iter().map(|s| s.year).collect();
    let months: Vec<u32> = samples.iter().map(|s| s.month).collect();
    let temperatures: Vec<f64> = samples.iter().map(|s| s.mean_temperature).collect();
    scale_samples(&years, &months, &temperatures)
}

/// Reads the historical file and reduces it to one sample per month.
pub fn load_monthly_samples<P: AsRef<Path>>(path: P) -> Result<Vec<MonthlySample>> {
    let observations = read_observations(path.as_ref())?;
    let samples = aggregate_monthly(&observations);
    info!(
        path = %path.as_ref().display(),
        records = observations.len(),
        months = samples.len(),
        "historical data aggregated"
    );
    Ok(samples)
}
