use ndarray::{Array1, Array2, Axis, ErrorKind, ShapeError};
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};

/// Per-column min-max normalization to `[0, 1]`.
///
/// A constant column gets a unit scale, so it maps to 0 and still inverts
/// exactly. Values outside the fitted range are not clamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub data_min: Array1<f64>,
    pub data_max: Array1<f64>,
}

impl MinMaxScaler {
    pub fn fit(x: &Array2<f64>) -> Result<Self> {
        if x.nrows() == 0 {
            return Err(ForecastError::InsufficientData {
                needed: 1,
                found: 0,
            });
        }
        let data_min = x.fold_axis(Axis(0), f64::INFINITY, |&a, &b| a.min(b));
        let data_max = x.fold_axis(Axis(0), f64::NEG_INFINITY, |&a, &b| a.max(b));
        Ok(Self { data_min, data_max })
    }

    pub fn fit_transform(x: &Array2<f64>) -> Result<(Self, Array2<f64>)> {
        let scaler = Self::fit(x)?;
        let scaled = scaler.transform(x)?;
        Ok((scaler, scaled))
    }

    pub fn n_features(&self) -> usize {
        self.data_min.len()
    }

    fn scale(&self) -> Array1<f64> {
        (&self.data_max - &self.data_min).mapv(|range| if range == 0.0 { 1.0 } else { 1.0 / range })
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_columns(x)?;
        Ok((x - &self.data_min) * &self.scale())
    }

    pub fn inverse_transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_columns(x)?;
        Ok(x / &self.scale() + &self.data_min)
    }

    fn check_columns(&self, x: &Array2<f64>) -> Result<()> {
        if x.ncols() != self.n_features() {
            return Err(ShapeError::from_kind(ErrorKind::IncompatibleShape).into());
        }
        Ok(())
    }
}

/// Applies `scaler` when present; an absent scaler is the identity.
pub fn apply_or_identity(scaler: Option<&MinMaxScaler>, x: &Array2<f64>) -> Result<Array2<f64>> {
    match scaler {
        Some(s) => s.transform(x),
        None => Ok(x.clone()),
    }
}

pub fn invert_or_identity(scaler: Option<&MinMaxScaler>, x: &Array2<f64>) -> Result<Array2<f64>> {
    match scaler {
        Some(s) => s.inverse_transform(x),
        None => Ok(x.clone()),
    }
}
