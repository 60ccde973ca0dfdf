use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::preprocessing::feature_matrix;
use crate::data::scaler::{apply_or_identity, invert_or_identity};
use crate::error::{ForecastError, Result};
use crate::store::{ModelStore, TrainedModel};

pub const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Twelve predicted monthly means, January first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearForecast {
    pub year: i32,
    pub temperatures: [f64; 12],
}

impl YearForecast {
    pub fn months(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        MONTH_NAMES.iter().copied().zip(self.temperatures.iter().copied())
    }

    pub fn display(&self) {
        println!("\nPredicted monthly temperatures for {}:", self.year);
        for (month, temp) in self.months() {
            println!("- {:<10} {:>6.1}°C", month, temp);
        }
    }
}

/// Runs the model on explicit (year, month) rows and returns physical values.
pub fn predict_rows(model: &TrainedModel, years: &[i32], months: &[u32]) -> Result<Vec<f64>> {
    let x = feature_matrix(years, months)?;
    let x_scaled = apply_or_identity(model.scaler_x.as_ref(), &x)?;
    let y_scaled: Array2<f64> = model.network.predict(&x_scaled)?;
    let y = invert_or_identity(model.scaler_y.as_ref(), &y_scaled)?;
    Ok(y.column(0).to_vec())
}

pub fn predict_year(model: &TrainedModel, year: i32) -> Result<YearForecast> {
    let months: Vec<u32> = (1..=12).collect();
    let values = predict_rows(model, &[year; 12], &months)?;

    let mut temperatures = [0.0; 12];
    temperatures.copy_from_slice(&values);
    Ok(YearForecast { year, temperatures })
}

/// Loads the model from disk and predicts every month of `year`.
pub fn forecast_year(store: &ModelStore, id: &str, year: i32) -> Result<YearForecast> {
    let model = store
        .load(id)
        .ok_or_else(|| ForecastError::Untrained(id.to_string()))?;
    let forecast = predict_year(&model, year)?;
    debug!(model = id, year, "year forecast computed");
    Ok(forecast)
}

/// Single-month prediction, used for the current-month summary.
pub fn forecast_month(store: &ModelStore, id: &str, year: i32, month: u32) -> Result<f64> {
    let model = store
        .load(id)
        .ok_or_else(|| ForecastError::Untrained(id.to_string()))?;
    let values = predict_rows(&model, &[year], &[month])?;
    Ok(values[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::activation::Activation;
    use crate::model::network::NeuralNetwork;
    use ndarray::array;

    /// Linear network computing `month` exactly, so predictions are checkable.
    fn month_echo() -> NeuralNetwork {
        let mut nn = NeuralNetwork::new(2, &[(1, Activation::Linear)], 0.01);
        nn.layers[0].weights = array![[0.0], [1.0]];
        nn.layers[0].bias = array![[0.0]];
        nn
    }

    #[test]
    fn without_scalers_inputs_pass_through() {
        let model = TrainedModel {
            network: month_echo(),
            scaler_x: None,
            scaler_y: None,
        };
        let forecast = predict_year(&model, 2030).unwrap();
        let expected: Vec<f64> = (1..=12).map(f64::from).collect();
        assert_eq!(forecast.temperatures.to_vec(), expected);
    }

    #[test]
    fn scalers_are_applied_and_inverted() {
        let scaler_x = crate::data::scaler::MinMaxScaler::fit(&array![[2000.0, 1.0], [2010.0, 12.0]]).unwrap();
        let scaler_y = crate::data::scaler::MinMaxScaler::fit(&array![[-10.0], [12.0]]).unwrap();
        let model = TrainedModel {
            network: month_echo(),
            scaler_x: Some(scaler_x),
            scaler_y: Some(scaler_y),
        };
        // scaled month m -> (m - 1) / 11, then inverted over [-10, 12]: 2m - 12
        let forecast = predict_year(&model, 2005).unwrap();
        for (i, t) in forecast.temperatures.iter().enumerate() {
            let month = (i + 1) as f64;
            assert!((t - (2.0 * month - 12.0)).abs() < 1e-9);
        }
    }

    #[test]
    fn months_are_in_calendar_order() {
        let forecast = YearForecast {
            year: 2030,
            temperatures: [0.0; 12],
        };
        let names: Vec<&str> = forecast.months().map(|(m, _)| m).collect();
        assert_eq!(names.first(), Some(&"January"));
        assert_eq!(names.last(), Some(&"December"));
    }

    #[test]
    fn untrained_model_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        assert!(matches!(
            forecast_year(&store, "standard", 2030),
            Err(ForecastError::Untrained(_))
        ));
    }
}
