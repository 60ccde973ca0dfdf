use plotters::prelude::*;
use std::error::Error;
use std::path::Path;

use crate::error::{ForecastError, Result};
use crate::prediction::forecast::{YearForecast, MONTH_NAMES};
use crate::training::history::TrainingHistory;

/// Renders the per-epoch loss curve to a PNG file.
pub fn plot_loss_curve(history: &TrainingHistory, path: &Path) -> Result<()> {
    draw_loss_curve(history, path).map_err(|e| plot_error(path, e))
}

/// Renders twelve monthly predictions as a bar chart PNG.
pub fn plot_forecast(forecast: &YearForecast, path: &Path) -> Result<()> {
    draw_forecast(forecast, path).map_err(|e| plot_error(path, e))
}

fn plot_error(path: &Path, e: Box<dyn Error>) -> ForecastError {
    ForecastError::Plot {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

fn draw_loss_curve(history: &TrainingHistory, path: &Path) -> std::result::Result<(), Box<dyn Error>> {
    let root = BitMapBackend::new(path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let max_epoch = *history.epochs.last().unwrap_or(&1) as u32;
    let max_loss = history.losses.iter().cloned().fold(0.0, f64::max);
    let y_top = if max_loss > 0.0 { max_loss * 1.05 } else { 1.0 };

    let mut chart = ChartBuilder::on(&root)
        .caption("Training loss", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(1u32..max_epoch.max(2), 0f64..y_top)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc("Epoch")
        .y_desc("MSE (scaled)")
        .draw()?;

    chart
        .draw_series(LineSeries::new(
            history
                .epochs
                .iter()
                .zip(history.losses.iter())
                .map(|(&x, &y)| (x as u32, y)),
            &BLUE,
        ))?
        .label("Loss")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLUE));

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

fn draw_forecast(forecast: &YearForecast, path: &Path) -> std::result::Result<(), Box<dyn Error>> {
    let root = BitMapBackend::new(path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let lo = forecast.temperatures.iter().cloned().fold(0.0, f64::min) - 2.0;
    let hi = forecast.temperatures.iter().cloned().fold(0.0, f64::max) + 2.0;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("Predicted temperatures, {}", forecast.year),
            ("sans-serif", 30),
        )
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d((0u32..12u32).into_segmented(), lo..hi)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(12)
        .x_label_formatter(&|v| match v {
            SegmentValue::Exact(i) | SegmentValue::CenterOf(i) => MONTH_NAMES
                .get(*i as usize)
                .map(|m| m[..3].to_string())
                .unwrap_or_default(),
            SegmentValue::Last => String::new(),
        })
        .y_desc("Temperature, °C")
        .draw()?;

    chart.draw_series(forecast.temperatures.iter().enumerate().map(|(i, &t)| {
        let i = i as u32;
        let mut bar = Rectangle::new(
            [(SegmentValue::Exact(i), 0.0), (SegmentValue::Exact(i + 1), t)],
            BLUE.filled(),
        );
        bar.set_margin(0, 0, 5, 5);
        bar
    }))?;

    root.present()?;
    Ok(())
}
