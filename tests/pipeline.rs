use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use tempcast::prediction::export::export_forecast;
use tempcast::prediction::forecast::MONTH_NAMES;
use tempcast::training::trainer::Silent;
use tempcast::training::worker::{TrainingEvent, TrainingJob, TrainingWorker};
use tempcast::{
    forecast_year, train_model, ForecastError, ModelStatus, ModelStore, TrainingOptions,
    STANDARD_MODEL_ID,
};

/// Four readings a month for every month of `year`, all at `temp`.
fn write_constant_year(dir: &Path, year: i32, temp: f64) -> PathBuf {
    let mut csv = String::from("timestamp;T;Po\n");
    for month in 1..=12 {
        for day in [1, 8, 15, 22] {
            writeln!(csv, "{day:02}.{month:02}.{year} 12:00;{temp};745.0").unwrap();
        }
    }
    let path = dir.join("history.csv");
    fs::write(&path, csv).unwrap();
    path
}

fn train_and_save(store: &ModelStore, data: &Path, epochs: usize) {
    let outcome = train_model(
        store,
        STANDARD_MODEL_ID,
        data,
        &TrainingOptions::new(epochs),
        &mut Silent,
    )
    .unwrap();
    store
        .save(
            STANDARD_MODEL_ID,
            &outcome.network,
            &outcome.scalers.scaler_x,
            &outcome.scalers.scaler_y,
        )
        .unwrap();
}

#[test]
fn constant_year_is_predicted_back() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_constant_year(dir.path(), 2021, 12.5);
    let store = ModelStore::new(dir.path().join("models"));

    let outcome = train_model(
        &store,
        STANDARD_MODEL_ID,
        &data,
        &TrainingOptions::new(200),
        &mut Silent,
    )
    .unwrap();
    assert_eq!(outcome.history.len(), 200);
    assert!(outcome.evaluation.mae < 1.0);

    store
        .save(
            STANDARD_MODEL_ID,
            &outcome.network,
            &outcome.scalers.scaler_x,
            &outcome.scalers.scaler_y,
        )
        .unwrap();

    let forecast = forecast_year(&store, STANDARD_MODEL_ID, 2021).unwrap();
    for t in forecast.temperatures {
        assert!((t - 12.5).abs() < 0.5, "predicted {t}");
    }
}

#[test]
fn untrained_user_model_cannot_be_trained() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_constant_year(dir.path(), 2021, 3.0);
    let store = ModelStore::new(dir.path().join("models"));

    let err = train_model(&store, "removed-model", &data, &TrainingOptions::new(1), &mut Silent)
        .unwrap_err();
    assert!(matches!(err, ForecastError::ModelFileNotFound(id) if id == "removed-model"));
    assert!(matches!(store.status("removed-model"), ModelStatus::Orphaned));
}

#[test]
fn missing_data_file_surfaces_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = ModelStore::new(dir.path().join("models"));
    let err = train_model(
        &store,
        STANDARD_MODEL_ID,
        dir.path().join("nope.csv"),
        &TrainingOptions::new(1),
        &mut Silent,
    )
    .unwrap_err();
    assert!(matches!(err, ForecastError::Io(_)));
}

#[test]
fn export_for_2030_has_header_and_twelve_rows() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_constant_year(dir.path(), 2020, -4.0);
    let store = ModelStore::new(dir.path().join("models"));
    train_and_save(&store, &data, 5);

    let forecast = forecast_year(&store, STANDARD_MODEL_ID, 2030).unwrap();
    let written = export_forecast(&forecast, dir.path().join("forecast")).unwrap();
    assert_eq!(written.extension().unwrap(), "txt");

    let text = fs::read_to_string(written).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "Month;Temperature");
    assert_eq!(lines.len(), 13);
    for (line, month) in lines[1..].iter().zip(MONTH_NAMES) {
        let (name, value) = line.split_once(';').unwrap();
        assert_eq!(name, month);
        let decimals = value.split_once('.').map(|(_, d)| d.len());
        assert_eq!(decimals, Some(3), "value {value}");
        value.parse::<f64>().unwrap();
    }
}

#[test]
fn retraining_continues_from_stored_model() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_constant_year(dir.path(), 2022, 8.0);
    let store = ModelStore::new(dir.path().join("models"));
    train_and_save(&store, &data, 3);

    let before = store.load(STANDARD_MODEL_ID).unwrap().network.optimizer.steps();
    train_and_save(&store, &data, 3);
    let after = store.load(STANDARD_MODEL_ID).unwrap().network.optimizer.steps();
    assert!(after > before);
}

#[test]
fn worker_reports_progress_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_constant_year(dir.path(), 2021, 5.0);
    let store = ModelStore::new(dir.path().join("models"));

    let worker = TrainingWorker::spawn(
        store.clone(),
        TrainingJob {
            model_id: STANDARD_MODEL_ID.to_string(),
            data_path: data,
            options: TrainingOptions::new(4),
        },
    )
    .unwrap();

    let mut epochs = 0;
    let outcome = loop {
        match worker.events().recv().unwrap() {
            TrainingEvent::Epoch { .. } => epochs += 1,
            TrainingEvent::Finished(result) => break result.unwrap(),
        }
    };

    assert_eq!(epochs, 8);
    assert_eq!(outcome.history.len(), 4);
    assert!(store.has_model(STANDARD_MODEL_ID));
}

#[test]
fn cancelled_worker_saves_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let data = write_constant_year(dir.path(), 2021, 5.0);
    let store = ModelStore::new(dir.path().join("models"));

    let worker = TrainingWorker::spawn(
        store.clone(),
        TrainingJob {
            model_id: STANDARD_MODEL_ID.to_string(),
            data_path: data,
            options: TrainingOptions::new(1_000_000),
        },
    )
    .unwrap();
    worker.cancel();

    assert!(matches!(worker.wait(), Err(ForecastError::Cancelled)));
    assert!(!store.has_model(STANDARD_MODEL_ID));
}
