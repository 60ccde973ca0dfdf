pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod prediction;
pub mod registry;
pub mod store;
pub mod telemetry;
pub mod training;
pub mod utils;

use std::ffi::CStr;
use std::ops::ControlFlow;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use tracing::{error, info};

use error::panic_message;
pub use error::{ForecastError, Result};
pub use prediction::forecast::{forecast_year, YearForecast};
pub use registry::{ModelCatalog, ModelRegistry, STANDARD_MODEL_ID};
pub use store::{ModelStatus, ModelStore, TrainedModel};
pub use training::trainer::{train_model, FitPhase, TrainingOptions, TrainingOutcome};

/// Called after every epoch. `phase` is 0 for the training fit, 1 for the refit.
pub type ProgressCallback = extern "C" fn(phase: i32, epoch: i32, loss: f64);

unsafe fn c_str<'a>(ptr: *const libc::c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok()
}

/// Runs `body` and turns a panic into `false` so it never unwinds into the caller.
fn guarded<F: FnOnce() -> bool>(entry: &str, body: F) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(ok) => ok,
        Err(payload) => {
            error!(entry, panic = %panic_message(&*payload), "panic stopped at the C boundary");
            false
        }
    }
}

/// Trains `model_id` on `csv_path` and saves the artifacts into `models_dir`.
///
/// `mae`/`mse` receive the evaluation metrics, `plot_path` (nullable) receives a
/// loss-curve PNG. Returns false on any failure; the reason is logged.
#[unsafe(no_mangle)]
pub extern "C" fn tempcast_train_model(
    models_dir: *const libc::c_char,
    model_id: *const libc::c_char,
    csv_path: *const libc::c_char,
    epochs: i32,
    plot_path: *const libc::c_char,
    mae: *mut f64,
    mse: *mut f64,
    callback: Option<ProgressCallback>,
) -> bool {
    guarded("tempcast_train_model", || unsafe {
        train_and_save(models_dir, model_id, csv_path, epochs, plot_path, mae, mse, callback)
    })
}

#[allow(clippy::too_many_arguments)]
unsafe fn train_and_save(
    models_dir: *const libc::c_char,
    model_id: *const libc::c_char,
    csv_path: *const libc::c_char,
    epochs: i32,
    plot_path: *const libc::c_char,
    mae: *mut f64,
    mse: *mut f64,
    callback: Option<ProgressCallback>,
) -> bool {
    let (models_dir, model_id, csv_path, plot_path) = unsafe {
        match (c_str(models_dir), c_str(model_id), c_str(csv_path)) {
            (Some(d), Some(id), Some(csv)) => (d, id, csv, c_str(plot_path)),
            _ => {
                error!("train called with a null or non UTF-8 argument");
                return false;
            }
        }
    };

    let store = ModelStore::new(models_dir);
    let options = TrainingOptions::new(epochs.max(0) as usize);
    let mut observer = |phase: FitPhase, epoch: usize, loss: f64| {
        if let Some(cb) = callback {
            let phase = match phase {
                FitPhase::Train => 0,
                FitPhase::Refit => 1,
            };
            cb(phase, epoch as i32 + 1, loss);
        }
        ControlFlow::Continue(())
    };

    let outcome = match train_model(&store, model_id, csv_path, &options, &mut observer) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(model = model_id, error = %e, "training failed");
            return false;
        }
    };

    if let Err(e) = store.save(
        model_id,
        &outcome.network,
        &outcome.scalers.scaler_x,
        &outcome.scalers.scaler_y,
    ) {
        error!(model = model_id, error = %e, "saving trained model failed");
        return false;
    }

    if let Some(plot_path) = plot_path {
        if let Err(e) = utils::plot::plot_loss_curve(&outcome.history, Path::new(plot_path)) {
            error!(error = %e, "loss curve not rendered");
        }
    }

    unsafe {
        if !mae.is_null() {
            *mae = outcome.evaluation.mae;
        }
        if !mse.is_null() {
            *mse = outcome.evaluation.mse;
        }
    }
    info!(model = model_id, mae = outcome.evaluation.mae, "model trained through C API");
    true
}

/// Writes twelve monthly predictions for `year` into `out` (length 12).
/// Returns false when the model is untrained or an argument is invalid.
#[unsafe(no_mangle)]
pub extern "C" fn tempcast_predict_year(
    models_dir: *const libc::c_char,
    model_id: *const libc::c_char,
    year: i32,
    out: *mut f64,
) -> bool {
    guarded("tempcast_predict_year", || unsafe { predict_into(models_dir, model_id, year, out) })
}

unsafe fn predict_into(
    models_dir: *const libc::c_char,
    model_id: *const libc::c_char,
    year: i32,
    out: *mut f64,
) -> bool {
    if out.is_null() {
        return false;
    }
    let (models_dir, model_id) = unsafe {
        match (c_str(models_dir), c_str(model_id)) {
            (Some(d), Some(id)) => (d, id),
            _ => return false,
        }
    };

    match forecast_year(&ModelStore::new(models_dir), model_id, year) {
        Ok(forecast) => {
            let out = unsafe { std::slice::from_raw_parts_mut(out, 12) };
            out.copy_from_slice(&forecast.temperatures);
            true
        }
        Err(e) => {
            error!(model = model_id, year, error = %e, "prediction failed");
            false
        }
    }
}

/// Removes the artifact set of `model_id`. Missing files are not an error.
#[unsafe(no_mangle)]
pub extern "C" fn tempcast_delete_model(
    models_dir: *const libc::c_char,
    model_id: *const libc::c_char,
) -> bool {
    guarded("tempcast_delete_model", || {
        let (models_dir, model_id) = unsafe {
            match (c_str(models_dir), c_str(model_id)) {
                (Some(d), Some(id)) => (d, id),
                _ => return false,
            }
        };
        ModelStore::new(models_dir).delete(model_id).is_ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn predicting_untrained_model_returns_false() {
        let dir = tempfile::tempdir().unwrap();
        let dir_c = CString::new(dir.path().to_str().unwrap()).unwrap();
        let id = CString::new(STANDARD_MODEL_ID).unwrap();
        let mut out = [0.0f64; 12];
        assert!(!tempcast_predict_year(dir_c.as_ptr(), id.as_ptr(), 2030, out.as_mut_ptr()));
    }

    #[test]
    fn null_arguments_are_rejected() {
        let mut out = [0.0f64; 12];
        assert!(!tempcast_predict_year(std::ptr::null(), std::ptr::null(), 2030, out.as_mut_ptr()));
        assert!(!tempcast_delete_model(std::ptr::null(), std::ptr::null()));
    }

    #[test]
    fn panic_inside_entry_point_becomes_false() {
        assert!(!guarded("test_entry", || panic!("shape mismatch")));
        assert!(guarded("test_entry", || true));
    }

    #[test]
    fn training_on_missing_file_returns_false_and_leaves_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let dir_c = CString::new(dir.path().to_str().unwrap()).unwrap();
        let id = CString::new(STANDARD_MODEL_ID).unwrap();
        let csv = CString::new(dir.path().join("absent.csv").to_str().unwrap()).unwrap();
        let (mut mae, mut mse) = (-1.0, -1.0);

        let ok = tempcast_train_model(
            dir_c.as_ptr(),
            id.as_ptr(),
            csv.as_ptr(),
            5,
            std::ptr::null(),
            &mut mae,
            &mut mse,
            None,
        );

        assert!(!ok);
        assert_eq!((mae, mse), (-1.0, -1.0));
    }

    #[test]
    fn delete_of_missing_model_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let dir_c = CString::new(dir.path().to_str().unwrap()).unwrap();
        let id = CString::new("nothing-here").unwrap();
        assert!(tempcast_delete_model(dir_c.as_ptr(), id.as_ptr()));
    }
}
