use ndarray::{Array2, Axis};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::path::Path;
use tracing::info;

use crate::data::aggregate::MonthlySample;
use crate::data::preprocessing::{load_monthly_samples, scale_monthly};
use crate::data::scaler::MinMaxScaler;
use crate::error::{ForecastError, Result};
use crate::model::network::{NeuralNetwork, DEFAULT_BATCH_SIZE};
use crate::registry::is_standard;
use crate::store::ModelStore;
use crate::training::history::TrainingHistory;
use crate::training::metrics::Evaluation;

pub const DEFAULT_TEST_FRACTION: f64 = 0.25;
pub const MIN_TRAINING_SAMPLES: usize = 2;

/// What happens after the evaluation pass.
///
/// `TestPartition` fits the network a second time on the held-out rows and
/// reports that fit's loss curve, which is how models have always been
/// trained here. `Skip` keeps the network from the first fit and reports its
/// curve instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Refit {
    #[default]
    TestPartition,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitPhase {
    Train,
    Refit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingOptions {
    pub epochs: usize,
    pub batch_size: usize,
    pub test_fraction: f64,
    pub refit: Refit,
}

impl TrainingOptions {
    pub fn new(epochs: usize) -> Self {
        Self {
            epochs,
            batch_size: DEFAULT_BATCH_SIZE,
            test_fraction: DEFAULT_TEST_FRACTION,
            refit: Refit::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FittedScalers {
    pub scaler_x: MinMaxScaler,
    pub scaler_y: MinMaxScaler,
}

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub history: TrainingHistory,
    pub network: NeuralNetwork,
    pub evaluation: Evaluation,
    pub scalers: FittedScalers,
}

/// Receives the loss after every epoch. `Break` cancels the run.
pub trait FitObserver {
    fn on_epoch_end(&mut self, phase: FitPhase, epoch: usize, loss: f64) -> ControlFlow<()>;
}

impl<F> FitObserver for F
where
    F: FnMut(FitPhase, usize, f64) -> ControlFlow<()>,
{
    fn on_epoch_end(&mut self, phase: FitPhase, epoch: usize, loss: f64) -> ControlFlow<()> {
        self(phase, epoch, loss)
    }
}

pub struct Silent;

impl FitObserver for Silent {
    fn on_epoch_end(&mut self, _: FitPhase, _: usize, _: f64) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

/// Network to train for `id`: the stored one, a fresh standard network, or an
/// error when a user model's file has disappeared.
pub fn resolve_network(store: &ModelStore, id: &str) -> Result<NeuralNetwork> {
    if store.has_model(id) {
        info!(model = id, "continuing training of stored model");
        store.load_network(id)
    } else if is_standard(id) {
        info!(model = id, "building standard network");
        Ok(NeuralNetwork::standard())
    } else {
        Err(ForecastError::ModelFileNotFound(id.to_string()))
    }
}

pub fn train_model<P: AsRef<Path>>(
    store: &ModelStore,
    id: &str,
    data_path: P,
    options: &TrainingOptions,
    observer: &mut dyn FitObserver,
) -> Result<TrainingOutcome> {
    let network = resolve_network(store, id)?;
    let samples = load_monthly_samples(data_path)?;
    train_on_samples(network, &samples, options, &mut rand::thread_rng(), observer)
}

/// Scales, splits, fits, evaluates and (by default) refits on the test rows.
pub fn train_on_samples<R: Rng + ?Sized>(
    mut network: NeuralNetwork,
    samples: &[MonthlySample],
    options: &TrainingOptions,
    rng: &mut R,
    observer: &mut dyn FitObserver,
) -> Result<TrainingOutcome> {
    if samples.len() < MIN_TRAINING_SAMPLES {
        return Err(ForecastError::InsufficientData {
            needed: MIN_TRAINING_SAMPLES,
            found: samples.len(),
        });
    }

    let scaled = scale_monthly(samples)?;
    let split = train_test_split(&scaled.x, &scaled.y, options.test_fraction, rng);
    info!(
        samples = samples.len(),
        train = split.x_train.nrows(),
        test = split.x_test.nrows(),
        epochs = options.epochs,
        "training started"
    );

    let first = network.fit(
        &split.x_train,
        &split.y_train,
        options.epochs,
        options.batch_size,
        rng,
        |epoch, loss| observer.on_epoch_end(FitPhase::Train, epoch, loss),
    )?;

    let predictions = network.predict(&split.x_test)?;
    let y_pred = scaled.scaler_y.inverse_transform(&predictions)?;
    let y_true = scaled.scaler_y.inverse_transform(&split.y_test)?;
    let evaluation = Evaluation::compute(&y_true, &y_pred);
    info!(mae = evaluation.mae, mse = evaluation.mse, "evaluated on test partition");

    let losses = match options.refit {
        Refit::TestPartition => network.fit(
            &split.x_test,
            &split.y_test,
            options.epochs,
            options.batch_size,
            rng,
            |epoch, loss| observer.on_epoch_end(FitPhase::Refit, epoch, loss),
        )?,
        Refit::Skip => first,
    };

    let history = TrainingHistory::from_losses(losses);
    info!(final_loss = ?history.final_loss(), "training finished");

    Ok(TrainingOutcome {
        history,
        network,
        evaluation,
        scalers: FittedScalers {
            scaler_x: scaled.scaler_x,
            scaler_y: scaled.scaler_y,
        },
    })
}

pub struct Split {
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Array2<f64>,
    pub y_test: Array2<f64>,
}

/// Random partition with `ceil(test_fraction * n)` test rows.
///
/// For two or more rows both sides are non-empty.
pub fn train_test_split<R: Rng + ?Sized>(
    x: &Array2<f64>,
    y: &Array2<f64>,
    test_fraction: f64,
    rng: &mut R,
) -> Split {
    let n = x.nrows();
    let mut n_test = (test_fraction * n as f64).ceil() as usize;
    if n >= 2 {
        n_test = n_test.clamp(1, n - 1);
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(rng);
    let (test_idx, train_idx) = order.split_at(n_test.min(n));

    Split {
        x_train: x.select(Axis(0), train_idx),
        x_test: x.select(Axis(0), test_idx),
        y_train: y.select(Axis(0), train_idx),
        y_test: y.select(Axis(0), test_idx),
    }
}
