use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{info, warn};

use super::trainer::{train_model, FitPhase, TrainingOptions, TrainingOutcome};
use crate::error::{panic_message, ForecastError, Result};
use crate::store::ModelStore;

#[derive(Debug, Clone)]
pub struct TrainingJob {
    pub model_id: String,
    pub data_path: PathBuf,
    pub options: TrainingOptions,
}

#[derive(Debug)]
pub enum TrainingEvent {
    Epoch {
        phase: FitPhase,
        epoch: usize,
        loss: f64,
    },
    /// Last message of a run. On success the artifacts are already saved.
    Finished(Result<TrainingOutcome>),
}

/// Runs one training job on its own thread.
///
/// Progress flows one way, worker to caller. Cancellation is checked between
/// epochs.
pub struct TrainingWorker {
    events: Receiver<TrainingEvent>,
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TrainingWorker {
    pub fn spawn(store: ModelStore, job: TrainingJob) -> Result<Self> {
        let name = format!("train-{}", job.model_id);
        Self::spawn_with(name, move |cancel, tx| run_job(&store, &job, cancel, tx))
    }

    fn spawn_with<F>(name: String, body: F) -> Result<Self>
    where
        F: FnOnce(&AtomicBool, &Sender<TrainingEvent>) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);

        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || body(&flag, &tx))?;

        Ok(Self {
            events: rx,
            cancel,
            handle: Some(handle),
        })
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn events(&self) -> &Receiver<TrainingEvent> {
        &self.events
    }

    pub fn try_next(&self) -> Option<TrainingEvent> {
        self.events.try_recv().ok()
    }

    /// Blocks until the job finishes, discarding progress events.
    ///
    /// A panic on the training thread is reported as [`ForecastError::Worker`].
    pub fn wait(mut self) -> Result<TrainingOutcome> {
        let finished = loop {
            match self.events.recv() {
                Ok(TrainingEvent::Finished(result)) => break Some(result),
                Ok(TrainingEvent::Epoch { .. }) => continue,
                Err(_) => break None,
            }
        };
        let joined = match self.handle.take() {
            Some(handle) => handle.join(),
            None => Ok(()),
        };

        match (finished, joined) {
            (Some(result), _) => result,
            (None, Err(payload)) => {
                let message = panic_message(&*payload);
                warn!(error = %message, "training thread panicked");
                Err(ForecastError::Worker(message))
            }
            (None, Ok(())) => Err(ForecastError::Worker(
                "thread exited without reporting a result".to_string(),
            )),
        }
    }
}

impl Drop for TrainingWorker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.cancel();
            let _ = handle.join();
        }
    }
}

fn run_job(store: &ModelStore, job: &TrainingJob, cancel: &AtomicBool, tx: &Sender<TrainingEvent>) {
    info!(model = %job.model_id, data = %job.data_path.display(), "background training started");

    let mut observer = |phase: FitPhase, epoch: usize, loss: f64| {
        // A closed channel means nobody is listening any more.
        if tx.send(TrainingEvent::Epoch { phase, epoch, loss }).is_err()
            || cancel.load(Ordering::Relaxed)
        {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    };

    let result = train_model(store, &job.model_id, &job.data_path, &job.options, &mut observer)
        .and_then(|outcome| {
            store.save(
                &job.model_id,
                &outcome.network,
                &outcome.scalers.scaler_x,
                &outcome.scalers.scaler_y,
            )?;
            Ok(outcome)
        });

    if let Err(e) = &result {
        warn!(model = %job.model_id, error = %e, "background training failed");
    }
    let _ = tx.send(TrainingEvent::Finished(result));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panicking_job_surfaces_worker_error() {
        let worker = TrainingWorker::spawn_with("train-panics".to_string(), |_, _| {
            panic!("layer shapes disagree");
        })
        .unwrap();

        match worker.wait() {
            Err(ForecastError::Worker(message)) => assert!(message.contains("layer shapes disagree")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn silent_exit_is_not_mistaken_for_io_failure() {
        let worker = TrainingWorker::spawn_with("train-silent".to_string(), |_, _| {}).unwrap();
        assert!(matches!(worker.wait(), Err(ForecastError::Worker(_))));
    }

    #[test]
    fn cancel_flag_reaches_the_job() {
        let worker = TrainingWorker::spawn_with("train-cancel".to_string(), |cancel, tx| {
            while !cancel.load(Ordering::Relaxed) {
                std::thread::yield_now();
            }
            let _ = tx.send(TrainingEvent::Finished(Err(ForecastError::Cancelled)));
        })
        .unwrap();
        worker.cancel();
        assert!(matches!(worker.wait(), Err(ForecastError::Cancelled)));
    }
}
