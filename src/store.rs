//! On-disk artifact sets: one network file and two scaler files per model.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::data::scaler::MinMaxScaler;
use crate::error::{ForecastError, Result};
use crate::model::network::{NeuralNetwork, STANDARD_INPUT_SIZE};
use crate::registry::{is_standard, new_model_id};
use crate::utils::io;

pub const ARTIFACT_EXTENSION: &str = "bin";
const SCALER_X_PREFIX: &str = "scaler_X";
const SCALER_Y_PREFIX: &str = "scaler_Y";
const EXPORT_SCALER_X_PREFIX: &str = "Scaler_X";
const EXPORT_SCALER_Y_PREFIX: &str = "Scaler_Y";

/// A network with the scalers it was trained with. Absent scalers mean identity.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub network: NeuralNetwork,
    pub scaler_x: Option<MinMaxScaler>,
    pub scaler_y: Option<MinMaxScaler>,
}

#[derive(Debug, Clone)]
pub enum ModelStatus {
    Available(TrainedModel),
    /// The standard model before its first training run.
    Untrained,
    /// A registered user model whose network file is gone.
    Orphaned,
}

#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_directory(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    pub fn model_path(&self, id: &str) -> PathBuf {
        self.artifact_path("", id)
    }

    pub fn scaler_x_path(&self, id: &str) -> PathBuf {
        self.artifact_path(SCALER_X_PREFIX, id)
    }

    pub fn scaler_y_path(&self, id: &str) -> PathBuf {
        self.artifact_path(SCALER_Y_PREFIX, id)
    }

    fn artifact_path(&self, prefix: &str, id: &str) -> PathBuf {
        self.dir
            .join(format!("{prefix}{id}.{ARTIFACT_EXTENSION}"))
    }

    pub fn has_model(&self, id: &str) -> bool {
        self.model_path(id).is_file()
    }

    /// Loads the artifact set for `id`.
    ///
    /// A missing network file, or any failure while reading one of the files,
    /// yields `None`; the cause is logged.
    pub fn load(&self, id: &str) -> Option<TrainedModel> {
        let model_path = self.model_path(id);
        if !model_path.is_file() {
            warn!(model = id, "model files are missing");
            return None;
        }

        match self.read_artifacts(id, &model_path) {
            Ok(model) => Some(model),
            Err(e) => {
                warn!(model = id, error = %e, "failed to load model");
                None
            }
        }
    }

    fn read_artifacts(&self, id: &str, model_path: &Path) -> Result<TrainedModel> {
        let network: NeuralNetwork = io::load(model_path)?;
        let scaler_x = read_optional(&self.scaler_x_path(id))?;
        let scaler_y = read_optional(&self.scaler_y_path(id))?;
        Ok(TrainedModel {
            network,
            scaler_x,
            scaler_y,
        })
    }

    /// Reads only the network, surfacing any failure. Used when training resumes
    /// an existing model.
    pub fn load_network(&self, id: &str) -> Result<NeuralNetwork> {
        let path = self.model_path(id);
        if !path.is_file() {
            return Err(ForecastError::ModelFileNotFound(id.to_string()));
        }
        io::load(&path)
    }

    pub fn status(&self, id: &str) -> ModelStatus {
        match self.load(id) {
            Some(model) => ModelStatus::Available(model),
            None if is_standard(id) => ModelStatus::Untrained,
            None => ModelStatus::Orphaned,
        }
    }

    /// Writes all three artifacts, each through a temp file and rename.
    pub fn save(
        &self,
        id: &str,
        network: &NeuralNetwork,
        scaler_x: &MinMaxScaler,
        scaler_y: &MinMaxScaler,
    ) -> Result<()> {
        self.ensure_directory()?;
        io::save_atomic(&self.model_path(id), network)?;
        io::save_atomic(&self.scaler_x_path(id), scaler_x)?;
        io::save_atomic(&self.scaler_y_path(id), scaler_y)?;
        info!(model = id, dir = %self.dir.display(), "model saved");
        Ok(())
    }

    /// Removes every artifact of `id` that exists.
    pub fn delete(&self, id: &str) -> Result<()> {
        let mut removed = 0;
        for path in [self.model_path(id), self.scaler_x_path(id), self.scaler_y_path(id)] {
            if io::remove_if_exists(&path)? {
                removed += 1;
            }
        }
        info!(model = id, removed, "model files deleted");
        Ok(())
    }

    /// Copies an external network file into the store under a fresh id.
    ///
    /// The network must map (year, month) to one temperature.
    pub fn import<P: AsRef<Path>>(&self, source: P) -> Result<String> {
        let network: NeuralNetwork = io::load(source.as_ref())?;
        let (inputs, outputs) = (network.input_size(), network.output_size());
        if inputs != STANDARD_INPUT_SIZE || outputs != 1 {
            return Err(ForecastError::IncompatibleModel { inputs, outputs });
        }
        let id = new_model_id();
        self.ensure_directory()?;
        io::save_atomic(&self.model_path(&id), &network)?;
        info!(model = %id, source = %source.as_ref().display(), "model imported");
        Ok(id)
    }

    /// Writes the network to `target` and the scalers next to it as
    /// `Scaler_X<file>` / `Scaler_Y<file>`. Returns the network path written.
    pub fn export<P: AsRef<Path>>(&self, id: &str, target: P) -> Result<PathBuf> {
        let model = self
            .load(id)
            .ok_or_else(|| ForecastError::Untrained(id.to_string()))?;

        let mut target = target.as_ref().to_path_buf();
        if target.extension().and_then(|e| e.to_str()) != Some(ARTIFACT_EXTENSION) {
            let mut name = target.file_name().map(|n| n.to_os_string()).unwrap_or_default();
            name.push(".");
            name.push(ARTIFACT_EXTENSION);
            target.set_file_name(name);
        }
        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        io::save_atomic(&target, &model.network)?;
        if let Some(scaler_x) = &model.scaler_x {
            io::save_atomic(
                &target.with_file_name(format!("{EXPORT_SCALER_X_PREFIX}{file_name}")),
                scaler_x,
            )?;
        }
        if let Some(scaler_y) = &model.scaler_y {
            io::save_atomic(
                &target.with_file_name(format!("{EXPORT_SCALER_Y_PREFIX}{file_name}")),
                scaler_y,
            )?;
        }
        info!(model = id, target = %target.display(), "model exported");
        Ok(target)
    }
}

fn read_optional(path: &Path) -> Result<Option<MinMaxScaler>> {
    if path.is_file() {
        Ok(Some(io::load(path)?))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::activation::Activation;
    use ndarray::array;

    fn scalers() -> (MinMaxScaler, MinMaxScaler) {
        (
            MinMaxScaler::fit(&array![[2000.0, 1.0], [2001.0, 12.0]]).unwrap(),
            MinMaxScaler::fit(&array![[-10.0], [25.0]]).unwrap(),
        )
    }

    #[test]
    fn artifact_names_share_the_id() {
        let store = ModelStore::new("models");
        assert_eq!(store.model_path("abc"), PathBuf::from("models/abc.bin"));
        assert_eq!(store.scaler_x_path("abc"), PathBuf::from("models/scaler_Xabc.bin"));
        assert_eq!(store.scaler_y_path("abc"), PathBuf::from("models/scaler_Yabc.bin"));
    }

    #[test]
    fn save_then_load_restores_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        let (sx, sy) = scalers();
        let network = NeuralNetwork::standard();

        store.save("m", &network, &sx, &sy).unwrap();
        let loaded = store.load("m").expect("model present");

        assert_eq!(loaded.scaler_x, Some(sx));
        assert_eq!(loaded.scaler_y, Some(sy));
        assert_eq!(loaded.network.layers[0].weights, network.layers[0].weights);
    }

    #[test]
    fn missing_scalers_load_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        let (sx, sy) = scalers();
        store.save("m", &NeuralNetwork::standard(), &sx, &sy).unwrap();
        fs::remove_file(store.scaler_y_path("m")).unwrap();

        let loaded = store.load("m").unwrap();
        assert!(loaded.scaler_x.is_some());
        assert!(loaded.scaler_y.is_none());
    }

    #[test]
    fn corrupt_model_collapses_to_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        fs::write(store.model_path("bad"), b"not a network").unwrap();
        assert!(store.load("bad").is_none());
    }

    #[test]
    fn status_distinguishes_untrained_and_orphaned() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        assert!(matches!(store.status("standard"), ModelStatus::Untrained));
        assert!(matches!(store.status("gone"), ModelStatus::Orphaned));

        let (sx, sy) = scalers();
        store.save("gone", &NeuralNetwork::standard(), &sx, &sy).unwrap();
        assert!(matches!(store.status("gone"), ModelStatus::Available(_)));
    }

    #[test]
    fn import_assigns_fresh_id() {
        let dir = tempfile::tempdir().unwrap();
        let external = dir.path().join("external.bin");
        io::save_atomic(&external, &NeuralNetwork::standard()).unwrap();

        let store = ModelStore::new(dir.path().join("models"));
        let id = store.import(&external).unwrap();
        assert!(store.has_model(&id));
        assert!(store.load(&id).unwrap().scaler_x.is_none());
    }

    #[test]
    fn import_rejects_mismatched_network_shape() {
        let dir = tempfile::tempdir().unwrap();
        let external = dir.path().join("wide.bin");
        let wide = NeuralNetwork::new(3, &[(8, Activation::Relu), (2, Activation::Linear)], 0.01);
        io::save_atomic(&external, &wide).unwrap();

        let store = ModelStore::new(dir.path().join("models"));
        let err = store.import(&external).unwrap_err();
        assert!(matches!(err, ForecastError::IncompatibleModel { inputs: 3, outputs: 2 }));
        assert_eq!(fs::read_dir(store.dir()).map(|d| d.count()).unwrap_or(0), 0);
    }

    #[test]
    fn export_writes_network_and_prefixed_scalers() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("models"));
        let (sx, sy) = scalers();
        store.save("m", &NeuralNetwork::standard(), &sx, &sy).unwrap();

        let written = store.export("m", dir.path().join("backup")).unwrap();
        assert_eq!(written, dir.path().join("backup.bin"));
        assert!(dir.path().join("Scaler_Xbackup.bin").is_file());
        assert!(dir.path().join("Scaler_Ybackup.bin").is_file());
    }
}
