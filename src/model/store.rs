//! JSON persistence of trained models, one file per (region, target)

use super::{ModelMetrics, TrainedModel};
use crate::error::{ForecastError, Result};
use crate::types::ModelKey;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

const MODEL_FILE_SUFFIX: &str = "_model.json";

/// Directory-backed model store
#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
}

/// What `list` reports about a stored model without deserializing the regressor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub key: ModelKey,
    pub trained_at: Option<String>,
    pub metrics: Option<ModelMetrics>,
    pub path: PathBuf,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `{dir}/{region}_{target}_model.json`
    pub fn path_for(&self, key: &ModelKey) -> PathBuf {
        self.dir.join(format!("{}{}", key.file_stem(), MODEL_FILE_SUFFIX))
    }

    pub fn save<M: Serialize>(&self, model: &TrainedModel<M>) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&model.key);
        let writer = BufWriter::new(fs::File::create(&path)?);
        serde_json::to_writer_pretty(writer, model)?;
        log::info!("Saved model {} to {:?}", model.key, path);
        Ok(path)
    }

    /// Load the model stored for `key`; `Ok(None)` when no file exists
    pub fn load<M: DeserializeOwned>(&self, key: &ModelKey) -> Result<Option<TrainedModel<M>>> {
        let path = self.path_for(key);
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::warn!("No stored model for {} at {:?}", key, path);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let model: TrainedModel<M> = serde_json::from_reader(BufReader::new(file))?;
        if &model.key != key {
            return Err(ForecastError::DataError(format!(
                "Model file {:?} holds {} instead of {}",
                path, model.key, key
            )));
        }

        log::info!("Loaded model {} from {:?}", key, path);
        Ok(Some(model))
    }

    pub fn exists(&self, key: &ModelKey) -> bool {
        self.path_for(key).is_file()
    }

    /// Summaries of every model file in the store, sorted by key
    pub fn list(&self) -> Result<Vec<ModelSummary>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut summaries = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_model = path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.ends_with(MODEL_FILE_SUFFIX));
            if !is_model {
                continue;
            }

            let contents = fs::read_to_string(&path)?;
            let value: serde_json::Value = match serde_json::from_str(&contents) {
                Ok(value) => value,
                Err(e) => {
                    log::warn!("Skipping unreadable model file {:?}: {}", path, e);
                    continue;
                }
            };

            let Some(key) = value
                .get("key")
                .and_then(|k| serde_json::from_value::<ModelKey>(k.clone()).ok())
            else {
                log::warn!("Skipping model file without a key: {:?}", path);
                continue;
            };

            summaries.push(ModelSummary {
                key,
                trained_at: value
                    .get("trained_at")
                    .and_then(|t| t.as_str())
                    .map(str::to_string),
                metrics: value
                    .get("metrics")
                    .and_then(|m| serde_json::from_value(m.clone()).ok()),
                path,
            });
        }

        summaries.sort_by(|a, b| {
            (a.key.region.as_str(), a.key.target).cmp(&(b.key.region.as_str(), b.key.target))
        });
        Ok(summaries)
    }
}
