//! Parameter snapshots on disk.
//!
//! Each snapshot is a directory `model_dir/step{N}` holding one
//! `<artifact>.bin` blob per named parameter group (`encoder`, `decoder`,
//! `latent_model`, `actor`, `critic`). Blobs are burn records encoded with
//! `BinBytesRecorder<FullPrecisionSettings>`.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use burn::module::{Module, ModuleMapper, Param};
use burn::record::{BinBytesRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use thiserror::Error;

use crate::error::SlacError;

const ARTIFACT_EXTENSION: &str = "bin";
const STEP_PREFIX: &str = "step";
const BEST_DIR: &str = "best";

/// Error type for checkpointing operations.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("recorder error: {0}")]
    Recorder(String),

    #[error("no checkpoints found in {0}")]
    NoCheckpoints(PathBuf),
}

/// Configuration for the checkpointer.
#[derive(Debug, Clone)]
pub struct CheckpointerConfig {
    /// Root directory; snapshots land in `step{N}` subdirectories.
    pub model_dir: PathBuf,
    /// Number of recent snapshots to keep (0 = keep all).
    pub keep_last_n: usize,
    /// Also mirror the snapshot with the highest metric into `best/`.
    pub save_best: bool,
}

impl Default for CheckpointerConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("./model"),
            keep_last_n: 0,
            save_best: false,
        }
    }
}

impl CheckpointerConfig {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_keep_last_n(mut self, n: usize) -> Self {
        self.keep_last_n = n;
        self
    }

    pub fn with_save_best(mut self, save_best: bool) -> Self {
        self.save_best = save_best;
        self
    }
}

/// Named parameter blobs captured at one point of training.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSnapshot {
    artifacts: BTreeMap<String, Vec<u8>>,
}

impl ParameterSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.artifacts.insert(name.into(), bytes);
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.artifacts.get(name).map(Vec::as_slice)
    }

    /// Artifact names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.artifacts.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.artifacts
            .iter()
            .map(|(name, bytes)| (name.as_str(), bytes.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

/// Snapshot metadata.
#[derive(Debug, Clone)]
pub struct CheckpointInfo {
    /// The `step{N}` directory.
    pub path: PathBuf,
    pub step: usize,
    /// Optional metric value (evaluation return).
    pub metric: Option<f32>,
}

/// Writes, lists and prunes snapshot directories.
pub struct Checkpointer {
    config: CheckpointerConfig,
    best_metric: f32,
    checkpoint_history: Vec<CheckpointInfo>,
}

impl Checkpointer {
    /// Creates the model directory if it doesn't exist.
    pub fn new(config: CheckpointerConfig) -> Result<Self, CheckpointError> {
        fs::create_dir_all(&config.model_dir)?;

        Ok(Self {
            config,
            best_metric: f32::NEG_INFINITY,
            checkpoint_history: Vec::new(),
        })
    }

    pub fn config(&self) -> &CheckpointerConfig {
        &self.config
    }

    /// Directory a snapshot for `step` is written to.
    pub fn step_dir(&self, step: usize) -> PathBuf {
        self.config.model_dir.join(format!("{}{}", STEP_PREFIX, step))
    }

    /// Write every artifact of `snapshot` into `step{N}/`.
    pub fn save(
        &mut self,
        snapshot: &ParameterSnapshot,
        step: usize,
        metric: Option<f32>,
    ) -> Result<PathBuf, CheckpointError> {
        let path = self.step_dir(step);
        write_snapshot(&path, snapshot)?;
        log::debug!("saved {} artifacts to {}", snapshot.len(), path.display());

        // Only needed for pruning.
        if self.config.keep_last_n > 0 {
            self.checkpoint_history.push(CheckpointInfo {
                path: path.clone(),
                step,
                metric,
            });
        }

        if self.config.save_best {
            if let Some(m) = metric {
                if m > self.best_metric {
                    self.best_metric = m;
                    write_snapshot(&self.config.model_dir.join(BEST_DIR), snapshot)?;
                }
            }
        }

        self.cleanup_old_checkpoints()?;

        Ok(path)
    }

    /// Read every `*.bin` artifact in a snapshot directory.
    pub fn load(&self, path: &Path) -> Result<ParameterSnapshot, CheckpointError> {
        read_snapshot(path)
    }

    /// Load the snapshot saved under `best/`.
    pub fn load_best(&self) -> Result<ParameterSnapshot, CheckpointError> {
        let best = self.config.model_dir.join(BEST_DIR);
        if !best.is_dir() {
            return Err(CheckpointError::NoCheckpoints(self.config.model_dir.clone()));
        }
        read_snapshot(&best)
    }

    /// Load the snapshot with the highest step and return it with that step.
    pub fn load_latest(&self) -> Result<(ParameterSnapshot, usize), CheckpointError> {
        let latest = self
            .list_checkpoints()?
            .pop()
            .ok_or_else(|| CheckpointError::NoCheckpoints(self.config.model_dir.clone()))?;
        Ok((read_snapshot(&latest.path)?, latest.step))
    }

    /// All `step{N}` directories, sorted by step.
    pub fn list_checkpoints(&self) -> Result<Vec<CheckpointInfo>, CheckpointError> {
        let mut checkpoints: Vec<CheckpointInfo> = fs::read_dir(&self.config.model_dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let path = e.path();
                if !path.is_dir() {
                    return None;
                }
                let step = path
                    .file_name()?
                    .to_str()?
                    .strip_prefix(STEP_PREFIX)?
                    .parse()
                    .ok()?;
                Some(CheckpointInfo {
                    path,
                    step,
                    metric: None,
                })
            })
            .collect();

        checkpoints.sort_by_key(|c| c.step);
        Ok(checkpoints)
    }

    pub fn best_metric(&self) -> f32 {
        self.best_metric
    }

    /// Snapshots this checkpointer may still prune, oldest first.
    pub fn tracked(&self) -> &[CheckpointInfo] {
        &self.checkpoint_history
    }

    /// Keep only the last N snapshots written by this checkpointer.
    fn cleanup_old_checkpoints(&mut self) -> Result<(), CheckpointError> {
        if self.config.keep_last_n == 0 {
            return Ok(());
        }

        while self.checkpoint_history.len() > self.config.keep_last_n {
            let old = self.checkpoint_history.remove(0);
            if old.path.exists() {
                fs::remove_dir_all(&old.path)?;
            }
        }

        Ok(())
    }
}

/// Read one artifact blob from a file, e.g. a warm-start path.
pub fn read_artifact(path: &Path) -> Result<Vec<u8>, CheckpointError> {
    Ok(fs::read(path)?)
}

fn write_snapshot(dir: &Path, snapshot: &ParameterSnapshot) -> Result<(), CheckpointError> {
    fs::create_dir_all(dir)?;
    for (name, bytes) in snapshot.iter() {
        fs::write(dir.join(name).with_extension(ARTIFACT_EXTENSION), bytes)?;
    }
    Ok(())
}

fn read_snapshot(dir: &Path) -> Result<ParameterSnapshot, CheckpointError> {
    let mut snapshot = ParameterSnapshot::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(ARTIFACT_EXTENSION) {
            continue;
        }
        if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
            snapshot.insert(name, fs::read(&path)?);
        }
    }
    Ok(snapshot)
}

// ============================================================================
// Module <-> bytes
// ============================================================================

/// Encode a module's parameters as a full-precision binary record.
pub fn module_to_bytes<B: Backend, M: Module<B>>(module: &M) -> Result<Vec<u8>, CheckpointError> {
    BinBytesRecorder::<FullPrecisionSettings>::default()
        .record(module.clone().into_record(), ())
        .map_err(|e| CheckpointError::Recorder(e.to_string()))
}

/// Shapes of every float parameter, in traversal order.
struct ParamShapes {
    shapes: Vec<Vec<usize>>,
}

impl<B: Backend> ModuleMapper<B> for ParamShapes {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        self.shapes.push(param.val().dims().to_vec());
        param
    }
}

fn param_shapes<B: Backend, M: Module<B>>(module: &M) -> Vec<Vec<usize>> {
    let mut collector = ParamShapes { shapes: Vec::new() };
    let _ = module.clone().map(&mut collector);
    collector.shapes
}

/// Load `bytes` into `template`.
///
/// Every decoded parameter must have the shape of the matching template
/// parameter, otherwise the blob belongs to a different network.
pub fn module_from_bytes<B: Backend, M: Module<B>>(
    template: M,
    name: &str,
    bytes: &[u8],
    device: &B::Device,
) -> Result<M, SlacError> {
    let expected = param_shapes::<B, _>(&template);
    let record = BinBytesRecorder::<FullPrecisionSettings>::default()
        .load(bytes.to_vec(), device)
        .map_err(|e| SlacError::Restore {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
    let loaded = template.load_record(record);
    let actual = param_shapes::<B, _>(&loaded);
    if actual.len() != expected.len() {
        return Err(SlacError::Restore {
            name: name.to_string(),
            reason: format!("expected {} tensors, found {}", expected.len(), actual.len()),
        });
    }
    if let Some((index, (want, got))) = expected
        .iter()
        .zip(&actual)
        .enumerate()
        .find(|(_, (want, got))| want != got)
    {
        return Err(SlacError::Restore {
            name: name.to_string(),
            reason: format!("parameter {} has shape {:?}, expected {:?}", index, got, want),
        });
    }
    Ok(loaded)
}
