//! Per-(user, angle) sessions: one baseline, then aligned scans numbered from 1.

use std::collections::HashMap;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageError, RgbImage};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use rescan_core::AlignConfig;
use rescan_geom::EstimatorConfig;

use crate::pipeline::{AlignmentFailure, AlignmentPipeline};
use crate::storage::{FsStorage, Storage};

const BASELINE: &str = "baseline";
const SCAN_PREFIX: &str = "scan_";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Could not decode image: {0}")]
    Decode(#[source] ImageError),
    #[error("Could not encode image: {0}")]
    Encode(#[source] ImageError),
    #[error("Storage error: {0}")]
    Storage(#[from] io::Error),
    #[error("Stored image {key} is corrupt: {source}")]
    CorruptStored {
        key: String,
        #[source]
        source: ImageError,
    },
    #[error("Invalid session label {0:?}")]
    InvalidKey(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Encoding of persisted images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
        }
    }
}

/// Everything a [`SessionStore`] needs, loadable from TOML or JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Directory holding `{user}/{angle}/...` for [`FsStorage`]
    pub storage_root: PathBuf,
    pub default_user: String,
    pub default_angle: String,
    pub format: ImageFormat,
    /// 1-100, JPEG only
    pub jpeg_quality: u8,
    pub align: AlignConfig,
    pub estimator: EstimatorConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("scans"),
            default_user: "default_user".to_string(),
            default_angle: "front".to_string(),
            format: ImageFormat::Jpeg,
            jpeg_quality: 95,
            align: AlignConfig::default(),
            estimator: EstimatorConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> SessionResult<()> {
        validate_label(&self.default_user)?;
        validate_label(&self.default_angle)?;
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(SessionError::Config(format!(
                "jpeg_quality must be 1-100, got {}",
                self.jpeg_quality
            )));
        }
        self.estimator.validate().map_err(SessionError::Config)
    }

    /// Storage rooted at `storage_root`, using this config's file extension
    pub fn fs_storage(&self) -> FsStorage {
        FsStorage::new(&self.storage_root, self.format.extension())
    }

    pub fn from_toml(content: &str) -> SessionResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| SessionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> SessionResult<String> {
        toml::to_string_pretty(self).map_err(|e| SessionError::Config(e.to_string()))
    }

    pub fn from_json(content: &str) -> SessionResult<Self> {
        let config: Self = serde_json::from_str(content).map_err(|e| SessionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> SessionResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| SessionError::Config(e.to_string()))
    }

    pub fn load_toml<P: AsRef<Path>>(path: P) -> SessionResult<Self> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> SessionResult<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Load by file extension: `.json` as JSON, anything else as TOML
    pub fn load<P: AsRef<Path>>(path: P) -> SessionResult<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::load_json(path),
            _ => Self::load_toml(path),
        }
    }

    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> SessionResult<()> {
        Ok(std::fs::write(path, self.to_toml()?)?)
    }
}

/// Labels become path components, so `.`, `..` and separators are refused
fn validate_label(label: &str) -> SessionResult<()> {
    let bad = label.is_empty()
        || label.chars().all(|c| c == '.')
        || label.contains(['/', '\\', '\0'])
        || label.contains("..")
        || label.trim() != label;
    if bad {
        return Err(SessionError::InvalidKey(label.to_string()));
    }
    Ok(())
}

/// The `(user, angle)` pair that names a session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    user: String,
    angle: String,
}

impl SessionKey {
    pub fn new(user: &str, angle: &str) -> SessionResult<Self> {
        validate_label(user)?;
        validate_label(angle)?;
        Ok(Self { user: user.to_string(), angle: angle.to_string() })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn angle(&self) -> &str {
        &self.angle
    }

    pub fn baseline_key(&self) -> String {
        format!("{}/{}/{BASELINE}", self.user, self.angle)
    }

    pub fn scan_prefix(&self) -> String {
        format!("{}/{}/{SCAN_PREFIX}", self.user, self.angle)
    }

    pub fn scan_key(&self, sequence: u32) -> String {
        format!("{}{}", self.scan_prefix(), sequence)
    }

    fn sequence_of(&self, key: &str) -> Option<u32> {
        key.strip_prefix(&self.scan_prefix())?.parse().ok()
    }
}

/// Result of one submission
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// First image of the session, stored unmodified as its reference
    BaselineEstablished,
    /// Aligned image stored as scan number `sequence`
    ScanCreated { sequence: u32, image: RgbImage, encoded: Vec<u8> },
    /// Alignment failed; nothing was stored
    Failed(AlignmentFailure),
}

impl SubmitOutcome {
    pub fn message(&self) -> String {
        match self {
            SubmitOutcome::BaselineEstablished => "Baseline image saved".to_string(),
            SubmitOutcome::ScanCreated { .. } => "Scan saved successfully".to_string(),
            SubmitOutcome::Failed(failure) => failure.to_string(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, SubmitOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRecord {
    pub sequence: u32,
    pub key: String,
    /// Encoded image as stored
    pub bytes: Vec<u8>,
}

/// Coordinates baselines, alignment and numbered scans for every session.
///
/// Calls on the same `(user, angle)` are serialized by a per-session lock held
/// across the whole check, align and append sequence; different sessions only
/// share the brief lock-table lookup.
pub struct SessionStore<S: Storage> {
    config: SessionConfig,
    storage: S,
    pipeline: AlignmentPipeline,
    locks: Mutex<HashMap<SessionKey, Arc<Mutex<()>>>>,
}

impl SessionStore<FsStorage> {
    /// Store on disk under `config.storage_root`
    pub fn open(config: SessionConfig) -> SessionResult<Self> {
        let storage = config.fs_storage();
        Self::new(config, storage)
    }
}

impl<S: Storage> SessionStore<S> {
    pub fn new(config: SessionConfig, storage: S) -> SessionResult<Self> {
        config.validate()?;
        let pipeline = AlignmentPipeline::from_config(config.align.clone(), config.estimator.clone())
            .map_err(|e| SessionError::Config(e.to_string()))?;
        Ok(Self::with_pipeline(config, storage, pipeline))
    }

    pub fn with_pipeline(config: SessionConfig, storage: S, pipeline: AlignmentPipeline) -> Self {
        Self { config, storage, pipeline, locks: Mutex::new(HashMap::new()) }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Run `f` holding the session's lock; the table entry goes once nobody else holds it
    fn locked<T>(&self, key: &SessionKey, f: impl FnOnce() -> T) -> T {
        let lock = {
            let mut table = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(table.entry(key.clone()).or_default())
        };
        let out = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };
        drop(lock);

        let mut table = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if table.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
            table.remove(key);
        }
        out
    }

    #[cfg(test)]
    fn tracked_sessions(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn encode(&self, image: &RgbImage) -> SessionResult<Vec<u8>> {
        let mut buf = Vec::new();
        let (w, h) = image.dimensions();
        match self.config.format {
            ImageFormat::Jpeg => JpegEncoder::new_with_quality(Cursor::new(&mut buf), self.config.jpeg_quality)
                .encode_image(image)
                .map_err(SessionError::Encode)?,
            ImageFormat::Png => PngEncoder::new(Cursor::new(&mut buf))
                .write_image(image.as_raw(), w, h, ExtendedColorType::Rgb8)
                .map_err(SessionError::Encode)?,
        }
        Ok(buf)
    }

    /// Decode `bytes` and submit them, filling in the configured default user and angle
    pub fn submit_bytes(&self, user: Option<&str>, angle: Option<&str>, bytes: &[u8]) -> SessionResult<SubmitOutcome> {
        let user = user.filter(|u| !u.is_empty()).unwrap_or(self.config.default_user.as_str());
        let angle = angle.filter(|a| !a.is_empty()).unwrap_or(self.config.default_angle.as_str());
        let image = image::load_from_memory(bytes).map_err(SessionError::Decode)?.to_rgb8();
        self.submit(user, angle, &image)
    }

    /// Establish the session baseline, or align `image` to it and store the next scan
    pub fn submit(&self, user: &str, angle: &str, image: &RgbImage) -> SessionResult<SubmitOutcome> {
        let key = SessionKey::new(user, angle)?;
        self.locked(&key, || self.submit_locked(&key, image))
    }

    fn submit_locked(&self, key: &SessionKey, image: &RgbImage) -> SessionResult<SubmitOutcome> {
        let (user, angle) = (key.user(), key.angle());
        let baseline_key = key.baseline_key();
        if !self.storage.exists(&baseline_key)? {
            let encoded = self.encode(image)?;
            self.storage.write(&baseline_key, &encoded)?;
            info!("{user}/{angle}: baseline established ({}x{})", image.width(), image.height());
            return Ok(SubmitOutcome::BaselineEstablished);
        }

        let baseline = image::load_from_memory(&self.storage.read(&baseline_key)?)
            .map_err(|source| SessionError::CorruptStored { key: baseline_key.clone(), source })?
            .to_rgb8();

        let aligned = match self.pipeline.align(image, &baseline) {
            Ok(aligned) => aligned,
            Err(failure) => {
                info!("{user}/{angle}: {failure}");
                return Ok(SubmitOutcome::Failed(failure));
            }
        };

        let sequence = self.next_sequence(key)?;
        let encoded = self.encode(&aligned)?;
        self.storage.write(&key.scan_key(sequence), &encoded)?;
        info!("{user}/{angle}: stored scan {sequence}");
        Ok(SubmitOutcome::ScanCreated { sequence, image: aligned, encoded })
    }

    /// One past the greatest stored scan number
    fn next_sequence(&self, key: &SessionKey) -> SessionResult<u32> {
        let last = self
            .storage
            .list_ordered(&key.scan_prefix())?
            .iter()
            .filter_map(|k| key.sequence_of(k))
            .max()
            .unwrap_or(0);
        Ok(last + 1)
    }

    /// Stored scans, newest first; empty for an unknown session
    pub fn history(&self, user: &str, angle: &str) -> SessionResult<Vec<ScanRecord>> {
        let key = SessionKey::new(user, angle)?;
        self.locked(&key, || self.history_locked(&key))
    }

    fn history_locked(&self, key: &SessionKey) -> SessionResult<Vec<ScanRecord>> {
        let mut records = Vec::new();
        for stored in self.storage.list_ordered(&key.scan_prefix())? {
            let Some(sequence) = key.sequence_of(&stored) else {
                debug!("ignoring unrecognized key {stored}");
                continue;
            };
            let bytes = self.storage.read(&stored)?;
            records.push(ScanRecord { sequence, key: stored, bytes });
        }
        records.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        Ok(records)
    }

    /// Encoded baseline of a session, if one was established
    pub fn baseline(&self, user: &str, angle: &str) -> SessionResult<Option<Vec<u8>>> {
        let key = SessionKey::new(user, angle)?;
        let baseline_key = key.baseline_key();
        if !self.storage.exists(&baseline_key)? {
            return Ok(None);
        }
        Ok(Some(self.storage.read(&baseline_key)?))
    }
}
