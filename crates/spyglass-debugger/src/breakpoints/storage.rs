//! Persistence of the breakpoint list across sessions.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use spyglass_config::BreakpointsConfig;
use thiserror::Error;

/// The stored form of a breakpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedBreakpoint {
    pub source_file_id: String,
    pub line_number: u32,
    #[serde(default)]
    pub condition: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to access breakpoint storage at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed breakpoint storage: {0}")]
    Json(#[from] serde_json::Error),
}

/// Where the persistent breakpoint list lives.
pub trait BreakpointStorage {
    fn load(&self) -> Result<Vec<SerializedBreakpoint>, StorageError>;
    fn save(&mut self, breakpoints: &[SerializedBreakpoint]) -> Result<(), StorageError>;
}

/// Keeps the list in memory; for tests and sessions that should not outlive
/// the process.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    breakpoints: Vec<SerializedBreakpoint>,
    saves: usize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_breakpoints(breakpoints: Vec<SerializedBreakpoint>) -> Self {
        Self {
            breakpoints,
            saves: 0,
        }
    }

    pub fn breakpoints(&self) -> &[SerializedBreakpoint] {
        &self.breakpoints
    }

    /// Number of times the list was written.
    pub fn save_count(&self) -> usize {
        self.saves
    }
}

impl BreakpointStorage for MemoryStorage {
    fn load(&self) -> Result<Vec<SerializedBreakpoint>, StorageError> {
        Ok(self.breakpoints.clone())
    }

    fn save(&mut self, breakpoints: &[SerializedBreakpoint]) -> Result<(), StorageError> {
        self.breakpoints = breakpoints.to_vec();
        self.saves += 1;
        Ok(())
    }
}

/// A JSON array on disk, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BreakpointStorage for JsonFileStorage {
    fn load(&self) -> Result<Vec<SerializedBreakpoint>, StorageError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StorageError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        Ok(serde_json::from_str(&text)?)
    }

    fn save(&mut self, breakpoints: &[SerializedBreakpoint]) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(breakpoints)?;
        atomic_write(&self.path, &bytes).map_err(|source| StorageError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// Storage selected by `[breakpoints] storage_path`: a JSON file when set,
/// memory otherwise.
#[derive(Debug, Clone)]
pub enum ConfiguredStorage {
    Memory(MemoryStorage),
    File(JsonFileStorage),
}

impl ConfiguredStorage {
    pub fn from_config(config: &BreakpointsConfig) -> Self {
        match &config.storage_path {
            Some(path) => Self::File(JsonFileStorage::new(path)),
            None => Self::Memory(MemoryStorage::new()),
        }
    }
}

impl BreakpointStorage for ConfiguredStorage {
    fn load(&self) -> Result<Vec<SerializedBreakpoint>, StorageError> {
        match self {
            Self::Memory(storage) => storage.load(),
            Self::File(storage) => storage.load(),
        }
    }

    fn save(&mut self, breakpoints: &[SerializedBreakpoint]) -> Result<(), StorageError> {
        match self {
            Self::Memory(storage) => storage.save(breakpoints),
            Self::File(storage) => storage.save(breakpoints),
        }
    }
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let (tmp_path, mut file) = open_unique_tmp_file(path, parent)?;
    let written = file.write_all(bytes).and_then(|()| file.sync_all());
    drop(file);
    if let Err(err) = written.and_then(|()| fs::rename(&tmp_path, path)) {
        if let Err(remove_err) = fs::remove_file(&tmp_path) {
            if remove_err.kind() != io::ErrorKind::NotFound {
                tracing::debug!(
                    target: "spyglass.breakpoints",
                    path = %tmp_path.display(),
                    error = %remove_err,
                    "failed to remove temporary file"
                );
            }
        }
        return Err(err);
    }
    Ok(())
}

fn open_unique_tmp_file(dest: &Path, parent: &Path) -> io::Result<(PathBuf, fs::File)> {
    let file_name = dest
        .file_name()
        .ok_or_else(|| io::Error::other("destination path has no file name"))?;
    let pid = std::process::id();

    loop {
        let counter = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(format!(".tmp.{pid}.{counter}"));
        let tmp_path = parent.join(tmp_name);

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
        {
            Ok(file) => return Ok((tmp_path, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    }
}
