//! Data recorders: consumers of scan events.
//!
//! Persistence proper (HDF5 layout, file naming) belongs to external recorders.
//! Two lightweight ones ship here:
//!
//! - [`MemoryRecorder`]: keeps every event, in order
//! - [`JsonLinesRecorder`]: appends each event as one JSON object per line

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::error::AppResult;
use crate::orchestrator::ScanEvent;

/// Consumer of lifecycle and per-point scan events.
#[async_trait]
pub trait DataRecorder: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Handle one event. An error aborts the running scan.
    async fn receive(&self, event: &ScanEvent) -> AppResult<()>;
}

/// Recorder that stores events in memory.
#[derive(Default)]
pub struct MemoryRecorder {
    name: String,
    events: RwLock<Vec<ScanEvent>>,
}

impl MemoryRecorder {
    /// Empty recorder.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            events: RwLock::new(Vec::new()),
        }
    }

    /// Snapshot of every event received so far.
    pub async fn events(&self) -> Vec<ScanEvent> {
        self.events.read().await.clone()
    }

    /// Event names in arrival order, e.g. `["new_scan", "new_scan_point", ...]`.
    pub async fn event_names(&self) -> Vec<&'static str> {
        self.events.read().await.iter().map(ScanEvent::name).collect()
    }

    /// Forget every stored event.
    pub async fn clear(&self) {
        self.events.write().await.clear();
    }
}

#[async_trait]
impl DataRecorder for MemoryRecorder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn receive(&self, event: &ScanEvent) -> AppResult<()> {
        self.events.write().await.push(event.clone());
        Ok(())
    }
}

/// Recorder appending events to a JSON-lines file.
pub struct JsonLinesRecorder {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesRecorder {
    /// Open `path` for appending, creating it if needed.
    pub async fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path).await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// File being appended to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DataRecorder for JsonLinesRecorder {
    fn name(&self) -> &str {
        "json_lines"
    }

    async fn receive(&self, event: &ScanEvent) -> AppResult<()> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        debug!(path = %self.path.display(), event = event.name(), "Event written");
        Ok(())
    }
}
