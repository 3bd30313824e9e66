//! Audio sink writing a station to disk

use async_trait::async_trait;
use pmostation::{AudioResource, AudioSink, Error, Result, VoiceTransport};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::fs::File;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Opens one file sink per channel under `dir`
pub struct FileTransport {
    dir: PathBuf,
}

impl FileTransport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl VoiceTransport for FileTransport {
    async fn open_audio_sink(&self, channel: &str) -> Result<Arc<dyn AudioSink>> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::Sink(format!("{}: {}", self.dir.display(), e)))?;
        Ok(Arc::new(FileSink::new(self.dir.join(format!("{}.audio", channel)))))
    }
}

/// Copies the station audio into a file until stopped
pub struct FileSink {
    path: PathBuf,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            task: Mutex::new(None),
        }
    }
}

#[async_trait]
impl AudioSink for FileSink {
    async fn play(&self, resource: AudioResource) -> Result<()> {
        let mut file = File::create(&self.path)
            .await
            .map_err(|e| Error::Sink(format!("{}: {}", self.path.display(), e)))?;

        let path = self.path.clone();
        let station = resource.station().clone();
        let task = tokio::spawn(async move {
            let mut reader = resource.into_async_read();
            match tokio::io::copy(&mut reader, &mut file).await {
                Ok(bytes) => debug!(station = %station, bytes, "Audio copy finished"),
                Err(e) => warn!(station = %station, error = %e, "Audio copy failed"),
            }
        });

        info!(path = %path.display(), "💾 Recording audio");
        let previous = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
            debug!(path = %self.path.display(), "Recording stopped");
        }
        Ok(())
    }
}
