use std::{
    io::SeekFrom,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use herald_common::{DeliveryAttemptLog, tracing};
use tokio::{
    fs::OpenOptions,
    io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader},
    sync::Mutex,
};

use super::AttemptStore;

/// Append-only JSON-lines file, one entry per line
///
/// The parent directory is created on first write. Appends are serialized so
/// concurrent workers never interleave partial lines.
#[derive(Debug)]
pub struct FileAttemptStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileAttemptStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every entry back, oldest first.
    ///
    /// A missing file reads as empty. Lines that do not parse, such as one
    /// cut short by a crash mid-append, are skipped with a warning.
    pub async fn read_all(&self) -> super::Result<Vec<DeliveryAttemptLog>> {
        let file = match tokio::fs::File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut reader = BufReader::new(file);
        let mut line = Vec::new();
        let mut entries = Vec::new();
        let mut number = 0;

        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line).await? == 0 {
                break;
            }
            number += 1;

            if line.trim_ascii().is_empty() {
                continue;
            }
            match serde_json::from_slice(&line) {
                Ok(entry) => entries.push(entry),
                Err(error) => tracing::warn!(
                    path = %self.path.display(),
                    line = number,
                    error = %error,
                    "Skipping unreadable attempt log line"
                ),
            }
        }

        Ok(entries)
    }
}

#[async_trait]
impl AttemptStore for FileAttemptStore {
    async fn record(&self, entry: &DeliveryAttemptLog) -> super::Result<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let _guard = self.lock.lock().await;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .await?;

        // Start on a fresh line if an earlier append was cut short
        if file.metadata().await?.len() > 0 {
            let mut last = [0u8];
            file.seek(SeekFrom::End(-1)).await?;
            file.read_exact(&mut last).await?;
            if last[0] != b'\n' {
                line.insert(0, b'\n');
            }
        }

        file.write_all(&line).await?;
        file.flush().await?;

        Ok(())
    }
}
