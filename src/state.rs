//! Checkpoint persistence.
//!
//! The checkpoint is the highest article id the poll loop has evaluated. It
//! is stored as a decimal integer in a small text file and replaced
//! atomically so a crash mid-write never leaves a truncated value behind.
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("Failed to write checkpoint '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Handle on the checkpoint file.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored checkpoint.
    ///
    /// A missing, unreadable or corrupt file yields 0, meaning no checkpoint.
    pub fn load(&self) -> i64 {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No checkpoint file");
                return 0;
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to read checkpoint, starting without one"
                );
                return 0;
            }
        };

        match content.trim().parse::<i64>() {
            Ok(id) if id >= 0 => {
                tracing::debug!(path = %self.path.display(), checkpoint = id, "Loaded checkpoint");
                id
            }
            _ => {
                tracing::warn!(
                    path = %self.path.display(),
                    content = %content.trim(),
                    "Corrupt checkpoint file, starting without one"
                );
                0
            }
        }
    }

    /// Replace the stored checkpoint with `id`.
    pub fn save(&self, id: i64) -> Result<(), StateError> {
        self.write_atomic(format!("{id}\n").as_bytes())
            .map_err(|source| StateError::Write {
                path: self.path.clone(),
                source,
            })?;
        tracing::debug!(path = %self.path.display(), checkpoint = id, "Saved checkpoint");
        Ok(())
    }

    /// Write to a uniquely named sibling, sync, then rename over the target.
    fn write_atomic(&self, content: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let temp_path = self.path.with_extension(format!("tmp.{:016x}", suffix));

        let result = (|| {
            let mut temp_file = std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp_path)?;
            temp_file.write_all(content)?;
            temp_file.sync_all()?;
            drop(temp_file);

            #[cfg(windows)]
            if self.path.exists() {
                std::fs::remove_file(&self.path)?;
            }

            std::fs::rename(&temp_path, &self.path)
        })();

        if result.is_err() {
            let _ = std::fs::remove_file(&temp_path);
        }
        result
    }
}
