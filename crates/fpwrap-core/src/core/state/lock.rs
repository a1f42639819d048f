use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use fs4::FileExt;

use crate::tooling::errors::EngineError;

const RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Advisory lock held for the lifetime of a mutating batch.
///
/// Readers never take it; writers that cannot acquire it within `wait` get
/// [`EngineError::Busy`] instead of queueing.
#[derive(Debug)]
pub struct BatchLock {
    file: File,
}

impl BatchLock {
    pub fn acquire(path: &Path, wait: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("failed to open lock file {}", path.display()))?;

        let deadline = Instant::now() + wait;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(Self { file }),
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(EngineError::Busy.into());
                    }
                    std::thread::sleep(RETRY_INTERVAL);
                }
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("failed to lock {}", path.display()));
                }
            }
        }
    }
}

impl Drop for BatchLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
