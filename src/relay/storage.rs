//! On-disk store for accepted voice clips.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Local};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Flat directory of `voice_<YYYYMMDD_HHMMSS>_<seq>.ogg` files.
///
/// The sequence number makes clips from the same second distinct, and files are
/// created with `create_new` so a name left over from an earlier run is skipped
/// instead of overwritten.
pub struct VoiceStore {
    dir: PathBuf,
    seq: AtomicU64,
}

impl VoiceStore {
    pub async fn open(dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(dir).await?;
        Ok(Self { dir: dir.to_path_buf(), seq: AtomicU64::new(0) })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `data` to a fresh file and return its path.
    pub async fn save(&self, data: &[u8], received_at: DateTime<Local>) -> io::Result<PathBuf> {
        let stamp = received_at.format("%Y%m%d_%H%M%S");
        loop {
            let seq = self.seq.fetch_add(1, Ordering::Relaxed);
            let path = self.dir.join(format!("voice_{stamp}_{seq:04}.ogg"));
            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            };
            file.write_all(data).await?;
            file.flush().await?;
            debug!("Saved {} bytes to {:?}", data.len(), path);
            return Ok(path);
        }
    }
}
