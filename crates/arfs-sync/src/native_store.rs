//! Native sync state backend using tokio::fs.
//!
//! Each key is one JSON file in the state directory. Writes go to a sibling
//! temp file first and are renamed into place, so a crash mid-write leaves the
//! previous snapshot intact.

use arfs_core::store::{Result, StateBackend, StoreError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

const EXTENSION: &str = ".json";
const TEMP_SUFFIX: &str = ".tmp";

/// File-per-key backend for the daemon and CLI
pub struct NativeStateBackend {
    base_path: PathBuf,
}

impl NativeStateBackend {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn full_path(&self, key: &str) -> PathBuf {
        self.base_path.join(format!("{}{}", encode_key(key), EXTENSION))
    }
}

/// Keys contain `/`; escape it (and the escape character) to get a flat file name.
fn encode_key(key: &str) -> String {
    key.replace('%', "%25").replace('/', "%2F")
}

fn decode_key(file_name: &str) -> String {
    file_name.replace("%2F", "/").replace("%25", "%")
}

fn io_error(path: &Path, e: std::io::Error) -> StoreError {
    StoreError::Backend(format!("{}: {}", path.display(), e))
}

#[async_trait]
impl StateBackend for NativeStateBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.full_path(key);
        match fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| io_error(&self.base_path, e))?;

        let path = self.full_path(key);
        let mut temp = path.clone().into_os_string();
        temp.push(TEMP_SUFFIX);
        let temp = PathBuf::from(temp);

        fs::write(&temp, value).await.map_err(|e| io_error(&temp, e))?;
        if let Err(e) = fs::rename(&temp, &path).await {
            // Best effort; the stray temp file is ignored by `keys` anyway
            let _ = fs::remove_file(&temp).await;
            return Err(io_error(&path, e));
        }
        debug!("Wrote {} ({} bytes)", path.display(), value.len());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.full_path(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut dir = match fs::read_dir(&self.base_path).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&self.base_path, e)),
        };

        let mut keys = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| io_error(&self.base_path, e))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                warn!("Skipping non UTF-8 file in state directory: {:?}", name);
                continue;
            };
            if let Some(stem) = name.strip_suffix(EXTENSION) {
                keys.push(decode_key(stem));
            }
        }
        Ok(keys)
    }
}
