//! Checksummed cycle-state snapshots
//!
//! Each snapshot is a bincode blob with a blake3 hex digest sidecar. Loads
//! reject digest mismatches outright.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use neuraxis_common::{NeuraxisError, Result};

pub struct StateManager {
    base_dir: PathBuf,
}

impl StateManager {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    fn blob_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(format!("{}.bin", name))
    }

    fn digest_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(format!("{}.blake3", name))
    }

    pub fn save<T: Serialize>(&self, value: &T, name: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.base_dir)?;
        let payload =
            bincode::serialize(value).map_err(|e| NeuraxisError::Serialization(e.to_string()))?;
        let digest = blake3::hash(&payload).to_hex().to_string();

        let path = self.blob_path(name);
        fs::write(&path, &payload)?;
        fs::write(self.digest_path(name), &digest)?;
        Ok(path)
    }

    pub fn load<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let payload = fs::read(self.blob_path(name))?;
        let expected = fs::read_to_string(self.digest_path(name))?.trim().to_string();
        let actual = blake3::hash(&payload).to_hex().to_string();
        if expected != actual {
            return Err(NeuraxisError::Storage(format!(
                "state digest mismatch for {}",
                name
            )));
        }
        bincode::deserialize(&payload).map_err(|e| NeuraxisError::Serialization(e.to_string()))
    }
}
