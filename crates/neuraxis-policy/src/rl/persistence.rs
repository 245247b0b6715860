//! Checksummed policy artifact storage
//!
//! Artifacts are bincode payloads with a blake3 hex digest written to a
//! `.blake3` sidecar. Loading recomputes the digest and fails closed on any
//! mismatch; callers are expected to disable reinforcement-based decisions
//! rather than proceed with suspect weights.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use neuraxis_common::{ArtifactError, NeuraxisError, Result};

/// Shape of the discretized feature space the weights were trained over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub battery_bins: usize,
    pub energy_bins: usize,
    pub action_count: usize,
}

impl FeatureSpec {
    pub fn table_len(&self) -> usize {
        self.battery_bins * self.energy_bins * self.action_count
    }
}

/// Serialized policy checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyArtifact {
    pub schema_version: String,
    pub algorithm: String,
    pub hyperparameters: BTreeMap<String, f64>,
    pub weights: Vec<f32>,
    pub feature_spec: FeatureSpec,
    pub action_mapping: Vec<u32>,
    pub seed: u64,
    pub timestamp: i64,
    pub policy_version: String,
}

impl PolicyArtifact {
    /// Weights length must match the declared feature spec.
    pub fn validate_shape(&self) -> Result<()> {
        let expected = self.feature_spec.table_len();
        if self.weights.len() != expected {
            return Err(NeuraxisError::Artifact(ArtifactError::ShapeMismatch {
                expected,
                actual: self.weights.len(),
            }));
        }
        Ok(())
    }
}

fn digest_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".blake3");
    PathBuf::from(os)
}

/// Serialize the artifact and write its digest sidecar.
pub fn save_policy_artifact(artifact: &PolicyArtifact, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| NeuraxisError::Artifact(ArtifactError::Write(e.to_string())))?;
    }
    let payload = bincode::serialize(artifact)
        .map_err(|e| NeuraxisError::Artifact(ArtifactError::Write(e.to_string())))?;
    let digest = blake3::hash(&payload).to_hex().to_string();
    fs::write(path, &payload)
        .map_err(|e| NeuraxisError::Artifact(ArtifactError::Write(e.to_string())))?;
    fs::write(digest_path(path), &digest)
        .map_err(|e| NeuraxisError::Artifact(ArtifactError::Write(e.to_string())))?;
    info!(
        path = %path.display(),
        version = %artifact.policy_version,
        "policy artifact saved"
    );
    Ok(())
}

/// Load and verify an artifact. Any missing file, digest mismatch, decode
/// failure, or shape mismatch is an error.
pub fn load_policy_artifact(path: &Path) -> Result<PolicyArtifact> {
    let sidecar = digest_path(path);
    if !path.exists() || !sidecar.exists() {
        return Err(NeuraxisError::Artifact(ArtifactError::Missing {
            path: path.display().to_string(),
        }));
    }
    let payload = fs::read(path)
        .map_err(|e| NeuraxisError::Artifact(ArtifactError::Decode(e.to_string())))?;
    let expected = fs::read_to_string(&sidecar)
        .map_err(|e| NeuraxisError::Artifact(ArtifactError::Decode(e.to_string())))?
        .trim()
        .to_string();
    let actual = blake3::hash(&payload).to_hex().to_string();
    if expected != actual {
        return Err(NeuraxisError::Artifact(ArtifactError::DigestMismatch {
            expected,
            actual,
        }));
    }

    let artifact: PolicyArtifact = bincode::deserialize(&payload)
        .map_err(|e| NeuraxisError::Artifact(ArtifactError::Decode(e.to_string())))?;
    artifact.validate_shape()?;
    Ok(artifact)
}
