//! Durable proof artifacts named `proof_{operation}_{id}_{timestamp}.bin`.

use crate::{
    error::{Error, Result},
    receipt::ProofReceipt,
    utils::{random_hex, unix_timestamp},
};
use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

pub const ARTIFACT_EXTENSION: &str = "bin";
pub const HEX_ARTIFACT_EXTENSION: &str = "hex";

/// The parts encoded in an artifact's file name. The name is a decoding hint
/// only; trust comes from the bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactName {
    pub operation: String,
    pub id: String,
    pub timestamp: u64,
}

impl ArtifactName {
    pub fn generate(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            id: random_hex(4),
            timestamp: unix_timestamp(),
        }
    }

    pub fn file_name(&self) -> String {
        format!(
            "proof_{}_{}_{}.{ARTIFACT_EXTENSION}",
            self.operation, self.id, self.timestamp
        )
    }

    /// Parses `proof_{operation}_{id}_{timestamp}.{bin,hex}`. Operation names
    /// may themselves contain underscores.
    pub fn parse(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if ext != ARTIFACT_EXTENSION && ext != HEX_ARTIFACT_EXTENSION {
            return None;
        }
        let stem = path.file_stem()?.to_str()?.strip_prefix("proof_")?;
        let mut parts = stem.rsplitn(3, '_');
        let timestamp = parts.next()?.parse().ok()?;
        let id = parts.next()?;
        let operation = parts.next()?;
        if id.is_empty() || operation.is_empty() {
            return None;
        }
        Some(Self {
            operation: operation.to_string(),
            id: id.to_string(),
            timestamp,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub size_bytes: u64,
}

#[derive(Clone, Debug)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn persist(&self, receipt: &ProofReceipt, operation: &str) -> Result<Artifact> {
        self.persist_as(receipt, ArtifactName::generate(operation)).await
    }

    /// Writes the receipt under `name`. The file appears complete or not at
    /// all, and an existing file is never replaced.
    #[tracing::instrument(
        skip_all,
        name = "persist_artifact",
        fields(operation = %name.operation, profiling_2)
    )]
    pub async fn persist_as(
        &self,
        receipt: &ProofReceipt,
        name: ArtifactName,
    ) -> Result<Artifact> {
        let bytes = receipt.to_bytes()?;
        let dir = self.dir.clone();
        let path = dir.join(name.file_name());
        let artifact = tokio::task::spawn_blocking(move || -> Result<Artifact> {
            fs::create_dir_all(&dir)?;
            let mut file = tempfile::NamedTempFile::new_in(&dir)?;
            file.write_all(&bytes)?;
            file.as_file().sync_all()?;
            file.persist_noclobber(&path).map_err(|e| {
                if e.error.kind() == io::ErrorKind::AlreadyExists {
                    Error::ArtifactNameCollision(path.clone())
                } else {
                    Error::Io(e.error)
                }
            })?;
            Ok(Artifact {
                path,
                size_bytes: bytes.len() as u64,
            })
        })
        .await
        .map_err(|e| Error::ExecutionFailed(format!("artifact writer panicked: {e}")))??;
        tracing::info!("proof persisted to {}", artifact.path.display());
        Ok(artifact)
    }
}

/// Reads artifact bytes, decoding `.hex` artifacts.
pub async fn read_artifact(path: &Path) -> Result<Vec<u8>> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Error::ArtifactNotFound(path.to_path_buf()),
        _ => Error::Io(e),
    })?;
    if path.extension().is_some_and(|ext| ext == HEX_ARTIFACT_EXTENSION) {
        let text = std::str::from_utf8(&bytes)
            .map_err(|_| Error::ArtifactCorrupt("hex artifact is not text".to_string()))?;
        return hex::decode(text.trim())
            .map_err(|e| Error::ArtifactCorrupt(format!("hex artifact: {e}")));
    }
    Ok(bytes)
}
