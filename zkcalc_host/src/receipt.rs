use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a guest binary. Binds a receipt to the exact program that
/// produced it.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImageId(pub [u8; 32]);

impl ImageId {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| Error::OutputParseError(format!("image id `{s}` is not hex: {e}")))?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
            Error::OutputParseError(format!("image id must be 32 bytes, got {}", v.len()))
        })?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ImageId({})", self.to_hex())
    }
}

#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::AsRefStr,
    strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProofMode {
    Dev,
    Production,
}

/// Output of one successful guest execution under the prover.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofReceipt {
    pub mode: ProofMode,
    pub image_id: ImageId,
    /// Public output committed by the guest.
    pub journal: Vec<u8>,
    /// Opaque proof material, interpreted only by the backend of `mode`.
    pub seal: Vec<u8>,
}

const ARTIFACT_MAGIC: &[u8; 4] = b"ZKC1";

impl ProofReceipt {
    /// Serialized artifact form: a magic tag followed by the bincode receipt.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = ARTIFACT_MAGIC.to_vec();
        bincode::serialize_into(&mut bytes, self)
            .map_err(|e| Error::ExecutionFailed(format!("failed to serialize receipt: {e}")))?;
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let body = bytes
            .strip_prefix(ARTIFACT_MAGIC.as_slice())
            .ok_or_else(|| Error::ArtifactCorrupt("missing receipt header".to_string()))?;
        let receipt: ProofReceipt = bincode::deserialize(body)
            .map_err(|e| Error::ArtifactCorrupt(format!("failed to decode receipt: {e}")))?;
        let consumed = bincode::serialized_size(&receipt)
            .map_err(|e| Error::ArtifactCorrupt(e.to_string()))?;
        if consumed != body.len() as u64 {
            return Err(Error::ArtifactCorrupt(format!(
                "{} trailing bytes after receipt",
                body.len() as u64 - consumed
            )));
        }
        Ok(receipt)
    }
}
