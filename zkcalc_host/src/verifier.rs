use crate::{
    artifact::{read_artifact, ArtifactName},
    backend::ProverBackend,
    error::Result,
    operation::{OperationKind, ResultValue},
    receipt::{ImageId, ProofMode, ProofReceipt},
    registry::GuestRegistry,
};
use serde::Serialize;
use serde_json::Value;
use std::{path::Path, str::FromStr, sync::Arc, time::Instant};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VerificationStatus {
    Verified,
    /// The receipt parsed but does not prove its claim. A normal outcome.
    Failed,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOutcome {
    pub status: VerificationStatus,
    pub mode: ProofMode,
    /// The operation whose journal layout decoded the result.
    pub operation: Option<OperationKind>,
    pub extracted_result: Option<ResultValue>,
    pub public_outputs: Option<Value>,
    pub image_id: String,
    /// Whether the image id is the locally built guest of `operation`.
    pub program_trusted: bool,
    pub journal_hex: String,
    pub proof_size_bytes: u64,
    pub verification_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl VerificationOutcome {
    pub fn is_verified(&self) -> bool {
        self.status == VerificationStatus::Verified
    }
}

/// Re-checks persisted receipts. Holds no mutable state, so concurrent calls
/// for different artifacts are independent.
#[derive(Clone)]
pub struct Verifier {
    backend: Arc<dyn ProverBackend>,
    registry: Arc<GuestRegistry>,
}

impl Verifier {
    pub fn new(backend: Arc<dyn ProverBackend>, registry: Arc<GuestRegistry>) -> Self {
        Self { backend, registry }
    }

    /// Verifies the artifact at `path`. Without an explicit `operation` the
    /// file name is used as a decoding hint.
    #[tracing::instrument(
        skip_all,
        name = "verify_artifact",
        fields(path = %path.display(), profiling_1)
    )]
    pub async fn verify_file(
        &self,
        path: &Path,
        operation: Option<OperationKind>,
    ) -> Result<VerificationOutcome> {
        let bytes = read_artifact(path).await?;
        let hint = operation.or_else(|| {
            ArtifactName::parse(path).and_then(|name| OperationKind::from_str(&name.operation).ok())
        });
        self.verify_bytes(&bytes, hint).await
    }

    pub async fn verify_bytes(
        &self,
        bytes: &[u8],
        hint: Option<OperationKind>,
    ) -> Result<VerificationOutcome> {
        let receipt = ProofReceipt::from_bytes(bytes)?;
        let start = Instant::now();
        let known_image = match hint {
            Some(kind) if kind.is_builtin() => self.known_image(kind).await,
            _ => None,
        };
        let program_trusted = known_image == Some(receipt.image_id);

        let reason = if known_image.is_some() && !program_trusted {
            Some("image id does not match the built guest".to_string())
        } else if receipt.mode != self.backend.mode() {
            Some(format!(
                "receipt was produced in {} mode, verifier runs in {} mode",
                receipt.mode,
                self.backend.mode()
            ))
        } else if !self.backend.verify_seal(&receipt).await? {
            Some("seal does not match the image id and journal".to_string())
        } else {
            None
        };
        let verification_time_ms = start.elapsed().as_millis() as u64;

        let decoded = hint.and_then(|kind| {
            kind.decode_journal(&receipt.journal)
                .map_err(|e| tracing::debug!("journal does not decode as {kind}: {e}"))
                .ok()
                .map(|decoded| (kind, decoded))
        });
        let status = match reason {
            None => VerificationStatus::Verified,
            Some(ref reason) => {
                tracing::warn!("verification failed: {reason}");
                VerificationStatus::Failed
            }
        };
        let (operation, extracted_result, public_outputs) = match decoded {
            Some((kind, decoded)) => (Some(kind), Some(decoded.result), Some(decoded.details)),
            None => (None, None, None),
        };
        Ok(VerificationOutcome {
            status,
            mode: receipt.mode,
            operation,
            extracted_result,
            public_outputs,
            image_id: receipt.image_id.to_hex(),
            program_trusted,
            journal_hex: hex::encode(&receipt.journal),
            proof_size_bytes: bytes.len() as u64,
            verification_time_ms,
            reason,
        })
    }

    /// Image id of the locally built guest, if there is one.
    async fn known_image(&self, kind: OperationKind) -> Option<ImageId> {
        let guest = self.registry.resolve(kind).ok()?;
        self.backend
            .image_id(&guest)
            .await
            .map_err(|e| tracing::debug!("no image id for {kind}: {e}"))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::DevBackend, config::ZkCalcConfig, error::ErrorKind, toolchain::CargoToolchain,
    };

    struct Fixture {
        _dir: tempfile::TempDir,
        registry: Arc<GuestRegistry>,
        verifier: Verifier,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(ZkCalcConfig::with_root(dir.path()));
        std::fs::create_dir_all(&config.builtin_elf_dir).unwrap();
        for kind in OperationKind::builtins() {
            std::fs::write(config.builtin_elf_dir.join(kind.to_string()), kind.to_string())
                .unwrap();
        }
        let registry = Arc::new(GuestRegistry::new(config, Arc::new(CargoToolchain::default())));
        let verifier = Verifier::new(Arc::new(DevBackend), registry.clone());
        Fixture {
            _dir: dir,
            registry,
            verifier,
        }
    }

    async fn prove(f: &Fixture, kind: OperationKind, input: &str) -> Vec<u8> {
        let guest = f.registry.resolve(kind).unwrap();
        DevBackend.prove(&guest, input).await.unwrap().to_bytes().unwrap()
    }

    #[tokio::test]
    async fn test_hinted_decoding() {
        let f = fixture();
        let bytes = prove(&f, OperationKind::Range, r#"{"secret":25,"min":20,"max":30}"#).await;
        let outcome = f
            .verifier
            .verify_bytes(&bytes, Some(OperationKind::Range))
            .await
            .unwrap();
        assert!(outcome.is_verified());
        assert!(outcome.program_trusted);
        assert_eq!(outcome.extracted_result, Some(ResultValue::Bool(true)));
        assert_eq!(outcome.public_outputs.unwrap()["max"], 30);
        assert_eq!(outcome.proof_size_bytes, bytes.len() as u64);
    }

    #[tokio::test]
    async fn test_falls_back_to_raw_journal() {
        let f = fixture();
        let bytes = prove(&f, OperationKind::Sqrt, r#"{"n":160000}"#).await;
        let outcome = f.verifier.verify_bytes(&bytes, None).await.unwrap();
        assert!(outcome.is_verified());
        assert!(!outcome.program_trusted);
        assert_eq!(outcome.extracted_result, None);
        assert_eq!(outcome.journal_hex, "409c000000000000");

        // a wrong hint that does not decode falls back too
        let outcome = f
            .verifier
            .verify_bytes(&bytes, Some(OperationKind::Modexp))
            .await
            .unwrap();
        assert_eq!(outcome.operation, None);
    }

    #[tokio::test]
    async fn test_image_of_another_guest_fails() {
        let f = fixture();
        let bytes = prove(&f, OperationKind::Add, r#"{"a":1,"b":2}"#).await;
        let outcome = f
            .verifier
            .verify_bytes(&bytes, Some(OperationKind::Multiply))
            .await
            .unwrap();
        assert_eq!(outcome.status, VerificationStatus::Failed);
        assert!(!outcome.program_trusted);
    }

    #[tokio::test]
    async fn test_corrupt_and_missing() {
        let f = fixture();
        let err = f.verifier.verify_bytes(b"garbage", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArtifactCorrupt);
        let err = f
            .verifier
            .verify_file(Path::new("/nonexistent/proof_add_ab_1.bin"), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArtifactNotFound);
    }
}
