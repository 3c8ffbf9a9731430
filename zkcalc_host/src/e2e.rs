//! One request from validation to a signed, persisted, self-verified proof.

use crate::{
    artifact::ArtifactStore,
    backend::{self, ProverBackend},
    config::ZkCalcConfig,
    engine::ProofEngine,
    error::{Error, Result},
    operation::{Operation, OperationKind, OperationRequest, ResultValue, TaskMeta},
    receipt::ProofMode,
    registry::{GuestDescriptor, GuestRegistry},
    secret_store::{FileSecretStore, SecretStore},
    signer::{AuthenticationRecord, Signer},
    toolchain::{CargoToolchain, Toolchain},
    verifier::{VerificationOutcome, VerificationStatus, Verifier},
};
use serde::Serialize;
use serde_json::Value;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Computation {
    pub operation: OperationKind,
    pub inputs: Value,
    pub result: ResultValue,
    /// Re-derived on the host, independent of the proof.
    pub expected: Option<ResultValue>,
    pub correct: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZkProof {
    pub mode: ProofMode,
    pub image_id: String,
    pub verification_status: VerificationStatus,
    pub proof_file_path: PathBuf,
    pub proof_size_bytes: u64,
    pub journal_hex: String,
    pub public_outputs: Value,
    pub guest: String,
    pub task_id: String,
    pub proving_time_ms: u64,
    pub verification_time_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofResponse {
    pub computation: Computation,
    pub zk_proof: ZkProof,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<AuthenticationRecord>,
}

/// The proof-orchestration core, wired once from a [`ZkCalcConfig`].
pub struct ZkCalc {
    config: Arc<ZkCalcConfig>,
    registry: Arc<GuestRegistry>,
    engine: ProofEngine,
    verifier: Verifier,
    signer: Signer,
}

impl ZkCalc {
    pub fn new(config: Arc<ZkCalcConfig>) -> Self {
        let toolchain = Arc::new(CargoToolchain::new(config.toolchain.clone()));
        let backend = backend::from_config(&config);
        let secrets = Arc::new(FileSecretStore::new(&config.keys_dir));
        Self::with_parts(config, toolchain, backend, secrets)
    }

    pub fn with_parts(
        config: Arc<ZkCalcConfig>,
        toolchain: Arc<dyn Toolchain>,
        backend: Arc<dyn ProverBackend>,
        secrets: Arc<dyn SecretStore>,
    ) -> Self {
        let registry = Arc::new(GuestRegistry::new(config.clone(), toolchain));
        let engine = ProofEngine::new(backend.clone(), ArtifactStore::new(&config.artifact_dir));
        let verifier = Verifier::new(backend, registry.clone());
        let signer = Signer::new(secrets, config.passphrase.clone());
        Self {
            config,
            registry,
            engine,
            verifier,
            signer,
        }
    }

    pub fn config(&self) -> &ZkCalcConfig {
        &self.config
    }

    pub fn registry(&self) -> &GuestRegistry {
        &self.registry
    }

    pub fn mode(&self) -> ProofMode {
        self.engine.mode()
    }

    async fn resolve(&self, request: &OperationRequest) -> Result<GuestDescriptor> {
        match &request.operation {
            Operation::Dynamic { source, .. } => {
                self.registry
                    .resolve_dynamic(source, request.force_rebuild)
                    .await
            }
            Operation::Precompiled { elf_path, .. } => self.registry.resolve_precompiled(elf_path),
            op => self.registry.resolve(op.kind()),
        }
    }

    /// Runs one request. A failed call leaves no artifact behind.
    #[tracing::instrument(
        skip_all,
        name = "execute",
        fields(operation = %request.operation.kind(), profiling_1)
    )]
    pub async fn execute(&self, request: OperationRequest) -> Result<ProofResponse> {
        request.validate()?;
        if let Some(key_id) = &request.key_id {
            self.signer.preflight(key_id).await?;
        }
        let operation = &request.operation;
        let kind = operation.kind();
        let meta = TaskMeta::new();
        let input = operation.guest_input(&meta)?;

        let guest = self.registry.lease(self.resolve(&request).await?);
        let proof = self.engine.generate(&guest, &input).await;
        let guest_name = guest.name.clone();
        drop(guest);
        let proof = proof?;
        let receipt = &proof.receipt;

        let decoded = kind.decode_journal(&receipt.journal).map_err(|e| {
            Error::ExecutionFailed(format!(
                "guest `{guest_name}` committed an unexpected journal: {e}"
            ))
        })?;
        let expected = operation.expected(&meta)?;
        let correct = expected.as_ref().map(|e| *e == decoded.result);
        if correct == Some(false) {
            tracing::warn!("proved result differs from the host re-derivation");
        }

        let authentication = match &request.key_id {
            Some(key_id) => Some(
                self.signer
                    .authenticate(key_id, operation, &decoded.result, &meta)
                    .await?,
            ),
            None => None,
        };

        let artifact = self.engine.persist(receipt, kind.as_ref()).await?;
        let start = Instant::now();
        let verification_status = match self.engine.backend().verify_seal(receipt).await {
            Ok(true) => VerificationStatus::Verified,
            Ok(false) => VerificationStatus::Failed,
            Err(e) => {
                tracing::warn!("self-verification could not run: {e}");
                VerificationStatus::Failed
            }
        };
        let verification_time_ms = start.elapsed().as_millis() as u64;

        Ok(ProofResponse {
            computation: Computation {
                operation: kind,
                inputs: operation.public_inputs(),
                result: decoded.result,
                expected,
                correct,
            },
            zk_proof: ZkProof {
                mode: receipt.mode,
                image_id: receipt.image_id.to_hex(),
                verification_status,
                proof_file_path: artifact.path,
                proof_size_bytes: artifact.size_bytes,
                journal_hex: hex::encode(&receipt.journal),
                public_outputs: decoded.details,
                guest: guest_name,
                task_id: meta.task_id,
                proving_time_ms: proof.proving_time_ms,
                verification_time_ms,
            },
            authentication,
        })
    }

    pub async fn verify_artifact(
        &self,
        path: &Path,
        operation: Option<OperationKind>,
    ) -> Result<VerificationOutcome> {
        self.verifier.verify_file(path, operation).await
    }

    pub async fn build_guests(&self) -> Result<Vec<GuestDescriptor>> {
        self.registry.build_builtins().await
    }
}
