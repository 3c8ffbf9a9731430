use crate::{
    artifact::{Artifact, ArtifactStore},
    backend::ProverBackend,
    error::Result,
    receipt::{ProofMode, ProofReceipt},
    registry::GuestDescriptor,
};
use std::{sync::Arc, time::Instant};

/// A receipt and how long it took to produce.
#[derive(Clone, Debug)]
pub struct GeneratedProof {
    pub receipt: ProofReceipt,
    pub proving_time_ms: u64,
}

/// Runs guests under the configured backend and persists their receipts.
#[derive(Clone)]
pub struct ProofEngine {
    backend: Arc<dyn ProverBackend>,
    store: ArtifactStore,
}

impl ProofEngine {
    pub fn new(backend: Arc<dyn ProverBackend>, store: ArtifactStore) -> Self {
        Self { backend, store }
    }

    pub fn mode(&self) -> ProofMode {
        self.backend.mode()
    }

    pub fn backend(&self) -> &Arc<dyn ProverBackend> {
        &self.backend
    }

    #[tracing::instrument(skip_all, name = "generate", fields(guest = %guest.name, profiling_2))]
    pub async fn generate(&self, guest: &GuestDescriptor, input: &str) -> Result<GeneratedProof> {
        let start = Instant::now();
        let receipt = self.backend.prove(guest, input).await?;
        let proving_time_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(
            "proved {} in {proving_time_ms}ms, journal {} bytes, seal {} bytes",
            guest.name,
            receipt.journal.len(),
            receipt.seal.len()
        );
        Ok(GeneratedProof {
            receipt,
            proving_time_ms,
        })
    }

    pub async fn persist(&self, receipt: &ProofReceipt, operation: &str) -> Result<Artifact> {
        self.store.persist(receipt, operation).await
    }
}
