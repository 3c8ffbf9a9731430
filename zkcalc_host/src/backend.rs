//! Prover backends. Every backend follows the same workflow: derive the image
//! id of a guest, prove an execution into a receipt, check a receipt's seal.

mod dev;
mod external;

pub use dev::DevBackend;
pub use external::ExternalBackend;

use crate::{
    config::{BackendConfig, ZkCalcConfig},
    error::Result,
    receipt::{ImageId, ProofMode, ProofReceipt},
    registry::GuestDescriptor,
};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait ProverBackend: Send + Sync {
    fn mode(&self) -> ProofMode;

    async fn image_id(&self, guest: &GuestDescriptor) -> Result<ImageId>;

    /// Runs `guest` on the JSON `input` under the prover.
    async fn prove(&self, guest: &GuestDescriptor, input: &str) -> Result<ProofReceipt>;

    /// Whether the seal proves that the receipt's image produced its journal.
    /// `Ok(false)` is an invalid proof, `Err` means the check could not run.
    async fn verify_seal(&self, receipt: &ProofReceipt) -> Result<bool>;
}

pub fn from_config(config: &ZkCalcConfig) -> Arc<dyn ProverBackend> {
    match &config.backend {
        BackendConfig::Dev => Arc::new(DevBackend),
        BackendConfig::External { program, args } => Arc::new(ExternalBackend::new(
            program.clone(),
            args.clone(),
            config.prove_timeout(),
            config.verify_timeout(),
        )),
    }
}
