use super::ProverBackend;
use crate::{
    error::{Error, Result},
    operation::run_builtin,
    receipt::{ImageId, ProofMode, ProofReceipt},
    registry::GuestDescriptor,
    utils::sha256,
};
use async_trait::async_trait;
use std::io;

const SEAL_DOMAIN: &[u8] = b"zkcalc-dev-seal-v1";

/// Developer mode. Built-in guests run natively and the seal is a hash
/// commitment to the image id and journal. Any edit to a receipt is detected,
/// but a forger can compute a valid seal, so these receipts carry no proof.
#[derive(Clone, Copy, Debug, Default)]
pub struct DevBackend;

impl DevBackend {
    fn seal(image_id: &ImageId, journal: &[u8]) -> Vec<u8> {
        let mut preimage = Vec::with_capacity(SEAL_DOMAIN.len() + 44 + journal.len());
        preimage.extend_from_slice(SEAL_DOMAIN);
        preimage.extend_from_slice(ProofMode::Dev.as_ref().as_bytes());
        preimage.extend_from_slice(&image_id.0);
        preimage.extend_from_slice(&(journal.len() as u64).to_le_bytes());
        preimage.extend_from_slice(journal);
        sha256(&preimage).to_vec()
    }
}

#[async_trait]
impl ProverBackend for DevBackend {
    fn mode(&self) -> ProofMode {
        ProofMode::Dev
    }

    async fn image_id(&self, guest: &GuestDescriptor) -> Result<ImageId> {
        let elf = tokio::fs::read(&guest.elf_path)
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => Error::GuestNotBuilt {
                    name: guest.name.clone(),
                    path: guest.elf_path.clone(),
                },
                _ => Error::Io(e),
            })?;
        Ok(ImageId(sha256(&elf)))
    }

    #[tracing::instrument(skip_all, name = "dev_prove", fields(guest = %guest.name, profiling_3))]
    async fn prove(&self, guest: &GuestDescriptor, input: &str) -> Result<ProofReceipt> {
        if !guest.operation.is_builtin() {
            return Err(Error::ExecutionFailed(format!(
                "the dev backend only runs built-in guests, `{}` needs an external prover",
                guest.name
            )));
        }
        let image_id = self.image_id(guest).await?;
        let journal = run_builtin(guest.operation, input)?;
        let seal = Self::seal(&image_id, &journal);
        Ok(ProofReceipt {
            mode: ProofMode::Dev,
            image_id,
            journal,
            seal,
        })
    }

    async fn verify_seal(&self, receipt: &ProofReceipt) -> Result<bool> {
        Ok(receipt.mode == ProofMode::Dev
            && receipt.seal == Self::seal(&receipt.image_id, &receipt.journal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ErrorKind,
        operation::OperationKind,
        registry::{BuildState, SourceKind},
    };
    use std::path::Path;

    fn guest(dir: &Path, operation: OperationKind) -> GuestDescriptor {
        let elf_path = dir.join(operation.to_string());
        std::fs::write(&elf_path, operation.to_string()).unwrap();
        GuestDescriptor {
            name: operation.to_string(),
            operation,
            source_kind: SourceKind::Builtin,
            content_hash: None,
            elf_path,
            state: BuildState::Ready,
        }
    }

    #[tokio::test]
    async fn test_prove_and_verify() {
        let dir = tempfile::tempdir().unwrap();
        let guest = guest(dir.path(), OperationKind::Modexp);
        let receipt = DevBackend
            .prove(&guest, r#"{"base":2,"exponent":10,"modulus":1000}"#)
            .await
            .unwrap();
        assert_eq!(receipt.mode, ProofMode::Dev);
        assert_eq!(receipt.image_id, DevBackend.image_id(&guest).await.unwrap());
        assert!(DevBackend.verify_seal(&receipt).await.unwrap());

        let decoded = OperationKind::Modexp.decode_journal(&receipt.journal).unwrap();
        assert_eq!(decoded.result.to_string(), "24");
    }

    #[tokio::test]
    async fn test_edits_are_detected() {
        let dir = tempfile::tempdir().unwrap();
        let guest = guest(dir.path(), OperationKind::Add);
        let receipt = DevBackend
            .prove(&guest, r#"{"a":35000,"b":21000}"#)
            .await
            .unwrap();

        let mut journal = receipt.clone();
        journal.journal[16] ^= 1;
        let mut image = receipt.clone();
        image.image_id.0[0] ^= 1;
        let mut mode = receipt.clone();
        mode.mode = ProofMode::Production;
        for edited in [journal, image, mode] {
            assert!(!DevBackend.verify_seal(&edited).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_refuses_dynamic_guests() {
        let dir = tempfile::tempdir().unwrap();
        let mut guest = guest(dir.path(), OperationKind::Add);
        guest.operation = OperationKind::Dynamic;
        let err = DevBackend.prove(&guest, "{}").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExecutionFailed);
    }

    #[tokio::test]
    async fn test_guest_failure_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let guest = guest(dir.path(), OperationKind::Sqrt);
        let err = DevBackend.prove(&guest, r#"{"n":-4}"#).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExecutionFailed);
        assert!(err.to_string().contains("non-negative"));

        std::fs::remove_file(&guest.elf_path).unwrap();
        let err = DevBackend.prove(&guest, r#"{"n":4}"#).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GuestNotBuilt);
    }
}
