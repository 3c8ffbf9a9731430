use super::ProverBackend;
use crate::{
    error::{Error, Result},
    process::{self, extract_json_payload},
    receipt::{ImageId, ProofMode, ProofReceipt},
    registry::GuestDescriptor,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::{path::PathBuf, time::Duration};
use tokio::process::Command;

/// Drives a host prover binary with three subcommands:
///
/// - `prove --elf E --input I --receipt-out R` prints `{"image_id", "journal"}`
///   and writes the receipt to `R`
/// - `verify --receipt R --image-id H` prints `{"verified", "journal"}`
/// - `image-id --elf E` prints `{"image_id"}`
///
/// Ids and journals are hex. Other stdout lines are treated as logs.
#[derive(Clone, Debug)]
pub struct ExternalBackend {
    program: PathBuf,
    args: Vec<String>,
    prove_timeout: Duration,
    verify_timeout: Duration,
}

#[derive(Deserialize)]
struct ProveOutput {
    image_id: String,
    journal: String,
}

#[derive(Deserialize)]
struct VerifyOutput {
    verified: bool,
    #[serde(default)]
    journal: Option<String>,
}

#[derive(Deserialize)]
struct ImageIdOutput {
    image_id: String,
}

impl ExternalBackend {
    pub fn new(
        program: PathBuf,
        args: Vec<String>,
        prove_timeout: Duration,
        verify_timeout: Duration,
    ) -> Self {
        Self {
            program,
            args,
            prove_timeout,
            verify_timeout,
        }
    }

    fn command(&self, subcommand: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(subcommand);
        cmd
    }
}

fn decode_hex(what: &str, s: &str) -> Result<Vec<u8>> {
    hex::decode(s.trim()).map_err(|e| Error::OutputParseError(format!("{what} is not hex: {e}")))
}

#[async_trait]
impl ProverBackend for ExternalBackend {
    fn mode(&self) -> ProofMode {
        ProofMode::Production
    }

    async fn image_id(&self, guest: &GuestDescriptor) -> Result<ImageId> {
        let mut cmd = self.command("image-id");
        cmd.arg("--elf").arg(&guest.elf_path);
        let output = process::run(&mut cmd, "prover image-id", self.verify_timeout).await?;
        if !output.success() {
            return Err(Error::ExecutionFailed(output.diagnostics()));
        }
        let payload: ImageIdOutput = extract_json_payload(&output.stdout)?;
        ImageId::from_hex(&payload.image_id)
    }

    #[tracing::instrument(
        skip_all,
        name = "external_prove",
        fields(guest = %guest.name, profiling_3)
    )]
    async fn prove(&self, guest: &GuestDescriptor, input: &str) -> Result<ProofReceipt> {
        let scratch = tempfile::tempdir()?;
        let input_path = scratch.path().join("input.json");
        let receipt_path = scratch.path().join("receipt.bin");
        tokio::fs::write(&input_path, input).await?;

        let mut cmd = self.command("prove");
        cmd.arg("--elf")
            .arg(&guest.elf_path)
            .arg("--input")
            .arg(&input_path)
            .arg("--receipt-out")
            .arg(&receipt_path);
        let output = process::run(&mut cmd, "prover", self.prove_timeout).await?;
        if !output.success() {
            return Err(Error::ExecutionFailed(output.diagnostics()));
        }
        let payload: ProveOutput = extract_json_payload(&output.stdout)?;
        let seal = tokio::fs::read(&receipt_path).await.map_err(|e| {
            Error::ExecutionFailed(format!("prover wrote no receipt: {e}"))
        })?;
        Ok(ProofReceipt {
            mode: ProofMode::Production,
            image_id: ImageId::from_hex(&payload.image_id)?,
            journal: decode_hex("journal", &payload.journal)?,
            seal,
        })
    }

    async fn verify_seal(&self, receipt: &ProofReceipt) -> Result<bool> {
        if receipt.mode != ProofMode::Production {
            return Ok(false);
        }
        let scratch = tempfile::tempdir()?;
        let receipt_path = scratch.path().join("receipt.bin");
        tokio::fs::write(&receipt_path, &receipt.seal).await?;

        let mut cmd = self.command("verify");
        cmd.arg("--receipt")
            .arg(&receipt_path)
            .arg("--image-id")
            .arg(receipt.image_id.to_hex());
        let output = process::run(&mut cmd, "prover verify", self.verify_timeout).await?;
        let payload: VerifyOutput = match extract_json_payload(&output.stdout) {
            Ok(payload) => payload,
            Err(_) if !output.success() => {
                tracing::debug!("verifier rejected receipt: {}", output.diagnostics());
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        let Some(journal) = payload.journal else {
            return Ok(false);
        };
        Ok(payload.verified && decode_hex("journal", &journal)? == receipt.journal)
    }
}
