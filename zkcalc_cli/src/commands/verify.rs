use super::common_args::CoreOptions;
use crate::utils::{print_cargo_message, print_json};
use anyhow::bail;
use clap::Parser;
use std::path::PathBuf;
use zkcalc_host::{OperationKind, VerificationStatus};

#[derive(Parser)]
#[command(name = "verify", about = "Verify a zkcalc proof artifact")]
pub struct VerifyCmd {
    #[clap(flatten, next_help_heading = "Core Options")]
    options: CoreOptions,

    /// Path to the `.bin` or `.hex` proof artifact
    #[clap(long)]
    proof: PathBuf,

    /// Decode the journal as this operation instead of the one in the file name
    #[clap(long)]
    operation: Option<OperationKind>,

    /// Additionally require the proved result to equal this value
    #[clap(long, allow_negative_numbers = true)]
    expected: Option<String>,
}

impl VerifyCmd {
    pub async fn run(self) -> anyhow::Result<()> {
        let calc = self.options.init()?;
        let outcome = calc.verify_artifact(&self.proof, self.operation).await?;
        print_json(&outcome)?;

        if outcome.status == VerificationStatus::Failed {
            bail!(
                "verification failed: {}",
                outcome.reason.as_deref().unwrap_or("unknown reason")
            );
        }
        print_cargo_message(
            "Verified",
            format_args!(
                "{} in {}ms ({} mode, image {}{})",
                self.proof.display(),
                outcome.verification_time_ms,
                outcome.mode,
                &outcome.image_id[..16],
                if outcome.program_trusted {
                    ""
                } else {
                    ", not a local guest"
                }
            ),
        );
        if let Some(expected) = &self.expected {
            match &outcome.extracted_result {
                Some(result) if result.matches_str(expected) => {
                    print_cargo_message("Matched", format_args!("result {result}"))
                }
                Some(result) => bail!("proved result {result} does not match {expected}"),
                None => bail!("no result could be decoded, pass --operation"),
            }
        }
        Ok(())
    }
}
