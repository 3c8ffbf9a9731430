use super::common_args::CoreOptions;
use crate::utils::{print_cargo_message, print_json};
use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use zkcalc_host::{Operation, OperationRequest, ProofMode, VerificationStatus};

#[derive(Parser)]
#[command(name = "prove", about = "Run one operation under the prover")]
pub struct ProveCmd {
    #[clap(flatten, next_help_heading = "Core Options")]
    options: CoreOptions,

    /// Sign the proved result with this key.
    #[arg(long, global = true)]
    key_id: Option<String>,

    /// Rebuild a dynamic guest even when a cached build exists.
    #[arg(long, global = true)]
    force_rebuild: bool,

    #[clap(subcommand)]
    operation: OperationArgs,
}

#[derive(Subcommand)]
enum OperationArgs {
    /// a + b on decimals
    Add {
        #[arg(allow_negative_numbers = true)]
        a: f64,
        #[arg(allow_negative_numbers = true)]
        b: f64,
    },
    /// a * b on decimals
    Multiply {
        #[arg(allow_negative_numbers = true)]
        a: f64,
        #[arg(allow_negative_numbers = true)]
        b: f64,
    },
    /// Square root of a non-negative decimal
    Sqrt {
        #[arg(allow_negative_numbers = true)]
        n: f64,
    },
    /// base^exponent mod modulus
    Modexp { base: u64, exponent: u64, modulus: u64 },
    /// Proves min <= secret <= max without revealing the secret
    Range {
        #[arg(long)]
        secret: u64,
        #[arg(long)]
        min: u64,
        #[arg(long)]
        max: u64,
    },
    /// Signed integer addition, requires --key-id
    AuthenticatedAdd {
        #[arg(allow_negative_numbers = true)]
        a: i64,
        #[arg(allow_negative_numbers = true)]
        b: i64,
    },
    NeuralNetwork {
        /// Comma separated decimals
        #[arg(value_delimiter = ',', num_args = 1.., allow_negative_numbers = true)]
        inputs: Vec<f64>,
    },
    LogisticRegression {
        /// Comma separated decimals
        #[arg(long, value_delimiter = ',', num_args = 1.., allow_negative_numbers = true)]
        features: Vec<f64>,
        #[arg(long, default_value = "loan_approval")]
        task: String,
    },
    /// Builds and proves a guest from Rust source
    Dynamic {
        /// File holding a function body, or a full guest with `fn main(`
        source: PathBuf,
        /// JSON passed to the guest
        #[arg(long, default_value = "null")]
        inputs: String,
    },
    /// Proves an already built guest binary
    Precompiled {
        elf: PathBuf,
        /// JSON passed to the guest
        #[arg(long, default_value = "null")]
        inputs: String,
    },
    /// A full JSON request, e.g. `{"operation": "add", "a": 1, "b": 2}`
    Request { path: PathBuf },
}

fn parse_inputs(inputs: &str) -> anyhow::Result<Value> {
    serde_json::from_str(inputs).context("guest inputs are not valid JSON")
}

impl OperationArgs {
    fn into_request(self) -> anyhow::Result<OperationRequest> {
        let operation = match self {
            OperationArgs::Add { a, b } => Operation::Add { a, b },
            OperationArgs::Multiply { a, b } => Operation::Multiply { a, b },
            OperationArgs::Sqrt { n } => Operation::Sqrt { n },
            OperationArgs::Modexp {
                base,
                exponent,
                modulus,
            } => Operation::Modexp {
                base,
                exponent,
                modulus,
            },
            OperationArgs::Range { secret, min, max } => Operation::Range { secret, min, max },
            OperationArgs::AuthenticatedAdd { a, b } => Operation::AuthenticatedAdd { a, b },
            OperationArgs::NeuralNetwork { inputs } => Operation::NeuralNetwork { inputs },
            OperationArgs::LogisticRegression { features, task } => {
                Operation::LogisticRegression { features, task }
            }
            OperationArgs::Dynamic { source, inputs } => Operation::Dynamic {
                source: std::fs::read_to_string(&source)
                    .context(format!("failed to read {}", source.display()))?,
                inputs: parse_inputs(&inputs)?,
            },
            OperationArgs::Precompiled { elf, inputs } => Operation::Precompiled {
                elf_path: elf,
                inputs: parse_inputs(&inputs)?,
            },
            OperationArgs::Request { path } => {
                let text = std::fs::read_to_string(&path)
                    .context(format!("failed to read {}", path.display()))?;
                return serde_json::from_str(&text).context("malformed operation request");
            }
        };
        Ok(OperationRequest::new(operation))
    }
}

impl ProveCmd {
    pub async fn run(self) -> anyhow::Result<()> {
        let calc = self.options.init()?;
        let mut request = self.operation.into_request()?;
        if self.key_id.is_some() {
            request.key_id = self.key_id;
        }
        request.force_rebuild |= self.force_rebuild;

        if calc.mode() == ProofMode::Dev {
            print_cargo_message("Warning", format_args!("dev mode, the receipt is not a proof"));
        }
        print_cargo_message("Proving", format_args!("{}", request.operation.kind()));
        let response = calc.execute(request).await?;

        let proof = &response.zk_proof;
        print_cargo_message(
            "Proved",
            format_args!(
                "{} = {} in {:.2}s",
                response.computation.operation,
                response.computation.result,
                proof.proving_time_ms as f64 / 1000.0
            ),
        );
        if proof.verification_status == VerificationStatus::Verified {
            print_cargo_message(
                "Verified",
                format_args!("in {}ms", proof.verification_time_ms),
            );
        }
        print_cargo_message("Saved", format_args!("{}", proof.proof_file_path.display()));
        print_json(&response)
    }
}
