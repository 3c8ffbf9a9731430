//! Proof orchestration for zkcalc.
//!
//! A request names an [`Operation`]. [`ZkCalc::execute`] resolves the guest
//! binary for it through the [`registry`], proves it with the configured
//! [`backend`], optionally signs the proved result, persists the receipt as an
//! [`artifact`] and verifies it once before reporting. Persisted artifacts are
//! checked again later by [`verifier::Verifier`].

pub mod artifact;
pub mod backend;
pub mod config;
pub mod e2e;
pub mod engine;
pub mod error;
pub mod fixed_point;
pub mod manifest;
pub mod operation;
pub mod process;
pub mod receipt;
pub mod registry;
pub mod secret_store;
pub mod signer;
pub mod synthesizer;
pub mod toolchain;
pub mod utils;
pub mod verifier;

pub use config::{BackendConfig, ToolchainConfig, ZkCalcConfig};
pub use e2e::{Computation, ProofResponse, ZkCalc, ZkProof};
pub use error::{Error, ErrorKind, Result};
pub use operation::{Operation, OperationKind, OperationRequest, ResultValue};
pub use receipt::{ImageId, ProofMode, ProofReceipt};
pub use registry::{BuildState, GuestDescriptor, SourceKind};
pub use secret_store::{FileSecretStore, SecretStore};
pub use signer::AuthenticationRecord;
pub use verifier::{VerificationOutcome, VerificationStatus};
