use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// Which prover drives the guests.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// In-process execution with hash-bound dev receipts.
    #[default]
    Dev,
    /// An external host prover binary.
    External {
        program: PathBuf,
        #[serde(default)]
        args: Vec<String>,
    },
}

/// The guest build command. It is run as `program args.. --manifest-path M`
/// and must leave binaries under `<target>/<elf_subdir>/<package>`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    pub program: String,
    pub args: Vec<String>,
    pub elf_subdir: PathBuf,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            program: "cargo".to_string(),
            args: vec!["risczero".to_string(), "build".to_string()],
            elf_subdir: PathBuf::from("riscv32im-risc0-zkvm-elf/docker"),
        }
    }
}

/// Process-wide configuration, built once at startup and shared by `Arc`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZkCalcConfig {
    /// The built-in guest package.
    pub guests_dir: PathBuf,
    /// Where the built-in guest binaries land after `cargo zkcalc build`.
    pub builtin_elf_dir: PathBuf,
    /// Workspace whose manifest dynamic guests are registered into while they build.
    pub dynamic_workspace: PathBuf,
    /// Content-addressed store of built dynamic guests.
    pub dynamic_cache_dir: PathBuf,
    pub cache_dynamic_builds: bool,
    pub artifact_dir: PathBuf,
    pub keys_dir: PathBuf,
    #[serde(skip_serializing)]
    pub passphrase: Option<String>,
    pub backend: BackendConfig,
    pub toolchain: ToolchainConfig,
    pub build_timeout_secs: u64,
    pub prove_timeout_secs: u64,
    pub verify_timeout_secs: u64,
}

impl Default for ZkCalcConfig {
    fn default() -> Self {
        Self::with_root(".")
    }
}

impl ZkCalcConfig {
    /// Default layout relative to a project root.
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let toolchain = ToolchainConfig::default();
        let guests_dir = root.join("guests");
        Self {
            builtin_elf_dir: guests_dir.join("target").join(&toolchain.elf_subdir),
            guests_dir,
            dynamic_workspace: root.join("target").join("zkcalc-dynamic"),
            dynamic_cache_dir: root.join("target").join("zkcalc-dynamic-cache"),
            cache_dynamic_builds: true,
            artifact_dir: root.join("proofs"),
            keys_dir: root.join("keys"),
            passphrase: None,
            backend: BackendConfig::default(),
            toolchain,
            build_timeout_secs: 30 * 60,
            prove_timeout_secs: 15 * 60,
            verify_timeout_secs: 2 * 60,
        }
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }

    pub fn prove_timeout(&self) -> Duration {
        Duration::from_secs(self.prove_timeout_secs)
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_secs)
    }
}
