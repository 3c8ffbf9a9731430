use crate::{
    config::ToolchainConfig,
    error::{Error, Result},
    process,
};
use async_trait::async_trait;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::process::Command;

/// Compiles guest packages for the zkVM target.
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Builds every member of the workspace at `manifest_path`. `name` is used
    /// in diagnostics only.
    async fn build(&self, name: &str, manifest_path: &Path, timeout: Duration) -> Result<()>;

    /// Where a build of `workspace` leaves the binary of `package`.
    fn elf_path(&self, workspace: &Path, package: &str) -> PathBuf;
}

/// Shells out to a cargo-style guest builder, `cargo risczero build` by default.
#[derive(Clone, Debug, Default)]
pub struct CargoToolchain {
    config: ToolchainConfig,
}

impl CargoToolchain {
    pub fn new(config: ToolchainConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Toolchain for CargoToolchain {
    #[tracing::instrument(skip_all, name = "toolchain_build", fields(guest = name, profiling_3))]
    async fn build(&self, name: &str, manifest_path: &Path, timeout: Duration) -> Result<()> {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .arg("--manifest-path")
            .arg(manifest_path);
        let output = process::run(&mut cmd, &self.config.program, timeout)
            .await
            .map_err(|e| match e {
                Error::Timeout { timeout, .. } => Error::BuildTimeout {
                    name: name.to_string(),
                    timeout,
                },
                Error::ExecutionFailed(diagnostics) => Error::BuildFailed {
                    name: name.to_string(),
                    diagnostics,
                },
                e => e,
            })?;
        if !output.success() {
            return Err(Error::BuildFailed {
                name: name.to_string(),
                diagnostics: output.diagnostics(),
            });
        }
        tracing::info!("built {name}");
        Ok(())
    }

    fn elf_path(&self, workspace: &Path, package: &str) -> PathBuf {
        workspace
            .join("target")
            .join(&self.config.elf_subdir)
            .join(package)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn sh(script: &str) -> CargoToolchain {
        CargoToolchain::new(ToolchainConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string(), "sh".to_string()],
            ..ToolchainConfig::default()
        })
    }

    #[tokio::test]
    async fn test_build_passes_manifest_path() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("seen");
        let toolchain = sh(&format!("echo \"$2\" > {}", marker.display()));
        let manifest = dir.path().join("Cargo.toml");
        toolchain
            .build("guests", &manifest, Duration::from_secs(10))
            .await
            .unwrap();
        let seen = std::fs::read_to_string(marker).unwrap();
        assert_eq!(seen.trim(), manifest.display().to_string());
    }

    #[tokio::test]
    async fn test_build_failure_keeps_diagnostics() {
        let toolchain = sh("echo 'error[E0425]: cannot find value `y`' >&2; exit 101");
        let err = toolchain
            .build("guest-dyn-abc", Path::new("Cargo.toml"), Duration::from_secs(10))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BuildFailed);
        assert!(err.to_string().contains("cannot find value `y`"));
    }

    #[tokio::test]
    async fn test_build_timeout_is_retryable() {
        let toolchain = sh("sleep 30");
        let err = toolchain
            .build("guest-dyn-abc", Path::new("Cargo.toml"), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BuildTimeout);
        assert!(err.is_retryable());
        assert_eq!(err.hint(), Some("pre-build outside the request path"));
    }

    #[test]
    fn test_elf_path_layout() {
        let toolchain = CargoToolchain::default();
        assert_eq!(
            toolchain.elf_path(Path::new("/ws"), "add"),
            PathBuf::from("/ws/target/riscv32im-risc0-zkvm-elf/docker/add")
        );
    }
}
