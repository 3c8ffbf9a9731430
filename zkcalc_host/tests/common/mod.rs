#![allow(dead_code)]

use async_trait::async_trait;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tempfile::TempDir;
use zkcalc_host::{
    backend::{DevBackend, ExternalBackend, ProverBackend},
    secret_store::FileSecretStore,
    toolchain::Toolchain,
    OperationKind, Result, ZkCalc, ZkCalcConfig,
};

pub const PASSPHRASE: &str = "correct horse battery staple";

/// Copies each member's `main.rs` out as its binary and counts builds.
#[derive(Default)]
pub struct FakeToolchain {
    builds: AtomicUsize,
}

impl FakeToolchain {
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Toolchain for FakeToolchain {
    async fn build(&self, name: &str, manifest_path: &Path, _timeout: Duration) -> Result<()> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        let workspace = manifest_path.parent().unwrap();
        let source = fs::read(workspace.join(name).join("src/main.rs"))?;
        let elf = self.elf_path(workspace, name);
        fs::create_dir_all(elf.parent().unwrap())?;
        fs::write(elf, source)?;
        Ok(())
    }

    fn elf_path(&self, workspace: &Path, package: &str) -> PathBuf {
        workspace.join("target").join("fake").join(package)
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub config: Arc<ZkCalcConfig>,
    pub toolchain: Arc<FakeToolchain>,
    pub calc: ZkCalc,
}

impl Harness {
    pub fn artifacts(&self) -> Vec<PathBuf> {
        match fs::read_dir(&self.config.artifact_dir) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => vec![],
        }
    }

    pub async fn add_key(&self, key_id: &str) -> [u8; 32] {
        FileSecretStore::new(&self.config.keys_dir)
            .generate(key_id, PASSPHRASE)
            .await
            .unwrap()
    }
}

/// Writes a stand-in binary for every built-in guest.
pub fn build_builtins(config: &ZkCalcConfig) {
    fs::create_dir_all(&config.builtin_elf_dir).unwrap();
    for kind in OperationKind::builtins() {
        fs::write(
            config.builtin_elf_dir.join(kind.to_string()),
            format!("elf:{kind}"),
        )
        .unwrap();
    }
}

fn harness_with(
    backend: impl FnOnce(&Path) -> Arc<dyn ProverBackend>,
    passphrase: Option<&str>,
    builtins: bool,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(ZkCalcConfig {
        passphrase: passphrase.map(str::to_string),
        ..ZkCalcConfig::with_root(dir.path())
    });
    if builtins {
        build_builtins(&config);
    }
    let toolchain = Arc::new(FakeToolchain::default());
    let calc = ZkCalc::with_parts(
        config.clone(),
        toolchain.clone(),
        backend(dir.path()),
        Arc::new(FileSecretStore::new(&config.keys_dir)),
    );
    Harness {
        dir,
        config,
        toolchain,
        calc,
    }
}

/// Dev backend with every built-in guest present.
pub fn dev_harness() -> Harness {
    harness_with(|_| Arc::new(DevBackend), Some(PASSPHRASE), true)
}

/// Dev backend before the build step has run.
pub fn unbuilt_harness() -> Harness {
    harness_with(|_| Arc::new(DevBackend), Some(PASSPHRASE), false)
}

pub fn harness_without_passphrase() -> Harness {
    harness_with(|_| Arc::new(DevBackend), None, true)
}

pub const FAKE_IMAGE: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

/// An external prover whose guests always commit `42i64`.
#[cfg(unix)]
pub fn external_harness() -> Harness {
    harness_with(
        |dir| {
            let script = dir.join("prover.sh");
            fs::write(
                &script,
                format!(
                    r#"
IMAGE={FAKE_IMAGE}
case "$1" in
  prove)
    test -f "$3" || {{ echo "no guest at $3" >&2; exit 1; }}
    printf 'opaque-receipt' > "$7"
    echo '{{"image_id": "'$IMAGE'", "journal": "2a00000000000000"}}'
    ;;
  verify)
    if [ "$(cat "$3")" = "opaque-receipt" ] && [ "$5" = "$IMAGE" ]; then
      echo '{{"verified": true, "journal": "2a00000000000000"}}'
    else
      exit 1
    fi
    ;;
  image-id)
    echo '{{"image_id": "'$IMAGE'"}}'
    ;;
esac
"#
                ),
            )
            .unwrap();
            Arc::new(ExternalBackend::new(
                PathBuf::from("sh"),
                vec![script.display().to_string()],
                Duration::from_secs(30),
                Duration::from_secs(30),
            ))
        },
        Some(PASSPHRASE),
        true,
    )
}
