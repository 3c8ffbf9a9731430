//! Maps operations to guest binaries: built-ins from the out-of-band build of
//! the `guests` package, dynamic guests built on demand from synthesized
//! source and cached by content hash.

use crate::{
    config::ZkCalcConfig,
    error::{Error, Result},
    manifest::BuildManifest,
    operation::OperationKind,
    synthesizer::{self, SynthesizedGuest},
    toolchain::Toolchain,
    utils::random_hex,
};
use serde::Serialize;
use std::{
    collections::{HashMap, HashSet},
    fs,
    io,
    ops::Deref,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex as StdMutex,
    },
    time::SystemTime,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SourceKind {
    Builtin,
    Dynamic,
    Precompiled,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BuildState {
    Unbuilt,
    Building,
    Ready,
    /// Built, but the guest sources changed since.
    Stale,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestDescriptor {
    pub name: String,
    pub operation: OperationKind,
    pub source_kind: SourceKind,
    /// SHA-256 of the original source, dynamic guests only.
    pub content_hash: Option<String>,
    pub elf_path: PathBuf,
    pub state: BuildState,
}

pub struct GuestRegistry {
    config: Arc<ZkCalcConfig>,
    toolchain: Arc<dyn Toolchain>,
    /// Serializes every dynamic build through the one workspace. Held for the
    /// whole build.
    manifest: Arc<Mutex<BuildManifest>>,
    /// Readable while a build holds `manifest`.
    progress: Arc<BuildProgress>,
    hash_locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Mirror of the manifest's member set and revision.
#[derive(Default)]
struct BuildProgress {
    building: StdMutex<HashSet<String>>,
    revision: AtomicU64,
}

impl BuildProgress {
    fn building(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.building
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn sync(&self, manifest: &BuildManifest) {
        self.revision.store(manifest.revision(), Ordering::SeqCst);
    }
}

impl GuestRegistry {
    pub fn new(config: Arc<ZkCalcConfig>, toolchain: Arc<dyn Toolchain>) -> Self {
        let manifest = BuildManifest::new(&config.dynamic_workspace);
        Self {
            config,
            toolchain,
            manifest: Arc::new(Mutex::new(manifest)),
            progress: Default::default(),
            hash_locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Descriptor of a built-in guest. Fails with `GuestNotBuilt` when the
    /// build step has not produced its binary.
    pub fn resolve(&self, operation: OperationKind) -> Result<GuestDescriptor> {
        if !operation.is_builtin() {
            return Err(Error::InvalidRequest(format!(
                "`{operation}` is not a built-in guest"
            )));
        }
        let descriptor = self.describe_builtin(operation);
        match descriptor.state {
            BuildState::Unbuilt => Err(Error::GuestNotBuilt {
                name: descriptor.name,
                path: descriptor.elf_path,
            }),
            BuildState::Stale => {
                tracing::warn!(
                    "guest `{}` is older than its sources, rebuild with `cargo zkcalc build`",
                    descriptor.name
                );
                Ok(descriptor)
            }
            _ => Ok(descriptor),
        }
    }

    pub fn describe_builtin(&self, operation: OperationKind) -> GuestDescriptor {
        let name = operation.to_string();
        let elf_path = self.config.builtin_elf_dir.join(&name);
        let state = match modified(&elf_path) {
            None => BuildState::Unbuilt,
            Some(built) => match newest_source(&self.config.guests_dir) {
                Some(changed) if changed > built => BuildState::Stale,
                _ => BuildState::Ready,
            },
        };
        GuestDescriptor {
            name,
            operation,
            source_kind: SourceKind::Builtin,
            content_hash: None,
            elf_path,
            state,
        }
    }

    pub fn describe_builtins(&self) -> Vec<GuestDescriptor> {
        OperationKind::builtins()
            .map(|op| self.describe_builtin(op))
            .collect()
    }

    /// Builds the `guests` package. This is the out-of-band step `resolve`
    /// asks for.
    #[tracing::instrument(skip_all, name = "build_builtins", fields(profiling_1))]
    pub async fn build_builtins(&self) -> Result<Vec<GuestDescriptor>> {
        let manifest_path = self.config.guests_dir.join("Cargo.toml");
        if !manifest_path.exists() {
            return Err(Error::InvalidRequest(format!(
                "no guest package at {}",
                manifest_path.display()
            )));
        }
        self.toolchain
            .build("guests", &manifest_path, self.config.build_timeout())
            .await?;
        Ok(self.describe_builtins())
    }

    /// A caller-supplied guest binary.
    pub fn resolve_precompiled(&self, elf_path: &Path) -> Result<GuestDescriptor> {
        if !elf_path.is_file() {
            return Err(Error::GuestNotBuilt {
                name: elf_path.display().to_string(),
                path: elf_path.to_path_buf(),
            });
        }
        Ok(GuestDescriptor {
            name: elf_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "precompiled".to_string()),
            operation: OperationKind::Precompiled,
            source_kind: SourceKind::Precompiled,
            content_hash: None,
            elf_path: elf_path.to_path_buf(),
            state: BuildState::Ready,
        })
    }

    /// Screens, synthesizes and builds `source`. Identical sources share one
    /// descriptor and one build unless `force_rebuild` is set.
    pub async fn resolve_dynamic(
        &self,
        source: &str,
        force_rebuild: bool,
    ) -> Result<GuestDescriptor> {
        let guest = synthesizer::synthesize(source)?;
        self.resolve_synthesized(guest, force_rebuild).await
    }

    #[tracing::instrument(
        skip_all,
        name = "resolve_dynamic",
        fields(hash = %guest.source_hash, profiling_2)
    )]
    async fn resolve_synthesized(
        &self,
        guest: SynthesizedGuest,
        force_rebuild: bool,
    ) -> Result<GuestDescriptor> {
        let _same_source = self.lock_source(&guest.source_hash).await;

        let cache = self.config.cache_dynamic_builds;
        let elf_path = if cache {
            self.config
                .dynamic_cache_dir
                .join(format!("{}.elf", guest.source_hash))
        } else {
            // private copy, removed again by `release`
            self.config
                .dynamic_cache_dir
                .join(format!("{}-{}.elf", guest.source_hash, random_hex(4)))
        };
        let descriptor = GuestDescriptor {
            name: guest.package_name.clone(),
            operation: OperationKind::Dynamic,
            source_kind: SourceKind::Dynamic,
            content_hash: Some(guest.source_hash.clone()),
            elf_path,
            state: BuildState::Ready,
        };
        if cache && !force_rebuild && descriptor.elf_path.is_file() {
            tracing::info!("reusing cached build of {}", guest.package_name);
            return Ok(descriptor);
        }

        let manifest = self.manifest.clone().lock_owned().await;
        let registration = Registration::register(manifest, self.progress.clone(), &guest)?;
        self.toolchain
            .build(
                &guest.package_name,
                &registration.manifest_path(),
                self.config.build_timeout(),
            )
            .await?;
        let built = self
            .toolchain
            .elf_path(registration.workspace(), &guest.package_name);
        store_elf(&built, &descriptor.elf_path)?;
        drop(registration);
        tracing::info!("built dynamic guest {}", guest.package_name);
        Ok(descriptor)
    }

    /// Current state of the dynamic guest for `source_hash`. Does not wait for
    /// a running build.
    pub fn dynamic_state(&self, source_hash: &str) -> BuildState {
        let package = synthesizer::package_name(source_hash);
        if self.progress.building().contains(&package) {
            return BuildState::Building;
        }
        let cached = self
            .config
            .dynamic_cache_dir
            .join(format!("{source_hash}.elf"));
        if cached.is_file() {
            BuildState::Ready
        } else {
            BuildState::Unbuilt
        }
    }

    /// Wraps `descriptor` so its binary is released when the lease drops,
    /// including when the caller is cancelled.
    pub fn lease(&self, descriptor: GuestDescriptor) -> GuestLease<'_> {
        GuestLease {
            registry: self,
            descriptor,
        }
    }

    /// Drops a dynamic binary that is not kept for reuse.
    pub fn release(&self, descriptor: &GuestDescriptor) {
        if descriptor.source_kind != SourceKind::Dynamic || self.config.cache_dynamic_builds {
            return;
        }
        if let Err(e) = fs::remove_file(&descriptor.elf_path) {
            tracing::warn!("failed to remove {}: {e}", descriptor.elf_path.display());
        }
    }

    /// Revision of the dynamic build manifest, bumped on every write.
    pub fn manifest_revision(&self) -> u64 {
        self.progress.revision.load(Ordering::SeqCst)
    }

    fn hash_locks(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
        self.hash_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn lock_source(&self, source_hash: &str) -> SourceLock<'_> {
        let lock = self
            .hash_locks()
            .entry(source_hash.to_string())
            .or_default()
            .clone();
        let guard = lock.lock_owned().await;
        SourceLock {
            registry: self,
            source_hash: source_hash.to_string(),
            guard: Some(guard),
        }
    }
}

/// Holds the per-source lock. The map entry goes away with the last holder.
struct SourceLock<'a> {
    registry: &'a GuestRegistry,
    source_hash: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SourceLock<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.registry.hash_locks();
        if locks
            .get(&self.source_hash)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.source_hash);
        }
    }
}

/// A resolved guest in use. Dropping it releases a binary that is not cached.
pub struct GuestLease<'a> {
    registry: &'a GuestRegistry,
    descriptor: GuestDescriptor,
}

impl Deref for GuestLease<'_> {
    type Target = GuestDescriptor;

    fn deref(&self) -> &GuestDescriptor {
        &self.descriptor
    }
}

impl Drop for GuestLease<'_> {
    fn drop(&mut self) {
        self.registry.release(&self.descriptor);
    }
}

/// A dynamic package registered in the build manifest. Dropping it removes the
/// entry and the package directory, whichever way the build ended.
struct Registration {
    manifest: OwnedMutexGuard<BuildManifest>,
    progress: Arc<BuildProgress>,
    package: String,
    package_dir: PathBuf,
}

impl Registration {
    fn register(
        manifest: OwnedMutexGuard<BuildManifest>,
        progress: Arc<BuildProgress>,
        guest: &SynthesizedGuest,
    ) -> Result<Self> {
        let package_dir = manifest.workspace().join(&guest.package_name);
        let mut registration = Registration {
            manifest,
            progress,
            package: guest.package_name.clone(),
            package_dir,
        };
        let src = registration.package_dir.join("src");
        fs::create_dir_all(&src)?;
        fs::write(registration.package_dir.join("Cargo.toml"), guest.cargo_toml())?;
        fs::write(src.join("main.rs"), &guest.main_rs)?;
        registration.manifest.register(&registration.package)?;
        registration.progress.sync(&registration.manifest);
        registration
            .progress
            .building()
            .insert(registration.package.clone());
        Ok(registration)
    }

    fn workspace(&self) -> &Path {
        self.manifest.workspace()
    }

    fn manifest_path(&self) -> PathBuf {
        self.manifest.path()
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Err(e) = self.manifest.deregister(&self.package) {
            tracing::warn!("failed to deregister {}: {e}", self.package);
        }
        self.progress.sync(&self.manifest);
        self.progress.building().remove(&self.package);
        match fs::remove_dir_all(&self.package_dir) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => {
                tracing::warn!("failed to remove {}: {e}", self.package_dir.display());
            }
            _ => {}
        }
    }
}

/// Copies a fresh build into the cache, replacing any previous binary in one
/// rename.
fn store_elf(built: &Path, dest: &Path) -> Result<()> {
    let dir = dest
        .parent()
        .ok_or_else(|| Error::InvalidRequest(format!("bad cache path {}", dest.display())))?;
    fs::create_dir_all(dir)?;
    let bytes = fs::read(built).map_err(|e| {
        Error::ExecutionFailed(format!(
            "build produced no binary at {}: {e}",
            built.display()
        ))
    })?;
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    io::Write::write_all(&mut file, &bytes)?;
    file.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Newest modification time among the guest package's sources.
fn newest_source(guests_dir: &Path) -> Option<SystemTime> {
    fn walk(dir: &Path, newest: &mut Option<SystemTime>) {
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk(&path, newest);
            } else if path.extension().is_some_and(|ext| ext == "rs") {
                *newest = (*newest).max(modified(&path));
            }
        }
    }
    let mut newest = modified(&guests_dir.join("Cargo.toml"));
    walk(&guests_dir.join("src"), &mut newest);
    newest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use async_trait::async_trait;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    /// Writes each registered member's `main.rs` as its "binary".
    #[derive(Default)]
    struct FakeToolchain {
        builds: AtomicUsize,
        fail: bool,
        hang: bool,
    }

    #[async_trait]
    impl Toolchain for FakeToolchain {
        async fn build(&self, name: &str, manifest_path: &Path, timeout: Duration) -> Result<()> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            let manifest = fs::read_to_string(manifest_path)?;
            assert!(manifest.contains(&format!("\"{name}\"")));
            if self.hang {
                tokio::time::sleep(timeout * 2).await;
                return Err(Error::BuildTimeout {
                    name: name.to_string(),
                    timeout,
                });
            }
            if self.fail {
                return Err(Error::BuildFailed {
                    name: name.to_string(),
                    diagnostics: "error: expected expression".to_string(),
                });
            }
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

    fn registry(root: &Path, toolchain: Arc<FakeToolchain>) -> GuestRegistry {
        GuestRegistry::new(Arc::new(ZkCalcConfig::with_root(root)), toolchain)
    }

    #[test]
    fn test_builtin_not_built() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path(), Default::default());
        let err = registry.resolve(OperationKind::Add).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GuestNotBuilt);
        assert_eq!(err.hint(), Some("run the build step first (`cargo zkcalc build`)"));
        assert!(registry
            .describe_builtins()
            .iter()
            .all(|g| g.state == BuildState::Unbuilt));
    }

    #[test]
    fn test_builtin_ready() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path(), Default::default());
        let elf_dir = &registry.config.builtin_elf_dir;
        fs::create_dir_all(elf_dir).unwrap();
        fs::write(elf_dir.join("modexp"), b"elf").unwrap();
        let guest = registry.resolve(OperationKind::Modexp).unwrap();
        assert_eq!(guest.state, BuildState::Ready);
        assert_eq!(guest.name, "modexp");
        assert_eq!(guest.source_kind, SourceKind::Builtin);
        assert!(registry.resolve(OperationKind::Dynamic).is_err());
    }

    #[tokio::test]
    async fn test_identical_sources_share_one_build() {
        let dir = tempfile::tempdir().unwrap();
        let toolchain = Arc::new(FakeToolchain::default());
        let registry = registry(dir.path(), toolchain.clone());

        let first = registry.resolve_dynamic("40 + 2", false).await.unwrap();
        let second = registry.resolve_dynamic("40 + 2", false).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(toolchain.builds.load(Ordering::SeqCst), 1);
        let hash = first.content_hash.as_ref().unwrap();
        assert_eq!(registry.dynamic_state(hash), BuildState::Ready);

        registry.resolve_dynamic("40 + 2", true).await.unwrap();
        assert_eq!(toolchain.builds.load(Ordering::SeqCst), 2);

        let other = registry.resolve_dynamic("41 + 2", false).await.unwrap();
        assert_ne!(other.content_hash, first.content_hash);
        assert_ne!(other.elf_path, first.elf_path);
        let built = fs::read_to_string(&other.elf_path).unwrap();
        assert!(built.contains("41 + 2"));
        assert!(registry.hash_locks().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_identical_sources_build_once() {
        let dir = tempfile::tempdir().unwrap();
        let toolchain = Arc::new(FakeToolchain::default());
        let registry = Arc::new(registry(dir.path(), toolchain.clone()));
        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.resolve_dynamic("7 * 6", false).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(toolchain.builds.load(Ordering::SeqCst), 1);
        assert!(registry.hash_locks().is_empty());
    }

    #[tokio::test]
    async fn test_build_leaves_no_registration() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path(), Default::default());
        let guest = registry.resolve_dynamic("1", false).await.unwrap();
        let workspace = &registry.config.dynamic_workspace;
        let manifest = fs::read_to_string(workspace.join("Cargo.toml")).unwrap();
        assert!(!manifest.contains(&guest.name));
        assert!(!workspace.join(&guest.name).exists());
    }

    #[tokio::test]
    async fn test_failed_build_deregisters() {
        let dir = tempfile::tempdir().unwrap();
        let toolchain = Arc::new(FakeToolchain {
            fail: true,
            ..Default::default()
        });
        let registry = registry(dir.path(), toolchain);
        let err = registry.resolve_dynamic("let x = ; x", false).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BuildFailed);
        assert!(err.to_string().contains("expected expression"));

        let workspace = &registry.config.dynamic_workspace;
        let manifest = fs::read_to_string(workspace.join("Cargo.toml")).unwrap();
        assert!(!manifest.contains("guest-dyn-"));
        assert_eq!(fs::read_dir(workspace).unwrap().count(), 1);
        assert_eq!(registry.manifest_revision(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_build_deregisters() {
        let dir = tempfile::tempdir().unwrap();
        let toolchain = Arc::new(FakeToolchain {
            hang: true,
            ..Default::default()
        });
        let registry = registry(dir.path(), toolchain);
        let build = registry.resolve_dynamic("5", false);
        assert!(tokio::time::timeout(Duration::from_secs(1), build).await.is_err());

        let workspace = &registry.config.dynamic_workspace;
        let manifest = fs::read_to_string(workspace.join("Cargo.toml")).unwrap();
        assert!(!manifest.contains("guest-dyn-"));
        let hash = synthesizer::source_hash("5");
        assert_eq!(registry.dynamic_state(&hash), BuildState::Unbuilt);
        assert!(registry.hash_locks().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_is_building_while_the_build_runs() {
        let dir = tempfile::tempdir().unwrap();
        let toolchain = Arc::new(FakeToolchain {
            hang: true,
            ..Default::default()
        });
        let registry = Arc::new(registry(dir.path(), toolchain));
        let hash = synthesizer::source_hash("5");
        let build = tokio::spawn({
            let registry = registry.clone();
            async move { registry.resolve_dynamic("5", false).await }
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(registry.dynamic_state(&hash), BuildState::Building);
        assert_eq!(registry.manifest_revision(), 1);

        build.abort();
        assert!(build.await.unwrap_err().is_cancelled());
        assert_eq!(registry.dynamic_state(&hash), BuildState::Unbuilt);
        assert_eq!(registry.manifest_revision(), 2);
    }

    #[tokio::test]
    async fn test_rejected_source_never_touches_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let toolchain = Arc::new(FakeToolchain::default());
        let registry = registry(dir.path(), toolchain.clone());
        let err = registry
            .resolve_dynamic("std::fs::remove_dir_all(\"/\").is_ok() as i64", false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsafeSourceRejected);
        assert_eq!(registry.manifest_revision(), 0);
        assert_eq!(toolchain.builds.load(Ordering::SeqCst), 0);
        assert!(!registry.config.dynamic_workspace.exists());
    }

    #[tokio::test]
    async fn test_uncached_builds_are_released() {
        let dir = tempfile::tempdir().unwrap();
        let toolchain = Arc::new(FakeToolchain::default());
        let config = ZkCalcConfig {
            cache_dynamic_builds: false,
            ..ZkCalcConfig::with_root(dir.path())
        };
        let registry = GuestRegistry::new(Arc::new(config), toolchain.clone());
        let first = registry.resolve_dynamic("3", false).await.unwrap();
        let second = registry.resolve_dynamic("3", false).await.unwrap();
        assert_eq!(toolchain.builds.load(Ordering::SeqCst), 2);
        assert_ne!(first.elf_path, second.elf_path);
        registry.release(&first);
        assert!(!first.elf_path.exists());
        assert!(second.elf_path.exists());

        let lease = registry.lease(second.clone());
        assert_eq!(lease.elf_path, second.elf_path);
        drop(lease);
        assert!(!second.elf_path.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_caller_releases_its_binary() {
        let dir = tempfile::tempdir().unwrap();
        let config = ZkCalcConfig {
            cache_dynamic_builds: false,
            ..ZkCalcConfig::with_root(dir.path())
        };
        let registry = GuestRegistry::new(Arc::new(config), Arc::new(FakeToolchain::default()));
        let guest = registry.resolve_dynamic("9", false).await.unwrap();
        let elf_path = guest.elf_path.clone();
        let proving = async {
            let _lease = registry.lease(guest);
            tokio::time::sleep(Duration::from_secs(3600)).await;
        };
        assert!(tokio::time::timeout(Duration::from_secs(1), proving).await.is_err());
        assert!(!elf_path.exists());
    }

    #[tokio::test]
    async fn test_cached_lease_keeps_binary() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path(), Default::default());
        let guest = registry.resolve_dynamic("8", false).await.unwrap();
        drop(registry.lease(guest.clone()));
        assert!(guest.elf_path.is_file());
    }
}
