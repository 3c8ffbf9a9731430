//! The workspace manifest dynamic guests are registered into while they
//! build. The file is rendered in full from the member set on every change.

use crate::error::Result;
use std::{
    collections::BTreeSet,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

#[derive(Debug)]
pub struct BuildManifest {
    workspace: PathBuf,
    members: BTreeSet<String>,
    revision: u64,
}

impl BuildManifest {
    /// Nothing is written until the first registration.
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            members: BTreeSet::new(),
            revision: 0,
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn path(&self) -> PathBuf {
        self.workspace.join("Cargo.toml")
    }

    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(String::as_str)
    }

    pub fn contains(&self, member: &str) -> bool {
        self.members.contains(member)
    }

    /// Number of times the manifest file has been written.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn register(&mut self, member: &str) -> Result<()> {
        if self.members.insert(member.to_string()) {
            if let Err(e) = self.write() {
                self.members.remove(member);
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn deregister(&mut self, member: &str) -> Result<()> {
        if self.members.remove(member) {
            self.write()?;
        }
        Ok(())
    }

    fn render(&self) -> String {
        let mut out = String::from("[workspace]\nmembers = [\n");
        for member in &self.members {
            out.push_str(&format!("  \"{member}\",\n"));
        }
        out.push_str("]\nresolver = \"2\"\n\n[profile.release]\ndebug = 1\nlto = true\n");
        out
    }

    /// Replaces the file atomically so a concurrent reader never sees a
    /// half-written manifest.
    fn write(&mut self) -> Result<()> {
        fs::create_dir_all(&self.workspace)?;
        let mut file = tempfile::NamedTempFile::new_in(&self.workspace)?;
        file.write_all(self.render().as_bytes())?;
        file.persist(self.path()).map_err(|e| e.error)?;
        self.revision += 1;
        Ok(())
    }
}
