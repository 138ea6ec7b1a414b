// src/prefix.rs

//! Layout of the user-owned installation prefix.
//!
//! Everything lilith touches lives below one directory (default
//! `$HOME/.lilith`): the mirrored `usr/local` trees of installed
//! packages, the installed-set store, per-package manifests, the
//! catalogue cache and per-invocation scratch space.

use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// Install prefix the upstream packages were built for.
pub const UPSTREAM_PREFIX: &str = "/usr/local";

/// Standard subtrees mirrored from upstream packages.
const SUBDIRS: &[&str] = &["bin", "sbin", "lib", "libdata", "include", "share"];

/// A user-owned prefix tree.
#[derive(Debug, Clone)]
pub struct Prefix {
    root: PathBuf,
}

impl Prefix {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn lib_dir(&self) -> PathBuf {
        self.root.join("lib")
    }

    pub fn manifests_dir(&self) -> PathBuf {
        self.root.join("manifests")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    /// The line-oriented installed-set store.
    pub fn store_path(&self) -> PathBuf {
        self.root.join("installed_packages.txt")
    }

    /// Manifest document for one installed package.
    pub fn manifest_path(&self, name: &str) -> PathBuf {
        self.manifests_dir().join(format!("{name}.manifest"))
    }

    /// Extracted catalogue feed.
    pub fn catalog_path(&self) -> PathBuf {
        self.cache_dir().join("packagesite.yaml")
    }

    /// Last downloaded catalogue archive.
    pub fn catalog_archive_path(&self) -> PathBuf {
        self.cache_dir().join("packagesite.tzst")
    }

    /// Create the prefix skeleton. Idempotent.
    pub fn init(&self) -> Result<()> {
        for dir in SUBDIRS {
            fs::create_dir_all(self.root.join(dir))?;
        }
        fs::create_dir_all(self.manifests_dir())?;
        fs::create_dir_all(self.cache_dir())?;
        fs::create_dir_all(self.tmp_dir())?;
        Ok(())
    }

    /// Uniquely named scratch directory under `tmp/`, removed on drop.
    pub fn scratch_dir(&self) -> Result<TempDir> {
        fs::create_dir_all(self.tmp_dir())?;
        Ok(tempfile::tempdir_in(self.tmp_dir())?)
    }

    /// Best-effort removal of scratch entries left behind by crashed runs.
    pub fn sweep_scratch(&self) {
        let tmp = self.tmp_dir();
        let Ok(entries) = fs::read_dir(&tmp) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            debug!("sweeping stale scratch entry {}", path.display());
            let removed = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            if let Err(e) = removed {
                debug!("could not sweep {}: {}", path.display(), e);
            }
        }
    }

    /// Translate an absolute upstream path into this prefix.
    ///
    /// `/usr/local/bin/foo` becomes `<root>/bin/foo`; paths outside the
    /// upstream prefix are not ours and yield `None`.
    pub fn rewrite_upstream(&self, upstream: &str) -> Option<PathBuf> {
        let rel = upstream.strip_prefix(UPSTREAM_PREFIX)?;
        let rel = rel.trim_start_matches('/');
        if rel.is_empty() {
            return None;
        }
        Some(self.root.join(rel))
    }
}
