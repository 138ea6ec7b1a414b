// src/engine.rs

//! The package-management engine.
//!
//! One `Engine` value carries everything a command needs: the prefix
//! layout, the installed-set store, the HTTP client, the probed ABI and
//! the loaded catalogue. Install recursion threads an explicit stack set
//! through the calls so dependency cycles are cut with a warning instead
//! of looping.

use crate::abi::Abi;
use crate::archive;
use crate::error::{Error, Result};
use crate::linkfarm;
use crate::output;
use crate::prefix::Prefix;
use crate::repository::catalog::{dep_base, Catalog, CatalogEntry, SearchHit, SearchMode};
use crate::repository::{self, RepositoryClient};
use crate::store::manifest::Manifest;
use crate::store::{InstalledRecord, InstalledStore};
use crate::system;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Flags accepted by `install`.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    /// Install dependencies even when the host system shadows them.
    pub full_deps: bool,
    /// Skip dependency resolution entirely; wins over `full_deps`.
    pub no_deps: bool,
}

/// Flags accepted by `remove`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveOptions {
    /// Ignore installed dependents.
    pub force: bool,
    /// Keep orphaned dependencies installed.
    pub no_auto_remove: bool,
    /// Suppress the dead-symlink sweep (used by recursive orphan
    /// removal; the sweep runs once at the top-level call).
    pub no_cleanup: bool,
}

pub struct Engine {
    prefix: Prefix,
    store: InstalledStore,
    client: RepositoryClient,
    repo_url_override: Option<String>,
    abi: Option<Abi>,
    catalog: Option<Catalog>,
}

impl Engine {
    /// Engine over the given prefix root, talking to the ABI-derived
    /// upstream repository.
    pub fn new(root: PathBuf) -> Result<Self> {
        Self::create(root, None)
    }

    /// Engine over the given prefix root with an explicit repository
    /// base URL (the `.../All` directory).
    pub fn with_repo_url(root: PathBuf, repo_url: impl Into<String>) -> Result<Self> {
        Self::create(root, Some(repo_url.into()))
    }

    fn create(root: PathBuf, repo_url_override: Option<String>) -> Result<Self> {
        let prefix = Prefix::new(root);
        prefix.sweep_scratch();
        let store = InstalledStore::new(prefix.store_path());
        let client = RepositoryClient::new()?;
        Ok(Self {
            prefix,
            store,
            client,
            repo_url_override,
            abi: None,
            catalog: None,
        })
    }

    /// Repository base URL, probing the host ABI on first use.
    fn repo_url(&mut self) -> Result<String> {
        if let Some(url) = &self.repo_url_override {
            return Ok(url.clone());
        }
        if self.abi.is_none() {
            let abi = Abi::probe()?;
            output::info(format!("host ABI: {abi}"));
            self.abi = Some(abi);
        }
        self.abi
            .as_ref()
            .map(|abi| abi.repository_url())
            .ok_or_else(|| Error::EnvProbe("ABI unavailable".to_string()))
    }

    /// Catalogue for query commands; fails if never refreshed.
    fn catalog(&mut self) -> Result<&Catalog> {
        if self.catalog.is_none() {
            self.catalog = Some(Catalog::load(&self.prefix.catalog_path())?);
        }
        self.catalog.as_ref().ok_or(Error::MetadataMissing)
    }

    /// Catalogue for install; refreshes automatically on first use.
    fn ensure_catalog(&mut self) -> Result<&Catalog> {
        if self.catalog.is_none() {
            if !self.prefix.catalog_path().exists() {
                let repo = self.repo_url()?;
                repository::refresh(&self.client, &repo, &self.prefix)?;
            }
            self.catalog = Some(Catalog::load(&self.prefix.catalog_path())?);
        }
        self.catalog.as_ref().ok_or(Error::MetadataMissing)
    }

    /// Download the latest catalogue unconditionally.
    pub fn update_metadata(&mut self) -> Result<()> {
        let repo = self.repo_url()?;
        repository::refresh(&self.client, &repo, &self.prefix)?;
        let catalog = Catalog::load(&self.prefix.catalog_path())?;
        if catalog.is_empty() {
            output::warning("the downloaded package catalogue has no records");
        }
        self.catalog = Some(catalog);
        Ok(())
    }

    /// Install a package plus its missing dependencies.
    pub fn install(&mut self, name: &str, opts: &InstallOptions) -> Result<()> {
        let mut stack = HashSet::new();
        self.install_inner(name, *opts, &mut stack)
    }

    fn install_inner(
        &mut self,
        name: &str,
        opts: InstallOptions,
        stack: &mut HashSet<String>,
    ) -> Result<()> {
        if !stack.insert(name.to_string()) {
            output::warning(format!("dependency cycle detected at '{name}', skipping"));
            return Ok(());
        }

        self.prefix.init()?;
        let entry = {
            let catalog = self.ensure_catalog()?;
            catalog
                .lookup(name)
                .cloned()
                .ok_or_else(|| Error::NotFound(name.to_string()))?
        };
        let full_name = entry.name.clone();

        if self.store.contains(name)? {
            output::warning(format!("package '{name}' is already installed"));
            return Ok(());
        }

        if !opts.no_deps {
            for dep in entry.deps.keys() {
                let base = dep_base(dep).to_string();
                if self.store.contains(&base)? {
                    debug!("dependency '{base}' already installed");
                    continue;
                }
                if !opts.full_deps && system::shadowed(&base) {
                    output::info(format!(
                        "dependency '{base}' is provided by the host system, skipping"
                    ));
                    continue;
                }
                let dep_opts = InstallOptions {
                    full_deps: opts.full_deps,
                    no_deps: false,
                };
                self.install_inner(&base, dep_opts, stack)?;
            }
        }

        let repo = self.repo_url()?;
        let filename = archive_filename(&entry);
        let url = format!("{repo}/{filename}");
        let archive_path = self.prefix.tmp_dir().join(&filename);

        output::info(format!("fetching {full_name}-{}", entry.version));
        self.client.download(&url, &archive_path)?;

        let result = self.install_archive(name, &archive_path);
        let _ = fs::remove_file(&archive_path);
        result?;

        output::success(format!("installed {full_name}-{}", entry.version));
        Ok(())
    }

    /// Unpack a fetched archive and land it in the prefix.
    fn install_archive(&mut self, name: &str, archive_path: &Path) -> Result<()> {
        let scratch = self.prefix.scratch_dir()?;
        archive::extract(archive_path, scratch.path())?;

        let manifest_src = scratch.path().join("+MANIFEST");
        let manifest_dst = self.prefix.manifest_path(name);
        if manifest_src.is_file() {
            if let Some(parent) = manifest_dst.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&manifest_src, &manifest_dst)?;
        } else {
            // an installed record must always have a manifest beside it
            debug!("archive for '{name}' carries no +MANIFEST, writing a sentinel one");
            let manifest = Manifest {
                name: name.to_string(),
                ..Manifest::default()
            };
            manifest.save(&manifest_dst)?;
        }

        let result = self.land_payload(name, scratch.path(), &manifest_dst);
        if result.is_err() {
            // a failed install must not look installed later
            let _ = fs::remove_file(&manifest_dst);
        }
        result
    }

    fn land_payload(&mut self, name: &str, scratch: &Path, manifest_path: &Path) -> Result<()> {
        let payload = scratch.join("usr/local");
        if payload.is_dir() {
            mirror_tree(&payload, self.prefix.root())?;
        }

        linkfarm::reindex(&self.prefix.lib_dir())?;

        let manifest = Manifest::load_or_default(manifest_path);
        self.store.add(&InstalledRecord {
            name: name.to_string(),
            version: Manifest::field_or_unknown(&manifest.version),
            comment: Manifest::field_or_unknown(&manifest.comment),
            origin: Manifest::field_or_unknown(&manifest.origin),
        })?;
        Ok(())
    }

    /// Remove an installed package.
    pub fn remove(&mut self, name: &str, opts: &RemoveOptions) -> Result<()> {
        self.remove_inner(name, *opts)?;
        if !opts.no_cleanup {
            linkfarm::purge(&self.prefix.lib_dir())?;
        }
        Ok(())
    }

    fn remove_inner(&mut self, name: &str, opts: RemoveOptions) -> Result<()> {
        if !self.store.contains(name)? {
            return Err(Error::NotInstalled(name.to_string()));
        }

        if !opts.force {
            let dependents = self.required_by(name)?;
            if !dependents.is_empty() {
                return Err(Error::RequiredBy {
                    name: name.to_string(),
                    dependents: dependents.join(", "),
                });
            }
        }

        let manifest_path = self.prefix.manifest_path(name);
        let manifest = Manifest::load_or_default(&manifest_path);
        let saved_deps: Vec<String> = manifest.deps.keys().cloned().collect();

        for upstream in manifest.files.keys() {
            let Some(local) = self.prefix.rewrite_upstream(upstream) else {
                debug!("manifest path {upstream} is outside the upstream prefix");
                continue;
            };
            match fs::symlink_metadata(&local) {
                Ok(meta) if meta.is_dir() => {
                    // directories only go when empty
                    let _ = fs::remove_dir(&local);
                }
                Ok(_) => fs::remove_file(&local)?,
                Err(_) => {}
            }
        }

        prune_empty_dirs(self.prefix.root());

        self.store.remove(name)?;
        match fs::remove_file(&manifest_path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }
        output::success(format!("removed {name}"));

        if !opts.no_auto_remove {
            for dep in saved_deps {
                let base = dep_base(&dep).to_string();
                if !self.store.contains(&base)? {
                    continue;
                }
                if !self.required_by(&base)?.is_empty() {
                    continue;
                }
                output::info(format!("removing orphaned dependency '{base}'"));
                let dep_opts = RemoveOptions {
                    no_cleanup: true,
                    ..opts
                };
                self.remove_inner(&base, dep_opts)?;
            }
        }
        Ok(())
    }

    /// Installed packages whose manifests list `name` as a dependency.
    fn required_by(&self, name: &str) -> Result<Vec<String>> {
        let mut dependents = Vec::new();
        for record in self.store.list()? {
            if record.name == name {
                continue;
            }
            let manifest = Manifest::load_or_default(&self.prefix.manifest_path(&record.name));
            if manifest.depends_on(name) {
                dependents.push(record.name);
            }
        }
        Ok(dependents)
    }

    /// Reinstall a package when the catalogue has a newer version.
    pub fn update(&mut self, name: &str) -> Result<()> {
        let record = self
            .store
            .get(name)?
            .ok_or_else(|| Error::NotInstalled(name.to_string()))?;

        self.update_metadata()?;
        let latest = {
            let catalog = self.catalog()?;
            catalog
                .lookup(name)
                .ok_or_else(|| Error::NotFound(name.to_string()))?
                .version
                .clone()
        };

        if latest == record.version {
            output::info(format!("'{name}' is already at the latest version ({latest})"));
            return Ok(());
        }

        output::info(format!("updating {name} {} -> {latest}", record.version));
        self.remove(name, &RemoveOptions::default())?;
        self.install(name, &InstallOptions::default())
    }

    /// All installed records, in store order.
    pub fn list(&self) -> Result<Vec<InstalledRecord>> {
        self.store.list()
    }

    /// Catalogue record for an exact name; no prefix fallback.
    pub fn info(&mut self, name: &str) -> Result<CatalogEntry> {
        let catalog = self.catalog()?;
        catalog
            .exact(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    /// Search the catalogue.
    pub fn search(&mut self, pattern: &str, mode: SearchMode) -> Result<Vec<SearchHit>> {
        self.catalog()?.search(pattern, mode)
    }

    /// Drop dead symlinks, then rebuild missing aliases.
    pub fn fix_symlinks(&self) -> Result<()> {
        let lib = self.prefix.lib_dir();
        let purged = linkfarm::purge(&lib)?;
        let created = linkfarm::reindex(&lib)?;
        output::info(format!("symlink farm: {purged} purged, {created} created"));
        Ok(())
    }
}

/// Archive filename derived from a catalogue record.
fn archive_filename(entry: &CatalogEntry) -> String {
    match entry.path.rsplit('/').next().filter(|f| !f.is_empty()) {
        Some(file) => file.to_string(),
        None => format!("{}-{}.pkg", entry.name, entry.version),
    }
}

/// Copy a `usr/local` payload into the prefix, preserving relative
/// paths, permissions and symlinks. Existing files are overwritten.
fn mirror_tree(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry.map_err(|e| {
            Error::Io(e.into_io_error().unwrap_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::Other, "walk error")
            }))
        })?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|_| Error::InvalidRecord(format!("bad payload path {}", entry.path().display())))?;
        let target = dst.join(rel);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())?;
            if fs::symlink_metadata(&target).is_ok() {
                fs::remove_file(&target)?;
            }
            std::os::unix::fs::symlink(link, &target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Best-effort bottom-up removal of every empty directory below `root`.
fn prune_empty_dirs(root: &Path) {
    for entry in WalkDir::new(root)
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if entry.file_type().is_dir() {
            // fails on non-empty directories, which is the point
            let _ = fs::remove_dir(entry.path());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_filename() {
        let mut entry = sample_entry();
        assert_eq!(archive_filename(&entry), "hello-2.12.pkg");

        entry.path = String::new();
        assert_eq!(archive_filename(&entry), "hello-2.12.pkg");

        entry.path = "flat.pkg".to_string();
        assert_eq!(archive_filename(&entry), "flat.pkg");
    }

    fn sample_entry() -> CatalogEntry {
        serde_json::from_str(
            r#"{"name":"hello","version":"2.12","comment":"x","path":"All/hello-2.12.pkg"}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_mirror_tree() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("payload");
        fs::create_dir_all(src.join("bin")).unwrap();
        fs::write(src.join("bin/tool"), b"#!/bin/sh\n").unwrap();
        fs::create_dir_all(src.join("lib/tool")).unwrap();
        fs::write(src.join("lib/tool/libtool.so.1"), b"elf").unwrap();
        std::os::unix::fs::symlink("libtool.so.1", src.join("lib/tool/libtool.so")).unwrap();

        let dst = dir.path().join("prefix");
        fs::create_dir_all(&dst).unwrap();
        mirror_tree(&src, &dst).unwrap();

        assert_eq!(fs::read(dst.join("bin/tool")).unwrap(), b"#!/bin/sh\n");
        assert_eq!(fs::read(dst.join("lib/tool/libtool.so.1")).unwrap(), b"elf");
        assert_eq!(
            fs::read_link(dst.join("lib/tool/libtool.so")).unwrap(),
            PathBuf::from("libtool.so.1")
        );
    }

    #[test]
    fn test_prune_empty_dirs() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b/c")).unwrap();
        fs::create_dir_all(dir.path().join("keep")).unwrap();
        fs::write(dir.path().join("keep/file"), b"x").unwrap();

        prune_empty_dirs(dir.path());
        assert!(!dir.path().join("a").exists());
        assert!(dir.path().join("keep/file").exists());
    }

    #[test]
    fn test_install_archive_without_manifest_writes_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine =
            Engine::with_repo_url(dir.path().join("prefix"), "http://127.0.0.1:1/All").unwrap();

        // payload only, no +MANIFEST at the archive root
        let mut builder = tar::Builder::new(Vec::new());
        let data: &[u8] = b"#!/bin/sh\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o755);
        builder
            .append_data(&mut header, "usr/local/bin/zztool", data)
            .unwrap();
        let raw = builder.into_inner().unwrap();
        let archive_path = dir.path().join("zztool-1.0.pkg");
        fs::write(&archive_path, zstd::encode_all(&raw[..], 0).unwrap()).unwrap();

        engine.install_archive("zztool", &archive_path).unwrap();

        // the store record and a sentinel manifest exist together
        let record = engine.store.get("zztool").unwrap().unwrap();
        assert_eq!(record.version, "unknown");
        let manifest_path = engine.prefix.manifest_path("zztool");
        assert!(manifest_path.is_file());
        let manifest = Manifest::load(&manifest_path).unwrap();
        assert_eq!(manifest.name, "zztool");
    }

    #[test]
    fn test_cycle_guard_cuts_repeated_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine =
            Engine::with_repo_url(dir.path().join("prefix"), "http://127.0.0.1:1/All").unwrap();

        let mut stack = HashSet::new();
        stack.insert("a".to_string());
        // "a" is already being installed further up the chain: cut, no
        // network touched (the repo URL above is unreachable)
        engine
            .install_inner("a", InstallOptions::default(), &mut stack)
            .unwrap();
    }
}
