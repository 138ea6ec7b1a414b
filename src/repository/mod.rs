// src/repository/mod.rs

//! Upstream repository access.
//!
//! This module provides functionality for:
//! - Downloading files from the repository with atomic placement
//! - Refreshing the cached package catalogue
//! - Deriving the catalogue URL from the repository base URL

pub mod catalog;

use crate::archive;
use crate::error::{Error, Result};
use crate::prefix::Prefix;
use reqwest::blocking::Client;
use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Name of the catalogue archive published next to the package directory.
const PACKAGESITE_ARCHIVE: &str = "packagesite.tzst";

/// Name of the catalogue feed inside the archive.
const PACKAGESITE_FEED: &str = "packagesite.yaml";

/// Blocking HTTP client wrapper.
///
/// Downloads land in a `.part` sibling first and are renamed into place,
/// so a failed transfer never leaves a half-written destination. The
/// client does not retry; callers decide whether to try again.
pub struct RepositoryClient {
    client: Client,
}

impl RepositoryClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::Network(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Download `url` to `dest`, atomically.
    pub fn download(&self, url: &str, dest: &Path) -> Result<()> {
        debug!("downloading {} to {}", url, dest.display());

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|e| Error::Network(format!("GET {url}: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::Network(format!(
                "HTTP {} from {url}",
                response.status()
            )));
        }

        let part = part_path(dest)?;
        let mut file = File::create(&part)?;
        if let Err(e) = io::copy(&mut response, &mut file) {
            drop(file);
            let _ = fs::remove_file(&part);
            return Err(Error::Network(format!("transfer from {url} failed: {e}")));
        }
        drop(file);

        if let Err(e) = fs::rename(&part, dest) {
            let _ = fs::remove_file(&part);
            return Err(e.into());
        }

        debug!("downloaded {}", dest.display());
        Ok(())
    }
}

/// Refresh the cached catalogue from `<repo_base>/../packagesite.tzst`.
pub fn refresh(client: &RepositoryClient, repo_base: &str, prefix: &Prefix) -> Result<()> {
    let url = packagesite_url(repo_base);
    info!("refreshing package catalogue from {url}");

    fs::create_dir_all(prefix.cache_dir())?;
    let archive_path = prefix.catalog_archive_path();
    client.download(&url, &archive_path)?;

    archive::extract_member(&archive_path, PACKAGESITE_FEED, &prefix.catalog_path())?;
    Ok(())
}

/// The catalogue archive lives in the parent of the package directory.
fn packagesite_url(repo_base: &str) -> String {
    let trimmed = repo_base.trim_end_matches('/');
    let parent = match trimmed.rsplit_once('/') {
        Some((parent, _)) => parent,
        None => trimmed,
    };
    format!("{parent}/{PACKAGESITE_ARCHIVE}")
}

fn part_path(dest: &Path) -> Result<std::path::PathBuf> {
    let file_name = dest
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Network(format!("bad download destination {}", dest.display())))?;
    Ok(dest.with_file_name(format!("{file_name}.part")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packagesite_url() {
        assert_eq!(
            packagesite_url("https://pkg.example.org/FreeBSD:14:amd64/quarterly/All"),
            "https://pkg.example.org/FreeBSD:14:amd64/quarterly/packagesite.tzst"
        );
        assert_eq!(
            packagesite_url("http://127.0.0.1:8080/All/"),
            "http://127.0.0.1:8080/packagesite.tzst"
        );
    }

    #[test]
    fn test_part_path() {
        let part = part_path(Path::new("/cache/packagesite.tzst")).unwrap();
        assert_eq!(part, Path::new("/cache/packagesite.tzst.part"));
    }

    #[test]
    fn test_download_failure_leaves_no_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let client = RepositoryClient::new().unwrap();

        // nothing listens on this port
        let err = client
            .download("http://127.0.0.1:1/none", &dest)
            .unwrap_err();
        assert!(matches!(err, Error::Network(_)));
        assert!(!dest.exists());
        assert!(!dir.path().join("out.bin.part").exists());
    }
}
