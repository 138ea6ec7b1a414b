// src/archive.rs

//! Extraction of zstd-compressed tar archives.
//!
//! Both the package payloads and the catalogue archive arrive as `tar`
//! streams compressed with `zstd`. Extraction preserves modes and
//! symlinks; entries that would escape the destination are rejected.

use crate::error::{Error, Result};
use std::fs::File;
use std::path::{Component, Path};
use tar::Archive;
use tracing::debug;

/// Unpack a `.tzst`/`.pkg` archive into `dest`.
pub fn extract(source: &Path, dest: &Path) -> Result<()> {
    debug!("extracting {} into {}", source.display(), dest.display());

    let mut archive = open(source)?;
    for entry in entries(&mut archive)? {
        let mut entry =
            entry.map_err(|e| Error::Archive(format!("corrupt archive entry: {e}")))?;
        let path = entry
            .path()
            .map_err(|e| Error::Archive(format!("bad entry path: {e}")))?
            .into_owned();
        guard_entry_path(&path)?;

        let unpacked = entry
            .unpack_in(dest)
            .map_err(|e| Error::Archive(format!("cannot unpack {}: {e}", path.display())))?;
        if !unpacked {
            return Err(Error::Archive(format!(
                "entry {} escapes the extraction directory",
                path.display()
            )));
        }
    }
    Ok(())
}

/// Unpack a single named entry into `dest_path`, atomically.
///
/// Used to pull `packagesite.yaml` out of the catalogue archive.
pub fn extract_member(source: &Path, member: &str, dest_path: &Path) -> Result<()> {
    let mut archive = open(source)?;
    for entry in entries(&mut archive)? {
        let mut entry =
            entry.map_err(|e| Error::Archive(format!("corrupt archive entry: {e}")))?;
        let path = entry
            .path()
            .map_err(|e| Error::Archive(format!("bad entry path: {e}")))?
            .into_owned();
        if path != Path::new(member) {
            continue;
        }

        let file_name = dest_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Archive(format!("bad destination {}", dest_path.display())))?;
        let part = dest_path.with_file_name(format!("{file_name}.part"));

        entry
            .unpack(&part)
            .map_err(|e| Error::Archive(format!("cannot unpack {member}: {e}")))?;
        std::fs::rename(&part, dest_path)?;
        return Ok(());
    }
    Err(Error::Archive(format!(
        "archive {} has no entry named {member}",
        source.display()
    )))
}

fn open(source: &Path) -> Result<Archive<zstd::Decoder<'static, std::io::BufReader<File>>>> {
    let file = File::open(source)
        .map_err(|e| Error::Archive(format!("cannot open {}: {e}", source.display())))?;
    let decoder = zstd::Decoder::new(file)
        .map_err(|e| Error::Archive(format!("unrecognized compression: {e}")))?;
    let mut archive = Archive::new(decoder);
    archive.set_preserve_permissions(true);
    Ok(archive)
}

fn entries<R: std::io::Read>(
    archive: &mut Archive<R>,
) -> Result<tar::Entries<'_, R>> {
    archive
        .entries()
        .map_err(|e| Error::Archive(format!("cannot read archive: {e}")))
}

/// Entry paths must stay inside the extraction directory.
fn guard_entry_path(path: &Path) -> Result<()> {
    if path.is_absolute() {
        return Err(Error::Archive(format!(
            "absolute entry path {}",
            path.display()
        )));
    }
    for component in path.components() {
        if matches!(component, Component::ParentDir) {
            return Err(Error::Archive(format!(
                "entry path {} traverses outside the archive",
                path.display()
            )));
        }
    }
    Ok(())
}
