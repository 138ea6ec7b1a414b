// src/linkfarm.rs

//! Shared-library symlink farm under `prefix/lib/`.
//!
//! Packages install their libraries into subdirectories of `lib/`, but
//! the dynamic linker only searches `lib/` itself. Reindexing gives every
//! versioned shared object a flat set of aliases (the unversioned name
//! plus the major-minor and major truncations) as relative symlinks at
//! depth one; purging removes aliases whose targets have disappeared.

use crate::error::Result;
use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Create missing aliases for every shared object below `lib_dir`.
///
/// Existing entries are never overwritten; with several candidates for
/// one alias the deepest file wins. Returns the number of links created.
pub fn reindex(lib_dir: &Path) -> Result<usize> {
    if !lib_dir.is_dir() {
        return Ok(0);
    }

    let mut objects: Vec<(usize, PathBuf)> = WalkDir::new(lib_dir)
        .min_depth(2)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| (e.depth(), e.into_path()))
        .collect();
    objects.sort_by(|a, b| b.0.cmp(&a.0));

    let mut created = 0;
    for (_, object) in objects {
        let Some(basename) = object.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Ok(relative) = object.strip_prefix(lib_dir) else {
            continue;
        };

        for alias in alias_names(basename) {
            let link = lib_dir.join(&alias);
            // symlink_metadata also sees dangling links; never overwrite
            if fs::symlink_metadata(&link).is_ok() {
                continue;
            }
            debug!("linking {} -> {}", link.display(), relative.display());
            symlink(relative, &link)?;
            created += 1;
        }
    }
    Ok(created)
}

/// Delete depth-one symlinks whose targets no longer exist.
pub fn purge(lib_dir: &Path) -> Result<usize> {
    if !lib_dir.is_dir() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in fs::read_dir(lib_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_symlink() {
            continue;
        }
        let path = entry.path();
        if fs::metadata(&path).is_err() {
            debug!("purging dead symlink {}", path.display());
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Alias names for one shared-object basename, deduplicated.
///
/// `libfoo.so.5.40.2` yields `libfoo.so`, `libfoo.so.5.40` and
/// `libfoo.so.5`; names that do not look like shared objects yield
/// nothing.
fn alias_names(basename: &str) -> Vec<String> {
    let Some(stem_end) = so_stem_end(basename) else {
        return Vec::new();
    };
    let stem = &basename[..stem_end];

    let mut names = vec![stem.to_string()];
    if let Some(version) = basename[stem_end..].strip_prefix('.') {
        let segments: Vec<&str> = version.split('.').collect();
        if segments.len() >= 3 {
            names.push(format!("{stem}.{}.{}", segments[0], segments[1]));
        }
        if segments.len() >= 2 {
            names.push(format!("{stem}.{}", segments[0]));
        }
    }

    let mut unique = Vec::with_capacity(names.len());
    for name in names {
        if !unique.contains(&name) {
            unique.push(name);
        }
    }
    unique
}

/// Byte offset just past the `.so` marker, for `*.so` and `*.so.*` names.
fn so_stem_end(basename: &str) -> Option<usize> {
    for (idx, _) in basename.match_indices(".so") {
        if idx == 0 {
            continue;
        }
        let rest = &basename[idx + 3..];
        if rest.is_empty() || rest.starts_with('.') {
            return Some(idx + 3);
        }
    }
    None
}
