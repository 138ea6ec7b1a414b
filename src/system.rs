// src/system.rs

//! Heuristic probe for packages already provided by the host OS.
//!
//! Shared hosts ship a lot of software lilith would otherwise pull in as
//! dependencies. A dependency is considered shadowed when the host has a
//! matching executable, shared library or pkg-config module. The probe is
//! only ever consulted for dependencies, never for the package the user
//! asked for.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

/// Library directories searched for host-provided shared objects.
const SYSTEM_LIB_DIRS: &[&str] = &["/usr/lib", "/usr/local/lib"];

/// Does the host OS already satisfy `name`?
pub fn shadowed(name: &str) -> bool {
    if executable_on_path(name) {
        debug!("'{name}' shadowed by an executable on PATH");
        return true;
    }
    if shared_library_present(name) {
        debug!("'{name}' shadowed by a system shared library");
        return true;
    }
    if pkg_config_knows(name) {
        debug!("'{name}' shadowed by a pkg-config module");
        return true;
    }
    false
}

fn executable_on_path(name: &str) -> bool {
    match env::var_os("PATH") {
        Some(path) => executable_in(env::split_paths(&path), name),
        None => false,
    }
}

pub(crate) fn executable_in(dirs: impl IntoIterator<Item = PathBuf>, name: &str) -> bool {
    use std::os::unix::fs::PermissionsExt;

    dirs.into_iter().any(|dir| {
        let candidate = dir.join(name);
        match fs::metadata(&candidate) {
            Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
            Err(_) => false,
        }
    })
}

fn shared_library_present(name: &str) -> bool {
    shared_library_in(SYSTEM_LIB_DIRS.iter().map(PathBuf::from), name)
}

pub(crate) fn shared_library_in(dirs: impl IntoIterator<Item = PathBuf>, name: &str) -> bool {
    dirs.into_iter().any(|dir| {
        dir.join(format!("lib{name}.so")).is_file() || dir.join(format!("{name}.so")).is_file()
    })
}

/// Ask the host's pkg-config about `name` and `lib<name>`.
///
/// A missing pkg-config binary simply means "not shadowed".
fn pkg_config_knows(name: &str) -> bool {
    for module in [name.to_string(), format!("lib{name}")] {
        match Command::new("pkg-config").arg("--exists").arg(&module).output() {
            Ok(output) if output.status.success() => return true,
            Ok(_) => {}
            Err(e) => {
                debug!("pkg-config unavailable: {e}");
                return false;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn test_executable_in() {
        let dir = tempfile::tempdir().unwrap();

        let exe = dir.path().join("mytool");
        fs::write(&exe, b"#!/bin/sh\n").unwrap();
        fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();

        let plain = dir.path().join("notes.txt");
        fs::write(&plain, b"data").unwrap();
        fs::set_permissions(&plain, fs::Permissions::from_mode(0o644)).unwrap();

        let dirs = || vec![dir.path().to_path_buf()];
        assert!(executable_in(dirs(), "mytool"));
        assert!(!executable_in(dirs(), "notes.txt"));
        assert!(!executable_in(dirs(), "absent"));
    }

    #[test]
    fn test_shared_library_in() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("libfoo.so"), b"").unwrap();
        fs::write(dir.path().join("bar.so"), b"").unwrap();

        let dirs = || vec![dir.path().to_path_buf()];
        assert!(shared_library_in(dirs(), "foo"));
        assert!(shared_library_in(dirs(), "bar"));
        assert!(!shared_library_in(dirs(), "baz"));
    }

    #[test]
    fn test_shadowed_by_path_executable() {
        // sh is on PATH in any environment running these tests
        assert!(shadowed("sh"));
    }
}
