// src/abi.rs

//! Host ABI probing and repository URL construction.
//!
//! The upstream repository publishes one package set per ABI triple
//! (`os:major:arch`, e.g. `FreeBSD:14:amd64`). The triple is probed once
//! per process with `uname` and cached on the engine.

use crate::error::{Error, Result};
use std::fmt;
use std::process::Command;
use tracing::debug;

/// URL scheme of the upstream repository.
pub const REPO_SCHEME: &str = "https";

/// Repository host; overridable at build time.
pub const REPO_HOST: &str = match option_env!("LILITH_REPO_HOST") {
    Some(host) => host,
    None => "pkg.freebsd.org",
};

/// Repository branch; overridable at build time.
pub const REPO_BRANCH: &str = match option_env!("LILITH_BRANCH") {
    Some(branch) => branch,
    None => "quarterly",
};

/// The ABI triple identifying which prebuilt package set applies here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Abi {
    pub os_type: String,
    pub os_major: u32,
    pub arch: String,
}

impl Abi {
    /// Probe the host OS type, release major and machine architecture.
    pub fn probe() -> Result<Self> {
        let os_type = uname("-s")?;
        let release = uname("-r")?;
        let arch = uname("-m")?;

        let os_major = parse_major(&release).ok_or_else(|| {
            Error::EnvProbe(format!("cannot parse OS major version from '{release}'"))
        })?;

        let abi = Self {
            os_type,
            os_major,
            arch,
        };
        debug!("probed host ABI: {}", abi);
        Ok(abi)
    }

    /// Base URL of the package directory for this ABI.
    pub fn repository_url(&self) -> String {
        format!("{REPO_SCHEME}://{REPO_HOST}/{self}/{REPO_BRANCH}/All")
    }
}

impl fmt::Display for Abi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.os_type, self.os_major, self.arch)
    }
}

/// Run `uname <flag>` and return its trimmed stdout.
fn uname(flag: &str) -> Result<String> {
    let output = Command::new("uname")
        .arg(flag)
        .output()
        .map_err(|e| Error::EnvProbe(format!("failed to run uname {flag}: {e}")))?;

    if !output.status.success() {
        return Err(Error::EnvProbe(format!("uname {flag} exited with {}", output.status)));
    }

    let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if value.is_empty() {
        return Err(Error::EnvProbe(format!("uname {flag} produced no output")));
    }
    Ok(value)
}

/// Leading integer of a release string (`14.1-RELEASE-p5` -> 14).
fn parse_major(release: &str) -> Option<u32> {
    let digits: String = release.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_major() {
        assert_eq!(parse_major("14.1-RELEASE-p5"), Some(14));
        assert_eq!(parse_major("13.2-STABLE"), Some(13));
        assert_eq!(parse_major("6.8.0-generic"), Some(6));
        assert_eq!(parse_major("release"), None);
        assert_eq!(parse_major(""), None);
    }

    #[test]
    fn test_display_and_repository_url() {
        let abi = Abi {
            os_type: "FreeBSD".to_string(),
            os_major: 14,
            arch: "amd64".to_string(),
        };
        assert_eq!(abi.to_string(), "FreeBSD:14:amd64");

        let url = abi.repository_url();
        assert!(url.starts_with(REPO_SCHEME));
        assert!(url.contains("FreeBSD:14:amd64"));
        assert!(url.ends_with("/All"));
    }

    #[test]
    fn test_probe_on_this_host() {
        // uname is available on every supported platform
        let abi = Abi::probe().unwrap();
        assert!(!abi.os_type.is_empty());
        assert!(!abi.arch.is_empty());
    }
}
