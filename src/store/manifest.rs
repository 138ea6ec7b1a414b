// src/store/manifest.rs

//! Per-package manifest documents.
//!
//! Every package archive carries a `+MANIFEST` at its root; install keeps
//! a copy under `manifests/<name>.manifest`. The manifest is the source
//! of truth for what a package owns (`files`) and what it needs (`deps`).

use crate::error::{Error, Result};
use crate::repository::catalog::dep_base;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Sentinel for fields a manifest did not carry.
pub const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub origin: String,
    /// Direct dependencies; only the key set matters.
    #[serde(default)]
    pub deps: BTreeMap<String, serde_json::Value>,
    /// Absolute upstream paths this package owns.
    #[serde(default)]
    pub files: BTreeMap<String, serde_json::Value>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        serde_json::from_str(&data)
            .map_err(|e| Error::InvalidRecord(format!("manifest {}: {e}", path.display())))
    }

    /// Lenient load: a missing or unparseable manifest degrades to the
    /// empty document rather than failing the surrounding operation.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(manifest) => manifest,
            Err(e) => {
                debug!("falling back to empty manifest: {e}");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string(self)
            .map_err(|e| Error::InvalidRecord(format!("manifest for {}: {e}", self.name)))?;
        fs::write(path, data)?;
        Ok(())
    }

    /// Does this package depend on `name`, either exactly or through a
    /// hyphen-versioned dependency token?
    pub fn depends_on(&self, name: &str) -> bool {
        self.deps.keys().any(|key| key == name || dep_base(key) == name)
    }

    /// Field accessor that substitutes the sentinel for empty values.
    pub fn field_or_unknown(value: &str) -> String {
        if value.is_empty() {
            UNKNOWN.to_string()
        } else {
            value.to_string()
        }
    }
}
