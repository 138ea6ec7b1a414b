// src/repository/catalog.rs

//! The cached package catalogue.
//!
//! The upstream feed is one JSON record per line. Records that fail to
//! parse are skipped, never fatal. Lookups are deterministic: an exact
//! name match wins, otherwise the lexicographically smallest name with a
//! `query-` prefix (the hyphen-then-version convention).

use crate::error::{Error, Result};
use regex::RegexBuilder;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::debug;

/// One record of the upstream catalogue.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub maintainer: String,
    #[serde(default)]
    pub www: String,
    #[serde(default)]
    pub arch: String,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub licenselogic: String,
    #[serde(default)]
    pub licenses: Vec<String>,
    #[serde(default)]
    pub pkgsize: u64,
    #[serde(default)]
    pub flatsize: u64,
    /// Dependency mapping; only the key set is significant.
    #[serde(default)]
    pub deps: BTreeMap<String, serde_json::Value>,
    /// Archive path within the repository.
    #[serde(default)]
    pub path: String,
}

/// What `search` matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Names,
    All,
}

/// A search result row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub name: String,
    pub version: String,
    pub comment: String,
}

/// In-memory catalogue with a name index.
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    by_name: HashMap<String, usize>,
}

impl Catalog {
    /// Load the newline-delimited feed from the cache.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::MetadataMissing);
        }

        let reader = BufReader::new(File::open(path)?);
        let mut entries = Vec::new();
        let mut by_name = HashMap::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<CatalogEntry>(&line) {
                Ok(entry) => {
                    by_name.entry(entry.name.clone()).or_insert(entries.len());
                    entries.push(entry);
                }
                Err(e) => debug!("skipping malformed catalogue record: {e}"),
            }
        }

        debug!("loaded catalogue with {} records", entries.len());
        Ok(Self { entries, by_name })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact-name lookup only.
    pub fn exact(&self, name: &str) -> Option<&CatalogEntry> {
        self.by_name.get(name).map(|&idx| &self.entries[idx])
    }

    /// Exact match, then the smallest `query-`-prefixed name.
    pub fn lookup(&self, query: &str) -> Option<&CatalogEntry> {
        if let Some(entry) = self.exact(query) {
            return Some(entry);
        }
        let prefix = format!("{query}-");
        self.entries
            .iter()
            .filter(|e| e.name.starts_with(&prefix))
            .min_by(|a, b| a.name.cmp(&b.name))
    }

    /// Resolved catalogue name for a query.
    pub fn find_fullname(&self, query: &str) -> Option<&str> {
        self.lookup(query).map(|e| e.name.as_str())
    }

    /// Key set of the `deps` mapping; empty if unknown.
    pub fn deps(&self, query: &str) -> Vec<String> {
        self.lookup(query)
            .map(|e| e.deps.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Case-insensitive regular-expression search, in catalogue order.
    pub fn search(&self, pattern: &str, mode: SearchMode) -> Result<Vec<SearchHit>> {
        let re = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| Error::Pattern(e.to_string()))?;

        Ok(self
            .entries
            .iter()
            .filter(|e| match mode {
                SearchMode::Names => re.is_match(&e.name),
                SearchMode::All => re.is_match(&e.name) || re.is_match(&e.comment),
            })
            .map(|e| SearchHit {
                name: e.name.clone(),
                version: e.version.clone(),
                comment: e.comment.clone(),
            })
            .collect())
    }
}

/// Strip a trailing version from a dependency token.
///
/// The token is truncated at the first `-` that is followed by a digit;
/// `gettext-runtime-0.22` becomes `gettext-runtime`, while `foo-bar`
/// stays untouched.
pub fn dep_base(token: &str) -> &str {
    let bytes = token.as_bytes();
    for idx in 0..bytes.len() {
        if bytes[idx] == b'-' && bytes.get(idx + 1).is_some_and(|b| b.is_ascii_digit()) {
            return &token[..idx];
        }
    }
    token
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_catalog(lines: &[&str]) -> (tempfile::TempDir, Catalog) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("packagesite.yaml");
        let mut file = File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        drop(file);
        let catalog = Catalog::load(&path).unwrap();
        (dir, catalog)
    }

    const HELLO: &str = r#"{"name":"hello","version":"2.12","comment":"Utility for saying hello","origin":"misc/hello","path":"All/hello-2.12.pkg","deps":{}}"#;

    #[test]
    fn test_load_skips_malformed_records() {
        let (_dir, catalog) = write_catalog(&[HELLO, "{broken json", ""]);
        assert_eq!(catalog.len(), 1);
        assert!(catalog.exact("hello").is_some());
    }

    #[test]
    fn test_missing_catalogue() {
        assert!(matches!(
            Catalog::load(Path::new("/nonexistent/packagesite.yaml")),
            Err(Error::MetadataMissing)
        ));
    }

    #[test]
    fn test_lookup_exact_and_prefix() {
        let (_dir, catalog) = write_catalog(&[
            r#"{"name":"hello-traditional","version":"2.10","comment":"older","path":"All/hello-traditional-2.10.pkg"}"#,
            HELLO,
            r#"{"name":"hello-2","version":"9.9","comment":"confusing","path":"All/hello-2-9.9.pkg"}"#,
        ]);

        // exact wins over any prefix candidate
        assert_eq!(catalog.find_fullname("hello"), Some("hello"));
        // no exact match: smallest name with a "query-" prefix
        assert_eq!(catalog.find_fullname("hel"), None);
        assert_eq!(catalog.find_fullname("hello-traditional"), Some("hello-traditional"));

        let (_dir, only_prefixed) = write_catalog(&[
            r#"{"name":"foo-utils","version":"1","comment":"b"}"#,
            r#"{"name":"foo-lib","version":"1","comment":"a"}"#,
        ]);
        assert_eq!(only_prefixed.find_fullname("foo"), Some("foo-lib"));
        assert_eq!(only_prefixed.find_fullname("bar"), None);
    }

    #[test]
    fn test_deps_key_set() {
        let (_dir, catalog) = write_catalog(&[
            r#"{"name":"hello","version":"2.12","comment":"x","deps":{"gettext-runtime":{"version":"0.22"},"indexinfo":{"version":"0.3"}}}"#,
        ]);
        let mut deps = catalog.deps("hello");
        deps.sort();
        assert_eq!(deps, vec!["gettext-runtime", "indexinfo"]);
        assert!(catalog.deps("absent").is_empty());
    }

    #[test]
    fn test_search_modes() {
        let (_dir, catalog) = write_catalog(&[
            HELLO,
            r#"{"name":"zsh","version":"5.9","comment":"Shell that says hello on startup"}"#,
        ]);

        let names = catalog.search("HELLO", SearchMode::Names).unwrap();
        assert_eq!(names.len(), 1);
        assert_eq!(names[0].name, "hello");
        assert_eq!(names[0].version, "2.12");

        let all = catalog.search("hello", SearchMode::All).unwrap();
        assert_eq!(all.len(), 2);

        assert!(matches!(
            catalog.search("[invalid", SearchMode::Names),
            Err(Error::Pattern(_))
        ));
    }

    #[test]
    fn test_dep_base() {
        assert_eq!(dep_base("gettext-runtime-0.22"), "gettext-runtime");
        assert_eq!(dep_base("foo-bar"), "foo-bar");
        assert_eq!(dep_base("foo-2"), "foo");
        assert_eq!(dep_base("foo-bar-1.2"), "foo-bar");
        assert_eq!(dep_base("plain"), "plain");
        assert_eq!(dep_base(""), "");
        assert_eq!(dep_base("tailing-"), "tailing-");
    }
}
