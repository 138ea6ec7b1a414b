// src/store/mod.rs

//! Installed-set store.
//!
//! One line per installed package, `name:version:comment:origin`, kept in
//! a plaintext file under the prefix. Manifest documents live alongside
//! it in the `manifests/` directory, one per package.

pub mod manifest;

use crate::error::{Error, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use tracing::debug;

/// One line of the installed-set store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledRecord {
    pub name: String,
    pub version: String,
    pub comment: String,
    pub origin: String,
}

impl InstalledRecord {
    /// Parse one store line; malformed lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.splitn(3, ':');
        let name = fields.next()?;
        let version = fields.next()?;
        let tail = fields.next()?;
        // comments may contain ':'; the origin never does
        let (comment, origin) = tail.rsplit_once(':')?;
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            version: version.to_string(),
            comment: comment.to_string(),
            origin: origin.to_string(),
        })
    }

    fn to_line(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.name,
            self.version,
            flatten(&self.comment),
            flatten(&self.origin)
        )
    }
}

/// The store file itself; opened lazily, absent means empty.
#[derive(Debug, Clone)]
pub struct InstalledStore {
    path: PathBuf,
}

impl InstalledStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Append a record unless one with the same name exists.
    pub fn add(&self, record: &InstalledRecord) -> Result<()> {
        validate_field("name", &record.name)?;
        validate_field("version", &record.version)?;

        if self.contains(&record.name)? {
            debug!("store already has '{}'", record.name);
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", record.to_line())?;
        Ok(())
    }

    /// Rewrite the store without the named record.
    pub fn remove(&self, name: &str) -> Result<()> {
        let kept: Vec<String> = self
            .list()?
            .into_iter()
            .filter(|r| r.name != name)
            .map(|r| r.to_line())
            .collect();

        let mut contents = kept.join("\n");
        if !contents.is_empty() {
            contents.push('\n');
        }
        fs::write(&self.path, contents)?;
        Ok(())
    }

    /// Anchored lookup by canonical name.
    pub fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.get(name)?.is_some())
    }

    pub fn get(&self, name: &str) -> Result<Option<InstalledRecord>> {
        Ok(self.list()?.into_iter().find(|r| r.name == name))
    }

    /// All records in file order; an absent store is empty.
    pub fn list(&self) -> Result<Vec<InstalledRecord>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(contents
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(InstalledRecord::parse)
            .collect())
    }
}

fn validate_field(kind: &str, value: &str) -> Result<()> {
    if value.contains(':') || value.contains('\n') {
        return Err(Error::InvalidRecord(format!(
            "{kind} '{value}' may not contain ':' or newline"
        )));
    }
    Ok(())
}

/// Newlines would break the line-oriented format.
fn flatten(value: &str) -> String {
    value.replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, InstalledStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = InstalledStore::new(dir.path().join("installed_packages.txt"));
        (dir, store)
    }

    fn record(name: &str) -> InstalledRecord {
        InstalledRecord {
            name: name.to_string(),
            version: "1.0".to_string(),
            comment: format!("{name} package"),
            origin: format!("misc/{name}"),
        }
    }

    #[test]
    fn test_add_and_get() {
        let (_dir, store) = store();
        store.add(&record("hello")).unwrap();

        let rec = store.get("hello").unwrap().unwrap();
        assert_eq!(rec.version, "1.0");
        assert_eq!(rec.origin, "misc/hello");
        assert!(store.contains("hello").unwrap());
        assert!(!store.contains("hell").unwrap());
    }

    #[test]
    fn test_add_is_idempotent() {
        let (_dir, store) = store();
        store.add(&record("hello")).unwrap();
        let mut other = record("hello");
        other.version = "2.0".to_string();
        store.add(&other).unwrap();

        let records = store.list().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].version, "1.0");
    }

    #[test]
    fn test_remove_rewrites_file() {
        let (_dir, store) = store();
        store.add(&record("aa")).unwrap();
        store.add(&record("bb")).unwrap();
        store.add(&record("cc")).unwrap();

        store.remove("bb").unwrap();
        let names: Vec<String> = store.list().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["aa", "cc"]);
    }

    #[test]
    fn test_rejects_colon_in_name_or_version() {
        let (_dir, store) = store();

        let mut rec = record("he:llo");
        assert!(matches!(store.add(&rec), Err(Error::InvalidRecord(_))));

        rec = record("hello");
        rec.version = "1:0".to_string();
        assert!(matches!(store.add(&rec), Err(Error::InvalidRecord(_))));
    }

    #[test]
    fn test_comment_with_colon_survives() {
        let (_dir, store) = store();
        let mut rec = record("hello");
        rec.comment = "greeter: traditional edition".to_string();
        store.add(&rec).unwrap();

        let loaded = store.get("hello").unwrap().unwrap();
        assert_eq!(loaded.comment, "greeter: traditional edition");
        assert_eq!(loaded.origin, "misc/hello");
    }

    #[test]
    fn test_missing_store_is_empty() {
        let (_dir, store) = store();
        assert!(store.list().unwrap().is_empty());
        assert!(!store.contains("anything").unwrap());
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let (_dir, store) = store();
        store.add(&record("good")).unwrap();
        let mut file = OpenOptions::new().append(true).open(&store.path).unwrap();
        writeln!(file, "not a record").unwrap();
        drop(file);

        let records = store.list().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "good");
    }
}
