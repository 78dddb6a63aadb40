//! APKINDEX parsing.
//!
//! The index is a sequence of `K:value` records separated by blank lines.
//! Only the keys the resolver needs are kept; unknown keys are ignored.

use apk2oci_core::error::{ChartError, Result};

use super::expand::PackageSegments;
use super::version::{Dependency, Version};

/// Name of the index file inside `APKINDEX.tar.gz`.
pub const INDEX_ENTRY_NAME: &str = "APKINDEX";

/// One package record of a repository index.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub name: String,
    pub version: Version,
    pub arch: String,
    pub size: u64,
    pub installed_size: u64,
    pub description: String,
    pub origin: Option<String>,
    pub checksum: Option<String>,
    pub depends: Vec<Dependency>,
    /// Provided names with an optional version (`so:libc.so.6=6`)
    pub provides: Vec<(String, Option<Version>)>,
}

impl IndexEntry {
    fn empty() -> Self {
        Self {
            name: String::new(),
            version: Version::new(""),
            arch: String::new(),
            size: 0,
            installed_size: 0,
            description: String::new(),
            origin: None,
            checksum: None,
            depends: Vec::new(),
            provides: Vec::new(),
        }
    }

    /// File name of the package in its repository.
    pub fn filename(&self) -> String {
        format!("{}-{}.apk", self.name, self.version)
    }

    /// Version under which this entry answers for `name`, if it does.
    pub fn provided_version(&self, name: &str) -> Option<&Version> {
        if self.name == name {
            return Some(&self.version);
        }
        self.provides
            .iter()
            .find(|(provided, _)| provided == name)
            .map(|(_, version)| version.as_ref().unwrap_or(&self.version))
    }
}

/// Parse APKINDEX text.
pub fn parse_index(text: &str) -> Result<Vec<IndexEntry>> {
    let mut entries = Vec::new();
    let mut current = IndexEntry::empty();
    let mut has_fields = false;

    for (lineno, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            if has_fields {
                entries.push(finish(std::mem::replace(&mut current, IndexEntry::empty()), lineno)?);
                has_fields = false;
            }
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            return Err(ChartError::Resolution(format!(
                "malformed APKINDEX line {}: '{}'",
                lineno + 1,
                line
            )));
        };
        has_fields = true;

        match key {
            "P" => current.name = value.to_string(),
            "V" => current.version = Version::new(value),
            "A" => current.arch = value.to_string(),
            "S" => current.size = value.parse().unwrap_or(0),
            "I" => current.installed_size = value.parse().unwrap_or(0),
            "T" => current.description = value.to_string(),
            "o" => current.origin = Some(value.to_string()),
            "C" => current.checksum = Some(value.to_string()),
            "D" => {
                for atom in value.split_whitespace() {
                    current.depends.push(Dependency::parse(atom)?);
                }
            }
            "p" => {
                for atom in value.split_whitespace() {
                    current.provides.push(match atom.split_once('=') {
                        Some((name, version)) => (name.to_string(), Some(Version::new(version))),
                        None => (atom.to_string(), None),
                    });
                }
            }
            _ => {}
        }
    }

    if has_fields {
        let lines = text.lines().count();
        entries.push(finish(current, lines)?);
    }

    Ok(entries)
}

fn finish(entry: IndexEntry, lineno: usize) -> Result<IndexEntry> {
    if entry.name.is_empty() || entry.version.as_str().is_empty() {
        return Err(ChartError::Resolution(format!(
            "APKINDEX record ending at line {} lacks P: or V:",
            lineno
        )));
    }
    Ok(entry)
}

/// Extract and parse the index from an already split `APKINDEX.tar.gz`.
pub fn read_index(segments: &PackageSegments) -> Result<Vec<IndexEntry>> {
    let raw = segments
        .data()
        .read_entry(INDEX_ENTRY_NAME)?
        .ok_or_else(|| ChartError::Resolution("index archive has no APKINDEX entry".to_string()))?;
    let text = String::from_utf8(raw)
        .map_err(|e| ChartError::Resolution(format!("APKINDEX is not UTF-8: {}", e)))?;
    parse_index(&text)
}
