use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};

/// Immutable numeric-id -> name lookup table built from a host identity file.
///
/// Both `/etc/passwd` and `/etc/group` share the colon-delimited layout this
/// parser consumes: the name is the first field and the numeric id the third
/// (`name:x:id:...`). Only those two fields are read; everything else on the
/// line is ignored.
#[derive(Debug, Default)]
pub struct IdentityTable {
    entries: HashMap<u32, String>,
}

impl IdentityTable {
    /// Read and parse an identity file in full.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading identity file {}", path.display()))?;

        Ok(Self::parse(&data))
    }

    /// Parse identity file contents. Malformed lines are skipped, never errors.
    pub fn parse(data: &str) -> Self {
        let mut entries = HashMap::with_capacity(64);

        for line in data.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split(':');
            let name = match fields.next() {
                Some(n) if !n.is_empty() => n,
                _ => continue,
            };

            // Field 1 is the password placeholder; field 2 is the id.
            let id: u32 = match fields.nth(1).map(str::parse) {
                Some(Ok(id)) => id,
                _ => continue,
            };

            // First occurrence wins on duplicate ids.
            entries.entry(id).or_insert_with(|| name.to_string());
        }

        Self { entries }
    }

    /// Look up the name for a numeric id.
    pub fn lookup(&self, id: u32) -> Option<&str> {
        self.entries.get(&id).map(String::as_str)
    }

    /// Number of parsed entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
