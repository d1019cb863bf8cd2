use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::str::FromStr;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::error::HarvestError;

/// A genus name, the unit of query granularity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Genus(String);

impl Genus {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Genus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Genus {
    type Err = HarvestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let is_valid = !trimmed.is_empty()
            && trimmed
                .chars()
                .all(|ch| !ch.is_whitespace() && !ch.is_control());
        if !is_valid {
            return Err(HarvestError::InvalidGenus(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// A genus whose query did not succeed within its attempt budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub genus: String,
    pub reason: String,
}

/// Parses one entry of a genus list.
///
/// Accepts either a bare genus (`Papaver`) or a phylogeny leaf label of the
/// form `Order_Family_Genus[_Species...]`, in which case the third field is used.
pub fn parse_genus_entry(entry: &str) -> Result<Genus, HarvestError> {
    let trimmed = entry.trim();
    let fields = trimmed.split('_').collect::<Vec<_>>();
    match fields.len() {
        1 => trimmed.parse(),
        n if n >= 3 => fields[2]
            .parse()
            .map_err(|_| HarvestError::InvalidGenus(entry.to_string())),
        _ => Err(HarvestError::InvalidGenus(entry.to_string())),
    }
}

/// Parses a genus list, one entry per line. Blank lines and `#` comments are
/// skipped; repeated genera keep their first position.
pub fn parse_genus_list(content: &str) -> Result<Vec<Genus>, HarvestError> {
    let mut seen = HashSet::new();
    let mut genera = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let genus = parse_genus_entry(line)?;
        if seen.insert(genus.clone()) {
            genera.push(genus);
        }
    }
    Ok(genera)
}

pub fn read_genus_list(path: &Utf8Path) -> Result<Vec<Genus>, HarvestError> {
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|err| HarvestError::Filesystem(format!("read genus list {path}: {err}")))?;
    parse_genus_list(&content)
}

/// Rejects batches that name the same genus twice.
pub fn ensure_unique(genera: &[Genus]) -> Result<(), HarvestError> {
    let mut seen = HashSet::with_capacity(genera.len());
    for genus in genera {
        if !seen.insert(genus.as_str()) {
            return Err(HarvestError::DuplicateGenus(genus.to_string()));
        }
    }
    Ok(())
}
