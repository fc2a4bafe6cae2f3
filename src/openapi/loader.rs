use super::ApiDescription;
use crate::errors::ToolError;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// A loaded description tagged with the family it came from.
#[derive(Debug, Clone)]
pub struct FamilyDescription {
    pub family: String,
    pub description: ApiDescription,
}

pub fn family_file(dir: &Path, family: &str) -> PathBuf {
    dir.join(format!("{}.json", family))
}

pub fn load_description(path: &Path) -> Result<ApiDescription, ToolError> {
    let raw = std::fs::read_to_string(path).map_err(|err| {
        ToolError::spec_malformed(format!("Failed to read {}: {}", path.display(), err))
    })?;
    let document: Value = serde_json::from_str(&raw).map_err(|err| {
        ToolError::spec_malformed(format!("Failed to parse {}: {}", path.display(), err))
    })?;
    ApiDescription::from_document(&document).map_err(|err| {
        ToolError::spec_malformed(format!("{}: {}", path.display(), err.message))
    })
}

/// Loads `<dir>/<family>.json` for every family, in order. Absent files are
/// skipped; unreadable or malformed ones abort.
pub fn load_families(dir: &Path, families: &[&str]) -> Result<Vec<FamilyDescription>, ToolError> {
    let mut out = Vec::new();
    for family in families {
        let path = family_file(dir, family);
        if !path.exists() {
            tracing::warn!(family = %family, path = %path.display(), "API description not found, skipping");
            continue;
        }
        let description = load_description(&path)?;
        tracing::debug!(
            family = %family,
            operations = description.operations.len(),
            "loaded API description"
        );
        out.push(FamilyDescription {
            family: family.to_string(),
            description,
        });
    }
    Ok(out)
}
