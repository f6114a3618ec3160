//! Identifiers used across the analytics layer.

use std::borrow::Cow;

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AnalysisError;

/// Identifier of one analysis run.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Create a new identifier.
    ///
    /// Uses UUIDv7 (time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for RunId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for RunId {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::from_str(s)
            .map_err(|e| AnalysisError::data_quality(format!("RunId: {e}")))?;
        Ok(Self(uuid))
    }
}

const KEY_SEPARATOR: &str = "::";

/// Organizational unit + material pair being analyzed.
///
/// Serializes as `"<org_unit>::<material>"` so it can key JSON objects. `%`
/// and `:` inside either part are written as `%25` and `%3A`, so every key
/// (including ones with `::` or empty parts) parses back to itself.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct EntityKey {
    org_unit: String,
    material: String,
}

impl EntityKey {
    pub fn new(org_unit: impl Into<String>, material: impl Into<String>) -> Self {
        Self {
            org_unit: org_unit.into(),
            material: material.into(),
        }
    }

    pub fn org_unit(&self) -> &str {
        &self.org_unit
    }

    pub fn material(&self) -> &str {
        &self.material
    }
}

fn escape_part(part: &str) -> Cow<'_, str> {
    if !part.contains([':', '%']) {
        return Cow::Borrowed(part);
    }
    let mut out = String::with_capacity(part.len() + 4);
    for c in part.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            other => out.push(other),
        }
    }
    Cow::Owned(out)
}

fn unescape_part(part: &str, whole: &str) -> Result<String, AnalysisError> {
    let mut out = String::with_capacity(part.len());
    let mut chars = part.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => {
                let code: String = chars.by_ref().take(2).collect();
                match code.as_str() {
                    "25" => out.push('%'),
                    "3A" | "3a" => out.push(':'),
                    _ => {
                        return Err(AnalysisError::data_quality(format!(
                            "EntityKey: invalid escape %{code} in {whole:?}"
                        )));
                    }
                }
            }
            ':' => {
                return Err(AnalysisError::data_quality(format!(
                    "EntityKey: unescaped ':' in {whole:?}"
                )));
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

impl core::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}{KEY_SEPARATOR}{}",
            escape_part(&self.org_unit),
            escape_part(&self.material)
        )
    }
}

impl FromStr for EntityKey {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (org_unit, material) = s.split_once(KEY_SEPARATOR).ok_or_else(|| {
            AnalysisError::data_quality(format!("EntityKey: missing '{KEY_SEPARATOR}' in {s:?}"))
        })?;
        Ok(Self::new(unescape_part(org_unit, s)?, unescape_part(material, s)?))
    }
}

impl From<EntityKey> for String {
    fn from(value: EntityKey) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for EntityKey {
    type Error = AnalysisError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
