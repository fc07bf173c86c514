use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid identifier regex"));

/// Model name as registered with the format table, e.g. `SWMF_GM`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelName(String);

impl ModelName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ModelName {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if !IDENTIFIER_RE.is_match(trimmed) {
            return Err(CatalogError::InvalidIdentifier(format!("model name {value:?}")));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// Unique name of a model run: letters, digits, underscores and dashes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunName(String);

impl RunName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunName {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if !IDENTIFIER_RE.is_match(trimmed) {
            return Err(CatalogError::InvalidIdentifier(format!("run name {value:?}")));
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    ModelOutput,
    Flythrough,
}

impl DatasetKind {
    /// Sub-directory below the bucket where datasets of this kind live.
    pub fn bucket_subdir(&self) -> &'static str {
        match self {
            DatasetKind::ModelOutput => "ModelOutputs/",
            DatasetKind::Flythrough => "FlythroughResults/",
        }
    }

    fn id_suffix(&self) -> &'static str {
        match self {
            DatasetKind::ModelOutput => "",
            DatasetKind::Flythrough => "-Flythrough",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetKind::ModelOutput => write!(f, "model"),
            DatasetKind::Flythrough => write!(f, "flythrough"),
        }
    }
}

/// Catalog id of a dataset, also the stem of every registry artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatasetId {
    model: ModelName,
    run: RunName,
    kind: DatasetKind,
}

impl DatasetId {
    pub fn new(model: ModelName, run: RunName, kind: DatasetKind) -> Self {
        Self { model, run, kind }
    }

    pub fn model(&self) -> &ModelName {
        &self.model
    }

    pub fn run(&self) -> &RunName {
        &self.run
    }

    pub fn kind(&self) -> DatasetKind {
        self.kind
    }

    pub fn registry_file_name(&self, year: i32) -> String {
        format!("{self}_{year}.csv")
    }

    pub fn schema_file_name(&self) -> String {
        format!("{self}_info.json")
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}{}", self.model, self.run, self.kind.id_suffix())
    }
}

/// Validated `scheme://bucket/.../` directory location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLocation {
    raw: String,
    scheme: String,
    bucket: String,
    key: String,
}

impl StorageLocation {
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Path below the bucket, with its trailing slash; empty for the bucket root.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn bucket_uri(&self) -> String {
        format!("{}://{}/", self.scheme, self.bucket)
    }

    pub fn child(&self, name: &str) -> String {
        format!("{}{}", self.raw, name)
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl FromStr for StorageLocation {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let raw = value.trim();
        let (scheme, rest) = split_scheme(raw)?;
        let bucket_uri = bucket_name(raw)?;
        let bucket = bucket_uri[scheme.len() + 3..bucket_uri.len() - 1].to_string();
        let key = rest[bucket.len()..].trim_start_matches(['/', '\\']).to_string();
        Ok(Self {
            raw: raw.to_string(),
            scheme: scheme.to_string(),
            bucket,
            key,
        })
    }
}

fn split_scheme(path: &str) -> Result<(&str, &str), CatalogError> {
    let invalid = || CatalogError::InvalidPathFormat(path.to_string());
    let (scheme, rest) = path.split_once("://").ok_or_else(invalid)?;
    let scheme_ok = scheme.starts_with(|ch: char| ch.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '.' | '-'));
    if !scheme_ok {
        return Err(invalid());
    }
    Ok((scheme, rest))
}

/// Returns `scheme://bucket/` for a directory path of the form
/// `scheme://bucket/.../` (trailing slash required).
pub fn bucket_name(path: &str) -> Result<String, CatalogError> {
    let (scheme, rest) = split_scheme(path)?;
    let inner = rest
        .strip_suffix('/')
        .ok_or_else(|| CatalogError::InvalidPathFormat(path.to_string()))?;

    let mut head = inner;
    while let Some(idx) = head.rfind(['/', '\\']) {
        head = &head[..idx];
    }
    if head.is_empty() {
        return Err(CatalogError::InvalidPathFormat(path.to_string()));
    }
    Ok(format!("{scheme}://{head}/"))
}

/// ISO-8601 UTC truncated to whole seconds with a `Z` suffix.
pub fn iso_seconds(value: &DateTime<Utc>) -> String {
    value.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Parses an ISO-8601 timestamp. Values without an offset are taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    let naive = value.strip_suffix('Z').unwrap_or(value);
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(naive, pattern) {
            return Some(parsed.and_utc());
        }
    }
    NaiveDate::parse_from_str(naive, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
