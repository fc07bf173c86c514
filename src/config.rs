use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::domain::ModelName;
use crate::error::CatalogError;

const BUILTIN_CONFIG: &str = include_str!("../config/models.json");
const CONFIG_FILE_NAME: &str = "hc-catalog.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Netcdf3,
    Netcdf4,
    Hdf5,
    Binary,
    Txt,
    Csv,
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileFormat::Netcdf3 => write!(f, "netcdf3"),
            FileFormat::Netcdf4 => write!(f, "netcdf4"),
            FileFormat::Hdf5 => write!(f, "hdf5"),
            FileFormat::Binary => write!(f, "binary"),
            FileFormat::Txt => write!(f, "txt"),
            FileFormat::Csv => write!(f, "csv"),
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub formats: Option<BTreeMap<String, Vec<FileFormat>>>,
    #[serde(default)]
    pub flythrough_formats: Option<Vec<FileFormat>>,
    #[serde(default)]
    pub defaults: Option<DefaultsEntry>,
    #[serde(default)]
    pub mount_root: Option<String>,
    #[serde(default)]
    pub http_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct DefaultsEntry {
    #[serde(default)]
    pub about_url: Option<String>,
    #[serde(default)]
    pub citation: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub contact_id: Option<String>,
}

/// Fallback values for the free-text catalog fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDefaults {
    pub about_url: String,
    pub citation: String,
    pub contact: String,
    pub contact_id: String,
}

impl Default for EntryDefaults {
    fn default() -> Self {
        Self {
            about_url: "Not supplied".to_string(),
            citation: "Not supplied".to_string(),
            contact: "Not supplied".to_string(),
            contact_id: "ORCiD not supplied".to_string(),
        }
    }
}

/// Model name to the file formats its converted outputs are stored in.
#[derive(Debug, Clone, Default)]
pub struct FormatTable(BTreeMap<ModelName, Vec<FileFormat>>);

impl FormatTable {
    pub fn lookup(&self, model: &ModelName) -> Result<&[FileFormat], CatalogError> {
        self.0
            .get(model)
            .map(Vec::as_slice)
            .ok_or_else(|| CatalogError::UnknownModel(model.to_string()))
    }

    pub fn contains(&self, model: &ModelName) -> bool {
        self.0.contains_key(model)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ModelName, &[FileFormat])> {
        self.0.iter().map(|(model, formats)| (model, formats.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(ModelName, Vec<FileFormat>)> for FormatTable {
    fn from_iter<I: IntoIterator<Item = (ModelName, Vec<FileFormat>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub formats: FormatTable,
    pub flythrough_formats: Vec<FileFormat>,
    pub defaults: EntryDefaults,
    pub mount_root: Option<Utf8PathBuf>,
    pub http_timeout: Duration,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Explicit path, then `./hc-catalog.json`, then the user config
    /// directory, then the built-in table.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, CatalogError> {
        let config_path = match path {
            Some(path) => Some(PathBuf::from(path)),
            None => Self::discover(),
        };
        let Some(config_path) = config_path else {
            tracing::debug!("no config file found; using built-in model table");
            return Self::builtin();
        };

        tracing::debug!(path = %config_path.display(), "loading config");
        let content = fs::read_to_string(&config_path)
            .map_err(|_| CatalogError::ConfigRead(config_path.display().to_string()))?;
        Self::resolve_str(&content)
    }

    pub fn builtin() -> Result<ResolvedConfig, CatalogError> {
        Self::resolve_str(BUILTIN_CONFIG)
    }

    pub fn resolve_str(content: &str) -> Result<ResolvedConfig, CatalogError> {
        let config: Config = serde_json::from_str(content)
            .map_err(|err| CatalogError::ConfigParse(err.to_string()))?;
        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, CatalogError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let raw_formats = match config.formats {
            Some(formats) => formats,
            None => {
                let builtin: Config = serde_json::from_str(BUILTIN_CONFIG)
                    .map_err(|err| CatalogError::ConfigParse(err.to_string()))?;
                builtin.formats.unwrap_or_default()
            }
        };
        if raw_formats.is_empty() {
            return Err(CatalogError::InvalidConfig(
                "format table must list at least one model".to_string(),
            ));
        }
        let formats = raw_formats
            .into_iter()
            .map(|(model, formats)| -> Result<_, CatalogError> {
                let model: ModelName = model
                    .parse()
                    .map_err(|_| CatalogError::InvalidConfig(format!("invalid model name {model:?}")))?;
                validate_format_list(&formats, model.as_str())?;
                Ok((model, formats))
            })
            .collect::<Result<FormatTable, CatalogError>>()?;

        let flythrough_formats = config
            .flythrough_formats
            .unwrap_or_else(|| vec![FileFormat::Netcdf4]);
        validate_format_list(&flythrough_formats, "flythrough_formats")?;

        let fallback = EntryDefaults::default();
        let defaults = match config.defaults {
            Some(entry) => EntryDefaults {
                about_url: entry.about_url.unwrap_or(fallback.about_url),
                citation: entry.citation.unwrap_or(fallback.citation),
                contact: entry.contact.unwrap_or(fallback.contact),
                contact_id: entry.contact_id.unwrap_or(fallback.contact_id),
            },
            None => fallback,
        };

        let http_timeout_secs = config.http_timeout_secs.unwrap_or(30);
        if http_timeout_secs == 0 {
            return Err(CatalogError::InvalidConfig(
                "http_timeout_secs must be positive".to_string(),
            ));
        }

        let mount_root = config
            .mount_root
            .filter(|root| !root.trim().is_empty())
            .map(Utf8PathBuf::from);

        Ok(ResolvedConfig {
            schema_version,
            formats,
            flythrough_formats,
            defaults,
            mount_root,
            http_timeout: Duration::from_secs(http_timeout_secs),
        })
    }

    fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Some(local);
        }
        ProjectDirs::from("org", "heliocloud", "hc-catalog")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
            .filter(|path| path.exists())
    }
}

fn validate_format_list(formats: &[FileFormat], owner: &str) -> Result<(), CatalogError> {
    if formats.is_empty() {
        return Err(CatalogError::InvalidConfig(format!(
            "{owner} must declare at least one file format"
        )));
    }
    for (idx, format) in formats.iter().enumerate() {
        if formats[..idx].contains(format) {
            return Err(CatalogError::InvalidConfig(format!(
                "{owner} lists {format} more than once"
            )));
        }
    }
    Ok(())
}
