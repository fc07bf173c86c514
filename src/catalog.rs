use std::fs;

use camino::Utf8Path;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{EntryDefaults, FileFormat, FormatTable, ResolvedConfig};
use crate::domain::{
    DatasetId, DatasetKind, ModelName, RunName, StorageLocation, bucket_name, iso_seconds,
};
use crate::error::CatalogError;
use crate::publication::PublicationClient;
use crate::store::Store;
use crate::timelist::TimeBoundsSource;

pub const KAMODO_CCMC_CITATION: &str = "Ringuette, R., D. De Zeeuw, L. Rastaetter, and A. Pembroke. 2022. \
Kamodo's Model-Agnostic Satellite Flythrough: Lowering the Utilization Barrier for Heliophysics Model Outputs. \
Frontiers in Astronomy and Space Sciences, vol 9. http://dx.doi.org/10.3389/fspas.2022.1005977";

pub const PYSPEDAS_CITATION: &str =
    "pySPEDAS. 2022. pySPEDAS. GitHub. Accessed April 2023. https://github.com/spedas/pyspedas";

/// One dataset record of a bucket's `catalog.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: String,
    #[serde(rename = "loc", alias = "location")]
    pub location: String,
    pub title: String,
    pub start_date: String,
    pub stop_date: String,
    pub modification_date: String,
    pub index_format: String,
    pub file_format: Vec<FileFormat>,
    pub description: String,
    #[serde(rename = "resourceURL")]
    pub resource_url: String,
    pub creation_date: String,
    pub citation: String,
    pub contact: String,
    #[serde(rename = "contactID")]
    pub contact_id: String,
    #[serde(rename = "aboutURL")]
    pub about_url: String,
}

/// Optional free-text fields; unset values fall back to configured defaults.
#[derive(Debug, Clone, Default)]
pub struct EntryOptions {
    pub resource_url: Option<String>,
    pub about_url: Option<String>,
    pub citation: Option<String>,
    pub contact: Option<String>,
    pub contact_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ModelCatalogRequest {
    pub model: ModelName,
    pub run: RunName,
    pub location: StorageLocation,
    pub options: EntryOptions,
}

#[derive(Debug, Clone)]
pub struct FlythroughCatalogRequest {
    pub model: ModelName,
    pub run: RunName,
    pub location: StorageLocation,
    /// Name of the satellite trajectory flown through the model output.
    pub trajectory: String,
    pub options: EntryOptions,
}

pub struct CatalogBuilder<'a> {
    formats: &'a FormatTable,
    flythrough_formats: &'a [FileFormat],
    defaults: &'a EntryDefaults,
    bounds: &'a dyn TimeBoundsSource,
    publication: &'a dyn PublicationClient,
    now: DateTime<Utc>,
}

impl<'a> CatalogBuilder<'a> {
    pub fn new(
        config: &'a ResolvedConfig,
        bounds: &'a dyn TimeBoundsSource,
        publication: &'a dyn PublicationClient,
    ) -> Self {
        Self {
            formats: &config.formats,
            flythrough_formats: &config.flythrough_formats,
            defaults: &config.defaults,
            bounds,
            publication,
            now: Utc::now(),
        }
    }

    /// Pins the build time used for `modificationDate`.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn build_model_entry(&self, request: &ModelCatalogRequest) -> Result<CatalogEntry, CatalogError> {
        let formats = self.formats.lookup(&request.model)?.to_vec();
        let dataset = DatasetId::new(
            request.model.clone(),
            request.run.clone(),
            DatasetKind::ModelOutput,
        );
        let title = format!("{} model, {} run.", request.model, request.run);
        let description = format!(
            "{} model output for the {} run.",
            request.model, request.run
        );
        self.assemble(
            &dataset,
            &request.location,
            title,
            description,
            formats,
            &request.options,
            None,
        )
    }

    pub fn build_flythrough_entry(
        &self,
        request: &FlythroughCatalogRequest,
    ) -> Result<CatalogEntry, CatalogError> {
        self.formats.lookup(&request.model)?;
        let dataset = DatasetId::new(
            request.model.clone(),
            request.run.clone(),
            DatasetKind::Flythrough,
        );
        let title = format!(
            "Flythrough results from the {}-{} run.",
            request.model, request.run
        );
        let description = format!(
            "Created using kamodo-ccmc from {}-{} dataset using the {} trajectory obtained with pySPEDAS",
            request.model, request.run, request.trajectory
        );
        let citation = format!("{KAMODO_CCMC_CITATION}, {PYSPEDAS_CITATION}");
        self.assemble(
            &dataset,
            &request.location,
            title,
            description,
            self.flythrough_formats.to_vec(),
            &request.options,
            Some(citation),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        &self,
        dataset: &DatasetId,
        location: &StorageLocation,
        title: String,
        description: String,
        file_format: Vec<FileFormat>,
        options: &EntryOptions,
        default_citation: Option<String>,
    ) -> Result<CatalogEntry, CatalogError> {
        let bucket = bucket_name(location.as_str())?;
        let (start, stop) = self.bounds.file_times(dataset.model(), location)?;
        if start > stop {
            return Err(CatalogError::InvalidTimeRange {
                start: iso_seconds(&start),
                stop: iso_seconds(&stop),
            });
        }

        let resource_url = options
            .resource_url
            .clone()
            .filter(|url| !url.trim().is_empty());
        let creation = match &resource_url {
            Some(url) => self.publication.fetch(url)?.run_publication_time,
            None => self.now,
        };
        tracing::debug!(id = %dataset, start = %start, stop = %stop, "assembled catalog entry");

        let pick = |value: &Option<String>, fallback: &str| {
            value.clone().unwrap_or_else(|| fallback.to_string())
        };
        Ok(CatalogEntry {
            id: dataset.to_string(),
            location: format!("{bucket}{}", dataset.kind().bucket_subdir()),
            title,
            start_date: iso_seconds(&start),
            stop_date: iso_seconds(&stop),
            modification_date: iso_seconds(&self.now),
            index_format: "csv".to_string(),
            file_format,
            description,
            resource_url: resource_url.unwrap_or_default(),
            creation_date: iso_seconds(&creation),
            citation: options
                .citation
                .clone()
                .or(default_citation)
                .unwrap_or_else(|| self.defaults.citation.clone()),
            contact: pick(&options.contact, &self.defaults.contact),
            contact_id: pick(&options.contact_id, &self.defaults.contact_id),
            about_url: pick(&options.about_url, &self.defaults.about_url),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AppendAction {
    Appended,
    Replaced,
}

/// Bucket-level `catalog.json`. Entries and unknown top-level keys written
/// by other tools are kept as-is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogIndex {
    #[serde(default)]
    pub catalog: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CatalogIndex {
    pub fn load(path: &Utf8Path) -> Result<Self, CatalogError> {
        if !path.as_std_path().exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| CatalogError::Filesystem(format!("read {path}: {err}")))?;
        serde_json::from_str(&content)
            .map_err(|err| CatalogError::MalformedCatalog(format!("{path}: {err}")))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.catalog
            .iter()
            .position(|entry| entry.get("id").and_then(Value::as_str) == Some(id))
    }

    pub fn insert(&mut self, entry: &CatalogEntry, replace: bool) -> Result<AppendAction, CatalogError> {
        let value = serde_json::to_value(entry)
            .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        match self.position(&entry.id) {
            Some(_) if !replace => Err(CatalogError::DuplicateCatalogId(entry.id.clone())),
            Some(idx) => {
                self.catalog[idx] = value;
                Ok(AppendAction::Replaced)
            }
            None => {
                self.catalog.push(value);
                Ok(AppendAction::Appended)
            }
        }
    }
}

pub fn append_to_catalog(
    store: &Store,
    entry: &CatalogEntry,
    replace: bool,
) -> Result<AppendAction, CatalogError> {
    let path = store.catalog_path();
    let mut index = CatalogIndex::load(&path)?;
    let action = index.insert(entry, replace)?;
    Store::write_json_atomic(&path, &index)?;
    tracing::info!(path = %path, id = %entry.id, ?action, "updated catalog");
    Ok(action)
}
