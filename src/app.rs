use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::catalog::{
    AppendAction, CatalogBuilder, CatalogEntry, FlythroughCatalogRequest, ModelCatalogRequest,
    append_to_catalog,
};
use crate::config::ResolvedConfig;
use crate::domain::{ModelName, RunName, StorageLocation, iso_seconds};
use crate::error::CatalogError;
use crate::flythrough::FlythroughReader;
use crate::magnetopause::{self, Shue1998};
use crate::publication::PublicationClient;
use crate::registry::{FlythroughRows, RegistryOutcome, TimeListRows, write_registry};
use crate::store::Store;
use crate::timelist::TimeBoundsSource;

#[derive(Debug, Clone, Copy, Default)]
pub struct CatalogOptions {
    pub dry_run: bool,
    pub replace: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogResult {
    pub entry: CatalogEntry,
    pub catalog_path: Option<String>,
    pub action: Option<AppendAction>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FormatsResult {
    pub models: Vec<FormatsEntry>,
    pub flythrough: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FormatsEntry {
    pub model: String,
    pub formats: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrossingResult {
    pub samples: usize,
    pub crossings: Vec<Crossing>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Crossing {
    pub index: usize,
    pub time: String,
    /// `true` when the spacecraft moves from inside to outside the boundary.
    pub outbound: bool,
}

/// Where flythrough output files come from.
#[derive(Debug, Clone)]
pub enum FlythroughFiles {
    Listed(Vec<Utf8PathBuf>),
    Directory { dir: Utf8PathBuf, extension: String },
}

pub struct App<T: TimeBoundsSource, P: PublicationClient, F: FlythroughReader> {
    store: Store,
    config: ResolvedConfig,
    bounds: T,
    publication: P,
    reader: F,
    now: Option<DateTime<Utc>>,
}

impl<T: TimeBoundsSource, P: PublicationClient, F: FlythroughReader> App<T, P, F> {
    pub fn new(store: Store, config: ResolvedConfig, bounds: T, publication: P, reader: F) -> Self {
        Self {
            store,
            config,
            bounds,
            publication,
            reader,
            now: None,
        }
    }

    /// Fixes the build timestamp instead of reading the clock.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    fn builder(&self) -> CatalogBuilder<'_> {
        let builder = CatalogBuilder::new(&self.config, &self.bounds, &self.publication);
        match self.now {
            Some(now) => builder.at(now),
            None => builder,
        }
    }

    pub fn catalog_model(
        &self,
        request: &ModelCatalogRequest,
        options: CatalogOptions,
    ) -> Result<CatalogResult, CatalogError> {
        let entry = self.builder().build_model_entry(request)?;
        self.publish_entry(entry, options)
    }

    pub fn catalog_flythrough(
        &self,
        request: &FlythroughCatalogRequest,
        options: CatalogOptions,
    ) -> Result<CatalogResult, CatalogError> {
        let entry = self.builder().build_flythrough_entry(request)?;
        self.publish_entry(entry, options)
    }

    fn publish_entry(
        &self,
        entry: CatalogEntry,
        options: CatalogOptions,
    ) -> Result<CatalogResult, CatalogError> {
        if options.dry_run {
            return Ok(CatalogResult {
                entry,
                catalog_path: None,
                action: None,
            });
        }
        self.store.ensure_output_root()?;
        let action = append_to_catalog(&self.store, &entry, options.replace)?;
        Ok(CatalogResult {
            entry,
            catalog_path: Some(self.store.catalog_path().to_string()),
            action: Some(action),
        })
    }

    pub fn registry_model(
        &self,
        model: &ModelName,
        run: &RunName,
        location: &StorageLocation,
    ) -> Result<RegistryOutcome, CatalogError> {
        self.config.formats.lookup(model)?;
        let source = TimeListRows {
            model: model.clone(),
            location: location.clone(),
        };
        write_registry(&self.store, model, run, &source)
    }

    pub fn registry_flythrough(
        &self,
        model: &ModelName,
        run: &RunName,
        files: FlythroughFiles,
        location: Option<StorageLocation>,
    ) -> Result<RegistryOutcome, CatalogError> {
        let files = match files {
            FlythroughFiles::Listed(files) => files,
            FlythroughFiles::Directory { dir, extension } => list_files(&dir, &extension)?,
        };
        if files.is_empty() {
            return Err(CatalogError::MissingUpstreamInput(
                "no flythrough output files given".to_string(),
            ));
        }
        let source = FlythroughRows {
            reader: &self.reader,
            model: model.clone(),
            run: run.clone(),
            files,
            location,
        };
        write_registry(&self.store, model, run, &source)
    }

    pub fn crossings(&self, trajectory: &Utf8Path) -> Result<CrossingResult, CatalogError> {
        let samples = magnetopause::read_trajectory(trajectory)?;
        let positions = samples.iter().map(|s| s.position).collect::<Vec<_>>();
        let model = Shue1998::new(samples.iter().map(|s| s.wind).collect());
        let analyzed = magnetopause::analyze(&positions, &model)?;
        let differences = analyzed.iter().map(|s| s.difference).collect::<Vec<_>>();
        let crossings = magnetopause::crossing_indices(&differences)
            .into_iter()
            .map(|index| Crossing {
                index,
                time: iso_seconds(&samples[index].time),
                outbound: differences[index] < 0.0,
            })
            .collect::<Vec<_>>();
        tracing::info!(samples = samples.len(), crossings = crossings.len(), "magnetopause crossings");
        Ok(CrossingResult {
            samples: samples.len(),
            crossings,
        })
    }

    pub fn formats(&self) -> FormatsResult {
        FormatsResult {
            models: self
                .config
                .formats
                .iter()
                .map(|(model, formats)| FormatsEntry {
                    model: model.to_string(),
                    formats: formats.iter().map(ToString::to_string).collect(),
                })
                .collect(),
            flythrough: self
                .config
                .flythrough_formats
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Regular files in `dir` with the given extension, sorted by name.
fn list_files(dir: &Utf8Path, extension: &str) -> Result<Vec<Utf8PathBuf>, CatalogError> {
    if !dir.as_std_path().is_dir() {
        return Err(CatalogError::MissingUpstreamInput(dir.to_string()));
    }
    let entries =
        fs::read_dir(dir.as_std_path()).map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        let path = Utf8PathBuf::from_path_buf(entry.path())
            .map_err(|_| CatalogError::Filesystem("non-utf8 file path in flythrough dir".to_string()))?;
        let is_match = path.is_file()
            && path.extension().map(|ext| ext == extension).unwrap_or(false)
            && !path.file_name().map(|name| name.starts_with('.')).unwrap_or(true);
        if is_match {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
