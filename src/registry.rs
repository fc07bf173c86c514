//! File registries: one schema descriptor per dataset and one CSV per
//! calendar year of file start dates.
//!
//! Rows are partitioned and rendered in memory first; year files are only
//! written once every bucket rendered cleanly, each through an atomic
//! temp-file rename.

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Datelike, Utc};
use csv::{QuoteStyle, Terminator, WriterBuilder};
use serde::Serialize;

use crate::domain::{DatasetId, DatasetKind, ModelName, RunName, StorageLocation, iso_seconds};
use crate::error::CatalogError;
use crate::flythrough::{CoordinateLabels, FlythroughReader};
use crate::store::Store;
use crate::timelist::{TimeList, list_file_name, times_file_name};

pub const REGISTRY_FORMAT_VERSION: &str = "0.2";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaParameter {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySchema {
    pub format_version: &'static str,
    pub parameters: Vec<SchemaParameter>,
}

const fn param(name: &'static str, kind: &'static str, description: &'static str) -> SchemaParameter {
    SchemaParameter {
        name,
        kind,
        description,
    }
}

impl RegistrySchema {
    pub fn for_kind(kind: DatasetKind) -> Self {
        let mut parameters = vec![
            param("startDate", "string", "ISO date of start of file"),
            param("key", "string", "Full path to the file"),
            param("filesize", "int", "Size of the file in bytes"),
            param("stopDate", "string", "ISO date of end of file"),
        ];
        if kind == DatasetKind::Flythrough {
            parameters.extend([
                param("model", "string", "Name of model."),
                param("runname", "string", "Name of run."),
                param("coordinate_system", "string", "Name of the coordinate system of the trajectory."),
                param("coordinate1", "string", "X in R_E or longitude in degrees."),
                param("coordinate2", "string", "Y in R_E or latitude in degrees."),
                param("coordinate3", "string", "Z in R_E, radius in R_E, or height in km."),
                param(
                    "variable_list",
                    "string",
                    "Comma-separated list of variable names in the flythrough output.",
                ),
            ]);
        }
        Self {
            format_version: REGISTRY_FORMAT_VERSION,
            parameters,
        }
    }

    pub fn header_line(&self) -> String {
        let names = self
            .parameters
            .iter()
            .map(|p| p.name)
            .collect::<Vec<_>>()
            .join(", ");
        format!("# {names}\n")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlythroughColumns {
    pub model: String,
    pub run_name: String,
    pub coordinate_system: String,
    pub labels: CoordinateLabels,
    pub variables: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegistryRow {
    pub start: DateTime<Utc>,
    pub key: String,
    pub size: u64,
    pub stop: DateTime<Utc>,
    pub flythrough: Option<FlythroughColumns>,
}

impl RegistryRow {
    pub fn year(&self) -> i32 {
        self.start.year()
    }

    fn fields(&self) -> Vec<String> {
        let mut fields = vec![
            iso_seconds(&self.start),
            self.key.clone(),
            self.size.to_string(),
            iso_seconds(&self.stop),
        ];
        if let Some(extra) = &self.flythrough {
            fields.extend([
                extra.model.clone(),
                extra.run_name.clone(),
                extra.coordinate_system.clone(),
                extra.labels.0.to_string(),
                extra.labels.1.to_string(),
                extra.labels.2.to_string(),
                extra.variables.join(","),
            ]);
        }
        fields
    }
}

/// Produces the rows of one dataset's registry.
pub trait RowSource {
    fn kind(&self) -> DatasetKind;
    fn rows(&self, store: &Store) -> Result<Vec<RegistryRow>, CatalogError>;
}

/// Model-output rows from the `{model}_times.txt` / `{model}_lists3.txt`
/// pair written next to the converted outputs.
#[derive(Debug, Clone)]
pub struct TimeListRows {
    pub model: ModelName,
    pub location: StorageLocation,
}

impl RowSource for TimeListRows {
    fn kind(&self) -> DatasetKind {
        DatasetKind::ModelOutput
    }

    fn rows(&self, store: &Store) -> Result<Vec<RegistryRow>, CatalogError> {
        let dir = store.resolve_location(&self.location)?;
        let timelist = TimeList::read(
            &dir.join(times_file_name(&self.model)),
            &dir.join(list_file_name(&self.model)),
        )?;
        timelist
            .entries()
            .map(|entry| -> Result<RegistryRow, CatalogError> {
                let local = match store.resolve_file(entry.key)? {
                    path if path.is_relative() => dir.join(path),
                    path => path,
                };
                Ok(RegistryRow {
                    start: entry.start,
                    key: entry.key.to_string(),
                    size: Store::file_size(&local)?,
                    stop: entry.stop,
                    flythrough: None,
                })
            })
            .collect()
    }
}

/// Flythrough rows read from each output file's stored attributes. Every
/// file must name the same model and run as the registry.
pub struct FlythroughRows<'a, R: FlythroughReader> {
    pub reader: &'a R,
    pub model: ModelName,
    pub run: RunName,
    pub files: Vec<Utf8PathBuf>,
    /// Bucket location the files are published under; keys fall back to
    /// the local paths when unset.
    pub location: Option<StorageLocation>,
}

impl<R: FlythroughReader> FlythroughRows<'_, R> {
    fn key_for(&self, path: &Utf8Path) -> String {
        match (&self.location, path.file_name()) {
            (Some(location), Some(name)) => location.child(name),
            _ => path.to_string(),
        }
    }
}

impl<R: FlythroughReader> RowSource for FlythroughRows<'_, R> {
    fn kind(&self) -> DatasetKind {
        DatasetKind::Flythrough
    }

    fn rows(&self, _store: &Store) -> Result<Vec<RegistryRow>, CatalogError> {
        self.files
            .iter()
            .map(|path| -> Result<RegistryRow, CatalogError> {
                let file = self.reader.read(path)?;
                if file.model != self.model.as_str() || file.run_name != self.run.as_str() {
                    return Err(CatalogError::MalformedUpstreamInput(format!(
                        "{path} holds {}-{} output, expected {}-{}",
                        file.model, file.run_name, self.model, self.run
                    )));
                }
                let (start, stop) = file.time_range().ok_or_else(|| {
                    CatalogError::MalformedUpstreamInput(format!("{path}: no samples"))
                })?;
                let labels = CoordinateLabels::from_units(&file.coordinate_units)?;
                Ok(RegistryRow {
                    start,
                    key: self.key_for(path),
                    size: Store::file_size(path)?,
                    stop,
                    flythrough: Some(FlythroughColumns {
                        model: file.model,
                        run_name: file.run_name,
                        coordinate_system: file.coordinate_system,
                        labels,
                        variables: file.variables,
                    }),
                })
            })
            .collect()
    }
}

/// Groups rows by the calendar year of their start date, keeping input
/// order within each year.
pub fn partition_by_year(rows: Vec<RegistryRow>) -> BTreeMap<i32, Vec<RegistryRow>> {
    let mut buckets: BTreeMap<i32, Vec<RegistryRow>> = BTreeMap::new();
    for row in rows {
        buckets.entry(row.year()).or_default().push(row);
    }
    buckets
}

pub fn render_year(schema: &RegistrySchema, rows: &[RegistryRow]) -> Result<Vec<u8>, CatalogError> {
    let mut buffer = schema.header_line().into_bytes();
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .quote(b'\'')
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(&mut buffer);
    for row in rows {
        let fields = row.fields();
        if fields.len() != schema.parameters.len() {
            return Err(CatalogError::MalformedUpstreamInput(format!(
                "row for {} has {} fields, registry expects {}",
                row.key,
                fields.len(),
                schema.parameters.len()
            )));
        }
        writer
            .write_record(&fields)
            .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    }
    writer
        .flush()
        .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    drop(writer);
    Ok(buffer)
}

/// Writes the schema descriptor unless it already exists. Returns whether
/// it was written.
pub fn write_schema(store: &Store, dataset: &DatasetId) -> Result<bool, CatalogError> {
    let path = store.schema_path(dataset);
    let schema = RegistrySchema::for_kind(dataset.kind());
    let mut content = serde_json::to_vec_pretty(&schema)
        .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    content.push(b'\n');
    let written = Store::write_bytes_if_absent(&path, &content)?;
    if written {
        tracing::info!(path = %path, "wrote registry schema");
    } else {
        tracing::debug!(path = %path, "registry schema already present");
    }
    Ok(written)
}

#[derive(Debug, Clone, Serialize)]
pub struct YearFile {
    pub year: i32,
    pub path: String,
    pub rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistryOutcome {
    pub dataset_id: String,
    pub schema_path: String,
    pub schema_written: bool,
    pub files: Vec<YearFile>,
}

pub fn write_registry(
    store: &Store,
    model: &ModelName,
    run: &RunName,
    source: &dyn RowSource,
) -> Result<RegistryOutcome, CatalogError> {
    let dataset = DatasetId::new(model.clone(), run.clone(), source.kind());
    store.ensure_output_root()?;
    let schema_written = write_schema(store, &dataset)?;

    let rows = source.rows(store)?;
    if rows.is_empty() {
        tracing::warn!(dataset = %dataset, "no files found; no registry written");
    }
    let schema = RegistrySchema::for_kind(dataset.kind());
    let rendered = partition_by_year(rows)
        .into_iter()
        .map(|(year, rows)| -> Result<_, CatalogError> {
            Ok((year, rows.len(), render_year(&schema, &rows)?))
        })
        .collect::<Result<Vec<_>, CatalogError>>()?;

    let mut files = Vec::with_capacity(rendered.len());
    for (year, count, content) in rendered {
        let path = store.registry_path(&dataset, year);
        Store::write_bytes_atomic(&path, &content)?;
        tracing::info!(path = %path, year, rows = count, "wrote registry file");
        files.push(YearFile {
            year,
            path: path.to_string(),
            rows: count,
        });
    }

    Ok(RegistryOutcome {
        dataset_id: dataset.to_string(),
        schema_path: store.schema_path(&dataset).to_string(),
        schema_written,
        files,
    })
}
