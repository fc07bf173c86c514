use std::fs;

use camino::Utf8Path;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::parse_timestamp;
use crate::error::CatalogError;

/// Attributes and time axis stored in one flythrough output file.
#[derive(Debug, Clone, PartialEq)]
pub struct FlythroughFile {
    pub model: String,
    pub run_name: String,
    pub coordinate_system: String,
    pub coordinate_units: [String; 3],
    pub variables: Vec<String>,
    pub times: Vec<DateTime<Utc>>,
}

impl FlythroughFile {
    /// Earliest and latest sample time, whatever the sample order.
    pub fn time_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = self.times.iter().min()?;
        let stop = self.times.iter().max()?;
        Some((*start, *stop))
    }
}

pub trait FlythroughReader {
    fn read(&self, path: &Utf8Path) -> Result<FlythroughFile, CatalogError>;
}

/// Column labels for the three position components of a flythrough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CoordinateLabels(pub &'static str, pub &'static str, pub &'static str);

impl CoordinateLabels {
    pub fn from_units<S: AsRef<str>>(units: &[S; 3]) -> Result<Self, CatalogError> {
        let [first, second, third] = units.each_ref().map(|unit| unit.as_ref().trim());
        match (first, second, third) {
            ("R_E", "R_E", "R_E") => Ok(Self("X", "Y", "Z")),
            ("deg", "deg", "R_E") => Ok(Self("Longitude", "Latitude", "Radius")),
            ("deg", "deg", "km") => Ok(Self("Longitude", "Latitude", "Height")),
            _ => Err(CatalogError::UnhandledCoordinateUnits(
                first.to_string(),
                second.to_string(),
                third.to_string(),
            )),
        }
    }
}

/// Reads the text export of a flythrough: `#key: value` attribute lines,
/// an optional `#` column header, then rows led by an ISO UTC timestamp.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextFlythroughReader;

impl FlythroughReader for TextFlythroughReader {
    fn read(&self, path: &Utf8Path) -> Result<FlythroughFile, CatalogError> {
        if !path.as_std_path().is_file() {
            return Err(CatalogError::MissingUpstreamInput(path.to_string()));
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| CatalogError::Filesystem(format!("read {path}: {err}")))?;
        parse_flythrough_text(&content)
            .map_err(|err| match err {
                CatalogError::MalformedUpstreamInput(msg) => {
                    CatalogError::MalformedUpstreamInput(format!("{path}: {msg}"))
                }
                other => other,
            })
    }
}

pub fn parse_flythrough_text(content: &str) -> Result<FlythroughFile, CatalogError> {
    let mut model = None;
    let mut run_name = None;
    let mut coordinate_system = None;
    let mut coordinate_units = None;
    let mut variables = None;

    for line in content.lines() {
        let Some(comment) = line.trim().strip_prefix('#') else {
            continue;
        };
        let Some((key, value)) = comment.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "model" => model = Some(value.to_string()),
            "run_name" => run_name = Some(value.to_string()),
            "coord_type" => coordinate_system = Some(value.to_string()),
            "coord_units" => coordinate_units = Some(parse_units(value)?),
            "variables" => variables = Some(split_list(value)),
            _ => {}
        }
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());
    let mut times = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|err| CatalogError::MalformedUpstreamInput(err.to_string()))?;
        let Some(field) = record.get(0).filter(|field| !field.is_empty()) else {
            continue;
        };
        let time = parse_timestamp(field).ok_or_else(|| {
            CatalogError::MalformedUpstreamInput(format!("invalid timestamp {field:?}"))
        })?;
        times.push(time);
    }

    let missing = |name: &str| CatalogError::MalformedUpstreamInput(format!("missing #{name} attribute"));
    let file = FlythroughFile {
        model: model.ok_or_else(|| missing("model"))?,
        run_name: run_name.ok_or_else(|| missing("run_name"))?,
        coordinate_system: coordinate_system.ok_or_else(|| missing("coord_type"))?,
        coordinate_units: coordinate_units.ok_or_else(|| missing("coord_units"))?,
        variables: variables.ok_or_else(|| missing("variables"))?,
        times,
    };
    if file.times.is_empty() {
        return Err(CatalogError::MalformedUpstreamInput(
            "flythrough file has no samples".to_string(),
        ));
    }
    Ok(file)
}

fn parse_units(value: &str) -> Result<[String; 3], CatalogError> {
    let units = split_list(value);
    <[String; 3]>::try_from(units).map_err(|units| {
        CatalogError::MalformedUpstreamInput(format!(
            "expected three coordinate units, got {}",
            units.len()
        ))
    })
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
