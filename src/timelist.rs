use std::fs;

use camino::Utf8Path;
use chrono::{DateTime, TimeDelta, Utc};

use crate::domain::{ModelName, StorageLocation, parse_timestamp};
use crate::error::CatalogError;
use crate::store::Store;

pub fn times_file_name(model: &ModelName) -> String {
    format!("{model}_times.txt")
}

pub fn list_file_name(model: &ModelName) -> String {
    format!("{model}_lists3.txt")
}

/// Resolves the first and last timestamp covered by a dataset.
pub trait TimeBoundsSource {
    fn file_times(
        &self,
        model: &ModelName,
        location: &StorageLocation,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>), CatalogError>;
}

/// Time ranges of one file-name pattern, in file-list order.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternTimes {
    pub pattern: String,
    pub ranges: Vec<(DateTime<Utc>, DateTime<Utc>)>,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeListEntry<'a> {
    pub key: &'a str,
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
}

/// Parsed `{model}_times.txt` + `{model}_lists3.txt` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeList {
    pub file_date: DateTime<Utc>,
    pub patterns: Vec<PatternTimes>,
}

impl TimeList {
    pub fn read(times_path: &Utf8Path, list_path: &Utf8Path) -> Result<Self, CatalogError> {
        let times = read_input(times_path)?;
        let list = read_input(list_path)?;
        Self::parse(&times, &list)
    }

    pub fn parse(times: &str, list: &str) -> Result<Self, CatalogError> {
        let (file_date, ranges) = parse_times(times)?;
        let mut patterns = ranges
            .into_iter()
            .map(|(pattern, ranges)| PatternTimes {
                pattern,
                ranges,
                files: Vec::new(),
            })
            .collect::<Vec<_>>();

        for line in content_lines(list) {
            let file_name = line.rsplit(['/', '\\']).next().unwrap_or(line);
            let owner = patterns
                .iter_mut()
                .filter(|p| file_name.contains(p.pattern.as_str()))
                .max_by_key(|p| p.pattern.len())
                .ok_or_else(|| {
                    CatalogError::MalformedUpstreamInput(format!(
                        "file {line} matches no pattern in the time list"
                    ))
                })?;
            owner.files.push(line.to_string());
        }

        for pattern in &patterns {
            if pattern.files.len() != pattern.ranges.len() {
                return Err(CatalogError::MalformedUpstreamInput(format!(
                    "pattern {} has {} time ranges but {} files",
                    pattern.pattern,
                    pattern.ranges.len(),
                    pattern.files.len()
                )));
            }
        }

        Ok(Self {
            file_date,
            patterns,
        })
    }

    /// Files in pattern order, each with its absolute time range.
    pub fn entries(&self) -> impl Iterator<Item = TimeListEntry<'_>> + '_ {
        self.patterns.iter().flat_map(|pattern| {
            pattern
                .files
                .iter()
                .zip(&pattern.ranges)
                .map(|(key, (start, stop))| TimeListEntry {
                    key: key.as_str(),
                    start: *start,
                    stop: *stop,
                })
        })
    }

    pub fn bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        range_bounds(self.patterns.iter().flat_map(|p| p.ranges.iter().copied()))
    }
}

type PatternRanges = Vec<(String, Vec<(DateTime<Utc>, DateTime<Utc>)>)>;

/// Parses the times file into its file date and per-pattern time ranges.
/// Hour offsets that leave the representable date range are malformed.
pub fn parse_times(content: &str) -> Result<(DateTime<Utc>, PatternRanges), CatalogError> {
    let malformed = |msg: String| CatalogError::MalformedUpstreamInput(msg);
    let mut file_date = None;
    let mut patterns: Vec<(String, Vec<(f64, f64)>)> = Vec::new();

    for line in content_lines(content) {
        if let Some(value) = line.strip_prefix("File Date:") {
            let parsed = parse_timestamp(value)
                .ok_or_else(|| malformed(format!("invalid file date {:?}", value.trim())))?;
            file_date = Some(parsed);
        } else if let Some(value) = line.strip_prefix("Pattern:") {
            let pattern = value.trim();
            if pattern.is_empty() {
                return Err(malformed("empty pattern name".to_string()));
            }
            patterns.push((pattern.to_string(), Vec::new()));
        } else {
            let (_, ranges) = patterns
                .last_mut()
                .ok_or_else(|| malformed(format!("time range before any pattern: {line}")))?;
            let mut fields = line.split_whitespace();
            let (Some(start), Some(end), None) = (fields.next(), fields.next(), fields.next()) else {
                return Err(malformed(format!("expected `start end` hours, got {line:?}")));
            };
            let start: f64 = start
                .parse()
                .map_err(|_| malformed(format!("invalid start hour {start:?}")))?;
            let end: f64 = end
                .parse()
                .map_err(|_| malformed(format!("invalid end hour {end:?}")))?;
            if !start.is_finite() || !end.is_finite() || end < start {
                return Err(malformed(format!("invalid time range {start} {end}")));
            }
            ranges.push((start, end));
        }
    }

    let file_date = file_date.ok_or_else(|| malformed("missing `File Date:` line".to_string()))?;
    if patterns.iter().all(|(_, ranges)| ranges.is_empty()) {
        return Err(malformed("time list contains no time ranges".to_string()));
    }
    let patterns = patterns
        .into_iter()
        .map(|(pattern, ranges)| -> Result<_, CatalogError> {
            let ranges = ranges
                .into_iter()
                .map(|(start, end)| -> Result<_, CatalogError> {
                    Ok((offset(file_date, start)?, offset(file_date, end)?))
                })
                .collect::<Result<Vec<_>, CatalogError>>()?;
            Ok((pattern, ranges))
        })
        .collect::<Result<Vec<_>, CatalogError>>()?;
    Ok((file_date, patterns))
}

/// Time bounds from the `{model}_times.txt` file found under the mounted
/// dataset location.
#[derive(Debug, Clone)]
pub struct TimeListBounds {
    store: Store,
}

impl TimeListBounds {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

impl TimeBoundsSource for TimeListBounds {
    fn file_times(
        &self,
        model: &ModelName,
        location: &StorageLocation,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>), CatalogError> {
        let path = self
            .store
            .resolve_location(location)?
            .join(times_file_name(model));
        let content = read_input(&path)?;
        let (_, patterns) = parse_times(&content)?;
        range_bounds(patterns.into_iter().flat_map(|(_, ranges)| ranges))
            .ok_or_else(|| CatalogError::MalformedUpstreamInput(format!("{path}: no time ranges")))
    }
}

fn range_bounds(
    ranges: impl Iterator<Item = (DateTime<Utc>, DateTime<Utc>)>,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    ranges.fold(None, |acc, (start, stop)| match acc {
        Some((lo, hi)) => Some((start.min(lo), stop.max(hi))),
        None => Some((start, stop)),
    })
}

/// `file_date` shifted by a fractional number of hours.
fn offset(file_date: DateTime<Utc>, hours: f64) -> Result<DateTime<Utc>, CatalogError> {
    let millis = (hours * 3_600_000.0).round();
    TimeDelta::try_milliseconds(millis as i64)
        .filter(|_| millis.abs() < i64::MAX as f64)
        .and_then(|delta| file_date.checked_add_signed(delta))
        .ok_or_else(|| {
            CatalogError::MalformedUpstreamInput(format!(
                "hour offset {hours} is out of range for file date {}",
                file_date.format("%Y-%m-%d")
            ))
        })
}

fn read_input(path: &Utf8Path) -> Result<String, CatalogError> {
    if !path.as_std_path().is_file() {
        return Err(CatalogError::MissingUpstreamInput(path.to_string()));
    }
    fs::read_to_string(path.as_std_path())
        .map_err(|err| CatalogError::Filesystem(format!("read {path}: {err}")))
}

fn content_lines(content: &str) -> impl Iterator<Item = &str> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    use super::*;

    const TIMES: &str = "# generated by data prep\nFile Date: 2020-12-31\nPattern: 3D\n23.0 24.0\n24.0 25.0\nPattern: 3D_ion\n0.5 1.5\n";

    #[test]
    fn longest_pattern_wins() {
        let list = "s3://b/run/out_3D_ion_0001.nc\ns3://b/run/out_3D_0001.nc\ns3://b/run/out_3D_0002.nc\n";
        let parsed = TimeList::parse(TIMES, list).unwrap();
        assert_eq!(parsed.patterns[0].files.len(), 2);
        assert_eq!(parsed.patterns[1].files, vec!["s3://b/run/out_3D_ion_0001.nc"]);

        let entries = parsed.entries().collect::<Vec<_>>();
        assert_eq!(entries[1].start, Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(entries[2].stop, Utc.with_ymd_and_hms(2020, 12, 31, 1, 30, 0).unwrap());
    }

    #[test]
    fn bounds_span_all_patterns() {
        let (start, stop) = TimeList::parse(TIMES, "a_3D_1\na_3D_2\na_3D_ion_1\n")
            .unwrap()
            .bounds()
            .unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2020, 12, 31, 0, 30, 0).unwrap());
        assert_eq!(stop, Utc.with_ymd_and_hms(2021, 1, 1, 1, 0, 0).unwrap());
    }

    #[test]
    fn count_mismatch_is_malformed() {
        let err = TimeList::parse(TIMES, "a_3D_1\n").unwrap_err();
        assert_matches!(err, CatalogError::MalformedUpstreamInput(_));
    }

    #[test]
    fn huge_hour_offset_is_malformed() {
        let err = TimeList::parse("File Date: 2020-01-01\nPattern: out\n0 1e10\n", "out_1.nc\n")
            .unwrap_err();
        assert_matches!(err, CatalogError::MalformedUpstreamInput(_));
        let err = parse_times("File Date: 2020-01-01\nPattern: out\n0 1e300\n").unwrap_err();
        assert_matches!(err, CatalogError::MalformedUpstreamInput(_));
    }

    #[test]
    fn missing_file_date_is_malformed() {
        let err = parse_times("Pattern: x\n0 1\n").unwrap_err();
        assert_matches!(err, CatalogError::MalformedUpstreamInput(_));
    }
}
