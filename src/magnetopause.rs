//! Magnetopause crossing geometry for Earth-centered spacecraft positions.
//!
//! Positions are Cartesian in Earth radii with +X toward the Sun (GSE/GSM
//! style frames). The boundary shape follows the Shue et al. functional form
//! `r = r0 * (2 / (1 + cos theta))^alpha`.

use camino::Utf8Path;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::parse_timestamp;
use crate::error::CatalogError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn radius(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Longitude and latitude in degrees, radius in the Cartesian unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Spherical {
    pub longitude: f64,
    pub latitude: f64,
    pub radius: f64,
}

pub fn cartesian_to_spherical(position: Position) -> Spherical {
    let radius = position.radius();
    if radius == 0.0 {
        return Spherical {
            longitude: 0.0,
            latitude: 0.0,
            radius,
        };
    }
    Spherical {
        longitude: position.y.atan2(position.x).to_degrees(),
        latitude: (position.z / radius).asin().to_degrees(),
        radius,
    }
}

pub fn spherical_to_cartesian(spherical: Spherical) -> Position {
    let lon = spherical.longitude.to_radians();
    let lat = spherical.latitude.to_radians();
    Position {
        x: spherical.radius * lat.cos() * lon.cos(),
        y: spherical.radius * lat.cos() * lon.sin(),
        z: spherical.radius * lat.sin(),
    }
}

/// Angle in radians between the Earth-spacecraft line and the Earth-Sun line.
pub fn solar_zenith_angle(position: Position) -> f64 {
    let radius = position.radius();
    if radius == 0.0 {
        return f64::NAN;
    }
    (position.x / radius).clamp(-1.0, 1.0).acos()
}

/// Subsolar standoff distance (R_E) and flaring exponent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Standoff {
    pub r0: f64,
    pub alpha: f64,
}

pub trait StandoffModel {
    fn standoff(&self, index: usize) -> Result<Standoff, CatalogError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolarWind {
    /// IMF Bz in nT.
    pub bz: f64,
    /// Dynamic pressure in nPa.
    pub dp: f64,
}

/// Shue et al. (1998) parameters from per-sample solar-wind conditions.
#[derive(Debug, Clone)]
pub struct Shue1998 {
    conditions: Vec<SolarWind>,
}

impl Shue1998 {
    pub fn new(conditions: Vec<SolarWind>) -> Self {
        Self { conditions }
    }

    pub fn parameters(wind: SolarWind) -> Result<Standoff, CatalogError> {
        if !wind.dp.is_finite() || wind.dp <= 0.0 || !wind.bz.is_finite() {
            return Err(CatalogError::MalformedUpstreamInput(format!(
                "solar wind conditions out of range: bz={} dp={}",
                wind.bz, wind.dp
            )));
        }
        let r0 = (10.22 + 1.29 * (0.184 * (wind.bz + 8.14)).tanh()) * wind.dp.powf(-1.0 / 6.6);
        let alpha = (0.58 - 0.007 * wind.bz) * (1.0 + 0.024 * wind.dp.ln());
        Ok(Standoff { r0, alpha })
    }
}

impl StandoffModel for Shue1998 {
    fn standoff(&self, index: usize) -> Result<Standoff, CatalogError> {
        let wind = self.conditions.get(index).ok_or_else(|| {
            CatalogError::MalformedUpstreamInput(format!("no solar wind conditions for sample {index}"))
        })?;
        Self::parameters(*wind)
    }
}

pub fn magnetopause_distance(standoff: Standoff, theta: f64) -> f64 {
    standoff.r0 * (2.0 / (1.0 + theta.cos())).powf(standoff.alpha)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MagnetopauseSample {
    pub solar_zenith_angle: f64,
    pub standoff: Standoff,
    pub magnetopause_distance: f64,
    pub spacecraft_distance: f64,
    /// Spacecraft distance minus magnetopause distance; positive outside.
    pub difference: f64,
}

pub fn analyze(
    positions: &[Position],
    model: &dyn StandoffModel,
) -> Result<Vec<MagnetopauseSample>, CatalogError> {
    positions
        .iter()
        .enumerate()
        .map(|(index, position)| -> Result<MagnetopauseSample, CatalogError> {
            let theta = solar_zenith_angle(*position);
            let standoff = model.standoff(index)?;
            let magnetopause_distance = magnetopause_distance(standoff, theta);
            let spacecraft_distance = position.radius();
            Ok(MagnetopauseSample {
                solar_zenith_angle: theta,
                standoff,
                magnetopause_distance,
                spacecraft_distance,
                difference: spacecraft_distance - magnetopause_distance,
            })
        })
        .collect()
}

/// Index `i` of every adjacent pair `(d[i], d[i + 1])` whose signs differ.
/// Zero counts as non-negative; pairs involving NaN are skipped.
pub fn crossing_indices(differences: &[f64]) -> Vec<usize> {
    differences
        .windows(2)
        .enumerate()
        .filter(|(_, pair)| !pair[0].is_nan() && !pair[1].is_nan())
        .filter(|(_, pair)| (pair[0] < 0.0) != (pair[1] < 0.0))
        .map(|(idx, _)| idx)
        .collect()
}

/// One row of a trajectory file: `time,x,y,z,bz,dp`.
#[derive(Debug, Clone, Deserialize)]
struct TrajectoryRecord {
    time: String,
    x: f64,
    y: f64,
    z: f64,
    bz: f64,
    dp: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrajectorySample {
    pub time: DateTime<Utc>,
    pub position: Position,
    pub wind: SolarWind,
}

pub fn read_trajectory(path: &Utf8Path) -> Result<Vec<TrajectorySample>, CatalogError> {
    if !path.as_std_path().is_file() {
        return Err(CatalogError::MissingUpstreamInput(path.to_string()));
    }
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_path(path.as_std_path())
        .map_err(|err| CatalogError::Filesystem(format!("read {path}: {err}")))?;
    let mut samples = Vec::new();
    for record in reader.deserialize::<TrajectoryRecord>() {
        let record =
            record.map_err(|err| CatalogError::MalformedUpstreamInput(format!("{path}: {err}")))?;
        let time = parse_timestamp(&record.time).ok_or_else(|| {
            CatalogError::MalformedUpstreamInput(format!("{path}: invalid time {:?}", record.time))
        })?;
        samples.push(TrajectorySample {
            time,
            position: Position {
                x: record.x,
                y: record.y,
                z: record.z,
            },
            wind: SolarWind {
                bz: record.bz,
                dp: record.dp,
            },
        });
    }
    Ok(samples)
}
