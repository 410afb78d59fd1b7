//! Catalog entries and the catalog-service boundary.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::raster::{SkyBox, SkyCoordinate};

/// One row of an extended-source (galaxy) catalog. Axes are in arcminutes,
/// the position angle in degrees east of north.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtendedSourceEntry {
    pub name: String,
    pub ra: f64,
    pub dec: f64,
    #[serde(default)]
    pub redshift: Option<f64>,
    #[serde(default, rename = "type")]
    pub galaxy_type: Option<String>,
    /// Alternative designations, comma separated.
    #[serde(default)]
    pub alternative_names: Option<String>,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub inclination: Option<f64>,
    #[serde(default)]
    pub major: Option<f64>,
    #[serde(default)]
    pub minor: Option<f64>,
    #[serde(default)]
    pub position_angle: Option<f64>,
    #[serde(default)]
    pub principal: bool,
    /// Names of companion galaxies, comma separated.
    #[serde(default)]
    pub companions: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
}

impl ExtendedSourceEntry {
    pub fn new(name: impl Into<String>, position: SkyCoordinate) -> Self {
        Self {
            name: name.into(),
            ra: position.ra,
            dec: position.dec,
            redshift: None,
            galaxy_type: None,
            alternative_names: None,
            distance: None,
            inclination: None,
            major: None,
            minor: None,
            position_angle: None,
            principal: false,
            companions: None,
            parent: None,
        }
    }

    pub fn position(&self) -> SkyCoordinate {
        SkyCoordinate::new(self.ra, self.dec)
    }
}

/// One row of a point-source (star) catalog. Position errors are in
/// arcseconds, magnitudes per band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointSourceEntry {
    pub catalog: String,
    pub id: String,
    pub ra: f64,
    pub dec: f64,
    #[serde(default)]
    pub ra_error: Option<f64>,
    #[serde(default)]
    pub dec_error: Option<f64>,
    #[serde(default)]
    pub b_mag: Option<f64>,
    #[serde(default)]
    pub v_mag: Option<f64>,
    #[serde(default)]
    pub r_mag: Option<f64>,
    #[serde(default)]
    pub i_mag: Option<f64>,
    #[serde(default)]
    pub j_mag: Option<f64>,
    #[serde(default)]
    pub h_mag: Option<f64>,
    #[serde(default)]
    pub k_mag: Option<f64>,
}

impl PointSourceEntry {
    pub fn new(catalog: impl Into<String>, id: impl Into<String>, position: SkyCoordinate) -> Self {
        Self {
            catalog: catalog.into(),
            id: id.into(),
            ra: position.ra,
            dec: position.dec,
            ra_error: None,
            dec_error: None,
            b_mag: None,
            v_mag: None,
            r_mag: None,
            i_mag: None,
            j_mag: None,
            h_mag: None,
            k_mag: None,
        }
    }

    pub fn position(&self) -> SkyCoordinate {
        SkyCoordinate::new(self.ra, self.dec)
    }
}

/// Catalog lookup service. Implementations may reach out to remote services.
pub trait CatalogSource: Send + Sync {
    fn get_extended_source_catalog(
        &self,
        bounding_box: &SkyBox,
    ) -> Result<Vec<ExtendedSourceEntry>, CatalogError>;

    /// `min_pixelscale` (arcsec) lets a service pick catalogs matching the resolution.
    fn get_point_source_catalog(
        &self,
        bounding_box: &SkyBox,
        min_pixelscale: f64,
        catalogs: &[String],
    ) -> Result<Vec<PointSourceEntry>, CatalogError>;
}

/// Serves tables held in memory. A missing table reports the service as unavailable.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalogSource {
    extended: Option<Vec<ExtendedSourceEntry>>,
    point: Option<Vec<PointSourceEntry>>,
}

impl StaticCatalogSource {
    pub fn new(
        extended: Option<Vec<ExtendedSourceEntry>>,
        point: Option<Vec<PointSourceEntry>>,
    ) -> Self {
        Self { extended, point }
    }

    pub fn from_files(
        extended: Option<&Path>,
        point: Option<&Path>,
    ) -> Result<Self, CatalogError> {
        Ok(Self {
            extended: extended.map(read_table).transpose()?,
            point: point.map(read_table).transpose()?,
        })
    }
}

impl CatalogSource for StaticCatalogSource {
    fn get_extended_source_catalog(
        &self,
        bounding_box: &SkyBox,
    ) -> Result<Vec<ExtendedSourceEntry>, CatalogError> {
        let entries = self
            .extended
            .as_ref()
            .ok_or_else(|| CatalogError::Unavailable("no extended-source catalog".to_string()))?;
        Ok(entries
            .iter()
            .filter(|e| bounding_box.contains(e.position()))
            .cloned()
            .collect())
    }

    fn get_point_source_catalog(
        &self,
        bounding_box: &SkyBox,
        _min_pixelscale: f64,
        catalogs: &[String],
    ) -> Result<Vec<PointSourceEntry>, CatalogError> {
        let entries = self
            .point
            .as_ref()
            .ok_or_else(|| CatalogError::Unavailable("no point-source catalog".to_string()))?;
        Ok(entries
            .iter()
            .filter(|e| bounding_box.contains(e.position()))
            .filter(|e| catalogs.is_empty() || catalogs.contains(&e.catalog))
            .cloned()
            .collect())
    }
}

pub fn read_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, CatalogError> {
    let file = std::fs::File::open(path).map_err(|source| CatalogError::Io {
        path: PathBuf::from(path),
        source,
    })?;
    let mut reader = csv::Reader::from_reader(file);
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

pub fn write_table<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
