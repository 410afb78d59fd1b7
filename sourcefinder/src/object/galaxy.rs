use glam::DVec2;
use serde::{Deserialize, Serialize};

use super::CatalogObject;
use crate::catalog::ExtendedSourceEntry;
use crate::error::DetectionError;
use crate::raster::{Ellipse, Frame};
use crate::source::Source;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalaxyInfo {
    pub name: String,
    pub principal: bool,
    pub parent: Option<String>,
    pub companions: Vec<String>,
    /// Diameter along the major axis, arcminutes.
    pub major: Option<f64>,
    pub minor: Option<f64>,
    /// Degrees east of north.
    pub position_angle: Option<f64>,
    pub redshift: Option<f64>,
    pub galaxy_type: Option<String>,
    pub distance: Option<f64>,
    pub inclination: Option<f64>,
    pub alternative_names: Vec<String>,
}

fn split_names(names: &Option<String>) -> Vec<String> {
    names
        .as_deref()
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

impl From<&ExtendedSourceEntry> for GalaxyInfo {
    fn from(entry: &ExtendedSourceEntry) -> Self {
        Self {
            name: entry.name.clone(),
            principal: entry.principal,
            parent: entry.parent.clone(),
            companions: split_names(&entry.companions),
            major: entry.major,
            minor: entry.minor,
            position_angle: entry.position_angle,
            redshift: entry.redshift,
            galaxy_type: entry.galaxy_type.clone(),
            distance: entry.distance,
            inclination: entry.inclination,
            alternative_names: split_names(&entry.alternative_names),
        }
    }
}

impl GalaxyInfo {
    pub fn has_extent(&self) -> bool {
        self.major.is_some_and(|m| m > 0.0)
    }

    pub fn is_companion(&self) -> bool {
        self.parent.is_some()
    }

    /// Ellipse of the catalog extent in pixels, or `None` without a major axis.
    /// A missing minor axis gives a circle; a missing position angle, PA 0.
    pub fn pixel_ellipse(&self, center: DVec2, pixel_scale_arcsec: f64) -> Option<Ellipse> {
        let major = self.major.filter(|&m| m > 0.0)?;
        let minor = self.minor.filter(|&m| m > 0.0).unwrap_or(major);
        let to_radius = |diameter: f64| diameter * 60.0 / 2.0 / pixel_scale_arcsec;
        // North is +y and east is -x, so PA measured from north maps to +90°
        // counter-clockwise from the x axis.
        let angle = (self.position_angle.unwrap_or(0.0) + 90.0).to_radians();
        Some(Ellipse::new(
            center,
            DVec2::new(to_radius(major), to_radius(minor)),
            angle,
        ))
    }
}

impl CatalogObject {
    pub fn name(&self) -> Option<&str> {
        self.galaxy().map(|g| g.name.as_str())
    }

    pub fn is_principal(&self) -> bool {
        self.galaxy().is_some_and(|g| g.principal)
    }

    pub fn is_companion(&self) -> bool {
        self.galaxy().is_some_and(GalaxyInfo::is_companion)
    }

    pub fn has_extent(&self) -> bool {
        self.galaxy().is_some_and(GalaxyInfo::has_extent)
    }

    /// Source built directly from the catalog extent, scaled by
    /// `expansion_factor`. Its mask is the full ellipse and its background
    /// is estimated by the caller.
    pub fn source_from_parameters(
        &self,
        frame: &Frame,
        expansion_factor: f64,
        inner_factor: f64,
        outer_factor: f64,
    ) -> Result<Option<Source>, DetectionError> {
        let Some(ellipse) = self
            .galaxy()
            .and_then(|g| g.pixel_ellipse(self.pixel_position(frame), frame.pixel_scale_arcsec()))
        else {
            return Ok(None);
        };
        let ellipse = ellipse.scaled(expansion_factor);
        let mut source = Source::new(
            &frame.pixels,
            ellipse.center,
            ellipse.radius,
            ellipse.angle,
            inner_factor,
            outer_factor,
        )?;
        source.use_aperture_mask();
        Ok(Some(source))
    }
}
