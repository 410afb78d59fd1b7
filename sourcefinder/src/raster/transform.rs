//! Gnomonic (TAN) pixel/sky transform.
//!
//! `(xi, eta) = CD × (pixel - crpix)` gives tangent-plane offsets in degrees,
//! which are then de-projected around `crval`.

use glam::DVec2;
use serde::{Deserialize, Serialize};

/// Sky position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkyCoordinate {
    pub ra: f64,
    pub dec: f64,
}

impl SkyCoordinate {
    pub fn new(ra: f64, dec: f64) -> Self {
        Self { ra, dec }
    }
}

/// Sky-aligned bounding box used for catalog queries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkyBox {
    pub ra_min: f64,
    pub ra_max: f64,
    pub dec_min: f64,
    pub dec_max: f64,
}

impl SkyBox {
    pub fn contains(&self, coordinate: SkyCoordinate) -> bool {
        coordinate.ra >= self.ra_min
            && coordinate.ra <= self.ra_max
            && coordinate.dec >= self.dec_min
            && coordinate.dec <= self.dec_max
    }

    pub fn union(&self, other: &SkyBox) -> SkyBox {
        SkyBox {
            ra_min: self.ra_min.min(other.ra_min),
            ra_max: self.ra_max.max(other.ra_max),
            dec_min: self.dec_min.min(other.dec_min),
            dec_max: self.dec_max.max(other.dec_max),
        }
    }

    pub fn center(&self) -> SkyCoordinate {
        SkyCoordinate::new(
            (self.ra_min + self.ra_max) / 2.0,
            (self.dec_min + self.dec_max) / 2.0,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateTransform {
    /// Reference pixel.
    pub crpix: DVec2,
    /// Reference sky position in degrees (RA, Dec).
    pub crval: DVec2,
    /// Pixel offset to tangent-plane degrees, `[[CD1_1, CD1_2], [CD2_1, CD2_2]]`.
    pub cd: [[f64; 2]; 2],
}

impl CoordinateTransform {
    pub fn new(crpix: DVec2, crval: DVec2, cd: [[f64; 2]; 2]) -> Self {
        Self { crpix, crval, cd }
    }

    /// North-up transform with RA increasing towards -x and the given scale.
    pub fn from_scale(crpix: DVec2, crval: DVec2, pixel_scale_arcsec: f64) -> Self {
        let scale = pixel_scale_arcsec / 3600.0;
        Self::new(crpix, crval, [[-scale, 0.0], [0.0, scale]])
    }

    pub fn pixel_to_sky(&self, pixel: DVec2) -> SkyCoordinate {
        let d = pixel - self.crpix;
        let xi = (self.cd[0][0] * d.x + self.cd[0][1] * d.y).to_radians();
        let eta = (self.cd[1][0] * d.x + self.cd[1][1] * d.y).to_radians();

        let ra0 = self.crval.x.to_radians();
        let (sin_dec0, cos_dec0) = self.crval.y.to_radians().sin_cos();
        let denom = cos_dec0 - eta * sin_dec0;
        let ra = ra0 + xi.atan2(denom);
        let dec = (sin_dec0 + eta * cos_dec0).atan2((xi * xi + denom * denom).sqrt());

        SkyCoordinate::new(ra.to_degrees().rem_euclid(360.0), dec.to_degrees())
    }

    pub fn sky_to_pixel(&self, coordinate: SkyCoordinate) -> DVec2 {
        let (sin_dec, cos_dec) = coordinate.dec.to_radians().sin_cos();
        let (sin_dec0, cos_dec0) = self.crval.y.to_radians().sin_cos();
        let (sin_dra, cos_dra) = (coordinate.ra - self.crval.x).to_radians().sin_cos();

        let d = sin_dec * sin_dec0 + cos_dec * cos_dec0 * cos_dra;
        let xi = (cos_dec * sin_dra / d).to_degrees();
        let eta = ((sin_dec * cos_dec0 - cos_dec * sin_dec0 * cos_dra) / d).to_degrees();

        let det = self.determinant();
        debug_assert!(det.abs() > 1e-15, "CD matrix is singular (det = {})", det);
        let dx = (self.cd[1][1] * xi - self.cd[0][1] * eta) / det;
        let dy = (-self.cd[1][0] * xi + self.cd[0][0] * eta) / det;
        self.crpix + DVec2::new(dx, dy)
    }

    /// Mean of the x and y scales, in arcseconds per pixel.
    pub fn pixel_scale_arcsec(&self) -> f64 {
        let scale_x = (self.cd[0][0].powi(2) + self.cd[1][0].powi(2)).sqrt();
        let scale_y = (self.cd[0][1].powi(2) + self.cd[1][1].powi(2)).sqrt();
        (scale_x + scale_y) / 2.0 * 3600.0
    }

    /// Sky bounding box of a `width x height` raster, from its corners and edge midpoints.
    pub fn bounding_box(&self, width: usize, height: usize) -> SkyBox {
        let (w, h) = ((width.max(1) - 1) as f64, (height.max(1) - 1) as f64);
        let samples = [
            DVec2::new(0.0, 0.0),
            DVec2::new(w, 0.0),
            DVec2::new(w, h),
            DVec2::new(0.0, h),
            DVec2::new(w / 2.0, 0.0),
            DVec2::new(w / 2.0, h),
            DVec2::new(0.0, h / 2.0),
            DVec2::new(w, h / 2.0),
        ];
        let mut sky_box = SkyBox {
            ra_min: f64::INFINITY,
            ra_max: f64::NEG_INFINITY,
            dec_min: f64::INFINITY,
            dec_max: f64::NEG_INFINITY,
        };
        for sample in samples {
            let c = self.pixel_to_sky(sample);
            sky_box.ra_min = sky_box.ra_min.min(c.ra);
            sky_box.ra_max = sky_box.ra_max.max(c.ra);
            sky_box.dec_min = sky_box.dec_min.min(c.dec);
            sky_box.dec_max = sky_box.dec_max.max(c.dec);
        }
        sky_box
    }

    fn determinant(&self) -> f64 {
        self.cd[0][0] * self.cd[1][1] - self.cd[0][1] * self.cd[1][0]
    }
}
