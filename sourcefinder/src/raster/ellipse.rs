use glam::DVec2;
use serde::{Deserialize, Serialize};

/// Pixel-space ellipse. `angle` is in radians, counter-clockwise from the x axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ellipse {
    pub center: DVec2,
    pub radius: DVec2,
    pub angle: f64,
}

impl Ellipse {
    pub fn new(center: DVec2, radius: DVec2, angle: f64) -> Self {
        Self {
            center,
            radius,
            angle,
        }
    }

    pub fn circle(center: DVec2, radius: f64) -> Self {
        Self::new(center, DVec2::splat(radius), 0.0)
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            radius: self.radius * factor,
            ..*self
        }
    }

    pub fn contains(&self, point: DVec2) -> bool {
        let d = point - self.center;
        let (sin, cos) = self.angle.sin_cos();
        let u = (d.x * cos + d.y * sin) / self.radius.x;
        let v = (-d.x * sin + d.y * cos) / self.radius.y;
        u * u + v * v <= 1.0
    }

    /// Half widths of the axis-aligned bounding box.
    pub fn half_extent(&self) -> DVec2 {
        let (sin, cos) = self.angle.sin_cos();
        let (a, b) = (self.radius.x, self.radius.y);
        DVec2::new(
            ((a * cos).powi(2) + (b * sin).powi(2)).sqrt(),
            ((a * sin).powi(2) + (b * cos).powi(2)).sqrt(),
        )
    }
}
