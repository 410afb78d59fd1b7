//! Annotation shapes and DS9 region text output.

use std::fmt::Write as _;
use std::path::Path;

use glam::DVec2;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::error::Error;
use crate::raster::Ellipse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Color {
    Red,
    Green,
    Blue,
    White,
    Yellow,
    Cyan,
    Magenta,
}

/// Text attached to star regions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RegionAnnotation {
    #[default]
    None,
    Flux,
    HasSource,
    HasBackground,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Point(DVec2),
    Circle { center: DVec2, radius: f64 },
    Ellipse(Ellipse),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub shape: Shape,
    pub color: Color,
    pub text: Option<String>,
}

impl Region {
    pub fn point(position: DVec2, color: Color) -> Self {
        Self {
            shape: Shape::Point(position),
            color,
            text: None,
        }
    }

    pub fn circle(center: DVec2, radius: f64, color: Color) -> Self {
        Self {
            shape: Shape::Circle { center, radius },
            color,
            text: None,
        }
    }

    pub fn ellipse(ellipse: Ellipse, color: Color) -> Self {
        Self {
            shape: Shape::Ellipse(ellipse),
            color,
            text: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionList {
    regions: Vec<Region>,
}

impl RegionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, region: Region) {
        self.regions.push(region);
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    /// DS9 text in image coordinates (1-based pixel centers).
    pub fn to_ds9(&self) -> String {
        let mut out = String::from("# Region file format: DS9 version 4.1\nimage\n");
        for region in &self.regions {
            let _ = match &region.shape {
                Shape::Point(p) => write!(out, "point({:.3},{:.3})", p.x + 1.0, p.y + 1.0),
                Shape::Circle { center, radius } => write!(
                    out,
                    "circle({:.3},{:.3},{:.3})",
                    center.x + 1.0,
                    center.y + 1.0,
                    radius
                ),
                Shape::Ellipse(e) => write!(
                    out,
                    "ellipse({:.3},{:.3},{:.3},{:.3},{:.3})",
                    e.center.x + 1.0,
                    e.center.y + 1.0,
                    e.radius.x,
                    e.radius.y,
                    e.angle.to_degrees()
                ),
            };
            let _ = write!(out, " # color={}", region.color);
            if matches!(region.shape, Shape::Point(_)) {
                out.push_str(" point=x");
            }
            if let Some(text) = &region.text {
                let _ = write!(out, " text={{{}}}", text);
            }
            out.push('\n');
        }
        out
    }

    pub fn write(&self, path: &Path) -> Result<(), Error> {
        std::fs::write(path, self.to_ds9()).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ds9_output() {
        let mut regions = RegionList::new();
        regions.push(Region::point(DVec2::new(9.0, 19.0), Color::Blue));
        regions.push(Region::circle(DVec2::new(0.0, 0.0), 2.5, Color::Red).with_text("12.5"));
        regions.push(
            Region::ellipse(
                Ellipse::new(DVec2::new(4.0, 5.0), DVec2::new(3.0, 1.0), 0.0),
                Color::Green,
            )
            .with_text("NGC 1 (principal)"),
        );

        let text = regions.to_ds9();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[1], "image");
        assert_eq!(lines[2], "point(10.000,20.000) # color=blue point=x");
        assert_eq!(lines[3], "circle(1.000,1.000,2.500) # color=red text={12.5}");
        assert_eq!(
            lines[4],
            "ellipse(5.000,6.000,3.000,1.000,0.000) # color=green text={NGC 1 (principal)}"
        );
    }

    #[test]
    fn test_annotation_names() {
        assert_eq!("has_source".parse::<RegionAnnotation>().unwrap(), RegionAnnotation::HasSource);
        assert!("brightness".parse::<RegionAnnotation>().is_err());
    }
}
