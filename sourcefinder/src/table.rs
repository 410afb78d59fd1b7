//! Per-frame result tables: one row per catalog index.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRow {
    pub index: usize,
    pub detected: bool,
    pub modeled: bool,
    pub saturation: bool,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub flux: Option<f64>,
    pub fwhm: Option<f64>,
    /// Last recorded failure for this object, if any.
    pub failure: Option<String>,
}

impl FrameRow {
    pub fn undetected(index: usize) -> Self {
        Self {
            index,
            detected: false,
            modeled: false,
            saturation: false,
            x: None,
            y: None,
            flux: None,
            fwhm: None,
            failure: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameTable {
    rows: Vec<FrameRow>,
}

impl FrameTable {
    pub fn new(rows: Vec<FrameRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[FrameRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, index: usize) -> Option<&FrameRow> {
        self.rows.iter().find(|r| r.index == index)
    }

    /// Flux for `index`, only if this frame detected it.
    pub fn detected_flux(&self, index: usize) -> Option<f64> {
        self.row(index).filter(|r| r.detected).and_then(|r| r.flux)
    }
}
