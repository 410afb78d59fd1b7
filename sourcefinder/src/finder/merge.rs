//! Cross-band merging of per-frame tables.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::config::ColourWindow;
use crate::extraction::FrameOutput;

/// One catalog row with the fluxes of every band that detected it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossBandEntry<E> {
    pub index: usize,
    pub catalog: E,
    /// Band (frame name) to flux. Bands that did not detect the row are absent.
    pub fluxes: BTreeMap<String, f64>,
}

impl<E> CrossBandEntry<E> {
    pub fn flux(&self, band: &str) -> Option<f64> {
        self.fluxes.get(band).copied()
    }

    /// Whether every window whose colour can be evaluated accepts this entry.
    pub fn passes(&self, windows: &[ColourWindow]) -> bool {
        windows.iter().all(|window| {
            match window.colour(self.flux(&window.first), self.flux(&window.second)) {
                Some(colour) => window.accepts(colour),
                None => true,
            }
        })
    }
}

/// Exactly one entry per catalog row, whatever the completion order of the frames.
pub fn merge<E: Clone>(
    catalog: &[E],
    outputs: &BTreeMap<String, FrameOutput>,
) -> Vec<CrossBandEntry<E>> {
    catalog
        .iter()
        .enumerate()
        .map(|(index, entry)| CrossBandEntry {
            index,
            catalog: entry.clone(),
            fluxes: outputs
                .iter()
                .filter_map(|(band, output)| {
                    output.table.detected_flux(index).map(|flux| (band.clone(), flux))
                })
                .collect(),
        })
        .collect()
}

/// Drops entries rejected by a colour window. Returns the survivors and the
/// number of rejected entries.
pub fn apply_colour_windows<E>(
    entries: Vec<CrossBandEntry<E>>,
    windows: &[ColourWindow],
) -> (Vec<CrossBandEntry<E>>, usize) {
    let total = entries.len();
    let kept: Vec<_> = entries.into_iter().filter(|e| e.passes(windows)).collect();
    let rejected = total - kept.len();
    (kept, rejected)
}
