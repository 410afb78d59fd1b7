//! Per-frame and per-run failure records and counters.
//!
//! Pipeline calls take a `&mut Diagnostics` and return it inside their
//! output; nothing here is global.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::error::TaskError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Detection,
    Fitting,
    Removal,
    Saturation,
    Aperture,
    OtherSources,
    Catalog,
    Task,
}

/// A step that failed for one object (or for the frame as a whole when
/// `index` is `None`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectFailure {
    pub index: Option<usize>,
    pub stage: Stage,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub objects: usize,
    pub ignored: usize,
    pub detected: usize,
    pub modeled: usize,
    pub removed: usize,
    pub saturated: usize,
    pub apertures: usize,
    pub other: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub frame: String,
    pub failures: Vec<ObjectFailure>,
    pub counters: Counters,
}

impl Diagnostics {
    pub fn new(frame: impl Into<String>) -> Self {
        Self {
            frame: frame.into(),
            ..Self::default()
        }
    }

    /// Records the failure and logs it with the frame and object context.
    pub fn record(&mut self, index: Option<usize>, stage: Stage, reason: impl ToString) {
        let reason = reason.to_string();
        match index {
            Some(index) => {
                tracing::warn!(frame = %self.frame, index, %stage, "{}", reason)
            }
            None => tracing::warn!(frame = %self.frame, %stage, "{}", reason),
        }
        self.failures.push(ObjectFailure {
            index,
            stage,
            reason,
        });
    }

    pub fn failures_for(&self, index: usize) -> impl Iterator<Item = &ObjectFailure> {
        self.failures.iter().filter(move |f| f.index == Some(index))
    }

    pub fn last_failure(&self, index: usize) -> Option<&ObjectFailure> {
        self.failures_for(index).last()
    }
}

/// Outcome of a whole `SourceFinder` run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunDiagnostics {
    /// Keyed by `<stage>/<frame>`.
    pub frames: BTreeMap<String, Diagnostics>,
    /// Frame tasks that produced no output, keyed by `<stage>/<frame>`.
    pub task_failures: BTreeMap<String, TaskError>,
    /// Stages that could not run at all, e.g. because the catalog was unavailable.
    pub stage_failures: Vec<ObjectFailure>,
    /// Frames that never made it into the run, keyed by frame name.
    #[serde(default)]
    pub load_failures: BTreeMap<String, String>,
}

impl RunDiagnostics {
    pub fn is_clean(&self) -> bool {
        self.task_failures.is_empty()
            && self.stage_failures.is_empty()
            && self.load_failures.is_empty()
    }

    pub fn object_failure_count(&self) -> usize {
        self.frames.values().map(|d| d.failures.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_query() {
        let mut diagnostics = Diagnostics::new("w1");
        diagnostics.record(Some(3), Stage::Detection, "no peak above threshold");
        diagnostics.record(None, Stage::OtherSources, "no finite background");
        diagnostics.record(Some(3), Stage::Fitting, "fwhm out of range");

        assert_eq!(diagnostics.failures.len(), 3);
        assert_eq!(diagnostics.failures_for(3).count(), 2);
        assert_eq!(diagnostics.last_failure(3).unwrap().stage, Stage::Fitting);
        assert!(diagnostics.last_failure(4).is_none());
    }
}
