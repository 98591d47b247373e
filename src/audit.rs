//! Consistency checks between a split's manifest and the arrays on disk.
//!
//! Every utterance in `frame_num.pickle` needs an input, a CTC label and an attention
//! label array, and the input's first axis has to match the manifest's frame count.
//! Arrays that exist on disk but are not in the manifest are reported as orphans; the
//! loader would silently ignore them.

use std::collections::BTreeSet;
use std::path::Path;

use indicatif::{ParallelProgressIterator, ProgressBar};
use log::warn;
use rayon::prelude::*;

use crate::config::{SplitDirs, ARRAY_EXT};
use crate::error::Result;
use crate::manifest::FrameManifest;
use crate::npy::load_features;

/// Files of one stream compared against the manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamReport {
    pub on_disk: usize,
    pub missing: Vec<String>,
    pub orphaned: Vec<String>,
}

impl StreamReport {
    pub fn problems(&self) -> usize {
        self.missing.len() + self.orphaned.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    pub inputs: StreamReport,
    pub ctc_labels: StreamReport,
    pub att_labels: StreamReport,
    /// Inputs whose row count disagrees with the manifest or that could not be decoded.
    pub bad_inputs: usize,
}

impl AuditReport {
    pub fn problems(&self) -> usize {
        self.inputs.problems() + self.ctc_labels.problems() + self.att_labels.problems() + self.bad_inputs
    }
}

/// Utterance ids of all arrays found in `dir`.
pub fn array_ids(dir: &Path) -> Result<BTreeSet<String>> {
    let pattern = format!("{}/*.{}", glob::Pattern::escape(&dir.display().to_string()), ARRAY_EXT);
    let paths: Vec<_> = glob::glob(&pattern)?.collect::<std::result::Result<_, _>>()?;
    Ok(paths
        .into_iter()
        .filter(|p| p.is_file())
        .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .collect())
}

pub fn check_stream(name: &str, dir: &Path, manifest: &FrameManifest) -> Result<StreamReport> {
    let on_disk = array_ids(dir)?;
    let expected: BTreeSet<String> = manifest.iter().map(|(utt, _)| utt.to_string()).collect();

    let missing: Vec<String> = expected.difference(&on_disk).cloned().collect();
    let orphaned: Vec<String> = on_disk.difference(&expected).cloned().collect();
    for utt in missing.iter() {
        warn!("{}: missing array for '{}'", name, utt);
    }
    for utt in orphaned.iter() {
        warn!("{}: '{}' is not in the manifest", name, utt);
    }
    Ok(StreamReport { on_disk: on_disk.len(), missing, orphaned })
}

/// Loads every listed input array in parallel and compares its length with the manifest.
/// Undecodable arrays count as problems instead of aborting the check.
pub fn check_frame_counts(dirs: &SplitDirs, manifest: &FrameManifest, pb: ProgressBar) -> Result<usize> {
    let utts: Vec<(String, usize)> = array_ids(&dirs.inputs)?
        .into_iter()
        .filter_map(|utt| manifest.get(&utt).map(|frames| (utt, frames)))
        .collect();
    pb.set_length(utts.len() as u64);

    let bad: usize = utts
        .into_par_iter()
        .progress_with(pb)
        .map(|(utt, frames)| match load_features(&dirs.input_path(&utt)) {
            Ok(x) if x.nrows() == frames => 0,
            Ok(x) => {
                warn!("inputs: '{}' has {} frames, manifest says {}", utt, x.nrows(), frames);
                1
            }
            Err(e) => {
                warn!("inputs: '{}' could not be decoded: {}", utt, e);
                1
            }
        })
        .sum();
    Ok(bad)
}

/// Runs all checks for one split.
pub fn audit_split(dirs: &SplitDirs, manifest: &FrameManifest, pb: ProgressBar) -> Result<AuditReport> {
    Ok(AuditReport {
        inputs: check_stream("inputs", &dirs.inputs, manifest)?,
        ctc_labels: check_stream("ctc", &dirs.ctc_labels, manifest)?,
        att_labels: check_stream("attention", &dirs.att_labels, manifest)?,
        bad_inputs: check_frame_counts(dirs, manifest, pb)?,
    })
}
