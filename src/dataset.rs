//! The in-memory dataset for joint CTC/attention training.
//!
//! Everything is loaded eagerly: TIMIT is small enough that keeping every feature
//! matrix and both label streams in memory is cheaper than touching the disk again
//! during training. Utterances are ordered by ascending frame count, so index `0` is
//! always the shortest utterance of the split.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressIterator, ProgressStyle};
use log::{debug, info};
use ndarray::{Array1, Array2, Axis};

use crate::config::{is_known_label_type, CorpusLayout, SplitDirs};
use crate::error::{DatasetError, Result};
use crate::manifest::FrameManifest;
use crate::npy::{load_features, load_labels};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Split {
    Train,
    Dev,
    Test,
}

impl Split {
    pub fn iter() -> impl Iterator<Item = Split> {
        [Split::Train, Split::Dev, Split::Test].iter().cloned()
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Train => write!(f, "train"),
            Self::Dev => write!(f, "dev"),
            Self::Test => write!(f, "test"),
        }
    }
}

impl FromStr for Split {
    type Err = DatasetError;

    fn from_str(split: &str) -> Result<Self> {
        match split {
            "train" => Ok(Split::Train),
            "dev" => Ok(Split::Dev),
            "test" => Ok(Split::Test),
            s => Err(DatasetError::InvalidSplit(s.to_string())),
        }
    }
}

/// One utterance and where its three arrays live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtteranceRecord {
    pub id: String,
    pub num_frames: usize,
    pub input_path: PathBuf,
    pub ctc_label_path: PathBuf,
    pub att_label_path: PathBuf,
}

/// Batching parameters. They are only validated and stored by the loader; the
/// minibatch consumer in [`crate::batch`] interprets them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetOptions {
    /// Per-device batch size.
    pub batch_size: usize,
    /// Index of the `<EOS>` class, used to pad attention labels.
    pub eos_index: i64,
    /// Draw minibatches in length order, shuffling utterances within each batch.
    pub sort_utt: bool,
    /// Draw minibatches in length order during the first epoch only, random afterwards.
    /// Overrides `sort_utt`.
    pub sorta_grad: bool,
    pub progressbar: bool,
    pub num_gpu: usize,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        DatasetOptions {
            batch_size: 32,
            eos_index: 1,
            sort_utt: true,
            sorta_grad: false,
            progressbar: false,
            num_gpu: 1,
        }
    }
}

impl DatasetOptions {
    pub fn new(batch_size: usize, eos_index: i64) -> Self {
        DatasetOptions { batch_size, eos_index, ..Default::default() }
    }
    pub fn sort_utt(mut self, sort_utt: bool) -> Self {
        self.sort_utt = sort_utt;
        self
    }
    pub fn sorta_grad(mut self, sorta_grad: bool) -> Self {
        self.sorta_grad = sorta_grad;
        self
    }
    pub fn progressbar(mut self, progressbar: bool) -> Self {
        self.progressbar = progressbar;
        self
    }
    pub fn num_gpu(mut self, num_gpu: usize) -> Self {
        self.num_gpu = num_gpu;
        self
    }

    fn validate(mut self) -> Result<Self> {
        if self.batch_size == 0 {
            return Err(DatasetError::InvalidBatchConfig("batch_size must be at least 1".into()));
        }
        if self.num_gpu == 0 {
            return Err(DatasetError::InvalidBatchConfig("num_gpu must be at least 1".into()));
        }
        if self.sorta_grad {
            self.sort_utt = false;
        }
        Ok(self)
    }
}

pub struct Dataset {
    split: Split,
    label_type: String,
    options: DatasetOptions,
    frame_num: FrameManifest,
    records: Vec<UtteranceRecord>,
    inputs: Vec<Array2<f32>>,
    att_labels: Vec<Array1<i64>>,
    ctc_labels: Vec<Array1<i64>>,
    input_size: usize,
    rest: BTreeSet<usize>,
}

impl Dataset {
    /// Loads a split from the default corpus location, see [`CorpusLayout::default`].
    pub fn load(data_type: &str, label_type: &str, options: DatasetOptions) -> Result<Self> {
        Self::load_from(&CorpusLayout::default(), data_type, label_type, options)
    }

    /// Loads `data_type` (`train`, `dev` or `test`) with labels converted to `label_type`.
    ///
    /// Arguments are validated before anything is read. Any missing or undecodable file
    /// aborts the whole load.
    pub fn load_from(
        layout: &CorpusLayout,
        data_type: &str,
        label_type: &str,
        options: DatasetOptions,
    ) -> Result<Self> {
        let split: Split = data_type.parse()?;
        if !is_known_label_type(label_type) {
            return Err(DatasetError::UnknownLabelType(label_type.to_string()));
        }
        let options = options.validate()?;

        let dirs = layout.split_dirs(split, label_type);
        debug!("Inputs: {}", dirs.inputs.display());
        debug!("CTC labels: {}", dirs.ctc_labels.display());
        debug!("Attention labels: {}", dirs.att_labels.display());

        let frame_num = FrameManifest::open(&dirs.frame_num_path())?;
        if frame_num.is_empty() {
            return Err(DatasetError::EmptyDataset(dirs.frame_num_path()));
        }
        let records = sorted_records(&frame_num, &dirs);

        info!("=> Loading {} dataset ({})...", split, label_type);
        let n = records.len();
        let pb = match options.progressbar {
            true => ProgressBar::new(n as u64),
            false => ProgressBar::with_draw_target(Some(n as u64), ProgressDrawTarget::hidden()),
        };
        pb.set_style(ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix:15.bold.dim} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"));
        pb.set_prefix(split.to_string());

        let mut inputs = Vec::with_capacity(n);
        let mut att_labels = Vec::with_capacity(n);
        let mut ctc_labels = Vec::with_capacity(n);
        for record in records.iter().progress_with(pb) {
            inputs.push(load_features(&record.input_path)?);
            att_labels.push(load_labels(&record.att_label_path)?);
            ctc_labels.push(load_labels(&record.ctc_label_path)?);
        }
        // Non-empty, checked above.
        let input_size = inputs[0].len_of(Axis(1));
        info!("<= Loaded {} utterances, input size {}", n, input_size);

        Ok(Dataset {
            split,
            label_type: label_type.to_string(),
            options,
            frame_num,
            records,
            inputs,
            att_labels,
            ctc_labels,
            input_size,
            rest: (0..n).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn split(&self) -> Split {
        self.split
    }

    pub fn label_type(&self) -> &str {
        &self.label_type
    }

    pub fn options(&self) -> &DatasetOptions {
        &self.options
    }

    /// Examples per minibatch across all devices.
    pub fn batch_size(&self) -> usize {
        self.options.batch_size * self.options.num_gpu
    }

    pub fn frame_num(&self) -> &FrameManifest {
        &self.frame_num
    }

    /// Utterances in ascending frame-count order. Index `i` here matches index `i` of
    /// every array container.
    pub fn records(&self) -> &[UtteranceRecord] {
        &self.records
    }

    pub fn inputs(&self) -> &[Array2<f32>] {
        &self.inputs
    }

    pub fn att_labels(&self) -> &[Array1<i64>] {
        &self.att_labels
    }

    pub fn ctc_labels(&self) -> &[Array1<i64>] {
        &self.ctc_labels
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// Indices not yet consumed in the current epoch.
    pub fn rest(&self) -> &BTreeSet<usize> {
        &self.rest
    }

    pub fn rest_mut(&mut self) -> &mut BTreeSet<usize> {
        &mut self.rest
    }

    pub fn reset_rest(&mut self) {
        self.rest = (0..self.len()).collect();
    }

    /// Builds a dataset without touching the disk. Entries must already be length-sorted.
    #[cfg(test)]
    pub(crate) fn in_memory(
        inputs: Vec<Array2<f32>>,
        att_labels: Vec<Array1<i64>>,
        ctc_labels: Vec<Array1<i64>>,
        options: DatasetOptions,
    ) -> Self {
        let dirs = CorpusLayout::new("/mem").split_dirs(Split::Train, "phone61");
        let frame_num: FrameManifest = inputs
            .iter()
            .enumerate()
            .map(|(i, x)| (format!("utt{i:04}"), x.nrows()))
            .collect();
        let records = sorted_records(&frame_num, &dirs);
        let input_size = inputs[0].len_of(Axis(1));
        let n = inputs.len();
        Dataset {
            split: Split::Train,
            label_type: "phone61".to_string(),
            options: options.validate().unwrap(),
            frame_num,
            records,
            inputs,
            att_labels,
            ctc_labels,
            input_size,
            rest: (0..n).collect(),
        }
    }
}

impl fmt::Debug for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "Dataset '{}' ({}) with {} utterances, input_size: {}, rest: {}",
            self.split,
            self.label_type,
            self.len(),
            self.input_size,
            self.rest.len()
        ))
    }
}

fn sorted_records(frame_num: &FrameManifest, dirs: &SplitDirs) -> Vec<UtteranceRecord> {
    frame_num
        .sorted_by_frames()
        .into_iter()
        .map(|(utt, num_frames)| UtteranceRecord {
            id: utt.to_string(),
            num_frames,
            input_path: dirs.input_path(utt),
            ctc_label_path: dirs.ctc_label_path(utt),
            att_label_path: dirs.att_label_path(utt),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_names() {
        for split in Split::iter() {
            assert_eq!(split.to_string().parse::<Split>().unwrap(), split);
        }
        assert!(matches!("valid".parse::<Split>(), Err(DatasetError::InvalidSplit(s)) if s == "valid"));
    }

    #[test]
    fn sorta_grad_disables_sort_utt() {
        let opts = DatasetOptions::new(4, 1).sort_utt(true).sorta_grad(true).validate().unwrap();
        assert!(!opts.sort_utt);
        assert!(opts.sorta_grad);
    }

    #[test]
    fn rejects_zero_batch_size_and_gpus() {
        assert!(DatasetOptions::new(0, 1).validate().is_err());
        assert!(DatasetOptions::new(8, 1).num_gpu(0).validate().is_err());
    }

    #[test]
    fn records_are_length_sorted() {
        let manifest: FrameManifest =
            [("b", 20usize), ("a", 30), ("c", 10)].into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        let dirs = CorpusLayout::new("/c").split_dirs(Split::Train, "phone39");
        let records = sorted_records(&manifest, &dirs);
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["c", "b", "a"]);
        assert_eq!(records[0].ctc_label_path, PathBuf::from("/c/labels/ctc/phone39/train/c.npy"));
    }

    #[test]
    fn invalid_split_fails_before_io() {
        // The root does not exist; only argument validation can produce this error.
        let layout = CorpusLayout::new("/definitely/not/here");
        let err = Dataset::load_from(&layout, "validation", "phone61", DatasetOptions::default()).unwrap_err();
        assert!(matches!(err, DatasetError::InvalidSplit(_)));
        let err = Dataset::load_from(&layout, "train", "phone60", DatasetOptions::default()).unwrap_err();
        assert!(matches!(err, DatasetError::UnknownLabelType(_)));
    }
}
