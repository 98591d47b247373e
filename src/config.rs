//! Where the preprocessed TIMIT corpus lives and how it is laid out.
//!
//! Feature extraction and label conversion happen upstream. What they leave behind is
//! one directory per stream, each holding a single `.npy` file per utterance:
//!
//! ```text
//! <root>/inputs/<split>/<utt>.npy                        (frames x input_size, float32)
//! <root>/inputs/<split>/frame_num.pickle                 ({utt: frames})
//! <root>/labels/ctc/<label_type>/<split>/<utt>.npy       (label sequence, int64)
//! <root>/labels/attention/<label_type>/<split>/<utt>.npy (<SOS> labels <EOS>, int64)
//! ```
//!
//! Make sure to point `CORPUS_ROOT` (or the `TIMIT_DATASET_ROOT` environment variable)
//! at your own copy before training.

use std::path::{Path, PathBuf};

use phf::phf_map;

use crate::dataset::Split;

pub const CORPUS_ROOT: &str = "/n/sd8/inaguma/corpus/timit/dataset";

// Overrides CORPUS_ROOT when set and non-empty.
pub const CORPUS_ROOT_ENV: &str = "TIMIT_DATASET_ROOT";

pub const FRAME_NUM_FILE: &str = "frame_num.pickle";

pub const ARRAY_EXT: &str = "npy";

/// Label vocabularies the corpus was converted to, with their number of output classes
/// (not counting blank, `<SOS>` or `<EOS>`).
pub const LABEL_TYPES: phf::Map<&'static str, usize> = phf_map! {
    "phone61" => 61,
    "phone48" => 48,
    "phone39" => 39,
    // a-z, space and apostrophe.
    "character" => 28,
};

// Padding value for CTC label sequences inside a minibatch. Never a valid class.
pub const CTC_PAD_VALUE: i64 = -1;

/// The three directories that make up one split of one label type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitDirs {
    pub inputs: PathBuf,
    pub ctc_labels: PathBuf,
    pub att_labels: PathBuf,
}

impl SplitDirs {
    pub fn frame_num_path(&self) -> PathBuf {
        self.inputs.join(FRAME_NUM_FILE)
    }

    pub fn input_path(&self, utt: &str) -> PathBuf {
        array_path(&self.inputs, utt)
    }

    pub fn ctc_label_path(&self, utt: &str) -> PathBuf {
        array_path(&self.ctc_labels, utt)
    }

    pub fn att_label_path(&self, utt: &str) -> PathBuf {
        array_path(&self.att_labels, utt)
    }
}

fn array_path(dir: &Path, utt: &str) -> PathBuf {
    dir.join(format!("{utt}.{ARRAY_EXT}"))
}

/// Root of a corpus laid out as described in the module docs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusLayout {
    root: PathBuf,
}

impl Default for CorpusLayout {
    fn default() -> Self {
        let root = std::env::var(CORPUS_ROOT_ENV)
            .ok()
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| CORPUS_ROOT.to_string());
        Self::new(root)
    }
}

impl CorpusLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn split_dirs(&self, split: Split, label_type: &str) -> SplitDirs {
        let split = split.to_string();
        SplitDirs {
            inputs: self.root.join("inputs").join(&split),
            ctc_labels: self.root.join("labels").join("ctc").join(label_type).join(&split),
            att_labels: self.root.join("labels").join("attention").join(label_type).join(&split),
        }
    }
}

pub fn is_known_label_type(label_type: &str) -> bool {
    LABEL_TYPES.contains_key(label_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_dirs_follow_corpus_layout() {
        let layout = CorpusLayout::new("/corpus");
        let dirs = layout.split_dirs(Split::Dev, "phone61");
        assert_eq!(dirs.inputs, PathBuf::from("/corpus/inputs/dev"));
        assert_eq!(dirs.ctc_labels, PathBuf::from("/corpus/labels/ctc/phone61/dev"));
        assert_eq!(dirs.att_labels, PathBuf::from("/corpus/labels/attention/phone61/dev"));
        assert_eq!(dirs.frame_num_path(), PathBuf::from("/corpus/inputs/dev/frame_num.pickle"));
        assert_eq!(dirs.att_label_path("fadg0_si1279"), PathBuf::from("/corpus/labels/attention/phone61/dev/fadg0_si1279.npy"));
    }

    #[test]
    fn label_types() {
        for t in ["phone39", "phone48", "phone61", "character"] {
            assert!(is_known_label_type(t));
        }
        assert!(!is_known_label_type("phone60"));
        assert_eq!(LABEL_TYPES.get("phone48"), Some(&48));
    }
}
