//! The per-split frame-count manifest, `{utterance_id: num_frames}` pickled by the
//! feature extraction scripts.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde_pickle::DeOptions;

use crate::error::{DatasetError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameManifest {
    frames: BTreeMap<String, usize>,
}

impl FrameManifest {
    /// Reads and decodes a pickled manifest. A missing file surfaces as
    /// [`DatasetError::Io`] with kind `NotFound`.
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| DatasetError::io(path, e))?;
        Self::from_pickle(&bytes).map_err(|source| DatasetError::Manifest {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_pickle(bytes: &[u8]) -> std::result::Result<Self, serde_pickle::Error> {
        // Python 2 pickles store ids as byte strings.
        let frames = serde_pickle::from_slice(bytes, DeOptions::new().decode_strings())?;
        Ok(Self { frames })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, utt: &str) -> Option<usize> {
        self.frames.get(utt).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.frames.iter().map(|(k, &v)| (k.as_str(), v))
    }

    /// Utterances ordered by ascending frame count. Equal lengths keep id order.
    pub fn sorted_by_frames(&self) -> Vec<(&str, usize)> {
        let mut sorted: Vec<_> = self.iter().collect();
        sorted.sort_by_key(|&(_, frames)| frames);
        sorted
    }
}

impl FromIterator<(String, usize)> for FrameManifest {
    fn from_iter<I: IntoIterator<Item = (String, usize)>>(iter: I) -> Self {
        Self { frames: iter.into_iter().collect() }
    }
}
