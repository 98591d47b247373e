//! Minibatch iteration over a loaded [`Dataset`].
//!
//! The iterator consumes indices from [`Dataset::rest`]; once the residual set runs dry
//! the epoch ends, the last batch is flagged with `is_new_epoch` and the set is refilled.

use std::fmt;

use ndarray::{s, Array1, Array2, Array3, ErrorKind, ShapeError};
use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::{rng, SeedableRng};

use crate::config::CTC_PAD_VALUE;
use crate::dataset::Dataset;
use crate::error::{DatasetError, Result};

/// A padded minibatch. Row `i` of every array belongs to `indices[i]`.
#[derive(Clone)]
pub struct MiniBatch {
    pub indices: Vec<usize>,
    /// `[batch, max_frames, input_size]`, zero padded.
    pub inputs: Array3<f32>,
    pub input_lens: Vec<usize>,
    /// `[batch, max_len]`, padded with the `<EOS>` index.
    pub att_labels: Array2<i64>,
    pub att_label_lens: Vec<usize>,
    /// `[batch, max_len]`, padded with `-1`.
    pub ctc_labels: Array2<i64>,
    pub ctc_label_lens: Vec<usize>,
    /// Set on the last batch of an epoch.
    pub is_new_epoch: bool,
    /// Epoch this batch was drawn in, starting at 0.
    pub epoch: usize,
}

impl MiniBatch {
    pub fn batch_size(&self) -> usize {
        self.indices.len()
    }

    pub fn max_frames(&self) -> usize {
        self.inputs.len_of(ndarray::Axis(1))
    }

    /// Splits the batch into `num_gpu` contiguous shards whose sizes differ by at most
    /// one. Shards that would be empty are dropped.
    pub fn split(&self, num_gpu: usize) -> Vec<MiniBatch> {
        let n = self.batch_size();
        let num_gpu = num_gpu.max(1);
        let (base, extra) = (n / num_gpu, n % num_gpu);
        let mut shards = Vec::with_capacity(num_gpu);
        let mut start = 0;
        for g in 0..num_gpu {
            let len = base + usize::from(g < extra);
            if len == 0 {
                continue;
            }
            let end = start + len;
            shards.push(MiniBatch {
                indices: self.indices[start..end].to_vec(),
                inputs: self.inputs.slice(s![start..end, .., ..]).to_owned(),
                input_lens: self.input_lens[start..end].to_vec(),
                att_labels: self.att_labels.slice(s![start..end, ..]).to_owned(),
                att_label_lens: self.att_label_lens[start..end].to_vec(),
                ctc_labels: self.ctc_labels.slice(s![start..end, ..]).to_owned(),
                ctc_label_lens: self.ctc_label_lens[start..end].to_vec(),
                is_new_epoch: self.is_new_epoch,
                epoch: self.epoch,
            });
            start = end;
        }
        shards
    }
}

impl fmt::Debug for MiniBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "MiniBatch with batch_size: {}, inputs: {:?}, att_labels: {:?}, ctc_labels: {:?}, epoch: {}{}",
            self.batch_size(),
            self.inputs.shape(),
            self.att_labels.shape(),
            self.ctc_labels.shape(),
            self.epoch,
            if self.is_new_epoch { " (last)" } else { "" }
        ))
    }
}

/// Endless minibatch iterator. Bound it with `take` or stop on `is_new_epoch`.
pub struct MiniBatches<'a> {
    dataset: &'a mut Dataset,
    rng: StdRng,
    epoch: usize,
}

impl<'a> MiniBatches<'a> {
    pub fn new(dataset: &'a mut Dataset) -> Self {
        let rng = StdRng::from_rng(&mut rng());
        Self { dataset, rng, epoch: 0 }
    }

    pub fn with_seed(dataset: &'a mut Dataset, seed: u64) -> Self {
        Self { dataset, rng: StdRng::seed_from_u64(seed), epoch: 0 }
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn dataset(&self) -> &Dataset {
        &*self.dataset
    }

    fn ordered(&self) -> bool {
        let options = self.dataset.options();
        options.sort_utt || (options.sorta_grad && self.epoch == 0)
    }

    fn select(&mut self) -> Vec<usize> {
        let batch_size = self.dataset.batch_size();
        let sort_utt = self.dataset.options().sort_utt;
        let ordered = self.ordered();
        let rest = self.dataset.rest();
        let mut picked: Vec<usize> = if ordered {
            // `rest` iterates in index order, i.e. shortest utterances first.
            rest.iter().take(batch_size).copied().collect()
        } else {
            let candidates: Vec<usize> = rest.iter().copied().collect();
            let amount = batch_size.min(candidates.len());
            index::sample(&mut self.rng, candidates.len(), amount)
                .into_iter()
                .map(|i| candidates[i])
                .collect()
        };
        if ordered && sort_utt {
            picked.shuffle(&mut self.rng);
        }
        picked
    }

    pub fn next_batch(&mut self) -> Result<MiniBatch> {
        if self.dataset.rest().is_empty() {
            self.dataset.reset_rest();
        }
        let indices = self.select();
        let rest = self.dataset.rest_mut();
        for i in indices.iter() {
            rest.remove(i);
        }

        let epoch = self.epoch;
        let is_new_epoch = rest.is_empty();
        if is_new_epoch {
            self.epoch += 1;
            self.dataset.reset_rest();
        }
        collate(&*self.dataset, indices, epoch, is_new_epoch)
    }
}

impl Iterator for MiniBatches<'_> {
    type Item = Result<MiniBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_batch())
    }
}

fn collate(ds: &Dataset, indices: Vec<usize>, epoch: usize, is_new_epoch: bool) -> Result<MiniBatch> {
    let input_size = ds.input_size();
    let feats: Vec<_> = indices.iter().map(|&i| &ds.inputs()[i]).collect();
    let max_frames = feats.iter().map(|x| x.nrows()).max().unwrap_or(0);
    let mut inputs = Array3::<f32>::zeros((indices.len(), max_frames, input_size));
    for (row, x) in feats.iter().enumerate() {
        if x.ncols() != input_size {
            return Err(DatasetError::Shape(ShapeError::from_kind(ErrorKind::IncompatibleShape)));
        }
        inputs.slice_mut(s![row, ..x.nrows(), ..]).assign(*x);
    }
    let input_lens = feats.iter().map(|x| x.nrows()).collect();

    let eos_index = ds.options().eos_index;
    let (att_labels, att_label_lens) = pad_labels(indices.iter().map(|&i| &ds.att_labels()[i]), eos_index);
    let (ctc_labels, ctc_label_lens) = pad_labels(indices.iter().map(|&i| &ds.ctc_labels()[i]), CTC_PAD_VALUE);

    Ok(MiniBatch {
        indices,
        inputs,
        input_lens,
        att_labels,
        att_label_lens,
        ctc_labels,
        ctc_label_lens,
        is_new_epoch,
        epoch,
    })
}

fn pad_labels<'l>(labels: impl Iterator<Item = &'l Array1<i64>>, pad: i64) -> (Array2<i64>, Vec<usize>) {
    let labels: Vec<_> = labels.collect();
    let max_len = labels.iter().map(|y| y.len()).max().unwrap_or(0);
    let mut out = Array2::from_elem((labels.len(), max_len), pad);
    for (row, y) in labels.iter().enumerate() {
        out.slice_mut(s![row, ..y.len()]).assign(*y);
    }
    (out, labels.iter().map(|y| y.len()).collect())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::dataset::DatasetOptions;
    use ndarray::{array, Array};

    // Utterance i has i + 1 frames, i + 2 attention labels and i + 1 CTC labels.
    fn toy_dataset(n: usize, options: DatasetOptions) -> Dataset {
        let inputs = (0..n)
            .map(|i| Array::from_shape_fn((i + 1, 3), |(t, d)| (i * 100 + t * 10 + d) as f32))
            .collect();
        let att = (0..n).map(|i| Array1::from_elem(i + 2, i as i64 + 2)).collect();
        let ctc = (0..n).map(|i| Array1::from_elem(i + 1, i as i64)).collect();
        Dataset::in_memory(inputs, att, ctc, options)
    }

    #[test]
    fn one_epoch_visits_every_index_once() {
        for (sort_utt, sorta_grad) in [(true, false), (false, true), (false, false)] {
            let mut ds = toy_dataset(10, DatasetOptions::new(3, 1).sort_utt(sort_utt).sorta_grad(sorta_grad));
            let mut batches = MiniBatches::with_seed(&mut ds, 0);
            let mut seen = BTreeSet::new();
            let mut sizes = Vec::new();
            loop {
                let batch = batches.next_batch().unwrap();
                sizes.push(batch.batch_size());
                for i in batch.indices.iter() {
                    assert!(seen.insert(*i), "index {i} drawn twice");
                }
                if batch.is_new_epoch {
                    break;
                }
            }
            assert_eq!(sizes, [3, 3, 3, 1]);
            assert_eq!(seen, (0..10).collect::<BTreeSet<usize>>());
            assert_eq!(batches.epoch(), 1);
            assert_eq!(batches.dataset().rest().len(), 10);
        }
    }

    #[test]
    fn ordered_batches_grow_in_length() {
        let mut ds = toy_dataset(8, DatasetOptions::new(2, 1).sort_utt(true));
        let batches: Vec<_> = MiniBatches::with_seed(&mut ds, 7).take(4).map(|b| b.unwrap()).collect();
        for (k, batch) in batches.iter().enumerate() {
            let mut idx = batch.indices.clone();
            idx.sort();
            assert_eq!(idx, [2 * k, 2 * k + 1]);
        }
        assert!(batches.windows(2).all(|w| w[0].max_frames() <= w[1].max_frames()));
    }

    #[test]
    fn sorta_grad_goes_random_after_first_epoch() {
        let mut ds = toy_dataset(6, DatasetOptions::new(6, 1).sorta_grad(true));
        let mut batches = MiniBatches::with_seed(&mut ds, 3);
        let first = batches.next_batch().unwrap();
        assert_eq!(first.indices, [0, 1, 2, 3, 4, 5]);
        assert!(first.is_new_epoch);
        assert_eq!(first.epoch, 0);
        let second = batches.next_batch().unwrap();
        assert_eq!(second.epoch, 1);
        let mut idx = second.indices.clone();
        idx.sort();
        assert_eq!(idx, [0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn padding_values() {
        let mut ds = toy_dataset(3, DatasetOptions::new(3, 9).sort_utt(false));
        let batch = MiniBatches::with_seed(&mut ds, 1).next().unwrap().unwrap();
        assert_eq!(batch.inputs.shape(), &[3, 3, 3]);
        assert_eq!(batch.att_labels.shape(), &[3, 4]);
        assert_eq!(batch.ctc_labels.shape(), &[3, 3]);
        let row = batch.indices.iter().position(|&i| i == 0).unwrap();
        assert_eq!(batch.input_lens[row], 1);
        assert_eq!(batch.inputs.slice(s![row, 0, ..]), array![0.0f32, 1.0, 2.0]);
        assert_eq!(batch.inputs.slice(s![row, 1.., ..]).sum(), 0.0);
        assert_eq!(batch.att_labels.row(row), array![2i64, 2, 9, 9]);
        assert_eq!(batch.ctc_labels.row(row), array![0i64, -1, -1]);
        assert_eq!(batch.att_label_lens[row], 2);
        assert_eq!(batch.ctc_label_lens[row], 1);
    }

    #[test]
    fn effective_batch_size_and_shards() {
        let mut ds = toy_dataset(10, DatasetOptions::new(2, 1).num_gpu(2));
        assert_eq!(ds.batch_size(), 4);
        let batch = MiniBatches::with_seed(&mut ds, 0).next_batch().unwrap();
        assert_eq!(batch.batch_size(), 4);
        let shards = batch.split(3);
        let sizes: Vec<_> = shards.iter().map(|s| s.batch_size()).collect();
        assert_eq!(sizes, [2, 1, 1]);
        assert_eq!(shards[0].indices, batch.indices[..2]);
        assert_eq!(shards[2].inputs.shape()[1..], batch.inputs.shape()[1..]);
        assert_eq!(batch.split(8).len(), 4);
    }

    #[test]
    fn externally_drained_rest_is_refilled() {
        let mut ds = toy_dataset(4, DatasetOptions::new(3, 1));
        ds.rest_mut().clear();
        let batch = MiniBatches::with_seed(&mut ds, 0).next_batch().unwrap();
        assert_eq!(batch.batch_size(), 3);
        assert!(!batch.is_new_epoch);
        assert_eq!(ds.rest().len(), 1);
    }
}
