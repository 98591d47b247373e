//! Loads one split of the preprocessed TIMIT corpus and reports what the training loop
//! would see. See "config.rs" for where the corpus is expected to live.
//!
//! Loading the full train split keeps every feature matrix in memory; expect a few
//! hundred MB for 123-dim filterbank inputs.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use timit_data::config::LABEL_TYPES;
use timit_data::{CorpusLayout, Dataset, DatasetOptions, MiniBatches, Split};

/// Load a TIMIT split for joint CTC/attention training
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Dataset split
    #[clap(long, value_enum, default_value = "train")]
    split: DsSplit,
    /// Label vocabulary (phone39, phone48, phone61, character)
    #[clap(long, default_value = "phone61")]
    label_type: String,
    /// Corpus root. Defaults to $TIMIT_DATASET_ROOT or the built-in path
    #[clap(long)]
    root: Option<PathBuf>,
    #[clap(long, default_value_t = 32)]
    batch_size: usize,
    #[clap(long, default_value_t = 1)]
    num_gpu: usize,
    /// Index of the <EOS> class
    #[clap(long, default_value_t = 1)]
    eos_index: i64,
    /// Length-ordered batches, shuffled within each batch
    #[clap(long, default_value_t = true, action = clap::ArgAction::Set)]
    sort_utt: bool,
    /// Length-ordered batches in the first epoch only
    #[clap(long)]
    sorta_grad: bool,
    /// Number of minibatches to draw after loading
    #[clap(short, long, default_value_t = 0)]
    batches: usize,
    /// Random seed for batch sampling
    #[clap(short, long)]
    seed: Option<u64>,
    #[clap(short, long)]
    progress: bool,
    #[clap(short, long)]
    verbose: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum DsSplit {
    Train,
    Dev,
    Test,
}

impl From<DsSplit> for Split {
    fn from(split: DsSplit) -> Self {
        match split {
            DsSplit::Train => Split::Train,
            DsSplit::Dev => Split::Dev,
            DsSplit::Test => Split::Test,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        true => log::LevelFilter::Debug,
        _ => log::LevelFilter::Info,
    };
    env_logger::builder().filter_level(level).init();

    let start_time = Instant::now();
    let layout = args.root.map(CorpusLayout::new).unwrap_or_default();
    let split = Split::from(args.split);
    let options = DatasetOptions::new(args.batch_size, args.eos_index)
        .sort_utt(args.sort_utt)
        .sorta_grad(args.sorta_grad)
        .num_gpu(args.num_gpu)
        .progressbar(args.progress);

    let mut dataset = Dataset::load_from(&layout, &split.to_string(), &args.label_type, options)
        .with_context(|| format!("Failed to load {} split from '{}'", split, layout.root().display()))?;

    let frames: Vec<usize> = dataset.records().iter().map(|r| r.num_frames).collect();
    let total: usize = frames.iter().sum();
    let num_classes = LABEL_TYPES.get(dataset.label_type()).copied().unwrap_or(0);
    println!("Split: {} ({}, {} classes)", dataset.split(), dataset.label_type(), num_classes);
    println!("Utterances: {}, input size: {}", dataset.len(), dataset.input_size());
    println!(
        "Frames: min {}, max {}, mean {:.1}, total {}",
        frames.first().copied().unwrap_or(0),
        frames.last().copied().unwrap_or(0),
        total as f64 / frames.len().max(1) as f64,
        total
    );

    if args.batches > 0 {
        let num_gpu = dataset.options().num_gpu;
        let pb = ProgressBar::new(args.batches as u64);
        pb.set_style(ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix:15.bold.dim} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"));
        pb.set_prefix("Drawing batches");

        let batches = match args.seed {
            Some(seed) => MiniBatches::with_seed(&mut dataset, seed),
            None => MiniBatches::new(&mut dataset),
        };
        for batch in batches.take(args.batches) {
            let batch = batch?;
            let shards: Vec<usize> = batch.split(num_gpu).iter().map(|s| s.batch_size()).collect();
            pb.println(format!("{:?}, shards: {:?}", batch, shards));
            pb.inc(1);
        }
        pb.finish_and_clear();
    }

    println!("Total time elapsed: {:?}", start_time.elapsed());
    Ok(())
}
