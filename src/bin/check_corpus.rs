//! Audits one split of the corpus before a long training run. See `timit_data::audit`
//! for what is checked.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use timit_data::audit::{audit_split, StreamReport};
use timit_data::{CorpusLayout, FrameManifest, Split};

/// Check a TIMIT split for missing, orphaned or inconsistent arrays
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Dataset split (train, dev, test)
    split: String,
    /// Label vocabulary (phone39, phone48, phone61, character)
    #[clap(default_value = "phone61")]
    label_type: String,
    /// Corpus root. Defaults to $TIMIT_DATASET_ROOT or the built-in path
    #[clap(long)]
    root: Option<PathBuf>,
}

fn print_stream(name: &str, report: &StreamReport) {
    println!(
        "  - {:<10} {} arrays, {} missing, {} orphaned",
        name,
        report.on_disk,
        report.missing.len(),
        report.orphaned.len()
    );
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::builder().filter_level(log::LevelFilter::Info).init();

    let split: Split = args.split.parse()?;
    let layout = args.root.map(CorpusLayout::new).unwrap_or_default();
    let dirs = layout.split_dirs(split, &args.label_type);

    println!("--- Checking {} ({}) under '{}' ---", split, args.label_type, layout.root().display());
    let manifest = FrameManifest::open(&dirs.frame_num_path())?;
    println!("Manifest lists {} utterances.", manifest.len());

    let pb = ProgressBar::new(0);
    pb.set_style(ProgressStyle::default_bar()
        .template("{spinner:.green} Checking frames [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
        .progress_chars("#>-"));

    let report = audit_split(&dirs, &manifest, pb)?;
    print_stream("inputs", &report.inputs);
    print_stream("ctc", &report.ctc_labels);
    print_stream("attention", &report.att_labels);
    println!("  - {:<10} {} bad inputs", "frames", report.bad_inputs);

    let problems = report.problems();
    if problems > 0 {
        anyhow::bail!("Found {} problems in the {} split!", problems, split);
    }
    println!("\n✅ {} split is consistent.", split);
    Ok(())
}
