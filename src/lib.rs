//! In-memory TIMIT dataset for joint CTC/attention speech recognition.
//!
//! ```no_run
//! use timit_data::{Dataset, DatasetOptions, MiniBatches};
//!
//! let options = DatasetOptions::new(32, 1).sort_utt(true).progressbar(true);
//! let mut train = Dataset::load("train", "phone61", options)?;
//! for batch in MiniBatches::new(&mut train) {
//!     let batch = batch?;
//!     // feed batch.inputs / batch.att_labels / batch.ctc_labels to the model
//!     if batch.is_new_epoch {
//!         break;
//!     }
//! }
//! # Ok::<(), timit_data::DatasetError>(())
//! ```

pub mod audit;
pub mod batch;
pub mod config;
pub mod dataset;
pub mod error;
pub mod manifest;
pub mod npy;

pub use batch::{MiniBatch, MiniBatches};
pub use config::CorpusLayout;
pub use dataset::{Dataset, DatasetOptions, Split, UtteranceRecord};
pub use error::{DatasetError, Result};
pub use manifest::FrameManifest;
