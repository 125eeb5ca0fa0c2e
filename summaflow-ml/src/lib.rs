//! # summaflow-ml: dataset stages for summarization training
//!
//! Downloads and ingests a dialogue/summary dataset, splits it into
//! train/validation/test partitions with a fixed seed and tokenizes each
//! partition to fixed-length model features. [`TrainingPipeline`] chains the
//! stages for one run.

pub mod ingestion;
pub mod pipeline;
pub mod split;
pub mod tokenize;
pub mod transformation;

// Re-exports
pub use ingestion::{DataIngestion, extract_first_csv};
pub use pipeline::{PipelineOutcome, TrainingPipeline};
pub use split::{Partitions, SplitIndices, three_way_split, train_test_split};
pub use tokenize::{SummaryTokenizer, TokenizedFeatures};
pub use transformation::DataTransformation;
