//! Transfer ingestion and result publication

pub mod alerts;
pub mod ingestion;
pub mod result;

pub use alerts::{AlertFeed, DEFAULT_CAPACITY};
pub use ingestion::{Pipeline, PipelineStats};
pub use result::ClassificationResult;
