//! Splice-junction annotation: junction records, the junction source and
//! writer, strand-aware exon matching and the annotation driver.

pub mod annotator;
pub mod gene_model;
pub mod io;
pub mod matcher;
pub mod record;

pub use annotator::{get_splice_site, AnnotateOptions, JunctionsAnnotator, RunError, RunStats};
pub use gene_model::{GeneModel, TranscriptModel};
pub use record::{Anchor, AnnotatedJunction, Junction};
