//! junction_annotate
//!
//! Annotates splice junctions (intron intervals with strand) against a
//! GTF/GFF3 gene model: known donor/acceptor sites, overlapping genes and
//! transcripts, skipped exons and splice-site bases.
//! Gene-model exons are 0-based, half-open.

pub mod types;
pub mod model;
pub mod annotation;
pub mod index;
pub mod junctions;
pub mod sequence;

pub use index::{IdNameKeys, SpliceIndex};

pub use annotation::AnnotationBuilder;

pub use types::{RefBlock, Strand};

pub use model::transcript::Transcript;
pub use model::gene::Gene;
pub use model::types::{GeneId, TranscriptId};

pub use junctions::{
    AnnotateOptions, AnnotatedJunction, Anchor, GeneModel, Junction, JunctionsAnnotator,
};
pub use sequence::{FastaSequences, SequenceProvider};
