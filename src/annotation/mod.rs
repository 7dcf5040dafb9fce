//! GTF/GFF3 input: a line-numbered record reader and the builder that turns
//! exon records into the junction gene model.

pub mod builder;
pub mod io;

pub use builder::AnnotationBuilder;
pub use io::{AnnotationReader, AnnotationRecord, Dialect, ParseError};