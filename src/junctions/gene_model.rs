use crate::types::{RefBlock, Strand};

/// Borrowed view of one transcript as the junction annotator sees it.
///
/// `exons` are 0-based half-open blocks in genomic order, whatever the strand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscriptModel<'a> {
    pub id: &'a str,
    pub gene: &'a str,
    pub strand: Strand,
    pub exons: &'a [RefBlock],
}

/// Read-only gene-model lookup consumed by the junction annotator.
pub trait GeneModel {
    /// Transcripts on `chrom` whose span overlaps or abuts `[start, end)`.
    ///
    /// Unknown chromosomes yield an empty list. Order must be deterministic.
    fn transcripts_overlapping(&self, chrom: &str, start: u32, end: u32) -> Vec<TranscriptModel<'_>>;
}
