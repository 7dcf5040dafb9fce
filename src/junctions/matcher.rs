//! Strand-aware comparison of one junction against one transcript.
//!
//! Exons come in genomic order. On `+` the exon end is the donor side and the
//! exon start the acceptor side; on `-` the roles swap and the transcript is
//! walked right to left. Both strands go through the same matcher with a
//! [`SpliceRoles`] value choosing the boundaries.

use log::warn;

use crate::junctions::gene_model::TranscriptModel;
use crate::junctions::record::AnnotatedJunction;
use crate::types::{RefBlock, Strand};

/// Result of matching a junction against one transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptHit {
    pub known_donor: bool,
    pub known_acceptor: bool,
    pub known_junction: bool,
    pub exons_skipped: Vec<RefBlock>,
    pub donors_skipped: Vec<u32>,
    pub acceptors_skipped: Vec<u32>,
}

impl TranscriptHit {
    pub fn matches_splice_site(&self) -> bool {
        self.known_donor || self.known_acceptor
    }
}

/// Donor/acceptor role mapping for a transcript strand.
///
/// Boundaries are expressed in the junction record's coordinates: an exon end
/// (0-based exclusive) lines up with the record start, an exon start lines up
/// with the record end once shifted to 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpliceRoles {
    Forward,
    Reverse,
}

impl SpliceRoles {
    pub fn for_strand(strand: Strand) -> Option<Self> {
        match strand {
            Strand::Plus => Some(SpliceRoles::Forward),
            Strand::Minus => Some(SpliceRoles::Reverse),
            Strand::Unknown => None,
        }
    }

    /// Exon boundary facing the downstream intron.
    #[inline]
    pub fn exon_donor(self, exon: RefBlock) -> u32 {
        match self {
            SpliceRoles::Forward => exon.end,
            SpliceRoles::Reverse => exon.start + 1,
        }
    }

    /// Exon boundary facing the upstream intron.
    #[inline]
    pub fn exon_acceptor(self, exon: RefBlock) -> u32 {
        match self {
            SpliceRoles::Forward => exon.start + 1,
            SpliceRoles::Reverse => exon.end,
        }
    }

    #[inline]
    pub fn junction_donor(self, junction: &AnnotatedJunction) -> u32 {
        match self {
            SpliceRoles::Forward => junction.start,
            SpliceRoles::Reverse => junction.end,
        }
    }

    #[inline]
    pub fn junction_acceptor(self, junction: &AnnotatedJunction) -> u32 {
        match self {
            SpliceRoles::Forward => junction.end,
            SpliceRoles::Reverse => junction.start,
        }
    }

    /// Exons in transcription order.
    fn ordered(self, exons: &[RefBlock]) -> Vec<RefBlock> {
        match self {
            SpliceRoles::Forward => exons.to_vec(),
            SpliceRoles::Reverse => exons.iter().rev().copied().collect(),
        }
    }
}

/// Compare `junction` with one transcript.
///
/// Returns `None` when the transcript neither overlaps the junction nor shares
/// a splice site with it, or when its exon layout cannot be used. A transcript
/// without a strand can only overlap: its splice sites are never matched.
/// Skipped exons and splice sites are only reported for transcripts that share
/// at least one splice site with the junction.
pub fn match_transcript(tx: &TranscriptModel<'_>, junction: &AnnotatedJunction) -> Option<TranscriptHit> {
    let (first, last) = (tx.exons.first()?, tx.exons.last()?);

    if !RefBlock::are_ordered(tx.exons) {
        warn!("transcript {} has unordered or overlapping exons, skipped", tx.id);
        return None;
    }

    let window = RefBlock {
        start: junction.start,
        end: junction.end,
    };
    let span_overlap = RefBlock {
        start: first.start,
        end: last.end,
    }
    .overlaps(window);

    let Some(roles) = SpliceRoles::for_strand(tx.strand) else {
        return span_overlap.then(TranscriptHit::default);
    };

    let donor_pos = roles.junction_donor(junction);
    let acceptor_pos = roles.junction_acceptor(junction);

    let ordered = roles.ordered(tx.exons);
    let donor_idx = ordered.iter().position(|&e| roles.exon_donor(e) == donor_pos);
    let acceptor_idx = ordered.iter().position(|&e| roles.exon_acceptor(e) == acceptor_pos);

    let mut hit = TranscriptHit {
        known_donor: donor_idx.is_some(),
        known_acceptor: acceptor_idx.is_some(),
        known_junction: matches!((donor_idx, acceptor_idx), (Some(d), Some(a)) if a > d),
        ..TranscriptHit::default()
    };

    if !span_overlap && !hit.matches_splice_site() {
        return None;
    }

    if hit.matches_splice_site() {
        // record end is one past the intron end
        let intron = RefBlock {
            start: junction.start,
            end: junction.end.saturating_sub(1),
        };
        for &exon in ordered.iter().filter(|&&e| intron.contains(e)) {
            hit.exons_skipped.push(exon);
            hit.donors_skipped.push(roles.exon_donor(exon));
            hit.acceptors_skipped.push(roles.exon_acceptor(exon));
        }
    }

    Some(hit)
}
