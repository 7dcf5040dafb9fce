use crate::model::types::{GeneId, TranscriptId};
use crate::types::{RefBlock, Strand};
use serde::{Serialize, Deserialize};

/// One annotated transcript: its stable key, strand and exon blocks.
///
/// Exons are kept in genomic order once `finalize()` has run, regardless of
/// strand. Strand-dependent walking is left to the junction matcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub id: TranscriptId,
    pub gene_id: GeneId,
    pub key: String,
    pub chr_id: usize,
    pub strand: Strand,
    exons: Vec<RefBlock>,
}

impl Transcript {
    pub fn new(
        id: TranscriptId,
        gene_id: GeneId,
        key: impl Into<String>,
        chr_id: usize,
        strand: Strand,
    ) -> Self {
        Self {
            id,
            gene_id,
            key: key.into(),
            chr_id,
            strand,
            exons: Vec::new(),
        }
    }

    pub fn add_exon(&mut self, block: RefBlock) {
        self.exons.push(block);
    }

    pub fn exons(&self) -> &[RefBlock] {
        &self.exons
    }

    #[inline]
    pub fn is_single_exon(&self) -> bool {
        self.exons.len() == 1
    }

    /// Sorts and merges overlapping or abutting exons.
    pub fn finalize(&mut self) {
        if self.exons.is_empty() {
            return;
        }

        self.exons.sort_by_key(|b| (b.start, b.end));

        let mut merged: Vec<RefBlock> = Vec::with_capacity(self.exons.len());
        let mut cur = self.exons[0];

        for &b in &self.exons[1..] {
            if b.start <= cur.end {
                cur.end = cur.end.max(b.end);
            } else {
                merged.push(cur);
                cur = b;
            }
        }
        merged.push(cur);

        self.exons = merged;
    }

    pub fn span(&self) -> Option<(u32, u32)> {
        let first = self.exons.first()?;
        let last = self.exons.last()?;
        Some((first.start, last.end))
    }

    /// Span overlaps or touches `[start, end)`.
    pub fn touches(&self, start: u32, end: u32) -> bool {
        match self.span() {
            Some((t0, t1)) => t0 <= end && start <= t1,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(strand: Strand, exons: &[(u32, u32)]) -> Transcript {
        let mut t = Transcript::new(0, 0, "ENST01", 0, strand);
        for &(s, e) in exons {
            t.add_exon(RefBlock::new(s, e));
        }
        t.finalize();
        t
    }

    #[test]
    fn finalize_sorts_merges_and_returns_span() {
        let mut t = Transcript::new(0, 0, "T", 0, Strand::Minus);
        t.add_exon(RefBlock::new(300, 350));
        t.add_exon(RefBlock::new(100, 150));
        t.add_exon(RefBlock::new(140, 160));
        t.finalize();
        assert_eq!(t.span(), Some((100, 350)));
        assert_eq!(t.exons(), &[RefBlock::new(100, 160), RefBlock::new(300, 350)]);
    }

    #[test]
    fn separated_exons_stay_apart() {
        let t = tx(Strand::Plus, &[(350, 400), (100, 200), (250, 300)]);
        assert_eq!(t.exons().len(), 3);
        assert_eq!(t.span(), Some((100, 400)));
        assert!(!t.is_single_exon());
    }

    #[test]
    fn touches_includes_abutting_spans() {
        let t = tx(Strand::Plus, &[(100, 200)]);
        assert!(t.is_single_exon());
        assert!(t.touches(200, 300));
        assert!(t.touches(50, 100));
        assert!(!t.touches(201, 300));
        assert!(!Transcript::new(1, 0, "empty", 0, Strand::Plus).touches(0, 10));
    }
}
