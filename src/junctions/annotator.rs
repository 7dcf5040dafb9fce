use std::io::Write;

use bio::alphabets::dna::revcomp;
use log::{debug, info, warn};

use crate::junctions::gene_model::{GeneModel, TranscriptModel};
use crate::junctions::io::{JunctionError, JunctionReader, JunctionWriter};
use crate::junctions::matcher::match_transcript;
use crate::junctions::record::{AnnotatedJunction, Anchor, Junction};
use crate::sequence::{SequenceError, SequenceProvider};
use crate::types::Strand;

/// Options controlling the annotation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnotateOptions {
    /// Ignore transcripts with a single exon. They have no splice sites and
    /// would only add gene/transcript overlaps.
    pub skip_single_exon_genes: bool,
}

impl Default for AnnotateOptions {
    fn default() -> Self {
        Self {
            skip_single_exon_genes: true,
        }
    }
}

/// Counters collected by [`JunctionsAnnotator::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub junctions: usize,
    pub known_junctions: usize,
    pub novel_intragenic: usize,
    pub intergenic: usize,
    pub splice_site_failures: usize,
}

/// Failure of a whole annotation run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Junctions(#[from] JunctionError),
    #[error("writing annotated junctions: {0}")]
    Output(#[from] std::io::Error),
}

/// Annotates junctions against a gene model.
///
/// The gene model is borrowed read-only; one annotator can be shared by any
/// number of threads as long as `G: Sync`.
///
/// ```no_run
/// use junction_annotate::{AnnotateOptions, IdNameKeys, JunctionsAnnotator, SpliceIndex};
/// use junction_annotate::junctions::io::{JunctionReader, JunctionWriter};
/// use junction_annotate::sequence::FastaSequences;
///
/// let index = SpliceIndex::open("genes.gtf", 1_000_000, IdNameKeys::default()).unwrap();
/// let annotator = JunctionsAnnotator::new(&index, AnnotateOptions::default());
/// let mut reference = FastaSequences::open("genome.fa").unwrap();
///
/// let reader = JunctionReader::from_path("junctions.bed").unwrap();
/// let mut writer = JunctionWriter::new(std::io::stdout().lock());
/// annotator.run(reader, &mut writer, Some(&mut reference)).unwrap();
/// ```
pub struct JunctionsAnnotator<'g, G: GeneModel + ?Sized> {
    gene_model: &'g G,
    options: AnnotateOptions,
}

impl<'g, G: GeneModel + ?Sized> JunctionsAnnotator<'g, G> {
    pub fn new(gene_model: &'g G, options: AnnotateOptions) -> Self {
        Self { gene_model, options }
    }

    /// Build and annotate the record for one junction.
    pub fn annotate(&self, junction: &Junction) -> AnnotatedJunction {
        let mut rec = AnnotatedJunction::from(junction);
        self.annotate_junction_with_gene_model(&mut rec);
        rec
    }

    /// Match `rec` against every transcript near it, then set its anchor.
    ///
    /// Prior results on `rec` are cleared first, so calling this twice gives
    /// the same record.
    pub fn annotate_junction_with_gene_model(&self, rec: &mut AnnotatedJunction) {
        rec.reset();
        for tx in self.gene_model.transcripts_overlapping(&rec.chrom, rec.start, rec.end) {
            self.check_for_overlap(&tx, rec);
        }
        rec.finalize();
    }

    fn check_for_overlap(&self, tx: &TranscriptModel<'_>, rec: &mut AnnotatedJunction) {
        if self.options.skip_single_exon_genes && tx.exons.len() == 1 {
            return;
        }
        if let Some(hit) = match_transcript(tx, rec) {
            rec.absorb(tx.id, tx.gene, &hit);
        }
    }

    /// Read, annotate and write every junction from `reader`.
    ///
    /// With a sequence provider each record also gets its splice-site bases;
    /// a failed fetch leaves them empty and is only logged.
    pub fn run<R, W>(
        &self,
        reader: JunctionReader<R>,
        writer: &mut JunctionWriter<W>,
        mut sequences: Option<&mut dyn SequenceProvider>,
    ) -> Result<RunStats, RunError>
    where
        R: std::io::BufRead,
        W: Write,
    {
        let mut stats = RunStats::default();
        writer.write_header()?;

        for junction in reader.records() {
            let junction = junction?;
            let mut rec = self.annotate(&junction);

            if let Some(seqs) = sequences.as_deref_mut() {
                if let Err(e) = get_splice_site(&mut rec, seqs) {
                    warn!(
                        "no splice site for {}:{}-{}: {}",
                        rec.chrom, rec.start, rec.end, e
                    );
                    stats.splice_site_failures += 1;
                }
            }

            stats.junctions += 1;
            if rec.known_junction {
                stats.known_junctions += 1;
            }
            match rec.anchor {
                Anchor::N => stats.intergenic += 1,
                Anchor::NDA => stats.novel_intragenic += 1,
                _ => {}
            }
            debug!("{}:{}-{} anchor={}", rec.chrom, rec.start, rec.end, rec.anchor);

            writer.write(&rec)?;
        }
        writer.flush()?;

        info!(
            "annotated {} junctions: {} known, {} novel intragenic, {} intergenic",
            stats.junctions, stats.known_junctions, stats.novel_intragenic, stats.intergenic
        );
        Ok(stats)
    }
}

/// Fill `rec.splice_site` with the two intronic bases at each end.
///
/// Windows are the first two and last two bases of the intron (1-based:
/// `start+1..=start+2` and `end-2..=end-1`), concatenated and reverse
/// complemented on the minus strand so the donor side comes first. On error
/// `rec.splice_site` is left empty.
pub fn get_splice_site<S: SequenceProvider + ?Sized>(
    rec: &mut AnnotatedJunction,
    sequences: &mut S,
) -> Result<(), SequenceError> {
    rec.splice_site.clear();

    let invalid = || SequenceError::InvalidRange {
        start: rec.start,
        end: rec.end,
    };
    if rec.end < 3 {
        return Err(invalid());
    }
    let donor_end = rec.start.checked_add(2).ok_or_else(invalid)?;
    let donor = sequences.bases_at(&rec.chrom, rec.start + 1, donor_end)?;
    let acceptor = sequences.bases_at(&rec.chrom, rec.end - 2, rec.end - 1)?;

    let forward = format!("{donor}{acceptor}");
    rec.splice_site = match rec.strand {
        Strand::Minus => String::from_utf8_lossy(&revcomp(forward.as_bytes())).into_owned(),
        _ => forward,
    };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IdNameKeys, SpliceIndex};
    use crate::types::RefBlock;
    use std::collections::HashMap;
    use std::io::Cursor;

    /// In-test gene model: (chrom, transcript, gene, strand, exons).
    struct Fixture(Vec<(&'static str, &'static str, &'static str, Strand, Vec<RefBlock>)>);

    impl GeneModel for Fixture {
        fn transcripts_overlapping(&self, chrom: &str, start: u32, end: u32) -> Vec<TranscriptModel<'_>> {
            self.0
                .iter()
                .filter(|(c, ..)| *c == chrom)
                .filter(|(.., exons)| {
                    let (s, e) = (exons[0].start, exons[exons.len() - 1].end);
                    s <= end && start <= e
                })
                .map(|(_, id, gene, strand, exons)| TranscriptModel {
                    id: *id,
                    gene: *gene,
                    strand: *strand,
                    exons: exons.as_slice(),
                })
                .collect()
        }
    }

    fn blocks(v: &[(u32, u32)]) -> Vec<RefBlock> {
        v.iter().map(|&(s, e)| RefBlock::new(s, e)).collect()
    }

    fn plus_and_minus() -> Fixture {
        Fixture(vec![
            ("chr1", "TP", "GP", Strand::Plus, blocks(&[(100, 200), (250, 300), (350, 400)])),
            ("chr2", "TM", "GM", Strand::Minus, blocks(&[(100, 200), (250, 300)])),
            ("chr3", "TS", "GS", Strand::Plus, blocks(&[(100, 500)])),
        ])
    }

    fn annotate(model: &Fixture, chrom: &str, start: u32, end: u32, strand: Strand) -> AnnotatedJunction {
        JunctionsAnnotator::new(model, AnnotateOptions::default())
            .annotate(&Junction::new(chrom, start, end, strand))
    }

    fn rows(recs: &[AnnotatedJunction]) -> Vec<String> {
        recs.iter()
            .map(|r| {
                let mut buf = Vec::new();
                r.write_row(&mut buf, false).unwrap();
                String::from_utf8(buf).unwrap()
            })
            .collect()
    }

    #[test]
    fn strand_symmetry_of_known_junctions() {
        let model = Fixture(vec![
            ("chr1", "TP", "GP", Strand::Plus, blocks(&[(100, 200), (250, 300)])),
            ("chr2", "TM", "GM", Strand::Minus, blocks(&[(100, 200), (250, 300)])),
        ]);

        for chrom in ["chr1", "chr2"] {
            let strand = if chrom == "chr1" { Strand::Plus } else { Strand::Minus };
            let rec = annotate(&model, chrom, 200, 250, strand);
            assert!(rec.known_junction, "{chrom}");
            assert_eq!(rec.anchor, Anchor::DA);
            assert!(rec.exons_skipped.is_empty());
            assert_eq!(rec.annotation, "known");
        }
    }

    #[test]
    fn exon_skip_scenario() {
        let rec = annotate(&plus_and_minus(), "chr1", 200, 350, Strand::Plus);
        assert!(rec.known_junction);
        assert_eq!(rec.exons_skipped.iter().copied().collect::<Vec<_>>(), vec![RefBlock::new(250, 300)]);
        assert_eq!(rec.donors_skipped.len(), 1);
        assert_eq!(rec.acceptors_skipped.len(), 1);
        assert_eq!(rec.annotation, "exon_skipping");
    }

    #[test]
    fn absent_chromosome_is_fully_novel() {
        let rec = annotate(&plus_and_minus(), "chrUn", 200, 350, Strand::Plus);
        assert_eq!(rec.anchor, Anchor::N);
        assert!(rec.genes_overlap.is_empty() && rec.transcripts_overlap.is_empty());
        assert!(!rec.known_donor && !rec.known_acceptor && !rec.known_junction);
        assert_eq!(rec.annotation, "intergenic");
    }

    #[test]
    fn anchors_for_partial_matches() {
        let model = plus_and_minus();

        let d = annotate(&model, "chr1", 200, 320, Strand::Plus);
        assert_eq!(d.anchor, Anchor::D);
        assert_eq!(d.transcripts_overlap.iter().collect::<Vec<_>>(), vec!["TP"]);

        let a = annotate(&model, "chr1", 220, 250, Strand::Plus);
        assert_eq!(a.anchor, Anchor::A);

        let nda = annotate(&model, "chr1", 210, 240, Strand::Plus);
        assert_eq!(nda.anchor, Anchor::NDA);
        assert_eq!(nda.genes_overlap.iter().collect::<Vec<_>>(), vec!["GP"]);
    }

    #[test]
    fn known_flags_imply_overlap_sets() {
        let model = plus_and_minus();
        for (start, end) in [(200, 250), (200, 320), (220, 250), (300, 350), (200, 350), (10, 20)] {
            let rec = annotate(&model, "chr1", start, end, Strand::Plus);
            if rec.known_junction {
                assert!(rec.known_donor && rec.known_acceptor);
            }
            if rec.known_donor || rec.known_acceptor {
                assert!(rec.transcripts_overlap.contains("TP"));
                assert!(rec.genes_overlap.contains("GP"));
            }
            let expected = Anchor::classify(rec.known_donor, rec.known_acceptor, !rec.genes_overlap.is_empty());
            assert_eq!(rec.anchor, expected);
        }
    }

    #[test]
    fn single_exon_transcripts_follow_option() {
        let model = plus_and_minus();
        let skipped = annotate(&model, "chr3", 200, 300, Strand::Plus);
        assert_eq!(skipped.anchor, Anchor::N);

        let kept = JunctionsAnnotator::new(&model, AnnotateOptions { skip_single_exon_genes: false })
            .annotate(&Junction::new("chr3", 200, 300, Strand::Plus));
        assert_eq!(kept.anchor, Anchor::NDA);
        assert!(kept.genes_overlap.contains("GS"));
    }

    #[test]
    fn annotation_is_idempotent() {
        let model = plus_and_minus();
        let annotator = JunctionsAnnotator::new(&model, AnnotateOptions::default());
        let j = Junction::new("chr1", 200, 350, Strand::Plus);

        let first = annotator.annotate(&j);
        let mut again = first.clone();
        annotator.annotate_junction_with_gene_model(&mut again);

        assert_eq!(rows(&[first.clone()]), rows(&[again.clone()]));
        assert_eq!(again.end, 351);
        assert_eq!(rows(&[annotator.annotate(&j)]), rows(&[first]));
    }

    #[test]
    fn order_invariance_after_sorting() {
        let model = plus_and_minus();
        let annotator = JunctionsAnnotator::new(&model, AnnotateOptions::default());
        let junctions = vec![
            Junction::new("chr2", 200, 250, Strand::Minus),
            Junction::new("chr1", 200, 350, Strand::Plus),
            Junction::new("chr1", 200, 250, Strand::Plus),
            Junction::new("chr9", 5, 10, Strand::Plus),
        ];

        let mut forward: Vec<_> = junctions.iter().map(|j| annotator.annotate(j)).collect();
        let mut backward: Vec<_> = junctions.iter().rev().map(|j| annotator.annotate(j)).collect();
        forward.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        backward.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        assert_eq!(rows(&forward), rows(&backward));
    }

    #[test]
    fn splice_site_forward_and_reverse() {
        // intron [4, 12): bases 5..=12 (1-based) are "GTAAAAAG"
        let mut reference: HashMap<String, Vec<u8>> = HashMap::new();
        reference.insert("chr1".into(), b"CCCCGTAAAAAGCCCC".to_vec());

        let mut plus = AnnotatedJunction::from(&Junction::new("chr1", 4, 12, Strand::Plus));
        get_splice_site(&mut plus, &mut reference).unwrap();
        assert_eq!(plus.splice_site, "GTAG");

        let mut minus = AnnotatedJunction::from(&Junction::new("chr1", 4, 12, Strand::Minus));
        get_splice_site(&mut minus, &mut reference).unwrap();
        assert_eq!(minus.splice_site, "CTAC");
    }

    #[test]
    fn failed_splice_site_fetch_leaves_field_empty() {
        let mut reference: HashMap<String, Vec<u8>> = HashMap::new();
        let mut rec = AnnotatedJunction::from(&Junction::new("chrX", 4, 12, Strand::Plus));
        rec.splice_site = "stale".into();
        assert!(get_splice_site(&mut rec, &mut reference).is_err());
        assert!(rec.splice_site.is_empty());
    }

    #[test]
    fn coordinates_at_u32_limit_do_not_panic() {
        let model = plus_and_minus();
        let annotator = JunctionsAnnotator::new(&model, AnnotateOptions::default());
        let j = Junction::new("chr1", u32::MAX - 1, u32::MAX, Strand::Plus);

        let mut rec = annotator.annotate(&j);
        assert_eq!(rec.end, u32::MAX);

        let mut reference: HashMap<String, Vec<u8>> = HashMap::new();
        reference.insert("chr1".into(), vec![b'A'; 16]);
        assert!(matches!(
            get_splice_site(&mut rec, &mut reference),
            Err(SequenceError::InvalidRange { .. })
        ));
    }

    #[test]
    fn strandless_gene_still_counts_as_overlap() {
        let gtf = "\
chr1\tsrc\texon\t101\t200\t.\t.\t.\tgene_id \"G1\"; transcript_id \"T1\";
chr1\tsrc\texon\t251\t300\t.\t.\t.\tgene_id \"G1\"; transcript_id \"T1\";
chr1\tsrc\texon\t351\t400\t.\t.\t.\tgene_id \"G1\"; transcript_id \"T1\";
";
        let index = SpliceIndex::new(100)
            .from_reader(Cursor::new(gtf.as_bytes()), IdNameKeys::default())
            .unwrap();
        let annotator = JunctionsAnnotator::new(&index, AnnotateOptions::default());

        let rec = annotator.annotate(&Junction::new("chr1", 210, 240, Strand::Plus));
        assert_eq!(rec.anchor, Anchor::NDA);
        assert!(!rec.known_donor && !rec.known_acceptor);
        assert!(rec.genes_overlap.contains("G1"));
        assert!(rec.transcripts_overlap.contains("T1"));

        // exact boundaries are not matched without a strand
        let rec = annotator.annotate(&Junction::new("chr1", 200, 250, Strand::Plus));
        assert_eq!(rec.anchor, Anchor::NDA);
    }

    #[test]
    fn run_over_index_and_bed() {
        let gtf = "\
chr1\tsrc\texon\t101\t200\t.\t+\t.\tgene_id \"G1\"; gene_name \"Alpha\"; transcript_id \"T1\";
chr1\tsrc\texon\t251\t300\t.\t+\t.\tgene_id \"G1\"; gene_name \"Alpha\"; transcript_id \"T1\";
chr1\tsrc\texon\t351\t400\t.\t+\t.\tgene_id \"G1\"; gene_name \"Alpha\"; transcript_id \"T1\";
";
        let index = SpliceIndex::new(100)
            .from_reader(Cursor::new(gtf.as_bytes()), IdNameKeys::default())
            .unwrap();

        let bed = "\
chr1\t200\t350\tJ1\t5\t+
chr1\t180\t270\tJ2\t3\t+\t180\t270\t0\t2\t20,20\t0,70
chr5\t10\t20\tJ3\t1\t-
";
        let mut reference: HashMap<String, Vec<u8>> = HashMap::new();
        reference.insert("chr1".into(), vec![b'A'; 500]);

        let annotator = JunctionsAnnotator::new(&index, AnnotateOptions::default());
        let mut writer = JunctionWriter::new(Vec::new());
        let stats = annotator
            .run(
                JunctionReader::new(Cursor::new(bed.as_bytes())),
                &mut writer,
                Some(&mut reference),
            )
            .unwrap();

        assert_eq!(
            stats,
            RunStats {
                junctions: 3,
                known_junctions: 2,
                novel_intragenic: 0,
                intergenic: 1,
                splice_site_failures: 1,
            }
        );

        let text = String::from_utf8(writer.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[1],
            "chr1\t200\t351\tJ1\t5\t+\tAAAA\t1\t1\t1\tDA\t1\t1\t1\tAlpha\tT1"
        );
        assert!(lines[2].starts_with("chr1\t200\t251\tJ2\t3\t+\tAAAA\t0\t0\t0\tDA"));
        assert_eq!(lines[3], "chr5\t10\t21\tJ3\t1\t-\t\t0\t0\t0\tN\t0\t0\t0\tNA\tNA");
    }

    #[test]
    fn run_stops_on_malformed_junction() {
        let model = plus_and_minus();
        let annotator = JunctionsAnnotator::new(&model, AnnotateOptions::default());
        let mut writer = JunctionWriter::new(Vec::new());
        let err = annotator
            .run(
                JunctionReader::new(Cursor::new("chr1\t200\n".as_bytes())),
                &mut writer,
                None,
            )
            .unwrap_err();
        assert!(matches!(err, RunError::Junctions(JunctionError::Malformed { .. })));
    }
}
