use std::collections::BTreeSet;
use std::fmt;
use std::io::{self, Write};

use crate::junctions::matcher::TranscriptHit;
use crate::types::{RefBlock, Strand};

/// A junction as read from the junction source.
///
/// `[start, end)` is the intron, 0-based half-open. `score` is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Junction {
    pub chrom: String,
    pub start: u32,
    pub end: u32,
    pub name: String,
    pub score: String,
    pub strand: Strand,
    /// Columns after the sixth, untouched.
    pub fields: Vec<String>,
}

impl Junction {
    pub fn new(chrom: impl Into<String>, start: u32, end: u32, strand: Strand) -> Self {
        Self {
            chrom: chrom.into(),
            start,
            end,
            name: ".".to_string(),
            score: "0".to_string(),
            strand,
            fields: Vec::new(),
        }
    }
}

/// How a junction's two ends relate to annotated splice sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Anchor {
    /// No gene or transcript overlaps the junction.
    N,
    /// Known donor only.
    D,
    /// Known acceptor only.
    A,
    /// Both ends are annotated splice sites.
    DA,
    /// Inside a gene but neither end is annotated.
    NDA,
}

impl Anchor {
    pub fn classify(known_donor: bool, known_acceptor: bool, overlaps_gene: bool) -> Self {
        match (known_donor, known_acceptor) {
            (true, true) => Anchor::DA,
            (true, false) => Anchor::D,
            (false, true) => Anchor::A,
            (false, false) if overlaps_gene => Anchor::NDA,
            (false, false) => Anchor::N,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Anchor::N => "N",
            Anchor::D => "D",
            Anchor::A => "A",
            Anchor::DA => "DA",
            Anchor::NDA => "NDA",
        }
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Annotation result for one junction.
///
/// Built from a [`Junction`] with every set empty and the anchor at `N`,
/// filled by [`absorb`](Self::absorb) once per matching transcript and closed
/// by [`finalize`](Self::finalize).
///
/// `end` is the junction end plus one: the 1-based position of the first
/// base of the acceptor-side exon. The shift happens in `From<&Junction>`
/// and nowhere else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedJunction {
    pub chrom: String,
    pub start: u32,
    pub end: u32,
    pub name: String,
    pub score: String,
    pub strand: Strand,
    pub fields: Vec<String>,

    pub transcripts_overlap: BTreeSet<String>,
    pub genes_overlap: BTreeSet<String>,
    pub exons_skipped: BTreeSet<RefBlock>,
    pub acceptors_skipped: BTreeSet<u32>,
    pub donors_skipped: BTreeSet<u32>,
    pub anchor: Anchor,
    pub splice_site: String,
    pub known_donor: bool,
    pub known_acceptor: bool,
    pub known_junction: bool,
    pub annotation: String,
    pub variant_info: String,
}

const HEADER: [&str; 16] = [
    "chrom",
    "start",
    "end",
    "name",
    "score",
    "strand",
    "splice_site",
    "acceptors_skipped",
    "exons_skipped",
    "donors_skipped",
    "anchor",
    "known_donor",
    "known_acceptor",
    "known_junction",
    "genes",
    "transcripts",
];

impl AnnotatedJunction {
    /// Output order: chromosome, then start, then end.
    pub fn sort_key(&self) -> (&str, u32, u32) {
        (self.chrom.as_str(), self.start, self.end)
    }

    /// Empty record over an already converted span.
    pub fn new(chrom: impl Into<String>, start: u32, end: u32) -> Self {
        Self {
            chrom: chrom.into(),
            start,
            end,
            name: String::new(),
            score: String::new(),
            strand: Strand::Unknown,
            fields: Vec::new(),
            transcripts_overlap: BTreeSet::new(),
            genes_overlap: BTreeSet::new(),
            exons_skipped: BTreeSet::new(),
            acceptors_skipped: BTreeSet::new(),
            donors_skipped: BTreeSet::new(),
            anchor: Anchor::N,
            splice_site: String::new(),
            known_donor: false,
            known_acceptor: false,
            known_junction: false,
            annotation: String::new(),
            variant_info: String::new(),
        }
    }

    /// Clear every annotation result, keeping coordinates and input columns.
    pub fn reset(&mut self) {
        self.transcripts_overlap.clear();
        self.genes_overlap.clear();
        self.exons_skipped.clear();
        self.acceptors_skipped.clear();
        self.donors_skipped.clear();
        self.anchor = Anchor::N;
        self.splice_site.clear();
        self.known_donor = false;
        self.known_acceptor = false;
        self.known_junction = false;
        self.annotation.clear();
    }

    /// Fold one transcript's match into the record. Flags are OR'd, sets unioned.
    pub fn absorb(&mut self, transcript: &str, gene: &str, hit: &TranscriptHit) {
        self.transcripts_overlap.insert(transcript.to_string());
        self.genes_overlap.insert(gene.to_string());

        self.known_donor |= hit.known_donor;
        self.known_acceptor |= hit.known_acceptor;
        self.known_junction |= hit.known_junction;

        self.exons_skipped.extend(hit.exons_skipped.iter().copied());
        self.donors_skipped.extend(hit.donors_skipped.iter().copied());
        self.acceptors_skipped.extend(hit.acceptors_skipped.iter().copied());
    }

    /// Derive anchor and annotation from the accumulated flags.
    pub fn finalize(&mut self) {
        let overlaps_gene = !self.genes_overlap.is_empty() || !self.transcripts_overlap.is_empty();
        self.anchor = Anchor::classify(self.known_donor, self.known_acceptor, overlaps_gene);

        let annotation = match self.anchor {
            Anchor::N => "intergenic",
            Anchor::NDA => "novel_intragenic",
            Anchor::D => "novel_acceptor",
            Anchor::A => "novel_donor",
            Anchor::DA if !self.known_junction => "novel_combination",
            Anchor::DA if !self.exons_skipped.is_empty() => "exon_skipping",
            Anchor::DA => "known",
        };
        self.annotation = annotation.to_string();
    }

    pub fn write_header<W: Write>(out: &mut W, with_variant_info: bool) -> io::Result<()> {
        write!(out, "{}", HEADER.join("\t"))?;
        if with_variant_info {
            write!(out, "\tvariant_info")?;
        }
        writeln!(out)
    }

    pub fn write_row<W: Write>(&self, out: &mut W, with_variant_info: bool) -> io::Result<()> {
        write!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.chrom,
            self.start,
            self.end,
            self.name,
            self.score,
            self.strand,
            self.splice_site,
            self.acceptors_skipped.len(),
            self.exons_skipped.len(),
            self.donors_skipped.len(),
            self.anchor,
            u8::from(self.known_donor),
            u8::from(self.known_acceptor),
            u8::from(self.known_junction),
            join_or_na(&self.genes_overlap),
            join_or_na(&self.transcripts_overlap),
        )?;
        if with_variant_info {
            write!(out, "\t{}", self.variant_info)?;
        }
        writeln!(out)
    }
}

fn join_or_na(set: &BTreeSet<String>) -> String {
    if set.is_empty() {
        "NA".to_string()
    } else {
        set.iter().map(String::as_str).collect::<Vec<_>>().join(",")
    }
}

impl From<&Junction> for AnnotatedJunction {
    fn from(j: &Junction) -> Self {
        let mut rec = AnnotatedJunction::new(j.chrom.clone(), j.start, j.end.saturating_add(1));
        rec.name = j.name.clone();
        rec.score = j.score.clone();
        rec.strand = j.strand;
        rec.fields = j.fields.clone();
        rec
    }
}
