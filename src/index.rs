use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::annotation::io::{AnnotationReader, AnnotationRecord, ParseError};
use crate::junctions::gene_model::{GeneModel, TranscriptModel};
use crate::model::gene::Gene;
use crate::model::transcript::Transcript;
use crate::model::types::{GeneId, TranscriptId};
use crate::types::RefBlock;

const MAGIC: &[u8; 4] = b"SPX1";
const VERSION_STR: &str = env!("CARGO_PKG_VERSION");

/// Configure which attribute keys are used to extract:
/// - gene stable identifier (interned -> GeneId)
/// - gene display names (first one is reported in junction output)
/// - transcript stable identifier (interned -> TranscriptId, reported in output)
/// - (GFF3) exon -> transcript linking keys (usually Parent)
///
/// Multiple keys per category are allowed; the first one present wins.
#[derive(Debug, Clone)]
pub struct IdNameKeys {
    pub gene_id_keys: Vec<String>,
    pub gene_name_keys: Vec<String>,

    pub transcript_id_keys: Vec<String>,

    /// GFF3 exon->transcript linkage (most commonly: Parent)
    pub parent_keys: Vec<String>,

    /// Feature types that count as exon blocks (default: ["exon"])
    pub exon_feature_types: Vec<String>,
}

impl Default for IdNameKeys {
    fn default() -> Self {
        Self {
            gene_id_keys: vec!["gene_id".into(), "gene".into(), "GeneID".into()],
            gene_name_keys: vec!["gene_name".into(), "Name".into(), "gene".into()],

            transcript_id_keys: vec!["transcript_id".into(), "transcript".into(), "ID".into()],

            parent_keys: vec!["Parent".into()],
            exon_feature_types: vec!["exon".into()],
        }
    }
}

/// Per-chromosome bucket index: bin -> transcript ids.
///
/// A pre-filter only; callers still check real spans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChrBuckets {
    pub bin_width: u32,
    pub bins: Vec<Vec<TranscriptId>>,
    pub max_end: u32,
}

impl ChrBuckets {
    pub fn new(bin_width: u32) -> Self {
        Self {
            bin_width: bin_width.max(1),
            bins: Vec::new(),
            max_end: 0,
        }
    }

    fn bin_of(&self, pos: u32) -> usize {
        (pos / self.bin_width) as usize
    }

    fn add_span(&mut self, tx_id: TranscriptId, start0: u32, end0: u32) {
        if end0 <= start0 {
            return;
        }
        self.max_end = self.max_end.max(end0);

        let b0 = self.bin_of(start0);
        let b1 = self.bin_of(end0 - 1);
        if self.bins.len() <= b1 {
            self.bins.resize_with(b1 + 1, Vec::new);
        }
        for bin in &mut self.bins[b0..=b1] {
            bin.push(tx_id);
        }
    }

    fn finalize(&mut self) {
        for bin in &mut self.bins {
            bin.sort_unstable();
            bin.dedup();
        }
    }

    /// Deduped, sorted transcript ids of every bin touching `[start0, end0]`.
    fn candidates(&self, start0: u32, end0: u32) -> Vec<TranscriptId> {
        if self.bins.is_empty() || end0 < start0 {
            return Vec::new();
        }
        let b0 = self.bin_of(start0);
        if b0 >= self.bins.len() {
            return Vec::new();
        }
        let b1 = self.bin_of(end0).min(self.bins.len() - 1);

        let mut out: Vec<TranscriptId> = self.bins[b0..=b1].iter().flatten().copied().collect();
        out.sort_unstable();
        out.dedup();
        out
    }
}

/// The gene model used for junction annotation:
/// - chromosome dictionary (chr name -> chr_id)
/// - genes + transcripts
/// - per-chromosome buckets for fast candidate lookup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpliceIndex {
    pub bin_width: u32,

    pub chr_names: Vec<String>,
    chr_to_id: HashMap<String, usize>,

    pub genes: Vec<Gene>,
    pub transcripts: Vec<Transcript>,

    pub chr_buckets: Vec<ChrBuckets>,
}

/// One summary line, then one line per chromosome with its transcript and
/// gene counts. Meant for logs, not for parsing.
impl fmt::Display for SpliceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "SpliceIndex: {} genes, {} transcripts, {} chromosomes, bin_width={} bp",
            self.genes.len(),
            self.transcripts.len(),
            self.chr_names.len(),
            self.bin_width
        )?;

        for (chr_id, chr_name) in self.chr_names.iter().enumerate() {
            let txs: Vec<&Transcript> = self
                .transcripts
                .iter()
                .filter(|t| t.chr_id == chr_id)
                .collect();
            let genes: HashSet<GeneId> = txs.iter().map(|t| t.gene_id).collect();
            let single = txs.iter().filter(|t| t.is_single_exon()).count();
            let bins = self.chr_buckets.get(chr_id).map_or(0, |b| b.bins.len());

            writeln!(
                f,
                "  - {}: bins={}, genes={}, transcripts={}, single_exon={}",
                chr_name,
                bins,
                genes.len(),
                txs.len(),
                single
            )?;
        }

        Ok(())
    }
}

impl SpliceIndex {
    pub fn new(bin_width: u32) -> Self {
        Self {
            bin_width: bin_width.max(1),
            chr_names: Vec::new(),
            chr_to_id: HashMap::new(),
            genes: Vec::new(),
            transcripts: Vec::new(),
            chr_buckets: Vec::new(),
        }
    }

    /// Build from a GTF/GFF3 path; `.gz` files are decompressed on the fly.
    pub fn from_path<P: AsRef<Path>>(path: P, bin_width: u32, keys: IdNameKeys) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("open annotation file {}", path.display()))?;

        let is_gz = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("gz"))
            .unwrap_or(false);

        let reader: Box<dyn BufRead> = if is_gz {
            Box::new(BufReader::new(GzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };

        let idx = SpliceIndex::new(bin_width)
            .from_reader(reader, keys)
            .with_context(|| format!("build gene model from {}", path.display()))?;
        info!(
            "loaded {} transcripts of {} genes from {}",
            idx.transcripts.len(),
            idx.genes.len(),
            path.display()
        );
        Ok(idx)
    }

    /// Load a serialized index if `path` starts with the index magic bytes,
    /// otherwise parse it as GTF/GFF3.
    pub fn open<P: AsRef<Path>>(path: P, bin_width: u32, keys: IdNameKeys) -> Result<Self> {
        let path = path.as_ref();
        let mut head = [0u8; 4];
        let n = File::open(path)
            .and_then(|mut f| f.read(&mut head))
            .with_context(|| format!("open gene model {}", path.display()))?;

        if n == MAGIC.len() && &head == MAGIC {
            debug!("{} is a serialized index", path.display());
            Self::load(path)
        } else {
            Self::from_path(path, bin_width, keys)
        }
    }

    /// Build an index directly from a GTF/GFF3 reader.
    ///
    /// Exon features are grouped by transcript key (GFF3 multi-parent exons
    /// go to every parent), transcripts are finalized (sorted/merged exons)
    /// and bucketed.
    ///
    /// ```
    /// use std::io::Cursor;
    /// use junction_annotate::index::{IdNameKeys, SpliceIndex};
    ///
    /// let gtf = "\
    /// chr1\tsrc\texon\t101\t150\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";\n\
    /// chr1\tsrc\texon\t201\t250\t.\t+\t.\tgene_id \"G1\"; transcript_id \"T1\";\n";
    ///
    /// let idx = SpliceIndex::new(100)
    ///     .from_reader(Cursor::new(gtf.as_bytes()), IdNameKeys::default())
    ///     .unwrap();
    ///
    /// assert_eq!(idx.genes.len(), 1);
    /// assert_eq!(idx.transcripts[0].exons().len(), 2);
    /// ```
    pub fn from_reader<R: BufRead>(mut self, reader: R, keys: IdNameKeys) -> Result<Self, ParseError> {
        let mut gene_key_to_id: HashMap<String, GeneId> = HashMap::new();
        let mut tx_key_to_id: HashMap<String, TranscriptId> = HashMap::new();

        for rec in AnnotationReader::new(reader).records() {
            let rec = rec?;

            if !rec.is_exon_feature(&keys.exon_feature_types) {
                continue;
            }

            let gene_key = rec.pick_first_attr(&keys.gene_id_keys).ok_or_else(|| {
                ParseError::MalformedLine {
                    line_no: rec.line_no,
                    problem: format!("missing gene id attribute (tried {:?})", keys.gene_id_keys),
                    line: format!("{}:{}-{}", rec.seqname, rec.start0 + 1, rec.end0),
                }
            })?;

            let tx_key_raw = rec
                .pick_first_attr(&keys.transcript_id_keys)
                .or_else(|| rec.pick_first_attr(&keys.parent_keys))
                .ok_or_else(|| ParseError::MalformedLine {
                    line_no: rec.line_no,
                    problem: format!(
                        "missing transcript id attribute (tried {:?} and {:?})",
                        keys.transcript_id_keys, keys.parent_keys
                    ),
                    line: format!("{}:{}-{}", rec.seqname, rec.start0 + 1, rec.end0),
                })?;

            let chr_id = self.intern_chr(&rec.seqname);
            let gene_id = self.intern_gene(&rec, &keys, &gene_key, &mut gene_key_to_id);

            for tx_key in split_gff3_parent_list(&tx_key_raw) {
                let tx_id = self.intern_tx(&rec, chr_id, gene_id, &tx_key, &mut tx_key_to_id);
                self.transcripts[tx_id].add_exon(RefBlock {
                    start: rec.start0,
                    end: rec.end0,
                });
            }
        }

        for tx in &mut self.transcripts {
            tx.finalize();
        }

        self.build_buckets();

        Ok(self)
    }

    pub fn chr_id(&self, chrom: &str) -> Option<usize> {
        self.chr_to_id.get(chrom).copied()
    }

    /// Transcripts on `chrom` whose span overlaps or abuts `[start0, end0)`,
    /// ordered by transcript id.
    pub fn transcripts_touching(&self, chrom: &str, start0: u32, end0: u32) -> Vec<&Transcript> {
        let Some(chr_id) = self.chr_id(chrom) else {
            return Vec::new();
        };
        let Some(cb) = self.chr_buckets.get(chr_id) else {
            return Vec::new();
        };

        cb.candidates(start0.saturating_sub(1), end0)
            .into_iter()
            .map(|tx_id| &self.transcripts[tx_id])
            .filter(|tx| tx.touches(start0, end0))
            .collect()
    }

    // -----------------------
    // Internal helpers
    // -----------------------

    fn intern_chr(&mut self, chr: &str) -> usize {
        if let Some(&id) = self.chr_to_id.get(chr) {
            return id;
        }
        let id = self.chr_names.len();
        self.chr_names.push(chr.to_string());
        self.chr_to_id.insert(chr.to_string(), id);
        self.chr_buckets.push(ChrBuckets::new(self.bin_width));
        id
    }

    fn intern_gene(
        &mut self,
        rec: &AnnotationRecord,
        keys: &IdNameKeys,
        gene_key: &str,
        gene_key_to_id: &mut HashMap<String, GeneId>,
    ) -> GeneId {
        let gid = match gene_key_to_id.get(gene_key) {
            Some(&gid) => gid,
            None => {
                let display = rec
                    .pick_first_attr(&keys.gene_name_keys)
                    .unwrap_or_else(|| gene_key.to_string());
                let gid = self.genes.len();
                self.genes.push(Gene::new(gid, gene_key, display));
                gene_key_to_id.insert(gene_key.to_string(), gid);
                gid
            }
        };

        let gene = &mut self.genes[gid];
        gene.add_name(gene_key);
        for k in &keys.gene_name_keys {
            if let Some(v) = rec.attr(k) {
                gene.add_name(v);
            }
        }
        gid
    }

    fn intern_tx(
        &mut self,
        rec: &AnnotationRecord,
        chr_id: usize,
        gene_id: GeneId,
        tx_key: &str,
        tx_key_to_id: &mut HashMap<String, TranscriptId>,
    ) -> TranscriptId {
        if let Some(&tid) = tx_key_to_id.get(tx_key) {
            return tid;
        }
        let tid = self.transcripts.len();
        self.transcripts
            .push(Transcript::new(tid, gene_id, tx_key, chr_id, rec.strand));
        tx_key_to_id.insert(tx_key.to_string(), tid);
        tid
    }

    fn build_buckets(&mut self) {
        for tx in &self.transcripts {
            let Some((s, e)) = tx.span() else { continue };
            self.chr_buckets[tx.chr_id].add_span(tx.id, s, e);
        }
        for cb in &mut self.chr_buckets {
            cb.finalize();
        }
    }

    /// Serialize with a small header (magic + crate version) and a bincode payload.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut f = File::create(path)?;

        f.write_all(MAGIC)?;

        let v = VERSION_STR.as_bytes();
        f.write_all(&(v.len() as u16).to_le_bytes())?;
        f.write_all(v)?;

        let payload = bincode::serialize(self)?;
        f.write_all(&payload)?;

        Ok(())
    }

    /// Load an index written by `save()`. Rejects wrong file types and version mismatches.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut f = File::open(path)?;

        let mut magic = [0u8; 4];
        f.read_exact(&mut magic)?;
        if &magic != MAGIC {
            bail!("Not a SpliceIndex file (bad magic)");
        }

        let mut len_buf = [0u8; 2];
        f.read_exact(&mut len_buf)?;
        let len = u16::from_le_bytes(len_buf) as usize;

        let mut ver_buf = vec![0u8; len];
        f.read_exact(&mut ver_buf)?;
        let file_version = std::str::from_utf8(&ver_buf)?;

        if file_version != VERSION_STR {
            bail!(
                "Index version mismatch: file={}, binary={}",
                file_version,
                VERSION_STR
            );
        }

        let mut payload = Vec::new();
        f.read_to_end(&mut payload)?;
        let idx: Self = bincode::deserialize(&payload)?;

        Ok(idx)
    }
}

impl GeneModel for SpliceIndex {
    fn transcripts_overlapping(&self, chrom: &str, start: u32, end: u32) -> Vec<TranscriptModel<'_>> {
        self.transcripts_touching(chrom, start, end)
            .into_iter()
            .map(|tx| TranscriptModel {
                id: &tx.key,
                gene: self.genes[tx.gene_id].display_name(),
                strand: tx.strand,
                exons: tx.exons(),
            })
            .collect()
    }
}

/// Split Parent= list (GFF3) by commas; also trim whitespace.
fn split_gff3_parent_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
