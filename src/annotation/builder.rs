use std::io::BufRead;
use std::path::Path;

use crate::annotation::io::ParseError;
use crate::index::{IdNameKeys, SpliceIndex};

/// Builder for the gene model used by the junction annotator.
///
/// Holds the bucket width and the attribute keys used to pull gene and
/// transcript identifiers out of GTF/GFF3 attributes.
#[derive(Debug, Clone)]
pub struct AnnotationBuilder {
    pub bin_width: u32,
    pub keys: IdNameKeys,
}

fn owned(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|s| s.to_string()).collect()
}

impl AnnotationBuilder {
    /// Defaults that work for GENCODE/Ensembl GTF and most GFF3 files.
    pub fn new(bin_width: u32) -> Self {
        Self {
            bin_width,
            keys: IdNameKeys::default(),
        }
    }

    /// Gene id key(s), first present wins.
    pub fn gene_id_keys(mut self, keys: &[&str]) -> Self {
        self.keys.gene_id_keys = owned(keys);
        self
    }

    /// Gene display-name key(s); the first one found is what junction output reports.
    pub fn gene_name_keys(mut self, keys: &[&str]) -> Self {
        self.keys.gene_name_keys = owned(keys);
        self
    }

    pub fn transcript_id_keys(mut self, keys: &[&str]) -> Self {
        self.keys.transcript_id_keys = owned(keys);
        self
    }

    /// GFF3 exon -> transcript linking keys (usually `Parent`).
    pub fn parent_keys(mut self, keys: &[&str]) -> Self {
        self.keys.parent_keys = owned(keys);
        self
    }

    /// Feature types taken as exon blocks.
    pub fn exon_feature_types(mut self, types: &[&str]) -> Self {
        self.keys.exon_feature_types = owned(types);
        self
    }

    /// Replace all keys at once.
    pub fn keys(mut self, keys: IdNameKeys) -> Self {
        self.keys = keys;
        self
    }

    pub fn build_from_reader<R: BufRead>(&self, reader: R) -> Result<SpliceIndex, ParseError> {
        SpliceIndex::new(self.bin_width).from_reader(reader, self.keys.clone())
    }

    /// Parse a GTF/GFF3 file (`.gz` allowed).
    pub fn build_from_path<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<SpliceIndex> {
        SpliceIndex::from_path(path, self.bin_width, self.keys.clone())
    }

    /// Load a serialized index, or parse the file as GTF/GFF3 if it is not one.
    pub fn open<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<SpliceIndex> {
        SpliceIndex::open(path, self.bin_width, self.keys.clone())
    }
}
