//! Reference bases for splice-site annotation.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use noodles::core::{Position, Region};
use noodles::fasta::fai::io::Reader as FaiReader;
use noodles::fasta::io::indexed_reader::{Builder as FastaBuilder, IndexedReader};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("unknown chromosome '{0}'")]
    UnknownChromosome(String),
    #[error("{chrom}:{start}-{end} is out of range")]
    OutOfRange { chrom: String, start: u32, end: u32 },
    #[error("invalid range {start}-{end} (1-based, inclusive)")]
    InvalidRange { start: u32, end: u32 },
    #[error("reading '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Forward-strand reference bases.
pub trait SequenceProvider {
    /// Bases of `chrom` over 1-based inclusive `[start, end]`, upper-cased.
    fn bases_at(&mut self, chrom: &str, start: u32, end: u32) -> Result<String, SequenceError>;
}

fn check_range(start: u32, end: u32) -> Result<(), SequenceError> {
    if start == 0 || end < start {
        return Err(SequenceError::InvalidRange { start, end });
    }
    Ok(())
}

/// Chromosome name -> sequence, held in memory.
impl SequenceProvider for HashMap<String, Vec<u8>> {
    fn bases_at(&mut self, chrom: &str, start: u32, end: u32) -> Result<String, SequenceError> {
        check_range(start, end)?;
        let seq = self
            .get(chrom)
            .ok_or_else(|| SequenceError::UnknownChromosome(chrom.to_string()))?;
        let window = seq
            .get(start as usize - 1..end as usize)
            .ok_or_else(|| SequenceError::OutOfRange {
                chrom: chrom.to_string(),
                start,
                end,
            })?;
        Ok(String::from_utf8_lossy(window).to_ascii_uppercase())
    }
}

/// Indexed FASTA reference (`<path>.fai` must exist, e.g. from `samtools faidx`).
pub struct FastaSequences {
    path: PathBuf,
    lengths: HashMap<String, u64>,
    reader: IndexedReader<BufReader<File>>,
}

impl FastaSequences {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SequenceError> {
        let path = path.as_ref();
        let io_err = |p: &Path, source: io::Error| SequenceError::Io {
            path: p.display().to_string(),
            source,
        };

        let mut fai_path = path.as_os_str().to_owned();
        fai_path.push(".fai");
        let fai_path = PathBuf::from(fai_path);

        let index = File::open(&fai_path)
            .map(BufReader::new)
            .and_then(|r| FaiReader::new(r).read_index())
            .map_err(|e| io_err(fai_path.as_path(), e))?;

        let lengths = index
            .as_ref()
            .iter()
            .map(|r| (String::from_utf8_lossy(&r.name().to_vec()).into_owned(), r.length()))
            .collect();

        let fasta = File::open(path).map_err(|e| io_err(path, e))?;
        let reader = FastaBuilder::default()
            .set_index(index)
            .build_from_reader(BufReader::new(fasta))
            .map_err(|e| io_err(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            lengths,
            reader,
        })
    }
}

impl SequenceProvider for FastaSequences {
    fn bases_at(&mut self, chrom: &str, start: u32, end: u32) -> Result<String, SequenceError> {
        check_range(start, end)?;
        let out_of_range = || SequenceError::OutOfRange {
            chrom: chrom.to_string(),
            start,
            end,
        };

        let len = *self
            .lengths
            .get(chrom)
            .ok_or_else(|| SequenceError::UnknownChromosome(chrom.to_string()))?;
        if u64::from(end) > len {
            return Err(out_of_range());
        }

        let from = Position::new(start as usize).ok_or_else(out_of_range)?;
        let to = Position::new(end as usize).ok_or_else(out_of_range)?;
        let region = Region::new(chrom, from..=to);

        let record = self.reader.query(&region).map_err(|e| SequenceError::Io {
            path: self.path.display().to_string(),
            source: e,
        })?;

        let bases = record.sequence().as_ref();
        if bases.len() != (end - start + 1) as usize {
            return Err(out_of_range());
        }
        Ok(String::from_utf8_lossy(bases).to_ascii_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> HashMap<String, Vec<u8>> {
        let mut m = HashMap::new();
        m.insert("chr1".to_string(), b"acgtACGTNN".to_vec());
        m
    }

    #[test]
    fn in_memory_windows_are_one_based_inclusive() {
        let mut r = reference();
        assert_eq!(r.bases_at("chr1", 1, 2).unwrap(), "AC");
        assert_eq!(r.bases_at("chr1", 5, 8).unwrap(), "ACGT");
        assert_eq!(r.bases_at("chr1", 10, 10).unwrap(), "N");
    }

    #[test]
    fn in_memory_errors_are_distinct() {
        let mut r = reference();
        assert!(matches!(r.bases_at("chrX", 1, 2), Err(SequenceError::UnknownChromosome(_))));
        assert!(matches!(r.bases_at("chr1", 9, 11), Err(SequenceError::OutOfRange { .. })));
        assert!(matches!(r.bases_at("chr1", 0, 2), Err(SequenceError::InvalidRange { .. })));
        assert!(matches!(r.bases_at("chr1", 4, 3), Err(SequenceError::InvalidRange { .. })));
    }

    #[test]
    fn fasta_without_index_fails_to_open() {
        let dir = std::env::temp_dir().join(format!("junction_annotate_fa_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let fa = dir.join("ref.fa");
        std::fs::write(&fa, ">chr1\nACGT\n").unwrap();

        assert!(matches!(FastaSequences::open(&fa), Err(SequenceError::Io { .. })));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn fasta_query_through_fai() {
        let dir = std::env::temp_dir().join(format!("junction_annotate_fai_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let fa = dir.join("ref.fa");
        std::fs::write(&fa, ">chr1\nACGTACGTAA\nCCGGTTAAGT\n").unwrap();
        std::fs::write(dir.join("ref.fa.fai"), "chr1\t20\t6\t10\t11\n").unwrap();

        let mut seqs = FastaSequences::open(&fa).unwrap();
        assert_eq!(seqs.bases_at("chr1", 1, 4).unwrap(), "ACGT");
        assert_eq!(seqs.bases_at("chr1", 10, 12).unwrap(), "ACC");
        assert!(matches!(seqs.bases_at("chrZ", 1, 2), Err(SequenceError::UnknownChromosome(_))));
        assert!(matches!(seqs.bases_at("chr1", 19, 21), Err(SequenceError::OutOfRange { .. })));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
