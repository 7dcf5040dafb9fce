use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use thiserror::Error;

use crate::junctions::record::{AnnotatedJunction, Junction};
use crate::types::Strand;

/// Errors raised by the junction source.
#[derive(Debug, Error)]
pub enum JunctionError {
    #[error("I/O error while reading junctions from '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("junctions line {line_no}: {problem}: {line}")]
    Malformed {
        line_no: usize,
        problem: String,
        line: String,
    },
}

/// Streaming reader for BED6/BED12 junction files.
///
/// BED12 lines (the layout junction extractors emit, with the anchoring read
/// blocks on both sides) are trimmed to the intron using the first and last
/// block sizes. BED6 lines are taken as the intron already.
///
/// ```no_run
/// use junction_annotate::junctions::io::JunctionReader;
///
/// for j in JunctionReader::from_path("junctions.bed").unwrap().records() {
///     let j = j.unwrap();
///     println!("{}:{}-{}", j.chrom, j.start, j.end);
/// }
/// ```
pub struct JunctionReader<R: BufRead> {
    reader: R,
    source: String,
    buf: String,
    line_no: usize,
}

impl JunctionReader<Box<dyn BufRead>> {
    /// Open a junction file; `.gz` is decompressed on the fly.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, JunctionError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| JunctionError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        let is_gz = path.extension().map(|e| e == "gz").unwrap_or(false);
        let reader: Box<dyn BufRead> = if is_gz {
            Box::new(BufReader::new(GzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };

        Ok(Self::with_source(reader, path.display().to_string()))
    }
}

impl<R: BufRead> JunctionReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_source(reader, "<reader>".to_string())
    }

    fn with_source(reader: R, source: String) -> Self {
        Self {
            reader,
            source,
            buf: String::new(),
            line_no: 0,
        }
    }

    /// Read the next junction; `Ok(None)` at end of input.
    pub fn read_junction(&mut self) -> Result<Option<Junction>, JunctionError> {
        loop {
            self.buf.clear();
            let n = self.reader.read_line(&mut self.buf).map_err(|e| JunctionError::Io {
                path: self.source.clone(),
                source: e,
            })?;
            if n == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let line = self.buf.trim_end_matches(&['\n', '\r'][..]);
            if line.trim().is_empty()
                || line.starts_with('#')
                || line.starts_with("track")
                || line.starts_with("browser")
            {
                continue;
            }

            return parse_junction_line(line, self.line_no).map(Some);
        }
    }

    /// Iterator over junctions, stopping after the first error.
    pub fn records(mut self) -> impl Iterator<Item = Result<Junction, JunctionError>> {
        let mut failed = false;
        std::iter::from_fn(move || {
            if failed {
                return None;
            }
            let next = self.read_junction().transpose();
            failed = matches!(next, Some(Err(_)));
            next
        })
    }
}

/// Parse one BED6/BED12 line into an intron-spanning [`Junction`].
pub fn parse_junction_line(line: &str, line_no: usize) -> Result<Junction, JunctionError> {
    let malformed = |problem: String| JunctionError::Malformed {
        line_no,
        problem,
        line: line.to_string(),
    };

    let cols: Vec<&str> = line.split('\t').collect();
    if cols.len() < 6 {
        return Err(malformed(format!("expected at least 6 columns, found {}", cols.len())));
    }

    let start: u32 = cols[1]
        .trim()
        .parse()
        .map_err(|_| malformed(format!("bad start '{}'", cols[1])))?;
    let end: u32 = cols[2]
        .trim()
        .parse()
        .map_err(|_| malformed(format!("bad end '{}'", cols[2])))?;

    let mut junction = Junction {
        chrom: cols[0].to_string(),
        start,
        end,
        name: cols[3].to_string(),
        score: cols[4].to_string(),
        strand: Strand::from_symbol(cols[5]),
        fields: cols[6..].iter().map(|s| s.to_string()).collect(),
    };

    if cols.len() >= 12 {
        adjust_junction_ends(&mut junction, cols[10]).map_err(malformed)?;
    }

    if junction.end == u32::MAX {
        return Err(malformed(format!("junction end {} out of range", junction.end)));
    }
    if junction.start >= junction.end {
        return Err(malformed(format!(
            "empty junction interval [{}, {})",
            junction.start, junction.end
        )));
    }

    Ok(junction)
}

/// Trim a BED12 junction to its intron: drop the first block from the start
/// and the last block from the end.
pub fn adjust_junction_ends(junction: &mut Junction, block_sizes: &str) -> Result<(), String> {
    let sizes = block_sizes
        .trim_end_matches(',')
        .split(',')
        .map(|s| s.trim().parse::<u32>())
        .collect::<Result<Vec<u32>, _>>()
        .map_err(|_| format!("bad blockSizes '{block_sizes}'"))?;

    let (Some(&first), Some(&last)) = (sizes.first(), sizes.last()) else {
        return Err("empty blockSizes".to_string());
    };

    junction.start = junction
        .start
        .checked_add(first)
        .ok_or_else(|| "blockSizes overflow".to_string())?;
    junction.end = junction
        .end
        .checked_sub(last)
        .ok_or_else(|| format!("last block of {last} bp exceeds junction end"))?;
    Ok(())
}

/// Tab-separated writer for annotated junctions.
pub struct JunctionWriter<W: Write> {
    out: W,
    with_variant_info: bool,
    header_written: bool,
}

impl<W: Write> JunctionWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            with_variant_info: false,
            header_written: false,
        }
    }

    /// Append the `variant_info` column to the header and every row.
    pub fn with_variant_info(mut self, yes: bool) -> Self {
        self.with_variant_info = yes;
        self
    }

    /// Write one row, preceded by the header on the first call.
    pub fn write(&mut self, rec: &AnnotatedJunction) -> io::Result<()> {
        self.write_header()?;
        rec.write_row(&mut self.out, self.with_variant_info)
    }

    /// Write the header if it has not been written yet.
    pub fn write_header(&mut self) -> io::Result<()> {
        if !self.header_written {
            AnnotatedJunction::write_header(&mut self.out, self.with_variant_info)?;
            self.header_written = true;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
