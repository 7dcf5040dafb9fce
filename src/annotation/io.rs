use std::collections::HashMap;
use std::io::BufRead;

use thiserror::Error;

use crate::types::Strand;

/// File dialect detected from attribute syntax.
///
/// - GFF3 typically uses: key=value;key2=value2
/// - GTF typically uses: key "value"; key2 "value2";
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Gff3,
    Gtf,
    Unknown,
}

/// One feature line of a GTF/GFF3 gene model.
///
/// Only the columns the gene model needs are kept. Coordinates are converted
/// to 0-based half-open `[start0, end0)`.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationRecord {
    pub line_no: usize,
    pub seqname: String,
    pub feature_type: String,
    pub start0: u32,
    pub end0: u32,
    pub strand: Strand,
    pub attrs: HashMap<String, String>,
    pub dialect: Dialect,
}

impl AnnotationRecord {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(|s| s.as_str())
    }

    pub fn is_exon_feature(&self, exon_types: &[String]) -> bool {
        exon_types.iter().any(|t| t == &self.feature_type)
    }

    /// First non-blank attribute among `keys`.
    pub fn pick_first_attr(&self, keys: &[String]) -> Option<String> {
        keys.iter()
            .filter_map(|k| self.attr(k))
            .map(str::trim)
            .find(|v| !v.is_empty())
            .map(str::to_string)
    }
}

/// Errors raised while reading a gene model.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("I/O error while reading '{path}': {source}")]
    IoPath {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line_no}: malformed GTF/GFF line ({problem}): {line}")]
    MalformedLine {
        line_no: usize,
        problem: String,
        line: String,
    },
    #[error("line {line_no}: bad coordinates: {line}")]
    BadCoordinates { line_no: usize, line: String },
}

/// Streaming reader for GTF/GFF3 feature lines.
///
/// Most callers want [`crate::annotation::AnnotationBuilder`], which turns the
/// whole file into a [`crate::SpliceIndex`].
///
/// ```no_run
/// use std::fs::File;
/// use std::io::BufReader;
/// use junction_annotate::annotation::io::AnnotationReader;
///
/// let file = File::open("genes.gtf").unwrap();
/// for rec in AnnotationReader::new(BufReader::new(file)).records() {
///     let rec = rec.unwrap();
///     println!("{} {}-{}", rec.seqname, rec.start0, rec.end0);
/// }
/// ```
pub struct AnnotationReader<R: BufRead> {
    reader: R,
    buf: String,
    line_no: usize,
}

impl<R: BufRead> AnnotationReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: String::new(),
            line_no: 0,
        }
    }

    /// Iterator over parsed records; blank and `#` lines are skipped.
    pub fn records(mut self) -> impl Iterator<Item = Result<AnnotationRecord, ParseError>> {
        std::iter::from_fn(move || loop {
            self.buf.clear();
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => self.line_no += 1,
                Err(e) => {
                    return Some(Err(ParseError::IoPath {
                        path: "<reader>".to_string(),
                        source: e,
                    }))
                }
            }

            let line = self.buf.trim_end_matches(&['\n', '\r'][..]);
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }

            return Some(parse_record_line(line, self.line_no));
        })
    }
}

/// Parse a single non-comment line into an `AnnotationRecord`.
pub fn parse_record_line(line: &str, line_no: usize) -> Result<AnnotationRecord, ParseError> {
    let malformed = |problem: &str| ParseError::MalformedLine {
        line_no,
        problem: problem.to_string(),
        line: line.to_string(),
    };

    // seqname source feature start end score strand phase attributes
    let cols: Vec<&str> = line.split('\t').collect();
    if cols.len() != 9 {
        return Err(malformed(&format!("expected 9 columns, found {}", cols.len())));
    }

    let bad_coords = || ParseError::BadCoordinates {
        line_no,
        line: line.to_string(),
    };
    let start_1: u32 = cols[3].parse().map_err(|_| bad_coords())?;
    let end_1: u32 = cols[4].parse().map_err(|_| bad_coords())?;
    if start_1 == 0 || end_1 < start_1 {
        return Err(bad_coords());
    }

    let strand = match cols[6] {
        "+" => Strand::Plus,
        "-" => Strand::Minus,
        "." | "?" => Strand::Unknown,
        other => return Err(malformed(&format!("invalid strand '{other}'"))),
    };

    let (dialect, attrs) = parse_attributes(cols[8]);

    Ok(AnnotationRecord {
        line_no,
        seqname: cols[0].to_string(),
        feature_type: cols[2].to_string(),
        // 1-based inclusive -> 0-based half-open
        start0: start_1 - 1,
        end0: end_1,
        strand,
        attrs,
        dialect,
    })
}

/// Parse the attributes column of either GTF or GFF3.
///
/// `=` anywhere means GFF3, quotes mean GTF; anything else is parsed
/// best-effort per field.
pub fn parse_attributes(s: &str) -> (Dialect, HashMap<String, String>) {
    let s = s.trim();

    let dialect = if s.contains('=') {
        Dialect::Gff3
    } else if s.contains('"') {
        Dialect::Gtf
    } else {
        Dialect::Unknown
    };

    let mut map = HashMap::new();
    for part in s.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let gff_style = match dialect {
            Dialect::Gff3 => true,
            Dialect::Gtf => false,
            Dialect::Unknown => part.contains('='),
        };

        let (key, value) = if gff_style {
            let mut kv = part.splitn(2, '=');
            (kv.next().unwrap_or("").trim(), kv.next().unwrap_or("").trim())
        } else {
            let mut kv = part.splitn(2, char::is_whitespace);
            (kv.next().unwrap_or("").trim(), kv.next().unwrap_or("").trim())
        };

        let value = unquote(value);
        if key.is_empty() || (!gff_style && value.is_empty()) {
            continue;
        }
        map.insert(key.to_string(), value);
    }

    (dialect, map)
}

fn unquote(v: &str) -> String {
    let v = v.trim();
    let v = v.strip_prefix('"').unwrap_or(v);
    let v = v.strip_suffix('"').unwrap_or(v);
    v.to_string()
}
