//! Format sniffing.
//!
//! Peeks a prefix of the input, decides whether it is BED, VCF, or
//! GTF, and hands back a reader that replays the peeked bytes followed
//! by the untouched remainder of the stream. GFF is structurally
//! identical to GTF for sniffing purposes, so it is never returned
//! here; callers that know better (e.g. from the file name) can
//! substitute it.

use std::io::{BufRead, Chain, Cursor, Read};

use crate::error::{display_line, SortError, SortResult};

/// How many lines the sniffer will read before giving up.
const SNIFF_LIMIT: usize = 50_000;

/// Formats the sorter understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Bed,
    Vcf,
    Gff,
    Gtf,
}

impl FileFormat {
    /// Zero-based key columns for this format. `-1` marks a component
    /// computed by a helper rather than parsed from a column: the end
    /// coordinate for VCF, the parent-first tie-breaker for GFF/GTF.
    pub fn columns(self, parent: bool) -> Vec<i32> {
        match self {
            FileFormat::Bed => vec![0, 1, 2],
            FileFormat::Vcf => vec![0, 1, -1],
            FileFormat::Gff | FileFormat::Gtf => {
                if parent {
                    vec![0, 3, -1, 4]
                } else {
                    vec![0, 3, 4]
                }
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FileFormat::Bed => "BED",
            FileFormat::Vcf => "VCF",
            FileFormat::Gff => "GFF",
            FileFormat::Gtf => "GTF",
        }
    }
}

/// Sniffing candidates, in priority order. GFF is absent: see the
/// module docs.
const CHECK_ORDER: [FileFormat; 2] = [FileFormat::Bed, FileFormat::Gtf];

/// True for UCSC-style `browser`/`track` header lines.
pub(crate) fn is_ucsc_header(line: &[u8]) -> bool {
    line.starts_with(b"browser") || line.starts_with(b"track")
}

/// Read up to [`SNIFF_LIMIT`] lines from the head of `input`, classify
/// the format, and return it with a reader that yields the buffered
/// bytes followed by the rest of the stream.
pub fn sniff<R: BufRead>(mut input: R) -> SortResult<(FileFormat, Chain<Cursor<Vec<u8>>, R>)> {
    let mut buffered = Vec::new();
    let mut format = None;
    let mut lines_seen = 0;

    while lines_seen < SNIFF_LIMIT {
        let start = buffered.len();
        if input.read_until(b'\n', &mut buffered)? == 0 {
            break;
        }
        lines_seen += 1;
        let line = &buffered[start..];

        if line[0] == b'#' {
            if line.starts_with(b"##fileformat=VCF") || line.starts_with(b"#CHROM\tPOS\tID") {
                format = Some(FileFormat::Vcf);
                break;
            }
            continue;
        }
        if is_ucsc_header(line) {
            continue;
        }

        let fields: Vec<&[u8]> = line.split(|&b| b == b'\t').collect();
        if fields.len() < 3 {
            return Err(SortError::TooFewColumns {
                line: display_line(line),
            });
        }
        format = CHECK_ORDER
            .iter()
            .copied()
            .find(|f| columns_look_like(*f, &fields));
        if format.is_none() {
            return Err(SortError::UnknownFormat {
                line: display_line(line),
            });
        }
        break;
    }

    match format {
        Some(format) => Ok((format, Cursor::new(buffered).chain(input))),
        // EOF or the sniff window ran out before any body line.
        None => Err(SortError::UnknownFormat {
            line: String::from("<no classifiable line found>"),
        }),
    }
}

/// Check one line against a format's column spec: every non-sentinel
/// key column past the chromosome must exist, parse as a base-10
/// integer, and form a non-decreasing sequence.
fn columns_look_like(format: FileFormat, fields: &[&[u8]]) -> bool {
    let mut last = 0i64;
    for &col in &format.columns(false)[1..] {
        if col == -1 {
            continue;
        }
        let Some(field) = fields.get(col as usize) else {
            return false;
        };
        let Some(value) = parse_trimmed_int(field) else {
            return false;
        };
        if value < last {
            return false;
        }
        last = value;
    }
    true
}

/// Base-10 parse after trimming trailing CR/LF.
fn parse_trimmed_int(field: &[u8]) -> Option<i64> {
    let mut end = field.len();
    while end > 0 && (field[end - 1] == b'\n' || field[end - 1] == b'\r') {
        end -= 1;
    }
    let text = std::str::from_utf8(&field[..end]).ok()?;
    text.parse().ok()
}
