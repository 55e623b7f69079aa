//! Format-specific key builders.
//!
//! The general extractor turns a column list into a key function:
//! component 0 is the genome rank of the chromosome column, later
//! components are integer column values, and a `-1` column is filled
//! in by a helper (the end-coordinate computation for VCF, the
//! parent-first tie-breaker for GFF/GTF).

use std::collections::HashMap;
use std::sync::Arc;

use log::warn;

use crate::error::{SortError, SortResult};
use crate::genome::Genome;
use crate::key::{Key, KeyFn, HEADER_LINE};
use crate::sniff::{is_ucsc_header, FileFormat};

/// Helper filling a `-1` key slot from the preceding component and
/// the raw line.
pub type EndGetter = Box<dyn FnMut(i64, &[u8]) -> SortResult<i64> + Send>;

/// Build the key function for `format` against a genome ordering.
///
/// With `parent` set (GFF/GTF only), ties on (chromosome, start) are
/// broken so that lines declaring an `ID` precede lines referencing it
/// through `Parent=`. The tie-breaker counts IDs in the order lines
/// are seen, so its output is deterministic only while the body fits
/// in a single chunk.
pub fn key_fn_for(format: FileFormat, genome: Arc<Genome>, parent: bool) -> Box<KeyFn> {
    let use_parent = parent && matches!(format, FileFormat::Gff | FileFormat::Gtf);
    let getter: Option<EndGetter> = match format {
        FileFormat::Vcf => Some(Box::new(vcf_end)),
        FileFormat::Gff | FileFormat::Gtf if use_parent => Some(parent_getter()),
        _ => None,
    };
    key_fn_from_columns(format.columns(use_parent), genome, getter)
}

/// General extractor for an arbitrary column list.
pub fn key_fn_from_columns(
    columns: Vec<i32>,
    genome: Arc<Genome>,
    mut getter: Option<EndGetter>,
) -> Box<KeyFn> {
    // Monotone counter keeping interleaved header lines in arrival
    // order.
    let mut header_count: i64 = 0;

    Box::new(move |line: &[u8]| {
        let mut key: Key = Vec::with_capacity(columns.len());

        let chrom = field_bounds(line, columns[0] as usize).map(|(s, e)| &line[s..e]);
        let rank = chrom.and_then(|c| genome.rank(c));
        match rank {
            Some(rank) => key.push(rank),
            None => {
                if line.first() == Some(&b'#') || is_ucsc_header(line) {
                    header_count += 1;
                    return Ok(vec![HEADER_LINE, header_count]);
                }
                return Err(SortError::unknown_chromosome(
                    chrom.unwrap_or_default(),
                    genome.names(),
                ));
            }
        }

        for (i, &col) in columns.iter().enumerate().skip(1) {
            if col == -1 {
                let getter = getter
                    .as_mut()
                    .expect("column spec uses -1 without a helper");
                let value = getter(key[i - 1], line)?;
                key.push(value);
            } else {
                let (s, e) = field_bounds(line, col as usize)
                    .ok_or_else(|| SortError::missing_column(col as usize, line))?;
                key.push(parse_int(&line[s..e], col as usize, line)?);
            }
        }
        Ok(key)
    })
}

/// Byte range of tab-separated column `idx` in `line`, trimming the
/// trailing LF/CR when the column is the last on the line.
pub(crate) fn field_bounds(line: &[u8], idx: usize) -> Option<(usize, usize)> {
    let mut start = 0;
    for _ in 0..idx {
        start += line[start..].iter().position(|&b| b == b'\t')? + 1;
    }
    match line[start..].iter().position(|&b| b == b'\t') {
        Some(tab) => Some((start, start + tab)),
        None => {
            let mut end = line.len();
            while end > start && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
                end -= 1;
            }
            (end > start).then_some((start, end))
        }
    }
}

/// Integer parse on a raw column slice; tolerates a trailing CR left
/// by CR-LF input on a non-final column.
fn parse_int(field: &[u8], column: usize, line: &[u8]) -> SortResult<i64> {
    let field = match field.last() {
        Some(b'\r') => &field[..field.len() - 1],
        _ => field,
    };
    if field.is_empty() {
        return Err(SortError::invalid_integer(column, line));
    }
    let (negative, digits) = match field[0] {
        b'-' => (true, &field[1..]),
        _ => (false, field),
    };
    if digits.is_empty() {
        return Err(SortError::invalid_integer(column, line));
    }
    let mut value: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return Err(SortError::invalid_integer(column, line));
        }
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(i64::from(b - b'0')))
            .ok_or_else(|| SortError::invalid_integer(column, line))?;
    }
    Ok(if negative { -value } else { value })
}

/// ALT tokens marking a structural variant whose end lives in INFO.
const SYMBOLIC_ALTS: [&[u8]; 4] = [b"<DEL", b"<DUP", b"<INV", b"<CN"];

/// End coordinate for a VCF line.
///
/// Symbolic structural-variant alleles encode their span in INFO:
/// prefer `END=` (largest value of its comma list), then
/// `SVLEN=` (start plus the largest length), and fall back to the
/// REF length with a warning when neither is present. Everything else
/// ends at start + len(REF).
pub fn vcf_end(start: i64, line: &[u8]) -> SortResult<i64> {
    let (s, e) = field_bounds(line, 4).ok_or_else(|| SortError::missing_column(4, line))?;
    let alt = &line[s..e];

    if alt.contains(&b'<') && SYMBOLIC_ALTS.iter().any(|t| contains(alt, t)) {
        let (is_, ie) = field_bounds(line, 7).ok_or_else(|| SortError::missing_column(7, line))?;
        let info = &line[is_..ie];
        if let Some(value) = info_value(info, b"END=") {
            return max_int(value, 7, line);
        }
        if let Some(value) = info_value(info, b"SVLEN=") {
            let svlen = max_int(value, 7, line)?;
            return Ok(start + svlen);
        }
        warn!(
            "can't find END= or SVLEN= for: {}",
            crate::error::display_line(line)
        );
    }
    let (rs, re) = field_bounds(line, 3).ok_or_else(|| SortError::missing_column(3, line))?;
    Ok(start + (re - rs) as i64)
}

/// Parent-first tie-breaker for GFF/GTF.
///
/// Lines with neither `ID=` nor `Parent=` get 0. Each new `ID` is
/// assigned a counter starting at 2; a line with `Parent=X` gets X's
/// counter when known, else 1. Among ties on (chromosome, start),
/// declarations therefore precede their references.
pub fn parent_getter() -> EndGetter {
    let mut seen: HashMap<Vec<u8>, i64> = HashMap::with_capacity(32);
    let mut next: i64 = 2;
    Box::new(move |_start, line| {
        // ID= only counts at an attribute boundary; Parent= is rare
        // enough mid-attribute that a plain substring search matches
        // the formats in the wild.
        let id = find(line, b"\tID=").or_else(|| find(line, b";ID="));
        if let Some(pos) = id {
            let value = attr_value(&line[pos + 4..]);
            seen.entry(value.to_vec()).or_insert_with(|| {
                let counter = next;
                next += 1;
                counter
            });
        }
        if let Some(pos) = find(line, b"Parent=") {
            let value = attr_value(&line[pos + 7..]);
            return Ok(seen.get(value).copied().unwrap_or(1));
        }
        Ok(0)
    })
}

/// Attribute value: everything up to the next `;` or the end of line.
fn attr_value(rest: &[u8]) -> &[u8] {
    let mut end = rest
        .iter()
        .position(|&b| b == b';')
        .unwrap_or(rest.len());
    while end > 0 && (rest[end - 1] == b'\n' || rest[end - 1] == b'\r') {
        end -= 1;
    }
    &rest[..end]
}

/// Value of `key` inside a semicolon-delimited INFO field, if present.
/// A substring match, as the coordinate conventions expect.
fn info_value<'a>(info: &'a [u8], key: &[u8]) -> Option<&'a [u8]> {
    let pos = find(info, key)?;
    Some(attr_value(&info[pos + key.len()..]))
}

/// Largest integer in a comma-separated list.
fn max_int(value: &[u8], column: usize, line: &[u8]) -> SortResult<i64> {
    value
        .split(|&b| b == b',')
        .map(|v| parse_int(v, column, line))
        .try_fold(i64::MIN, |acc, v| v.map(|v| acc.max(v)))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    find(haystack, needle).is_some()
}
