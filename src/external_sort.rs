//! The sort driver.
//!
//! Reads lines from the input, copies leading `#` header lines to the
//! output verbatim, accumulates body lines into chunks under a memory
//! budget, hands closed chunks to a spill worker over a bounded
//! channel, and finishes by streaming the single spill file (fast
//! path) or k-way merging all of them.

use std::collections::{HashMap, HashSet};
use std::env;
use std::io::{BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;

use crossbeam_channel::{bounded, Sender};
use log::{debug, warn};

use crate::chunk::Chunk;
use crate::error::{SortError, SortResult};
use crate::key::KeyFn;
use crate::merge;
use crate::spill::SpillSet;

/// Default memory budget in megabytes before spilling.
pub const DEFAULT_MEMORY_MB: usize = 1300;

/// Share of the budget available to buffered body lines. The rest
/// absorbs key vectors and the gzip encoder of the chunk being
/// spilled concurrently.
const MEM_HEADROOM: f64 = 0.7;

/// Once the first chunk has been handed off, compression of the
/// previous chunk keeps extra memory resident; the threshold shrinks
/// by this divisor to protect against overshoot.
const POST_SPILL_SHRINK: usize = 3;

/// Map from original to replacement chromosome names, applied to each
/// body line before key extraction.
pub type RenameMap = HashMap<Vec<u8>, Vec<u8>>;

/// External merge sorter over LF-terminated lines.
pub struct ExternalSorter {
    memory_bytes: usize,
    temp_dir: PathBuf,
    rename: Option<RenameMap>,
}

impl Default for ExternalSorter {
    fn default() -> Self {
        Self::new()
    }
}

impl ExternalSorter {
    pub fn new() -> Self {
        ExternalSorter {
            memory_bytes: DEFAULT_MEMORY_MB * 1_000_000,
            temp_dir: env::temp_dir(),
            rename: None,
        }
    }

    /// Set the memory budget in megabytes.
    pub fn memory_mb(mut self, mb: usize) -> Self {
        self.memory_bytes = mb * 1_000_000;
        self
    }

    /// Set the memory budget in bytes. Mostly useful for exercising
    /// the spill path on small inputs.
    pub fn memory_bytes(mut self, bytes: usize) -> Self {
        self.memory_bytes = bytes;
        self
    }

    /// Directory for spill files.
    pub fn temp_dir(mut self, dir: &Path) -> Self {
        self.temp_dir = dir.to_path_buf();
        self
    }

    /// Rename chromosomes before key extraction. Lines whose name has
    /// no mapping pass through unchanged, with one warning per name.
    pub fn rename_chroms(mut self, map: RenameMap) -> Self {
        self.rename = Some(map);
        self
    }

    /// Sort `input` into `output` using `key_fn` to order lines.
    ///
    /// Leading `#` lines are copied through verbatim before any body
    /// line is read. Body lines are emitted in key order; ties may be
    /// reordered.
    pub fn sort<R: BufRead, W: Write>(
        &self,
        mut input: R,
        output: W,
        key_fn: &mut KeyFn,
    ) -> SortResult<()> {
        let mut out = BufWriter::new(output);
        if !copy_header(&mut input, &mut out)? {
            // Nothing after the header block.
            out.flush()?;
            return Ok(());
        }

        let mut spills = SpillSet::new(&self.temp_dir);
        let worker_key_fn = &mut *key_fn;
        let spill_ref = &mut spills;
        thread::scope(|scope| -> SortResult<()> {
            let (tx, rx) = bounded::<Vec<Vec<u8>>>(1);
            let worker = scope.spawn(move || -> SortResult<()> {
                for lines in rx.iter() {
                    spill_chunk(lines, worker_key_fn, spill_ref)?;
                }
                Ok(())
            });
            let read_result = self.read_chunks(&mut input, &tx);
            drop(tx);
            let worker_result = worker
                .join()
                .map_err(|_| SortError::worker_failed("spill worker panicked"))?;
            // A failed worker also breaks the reader's send; report
            // the root cause.
            worker_result?;
            read_result
        })?;

        match spills.len() {
            0 => {}
            1 => merge::copy_single(&spills, &mut out)?,
            _ => merge::merge(&spills, &mut out, key_fn)?,
        }
        out.flush()?;
        Ok(())
    }

    /// Accumulate lines into chunks under the byte budget and hand
    /// each closed chunk to the spill worker.
    fn read_chunks<R: BufRead>(&self, input: &mut R, tx: &Sender<Vec<Vec<u8>>>) -> SortResult<()> {
        let mut threshold = (self.memory_bytes as f64 * MEM_HEADROOM) as usize;
        let mut lines: Vec<Vec<u8>> = Vec::new();
        let mut sum = 0usize;
        let mut spilled = false;
        let mut warned: HashSet<Vec<u8>> = HashSet::new();

        loop {
            let mut line = Vec::new();
            if input.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            // Only the final line of the input can lack a terminator.
            if line.last() != Some(&b'\n') {
                line.push(b'\n');
            }
            if let Some(renames) = &self.rename {
                line = apply_rename(line, renames, &mut warned);
            }
            sum += line.len();
            lines.push(line);

            if sum >= threshold {
                debug!("closing chunk: {} lines, {} bytes", lines.len(), sum);
                if tx.send(std::mem::take(&mut lines)).is_err() {
                    // Worker is gone; its error is reported by the
                    // caller.
                    return Ok(());
                }
                if !spilled {
                    threshold /= POST_SPILL_SHRINK;
                    spilled = true;
                }
                sum = 0;
            }
        }
        if !lines.is_empty() {
            let _ = tx.send(lines);
        }
        Ok(())
    }
}

/// Copy leading `#` lines to the output. Returns false when the input
/// is exhausted (header-only or empty input).
fn copy_header<R: BufRead, W: Write>(input: &mut R, out: &mut W) -> SortResult<bool> {
    loop {
        match input.fill_buf()?.first().copied() {
            None => return Ok(false),
            Some(b'#') => {
                let mut line = Vec::new();
                input.read_until(b'\n', &mut line)?;
                out.write_all(&line)?;
            }
            Some(_) => return Ok(true),
        }
    }
}

/// Replace the pre-tab chromosome name through the rename map,
/// warning once per unmapped name.
fn apply_rename(line: Vec<u8>, renames: &RenameMap, warned: &mut HashSet<Vec<u8>>) -> Vec<u8> {
    let Some(tab) = line.iter().position(|&b| b == b'\t') else {
        return line;
    };
    match renames.get(&line[..tab]) {
        Some(new_name) => {
            let mut renamed = Vec::with_capacity(new_name.len() + line.len() - tab);
            renamed.extend_from_slice(new_name);
            renamed.extend_from_slice(&line[tab..]);
            renamed
        }
        None => {
            if warned.insert(line[..tab].to_vec()) {
                warn!(
                    "could not find mapping for chromosome: {}",
                    String::from_utf8_lossy(&line[..tab])
                );
            }
            line
        }
    }
}

/// Key, sort, and spill one closed chunk.
fn spill_chunk(lines: Vec<Vec<u8>>, key_fn: &mut KeyFn, spills: &mut SpillSet) -> SortResult<()> {
    let mut chunk = Chunk::with_capacity(lines.len());
    for line in lines {
        let key = key_fn(&line)?;
        chunk.append(key, line);
    }
    chunk.sort();
    let file = spills.create_next()?;
    chunk.spill(file)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Key;
    use std::io::Cursor;

    // First column's first byte, then the numeric second column.
    fn byte_then_number(line: &[u8]) -> SortResult<Key> {
        let tab = line.iter().position(|&b| b == b'\t').unwrap();
        let num: i64 = std::str::from_utf8(&line[tab + 1..])
            .unwrap()
            .trim_end()
            .parse()
            .unwrap();
        Ok(vec![i64::from(line[0]), num])
    }

    // Numeric second column first, then the first byte negated.
    fn number_then_reverse_byte(line: &[u8]) -> SortResult<Key> {
        let tab = line.iter().position(|&b| b == b'\t').unwrap();
        let num: i64 = std::str::from_utf8(&line[tab + 1..])
            .unwrap()
            .trim_end()
            .parse()
            .unwrap();
        Ok(vec![num, -i64::from(line[0])])
    }

    fn sort_with(
        sorter: &ExternalSorter,
        input: &[u8],
        key_fn: &mut KeyFn,
    ) -> Vec<u8> {
        let mut out = Vec::new();
        sorter.sort(Cursor::new(input), &mut out, key_fn).unwrap();
        out
    }

    #[test]
    fn sorts_by_two_component_key() {
        let dir = tempfile::TempDir::new().unwrap();
        let sorter = ExternalSorter::new().memory_mb(22).temp_dir(dir.path());
        let out = sort_with(&sorter, b"a\t1\nb\t2\na\t3\n", &mut byte_then_number);
        assert_eq!(out, b"a\t1\na\t3\nb\t2\n");
    }

    #[test]
    fn negative_components_reverse_order() {
        let dir = tempfile::TempDir::new().unwrap();
        let sorter = ExternalSorter::new().memory_mb(22).temp_dir(dir.path());
        let out = sort_with(
            &sorter,
            b"a\t1\nb\t2\na\t3\ng\t1\n",
            &mut number_then_reverse_byte,
        );
        assert_eq!(out, b"g\t1\na\t1\nb\t2\na\t3\n");
    }

    #[test]
    fn appends_newline_to_final_line() {
        let dir = tempfile::TempDir::new().unwrap();
        let sorter = ExternalSorter::new().memory_mb(22).temp_dir(dir.path());
        let out = sort_with(&sorter, b"b\t2\na\t1", &mut byte_then_number);
        assert_eq!(out, b"a\t1\nb\t2\n");
    }

    #[test]
    fn merge_path_matches_fast_path() {
        let input = b"e\t5\nc\t3\na\t1\nd\t4\nb\t2\nf\t6\n";
        let dir = tempfile::TempDir::new().unwrap();

        let one_chunk = ExternalSorter::new().memory_mb(22).temp_dir(dir.path());
        let fast = sort_with(&one_chunk, input, &mut byte_then_number);

        // A budget of a few bytes closes a chunk after every line.
        let many_chunks = ExternalSorter::new().memory_bytes(6).temp_dir(dir.path());
        let merged = sort_with(&many_chunks, input, &mut byte_then_number);

        assert_eq!(fast, merged);
        assert_eq!(fast, b"a\t1\nb\t2\nc\t3\nd\t4\ne\t5\nf\t6\n");
    }

    #[test]
    fn leading_hash_lines_pass_through_first() {
        let dir = tempfile::TempDir::new().unwrap();
        let sorter = ExternalSorter::new().memory_mb(22).temp_dir(dir.path());
        let out = sort_with(
            &sorter,
            b"#h1\n#h2\nb\t2\na\t1\n",
            &mut byte_then_number,
        );
        assert_eq!(out, b"#h1\n#h2\na\t1\nb\t2\n");
    }

    #[test]
    fn header_only_input_is_copied_verbatim() {
        let dir = tempfile::TempDir::new().unwrap();
        let sorter = ExternalSorter::new().memory_mb(22).temp_dir(dir.path());
        let out = sort_with(&sorter, b"#only\n#headers\n", &mut byte_then_number);
        assert_eq!(out, b"#only\n#headers\n");
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let sorter = ExternalSorter::new().memory_mb(22).temp_dir(dir.path());
        let out = sort_with(&sorter, b"", &mut byte_then_number);
        assert_eq!(out, b"");
    }

    #[test]
    fn no_spill_files_survive_a_sort() {
        let dir = tempfile::TempDir::new().unwrap();
        let sorter = ExternalSorter::new().memory_bytes(6).temp_dir(dir.path());
        sort_with(&sorter, b"c\t3\na\t1\nb\t2\n", &mut byte_then_number);
        let leftover = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftover, 0);
    }

    #[test]
    fn extractor_errors_abort_the_sort() {
        let dir = tempfile::TempDir::new().unwrap();
        let sorter = ExternalSorter::new().memory_mb(22).temp_dir(dir.path());
        let mut failing = |_line: &[u8]| -> SortResult<Key> {
            Err(SortError::worker_failed("boom"))
        };
        let mut out = Vec::new();
        let err = sorter
            .sort(Cursor::new(&b"a\t1\n"[..]), &mut out, &mut failing)
            .unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn rename_map_rewrites_first_column() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut map = RenameMap::new();
        map.insert(b"a".to_vec(), b"z".to_vec());
        let sorter = ExternalSorter::new()
            .memory_mb(22)
            .temp_dir(dir.path())
            .rename_chroms(map);
        let out = sort_with(&sorter, b"a\t2\nb\t1\n", &mut byte_then_number);
        assert_eq!(out, b"b\t1\nz\t2\n");
    }
}
