//! K-way merge over spill files.
//!
//! Keys are not persisted to spill files; they are recomputed here as
//! lines are pulled from each decoder. Cheap to rebuild, and it keeps
//! the spill format plain sorted text.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::time::Instant;

use flate2::read::GzDecoder;
use log::info;

use crate::error::{SortError, SortResult};
use crate::key::{Key, KeyFn};
use crate::spill::SpillSet;

/// One cursor in the merge heap: the current line of a source, its
/// key, and which source to refill from.
struct HeapEntry {
    key: Key,
    line: Vec<u8>,
    source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    // Ordering on key alone; ties come off the heap in arbitrary
    // order.
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

type SpillReader = BufReader<GzDecoder<File>>;

/// Merge all spill files in `spills` into `out` in global key order.
/// Each exhausted source is unlinked as soon as it runs dry.
pub fn merge<W: Write>(spills: &SpillSet, out: &mut W, key_fn: &mut KeyFn) -> SortResult<()> {
    let start = Instant::now();
    let mut readers: Vec<SpillReader> = Vec::with_capacity(spills.len());
    let mut heap: BinaryHeap<Reverse<HeapEntry>> = BinaryHeap::with_capacity(spills.len());

    for (source, file) in spills.files().iter().enumerate() {
        let mut reader = file.open()?;
        if let Some(line) = read_line(&mut reader)? {
            heap.push(Reverse(HeapEntry {
                key: key_fn(&line)?,
                line,
                source,
            }));
        }
        readers.push(reader);
    }

    while let Some(Reverse(entry)) = heap.pop() {
        out.write_all(&entry.line)?;
        match read_line(&mut readers[entry.source])? {
            Some(line) => heap.push(Reverse(HeapEntry {
                key: key_fn(&line)?,
                line,
                source: entry.source,
            })),
            None => spills.files()[entry.source].remove(),
        }
    }

    info!(
        "merged {} spill files in {:.3}s",
        spills.len(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Stream the single spill file straight to `out`, decompressed. The
/// fast path when everything fit in one chunk.
pub fn copy_single<W: Write>(spills: &SpillSet, out: &mut W) -> SortResult<()> {
    debug_assert_eq!(spills.len(), 1);
    let mut reader = spills.files()[0].open()?;
    io::copy(&mut reader, out).map_err(SortError::Io)?;
    Ok(())
}

fn read_line(reader: &mut SpillReader) -> SortResult<Option<Vec<u8>>> {
    let mut line = Vec::new();
    match reader.read_until(b'\n', &mut line)? {
        0 => Ok(None),
        _ => Ok(Some(line)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Chunk;
    use crate::key::Key;

    // Spill pre-sorted runs and merge them back with a first-column
    // byte key.
    fn key_by_first_byte(line: &[u8]) -> SortResult<Key> {
        Ok(vec![i64::from(line[0])])
    }

    fn spill_run(spills: &mut SpillSet, lines: &[&[u8]]) {
        let mut chunk = Chunk::default();
        for (i, line) in lines.iter().enumerate() {
            chunk.append(vec![i as i64], line.to_vec());
        }
        let file = spills.create_next().unwrap();
        chunk.spill(file).unwrap();
    }

    #[test]
    fn merges_three_runs_in_key_order() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut spills = SpillSet::new(dir.path());
        spill_run(&mut spills, &[b"b\n", b"e\n"]);
        spill_run(&mut spills, &[b"a\n", b"f\n"]);
        spill_run(&mut spills, &[b"c\n", b"d\n"]);

        let mut out = Vec::new();
        merge(&spills, &mut out, &mut key_by_first_byte).unwrap();
        assert_eq!(out, b"a\nb\nc\nd\ne\nf\n");
    }

    #[test]
    fn merge_unlinks_exhausted_sources() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut spills = SpillSet::new(dir.path());
        spill_run(&mut spills, &[b"a\n"]);
        spill_run(&mut spills, &[b"b\n"]);

        let mut out = Vec::new();
        merge(&spills, &mut out, &mut key_by_first_byte).unwrap();
        for file in spills.files() {
            assert!(!file.path().exists());
        }
    }

    #[test]
    fn single_file_fast_path_streams_verbatim() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut spills = SpillSet::new(dir.path());
        spill_run(&mut spills, &[b"x\t1\n", b"y\t2\n"]);

        let mut out = Vec::new();
        copy_single(&spills, &mut out).unwrap();
        assert_eq!(out, b"x\t1\ny\t2\n");
    }
}
