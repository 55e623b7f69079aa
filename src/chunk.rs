//! In-memory chunk store.
//!
//! A chunk holds the lines of one sorted run together with their
//! extracted keys, so nothing is re-parsed between sorting and
//! spilling.

use std::io::{self, BufWriter, Write};

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::key::Key;

/// Buffer in front of the spill encoder.
const SPILL_BUFFER_SIZE: usize = 64 * 1024;

/// An ordered buffer of `(key, line)` pairs, sortable in place by key.
#[derive(Default)]
pub struct Chunk {
    entries: Vec<(Key, Vec<u8>)>,
}

impl Chunk {
    pub fn with_capacity(capacity: usize) -> Self {
        Chunk {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Append in arrival order.
    pub fn append(&mut self, key: Key, line: Vec<u8>) {
        self.entries.push((key, line));
    }

    /// Order entries by key, lexicographic on components. Unstable:
    /// equal keys may be reordered.
    pub fn sort(&mut self) {
        self.entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
    }

    /// Write all lines in current order through a gzip encoder at the
    /// fastest compression level, then clear the chunk.
    pub fn spill<W: Write>(&mut self, writer: W) -> io::Result<()> {
        let encoder = GzEncoder::new(writer, Compression::fast());
        let mut out = BufWriter::with_capacity(SPILL_BUFFER_SIZE, encoder);
        for (_, line) in &self.entries {
            out.write_all(line)?;
        }
        out.into_inner()
            .map_err(|e| e.into_error())?
            .finish()?
            .flush()?;
        self.entries.clear();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn lines(&self) -> impl Iterator<Item = &[u8]> {
        self.entries.iter().map(|(_, line)| line.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn sorts_by_key_not_by_bytes() {
        let mut chunk = Chunk::default();
        chunk.append(vec![1, 10], b"b\t10\n".to_vec());
        chunk.append(vec![0, 99], b"a\t99\n".to_vec());
        chunk.append(vec![0, 5], b"a\t5\n".to_vec());
        chunk.sort();
        let lines: Vec<&[u8]> = chunk.lines().collect();
        assert_eq!(lines, vec![&b"a\t5\n"[..], b"a\t99\n", b"b\t10\n"]);
    }

    #[test]
    fn short_circuits_on_first_differing_component() {
        let mut chunk = Chunk::default();
        chunk.append(vec![2, 0, 0], b"x\n".to_vec());
        chunk.append(vec![1, 9, 9], b"y\n".to_vec());
        chunk.sort();
        let lines: Vec<&[u8]> = chunk.lines().collect();
        assert_eq!(lines, vec![&b"y\n"[..], b"x\n"]);
    }

    #[test]
    fn spill_round_trips_through_gzip() {
        let mut chunk = Chunk::with_capacity(2);
        chunk.append(vec![0], b"first\n".to_vec());
        chunk.append(vec![1], b"second\n".to_vec());
        chunk.sort();

        let mut compressed = Vec::new();
        chunk.spill(&mut compressed).unwrap();
        assert!(chunk.is_empty());

        let mut text = String::new();
        GzDecoder::new(&compressed[..])
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "first\nsecond\n");
    }
}
