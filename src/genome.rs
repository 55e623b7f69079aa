//! Genome-file parsing.
//!
//! A genome file fixes chromosome order: each non-empty line holds a
//! chromosome name and its length, whitespace-separated. The line
//! order defines the chromosome rank used as the first key component.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use crate::error::{SortError, SortResult};
use crate::input;

/// Chromosome order and lengths from a genome file.
#[derive(Debug, Default)]
pub struct Genome {
    ranks: HashMap<Vec<u8>, i64>,
    lengths: HashMap<Vec<u8>, u64>,
    // names in rank order, for error messages
    names: Vec<String>,
}

impl Genome {
    /// Read a genome file (plain or gzipped) from `path`.
    pub fn read(path: &Path) -> SortResult<Genome> {
        let reader = input::open(path)?;
        Self::from_reader(reader, &path.display().to_string())
    }

    /// Parse genome lines from any reader. Blank lines and
    /// `#`-prefixed lines are skipped.
    pub fn from_reader<R: BufRead>(reader: R, path: &str) -> SortResult<Genome> {
        let mut genome = Genome::default();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let mut fields = trimmed.split_whitespace();
            let (name, length) = match (fields.next(), fields.next()) {
                (Some(name), Some(len)) => match len.parse::<u64>() {
                    Ok(length) => (name, length),
                    Err(_) => return Err(genome_parse(path, lineno, &line)),
                },
                _ => return Err(genome_parse(path, lineno, &line)),
            };
            let rank = genome.names.len() as i64;
            genome.ranks.insert(name.as_bytes().to_vec(), rank);
            genome.lengths.insert(name.as_bytes().to_vec(), length);
            genome.names.push(name.to_string());
        }
        Ok(genome)
    }

    /// Rank of `chrom` in the genome ordering, if known.
    pub fn rank(&self, chrom: &[u8]) -> Option<i64> {
        self.ranks.get(chrom).copied()
    }

    /// Length of `chrom`, if known.
    pub fn length(&self, chrom: &[u8]) -> Option<u64> {
        self.lengths.get(chrom).copied()
    }

    /// Chromosome names in rank order.
    pub fn names(&self) -> impl Iterator<Item = String> + '_ {
        self.names.iter().cloned()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

fn genome_parse(path: &str, lineno: usize, line: &str) -> SortError {
    SortError::FileParse {
        path: path.to_string(),
        lineno: lineno + 1,
        line: line.to_string(),
    }
}
