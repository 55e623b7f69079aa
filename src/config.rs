//! Configuration for a sort run.

use std::env;
use std::io;
use std::path::PathBuf;

use crate::error::{SortError, SortResult};
use crate::external_sort::DEFAULT_MEMORY_MB;

/// Everything the library entry point needs to run one sort.
#[derive(Debug, Clone)]
pub struct SortConfig {
    /// Tab-delimited interval file, `-` for stdin.
    pub input: PathBuf,
    /// Genome file fixing chromosome order.
    pub genome: PathBuf,
    /// Megabytes of memory to use before spilling.
    pub memory_mb: usize,
    /// GFF/GTF parent-first tie-breaker.
    pub parent: bool,
    /// Directory for spill files.
    pub temp_dir: PathBuf,
    /// Optional chromosome rename map file.
    pub rename_chroms: Option<PathBuf>,
    /// Output file; stdout when absent.
    pub output: Option<PathBuf>,
}

impl SortConfig {
    pub fn new(input: PathBuf, genome: PathBuf) -> Self {
        SortConfig {
            input,
            genome,
            memory_mb: DEFAULT_MEMORY_MB,
            parent: false,
            temp_dir: env::temp_dir(),
            rename_chroms: None,
            output: None,
        }
    }

    /// Check the configuration before any file is touched.
    pub fn validate(&self) -> SortResult<()> {
        if self.memory_mb == 0 {
            return Err(SortError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "memory budget must be at least 1 megabyte",
            )));
        }
        if !self.temp_dir.is_dir() {
            return Err(SortError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("temp directory not found: {}", self.temp_dir.display()),
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = SortConfig::new(PathBuf::from("in.bed"), PathBuf::from("g.genome"));
        assert_eq!(config.memory_mb, 1300);
        assert!(!config.parent);
        assert!(config.output.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_memory_is_rejected() {
        let mut config = SortConfig::new(PathBuf::from("in.bed"), PathBuf::from("g.genome"));
        config.memory_mb = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_temp_dir_is_rejected() {
        let mut config = SortConfig::new(PathBuf::from("in.bed"), PathBuf::from("g.genome"));
        config.temp_dir = PathBuf::from("/definitely/not/a/dir");
        assert!(config.validate().is_err());
    }
}
