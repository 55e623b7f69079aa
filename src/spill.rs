//! Spill-file naming, creation, and cleanup.
//!
//! Every spill file is named `gsort.<pid>.<index>.<rand>` so that any
//! file this process created can be found again by prefix, which is
//! what makes cleanup after a signal possible.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use std::process;

use flate2::read::GzDecoder;
use log::{debug, warn};
use rand::distributions::Alphanumeric;
use rand::Rng;
use signal_hook::consts::{SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;

use crate::error::SortResult;

/// Buffer in front of each spill decoder during merge.
const SPILL_READ_BUFFER: usize = 64 * 1024;

/// Filename prefix shared by all spill files of this process.
pub fn process_prefix() -> String {
    format!("gsort.{}.", process::id())
}

/// One gzip-compressed sorted run on disk.
#[derive(Debug)]
pub struct SpillFile {
    path: PathBuf,
}

impl SpillFile {
    /// Open the spill for reading through a gzip decoder.
    pub fn open(&self) -> SortResult<BufReader<GzDecoder<File>>> {
        let file = File::open(&self.path)?;
        Ok(BufReader::with_capacity(
            SPILL_READ_BUFFER,
            GzDecoder::new(file),
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unlink the file. Missing files are not an error: the merge
    /// removes exhausted sources and the owning set removes the rest.
    pub fn remove(&self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                warn!("could not remove spill file {}: {}", self.path.display(), e);
            }
        }
    }
}

/// The set of spill files owned by one sort. Dropping the set unlinks
/// whatever is still on disk, so fatal errors cannot leak temp files.
pub struct SpillSet {
    dir: PathBuf,
    files: Vec<SpillFile>,
}

impl SpillSet {
    pub fn new(dir: &Path) -> Self {
        SpillSet {
            dir: dir.to_path_buf(),
            files: Vec::new(),
        }
    }

    /// Create the next spill file and return a handle to write it.
    pub fn create_next(&mut self) -> SortResult<File> {
        let prefix = process_prefix();
        loop {
            let suffix: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(6)
                .map(char::from)
                .collect();
            let path = self
                .dir
                .join(format!("{}{}.{}", prefix, self.files.len(), suffix));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    debug!("spilling chunk to {}", path.display());
                    self.files.push(SpillFile { path });
                    return Ok(file);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files(&self) -> &[SpillFile] {
        &self.files
    }
}

impl Drop for SpillSet {
    fn drop(&mut self) {
        for file in &self.files {
            file.remove();
        }
    }
}

/// Remove every spill file in `dir` matching `prefix`.
fn remove_matching(dir: &Path, prefix: &str) -> usize {
    let mut removed = 0;
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with(prefix) && fs::remove_file(entry.path()).is_ok() {
            removed += 1;
        }
    }
    removed
}

/// Install a SIGINT/SIGTERM/SIGQUIT listener that unlinks every spill
/// file this process created, then exits with code 3.
pub fn install_signal_cleanup(dir: &Path) -> SortResult<()> {
    let dir = dir.to_path_buf();
    let prefix = process_prefix();
    let mut signals = Signals::new([SIGINT, SIGTERM, SIGQUIT])?;
    std::thread::spawn(move || {
        if signals.forever().next().is_some() {
            remove_matching(&dir, &prefix);
            process::exit(crate::EXIT_SIGNAL);
        }
    });
    Ok(())
}

/// Remove spill files left behind by processes that no longer exist.
/// Spill names embed the creating pid; on Linux a missing
/// `/proc/<pid>` means that process is gone and its files are stale.
pub fn remove_stale(dir: &Path) -> usize {
    let mut removed = 0;
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(pid) = stale_spill_pid(name) else {
            continue;
        };
        if pid != process::id() && !process_alive(pid) && fs::remove_file(entry.path()).is_ok() {
            debug!("removed stale spill file {}", name);
            removed += 1;
        }
    }
    removed
}

/// Parse `gsort.<pid>.` out of a spill filename.
fn stale_spill_pid(name: &str) -> Option<u32> {
    let rest = name.strip_prefix("gsort.")?;
    let (pid, _) = rest.split_once('.')?;
    pid.parse().ok()
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    // Without a portable liveness check, never treat a file as stale.
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn names_carry_pid_and_index() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut set = SpillSet::new(dir.path());
        set.create_next().unwrap();
        set.create_next().unwrap();
        let prefix = process_prefix();
        for (i, file) in set.files().iter().enumerate() {
            let name = file.path().file_name().unwrap().to_str().unwrap();
            assert!(name.starts_with(&format!("{}{}.", prefix, i)), "{name}");
        }
    }

    #[test]
    fn dropping_the_set_removes_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths: Vec<PathBuf> = {
            let mut set = SpillSet::new(dir.path());
            set.create_next().unwrap();
            set.create_next().unwrap();
            set.files().iter().map(|f| f.path().to_path_buf()).collect()
        };
        for path in paths {
            assert!(!path.exists());
        }
    }

    #[test]
    fn spill_round_trip_through_set() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut set = SpillSet::new(dir.path());
        let file = set.create_next().unwrap();
        let mut enc = flate2::write::GzEncoder::new(file, flate2::Compression::fast());
        enc.write_all(b"chr1\t1\t2\n").unwrap();
        enc.finish().unwrap();

        let mut text = String::new();
        set.files()[0].open().unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "chr1\t1\t2\n");
    }

    #[test]
    fn stale_pid_parsing() {
        assert_eq!(stale_spill_pid("gsort.1234.0.abc123"), Some(1234));
        assert_eq!(stale_spill_pid("gsort.x.0.abc123"), None);
        assert_eq!(stale_spill_pid("other.1234.0"), None);
    }

    #[test]
    fn remove_stale_ignores_live_and_foreign_files() {
        let dir = tempfile::TempDir::new().unwrap();
        // Belongs to this (live) process: kept.
        let mine = dir.path().join(format!("{}0.abcdef", process_prefix()));
        // Not a spill name: kept.
        let foreign = dir.path().join("data.txt");
        fs::write(&mine, b"x").unwrap();
        fs::write(&foreign, b"x").unwrap();
        remove_stale(dir.path());
        assert!(mine.exists());
        assert!(foreign.exists());
    }
}
