use crate::error::Error;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::Path;
use tracing::{debug, warn};

const COMPARE_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Move,
    Copy,
}

/// How an existing destination is compared with the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// Content-addressed targets: equal size means equal content.
    Size,
    /// Byte-for-byte.
    Content,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The destination did not exist and now holds the source's content.
    Transferred,
    /// The destination already held identical content.
    AlreadyPresent,
    /// The destination holds different content and was left untouched.
    Different,
}

/// Move or copy `source` to `destination` without ever overwriting a
/// different file.
///
/// A missing destination gets its parent created and receives the source.
/// An identical destination is kept; when moving, the source is removed. A
/// different destination is reported and both files are left as they are.
pub fn copy_or_move(
    source: &Path,
    destination: &Path,
    mode: TransferMode,
    comparison: Comparison,
) -> Result<TransferOutcome, Error> {
    if !destination.exists() {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        match mode {
            TransferMode::Move => move_file(source, destination)?,
            TransferMode::Copy => {
                fs::copy(source, destination)?;
            }
        }
        return Ok(TransferOutcome::Transferred);
    }

    let identical = match comparison {
        Comparison::Size => fs::metadata(source)?.len() == fs::metadata(destination)?.len(),
        Comparison::Content => compare_files(source, destination)?,
    };

    if identical {
        debug!(
            "{} already holds the content of {}",
            destination.display(),
            source.display()
        );
        if mode == TransferMode::Move {
            fs::remove_file(source)?;
        }
        Ok(TransferOutcome::AlreadyPresent)
    } else {
        warn!(
            "Not overwriting existing different file {} with {}",
            destination.display(),
            source.display()
        );
        Ok(TransferOutcome::Different)
    }
}

/// Rename, falling back to copy and remove when the two paths are on
/// different devices.
pub fn move_file(source: &Path, destination: &Path) -> io::Result<()> {
    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(e),
        Err(e) => {
            debug!(
                "Rename of {} failed ({}), copying instead",
                source.display(),
                e
            );
            fs::copy(source, destination)?;
            fs::remove_file(source)
        }
    }
}

pub fn compare_files(a: &Path, b: &Path) -> io::Result<bool> {
    if fs::metadata(a)?.len() != fs::metadata(b)?.len() {
        return Ok(false);
    }
    let mut reader_a = BufReader::new(File::open(a)?);
    let mut reader_b = BufReader::new(File::open(b)?);
    let mut buf_a = vec![0u8; COMPARE_BUFFER_SIZE];
    let mut buf_b = vec![0u8; COMPARE_BUFFER_SIZE];
    loop {
        let n = read_full(&mut reader_a, &mut buf_a)?;
        let m = read_full(&mut reader_b, &mut buf_b)?;
        if n != m || buf_a[..n] != buf_b[..m] {
            return Ok(false);
        }
        if n == 0 {
            return Ok(true);
        }
    }
}

fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_into_missing_destination_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.txt");
        fs::write(&src, b"payload").unwrap();
        let dest = dir.path().join("x").join("y").join("a.txt");

        let outcome = copy_or_move(&src, &dest, TransferMode::Move, Comparison::Content).unwrap();
        assert_eq!(outcome, TransferOutcome::Transferred);
        assert!(!src.exists());
        assert_eq!(fs::read(&dest).unwrap(), b"payload");
    }

    #[test]
    fn test_identical_destination_removes_source_on_move() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a");
        let dest = dir.path().join("b");
        fs::write(&src, b"same").unwrap();
        fs::write(&dest, b"same").unwrap();

        let outcome = copy_or_move(&src, &dest, TransferMode::Move, Comparison::Content).unwrap();
        assert_eq!(outcome, TransferOutcome::AlreadyPresent);
        assert!(!src.exists());
        assert!(dest.exists());
    }

    #[test]
    fn test_identical_destination_keeps_source_on_copy() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a");
        let dest = dir.path().join("b");
        fs::write(&src, b"same").unwrap();
        fs::write(&dest, b"same").unwrap();

        let outcome = copy_or_move(&src, &dest, TransferMode::Copy, Comparison::Size).unwrap();
        assert_eq!(outcome, TransferOutcome::AlreadyPresent);
        assert!(src.exists());
    }

    #[test]
    fn test_different_destination_is_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a");
        let dest = dir.path().join("b");
        fs::write(&src, b"new content").unwrap();
        fs::write(&dest, b"old content").unwrap();

        let outcome = copy_or_move(&src, &dest, TransferMode::Move, Comparison::Content).unwrap();
        assert_eq!(outcome, TransferOutcome::Different);
        assert_eq!(fs::read(&src).unwrap(), b"new content");
        assert_eq!(fs::read(&dest).unwrap(), b"old content");
    }

    #[test]
    fn test_size_comparison_treats_equal_sizes_as_identical() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a");
        let dest = dir.path().join("b");
        fs::write(&src, b"abcd").unwrap();
        fs::write(&dest, b"wxyz").unwrap();

        let outcome = copy_or_move(&src, &dest, TransferMode::Copy, Comparison::Size).unwrap();
        assert_eq!(outcome, TransferOutcome::AlreadyPresent);
    }

    #[test]
    fn test_compare_files_beyond_first_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let mut bytes = vec![7u8; COMPARE_BUFFER_SIZE + 10];
        fs::write(&a, &bytes).unwrap();
        bytes[COMPARE_BUFFER_SIZE + 5] = 8;
        fs::write(&b, &bytes).unwrap();
        assert!(!compare_files(&a, &b).unwrap());
        assert!(compare_files(&a, &a).unwrap());
    }
}
