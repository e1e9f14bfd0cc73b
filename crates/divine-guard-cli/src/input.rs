// crates/divine-guard-cli/src/input.rs
// ============================================================================
// Module: Bounded Input Reads
// Description: Size-limited file reads for CLI inputs.
// Purpose: Refuse oversized rule files before parsing them.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Reads files with a hard byte ceiling. The declared size is checked first,
//! and the read itself is capped so a file growing underneath us still fails.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io::Read;
use std::path::Path;

use thiserror::Error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum size of a rule file accepted by the CLI.
pub const MAX_INPUT_BYTES: usize = 1024 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors returned by bounded file reads.
#[derive(Debug, Error)]
pub enum ReadLimitError {
    /// File I/O failure.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// File size exceeds the configured limit.
    #[error("file is {size} bytes (limit {limit})")]
    TooLarge {
        /// Actual size in bytes.
        size: u64,
        /// Allowed limit in bytes.
        limit: usize,
    },
}

// ============================================================================
// SECTION: Reads
// ============================================================================

/// Reads a file from disk while enforcing a hard size limit.
///
/// # Errors
///
/// Returns [`ReadLimitError::TooLarge`] when the file exceeds `max_bytes` and
/// [`ReadLimitError::Io`] when it cannot be read.
pub fn read_bytes_with_limit(path: &Path, max_bytes: usize) -> Result<Vec<u8>, ReadLimitError> {
    let file = File::open(path)?;
    let size = file.metadata()?.len();
    let limit = u64::try_from(max_bytes).map_err(|_| ReadLimitError::TooLarge {
        size,
        limit: max_bytes,
    })?;
    if size > limit {
        return Err(ReadLimitError::TooLarge {
            size,
            limit: max_bytes,
        });
    }

    let mut limited = file.take(limit.saturating_add(1));
    let mut bytes = Vec::new();
    limited.read_to_end(&mut bytes)?;
    if bytes.len() > max_bytes {
        return Err(ReadLimitError::TooLarge {
            size: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
            limit: max_bytes,
        });
    }
    Ok(bytes)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use super::*;

    #[test]
    fn read_bytes_with_limit_allows_small_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.json");
        std::fs::write(&path, b"[]").unwrap();
        assert_eq!(read_bytes_with_limit(&path, 16).unwrap(), b"[]");
    }

    #[test]
    fn read_bytes_with_limit_rejects_large_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("large.json");
        let limit = 8_usize;
        std::fs::write(&path, vec![b' '; limit + 1]).unwrap();
        match read_bytes_with_limit(&path, limit) {
            Err(ReadLimitError::TooLarge {
                size,
                limit: reported,
            }) => {
                assert_eq!(size, 9);
                assert_eq!(reported, limit);
            }
            Err(ReadLimitError::Io(err)) => panic!("unexpected io error: {err}"),
            Ok(_) => panic!("expected size limit failure"),
        }
    }

    #[test]
    fn read_bytes_with_limit_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_bytes_with_limit(&dir.path().join("absent.json"), 16);
        assert!(matches!(result, Err(ReadLimitError::Io(_))));
    }
}
