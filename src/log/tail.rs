//! Bounded backwards reads of a file's last lines

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use tracing::trace;

use crate::{Result, TelemetryError};

/// Bytes read per backwards step
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// Largest window a tail read will buffer
pub const DEFAULT_MAX_WINDOW: usize = 1024 * 1024;

/// The last lines of a file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TailLines {
    /// Complete lines in file order, without line terminators.
    pub lines: Vec<String>,
    /// True when `lines[0]` is the file's first line.
    pub from_start: bool,
}

/// Reads the last few lines of a file without scanning it from the start.
///
/// The file is read backwards in fixed-size chunks until enough line breaks
/// are buffered or the window limit is hit. A single trailing newline is
/// ignored, matching line-iteration semantics.
#[derive(Debug, Clone, Copy)]
pub struct TailReader {
    chunk_size: usize,
    max_window: usize,
}

impl Default for TailReader {
    fn default() -> Self {
        Self { chunk_size: DEFAULT_CHUNK_SIZE, max_window: DEFAULT_MAX_WINDOW }
    }
}

impl TailReader {
    pub fn new(chunk_size: usize, max_window: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self { chunk_size, max_window: max_window.max(chunk_size) }
    }

    /// Read the last `count` lines of the file at `path`.
    pub fn read(&self, path: &Path, count: usize) -> Result<TailLines> {
        let file_error = |e| TelemetryError::file_error(path.to_path_buf(), e);
        let mut file = File::open(path).map_err(file_error)?;
        let len = file.metadata().map_err(file_error)?.len();

        let mut window: Vec<u8> = Vec::new();
        let mut pos = len;
        let mut chunk = vec![0u8; self.chunk_size];

        while pos > 0 && window.len() < self.max_window && line_breaks(&window) < count {
            let step = (self.chunk_size as u64)
                .min(pos)
                .min((self.max_window - window.len()) as u64) as usize;
            pos -= step as u64;

            file.seek(SeekFrom::Start(pos)).map_err(file_error)?;
            file.read_exact(&mut chunk[..step]).map_err(file_error)?;

            let mut grown = Vec::with_capacity(step + window.len());
            grown.extend_from_slice(&chunk[..step]);
            grown.extend_from_slice(&window);
            window = grown;
        }

        let (lines, from_start) = split_tail(&window, count, pos == 0);
        trace!(path = %path.display(), window = window.len(), from_start, "Tail read");
        Ok(TailLines { lines, from_start })
    }
}

/// Line breaks in `window`, not counting one at the very end.
fn line_breaks(window: &[u8]) -> usize {
    let body = window.strip_suffix(b"\n").unwrap_or(window);
    body.iter().filter(|&&b| b == b'\n').count()
}

/// Split the last `count` lines out of `window`, and report whether the
/// first returned line is also the first line of the file.
fn split_tail(window: &[u8], count: usize, reached_start: bool) -> (Vec<String>, bool) {
    if window.is_empty() {
        return (Vec::new(), reached_start);
    }

    let body = window.strip_suffix(b"\n").unwrap_or(window);
    let mut lines: Vec<&[u8]> = body.split(|&b| b == b'\n').collect();
    if !reached_start {
        // The first piece started mid-line
        lines.remove(0);
    }

    let skip = lines.len().saturating_sub(count);
    let lines = lines[skip..]
        .iter()
        .map(|&line| {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            String::from_utf8_lossy(line).into_owned()
        })
        .collect();
    (lines, reached_start && skip == 0)
}
