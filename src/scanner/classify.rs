//! Binary/encoding classification.
//!
//! The scan core does not decide for itself whether a file is scannable; it
//! consults a classifier and skips binary files or switches to streaming per
//! its verdict. The classifier is an injected capability with a default
//! implementation, so embedders can substitute their own detection.

use std::fs::File;
use std::io;
use std::io::Read;
use std::path::Path;

/// How the scanner should treat a file's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentVerdict {
    /// Binary files are skipped entirely
    pub is_binary: bool,
    /// Declared text encoding
    pub encoding: ContentEncoding,
    /// Large files are matched line by line instead of loaded whole
    pub should_stream: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Utf8,
    Unknown,
}

/// Classifies a file before any matching happens.
pub trait ContentClassifier: Send + Sync {
    fn classify(&self, path: &Path) -> io::Result<ContentVerdict>;
}

/// NUL-byte sniff over a bounded prefix plus a size threshold for streaming.
#[derive(Debug, Clone)]
pub struct DefaultClassifier {
    /// Files larger than this are streamed rather than loaded whole
    pub max_in_memory_bytes: u64,
}

const SNIFF_BYTES: usize = 8192;

impl Default for DefaultClassifier {
    fn default() -> Self {
        Self {
            max_in_memory_bytes: 8 * 1024 * 1024,
        }
    }
}

impl ContentClassifier for DefaultClassifier {
    fn classify(&self, path: &Path) -> io::Result<ContentVerdict> {
        let mut file = File::open(path)?;
        let size = file.metadata()?.len();
        let mut prefix = [0u8; SNIFF_BYTES];
        let read = file.read(&mut prefix)?;
        let is_binary = prefix[..read].contains(&0);
        Ok(ContentVerdict {
            is_binary,
            encoding: if is_binary {
                ContentEncoding::Unknown
            } else {
                ContentEncoding::Utf8
            },
            should_stream: size > self.max_in_memory_bytes,
        })
    }
}
