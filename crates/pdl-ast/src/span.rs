//! Source location tracking for diagnostics.
//!
//! A `Span` is a compact byte range into one file of a `SourceMap`. The map
//! owns every source file seen during a driver pass (the root description
//! plus all included files) and answers line/column and snippet queries when
//! a diagnostic is rendered.

use serde::{Deserialize, Serialize};

/// Byte range in one source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    /// Index into [`SourceMap`] files. Doubles as the reference lookup scope:
    /// a reference's scope is the file it was written in.
    pub file_id: u16,
    /// Byte offset of the start position.
    pub start: u32,
    /// Byte offset of the end position (exclusive).
    pub end: u32,
}

impl Span {
    pub fn new(file_id: u16, start: u32, end: u32) -> Self {
        Self {
            file_id,
            start,
            end,
        }
    }

    /// Zero-length span at the start of a file.
    pub fn zero(file_id: u16) -> Self {
        Self::new(file_id, 0, 0)
    }

    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Span covering both `self` and `other`.
    ///
    /// # Panics
    /// Panics if the spans come from different files.
    pub fn merge(&self, other: Span) -> Span {
        assert_eq!(
            self.file_id, other.file_id,
            "cannot merge spans from different files"
        );
        Span {
            file_id: self.file_id,
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// All source files of one driver pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

/// One source file with a precomputed line table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    /// Display name: a filesystem path, or a synthetic name for text input.
    pub name: String,
    /// Original source text, kept for the lifetime of the pass so that
    /// diagnostics can quote the offending line.
    pub source: String,
    /// Byte offset of each line start; the last element is the EOF sentinel.
    line_starts: Vec<u32>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file and return its id.
    pub fn add_file(&mut self, name: impl Into<String>, source: String) -> u16 {
        let file_id = self.files.len();
        assert!(file_id < u16::MAX as usize, "too many source files");
        self.files.push(SourceFile::new(name, source));
        file_id as u16
    }

    pub fn file(&self, file_id: u16) -> &SourceFile {
        &self.files[file_id as usize]
    }

    pub fn file_name(&self, span: Span) -> &str {
        &self.files[span.file_id as usize].name
    }

    /// Source text covered by a span.
    pub fn snippet(&self, span: Span) -> &str {
        let file = self.file(span.file_id);
        &file.source[span.start as usize..span.end as usize]
    }

    /// 1-based (line, column) of a span's start.
    pub fn line_col(&self, span: Span) -> (u32, u32) {
        self.file(span.file_id).line_col(span.start)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

impl SourceFile {
    pub fn new(name: impl Into<String>, source: String) -> Self {
        let line_starts = compute_line_starts(&source);
        Self {
            name: name.into(),
            source,
            line_starts,
        }
    }

    /// 1-based (line, column) for a byte offset.
    pub fn line_col(&self, offset: u32) -> (u32, u32) {
        let offset = offset.min(self.source.len() as u32);
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx.max(1) - 1,
        };
        // Past-the-end sentinel belongs to the last real line.
        let line_idx = line_idx.min(self.line_starts.len().saturating_sub(2));
        (
            (line_idx + 1) as u32,
            offset - self.line_starts[line_idx] + 1,
        )
    }

    /// Text of a 1-based line, without its trailing newline.
    pub fn line_text(&self, line: u32) -> Option<&str> {
        if line == 0 || line as usize >= self.line_starts.len() {
            return None;
        }
        let start = self.line_starts[(line - 1) as usize] as usize;
        let end = self.line_starts[line as usize] as usize;
        Some(self.source[start..end].trim_end_matches(['\n', '\r']))
    }
}

fn compute_line_starts(source: &str) -> Vec<u32> {
    let mut line_starts = vec![0];
    for (idx, ch) in source.char_indices() {
        if ch == '\n' {
            line_starts.push((idx + 1) as u32);
        }
    }
    if line_starts.last() != Some(&(source.len() as u32)) {
        line_starts.push(source.len() as u32);
    }
    line_starts
}
