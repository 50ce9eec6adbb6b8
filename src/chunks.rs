//! Lazy, bounded-size batching of decoded records.
//!
//! [`ChunkSource`] pulls lines from any `Iterator<Item = io::Result<L>>` where `L` is a
//! `String` or raw bytes, decodes them, and yields [`Chunk`]s of at most `chunk_size` records. It is single-pass: the
//! underlying line source is consumed once and cannot be rewound.
//!
//! Blank lines are tallied separately and otherwise ignored. Every other line is either
//! `processed` or `skipped`, so `processed + skipped` always equals the number of
//! non-blank lines read so far. A line that is not valid UTF-8 is a parse error, not a
//! read failure.

use crate::decoder::{SkipKind, SkipReason, decode};
use crate::error::{PipelineError, Result, Stage};
use crate::filter::YearFilter;
use crate::record::Record;
use serde::Serialize;
use std::io;
use std::iter::FusedIterator;
use std::mem;
use std::str;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, trace};

/// Default number of records per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 100_000;

/// Upper bound on the buffer capacity reserved up front.
const MAX_PREALLOCATED_RECORDS: usize = 1 << 16;

/// Running line counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChunkStats {
    /// Lines decoded into a record.
    pub processed: u64,
    /// Non-blank lines that produced no record, for any reason.
    pub skipped: u64,
    /// Skipped lines with the wrong token count.
    pub malformed: u64,
    /// Skipped lines with an unparseable field.
    pub parse_errors: u64,
    /// Skipped lines whose year the filter excluded.
    pub filtered_out: u64,
    /// Blank lines, ignored and not part of `skipped`.
    pub blank: u64,
}

impl ChunkStats {
    /// Non-blank lines seen so far.
    #[must_use]
    pub const fn lines_seen(&self) -> u64 {
        self.processed + self.skipped
    }

    fn record_skip(&mut self, reason: &SkipReason) {
        self.skipped += 1;
        match reason.kind() {
            SkipKind::Malformed => self.malformed += 1,
            SkipKind::Parse => self.parse_errors += 1,
            SkipKind::Filtered => self.filtered_out += 1,
        }
    }
}

/// One batch of decoded records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Emission index, starting at 0. Equal to file order.
    pub seq: u64,
    pub records: Vec<Record>,
}

impl Chunk {
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Iterator of [`Chunk`]s decoded from a line source.
///
/// A read error from the line source is fatal: it is yielded once as
/// [`PipelineError::Io`] with [`Stage::Read`], after which the iterator is exhausted.
pub struct ChunkSource<I> {
    lines: I,
    years: YearFilter,
    chunk_size: usize,
    origin: PathBuf,
    buffer: Vec<Record>,
    next_seq: u64,
    stats: ChunkStats,
    done: bool,
}

impl<I, L> ChunkSource<I>
where
    I: Iterator<Item = io::Result<L>>,
    L: AsRef<[u8]>,
{
    /// Create a chunk source.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Configuration`] if `chunk_size` is zero.
    pub fn new(lines: I, years: YearFilter, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(PipelineError::configuration(
                "chunk size must be at least 1",
            ));
        }
        Ok(Self {
            lines,
            years,
            chunk_size,
            origin: PathBuf::from("<lines>"),
            buffer: Vec::with_capacity(chunk_size.min(MAX_PREALLOCATED_RECORDS)),
            next_seq: 0,
            stats: ChunkStats::default(),
            done: false,
        })
    }

    /// Name the line source in read errors and log events.
    #[must_use]
    pub fn with_origin(mut self, origin: impl AsRef<Path>) -> Self {
        self.origin = origin.as_ref().to_path_buf();
        self
    }

    /// Counters accumulated so far.
    #[must_use]
    pub const fn stats(&self) -> ChunkStats {
        self.stats
    }

    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn emit(&mut self) -> Chunk {
        let capacity = self.chunk_size.min(MAX_PREALLOCATED_RECORDS);
        let records = mem::replace(&mut self.buffer, Vec::with_capacity(capacity));
        let seq = self.next_seq;
        self.next_seq += 1;
        info!(
            stage = "chunk",
            seq,
            rows = records.len(),
            processed = self.stats.processed,
            skipped = self.stats.skipped,
            "chunk ready"
        );
        Chunk { seq, records }
    }

    fn skip(&mut self, line: &str, reason: SkipReason) {
        match &reason {
            SkipReason::MalformedFormat { .. } => {
                debug!(stage = "decode", %reason, line, "malformed line skipped");
            }
            SkipReason::ParseError(_) => {
                debug!(stage = "decode", %reason, line, "unparseable line skipped");
            }
            SkipReason::FilteredOut { .. } => trace!(stage = "decode", %reason, "line filtered"),
        }
        self.stats.record_skip(&reason);
    }
}

impl<I, L> Iterator for ChunkSource<I>
where
    I: Iterator<Item = io::Result<L>>,
    L: AsRef<[u8]>,
{
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.lines.next() {
                Some(Ok(raw)) => {
                    let raw = raw.as_ref();
                    let line = match str::from_utf8(raw) {
                        Ok(text) => text.trim(),
                        Err(e) => {
                            let lossy = String::from_utf8_lossy(raw);
                            let reason = SkipReason::ParseError(format!(
                                "line is not valid UTF-8 at byte {}",
                                e.valid_up_to()
                            ));
                            self.skip(lossy.trim(), reason);
                            continue;
                        }
                    };
                    if line.is_empty() {
                        self.stats.blank += 1;
                        continue;
                    }
                    match decode(line, &self.years) {
                        Ok(record) => {
                            self.stats.processed += 1;
                            self.buffer.push(record);
                            if self.buffer.len() >= self.chunk_size {
                                return Some(Ok(self.emit()));
                            }
                        }
                        Err(reason) => self.skip(line, reason),
                    }
                }
                Some(Err(err)) => {
                    self.done = true;
                    error!(
                        stage = "read",
                        path = %self.origin.display(),
                        error = %err,
                        processed = self.stats.processed,
                        skipped = self.stats.skipped,
                        "input read failed"
                    );
                    return Some(Err(PipelineError::io(Stage::Read, &self.origin, err)));
                }
                None => {
                    self.done = true;
                    return (!self.buffer.is_empty()).then(|| Ok(self.emit()));
                }
            }
        }
    }
}

impl<I, L> FusedIterator for ChunkSource<I>
where
    I: Iterator<Item = io::Result<L>>,
    L: AsRef<[u8]>,
{
}
