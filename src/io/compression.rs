//! Transparent compression for input lines and export files.
//!
//! SEER distributes population files gzip-compressed. Readers opened through
//! [`auto_detect_reader`] decompress on the fly, so a `.txt.gz` input streams through
//! the pipeline without a separate decompression step.
//!
//! ## Detection
//! File extensions are checked first; when no extension matches, the first bytes of
//! the stream are compared with each codec's magic signature. Writers are chosen by
//! extension only.
//!
//! ## Built-in codecs
//! - **Gzip** (`.gz`) via `flate2` (feature: `compression-gzip`)
//! - **Zstd** (`.zst`) via `zstd` (feature: `compression-zstd`)

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Split, Write};
use std::path::Path;

/// Compression codec.
pub trait CompressionCodec: Send + Sync {
    /// Human-readable codec name (e.g., "gzip").
    fn name(&self) -> &str;

    /// Lowercase file extensions including the leading dot (e.g., `&[".gz"]`).
    fn extensions(&self) -> &[&str];

    /// Magic byte signature, if the format has one.
    fn magic_bytes(&self) -> Option<&[u8]>;

    /// Wrap a reader with decompression.
    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>>;

    /// Wrap a writer with compression.
    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn Write>>;
}

const CODECS: &[&dyn CompressionCodec] = &[
    #[cfg(feature = "compression-gzip")]
    &GzipCodec,
    #[cfg(feature = "compression-zstd")]
    &ZstdCodec,
];

/// Codecs compiled into this build.
#[must_use]
pub fn codecs() -> &'static [&'static dyn CompressionCodec] {
    CODECS
}

/// Codec whose extension matches the end of `path`, case-insensitively.
#[must_use]
pub fn detect_from_extension(path: impl AsRef<Path>) -> Option<&'static dyn CompressionCodec> {
    let name = path.as_ref().to_string_lossy().to_lowercase();
    CODECS
        .iter()
        .copied()
        .find(|codec| codec.extensions().iter().any(|ext| name.ends_with(ext)))
}

/// Peek at the start of `reader` for a known signature without consuming it.
fn detect_from_magic<R: BufRead>(reader: &mut R) -> Option<&'static dyn CompressionCodec> {
    let buf = reader.fill_buf().ok()?;
    if buf.is_empty() {
        return None;
    }
    CODECS
        .iter()
        .copied()
        .find(|codec| codec.magic_bytes().is_some_and(|magic| buf.starts_with(magic)))
}

/// File name of `path` with its compression extension removed, if it has one.
///
/// `us.1990_2023.txt.gz` becomes `us.1990_2023.txt`.
#[must_use]
pub fn decompressed_file_name(path: impl AsRef<Path>) -> Option<String> {
    let name = path.as_ref().file_name()?.to_string_lossy().into_owned();
    let lower = name.to_lowercase();
    let codec = detect_from_extension(&name)?;
    let ext = codec.extensions().iter().find(|ext| lower.ends_with(*ext))?;
    let stem = &name[..name.len() - ext.len()];
    (!stem.is_empty()).then(|| stem.to_string())
}

/// Wrap a reader with decompression when the path or content calls for it.
///
/// # Errors
/// Returns an error if the detected codec fails to initialise.
pub fn auto_detect_reader<R: Read + 'static>(
    reader: R,
    path_hint: impl AsRef<Path>,
) -> Result<Box<dyn Read>> {
    if let Some(codec) = detect_from_extension(&path_hint) {
        return codec
            .wrap_reader_dyn(Box::new(reader))
            .with_context(|| format!("wrap reader with {} codec", codec.name()));
    }

    let mut buf_reader = BufReader::new(reader);
    if let Some(codec) = detect_from_magic(&mut buf_reader) {
        return codec
            .wrap_reader_dyn(Box::new(buf_reader))
            .with_context(|| format!("wrap reader with {} codec", codec.name()));
    }

    Ok(Box::new(buf_reader))
}

/// Wrap a writer with compression chosen by the extension of `path_hint`.
///
/// # Errors
/// Returns an error if the detected codec fails to initialise.
pub fn auto_detect_writer<W: Write + 'static>(
    writer: W,
    path_hint: impl AsRef<Path>,
) -> Result<Box<dyn Write>> {
    if let Some(codec) = detect_from_extension(&path_hint) {
        return codec
            .wrap_writer_dyn(Box::new(BufWriter::new(writer)))
            .with_context(|| format!("wrap writer with {} codec", codec.name()));
    }
    Ok(Box::new(BufWriter::new(writer)))
}

/// Open `path` as a stream of raw lines, decompressing if needed.
///
/// Lines are split on `\n` and returned as bytes so one badly encoded line does not end
/// the stream; a trailing `\r` is left in place.
///
/// # Errors
/// Returns an error if the file cannot be opened or its codec fails to initialise.
pub fn open_lines(path: impl AsRef<Path>) -> Result<Split<BufReader<Box<dyn Read>>>> {
    let path = path.as_ref();
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let rdr = auto_detect_reader(f, path)
        .with_context(|| format!("setup decompression for {}", path.display()))?;
    Ok(BufReader::new(rdr).split(b'\n'))
}

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &str {
        "gzip"
    }

    fn extensions(&self) -> &[&str] {
        &[".gz", ".gzip"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x1f, 0x8b])
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        // SEER archives may be concatenated gzip members.
        use flate2::read::MultiGzDecoder;
        Ok(Box::new(MultiGzDecoder::new(reader)))
    }

    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn Write>> {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        Ok(Box::new(GzEncoder::new(writer, Compression::default())))
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &str {
        "zstd"
    }

    fn extensions(&self) -> &[&str] {
        &[".zst", ".zstd"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x28, 0xb5, 0x2f, 0xfd])
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        zstd::stream::read::Decoder::new(reader).map(|d| Box::new(d) as Box<dyn Read>)
    }

    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn Write>> {
        zstd::stream::write::Encoder::new(writer, 3)
            .map(|e| Box::new(e.auto_finish()) as Box<dyn Write>)
    }
}
