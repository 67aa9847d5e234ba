//! This is the backend library logic for fragstitch.
//!
//! A [`Manifest`] lists fragments of a fragmented MP4. Each fragment names the
//! source byte ranges (chunks) holding its samples and the destination offset they
//! are written to, back-to-back and in manifest order. Fragments may also carry a
//! prebuilt box header which is placed right before the payload, followed by a
//! freshly computed payload box size and type.

use crate::{
    header::write_box_header,
    scatter::{chunk_slices, scatter_slices},
    span::{read_span, source_span, SourceSpan},
};
use log::*;
use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, Write},
    path::{Path, PathBuf},
};
use thiserror::Error;

pub mod config;
pub mod extent;
pub mod header;
pub mod manifest;
pub mod scatter;
pub mod span;

pub use config::{StitchConfig, Strictness};
pub use manifest::{Chunk, Fragment, Manifest, ManifestError};

/// Errors that end a run before or outside of fragment processing.
#[derive(Error, Debug)]
pub enum StitchError {
    #[error("Failed to load manifest")]
    ManifestLoad(#[from] ManifestError),
    #[error("Cannot open input MP4 file {}", .path.display())]
    SourceOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot open output file {}", .path.display())]
    DestinationOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to finish writing output")]
    Finalize(#[source] std::io::Error),
}

/// Errors that abort a single fragment. The run carries on with the next one.
#[derive(Error, Debug)]
pub enum FragmentError {
    #[error("Read at {offset:#x} wanted {wanted} bytes, got {got}")]
    ShortRead { offset: u64, wanted: u64, got: u64 },
    #[error("Failed to read from source")]
    SourceIo(#[source] std::io::Error),
    #[error("Header blob is not valid hex")]
    HeaderDecode(#[source] hex::FromHexError),
    #[error("Header of {header_len} bytes does not fit before offset {destination_offset}")]
    HeaderPlacement {
        header_len: u64,
        destination_offset: u64,
    },
    #[error("Box size {0} does not fit in 32 bits")]
    BoxTooLarge(u64),
    #[error("Failed to write to output")]
    DestinationIo(#[source] std::io::Error),
    #[error("Chunk #{chunk} ({offset:#x}+{size}) lies outside source range {:#x}+{}", .span.offset, .span.len)]
    ChunkRange {
        chunk: usize,
        offset: u64,
        size: u32,
        span: SourceSpan,
    },
    #[error("Chunk #{chunk} wrote {written} of {wanted} bytes")]
    ShortWrite {
        chunk: usize,
        wanted: usize,
        written: usize,
    },
}

impl FragmentError {
    /// Stable name of the error class, used in run summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            FragmentError::ShortRead { .. } => "ShortReadError",
            FragmentError::SourceIo(_) => "SourceIOError",
            FragmentError::HeaderDecode(_) => "HeaderDecodeError",
            FragmentError::HeaderPlacement { .. } | FragmentError::BoxTooLarge(_) => {
                "HeaderPlacementError"
            }
            FragmentError::DestinationIo(_) => "DestinationIOError",
            FragmentError::ChunkRange { .. } => "ChunkRangeError",
            FragmentError::ShortWrite { .. } => "ShortWriteError",
        }
    }
}

#[derive(Debug)]
pub struct FragmentFailure {
    pub index: usize,
    pub track_id: i64,
    pub error: FragmentError,
}

/// Outcome of a stitch run.
#[derive(Debug, Default)]
pub struct StitchReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<FragmentFailure>,
    /// Header and payload bytes written by successful fragments
    pub bytes_written: u64,
}

impl StitchReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

pub fn open_source<P: AsRef<Path>>(path: P) -> Result<File, StitchError> {
    File::open(&path).map_err(|source| StitchError::SourceOpen {
        path: path.as_ref().to_owned(),
        source,
    })
}

/// Creates or truncates the destination file.
pub fn create_destination<P: AsRef<Path>>(path: P) -> Result<File, StitchError> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)
        .map_err(|source| StitchError::DestinationOpen {
            path: path.as_ref().to_owned(),
            source,
        })
}

/// Copies one fragment from `input` to `output`.
///
/// The whole source span is read and every chunk checked against it before anything
/// is written, so a failed read leaves the destination untouched. Returns the number
/// of bytes written.
pub fn stitch_fragment(
    input: &mut (impl Read + Seek),
    output: &mut (impl Write + Seek),
    fragment: &Fragment,
    config: &StitchConfig,
) -> Result<u64, FragmentError> {
    let (buf, slices) = match source_span(&fragment.chunks) {
        Some(span) => {
            debug!(
                "Fragment source range: offset {}, length {}",
                span.offset, span.len
            );
            let buf = read_span(input, span)?;
            let slices = chunk_slices(span, &fragment.chunks)?;
            (buf, slices)
        }
        None => {
            debug!("Fragment has no chunks");
            (Vec::new(), Vec::new())
        }
    };

    let mut written = write_box_header(output, fragment, config.box_type)?;
    written += scatter_slices(
        output,
        &buf,
        &fragment.chunks,
        &slices,
        fragment.destination_offset,
    )?;

    Ok(written)
}

/// Runs every fragment of `manifest` in order, collecting per fragment failures.
pub fn stitch(
    manifest: &Manifest,
    mut input: impl Read + Seek,
    mut output: impl Write + Seek,
    config: &StitchConfig,
) -> StitchReport {
    let mut report = StitchReport::default();

    for (index, fragment) in manifest.fragments.iter().enumerate() {
        debug!(
            "Fragment {} / {} track {} ({}) -> {:#x}",
            index + 1,
            manifest.len(),
            fragment.track_id,
            fragment.track_type,
            fragment.destination_offset
        );

        report.attempted += 1;

        match stitch_fragment(&mut input, &mut output, fragment, config) {
            Ok(written) => {
                report.succeeded += 1;
                report.bytes_written += written;
            }
            Err(error) => {
                debug!("Fragment {} failed: {}", index, error);
                report.failures.push(FragmentFailure {
                    index,
                    track_id: fragment.track_id,
                    error,
                });
            }
        }
    }

    report
}
