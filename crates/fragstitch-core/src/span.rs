use crate::{manifest::Chunk, FragmentError};
use log::trace;
use std::{
    cmp::{max, min},
    io::{Read, Seek, SeekFrom},
};

/// Largest buffer reserved up front for a span read; bigger spans grow as data arrives.
const INITIAL_READ_CAPACITY: u64 = 16 << 20;

/// The smallest contiguous source range covering every chunk of a fragment.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SourceSpan {
    pub offset: u64,
    pub len: u64,
}

impl SourceSpan {
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.len)
    }
}

/// Computes the span covering `chunks`, or `None` when there are no chunks.
///
/// The running bounds start from the first chunk, so a chunk at source offset
/// zero is handled like any other.
pub fn source_span(chunks: &[Chunk]) -> Option<SourceSpan> {
    let (first, rest) = chunks.split_first()?;

    let (start, end) = rest.iter().fold((first.offset, first.end()), |(start, end), chunk| {
        (min(start, chunk.offset), max(end, chunk.end()))
    });

    Some(SourceSpan {
        offset: start,
        len: end - start,
    })
}

/// Reads exactly the bytes of `span` from `input`.
///
/// The read is positioned explicitly, whatever the input's current position is.
pub fn read_span<R: Read + Seek>(input: &mut R, span: SourceSpan) -> Result<Vec<u8>, FragmentError> {
    input
        .seek(SeekFrom::Start(span.offset))
        .map_err(FragmentError::SourceIo)?;

    let mut buf = Vec::with_capacity(min(span.len, INITIAL_READ_CAPACITY) as usize);
    let got = input
        .by_ref()
        .take(span.len)
        .read_to_end(&mut buf)
        .map_err(FragmentError::SourceIo)? as u64;

    trace!("Read {} of {} bytes at {:#x}", got, span.len, span.offset);

    if got != span.len {
        return Err(FragmentError::ShortRead {
            offset: span.offset,
            wanted: span.len,
            got,
        });
    }

    Ok(buf)
}
