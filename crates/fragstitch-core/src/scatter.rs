use crate::{manifest::Chunk, span::SourceSpan, FragmentError};
use assert_into::AssertInto;
use log::debug;
use std::{
    io::{ErrorKind, Seek, SeekFrom, Write},
    ops::Range,
};

/// Where each chunk sits inside a buffer holding `span`, in manifest order.
///
/// Fails on the first chunk that is not fully covered by the span, before anything
/// is written.
pub fn chunk_slices(span: SourceSpan, chunks: &[Chunk]) -> Result<Vec<Range<usize>>, FragmentError> {
    chunks
        .iter()
        .enumerate()
        .map(|(index, chunk)| {
            let start = chunk.offset.checked_sub(span.offset);
            let end = start.and_then(|start| start.checked_add(chunk.size as u64));

            match (start, end) {
                (Some(start), Some(end)) if end <= span.len => {
                    Ok(start.assert_into()..end.assert_into())
                }
                _ => Err(FragmentError::ChunkRange {
                    chunk: index,
                    offset: chunk.offset,
                    size: chunk.size,
                    span,
                }),
            }
        })
        .collect()
}

/// Writes the chunks of a fragment back-to-back starting at `destination_offset`.
///
/// `buf` holds the source bytes of `span`. Chunks are written in the order given,
/// regardless of where they came from in the source. Returns the number of payload
/// bytes written.
pub fn scatter_chunks<W: Write + Seek>(
    output: &mut W,
    buf: &[u8],
    span: SourceSpan,
    chunks: &[Chunk],
    destination_offset: u64,
) -> Result<u64, FragmentError> {
    if buf.len() as u64 != span.len {
        return Err(FragmentError::ShortRead {
            offset: span.offset,
            wanted: span.len,
            got: buf.len() as u64,
        });
    }

    let slices = chunk_slices(span, chunks)?;
    scatter_slices(output, buf, chunks, &slices, destination_offset)
}

/// Writes already checked `slices` of `buf`, one per chunk, back-to-back from
/// `destination_offset`.
///
/// `slices` must come from [`chunk_slices`] for the same span and chunks.
pub fn scatter_slices<W: Write + Seek>(
    output: &mut W,
    buf: &[u8],
    chunks: &[Chunk],
    slices: &[Range<usize>],
    destination_offset: u64,
) -> Result<u64, FragmentError> {
    let mut cursor = 0u64;
    for (index, (chunk, slice)) in chunks.iter().zip(slices).enumerate() {
        let position = destination_offset + cursor;

        debug!(
            "Chunk #{} {:#x}+{} -> {:#x}",
            index, chunk.offset, chunk.size, position
        );

        output
            .seek(SeekFrom::Start(position))
            .map_err(FragmentError::DestinationIo)?;
        write_chunk(output, &buf[slice.clone()], index)?;

        cursor += chunk.size as u64;
    }

    Ok(cursor)
}

// Like `write_all`, but a zero length write is reported with how far it got.
fn write_chunk(output: &mut impl Write, mut data: &[u8], chunk: usize) -> Result<(), FragmentError> {
    let wanted = data.len();

    while !data.is_empty() {
        match output.write(data) {
            Ok(0) => {
                return Err(FragmentError::ShortWrite {
                    chunk,
                    wanted,
                    written: wanted - data.len(),
                })
            }
            Ok(n) => data = &data[n..],
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => return Err(FragmentError::DestinationIo(err)),
        }
    }

    Ok(())
}
