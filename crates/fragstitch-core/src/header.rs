use crate::{manifest::Fragment, FragmentError};
use log::trace;
use static_assertions::const_assert;
use std::{
    io::{Seek, SeekFrom, Write},
    mem,
};
use zerocopy::{byteorder::big_endian::U32, Immutable, IntoBytes};

pub const MDAT: [u8; 4] = *b"mdat";

/// Size of the payload size and type tag field that sits between a header blob
/// and its payload.
pub const HEADER_GAP: u64 = 8;

#[repr(C)]
#[derive(IntoBytes, Immutable, Copy, Clone, Debug)]
pub struct BoxHeader {
    pub size: U32,
    pub box_type: [u8; 4],
}

const_assert!(mem::size_of::<BoxHeader>() == HEADER_GAP as usize);

impl BoxHeader {
    /// Header for a box carrying `payload_len` bytes after it.
    pub fn for_payload(payload_len: u32, box_type: [u8; 4]) -> Result<Self, FragmentError> {
        let size = payload_len as u64 + HEADER_GAP;
        let size = u32::try_from(size).map_err(|_| FragmentError::BoxTooLarge(size))?;

        Ok(Self {
            size: U32::new(size),
            box_type,
        })
    }
}

/// Writes the fragment's header blob so that it ends exactly `HEADER_GAP` bytes
/// before the payload, followed by the payload box header.
///
/// The box size is taken from the declared `fragment_size`, not from the chunks.
/// Returns the number of bytes written, zero for fragments without a header blob.
pub fn write_box_header<W: Write + Seek>(
    output: &mut W,
    fragment: &Fragment,
    box_type: [u8; 4],
) -> Result<u64, FragmentError> {
    let Some(blob) = &fragment.header_blob else {
        return Ok(0);
    };

    let blob = hex::decode(blob).map_err(FragmentError::HeaderDecode)?;
    let header = BoxHeader::for_payload(fragment.fragment_size, box_type)?;

    let header_len = blob.len() as u64 + HEADER_GAP;
    let start = fragment
        .destination_offset
        .checked_sub(header_len)
        .ok_or(FragmentError::HeaderPlacement {
            header_len,
            destination_offset: fragment.destination_offset,
        })?;

    trace!(
        "Header {} bytes at {:#x}, box size {}",
        blob.len(),
        start,
        header.size.get()
    );

    output
        .seek(SeekFrom::Start(start))
        .map_err(FragmentError::DestinationIo)?;
    output
        .write_all(&blob)
        .map_err(FragmentError::DestinationIo)?;
    output
        .write_all(header.as_bytes())
        .map_err(FragmentError::DestinationIo)?;

    Ok(header_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Chunk;
    use std::io::Cursor;

    fn fragment(destination_offset: u64, fragment_size: u32, blob: &str) -> Fragment {
        Fragment {
            destination_offset,
            fragment_size,
            chunks: vec![Chunk::new(0, fragment_size)],
            header_blob: Some(blob.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn header_is_big_endian() {
        let header = BoxHeader::for_payload(0x0102_0304, MDAT).unwrap();
        assert_eq!(header.as_bytes(), &[1, 2, 3, 12, b'm', b'd', b'a', b't']);
    }

    #[test]
    fn header_ends_at_destination_offset() {
        let blob = "000000146d6f6f66aabbccdd";
        let mut output = Cursor::new(vec![0u8; 2100]);

        let written = write_box_header(&mut output, &fragment(2000, 80, blob), MDAT).unwrap();
        assert_eq!(written, 20);

        let output = output.into_inner();
        assert_eq!(&output[1980..1992], hex::decode(blob).unwrap().as_slice());
        assert_eq!(&output[1992..1996], &88u32.to_be_bytes());
        assert_eq!(&output[1996..2000], b"mdat");
        assert!(output[..1980].iter().all(|&b| b == 0));
        assert!(output[2000..].iter().all(|&b| b == 0));
    }

    #[test]
    fn empty_blob_writes_only_box_header() {
        let mut output = Cursor::new(Vec::new());
        let written = write_box_header(&mut output, &fragment(8, 4, ""), *b"free").unwrap();

        assert_eq!(written, 8);
        assert_eq!(output.into_inner(), vec![0, 0, 0, 12, b'f', b'r', b'e', b'e']);
    }

    #[test]
    fn no_blob_writes_nothing() {
        let mut output = Cursor::new(Vec::new());
        let frag = Fragment {
            destination_offset: 100,
            ..Default::default()
        };

        assert_eq!(write_box_header(&mut output, &frag, MDAT).unwrap(), 0);
        assert!(output.into_inner().is_empty());
    }

    #[test]
    fn invalid_hex_is_rejected() {
        let mut output = Cursor::new(Vec::new());
        let err = write_box_header(&mut output, &fragment(100, 4, "abc"), MDAT).unwrap_err();
        assert!(matches!(err, FragmentError::HeaderDecode(_)));

        let err = write_box_header(&mut output, &fragment(100, 4, "zz"), MDAT).unwrap_err();
        assert!(matches!(err, FragmentError::HeaderDecode(_)));
        assert!(output.into_inner().is_empty());
    }

    #[test]
    fn header_must_fit_before_payload() {
        let mut output = Cursor::new(Vec::new());
        let err = write_box_header(&mut output, &fragment(10, 4, "aabbcc"), MDAT).unwrap_err();

        assert!(matches!(
            err,
            FragmentError::HeaderPlacement {
                header_len: 11,
                destination_offset: 10
            }
        ));
    }

    #[test]
    fn oversized_box_is_rejected() {
        assert!(matches!(
            BoxHeader::for_payload(u32::MAX, MDAT),
            Err(FragmentError::BoxTooLarge(_))
        ));
    }
}
