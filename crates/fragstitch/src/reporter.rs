use std::io::{Seek, SeekFrom, Stdout, Write};

use pbr::{ProgressBar, Units};

/// Counts bytes going to the output on a progress bar.
///
/// Fragments are written all over the output, so the bar tracks how many bytes
/// have been stitched rather than the output position.
pub struct ProgressBarReporter<W> {
    pb: ProgressBar<Stdout>,
    inner: W,
}

impl<W: Write> ProgressBarReporter<W> {
    pub fn new(total_bytes: u64, inner: W) -> Self {
        let mut pb = ProgressBar::new(total_bytes);
        pb.set_units(Units::Bytes);
        pb.message("Stitching ");

        Self { pb, inner }
    }

    pub fn finish(&mut self) {
        self.pb.finish();
    }
}

impl<W: Write> Write for ProgressBarReporter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.pb.add(written as u64);
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Seek> Seek for ProgressBarReporter<W> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}
