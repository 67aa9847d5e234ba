use std::{error::Error, io::BufReader, path::Path};

use fragstitch_core::{
    create_destination, open_source, stitch, Manifest, StitchConfig, StitchError, StitchReport,
};
use log::{info, LevelFilter};

use crate::reporter::ProgressBarReporter;

/// A finished run over every fragment of the manifest.
#[derive(Debug)]
pub struct StitchRun {
    pub report: StitchReport,
    /// Set when the output could not be finished after all fragments ran.
    pub finalize_error: Option<StitchError>,
}

impl StitchRun {
    pub fn is_success(&self) -> bool {
        self.report.is_success() && self.finalize_error.is_none()
    }
}

/// Loads the manifest, then copies every fragment from `source_path` into `output_path`.
///
/// The manifest is loaded and checked before either file is opened. Once the
/// fragments have run, the report is always returned, even if the output cannot
/// be finished.
pub fn stitch_files<P1: AsRef<Path>, P2: AsRef<Path>, P3: AsRef<Path>>(
    manifest_path: &P1,
    source_path: &P2,
    output_path: &P3,
    config: &StitchConfig,
) -> Result<StitchRun, StitchError> {
    let manifest = Manifest::load(manifest_path)?;
    info!("Stats: {} Fragments", manifest.len());

    manifest.validate(config)?;

    let input = BufReader::new(open_source(source_path)?);
    // Unbuffered, so a failed write is charged to the fragment that made it.
    let mut output = create_destination(output_path)?;

    let should_print_progress = log::max_level() == LevelFilter::Info && !manifest.is_empty();

    let report = if should_print_progress {
        let mut reporter = ProgressBarReporter::new(manifest.total_len(), &mut output);
        let report = stitch(&manifest, input, &mut reporter, config);
        reporter.finish();
        println!();
        report
    } else {
        stitch(&manifest, input, &mut output, config)
    };

    let finalize_error = config.output_size.and_then(|output_size| {
        output
            .set_len(output_size)
            .map_err(StitchError::Finalize)
            .err()
    });

    Ok(StitchRun {
        report,
        finalize_error,
    })
}

/// `err: cause: cause` on one line.
pub fn error_chain(err: &dyn Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
