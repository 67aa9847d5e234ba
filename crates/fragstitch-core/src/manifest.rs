use crate::{
    config::{StitchConfig, Strictness},
    extent::{DestinationExtent, ExtentsExt},
    header::HEADER_GAP,
};
use log::{debug, warn};
use serde::{Deserialize, Deserializer};
use std::{fs, path::Path};
use thiserror::Error;

/// One contiguous run of sample bytes in the source file.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize)]
pub struct Chunk {
    #[serde(rename = "Offset", alias = "offset")]
    pub offset: u64,
    #[serde(rename = "Size", alias = "size")]
    pub size: u32,
}

impl Chunk {
    pub const fn new(offset: u64, size: u32) -> Self {
        Self { offset, size }
    }

    /// One past the last source byte of this chunk.
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.size as u64)
    }
}

/// A single reconstructed segment of the output file.
///
/// Field names on the wire follow the producers of these manifests
/// (`TrackID`, `DestinationOffset`, ...); the lower camel case forms are
/// accepted as well.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
pub struct Fragment {
    #[serde(rename = "TrackID", alias = "trackID", alias = "trackId", default)]
    pub track_id: i64,

    #[serde(rename = "DestinationOffset", alias = "destinationOffset")]
    pub destination_offset: u64,

    #[serde(rename = "Duration", alias = "duration", default)]
    pub duration: u64,

    #[serde(rename = "TrackType", alias = "trackType", default)]
    pub track_type: String,

    /// Payload byte count, excluding any header.
    #[serde(rename = "FragmentSize", alias = "fragmentSize", default)]
    pub fragment_size: u32,

    // Metadata only, may be negative.
    #[serde(rename = "SampleCount", alias = "sampleCount", default)]
    pub sample_count: i64,

    #[serde(
        rename = "SampleSizes",
        alias = "sampleSizes",
        default,
        deserialize_with = "null_as_default"
    )]
    pub sample_sizes: Vec<i64>,

    /// Written back-to-back at `destination_offset`, in this order.
    #[serde(
        rename = "Chunks",
        alias = "chunks",
        default,
        deserialize_with = "null_as_default"
    )]
    pub chunks: Vec<Chunk>,

    /// Hex encoded box header placed right before the payload size field.
    #[serde(rename = "HeaderBlob", alias = "headerBlob", default)]
    pub header_blob: Option<String>,
}

impl Fragment {
    /// Sum of the chunk sizes, which is what actually lands at the destination.
    pub fn payload_len(&self) -> u64 {
        self.chunks.iter().map(|chunk| chunk.size as u64).sum()
    }

    /// Bytes occupied before `destination_offset`: the blob plus the size and tag field.
    ///
    /// Odd length blobs fail to decode later on, the length here is only used for
    /// placement checks.
    pub fn header_len(&self) -> u64 {
        match &self.header_blob {
            Some(blob) => (blob.len() / 2) as u64 + HEADER_GAP,
            None => 0,
        }
    }

    /// The destination range this fragment writes to, header included.
    ///
    /// Returns `None` if the header would start before the beginning of the file.
    pub fn extent(&self) -> Option<DestinationExtent> {
        let from = self.destination_offset.checked_sub(self.header_len())?;
        let to = self.destination_offset.saturating_add(self.payload_len());
        Some(DestinationExtent::new(from, to))
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to read manifest")]
    Read(#[source] std::io::Error),
    #[error("Failed to parse manifest")]
    Parse(#[source] serde_json::Error),
    #[error("Fragments {first} and {second} overlap in the destination")]
    Overlap { first: usize, second: usize },
    #[error("Fragment {index} declares {declared} payload bytes but its chunks hold {actual}")]
    SizeMismatch {
        index: usize,
        declared: u32,
        actual: u64,
    },
    #[error("Header of fragment {index} ({header_len} bytes) does not fit before offset {destination_offset}")]
    HeaderUnderflow {
        index: usize,
        header_len: u64,
        destination_offset: u64,
    },
    #[error("Fragment {index} ends at {end}, past the output size of {output_size}")]
    ExceedsOutput {
        index: usize,
        end: u64,
        output_size: u64,
    },
}

/// The ordered fragment list driving a stitch run.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    pub fragments: Vec<Fragment>,
}

impl Manifest {
    pub fn new(fragments: Vec<Fragment>) -> Self {
        Self { fragments }
    }

    pub fn from_slice(data: &[u8]) -> Result<Self, ManifestError> {
        serde_json::from_slice(data).map_err(ManifestError::Parse)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ManifestError> {
        let data = fs::read(path).map_err(ManifestError::Read)?;
        Self::from_slice(&data)
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Total bytes a full run writes, headers included.
    pub fn total_len(&self) -> u64 {
        self.fragments
            .iter()
            .map(|frag| frag.header_len() + frag.payload_len())
            .sum()
    }

    /// Every placement problem in the manifest, in fragment order.
    pub fn problems(&self, output_size: Option<u64>) -> Vec<ManifestError> {
        let mut problems = Vec::new();
        let mut extents = Vec::with_capacity(self.fragments.len());

        for (index, frag) in self.fragments.iter().enumerate() {
            if frag.header_blob.is_some() && frag.payload_len() != frag.fragment_size as u64 {
                problems.push(ManifestError::SizeMismatch {
                    index,
                    declared: frag.fragment_size,
                    actual: frag.payload_len(),
                });
            }

            let Some(extent) = frag.extent() else {
                problems.push(ManifestError::HeaderUnderflow {
                    index,
                    header_len: frag.header_len(),
                    destination_offset: frag.destination_offset,
                });
                continue;
            };

            if let Some(output_size) = output_size {
                if extent.to > output_size {
                    problems.push(ManifestError::ExceedsOutput {
                        index,
                        end: extent.to,
                        output_size,
                    });
                }
            }

            if !extent.is_empty() {
                extents.push((index, extent));
            }
        }

        problems.extend(
            extents
                .find_overlaps()
                .into_iter()
                .map(|(first, second)| ManifestError::Overlap { first, second }),
        );

        problems
    }

    /// Checks the manifest according to `config.strictness`.
    ///
    /// Under [`Strictness::Strict`] the first problem is returned as an error. Under
    /// [`Strictness::Warn`] problems are logged and handed back to the caller.
    pub fn validate(&self, config: &StitchConfig) -> Result<Vec<ManifestError>, ManifestError> {
        if config.strictness == Strictness::Trust {
            debug!("Skipping manifest validation");
            return Ok(Vec::new());
        }

        let mut problems = self.problems(config.output_size);

        if config.strictness == Strictness::Strict && !problems.is_empty() {
            return Err(problems.swap_remove(0));
        }

        for problem in &problems {
            warn!("{}", problem);
        }

        Ok(problems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frag(destination_offset: u64, chunks: &[(u64, u32)]) -> Fragment {
        let chunks: Vec<Chunk> = chunks
            .iter()
            .map(|&(offset, size)| Chunk::new(offset, size))
            .collect();
        Fragment {
            destination_offset,
            fragment_size: chunks.iter().map(|c| c.size).sum(),
            chunks,
            ..Default::default()
        }
    }

    #[test]
    fn parses_producer_field_names() {
        let json = br#"[
            {
                "TrackID": 1,
                "DestinationOffset": 4096,
                "Duration": 1001,
                "TrackType": "vide",
                "FragmentSize": 80,
                "SampleCount": 2,
                "SampleSizes": [50, 30],
                "Chunks": [{"Offset": 100, "Size": 50}, {"Offset": 200, "Size": 30}]
            }
        ]"#;

        let manifest = Manifest::from_slice(json).unwrap();
        assert_eq!(manifest.len(), 1);

        let frag = &manifest.fragments[0];
        assert_eq!(frag.track_id, 1);
        assert_eq!(frag.destination_offset, 4096);
        assert_eq!(frag.track_type, "vide");
        assert_eq!(frag.sample_sizes, vec![50, 30]);
        assert_eq!(frag.chunks, vec![Chunk::new(100, 50), Chunk::new(200, 30)]);
        assert_eq!(frag.header_blob, None);
    }

    #[test]
    fn parses_camel_case_and_nulls() {
        let json = br#"[
            {
                "trackID": 2,
                "destinationOffset": 2000,
                "fragmentSize": 0,
                "sampleSizes": null,
                "chunks": null,
                "headerBlob": "0000000c6d6f6f66"
            }
        ]"#;

        let manifest = Manifest::from_slice(json).unwrap();
        let frag = &manifest.fragments[0];
        assert_eq!(frag.track_id, 2);
        assert!(frag.chunks.is_empty());
        assert!(frag.sample_sizes.is_empty());
        assert_eq!(frag.header_blob.as_deref(), Some("0000000c6d6f6f66"));
        assert_eq!(frag.header_len(), 16);
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            Manifest::from_slice(b"{\"not\": \"a list\"}"),
            Err(ManifestError::Parse(_))
        ));
    }

    #[test]
    fn accepts_negative_metadata() {
        let json = br#"[
            {
                "TrackID": -1,
                "DestinationOffset": 64,
                "SampleCount": -1,
                "SampleSizes": [-1, 12],
                "Chunks": [{"Offset": 0, "Size": 12}]
            }
        ]"#;

        let manifest = Manifest::from_slice(json).unwrap();
        let frag = &manifest.fragments[0];
        assert_eq!(frag.track_id, -1);
        assert_eq!(frag.sample_count, -1);
        assert_eq!(frag.sample_sizes, vec![-1, 12]);
        assert_eq!(frag.payload_len(), 12);
    }

    #[test]
    fn chunk_offsets_keep_64_bits() {
        let json = br#"[{"DestinationOffset": 0, "Chunks": [{"Offset": 8589934592, "Size": 4294967295}]}]"#;
        let manifest = Manifest::from_slice(json).unwrap();
        assert_eq!(
            manifest.fragments[0].chunks[0],
            Chunk::new(1 << 33, u32::MAX)
        );
    }

    #[test]
    fn overlapping_fragments_are_fatal_when_strict() {
        let manifest = Manifest::new(vec![
            frag(1000, &[(0, 100)]),
            frag(1050, &[(100, 100)]),
        ]);

        let err = manifest.validate(&StitchConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            ManifestError::Overlap {
                first: 0,
                second: 1
            }
        ));
    }

    #[test]
    fn overlapping_fragments_are_reported_when_warning() {
        let manifest = Manifest::new(vec![
            frag(1050, &[(100, 100)]),
            frag(1000, &[(0, 100)]),
        ]);
        let config = StitchConfig {
            strictness: Strictness::Warn,
            ..Default::default()
        };

        let problems = manifest.validate(&config).unwrap();
        assert_eq!(problems.len(), 1);
        assert!(matches!(problems[0], ManifestError::Overlap { .. }));
    }

    #[test]
    fn trust_skips_checks() {
        let manifest = Manifest::new(vec![frag(0, &[(0, 10)]), frag(0, &[(0, 10)])]);
        let config = StitchConfig {
            strictness: Strictness::Trust,
            ..Default::default()
        };

        assert!(manifest.validate(&config).unwrap().is_empty());
    }

    #[test]
    fn adjacent_fragments_do_not_overlap() {
        let manifest = Manifest::new(vec![
            frag(0, &[(0, 100)]),
            frag(100, &[(500, 20), (100, 30)]),
            frag(150, &[]),
        ]);

        assert!(manifest.problems(None).is_empty());
        assert_eq!(manifest.total_len(), 150);
    }

    #[test]
    fn header_counts_towards_extent() {
        let mut second = frag(120, &[(0, 10)]);
        // 8 byte blob + 8 byte size/tag field reaches back to 104.
        second.header_blob = Some("0011223344556677".to_string());
        let manifest = Manifest::new(vec![frag(100, &[(0, 5)]), second]);

        assert!(matches!(
            manifest.problems(None).as_slice(),
            [ManifestError::Overlap {
                first: 0,
                second: 1
            }]
        ));
    }

    #[test]
    fn header_must_fit_before_destination() {
        let mut fragment = frag(4, &[(0, 10)]);
        fragment.header_blob = Some(String::new());

        assert_eq!(fragment.extent(), None);
        assert!(matches!(
            Manifest::new(vec![fragment]).problems(None).as_slice(),
            [ManifestError::HeaderUnderflow {
                index: 0,
                header_len: 8,
                destination_offset: 4
            }]
        ));
    }

    #[test]
    fn size_mismatch_only_matters_with_header() {
        let mut plain = frag(0, &[(0, 10)]);
        plain.fragment_size = 99;
        let mut boxed = frag(100, &[(0, 10)]);
        boxed.fragment_size = 99;
        boxed.header_blob = Some(String::new());

        let problems = Manifest::new(vec![plain, boxed]).problems(None);
        assert!(matches!(
            problems.as_slice(),
            [ManifestError::SizeMismatch {
                index: 1,
                declared: 99,
                actual: 10
            }]
        ));
    }

    #[test]
    fn output_size_bounds_fragments() {
        let manifest = Manifest::new(vec![frag(0, &[(0, 10)]), frag(10, &[(0, 10)])]);

        assert!(manifest.problems(Some(20)).is_empty());
        assert!(matches!(
            manifest.problems(Some(15)).as_slice(),
            [ManifestError::ExceedsOutput {
                index: 1,
                end: 20,
                output_size: 15
            }]
        ));
    }
}
