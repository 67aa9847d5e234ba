use crate::header::MDAT;

/// How much of the manifest is checked before any data is copied.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Strictness {
    /// Trust the producer, nothing is checked
    Trust,
    /// Log problems and carry on
    Warn,
    /// Refuse to run on any problem
    #[default]
    Strict,
}

/// Settings for one stitch run. Built once and passed by reference.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StitchConfig {
    pub strictness: Strictness,

    /// Type tag written after the payload size of fragments carrying a header
    pub box_type: [u8; 4],

    /// Final length of the destination, if known up front
    pub output_size: Option<u64>,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            strictness: Strictness::default(),
            box_type: MDAT,
            output_size: None,
        }
    }
}

/// Parses a four character ASCII box type such as `mdat`.
pub fn parse_box_type(s: &str) -> Option<[u8; 4]> {
    if !s.is_ascii() {
        return None;
    }
    s.as_bytes().try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_types() {
        assert_eq!(parse_box_type("mdat"), Some(*b"mdat"));
        assert_eq!(parse_box_type("free"), Some(*b"free"));
        assert_eq!(parse_box_type("mda"), None);
        assert_eq!(parse_box_type("mdats"), None);
        assert_eq!(parse_box_type("mdä"), None);
    }
}
