/// Half open destination byte range `[from, to)` a fragment writes to.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct DestinationExtent {
    pub from: u64,
    pub to: u64,
}

impl DestinationExtent {
    pub const fn new(from: u64, to: u64) -> Self {
        Self { from, to }
    }

    pub fn is_empty(&self) -> bool {
        self.to <= self.from
    }

    /// Empty extents never overlap anything.
    pub fn overlaps(&self, other: &DestinationExtent) -> bool {
        !self.is_empty() && !other.is_empty() && self.from < other.to && other.from < self.to
    }
}

/// Overlap detection over extents tagged with the index of their fragment.
pub trait ExtentsExt {
    /// Pairs of fragment indices whose extents overlap, lower index first.
    ///
    /// Each extent is reported against the furthest reaching extent that starts
    /// before it, so a chain of overlaps yields one pair per offending fragment.
    fn find_overlaps(&self) -> Vec<(usize, usize)>;
}

impl ExtentsExt for [(usize, DestinationExtent)] {
    fn find_overlaps(&self) -> Vec<(usize, usize)> {
        let mut sorted = self.to_vec();
        sorted.sort_by_key(|(index, extent)| (extent.from, *index));

        let mut overlaps = Vec::new();
        let mut reach: Option<(usize, DestinationExtent)> = None;

        for (index, extent) in sorted {
            match reach {
                Some((prev_index, prev)) if prev.overlaps(&extent) => {
                    overlaps.push((prev_index.min(index), prev_index.max(index)));
                    if extent.to > prev.to {
                        reach = Some((index, extent));
                    }
                }
                Some((_, prev)) if prev.to >= extent.to => {}
                _ => reach = Some((index, extent)),
            }
        }

        overlaps.sort_unstable();
        overlaps
    }
}
