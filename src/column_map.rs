//! Reference-to-sample column correspondence
//!
//! The realigner only ever inserts columns into the reference alignment, so each
//! reference column reappears in the sample, in order, as a column whose
//! reference-row projection is identical. A forward scan over the sample columns
//! recovers the correspondence.

use crate::alignment::{ReferenceAlignment, SampleAlignment};

/// Sample column for every reference column; `None` marks a column the scan could not match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    entries: Vec<Option<usize>>,
}

impl ColumnMap {
    /// Identity map over `width` columns
    pub fn identity(width: usize) -> Self {
        ColumnMap {
            entries: (0..width).map(Some).collect(),
        }
    }

    /// Sample column for reference column `column`; `None` when unmapped or out of range
    pub fn get(&self, column: usize) -> Option<usize> {
        self.entries.get(column).copied().flatten()
    }

    /// Number of reference columns covered
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True iff every reference column found its sample column
    pub fn is_complete(&self) -> bool {
        self.entries.iter().all(Option::is_some)
    }

    /// Reference columns left unmapped, in increasing order
    pub fn unmapped(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.is_none().then_some(i))
            .collect()
    }

    pub fn entries(&self) -> &[Option<usize>] {
        &self.entries
    }
}

/// Compute the reference-to-sample column map.
///
/// Equal widths give the identity. Otherwise each reference column is searched for
/// starting just after the previous match; a column whose search runs off the end
/// of the sample is left unmapped and the cursor stays put for the next column.
pub fn map_columns(reference: &ReferenceAlignment, sample: &SampleAlignment) -> ColumnMap {
    let reference_width = reference.width();
    let sample_width = sample.width();

    if reference_width == sample_width {
        return ColumnMap::identity(reference_width);
    }

    let rows = sample.reference_rows();
    let sample_aln = sample.alignment();
    let mut entries = Vec::with_capacity(reference_width);
    let mut cursor = 0usize;

    for column in 0..reference_width {
        let mut candidate = cursor;
        while candidate < sample_width
            && !reference.column_matches(column, sample_aln, candidate, rows)
        {
            candidate += 1;
        }

        if candidate < sample_width {
            entries.push(Some(candidate));
            cursor = candidate + 1;
        } else {
            entries.push(None);
        }
    }

    ColumnMap { entries }
}
