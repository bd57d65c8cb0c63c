//! Multiple sequence alignments: the curated reference and per-query samples
//!
//! A `SampleAlignment` can only be built from an alignment whose leading rows are
//! the reference rows (same names, same order, same residues) followed by exactly
//! one query row, so the column mapper never has to trust row positions blindly.

use anyhow::Result;
use std::path::Path;

use crate::error::PredictError;
use crate::fasta::{self, SequenceRecord};

pub const GAP: u8 = b'-';

/// Normalize one aligned symbol: upper-case letters, `.` becomes a gap.
/// Returns `None` for anything that is neither a letter nor a gap.
fn normalize_symbol(symbol: u8) -> Option<u8> {
    match symbol {
        b'-' | b'.' => Some(GAP),
        s if s.is_ascii_alphabetic() => Some(s.to_ascii_uppercase()),
        _ => None,
    }
}

/// Named rows of equal length
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alignment {
    names: Vec<String>,
    rows: Vec<Vec<u8>>,
    width: usize,
}

impl Alignment {
    /// Build an alignment from parsed records, checking symbols and row lengths.
    /// `source_name` is only used in error messages.
    pub fn from_records(records: Vec<SequenceRecord>, source_name: &str) -> Result<Self> {
        if records.is_empty() {
            return Err(PredictError::malformed_alignment(source_name, "no rows").into());
        }

        let width = records[0].sequence.len();
        let mut names = Vec::with_capacity(records.len());
        let mut rows = Vec::with_capacity(records.len());

        for record in records {
            if record.sequence.is_empty() {
                return Err(PredictError::malformed_alignment(
                    source_name,
                    format!("row '{}' is empty", record.name),
                )
                .into());
            }
            if record.sequence.len() != width {
                return Err(PredictError::malformed_alignment(
                    source_name,
                    format!(
                        "row '{}' has {} columns, expected {}",
                        record.name,
                        record.sequence.len(),
                        width
                    ),
                )
                .into());
            }

            let mut row = Vec::with_capacity(width);
            for (pos, &symbol) in record.sequence.iter().enumerate() {
                match normalize_symbol(symbol) {
                    Some(s) => row.push(s),
                    None => {
                        return Err(PredictError::malformed_alignment(
                            source_name,
                            format!(
                                "row '{}' has invalid symbol '{}' at column {}",
                                record.name,
                                symbol.escape_ascii(),
                                pos
                            ),
                        )
                        .into())
                    }
                }
            }

            names.push(record.name);
            rows.push(row);
        }

        Ok(Alignment { names, rows, width })
    }

    /// Build from `(name, row)` pairs; convenient for tests and callers holding strings.
    pub fn from_rows<N, S>(rows: impl IntoIterator<Item = (N, S)>) -> Result<Self>
    where
        N: Into<String>,
        S: AsRef<[u8]>,
    {
        let records = rows
            .into_iter()
            .map(|(name, seq)| SequenceRecord::new(name, seq.as_ref().to_vec()))
            .collect();
        Self::from_records(records, "<memory>")
    }

    /// Parse an aligned FASTA file
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let records = fasta::read_fasta(path)?;
        Self::from_records(records, &path.display().to_string())
    }

    /// Number of columns
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of rows
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn row(&self, index: usize) -> &[u8] {
        &self.rows[index]
    }

    /// Symbol at (row, column)
    pub fn symbol(&self, row: usize, column: usize) -> u8 {
        self.rows[row][column]
    }

    /// Column `column` restricted to the first `num_rows` rows equals `other`'s column
    /// `other_column` over the same rows.
    pub(crate) fn column_matches(
        &self,
        column: usize,
        other: &Alignment,
        other_column: usize,
        num_rows: usize,
    ) -> bool {
        self.rows[..num_rows]
            .iter()
            .zip(&other.rows[..num_rows])
            .all(|(a, b)| a[column] == b[other_column])
    }

    /// Rows back as FASTA records
    pub fn to_records(&self) -> Vec<SequenceRecord> {
        self.names
            .iter()
            .zip(&self.rows)
            .map(|(name, row)| SequenceRecord::new(name.clone(), row.clone()))
            .collect()
    }

    /// Residues of a row with gaps removed
    pub fn ungapped(&self, index: usize) -> Vec<u8> {
        self.rows[index]
            .iter()
            .copied()
            .filter(|&s| s != GAP)
            .collect()
    }
}

/// The curated reference alignment; loaded once and shared read-only
pub type ReferenceAlignment = Alignment;

/// The reference rows re-aligned together with one trailing query row
#[derive(Debug, Clone)]
pub struct SampleAlignment {
    alignment: Alignment,
}

impl SampleAlignment {
    /// Validate that `alignment` extends `reference` by exactly one trailing row.
    pub fn new(reference: &ReferenceAlignment, alignment: Alignment) -> Result<Self> {
        let expected_rows = reference.num_rows() + 1;
        if alignment.num_rows() != expected_rows {
            return Err(PredictError::SampleMismatch(format!(
                "expected {} rows ({} reference + 1 query), got {}",
                expected_rows,
                reference.num_rows(),
                alignment.num_rows()
            ))
            .into());
        }

        if alignment.width() < reference.width() {
            return Err(PredictError::SampleMismatch(format!(
                "sample has {} columns, fewer than the reference's {}",
                alignment.width(),
                reference.width()
            ))
            .into());
        }

        for (index, name) in reference.names().iter().enumerate() {
            let sample_name = &alignment.names()[index];
            if sample_name != name {
                return Err(PredictError::SampleMismatch(format!(
                    "row {index} is '{sample_name}', expected reference row '{name}'"
                ))
                .into());
            }
            if alignment.ungapped(index) != reference.ungapped(index) {
                return Err(PredictError::SampleMismatch(format!(
                    "residues of reference row '{name}' changed during realignment"
                ))
                .into());
            }
        }

        Ok(SampleAlignment { alignment })
    }

    pub fn alignment(&self) -> &Alignment {
        &self.alignment
    }

    pub fn width(&self) -> usize {
        self.alignment.width()
    }

    /// Number of leading rows that came from the reference
    pub fn reference_rows(&self) -> usize {
        self.alignment.num_rows() - 1
    }

    pub fn query_name(&self) -> &str {
        &self.alignment.names()[self.reference_rows()]
    }

    /// The trailing (query) row
    pub fn query_row(&self) -> &[u8] {
        self.alignment.row(self.reference_rows())
    }
}
