//! Feature definitions over reference columns and per-sequence feature extraction
//!
//! Definitions come from a JSON object mapping a feature name to either a list of
//! 0-based reference columns or a list of column pairs. The shape is resolved once
//! at load time into `FeatureDefinition`.

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::alignment::{ReferenceAlignment, SampleAlignment};
use crate::column_map::ColumnMap;
use crate::error::PredictError;

/// Columns of one named feature, in reference column space
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureDefinition {
    /// One residue per column
    Single(Vec<usize>),
    /// Two residues per entry, e.g. disulfide partners
    Paired(Vec<(usize, usize)>),
}

impl FeatureDefinition {
    /// Number of entries (positions) in the feature
    pub fn len(&self) -> usize {
        match self {
            FeatureDefinition::Single(columns) => columns.len(),
            FeatureDefinition::Paired(pairs) => pairs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_paired(&self) -> bool {
        matches!(self, FeatureDefinition::Paired(_))
    }

    /// Largest referenced column
    fn max_column(&self) -> Option<usize> {
        match self {
            FeatureDefinition::Single(columns) => columns.iter().copied().max(),
            FeatureDefinition::Paired(pairs) => pairs.iter().map(|&(a, b)| a.max(b)).max(),
        }
    }

    /// Resolve the JSON entries of feature `name` into a definition
    fn from_json(name: &str, value: &Value) -> Result<Self> {
        let entries = value.as_array().ok_or_else(|| {
            PredictError::feature_definition(name, "expected a list of columns or column pairs")
        })?;

        let first = entries
            .first()
            .ok_or_else(|| PredictError::feature_definition(name, "no columns listed"))?;

        if first.is_array() {
            let pairs = entries
                .iter()
                .enumerate()
                .map(|(i, entry)| parse_pair(entry).ok_or(i))
                .collect::<Result<Vec<_>, usize>>()
                .map_err(|i| {
                    PredictError::feature_definition(
                        name,
                        format!("entry {i} is not a pair of column indices"),
                    )
                })?;
            Ok(FeatureDefinition::Paired(pairs))
        } else {
            let columns = entries
                .iter()
                .enumerate()
                .map(|(i, entry)| parse_column(entry).ok_or(i))
                .collect::<Result<Vec<_>, usize>>()
                .map_err(|i| {
                    PredictError::feature_definition(
                        name,
                        format!("entry {i} is not a column index"),
                    )
                })?;
            Ok(FeatureDefinition::Single(columns))
        }
    }
}

fn parse_column(value: &Value) -> Option<usize> {
    value.as_u64().and_then(|v| usize::try_from(v).ok())
}

fn parse_pair(value: &Value) -> Option<(usize, usize)> {
    match value.as_array()?.as_slice() {
        [a, b] => Some((parse_column(a)?, parse_column(b)?)),
        _ => None,
    }
}

/// All feature definitions, in document order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureSet {
    definitions: IndexMap<String, FeatureDefinition>,
}

impl FeatureSet {
    pub fn new(definitions: IndexMap<String, FeatureDefinition>) -> Self {
        FeatureSet { definitions }
    }

    /// Parse a definition document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: IndexMap<String, Value> =
            serde_json::from_str(json).context("Feature definitions must be a JSON object")?;

        let mut definitions = IndexMap::with_capacity(raw.len());
        for (name, value) in &raw {
            definitions.insert(name.clone(), FeatureDefinition::from_json(name, value)?);
        }

        Ok(FeatureSet { definitions })
    }

    /// Load a definition document from disk
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read feature definitions: {}", path.display()))?;
        Self::from_json_str(&content)
            .with_context(|| format!("Failed to load feature definitions: {}", path.display()))
    }

    /// Check every column index against the reference width
    pub fn validate_against(&self, reference: &ReferenceAlignment) -> Result<()> {
        for (name, definition) in &self.definitions {
            if let Some(max) = definition.max_column() {
                if max >= reference.width() {
                    return Err(PredictError::feature_definition(
                        name.as_str(),
                        format!(
                            "column {} is outside the reference alignment ({} columns)",
                            max,
                            reference.width()
                        ),
                    )
                    .into());
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FeatureDefinition> {
        self.definitions.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FeatureDefinition)> {
        self.definitions.iter()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

/// A residue read from the query row, or the marker for an unmapped reference column.
/// Serialized as a one-letter string, or `null` when unmapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<char>", into = "Option<char>")]
pub enum Residue {
    Symbol(char),
    Unmapped,
}

impl Residue {
    pub fn symbol(&self) -> Option<char> {
        match self {
            Residue::Symbol(c) => Some(*c),
            Residue::Unmapped => None,
        }
    }

    pub fn is_unmapped(&self) -> bool {
        matches!(self, Residue::Unmapped)
    }
}

impl From<Option<char>> for Residue {
    fn from(value: Option<char>) -> Self {
        match value {
            Some(c) => Residue::Symbol(c),
            None => Residue::Unmapped,
        }
    }
}

impl From<Residue> for Option<char> {
    fn from(value: Residue) -> Self {
        value.symbol()
    }
}

/// Extracted residues of one feature, in definition order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValues {
    Single(Vec<Residue>),
    Paired(Vec<[Residue; 2]>),
}

impl FeatureValues {
    pub fn len(&self) -> usize {
        match self {
            FeatureValues::Single(residues) => residues.len(),
            FeatureValues::Paired(pairs) => pairs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether any entry hit an unmapped reference column
    pub fn has_unmapped(&self) -> bool {
        match self {
            FeatureValues::Single(residues) => residues.iter().any(Residue::is_unmapped),
            FeatureValues::Paired(pairs) => pairs.iter().flatten().any(Residue::is_unmapped),
        }
    }
}

/// Feature name to extracted values for one query sequence
pub type FeatureVector = IndexMap<String, FeatureValues>;

/// Query-row residue at the sample column mapped from reference column `column`
fn residue_at(query_row: &[u8], map: &ColumnMap, column: usize) -> Residue {
    map.get(column)
        .and_then(|sample_column| query_row.get(sample_column))
        .map(|&s| Residue::Symbol(s as char))
        .unwrap_or(Residue::Unmapped)
}

/// Extract the query's residues for every feature definition
pub fn generate_features(
    sample: &SampleAlignment,
    map: &ColumnMap,
    features: &FeatureSet,
) -> FeatureVector {
    let query_row = sample.query_row();

    features
        .iter()
        .map(|(name, definition)| {
            let values = match definition {
                FeatureDefinition::Single(columns) => FeatureValues::Single(
                    columns
                        .iter()
                        .map(|&c| residue_at(query_row, map, c))
                        .collect(),
                ),
                FeatureDefinition::Paired(pairs) => FeatureValues::Paired(
                    pairs
                        .iter()
                        .map(|&(a, b)| [residue_at(query_row, map, a), residue_at(query_row, map, b)])
                        .collect(),
                ),
            };
            (name.clone(), values)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::Alignment;

    #[test]
    fn test_definition_shapes_resolve_at_load() {
        let set = FeatureSet::from_json_str(r#"{"cat": [0, 2, 4], "ssbonds": [[1, 3], [0, 4]]}"#)
            .unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set.get("cat"), Some(&FeatureDefinition::Single(vec![0, 2, 4])));
        assert_eq!(
            set.get("ssbonds"),
            Some(&FeatureDefinition::Paired(vec![(1, 3), (0, 4)]))
        );
    }

    #[test]
    fn test_document_order_is_preserved() {
        let set = FeatureSet::from_json_str(r#"{"zeta": [0], "alpha": [1], "mid": [2]}"#).unwrap();
        let names: Vec<&str> = set.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_mixed_entries_are_rejected() {
        for doc in [
            r#"{"bad": [0, [1, 2]]}"#,
            r#"{"bad": [[1, 2], 3]}"#,
            r#"{"bad": [[1, 2, 3]]}"#,
            r#"{"bad": ["A"]}"#,
            r#"{"bad": [-1]}"#,
            r#"{"bad": []}"#,
            r#"{"bad": 3}"#,
        ] {
            let err = FeatureSet::from_json_str(doc).unwrap_err();
            assert!(
                matches!(
                    err.downcast_ref::<PredictError>(),
                    Some(PredictError::FeatureDefinition { .. })
                ),
                "expected a definition error for {doc}, got {err:?}"
            );
        }
    }

    #[test]
    fn test_columns_outside_reference_are_rejected() {
        let reference = Alignment::from_rows([("r1", "ACD")]).unwrap();
        let set = FeatureSet::from_json_str(r#"{"cat": [0, 3]}"#).unwrap();
        assert!(set.validate_against(&reference).is_err());

        let set = FeatureSet::from_json_str(r#"{"cat": [0, 2]}"#).unwrap();
        assert!(set.validate_against(&reference).is_ok());
    }

    #[test]
    fn test_residue_serialization() {
        let values = FeatureValues::Paired(vec![[Residue::Symbol('C'), Residue::Unmapped]]);
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(json, r#"[["C",null]]"#);

        let back: FeatureValues = serde_json::from_str(&json).unwrap();
        assert_eq!(back, values);

        let single: FeatureValues = serde_json::from_str(r#"["A","D",null]"#).unwrap();
        assert!(matches!(single, FeatureValues::Single(ref r) if r.len() == 3));
        assert!(single.has_unmapped());
    }
}
