//! Flattening of feature vectors into the classifier's input table
//!
//! Every (feature, position) gets a synthetic field name
//! `"{ordinal}_{feature}_{position}"`. Ordinals are a running counter over the schema's
//! feature order and the positions inside each feature, computed from the definitions
//! rather than from any one sequence, so field names are identical across sequences
//! and runs.

use anyhow::Result;
use indexmap::{IndexMap, IndexSet};
use std::io::Write;

use crate::error::PredictError;
use crate::features::{FeatureSet, FeatureValues, FeatureVector, Residue};
use crate::model::ModelSchema;

const CYSTEINE: char = 'C';

/// Scalar fields of one sequence, keyed by synthetic field name
pub type FlattenedRecord = IndexMap<String, String>;

#[derive(Debug, Clone)]
struct LayoutFeature {
    name: String,
    binarize: bool,
    paired: bool,
    len: usize,
    first_ordinal: usize,
}

/// Field naming for a feature set under a model schema
#[derive(Debug, Clone)]
pub struct FieldLayout {
    features: Vec<LayoutFeature>,
    field_names: IndexSet<String>,
}

/// Synthetic field name
pub fn field_name(ordinal: usize, feature: &str, position: usize) -> String {
    format!("{ordinal}_{feature}_{position}")
}

/// "1" iff both residues are cysteine; `None` if either side is unmapped
pub fn binarize_pair(pair: &[Residue; 2]) -> Option<&'static str> {
    match (pair[0].symbol(), pair[1].symbol()) {
        (Some(a), Some(b)) => Some(if a == CYSTEINE && b == CYSTEINE { "1" } else { "0" }),
        _ => None,
    }
}

impl FieldLayout {
    pub fn new(features: &FeatureSet, schema: &ModelSchema) -> Result<Self> {
        let mut layout_features = Vec::with_capacity(schema.features.len());
        let mut field_names = IndexSet::new();
        let mut ordinal = 0usize;

        for schema_feature in &schema.features {
            let definition = features.get(&schema_feature.name).ok_or_else(|| {
                PredictError::Schema(format!(
                    "feature '{}' has no definition",
                    schema_feature.name
                ))
            })?;

            if schema_feature.binarize && !definition.is_paired() {
                return Err(PredictError::Schema(format!(
                    "feature '{}' is binarized but its entries are not column pairs",
                    schema_feature.name
                ))
                .into());
            }

            for position in 0..definition.len() {
                field_names.insert(field_name(ordinal + position, &schema_feature.name, position));
            }

            layout_features.push(LayoutFeature {
                name: schema_feature.name.clone(),
                binarize: schema_feature.binarize,
                paired: definition.is_paired(),
                len: definition.len(),
                first_ordinal: ordinal,
            });
            ordinal += definition.len();
        }

        Ok(FieldLayout {
            features: layout_features,
            field_names,
        })
    }

    /// All field names in ordinal order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.field_names.iter().map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.field_names.contains(field)
    }

    /// Fail on the first selected field this layout can never produce
    pub fn check_selected(&self, selected: &[String]) -> Result<()> {
        match selected.iter().find(|field| !self.contains(field.as_str())) {
            Some(unknown) => Err(PredictError::UnknownField(unknown.clone()).into()),
            None => Ok(()),
        }
    }

    /// Expand one feature vector. Unmapped residues leave their field out.
    /// A vector missing a feature, or with a different shape than the definitions,
    /// is an error for that sequence.
    pub fn flatten(&self, vector: &FeatureVector) -> Result<FlattenedRecord> {
        let mut record = FlattenedRecord::with_capacity(self.field_names.len());

        for feature in &self.features {
            let values = vector
                .get(&feature.name)
                .ok_or_else(|| anyhow::anyhow!("feature '{}' is missing", feature.name))?;

            if values.len() != feature.len {
                anyhow::bail!(
                    "feature '{}' has {} entries, expected {}",
                    feature.name,
                    values.len(),
                    feature.len
                );
            }

            match values {
                FeatureValues::Single(residues) if !feature.paired => {
                    for (position, residue) in residues.iter().enumerate() {
                        if let Some(symbol) = residue.symbol() {
                            record.insert(
                                field_name(feature.first_ordinal + position, &feature.name, position),
                                symbol.to_string(),
                            );
                        }
                    }
                }
                FeatureValues::Paired(pairs) if feature.paired => {
                    for (position, pair) in pairs.iter().enumerate() {
                        let value = if feature.binarize {
                            binarize_pair(pair).map(str::to_string)
                        } else {
                            pair[0]
                                .symbol()
                                .zip(pair[1].symbol())
                                .map(|(a, b)| format!("{a}{b}"))
                        };
                        if let Some(value) = value {
                            record.insert(
                                field_name(feature.first_ordinal + position, &feature.name, position),
                                value,
                            );
                        }
                    }
                }
                _ => anyhow::bail!(
                    "feature '{}' does not have the shape of its definition",
                    feature.name
                ),
            }
        }

        Ok(record)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub name: String,
    pub values: Vec<String>,
}

/// Rows are sequences, columns are the selected fields in schema order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeatureTable {
    pub columns: Vec<String>,
    pub rows: Vec<TableRow>,
}

impl FeatureTable {
    /// Tab-separated with a `name` header column
    pub fn write_tsv<W: Write>(&self, writer: &mut W) -> Result<()> {
        write!(writer, "name")?;
        for column in &self.columns {
            write!(writer, "\t{column}")?;
        }
        writeln!(writer)?;

        for row in &self.rows {
            write!(writer, "{}", row.name)?;
            for value in &row.values {
                write!(writer, "\t{value}")?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A sequence left out of the table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct SelectionOutcome {
    pub table: FeatureTable,
    pub rejected: Vec<Rejection>,
}

/// Flatten every vector and project onto `selected`.
///
/// A selected field the layout never produces is fatal. A sequence lacking a
/// selected field is rejected on its own; if no sequence survives, that is fatal too.
pub fn build_table<'a, I>(entries: I, layout: &FieldLayout, selected: &[String]) -> Result<SelectionOutcome>
where
    I: IntoIterator<Item = (&'a str, &'a FeatureVector)>,
{
    layout.check_selected(selected)?;

    let mut outcome = SelectionOutcome {
        table: FeatureTable {
            columns: selected.to_vec(),
            rows: Vec::new(),
        },
        rejected: Vec::new(),
    };

    for (name, vector) in entries {
        let record = match layout.flatten(vector) {
            Ok(record) => record,
            Err(e) => {
                log::warn!("[table] {name}: {e}");
                outcome.rejected.push(Rejection {
                    name: name.to_string(),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let mut values = Vec::with_capacity(selected.len());
        let mut missing = None;
        for field in selected {
            match record.get(field) {
                Some(value) => values.push(value.clone()),
                None => {
                    missing = Some(field);
                    break;
                }
            }
        }

        match missing {
            Some(field) => {
                let reason = format!("selected field '{field}' depends on an unmapped column");
                log::warn!("[table] {name}: {reason}");
                outcome.rejected.push(Rejection {
                    name: name.to_string(),
                    reason,
                });
            }
            None => outcome.table.rows.push(TableRow {
                name: name.to_string(),
                values,
            }),
        }
    }

    if outcome.table.is_empty() {
        return Err(PredictError::EmptyTable {
            rejected: outcome.rejected.len(),
        }
        .into());
    }

    Ok(outcome)
}
