//! Input schema of the pretrained classifier
//!
//! The schema fixes which features are flattened (and in which order, since the
//! order drives the ordinals in field names), which paired features are reduced
//! to a disulfide indicator, and which flattened fields the model consumes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One feature as the model sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaFeature {
    pub name: String,
    /// Reduce each residue pair to "1" (both cysteine) or "0"
    #[serde(default)]
    pub binarize: bool,
}

impl SchemaFeature {
    fn plain(name: &str) -> Self {
        SchemaFeature {
            name: name.to_string(),
            binarize: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSchema {
    /// Flattening order
    pub features: Vec<SchemaFeature>,
    /// Field names the classifier expects, in column order
    pub selected: Vec<String>,
}

impl Default for ModelSchema {
    /// Schema of the shipped DNA polymerase B activity model
    fn default() -> Self {
        let features = [
            "catalytic",
            "dntp_binding",
            "primer_binding",
            "exonuclease",
            "Mg",
            "replication_activity",
            "conservative",
            "ssbonds",
            "pockets",
        ]
        .into_iter()
        .map(|name| SchemaFeature {
            binarize: name == "ssbonds",
            ..SchemaFeature::plain(name)
        })
        .collect();

        let selected = [
            "5_dntp_binding_2",
            "101_pockets_2",
            "14_primer_binding_4",
            "43_replication_activity_3",
            "15_primer_binding_5",
            "8_dntp_binding_5",
            "90_conservative_29",
            "66_conservative_5",
            "70_conservative_9",
            "39_Mg_5",
            "27_exonuclease_9",
            "93_conservative_32",
            "67_conservative_6",
            "28_exonuclease_10",
            "37_Mg_3",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        ModelSchema { features, selected }
    }
}

impl ModelSchema {
    /// Load a schema document, e.g.
    /// `{"features": [{"name": "cat"}, {"name": "ss", "binarize": true}], "selected": ["0_cat_0"]}`
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model schema: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse model schema: {}", path.display()))
    }

    /// The given schema file, or the built-in schema
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::read(path),
            None => Ok(Self::default()),
        }
    }
}
