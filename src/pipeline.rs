//! Per-sequence feature extraction over a worker pool
//!
//! Each query is realigned, column-mapped and read out independently; the only
//! shared state is the read-only reference and feature set. Failures stay with the
//! sequence that caused them and are reported in a manifest next to the results.

use anyhow::{Context, Result};
use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::aligner::{scoped_temp_file, Aligner};
use crate::alignment::{ReferenceAlignment, SampleAlignment};
use crate::column_map::map_columns;
use crate::fasta::{self, SequenceRecord};
use crate::features::{generate_features, FeatureSet, FeatureVector};

/// Features of one query and how well its columns mapped
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceFeatures {
    pub features: FeatureVector,
    /// Reference columns without a sample column; empty when the map is complete
    pub unmapped_columns: Vec<usize>,
}

impl SequenceFeatures {
    pub fn is_complete(&self) -> bool {
        self.unmapped_columns.is_empty()
    }
}

/// A query that produced no features
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceFailure {
    pub name: String,
    pub reason: String,
}

/// Results of a run keyed by sequence name (input order), plus the failure manifest
#[derive(Debug, Clone, Default)]
pub struct FeatureReport {
    pub sequences: IndexMap<String, SequenceFeatures>,
    pub failed: Vec<SequenceFailure>,
}

impl FeatureReport {
    /// Names of sequences with at least one unmapped reference column
    pub fn incomplete(&self) -> Vec<&str> {
        self.sequences
            .iter()
            .filter(|(_, s)| !s.is_complete())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn to_document(&self) -> FeatureDocument {
        FeatureDocument {
            features: self
                .sequences
                .iter()
                .map(|(name, s)| (name.clone(), s.features.clone()))
                .collect(),
            incomplete: self.incomplete().into_iter().map(String::from).collect(),
            failed: self.failed.clone(),
        }
    }
}

/// On-disk form of a run: features per sequence, incomplete names, failure manifest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureDocument {
    pub features: IndexMap<String, FeatureVector>,
    #[serde(default)]
    pub incomplete: Vec<String>,
    #[serde(default)]
    pub failed: Vec<SequenceFailure>,
}

impl FeatureDocument {
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create features file: {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open features file: {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse features file: {}", path.display()))
    }
}

/// Reference alignment as a plain FASTA path the aligner can read.
/// Compressed inputs (gzip or BGZF) are written out once to a temporary file.
pub struct ReferenceFile {
    path: PathBuf,
    _temp: Option<NamedTempFile>,
}

impl ReferenceFile {
    pub fn prepare(
        path: &Path,
        reference: &ReferenceAlignment,
        temp_dir: Option<&Path>,
    ) -> Result<Self> {
        if !fasta::has_compressed_extension(path) {
            return Ok(ReferenceFile {
                path: path.to_path_buf(),
                _temp: None,
            });
        }

        let temp = scoped_temp_file("polpredict_reference_", ".fa", temp_dir)?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            fasta::write_records(&mut writer, &reference.to_records())?;
            writer.flush()?;
        }
        log::debug!(
            "[features] Decompressed reference {} to {}",
            path.display(),
            temp.path().display()
        );

        Ok(ReferenceFile {
            path: temp.path().to_path_buf(),
            _temp: Some(temp),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Drives aligner -> column map -> feature extraction for each query
pub struct FeatureAggregator<'a, A: Aligner> {
    reference: &'a ReferenceAlignment,
    reference_path: &'a Path,
    features: &'a FeatureSet,
    aligner: &'a A,
}

impl<'a, A: Aligner> FeatureAggregator<'a, A> {
    pub fn new(
        reference: &'a ReferenceAlignment,
        reference_path: &'a Path,
        features: &'a FeatureSet,
        aligner: &'a A,
    ) -> Self {
        FeatureAggregator {
            reference,
            reference_path,
            features,
            aligner,
        }
    }

    /// Run the full chain for one query
    pub fn process(&self, query: &SequenceRecord) -> Result<SequenceFeatures> {
        let aligned = self
            .aligner
            .align(self.reference_path, query)
            .with_context(|| format!("Failed to align {}", query.name))?;
        let sample = SampleAlignment::new(self.reference, aligned)?;
        let map = map_columns(self.reference, &sample);

        let unmapped_columns = map.unmapped();
        if !unmapped_columns.is_empty() {
            log::warn!(
                "[features] {}: some alignment columns are incorrect ({} reference column(s) unmapped: {:?})",
                query.name,
                unmapped_columns.len(),
                unmapped_columns
            );
        }

        Ok(SequenceFeatures {
            features: generate_features(&sample, &map, self.features),
            unmapped_columns,
        })
    }

    /// Process every query in parallel. Duplicate names: the later query's
    /// result replaces the earlier one.
    pub fn run(&self, queries: &[SequenceRecord]) -> FeatureReport {
        let results: Vec<(&str, Result<SequenceFeatures>)> = queries
            .par_iter()
            .map(|query| (query.name.as_str(), self.process(query)))
            .collect();

        let mut sequences: IndexMap<String, SequenceFeatures> = IndexMap::new();
        let mut failed: IndexMap<String, String> = IndexMap::new();

        for (name, result) in results {
            if sequences.contains_key(name) || failed.contains_key(name) {
                log::warn!("[features] Duplicate sequence name '{name}'; keeping the later one");
            }
            match result {
                Ok(features) => {
                    failed.shift_remove(name);
                    sequences.insert(name.to_string(), features);
                }
                Err(e) => {
                    log::warn!("[features] {name}: {e:#}");
                    sequences.shift_remove(name);
                    failed.insert(name.to_string(), format!("{e:#}"));
                }
            }
        }

        let report = FeatureReport {
            sequences,
            failed: failed
                .into_iter()
                .map(|(name, reason)| SequenceFailure { name, reason })
                .collect(),
        };

        log::info!(
            "[features] Extracted features for {} sequence(s) ({} incomplete, {} failed)",
            report.sequences.len(),
            report.incomplete().len(),
            report.failed.len()
        );

        report
    }
}
