//! Scoring of the feature table and the final ranking
//!
//! The classifier is external: `CommandScorer` hands it the table as TSV and reads
//! back one `name\tlabel\tproba` row per input row.

use anyhow::{Context, Result};
use ordered_float::OrderedFloat;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::aligner::scoped_temp_file;
use crate::error::PredictError;
use crate::flatten::FeatureTable;

/// Classifier output for one sequence
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub name: String,
    pub label: u8,
    /// Probability of the positive (active) class
    pub proba: f64,
}

/// Scores every row of a feature table, returning predictions in row order
pub trait Scorer {
    fn score(&self, table: &FeatureTable) -> Result<Vec<Prediction>>;
}

/// `<program> --model <model> --input <table.tsv> --output <predictions.tsv>`
pub struct CommandScorer {
    program: PathBuf,
    model: PathBuf,
    temp_dir: Option<PathBuf>,
}

impl CommandScorer {
    pub fn new(program: PathBuf, model: PathBuf) -> Self {
        CommandScorer {
            program,
            model,
            temp_dir: None,
        }
    }

    pub fn with_temp_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.temp_dir = dir;
        self
    }
}

impl Scorer for CommandScorer {
    fn score(&self, table: &FeatureTable) -> Result<Vec<Prediction>> {
        let temp_dir = self.temp_dir.as_deref();
        let input = scoped_temp_file("polpredict_table_", ".tsv", temp_dir)?;
        let output = scoped_temp_file("polpredict_predictions_", ".tsv", temp_dir)?;

        {
            let mut writer = BufWriter::new(input.as_file());
            table.write_tsv(&mut writer)?;
            writer.flush()?;
        }

        let status = Command::new(&self.program)
            .arg("--model")
            .arg(&self.model)
            .arg("--input")
            .arg(input.path())
            .arg("--output")
            .arg(output.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("Failed to launch {}", self.program.display()))?;

        if !status.status.success() {
            return Err(PredictError::external_tool(
                "scorer",
                format!(
                    "{} ({})",
                    status.status,
                    String::from_utf8_lossy(&status.stderr).trim()
                ),
            )
            .into());
        }

        let reader = BufReader::new(File::open(output.path())?);
        let predictions = parse_predictions(reader)?;
        align_to_table(table, predictions)
    }
}

/// Header row of the scorer output
const PREDICTION_HEADER: [&str; 3] = ["name", "label", "proba"];

/// Parse `name\tlabel\tproba` rows; a leading header row is skipped
pub fn parse_predictions<R: BufRead>(reader: R) -> Result<Vec<Prediction>> {
    let mut predictions = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.trim_end().split('\t').collect();
        if i == 0 && fields.iter().map(|f| f.trim()).eq(PREDICTION_HEADER) {
            continue;
        }
        if fields.len() < 3 {
            return Err(PredictError::ScorerOutput(format!(
                "line {} has {} fields, expected name, label, proba",
                i + 1,
                fields.len()
            ))
            .into());
        }

        let label = fields[1].trim().parse::<f64>().ok().and_then(|v| match v {
            v if v == 0.0 => Some(0u8),
            v if v == 1.0 => Some(1u8),
            _ => None,
        });
        let proba = fields[2]
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|p| (0.0..=1.0).contains(p));

        match (label, proba) {
            (Some(label), Some(proba)) => predictions.push(Prediction {
                name: fields[0].to_string(),
                label,
                proba,
            }),
            _ => {
                return Err(PredictError::ScorerOutput(format!(
                    "line {}: invalid label '{}' or probability '{}'",
                    i + 1,
                    fields[1],
                    fields[2]
                ))
                .into())
            }
        }
    }

    Ok(predictions)
}

/// Reorder predictions to the table's row order; every row needs exactly one prediction
fn align_to_table(table: &FeatureTable, predictions: Vec<Prediction>) -> Result<Vec<Prediction>> {
    let mut by_name: HashMap<String, Prediction> = predictions
        .into_iter()
        .map(|p| (p.name.clone(), p))
        .collect();

    let aligned = table
        .rows
        .iter()
        .map(|row| {
            by_name.remove(&row.name).ok_or_else(|| {
                PredictError::ScorerOutput(format!("no prediction for '{}'", row.name))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(extra) = by_name.keys().next() {
        return Err(PredictError::ScorerOutput(format!(
            "prediction for '{extra}' which is not in the table"
        ))
        .into());
    }

    Ok(aligned)
}

/// Sort by descending probability; equal probabilities keep their input order
pub fn rank(mut predictions: Vec<Prediction>) -> Vec<Prediction> {
    predictions.sort_by_key(|p| std::cmp::Reverse(OrderedFloat(p.proba)));
    predictions
}

/// Write the ranked predictions as `name\tproba\tlabel`
pub fn write_ranked<W: Write>(writer: &mut W, predictions: &[Prediction]) -> Result<()> {
    writeln!(writer, "name\tproba\tlabel")?;
    for p in predictions {
        writeln!(writer, "{}\t{}\t{}", p.name, p.proba, p.label)?;
    }
    Ok(())
}

pub fn write_ranked_file<P: AsRef<Path>>(path: P, predictions: &[Prediction]) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("Failed to create output: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    write_ranked(&mut writer, predictions)?;
    writer.flush()?;
    Ok(())
}
