//! Profile HMM prefilter over candidate sequences (hmmsearch `--tblout`)

use anyhow::{Context, Result};
use indexmap::IndexSet;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::aligner::scoped_temp_file;
use crate::error::PredictError;
use crate::fasta::{self, SequenceRecord};

/// E-value cutoff used when none is given
pub const DEFAULT_EVALUE_THRESHOLD: f64 = 5.0;

/// Columns in a per-target tblout row before the free-text description
const TBLOUT_FIELDS: usize = 18;

/// One per-target row of an hmmsearch `--tblout` table
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub target: String,
    pub query: String,
    pub full_evalue: f64,
    pub full_score: f64,
    /// E-value of the best-scoring single domain
    pub best_evalue: f64,
    pub best_score: f64,
}

fn parse_field<T: std::str::FromStr>(fields: &[&str], index: usize, line_no: usize) -> Result<T> {
    fields[index].parse().map_err(|_| {
        anyhow::anyhow!(
            "tblout line {}: column {} ('{}') is not a number",
            line_no,
            index + 1,
            fields[index]
        )
    })
}

/// Parse a `--tblout` table; `#` lines are comments
pub fn parse_tblout<R: BufRead>(reader: R) -> Result<Vec<SearchHit>> {
    let mut hits = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() < TBLOUT_FIELDS {
            anyhow::bail!(
                "tblout line {} has {} fields, expected at least {}",
                i + 1,
                fields.len(),
                TBLOUT_FIELDS
            );
        }

        hits.push(SearchHit {
            target: fields[0].to_string(),
            query: fields[2].to_string(),
            full_evalue: parse_field(&fields, 4, i + 1)?,
            full_score: parse_field(&fields, 5, i + 1)?,
            best_evalue: parse_field(&fields, 7, i + 1)?,
            best_score: parse_field(&fields, 8, i + 1)?,
        });
    }

    Ok(hits)
}

/// Hit with the lowest best-domain E-value; ties go to the higher domain score
pub fn best_hit(hits: &[SearchHit]) -> Option<&SearchHit> {
    hits.iter().min_by(|a, b| {
        a.best_evalue
            .total_cmp(&b.best_evalue)
            .then(b.best_score.total_cmp(&a.best_score))
    })
}

/// Queries whose best E-value is at most `threshold`, in input order, with names
/// cut at the first `/` and descriptions dropped. Zero survivors is fatal.
pub fn select_survivors(
    queries: &[SequenceRecord],
    hits: &[SearchHit],
    threshold: f64,
) -> Result<Vec<SequenceRecord>> {
    let passing: IndexSet<&str> = hits
        .iter()
        .filter(|hit| hit.best_evalue <= threshold)
        .map(|hit| hit.target.as_str())
        .collect();

    let survivors: Vec<SequenceRecord> = queries
        .iter()
        .filter(|record| passing.contains(record.name.as_str()))
        .map(|record| {
            let name = record
                .name
                .split_once('/')
                .map(|(head, _)| head)
                .unwrap_or(&record.name);
            SequenceRecord::new(name, record.sequence.clone())
        })
        .collect();

    if survivors.is_empty() {
        return Err(PredictError::NoSurvivors { threshold }.into());
    }

    Ok(survivors)
}

/// Runs `hmmsearch --tblout <table> <hmm> <queries>`
pub struct ProfileSearch {
    program: PathBuf,
    hmm: PathBuf,
    temp_dir: Option<PathBuf>,
}

impl ProfileSearch {
    pub fn new(program: PathBuf, hmm: PathBuf) -> Self {
        ProfileSearch {
            program,
            hmm,
            temp_dir: None,
        }
    }

    pub fn with_temp_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.temp_dir = dir;
        self
    }

    /// Search every query against the profile and return the per-target table
    pub fn search(&self, queries: &[SequenceRecord]) -> Result<Vec<SearchHit>> {
        let temp_dir = self.temp_dir.as_deref();
        let query_file = scoped_temp_file("polpredict_search_", ".fa", temp_dir)?;
        let table_file = scoped_temp_file("polpredict_search_", ".tbl", temp_dir)?;

        {
            let mut writer = BufWriter::new(query_file.as_file());
            fasta::write_records(&mut writer, queries)?;
            writer.flush()?;
        }

        let output = Command::new(&self.program)
            .arg("--tblout")
            .arg(table_file.path())
            .arg(&self.hmm)
            .arg(query_file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("Failed to launch {}", self.program.display()))?;

        if !output.status.success() {
            return Err(PredictError::external_tool(
                "hmmsearch",
                format!(
                    "{} ({})",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            )
            .into());
        }

        let reader = BufReader::new(File::open(table_file.path())?);
        parse_tblout(reader).context("Failed to parse hmmsearch table")
    }

    /// Search and keep the queries at or below `threshold`
    pub fn filter(&self, queries: &[SequenceRecord], threshold: f64) -> Result<Vec<SequenceRecord>> {
        log::info!(
            "[search] There are {} protein(s) before filtering",
            queries.len()
        );
        let hits = self.search(queries)?;
        if let Some(best) = best_hit(&hits) {
            log::info!(
                "[search] Best hit: {} against {} (full E-value {:e}, score {:.1}; best domain E-value {:e}, score {:.1})",
                best.target,
                best.query,
                best.full_evalue,
                best.full_score,
                best.best_evalue,
                best.best_score
            );
        }
        let survivors = select_survivors(queries, &hits, threshold)?;
        log::info!(
            "[search] {} protein(s) pass E-value <= {}",
            survivors.len(),
            threshold
        );
        Ok(survivors)
    }
}
