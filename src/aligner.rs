//! Realignment of one query sequence against the reference alignment
//!
//! The external aligner is driven through per-call temporary files, so any number
//! of workers can run it at once. The files are removed when the handles drop,
//! including when the tool fails.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::NamedTempFile;

use crate::alignment::Alignment;
use crate::error::PredictError;
use crate::fasta::{self, SequenceRecord};

/// Produces the reference rows (original order) plus one trailing row for `query`
pub trait Aligner: Send + Sync {
    fn align(&self, reference: &Path, query: &SequenceRecord) -> Result<Alignment>;
}

/// Lines of stderr kept in error messages
const STDERR_TAIL_LINES: usize = 5;

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join(" | ")
}

/// Create a named temporary file, inside `dir` when given
pub(crate) fn scoped_temp_file(
    prefix: &str,
    suffix: &str,
    dir: Option<&Path>,
) -> Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(prefix).suffix(suffix);
    let file = match dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    };
    file.context("Failed to create temporary file")
}

/// `muscle -profile -in1 <reference> -in2 <query> -out <alignment>`
pub struct MuscleAligner {
    program: PathBuf,
    temp_dir: Option<PathBuf>,
}

impl MuscleAligner {
    pub fn new(program: PathBuf) -> Self {
        MuscleAligner {
            program,
            temp_dir: None,
        }
    }

    /// Place per-call temporary files in `dir` instead of the system default
    pub fn with_temp_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.temp_dir = dir;
        self
    }
}

impl Aligner for MuscleAligner {
    fn align(&self, reference: &Path, query: &SequenceRecord) -> Result<Alignment> {
        let temp_dir = self.temp_dir.as_deref();
        let mut query_file = scoped_temp_file("polpredict_query_", ".fa", temp_dir)?;
        let output_file = scoped_temp_file("polpredict_aln_", ".fa", temp_dir)?;

        {
            let handle = query_file.as_file_mut();
            fasta::write_records(handle, std::slice::from_ref(query))?;
            handle.flush()?;
        }

        let output = Command::new(&self.program)
            .arg("-profile")
            .arg("-in1")
            .arg(reference)
            .arg("-in2")
            .arg(query_file.path())
            .arg("-out")
            .arg(output_file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("Failed to launch {}", self.program.display()))?;

        if !output.status.success() {
            return Err(PredictError::external_tool(
                "muscle",
                format!("{} ({})", output.status, stderr_tail(&output.stderr)),
            )
            .into());
        }

        let records = fasta::read_fasta(output_file.path())?;
        if records.is_empty() {
            return Err(PredictError::external_tool("muscle", "produced an empty alignment").into());
        }

        Alignment::from_records(records, &format!("muscle output for {}", query.name)).map_err(
            |e| PredictError::external_tool("muscle", format!("unusable output: {e:#}")).into(),
        )
    }
}
