//! FASTA reading and writing for query sequences and aligned rows
//!
//! Both unaligned queries and aligned FASTA go through the same record reader;
//! the alignment module adds its own validation on top.

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use noodles::bgzf;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Residues per output line when writing FASTA
const LINE_WIDTH: usize = 60;

/// One FASTA record. `name` is the first whitespace-delimited token of the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceRecord {
    pub name: String,
    pub description: String,
    pub sequence: Vec<u8>,
}

impl SequenceRecord {
    pub fn new(name: impl Into<String>, sequence: impl Into<Vec<u8>>) -> Self {
        SequenceRecord {
            name: name.into(),
            description: String::new(),
            sequence: sequence.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}

/// Whether `path` carries a compressed-input extension (`.gz` or `.bgz`)
pub fn has_compressed_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext == "gz" || ext == "bgz")
        .unwrap_or(false)
}

/// BGZF members are gzip members with FEXTRA set and a `BC` subfield first
fn is_bgzf_header(header: &[u8]) -> bool {
    header.len() >= 18
        && header[0] == 0x1f
        && header[1] == 0x8b
        && header[3] & 0x04 != 0
        && header[12] == b'B'
        && header[13] == b'C'
}

/// Open a file, returning a boxed BufRead. `.gz`/`.bgz` inputs are decoded as BGZF
/// when the first member carries the BGZF header, otherwise as plain (multi-member) gzip.
pub fn open_input<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;

    if !has_compressed_extension(path) {
        return Ok(Box::new(BufReader::new(file)));
    }

    let mut reader = BufReader::new(file);
    let bgzf = is_bgzf_header(
        reader
            .fill_buf()
            .with_context(|| format!("Failed to read {}", path.display()))?,
    );

    if bgzf {
        log::debug!("[input] {} is BGZF", path.display());
        Ok(Box::new(BufReader::new(bgzf::io::reader::Reader::new(reader))))
    } else {
        log::debug!("[input] {} is plain gzip", path.display());
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(reader))))
    }
}

/// Parse all records from a reader. Blank lines are skipped; sequence text
/// before the first header is an error.
pub fn parse_records<R: BufRead>(reader: R) -> Result<Vec<SequenceRecord>> {
    let mut records = Vec::new();
    let mut current: Option<SequenceRecord> = None;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();

        if let Some(header) = trimmed.strip_prefix('>') {
            if let Some(record) = current.take() {
                records.push(record);
            }
            let (name, description) = match header.split_once(char::is_whitespace) {
                Some((name, rest)) => (name, rest.trim()),
                None => (header, ""),
            };
            if name.is_empty() {
                anyhow::bail!("Empty FASTA header at line {}", line_no + 1);
            }
            current = Some(SequenceRecord {
                name: name.to_string(),
                description: description.to_string(),
                sequence: Vec::new(),
            });
        } else if !trimmed.is_empty() {
            match current.as_mut() {
                Some(record) => record
                    .sequence
                    .extend(trimmed.bytes().filter(|b| !b.is_ascii_whitespace())),
                None => anyhow::bail!(
                    "Sequence data before the first FASTA header at line {}",
                    line_no + 1
                ),
            }
        }
    }

    if let Some(record) = current {
        records.push(record);
    }

    Ok(records)
}

/// Read every record of a FASTA file (plain, gzip or BGZF)
pub fn read_fasta<P: AsRef<Path>>(path: P) -> Result<Vec<SequenceRecord>> {
    let path = path.as_ref();
    let reader = open_input(path)?;
    parse_records(reader).with_context(|| format!("Failed to parse FASTA: {}", path.display()))
}

/// Write records as FASTA, wrapping sequence lines
pub fn write_records<W: Write>(writer: &mut W, records: &[SequenceRecord]) -> Result<()> {
    for record in records {
        if record.description.is_empty() {
            writeln!(writer, ">{}", record.name)?;
        } else {
            writeln!(writer, ">{} {}", record.name, record.description)?;
        }
        for chunk in record.sequence.chunks(LINE_WIDTH) {
            writer.write_all(chunk)?;
            writer.write_all(b"\n")?;
        }
    }
    Ok(())
}

/// Write records to a FASTA file
pub fn write_fasta<P: AsRef<Path>>(path: P, records: &[SequenceRecord]) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("Failed to create FASTA: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    write_records(&mut writer, records)?;
    writer.flush()?;
    Ok(())
}
