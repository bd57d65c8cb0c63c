use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use polpredict::aligner::MuscleAligner;
use polpredict::alignment::Alignment;
use polpredict::fasta;
use polpredict::features::FeatureSet;
use polpredict::flatten::{build_table, FieldLayout, Rejection, SelectionOutcome};
use polpredict::model::ModelSchema;
use polpredict::pipeline::{FeatureAggregator, FeatureDocument, FeatureReport, ReferenceFile, SequenceFailure};
use polpredict::scoring::{self, CommandScorer, Scorer};
use polpredict::search::{ProfileSearch, DEFAULT_EVALUE_THRESHOLD};
use polpredict::tools::resolve_tool;

/// polpredict - activity prediction for DNA polymerase family B proteins
///
/// Filters candidates with a profile HMM, maps curated reference alignment columns
/// onto each candidate, and ranks candidates by classifier probability.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    /// Number of threads for per-sequence processing (default: all cores)
    #[clap(short = 't', long = "threads", global = true)]
    threads: Option<usize>,

    /// Only report warnings and errors
    #[clap(short = 'q', long = "quiet", global = true)]
    quiet: bool,

    /// Directory for temporary files (default: system temp dir)
    #[clap(long = "temp-dir", global = true)]
    temp_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Keep query proteins that hit the profile HMM at or below the E-value threshold
    Filter(FilterArgs),
    /// Extract reference-column features for each sequence into a JSON document
    Extract(ExtractArgs),
    /// Flatten a features document into the classifier's input table (TSV)
    Table(TableArgs),
    /// Full pipeline: filter, extract, flatten, score and rank
    Predict(PredictArgs),
}

#[derive(Args, Debug)]
struct SearchOpts {
    /// Profile HMM
    #[clap(long = "hmm")]
    hmm: PathBuf,

    /// HMM E-value threshold for prefiltering
    #[clap(long = "threshold", default_value_t = DEFAULT_EVALUE_THRESHOLD)]
    threshold: f64,

    /// hmmsearch executable
    #[clap(long = "hmmsearch")]
    hmmsearch: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ReferenceOpts {
    /// Reference alignment (aligned FASTA)
    #[clap(long = "reference-aln")]
    reference_aln: PathBuf,

    /// Reference feature columns (JSON)
    #[clap(long = "reference-features")]
    reference_features: PathBuf,

    /// muscle executable
    #[clap(long = "muscle")]
    muscle: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// Query protein sequences (FASTA)
    #[clap(long = "query")]
    query: PathBuf,

    #[clap(flatten)]
    search: SearchOpts,

    /// Output FASTA with the filtered proteins
    #[clap(short = 'o', long = "output")]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Proteins to generate features for (FASTA)
    #[clap(long = "sequences")]
    sequences: PathBuf,

    #[clap(flatten)]
    reference: ReferenceOpts,

    /// Output JSON with the extracted features of each protein
    #[clap(short = 'o', long = "output")]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct TableArgs {
    /// Features document written by `extract`
    #[clap(long = "feature-file")]
    feature_file: PathBuf,

    /// Reference feature columns (JSON) the document was extracted with
    #[clap(long = "reference-features")]
    reference_features: PathBuf,

    /// Model schema (JSON); the built-in DNA polymerase B schema when omitted
    #[clap(long = "schema")]
    schema: Option<PathBuf>,

    /// Output TSV table
    #[clap(short = 'o', long = "output")]
    output: PathBuf,

    /// Write sequences left out of the table, with reasons (TSV)
    #[clap(long = "manifest")]
    manifest: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct PredictArgs {
    /// Query protein sequences (FASTA)
    #[clap(long = "query")]
    query: PathBuf,

    #[clap(flatten)]
    search: SearchOpts,

    #[clap(flatten)]
    reference: ReferenceOpts,

    /// Model schema (JSON); the built-in DNA polymerase B schema when omitted
    #[clap(long = "schema")]
    schema: Option<PathBuf>,

    /// Pretrained model file passed to the scorer
    #[clap(long = "model")]
    model: PathBuf,

    /// Scorer executable
    #[clap(long = "scorer")]
    scorer: Option<PathBuf>,

    /// Output TSV with predictions ranked by proba
    #[clap(short = 'o', long = "output")]
    output: PathBuf,

    /// Write failed, incomplete and rejected sequences with reasons (TSV)
    #[clap(long = "manifest")]
    manifest: Option<PathBuf>,
}

fn init_logging(quiet: bool) {
    let default_level = if quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

/// Reference alignment, feature definitions checked against it, and an aligner
struct ReferenceContext {
    alignment: Alignment,
    features: FeatureSet,
    file: ReferenceFile,
    aligner: MuscleAligner,
}

impl ReferenceContext {
    fn load(opts: &ReferenceOpts, temp_dir: Option<&Path>) -> Result<Self> {
        let alignment = Alignment::read(&opts.reference_aln)?;
        log::info!(
            "[features] Reference alignment: {} rows x {} columns",
            alignment.num_rows(),
            alignment.width()
        );

        let features = FeatureSet::read(&opts.reference_features)?;
        features.validate_against(&alignment)?;

        let file = ReferenceFile::prepare(&opts.reference_aln, &alignment, temp_dir)?;
        let muscle = resolve_tool("muscle", opts.muscle.as_deref())?;
        let aligner = MuscleAligner::new(muscle).with_temp_dir(temp_dir.map(Path::to_path_buf));

        Ok(ReferenceContext {
            alignment,
            features,
            file,
            aligner,
        })
    }

    fn extract(&self, sequences: &[fasta::SequenceRecord]) -> FeatureReport {
        FeatureAggregator::new(&self.alignment, self.file.path(), &self.features, &self.aligner)
            .run(sequences)
    }
}

fn run_search(
    opts: &SearchOpts,
    queries: &[fasta::SequenceRecord],
    temp_dir: Option<&Path>,
) -> Result<Vec<fasta::SequenceRecord>> {
    let program = resolve_tool("hmmsearch", opts.hmmsearch.as_deref())?;
    log::info!(
        "[search] Filtering proteins with HMM at E-value <= {} threshold...",
        opts.threshold
    );
    ProfileSearch::new(program, opts.hmm.clone())
        .with_temp_dir(temp_dir.map(Path::to_path_buf))
        .filter(queries, opts.threshold)
}

fn build_layout(reference_features: &FeatureSet, schema_path: Option<&Path>) -> Result<(FieldLayout, ModelSchema)> {
    let schema = ModelSchema::load_or_default(schema_path)?;
    let layout = FieldLayout::new(reference_features, &schema)?;
    layout.check_selected(&schema.selected)?;
    Ok((layout, schema))
}

fn write_manifest(
    path: &Path,
    failed: &[SequenceFailure],
    incomplete: &[String],
    rejected: &[Rejection],
) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create manifest: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "name\tstatus\treason")?;
    for f in failed {
        writeln!(writer, "{}\tfailed\t{}", f.name, f.reason)?;
    }
    for name in incomplete {
        writeln!(writer, "{name}\tincomplete\tunmapped reference columns")?;
    }
    for r in rejected {
        writeln!(writer, "{}\trejected\t{}", r.name, r.reason)?;
    }
    writer.flush()?;
    Ok(())
}

fn cmd_filter(args: &FilterArgs, temp_dir: Option<&Path>) -> Result<()> {
    let queries = fasta::read_fasta(&args.query)?;
    let survivors = run_search(&args.search, &queries, temp_dir)?;
    fasta::write_fasta(&args.output, &survivors)?;
    Ok(())
}

fn cmd_extract(args: &ExtractArgs, temp_dir: Option<&Path>) -> Result<()> {
    let reference = ReferenceContext::load(&args.reference, temp_dir)?;
    let sequences = fasta::read_fasta(&args.sequences)?;
    log::info!("[features] Generating features for {} protein(s)...", sequences.len());

    let report = reference.extract(&sequences);
    report.to_document().write_json(&args.output)?;
    Ok(())
}

fn cmd_table(args: &TableArgs) -> Result<()> {
    let definitions = FeatureSet::read(&args.reference_features)?;
    let (layout, schema) = build_layout(&definitions, args.schema.as_deref())?;
    let document = FeatureDocument::read_json(&args.feature_file)?;

    let SelectionOutcome { table, rejected } = build_table(
        document.features.iter().map(|(name, v)| (name.as_str(), v)),
        &layout,
        &schema.selected,
    )?;

    let file = File::create(&args.output)
        .with_context(|| format!("Failed to create table: {}", args.output.display()))?;
    let mut writer = BufWriter::new(file);
    table.write_tsv(&mut writer)?;
    writer.flush()?;

    if let Some(path) = &args.manifest {
        write_manifest(path, &document.failed, &document.incomplete, &rejected)?;
    }
    log::info!(
        "[table] Wrote {} row(s) x {} field(s), {} rejected",
        table.len(),
        table.columns.len(),
        rejected.len()
    );
    Ok(())
}

fn cmd_predict(args: &PredictArgs, temp_dir: Option<&Path>) -> Result<()> {
    // Everything that can fail on configuration alone is checked before any tool runs
    let reference = ReferenceContext::load(&args.reference, temp_dir)?;
    let (layout, schema) = build_layout(&reference.features, args.schema.as_deref())?;
    let scorer_program = resolve_tool("scorer", args.scorer.as_deref())?;
    let scorer = CommandScorer::new(scorer_program, args.model.clone())
        .with_temp_dir(temp_dir.map(Path::to_path_buf));

    let queries = fasta::read_fasta(&args.query)?;
    let survivors = run_search(&args.search, &queries, temp_dir)?;

    log::info!("[features] Generating features from {} filtered protein(s)...", survivors.len());
    let report = reference.extract(&survivors);

    let SelectionOutcome { table, rejected } = build_table(
        report
            .sequences
            .iter()
            .map(|(name, s)| (name.as_str(), &s.features)),
        &layout,
        &schema.selected,
    )?;

    log::info!("[score] Running predictions for {} protein(s)...", table.len());
    let predictions = scoring::rank(scorer.score(&table)?);
    scoring::write_ranked_file(&args.output, &predictions)?;

    if let Some(path) = &args.manifest {
        let incomplete: Vec<String> = report.incomplete().into_iter().map(String::from).collect();
        write_manifest(path, &report.failed, &incomplete, &rejected)?;
    }

    log::info!(
        "[score] Finished: {} ranked, {} failed, {} rejected",
        predictions.len(),
        report.failed.len(),
        rejected.len()
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet);

    let threads = cli.threads.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    });
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()?;

    let temp_dir = cli.temp_dir.as_deref();
    match &cli.command {
        Commands::Filter(args) => cmd_filter(args, temp_dir),
        Commands::Extract(args) => cmd_extract(args, temp_dir),
        Commands::Table(args) => cmd_table(args),
        Commands::Predict(args) => cmd_predict(args, temp_dir),
    }
}
