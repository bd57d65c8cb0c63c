
use polpredict::fasta::SequenceRecord;
use polpredict::pipeline::{FeatureAggregator, FeatureDocument};
use polpredict::{Alignment, FeatureSet, FeatureValues, Residue};
use pretty_assertions::assert_eq;
use std::path::Path;
use tempfile::TempDir;
use test_utils::{insert_gap_columns, StaticAligner};

const REFERENCE_ROWS: [(&str, &str); 2] = [("r1", "ACDEFC"), ("r2", "ACDEGC")];

fn reference() -> Alignment {
    Alignment::from_rows(REFERENCE_ROWS).unwrap()
}

fn features() -> FeatureSet {
    FeatureSet::from_json_str(r#"{"cat": [0, 2, 4], "ss": [[1, 5]]}"#).unwrap()
}

fn record(name: &str, sequence: &str) -> SequenceRecord {
    SequenceRecord::new(name, sequence.as_bytes().to_vec())
}

fn sample_rows(query: &str) -> Vec<(String, String)> {
    insert_gap_columns(&REFERENCE_ROWS, query, &[])
}

fn cat(symbols: &str) -> FeatureValues {
    FeatureValues::Single(symbols.chars().map(Residue::Symbol).collect())
}

#[test]
fn test_one_failure_does_not_abort_the_rest() {
    let reference = reference();
    let features = features();
    let aligner = StaticAligner::new()
        .respond("q1", sample_rows("MKHMPC"))
        .fail("q2", "muscle failed: exit status: 3")
        .respond("q3", insert_gap_columns(&REFERENCE_ROWS, "VLIVGA", &[1]));
    let aggregator =
        FeatureAggregator::new(&reference, Path::new("reference.fa"), &features, &aligner);

    let queries = vec![
        record("q1", "MKHMPC"),
        record("q2", "AAAAAA"),
        record("q3", "VLIVGA"),
    ];
    let report = aggregator.run(&queries);

    let names: Vec<&str> = report.sequences.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["q1", "q3"]);
    assert_eq!(report.sequences["q1"].features["cat"], cat("MHP"));
    assert_eq!(report.sequences["q3"].features["cat"], cat("VIG"));
    assert_eq!(
        report.sequences["q3"].features["ss"],
        FeatureValues::Paired(vec![[Residue::Symbol('L'), Residue::Symbol('A')]])
    );

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].name, "q2");
    assert!(report.failed[0].reason.contains("exit status: 3"));
}

#[test]
fn test_sample_that_does_not_extend_reference_is_a_failure() {
    let reference = reference();
    let features = features();
    let aligner = StaticAligner::new()
        .respond(
            "renamed",
            vec![
                ("other".to_string(), "ACDEFC".to_string()),
                ("r2".to_string(), "ACDEGC".to_string()),
                ("renamed".to_string(), "ACDEGC".to_string()),
            ],
        )
        .respond(
            "short",
            vec![
                ("r1".to_string(), "ACDEFC".to_string()),
                ("r2".to_string(), "ACDEGC".to_string()),
            ],
        )
        .respond(
            "edited",
            vec![
                ("r1".to_string(), "ACDEFC".to_string()),
                ("r2".to_string(), "ACDKGC".to_string()),
                ("edited".to_string(), "ACDEGC".to_string()),
            ],
        );
    let aggregator =
        FeatureAggregator::new(&reference, Path::new("reference.fa"), &features, &aligner);

    let report = aggregator.run(&[
        record("renamed", "ACDEGC"),
        record("short", "ACDEGC"),
        record("edited", "ACDEGC"),
    ]);

    assert!(report.sequences.is_empty());
    let failed: Vec<&str> = report.failed.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(failed, vec!["renamed", "short", "edited"]);
    for failure in &report.failed {
        assert!(
            failure.reason.contains("does not extend the reference"),
            "{}: {}",
            failure.name,
            failure.reason
        );
    }
}

#[test]
fn test_duplicate_names_keep_the_later_result() {
    let reference = reference();
    let features = features();
    let aligner = StaticAligner::new()
        .respond("dup", sample_rows("MKHMPC"))
        .respond("solo", sample_rows("VLIVGA"));
    let aggregator =
        FeatureAggregator::new(&reference, Path::new("reference.fa"), &features, &aligner);

    let report = aggregator.run(&[
        record("dup", "MKHMPC"),
        record("solo", "VLIVGA"),
        record("dup", "MKHMPC"),
    ]);

    let names: Vec<&str> = report.sequences.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["dup", "solo"]);
    assert!(report.failed.is_empty());
}

#[test]
fn test_later_failure_replaces_earlier_success() {
    let reference = reference();
    let features = features();

    struct FailsOnSecond;
    impl polpredict::aligner::Aligner for FailsOnSecond {
        fn align(&self, _reference: &Path, query: &SequenceRecord) -> anyhow::Result<Alignment> {
            if query.sequence == b"XXXXXX" {
                anyhow::bail!("aligner crashed");
            }
            Alignment::from_rows(sample_rows(std::str::from_utf8(&query.sequence)?))
        }
    }

    let aggregator =
        FeatureAggregator::new(&reference, Path::new("reference.fa"), &features, &FailsOnSecond);
    let report = aggregator.run(&[record("dup", "MKHMPC"), record("dup", "XXXXXX")]);

    assert!(report.sequences.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].name, "dup");
}

#[test]
fn test_incomplete_mapping_is_reported() {
    let reference = Alignment::from_rows([("r1", "AKC"), ("r2", "AGC")]).unwrap();
    let features = FeatureSet::from_json_str(r#"{"cat": [0, 1, 2]}"#).unwrap();
    let aligner = StaticAligner::new()
        .respond(
            "shifted",
            vec![
                ("r1".to_string(), "AK-C".to_string()),
                ("r2".to_string(), "A-GC".to_string()),
                ("shifted".to_string(), "AWWC".to_string()),
            ],
        )
        .respond(
            "clean",
            vec![
                ("r1".to_string(), "AKC".to_string()),
                ("r2".to_string(), "AGC".to_string()),
                ("clean".to_string(), "AKC".to_string()),
            ],
        );
    let aggregator =
        FeatureAggregator::new(&reference, Path::new("reference.fa"), &features, &aligner);

    let report = aggregator.run(&[record("shifted", "AWWC"), record("clean", "AKC")]);

    assert_eq!(report.incomplete(), vec!["shifted"]);
    assert_eq!(report.sequences["shifted"].unmapped_columns, vec![1]);
    assert!(report.sequences["clean"].is_complete());
    assert_eq!(
        report.sequences["shifted"].features["cat"],
        FeatureValues::Single(vec![Residue::Symbol('A'), Residue::Unmapped, Residue::Symbol('C')])
    );
}

#[test]
fn test_feature_document_round_trip() {
    let reference = reference();
    let features = features();
    let aligner = StaticAligner::new()
        .respond("q1", sample_rows("MKHMPC"))
        .fail("q2", "boom");
    let aggregator =
        FeatureAggregator::new(&reference, Path::new("reference.fa"), &features, &aligner);
    let report = aggregator.run(&[record("q1", "MKHMPC"), record("q2", "MKHMPC")]);

    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("features.json");
    let document = report.to_document();
    document.write_json(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("\"q1\""));
    assert!(text.contains("\"boom\""));

    let back = FeatureDocument::read_json(&path).unwrap();
    assert_eq!(back, document);
    assert_eq!(back.features["q1"]["cat"], cat("MHP"));
    assert_eq!(back.failed[0].name, "q2");
}

#[cfg(unix)]
mod with_external_aligner {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::test_utils::{
        create_fasta_file, failing_muscle, fake_muscle, generate_protein_sequence, write_script,
    };
    use polpredict::aligner::{Aligner, MuscleAligner};
    use polpredict::PredictError;

    #[test]
    fn test_parallel_workers_keep_their_own_results() {
        let temp_dir = TempDir::new().unwrap();
        let reference_path = temp_dir.path().join("reference.fa");
        create_fasta_file(&reference_path, &REFERENCE_ROWS);

        let reference = Alignment::read(&reference_path).unwrap();
        let features = features();
        let aligner = MuscleAligner::new(fake_muscle(temp_dir.path()))
            .with_temp_dir(Some(temp_dir.path().to_path_buf()));
        let aggregator = FeatureAggregator::new(&reference, &reference_path, &features, &aligner);

        let queries: Vec<SequenceRecord> = (0..32)
            .map(|i| SequenceRecord::new(format!("q{i}"), generate_protein_sequence(6)))
            .collect();
        let report = aggregator.run(&queries);

        assert!(report.failed.is_empty(), "{:?}", report.failed);
        assert_eq!(report.sequences.len(), queries.len());
        for (query, (name, result)) in queries.iter().zip(&report.sequences) {
            assert_eq!(&query.name, name);
            let s = &query.sequence;
            let expected: String = [s[0], s[2], s[4]].iter().map(|&b| b as char).collect();
            assert_eq!(result.features["cat"], cat(&expected), "{name}");
        }

        // Per-call temporary files are gone once the run finishes
        let leftovers: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("polpredict_"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_aligner_crash_is_a_per_sequence_failure() {
        let temp_dir = TempDir::new().unwrap();
        let reference_path = temp_dir.path().join("reference.fa");
        create_fasta_file(&reference_path, &REFERENCE_ROWS);

        let reference = Alignment::read(&reference_path).unwrap();
        let features = features();
        let aligner = MuscleAligner::new(failing_muscle(temp_dir.path()));
        let aggregator = FeatureAggregator::new(&reference, &reference_path, &features, &aligner);

        let report = aggregator.run(&[record("q1", "MKHMPC"), record("q2", "VLIVGA")]);

        assert!(report.sequences.is_empty());
        assert_eq!(report.failed.len(), 2);
        assert!(report.failed[0].reason.contains("segmentation fault"));
    }

    #[test]
    fn test_unusable_aligner_output_is_a_tool_failure() {
        let temp_dir = TempDir::new().unwrap();
        let reference_path = temp_dir.path().join("reference.fa");
        create_fasta_file(&reference_path, &REFERENCE_ROWS);

        // Rows of different lengths cannot form an alignment
        let ragged = write_script(
            temp_dir.path(),
            "muscle_ragged",
            r#"printf '>r1\nACDEFC\n>r2\nACD\n>q\nACDEGC\n' > "$7""#,
        );
        let aligner = MuscleAligner::new(ragged);

        let err = aligner
            .align(&reference_path, &record("q1", "MKHMPC"))
            .unwrap_err();
        assert!(
            matches!(
                err.downcast_ref::<PredictError>(),
                Some(PredictError::ExternalTool { tool, .. }) if tool == "muscle"
            ),
            "{err:#}"
        );

        let reference = Alignment::read(&reference_path).unwrap();
        let features = features();
        let aggregator = FeatureAggregator::new(&reference, &reference_path, &features, &aligner);
        let report = aggregator.run(&[record("q1", "MKHMPC"), record("q2", "VLIVGA")]);

        assert!(report.sequences.is_empty());
        assert_eq!(report.failed.len(), 2);
        assert!(report.failed[0].reason.contains("unusable output"));
    }
}
