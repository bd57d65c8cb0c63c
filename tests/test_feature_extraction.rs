
use polpredict::{
    generate_features, map_columns, Alignment, FeatureSet, FeatureValues, Residue, SampleAlignment,
};
use pretty_assertions::assert_eq;
use test_utils::insert_gap_columns;

fn residues(symbols: &str) -> FeatureValues {
    FeatureValues::Single(symbols.chars().map(Residue::Symbol).collect())
}

#[test]
fn test_single_feature_reads_query_residues() {
    let reference = Alignment::from_rows([("r1", "ACDEF"), ("r2", "ACDEG")]).unwrap();
    let sample = SampleAlignment::new(
        &reference,
        Alignment::from_rows([("r1", "ACDEF"), ("r2", "ACDEG"), ("query", "ACDEG")]).unwrap(),
    )
    .unwrap();
    let features = FeatureSet::from_json_str(r#"{"cat": [0, 2, 4]}"#).unwrap();

    let map = map_columns(&reference, &sample);
    let vector = generate_features(&sample, &map, &features);

    assert_eq!(vector.len(), 1);
    assert_eq!(vector["cat"], residues("ADG"));
}

#[test]
fn test_features_follow_inserted_columns() {
    let ref_rows = [("r1", "MKHMPRKMYS"), ("r2", "MKHLPRK-YS")];
    let reference = Alignment::from_rows(ref_rows).unwrap();
    let rows = insert_gap_columns(&ref_rows, "VLIVGAPSTQ", &[0, 3, 3, 7]);
    let sample = SampleAlignment::new(&reference, Alignment::from_rows(rows).unwrap()).unwrap();
    let features = FeatureSet::from_json_str(r#"{"motif": [0, 3, 7, 9], "pairs": [[1, 8], [2, 2]]}"#)
        .unwrap();

    let map = map_columns(&reference, &sample);
    let vector = generate_features(&sample, &map, &features);

    assert_eq!(vector["motif"], residues("VVSQ"));
    assert_eq!(
        vector["pairs"],
        FeatureValues::Paired(vec![
            [Residue::Symbol('L'), Residue::Symbol('T')],
            [Residue::Symbol('I'), Residue::Symbol('I')],
        ])
    );
}

#[test]
fn test_entry_counts_match_definitions() {
    let reference = Alignment::from_rows([("r1", "ACDEFGHIKL"), ("r2", "ACDEFGHIKM")]).unwrap();
    let sample = SampleAlignment::new(
        &reference,
        Alignment::from_rows([
            ("r1", "ACDEFGHIKL"),
            ("r2", "ACDEFGHIKM"),
            ("query", "ACD-FGHIKL"),
        ])
        .unwrap(),
    )
    .unwrap();
    let features = FeatureSet::from_json_str(
        r#"{"a": [0], "b": [1, 1, 1], "c": [9, 8, 7, 6, 5], "ss": [[0, 9], [3, 4], [5, 6]]}"#,
    )
    .unwrap();

    let vector = generate_features(&sample, &map_columns(&reference, &sample), &features);

    let names: Vec<&str> = vector.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["a", "b", "c", "ss"]);
    for (name, definition) in features.iter() {
        assert_eq!(vector[name].len(), definition.len(), "feature {name}");
    }
    // Gaps in the query row are read like any other symbol
    assert_eq!(
        vector["ss"],
        FeatureValues::Paired(vec![
            [Residue::Symbol('A'), Residue::Symbol('L')],
            [Residue::Symbol('-'), Residue::Symbol('F')],
            [Residue::Symbol('G'), Residue::Symbol('H')],
        ])
    );
}

#[test]
fn test_unmapped_column_gives_marker() {
    let reference = Alignment::from_rows([("r1", "AKC"), ("r2", "AGC")]).unwrap();
    let sample = SampleAlignment::new(
        &reference,
        Alignment::from_rows([("r1", "AK-C"), ("r2", "A-GC"), ("query", "AWWC")]).unwrap(),
    )
    .unwrap();
    let features = FeatureSet::from_json_str(r#"{"cat": [0, 1, 2], "ss": [[0, 2], [1, 2]]}"#)
        .unwrap();

    let map = map_columns(&reference, &sample);
    let vector = generate_features(&sample, &map, &features);

    assert_eq!(
        vector["cat"],
        FeatureValues::Single(vec![Residue::Symbol('A'), Residue::Unmapped, Residue::Symbol('C')])
    );
    assert!(vector["cat"].has_unmapped());
    assert_eq!(
        vector["ss"],
        FeatureValues::Paired(vec![
            [Residue::Symbol('A'), Residue::Symbol('C')],
            [Residue::Unmapped, Residue::Symbol('C')],
        ])
    );
}
