mod common;
use common::*;

use billvision::dataset::{self, CLASS_LABEL_KEY};
use billvision::record;

#[test]
fn test_count_records() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("train.tfrecord");
    let examples: Vec<Example> = (0..12)
        .map(|i| make_example(&format!("bill_{}.jpg", i), &[1 + (i % 7)]))
        .collect();
    write_records(&path, &examples);

    assert_eq!(record::count(&path)?, 12);
    Ok(())
}

#[test]
fn test_empty_record_file_counts_zero() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("empty.tfrecord");
    write_records(&path, &[]);
    assert_eq!(record::count(&path)?, 0);
    Ok(())
}

#[test]
fn test_corrupted_record_is_rejected() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("bad.tfrecord");
    write_records(&path, &[make_example("a.jpg", &[1]), make_example("b.jpg", &[2])]);

    let mut bytes = std::fs::read(&path)?;
    let last = bytes.len() - 6;
    bytes[last] ^= 0xff;
    std::fs::write(&path, bytes)?;

    assert!(record::count(&path).is_err());
    Ok(())
}

#[test]
fn test_check_records_against_label_map() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("valid.tfrecord");
    let unlabeled = Example::new().with_feature("image/filename", Feature::Bytes(vec![b"x.jpg".to_vec()]));
    write_records(
        &path,
        &[
            make_example("a.jpg", &[1, 1, 3]),
            make_example("b.jpg", &[7, 9]),
            unlabeled,
        ],
    );
    let map = LabelMap::parse(&label_map_text(&bill_entries(1)))?;

    let report = dataset::check_records(&path, &map)?;
    assert_eq!(report.records, 3);
    assert_eq!(report.histogram.get(&1), Some(&2));
    assert_eq!(report.histogram.get(&7), Some(&1));
    assert_eq!(report.unknown, vec![(1, 9)]);
    assert_eq!(report.unlabeled, vec![2]);
    assert!(!report.is_clean());
    Ok(())
}

#[test]
fn test_read_examples_respects_limit() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("train.tfrecord");
    let examples: Vec<Example> = (0..4).map(|i| make_example("a.jpg", &[i + 1])).collect();
    write_records(&path, &examples);

    let read = dataset::read_examples(&path, 2)?;
    assert_eq!(read.len(), 2);
    assert_eq!(read[0].0, 0);
    assert_eq!(read[1].1.int64s(CLASS_LABEL_KEY), Some(&[2i64][..]));
    Ok(())
}

#[test]
fn test_label_map_id_range_check() -> anyhow::Result<()> {
    let zero_based = LabelMap::parse(&label_map_text(&bill_entries(0)))?;
    let report = dataset::check_label_map(&zero_based, 1..=7);
    assert_eq!(report.out_of_range.len(), 1);
    assert_eq!(report.out_of_range[0].name, "Hundred Dollar");

    let one_based = LabelMap::parse(&label_map_text(&bill_entries(1)))?;
    assert!(dataset::check_label_map(&one_based, 1..=7).is_clean());
    Ok(())
}

#[test]
fn test_label_map_duplicates_are_reported() -> anyhow::Result<()> {
    let map = LabelMap::parse(&label_map_text(&[
        ("One Dollar", 1),
        ("Two Dollar", 1),
        ("One Dollar", 2),
    ]))?;
    let report = dataset::check_label_map(&map, 1..=7);
    assert_eq!(report.duplicate_ids, vec![1]);
    assert_eq!(report.duplicate_names, vec!["One Dollar".to_string()]);
    Ok(())
}
