mod common;
use common::*;

use std::process::{Command, Output};

/// Runs the built `billvision` binary with a clean configuration environment.
fn billvision(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_billvision"))
        .args(args)
        .env_remove("BILLVISION_CONFIG")
        .env_remove("BILLVISION_CLASSIFIER_MODEL")
        .env_remove("BILLVISION_DETECTOR_MODEL")
        .env_remove("BILLVISION_CONFIDENCE")
        .output()
        .expect("Failed to run billvision")
}

#[test]
fn test_classify_without_image_prints_usage_and_exits_1() {
    let output = billvision(&["classify"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Usage: billvision classify <IMAGE>"), "stderr: {}", stderr);
    assert!(output.stdout.is_empty());
}

#[test]
fn test_count_records_prints_total() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("train.tfrecord");
    let examples: Vec<Example> = (0..3).map(|i| make_example("a.jpg", &[i + 1])).collect();
    write_records(&path, &examples);

    let output = billvision(&["count-records", path.to_str().unwrap()]);
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        "Total number of items in the TFRecord file: 3"
    );
    Ok(())
}

#[test]
fn test_malformed_label_map_fails_the_command() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let path = write_file(dir.path(), "label_map.pbtxt", "item {\n  name: Five Dollar\n  id: 6,\n}\n");

    let output = billvision(&["labels", path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("name is not a quoted string"), "stderr: {}", stderr);
    Ok(())
}
