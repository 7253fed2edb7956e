mod common;
use common::*;

use billvision::labels::BILL_CLASSES;
use billvision::{BundleMetadata, Error, ModelBundle, TensorLayout};

#[test]
fn test_bundle_keeps_labels_and_metadata() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let model_path = dir.path().join("model.onnx");
    std::fs::write(&model_path, b"not really onnx")?;
    let out = dir.path().join("out").join("bills.bundle");

    let metadata = BundleMetadata {
        name: "bills".to_string(),
        input_size: 320,
        layout: TensorLayout::Nchw,
        ..Default::default()
    };
    ModelBundle::pack(&model_path, Some(ClassLabels::default_bills()), metadata, &out)?;

    let bundle = ModelBundle::open(&out)?;
    assert_eq!(bundle.metadata().name, "bills");
    assert_eq!(bundle.metadata().input_size, 320);
    assert_eq!(bundle.metadata().layout, TensorLayout::Nchw);
    assert_eq!(bundle.metadata().labels_file.as_deref(), Some("labels.txt"));
    assert_eq!(bundle.model_bytes(), b"not really onnx");
    let labels = bundle.labels().expect("bundle should carry labels");
    assert_eq!(labels.names(), BILL_CLASSES);
    Ok(())
}

#[test]
fn test_label_map_order_survives_the_bundle() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let map = LabelMap::parse(&label_map_text(&bill_entries(0)))?;
    let out = dir.path().join("bills.bundle");
    ModelBundle::new(
        vec![0],
        Some(ClassLabels::from_label_map(&map)),
        BundleMetadata::default(),
    )
    .write(&out)?;

    let labels = ModelBundle::open(&out)?.class_labels();
    assert_eq!(labels.names(), LABEL_MAP_BILLS);
    assert_eq!(labels.name(3), "Ten Dollar");
    Ok(())
}

#[test]
fn test_names_that_would_shift_indices_are_rejected() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    for names in [vec!["A", "", "B"], vec!["A", " B"], vec!["A\nB", "C"]] {
        let out = dir.path().join("bad.bundle");
        let labels = ClassLabels::new(names.iter().map(|s| s.to_string()).collect());
        let result = ModelBundle::new(vec![0], Some(labels), BundleMetadata::default()).write(&out);
        assert!(matches!(result, Err(Error::Bundle(_))), "{:?} was packed", names);
        assert!(!out.exists());
    }
    Ok(())
}

#[test]
fn test_bundle_without_labels_falls_back_to_bill_classes() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let out = dir.path().join("plain.bundle");
    ModelBundle::new(vec![1, 2, 3], None, BundleMetadata::default()).write(&out)?;

    let bundle = ModelBundle::open(&out)?;
    assert!(bundle.labels().is_none());
    assert!(bundle.metadata().labels_file.is_none());
    assert_eq!(bundle.class_labels().names(), BILL_CLASSES);
    Ok(())
}

#[test]
fn test_bundle_settings_carry_normalisation() -> anyhow::Result<()> {
    let metadata = BundleMetadata {
        input_size: 160,
        layout: TensorLayout::Nchw,
        norm_mean: 0.5,
        norm_std: 0.25,
        ..Default::default()
    };
    let settings = metadata.classifier_settings()?;
    assert_eq!(settings.input_size, 160);
    assert_eq!(settings.layout, TensorLayout::Nchw);
    assert_eq!(settings.norm_mean, 0.5);
    assert_eq!(settings.norm_std, 0.25);
    Ok(())
}

#[test]
fn test_invalid_bundle_metadata_is_rejected() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    for metadata in [
        BundleMetadata {
            norm_std: f32::NAN,
            ..Default::default()
        },
        BundleMetadata {
            input_size: 0,
            ..Default::default()
        },
    ] {
        assert!(matches!(metadata.classifier_settings(), Err(Error::Bundle(_))));
        let out = dir.path().join("bad.bundle");
        let result = ModelBundle::new(vec![0], None, metadata).write(&out);
        assert!(matches!(result, Err(Error::Bundle(_))));
    }
    Ok(())
}

#[test]
fn test_non_bundle_file_is_rejected() -> anyhow::Result<()> {
    let image = create_test_image();
    assert!(ModelBundle::open(image.path()).is_err());
    Ok(())
}
