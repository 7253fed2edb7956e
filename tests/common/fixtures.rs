use billvision::dataset::CLASS_LABEL_KEY;
use billvision::record::{Example, Feature, RecordWriter};
use image::{ImageBuffer, Rgb};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Bill names in label-map file order, ids 0 to 6. The classifier output
/// order is `billvision::labels::BILL_CLASSES`.
pub const LABEL_MAP_BILLS: [&str; 7] = [
    "Hundred Dollar",
    "Fifty Dollar",
    "Twenty Dollar",
    "Ten Dollar",
    "One Dollar",
    "Two Dollar",
    "Five Dollar",
];

/// One label-map stanza in the five-line layout.
pub fn stanza(name: &str, id: i64) -> String {
    format!("item {{\n  name: \"{}\",\n  id: {},\n}}\n", name, id)
}

/// Label map text for `(name, id)` pairs, stanzas separated by a blank line.
pub fn label_map_text(entries: &[(&str, i64)]) -> String {
    entries
        .iter()
        .map(|(name, id)| stanza(name, *id))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The seven bills with ids starting at `first_id`.
pub fn bill_entries(first_id: i64) -> Vec<(&'static str, i64)> {
    LABEL_MAP_BILLS
        .iter()
        .enumerate()
        .map(|(i, name)| (*name, first_id + i as i64))
        .collect()
}

/// Writes `contents` to `name` inside `dir` and returns the path.
pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("Failed to write test file");
    path
}

/// Creates a 100x100 red test image and returns the temp file.
/// The file will be automatically cleaned up when dropped.
pub fn create_test_image() -> NamedTempFile {
    let img = ImageBuffer::from_fn(100, 100, |_, _| Rgb([255u8, 0u8, 0u8]));
    let file = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .expect("Failed to create temp image file");
    img.save_with_format(file.path(), image::ImageFormat::Png)
        .expect("Failed to save test image");
    file
}

/// An annotated image example with one object per class id.
pub fn make_example(filename: &str, class_ids: &[i64]) -> Example {
    Example::new()
        .with_feature("image/filename", Feature::Bytes(vec![filename.as_bytes().to_vec()]))
        .with_feature(CLASS_LABEL_KEY, Feature::Int64(class_ids.to_vec()))
        .with_feature(
            "image/object/bbox/xmin",
            Feature::Float(class_ids.iter().map(|_| 0.25).collect()),
        )
}

/// Writes the examples as a TFRecord file at `path`.
pub fn write_records(path: &Path, examples: &[Example]) {
    let mut writer = RecordWriter::create(path).expect("Failed to create TFRecord file");
    for example in examples {
        writer
            .write_record(&example.encode())
            .expect("Failed to write record");
    }
    writer.into_inner().expect("Failed to flush TFRecord file");
}
