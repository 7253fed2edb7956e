//! Checks that a dataset's labels agree with its label map.

pub mod roboflow;

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::ops::RangeInclusive;
use std::path::Path;

use crate::error::{Error, Result};
use crate::label_map::{LabelEntry, LabelMap};
use crate::record::{Example, RecordReader};

/// Feature holding the class id of each annotated object.
pub const CLASS_LABEL_KEY: &str = "image/object/class/label";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelMapReport {
    pub entries: usize,
    pub duplicate_ids: Vec<i64>,
    pub duplicate_names: Vec<String>,
    pub out_of_range: Vec<LabelEntry>,
}

impl LabelMapReport {
    pub fn is_clean(&self) -> bool {
        self.duplicate_ids.is_empty() && self.duplicate_names.is_empty() && self.out_of_range.is_empty()
    }
}

/// Look for repeated ids or names and ids outside `valid_ids`.
pub fn check_label_map(map: &LabelMap, valid_ids: RangeInclusive<i64>) -> LabelMapReport {
    let mut report = LabelMapReport {
        entries: map.len(),
        ..Default::default()
    };
    let mut ids = HashSet::new();
    let mut names = HashSet::new();

    for entry in map {
        if !ids.insert(entry.id) && !report.duplicate_ids.contains(&entry.id) {
            report.duplicate_ids.push(entry.id);
        }
        if !names.insert(entry.name.as_str()) && !report.duplicate_names.contains(&entry.name) {
            report.duplicate_names.push(entry.name.clone());
        }
        if !valid_ids.contains(&entry.id) {
            report.out_of_range.push(entry.clone());
        }
    }
    report
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordReport {
    pub records: usize,
    /// Objects per class id.
    pub histogram: BTreeMap<i64, usize>,
    /// `(record index, class id)` for ids the label map does not define.
    pub unknown: Vec<(usize, i64)>,
    /// Records without a class label feature.
    pub unlabeled: Vec<usize>,
}

impl RecordReport {
    pub fn is_clean(&self) -> bool {
        self.unknown.is_empty() && self.unlabeled.is_empty()
    }
}

/// Scan every record's class labels against the label map.
pub fn check_records<P: AsRef<Path>>(path: P, map: &LabelMap) -> Result<RecordReport> {
    let path = path.as_ref();
    let known: HashSet<i64> = map.iter().map(|e| e.id).collect();
    let mut report = RecordReport::default();

    for (index, record) in RecordReader::open(path)?.enumerate() {
        let record = record?;
        let example = Example::decode(&record.data).map_err(|e| Error::Record {
            offset: record.offset,
            reason: format!("record {} is not a tf.train.Example: {}", index, e),
        })?;
        report.records += 1;

        match example.int64s(CLASS_LABEL_KEY) {
            Some(labels) if !labels.is_empty() => {
                for &label in labels {
                    *report.histogram.entry(label).or_insert(0) += 1;
                    if !known.contains(&label) {
                        report.unknown.push((index, label));
                    }
                }
            }
            _ => report.unlabeled.push(index),
        }
    }

    log::info!(
        "scanned {} records in {}: {} unknown labels, {} unlabeled",
        report.records,
        path.display(),
        report.unknown.len(),
        report.unlabeled.len()
    );
    Ok(report)
}

/// The first `limit` examples of a TFRecord file with their frame offsets.
pub fn read_examples<P: AsRef<Path>>(path: P, limit: usize) -> Result<Vec<(u64, Example)>> {
    let mut out = Vec::new();
    for record in RecordReader::open(path)?.take(limit) {
        let record = record?;
        let example = Example::decode(&record.data).map_err(|e| Error::Record {
            offset: record.offset,
            reason: e.to_string(),
        })?;
        out.push((record.offset, example));
    }
    Ok(out)
}

impl fmt::Display for LabelMapReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Label map entries: {}", self.entries)?;
        if self.is_clean() {
            return write!(f, "Label map is consistent.");
        }
        for id in &self.duplicate_ids {
            writeln!(f, "  duplicate id: {}", id)?;
        }
        for name in &self.duplicate_names {
            writeln!(f, "  duplicate name: {}", name)?;
        }
        for entry in &self.out_of_range {
            writeln!(f, "  id out of range: {} ({})", entry.id, entry.name)?;
        }
        write!(f, "Label map has problems.")
    }
}

impl fmt::Display for RecordReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Records: {}", self.records)?;
        for (label, count) in &self.histogram {
            writeln!(f, "  class {}: {} objects", label, count)?;
        }
        for (index, label) in &self.unknown {
            writeln!(f, "  record {}: label {} is not in the label map", index, label)?;
        }
        for index in &self.unlabeled {
            writeln!(f, "  record {}: no {}", index, CLASS_LABEL_KEY)?;
        }
        if self.is_clean() {
            write!(f, "All record labels are in the label map.")
        } else {
            write!(f, "Records have label problems.")
        }
    }
}
