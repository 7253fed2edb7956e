use std::path::Path;

use crate::error::{Error, Result};
use crate::label_map::LabelMap;

pub const UNKNOWN_LABEL: &str = "Unknown";

/// Bill classes in the order the classifier emits them.
pub const BILL_CLASSES: [&str; 7] = [
    "Hundred Dollar",
    "Ten Dollar",
    "One Dollar",
    "Twenty Dollar",
    "Two Dollar",
    "Fifty Dollar",
    "Five Dollar",
];

/// Class names indexed by model output position.
///
/// This is the `labels.txt` list that travels with a model as sidecar
/// metadata: one name per line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassLabels {
    names: Vec<String>,
}

impl ClassLabels {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn default_bills() -> Self {
        Self::new(BILL_CLASSES.iter().map(|s| s.to_string()).collect())
    }

    /// Names in label-map order.
    pub fn from_label_map(map: &LabelMap) -> Self {
        Self::new(map.iter().map(|e| e.name.clone()).collect())
    }

    /// Parse `labels.txt` content. Lines are trimmed and blank lines skipped.
    pub fn parse(text: &str) -> Self {
        Self::new(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Ok(Self::parse(&text))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_text()).map_err(|e| Error::io(path, e))
    }

    pub fn to_text(&self) -> String {
        let mut out = self.names.join("\n");
        out.push('\n');
        out
    }

    /// Name for a model output index, `"Unknown"` when out of range.
    pub fn name(&self, index: usize) -> &str {
        self.names.get(index).map(String::as_str).unwrap_or(UNKNOWN_LABEL)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Use the labels file when given, otherwise fall back to the bill classes.
pub fn load_or_default(path: Option<&Path>) -> Result<ClassLabels> {
    match path {
        Some(path) => ClassLabels::load(path),
        None => Ok(ClassLabels::default_bills()),
    }
}
