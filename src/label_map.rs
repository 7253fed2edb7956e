//! Label-map loading.
//!
//! A label map is the text file the labelling/export pipeline writes next
//! to a dataset. It is a sequence of five-line stanzas:
//!
//! ```text
//! item {
//!   name: "Hundred Dollar"
//!   id: 0,
//! }
//!
//! ```
//!
//! Only the `name` and `id` lines carry data. The opening and closing
//! lines mark stanza boundaries and the fifth line is a separator. Names
//! must be double-quoted; a trailing comma after either value is allowed.

use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};

/// One class of a label map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEntry {
    pub name: String,
    pub id: i64,
}

/// Ordered list of label entries, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelMap {
    entries: Vec<LabelEntry>,
}

/// Where the parser is inside the current stanza.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Name,
    Id,
    Close,
}

impl LabelMap {
    pub fn new(entries: Vec<LabelEntry>) -> Self {
        Self { entries }
    }

    /// Read and parse a label map from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let map = Self::parse(&text)?;
        log::debug!("loaded {} label entries from {}", map.len(), path.display());
        Ok(map)
    }

    /// Parse label-map text.
    ///
    /// Any stanza that lacks its opening line, a `key: value` delimiter, the
    /// `name`/`id` keys or a numeric id fails with [`Error::Format`] naming
    /// the 0-based stanza index and 1-based line number.
    pub fn parse(text: &str) -> Result<Self> {
        let mut entries = Vec::new();
        let mut state = State::Open;
        let mut stanza = 0usize;
        let mut name: Option<String> = None;
        let mut last_line = 0usize;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            last_line = line_no;
            let line = raw.trim();

            match state {
                State::Open => {
                    if line.is_empty() {
                        continue;
                    }
                    if !line.ends_with('{') {
                        return Err(Error::format(
                            entries.len(),
                            line_no,
                            format!("expected stanza opening, found '{}'", line),
                        ));
                    }
                    stanza = entries.len();
                    state = State::Name;
                }
                State::Name => {
                    let value = field_value(line, "name", stanza, line_no)?;
                    name = Some(quoted_name(value, stanza, line_no)?);
                    state = State::Id;
                }
                State::Id => {
                    let value = field_value(line, "id", stanza, line_no)?;
                    let value = value.trim_end_matches(',').trim();
                    let id = value.parse::<i64>().map_err(|_| {
                        Error::format(stanza, line_no, format!("id '{}' is not an integer", value))
                    })?;
                    let name = name.take().ok_or_else(|| {
                        Error::format(stanza, line_no, "id line without a name line")
                    })?;
                    entries.push(LabelEntry { name, id });
                    state = State::Close;
                }
                State::Close => {
                    if line != "}" {
                        return Err(Error::format(
                            stanza,
                            line_no,
                            format!("expected '}}' closing the stanza, found '{}'", line),
                        ));
                    }
                    state = State::Open;
                }
            }
        }

        match state {
            // A last stanza missing only its closing brace still has its data.
            State::Open | State::Close => Ok(Self { entries }),
            State::Name => Err(Error::format(stanza, last_line, "stanza ends before its name line")),
            State::Id => Err(Error::format(stanza, last_line, "stanza ends before its id line")),
        }
    }

    /// Render the map back into the five-line stanza format.
    pub fn to_pbtxt(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str("item {\n");
            out.push_str(&format!("  name: \"{}\"\n", entry.name));
            out.push_str(&format!("  id: {},\n", entry.id));
            out.push_str("}\n\n");
        }
        out
    }

    pub fn entries(&self) -> &[LabelEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LabelEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry with the given id.
    pub fn get(&self, id: i64) -> Option<&LabelEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }
}

impl<'a> IntoIterator for &'a LabelMap {
    type Item = &'a LabelEntry;
    type IntoIter = std::slice::Iter<'a, LabelEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl fmt::Display for LabelEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>3}  {}", self.id, self.name)
    }
}

/// Split `key: value` and check the key.
fn field_value<'a>(line: &'a str, key: &str, stanza: usize, line_no: usize) -> Result<&'a str> {
    let (found, value) = line.split_once(": ").ok_or_else(|| {
        Error::format(stanza, line_no, format!("missing ': ' delimiter in '{}'", line))
    })?;
    if found.trim() != key {
        return Err(Error::format(
            stanza,
            line_no,
            format!("expected '{}' field, found '{}'", key, found.trim()),
        ));
    }
    Ok(value.trim())
}

/// `"Five Dollar"` or `"Five Dollar",` to `Five Dollar`.
fn quoted_name(value: &str, stanza: usize, line_no: usize) -> Result<String> {
    let value = value.strip_suffix(',').unwrap_or(value).trim_end();
    match value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
        Some(name) => Ok(name.to_string()),
        None => Err(Error::format(stanza, line_no, "name is not a quoted string")),
    }
}
