//! Cell metadata header parsing.
//!
//! A cell may start with any number of `//| key: value` lines. The header ends at
//! the first line that does not begin with `//|`; everything from that line on is
//! code, even if it contains further marker lines.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Prefix every header line starts with
pub const HEADER_MARKER: &str = "//|";

/// Key whose value is fed to the compiled program's standard input
pub const STDIN_KEY: &str = "stdin";

static HEADER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^//\| (\w+): (.*)$").expect("header pattern is valid"));

/// Key/value directives from a cell header
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Text for the program's standard input, if the header set one
    pub fn stdin(&self) -> Option<&str> {
        self.get(STDIN_KEY)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Parse one header line. Returns `None` for marker lines that are not `key: value`.
pub fn parse_header_line(line: &str) -> Option<(&str, &str)> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let line = line.strip_suffix('\r').unwrap_or(line);
    let caps = HEADER_LINE.captures(line)?;
    let key = caps.get(1)?.as_str();
    let value = caps.get(2)?.as_str();
    Some((key, value))
}

/// Split a cell into its metadata header and the code that follows.
///
/// The returned code is a byte-for-byte suffix of `cell`. An empty cell, or a cell
/// made only of header lines, yields empty code.
pub fn split_metadata(cell: &str) -> (Metadata, &str) {
    let mut metadata = Metadata::new();
    let mut offset = 0;

    for line in cell.split_inclusive('\n') {
        if !line.starts_with(HEADER_MARKER) {
            break;
        }
        if let Some((key, value)) = parse_header_line(line) {
            metadata.insert(key, value);
        }
        offset += line.len();
    }

    (metadata, &cell[offset..])
}
