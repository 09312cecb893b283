//! Structured INI-style documents
//!
//! Rendered configuration is built as sections of lines first and serialized
//! to text last. Tests query the structure (is this key in that section?)
//! rather than matching patterns against flat text.

use std::fmt;

/// How a key and value are joined on one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Separator {
    /// `key = value`
    #[default]
    Spaced,
    /// `key=value`
    Tight,
}

impl Separator {
    fn as_str(self) -> &'static str {
        match self {
            Self::Spaced => " = ",
            Self::Tight => "=",
        }
    }
}

/// One emitted line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Entry {
        key: String,
        value: String,
        separator: Separator,
    },
    /// Emitted verbatim
    Raw(String),
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entry {
                key,
                value,
                separator,
            } => write!(f, "{}{}{}", key, separator.as_str(), value),
            Self::Raw(text) => write!(f, "{}", text),
        }
    }
}

/// A named section and its lines in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    name: String,
    lines: Vec<Line>,
}

impl Section {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lines: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Set `key = value`. A key already present is replaced in place.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        self.set_with(key, value, Separator::Spaced)
    }

    /// Set `key=value`.
    pub fn set_tight(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        self.set_with(key, value, Separator::Tight)
    }

    /// Set the line only when a value is present.
    pub fn set_opt(&mut self, key: &str, value: Option<String>) -> &mut Self {
        if let Some(value) = value {
            self.set(key, value);
        }
        self
    }

    pub fn set_tight_opt(&mut self, key: &str, value: Option<String>) -> &mut Self {
        if let Some(value) = value {
            self.set_tight(key, value);
        }
        self
    }

    pub fn set_with(&mut self, key: &str, value: impl Into<String>, separator: Separator) -> &mut Self {
        let line = Line::Entry {
            key: key.to_string(),
            value: value.into(),
            separator,
        };
        match self.position(key) {
            Some(idx) => self.lines[idx] = line,
            None => self.lines.push(line),
        }
        self
    }

    /// Append a verbatim line.
    pub fn raw(&mut self, text: impl Into<String>) -> &mut Self {
        self.lines.push(Line::Raw(text.into()));
        self
    }

    /// Value of `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| match line {
            Line::Entry { key: k, value, .. } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Full entry for `key` (value plus separator).
    pub fn entry(&self, key: &str) -> Option<&Line> {
        self.position(key).map(|idx| &self.lines[idx])
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// True if a line renders exactly as `text`.
    pub fn contains_line(&self, text: &str) -> bool {
        self.lines.iter().any(|line| line.to_string() == text)
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.lines
            .iter()
            .position(|line| matches!(line, Line::Entry { key: k, .. } if k == key))
    }
}

/// An ordered multi-section document with an optional section-less preamble.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigDocument {
    preamble: Vec<Line>,
    sections: Vec<Section>,
}

impl ConfigDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines before the first section header.
    pub fn preamble(&mut self) -> &mut Vec<Line> {
        &mut self.preamble
    }

    pub fn preamble_lines(&self) -> &[Line] {
        &self.preamble
    }

    /// Get or create a section. New sections are appended in call order.
    pub fn section(&mut self, name: &str) -> &mut Section {
        let idx = match self.sections.iter().position(|s| s.name == name) {
            Some(idx) => idx,
            None => {
                self.sections.push(Section::new(name));
                self.sections.len() - 1
            }
        };
        &mut self.sections[idx]
    }

    /// A section with at least one line.
    pub fn get_section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name && !s.is_empty())
    }

    /// Names of the sections that will be emitted.
    pub fn section_names(&self) -> Vec<&str> {
        self.sections
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| s.name.as_str())
            .collect()
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.get_section(name).is_some()
    }

    /// Value of `key` inside `section`.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.get_section(section).and_then(|s| s.get(key))
    }

    /// Names of every section holding `key`.
    pub fn sections_with_key(&self, key: &str) -> Vec<&str> {
        self.sections
            .iter()
            .filter(|s| s.contains_key(key))
            .map(|s| s.name.as_str())
            .collect()
    }

    /// True if any line anywhere (preamble included) renders exactly as `text`.
    pub fn contains_line(&self, text: &str) -> bool {
        self.preamble.iter().any(|l| l.to_string() == text)
            || self.sections.iter().any(|s| s.contains_line(text))
    }
}

impl fmt::Display for ConfigDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for line in &self.preamble {
            writeln!(f, "{}", line)?;
            first = false;
        }
        for section in self.sections.iter().filter(|s| !s.is_empty()) {
            if !first {
                writeln!(f)?;
            }
            first = false;
            writeln!(f, "[{}]", section.name)?;
            for line in &section.lines {
                writeln!(f, "{}", line)?;
            }
        }
        Ok(())
    }
}
