//! Wire formats read and written by the pipeline.
//!
//! - [`language_data`]: `LanguageData` files of a language tree (Keyed and DefInjected).
//! - [`defs`]: structural `Defs` files that carry the original-language text.
//! - [`po`]: the gettext catalog used for interchange with translation tools.
//! - [`about`]: the `About/About.xml` descriptor of a generated translation mod.
//! - [`csv`]: flat unit listings.

pub mod about;
pub mod csv;
pub mod defs;
pub mod language_data;
pub mod po;

use std::path::Path;

use crate::error::Error;

/// Maps byte offsets to 1-based line numbers.
#[derive(Debug, Clone)]
pub(crate) struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    pub fn line_of(&self, offset: usize) -> usize {
        match self.starts.binary_search(&offset) {
            Ok(i) => i + 1,
            Err(i) => i,
        }
    }
}

/// A parse failure inside one document, before the file path is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub line: Option<usize>,
    pub message: String,
}

impl SyntaxError {
    pub fn new(line: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }

    pub fn into_error(self, path: impl AsRef<Path>) -> Error {
        Error::malformed(path, self.line, self.message)
    }
}

impl std::fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {line}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

pub(crate) fn element_name(name: quick_xml::name::QName<'_>) -> String {
    String::from_utf8_lossy(name.as_ref()).into_owned()
}
