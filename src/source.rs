//! Program source loader.
//!
//! Programs are plain text, one instruction per line. A `;` and everything
//! after it is a comment; what remains is trimmed, and blank lines are
//! dropped. The loader produces the ordered instruction strings the
//! machine's `load_program` expects.

use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

/// Strip comments and blanks from program text.
pub fn parse_source(text: &str) -> Vec<String> {
    text.lines().filter_map(clean_line).collect()
}

/// Read and clean a program file.
pub fn load_source<P: AsRef<Path>>(path: P) -> Result<Vec<String>, SourceError> {
    let file = std::fs::File::open(path.as_ref()).map_err(|e| SourceError::IoError(e.to_string()))?;
    let reader = BufReader::new(file);

    let mut lines = Vec::new();
    for line_result in reader.lines() {
        let line = line_result.map_err(|e| SourceError::IoError(e.to_string()))?;
        if let Some(cleaned) = clean_line(&line) {
            lines.push(cleaned);
        }
    }

    Ok(lines)
}

fn clean_line(line: &str) -> Option<String> {
    let code = line.split(';').next().unwrap_or("").trim();
    if code.is_empty() {
        None
    } else {
        Some(code.to_string())
    }
}

/// Errors that can occur while loading program source.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    IoError(String),
}
