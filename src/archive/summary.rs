use serde::Serialize;
use std::path::PathBuf;

use super::error::{Error, ErrorKind};

/// A successfully written entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedEntry {
    pub name: String,
    pub path: PathBuf,
    pub bytes: u64,
}

/// A failed entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub name: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl Failure {
    pub fn new(name: &str, error: &Error) -> Self {
        Self {
            name: name.to_string(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Outcome of an `extract_all` run; records are kept in TOC order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    pub requested: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub extracted: Vec<ExtractedEntry>,
    pub failures: Vec<Failure>,
    /// Entries not attempted because they failed the parse-time bound check
    pub skipped: Vec<String>,
    pub timed_out: bool,
}

impl Summary {
    pub(crate) fn new(requested: usize) -> Self {
        Self {
            requested,
            ..Self::default()
        }
    }

    pub(crate) fn record(&mut self, name: &str, result: Result<ExtractedEntry, Error>) {
        self.attempted += 1;
        match result {
            Ok(entry) => {
                self.succeeded += 1;
                self.extracted.push(entry);
            }
            Err(e) => {
                log::warn!("failed to extract {}: {}", name, e);
                self.failures.push(Failure::new(name, &e));
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.timed_out
    }

    pub fn total_bytes(&self) -> u64 {
        self.extracted.iter().map(|e| e.bytes).sum()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
