//! Decoding of raw corpus samples into [`CorpusRecord`]s.
//!
//! A sample is three segments joined by a `~~~` separator line:
//!
//! ```text
//! Usage: prog [--count=<n>]
//! ~~~
//! prog --count=3
//! ~~~
//! {"--count": 3}
//! ```
//!
//! The first segment is the usage doc, the second the invocation line and the third
//! the expected outcome, either the JSON string `"user-error"` or a JSON object.

use crate::value::{Opts, json_kind, opts_from_json};
use serde_json::Value as Json;
use thiserror::Error;

/// Separator between the doc, invocation and expectation segments.
pub const SEGMENT_DELIMITER: &[u8] = b"\n~~~\n";

/// Expectation literal for samples the engine must reject.
pub const USER_ERROR_LITERAL: &str = "user-error";

/// Reasons a sample is rejected before it reaches the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("expected three segments separated by `~~~` lines")]
    MalformedSegments,
    #[error("segment is not valid UTF-8: {0}")]
    InvalidText(String),
    #[error("expectation is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("unsupported expectation shape: {0}")]
    UnsupportedShape(String),
}

impl DecodeError {
    /// Short stable label for logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            DecodeError::MalformedSegments => "malformed-segments",
            DecodeError::InvalidText(_) => "invalid-text",
            DecodeError::InvalidJson(_) => "invalid-json",
            DecodeError::UnsupportedShape(_) => "unsupported-shape",
        }
    }
}

/// What the engine is expected to do with a record's invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    /// The engine must reject the invocation as a user error.
    UserError,
    /// The engine must succeed with exactly this mapping.
    Result(Opts),
}

/// A decoded corpus sample. Only [`decode`] constructs one.
#[derive(Debug, Clone)]
pub struct CorpusRecord {
    doc: String,
    program_name: String,
    argv: Vec<String>,
    expectation: Expectation,
}

impl CorpusRecord {
    pub fn doc(&self) -> &str {
        &self.doc
    }

    pub fn program_name(&self) -> &str {
        &self.program_name
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn expectation(&self) -> &Expectation {
        &self.expectation
    }
}

/// Decodes one raw sample.
///
/// Splitting stops after the second separator, so the expectation segment may itself
/// contain `~~~` lines. The doc is kept byte for byte; only the invocation line is trimmed.
pub fn decode(raw: &[u8]) -> Result<CorpusRecord, DecodeError> {
    let [doc, invocation, expectation] = split_segments(raw)?;

    let doc = std::str::from_utf8(doc)
        .map_err(|e| DecodeError::InvalidText(format!("doc: {e}")))?;
    let invocation = std::str::from_utf8(invocation)
        .map_err(|e| DecodeError::InvalidText(format!("invocation: {e}")))?;

    let (program_name, argv) = split_invocation(invocation);
    let expectation = parse_expectation(expectation)?;

    Ok(CorpusRecord {
        doc: doc.to_string(),
        program_name,
        argv,
        expectation,
    })
}

fn split_segments(raw: &[u8]) -> Result<[&[u8]; 3], DecodeError> {
    let (doc, rest) = split_once(raw, SEGMENT_DELIMITER).ok_or(DecodeError::MalformedSegments)?;
    let (invocation, expectation) =
        split_once(rest, SEGMENT_DELIMITER).ok_or(DecodeError::MalformedSegments)?;
    Ok([doc, invocation, expectation])
}

fn split_once<'a>(haystack: &'a [u8], needle: &[u8]) -> Option<(&'a [u8], &'a [u8])> {
    let at = haystack
        .windows(needle.len())
        .position(|window| window == needle)?;
    Some((&haystack[..at], &haystack[at + needle.len()..]))
}

fn split_invocation(line: &str) -> (String, Vec<String>) {
    let line = line.trim();
    let (program_name, argv_text) = match line.find(char::is_whitespace) {
        Some(at) => line.split_at(at),
        None => (line, ""),
    };
    let argv = argv_text.split_whitespace().map(str::to_string).collect();
    (program_name.to_string(), argv)
}

fn parse_expectation(segment: &[u8]) -> Result<Expectation, DecodeError> {
    let json: Json =
        serde_json::from_slice(segment).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;

    match json {
        Json::String(s) if s == USER_ERROR_LITERAL => Ok(Expectation::UserError),
        Json::Object(fields) => opts_from_json(fields)
            .map(Expectation::Result)
            .map_err(DecodeError::UnsupportedShape),
        other => Err(DecodeError::UnsupportedShape(format!(
            "top-level {}",
            json_kind(&other)
        ))),
    }
}
