//! Shared utility functions for question-forge.
//!
//! This module provides the tolerant parser that turns free-form model
//! output into JSON records.

pub mod response_parser;

pub use response_parser::{
    extract_candidate, parse_response, repair_invalid_escapes, salvage_questions,
    sanitize_strings, strip_trailing_commas, ParseError, RawResponse, Record,
};
