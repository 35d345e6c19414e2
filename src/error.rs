//! Conversion error types.

use thiserror::Error;

/// Errors that abort a conversion.
///
/// Structural surprises in well-formed input (an unextractable loop, an
/// unresolvable default) never abort — only unparseable input or a broken
/// grammar installation does.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The input script does not parse. Fatal: no partial output is produced.
    #[error("syntax error in input script at line {line}, column {column}: {snippet}")]
    Syntax {
        line: usize,
        column: usize,
        snippet: String,
    },

    /// The Python grammar could not be loaded into the parser.
    #[error("failed to initialize Python grammar: {0}")]
    Language(String),
}
