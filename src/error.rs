use crate::lexer::{LexicalError, TokenKind};
use crate::pathquery::PathQueryError;
use thiserror::Error;

/// Errors produced while turning rule text into a compiled expression.
///
/// A [`ParseError`] rejects the tag that owns the offending text; it never
/// aborts the load of other tags.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("{error} at position {position}")]
    Lexical {
        error: LexicalError,
        position: usize,
    },
    #[error("expected {expected}, found {found}")]
    Syntax {
        expected: &'static str,
        found: TokenKind,
    },
    #[error("invalid path query: {0}")]
    PathQuery(#[from] PathQueryError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to deserialize tag configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
