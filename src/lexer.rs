use crate::error::ParseError;
use logos::{Logos, SpannedIter};
use rust_decimal::Decimal;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

#[derive(Default, Error, Debug, Clone, PartialEq)]
pub enum LexicalError {
    #[default]
    #[error("unrecognized symbol")]
    UnrecognizedSymbol,
    #[error("unexpected end of input in string literal")]
    UnterminatedString,
    #[error("unexpected end of input in path query")]
    UnterminatedPathQuery,
    #[error("failed to parse number: {0:?}")]
    Number(rust_decimal::Error),
}

/// The tokens of the rule expression language.
///
/// Attribute paths are single identifier tokens (`geo.ctry`), path queries
/// are backtick-delimited and kept as raw text for the compiler to parse,
/// and the keywords `and`/`or`/`not`/`in` are recognized from the identifier
/// stream by exact, case-sensitive match.
#[derive(Clone, Debug, Logos, PartialEq)]
#[logos(skip r"[\s\t\n\f]+", error = LexicalError)]
pub enum Token<'source> {
    #[token("==")]
    Equal,
    #[token("!=")]
    NotEqual,
    #[token("<=")]
    LessThanEqual,
    #[token(">=")]
    GreaterThanEqual,
    #[token("<")]
    LessThan,
    #[token(">")]
    GreaterThan,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Times,
    #[token("/")]
    Divide,
    #[token("(")]
    LeftParenthesis,
    #[token(")")]
    RightParenthesis,
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("not")]
    Not,
    #[token("in")]
    In,
    #[regex(r"[0-9]+(\.[0-9]*)?", |lex| Decimal::from_str(lex.slice()).map_err(LexicalError::Number))]
    Number(Decimal),
    #[regex(r#""[^"]*""#, inner_text)]
    #[regex(r"'[^']*'", inner_text)]
    #[regex(r#""[^"]*"#, unterminated_string)]
    #[regex(r"'[^']*", unterminated_string)]
    StringLiteral(&'source str),
    #[regex(r"`[^`]*`", inner_text)]
    #[regex(r"`[^`]*", unterminated_path_query)]
    PathQuery(&'source str),
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_.]*", |lex| lex.slice())]
    Identifier(&'source str),
}

fn inner_text<'source>(lex: &mut logos::Lexer<'source, Token<'source>>) -> &'source str {
    let slice = lex.slice();
    &slice[1..slice.len() - 1]
}

fn unterminated_string<'source>(
    _lex: &mut logos::Lexer<'source, Token<'source>>,
) -> Result<&'source str, LexicalError> {
    Err(LexicalError::UnterminatedString)
}

fn unterminated_path_query<'source>(
    _lex: &mut logos::Lexer<'source, Token<'source>>,
) -> Result<&'source str, LexicalError> {
    Err(LexicalError::UnterminatedPathQuery)
}

/// Token categories, named the way syntax errors report them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Number,
    PathQuery,
    String,
    Plus,
    Minus,
    Times,
    Divide,
    LeftParenthesis,
    RightParenthesis,
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessThanEqual,
    GreaterThanEqual,
    Or,
    And,
    Not,
    In,
    EndOfInput,
}

impl Display for TokenKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        let description = match self {
            TokenKind::Identifier => "attribute name",
            TokenKind::Number => "number",
            TokenKind::PathQuery => "path query",
            TokenKind::String => "string",
            TokenKind::Plus => "plus sign",
            TokenKind::Minus => "minus sign",
            TokenKind::Times => "times sign",
            TokenKind::Divide => "divide sign",
            TokenKind::LeftParenthesis => "left parenthesis",
            TokenKind::RightParenthesis => "right parenthesis",
            TokenKind::Equal => "equal sign",
            TokenKind::NotEqual => "not equal sign",
            TokenKind::LessThan => "less than sign",
            TokenKind::GreaterThan => "greater than sign",
            TokenKind::LessThanEqual => "less than or equal sign",
            TokenKind::GreaterThanEqual => "greater than or equal sign",
            TokenKind::Or => "logical or",
            TokenKind::And => "logical and",
            TokenKind::Not => "NOT keyword",
            TokenKind::In => "IN keyword",
            TokenKind::EndOfInput => "end of input",
        };
        write!(formatter, "{description}")
    }
}

impl Token<'_> {
    pub fn kind(&self) -> TokenKind {
        match self {
            Token::Identifier(_) => TokenKind::Identifier,
            Token::Number(_) => TokenKind::Number,
            Token::PathQuery(_) => TokenKind::PathQuery,
            Token::StringLiteral(_) => TokenKind::String,
            Token::Plus => TokenKind::Plus,
            Token::Minus => TokenKind::Minus,
            Token::Times => TokenKind::Times,
            Token::Divide => TokenKind::Divide,
            Token::LeftParenthesis => TokenKind::LeftParenthesis,
            Token::RightParenthesis => TokenKind::RightParenthesis,
            Token::Equal => TokenKind::Equal,
            Token::NotEqual => TokenKind::NotEqual,
            Token::LessThan => TokenKind::LessThan,
            Token::GreaterThan => TokenKind::GreaterThan,
            Token::LessThanEqual => TokenKind::LessThanEqual,
            Token::GreaterThanEqual => TokenKind::GreaterThanEqual,
            Token::Or => TokenKind::Or,
            Token::And => TokenKind::And,
            Token::Not => TokenKind::Not,
            Token::In => TokenKind::In,
        }
    }
}

pub type Spanned<Tok, Location, Error> = Result<(Location, Tok, Location), Error>;

pub struct Lexer<'input> {
    token_stream: SpannedIter<'input, Token<'input>>,
}

impl<'input> Lexer<'input> {
    pub fn new(input: &'input str) -> Self {
        Self {
            token_stream: Token::lexer(input).spanned(),
        }
    }
}

impl<'input> Iterator for Lexer<'input> {
    type Item = Spanned<Token<'input>, usize, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.token_stream.next().map(|(token, span)| {
            let token = token.map(|token| match token {
                // Keywords are part of the identifier grammar; remap them in
                // case the identifier regex wins the tie against the keyword
                // tokens.
                Token::Identifier("and") => Token::And,
                Token::Identifier("or") => Token::Or,
                Token::Identifier("not") => Token::Not,
                Token::Identifier("in") => Token::In,
                other => other,
            });

            token
                .map(|token| (span.start, token, span.end))
                .map_err(|error| ParseError::Lexical {
                    error,
                    position: span.start,
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_tokens(input: &str) -> Result<Vec<Token>, ParseError> {
        Lexer::new(input)
            .map(|value| match value {
                Ok((_, token, _)) => Ok(token),
                Err(error) => Err(error),
            })
            .collect()
    }

    #[test]
    fn can_lex_comparison_operators() {
        assert_eq!(vec![Token::Equal], lex_tokens("==").unwrap());
        assert_eq!(vec![Token::NotEqual], lex_tokens("!=").unwrap());
        assert_eq!(vec![Token::LessThan], lex_tokens("<").unwrap());
        assert_eq!(vec![Token::GreaterThan], lex_tokens(">").unwrap());
        assert_eq!(vec![Token::LessThanEqual], lex_tokens("<=").unwrap());
        assert_eq!(vec![Token::GreaterThanEqual], lex_tokens(">=").unwrap());
    }

    #[test]
    fn can_lex_arithmetic_operators() {
        assert_eq!(vec![Token::Plus], lex_tokens("+").unwrap());
        assert_eq!(vec![Token::Minus], lex_tokens("-").unwrap());
        assert_eq!(vec![Token::Times], lex_tokens("*").unwrap());
        assert_eq!(vec![Token::Divide], lex_tokens("/").unwrap());
    }

    #[test]
    fn can_lex_parenthesis() {
        assert_eq!(vec![Token::LeftParenthesis], lex_tokens("(").unwrap());
        assert_eq!(vec![Token::RightParenthesis], lex_tokens(")").unwrap());
    }

    #[test]
    fn can_lex_keywords() {
        assert_eq!(vec![Token::And], lex_tokens("and").unwrap());
        assert_eq!(vec![Token::Or], lex_tokens("or").unwrap());
        assert_eq!(vec![Token::Not], lex_tokens("not").unwrap());
        assert_eq!(vec![Token::In], lex_tokens("in").unwrap());
    }

    #[test]
    fn keywords_are_case_sensitive() {
        assert_eq!(vec![Token::Identifier("AND")], lex_tokens("AND").unwrap());
        assert_eq!(vec![Token::Identifier("Not")], lex_tokens("Not").unwrap());
    }

    #[test]
    fn identifiers_with_keyword_prefixes_stay_identifiers() {
        assert_eq!(
            vec![Token::Identifier("android")],
            lex_tokens("android").unwrap()
        );
        assert_eq!(
            vec![Token::Identifier("insider")],
            lex_tokens("insider").unwrap()
        );
    }

    #[test]
    fn can_lex_identifier() {
        assert_eq!(vec![Token::Identifier("rep")], lex_tokens("rep").unwrap());
    }

    #[test]
    fn can_lex_dotted_attribute_path_as_single_identifier() {
        assert_eq!(
            vec![Token::Identifier("geo.ctry")],
            lex_tokens("geo.ctry").unwrap()
        );
    }

    #[test]
    fn can_lex_integer() {
        assert_eq!(
            vec![Token::Number(Decimal::new(123, 0))],
            lex_tokens("123").unwrap()
        );
    }

    #[test]
    fn can_lex_float() {
        assert_eq!(
            vec![Token::Number(Decimal::new(123123, 3))],
            lex_tokens("123.123").unwrap()
        );
        assert_eq!(
            vec![Token::Number(Decimal::new(123, 0))],
            lex_tokens("123.").unwrap()
        );
    }

    #[test]
    fn return_an_error_on_a_second_decimal_point() {
        assert!(lex_tokens("1.2.3").is_err());
    }

    #[test]
    fn can_lex_string() {
        assert_eq!(
            vec![Token::StringLiteral("tor exit")],
            lex_tokens("\"tor exit\"").unwrap()
        );
        assert_eq!(
            vec![Token::StringLiteral("tor exit")],
            lex_tokens("'tor exit'").unwrap()
        );
    }

    #[test]
    fn can_lex_empty_string() {
        assert_eq!(vec![Token::StringLiteral("")], lex_tokens("\"\"").unwrap());
        assert_eq!(vec![Token::StringLiteral("")], lex_tokens("''").unwrap());
    }

    #[test]
    fn return_an_error_on_unterminated_string() {
        assert_eq!(
            Err(ParseError::Lexical {
                error: LexicalError::UnterminatedString,
                position: 0,
            }),
            lex_tokens("\"never closed")
        );
        assert!(lex_tokens("'never closed").is_err());
    }

    #[test]
    fn can_lex_path_query() {
        assert_eq!(
            vec![Token::PathQuery("$.dns.names[*]")],
            lex_tokens("`$.dns.names[*]`").unwrap()
        );
    }

    #[test]
    fn return_an_error_on_unterminated_path_query() {
        assert_eq!(
            Err(ParseError::Lexical {
                error: LexicalError::UnterminatedPathQuery,
                position: 0,
            }),
            lex_tokens("`$.dns.names")
        );
    }

    #[test]
    fn return_an_error_on_unrecognized_symbol() {
        assert_eq!(
            Err(ParseError::Lexical {
                error: LexicalError::UnrecognizedSymbol,
                position: 4,
            }),
            lex_tokens("rep @ 1")
        );
    }

    #[test]
    fn return_an_error_on_lone_equal_sign() {
        assert!(lex_tokens("rep = 1").is_err());
    }

    #[test]
    fn can_lex_a_whole_condition() {
        let actual = lex_tokens("geo.ctry == 'US' and rep > 0.5");

        assert_eq!(
            Ok(vec![
                Token::Identifier("geo.ctry"),
                Token::Equal,
                Token::StringLiteral("US"),
                Token::And,
                Token::Identifier("rep"),
                Token::GreaterThan,
                Token::Number(Decimal::new(5, 1)),
            ]),
            actual
        );
    }

    #[test]
    fn can_lex_membership_condition() {
        let actual = lex_tokens("'openresolver' not in events.types");

        assert_eq!(
            Ok(vec![
                Token::StringLiteral("openresolver"),
                Token::Not,
                Token::In,
                Token::Identifier("events.types"),
            ]),
            actual
        );
    }
}
