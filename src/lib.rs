//! A rule-based tag classification engine for entity reputation records.
//!
//! Reputation platforms enrich per-entity records (keyed by IP address) with
//! data from many independent feeds. This crate implements the tagging side
//! of such a platform: classification rules written in a small expression
//! language are compiled once at configuration load, an index derives which
//! attributes each rule depends on, and a reconciliation pass turns rule
//! re-evaluation into the minimal list of record mutations. The engine is a
//! pure function of (compiled rules, record snapshot, update list); it
//! performs no I/O, persists nothing and never mutates the record itself.
//!
//! # Examples
//!
//! Compiling a rule set and reconciling a record:
//!
//! ```
//! use reptag::{AttributeUpdate, EntityKey, Mutation, RuleSet, Value};
//!
//! let rules = RuleSet::from_yaml(r#"
//! tags:
//!   scanner:
//!     condition: "events.scan_count > 10 and rep > 0.5"
//!     info: "scanning host ({events.scan_count} flows)"
//! "#).unwrap();
//!
//! let record: Value = serde_json::from_value(serde_json::json!({
//!     "events": { "scan_count": 25 },
//!     "rep": 0.9,
//! })).unwrap();
//!
//! // The dispatcher reports which attributes changed; only tags depending
//! // on them are re-evaluated.
//! let updates = vec![AttributeUpdate::new("rep", Value::Null)];
//! let mutations = rules
//!     .update_tags(&EntityKey::ip("192.0.2.42"), &record, &updates)
//!     .unwrap();
//!
//! assert!(matches!(
//!     &mutations[0],
//!     Mutation::Set { path, .. } if path == "tags.scanner.confidence"
//! ));
//! ```
//!
//! # The rule language
//!
//! A tag's `condition` is an expression over the record's attributes:
//!
//! * Boolean operators: `and`, `or`, `not`, with short-circuit evaluation;
//! * Comparison: `==`, `!=`, `<`, `>`, `<=`, `>=`;
//! * Arithmetic: `+`, `-`, `*`, `/` and unary minus;
//! * Membership: `in` and `not in` (substring for strings, element for
//!   lists, key for maps);
//! * Operands: dotted attribute paths (`geo.ctry`), numbers, quoted strings
//!   (`'US'`), backtick-delimited path queries returning all matches
//!   (`` `$.dns.names[*]` ``) and parenthesized sub-conditions.
//!
//! As an example, the following would all be valid conditions:
//!
//! ```text
//! events.scan_count > 10 and rep > 0.5
//! 'openresolver' in events.types or hostname.is_static
//! not (geo.ctry == 'US' or geo.ctry == 'CA') and `$.bl[*]` != 0
//! ```
//!
//! Evaluation is total: missing attributes read as null, null counts as 0
//! in arithmetic (other non-numbers as 1), division by zero yields 0 and a
//! comparison between incompatible types is simply false. A malformed or
//! partially populated record makes a rule not match; it never makes
//! evaluation fail.
//!
//! The optional `info` is a string template; `{attribute}` placeholders are
//! substituted from the record when the tag is applied.
//!
//! # Reconciliation
//!
//! [`RuleSet::update_tags`] classifies every eligible tag against the
//! record's existing `tags.<id>` state and emits `set`/`remove` mutations
//! only for actual changes, so re-running it on an unchanged record yields
//! an empty list. A `!refresh_tags` event forces re-evaluation of every
//! configured tag and drops record tags that are no longer configured. The
//! caller applies the mutations and owns persistence.
mod ast;
mod engine;
mod error;
mod lexer;
mod parser;
mod pathquery;
mod rules;
#[cfg(test)]
mod test_utils;
mod value;

pub use crate::{
    ast::{AttributePath, BinaryOperator, Expr, StringTemplate},
    engine::{
        AttributeUpdate, EntityKey, Mutation, TagState, UpdateManager, ENTITY_TYPE, REFRESH_EVENT,
    },
    error::{ConfigError, ParseError},
    lexer::{LexicalError, TokenKind},
    parser::{parse, parse_info, ParsedExpression},
    pathquery::{PathQuery, PathQueryError},
    rules::{CompiledTag, RuleSet, TagDefinition, TagsConfig},
    value::Value,
};
