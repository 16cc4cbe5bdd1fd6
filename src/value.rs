use itertools::Itertools;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// The universal runtime type flowing through rule evaluation.
///
/// All record data, literals and expression results are [`Value`]s. Integers
/// and floats are unified into [`Value::Number`]. Records are `Map`s,
/// arbitrarily nested; dotted attribute paths descend through nested maps.
///
/// Every navigation and coercion defined here is total: a lookup that cannot
/// succeed yields `None`/`Null` and a coercion that does not apply falls back
/// to a defined default, never to an error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Number(Decimal),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Look up a key in a map value. Anything that is not a map has no keys.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries.get(key),
            _ => None,
        }
    }

    /// Descend through nested maps along `path`, one segment per map level.
    ///
    /// Returns `None` if any segment is absent or if the value reached by
    /// the preceding segments is not a map.
    pub fn get_path(&self, path: &[String]) -> Option<&Value> {
        let mut current = self;
        for segment in path {
            current = current.get(segment)?;
        }
        Some(current)
    }

    /// Truthiness used by `and`/`or`/`not`: booleans pass through, numbers
    /// are false iff zero, null is false and anything else is true.
    pub fn to_logical(&self) -> bool {
        match self {
            Value::Boolean(value) => *value,
            Value::Number(number) => !number.is_zero(),
            Value::Null => false,
            _ => true,
        }
    }

    /// Numeric coercion used by the arithmetic operators and unary minus:
    /// numbers pass through, null counts as 0 and any other value counts
    /// as 1.
    pub fn to_arithmetic(&self) -> Decimal {
        match self {
            Value::Number(number) => *number,
            Value::Null => Decimal::ZERO,
            _ => Decimal::ONE,
        }
    }

    /// Ordering for the relational operators, defined for number/number,
    /// string/string and list/list (lexicographic) pairs. Every other
    /// pairing is unordered and makes the comparison fail closed.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Number(left), Value::Number(right)) => left.partial_cmp(right),
            (Value::String(left), Value::String(right)) => Some(left.cmp(right)),
            (Value::List(left), Value::List(right)) => {
                for (a, b) in left.iter().zip(right) {
                    match a.compare(b)? {
                        Ordering::Equal => continue,
                        decided => return Some(decided),
                    }
                }
                Some(left.len().cmp(&right.len()))
            }
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Value::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(Decimal::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl Display for Value {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(formatter, "null"),
            Value::Boolean(value) => write!(formatter, "{value}"),
            Value::Number(number) => write!(formatter, "{number}"),
            Value::String(text) => write!(formatter, "{text}"),
            Value::List(values) => {
                write!(formatter, "[{}]", values.iter().map(Nested).join(", "))
            }
            Value::Map(entries) => {
                write!(
                    formatter,
                    "{{{}}}",
                    entries
                        .iter()
                        .map(|(key, value)| format!("{key}: {}", Nested(value)))
                        .join(", ")
                )
            }
        }
    }
}

// Strings keep their quotes when rendered inside a list or map.
struct Nested<'a>(&'a Value);

impl Display for Nested<'_> {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self.0 {
            Value::String(text) => write!(formatter, "\"{text}\""),
            other => write!(formatter, "{other}"),
        }
    }
}
