use crate::pathquery::PathQuery;
use crate::value::Value;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::cmp::Ordering;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(.*?)\}").expect("placeholder pattern is valid"));

/// A dotted attribute path (`geo.ctry`), pre-split at compile time.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributePath {
    raw: String,
    segments: Vec<String>,
}

impl AttributePath {
    pub fn new(path: &str) -> Self {
        Self {
            raw: path.to_string(),
            segments: path.split('.').map(str::to_string).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.raw
    }

    pub fn resolve<'record>(&self, record: &'record Value) -> Option<&'record Value> {
        record.get_path(&self.segments)
    }
}

/// A string with `{attribute}` placeholders substituted at evaluation time.
///
/// Placeholders whose attribute is absent (or null) are left in the output
/// verbatim.
#[derive(Clone, Debug, PartialEq)]
pub struct StringTemplate {
    text: String,
    placeholders: Vec<(String, AttributePath)>,
}

impl StringTemplate {
    pub fn new(text: &str) -> Self {
        let mut placeholders: Vec<(String, AttributePath)> = Vec::new();
        for captures in PLACEHOLDER.captures_iter(text) {
            let name = &captures[1];
            if placeholders.iter().any(|(existing, _)| existing == name) {
                continue;
            }
            placeholders.push((name.to_string(), AttributePath::new(name)));
        }
        Self {
            text: text.to_string(),
            placeholders,
        }
    }

    pub fn has_placeholders(&self) -> bool {
        !self.placeholders.is_empty()
    }

    pub fn render(&self, record: &Value) -> String {
        let mut rendered = self.text.clone();
        for (name, path) in &self.placeholders {
            match path.resolve(record) {
                Some(Value::Null) | None => {}
                Some(value) => {
                    rendered = rendered.replace(&format!("{{{name}}}"), &value.to_string());
                }
            }
        }
        rendered
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessThanEqual,
    GreaterThanEqual,
    And,
    Or,
}

/// A compiled rule expression.
///
/// The tree is immutable after compilation and evaluation never fails: a
/// lookup that cannot succeed yields `Null`, a coercion that does not apply
/// falls back to its default and an operator application that cannot be
/// carried out yields `false`. A malformed or partially populated record
/// therefore makes a rule not match; it cannot make evaluation error out.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Attribute(AttributePath),
    PathQuery(PathQuery),
    Literal(Value),
    Template(StringTemplate),
    UnaryMinus(Box<Expr>),
    Not(Box<Expr>),
    Binary {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Membership {
        item: Box<Expr>,
        container: Box<Expr>,
        negated: bool,
    },
}

impl Expr {
    pub fn binary(op: BinaryOperator, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn not(inner: Expr) -> Self {
        Expr::Not(Box::new(inner))
    }

    pub fn unary_minus(inner: Expr) -> Self {
        Expr::UnaryMinus(Box::new(inner))
    }

    pub fn membership(item: Expr, container: Expr, negated: bool) -> Self {
        Expr::Membership {
            item: Box::new(item),
            container: Box::new(container),
            negated,
        }
    }

    /// A string operand: a plain literal, or a template when the text embeds
    /// at least one `{attribute}` placeholder.
    pub fn string(text: &str) -> Self {
        let template = StringTemplate::new(text);
        if template.has_placeholders() {
            Expr::Template(template)
        } else {
            Expr::Literal(Value::String(text.to_string()))
        }
    }

    /// Evaluate the expression against a record snapshot.
    pub fn eval(&self, record: &Value) -> Value {
        match self {
            Expr::Attribute(path) => path.resolve(record).cloned().unwrap_or(Value::Null),
            Expr::PathQuery(query) => Value::List(query.find(record)),
            Expr::Literal(value) => value.clone(),
            Expr::Template(template) => Value::String(template.render(record)),
            Expr::UnaryMinus(inner) => Value::Number(-inner.eval(record).to_arithmetic()),
            Expr::Not(inner) => Value::Boolean(!inner.eval(record).to_logical()),
            Expr::Binary { op, left, right } => eval_binary(*op, left, right, record),
            Expr::Membership {
                item,
                container,
                negated,
            } => {
                let item = item.eval(record);
                let found = contains(&container.eval(record), &item);
                Value::Boolean(if *negated { !found } else { found })
            }
        }
    }
}

fn eval_binary(op: BinaryOperator, left: &Expr, right: &Expr, record: &Value) -> Value {
    match op {
        BinaryOperator::And => {
            if !left.eval(record).to_logical() {
                return Value::Boolean(false);
            }
            Value::Boolean(right.eval(record).to_logical())
        }
        BinaryOperator::Or => {
            if left.eval(record).to_logical() {
                return Value::Boolean(true);
            }
            Value::Boolean(right.eval(record).to_logical())
        }
        BinaryOperator::Add => {
            let (lhs, rhs) = arithmetic_operands(left, right, record);
            number_or_false(lhs.checked_add(rhs))
        }
        BinaryOperator::Subtract => {
            let (lhs, rhs) = arithmetic_operands(left, right, record);
            number_or_false(lhs.checked_sub(rhs))
        }
        BinaryOperator::Multiply => {
            let (lhs, rhs) = arithmetic_operands(left, right, record);
            number_or_false(lhs.checked_mul(rhs))
        }
        BinaryOperator::Divide => {
            let (lhs, rhs) = arithmetic_operands(left, right, record);
            if rhs.is_zero() {
                return Value::Number(Decimal::ZERO);
            }
            number_or_false(lhs.checked_div(rhs))
        }
        BinaryOperator::Equal => Value::Boolean(left.eval(record) == right.eval(record)),
        BinaryOperator::NotEqual => Value::Boolean(left.eval(record) != right.eval(record)),
        BinaryOperator::LessThan => ordered(left, right, record, Ordering::is_lt),
        BinaryOperator::GreaterThan => ordered(left, right, record, Ordering::is_gt),
        BinaryOperator::LessThanEqual => ordered(left, right, record, Ordering::is_le),
        BinaryOperator::GreaterThanEqual => ordered(left, right, record, Ordering::is_ge),
    }
}

fn arithmetic_operands(left: &Expr, right: &Expr, record: &Value) -> (Decimal, Decimal) {
    (
        left.eval(record).to_arithmetic(),
        right.eval(record).to_arithmetic(),
    )
}

// Arithmetic that cannot be carried out (overflow) fails closed.
fn number_or_false(result: Option<Decimal>) -> Value {
    match result {
        Some(number) => Value::Number(number),
        None => Value::Boolean(false),
    }
}

fn ordered(
    left: &Expr,
    right: &Expr,
    record: &Value,
    accept: impl Fn(Ordering) -> bool,
) -> Value {
    match left.eval(record).compare(&right.eval(record)) {
        Some(ordering) => Value::Boolean(accept(ordering)),
        None => Value::Boolean(false),
    }
}

// Containment over the container's native notion of membership: substring
// for strings, element for lists, key for maps. A container (or item) the
// test does not apply to counts as "not found".
fn contains(container: &Value, item: &Value) -> bool {
    match (container, item) {
        (Value::String(text), Value::String(needle)) => text.contains(needle.as_str()),
        (Value::List(values), _) => values.contains(item),
        (Value::Map(entries), Value::String(key)) => entries.contains_key(key),
        _ => false,
    }
}
