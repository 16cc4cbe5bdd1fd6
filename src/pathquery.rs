use crate::value::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PathQueryError {
    #[error("the query is empty")]
    Empty,
    #[error("expected a field name at position {0}")]
    ExpectedField(usize),
    #[error("unclosed bracket selector at position {0}")]
    UnclosedBracket(usize),
    #[error("invalid index in bracket selector at position {0}")]
    InvalidIndex(usize),
    #[error("unexpected character {character:?} at position {position}")]
    UnexpectedCharacter { character: char, position: usize },
}

#[derive(Debug, Clone, PartialEq)]
enum Step {
    /// `.name` or `['name']` — a single map key.
    Field(String),
    /// `[3]` — a single list element.
    Index(usize),
    /// `[*]` or `.*` — every map value or list element.
    Wildcard,
    /// `..name` — every value stored under `name` at any depth.
    Descend(String),
}

/// A compiled path-query expression over a nested record.
///
/// This is the JSONPath-like subset the rule language embeds between
/// backticks: an optional `$` root, dot fields, quoted bracket fields,
/// numeric indices, `[*]`/`.*` wildcards and `..name` recursive descent.
/// Evaluation returns *all* matching values, an empty list when nothing
/// matches, and never fails; malformed query text is rejected at rule
/// compile time instead.
#[derive(Debug, Clone, PartialEq)]
pub struct PathQuery {
    raw: String,
    steps: Vec<Step>,
}

impl PathQuery {
    pub fn parse(text: &str) -> Result<Self, PathQueryError> {
        let raw = text.trim();
        if raw.is_empty() {
            return Err(PathQueryError::Empty);
        }

        let characters: Vec<char> = raw.chars().collect();
        let mut position = 0;
        let mut steps = Vec::new();

        if characters[position] == '$' {
            position += 1;
        } else if is_field_character(characters[position]) {
            // A bare leading field: `geo.ctry` instead of `$.geo.ctry`.
            steps.push(Step::Field(read_field(&characters, &mut position)?));
        }

        while position < characters.len() {
            match characters[position] {
                '.' => {
                    position += 1;
                    if characters.get(position) == Some(&'.') {
                        position += 1;
                        steps.push(Step::Descend(read_field(&characters, &mut position)?));
                    } else if characters.get(position) == Some(&'*') {
                        position += 1;
                        steps.push(Step::Wildcard);
                    } else {
                        steps.push(Step::Field(read_field(&characters, &mut position)?));
                    }
                }
                '[' => {
                    let opened_at = position;
                    position += 1;
                    steps.push(read_bracket(&characters, &mut position, opened_at)?);
                }
                character => {
                    return Err(PathQueryError::UnexpectedCharacter {
                        character,
                        position,
                    });
                }
            }
        }

        if steps.is_empty() {
            return Err(PathQueryError::ExpectedField(position));
        }

        Ok(Self {
            raw: raw.to_string(),
            steps,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Collect every value the query selects from `root`, in document order.
    pub fn find(&self, root: &Value) -> Vec<Value> {
        let mut current = vec![root];
        for step in &self.steps {
            let mut next = Vec::new();
            for value in current {
                step.select(value, &mut next);
            }
            current = next;
        }
        current.into_iter().cloned().collect()
    }
}

impl Step {
    fn select<'a>(&self, value: &'a Value, out: &mut Vec<&'a Value>) {
        match self {
            Step::Field(name) => {
                if let Some(found) = value.get(name) {
                    out.push(found);
                }
            }
            Step::Index(index) => {
                if let Value::List(values) = value {
                    if let Some(found) = values.get(*index) {
                        out.push(found);
                    }
                }
            }
            Step::Wildcard => match value {
                Value::Map(entries) => out.extend(entries.values()),
                Value::List(values) => out.extend(values.iter()),
                _ => {}
            },
            Step::Descend(name) => descend(name, value, out),
        }
    }
}

fn descend<'a>(name: &str, value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Map(entries) => {
            for (key, nested) in entries {
                if key == name {
                    out.push(nested);
                }
                descend(name, nested, out);
            }
        }
        Value::List(values) => {
            for nested in values {
                descend(name, nested, out);
            }
        }
        _ => {}
    }
}

fn is_field_character(character: char) -> bool {
    character.is_ascii_alphanumeric() || character == '_' || character == '-'
}

fn read_field(characters: &[char], position: &mut usize) -> Result<String, PathQueryError> {
    let start = *position;
    while *position < characters.len() && is_field_character(characters[*position]) {
        *position += 1;
    }
    if *position == start {
        return Err(PathQueryError::ExpectedField(start));
    }
    Ok(characters[start..*position].iter().collect())
}

fn read_bracket(
    characters: &[char],
    position: &mut usize,
    opened_at: usize,
) -> Result<Step, PathQueryError> {
    let step = match characters.get(*position) {
        Some('*') => {
            *position += 1;
            Step::Wildcard
        }
        Some(&quote) if quote == '\'' || quote == '"' => {
            *position += 1;
            let start = *position;
            while *position < characters.len() && characters[*position] != quote {
                *position += 1;
            }
            if *position == characters.len() {
                return Err(PathQueryError::UnclosedBracket(opened_at));
            }
            let name: String = characters[start..*position].iter().collect();
            *position += 1;
            Step::Field(name)
        }
        Some(character) if character.is_ascii_digit() => {
            let start = *position;
            while *position < characters.len() && characters[*position].is_ascii_digit() {
                *position += 1;
            }
            let digits: String = characters[start..*position].iter().collect();
            let index = digits
                .parse()
                .map_err(|_| PathQueryError::InvalidIndex(start))?;
            Step::Index(index)
        }
        _ => return Err(PathQueryError::InvalidIndex(*position)),
    };

    if characters.get(*position) != Some(&']') {
        return Err(PathQueryError::UnclosedBracket(opened_at));
    }
    *position += 1;
    Ok(step)
}
