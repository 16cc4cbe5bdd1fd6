use crate::ast::{AttributePath, BinaryOperator, Expr};
use crate::error::ParseError;
use crate::lexer::{Lexer, Token, TokenKind};
use crate::pathquery::PathQuery;
use crate::value::Value;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use tracing::warn;

// The top-level-field heuristic: a path query registers the first
// alphanumeric run of its text as its trigger attribute. Complex queries
// referencing several fields under-trigger; that is accepted behavior.
static PATH_QUERY_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new("[A-Za-z0-9_-]+").expect("field pattern is valid"));

/// The result of compiling rule text: the expression tree plus the set of
/// attribute names whose update must re-trigger its evaluation.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedExpression {
    pub ast: Expr,
    pub triggers: BTreeSet<String>,
}

/// Parse a condition expression.
///
/// Grammar, lowest to highest precedence:
///
/// ```text
/// condition  := or_expr
/// or_expr    := and_expr ( "or" and_expr )*
/// and_expr   := cond_part ( "and" cond_part )*
/// cond_part  := "not" cond_part
///             | sum ( rel_op sum | ("not")? "in" operand )?
/// rel_op     := "==" | "!=" | "<" | ">" | "<=" | ">="
/// sum        := term ( ("+"|"-") term )*
/// term       := unary ( ("*"|"/") unary )*
/// unary      := "-" unary | operand
/// operand    := IDENT | STRING | NUMBER | PATHQUERY | "(" condition ")"
/// ```
///
/// A `cond_part` without a relational or membership suffix is a bare
/// truthiness test.
pub fn parse(input: &str) -> Result<ParsedExpression, ParseError> {
    let tokens = Lexer::new(input).collect::<Result<Vec<_>, _>>()?;
    let mut parser = Parser::new(tokens);
    let ast = parser.condition()?;
    parser.expect_end()?;
    Ok(ParsedExpression {
        ast,
        triggers: parser.triggers,
    })
}

/// Parse an info template.
///
/// The text is wrapped in double quotes before parsing, so it always
/// compiles to a single string operand (a literal, or a template when it
/// embeds `{attribute}` placeholders). Info text containing a double quote
/// therefore fails to parse and rejects its tag.
pub fn parse_info(input: &str) -> Result<ParsedExpression, ParseError> {
    let quoted = format!("\"{input}\"");
    parse(&quoted)
}

struct Parser<'source> {
    tokens: Vec<(usize, Token<'source>, usize)>,
    position: usize,
    triggers: BTreeSet<String>,
}

impl<'source> Parser<'source> {
    fn new(tokens: Vec<(usize, Token<'source>, usize)>) -> Self {
        Self {
            tokens,
            position: 0,
            triggers: BTreeSet::new(),
        }
    }

    fn current(&self) -> Option<&Token<'source>> {
        self.tokens.get(self.position).map(|(_, token, _)| token)
    }

    fn current_kind(&self) -> TokenKind {
        self.current()
            .map(Token::kind)
            .unwrap_or(TokenKind::EndOfInput)
    }

    fn eat(&mut self, expected: Token<'source>) -> bool {
        if self.current() == Some(&expected) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn expect(
        &mut self,
        expected: Token<'source>,
        description: &'static str,
    ) -> Result<(), ParseError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.syntax_error(description))
        }
    }

    fn expect_end(&self) -> Result<(), ParseError> {
        if self.position == self.tokens.len() {
            Ok(())
        } else {
            Err(self.syntax_error("end of input"))
        }
    }

    fn syntax_error(&self, expected: &'static str) -> ParseError {
        ParseError::Syntax {
            expected,
            found: self.current_kind(),
        }
    }

    fn condition(&mut self) -> Result<Expr, ParseError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr, ParseError> {
        let left = self.and_expr()?;
        if self.eat(Token::Or) {
            let right = self.or_expr()?;
            return Ok(Expr::binary(BinaryOperator::Or, left, right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, ParseError> {
        let left = self.cond_part()?;
        if self.eat(Token::And) {
            let right = self.and_expr()?;
            return Ok(Expr::binary(BinaryOperator::And, left, right));
        }
        Ok(left)
    }

    fn cond_part(&mut self) -> Result<Expr, ParseError> {
        if self.eat(Token::Not) {
            return Ok(Expr::not(self.cond_part()?));
        }

        let left = self.sum()?;

        if let Some(op) = self.relational_operator() {
            let right = self.sum()?;
            return Ok(Expr::binary(op, left, right));
        }
        if self.eat(Token::Not) {
            self.expect(Token::In, "IN keyword")?;
            let container = self.operand()?;
            return Ok(Expr::membership(left, container, true));
        }
        if self.eat(Token::In) {
            let container = self.operand()?;
            return Ok(Expr::membership(left, container, false));
        }

        Ok(left)
    }

    fn relational_operator(&mut self) -> Option<BinaryOperator> {
        let op = match self.current()? {
            Token::Equal => BinaryOperator::Equal,
            Token::NotEqual => BinaryOperator::NotEqual,
            Token::LessThan => BinaryOperator::LessThan,
            Token::GreaterThan => BinaryOperator::GreaterThan,
            Token::LessThanEqual => BinaryOperator::LessThanEqual,
            Token::GreaterThanEqual => BinaryOperator::GreaterThanEqual,
            _ => return None,
        };
        self.position += 1;
        Some(op)
    }

    fn sum(&mut self) -> Result<Expr, ParseError> {
        let mut node = self.term()?;
        loop {
            if self.eat(Token::Plus) {
                node = Expr::binary(BinaryOperator::Add, node, self.term()?);
            } else if self.eat(Token::Minus) {
                node = Expr::binary(BinaryOperator::Subtract, node, self.term()?);
            } else {
                return Ok(node);
            }
        }
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        let mut node = self.unary()?;
        loop {
            if self.eat(Token::Times) {
                node = Expr::binary(BinaryOperator::Multiply, node, self.unary()?);
            } else if self.eat(Token::Divide) {
                node = Expr::binary(BinaryOperator::Divide, node, self.unary()?);
            } else {
                return Ok(node);
            }
        }
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat(Token::Minus) {
            return Ok(Expr::unary_minus(self.unary()?));
        }
        self.operand()
    }

    fn operand(&mut self) -> Result<Expr, ParseError> {
        match self.current().cloned() {
            Some(Token::Identifier(name)) => {
                self.position += 1;
                self.triggers.insert(name.to_string());
                Ok(Expr::Attribute(AttributePath::new(name)))
            }
            Some(Token::StringLiteral(text)) => {
                self.position += 1;
                Ok(Expr::string(text))
            }
            Some(Token::Number(value)) => {
                self.position += 1;
                Ok(Expr::Literal(Value::Number(value)))
            }
            Some(Token::PathQuery(text)) => {
                self.position += 1;
                self.register_path_query_trigger(text);
                let query = PathQuery::parse(text)?;
                Ok(Expr::PathQuery(query))
            }
            Some(Token::LeftParenthesis) => {
                self.position += 1;
                let inner = self.condition()?;
                self.expect(Token::RightParenthesis, "right parenthesis")?;
                Ok(inner)
            }
            _ => Err(self.syntax_error("an operand")),
        }
    }

    fn register_path_query_trigger(&mut self, query: &str) {
        match PATH_QUERY_FIELD.find(query) {
            Some(field) => {
                self.triggers.insert(field.as_str().to_string());
            }
            None => warn!(
                %query,
                "no attribute name found in path query; its rule will only \
                 re-evaluate on a forced refresh"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ast::{and, attribute, binary, not, number, or};

    fn triggers(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn return_an_error_on_empty_input() {
        assert!(parse("").is_err());
    }

    #[test]
    fn return_an_error_on_invalid_input() {
        assert!(parse(")(invalid-").is_err());
    }

    #[test]
    fn can_parse_a_bare_attribute() {
        let parsed = parse("tor.is_exit").unwrap();

        assert_eq!(attribute!("tor.is_exit"), parsed.ast);
        assert_eq!(triggers(&["tor.is_exit"]), parsed.triggers);
    }

    #[test]
    fn can_parse_a_comparison() {
        let parsed = parse("rep > 0.5").unwrap();

        assert_eq!(
            binary!(
                BinaryOperator::GreaterThan,
                attribute!("rep"),
                number!(5, 1)
            ),
            parsed.ast
        );
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let parsed = parse("a and b or c").unwrap();

        assert_eq!(
            or!(and!(attribute!("a"), attribute!("b")), attribute!("c")),
            parsed.ast
        );
    }

    #[test]
    fn chained_logical_operators_fold_to_the_right() {
        let parsed = parse("a or b or c").unwrap();

        assert_eq!(
            or!(attribute!("a"), or!(attribute!("b"), attribute!("c"))),
            parsed.ast
        );
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let parsed = parse("1 + 2 * 3").unwrap();

        assert_eq!(
            binary!(
                BinaryOperator::Add,
                number!(1, 0),
                binary!(BinaryOperator::Multiply, number!(2, 0), number!(3, 0))
            ),
            parsed.ast
        );
        assert_eq!(Value::from(7), parsed.ast.eval(&Value::Null));
    }

    #[test]
    fn unary_minus_binds_tighter_than_multiplication() {
        let parsed = parse("-2 * 3").unwrap();

        assert_eq!(
            binary!(
                BinaryOperator::Multiply,
                Expr::unary_minus(number!(2, 0)),
                number!(3, 0)
            ),
            parsed.ast
        );
        assert_eq!(Value::from(-6), parsed.ast.eval(&Value::Null));
    }

    #[test]
    fn subtraction_of_a_negated_operand_parses() {
        let parsed = parse("3 - -2").unwrap();

        assert_eq!(Value::from(5), parsed.ast.eval(&Value::Null));
    }

    #[test]
    fn a_leading_not_negates_the_whole_condition_part() {
        let parsed = parse("not a == 1").unwrap();

        assert_eq!(
            not!(binary!(
                BinaryOperator::Equal,
                attribute!("a"),
                number!(1, 0)
            )),
            parsed.ast
        );
    }

    #[test]
    fn can_parse_a_membership_test() {
        let parsed = parse("'openresolver' in events.types").unwrap();

        assert_eq!(
            Expr::membership(
                Expr::string("openresolver"),
                attribute!("events.types"),
                false
            ),
            parsed.ast
        );
        assert_eq!(triggers(&["events.types"]), parsed.triggers);
    }

    #[test]
    fn can_parse_a_negated_membership_test() {
        let parsed = parse("'openresolver' not in events.types").unwrap();

        assert_eq!(
            Expr::membership(
                Expr::string("openresolver"),
                attribute!("events.types"),
                true
            ),
            parsed.ast
        );
    }

    #[test]
    fn return_an_error_when_not_is_not_followed_by_in() {
        let error = parse("a not == 1").unwrap_err();

        assert_eq!(
            ParseError::Syntax {
                expected: "IN keyword",
                found: TokenKind::Equal,
            },
            error
        );
    }

    #[test]
    fn can_parse_parenthesized_conditions() {
        let parsed = parse("(a or b) and c").unwrap();

        assert_eq!(
            and!(or!(attribute!("a"), attribute!("b")), attribute!("c")),
            parsed.ast
        );
    }

    #[test]
    fn return_an_error_on_a_missing_closing_parenthesis() {
        let error = parse("(a or b").unwrap_err();

        assert_eq!(
            ParseError::Syntax {
                expected: "right parenthesis",
                found: TokenKind::EndOfInput,
            },
            error
        );
    }

    #[test]
    fn return_an_error_on_empty_parenthesis() {
        let error = parse("()").unwrap_err();

        assert_eq!(
            ParseError::Syntax {
                expected: "an operand",
                found: TokenKind::RightParenthesis,
            },
            error
        );
    }

    #[test]
    fn return_an_error_on_a_dangling_operator() {
        let error = parse("rep ==").unwrap_err();

        assert_eq!(
            ParseError::Syntax {
                expected: "an operand",
                found: TokenKind::EndOfInput,
            },
            error
        );
    }

    #[test]
    fn return_an_error_on_trailing_tokens() {
        let error = parse("rep 1").unwrap_err();

        assert_eq!(
            ParseError::Syntax {
                expected: "end of input",
                found: TokenKind::Number,
            },
            error
        );
    }

    #[test]
    fn collects_the_attributes_referenced_by_the_condition() {
        let parsed = parse("geo.ctry == 'US' and rep > 0.5").unwrap();

        assert_eq!(triggers(&["geo.ctry", "rep"]), parsed.triggers);
    }

    #[test]
    fn template_placeholders_do_not_register_triggers() {
        let parsed = parse("'country is {geo.ctry}' == label").unwrap();

        assert_eq!(triggers(&["label"]), parsed.triggers);
    }

    #[test]
    fn a_path_query_registers_its_top_level_field() {
        let parsed = parse("`$.dns.names[*]` != 0").unwrap();

        assert_eq!(triggers(&["dns"]), parsed.triggers);
    }

    #[test]
    fn a_path_query_without_a_field_registers_no_trigger() {
        let parsed = parse("`$[*]` != 0").unwrap();

        assert!(parsed.triggers.is_empty());
    }

    #[test]
    fn return_an_error_on_a_malformed_path_query() {
        let error = parse("`$.dns.` != 0").unwrap_err();

        assert!(matches!(error, ParseError::PathQuery(_)));
    }

    #[test]
    fn lexical_errors_carry_their_position() {
        let error = parse("rep ? 1").unwrap_err();

        assert!(matches!(error, ParseError::Lexical { position: 4, .. }));
    }

    #[test]
    fn can_parse_an_info_template() {
        let parsed = parse_info("scanning host ({events.count} flows)").unwrap();

        assert!(matches!(parsed.ast, Expr::Template(_)));
        assert!(parsed.triggers.is_empty());
    }

    #[test]
    fn an_info_without_placeholders_is_a_literal() {
        let parsed = parse_info("static annotation").unwrap();

        assert_eq!(Expr::Literal(Value::from("static annotation")), parsed.ast);
    }

    #[test]
    fn return_an_error_on_an_info_with_a_double_quote() {
        assert!(parse_info("an \"embedded\" quote").is_err());
    }

    #[test]
    fn a_complex_condition_parses_and_evaluates() {
        let record: Value = serde_json::from_value(serde_json::json!({
            "events": { "total": 10, "types": ["scan", "bruteforce"] },
            "rep": 0.8,
            "geo": { "ctry": "US" },
        }))
        .unwrap();
        let parsed =
            parse("(rep > 0.5 or 'scan' in events.types) and not geo.ctry == 'CZ'").unwrap();

        assert_eq!(Value::Boolean(true), parsed.ast.eval(&record));
        assert_eq!(
            triggers(&["rep", "events.types", "geo.ctry"]),
            parsed.triggers
        );
    }
}

#[cfg(test)]
mod robustness {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        // Arbitrary input must either parse or return an error; the
        // compiler front end never panics.
        #[test]
        fn parse_never_panics(input in ".{0,64}") {
            let _ = parse(&input);
        }

        #[test]
        fn parse_info_never_panics(input in "[^\"]{0,64}") {
            let _ = parse_info(&input);
        }

        #[test]
        fn evaluation_of_parsed_conditions_never_panics(
            left in "[a-z]{1,8}(\\.[a-z]{1,8})?",
            right in 0u32..1000,
        ) {
            let condition = format!("{left} > {right} and {left} + 1 != {right}");
            if let Ok(parsed) = parse(&condition) {
                let record: Value = serde_json::from_value(
                    serde_json::json!({ "rep": 0.5, "geo": { "ctry": "US" } })
                ).unwrap();
                let _ = parsed.ast.eval(&record);
            }
        }
    }
}
