pub mod ast {
    macro_rules! attribute {
        ($path:expr) => {
            Expr::Attribute(crate::ast::AttributePath::new($path))
        };
    }

    macro_rules! number {
        ($num:expr, $scale:expr) => {
            Expr::Literal(crate::value::Value::Number(rust_decimal::Decimal::new(
                $num, $scale,
            )))
        };
    }

    macro_rules! binary {
        ($op:expr, $left:expr, $right:expr) => {
            Expr::binary($op, $left, $right)
        };
    }

    macro_rules! and {
        ($left:expr, $right:expr) => {
            Expr::binary(BinaryOperator::And, $left, $right)
        };
    }

    macro_rules! or {
        ($left:expr, $right:expr) => {
            Expr::binary(BinaryOperator::Or, $left, $right)
        };
    }

    macro_rules! not {
        ($value:expr) => {
            Expr::not($value)
        };
    }

    pub(crate) use and;
    pub(crate) use attribute;
    pub(crate) use binary;
    pub(crate) use not;
    pub(crate) use number;
    pub(crate) use or;
}
