//! This module defines the Abstract Syntax Tree produced by the reader. An [`Ast`]
//! node is either a number, a symbol or a list of nodes; nothing else exists at the
//! syntax level. Nodes are never mutated after parsing. Ergonomic helper functions
//! such as [`num`], [`sym`] and [`list`] are provided for building trees in
//! code and tests, and `From` conversions cover Rust literals, arrays and vectors.

/// Type alias for number values in the language
pub(crate) type NumberType = f64;

/// Parsed program node
///
/// To build an AST, use the ergonomic helper functions:
/// - `num(42)` for numbers, `sym("name")` for symbols
/// - `list([sym("+"), num(1), num(2)])` for lists
#[derive(Debug, Clone, PartialEq)]
pub enum Ast {
    /// Numbers (floating point only)
    Number(NumberType),
    /// Symbols (identifiers and operator names)
    Symbol(String),
    /// Parenthesized sequences
    List(Vec<Ast>),
}

impl Ast {
    /// Symbol name, if this node is a symbol
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Ast::Symbol(name) => Some(name),
            _ => None,
        }
    }

    /// Number value, if this node is a number
    pub fn as_number(&self) -> Option<NumberType> {
        match self {
            Ast::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for Ast {
    fn from(s: &str) -> Self {
        Ast::Symbol(s.to_owned())
    }
}

impl From<String> for Ast {
    fn from(s: String) -> Self {
        Ast::Symbol(s)
    }
}

macro_rules! impl_from_number {
    ($num_type:ty) => {
        impl From<$num_type> for Ast {
            fn from(n: $num_type) -> Self {
                Ast::Number(n as NumberType)
            }
        }
    };
}

impl_from_number!(i32);
impl_from_number!(u32);
impl_from_number!(i64);
impl_from_number!(NumberType);

impl<T: Into<Ast>> From<Vec<T>> for Ast {
    fn from(v: Vec<T>) -> Self {
        Ast::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Ast>, const N: usize> From<[T; N]> for Ast {
    fn from(arr: [T; N]) -> Self {
        Ast::List(arr.into_iter().map(Into::into).collect())
    }
}

/// Helper function for creating symbols
pub fn sym<S: AsRef<str>>(name: S) -> Ast {
    Ast::Symbol(name.as_ref().to_owned())
}

/// Helper function for creating numbers from any numeric literal
pub fn num<T: Into<Ast>>(value: T) -> Ast {
    value.into()
}

/// Helper function for creating lists out of mixed nodes
pub fn list<I: IntoIterator<Item = Ast>>(elements: I) -> Ast {
    Ast::List(elements.into_iter().collect())
}

/// Helper function for creating empty lists (nil)
#[cfg(test)]
pub(crate) fn nil() -> Ast {
    Ast::List(vec![])
}

/// Render a number the way the reader accepts it back: integral values
/// print without a fractional part.
pub(crate) fn format_number(n: NumberType, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        write!(f, "{}", n as i64)
    } else {
        write!(f, "{n}")
    }
}

impl std::fmt::Display for Ast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ast::Number(n) => format_number(*n, f),
            Ast::Symbol(s) => write!(f, "{s}"),
            Ast::List(elements) => {
                write!(f, "(")?;
                for (i, elem) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{elem}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod helper_function_tests {
    use super::*;

    #[test]
    fn test_helper_functions_data_driven() {
        let test_cases = vec![
            (num(42), Ast::Number(42.0)),
            (num(-17), Ast::Number(-17.0)),
            (num(2.5), Ast::Number(2.5)),
            (sym("callByName"), Ast::Symbol("callByName".to_owned())),
            (sym(String::from("λ")), Ast::Symbol("λ".to_owned())),
            (nil(), Ast::List(vec![])),
            (
                num([1, 2, 3]),
                Ast::List(vec![Ast::Number(1.0), Ast::Number(2.0), Ast::Number(3.0)]),
            ),
            (
                list([sym("+"), num(1), num(2)]),
                Ast::List(vec![
                    Ast::Symbol("+".to_owned()),
                    Ast::Number(1.0),
                    Ast::Number(2.0),
                ]),
            ),
        ];

        for (i, (actual, expected)) in test_cases.iter().enumerate() {
            assert_eq!(actual, expected, "Test case {} failed", i + 1);
        }
    }

    #[test]
    fn test_display() {
        let cases = vec![
            (num(42), "42"),
            (num(-0.5), "-0.5"),
            (sym("unknownVariable"), "unknownVariable"),
            (nil(), "()"),
            (
                list([sym("function"), list([sym("x")]), list([sym("+"), sym("x"), num(1)])]),
                "(function (x) (+ x 1))",
            ),
        ];
        for (ast, expected) in cases {
            assert_eq!(ast.to_string(), expected);
        }
    }

    #[test]
    fn test_accessors() {
        assert_eq!(nil().as_symbol(), None);
        assert_eq!(sym("a").as_number(), None);
        assert_eq!(sym("a").as_symbol(), Some("a"));
        assert_eq!(num(3).as_number(), Some(3.0));
    }
}
