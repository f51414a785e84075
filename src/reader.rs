use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, multispace0, multispace1, not_line_ending},
    combinator::{cut, value},
    error::ErrorKind,
    multi::{many0, many0_count},
    sequence::{preceded, terminated},
};

use crate::ast::{Ast, NumberType};
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Reader options
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParseConfig {
    /// Skip `;` line comments between tokens
    pub handle_comments: bool,
}

impl Default for ParseConfig {
    fn default() -> Self {
        ParseConfig {
            handle_comments: true,
        }
    }
}

fn is_atom_char(c: char) -> bool {
    !c.is_whitespace() && c != '(' && c != ')' && c != ';'
}

/// A token is numeric when it starts with a digit, optionally after a sign
/// and/or a decimal point. Everything else is a symbol, including `-`, `+`
/// and names such as `inf` that `f64::from_str` would otherwise accept.
fn looks_numeric(token: &str) -> bool {
    let rest = token.strip_prefix(['+', '-']).unwrap_or(token);
    let rest = rest.strip_prefix('.').unwrap_or(rest);
    rest.starts_with(|c: char| c.is_ascii_digit())
}

/// The offending token at the start of `input`, for error messages
fn token_at(input: &str) -> String {
    match input.chars().next() {
        Some(c @ ('(' | ')' | ';')) => c.to_string(),
        Some(_) => input.chars().take_while(|c| is_atom_char(*c)).collect(),
        None => String::new(),
    }
}

/// Skip whitespace and, if enabled, comments
fn skip_trivia(input: &str, config: ParseConfig) -> IResult<&str, ()> {
    if config.handle_comments {
        value(
            (),
            many0_count(alt((multispace1, preceded(char(';'), not_line_ending)))),
        )
        .parse(input)
    } else {
        value((), multispace0).parse(input)
    }
}

/// Parse a number or a symbol
fn parse_atom(input: &str) -> IResult<&str, Ast> {
    let (remaining, token) = take_while1(is_atom_char).parse(input)?;

    if !looks_numeric(token) {
        return Ok((remaining, Ast::Symbol(token.to_owned())));
    }

    match token.parse::<NumberType>() {
        Ok(n) if n.is_finite() => Ok((remaining, Ast::Number(n))),
        // Committed: a token that starts like a number must be one
        _ => Err(nom::Err::Failure(nom::error::Error::new(
            input,
            ErrorKind::Float,
        ))),
    }
}

/// Parse a parenthesized list. Once the opening parenthesis is consumed the
/// parser is committed, so an unclosed list reports the missing `)` rather
/// than backtracking into the atom parser.
fn parse_list(input: &str, config: ParseConfig, depth: usize) -> IResult<&str, Ast> {
    let (input, _) = char('(').parse(input)?;

    let (input, elements) = cut(terminated(
        many0(preceded(
            |input| skip_trivia(input, config),
            |input| parse_sexpr(input, config, depth + 1),
        )),
        preceded(|input| skip_trivia(input, config), char(')')),
    ))
    .parse(input)?;

    Ok((input, Ast::List(elements)))
}

/// Parse an S-expression
fn parse_sexpr(input: &str, config: ParseConfig, depth: usize) -> IResult<&str, Ast> {
    if depth >= MAX_PARSE_DEPTH {
        return Err(nom::Err::Failure(nom::error::Error::new(
            input,
            ErrorKind::TooLarge,
        )));
    }
    alt((|input| parse_list(input, config, depth), parse_atom)).parse(input)
}

/// Convert nom parsing errors to user-friendly messages
fn describe_failure(input: &str, error: nom::Err<nom::error::Error<&str>>) -> ParseError {
    let e = match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => e,
        nom::Err::Incomplete(_) => {
            return ParseError::from_message(ParseErrorKind::Incomplete, "Incomplete input");
        }
    };

    let position = input.len().saturating_sub(e.input.len());
    let found = token_at(e.input);
    let (kind, message) = match e.code {
        ErrorKind::TooLarge => (
            ParseErrorKind::TooDeeplyNested,
            format!("Expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
        ),
        ErrorKind::Float => (
            ParseErrorKind::InvalidNumber,
            format!("Invalid number \"{found}\""),
        ),
        ErrorKind::Char if e.input.is_empty() => (
            ParseErrorKind::Incomplete,
            "Expected \")\" at the end of the input".to_owned(),
        ),
        _ if e.input.is_empty() => (
            ParseErrorKind::Incomplete,
            "Unexpected end of input".to_owned(),
        ),
        _ => (
            ParseErrorKind::InvalidSyntax,
            format!("Unexpected \"{found}\""),
        ),
    };

    let found = (!found.is_empty()).then_some(found);
    ParseError::with_context(kind, message, input, position, found)
}

/// Parse a complete S-expression from input using the default configuration.
pub fn parse(input: &str) -> Result<Ast, Error> {
    parse_with_config(input, ParseConfig::default())
}

/// Parse exactly one complete S-expression; anything after it is an error.
pub fn parse_with_config(input: &str, config: ParseConfig) -> Result<Ast, Error> {
    let (rest, ast) = preceded(
        |input| skip_trivia(input, config),
        |input| parse_sexpr(input, config, 0),
    )
    .parse(input)
    .map_err(|e| Error::SyntaxError(describe_failure(input, e)))?;

    let rest = skip_trivia(rest, config).map_or(rest, |(rest, ())| rest);
    if rest.is_empty() {
        return Ok(ast);
    }

    let found = token_at(rest);
    let message = match &ast {
        Ast::List(_) => format!("Unexpected \"{found}\" after \")\""),
        atom => format!("Unexpected \"{found}\" after \"{atom}\""),
    };
    Err(Error::SyntaxError(ParseError::with_context(
        ParseErrorKind::TrailingContent,
        message,
        input,
        input.len() - rest.len(),
        Some(found),
    )))
}
