use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, multispace1, not_line_ending},
    combinator::value,
    error::ErrorKind,
    multi::many0,
    sequence::{pair, preceded},
};

use crate::ast::Value;
use crate::evaluator::{Environment, evaluate_program};
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Reader configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParseConfig {
    /// Treat `;` as the start of a comment running to the end of the line
    pub handle_comments: bool,
    /// Maximum nesting of lists and quotes
    pub max_depth: usize,
}

impl Default for ParseConfig {
    fn default() -> Self {
        ParseConfig {
            handle_comments: true,
            max_depth: MAX_PARSE_DEPTH,
        }
    }
}

/// Remaining native stack below which a nested expression moves to a new segment
const STACK_RED_ZONE: usize = 64 * 1024;
/// Size of each stack segment allocated for deeply nested input
const STACK_GROW_SIZE: usize = 1024 * 1024;

/// Characters that end an atom
fn is_delimiter(c: char, config: ParseConfig) -> bool {
    c.is_whitespace()
        || matches!(c, '(' | ')' | '"' | '\'')
        || (config.handle_comments && c == ';')
}

/// Skip whitespace and, if enabled, comments
fn skip_ws(input: &str, config: ParseConfig) -> IResult<&str, ()> {
    if config.handle_comments {
        value(
            (),
            many0(alt((
                value((), multispace1),
                value((), pair(char(';'), not_line_ending)),
            ))),
        )
        .parse(input)
    } else {
        value((), many0(multispace1)).parse(input)
    }
}

/// `-?digits(.digits*)?`
fn is_number_literal(token: &str) -> bool {
    let unsigned = token.strip_prefix('-').unwrap_or(token);
    let (integral, fraction) = match unsigned.split_once('.') {
        Some((integral, fraction)) => (integral, fraction),
        None => (unsigned, ""),
    };
    !integral.is_empty()
        && integral.chars().all(|c| c.is_ascii_digit())
        && fraction.chars().all(|c| c.is_ascii_digit())
}

/// Parse a bare word: number, boolean or identifier
fn parse_atom(input: &str, config: ParseConfig) -> IResult<&str, Value> {
    let (remaining, token) = take_while1(|c: char| !is_delimiter(c, config)).parse(input)?;

    let atom = match token {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ if is_number_literal(token) => match token.parse::<f64>() {
            Ok(n) => Value::Number(n),
            Err(_) => {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    input,
                    ErrorKind::Float,
                )));
            }
        },
        _ => Value::Identifier(token.to_owned()),
    };
    Ok((remaining, atom))
}

/// Parse a string literal
fn parse_string(input: &str) -> IResult<&str, Value> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut chars = String::new();

    loop {
        let mut char_iter = remaining.chars();
        match char_iter.next() {
            Some('"') => return Ok((char_iter.as_str(), Value::String(chars))),
            Some('\\') => {
                match char_iter.next() {
                    Some('n') => chars.push('\n'),
                    Some('t') => chars.push('\t'),
                    Some('r') => chars.push('\r'),
                    Some('\\') => chars.push('\\'),
                    Some('"') => chars.push('"'),
                    Some(_) => {
                        return Err(nom::Err::Failure(nom::error::Error::new(
                            remaining,
                            ErrorKind::Escaped,
                        )));
                    }
                    None => {
                        return Err(nom::Err::Failure(nom::error::Error::new(
                            char_iter.as_str(),
                            ErrorKind::Char,
                        )));
                    }
                }
                remaining = char_iter.as_str();
            }
            Some(ch) => {
                chars.push(ch);
                remaining = char_iter.as_str();
            }
            // Unterminated string
            None => {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    remaining,
                    ErrorKind::Char,
                )));
            }
        }
    }
}

/// Parse a parenthesized list
fn parse_list(input: &str, config: ParseConfig, depth: usize) -> IResult<&str, Value> {
    let (input, _) = char('(').parse(input)?;
    let (input, elements) = many0(preceded(
        |i| skip_ws(i, config),
        |i| parse_expr(i, config, depth + 1),
    ))
    .parse(input)?;
    let (input, _) = skip_ws(input, config)?;
    // A missing `)` is fatal: nothing else can follow an open list
    let (input, _) = match char::<&str, nom::error::Error<&str>>(')').parse(input) {
        Ok(result) => result,
        Err(nom::Err::Error(e)) => return Err(nom::Err::Failure(e)),
        Err(e) => return Err(e),
    };
    Ok((input, Value::list(elements)))
}

/// Parse quoted expression ('expr -> (quote expr))
fn parse_quote(input: &str, config: ParseConfig, depth: usize) -> IResult<&str, Value> {
    let (input, _) = char('\'').parse(input)?;
    let (input, expr) = match parse_expr(input, config, depth + 1) {
        Ok(result) => result,
        Err(nom::Err::Error(e)) => return Err(nom::Err::Failure(e)),
        Err(e) => return Err(e),
    };
    Ok((
        input,
        Value::list(vec![Value::Identifier("quote".to_owned()), expr]),
    ))
}

/// Parse a single expression
fn parse_expr(input: &str, config: ParseConfig, depth: usize) -> IResult<&str, Value> {
    if depth >= config.max_depth {
        return Err(nom::Err::Failure(nom::error::Error::new(
            input,
            ErrorKind::TooLarge,
        )));
    }
    stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
        alt((
            |i| parse_quote(i, config, depth),
            |i| parse_list(i, config, depth),
            parse_string,
            |i| parse_atom(i, config),
        ))
        .parse(input)
    })
}

/// Convert a nom error into a ParseError positioned within `source`
fn to_parse_error(source: &str, error: nom::Err<nom::error::Error<&str>>) -> ParseError {
    match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let position = source.len().saturating_sub(e.input.len());
            let char_position = source[..position].chars().count();
            let (kind, message) = match e.code {
                ErrorKind::TooLarge => (
                    ParseErrorKind::TooDeeplyNested,
                    "Expression too deeply nested".to_owned(),
                ),
                _ if e.input.is_empty() => (
                    ParseErrorKind::Incomplete,
                    "Unexpected end of input".to_owned(),
                ),
                ErrorKind::Escaped => (
                    ParseErrorKind::InvalidSyntax,
                    format!("Unknown escape sequence at position {char_position}"),
                ),
                _ => {
                    let near: String = e.input.chars().take(10).collect();
                    (
                        ParseErrorKind::InvalidSyntax,
                        format!("Invalid syntax near '{near}' at position {char_position}"),
                    )
                }
            };
            ParseError::with_context(kind, message, source, char_position)
        }
        nom::Err::Incomplete(_) => {
            ParseError::new(ParseErrorKind::Incomplete, "Incomplete input", None)
        }
    }
}

/// Parse every top-level form in `source`
pub fn parse_program(source: &str) -> Result<Vec<Value>, Error> {
    parse_program_with_config(source, ParseConfig::default())
}

/// Parse every top-level form in `source` with the given configuration
pub fn parse_program_with_config(source: &str, config: ParseConfig) -> Result<Vec<Value>, Error> {
    let mut forms = Vec::new();
    let mut input = source;
    loop {
        let (rest, _) = skip_ws(input, config).map_err(|e| to_parse_error(source, e))?;
        if rest.is_empty() {
            return Ok(forms);
        }
        let (rest, form) = parse_expr(rest, config, 0).map_err(|e| to_parse_error(source, e))?;
        forms.push(form);
        input = rest;
    }
}

/// Parse `source` and evaluate its forms in order against `env`.
///
/// A parse error rejects the whole source; evaluation errors are reported
/// per form.
pub fn eval_source(source: &str, env: &Environment) -> Result<Vec<Result<Value, Error>>, Error> {
    let forms = parse_program(source)?;
    Ok(evaluate_program(&forms, env))
}
