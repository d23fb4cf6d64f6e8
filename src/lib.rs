//! glisp - a small dynamically-typed Lisp
//!
//! Source text is read into a homogeneous tree of [`ast::Value`]s and evaluated
//! against a chain of lexical environments.
//!
//! ```text
//! (def make-adder (fn (x) (fn (y) (+ x y))))
//! (def add5 (make-adder 5))
//! (add5 3)                      ; 8
//! (if 0 "t" "f")                ; "t" - only false and nil are falsy
//! (def unless (macro (c body) (list 'if c nil body)))
//! ```
//!
//! ## Evaluation model
//!
//! - Numbers, strings, booleans, `nil` and the empty list evaluate to themselves
//! - Identifiers resolve through the environment chain
//! - A non-empty list evaluates its head and applies the result to the
//!   *unevaluated* remaining elements; each callable decides what to evaluate
//!
//! The last expression of a function body and the chosen branch of `if` are
//! handed back to a trampoline instead of being evaluated recursively, so tail
//! recursion (including mutual recursion) runs in constant native stack.
//!
//! Macros are non-hygienic: the macro body runs with its arguments bound
//! unevaluated, and the resulting form is evaluated again at the call site.
//!
//! ## Modules
//!
//! - `ast`: runtime values, rendering and structural equality
//! - `evaluator`: environments, the trampolined evaluator and special forms
//! - `builtinops`: arithmetic, list, equality and printing primitives
//! - `reader`: S-expression parsing from text

use std::fmt;

use crate::builtinops::Arity;

/// Maximum list/quote nesting accepted by the reader
pub const MAX_PARSE_DEPTH: usize = 128;

/// Maximum nesting of non-tail evaluations (arguments, `if` tests, macro bodies).
/// Tail calls are unrolled by the trampoline and never count toward this limit.
/// The evaluator grows its native stack on demand, so this bound is independent
/// of the thread's stack size.
pub const MAX_EVAL_DEPTH: usize = 10_000;

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (stray closing paren, bad escape)
    InvalidSyntax,
    /// Input ended before the expression was complete (unclosed parens, unterminated string)
    Incomplete,
    /// Expression nesting exceeded the configured parse depth
    TooDeeplyNested,
}

/// A structured error describing a reader failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred
    pub context: Option<String>,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, message: impl Into<String>, context: Option<String>) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context,
        }
    }

    /// Create a ParseError with context extracted from input at a given offset
    pub fn with_context(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
    ) -> Self {
        const MAX_CONTEXT: usize = 60;

        let context_start = error_offset.saturating_sub(20);
        let context_str: String = input
            .chars()
            .skip(context_start)
            .take(MAX_CONTEXT)
            .collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.chars().count() < input.chars().count() {
            display_context.push_str("[...]");
        }

        let display_context = display_context.replace('\n', "\\n").replace('\r', "");
        Self::new(kind, message, Some(display_context))
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParseError: {}", self.message)?;
        if let Some(context) = &self.context {
            write!(f, "\nContext: {context}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Parse(#[from] ParseError),
    #[error("Unbound identifier: {0}")]
    UnboundIdentifier(String),
    #[error("NotApplicable: {0} is not a function, macro or builtin")]
    NotApplicable(String),
    #[error("ArityMismatch: {form} expects {expected} arguments, got {got}")]
    ArityMismatch {
        form: String,
        expected: Arity,
        got: usize,
    },
    #[error("InvalidArgument: {form}: {reason}")]
    InvalidArgument { form: String, reason: String },
    #[error("MalformedDefinition: {form}: {reason}")]
    MalformedDefinition { form: String, reason: String },
    #[error("Evaluation depth limit exceeded (max: {0})")]
    DepthLimitExceeded(usize),
    #[error("Output error: {0}")]
    Output(String),
}

impl Error {
    pub(crate) fn invalid_argument(form: &str, reason: impl Into<String>) -> Self {
        Error::InvalidArgument {
            form: form.to_owned(),
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed_definition(form: &str, reason: impl Into<String>) -> Self {
        Error::MalformedDefinition {
            form: form.to_owned(),
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Output(err.to_string())
    }
}

pub mod ast;
pub mod builtinops;
pub mod evaluator;

#[cfg(feature = "reader")]
pub mod reader;

pub use ast::Value;
pub use evaluator::{
    Environment, eval, evaluate_program, new_global_environment,
    new_global_environment_with_output,
};

#[cfg(feature = "reader")]
pub use reader::{eval_source, parse_program};
