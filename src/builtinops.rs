//! Built-in operations registry.
//!
//! Every name the global environment is seeded with lives in one static table
//! of [`BuiltinOp`]s. An entry pairs the name with its arity and an
//! implementation of one of three kinds:
//!
//! - **Functions** receive their arguments already evaluated (`+`, `cons`, `=`, `not`, ...)
//! - **Output functions** are functions that also write to the session's output sink (`print`, `println`)
//! - **Special forms** receive the unevaluated argument forms and the caller's
//!   environment, and decide themselves what to evaluate (`def`, `fn`, `macro`, `if`, `quote`)
//!
//! Arity is validated against the raw argument count before anything is
//! evaluated, and functions check every argument's type before producing a
//! result, so a failing call has no side effects of its own.
//!
//! ```text
//! (+)            ; 0
//! (* 7)          ; 7
//! (- 10 3 2)     ; 5
//! (/ 1 0)        ; inf
//! (first (list)) ; nil
//! (rest (list))  ; ()
//! ```

use crate::Error;
use crate::ast::Value;
use crate::evaluator::{
    Applicable, Environment, Step, eval_args, eval_define, eval_fn, eval_if, eval_macro,
    eval_quote,
};
use std::fmt;
use std::io::{self, Write};
use std::rc::Rc;

/// Number of arguments an operation accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    /// Inclusive bounds
    Range(usize, usize),
    Any,
}

impl Arity {
    pub fn accepts(&self, got: usize) -> bool {
        match *self {
            Arity::Exact(n) => got == n,
            Arity::AtLeast(n) => got >= n,
            Arity::Range(min, max) => (min..=max).contains(&got),
            Arity::Any => true,
        }
    }

    /// Check `got` arguments against this arity, naming `form` on failure
    pub fn validate(&self, form: &str, got: usize) -> Result<(), Error> {
        if self.accepts(got) {
            Ok(())
        } else {
            Err(Error::ArityMismatch {
                form: form.to_owned(),
                expected: *self,
                got,
            })
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "exactly {n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Range(min, max) => write!(f, "{min} to {max}"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

/// Represents the implementation of a built-in operation
#[derive(Clone, Copy)]
pub(crate) enum OpKind {
    /// Takes evaluated arguments and returns a value
    Function(fn(Vec<Value>) -> Result<Value, Error>),
    /// Takes evaluated arguments and writes them to the output sink; returns `nil`
    Output(fn(&[Value], &mut dyn Write) -> io::Result<()>),
    /// Takes unevaluated arguments, the caller's environment and the current
    /// evaluation depth; may hand a tail expression back to the trampoline
    SpecialForm(fn(&[Value], &Environment, usize) -> Result<Step, Error>),
}

impl fmt::Debug for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Function(_) => write!(f, "Function(<fn>)"),
            OpKind::Output(_) => write!(f, "Output(<fn>)"),
            OpKind::SpecialForm(_) => write!(f, "SpecialForm(<fn>)"),
        }
    }
}

/// Definition of a built-in operation
#[derive(Debug)]
pub struct BuiltinOp {
    /// The name this operation is bound to in the global environment
    pub id: &'static str,
    /// Accepted number of (unevaluated) arguments
    pub arity: Arity,
    pub(crate) kind: OpKind,
}

impl BuiltinOp {
    /// Check if this operation controls the evaluation of its own arguments
    pub fn is_special_form(&self) -> bool {
        matches!(self.kind, OpKind::SpecialForm(_))
    }
}

impl Applicable for BuiltinOp {
    fn apply(&self, caller_env: &Environment, args: &[Value], depth: usize) -> Result<Step, Error> {
        self.arity.validate(self.id, args.len())?;
        match self.kind {
            OpKind::SpecialForm(form) => form(args, caller_env, depth),
            OpKind::Function(func) => {
                let values = eval_args(args, caller_env, depth)?;
                func(values).map(Step::Done)
            }
            OpKind::Output(write) => {
                let values = eval_args(args, caller_env, depth)?;
                let mut out = caller_env.output().borrow_mut();
                write(&values, &mut *out)?;
                out.flush()?;
                Ok(Step::Done(Value::Nil))
            }
        }
    }
}

//
// Argument helpers
//

fn expect_number(form: &str, value: Value) -> Result<f64, Error> {
    match value {
        Value::Number(n) => Ok(n),
        other => Err(Error::invalid_argument(
            form,
            format!("expected number, got {}: {other}", other.type_name()),
        )),
    }
}

fn expect_list(form: &str, value: Value) -> Result<Rc<[Value]>, Error> {
    match &value {
        Value::List(items) => Ok(Rc::clone(items)),
        other => Err(Error::invalid_argument(
            form,
            format!("expected list, got {}: {other}", other.type_name()),
        )),
    }
}

fn numbers(form: &str, args: Vec<Value>) -> Result<Vec<f64>, Error> {
    args.into_iter().map(|arg| expect_number(form, arg)).collect()
}

/// Destructure an argument vector whose length the registry already checked
fn exactly<const N: usize>(form: &str, args: Vec<Value>) -> Result<[Value; N], Error> {
    let got = args.len();
    <[Value; N]>::try_from(args).map_err(|_| Error::ArityMismatch {
        form: form.to_owned(),
        expected: Arity::Exact(N),
        got,
    })
}

/// Fold `op` over the operands, seeded with the first one
fn fold_from_first(form: &str, args: Vec<Value>, op: fn(f64, f64) -> f64) -> Result<Value, Error> {
    let nums = numbers(form, args)?;
    let Some((&first, rest)) = nums.split_first() else {
        return Err(Error::ArityMismatch {
            form: form.to_owned(),
            expected: Arity::AtLeast(1),
            got: 0,
        });
    };
    Ok(Value::Number(rest.iter().fold(first, |acc, &n| op(acc, n))))
}

//
// Builtin Function Implementations
//

fn builtin_add(args: Vec<Value>) -> Result<Value, Error> {
    let nums = numbers("+", args)?;
    Ok(Value::Number(nums.into_iter().fold(0.0, |acc, n| acc + n)))
}

fn builtin_sub(args: Vec<Value>) -> Result<Value, Error> {
    fold_from_first("-", args, |a, b| a - b)
}

fn builtin_mul(args: Vec<Value>) -> Result<Value, Error> {
    let nums = numbers("*", args)?;
    match nums.as_slice() {
        [single] => Ok(Value::Number(*single)),
        _ => Ok(Value::Number(nums.into_iter().fold(1.0, |acc, n| acc * n))),
    }
}

// Division by zero yields inf/NaN rather than an error
fn builtin_div(args: Vec<Value>) -> Result<Value, Error> {
    fold_from_first("/", args, |a, b| a / b)
}

fn builtin_equal(args: Vec<Value>) -> Result<Value, Error> {
    Ok(Value::Bool(args.windows(2).all(|pair| pair[0] == pair[1])))
}

fn builtin_not(args: Vec<Value>) -> Result<Value, Error> {
    let [value] = exactly("not", args)?;
    Ok(Value::Bool(!value.is_truthy()))
}

fn builtin_cons(args: Vec<Value>) -> Result<Value, Error> {
    let [element, list] = exactly("cons", args)?;
    let tail = expect_list("cons", list)?;
    let mut items = Vec::with_capacity(tail.len() + 1);
    items.push(element);
    items.extend(tail.iter().cloned());
    Ok(Value::list(items))
}

fn builtin_first(args: Vec<Value>) -> Result<Value, Error> {
    let [list] = exactly("first", args)?;
    let items = expect_list("first", list)?;
    Ok(items.first().cloned().unwrap_or(Value::Nil))
}

fn builtin_rest(args: Vec<Value>) -> Result<Value, Error> {
    let [list] = exactly("rest", args)?;
    let items = expect_list("rest", list)?;
    match items.split_first() {
        Some((_, rest)) => Ok(Value::list(rest)),
        None => Ok(Value::List(items)),
    }
}

fn builtin_empty(args: Vec<Value>) -> Result<Value, Error> {
    let [list] = exactly("empty?", args)?;
    let items = expect_list("empty?", list)?;
    Ok(Value::Bool(items.is_empty()))
}

fn builtin_list(args: Vec<Value>) -> Result<Value, Error> {
    Ok(Value::list(args))
}

fn write_joined(args: &[Value], out: &mut dyn Write) -> io::Result<()> {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            write!(out, " ")?;
        }
        write!(out, "{arg}")?;
    }
    Ok(())
}

fn builtin_print(args: &[Value], out: &mut dyn Write) -> io::Result<()> {
    write_joined(args, out)
}

fn builtin_println(args: &[Value], out: &mut dyn Write) -> io::Result<()> {
    write_joined(args, out)?;
    writeln!(out)
}

/// Global registry of all built-in operations.
static BUILTIN_OPS: &[BuiltinOp] = &[
    // Special forms
    BuiltinOp {
        id: "def",
        arity: Arity::Exact(2),
        kind: OpKind::SpecialForm(eval_define),
    },
    BuiltinOp {
        id: "fn",
        // Shape errors are reported as MalformedDefinition by the form itself
        arity: Arity::Any,
        kind: OpKind::SpecialForm(eval_fn),
    },
    BuiltinOp {
        id: "macro",
        arity: Arity::Any,
        kind: OpKind::SpecialForm(eval_macro),
    },
    BuiltinOp {
        id: "if",
        arity: Arity::Range(2, 3),
        kind: OpKind::SpecialForm(eval_if),
    },
    BuiltinOp {
        id: "quote",
        arity: Arity::Exact(1),
        kind: OpKind::SpecialForm(eval_quote),
    },
    // Equality and negation
    BuiltinOp {
        id: "=",
        arity: Arity::AtLeast(2),
        kind: OpKind::Function(builtin_equal),
    },
    BuiltinOp {
        id: "not",
        arity: Arity::Exact(1),
        kind: OpKind::Function(builtin_not),
    },
    // Arithmetic
    BuiltinOp {
        id: "+",
        arity: Arity::Any,
        kind: OpKind::Function(builtin_add),
    },
    BuiltinOp {
        id: "-",
        arity: Arity::AtLeast(1),
        kind: OpKind::Function(builtin_sub),
    },
    BuiltinOp {
        id: "*",
        arity: Arity::Any,
        kind: OpKind::Function(builtin_mul),
    },
    BuiltinOp {
        id: "/",
        arity: Arity::AtLeast(1),
        kind: OpKind::Function(builtin_div),
    },
    // Lists
    BuiltinOp {
        id: "cons",
        arity: Arity::Exact(2),
        kind: OpKind::Function(builtin_cons),
    },
    BuiltinOp {
        id: "first",
        arity: Arity::Exact(1),
        kind: OpKind::Function(builtin_first),
    },
    BuiltinOp {
        id: "rest",
        arity: Arity::Exact(1),
        kind: OpKind::Function(builtin_rest),
    },
    BuiltinOp {
        id: "empty?",
        arity: Arity::Exact(1),
        kind: OpKind::Function(builtin_empty),
    },
    BuiltinOp {
        id: "list",
        arity: Arity::Any,
        kind: OpKind::Function(builtin_list),
    },
    // Output
    BuiltinOp {
        id: "print",
        arity: Arity::Any,
        kind: OpKind::Output(builtin_print),
    },
    BuiltinOp {
        id: "println",
        arity: Arity::Any,
        kind: OpKind::Output(builtin_println),
    },
];

/// Get all builtin operations
pub fn builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS
}

/// Find a builtin operation by the name it is bound to
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn find_builtin(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_OPS.iter().find(|op| op.id == id)
}
