use crate::Error;
use crate::MAX_EVAL_DEPTH;
use crate::ast::{Closure, Lambda, Macro, Value};
use crate::builtinops::{Arity, builtin_ops};
use std::cell::RefCell;
use std::rc::Rc;

mod environment;

pub use environment::{Environment, Output};

/// Result of one evaluation step.
///
/// A `TailCall` means "the real result is whatever `expr` evaluates to in
/// `env`". Only the trampoline in [`eval_with_depth`] consumes it; it never
/// escapes to user code.
pub(crate) enum Step {
    Done(Value),
    TailCall { env: Environment, expr: Value },
}

/// Uniform call interface shared by closures, macros and builtins.
///
/// `args` are the forms following the call head, *unevaluated*. Each
/// implementation decides whether and when to evaluate them.
pub(crate) trait Applicable {
    fn apply(&self, caller_env: &Environment, args: &[Value], depth: usize) -> Result<Step, Error>;
}

/// Create a global environment seeded with every special form and primitive.
/// `print` and `println` write to stdout.
pub fn new_global_environment() -> Environment {
    new_global_environment_with_output(Rc::new(RefCell::new(std::io::stdout())))
}

/// Create a global environment whose `print`/`println` output goes to `output`
pub fn new_global_environment_with_output(output: Output) -> Environment {
    let env = Environment::new(output);
    for op in builtin_ops() {
        env.define(op.id, Value::Builtin(op));
    }
    env.define("nil", Value::Nil);
    env
}

/// Evaluate an expression to its final value
pub fn eval(expr: &Value, env: &Environment) -> Result<Value, Error> {
    eval_with_depth(expr, env, 0)
}

/// Evaluate top-level forms in order against one shared environment.
///
/// Each form is an independent unit of failure: an error is recorded and
/// evaluation continues with the next form. `def`s from earlier forms are
/// visible to later ones.
pub fn evaluate_program(forms: &[Value], env: &Environment) -> Vec<Result<Value, Error>> {
    forms
        .iter()
        .map(|form| {
            let result = eval(form, env);
            if let Err(err) = &result {
                log::debug!("top-level form {form} failed: {err}");
            }
            result
        })
        .collect()
}

/// Remaining native stack below which a nested evaluation moves to a new segment
const STACK_RED_ZONE: usize = 128 * 1024;
/// Size of each stack segment allocated for deep non-tail recursion
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// Evaluate in a non-tail position: unroll tail calls until a final value
/// is produced. This loop is the trampoline; it keeps native stack depth
/// constant however many tail calls a computation makes.
pub(crate) fn eval_with_depth(expr: &Value, env: &Environment, depth: usize) -> Result<Value, Error> {
    if depth >= MAX_EVAL_DEPTH {
        return Err(Error::DepthLimitExceeded(MAX_EVAL_DEPTH));
    }
    stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || -> Result<Value, Error> {
        let mut step = eval_tail(expr, env, depth)?;
        loop {
            match step {
                Step::Done(value) => return Ok(value),
                Step::TailCall { env, expr } => {
                    log::trace!("tail call: {expr}");
                    step = eval_tail(&expr, &env, depth)?;
                }
            }
        }
    })
}

/// Evaluate in tail position: the result may be a pending tail call
fn eval_tail(expr: &Value, env: &Environment, depth: usize) -> Result<Step, Error> {
    match expr {
        Value::Number(_)
        | Value::String(_)
        | Value::Bool(_)
        | Value::Nil
        | Value::Closure(_)
        | Value::Macro(_)
        | Value::Builtin(_) => Ok(Step::Done(expr.clone())),

        Value::Identifier(name) => env
            .get(name)
            .map(Step::Done)
            .ok_or_else(|| Error::UnboundIdentifier(name.clone())),

        Value::List(elements) => match &elements[..] {
            [] => Ok(Step::Done(expr.clone())),
            [head, args @ ..] => {
                let callee = eval_with_depth(head, env, depth + 1)?;
                apply(&callee, env, args, depth)
            }
        },
    }
}

/// Apply an evaluated call head to the unevaluated argument forms
fn apply(callee: &Value, env: &Environment, args: &[Value], depth: usize) -> Result<Step, Error> {
    match callee {
        Value::Builtin(op) => op.apply(env, args, depth),
        Value::Closure(closure) => closure.apply(env, args, depth),
        Value::Macro(mac) => mac.apply(env, args, depth),
        Value::Number(_)
        | Value::String(_)
        | Value::Bool(_)
        | Value::Nil
        | Value::Identifier(_)
        | Value::List(_) => Err(Error::NotApplicable(callee.to_string())),
    }
}

/// Evaluate argument forms in the caller's environment, in order
pub(crate) fn eval_args(args: &[Value], env: &Environment, depth: usize) -> Result<Vec<Value>, Error> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(eval_with_depth(arg, env, depth + 1)?);
    }
    Ok(values)
}

impl Applicable for Closure {
    fn apply(&self, caller_env: &Environment, args: &[Value], depth: usize) -> Result<Step, Error> {
        let Lambda { env, params, body } = &self.0;
        if params.len() != args.len() {
            return Err(arity_mismatch("fn", params.len(), args.len()));
        }

        // Arguments are evaluated in the caller's scope, bound in a frame
        // parented at the defining scope
        let frame = Environment::with_parent(env);
        for (param, arg) in params.iter().zip(args) {
            let value = eval_with_depth(arg, caller_env, depth + 1)?;
            frame.define(param.clone(), value);
        }

        let Some((last, init)) = body.split_last() else {
            return Ok(Step::Done(Value::Nil));
        };
        for expr in init {
            eval_with_depth(expr, &frame, depth + 1)?;
        }
        Ok(Step::TailCall {
            env: frame,
            expr: last.clone(),
        })
    }
}

impl Applicable for Macro {
    fn apply(&self, caller_env: &Environment, args: &[Value], depth: usize) -> Result<Step, Error> {
        let Lambda { env, params, body } = &self.0;
        if params.len() != args.len() {
            return Err(arity_mismatch("macro", params.len(), args.len()));
        }

        let frame = Environment::with_parent(env);
        for (param, arg) in params.iter().zip(args) {
            frame.define(param.clone(), arg.clone());
        }

        let mut expansion = Value::Nil;
        for expr in body {
            expansion = eval_with_depth(expr, &frame, depth + 1)?;
        }
        log::trace!("macro expansion: {expansion}");

        // The expansion is resolved at the call site, not the definition site
        Ok(Step::TailCall {
            env: caller_env.clone(),
            expr: expansion,
        })
    }
}

fn arity_mismatch(form: &str, expected: usize, got: usize) -> Error {
    Error::ArityMismatch {
        form: form.to_owned(),
        expected: Arity::Exact(expected),
        got,
    }
}

/// Evaluate quote special form
pub(crate) fn eval_quote(args: &[Value], _env: &Environment, _depth: usize) -> Result<Step, Error> {
    match args {
        [expr] => Ok(Step::Done(expr.clone())),
        _ => Err(arity_mismatch("quote", 1, args.len())),
    }
}

/// Evaluate def special form: binds in the caller's own frame
pub(crate) fn eval_define(args: &[Value], env: &Environment, depth: usize) -> Result<Step, Error> {
    match args {
        [Value::Identifier(name), expr] => {
            let value = eval_with_depth(expr, env, depth + 1)?;
            log::debug!("def {name} = {value}");
            env.define(name.clone(), value.clone());
            Ok(Step::Done(value))
        }
        [other, _] => Err(Error::invalid_argument(
            "def",
            format!("expected identifier, got {}: {other}", other.type_name()),
        )),
        _ => Err(arity_mismatch("def", 2, args.len())),
    }
}

/// Evaluate if special form. The chosen branch is handed back as a tail call;
/// `if` never introduces a frame of its own.
pub(crate) fn eval_if(args: &[Value], env: &Environment, depth: usize) -> Result<Step, Error> {
    let (test, consequent, alternative) = match args {
        [test, consequent] => (test, consequent, None),
        [test, consequent, alternative] => (test, consequent, Some(alternative)),
        _ => {
            return Err(Error::ArityMismatch {
                form: "if".to_owned(),
                expected: Arity::Range(2, 3),
                got: args.len(),
            });
        }
    };

    let branch = if eval_with_depth(test, env, depth + 1)?.is_truthy() {
        consequent
    } else {
        match alternative {
            Some(alternative) => alternative,
            None => return Ok(Step::Done(Value::Nil)),
        }
    };
    Ok(Step::TailCall {
        env: env.clone(),
        expr: branch.clone(),
    })
}

/// Evaluate fn special form
pub(crate) fn eval_fn(args: &[Value], env: &Environment, _depth: usize) -> Result<Step, Error> {
    let lambda = decompose_lambda("fn", args, env)?;
    Ok(Step::Done(Value::Closure(Rc::new(Closure(lambda)))))
}

/// Evaluate macro special form
pub(crate) fn eval_macro(args: &[Value], env: &Environment, _depth: usize) -> Result<Step, Error> {
    let lambda = decompose_lambda("macro", args, env)?;
    Ok(Step::Done(Value::Macro(Rc::new(Macro(lambda)))))
}

/// Split `(params body...)` into a lambda capturing `env`. Nothing is evaluated.
fn decompose_lambda(form: &str, args: &[Value], env: &Environment) -> Result<Lambda, Error> {
    let [param_list, body @ ..] = args else {
        return Err(Error::malformed_definition(
            form,
            "expected a parameter list and a body",
        ));
    };
    if body.is_empty() {
        return Err(Error::malformed_definition(
            form,
            "body must contain at least one expression",
        ));
    }
    let Value::List(param_list) = param_list else {
        return Err(Error::malformed_definition(
            form,
            format!("parameters must be a list, got {}: {param_list}", param_list.type_name()),
        ));
    };

    // No variadic support: `&` is an ordinary parameter name here
    let params = param_list
        .iter()
        .map(|param| match param {
            Value::Identifier(name) => Ok(name.clone()),
            other => Err(Error::invalid_argument(
                form,
                format!("parameters must be identifiers, got {}: {other}", other.type_name()),
            )),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Lambda {
        env: env.clone(),
        params,
        body: body.to_vec(),
    })
}
