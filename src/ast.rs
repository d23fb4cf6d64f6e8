//! This module defines the runtime value model shared by the reader and the
//! evaluator. [`Value`] is a closed set of variants: self-evaluating literals,
//! identifiers, lists (which double as program syntax and runtime data), and the
//! three kinds of callable - closures, macros and builtins. Rendering and
//! structural equality live here too; the evaluator and the `=` primitive rely
//! on them. Helper functions [`val`], [`sym`] and [`nil`] keep AST construction
//! in tests short.

use std::rc::Rc;

use crate::builtinops::BuiltinOp;
use crate::evaluator::Environment;

/// Parameters, body and captured scope shared by closures and macros.
///
/// `env` is the environment the `fn`/`macro` form was evaluated in. It is
/// captured by reference and never re-parented.
pub struct Lambda {
    pub(crate) env: Environment,
    pub(crate) params: Vec<String>,
    pub(crate) body: Vec<Value>,
}

impl Lambda {
    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn body(&self) -> &[Value] {
        &self.body
    }
}

/// A function created by `fn`. Arguments are evaluated at the call site.
pub struct Closure(pub(crate) Lambda);

/// A macro created by `macro`. Arguments are bound unevaluated and the
/// resulting form is evaluated again in the caller's environment.
pub struct Macro(pub(crate) Lambda);

/// Core runtime value
#[derive(Clone)]
pub enum Value {
    /// Double-precision numbers (the only numeric type)
    Number(f64),
    /// String literals
    String(String),
    /// Boolean values
    Bool(bool),
    /// The absence of a value; falsy alongside `false`
    Nil,
    /// Lookup keys; never a final value once evaluated
    Identifier(String),
    /// Ordered sequence of values, shared on clone
    List(Rc<[Value]>),
    /// User function (captures its defining environment)
    Closure(Rc<Closure>),
    /// User macro (captures its defining environment)
    Macro(Rc<Macro>),
    /// Host-implemented special form or primitive
    Builtin(&'static BuiltinOp),
}

impl Value {
    /// Build a list value from any sequence of values
    pub fn list(items: impl Into<Rc<[Value]>>) -> Value {
        Value::List(items.into())
    }

    /// Only `false` and `nil` are falsy; `0`, `""` and `()` are all truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Bool(false) | Value::Nil)
    }

    /// Short name of the variant, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Bool(_) => "boolean",
            Value::Nil => "nil",
            Value::Identifier(_) => "identifier",
            Value::List(_) => "list",
            Value::Closure(_) => "function",
            Value::Macro(_) => "macro",
            Value::Builtin(_) => "builtin",
        }
    }
}

/// One pending piece of output while rendering nested lists
enum Render<'a> {
    Value(&'a Value),
    Text(&'static str),
}

impl Value {
    /// Render with an explicit work stack; nesting depth never reaches the native stack
    fn render(&self, f: &mut std::fmt::Formatter<'_>, debug: bool) -> std::fmt::Result {
        let (open, separator) = if debug { ("List(", ", ") } else { ("(", " ") };
        let mut pending = vec![Render::Value(self)];

        while let Some(next) = pending.pop() {
            let value = match next {
                Render::Text(text) => {
                    f.write_str(text)?;
                    continue;
                }
                Render::Value(value) => value,
            };
            match (value, debug) {
                (Value::List(elements), _) => {
                    f.write_str(open)?;
                    pending.push(Render::Text(")"));
                    for (i, elem) in elements.iter().enumerate().rev() {
                        pending.push(Render::Value(elem));
                        if i > 0 {
                            pending.push(Render::Text(separator));
                        }
                    }
                }
                (Value::Number(n), false) => write!(f, "{n}")?,
                (Value::Number(n), true) => write!(f, "Number({n})")?,
                (Value::String(s), false) => {
                    write!(f, "\"")?;
                    for ch in s.chars() {
                        match ch {
                            '"' => write!(f, "\\\"")?,
                            '\\' => write!(f, "\\\\")?,
                            '\n' => write!(f, "\\n")?,
                            '\t' => write!(f, "\\t")?,
                            '\r' => write!(f, "\\r")?,
                            c => write!(f, "{c}")?,
                        }
                    }
                    write!(f, "\"")?;
                }
                (Value::String(s), true) => write!(f, "String(\"{s}\")")?,
                (Value::Bool(b), false) => write!(f, "{b}")?,
                (Value::Bool(b), true) => write!(f, "Bool({b})")?,
                (Value::Nil, false) => write!(f, "nil")?,
                (Value::Nil, true) => write!(f, "Nil")?,
                (Value::Identifier(s), false) => write!(f, "{s}")?,
                (Value::Identifier(s), true) => write!(f, "Identifier({s})")?,
                (Value::Closure(_), false) => write!(f, "#<fn>")?,
                // Captured environments are omitted: they may contain the value itself
                (Value::Closure(c), true) => {
                    write!(f, "Closure(params={:?}, body={:?})", c.0.params, c.0.body)?;
                }
                (Value::Macro(_), false) => write!(f, "#<macro>")?,
                (Value::Macro(m), true) => {
                    write!(f, "Macro(params={:?}, body={:?})", m.0.params, m.0.body)?;
                }
                (Value::Builtin(op), false) => write!(f, "#<builtin:{}>", op.id)?,
                (Value::Builtin(op), true) => write!(f, "Builtin({})", op.id)?,
            }
        }
        Ok(())
    }

    /// Equality of everything but the elements of two lists
    fn shallow_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Nil, Value::Nil) => true,
            (Value::Identifier(a), Value::Identifier(b)) => a == b,
            (Value::List(a), Value::List(b)) => a.len() == b.len(),
            // Callables have no structure worth comparing; identity decides
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Macro(a), Value::Macro(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a.id == b.id,
            _ => false,
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.render(f, true)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.render(f, false)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        let mut pending = vec![(self, other)];
        while let Some((a, b)) = pending.pop() {
            if !a.shallow_eq(b) {
                return false;
            }
            if let (Value::List(a), Value::List(b)) = (a, b) {
                pending.extend(a.iter().zip(b.iter()));
            }
        }
        true
    }
}

/// Nested lists are torn down with an explicit work stack: native stack use
/// stays constant however deep the nesting.
impl Drop for Value {
    fn drop(&mut self) {
        let Value::List(items) = self else {
            return;
        };
        let mut pending = Vec::new();
        take_nested_lists(items, &mut pending);
        while let Some(mut value) = pending.pop() {
            if let Value::List(items) = &mut value {
                take_nested_lists(items, &mut pending);
            }
            // `value` no longer owns any nested list, so dropping it is shallow
        }
    }
}

/// Move the nested lists out of a list nobody else references
fn take_nested_lists(items: &mut Rc<[Value]>, pending: &mut Vec<Value>) {
    let Some(items) = Rc::get_mut(items) else {
        return;
    };
    for item in items.iter_mut() {
        if matches!(item, Value::List(_)) {
            pending.push(std::mem::replace(item, Value::Nil));
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Number(f64::from(n))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::List(arr.into_iter().map(Into::into).collect())
    }
}

/// Helper for creating identifiers in mixed lists
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Identifier(name.as_ref().to_owned())
}

/// Helper for creating Values from anything convertible
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper for creating the empty list
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn empty_list() -> Value {
    Value::list(Vec::<Value>::new())
}
