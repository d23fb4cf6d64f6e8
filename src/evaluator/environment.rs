use crate::ast::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;

/// Shared sink that `print` and `println` write to.
pub type Output = Rc<RefCell<dyn Write>>;

/// A lexical scope: one frame of bindings plus a link to its parent.
///
/// Cloning an `Environment` clones the handle, not the bindings. Closures
/// created in a frame and every frame descending from it share the same
/// bindings, so a closure may outlive the call that created it.
#[derive(Clone)]
pub struct Environment(Rc<Frame>);

struct Frame {
    bindings: RefCell<HashMap<String, Value>>,
    parent: Option<Environment>,
    output: Output,
}

impl Environment {
    /// Create a root frame with no parent
    pub(crate) fn new(output: Output) -> Self {
        Environment(Rc::new(Frame {
            bindings: RefCell::new(HashMap::new()),
            parent: None,
            output,
        }))
    }

    /// Create an empty frame whose lookups fall back to `parent`
    pub fn with_parent(parent: &Environment) -> Self {
        Environment(Rc::new(Frame {
            bindings: RefCell::new(HashMap::new()),
            parent: Some(parent.clone()),
            output: Rc::clone(&parent.0.output),
        }))
    }

    /// Bind `name` in this frame only. Ancestor frames are never touched.
    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.0.bindings.borrow_mut().insert(name.into(), value);
    }

    /// Look `name` up in this frame, then each ancestor in turn
    pub fn get(&self, name: &str) -> Option<Value> {
        let mut frame = self;
        loop {
            if let Some(value) = frame.0.bindings.borrow().get(name) {
                return Some(value.clone());
            }
            frame = frame.0.parent.as_ref()?;
        }
    }

    /// True for the root frame of a session
    #[cfg_attr(not(test), expect(dead_code))]
    pub(crate) fn is_global(&self) -> bool {
        self.0.parent.is_none()
    }

    pub fn parent(&self) -> Option<&Environment> {
        self.0.parent.as_ref()
    }

    /// Whether both handles refer to the same frame
    pub fn ptr_eq(&self, other: &Environment) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn output(&self) -> &Output {
        &self.0.output
    }

    /// Get all bindings visible from this environment
    /// Returns a Vec of (name, value) pairs sorted by name
    pub fn get_all_bindings(&self) -> Vec<(String, Value)> {
        let mut bindings = HashMap::new();

        // Start with parent bindings so they can be shadowed by local ones
        if let Some(parent) = &self.0.parent {
            bindings.extend(parent.get_all_bindings());
        }

        for (name, value) in self.0.bindings.borrow().iter() {
            bindings.insert(name.clone(), value.clone());
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self.0.bindings.borrow().keys().cloned().collect();
        names.sort();
        f.debug_struct("Environment")
            .field("bindings", &names)
            .field("parent", &self.0.parent)
            .finish()
    }
}
