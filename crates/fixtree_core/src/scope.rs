//! Layered name → value mapping that setUp, tearDown and test bodies run against.
//!
//! A [`Scope`] is a stack of layers. Each fixture owns one layer; a child fixture's layer points at its parent's,
//! and every test gets a fresh layer on top of its leaf fixture. Reads resolve from the top layer downwards, so a
//! descendant shadows an ancestor; writes always land in the layer they are issued on, so a test never mutates the
//! fixture it runs against.
//!
//! ## Notes
//!
//! - Values are `Rc<dyn Any>`. Store `Rc<RefCell<T>>` (or `Cell<T>`) when a value must be mutated in place and the
//!   change observed through another handle.
//! - Cloning a `Scope` clones the handle, not the layer.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::errors::Failure;

/// A value stored in a scope.
pub type Value = Rc<dyn Any>;

/// Handle to one layer of a layered scope.
#[derive(Clone, Default)]
pub struct Scope {
    frame: Rc<Frame>,
}

#[derive(Default)]
struct Frame {
    parent: Option<Scope>,
    locals: RefCell<HashMap<String, Value>>,
}

impl Scope {
    /// Create an empty root layer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new empty layer whose lookups fall back to `self`.
    pub fn child(&self) -> Scope {
        Scope {
            frame: Rc::new(Frame {
                parent: Some(self.clone()),
                locals: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// The layer this one falls back to, if any.
    pub fn parent(&self) -> Option<&Scope> {
        self.frame.parent.as_ref()
    }

    /// Number of layers below this one.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.parent();
        while let Some(scope) = current {
            depth += 1;
            current = scope.parent();
        }
        depth
    }

    /// Store `value` under `name` in this layer.
    pub fn set<T: Any>(&self, name: impl Into<String>, value: T) {
        self.set_value(name, Rc::new(value));
    }

    /// Store an already type-erased value under `name` in this layer.
    pub fn set_value(&self, name: impl Into<String>, value: Value) {
        self.frame.locals.borrow_mut().insert(name.into(), value);
    }

    /// Remove `name` from this layer, uncovering any ancestor binding.
    pub fn remove(&self, name: &str) -> Option<Value> {
        self.frame.locals.borrow_mut().remove(name)
    }

    /// Resolve `name`, nearest layer first.
    pub fn get_value(&self, name: &str) -> Option<Value> {
        let mut current = Some(self);
        while let Some(scope) = current {
            let found = scope.frame.locals.borrow().get(name).cloned();
            if found.is_some() {
                return found;
            }
            current = scope.parent();
        }
        None
    }

    /// Resolve `name` and downcast it to `T`.
    ///
    /// ## Returns
    /// - `None` if the name is unbound **or** bound to a value of another type.
    pub fn get<T: Any>(&self, name: &str) -> Option<Rc<T>> {
        self.get_value(name).and_then(|value| value.downcast::<T>().ok())
    }

    /// Like [`Scope::get`], but reports a `ReferenceError` failure instead of returning `None`.
    #[track_caller]
    pub fn require<T: Any>(&self, name: &str) -> Result<Rc<T>, Failure> {
        match self.get_value(name) {
            None => Err(Failure::reference(format!("\"{name}\" is not defined in this scope"))),
            Some(value) => match value.downcast::<T>() {
                Ok(value) => Ok(value),
                Err(_) => Err(Failure::reference(format!(
                    "\"{name}\" is not a {}",
                    std::any::type_name::<T>()
                ))),
            },
        }
    }

    /// Whether `name` resolves in this layer or any ancestor.
    pub fn contains(&self, name: &str) -> bool {
        self.get_value(name).is_some()
    }

    /// Whether `name` is bound in this layer itself.
    pub fn has_own(&self, name: &str) -> bool {
        self.frame.locals.borrow().contains_key(name)
    }

    /// Names bound in this layer, sorted.
    pub fn own_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.frame.locals.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether two handles refer to the same layer.
    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.frame, &other.frame)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut layers = Vec::new();
        let mut current = Some(self);
        while let Some(scope) = current {
            layers.push(scope.own_names());
            current = scope.parent();
        }
        f.debug_struct("Scope").field("layers", &layers).finish()
    }
}
