use std::cell::RefCell;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;

use crate::error::HeapError;
use crate::heap::{Heap, HeapRef};
use crate::object::DeepCopier;

/// Contexts are shared: a module or struct owns one, functions and identifiers point back at it.
pub type ContextRef = Rc<RefCell<Context>>;

pub(crate) type Varmap = FxHashMap<String, HeapRef>;

/// The variables visible to running code, as a stack of scopes. Every variable claims its value
/// on the heap.
///
/// A context may have a parent. Lookups that miss every scope continue in the parent, which is
/// how a function body sees the globals of its module.
#[derive(Debug)]
pub struct Context {
    // scopes[0] is the global scope and is never popped
    scopes: Vec<Varmap>,
    parent: Weak<RefCell<Context>>,
    stdout_buf: String,
    stderr_buf: String,
    /// Set by `break` until the enclosing loop sees it.
    pub do_break: bool,
    /// Set by `continue` until the enclosing loop sees it.
    pub do_continue: bool,
    /// Set by `return` until the function call sees it.
    pub do_return: bool,
}

impl Default for Context {
    fn default() -> Self {
        Context {
            scopes: vec![Varmap::default()],
            parent: Weak::new(),
            stdout_buf: String::new(),
            stderr_buf: String::new(),
            do_break: false,
            do_continue: false,
            do_return: false,
        }
    }
}

impl Context {
    /// A context with just an empty global scope.
    pub fn new() -> Context {
        Context::default()
    }

    /// A new context whose lookups fall back to `parent`.
    pub fn with_parent(parent: &ContextRef) -> Context {
        Context {
            parent: Rc::downgrade(parent),
            ..Context::default()
        }
    }

    /// Wrap up for sharing.
    pub fn into_ref(self) -> ContextRef {
        Rc::new(RefCell::new(self))
    }

    /// The parent context, if there is one and it is still around.
    pub fn parent(&self) -> Option<ContextRef> {
        self.parent.upgrade()
    }

    #[allow(missing_docs)]
    pub fn push_scope(&mut self) {
        self.scopes.push(Varmap::default());
    }

    /// Drop the innermost scope, releasing its variables. The global scope stays.
    pub fn pop_scope(&mut self, heap: &mut Heap) {
        if self.scopes.len() == 1 {
            return;
        }
        if let Some(scope) = self.scopes.pop() {
            for value in scope.into_values() {
                heap.dec_ref(&value);
                heap.release(&value);
            }
        }
    }

    /// Number of scopes, the global one included.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Bind `name` in the innermost scope.
    pub fn set_var(&mut self, heap: &mut Heap, name: &str, value: HeapRef) {
        let index = self.scopes.len() - 1;
        self.set_in(index, heap, name, value);
    }

    /// Bind `name` in the global scope.
    pub fn set_global(&mut self, heap: &mut Heap, name: &str, value: HeapRef) {
        self.set_in(0, heap, name, value);
    }

    fn set_in(&mut self, index: usize, heap: &mut Heap, name: &str, value: HeapRef) {
        heap.inc_ref(&value);
        if let Some(old) = self.scopes[index].insert(name.to_string(), value) {
            heap.dec_ref(&old);
            heap.release(&old);
        }
    }

    /// Look `name` up in this context only, innermost scope first.
    pub fn find_local(&self, name: &str) -> Option<HeapRef> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .cloned()
    }

    /// Look `name` up here, then in each parent in turn.
    pub fn find_var(&self, name: &str) -> Option<HeapRef> {
        if let Some(found) = self.find_local(name) {
            return Some(found);
        }
        let mut next = self.parent();
        while let Some(context) = next {
            let context = context.borrow();
            if let Some(found) = context.find_local(name) {
                return Some(found);
            }
            next = context.parent();
        }
        None
    }

    /// Whether the innermost scope binds `name`.
    pub fn in_current_scope(&self, name: &str) -> bool {
        self.scopes
            .last()
            .map_or(false, |scope| scope.contains_key(name))
    }

    #[allow(missing_docs)]
    pub fn put_stdout(&mut self, text: &str) {
        self.stdout_buf.push_str(text);
    }

    #[allow(missing_docs)]
    pub fn put_stderr(&mut self, text: &str) {
        self.stderr_buf.push_str(text);
    }

    #[allow(missing_docs)]
    pub fn stdout(&self) -> &str {
        &self.stdout_buf
    }

    #[allow(missing_docs)]
    pub fn stderr(&self) -> &str {
        &self.stderr_buf
    }

    /// Remove one trailing line break (`\n`, `\r` or `\r\n`) from the stdout buffer.
    pub fn pop_stdout_newline(&mut self) {
        if self.stdout_buf.ends_with("\r\n") {
            self.stdout_buf.truncate(self.stdout_buf.len() - 2);
        } else if self.stdout_buf.ends_with('\n') || self.stdout_buf.ends_with('\r') {
            self.stdout_buf.pop();
        }
    }

    #[allow(missing_docs)]
    pub fn clear_jump_flags(&mut self) {
        self.do_break = false;
        self.do_continue = false;
        self.do_return = false;
    }

    /// A copy whose variables are deep copies. The parent link and buffers are carried over.
    pub fn deep_copy(&self, heap: &mut Heap) -> Result<Context, HeapError> {
        DeepCopier::new(heap).copy_context(self)
    }

    /// A copy whose variables share the values of this one.
    pub fn shallow_copy(&self, heap: &mut Heap) -> Context {
        for value in self.scopes.iter().flat_map(|scope| scope.values()) {
            heap.inc_ref(value);
        }
        self.with_scopes(self.scopes.clone())
    }

    // A context like this one but with the given scopes.
    pub(crate) fn with_scopes(&self, scopes: Vec<Varmap>) -> Context {
        Context {
            scopes,
            parent: self.parent.clone(),
            stdout_buf: self.stdout_buf.clone(),
            stderr_buf: self.stderr_buf.clone(),
            do_break: self.do_break,
            do_continue: self.do_continue,
            do_return: self.do_return,
        }
    }

    pub(crate) fn set_scopes(&mut self, scopes: Vec<Varmap>) {
        self.scopes = scopes;
    }

    pub(crate) fn scopes(&self) -> &[Varmap] {
        &self.scopes
    }

    // Empty every scope without touching the heap, leaving one global scope. The caller takes
    // over the claims.
    pub(crate) fn take_vars(&mut self) -> Vec<HeapRef> {
        let scopes = std::mem::replace(&mut self.scopes, vec![Varmap::default()]);
        scopes
            .into_iter()
            .flat_map(|scope| scope.into_values())
            .collect()
    }

    /// Release every variable, leaving one empty global scope.
    pub fn clear(&mut self, heap: &mut Heap) {
        for value in self.take_vars() {
            heap.dec_ref(&value);
            heap.release(&value);
        }
    }
}
