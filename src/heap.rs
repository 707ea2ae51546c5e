// heap is the allocator every runtime object goes through. It counts references but never collects
// on its own: callers bump and drop counts explicitly and call `release`, which frees an object only
// once nothing claims it any more.
//
// ```rust
//    use padlang::heap::Heap;
//    use padlang::object::Object;
//    let mut heap = Heap::new();
//    let s = heap.alloc(Object::Unicode("hi".into())).unwrap();
//    heap.inc_ref(&s);
//    heap.release(&s); // still claimed, nothing happens
//    heap.dec_ref(&s);
//    heap.release(&s); // freed
//    assert!(!heap.is_alive(&s));
// ```
//
// Internally each live object sits in a slot as an `Rc<HeapNode>` and handles are `Weak`. A handle
// to a freed object can't be upgraded any more, and it keeps the old allocation's address reserved,
// so a reused slot never matches a stale handle. Accessing a dead handle is an error, not UB and
// not a panic.
//
// Ownership between objects is tracked here too: `alloc` and `replace` claim every handle the new
// payload owns (see `Object::owned_refs`), and freeing an object drops those claims again and
// releases whatever reaches zero. Contexts owned by modules and structs are emptied the same way
// when their last owner goes.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt::Write;
use std::rc::{Rc, Weak};

use log::debug;

use crate::error::HeapError;
use crate::object::Object;

#[derive(Debug)]
struct HeapNode {
    object: RefCell<Object>,
    ref_count: Cell<usize>,
}

/// A handle to an object on a `Heap`. Cloning a handle does not claim the object; see
/// `Heap::inc_ref`.
#[derive(Debug, Clone)]
pub struct HeapRef {
    slot: usize,
    value: Weak<HeapNode>,
}

impl HeapRef {
    /// Whether both handles point at the same object.
    pub fn ptr_eq(&self, other: &HeapRef) -> bool {
        self.value.ptr_eq(&other.value)
    }

    // Stable identity of the pointee, usable as a map key while the handle is held.
    pub(crate) fn id(&self) -> usize {
        self.value.as_ptr() as usize
    }
}

/// A reference-counting arena of `Object`s.
#[derive(Debug, Default)]
pub struct Heap {
    slots: Vec<Option<Rc<HeapNode>>>,
    free: Vec<usize>,
    live: usize,
    limit: Option<usize>,
}

impl Heap {
    /// A new, empty heap without an object limit.
    pub fn new() -> Heap {
        Heap::default()
    }

    /// A heap that refuses to hold more than `max_objects` live objects at once.
    pub fn with_limit(max_objects: usize) -> Heap {
        Heap {
            limit: Some(max_objects),
            ..Heap::default()
        }
    }

    /// Put `object` on the heap with a reference count of 0, claiming the handles it owns.
    pub fn alloc(&mut self, object: Object) -> Result<HeapRef, HeapError> {
        if let Some(limit) = self.limit {
            if self.live >= limit {
                return Err(HeapError::OutOfMemory(limit));
            }
        }
        for child in object.owned_refs() {
            self.inc_ref(&child);
        }

        let node = Rc::new(HeapNode {
            object: RefCell::new(object),
            ref_count: Cell::new(0),
        });
        let value = Rc::downgrade(&node);
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(node);
                slot
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        self.live += 1;
        Ok(HeapRef { slot, value })
    }

    fn node(&self, r: &HeapRef) -> Option<&Rc<HeapNode>> {
        self.slots
            .get(r.slot)?
            .as_ref()
            .filter(|node| std::ptr::eq(Rc::as_ptr(node), r.value.as_ptr()))
    }

    /// Claim the object. A no-op on a dead handle.
    pub fn inc_ref(&self, r: &HeapRef) {
        if let Some(node) = self.node(r) {
            node.ref_count.set(node.ref_count.get().saturating_add(1));
        }
    }

    /// Drop a claim on the object. Never goes below 0, and never frees; see `release`.
    pub fn dec_ref(&self, r: &HeapRef) {
        if let Some(node) = self.node(r) {
            node.ref_count.set(node.ref_count.get().saturating_sub(1));
        }
    }

    /// Free the object if nothing claims it. Owned children lose a claim and are released in
    /// turn. A no-op if the object is still claimed or already gone.
    pub fn release(&mut self, r: &HeapRef) {
        self.release_all(vec![r.clone()]);
    }

    fn release_all(&mut self, mut pending: Vec<HeapRef>) {
        while let Some(r) = pending.pop() {
            if self.ref_count(&r) != Some(0) {
                continue;
            }
            if let Some(object) = self.take_slot(&r) {
                self.disown(&object, &mut pending);
            }
        }
    }

    // Free every object in `refs` whatever its count, dropping the claims they hold on anything
    // else. Undoes a copy that failed halfway.
    pub(crate) fn discard(&mut self, refs: &[HeapRef]) {
        let mut pending = Vec::new();
        for r in refs {
            if let Some(object) = self.take_slot(r) {
                self.disown(&object, &mut pending);
            }
        }
        self.release_all(pending);
    }

    // Empty the slot of a live object and hand back its payload.
    fn take_slot(&mut self, r: &HeapRef) -> Option<Object> {
        let node = Rc::clone(self.node(r)?);
        self.slots[r.slot] = None;
        self.free.push(r.slot);
        self.live -= 1;

        let object = node.object.replace(Object::Nil);
        debug!("heap: freed {} in slot {}", object.object_type(), r.slot);
        Some(object)
    }

    // Drop the claims `object` holds, queueing the handles for release.
    fn disown(&self, object: &Object, pending: &mut Vec<HeapRef>) {
        for child in object.owned_refs() {
            self.dec_ref(&child);
            pending.push(child);
        }
        if let Some(context) = object.owned_context() {
            // shared contexts stay filled until their last owner goes
            if Rc::strong_count(context) == 1 {
                for var in context.borrow_mut().take_vars() {
                    self.dec_ref(&var);
                    pending.push(var);
                }
            }
        }
    }

    /// Swap the payload of a live object. The new payload's handles are claimed, the old
    /// payload's are dropped and released.
    pub fn replace(&mut self, r: &HeapRef, object: Object) -> Result<(), HeapError> {
        let node = match self.node(r) {
            Some(node) => Rc::clone(node),
            None => return Err(HeapError::DeadReference),
        };
        for child in object.owned_refs() {
            self.inc_ref(&child);
        }
        let old = node.object.replace(object);
        let mut pending = Vec::new();
        self.disown(&old, &mut pending);
        self.release_all(pending);
        Ok(())
    }

    /// Current reference count, None for a dead handle.
    pub fn ref_count(&self, r: &HeapRef) -> Option<usize> {
        self.node(r).map(|node| node.ref_count.get())
    }

    #[allow(missing_docs)]
    pub fn is_alive(&self, r: &HeapRef) -> bool {
        self.node(r).is_some()
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.live
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Borrow the object. Panics like `RefCell::borrow` if it is mutably borrowed.
    pub fn get(&self, r: &HeapRef) -> Result<Ref<'_, Object>, HeapError> {
        self.node(r)
            .map(|node| node.object.borrow())
            .ok_or(HeapError::DeadReference)
    }

    /// Mutably borrow the object. Handles written into the payload this way are not claimed; use
    /// `replace` for payloads that own handles.
    pub fn get_mut(&mut self, r: &HeapRef) -> Result<RefMut<'_, Object>, HeapError> {
        self.node(r)
            .map(|node| node.object.borrow_mut())
            .ok_or(HeapError::DeadReference)
    }

    /// One line per live object, in slot order: `slot [ref_count] type: rendering`.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (slot, node) in self.slots.iter().enumerate() {
            if let Some(node) = node {
                let object = node.object.borrow();
                // writing into a String can't fail
                let _ = writeln!(
                    out,
                    "{} [{}] {}: {}",
                    slot,
                    node.ref_count.get(),
                    object.object_type(),
                    object
                );
            }
        }
        out
    }
}
