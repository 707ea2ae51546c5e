//! Heap objects, contexts and modules through the public API.
use padlang::context::Context;
use padlang::heap::{Heap, HeapRef};
use padlang::object::{deep_copy, shallow_copy, to_string, Module, Object};

fn elems(heap: &Heap, r: &HeapRef) -> Vec<HeapRef> {
    match &*heap.get(r).unwrap() {
        Object::Array(elems) => elems.clone(),
        other => panic!("not an array: {:?}", other),
    }
}

#[test]
fn test_release_waits_for_last_claim() {
    let mut heap = Heap::new();
    let r = heap.alloc(Object::Unicode("hi".to_string())).unwrap();
    heap.inc_ref(&r);
    heap.inc_ref(&r);

    heap.dec_ref(&r);
    heap.release(&r);
    assert!(heap.is_alive(&r));
    assert_eq!(heap.ref_count(&r), Some(1));

    heap.dec_ref(&r);
    heap.release(&r);
    assert!(!heap.is_alive(&r));
    assert!(heap.get(&r).is_err());
}

#[test]
fn test_freeing_a_container_frees_its_elements() {
    let mut heap = Heap::new();
    let one = heap.alloc(Object::Int(1)).unwrap();
    let two = heap.alloc(Object::Int(2)).unwrap();
    let inner = heap.alloc(Object::Array(vec![two])).unwrap();
    let outer = heap.alloc(Object::Array(vec![one, inner])).unwrap();
    assert_eq!(heap.len(), 4);

    heap.release(&outer);
    assert!(heap.is_empty());
}

#[test]
fn test_deep_copy_is_independent() {
    let mut heap = Heap::new();
    let two = heap.alloc(Object::Int(2)).unwrap();
    let inner = heap.alloc(Object::Array(vec![two.clone()])).unwrap();
    let outer = heap.alloc(Object::Array(vec![inner.clone()])).unwrap();

    let copy = deep_copy(&mut heap, &outer).unwrap();
    let copied_inner = elems(&heap, &copy)[0].clone();
    assert!(!copied_inner.ptr_eq(&inner));
    let copied_two = elems(&heap, &copied_inner)[0].clone();
    *heap.get_mut(&copied_two).unwrap() = Object::Int(20);

    assert_eq!(to_string(&heap, &two).unwrap(), "2");
    assert_eq!(to_string(&heap, &copied_two).unwrap(), "20");

    heap.release(&outer);
    assert!(!heap.is_alive(&two));
    assert!(heap.is_alive(&copied_two));
}

#[test]
fn test_deep_copy_of_a_cycle() {
    let mut heap = Heap::new();
    let a = heap.alloc(Object::Array(Vec::new())).unwrap();
    heap.replace(&a, Object::Array(vec![a.clone()])).unwrap();

    let copy = deep_copy(&mut heap, &a).unwrap();
    assert!(!copy.ptr_eq(&a));
    assert!(elems(&heap, &copy)[0].ptr_eq(&copy));
    assert_eq!(heap.len(), 2);
}

#[test]
fn test_shallow_copy_shares_elements() {
    let mut heap = Heap::new();
    let x = heap.alloc(Object::Float(1.5)).unwrap();
    let arr = heap.alloc(Object::Array(vec![x.clone()])).unwrap();

    let copy = shallow_copy(&mut heap, &arr).unwrap();
    assert!(!copy.ptr_eq(&arr));
    assert!(elems(&heap, &copy)[0].ptr_eq(&x));
    assert_eq!(heap.ref_count(&x), Some(2));

    heap.release(&arr);
    assert!(heap.is_alive(&x));
    heap.release(&copy);
    assert!(!heap.is_alive(&x));
}

#[test]
fn test_scalars_render() {
    let mut heap = Heap::new();
    let values = [
        (Object::Nil, "nil"),
        (Object::Int(-3), "-3"),
        (Object::Float(2.5), "2.5"),
        (Object::Float(3.0), "3.0"),
        (Object::Bool(true), "true"),
        (Object::Array(Vec::new()), "(array)"),
    ];
    for (object, expected) in values {
        let r = heap.alloc(object).unwrap();
        assert_eq!(to_string(&heap, &r).unwrap(), expected);
    }
}

#[test]
fn test_lookup_walks_parent_contexts() {
    let mut heap = Heap::new();
    let global = Context::new().into_ref();
    let answer = heap.alloc(Object::Int(42)).unwrap();
    global.borrow_mut().set_var(&mut heap, "answer", answer.clone());

    let mut local = Context::with_parent(&global);
    assert!(local.find_local("answer").is_none());
    assert!(local.find_var("answer").unwrap().ptr_eq(&answer));

    local.push_scope();
    let shadow = heap.alloc(Object::Int(0)).unwrap();
    local.set_var(&mut heap, "answer", shadow.clone());
    assert!(local.find_var("answer").unwrap().ptr_eq(&shadow));

    local.pop_scope(&mut heap);
    assert!(!heap.is_alive(&shadow));
    assert!(local.find_var("answer").unwrap().ptr_eq(&answer));
}

#[test]
fn test_loaded_module() {
    let mut heap = Heap::new();
    let r = Module::load(&mut heap, "page", Some("page.pad"), "{@ x = 1 @}{: x :}").unwrap();
    assert_eq!(to_string(&heap, &r).unwrap(), "(module)");
    assert_eq!(heap.dump(), "0 [0] module: (module)\n");

    let copy = deep_copy(&mut heap, &r).unwrap();
    assert_eq!(heap.len(), 2);
    heap.release(&r);
    assert!(heap.is_alive(&copy));
    assert_eq!(heap.len(), 1);
}
