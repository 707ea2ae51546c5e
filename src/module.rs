use std::rc::Rc;

use log::debug;

use crate::compiler::{compile_with, CompileOptions};
use crate::context::Context;
use crate::error::LoadError;
use crate::heap::{Heap, HeapRef};
use crate::object::{Module, Object};
use crate::scanner::Scanner;

impl Module {
    /// Tokenize and compile `source` into a new module object with an empty context.
    pub fn load(
        heap: &mut Heap,
        name: &str,
        filename: Option<&str>,
        source: &str,
    ) -> Result<HeapRef, LoadError> {
        Module::load_with(heap, name, filename, source, CompileOptions::default())
    }

    /// `load`, with compile options.
    pub fn load_with(
        heap: &mut Heap,
        name: &str,
        filename: Option<&str>,
        source: &str,
        options: CompileOptions,
    ) -> Result<HeapRef, LoadError> {
        let scanner = match filename {
            Some(filename) => Scanner::with_filename(source, filename),
            None => Scanner::new(source),
        };
        let tokens = scanner.tokenize()?;
        let ast = compile_with(&tokens, options);
        if ast.has_errors() {
            debug!("module {}: {} compile errors", name, ast.errors.len());
            return Err(LoadError::Syntax(ast.errors));
        }
        debug!("module {}: loaded {} tokens", name, tokens.len());

        let module = heap.alloc(Object::Module(Module {
            name: name.to_string(),
            program_filename: filename.map(str::to_string),
            program_source: source.to_string(),
            tokens: Rc::new(tokens),
            ast: Rc::new(ast),
            context: Context::new().into_ref(),
        }))?;
        Ok(module)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::HeapError;
    use crate::ast::{NodeKind, NodeType};
    use crate::object::{deep_copy, shallow_copy, Func};

    fn module(heap: &Heap, r: &HeapRef) -> Module {
        match &*heap.get(r).unwrap() {
            Object::Module(module) => module.clone(),
            other => panic!("not a module: {:?}", other),
        }
    }

    #[test]
    fn test_load() {
        let mut heap = Heap::new();
        let r = Module::load(&mut heap, "main", Some("main.pad"), "hi {: name :}").unwrap();
        let m = module(&heap, &r);
        assert_eq!(m.name, "main");
        assert_eq!(m.program_filename.as_deref(), Some("main.pad"));
        assert_eq!(m.program_source, "hi {: name :}");
        assert_eq!(m.tokens.len(), 4);
        assert!(m.ast.root.is_some());
        assert_eq!(
            m.tokens[1].location.filename.as_deref(),
            Some("main.pad")
        );
    }

    #[test]
    fn test_load_empty_source() {
        let mut heap = Heap::new();
        let r = Module::load(&mut heap, "empty", None, "").unwrap();
        assert!(module(&heap, &r).ast.root.is_none());
    }

    #[test]
    fn test_load_errors() {
        let mut heap = Heap::new();
        match Module::load(&mut heap, "bad", None, "{@ if a: @}") {
            Err(LoadError::Syntax(errors)) => assert!(!errors.is_empty()),
            other => panic!("{:?}", other),
        }
        assert!(matches!(
            Module::load(&mut heap, "bad", None, "{@ \"open @}"),
            Err(LoadError::Tokenize(_))
        ));
        assert!(heap.is_empty());

        let mut full = Heap::with_limit(0);
        assert!(matches!(
            Module::load(&mut full, "m", None, "x"),
            Err(LoadError::Heap(HeapError::OutOfMemory(0)))
        ));
    }

    #[test]
    fn test_copies_of_modules() {
        let mut heap = Heap::new();
        let r = Module::load(&mut heap, "m", None, "{@ def f(a): return a end @}").unwrap();
        let original = module(&heap, &r);
        let f = match &original.ast.root.as_ref().unwrap().find_all(NodeType::FuncDef)[0].kind {
            NodeKind::FuncDef(def) => Func::from_def(&mut heap, def, &original.context).unwrap(),
            _ => unreachable!(),
        };
        let original_body = match &*heap.get(&f).unwrap() {
            Object::Func(func) => func.suites.clone(),
            other => panic!("not a function: {:?}", other),
        };
        let x = heap.alloc(Object::Int(1)).unwrap();
        original.context.borrow_mut().set_var(&mut heap, "f", f.clone());
        original.context.borrow_mut().set_var(&mut heap, "x", x.clone());

        // shallow: same AST, own context over the same values
        let shallow_ref = shallow_copy(&mut heap, &r).unwrap();
        let shallow = module(&heap, &shallow_ref);
        assert!(Rc::ptr_eq(&shallow.ast, &original.ast));
        assert!(!Rc::ptr_eq(&shallow.context, &original.context));
        assert!(shallow.context.borrow().find_var("x").unwrap().ptr_eq(&x));
        assert_eq!(heap.ref_count(&x), Some(2));
        let y = heap.alloc(Object::Int(2)).unwrap();
        shallow.context.borrow_mut().set_var(&mut heap, "x", y);
        assert!(original.context.borrow().find_var("x").unwrap().ptr_eq(&x));
        assert_eq!(heap.ref_count(&x), Some(1));

        // deep: everything duplicated
        let deep_ref = deep_copy(&mut heap, &r).unwrap();
        let deep = module(&heap, &deep_ref);
        assert!(!Rc::ptr_eq(&deep.context, &original.context));
        assert!(!Rc::ptr_eq(&deep.ast, &original.ast));
        assert!(!Rc::ptr_eq(&deep.tokens, &original.tokens));
        assert_eq!(
            deep.ast.root.as_ref().map(|n| n.to_string()),
            original.ast.root.as_ref().map(|n| n.to_string())
        );

        let copied_x = deep.context.borrow().find_var("x").unwrap();
        assert!(!copied_x.ptr_eq(&x));
        *heap.get_mut(&copied_x).unwrap() = Object::Int(3);
        assert!(matches!(*heap.get(&x).unwrap(), Object::Int(1)));

        // the copied function belongs to the copied module
        let copied_f = deep.context.borrow().find_var("f").unwrap();
        let (body, context) = match &*heap.get(&copied_f).unwrap() {
            Object::Func(func) => (func.suites.clone(), func.context.clone()),
            other => panic!("not a function: {:?}", other),
        };
        assert!(!body.ptr_eq(&original_body));
        assert!(Rc::ptr_eq(&context.upgrade().unwrap(), &deep.context));

        drop(original);
        drop(shallow);
        heap.release(&r);
        heap.release(&shallow_ref);
        assert!(original_body.upgrade().is_none());
        assert!(!heap.is_alive(&x));
        assert_eq!(body.upgrade().map(|b| b.len()), Some(1));
        assert!(heap.is_alive(&copied_f));
    }

    #[test]
    fn test_failed_deep_copy_of_module() {
        let mut heap = Heap::with_limit(3);
        let r = Module::load(&mut heap, "m", None, "{@ x = 1 @}").unwrap();
        let x = heap.alloc(Object::Int(1)).unwrap();
        let context = module(&heap, &r).context;
        context.borrow_mut().set_var(&mut heap, "x", x.clone());

        // room for the module's placeholder, not for its variable
        assert_eq!(
            deep_copy(&mut heap, &r).err(),
            Some(HeapError::OutOfMemory(3))
        );
        assert_eq!(heap.len(), 2);
        assert_eq!(heap.ref_count(&x), Some(1));
    }
}
