// The runtime values of Pad. Objects only ever live on a `Heap`; other objects and contexts refer to
// them through `HeapRef` handles. Per variant, a handle is either owned (counted on the heap, see
// `Object::owned_refs`) or the object holds a `Weak` pointer to something that must outlive it
// (function bodies, defining contexts and ASTs).

use std::cell::RefCell;
use std::fmt::Display;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;

use crate::ast::{Ast, BlockMap, ChainNodeKind, FuncDef, NodeArray, NodeKind, NodeType};
use crate::context::{Context, ContextRef, Varmap};
use crate::error::HeapError;
use crate::heap::{Heap, HeapRef};
use crate::scanner::Token;

/// Tag of an `Object` variant.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Nil,
    Int,
    Float,
    Bool,
    Identifier,
    Unicode,
    Array,
    Dict,
    Func,
    Chain,
    Module,
    DefStruct,
    Object,
    OwnersMethod,
    Type,
    BuiltinFunc,
}

impl Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ObjectType::Nil => "nil",
            ObjectType::Int => "int",
            ObjectType::Float => "float",
            ObjectType::Bool => "bool",
            ObjectType::Identifier => "identifier",
            ObjectType::Unicode => "unicode",
            ObjectType::Array => "array",
            ObjectType::Dict => "dict",
            ObjectType::Func => "func",
            ObjectType::Chain => "chain",
            ObjectType::Module => "module",
            ObjectType::DefStruct => "def-struct",
            ObjectType::Object => "object",
            ObjectType::OwnersMethod => "owners-method",
            ObjectType::Type => "type",
            ObjectType::BuiltinFunc => "builtin-func",
        };
        write!(f, "{}", name)
    }
}

/// A name, resolved later against the context it was written in.
#[derive(Debug, Clone)]
pub struct Identifier {
    #[allow(missing_docs)]
    pub name: String,
    #[allow(missing_docs)]
    pub context: Weak<RefCell<Context>>,
}

/// A closure over a `def`/`met` definition.
#[derive(Debug, Clone)]
pub struct Func {
    /// An identifier object.
    pub name: HeapRef,
    /// An array of identifier objects.
    pub args: HeapRef,
    /// The body of the definition.
    pub suites: Weak<NodeArray>,
    /// The block statements of the definition.
    pub blocks: Weak<BlockMap>,
    /// Where the definition was evaluated.
    pub context: Weak<RefCell<Context>>,
    /// The function named after `extends`, once resolved.
    pub extends: Option<HeapRef>,
    #[allow(missing_docs)]
    pub is_met: bool,
}

impl Func {
    /// Build the function object for a definition, evaluated in `context`. `extends` is left
    /// for the evaluator to resolve.
    pub fn from_def(
        heap: &mut Heap,
        def: &FuncDef,
        context: &ContextRef,
    ) -> Result<HeapRef, HeapError> {
        let weak = Rc::downgrade(context);
        let ident = |name: &str| {
            Object::Identifier(Identifier {
                name: name.to_string(),
                context: weak.clone(),
            })
        };

        let name = heap.alloc(ident(def.identifier.identifier_name().unwrap_or_default()))?;
        let mut args = Vec::new();
        for node in def.params.descendants() {
            if let Some(arg) = node.identifier_name() {
                args.push(heap.alloc(ident(arg))?);
            }
        }
        let args = heap.alloc(Object::Array(args))?;
        heap.alloc(Object::Func(Func {
            name,
            args,
            suites: Rc::downgrade(&def.contents),
            blocks: Rc::downgrade(&def.blocks),
            context: weak,
            extends: None,
            is_met: def.is_met,
        }))
    }
}

/// One postfix operation applied to a chain's operand.
#[derive(Debug, Clone)]
pub struct ChainObject {
    #[allow(missing_docs)]
    pub kind: ChainNodeKind,
    /// The attribute name, the index, or the call arguments.
    pub operand: HeapRef,
}

/// An unevaluated `a.b[c](d)` chain.
#[derive(Debug, Clone)]
pub struct Chain {
    #[allow(missing_docs)]
    pub operand: HeapRef,
    #[allow(missing_docs)]
    pub chain_objs: Vec<ChainObject>,
}

/// A loaded source unit with everything needed to run it again: its tokens, its AST and its
/// global context.
#[derive(Debug, Clone)]
pub struct Module {
    #[allow(missing_docs)]
    pub name: String,
    #[allow(missing_docs)]
    pub program_filename: Option<String>,
    #[allow(missing_docs)]
    pub program_source: String,
    #[allow(missing_docs)]
    pub tokens: Rc<Vec<Token>>,
    #[allow(missing_docs)]
    pub ast: Rc<Ast>,
    #[allow(missing_docs)]
    pub context: ContextRef,
}

/// A `struct` definition. Its context holds the default field values.
#[derive(Debug, Clone)]
pub struct DefStruct {
    /// An identifier object.
    pub identifier: HeapRef,
    /// The AST the definition came from.
    pub ast: Weak<Ast>,
    #[allow(missing_docs)]
    pub context: ContextRef,
}

/// An instance of a struct, with its own field values.
#[derive(Debug, Clone)]
pub struct ObjectInstance {
    #[allow(missing_docs)]
    pub ast: Weak<Ast>,
    #[allow(missing_docs)]
    pub struct_context: ContextRef,
    /// The `DefStruct` this was made from.
    pub def_obj: HeapRef,
}

/// A method looked up on a value, e.g. `"abc".upper`, waiting to be called.
#[derive(Debug, Clone)]
pub struct OwnersMethod {
    #[allow(missing_docs)]
    pub owner: HeapRef,
    #[allow(missing_docs)]
    pub method_name: String,
}

/// A host builtin, named for the evaluator's lookup table. Bound builtins carry their owner.
#[derive(Debug, Clone)]
pub struct BuiltinFunc {
    #[allow(missing_docs)]
    pub name: String,
    #[allow(missing_docs)]
    pub owner: Option<HeapRef>,
}

/// A runtime value.
#[allow(missing_docs)]
#[derive(Debug, Clone)]
pub enum Object {
    Nil,
    Int(i64),
    Float(f64),
    Bool(bool),
    Identifier(Identifier),
    Unicode(String),
    Array(Vec<HeapRef>),
    /// Keys in insertion order.
    Dict(Vec<(String, HeapRef)>),
    Func(Func),
    Chain(Chain),
    Module(Module),
    DefStruct(DefStruct),
    ObjectInstance(ObjectInstance),
    OwnersMethod(OwnersMethod),
    /// The type of a value, as a value.
    Type(ObjectType),
    BuiltinFunc(BuiltinFunc),
}

impl Object {
    #[allow(missing_docs)]
    pub fn object_type(&self) -> ObjectType {
        match self {
            Object::Nil => ObjectType::Nil,
            Object::Int(_) => ObjectType::Int,
            Object::Float(_) => ObjectType::Float,
            Object::Bool(_) => ObjectType::Bool,
            Object::Identifier(_) => ObjectType::Identifier,
            Object::Unicode(_) => ObjectType::Unicode,
            Object::Array(_) => ObjectType::Array,
            Object::Dict(_) => ObjectType::Dict,
            Object::Func(_) => ObjectType::Func,
            Object::Chain(_) => ObjectType::Chain,
            Object::Module(_) => ObjectType::Module,
            Object::DefStruct(_) => ObjectType::DefStruct,
            Object::ObjectInstance(_) => ObjectType::Object,
            Object::OwnersMethod(_) => ObjectType::OwnersMethod,
            Object::Type(_) => ObjectType::Type,
            Object::BuiltinFunc(_) => ObjectType::BuiltinFunc,
        }
    }

    /// The handles this object owns. The heap counts one claim on each.
    pub fn owned_refs(&self) -> Vec<HeapRef> {
        match self {
            Object::Array(elems) => elems.clone(),
            Object::Dict(items) => items.iter().map(|(_, v)| v.clone()).collect(),
            Object::Func(func) => {
                let mut refs = vec![func.name.clone(), func.args.clone()];
                refs.extend(func.extends.clone());
                refs
            }
            Object::Chain(chain) => std::iter::once(chain.operand.clone())
                .chain(chain.chain_objs.iter().map(|co| co.operand.clone()))
                .collect(),
            Object::DefStruct(def) => vec![def.identifier.clone()],
            Object::ObjectInstance(instance) => vec![instance.def_obj.clone()],
            Object::OwnersMethod(method) => vec![method.owner.clone()],
            Object::BuiltinFunc(builtin) => builtin.owner.iter().cloned().collect(),
            Object::Nil
            | Object::Int(_)
            | Object::Float(_)
            | Object::Bool(_)
            | Object::Identifier(_)
            | Object::Unicode(_)
            | Object::Module(_)
            | Object::Type(_) => Vec::new(),
        }
    }

    /// The context this object owns, if any.
    pub fn owned_context(&self) -> Option<&ContextRef> {
        match self {
            Object::Module(module) => Some(&module.context),
            Object::DefStruct(def) => Some(&def.context),
            Object::ObjectInstance(instance) => Some(&instance.struct_context),
            _ => None,
        }
    }
}

// `%lf` then trailing zeros stripped, keeping one digit after the point.
fn format_float(value: f64) -> String {
    let mut s = format!("{:.6}", value);
    if s.contains('.') {
        while s.ends_with('0') && !s.ends_with(".0") {
            s.pop();
        }
    }
    s
}

// Scalars print their value; everything else a placeholder.
impl Display for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Object::Nil => write!(f, "nil"),
            Object::Int(value) => write!(f, "{}", value),
            Object::Float(value) => write!(f, "{}", format_float(*value)),
            Object::Bool(value) => write!(f, "{}", value),
            Object::Identifier(ident) => write!(f, "{}", ident.name),
            Object::Unicode(s) => write!(f, "{}", s),
            Object::Array(_) => write!(f, "(array)"),
            Object::Dict(_) => write!(f, "(dict)"),
            Object::Func(_) => write!(f, "(function)"),
            Object::Chain(_) => write!(f, "(chain)"),
            Object::Module(_) => write!(f, "(module)"),
            Object::DefStruct(_) => write!(f, "(struct)"),
            Object::ObjectInstance(_) => write!(f, "(object)"),
            Object::OwnersMethod(_) => write!(f, "(method)"),
            Object::Type(_) => write!(f, "(type)"),
            Object::BuiltinFunc(_) => write!(f, "(builtin-function)"),
        }
    }
}

/// Render the object behind `r`. Containers are not walked.
pub fn to_string(heap: &Heap, r: &HeapRef) -> Result<String, HeapError> {
    Ok(heap.get(r)?.to_string())
}

/// Copy `r` into a new graph that shares nothing with the original, apart from instance definitions
/// and what objects only point at (function bodies, defining contexts and ASTs) when those were not
/// copied too. A copied module takes its functions' bodies and contexts along. Objects reachable
/// twice are copied once, and cycles are copied as cycles. On error nothing is left allocated.
pub fn deep_copy(heap: &mut Heap, r: &HeapRef) -> Result<HeapRef, HeapError> {
    DeepCopier::new(heap).copy_object(r)
}

/// Copy the top level of `r`. Arrays and dicts share their elements with the original, modules
/// share their tokens and AST and get a context sharing the original's values. Nested objects of
/// the other variants get shallow copies of their own, and struct contexts are shallow copied.
pub fn shallow_copy(heap: &mut Heap, r: &HeapRef) -> Result<HeapRef, HeapError> {
    let object = heap.get(r)?.clone();
    let copied = match object {
        Object::Nil
        | Object::Int(_)
        | Object::Float(_)
        | Object::Bool(_)
        | Object::Identifier(_)
        | Object::Unicode(_)
        | Object::Array(_)
        | Object::Dict(_)
        | Object::Type(_) => object,
        Object::Module(module) => {
            let context = module.context.borrow().shallow_copy(heap).into_ref();
            Object::Module(Module { context, ..module })
        }
        Object::Func(func) => Object::Func(Func {
            name: shallow_copy(heap, &func.name)?,
            args: shallow_copy(heap, &func.args)?,
            extends: func
                .extends
                .as_ref()
                .map(|e| shallow_copy(heap, e))
                .transpose()?,
            ..func
        }),
        Object::Chain(chain) => {
            let operand = shallow_copy(heap, &chain.operand)?;
            let mut chain_objs = Vec::with_capacity(chain.chain_objs.len());
            for co in &chain.chain_objs {
                chain_objs.push(ChainObject {
                    kind: co.kind,
                    operand: shallow_copy(heap, &co.operand)?,
                });
            }
            Object::Chain(Chain {
                operand,
                chain_objs,
            })
        }
        Object::DefStruct(def) => {
            let context = def.context.borrow().shallow_copy(heap).into_ref();
            Object::DefStruct(DefStruct {
                identifier: shallow_copy(heap, &def.identifier)?,
                ast: def.ast,
                context,
            })
        }
        Object::ObjectInstance(instance) => {
            let struct_context = instance.struct_context.borrow().shallow_copy(heap).into_ref();
            Object::ObjectInstance(ObjectInstance {
                struct_context,
                ..instance
            })
        }
        Object::OwnersMethod(method) => Object::OwnersMethod(OwnersMethod {
            owner: shallow_copy(heap, &method.owner)?,
            method_name: method.method_name,
        }),
        Object::BuiltinFunc(builtin) => Object::BuiltinFunc(BuiltinFunc {
            owner: builtin
                .owner
                .as_ref()
                .map(|o| shallow_copy(heap, o))
                .transpose()?,
            name: builtin.name,
        }),
    };
    heap.alloc(copied)
}

// Deep copy state. Every source object already copied, by identity, so shared objects stay shared
// and cycles end. Contexts, function bodies and ASTs duplicated along the way are remembered too,
// so that copied functions, identifiers and structs point at the copies instead of the originals.
pub(crate) struct DeepCopier<'h> {
    heap: &'h mut Heap,
    seen: FxHashMap<usize, HeapRef>,
    allocated: Vec<HeapRef>,
    contexts: FxHashMap<usize, Weak<RefCell<Context>>>,
    bodies: FxHashMap<usize, Weak<NodeArray>>,
    block_maps: FxHashMap<usize, Weak<BlockMap>>,
    asts: FxHashMap<usize, Weak<Ast>>,
}

impl<'h> DeepCopier<'h> {
    pub(crate) fn new(heap: &'h mut Heap) -> DeepCopier<'h> {
        DeepCopier {
            heap,
            seen: FxHashMap::default(),
            allocated: Vec::new(),
            contexts: FxHashMap::default(),
            bodies: FxHashMap::default(),
            block_maps: FxHashMap::default(),
            asts: FxHashMap::default(),
        }
    }

    pub(crate) fn copy_object(mut self, r: &HeapRef) -> Result<HeapRef, HeapError> {
        let result = self.copy(r);
        self.finish(result)
    }

    pub(crate) fn copy_context(mut self, context: &Context) -> Result<Context, HeapError> {
        let result = self.scopes(context).map(|scopes| context.with_scopes(scopes));
        self.finish(result)
    }

    // A failed copy leaves nothing behind on the heap.
    fn finish<T>(mut self, result: Result<T, HeapError>) -> Result<T, HeapError> {
        if result.is_err() {
            self.heap.discard(&self.allocated);
        }
        result
    }

    fn copy(&mut self, r: &HeapRef) -> Result<HeapRef, HeapError> {
        if let Some(copied) = self.seen.get(&r.id()) {
            return Ok(copied.clone());
        }
        let object = self.heap.get(r)?.clone();
        // the placeholder is what a cycle back to `r` will find
        let target = self.heap.alloc(Object::Nil)?;
        self.allocated.push(target.clone());
        self.seen.insert(r.id(), target.clone());

        let copied = match object {
            Object::Nil
            | Object::Int(_)
            | Object::Float(_)
            | Object::Bool(_)
            | Object::Unicode(_)
            | Object::Type(_) => object,
            Object::Identifier(ident) => Object::Identifier(Identifier {
                context: self.remap_context(ident.context),
                name: ident.name,
            }),
            Object::Array(elems) => Object::Array(self.copy_all(&elems)?),
            Object::Dict(items) => {
                let mut copied = Vec::with_capacity(items.len());
                for (key, value) in &items {
                    copied.push((key.clone(), self.copy(value)?));
                }
                Object::Dict(copied)
            }
            Object::Func(func) => Object::Func(Func {
                name: self.copy(&func.name)?,
                args: self.copy(&func.args)?,
                extends: self.copy_opt(func.extends.as_ref())?,
                suites: remap(&self.bodies, func.suites),
                blocks: remap(&self.block_maps, func.blocks),
                context: self.remap_context(func.context),
                is_met: func.is_met,
            }),
            Object::Chain(chain) => {
                let operand = self.copy(&chain.operand)?;
                let mut chain_objs = Vec::with_capacity(chain.chain_objs.len());
                for co in &chain.chain_objs {
                    chain_objs.push(ChainObject {
                        kind: co.kind,
                        operand: self.copy(&co.operand)?,
                    });
                }
                Object::Chain(Chain {
                    operand,
                    chain_objs,
                })
            }
            Object::Module(module) => {
                // the AST goes first, so functions in the context find their copied bodies
                let ast = Rc::new((*module.ast).clone());
                self.map_ast(&module.ast, &ast);
                let context = self.context(&module.context)?;
                Object::Module(Module {
                    tokens: Rc::new((*module.tokens).clone()),
                    ast,
                    context,
                    ..module
                })
            }
            Object::DefStruct(def) => {
                let context = self.context(&def.context)?;
                Object::DefStruct(DefStruct {
                    identifier: self.copy(&def.identifier)?,
                    ast: remap(&self.asts, def.ast),
                    context,
                })
            }
            Object::ObjectInstance(instance) => {
                let struct_context = self.context(&instance.struct_context)?;
                Object::ObjectInstance(ObjectInstance {
                    ast: remap(&self.asts, instance.ast),
                    struct_context,
                    def_obj: instance.def_obj,
                })
            }
            Object::OwnersMethod(method) => Object::OwnersMethod(OwnersMethod {
                owner: self.copy(&method.owner)?,
                method_name: method.method_name,
            }),
            Object::BuiltinFunc(builtin) => Object::BuiltinFunc(BuiltinFunc {
                owner: self.copy_opt(builtin.owner.as_ref())?,
                name: builtin.name,
            }),
        };
        self.heap.replace(&target, copied)?;
        Ok(target)
    }

    fn copy_all(&mut self, refs: &[HeapRef]) -> Result<Vec<HeapRef>, HeapError> {
        refs.iter().map(|r| self.copy(r)).collect()
    }

    fn copy_opt(&mut self, r: Option<&HeapRef>) -> Result<Option<HeapRef>, HeapError> {
        r.map(|r| self.copy(r)).transpose()
    }

    // The copy is registered before its variables are copied, since they may point back at it.
    fn context(&mut self, context: &ContextRef) -> Result<ContextRef, HeapError> {
        let key = Rc::as_ptr(context) as usize;
        if let Some(copied) = self.contexts.get(&key).and_then(Weak::upgrade) {
            return Ok(copied);
        }
        let copied = context.borrow().with_scopes(Vec::new()).into_ref();
        self.contexts.insert(key, Rc::downgrade(&copied));
        let scopes = self.scopes(&context.borrow())?;
        copied.borrow_mut().set_scopes(scopes);
        Ok(copied)
    }

    fn scopes(&mut self, context: &Context) -> Result<Vec<Varmap>, HeapError> {
        let mut scopes = Vec::with_capacity(context.scopes().len());
        for scope in context.scopes() {
            let mut copied = Varmap::default();
            for (name, value) in scope {
                let value = self.copy(value)?;
                self.heap.inc_ref(&value);
                copied.insert(name.clone(), value);
            }
            scopes.push(copied);
        }
        Ok(scopes)
    }

    // Pair every function definition of `old` with its clone in `new`.
    fn map_ast(&mut self, old: &Rc<Ast>, new: &Rc<Ast>) {
        self.asts.insert(Rc::as_ptr(old) as usize, Rc::downgrade(new));
        let (old_root, new_root) = match (&old.root, &new.root) {
            (Some(old_root), Some(new_root)) => (old_root, new_root),
            _ => return,
        };
        let defs = old_root
            .find_all(NodeType::FuncDef)
            .into_iter()
            .zip(new_root.find_all(NodeType::FuncDef));
        for (old_def, new_def) in defs {
            if let (NodeKind::FuncDef(old_def), NodeKind::FuncDef(new_def)) =
                (&old_def.kind, &new_def.kind)
            {
                self.bodies.insert(
                    Rc::as_ptr(&old_def.contents) as usize,
                    Rc::downgrade(&new_def.contents),
                );
                self.block_maps.insert(
                    Rc::as_ptr(&old_def.blocks) as usize,
                    Rc::downgrade(&new_def.blocks),
                );
            }
        }
    }

    fn remap_context(&self, context: Weak<RefCell<Context>>) -> Weak<RefCell<Context>> {
        remap(&self.contexts, context)
    }
}

// The copy of what `weak` points at, if one was made during this deep copy.
fn remap<T>(copies: &FxHashMap<usize, Weak<T>>, weak: Weak<T>) -> Weak<T> {
    match copies.get(&(weak.as_ptr() as usize)) {
        Some(copied) => copied.clone(),
        None => weak,
    }
}
