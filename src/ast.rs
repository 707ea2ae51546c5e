// The AST is a plain owned tree: every node belongs to exactly one parent, so dropping the root
// frees the whole thing and dropping a half-built node on an early return frees its children.
//
// The one exception is a function definition: its body and its block map sit behind `Rc` so that
// function objects built by an evaluator can hold `Weak` references to them without owning them.

use std::fmt::Display;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::error::ErrorStack;
use crate::scanner::SourceLocation;

/// Stable tag for each node variant. This is what an evaluator switches on.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Program,
    Blocks,
    CodeBlock,
    RefBlock,
    TextBlock,
    Elems,
    Stmt,
    ImportStmt,
    ImportAsStmt,
    FromImportStmt,
    ImportVars,
    ImportVar,
    IfStmt,
    ElifStmt,
    ElseStmt,
    ForStmt,
    BreakStmt,
    ContinueStmt,
    ReturnStmt,
    BlockStmt,
    InjectStmt,
    GlobalStmt,
    NonlocalStmt,
    Struct,
    Content,
    Formula,
    MultiAssign,
    AssignList,
    Assign,
    SimpleAssign,
    TestList,
    CallArgs,
    Test,
    OrTest,
    AndTest,
    NotTest,
    Comparison,
    Expr,
    Term,
    Negative,
    Chain,
    Asscalc,
    Factor,
    Atom,
    Augassign,
    CompOp,
    Nil,
    Digit,
    Float,
    String,
    Identifier,
    Array,
    ArrayElems,
    Dict,
    DictElems,
    DictElem,
    AddSubOp,
    MulDivOp,
    Def,
    FuncDef,
    FuncDefParams,
    FuncDefArgs,
    FuncExtends,
    False,
    True,
}

impl Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NodeType::Program => "program",
            NodeType::Blocks => "blocks",
            NodeType::CodeBlock => "code_block",
            NodeType::RefBlock => "ref_block",
            NodeType::TextBlock => "text_block",
            NodeType::Elems => "elems",
            NodeType::Stmt => "stmt",
            NodeType::ImportStmt => "import_stmt",
            NodeType::ImportAsStmt => "import_as_stmt",
            NodeType::FromImportStmt => "from_import_stmt",
            NodeType::ImportVars => "import_vars",
            NodeType::ImportVar => "import_var",
            NodeType::IfStmt => "if_stmt",
            NodeType::ElifStmt => "elif_stmt",
            NodeType::ElseStmt => "else_stmt",
            NodeType::ForStmt => "for_stmt",
            NodeType::BreakStmt => "break_stmt",
            NodeType::ContinueStmt => "continue_stmt",
            NodeType::ReturnStmt => "return_stmt",
            NodeType::BlockStmt => "block_stmt",
            NodeType::InjectStmt => "inject_stmt",
            NodeType::GlobalStmt => "global_stmt",
            NodeType::NonlocalStmt => "nonlocal_stmt",
            NodeType::Struct => "struct",
            NodeType::Content => "content",
            NodeType::Formula => "formula",
            NodeType::MultiAssign => "multi_assign",
            NodeType::AssignList => "assign_list",
            NodeType::Assign => "assign",
            NodeType::SimpleAssign => "simple_assign",
            NodeType::TestList => "test_list",
            NodeType::CallArgs => "call_args",
            NodeType::Test => "test",
            NodeType::OrTest => "or_test",
            NodeType::AndTest => "and_test",
            NodeType::NotTest => "not_test",
            NodeType::Comparison => "comparison",
            NodeType::Expr => "expr",
            NodeType::Term => "term",
            NodeType::Negative => "negative",
            NodeType::Chain => "chain",
            NodeType::Asscalc => "asscalc",
            NodeType::Factor => "factor",
            NodeType::Atom => "atom",
            NodeType::Augassign => "augassign",
            NodeType::CompOp => "comp_op",
            NodeType::Nil => "nil",
            NodeType::Digit => "digit",
            NodeType::Float => "float",
            NodeType::String => "string",
            NodeType::Identifier => "identifier",
            NodeType::Array => "array",
            NodeType::ArrayElems => "array_elems",
            NodeType::Dict => "dict",
            NodeType::DictElems => "dict_elems",
            NodeType::DictElem => "dict_elem",
            NodeType::AddSubOp => "add_sub_op",
            NodeType::MulDivOp => "mul_div_op",
            NodeType::Def => "def",
            NodeType::FuncDef => "func_def",
            NodeType::FuncDefParams => "func_def_params",
            NodeType::FuncDefArgs => "func_def_args",
            NodeType::FuncExtends => "func_extends",
            NodeType::False => "false",
            NodeType::True => "true",
        };
        f.write_str(name)
    }
}

/// Operators carried by the operator nodes.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    Eq,
    NotEq,
    Lte,
    Gte,
    Lt,
    Gt,
}

impl Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Mod => "%",
            Op::AddAssign => "+=",
            Op::SubAssign => "-=",
            Op::MulAssign => "*=",
            Op::DivAssign => "/=",
            Op::ModAssign => "%=",
            Op::Eq => "==",
            Op::NotEq => "!=",
            Op::Lte => "<=",
            Op::Gte => ">=",
            Op::Lt => "<",
            Op::Gt => ">",
        };
        f.write_str(symbol)
    }
}

/// Owned, ordered list of nodes.
#[derive(Debug, Clone, Default)]
pub struct NodeArray(Vec<Node>);

impl NodeArray {
    #[allow(missing_docs)]
    pub fn new() -> NodeArray {
        NodeArray(Vec::new())
    }

    /// Move a node onto the end.
    pub fn push(&mut self, node: Node) {
        self.0.push(node);
    }

    /// Move the last node back out.
    pub fn pop(&mut self) -> Option<Node> {
        self.0.pop()
    }

    #[allow(missing_docs)]
    pub fn get(&self, index: usize) -> Option<&Node> {
        self.0.get(index)
    }

    #[allow(missing_docs)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[allow(missing_docs)]
    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.0.iter()
    }
}

impl From<Vec<Node>> for NodeArray {
    fn from(nodes: Vec<Node>) -> Self {
        NodeArray(nodes)
    }
}

/// Which postfix operation a chain node applies.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainNodeKind {
    Dot,
    Index,
    Call,
}

/// One postfix operation of a chain: `.factor`, `[simple_assign]` or `(call_args)`.
#[allow(missing_docs)]
#[derive(Debug, Clone)]
pub struct ChainNode {
    pub kind: ChainNodeKind,
    pub node: Node,
}

/// Ordered postfix operations applied to a chain's primary factor.
pub type ChainNodes = Vec<ChainNode>;

/// Block statements of one function definition, by block name.
pub type BlockMap = FxHashMap<String, Node>;

/// Payload shared by `if` and `elif`.
#[allow(missing_docs)]
#[derive(Debug, Clone)]
pub struct IfStmt {
    pub test: Box<Node>,
    pub contents: NodeArray,
    pub elif: Option<Box<Node>>,
    pub else_: Option<Box<Node>>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone)]
pub struct ForStmt {
    pub init: Option<Box<Node>>,
    pub comp: Option<Box<Node>>,
    pub update: Option<Box<Node>>,
    pub contents: NodeArray,
}

/// A `def` or `met` definition.
#[derive(Debug)]
pub struct FuncDef {
    #[allow(missing_docs)]
    pub identifier: Box<Node>,
    /// A `FuncDefParams` node.
    pub params: Box<Node>,
    /// A `FuncExtends` node.
    pub extends: Option<Box<Node>>,
    /// Function body, a list of `Content` nodes.
    pub contents: Rc<NodeArray>,
    /// Every `block` statement in the body, by name.
    pub blocks: Rc<BlockMap>,
    #[allow(missing_docs)]
    pub is_met: bool,
}

// Cloning a definition gives it its own body. Function objects pointing at the old body keep
// pointing at the old body.
impl Clone for FuncDef {
    fn clone(&self) -> Self {
        FuncDef {
            identifier: self.identifier.clone(),
            params: self.params.clone(),
            extends: self.extends.clone(),
            contents: Rc::new((*self.contents).clone()),
            blocks: Rc::new((*self.blocks).clone()),
            is_met: self.is_met,
        }
    }
}

/// The node payloads, one variant per node type.
#[allow(missing_docs)]
#[derive(Debug, Clone)]
pub enum NodeKind {
    Program { blocks: Box<Node> },
    /// `block` is a code, ref or text block.
    Blocks { block: Box<Node>, next: Option<Box<Node>> },
    CodeBlock { elems: Option<Box<Node>> },
    RefBlock { formula: Box<Node> },
    TextBlock { text: String },
    /// `elem` is a def, stmt, struct or formula.
    Elems { elem: Box<Node>, next: Option<Box<Node>> },
    Stmt { stmt: Box<Node> },
    ImportStmt { stmt: Box<Node> },
    ImportAsStmt { path: Box<Node>, alias: Box<Node> },
    FromImportStmt { path: Box<Node>, vars: Box<Node> },
    ImportVars { vars: NodeArray },
    ImportVar { identifier: Box<Node>, alias: Option<Box<Node>> },
    IfStmt(IfStmt),
    ElifStmt(IfStmt),
    ElseStmt { contents: NodeArray },
    ForStmt(ForStmt),
    BreakStmt,
    ContinueStmt,
    ReturnStmt { formula: Option<Box<Node>> },
    BlockStmt { identifier: Box<Node>, contents: NodeArray },
    InjectStmt { identifier: Box<Node>, contents: NodeArray },
    GlobalStmt { identifiers: NodeArray },
    NonlocalStmt { identifiers: NodeArray },
    Struct { identifier: Box<Node>, elems: Option<Box<Node>> },
    Content { elems: Option<Box<Node>>, blocks: Option<Box<Node>> },
    /// Either an assign list or a multi assign.
    Formula { formula: Box<Node> },
    MultiAssign { nodes: NodeArray },
    AssignList { nodes: NodeArray },
    Assign { nodes: NodeArray },
    SimpleAssign { nodes: NodeArray },
    TestList { nodes: NodeArray },
    CallArgs { nodes: NodeArray },
    Test { or_test: Box<Node> },
    OrTest { nodes: NodeArray },
    AndTest { nodes: NodeArray },
    NotTest { not_test: Option<Box<Node>>, comparison: Option<Box<Node>> },
    /// Operands interleaved with `CompOp` nodes.
    Comparison { nodes: NodeArray },
    /// Operands interleaved with `AddSubOp` nodes.
    Expr { nodes: NodeArray },
    /// Operands interleaved with `MulDivOp` nodes.
    Term { nodes: NodeArray },
    Negative { is_negative: bool, chain: Box<Node> },
    Chain { factor: Box<Node>, chain_nodes: ChainNodes },
    /// Operands interleaved with `Augassign` nodes.
    Asscalc { nodes: NodeArray },
    Factor { atom: Option<Box<Node>>, formula: Option<Box<Node>> },
    Atom { value: Box<Node> },
    Augassign { op: Op },
    CompOp { op: Op },
    Nil,
    Digit { value: i64 },
    Float { value: f64 },
    String { value: String },
    Identifier { name: String },
    Array { elems: Box<Node> },
    ArrayElems { nodes: NodeArray },
    Dict { elems: Box<Node> },
    DictElems { nodes: NodeArray },
    DictElem { key: Box<Node>, value: Box<Node> },
    AddSubOp { op: Op },
    MulDivOp { op: Op },
    Def { func_def: Box<Node> },
    FuncDef(FuncDef),
    FuncDefParams { args: Box<Node> },
    FuncDefArgs { identifiers: NodeArray },
    FuncExtends { identifier: Box<Node> },
    False,
    True,
}

#[cfg(test)]
thread_local! {
    static LIVE_NODES: std::cell::Cell<isize> = std::cell::Cell::new(0);
}

/// Number of nodes alive on this thread. Used by tests to check nothing leaks or double frees.
#[cfg(test)]
pub(crate) fn live_nodes() -> isize {
    LIVE_NODES.with(|c| c.get())
}

// Counts node constructions and drops under test, does nothing otherwise.
#[derive(Debug)]
struct LiveNode;

impl LiveNode {
    fn new() -> LiveNode {
        #[cfg(test)]
        LIVE_NODES.with(|c| c.set(c.get() + 1));
        LiveNode
    }
}

impl Clone for LiveNode {
    fn clone(&self) -> Self {
        LiveNode::new()
    }
}

impl Drop for LiveNode {
    fn drop(&mut self) {
        #[cfg(test)]
        LIVE_NODES.with(|c| c.set(c.get() - 1));
    }
}

/// A node of the tree, with the location of the token it was built from.
#[derive(Debug)]
pub struct Node {
    #[allow(missing_docs)]
    pub kind: NodeKind,
    #[allow(missing_docs)]
    pub location: Option<SourceLocation>,
    live: LiveNode,
}

// `Elems` and `Blocks` chains are as long as the program, so they are cloned and dropped in a loop
// instead of one box inside the other.
impl Drop for Node {
    fn drop(&mut self) {
        let mut next = self.kind.take_next();
        while let Some(mut node) = next {
            next = node.kind.take_next();
        }
    }
}

impl Clone for Node {
    fn clone(&self) -> Self {
        let mut head = self.clone_link();
        let mut links = Vec::new();
        let mut cur = self.kind.next();
        while let Some(node) = cur {
            links.push(node.clone_link());
            cur = node.kind.next();
        }
        let mut tail = None;
        while let Some(mut link) = links.pop() {
            link.kind.set_next(tail);
            tail = Some(Box::new(link));
        }
        head.kind.set_next(tail);
        head
    }
}

impl Node {
    // A copy of this node without the rest of its chain.
    fn clone_link(&self) -> Node {
        let kind = match &self.kind {
            NodeKind::Elems { elem, .. } => NodeKind::Elems {
                elem: elem.clone(),
                next: None,
            },
            NodeKind::Blocks { block, .. } => NodeKind::Blocks {
                block: block.clone(),
                next: None,
            },
            kind => kind.clone(),
        };
        Node::new(kind, self.location.clone())
    }
}

impl NodeKind {
    fn next(&self) -> Option<&Node> {
        match self {
            NodeKind::Elems { next, .. } | NodeKind::Blocks { next, .. } => next.as_deref(),
            _ => None,
        }
    }

    fn take_next(&mut self) -> Option<Box<Node>> {
        match self {
            NodeKind::Elems { next, .. } | NodeKind::Blocks { next, .. } => next.take(),
            _ => None,
        }
    }

    fn set_next(&mut self, tail: Option<Box<Node>>) {
        if let NodeKind::Elems { next, .. } | NodeKind::Blocks { next, .. } = self {
            *next = tail;
        }
    }
}

impl Node {
    #[allow(missing_docs)]
    pub fn new(kind: NodeKind, location: Option<SourceLocation>) -> Node {
        Node {
            kind,
            location,
            live: LiveNode::new(),
        }
    }

    /// The stable tag of this node.
    pub fn node_type(&self) -> NodeType {
        match &self.kind {
            NodeKind::Program { .. } => NodeType::Program,
            NodeKind::Blocks { .. } => NodeType::Blocks,
            NodeKind::CodeBlock { .. } => NodeType::CodeBlock,
            NodeKind::RefBlock { .. } => NodeType::RefBlock,
            NodeKind::TextBlock { .. } => NodeType::TextBlock,
            NodeKind::Elems { .. } => NodeType::Elems,
            NodeKind::Stmt { .. } => NodeType::Stmt,
            NodeKind::ImportStmt { .. } => NodeType::ImportStmt,
            NodeKind::ImportAsStmt { .. } => NodeType::ImportAsStmt,
            NodeKind::FromImportStmt { .. } => NodeType::FromImportStmt,
            NodeKind::ImportVars { .. } => NodeType::ImportVars,
            NodeKind::ImportVar { .. } => NodeType::ImportVar,
            NodeKind::IfStmt(_) => NodeType::IfStmt,
            NodeKind::ElifStmt(_) => NodeType::ElifStmt,
            NodeKind::ElseStmt { .. } => NodeType::ElseStmt,
            NodeKind::ForStmt(_) => NodeType::ForStmt,
            NodeKind::BreakStmt => NodeType::BreakStmt,
            NodeKind::ContinueStmt => NodeType::ContinueStmt,
            NodeKind::ReturnStmt { .. } => NodeType::ReturnStmt,
            NodeKind::BlockStmt { .. } => NodeType::BlockStmt,
            NodeKind::InjectStmt { .. } => NodeType::InjectStmt,
            NodeKind::GlobalStmt { .. } => NodeType::GlobalStmt,
            NodeKind::NonlocalStmt { .. } => NodeType::NonlocalStmt,
            NodeKind::Struct { .. } => NodeType::Struct,
            NodeKind::Content { .. } => NodeType::Content,
            NodeKind::Formula { .. } => NodeType::Formula,
            NodeKind::MultiAssign { .. } => NodeType::MultiAssign,
            NodeKind::AssignList { .. } => NodeType::AssignList,
            NodeKind::Assign { .. } => NodeType::Assign,
            NodeKind::SimpleAssign { .. } => NodeType::SimpleAssign,
            NodeKind::TestList { .. } => NodeType::TestList,
            NodeKind::CallArgs { .. } => NodeType::CallArgs,
            NodeKind::Test { .. } => NodeType::Test,
            NodeKind::OrTest { .. } => NodeType::OrTest,
            NodeKind::AndTest { .. } => NodeType::AndTest,
            NodeKind::NotTest { .. } => NodeType::NotTest,
            NodeKind::Comparison { .. } => NodeType::Comparison,
            NodeKind::Expr { .. } => NodeType::Expr,
            NodeKind::Term { .. } => NodeType::Term,
            NodeKind::Negative { .. } => NodeType::Negative,
            NodeKind::Chain { .. } => NodeType::Chain,
            NodeKind::Asscalc { .. } => NodeType::Asscalc,
            NodeKind::Factor { .. } => NodeType::Factor,
            NodeKind::Atom { .. } => NodeType::Atom,
            NodeKind::Augassign { .. } => NodeType::Augassign,
            NodeKind::CompOp { .. } => NodeType::CompOp,
            NodeKind::Nil => NodeType::Nil,
            NodeKind::Digit { .. } => NodeType::Digit,
            NodeKind::Float { .. } => NodeType::Float,
            NodeKind::String { .. } => NodeType::String,
            NodeKind::Identifier { .. } => NodeType::Identifier,
            NodeKind::Array { .. } => NodeType::Array,
            NodeKind::ArrayElems { .. } => NodeType::ArrayElems,
            NodeKind::Dict { .. } => NodeType::Dict,
            NodeKind::DictElems { .. } => NodeType::DictElems,
            NodeKind::DictElem { .. } => NodeType::DictElem,
            NodeKind::AddSubOp { .. } => NodeType::AddSubOp,
            NodeKind::MulDivOp { .. } => NodeType::MulDivOp,
            NodeKind::Def { .. } => NodeType::Def,
            NodeKind::FuncDef(_) => NodeType::FuncDef,
            NodeKind::FuncDefParams { .. } => NodeType::FuncDefParams,
            NodeKind::FuncDefArgs { .. } => NodeType::FuncDefArgs,
            NodeKind::FuncExtends { .. } => NodeType::FuncExtends,
            NodeKind::False => NodeType::False,
            NodeKind::True => NodeType::True,
        }
    }

    /// Direct children, in source order. Block map entries of a function definition are copies
    /// of block statements already reachable through its body, so they are not listed.
    pub fn children(&self) -> Vec<&Node> {
        fn opt(node: &Option<Box<Node>>) -> Option<&Node> {
            node.as_deref()
        }
        match &self.kind {
            NodeKind::Program { blocks } => vec![&**blocks],
            NodeKind::Blocks { block, next } => std::iter::once(&**block).chain(opt(next)).collect(),
            NodeKind::CodeBlock { elems } => opt(elems).into_iter().collect(),
            NodeKind::RefBlock { formula } => vec![&**formula],
            NodeKind::Elems { elem, next } => std::iter::once(&**elem).chain(opt(next)).collect(),
            NodeKind::Stmt { stmt } | NodeKind::ImportStmt { stmt } => vec![&**stmt],
            NodeKind::ImportAsStmt { path, alias } => vec![&**path, &**alias],
            NodeKind::FromImportStmt { path, vars } => vec![&**path, &**vars],
            NodeKind::ImportVar { identifier, alias } => {
                std::iter::once(&**identifier).chain(opt(alias)).collect()
            }
            NodeKind::IfStmt(s) | NodeKind::ElifStmt(s) => std::iter::once(&*s.test)
                .chain(s.contents.iter())
                .chain(opt(&s.elif))
                .chain(opt(&s.else_))
                .collect(),
            NodeKind::ForStmt(s) => opt(&s.init)
                .into_iter()
                .chain(opt(&s.comp))
                .chain(opt(&s.update))
                .chain(s.contents.iter())
                .collect(),
            NodeKind::ReturnStmt { formula } => opt(formula).into_iter().collect(),
            NodeKind::BlockStmt {
                identifier,
                contents,
            }
            | NodeKind::InjectStmt {
                identifier,
                contents,
            } => std::iter::once(&**identifier).chain(contents.iter()).collect(),
            NodeKind::Struct { identifier, elems } => {
                std::iter::once(&**identifier).chain(opt(elems)).collect()
            }
            NodeKind::Content { elems, blocks } => opt(elems).into_iter().chain(opt(blocks)).collect(),
            NodeKind::Formula { formula } => vec![&**formula],
            NodeKind::Test { or_test } => vec![&**or_test],
            NodeKind::NotTest {
                not_test,
                comparison,
            } => opt(not_test).into_iter().chain(opt(comparison)).collect(),
            NodeKind::Negative { chain, .. } => vec![&**chain],
            NodeKind::Chain {
                factor,
                chain_nodes,
            } => std::iter::once(&**factor)
                .chain(chain_nodes.iter().map(|cn| &cn.node))
                .collect(),
            NodeKind::Factor { atom, formula } => opt(atom).into_iter().chain(opt(formula)).collect(),
            NodeKind::Atom { value } => vec![&**value],
            NodeKind::Array { elems } | NodeKind::Dict { elems } => vec![&**elems],
            NodeKind::DictElem { key, value } => vec![&**key, &**value],
            NodeKind::Def { func_def } => vec![&**func_def],
            NodeKind::FuncDef(def) => std::iter::once(&*def.identifier)
                .chain(std::iter::once(&*def.params))
                .chain(opt(&def.extends))
                .chain(def.contents.iter())
                .collect(),
            NodeKind::FuncDefParams { args } => vec![&**args],
            NodeKind::FuncExtends { identifier } => vec![&**identifier],
            NodeKind::ImportVars { vars: nodes }
            | NodeKind::ElseStmt { contents: nodes }
            | NodeKind::GlobalStmt { identifiers: nodes }
            | NodeKind::NonlocalStmt { identifiers: nodes }
            | NodeKind::MultiAssign { nodes }
            | NodeKind::AssignList { nodes }
            | NodeKind::Assign { nodes }
            | NodeKind::SimpleAssign { nodes }
            | NodeKind::TestList { nodes }
            | NodeKind::CallArgs { nodes }
            | NodeKind::OrTest { nodes }
            | NodeKind::AndTest { nodes }
            | NodeKind::Comparison { nodes }
            | NodeKind::Expr { nodes }
            | NodeKind::Term { nodes }
            | NodeKind::Asscalc { nodes }
            | NodeKind::ArrayElems { nodes }
            | NodeKind::DictElems { nodes }
            | NodeKind::FuncDefArgs { identifiers: nodes } => nodes.iter().collect(),
            NodeKind::TextBlock { .. }
            | NodeKind::BreakStmt
            | NodeKind::ContinueStmt
            | NodeKind::Augassign { .. }
            | NodeKind::CompOp { .. }
            | NodeKind::Nil
            | NodeKind::Digit { .. }
            | NodeKind::Float { .. }
            | NodeKind::String { .. }
            | NodeKind::Identifier { .. }
            | NodeKind::AddSubOp { .. }
            | NodeKind::MulDivOp { .. }
            | NodeKind::False
            | NodeKind::True => Vec::new(),
        }
    }

    /// This node and everything below it, in pre-order.
    pub fn descendants(&self) -> Vec<&Node> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            // push reversed so the leftmost child is visited first
            stack.extend(node.children().into_iter().rev());
        }
        out
    }

    /// Pre-order list of the nodes of the given type under (and including) this one.
    pub fn find_all(&self, typ: NodeType) -> Vec<&Node> {
        self.descendants()
            .into_iter()
            .filter(|n| n.node_type() == typ)
            .collect()
    }

    /// Name of an identifier node.
    pub fn identifier_name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Identifier { name } => Some(name),
            _ => None,
        }
    }
}

// Renders a compact s-expression, e.g. `digit(1)` or `chain(factor(atom(identifier(a))) .factor(..))`.
impl Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.node_type())?;
        match &self.kind {
            NodeKind::Elems { elem: first, .. } | NodeKind::Blocks { block: first, .. } => {
                write!(f, "({}", first)?;
                let mut depth = 1;
                let mut cur = self.kind.next();
                while let Some(node) = cur {
                    let item = match &node.kind {
                        NodeKind::Elems { elem, .. } => elem,
                        NodeKind::Blocks { block, .. } => block,
                        _ => break,
                    };
                    write!(f, " {}({}", node.node_type(), item)?;
                    depth += 1;
                    cur = node.kind.next();
                }
                write!(f, "{}", ")".repeat(depth))
            }
            NodeKind::TextBlock { text } => write!(f, "({:?})", text),
            NodeKind::Digit { value } => write!(f, "({})", value),
            NodeKind::Float { value } => write!(f, "({})", value),
            NodeKind::String { value } => write!(f, "({:?})", value),
            NodeKind::Identifier { name } => write!(f, "({})", name),
            NodeKind::Augassign { op }
            | NodeKind::CompOp { op }
            | NodeKind::AddSubOp { op }
            | NodeKind::MulDivOp { op } => write!(f, "({})", op),
            NodeKind::Negative { is_negative, chain } => {
                let sign = if *is_negative { "- " } else { "" };
                write!(f, "({}{})", sign, chain)
            }
            NodeKind::Chain {
                factor,
                chain_nodes,
            } => {
                write!(f, "({}", factor)?;
                for cn in chain_nodes {
                    match cn.kind {
                        ChainNodeKind::Dot => write!(f, " .{}", cn.node)?,
                        ChainNodeKind::Index => write!(f, " [{}]", cn.node)?,
                        ChainNodeKind::Call => write!(f, " ({})", cn.node)?,
                    }
                }
                write!(f, ")")
            }
            NodeKind::FuncDef(def) if def.is_met => {
                write!(f, "(met")?;
                for child in self.children() {
                    write!(f, " {}", child)?;
                }
                write!(f, ")")
            }
            _ => {
                let children = self.children();
                if children.is_empty() {
                    return Ok(());
                }
                write!(f, "(")?;
                for (i, child) in children.into_iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", child)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// The result of compiling one source unit: the tree (if any) and every error reported.
/// The tokens are not owned here.
#[derive(Debug, Clone, Default)]
pub struct Ast {
    /// The `Program` node, None if there was nothing to compile or compiling failed.
    pub root: Option<Node>,
    /// Errors in the order they were reported.
    pub errors: ErrorStack,
    /// Whether per-rule tracing was requested when this was compiled.
    pub debug: bool,
}

impl Ast {
    /// An empty AST, no root and no errors.
    pub fn new() -> Ast {
        Ast::default()
    }

    #[allow(missing_docs)]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Reset the error stack between independent compiles.
    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    /// Message of the first error, if any.
    pub fn first_error_message(&self) -> Option<&str> {
        self.errors.first().map(|e| e.message.as_str())
    }

    /// Message of the last error, if any.
    pub fn last_error_message(&self) -> Option<&str> {
        self.errors.last().map(|e| e.message.as_str())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ident(name: &str) -> Node {
        Node::new(
            NodeKind::Identifier {
                name: name.to_string(),
            },
            None,
        )
    }

    #[test]
    fn test_node_array_moves() {
        let mut arr = NodeArray::new();
        arr.push(ident("a"));
        arr.push(ident("b"));
        assert_eq!(arr.len(), 2);
        let b = arr.pop().unwrap();
        assert_eq!(b.identifier_name(), Some("b"));
        assert_eq!(arr.len(), 1);
        assert_eq!(arr.get(0).and_then(|n| n.identifier_name()), Some("a"));
    }

    #[test]
    fn test_drop_frees_every_node() {
        let before = live_nodes();
        {
            let args = Node::new(
                NodeKind::CallArgs {
                    nodes: vec![ident("x"), ident("y")].into(),
                },
                None,
            );
            let chain = Node::new(
                NodeKind::Chain {
                    factor: Box::new(ident("f")),
                    chain_nodes: vec![ChainNode {
                        kind: ChainNodeKind::Call,
                        node: args,
                    }],
                },
                None,
            );
            assert_eq!(live_nodes() - before, 5);
            let copy = chain.clone();
            assert_eq!(live_nodes() - before, 10);
            assert_eq!(copy.to_string(), "chain(identifier(f) (call_args(identifier(x) identifier(y))))");
        }
        assert_eq!(live_nodes(), before);
    }

    #[test]
    fn test_find_all_is_preorder() {
        let node = Node::new(
            NodeKind::TestList {
                nodes: vec![ident("a"), ident("b"), ident("c")].into(),
            },
            None,
        );
        let names: Vec<_> = node
            .find_all(NodeType::Identifier)
            .into_iter()
            .filter_map(|n| n.identifier_name())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_func_def_clone_owns_its_body() {
        let def = FuncDef {
            identifier: Box::new(ident("f")),
            params: Box::new(Node::new(
                NodeKind::FuncDefParams {
                    args: Box::new(Node::new(
                        NodeKind::FuncDefArgs {
                            identifiers: NodeArray::new(),
                        },
                        None,
                    )),
                },
                None,
            )),
            extends: None,
            contents: Rc::new(NodeArray::new()),
            blocks: Rc::new(BlockMap::default()),
            is_met: false,
        };
        let copy = def.clone();
        assert!(!Rc::ptr_eq(&def.contents, &copy.contents));
        assert!(!Rc::ptr_eq(&def.blocks, &copy.blocks));
    }
}
