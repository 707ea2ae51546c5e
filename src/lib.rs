//! The lib crate for the Pad template language front end: a scanner, a backtracking parser that
//! builds the AST, and the reference-counted object model the evaluator works on.
#![warn(missing_debug_implementations, missing_docs, rust_2018_idioms)]

/// Errors, and the ordered stack the compiler reports them on.
pub mod error;

/// scanner turns template source into tokens.
pub mod scanner;

/// Syntax tree nodes.
pub mod ast;

/// Takes tokens from the scanner and builds the AST.
pub mod compiler;

/// heap allocates and counts runtime objects.
pub mod heap;

/// Runtime values and how they are copied.
pub mod object;

/// Variable scopes.
pub mod context;

/// Loading source units as module objects.
pub mod module;
