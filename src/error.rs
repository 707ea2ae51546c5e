use std::fmt::Display;

use thiserror::Error;

use crate::scanner::SourceLocation;

/// A single diagnostic: where it happened (if we know) and what went wrong.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEntry {
    /// None when there was no token to blame, e.g. an empty program.
    pub location: Option<SourceLocation>,
    /// Human readable message.
    pub message: String,
}

impl ErrorEntry {
    /// New entry with the given location and message.
    pub fn new(location: Option<SourceLocation>, message: impl Into<String>) -> ErrorEntry {
        ErrorEntry {
            location,
            message: message.into(),
        }
    }
}

impl Display for ErrorEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{}: {}", loc, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Ordered, append-only list of error entries. Entries keep the order they were pushed in,
/// so an inner failure shows up before the outer rules that gave up because of it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorStack(Vec<ErrorEntry>);

impl ErrorStack {
    /// A new, empty stack.
    pub fn new() -> ErrorStack {
        ErrorStack(Vec::new())
    }

    /// Push an entry onto the end of the stack.
    pub fn push(&mut self, location: Option<SourceLocation>, message: impl Into<String>) {
        self.0.push(ErrorEntry::new(location, message));
    }

    /// Move every entry of `other` onto the end of this stack.
    pub fn extend(&mut self, other: ErrorStack) {
        self.0.extend(other.0);
    }

    #[allow(missing_docs)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The first (innermost) entry.
    pub fn first(&self) -> Option<&ErrorEntry> {
        self.0.first()
    }

    /// The last (outermost) entry.
    pub fn last(&self) -> Option<&ErrorEntry> {
        self.0.last()
    }

    #[allow(missing_docs)]
    pub fn iter(&self) -> impl Iterator<Item = &ErrorEntry> + '_ {
        self.0.iter()
    }

    /// Only the top level driver should call this, between independent parses.
    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl Display for ErrorStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for entry in &self.0 {
            writeln!(f, "{}", entry)?;
        }
        Ok(())
    }
}

/// A hard failure while compiling: a partially matched construct is missing a required piece.
/// Carries every message produced on the way out, innermost first.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("syntax error: {}", .0.first().map(|e| e.to_string()).unwrap_or_default())]
pub struct SyntaxError(pub ErrorStack);

impl SyntaxError {
    /// A syntax error with a single message.
    pub fn new(location: Option<SourceLocation>, message: impl Into<String>) -> SyntaxError {
        let mut stack = ErrorStack::new();
        stack.push(location, message);
        SyntaxError(stack)
    }

    /// Append an outer context message, keeping the inner ones first.
    pub fn with(mut self, location: Option<SourceLocation>, message: impl Into<String>) -> SyntaxError {
        self.0.push(location, message);
        self
    }

    /// Unwrap into the plain stack of entries.
    pub fn into_stack(self) -> ErrorStack {
        self.0
    }
}

/// Errors from turning source text into tokens.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{location}: {message}")]
pub struct TokenizeError {
    /// Where the scanner was when it gave up.
    pub location: SourceLocation,
    #[allow(missing_docs)]
    pub message: String,
}

/// Errors from the object heap.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum HeapError {
    /// The heap was configured with an object limit and it was reached.
    #[error("out of memory: heap limit of {0} objects reached")]
    OutOfMemory(usize),
    /// The handle points to an object that has already been released.
    #[error("reference to a released object")]
    DeadReference,
}

/// Errors from loading a source unit into a module object.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[allow(missing_docs)]
    #[error("failed to tokenize: {0}")]
    Tokenize(#[from] TokenizeError),
    /// The compiler reported errors; all of them are kept.
    #[error("failed to compile:\n{0}")]
    Syntax(ErrorStack),
    #[allow(missing_docs)]
    #[error("heap error: {0}")]
    Heap(#[from] HeapError),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_syntax_error_keeps_inner_first() {
        let err = SyntaxError::new(None, "not found colon in if statement")
            .with(None, "failed to compile elif statement");
        let stack = err.into_stack();
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.first().unwrap().message, "not found colon in if statement");
        assert_eq!(stack.last().unwrap().message, "failed to compile elif statement");
    }

    #[test]
    fn test_display_without_location() {
        let mut stack = ErrorStack::new();
        stack.push(None, "not found blocks");
        assert_eq!(stack.to_string(), "not found blocks\n");
    }
}
