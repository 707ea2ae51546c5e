// The compiler is a backtracking recursive-descent parser over a token slice.
//
// Every grammar rule returns a ParseResult:
//   Ok(Some(node)) - matched, cursor advanced past the consumed tokens
//   Ok(None)       - this alternative doesn't apply here, cursor untouched
//   Err(error)     - a construct was partially matched and is missing a required piece
//
// Rules go through `rule`, which restores the cursor on anything but a match. Partially built
// nodes are plain locals, so an early return frees them.

use log::debug;

use crate::{
    ast::{Ast, Node},
    error::SyntaxError,
    scanner::{SourceLocation, Token, TokenType},
};

mod expr;
mod stmt;
mod template;

type ParseResult<T = Node> = Result<Option<T>, SyntaxError>;

/// Knobs for a single compile.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    /// Log every rule entry and exit at trace level. Needs the `trace` feature.
    pub debug: bool,
    /// Accept a program that doesn't consume every token.
    pub allow_trailing_tokens: bool,
}

/// Compile tokens into an AST with default options. See `compile_with`.
pub fn compile(tokens: &[Token]) -> Ast {
    compile_with(tokens, CompileOptions::default())
}

/// Compile tokens into an AST.
///
/// An empty token slice gives an AST with no root and no errors. Otherwise, on failure the root is
/// None and `errors` holds every message, innermost first.
pub fn compile_with(tokens: &[Token], options: CompileOptions) -> Ast {
    let mut ast = Ast {
        debug: options.debug,
        ..Ast::new()
    };
    if tokens.is_empty() {
        return ast;
    }

    let mut parser = Parser::new(tokens, options.debug);
    match parser.program() {
        Ok(Some(root)) => {
            if !parser.is_end() && !options.allow_trailing_tokens {
                ast.errors
                    .push(parser.location(), "syntax error. unexpected token");
            } else {
                ast.root = Some(root);
            }
        }
        Ok(None) => ast.errors.push(parser.location(), "not found blocks"),
        Err(e) => ast.errors.extend(e.into_stack()),
    }

    debug!(
        "compiled {} tokens: {}",
        tokens.len(),
        if ast.has_errors() {
            format!("{} errors", ast.errors.len())
        } else {
            "ok".to_string()
        }
    );
    ast
}

/// Where a statement sits. Decides whether break/continue/return/block/inject are allowed.
#[derive(Debug, Clone, Copy, Default)]
struct Scope {
    is_in_loop: bool,
    is_in_func: bool,
}

struct Parser<'t> {
    tokens: &'t [Token],
    // index of the next unconsumed token
    pos: usize,
    depth: usize,
    scope: Scope,
    #[cfg_attr(not(feature = "trace"), allow(dead_code))]
    debug: bool,
}

impl<'t> Parser<'t> {
    fn new(tokens: &'t [Token], debug: bool) -> Parser<'t> {
        Parser {
            tokens,
            pos: 0,
            depth: 0,
            scope: Scope::default(),
            debug,
        }
    }

    // Runs one grammar rule. Soft fails at the end of input without calling `f`, and puts the
    // cursor back where it was unless `f` matched.
    #[cfg_attr(not(feature = "trace"), allow(unused_variables))]
    fn rule<T>(
        &mut self,
        name: &'static str,
        f: impl FnOnce(&mut Self) -> ParseResult<T>,
    ) -> ParseResult<T> {
        if self.is_end() {
            return Ok(None);
        }
        let saved = self.pos;
        #[cfg(feature = "trace")]
        if self.debug {
            log::trace!(
                "{:>3}: {:indent$}{} at {:?}",
                self.depth,
                "",
                name,
                self.peek_type(),
                indent = self.depth
            );
        }

        self.depth += 1;
        let result = f(self);
        self.depth -= 1;

        if !matches!(result, Ok(Some(_))) {
            self.pos = saved;
        }
        #[cfg(feature = "trace")]
        if self.debug {
            let outcome = match &result {
                Ok(Some(_)) => "matched",
                Ok(None) => "no match",
                Err(_) => "error",
            };
            log::trace!(
                "{:>3}: {:indent$}{} {}",
                self.depth,
                "",
                name,
                outcome,
                indent = self.depth
            );
        }
        result
    }

    fn is_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn peek_type(&self) -> Option<TokenType> {
        self.peek().map(|t| t.typ)
    }

    fn check(&self, typ: TokenType) -> bool {
        self.peek_type() == Some(typ)
    }

    fn advance(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    // Consume the next token if it has the given type.
    fn take(&mut self, typ: TokenType) -> Option<&'t Token> {
        if self.check(typ) {
            self.advance()
        } else {
            None
        }
    }

    fn skip_newlines(&mut self) {
        while self.take(TokenType::Newline).is_some() {}
    }

    // The current token's location, or the last token's once we ran off the end.
    fn location(&self) -> Option<SourceLocation> {
        self.peek()
            .or_else(|| self.tokens.last())
            .map(|t| t.location.clone())
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(self.location(), message)
    }

    fn fail<T>(&self, message: impl Into<String>) -> ParseResult<T> {
        Err(self.error(message))
    }

    // Run `f` with the given scope, putting the old one back whatever happens.
    fn with_scope<T>(&mut self, scope: Scope, f: impl FnOnce(&mut Self) -> T) -> T {
        let saved = std::mem::replace(&mut self.scope, scope);
        let result = f(self);
        self.scope = saved;
        result
    }
}
