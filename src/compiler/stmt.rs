// Statement rules:
//
//   elems          -> (def | stmt | struct | formula) elems?
//   stmt           -> import_stmt | if_stmt | for_stmt | break_stmt | continue_stmt | return_stmt
//                   | block_stmt | inject_stmt | global_stmt | nonlocal_stmt
//   import_stmt    -> import_as_stmt | from_import_stmt
//   import_as_stmt -> 'import' string 'as' identifier
//   from_import    -> 'from' string 'import' import_vars
//   import_vars    -> import_var | '(' import_var (',' import_var)* ','? ')'
//   import_var     -> identifier ('as' identifier)?
//   if_stmt        -> 'if' test ':' body (elif_stmt | else_stmt)? 'end'
//   elif_stmt      -> 'elif' test ':' body (elif_stmt | else_stmt)?
//   else_stmt      -> 'else' ':' body
//   for_stmt       -> 'for' ':' body 'end'
//                   | 'for' formula ':' body 'end'
//                   | 'for' formula? ';' formula? ';' formula? ':' body 'end'
//   struct         -> 'struct' identifier ':' elems? 'end'
//   def            -> func_def
//   func_def       -> ('def' | 'met') identifier '(' func_def_args ')' func_extends? ':' content* 'end'
//   content        -> elems | '@}' blocks? '{@'
//
// A body is any mix of elems and `'@}' blocks '{@'` stretches of template.

use std::rc::Rc;

use crate::{
    ast::{BlockMap, ForStmt, FuncDef, IfStmt, Node, NodeArray, NodeKind},
    error::SyntaxError,
    scanner::TokenType,
};

use super::{ParseResult, Parser, Scope};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IfKind {
    If,
    Elif,
}

// Every block statement of a function body, by name. Nested function definitions keep their own.
fn collect_blocks(contents: &NodeArray) -> BlockMap {
    let mut blocks = BlockMap::default();
    let mut stack: Vec<&Node> = contents.iter().rev().collect();
    while let Some(node) = stack.pop() {
        match &node.kind {
            NodeKind::FuncDef(_) => continue,
            NodeKind::BlockStmt { identifier, .. } => {
                if let Some(name) = identifier.identifier_name() {
                    blocks.insert(name.to_string(), node.clone());
                }
            }
            _ => {}
        }
        stack.extend(node.children().into_iter().rev());
    }
    blocks
}

impl<'t> Parser<'t> {
    // Built right-nested, but parsed in a loop so long programs don't recurse once per line.
    pub(super) fn elems(&mut self) -> ParseResult {
        self.rule("elems", |p| {
            let mut elems = Vec::new();
            loop {
                let loc = p.location();
                let elem = if let Some(node) = p.def()? {
                    node
                } else if let Some(node) = p.stmt()? {
                    node
                } else if let Some(node) = p.struct_()? {
                    node
                } else if let Some(node) = p.formula()? {
                    node
                } else {
                    break;
                };
                elems.push((loc, elem));
                p.skip_newlines();
            }

            let mut next = None;
            while let Some((loc, elem)) = elems.pop() {
                next = Some(Node::new(
                    NodeKind::Elems {
                        elem: Box::new(elem),
                        next: next.map(Box::new),
                    },
                    loc,
                ));
            }
            Ok(next)
        })
    }

    fn stmt(&mut self) -> ParseResult {
        self.rule("stmt", |p| {
            let loc = p.location();
            let stmt = match p.peek_type() {
                Some(TokenType::Import) | Some(TokenType::From) => p.import_stmt()?,
                Some(TokenType::If) => p.if_stmt(IfKind::If)?,
                Some(TokenType::For) => p.for_stmt()?,
                Some(TokenType::Break) => p.break_stmt()?,
                Some(TokenType::Continue) => p.continue_stmt()?,
                Some(TokenType::Return) => p.return_stmt()?,
                Some(TokenType::Block) => p.block_stmt()?,
                Some(TokenType::Inject) => p.inject_stmt()?,
                Some(TokenType::Global) => p.global_stmt()?,
                Some(TokenType::Nonlocal) => p.nonlocal_stmt()?,
                _ => None,
            };
            Ok(stmt.map(|stmt| {
                Node::new(
                    NodeKind::Stmt {
                        stmt: Box::new(stmt),
                    },
                    loc,
                )
            }))
        })
    }

    fn import_stmt(&mut self) -> ParseResult {
        self.rule("import_stmt", |p| {
            let loc = p.location();
            let stmt = if let Some(node) = p.import_as_stmt()? {
                node
            } else if let Some(node) = p.from_import_stmt()? {
                node
            } else {
                return Ok(None);
            };
            // the statement has to end here, the newline is left for the caller
            match p.peek_type() {
                None => return p.fail("reached EOF in compile import statement"),
                Some(TokenType::Newline) | Some(TokenType::RBraceAt) => {}
                Some(_) => {
                    return p.fail("syntax error. invalid token in compile import statement")
                }
            }
            Ok(Some(Node::new(
                NodeKind::ImportStmt {
                    stmt: Box::new(stmt),
                },
                loc,
            )))
        })
    }

    fn import_as_stmt(&mut self) -> ParseResult {
        self.rule("import_as_stmt", |p| {
            let loc = p.location();
            if p.take(TokenType::Import).is_none() {
                return Ok(None);
            }
            let path = match p.string() {
                Some(path) => path,
                None => return p.fail("not found path in compile import as statement"),
            };
            if p.take(TokenType::As).is_none() {
                return p.fail("not found keyword 'as' in compile import as statement");
            }
            let alias = match p.identifier() {
                Some(alias) => alias,
                None => return p.fail("not found alias in compile import as statement"),
            };
            Ok(Some(Node::new(
                NodeKind::ImportAsStmt {
                    path: Box::new(path),
                    alias: Box::new(alias),
                },
                loc,
            )))
        })
    }

    fn from_import_stmt(&mut self) -> ParseResult {
        self.rule("from_import_stmt", |p| {
            let loc = p.location();
            if p.take(TokenType::From).is_none() {
                return Ok(None);
            }
            let path = match p.string() {
                Some(path) => path,
                None => return p.fail("not found path in compile from import statement"),
            };
            if p.take(TokenType::Import).is_none() {
                return p.fail("not found import in compile from import statement");
            }
            let vars = match p.import_vars()? {
                Some(vars) => vars,
                None => {
                    return p.fail("not found import variables in compile from import statement")
                }
            };
            Ok(Some(Node::new(
                NodeKind::FromImportStmt {
                    path: Box::new(path),
                    vars: Box::new(vars),
                },
                loc,
            )))
        })
    }

    fn import_vars(&mut self) -> ParseResult {
        self.rule("import_vars", |p| {
            let loc = p.location();
            let mut vars = NodeArray::new();
            if p.take(TokenType::LParen).is_none() {
                return Ok(p.import_var()?.map(|var| {
                    vars.push(var);
                    Node::new(NodeKind::ImportVars { vars }, loc)
                }));
            }

            loop {
                p.skip_newlines();
                if p.is_end() {
                    return p.fail("reached EOF in compile import variables");
                }
                // a trailing comma before ')' is fine
                if !vars.is_empty() && p.take(TokenType::RParen).is_some() {
                    break;
                }
                match p.import_var()? {
                    Some(var) => vars.push(var),
                    None => return p.fail("not found import variable in compile import variables"),
                }
                p.skip_newlines();
                if p.take(TokenType::Comma).is_some() {
                    continue;
                }
                if p.take(TokenType::RParen).is_some() {
                    break;
                }
                if p.is_end() {
                    return p.fail("reached EOF in compile import variables");
                }
                return p.fail("syntax error. invalid token in compile import variables");
            }
            Ok(Some(Node::new(NodeKind::ImportVars { vars }, loc)))
        })
    }

    fn import_var(&mut self) -> ParseResult {
        self.rule("import_var", |p| {
            let loc = p.location();
            let identifier = match p.identifier() {
                Some(identifier) => identifier,
                None => return Ok(None),
            };
            let alias = if p.take(TokenType::As).is_some() {
                match p.identifier() {
                    Some(alias) => Some(Box::new(alias)),
                    None => {
                        return p.fail("not found second identifier in compile import variable")
                    }
                }
            } else {
                None
            };
            Ok(Some(Node::new(
                NodeKind::ImportVar {
                    identifier: Box::new(identifier),
                    alias,
                },
                loc,
            )))
        })
    }

    fn string(&mut self) -> Option<Node> {
        let token = self.take(TokenType::DqString)?;
        Some(Node::new(
            NodeKind::String {
                value: token.text().to_string(),
            },
            Some(token.location.clone()),
        ))
    }

    // `if` and `elif` share one rule. Only `if` consumes the closing `end`.
    fn if_stmt(&mut self, kind: IfKind) -> ParseResult {
        let (name, keyword) = match kind {
            IfKind::If => ("if_stmt", TokenType::If),
            IfKind::Elif => ("elif_stmt", TokenType::Elif),
        };
        self.rule(name, |p| {
            let loc = p.location();
            if p.take(keyword).is_none() {
                return Ok(None);
            }
            p.skip_newlines();
            if p.is_end() {
                return p.fail("reached EOF in if statement");
            }
            let test = match p.test()? {
                Some(test) => test,
                None => return p.fail("syntax error. not found test in if statement"),
            };
            p.skip_newlines();
            if p.is_end() {
                return p.fail("reached EOF in if statement");
            }
            if p.take(TokenType::Colon).is_none() {
                return p.fail("syntax error. not found colon in if statement");
            }

            let mut contents = NodeArray::new();
            let mut elif = None;
            let mut else_ = None;
            loop {
                p.skip_newlines();
                match p.peek_type() {
                    None => return p.fail("reached EOF in if statement"),
                    Some(TokenType::End) => {
                        if kind == IfKind::If {
                            p.advance();
                        }
                        break;
                    }
                    Some(TokenType::Elif) => {
                        let node = p
                            .if_stmt(IfKind::Elif)
                            .map_err(|e| e.with(p.location(), "failed to compile elif statement"))?;
                        match node {
                            Some(node) => elif = Some(Box::new(node)),
                            None => return p.fail("failed to compile elif statement"),
                        }
                    }
                    Some(TokenType::Else) => {
                        let node = p
                            .else_stmt()
                            .map_err(|e| e.with(p.location(), "failed to compile else statement"))?;
                        match node {
                            Some(node) => else_ = Some(Box::new(node)),
                            None => return p.fail("failed to compile else statement"),
                        }
                    }
                    Some(_) => p.body_segment(&mut contents, "if statement")?,
                }
            }

            let data = IfStmt {
                test: Box::new(test),
                contents,
                elif,
                else_,
            };
            let kind = match kind {
                IfKind::If => NodeKind::IfStmt(data),
                IfKind::Elif => NodeKind::ElifStmt(data),
            };
            Ok(Some(Node::new(kind, loc)))
        })
    }

    // Leaves the `end` for the enclosing if.
    fn else_stmt(&mut self) -> ParseResult {
        self.rule("else_stmt", |p| {
            let loc = p.location();
            if p.take(TokenType::Else).is_none() {
                return Ok(None);
            }
            p.skip_newlines();
            if p.is_end() {
                return p.fail("reached EOF in if statement");
            }
            if p.take(TokenType::Colon).is_none() {
                return p.fail("not found colon in else statement");
            }

            let mut contents = NodeArray::new();
            loop {
                p.skip_newlines();
                match p.peek_type() {
                    None => return p.fail("reached EOF in if statement"),
                    Some(TokenType::End) => break,
                    Some(TokenType::Elif) => return p.fail("syntax error. invalid token"),
                    Some(_) => p.body_segment(&mut contents, "else statement")?,
                }
            }
            Ok(Some(Node::new(NodeKind::ElseStmt { contents }, loc)))
        })
    }

    // One stretch of a statement body: a `@} blocks {@` run of template, or statements.
    fn body_segment(&mut self, contents: &mut NodeArray, what: &str) -> Result<(), SyntaxError> {
        if self.take(TokenType::RBraceAt).is_some() {
            self.skip_newlines();
            if self.is_end() {
                return Err(self.error(format!("reached EOF in {}", what)));
            }
            if let Some(blocks) = self.blocks()? {
                contents.push(blocks);
            }
            self.skip_newlines();
            if self.take(TokenType::LBraceAt).is_none() {
                return Err(self.error(format!("not found '{{@' in {}", what)));
            }
            return Ok(());
        }

        match self.elems()? {
            Some(elems) => {
                contents.push(elems);
                Ok(())
            }
            None => Err(self.error(format!("syntax error. unexpected token in {}", what))),
        }
    }

    fn for_stmt(&mut self) -> ParseResult {
        self.rule("for_stmt", |p| {
            let loc = p.location();
            if p.take(TokenType::For).is_none() {
                return Ok(None);
            }
            p.skip_newlines();
            if p.is_end() {
                return p.fail("reached EOF in for statement");
            }

            let mut init = None;
            let mut comp = None;
            let mut update = None;
            if !p.check(TokenType::Colon) {
                // `for ; comp ; update :` leaves the init clause empty
                let first = if p.check(TokenType::Semicolon) {
                    None
                } else {
                    match p.formula()? {
                        Some(formula) => Some(Box::new(formula)),
                        None => {
                            return p.fail(
                                "syntax error. not found initialize assign list in for statement",
                            )
                        }
                    }
                };
                p.skip_newlines();
                match p.peek_type() {
                    None => return p.fail("reached EOF in for statement"),
                    Some(TokenType::Colon) => comp = first,
                    Some(TokenType::Semicolon) => {
                        p.advance();
                        init = first;
                        p.skip_newlines();
                        comp = p.formula()?.map(Box::new);
                        p.skip_newlines();
                        if p.is_end() {
                            return p.fail("reached EOF in for statement");
                        }
                        if p.take(TokenType::Semicolon).is_none() {
                            return p.fail("syntax error. not found semicolon (2)");
                        }
                        p.skip_newlines();
                        update = p.formula()?.map(Box::new);
                        p.skip_newlines();
                    }
                    Some(_) => return p.fail("syntax error. unsupported token in for statement"),
                }
            }

            if p.is_end() {
                return p.fail("reached EOF in for statement");
            }
            if p.take(TokenType::Colon).is_none() {
                return p.fail("syntax error. not found colon in for statement");
            }

            let scope = Scope {
                is_in_loop: true,
                ..p.scope
            };
            let contents = p.with_scope(scope, Self::for_body)?;
            Ok(Some(Node::new(
                NodeKind::ForStmt(ForStmt {
                    init,
                    comp,
                    update,
                    contents,
                }),
                loc,
            )))
        })
    }

    fn for_body(&mut self) -> Result<NodeArray, SyntaxError> {
        let mut contents = NodeArray::new();
        loop {
            self.skip_newlines();
            match self.peek_type() {
                None => return Err(self.error("reached EOF in for statement")),
                Some(TokenType::End) => {
                    self.advance();
                    return Ok(contents);
                }
                Some(_) => self.body_segment(&mut contents, "for statement")?,
            }
        }
    }

    fn break_stmt(&mut self) -> ParseResult {
        self.rule("break_stmt", |p| {
            let loc = p.location();
            if p.take(TokenType::Break).is_none() {
                return Ok(None);
            }
            if !p.scope.is_in_loop {
                return Err(SyntaxError::new(loc, "invalid break statement. not in loop"));
            }
            Ok(Some(Node::new(NodeKind::BreakStmt, loc)))
        })
    }

    fn continue_stmt(&mut self) -> ParseResult {
        self.rule("continue_stmt", |p| {
            let loc = p.location();
            if p.take(TokenType::Continue).is_none() {
                return Ok(None);
            }
            if !p.scope.is_in_loop {
                return Err(SyntaxError::new(
                    loc,
                    "invalid continue statement. not in loop",
                ));
            }
            Ok(Some(Node::new(NodeKind::ContinueStmt, loc)))
        })
    }

    fn return_stmt(&mut self) -> ParseResult {
        self.rule("return_stmt", |p| {
            let loc = p.location();
            if p.take(TokenType::Return).is_none() {
                return Ok(None);
            }
            if !p.scope.is_in_func {
                return Err(SyntaxError::new(
                    loc,
                    "invalid return statement. not in function",
                ));
            }
            let formula = p.formula()?.map(Box::new);
            Ok(Some(Node::new(NodeKind::ReturnStmt { formula }, loc)))
        })
    }

    fn block_stmt(&mut self) -> ParseResult {
        self.rule("block_stmt", |p| {
            let loc = p.location();
            if p.take(TokenType::Block).is_none() {
                return Ok(None);
            }
            if !p.scope.is_in_func {
                return Err(SyntaxError::new(loc, "can't access to function node"));
            }
            let identifier = match p.identifier() {
                Some(identifier) => identifier,
                None => return p.fail("not found identifier in block statement"),
            };
            if p.take(TokenType::Colon).is_none() {
                return p.fail("not found colon in block statement");
            }
            let contents = p.contents_until_end("block statement", None)?;
            Ok(Some(Node::new(
                NodeKind::BlockStmt {
                    identifier: Box::new(identifier),
                    contents,
                },
                loc,
            )))
        })
    }

    fn inject_stmt(&mut self) -> ParseResult {
        self.rule("inject_stmt", |p| {
            let loc = p.location();
            if p.take(TokenType::Inject).is_none() {
                return Ok(None);
            }
            if !p.scope.is_in_func {
                return Err(SyntaxError::new(loc, "inject statement needs function"));
            }
            let identifier = match p.identifier() {
                Some(identifier) => identifier,
                None => return p.fail("not found identifier in inject statement"),
            };
            if p.take(TokenType::Colon).is_none() {
                return p.fail("not found colon in inject statement");
            }
            let contents = p.contents_until_end("inject statement", None)?;
            Ok(Some(Node::new(
                NodeKind::InjectStmt {
                    identifier: Box::new(identifier),
                    contents,
                },
                loc,
            )))
        })
    }

    // `content* 'end'`, consuming the `end`. `context` is appended to errors from the contents.
    fn contents_until_end(
        &mut self,
        what: &str,
        context: Option<&'static str>,
    ) -> Result<NodeArray, SyntaxError> {
        let mut contents = NodeArray::new();
        loop {
            self.skip_newlines();
            if self.is_end() {
                return Err(self.error(format!("not found 'end' in {}", what)));
            }
            if self.take(TokenType::End).is_some() {
                return Ok(contents);
            }
            let content = match (self.content(), context) {
                (Err(e), Some(context)) => return Err(e.with(self.location(), context)),
                (result, _) => result?,
            };
            match content {
                Some(content) => contents.push(content),
                None => return Err(self.error(format!("not found 'end' in {}", what))),
            }
        }
    }

    fn global_stmt(&mut self) -> ParseResult {
        self.rule("global_stmt", |p| {
            let loc = p.location();
            if p.take(TokenType::Global).is_none() {
                return Ok(None);
            }
            let identifiers = p.identifier_list("global statement")?;
            Ok(Some(Node::new(NodeKind::GlobalStmt { identifiers }, loc)))
        })
    }

    fn nonlocal_stmt(&mut self) -> ParseResult {
        self.rule("nonlocal_stmt", |p| {
            let loc = p.location();
            if p.take(TokenType::Nonlocal).is_none() {
                return Ok(None);
            }
            let identifiers = p.identifier_list("nonlocal statement")?;
            Ok(Some(Node::new(NodeKind::NonlocalStmt { identifiers }, loc)))
        })
    }

    // `identifier (',' identifier)*`, eating one newline after the last identifier.
    fn identifier_list(&mut self, what: &str) -> Result<NodeArray, SyntaxError> {
        let mut identifiers = NodeArray::new();
        loop {
            match self.identifier() {
                Some(identifier) => identifiers.push(identifier),
                None => return Err(self.error("not found identifier")),
            }
            match self.peek_type() {
                None => return Err(self.error(format!("reached EOF in {}", what))),
                Some(TokenType::Newline) => {
                    self.advance();
                    return Ok(identifiers);
                }
                Some(TokenType::Comma) => {
                    self.advance();
                }
                Some(_) => return Ok(identifiers),
            }
        }
    }

    fn struct_(&mut self) -> ParseResult {
        self.rule("struct", |p| {
            let loc = p.location();
            if p.take(TokenType::Struct).is_none() {
                return Ok(None);
            }
            let identifier = match p.identifier() {
                Some(identifier) => identifier,
                None => return p.fail("not found identifier in struct"),
            };
            if p.take(TokenType::Colon).is_none() {
                return p.fail("not found colon in struct");
            }
            p.skip_newlines();
            let elems = p.elems()?.map(Box::new);
            p.skip_newlines();
            if p.take(TokenType::End).is_none() {
                return p.fail("not found 'end' in struct");
            }
            Ok(Some(Node::new(
                NodeKind::Struct {
                    identifier: Box::new(identifier),
                    elems,
                },
                loc,
            )))
        })
    }

    fn def(&mut self) -> ParseResult {
        self.rule("def", |p| {
            let loc = p.location();
            Ok(p.func_def()?.map(|func_def| {
                Node::new(
                    NodeKind::Def {
                        func_def: Box::new(func_def),
                    },
                    loc,
                )
            }))
        })
    }

    fn func_def(&mut self) -> ParseResult {
        self.rule("func_def", |p| {
            let loc = p.location();
            let is_met = match p.peek_type() {
                Some(TokenType::Def) => false,
                Some(TokenType::Met) => true,
                _ => return Ok(None),
            };
            p.advance();

            let identifier = match p.identifier() {
                Some(identifier) => identifier,
                None => return Ok(None),
            };
            let params = match p.func_def_params()? {
                Some(params) => params,
                None => return Ok(None),
            };
            if p.is_end() {
                return p.fail("syntax error. reached EOF in parse func def");
            }
            let extends = p.func_extends()?.map(Box::new);
            if p.take(TokenType::Colon).is_none() {
                return p.fail("not found colon in parse func def");
            }

            let scope = Scope {
                is_in_loop: false,
                is_in_func: true,
            };
            let contents = p.with_scope(scope, |p| {
                p.contents_until_end("parse func def", Some("failed to compile content"))
            })?;
            let blocks = collect_blocks(&contents);
            Ok(Some(Node::new(
                NodeKind::FuncDef(FuncDef {
                    identifier: Box::new(identifier),
                    params: Box::new(params),
                    extends,
                    contents: Rc::new(contents),
                    blocks: Rc::new(blocks),
                    is_met,
                }),
                loc,
            )))
        })
    }

    fn func_def_params(&mut self) -> ParseResult {
        self.rule("func_def_params", |p| {
            let loc = p.location();
            if p.take(TokenType::LParen).is_none() {
                return Ok(None);
            }
            let args = p.func_def_args()?;
            if p.is_end() {
                return p.fail("syntax error. reached EOF in func def params");
            }
            if p.take(TokenType::RParen).is_none() {
                return p.fail("syntax error. not found ')' in func def params");
            }
            Ok(Some(Node::new(
                NodeKind::FuncDefParams {
                    args: Box::new(args),
                },
                loc,
            )))
        })
    }

    fn func_def_args(&mut self) -> Result<Node, SyntaxError> {
        let loc = self.location();
        let mut identifiers = NodeArray::new();
        if let Some(first) = self.identifier() {
            identifiers.push(first);
            while self.take(TokenType::Comma).is_some() {
                match self.identifier() {
                    Some(identifier) => identifiers.push(identifier),
                    None => {
                        return Err(
                            self.error("syntax error. not found identifier in func def args")
                        )
                    }
                }
            }
        }
        Ok(Node::new(NodeKind::FuncDefArgs { identifiers }, loc))
    }

    fn func_extends(&mut self) -> ParseResult {
        self.rule("func_extends", |p| {
            let loc = p.location();
            if p.take(TokenType::Extends).is_none() {
                return Ok(None);
            }
            let identifier = match p.identifier() {
                Some(identifier) => identifier,
                None => return p.fail("not found identifier in function extends"),
            };
            Ok(Some(Node::new(
                NodeKind::FuncExtends {
                    identifier: Box::new(identifier),
                },
                loc,
            )))
        })
    }

    fn content(&mut self) -> ParseResult {
        self.rule("content", |p| {
            p.skip_newlines();
            let loc = p.location();
            let (elems, blocks) = if p.take(TokenType::RBraceAt).is_some() {
                let blocks = p.blocks()?;
                if p.take(TokenType::LBraceAt).is_none() {
                    return p.fail("not found '{@' in content");
                }
                (None, blocks)
            } else {
                match p.elems()? {
                    Some(elems) => (Some(elems), None),
                    None => return Ok(None),
                }
            };
            p.skip_newlines();
            Ok(Some(Node::new(
                NodeKind::Content {
                    elems: elems.map(Box::new),
                    blocks: blocks.map(Box::new),
                },
                loc,
            )))
        })
    }
}

#[cfg(test)]
mod test {
    use super::super::test::{first_error, parse, parse_ok};
    use crate::ast::{Node, NodeKind, NodeType};

    fn names(node: &Node) -> Vec<&str> {
        node.find_all(NodeType::Identifier)
            .into_iter()
            .filter_map(|n| n.identifier_name())
            .collect()
    }

    fn for_clauses(src: &str) -> (bool, bool, bool) {
        let root = parse_ok(src);
        let node = root.find_all(NodeType::ForStmt)[0];
        match &node.kind {
            NodeKind::ForStmt(s) => (s.init.is_some(), s.comp.is_some(), s.update.is_some()),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_for_forms() {
        assert_eq!(for_clauses("{@ for : end @}"), (false, false, false));
        assert_eq!(for_clauses("{@ for x < 10 : end @}"), (false, true, false));
        assert_eq!(
            for_clauses("{@ for i = 0; i < 10; i += 1 : end @}"),
            (true, true, true)
        );
        assert_eq!(for_clauses("{@ for ; i < 10; : end @}"), (false, true, false));
        assert_eq!(for_clauses("{@ for ;; : end @}"), (false, false, false));
    }

    #[test]
    fn test_for_body_with_template() {
        let root = parse_ok("{@ for i = 0; i < 3; i += 1: @}[{: i :}]{@ end @}");
        let node = root.find_all(NodeType::ForStmt)[0];
        match &node.kind {
            NodeKind::ForStmt(s) => {
                assert_eq!(s.contents.len(), 1);
                assert_eq!(s.contents.get(0).unwrap().node_type(), NodeType::Blocks);
            }
            _ => unreachable!(),
        }
        assert_eq!(root.find_all(NodeType::TextBlock).len(), 2);
        assert_eq!(root.find_all(NodeType::RefBlock).len(), 1);
    }

    #[test]
    fn test_for_errors() {
        assert_eq!(
            first_error("{@ for i = 0; i < 10 : end @}"),
            "syntax error. not found semicolon (2)"
        );
        assert_eq!(
            first_error("{@ for x < 1 end @}"),
            "syntax error. unsupported token in for statement"
        );
        assert_eq!(
            first_error("{@ for ; ; i += 1 end @}"),
            "syntax error. not found colon in for statement"
        );
        assert_eq!(first_error("{@ for : @}"), "reached EOF in for statement");
        assert_eq!(
            first_error("{@ for : ) end @}"),
            "syntax error. unexpected token in for statement"
        );
    }

    #[test]
    fn test_if_elif_else() {
        let root = parse_ok("{@ if a: x elif b: y elif c: z else: w end @}");
        let node = root.find_all(NodeType::IfStmt)[0];
        let data = match &node.kind {
            NodeKind::IfStmt(data) => data,
            _ => unreachable!(),
        };
        assert_eq!(names(&data.test), vec!["a"]);
        assert!(data.else_.is_none());
        let elif = data.elif.as_ref().unwrap();
        assert_eq!(elif.node_type(), NodeType::ElifStmt);
        let inner = match &elif.kind {
            NodeKind::ElifStmt(inner) => inner,
            _ => unreachable!(),
        };
        let last = inner.elif.as_ref().unwrap();
        match &last.kind {
            NodeKind::ElifStmt(last) => {
                assert!(last.elif.is_none());
                assert_eq!(last.else_.as_ref().unwrap().node_type(), NodeType::ElseStmt);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_if_with_template_body() {
        let root = parse_ok("{@ if a: @}yes{@ else: @}no{@ end @}");
        let texts: Vec<_> = root
            .find_all(NodeType::TextBlock)
            .into_iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(texts, vec!["text_block(\"yes\")", "text_block(\"no\")"]);
    }

    #[test]
    fn test_if_errors() {
        assert_eq!(
            first_error("{@ if : x end @}"),
            "syntax error. not found test in if statement"
        );
        assert_eq!(
            first_error("{@ if a x end @}"),
            "syntax error. not found colon in if statement"
        );
        assert_eq!(
            first_error("{@ if a: x else: y elif b: z end @}"),
            "syntax error. invalid token"
        );
    }

    #[test]
    fn test_elif_error_keeps_context() {
        let ast = parse("{@ if a:\n  x\nelif :\n  y\nend @}");
        let entries: Vec<_> = ast.errors.iter().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0].message,
            "syntax error. not found test in if statement"
        );
        assert_eq!(entries[0].location.as_ref().unwrap().line, 3);
        assert_eq!(entries[1].message, "failed to compile elif statement");
    }

    #[test]
    fn test_loop_and_function_context() {
        assert_eq!(
            first_error("{@ break @}"),
            "invalid break statement. not in loop"
        );
        assert_eq!(
            first_error("{@ continue @}"),
            "invalid continue statement. not in loop"
        );
        assert_eq!(
            first_error("{@ return 1 @}"),
            "invalid return statement. not in function"
        );
        assert_eq!(
            first_error("{@ block a: end @}"),
            "can't access to function node"
        );
        assert_eq!(
            first_error("{@ inject a: end @}"),
            "inject statement needs function"
        );
        // a function body is not a loop even inside one
        assert_eq!(
            first_error("{@ for : def f(): break end end @}"),
            "invalid break statement. not in loop"
        );

        parse_ok("{@ for : if a: break end continue end @}");
        parse_ok("{@ def f(): for : return 1 end end @}");
    }

    #[test]
    fn test_imports() {
        let root = parse_ok("{@ import \"lib.pad\" as lib @}");
        let stmt = root.find_all(NodeType::ImportAsStmt)[0];
        assert_eq!(names(stmt), vec!["lib"]);

        let root = parse_ok("{@ from \"lib.pad\" import (\n  a,\n  b as c,\n) @}");
        let vars = root.find_all(NodeType::ImportVar);
        assert_eq!(vars.len(), 2);
        assert_eq!(names(vars[1]), vec!["b", "c"]);

        let root = parse_ok("{@ from \"lib.pad\" import a\nx = 1 @}");
        assert_eq!(root.find_all(NodeType::ImportVar).len(), 1);
    }

    #[test]
    fn test_import_errors() {
        assert_eq!(
            first_error("{@ import \"a\" @}"),
            "not found keyword 'as' in compile import as statement"
        );
        assert_eq!(
            first_error("{@ import \"a\" as b c @}"),
            "syntax error. invalid token in compile import statement"
        );
        assert_eq!(
            first_error("{@ from \"a\" import @}"),
            "not found import variables in compile from import statement"
        );
        assert_eq!(
            first_error("{@ from \"a\" import (a b) @}"),
            "syntax error. invalid token in compile import variables"
        );
    }

    #[test]
    fn test_global_and_nonlocal() {
        let root = parse_ok("{@ def f():\n global a, b\n nonlocal c\n end @}");
        let global = root.find_all(NodeType::GlobalStmt)[0];
        assert_eq!(names(global), vec!["a", "b"]);
        let nonlocal = root.find_all(NodeType::NonlocalStmt)[0];
        assert_eq!(names(nonlocal), vec!["c"]);
        assert_eq!(first_error("{@ global @}"), "not found identifier");
    }

    #[test]
    fn test_struct() {
        let root = parse_ok("{@ struct Animal:\n  name = nil\n  age = 0\nend @}");
        let node = root.find_all(NodeType::Struct)[0];
        assert_eq!(names(node), vec!["Animal", "name", "age"]);
        parse_ok("{@ struct Empty: end @}");
        assert_eq!(first_error("{@ struct A: x @}"), "not found 'end' in struct");
    }

    #[test]
    fn test_func_def() {
        let root = parse_ok("{@ def add(a, b):\n  return a + b\nend @}");
        let node = root.find_all(NodeType::FuncDef)[0];
        match &node.kind {
            NodeKind::FuncDef(def) => {
                assert!(!def.is_met);
                assert_eq!(def.identifier.identifier_name(), Some("add"));
                assert_eq!(names(&def.params), vec!["a", "b"]);
                assert_eq!(def.contents.len(), 1);
                assert!(def.blocks.is_empty());
            }
            _ => unreachable!(),
        }

        let root = parse_ok("{@ met speak(self): end @}");
        assert!(matches!(
            &root.find_all(NodeType::FuncDef)[0].kind,
            NodeKind::FuncDef(def) if def.is_met
        ));
    }

    #[test]
    fn test_func_def_errors() {
        assert_eq!(
            first_error("{@ def f(a,): end @}"),
            "syntax error. not found identifier in func def args"
        );
        assert_eq!(
            first_error("{@ def f(a b): end @}"),
            "syntax error. not found ')' in func def params"
        );
        assert_eq!(
            first_error("{@ def f() extends : end @}"),
            "not found identifier in function extends"
        );
        let ast = parse("{@ def f(): if : x end end @}");
        let messages: Vec<_> = ast.errors.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "syntax error. not found test in if statement",
                "failed to compile content"
            ]
        );
    }

    #[test]
    fn test_blocks_registered_in_function() {
        let src = "{@ def base():\n\
                   block header:\n\
                   @}<h1>{@\n\
                   end\n\
                   block body: end\n\
                   def inner():\n\
                   block hidden: end\n\
                   end\n\
                   end\n\
                   def page() extends base:\n\
                   inject body:\n\
                   x = 1\n\
                   end\n\
                   end @}";
        let root = parse_ok(src);
        let defs = root.find_all(NodeType::FuncDef);
        let base = match &defs[0].kind {
            NodeKind::FuncDef(def) => def,
            _ => unreachable!(),
        };
        let mut keys: Vec<_> = base.blocks.keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["body", "header"]);

        let inner = match &defs[1].kind {
            NodeKind::FuncDef(def) => def,
            _ => unreachable!(),
        };
        assert!(inner.blocks.contains_key("hidden"));

        let page = match &defs[2].kind {
            NodeKind::FuncDef(def) => def,
            _ => unreachable!(),
        };
        assert_eq!(
            page.extends.as_ref().map(|e| names(e)),
            Some(vec!["base"])
        );
        assert_eq!(root.find_all(NodeType::InjectStmt).len(), 1);
    }

    #[test]
    fn test_statements_on_one_line() {
        let root = parse_ok("{@ a = 1 b = 2 @}");
        assert_eq!(root.find_all(NodeType::Elems).len(), 2);
    }
}
