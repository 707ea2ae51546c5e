// Template rules, the top of the grammar:
//
//   program    -> blocks
//   blocks     -> (code_block | ref_block | text_block) blocks?   (parsed in a loop)
//   code_block -> '{@' elems? '@}'
//   ref_block  -> '{:' formula ':}'
//   text_block -> TEXT
//
// A code block without its closing '@}' is a soft fail, so the '@} ... {@' stretches inside
// statement bodies stop at the next keyword.

use crate::{
    ast::{Node, NodeKind},
    scanner::TokenType,
};

use super::{ParseResult, Parser};

impl<'t> Parser<'t> {
    pub(super) fn program(&mut self) -> ParseResult {
        self.rule("program", |p| {
            let loc = p.location();
            Ok(p.blocks()?.map(|blocks| {
                Node::new(
                    NodeKind::Program {
                        blocks: Box::new(blocks),
                    },
                    loc,
                )
            }))
        })
    }

    pub(super) fn blocks(&mut self) -> ParseResult {
        self.rule("blocks", |p| {
            let mut blocks = Vec::new();
            loop {
                let loc = p.location();
                let block = if let Some(block) = p.code_block()? {
                    block
                } else if let Some(block) = p.ref_block()? {
                    block
                } else if let Some(block) = p.text_block() {
                    block
                } else {
                    break;
                };
                blocks.push((loc, block));
            }

            let mut next = None;
            while let Some((loc, block)) = blocks.pop() {
                next = Some(Node::new(
                    NodeKind::Blocks {
                        block: Box::new(block),
                        next: next.map(Box::new),
                    },
                    loc,
                ));
            }
            Ok(next)
        })
    }

    fn code_block(&mut self) -> ParseResult {
        self.rule("code_block", |p| {
            let loc = p.location();
            if p.take(TokenType::LBraceAt).is_none() {
                return Ok(None);
            }
            p.skip_newlines();
            let elems = p.elems()?;
            p.skip_newlines();
            if p.is_end() {
                return p.fail("syntax error. reached EOF in code block");
            }
            if p.take(TokenType::RBraceAt).is_none() {
                return Ok(None);
            }
            p.skip_newlines();
            Ok(Some(Node::new(
                NodeKind::CodeBlock {
                    elems: elems.map(Box::new),
                },
                loc,
            )))
        })
    }

    fn ref_block(&mut self) -> ParseResult {
        self.rule("ref_block", |p| {
            let loc = p.location();
            if p.take(TokenType::LDoubleBrace).is_none() {
                return Ok(None);
            }
            p.skip_newlines();
            let formula = match p.formula()? {
                Some(formula) => formula,
                None => return p.fail("syntax error. not found formula in reference block"),
            };
            p.skip_newlines();
            if p.is_end() {
                return p.fail("syntax error. reached EOF in reference block");
            }
            if p.take(TokenType::RDoubleBrace).is_none() {
                return p.fail("syntax error. not found \":}\"");
            }
            Ok(Some(Node::new(
                NodeKind::RefBlock {
                    formula: Box::new(formula),
                },
                loc,
            )))
        })
    }

    fn text_block(&mut self) -> Option<Node> {
        let token = self.take(TokenType::TextBlock)?;
        Some(Node::new(
            NodeKind::TextBlock {
                text: token.text().to_string(),
            },
            Some(token.location.clone()),
        ))
    }
}
