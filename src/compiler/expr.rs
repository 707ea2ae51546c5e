// Expression rules, lowest precedence first:
//
//   formula       -> assign_list | multi_assign
//   assign_list   -> assign (',' assign)*
//   assign        -> test '=' test ('=' test)*
//   multi_assign  -> test_list ('=' test_list)*
//   test_list     -> test (',' test)*
//   simple_assign -> test ('=' test)*
//   test          -> or_test
//   or_test       -> and_test ('or' and_test)*
//   and_test      -> not_test ('and' not_test)*
//   not_test      -> 'not' not_test | comparison
//   comparison    -> asscalc (comp_op asscalc)*
//   asscalc       -> expr (augassign expr)*
//   expr          -> term (('+' | '-') term)*
//   term          -> negative (('*' | '/' | '%') negative)*
//   negative      -> '-'? chain
//   chain         -> factor ('.' factor | '[' simple_assign ']' | '(' call_args ')')*
//   factor        -> atom | '(' formula ')'
//   atom          -> nil | false | true | digit | float | string | array | dict | identifier

use crate::{
    ast::{ChainNode, ChainNodeKind, ChainNodes, Node, NodeArray, NodeKind, Op},
    error::SyntaxError,
    scanner::TokenType,
};

use super::{ParseResult, Parser};

fn op_for(typ: TokenType) -> Option<Op> {
    let op = match typ {
        TokenType::Add => Op::Add,
        TokenType::Sub => Op::Sub,
        TokenType::Mul => Op::Mul,
        TokenType::Div => Op::Div,
        TokenType::Mod => Op::Mod,
        TokenType::AddAssign => Op::AddAssign,
        TokenType::SubAssign => Op::SubAssign,
        TokenType::MulAssign => Op::MulAssign,
        TokenType::DivAssign => Op::DivAssign,
        TokenType::ModAssign => Op::ModAssign,
        TokenType::Eq => Op::Eq,
        TokenType::NotEq => Op::NotEq,
        TokenType::Lt => Op::Lt,
        TokenType::Lte => Op::Lte,
        TokenType::Gt => Op::Gt,
        TokenType::Gte => Op::Gte,
        _ => return None,
    };
    Some(op)
}

// Postfix states of a chain. The factor itself has already been read when the loop starts.
#[derive(Debug, Clone, Copy)]
enum ChainState {
    AfterFactor,
    Dot,
    Index,
    Call,
}

impl<'t> Parser<'t> {
    pub(super) fn formula(&mut self) -> ParseResult {
        self.rule("formula", |p| {
            let loc = p.location();
            let formula = match p.assign_list()? {
                Some(node) => node,
                None => match p.multi_assign()? {
                    Some(node) => node,
                    None => return Ok(None),
                },
            };
            Ok(Some(Node::new(
                NodeKind::Formula {
                    formula: Box::new(formula),
                },
                loc,
            )))
        })
    }

    fn assign_list(&mut self) -> ParseResult {
        self.rule("assign_list", |p| {
            let loc = p.location();
            let mut nodes = NodeArray::new();
            match p.assign()? {
                Some(node) => nodes.push(node),
                None => return Ok(None),
            }
            while p.take(TokenType::Comma).is_some() {
                // `a = 1, b` is not an assign list, let multi_assign have it
                match p.assign()? {
                    Some(node) => nodes.push(node),
                    None => return Ok(None),
                }
            }
            Ok(Some(Node::new(NodeKind::AssignList { nodes }, loc)))
        })
    }

    fn assign(&mut self) -> ParseResult {
        self.rule("assign", |p| {
            let loc = p.location();
            match p.separated(
                TokenType::Assign,
                "syntax error. not found rhs test in assign list",
            )? {
                Some(nodes) if nodes.len() >= 2 => {
                    Ok(Some(Node::new(NodeKind::Assign { nodes }, loc)))
                }
                _ => Ok(None),
            }
        })
    }

    fn multi_assign(&mut self) -> ParseResult {
        self.rule("multi_assign", |p| {
            let loc = p.location();
            let mut nodes = NodeArray::new();
            match p.test_list()? {
                Some(node) => nodes.push(node),
                None => return Ok(None),
            }
            while p.take(TokenType::Assign).is_some() {
                match p.test_list()? {
                    Some(node) => nodes.push(node),
                    None => return p.fail("syntax error. not found rhs in multi assign"),
                }
            }
            Ok(Some(Node::new(NodeKind::MultiAssign { nodes }, loc)))
        })
    }

    pub(super) fn test_list(&mut self) -> ParseResult {
        self.rule("test_list", |p| {
            let loc = p.location();
            Ok(p.separated(TokenType::Comma, "syntax error. not found test in test list")?
                .map(|nodes| Node::new(NodeKind::TestList { nodes }, loc)))
        })
    }

    pub(super) fn simple_assign(&mut self) -> ParseResult {
        self.rule("simple_assign", |p| {
            let loc = p.location();
            Ok(p.separated(TokenType::Assign, "not found rhs operand in simple assign")?
                .map(|nodes| Node::new(NodeKind::SimpleAssign { nodes }, loc)))
        })
    }

    // Always matches unless at the end of input, possibly with no arguments.
    fn call_args(&mut self) -> ParseResult {
        self.rule("call_args", |p| {
            let loc = p.location();
            let nodes = p
                .separated(TokenType::Comma, "syntax error. not found test in test list")?
                .unwrap_or_default();
            Ok(Some(Node::new(NodeKind::CallArgs { nodes }, loc)))
        })
    }

    // `test (separator test)*`. None if there is no first test; a separator without a test after
    // it is an error.
    fn separated(
        &mut self,
        separator: TokenType,
        missing: &'static str,
    ) -> Result<Option<NodeArray>, SyntaxError> {
        let mut nodes = NodeArray::new();
        match self.test()? {
            Some(node) => nodes.push(node),
            None => return Ok(None),
        }
        while self.take(separator).is_some() {
            match self.test()? {
                Some(node) => nodes.push(node),
                None => return Err(self.error(missing)),
            }
        }
        Ok(Some(nodes))
    }

    pub(super) fn test(&mut self) -> ParseResult {
        self.rule("test", |p| {
            let loc = p.location();
            Ok(p.or_test()?.map(|or_test| {
                Node::new(
                    NodeKind::Test {
                        or_test: Box::new(or_test),
                    },
                    loc,
                )
            }))
        })
    }

    fn or_test(&mut self) -> ParseResult {
        self.binary(
            "or_test",
            Self::and_test,
            &[TokenType::Or],
            |_| None,
            |nodes| NodeKind::OrTest { nodes },
            "syntax error. not found rhs operand in 'or' operator",
        )
    }

    fn and_test(&mut self) -> ParseResult {
        self.binary(
            "and_test",
            Self::not_test,
            &[TokenType::And],
            |_| None,
            |nodes| NodeKind::AndTest { nodes },
            "syntax error. not found rhs operand in 'and' operator",
        )
    }

    fn not_test(&mut self) -> ParseResult {
        self.rule("not_test", |p| {
            let loc = p.location();
            if p.take(TokenType::Not).is_some() {
                p.skip_newlines();
                let operand = match p.not_test()? {
                    Some(node) => node,
                    None => return p.fail("syntax error. not found operand in not operator"),
                };
                return Ok(Some(Node::new(
                    NodeKind::NotTest {
                        not_test: Some(Box::new(operand)),
                        comparison: None,
                    },
                    loc,
                )));
            }
            Ok(p.comparison()?.map(|comparison| {
                Node::new(
                    NodeKind::NotTest {
                        not_test: None,
                        comparison: Some(Box::new(comparison)),
                    },
                    loc,
                )
            }))
        })
    }

    fn comparison(&mut self) -> ParseResult {
        self.binary(
            "comparison",
            Self::asscalc,
            &[
                TokenType::Eq,
                TokenType::NotEq,
                TokenType::Lt,
                TokenType::Lte,
                TokenType::Gt,
                TokenType::Gte,
            ],
            |op| Some(NodeKind::CompOp { op }),
            |nodes| NodeKind::Comparison { nodes },
            "syntax error. not found rhs operand in comparison",
        )
    }

    fn asscalc(&mut self) -> ParseResult {
        self.binary(
            "asscalc",
            Self::expr,
            &[
                TokenType::AddAssign,
                TokenType::SubAssign,
                TokenType::MulAssign,
                TokenType::DivAssign,
                TokenType::ModAssign,
            ],
            |op| Some(NodeKind::Augassign { op }),
            |nodes| NodeKind::Asscalc { nodes },
            "syntax error. not found rhs operand in asscalc",
        )
    }

    fn expr(&mut self) -> ParseResult {
        self.binary(
            "expr",
            Self::term,
            &[TokenType::Add, TokenType::Sub],
            |op| Some(NodeKind::AddSubOp { op }),
            |nodes| NodeKind::Expr { nodes },
            "syntax error. not found rhs operand in expr",
        )
    }

    fn term(&mut self) -> ParseResult {
        self.binary(
            "term",
            Self::negative,
            &[TokenType::Mul, TokenType::Div, TokenType::Mod],
            |op| Some(NodeKind::MulDivOp { op }),
            |nodes| NodeKind::Term { nodes },
            "syntax error. not found rhs operand in term",
        )
    }

    // Left-assoc operator level: `operand (operator operand)*`. Operands and the operator nodes
    // built by `op_node` are interleaved in one array. Newlines are allowed after any operand or
    // operator.
    fn binary(
        &mut self,
        name: &'static str,
        operand: fn(&mut Self) -> ParseResult,
        operators: &[TokenType],
        op_node: fn(Op) -> Option<NodeKind>,
        build: fn(NodeArray) -> NodeKind,
        missing_rhs: &'static str,
    ) -> ParseResult {
        self.rule(name, |p| {
            let loc = p.location();
            let mut nodes = NodeArray::new();
            match operand(p)? {
                Some(node) => nodes.push(node),
                None => return Ok(None),
            }
            p.skip_newlines();

            while let Some(token) = p.peek().filter(|t| operators.contains(&t.typ)) {
                p.advance();
                if let Some(kind) = op_for(token.typ).and_then(op_node) {
                    nodes.push(Node::new(kind, Some(token.location.clone())));
                }
                p.skip_newlines();
                match operand(p)? {
                    Some(node) => nodes.push(node),
                    None => return p.fail(missing_rhs),
                }
                p.skip_newlines();
            }
            Ok(Some(Node::new(build(nodes), loc)))
        })
    }

    fn negative(&mut self) -> ParseResult {
        self.rule("negative", |p| {
            let loc = p.location();
            let is_negative = p.take(TokenType::Sub).is_some();
            let chain = match p.chain()? {
                Some(chain) => chain,
                None if is_negative => {
                    return p.fail("syntax error. not found operand of '-'")
                }
                None => return Ok(None),
            };
            Ok(Some(Node::new(
                NodeKind::Negative {
                    is_negative,
                    chain: Box::new(chain),
                },
                loc,
            )))
        })
    }

    fn chain(&mut self) -> ParseResult {
        self.rule("chain", |p| {
            let loc = p.location();
            let factor = match p
                .factor()
                .map_err(|e| e.with(p.location(), "failed to compile factor"))?
            {
                Some(factor) => factor,
                None => return Ok(None),
            };

            let mut chain_nodes = ChainNodes::new();
            let mut state = ChainState::AfterFactor;
            loop {
                state = match state {
                    ChainState::AfterFactor => match p.peek_type() {
                        Some(TokenType::Dot) => ChainState::Dot,
                        Some(TokenType::LBracket) => ChainState::Index,
                        Some(TokenType::LParen) => ChainState::Call,
                        _ => break,
                    },
                    ChainState::Dot => {
                        p.advance();
                        if p.is_end() {
                            return p.fail("reached EOF after '.'");
                        }
                        let node = match p
                            .factor()
                            .map_err(|e| e.with(p.location(), "failed to compile factor"))?
                        {
                            Some(node) => node,
                            None => return p.fail("not found factor after '.'"),
                        };
                        chain_nodes.push(ChainNode {
                            kind: ChainNodeKind::Dot,
                            node,
                        });
                        ChainState::AfterFactor
                    }
                    ChainState::Index => {
                        p.advance();
                        if p.is_end() {
                            return p.fail("reached EOF after '['");
                        }
                        let node = match p
                            .simple_assign()
                            .map_err(|e| e.with(p.location(), "failed to compile simple assign"))?
                        {
                            Some(node) => node,
                            None => return p.fail("not found expression"),
                        };
                        chain_nodes.push(ChainNode {
                            kind: ChainNodeKind::Index,
                            node,
                        });
                        if p.take(TokenType::RBracket).is_none() {
                            return p.fail("not found ']'");
                        }
                        ChainState::AfterFactor
                    }
                    ChainState::Call => {
                        p.advance();
                        let node = match p
                            .call_args()
                            .map_err(|e| e.with(p.location(), "failed to compile call arguments"))?
                        {
                            Some(node) => node,
                            None => return p.fail("reached EOF after '('"),
                        };
                        chain_nodes.push(ChainNode {
                            kind: ChainNodeKind::Call,
                            node,
                        });
                        if p.take(TokenType::RParen).is_none() {
                            return p.fail("not found ')'");
                        }
                        ChainState::AfterFactor
                    }
                };
            }

            Ok(Some(Node::new(
                NodeKind::Chain {
                    factor: Box::new(factor),
                    chain_nodes,
                },
                loc,
            )))
        })
    }

    fn factor(&mut self) -> ParseResult {
        self.rule("factor", |p| {
            let loc = p.location();
            if let Some(atom) = p.atom()? {
                return Ok(Some(Node::new(
                    NodeKind::Factor {
                        atom: Some(Box::new(atom)),
                        formula: None,
                    },
                    loc,
                )));
            }

            if p.take(TokenType::LParen).is_none() {
                return Ok(None);
            }
            let formula = match p.formula()? {
                Some(formula) => formula,
                None => return p.fail("syntax error. not found content of ( )"),
            };
            if p.take(TokenType::RParen).is_none() {
                return p.fail("syntax error. not found ) in factor");
            }
            Ok(Some(Node::new(
                NodeKind::Factor {
                    atom: None,
                    formula: Some(Box::new(formula)),
                },
                loc,
            )))
        })
    }

    fn atom(&mut self) -> ParseResult {
        self.rule("atom", |p| {
            let loc = p.location();
            let token = match p.peek() {
                Some(token) => token,
                None => return Ok(None),
            };
            let literal = match token.typ {
                TokenType::Nil => Some(NodeKind::Nil),
                TokenType::False => Some(NodeKind::False),
                TokenType::True => Some(NodeKind::True),
                TokenType::Integer => Some(NodeKind::Digit {
                    value: token.int_value,
                }),
                TokenType::Float => Some(NodeKind::Float {
                    value: token.float_value,
                }),
                TokenType::DqString => Some(NodeKind::String {
                    value: token.text().to_string(),
                }),
                _ => None,
            };

            let value = if let Some(kind) = literal {
                p.advance();
                Node::new(kind, loc.clone())
            } else if let Some(array) = p.array()? {
                array
            } else if let Some(dict) = p.dict()? {
                dict
            } else if let Some(identifier) = p.identifier() {
                identifier
            } else {
                return Ok(None);
            };
            Ok(Some(Node::new(
                NodeKind::Atom {
                    value: Box::new(value),
                },
                loc,
            )))
        })
    }

    /// Consume an identifier token, if that's what comes next.
    pub(super) fn identifier(&mut self) -> Option<Node> {
        let token = self.take(TokenType::Identifier)?;
        Some(Node::new(
            NodeKind::Identifier {
                name: token.text().to_string(),
            },
            Some(token.location.clone()),
        ))
    }

    fn array(&mut self) -> ParseResult {
        self.rule("array", |p| {
            let loc = p.location();
            if p.take(TokenType::LBracket).is_none() {
                return Ok(None);
            }
            p.skip_newlines();
            if p.is_end() {
                return p.fail("reached EOF in compile array");
            }
            let elems = p.array_elems()?;
            p.skip_newlines();
            if p.is_end() {
                return p.fail("reached EOF in compile array");
            }
            if p.take(TokenType::RBracket).is_none() {
                return p.fail("not found ']' in array");
            }
            Ok(Some(Node::new(
                NodeKind::Array {
                    elems: Box::new(elems),
                },
                loc,
            )))
        })
    }

    // Zero or more elements, a trailing comma is fine.
    fn array_elems(&mut self) -> Result<Node, SyntaxError> {
        let loc = self.location();
        let mut nodes = NodeArray::new();
        if let Some(first) = self.simple_assign()? {
            nodes.push(first);
            self.skip_newlines();
            while self.take(TokenType::Comma).is_some() {
                self.skip_newlines();
                match self.simple_assign()? {
                    Some(node) => nodes.push(node),
                    None => break,
                }
                self.skip_newlines();
            }
        }
        Ok(Node::new(NodeKind::ArrayElems { nodes }, loc))
    }

    fn dict(&mut self) -> ParseResult {
        self.rule("dict", |p| {
            let loc = p.location();
            if p.take(TokenType::LBrace).is_none() {
                return Ok(None);
            }
            p.skip_newlines();
            if p.is_end() {
                return p.fail("reached EOF in dict");
            }
            let elems = p.dict_elems()?;
            p.skip_newlines();
            if p.is_end() {
                return p.fail("reached EOF in dict");
            }
            if p.take(TokenType::RBrace).is_none() {
                return p.fail("not found right brace in parse dict");
            }
            Ok(Some(Node::new(
                NodeKind::Dict {
                    elems: Box::new(elems),
                },
                loc,
            )))
        })
    }

    fn dict_elems(&mut self) -> Result<Node, SyntaxError> {
        let loc = self.location();
        let mut nodes = NodeArray::new();
        if let Some(first) = self.dict_elem()? {
            nodes.push(first);
            loop {
                self.skip_newlines();
                if self.take(TokenType::Comma).is_none() {
                    break;
                }
                self.skip_newlines();
                match self.dict_elem()? {
                    Some(node) => nodes.push(node),
                    None => break,
                }
            }
        }
        Ok(Node::new(NodeKind::DictElems { nodes }, loc))
    }

    fn dict_elem(&mut self) -> ParseResult {
        self.rule("dict_elem", |p| {
            let loc = p.location();
            let key = match p.simple_assign()? {
                Some(key) => key,
                None => return Ok(None),
            };
            p.skip_newlines();
            if p.take(TokenType::Colon).is_none() {
                return p.fail("not found colon in parse dict elem");
            }
            p.skip_newlines();
            let value = match p.simple_assign()? {
                Some(value) => value,
                None => return p.fail("not found value in parse dict elem"),
            };
            Ok(Some(Node::new(
                NodeKind::DictElem {
                    key: Box::new(key),
                    value: Box::new(value),
                },
                loc,
            )))
        })
    }
}

#[cfg(test)]
mod test {
    use super::super::test::{first_error, parse, parse_ok};
    use crate::ast::{ChainNodeKind, Node, NodeKind, NodeType, Op};

    fn names(node: &Node) -> Vec<&str> {
        node.find_all(NodeType::Identifier)
            .into_iter()
            .filter_map(|n| n.identifier_name())
            .collect()
    }

    fn first(root: &Node, typ: NodeType) -> &Node {
        root.find_all(typ)[0]
    }

    #[test]
    fn test_chain_postfix_order() {
        let root = parse_ok("{@ a.b[c](d, e).f @}");
        let chain = first(&root, NodeType::Chain);
        let (factor, chain_nodes) = match &chain.kind {
            NodeKind::Chain {
                factor,
                chain_nodes,
            } => (factor, chain_nodes),
            _ => unreachable!(),
        };
        assert_eq!(names(factor), vec!["a"]);
        let kinds: Vec<_> = chain_nodes.iter().map(|cn| cn.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ChainNodeKind::Dot,
                ChainNodeKind::Index,
                ChainNodeKind::Call,
                ChainNodeKind::Dot
            ]
        );
        assert_eq!(names(&chain_nodes[0].node), vec!["b"]);
        assert_eq!(names(&chain_nodes[1].node), vec!["c"]);
        assert_eq!(chain_nodes[2].node.node_type(), NodeType::CallArgs);
        assert_eq!(names(&chain_nodes[2].node), vec!["d", "e"]);
        assert_eq!(names(&chain_nodes[3].node), vec!["f"]);
    }

    #[test]
    fn test_empty_call() {
        let root = parse_ok("{@ f() @}");
        let args = first(&root, NodeType::CallArgs);
        assert!(args.children().is_empty());
    }

    #[test]
    fn test_precedence() {
        let root = parse_ok("{@ 1 + 2 * 3 @}");
        let expr = first(&root, NodeType::Expr);
        let parts: Vec<_> = expr.children().iter().map(|n| n.node_type()).collect();
        assert_eq!(
            parts,
            vec![NodeType::Term, NodeType::AddSubOp, NodeType::Term]
        );
        let terms = expr.find_all(NodeType::Term);
        assert_eq!(terms.len(), 2);
        assert_eq!(terms[0].children().len(), 1);
        assert_eq!(terms[1].children().len(), 3);
        assert!(matches!(
            terms[1].children()[1].kind,
            NodeKind::MulDivOp { op: Op::Mul }
        ));
    }

    #[test]
    fn test_assign_list_and_multi_assign() {
        let root = parse_ok("{@ a = 1, b = 2 @}");
        assert_eq!(root.find_all(NodeType::AssignList).len(), 1);
        assert_eq!(root.find_all(NodeType::Assign).len(), 2);

        let root = parse_ok("{@ a, b = 1, 2 @}");
        assert!(root.find_all(NodeType::AssignList).is_empty());
        let multi = first(&root, NodeType::MultiAssign);
        assert_eq!(multi.children().len(), 2);

        let root = parse_ok("{@ a = b = 1 @}");
        let assign = first(&root, NodeType::Assign);
        assert_eq!(assign.children().len(), 3);
    }

    #[test]
    fn test_negative_and_not() {
        let root = parse_ok("{@ not -a @}");
        let negative = first(&root, NodeType::Negative);
        assert!(matches!(
            negative.kind,
            NodeKind::Negative {
                is_negative: true,
                ..
            }
        ));
        let not = first(&root, NodeType::NotTest);
        assert!(matches!(
            &not.kind,
            NodeKind::NotTest {
                not_test: Some(_),
                comparison: None
            }
        ));
    }

    #[test]
    fn test_comparison_and_logic() {
        let root = parse_ok("{@ a < 1 and b != 2 or c @}");
        let or = first(&root, NodeType::OrTest);
        assert_eq!(or.children().len(), 2);
        let and = first(&root, NodeType::AndTest);
        assert_eq!(and.children().len(), 2);
        let ops: Vec<_> = root
            .find_all(NodeType::CompOp)
            .into_iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(ops, vec!["comp_op(<)", "comp_op(!=)"]);
    }

    #[test]
    fn test_augassign() {
        let root = parse_ok("{@ i += 1 @}");
        let asscalc = first(&root, NodeType::Asscalc);
        assert_eq!(asscalc.children().len(), 3);
        assert_eq!(
            first(&root, NodeType::Augassign).to_string(),
            "augassign(+=)"
        );
    }

    #[test]
    fn test_literals() {
        let root = parse_ok("{@ [nil, true, false, 1, 2.5, \"s\"] @}");
        assert_eq!(first(&root, NodeType::Digit).to_string(), "digit(1)");
        assert_eq!(first(&root, NodeType::Float).to_string(), "float(2.5)");
        assert_eq!(first(&root, NodeType::String).to_string(), "string(\"s\")");
        assert_eq!(root.find_all(NodeType::Nil).len(), 1);
        assert_eq!(root.find_all(NodeType::True).len(), 1);
        assert_eq!(root.find_all(NodeType::False).len(), 1);
    }

    #[test]
    fn test_array_over_lines_with_trailing_comma() {
        let root = parse_ok("{@ x = [\n1,\n2,\n] @}");
        let elems = first(&root, NodeType::ArrayElems);
        assert_eq!(elems.children().len(), 2);

        let root = parse_ok("{@ x = [] @}");
        assert!(first(&root, NodeType::ArrayElems).children().is_empty());
    }

    #[test]
    fn test_dict() {
        let root = parse_ok("{@ d = {\"a\": 1, \"b\": 2,} @}");
        assert_eq!(root.find_all(NodeType::DictElem).len(), 2);
        let root = parse_ok("{@ d = {} @}");
        assert!(first(&root, NodeType::DictElems).children().is_empty());
    }

    #[test]
    fn test_parenthesized_formula() {
        let root = parse_ok("{@ (1 + 2) * 3 @}");
        let factor = root
            .find_all(NodeType::Factor)
            .into_iter()
            .find(|f| matches!(f.kind, NodeKind::Factor { formula: Some(_), .. }));
        assert!(factor.is_some());
    }

    #[test]
    fn test_expression_errors() {
        assert_eq!(
            first_error("{@ a = @}"),
            "syntax error. not found rhs test in assign list"
        );
        assert_eq!(
            first_error("{@ 1 + @}"),
            "syntax error. not found rhs operand in expr"
        );
        assert_eq!(
            first_error("{@ 1 * @}"),
            "syntax error. not found rhs operand in term"
        );
        assert_eq!(
            first_error("{@ a and @}"),
            "syntax error. not found rhs operand in 'and' operator"
        );
        assert_eq!(
            first_error("{@ not @}"),
            "syntax error. not found operand in not operator"
        );
        assert_eq!(
            first_error("{@ (1 @}"),
            "syntax error. not found ) in factor"
        );
        assert_eq!(first_error("{@ [1, 2 @}"), "not found ']' in array");
        assert_eq!(
            first_error("{@ {\"a\" 1} @}"),
            "not found colon in parse dict elem"
        );
    }

    #[test]
    fn test_chain_errors() {
        assert_eq!(first_error("{@ a[1 @}"), "not found ']'");
        assert_eq!(first_error("{@ a(1 @}"), "not found ')'");
        assert_eq!(first_error("{@ a[] @}"), "not found expression");
        assert_eq!(first_error("{@ a. @}"), "not found factor after '.'");
    }

    #[test]
    fn test_inner_error_comes_first() {
        let ast = parse("{@ a.(1 + ) @}");
        let messages: Vec<_> = ast.errors.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "syntax error. not found rhs operand in expr",
                "failed to compile factor"
            ]
        );
    }
}
