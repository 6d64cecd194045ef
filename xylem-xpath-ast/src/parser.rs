//! The expression parser.
//!
//! An iterative Pratt machine: one operand stack, one operator stack
//! whose entries are either pending binary/unary operators with a
//! precedence or frames for bracketed and keyword constructs. Nothing
//! recurses on expression depth, so a pathological input cannot exhaust
//! the native stack; only the type grammar uses bounded recursion.

use ibig::IBig;
use xylem_name::{Name, Namespaces, XS_NAMESPACE};
use xylem_xpath_lexer::{lex, PrefixedQName, Spanned, Token};

use crate::ast::*;
use crate::error::ParserError;

// precedence, higher binds tighter
const PREC_OR: u8 = 1;
const PREC_AND: u8 = 2;
const PREC_COMPARISON: u8 = 3;
const PREC_CONCAT: u8 = 4;
const PREC_RANGE: u8 = 5;
const PREC_ADDITIVE: u8 = 6;
const PREC_MULTIPLICATIVE: u8 = 7;
const PREC_UNION: u8 = 8;
const PREC_INTERSECT: u8 = 9;
const PREC_INSTANCE_OF: u8 = 10;
const PREC_TREAT: u8 = 11;
const PREC_CASTABLE: u8 = 12;
const PREC_CAST: u8 = 13;
const PREC_ARROW: u8 = 14;
const PREC_UNARY: u8 = 15;
const PREC_SIMPLE_MAP: u8 = 16;
const PREC_PATH: u8 = 17;

const MAX_TYPE_DEPTH: usize = 64;

/// What a `=>` applies to.
#[derive(Debug)]
enum ArrowTarget {
    Named(Name),
    Expr(Expr),
}

#[derive(Debug)]
enum OpEntry {
    Binary(BinaryOp, u8),
    UnaryMinus,
    UnaryPlus,
    PathSlash,
    PathDoubleSlash,
    SimpleMap,
    Frame(Frame),
}

#[derive(Debug)]
enum Frame {
    Top {
        items: Vec<Expr>,
    },
    Paren {
        items: Vec<Expr>,
    },
    Call {
        name: Name,
        args: Vec<Expr>,
    },
    DynCall {
        base: Expr,
        args: Vec<Expr>,
    },
    ArrowCall {
        target: ArrowTarget,
        args: Vec<Expr>,
    },
    SquareArray {
        items: Vec<Expr>,
    },
    CurlyArray,
    MapCtor {
        entries: Vec<(Expr, Expr)>,
        key: Option<Expr>,
    },
    Predicate {
        base: Expr,
    },
    IfCond,
    IfThen {
        condition: Expr,
    },
    IfElse {
        condition: Expr,
        then: Expr,
    },
    BindingIn {
        kind: BindingKind,
        bindings: Vec<(Name, Expr)>,
        var: Name,
    },
    BindingBody {
        kind: BindingKind,
        bindings: Vec<(Name, Expr)>,
    },
    FunctionBody {
        params: Vec<Param>,
        return_type: Option<SequenceType>,
    },
    LookupParen {
        base: Option<Expr>,
    },
}

/// Parse one XPath expression against the given static namespaces.
pub fn parse_xpath(input: &str, namespaces: &Namespaces) -> Result<Expr, ParserError> {
    Parser::new(input, namespaces)?.parse()
}

/// Parse a standalone sequence type, as in XSLT `as` attributes.
pub fn parse_sequence_type(
    input: &str,
    namespaces: &Namespaces,
) -> Result<SequenceType, ParserError> {
    let mut parser = Parser::new(input, namespaces)?;
    let t = parser.sequence_type(0)?;
    if parser.pos < parser.tokens.len() {
        return Err(parser.error_here("trailing input after sequence type"));
    }
    Ok(t)
}

struct Parser<'a> {
    tokens: Vec<Spanned<'a>>,
    pos: usize,
    namespaces: &'a Namespaces,
    operands: Vec<Expr>,
    ops: Vec<OpEntry>,
    expect_operand: bool,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str, namespaces: &'a Namespaces) -> Result<Self, ParserError> {
        let tokens = lex(input);
        if let Some(bad) = tokens.iter().find(|t| t.token == Token::Error) {
            return Err(ParserError::new("unrecognized token", bad.span.clone()));
        }
        Ok(Self {
            tokens,
            pos: 0,
            namespaces,
            operands: Vec::new(),
            ops: vec![OpEntry::Frame(Frame::Top { items: Vec::new() })],
            expect_operand: true,
        })
    }

    // ---- token access -------------------------------------------------------

    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek2(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.pos + 1).map(|s| &s.token)
    }

    fn bump(&mut self) -> Option<Token<'a>> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn span_here(&self) -> std::ops::Range<usize> {
        self.tokens
            .get(self.pos.min(self.tokens.len().saturating_sub(1)))
            .map(|s| s.span.clone())
            .unwrap_or(0..0)
    }

    fn error_here(&self, message: impl Into<String>) -> ParserError {
        ParserError::new(message, self.span_here())
    }

    fn expect_token(&mut self, expected: &Token) -> Result<(), ParserError> {
        match self.bump() {
            Some(token) if &token == expected => Ok(()),
            _ => Err(self.error_here(format!("expected {expected:?}"))),
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParserError> {
        match self.bump() {
            Some(Token::NCName(name)) if name == keyword => Ok(()),
            _ => Err(self.error_here(format!("expected {keyword:?}"))),
        }
    }

    // ---- name resolution ----------------------------------------------------

    fn resolve_prefix(&self, prefix: &str) -> Result<String, ParserError> {
        self.namespaces
            .by_prefix(prefix)
            .map(|s| s.to_string())
            .ok_or_else(|| self.error_here(format!("unknown namespace prefix {prefix:?}")))
    }

    fn element_name(&self, qname: &EqNameToken) -> Result<Name, ParserError> {
        Ok(match qname {
            EqNameToken::Local(local) => {
                Name::new(self.namespaces.default_element_namespace(), local)
            }
            EqNameToken::Prefixed(prefix, local) => {
                Name::prefixed(&self.resolve_prefix(prefix)?, local, prefix)
            }
            EqNameToken::Uri(uri, local) => Name::new(uri, local),
        })
    }

    fn function_name(&self, qname: &EqNameToken) -> Result<Name, ParserError> {
        Ok(match qname {
            EqNameToken::Local(local) => {
                Name::new(self.namespaces.default_function_namespace(), local)
            }
            EqNameToken::Prefixed(prefix, local) => {
                Name::prefixed(&self.resolve_prefix(prefix)?, local, prefix)
            }
            EqNameToken::Uri(uri, local) => Name::new(uri, local),
        })
    }

    fn variable_name(&self, qname: &EqNameToken) -> Result<Name, ParserError> {
        Ok(match qname {
            EqNameToken::Local(local) => Name::local(local),
            EqNameToken::Prefixed(prefix, local) => {
                Name::prefixed(&self.resolve_prefix(prefix)?, local, prefix)
            }
            EqNameToken::Uri(uri, local) => Name::new(uri, local),
        })
    }

    // an EQName: NCName, prefix:local, or Q{uri}local
    fn eqname(&mut self) -> Result<EqNameToken, ParserError> {
        match self.bump() {
            Some(Token::NCName(local)) => Ok(EqNameToken::Local(local.to_string())),
            Some(Token::PrefixedQName(PrefixedQName { prefix, local })) => {
                Ok(EqNameToken::Prefixed(prefix, local))
            }
            Some(Token::BracedURILiteral(uri)) => match self.bump() {
                Some(Token::NCName(local)) => {
                    Ok(EqNameToken::Uri(uri.to_string(), local.to_string()))
                }
                _ => Err(self.error_here("expected a local name after Q{...}")),
            },
            _ => Err(self.error_here("expected a name")),
        }
    }

    // ---- stack machinery ----------------------------------------------------

    fn push_operand(&mut self, expr: Expr) {
        self.operands.push(expr);
        self.expect_operand = false;
    }

    fn pop_operand(&mut self) -> Result<Expr, ParserError> {
        self.operands
            .pop()
            .ok_or_else(|| self.error_here("missing operand"))
    }

    fn push_binary(&mut self, op: BinaryOp, prec: u8) -> Result<(), ParserError> {
        self.reduce_binaries(prec)?;
        self.ops.push(OpEntry::Binary(op, prec));
        self.expect_operand = true;
        Ok(())
    }

    // pop and apply operator entries with precedence >= prec, stopping
    // at any frame
    fn reduce_binaries(&mut self, prec: u8) -> Result<(), ParserError> {
        loop {
            let apply = match self.ops.last() {
                Some(OpEntry::Binary(_, p)) => *p >= prec,
                Some(OpEntry::UnaryMinus | OpEntry::UnaryPlus) => PREC_UNARY >= prec,
                Some(OpEntry::SimpleMap) => PREC_SIMPLE_MAP >= prec,
                Some(OpEntry::PathSlash | OpEntry::PathDoubleSlash) => PREC_PATH >= prec,
                _ => false,
            };
            if !apply {
                return Ok(());
            }
            let entry = self.ops.pop().unwrap();
            match entry {
                OpEntry::Binary(op, _) => {
                    let right = self.pop_operand()?;
                    let left = self.pop_operand()?;
                    self.operands.push(Expr::Binary {
                        op,
                        left: Box::new(left),
                        right: Box::new(right),
                    });
                }
                OpEntry::UnaryMinus => {
                    let operand = self.pop_operand()?;
                    self.operands.push(Expr::UnaryMinus(Box::new(operand)));
                }
                OpEntry::UnaryPlus => {
                    let operand = self.pop_operand()?;
                    self.operands.push(Expr::UnaryPlus(Box::new(operand)));
                }
                OpEntry::SimpleMap => {
                    let right = self.pop_operand()?;
                    let left = self.pop_operand()?;
                    self.operands
                        .push(Expr::SimpleMap(Box::new(left), Box::new(right)));
                }
                OpEntry::PathSlash => {
                    let right = self.pop_operand()?;
                    let left = self.pop_operand()?;
                    let mut steps = left.into_steps();
                    steps.extend(right.into_steps());
                    self.operands.push(Expr::Path(PathExpr { steps }));
                }
                OpEntry::PathDoubleSlash => {
                    let right = self.pop_operand()?;
                    let left = self.pop_operand()?;
                    let mut steps = left.into_steps();
                    steps.push(descendant_or_self_step());
                    steps.extend(right.into_steps());
                    self.operands.push(Expr::Path(PathExpr { steps }));
                }
                OpEntry::Frame(_) => unreachable!(),
            }
        }
    }

    // complete keyword-delimited frames (else-branches, return bodies)
    // that end at a separator, closing bracket, or end of input
    fn close_keyword_frames(&mut self) -> Result<(), ParserError> {
        loop {
            self.reduce_binaries(0)?;
            match self.ops.last() {
                Some(OpEntry::Frame(Frame::IfElse { .. })) => {
                    let frame = self.pop_frame();
                    if let Frame::IfElse { condition, then } = frame {
                        let else_ = self.pop_operand()?;
                        self.operands.push(Expr::If {
                            condition: Box::new(condition),
                            then: Box::new(then),
                            else_: Box::new(else_),
                        });
                    }
                }
                Some(OpEntry::Frame(Frame::BindingBody { .. })) => {
                    let frame = self.pop_frame();
                    if let Frame::BindingBody { kind, bindings } = frame {
                        let body = self.pop_operand()?;
                        self.operands.push(Expr::Binding {
                            kind,
                            bindings,
                            body: Box::new(body),
                        });
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn pop_frame(&mut self) -> Frame {
        match self.ops.pop() {
            Some(OpEntry::Frame(frame)) => frame,
            _ => unreachable!("pop_frame on a non-frame entry"),
        }
    }

    fn top_frame(&mut self) -> Result<&mut Frame, ParserError> {
        match self.ops.last_mut() {
            Some(OpEntry::Frame(frame)) => Ok(frame),
            _ => Err(ParserError::new("internal frame error", 0..0)),
        }
    }

    // ---- driver -------------------------------------------------------------

    fn parse(mut self) -> Result<Expr, ParserError> {
        loop {
            if self.pos >= self.tokens.len() {
                break;
            }
            if self.expect_operand {
                self.operand()?;
            } else {
                self.operator()?;
            }
        }
        if self.expect_operand {
            return Err(self.error_here("unexpected end of expression"));
        }
        self.close_keyword_frames()?;
        match self.ops.pop() {
            Some(OpEntry::Frame(Frame::Top { mut items })) if self.ops.is_empty() => {
                let last = self.pop_operand()?;
                if items.is_empty() {
                    Ok(last)
                } else {
                    items.push(last);
                    Ok(Expr::Sequence(items))
                }
            }
            _ => Err(self.error_here("unterminated expression")),
        }
    }

    // ---- operand state ------------------------------------------------------

    fn operand(&mut self) -> Result<(), ParserError> {
        let token = match self.peek() {
            Some(token) => token.clone(),
            None => return Err(self.error_here("expected an expression")),
        };
        match token {
            Token::IntegerLiteral(value) => {
                self.bump();
                self.push_operand(Expr::Literal(Literal::Integer(value)));
            }
            Token::DecimalLiteral(value) => {
                self.bump();
                self.push_operand(Expr::Literal(Literal::Decimal(value)));
            }
            Token::DoubleLiteral(value) => {
                self.bump();
                self.push_operand(Expr::Literal(Literal::Double(value)));
            }
            Token::StringLiteral(value) => {
                self.bump();
                self.push_operand(Expr::Literal(Literal::String(value)));
            }
            Token::Dollar => {
                self.bump();
                let qname = self.eqname()?;
                let name = self.variable_name(&qname)?;
                self.push_operand(Expr::VarRef(name));
            }
            Token::Dot => {
                self.bump();
                self.push_operand(Expr::ContextItem);
            }
            Token::DotDot => {
                self.bump();
                self.push_operand(Expr::Path(PathExpr {
                    steps: vec![Step::Axis {
                        axis: Axis::Parent,
                        test: NodeTest::Kind(KindTest::AnyKind),
                        predicates: Vec::new(),
                    }],
                }));
            }
            Token::Minus => {
                self.bump();
                self.ops.push(OpEntry::UnaryMinus);
            }
            Token::Plus => {
                self.bump();
                self.ops.push(OpEntry::UnaryPlus);
            }
            Token::Slash => {
                self.bump();
                self.operands.push(Expr::Path(PathExpr {
                    steps: vec![Step::Root],
                }));
                if self.starts_step() {
                    self.ops.push(OpEntry::PathSlash);
                } else {
                    self.expect_operand = false;
                }
            }
            Token::DoubleSlash => {
                self.bump();
                self.operands.push(Expr::Path(PathExpr {
                    steps: vec![Step::Root],
                }));
                self.ops.push(OpEntry::PathDoubleSlash);
            }
            Token::At => {
                self.bump();
                let test = self.node_test(true)?;
                self.push_operand(Expr::Path(PathExpr {
                    steps: vec![Step::Axis {
                        axis: Axis::Attribute,
                        test,
                        predicates: Vec::new(),
                    }],
                }));
            }
            Token::Asterisk => {
                self.bump();
                self.push_operand(child_step(NodeTest::Name(NameTest::Any)));
            }
            Token::AsteriskColon(local) => {
                self.bump();
                self.push_operand(child_step(NodeTest::Name(NameTest::AnyNamespace {
                    local: local.to_string(),
                })));
            }
            Token::ColonAsterisk(prefix) => {
                let namespace = self.resolve_prefix(prefix)?;
                self.bump();
                self.push_operand(child_step(NodeTest::Name(NameTest::AnyLocal { namespace })));
            }
            Token::LeftParen => {
                self.bump();
                if self.peek() == Some(&Token::RightParen) {
                    self.bump();
                    self.push_operand(Expr::Empty);
                } else {
                    self.ops
                        .push(OpEntry::Frame(Frame::Paren { items: Vec::new() }));
                }
            }
            Token::LeftBracket => {
                self.bump();
                if self.peek() == Some(&Token::RightBracket) {
                    self.bump();
                    self.push_operand(Expr::SquareArray(Vec::new()));
                } else {
                    self.ops
                        .push(OpEntry::Frame(Frame::SquareArray { items: Vec::new() }));
                }
            }
            Token::QuestionMark => {
                self.bump();
                if matches!(
                    self.peek(),
                    Some(Token::Comma) | Some(Token::RightParen) | None
                ) {
                    // an argument placeholder for partial application
                    self.push_operand(Expr::Placeholder);
                } else {
                    self.unary_lookup()?;
                }
            }
            Token::NCName(_) | Token::PrefixedQName(_) | Token::BracedURILiteral(_) => {
                self.name_operand()?;
            }
            other => {
                return Err(self.error_here(format!("unexpected token {other:?}")));
            }
        }
        Ok(())
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(
                Token::NCName(_)
                    | Token::PrefixedQName(_)
                    | Token::BracedURILiteral(_)
                    | Token::Asterisk
                    | Token::AsteriskColon(_)
                    | Token::ColonAsterisk(_)
                    | Token::At
                    | Token::Dot
                    | Token::DotDot
                    | Token::Dollar
                    | Token::LeftParen
            )
        )
    }

    fn unary_lookup(&mut self) -> Result<(), ParserError> {
        match self.peek().cloned() {
            Some(Token::NCName(name)) => {
                self.bump();
                self.push_operand(Expr::UnaryLookup(LookupKey::Name(name.to_string())));
            }
            Some(Token::IntegerLiteral(value)) => {
                self.bump();
                self.push_operand(Expr::UnaryLookup(LookupKey::Integer(value)));
            }
            Some(Token::Asterisk) => {
                self.bump();
                self.push_operand(Expr::UnaryLookup(LookupKey::Wildcard));
            }
            Some(Token::LeftParen) => {
                self.bump();
                self.ops
                    .push(OpEntry::Frame(Frame::LookupParen { base: None }));
                self.expect_operand = true;
            }
            _ => return Err(self.error_here("expected a lookup key after '?'")),
        }
        Ok(())
    }

    // a name in operand position: keyword construct, function call,
    // kind test, named function ref, or a child-axis name test step
    fn name_operand(&mut self) -> Result<(), ParserError> {
        if let Some(Token::NCName(name)) = self.peek() {
            let name = *name;
            // axis specifier
            if self.peek2() == Some(&Token::DoubleColon) {
                let axis = Axis::by_name(name)
                    .ok_or_else(|| self.error_here(format!("unknown axis {name:?}")))?;
                self.bump();
                self.bump();
                let test = self.node_test(axis == Axis::Attribute)?;
                self.push_operand(Expr::Path(PathExpr {
                    steps: vec![Step::Axis {
                        axis,
                        test,
                        predicates: Vec::new(),
                    }],
                }));
                return Ok(());
            }
            match (name, self.peek2()) {
                ("if", Some(Token::LeftParen)) => {
                    self.bump();
                    self.bump();
                    self.ops.push(OpEntry::Frame(Frame::IfCond));
                    self.expect_operand = true;
                    return Ok(());
                }
                ("for" | "let" | "some" | "every", Some(Token::Dollar)) => {
                    let kind = match name {
                        "for" => BindingKind::For,
                        "let" => BindingKind::Let,
                        "some" => BindingKind::Some,
                        _ => BindingKind::Every,
                    };
                    self.bump();
                    self.binding_head(kind, Vec::new())?;
                    return Ok(());
                }
                ("function", Some(Token::LeftParen)) => {
                    self.bump();
                    self.bump();
                    self.inline_function()?;
                    return Ok(());
                }
                ("map", Some(Token::LeftBrace)) => {
                    self.bump();
                    self.bump();
                    if self.peek() == Some(&Token::RightBrace) {
                        self.bump();
                        self.push_operand(Expr::MapConstructor(Vec::new()));
                    } else {
                        self.ops.push(OpEntry::Frame(Frame::MapCtor {
                            entries: Vec::new(),
                            key: None,
                        }));
                        self.expect_operand = true;
                    }
                    return Ok(());
                }
                ("array", Some(Token::LeftBrace)) => {
                    self.bump();
                    self.bump();
                    if self.peek() == Some(&Token::RightBrace) {
                        self.bump();
                        self.push_operand(Expr::CurlyArray(None));
                    } else {
                        self.ops.push(OpEntry::Frame(Frame::CurlyArray));
                        self.expect_operand = true;
                    }
                    return Ok(());
                }
                _ => {}
            }
            // kind test used as a step
            if is_kind_test_name(name) && self.peek2() == Some(&Token::LeftParen) {
                let test = self.kind_test(0)?;
                let axis = if matches!(
                    test,
                    KindTest::Attribute { .. } | KindTest::SchemaAttribute(_)
                ) {
                    Axis::Attribute
                } else {
                    Axis::Child
                };
                self.push_operand(Expr::Path(PathExpr {
                    steps: vec![Step::Axis {
                        axis,
                        test: NodeTest::Kind(test),
                        predicates: Vec::new(),
                    }],
                }));
                return Ok(());
            }
        }
        // a general EQName: call, function ref, or name test
        let qname = self.eqname()?;
        match self.peek() {
            Some(Token::LeftParen) => {
                if let EqNameToken::Local(local) = &qname {
                    if is_reserved_function_name(local) {
                        return Err(
                            self.error_here(format!("{local:?} is not a valid function name"))
                        );
                    }
                }
                let name = self.function_name(&qname)?;
                self.bump();
                if self.peek() == Some(&Token::RightParen) {
                    self.bump();
                    self.push_operand(Expr::FunctionCall {
                        name,
                        args: Vec::new(),
                    });
                } else {
                    self.ops.push(OpEntry::Frame(Frame::Call {
                        name,
                        args: Vec::new(),
                    }));
                    self.expect_operand = true;
                }
            }
            Some(Token::Hash) => {
                let name = self.function_name(&qname)?;
                self.bump();
                match self.bump() {
                    Some(Token::IntegerLiteral(arity)) => {
                        let arity: usize = arity
                            .try_into()
                            .map_err(|_| self.error_here("arity out of range"))?;
                        self.push_operand(Expr::NamedFunctionRef { name, arity });
                    }
                    _ => return Err(self.error_here("expected an arity after '#'")),
                }
            }
            _ => {
                let name = self.element_name(&qname)?;
                self.push_operand(child_step(NodeTest::Name(NameTest::Name(name))));
            }
        }
        Ok(())
    }

    // `$x in/:= expr` clauses; called with '$' as the next token
    fn binding_head(
        &mut self,
        kind: BindingKind,
        bindings: Vec<(Name, Expr)>,
    ) -> Result<(), ParserError> {
        self.expect_token(&Token::Dollar)?;
        let qname = self.eqname()?;
        let var = self.variable_name(&qname)?;
        if kind == BindingKind::Let {
            self.expect_token(&Token::ColonEqual)?;
        } else {
            self.expect_keyword("in")?;
        }
        self.ops.push(OpEntry::Frame(Frame::BindingIn {
            kind,
            bindings,
            var,
        }));
        self.expect_operand = true;
        Ok(())
    }

    // params and return type already at '(' consumed
    fn inline_function(&mut self) -> Result<(), ParserError> {
        let mut params = Vec::new();
        if self.peek() != Some(&Token::RightParen) {
            loop {
                self.expect_token(&Token::Dollar)?;
                let qname = self.eqname()?;
                let name = self.variable_name(&qname)?;
                let type_ = if self.at_keyword("as") {
                    self.bump();
                    Some(self.sequence_type(0)?)
                } else {
                    None
                };
                if params.iter().any(|p: &Param| p.name == name) {
                    return Err(self.error_here("duplicate parameter name"));
                }
                params.push(Param { name, type_ });
                match self.peek() {
                    Some(Token::Comma) => {
                        self.bump();
                    }
                    _ => break,
                }
            }
        }
        self.expect_token(&Token::RightParen)?;
        let return_type = if self.at_keyword("as") {
            self.bump();
            Some(self.sequence_type(0)?)
        } else {
            None
        };
        self.expect_token(&Token::LeftBrace)?;
        if self.peek() == Some(&Token::RightBrace) {
            self.bump();
            self.push_operand(Expr::InlineFunction(InlineFunction {
                params,
                return_type,
                body: Box::new(Expr::Empty),
            }));
        } else {
            self.ops.push(OpEntry::Frame(Frame::FunctionBody {
                params,
                return_type,
            }));
            self.expect_operand = true;
        }
        Ok(())
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::NCName(name)) if *name == keyword)
    }

    // ---- operator state -----------------------------------------------------

    fn operator(&mut self) -> Result<(), ParserError> {
        let token = match self.peek() {
            Some(token) => token.clone(),
            None => return Ok(()),
        };
        match token {
            Token::Comma => {
                self.bump();
                self.separator_comma()?;
            }
            Token::RightParen => {
                self.bump();
                self.close_paren()?;
            }
            Token::RightBracket => {
                self.bump();
                self.close_bracket()?;
            }
            Token::RightBrace => {
                self.bump();
                self.close_brace()?;
            }
            Token::Colon => {
                self.bump();
                self.close_keyword_frames()?;
                let key = self.pop_operand()?;
                match self.top_frame()? {
                    Frame::MapCtor { key: slot, .. } if slot.is_none() => {
                        *slot = Some(key);
                        self.expect_operand = true;
                    }
                    _ => return Err(self.error_here("unexpected ':'")),
                }
            }
            Token::LeftBracket => {
                self.bump();
                let base = self.pop_operand()?;
                self.ops.push(OpEntry::Frame(Frame::Predicate { base }));
                self.expect_operand = true;
            }
            Token::LeftParen => {
                self.bump();
                let base = self.pop_operand()?;
                if self.peek() == Some(&Token::RightParen) {
                    self.bump();
                    self.push_operand(Expr::DynamicCall {
                        base: Box::new(base),
                        args: Vec::new(),
                    });
                } else {
                    self.ops.push(OpEntry::Frame(Frame::DynCall {
                        base,
                        args: Vec::new(),
                    }));
                    self.expect_operand = true;
                }
            }
            Token::QuestionMark => {
                self.bump();
                self.postfix_lookup()?;
            }
            Token::Slash => {
                self.bump();
                self.reduce_binaries(PREC_PATH)?;
                self.ops.push(OpEntry::PathSlash);
                self.expect_operand = true;
            }
            Token::DoubleSlash => {
                self.bump();
                self.reduce_binaries(PREC_PATH)?;
                self.ops.push(OpEntry::PathDoubleSlash);
                self.expect_operand = true;
            }
            Token::ExclamationMark => {
                self.bump();
                self.reduce_binaries(PREC_SIMPLE_MAP)?;
                self.ops.push(OpEntry::SimpleMap);
                self.expect_operand = true;
            }
            Token::Arrow => {
                self.bump();
                self.arrow()?;
            }
            Token::Plus => {
                self.bump();
                self.push_binary(BinaryOp::Add, PREC_ADDITIVE)?;
            }
            Token::Minus => {
                self.bump();
                self.push_binary(BinaryOp::Sub, PREC_ADDITIVE)?;
            }
            Token::Asterisk => {
                self.bump();
                self.push_binary(BinaryOp::Mul, PREC_MULTIPLICATIVE)?;
            }
            Token::Pipe => {
                self.bump();
                self.push_binary(BinaryOp::Union, PREC_UNION)?;
            }
            Token::DoublePipe => {
                self.bump();
                self.push_binary(BinaryOp::Concat, PREC_CONCAT)?;
            }
            Token::Equal => {
                self.bump();
                self.push_binary(BinaryOp::GenEq, PREC_COMPARISON)?;
            }
            Token::NotEqual => {
                self.bump();
                self.push_binary(BinaryOp::GenNe, PREC_COMPARISON)?;
            }
            Token::LessThan => {
                self.bump();
                self.push_binary(BinaryOp::GenLt, PREC_COMPARISON)?;
            }
            Token::LessThanEqual => {
                self.bump();
                self.push_binary(BinaryOp::GenLe, PREC_COMPARISON)?;
            }
            Token::GreaterThan => {
                self.bump();
                self.push_binary(BinaryOp::GenGt, PREC_COMPARISON)?;
            }
            Token::GreaterThanEqual => {
                self.bump();
                self.push_binary(BinaryOp::GenGe, PREC_COMPARISON)?;
            }
            Token::Precedes => {
                self.bump();
                self.push_binary(BinaryOp::Precedes, PREC_COMPARISON)?;
            }
            Token::Follows => {
                self.bump();
                self.push_binary(BinaryOp::Follows, PREC_COMPARISON)?;
            }
            Token::NCName(keyword) => {
                self.keyword_operator(keyword)?;
            }
            other => {
                return Err(self.error_here(format!("unexpected token {other:?}")));
            }
        }
        Ok(())
    }

    fn keyword_operator(&mut self, keyword: &str) -> Result<(), ParserError> {
        match keyword {
            "or" => {
                self.bump();
                self.push_binary(BinaryOp::Or, PREC_OR)
            }
            "and" => {
                self.bump();
                self.push_binary(BinaryOp::And, PREC_AND)
            }
            "eq" => {
                self.bump();
                self.push_binary(BinaryOp::ValEq, PREC_COMPARISON)
            }
            "ne" => {
                self.bump();
                self.push_binary(BinaryOp::ValNe, PREC_COMPARISON)
            }
            "lt" => {
                self.bump();
                self.push_binary(BinaryOp::ValLt, PREC_COMPARISON)
            }
            "le" => {
                self.bump();
                self.push_binary(BinaryOp::ValLe, PREC_COMPARISON)
            }
            "gt" => {
                self.bump();
                self.push_binary(BinaryOp::ValGt, PREC_COMPARISON)
            }
            "ge" => {
                self.bump();
                self.push_binary(BinaryOp::ValGe, PREC_COMPARISON)
            }
            "is" => {
                self.bump();
                self.push_binary(BinaryOp::Is, PREC_COMPARISON)
            }
            "to" => {
                self.bump();
                self.push_binary(BinaryOp::Range, PREC_RANGE)
            }
            "div" => {
                self.bump();
                self.push_binary(BinaryOp::Div, PREC_MULTIPLICATIVE)
            }
            "idiv" => {
                self.bump();
                self.push_binary(BinaryOp::IDiv, PREC_MULTIPLICATIVE)
            }
            "mod" => {
                self.bump();
                self.push_binary(BinaryOp::Mod, PREC_MULTIPLICATIVE)
            }
            "union" => {
                self.bump();
                self.push_binary(BinaryOp::Union, PREC_UNION)
            }
            "intersect" => {
                self.bump();
                self.push_binary(BinaryOp::Intersect, PREC_INTERSECT)
            }
            "except" => {
                self.bump();
                self.push_binary(BinaryOp::Except, PREC_INTERSECT)
            }
            "instance" => {
                self.bump();
                self.expect_keyword("of")?;
                self.reduce_binaries(PREC_INSTANCE_OF)?;
                let expr = self.pop_operand()?;
                let target = self.sequence_type(0)?;
                self.push_operand(Expr::InstanceOf {
                    expr: Box::new(expr),
                    target,
                });
                Ok(())
            }
            "treat" => {
                self.bump();
                self.expect_keyword("as")?;
                self.reduce_binaries(PREC_TREAT)?;
                let expr = self.pop_operand()?;
                let target = self.sequence_type(0)?;
                self.push_operand(Expr::Treat {
                    expr: Box::new(expr),
                    target,
                });
                Ok(())
            }
            "castable" => {
                self.bump();
                self.expect_keyword("as")?;
                self.reduce_binaries(PREC_CASTABLE)?;
                let expr = self.pop_operand()?;
                let target = self.single_type()?;
                self.push_operand(Expr::Castable {
                    expr: Box::new(expr),
                    target,
                });
                Ok(())
            }
            "cast" => {
                self.bump();
                self.expect_keyword("as")?;
                self.reduce_binaries(PREC_CAST)?;
                let expr = self.pop_operand()?;
                let target = self.single_type()?;
                self.push_operand(Expr::Cast {
                    expr: Box::new(expr),
                    target,
                });
                Ok(())
            }
            "else" => {
                self.bump();
                self.reduce_binaries(0)?;
                match self.ops.last() {
                    Some(OpEntry::Frame(Frame::IfThen { .. })) => {
                        let frame = self.pop_frame();
                        if let Frame::IfThen { condition } = frame {
                            let then = self.pop_operand()?;
                            self.ops
                                .push(OpEntry::Frame(Frame::IfElse { condition, then }));
                            self.expect_operand = true;
                        }
                        Ok(())
                    }
                    _ => Err(self.error_here("'else' without matching 'if'")),
                }
            }
            "return" => {
                self.bump();
                self.finish_binding_list(&[BindingKind::For, BindingKind::Let])
            }
            "satisfies" => {
                self.bump();
                self.finish_binding_list(&[BindingKind::Some, BindingKind::Every])
            }
            other => Err(self.error_here(format!("unexpected name {other:?}"))),
        }
    }

    fn finish_binding_list(&mut self, kinds: &[BindingKind]) -> Result<(), ParserError> {
        self.close_keyword_frames()?;
        match self.ops.last() {
            Some(OpEntry::Frame(Frame::BindingIn { kind, .. })) if kinds.contains(kind) => {
                let frame = self.pop_frame();
                if let Frame::BindingIn {
                    kind,
                    mut bindings,
                    var,
                } = frame
                {
                    let value = self.pop_operand()?;
                    bindings.push((var, value));
                    self.ops
                        .push(OpEntry::Frame(Frame::BindingBody { kind, bindings }));
                    self.expect_operand = true;
                }
                Ok(())
            }
            _ => Err(self.error_here("misplaced 'return' or 'satisfies'")),
        }
    }

    fn arrow(&mut self) -> Result<(), ParserError> {
        self.reduce_binaries(PREC_ARROW)?;
        let base = self.pop_operand()?;
        let target = match self.peek() {
            Some(Token::Dollar) => {
                self.bump();
                let qname = self.eqname()?;
                ArrowTarget::Expr(Expr::VarRef(self.variable_name(&qname)?))
            }
            _ => {
                let qname = self.eqname()?;
                ArrowTarget::Named(self.function_name(&qname)?)
            }
        };
        self.expect_token(&Token::LeftParen)?;
        if self.peek() == Some(&Token::RightParen) {
            self.bump();
            self.push_operand(apply_arrow(target, vec![base]));
        } else {
            self.ops.push(OpEntry::Frame(Frame::ArrowCall {
                target,
                args: vec![base],
            }));
            self.expect_operand = true;
        }
        Ok(())
    }

    fn postfix_lookup(&mut self) -> Result<(), ParserError> {
        let base = self.pop_operand()?;
        match self.peek().cloned() {
            Some(Token::NCName(name)) => {
                self.bump();
                self.push_operand(Expr::Lookup {
                    base: Box::new(base),
                    key: LookupKey::Name(name.to_string()),
                });
            }
            Some(Token::IntegerLiteral(value)) => {
                self.bump();
                self.push_operand(Expr::Lookup {
                    base: Box::new(base),
                    key: LookupKey::Integer(value),
                });
            }
            Some(Token::Asterisk) => {
                self.bump();
                self.push_operand(Expr::Lookup {
                    base: Box::new(base),
                    key: LookupKey::Wildcard,
                });
            }
            Some(Token::LeftParen) => {
                self.bump();
                self.ops
                    .push(OpEntry::Frame(Frame::LookupParen { base: Some(base) }));
                self.expect_operand = true;
            }
            _ => return Err(self.error_here("expected a lookup key after '?'")),
        }
        Ok(())
    }

    // ---- separators and closers --------------------------------------------

    fn separator_comma(&mut self) -> Result<(), ParserError> {
        self.close_keyword_frames()?;
        let operand = self.pop_operand()?;
        // another binding clause follows a comma inside for/let/some/every
        if matches!(
            self.ops.last(),
            Some(OpEntry::Frame(Frame::BindingIn { .. }))
        ) {
            if let Frame::BindingIn {
                kind,
                mut bindings,
                var,
            } = self.pop_frame()
            {
                bindings.push((var, operand));
                self.binding_head(kind, bindings)?;
            }
            return Ok(());
        }
        let misplaced = self.error_here("unexpected ','");
        match self.ops.last_mut() {
            Some(OpEntry::Frame(frame)) => match frame {
                Frame::Top { items } | Frame::Paren { items } | Frame::SquareArray { items } => {
                    items.push(operand);
                }
                Frame::Call { args, .. }
                | Frame::DynCall { args, .. }
                | Frame::ArrowCall { args, .. } => {
                    args.push(operand);
                }
                Frame::MapCtor { entries, key } => {
                    let key = key.take().ok_or(misplaced)?;
                    entries.push((key, operand));
                }
                _ => return Err(misplaced),
            },
            _ => return Err(misplaced),
        }
        self.expect_operand = true;
        Ok(())
    }

    fn close_paren(&mut self) -> Result<(), ParserError> {
        self.close_keyword_frames()?;
        let operand = self.pop_operand()?;
        let frame = match self.ops.last() {
            Some(OpEntry::Frame(_)) => self.pop_frame(),
            _ => return Err(self.error_here("unexpected ')'")),
        };
        match frame {
            Frame::Paren { mut items } => {
                if items.is_empty() {
                    self.push_operand(Expr::Parenthesized(Box::new(operand)));
                } else {
                    items.push(operand);
                    self.push_operand(Expr::Parenthesized(Box::new(Expr::Sequence(items))));
                }
            }
            Frame::Call { name, mut args } => {
                args.push(operand);
                self.push_operand(Expr::FunctionCall { name, args });
            }
            Frame::DynCall { base, mut args } => {
                args.push(operand);
                self.push_operand(Expr::DynamicCall {
                    base: Box::new(base),
                    args,
                });
            }
            Frame::ArrowCall { target, mut args } => {
                args.push(operand);
                self.push_operand(apply_arrow(target, args));
            }
            Frame::IfCond => {
                self.expect_keyword("then")?;
                self.ops
                    .push(OpEntry::Frame(Frame::IfThen { condition: operand }));
                self.expect_operand = true;
            }
            Frame::LookupParen { base } => match base {
                Some(base) => self.push_operand(Expr::Lookup {
                    base: Box::new(base),
                    key: LookupKey::Expr(Box::new(operand)),
                }),
                None => {
                    self.push_operand(Expr::UnaryLookup(LookupKey::Expr(Box::new(operand))));
                }
            },
            other => {
                self.ops.push(OpEntry::Frame(other));
                return Err(self.error_here("unexpected ')'"));
            }
        }
        Ok(())
    }

    fn close_bracket(&mut self) -> Result<(), ParserError> {
        self.close_keyword_frames()?;
        let operand = self.pop_operand()?;
        let frame = match self.ops.last() {
            Some(OpEntry::Frame(_)) => self.pop_frame(),
            _ => return Err(self.error_here("unexpected ']'")),
        };
        match frame {
            Frame::SquareArray { mut items } => {
                items.push(operand);
                self.push_operand(Expr::SquareArray(items));
            }
            Frame::Predicate { base } => {
                let expr = attach_predicate(base, operand);
                self.push_operand(expr);
            }
            other => {
                self.ops.push(OpEntry::Frame(other));
                return Err(self.error_here("unexpected ']'"));
            }
        }
        Ok(())
    }

    fn close_brace(&mut self) -> Result<(), ParserError> {
        self.close_keyword_frames()?;
        let operand = self.pop_operand()?;
        let frame = match self.ops.last() {
            Some(OpEntry::Frame(_)) => self.pop_frame(),
            _ => return Err(self.error_here("unexpected '}'")),
        };
        match frame {
            Frame::MapCtor { mut entries, key } => {
                let key = key.ok_or_else(|| self.error_here("map entry is missing its key"))?;
                entries.push((key, operand));
                self.push_operand(Expr::MapConstructor(entries));
            }
            Frame::CurlyArray => {
                self.push_operand(Expr::CurlyArray(Some(Box::new(operand))));
            }
            Frame::FunctionBody {
                params,
                return_type,
            } => {
                self.push_operand(Expr::InlineFunction(InlineFunction {
                    params,
                    return_type,
                    body: Box::new(operand),
                }));
            }
            other => {
                self.ops.push(OpEntry::Frame(other));
                return Err(self.error_here("unexpected '}'"));
            }
        }
        Ok(())
    }

    // ---- node tests ---------------------------------------------------------

    fn node_test(&mut self, attribute_axis: bool) -> Result<NodeTest, ParserError> {
        match self.peek().cloned() {
            Some(Token::Asterisk) => {
                self.bump();
                Ok(NodeTest::Name(NameTest::Any))
            }
            Some(Token::AsteriskColon(local)) => {
                self.bump();
                Ok(NodeTest::Name(NameTest::AnyNamespace {
                    local: local.to_string(),
                }))
            }
            Some(Token::ColonAsterisk(prefix)) => {
                let namespace = self.resolve_prefix(prefix)?;
                self.bump();
                Ok(NodeTest::Name(NameTest::AnyLocal { namespace }))
            }
            Some(Token::NCName(name))
                if is_kind_test_name(name) && self.peek2() == Some(&Token::LeftParen) =>
            {
                Ok(NodeTest::Kind(self.kind_test(0)?))
            }
            _ => {
                let qname = self.eqname()?;
                let name = if attribute_axis {
                    // attribute names never take the default namespace
                    match &qname {
                        EqNameToken::Local(local) => Name::local(local),
                        _ => self.element_name(&qname)?,
                    }
                } else {
                    self.element_name(&qname)?
                };
                Ok(NodeTest::Name(NameTest::Name(name)))
            }
        }
    }

    // the name has been peeked, not consumed
    fn kind_test(&mut self, depth: usize) -> Result<KindTest, ParserError> {
        if depth > MAX_TYPE_DEPTH {
            return Err(self.error_here("kind test is nested too deeply"));
        }
        let name = match self.bump() {
            Some(Token::NCName(name)) => name.to_string(),
            _ => return Err(self.error_here("expected a kind test")),
        };
        self.expect_token(&Token::LeftParen)?;
        let test = match name.as_str() {
            "node" => KindTest::AnyKind,
            "text" => KindTest::Text,
            "comment" => KindTest::Comment,
            "namespace-node" => KindTest::NamespaceNode,
            "processing-instruction" => {
                let target = match self.peek().cloned() {
                    Some(Token::NCName(target)) => {
                        self.bump();
                        Some(target.to_string())
                    }
                    Some(Token::StringLiteral(target)) => {
                        self.bump();
                        Some(target.trim().to_string())
                    }
                    _ => None,
                };
                KindTest::Pi(target)
            }
            "document-node" => {
                let inner = if matches!(self.peek(), Some(Token::NCName(n)) if is_kind_test_name(n))
                {
                    Some(Box::new(self.kind_test(depth + 1)?))
                } else {
                    None
                };
                KindTest::Document(inner)
            }
            "element" => {
                let (name, type_name, nillable) = self.element_test_args()?;
                KindTest::Element {
                    name,
                    type_name,
                    nillable,
                }
            }
            "attribute" => {
                let (name, type_name, _) = self.element_test_args()?;
                KindTest::Attribute { name, type_name }
            }
            "schema-element" => {
                let qname = self.eqname()?;
                KindTest::SchemaElement(self.element_name(&qname)?)
            }
            "schema-attribute" => {
                let qname = self.eqname()?;
                KindTest::SchemaAttribute(self.element_name(&qname)?)
            }
            other => return Err(self.error_here(format!("unknown kind test {other:?}"))),
        };
        self.expect_token(&Token::RightParen)?;
        Ok(test)
    }

    fn element_test_args(
        &mut self,
    ) -> Result<(Option<Name>, Option<Name>, bool), ParserError> {
        if self.peek() == Some(&Token::RightParen) {
            return Ok((None, None, false));
        }
        let name = match self.peek() {
            Some(Token::Asterisk) => {
                self.bump();
                None
            }
            _ => {
                let qname = self.eqname()?;
                Some(self.element_name(&qname)?)
            }
        };
        let mut type_name = None;
        let mut nillable = false;
        if self.peek() == Some(&Token::Comma) {
            self.bump();
            let qname = self.eqname()?;
            type_name = Some(self.type_name(&qname)?);
            if self.peek() == Some(&Token::QuestionMark) {
                self.bump();
                nillable = true;
            }
        }
        Ok((name, type_name, nillable))
    }

    fn type_name(&self, qname: &EqNameToken) -> Result<Name, ParserError> {
        // unprefixed type names live in the xs namespace
        Ok(match qname {
            EqNameToken::Local(local) => Name::new(XS_NAMESPACE, local),
            other => self.element_name(other)?,
        })
    }

    // ---- types --------------------------------------------------------------

    fn single_type(&mut self) -> Result<SingleType, ParserError> {
        let qname = self.eqname()?;
        let name = self.type_name(&qname)?;
        let optional = if self.peek() == Some(&Token::QuestionMark) {
            self.bump();
            true
        } else {
            false
        };
        Ok(SingleType { name, optional })
    }

    fn sequence_type(&mut self, depth: usize) -> Result<SequenceType, ParserError> {
        if depth > MAX_TYPE_DEPTH {
            return Err(self.error_here("sequence type is nested too deeply"));
        }
        if self.at_keyword("empty-sequence") && self.peek2() == Some(&Token::LeftParen) {
            self.bump();
            self.bump();
            self.expect_token(&Token::RightParen)?;
            return Ok(SequenceType::Empty);
        }
        let item = self.item_type(depth)?;
        let occurrence = match self.peek() {
            Some(Token::QuestionMark) => {
                self.bump();
                Occurrence::Optional
            }
            Some(Token::Asterisk) => {
                self.bump();
                Occurrence::Many
            }
            Some(Token::Plus) => {
                self.bump();
                Occurrence::NonEmpty
            }
            _ => Occurrence::One,
        };
        Ok(SequenceType::Item(item, occurrence))
    }

    fn item_type(&mut self, depth: usize) -> Result<ItemType, ParserError> {
        match self.peek().cloned() {
            Some(Token::NCName("item")) if self.peek2() == Some(&Token::LeftParen) => {
                self.bump();
                self.bump();
                self.expect_token(&Token::RightParen)?;
                Ok(ItemType::AnyItem)
            }
            Some(Token::NCName("map")) if self.peek2() == Some(&Token::LeftParen) => {
                self.bump();
                self.bump();
                if self.peek() == Some(&Token::Asterisk) {
                    self.bump();
                    self.expect_token(&Token::RightParen)?;
                    return Ok(ItemType::Map(None));
                }
                let key = self.item_type(depth + 1)?;
                self.expect_token(&Token::Comma)?;
                let value = self.sequence_type(depth + 1)?;
                self.expect_token(&Token::RightParen)?;
                Ok(ItemType::Map(Some(Box::new((key, value)))))
            }
            Some(Token::NCName("array")) if self.peek2() == Some(&Token::LeftParen) => {
                self.bump();
                self.bump();
                if self.peek() == Some(&Token::Asterisk) {
                    self.bump();
                    self.expect_token(&Token::RightParen)?;
                    return Ok(ItemType::Array(None));
                }
                let member = self.sequence_type(depth + 1)?;
                self.expect_token(&Token::RightParen)?;
                Ok(ItemType::Array(Some(Box::new(member))))
            }
            Some(Token::NCName("function")) if self.peek2() == Some(&Token::LeftParen) => {
                self.bump();
                self.bump();
                if self.peek() == Some(&Token::Asterisk) {
                    self.bump();
                    self.expect_token(&Token::RightParen)?;
                    return Ok(ItemType::Function(None));
                }
                let mut params = Vec::new();
                if self.peek() != Some(&Token::RightParen) {
                    loop {
                        params.push(self.sequence_type(depth + 1)?);
                        if self.peek() == Some(&Token::Comma) {
                            self.bump();
                        } else {
                            break;
                        }
                    }
                }
                self.expect_token(&Token::RightParen)?;
                self.expect_keyword("as")?;
                let return_type = self.sequence_type(depth + 1)?;
                Ok(ItemType::Function(Some(Box::new(FunctionType {
                    params,
                    return_type,
                }))))
            }
            Some(Token::NCName(name))
                if is_kind_test_name(name) && self.peek2() == Some(&Token::LeftParen) =>
            {
                Ok(ItemType::Kind(self.kind_test(depth + 1)?))
            }
            _ => {
                let qname = self.eqname()?;
                Ok(ItemType::Atomic(self.type_name(&qname)?))
            }
        }
    }
}

#[derive(Debug)]
enum EqNameToken {
    Local(String),
    Prefixed(String, String),
    Uri(String, String),
}

fn child_step(test: NodeTest) -> Expr {
    Expr::Path(PathExpr {
        steps: vec![Step::Axis {
            axis: Axis::Child,
            test,
            predicates: Vec::new(),
        }],
    })
}

fn descendant_or_self_step() -> Step {
    Step::Axis {
        axis: Axis::DescendantOrSelf,
        test: NodeTest::Kind(KindTest::AnyKind),
        predicates: Vec::new(),
    }
}

fn attach_predicate(base: Expr, predicate: Expr) -> Expr {
    match base {
        Expr::Path(mut path) => {
            match path.steps.last_mut() {
                Some(Step::Axis { predicates, .. }) | Some(Step::Expr { predicates, .. }) => {
                    predicates.push(predicate);
                    Expr::Path(path)
                }
                _ => Expr::Filter {
                    base: Box::new(Expr::Path(path)),
                    predicate: Box::new(predicate),
                },
            }
        }
        base => Expr::Filter {
            base: Box::new(base),
            predicate: Box::new(predicate),
        },
    }
}

fn apply_arrow(target: ArrowTarget, args: Vec<Expr>) -> Expr {
    match target {
        ArrowTarget::Named(name) => Expr::FunctionCall { name, args },
        ArrowTarget::Expr(base) => Expr::DynamicCall {
            base: Box::new(base),
            args,
        },
    }
}

fn is_kind_test_name(name: &str) -> bool {
    matches!(
        name,
        "node"
            | "text"
            | "comment"
            | "namespace-node"
            | "processing-instruction"
            | "document-node"
            | "element"
            | "attribute"
            | "schema-element"
            | "schema-attribute"
    )
}

// names that may not be used as unprefixed function names
fn is_reserved_function_name(name: &str) -> bool {
    is_kind_test_name(name)
        || matches!(
            name,
            "empty-sequence" | "function" | "if" | "item" | "map" | "array" | "switch" | "typeswitch"
        )
}
