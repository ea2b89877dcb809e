use thiserror::Error;

use crate::ast::{
    AssignTarget, BinaryOperator, Expression, ForTarget, ImportedName, Param, Program, Statement,
    UnaryOperator,
};
use crate::token::{Span, Token, TokenKind};

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("Expected {expected}, got {found} at line {line}, column {column}")]
    UnexpectedToken {
        expected: String,
        found: String,
        line: usize,
        column: usize,
    },
    #[error("Expected expression, got {found} at line {line}, column {column}")]
    ExpectedExpression {
        found: String,
        line: usize,
        column: usize,
    },
    #[error("Class bodies may only contain method definitions at line {line}, column {column}")]
    UnsupportedClassMember { line: usize, column: usize },
    #[error("Nested function definitions are not supported at line {line}, column {column}")]
    UnsupportedNestedFunction { line: usize, column: usize },
    #[error("Unsupported assignment target at line {line}, column {column}")]
    UnsupportedTarget { line: usize, column: usize },
    #[error("'{construct}' is not supported at line {line}, column {column}")]
    UnsupportedFeature {
        construct: String,
        line: usize,
        column: usize,
    },
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Python statement keywords outside the supported subset. They lex as plain
/// identifiers; rejecting them here gives a direct diagnostic instead of a
/// confusing downstream parse failure.
const UNSUPPORTED_KEYWORDS: &[&str] = &[
    "lambda", "yield", "with", "try", "except", "finally", "raise", "global", "nonlocal", "del",
    "assert", "await", "match",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockContext {
    Module,
    Function,
}

pub struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
    current: Token<'a>,
}

impl<'a> Parser<'a> {
    pub fn new(mut tokens: Vec<Token<'a>>) -> Self {
        if tokens.is_empty() {
            tokens.push(Token::new(TokenKind::Eof, Span::default()));
        }
        let current = tokens[0].clone();
        Self {
            tokens,
            pos: 0,
            current,
        }
    }

    pub fn parse_program(mut self) -> ParseResult<Program> {
        let mut statements = Vec::new();
        while !matches!(self.current.kind, TokenKind::Eof) {
            if self.consume_newlines() {
                continue;
            }
            let statement = self.parse_statement(BlockContext::Module)?;
            if !statement.is_docstring() {
                statements.push(statement);
            }
        }
        Ok(Program { statements })
    }

    fn parse_statement(&mut self, context: BlockContext) -> ParseResult<Statement> {
        match &self.current.kind {
            TokenKind::Def => self.parse_function_def(context, false),
            TokenKind::Async => self.parse_async_function_def(context),
            TokenKind::Class => self.parse_class_def(context),
            TokenKind::If => self.parse_if(context),
            TokenKind::While => self.parse_while(context),
            TokenKind::For => self.parse_for(context),
            TokenKind::Return => self.parse_return(),
            TokenKind::Pass => self.parse_pass(),
            TokenKind::Import => self.parse_import(),
            TokenKind::From => self.parse_import_from(),
            TokenKind::Identifier(name) if UNSUPPORTED_KEYWORDS.contains(name) => {
                Err(self.unsupported_feature(name))
            }
            TokenKind::Identifier(_) => self.parse_assignment_or_expression(),
            _ => {
                let span = self.current.span();
                let value = self.parse_expression()?;
                self.expect_newline()?;
                Ok(Statement::Expr { value, span })
            }
        }
    }

    fn parse_async_function_def(&mut self, context: BlockContext) -> ParseResult<Statement> {
        self.advance(); // async
        if !matches!(self.current.kind, TokenKind::Def) {
            return Err(self.unexpected("def"));
        }
        self.parse_function_def(context, true)
    }

    fn parse_function_def(
        &mut self,
        context: BlockContext,
        is_async: bool,
    ) -> ParseResult<Statement> {
        let span = self.current.span();
        if context == BlockContext::Function {
            return Err(ParseError::UnsupportedNestedFunction {
                line: span.line,
                column: span.column,
            });
        }

        self.advance(); // def
        let name = self.expect_identifier()?;
        self.expect(TokenKind::LParen, "(")?;

        let mut params = Vec::new();
        while !matches!(self.current.kind, TokenKind::RParen) {
            let param_span = self.current.span();
            let param_name = self.expect_identifier()?;
            let hint = if matches!(self.current.kind, TokenKind::Colon) {
                self.advance();
                Some(self.expect_identifier()?)
            } else {
                None
            };
            params.push(Param {
                name: param_name,
                hint,
                span: param_span,
            });
            if matches!(self.current.kind, TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(TokenKind::RParen, ")")?;

        let returns = if matches!(self.current.kind, TokenKind::Arrow) {
            self.advance();
            Some(self.expect_identifier()?)
        } else {
            None
        };

        self.expect(TokenKind::Colon, ":")?;
        let body = self.parse_block(BlockContext::Function)?;

        Ok(Statement::FunctionDef {
            name,
            params,
            returns,
            body,
            is_async,
            span,
        })
    }

    fn parse_class_def(&mut self, context: BlockContext) -> ParseResult<Statement> {
        let span = self.current.span();
        if context == BlockContext::Function {
            return Err(ParseError::UnsupportedFeature {
                construct: "class definition inside a function".to_string(),
                line: span.line,
                column: span.column,
            });
        }

        self.advance(); // class
        let name = self.expect_identifier()?;
        self.expect(TokenKind::Colon, ":")?;
        self.expect_newline()?;
        self.expect(TokenKind::Indent, "indent")?;

        let mut body = Vec::new();
        while !matches!(self.current.kind, TokenKind::Dedent | TokenKind::Eof) {
            if self.consume_newlines() {
                continue;
            }
            let member_span = self.current.span();
            match &self.current.kind {
                TokenKind::Def => body.push(self.parse_function_def(BlockContext::Module, false)?),
                TokenKind::Async => body.push(self.parse_async_function_def(BlockContext::Module)?),
                TokenKind::Pass => {
                    self.parse_pass()?;
                }
                TokenKind::String(_) => {
                    // Class docstring.
                    self.advance();
                    self.expect_newline()?;
                }
                _ => {
                    return Err(ParseError::UnsupportedClassMember {
                        line: member_span.line,
                        column: member_span.column,
                    });
                }
            }
        }
        self.expect(TokenKind::Dedent, "dedent")?;

        Ok(Statement::ClassDef { name, body, span })
    }

    fn parse_if(&mut self, context: BlockContext) -> ParseResult<Statement> {
        let span = self.current.span();
        self.advance(); // if / elif
        let condition = self.parse_expression()?;
        self.expect(TokenKind::Colon, ":")?;
        let then_body = self.parse_block(context)?;

        let mut else_body = Vec::new();
        if matches!(self.current.kind, TokenKind::Elif) {
            // An elif chain nests in the else slot.
            else_body.push(self.parse_if(context)?);
        } else if matches!(self.current.kind, TokenKind::Else) {
            self.advance();
            self.expect(TokenKind::Colon, ":")?;
            else_body = self.parse_block(context)?;
        }

        Ok(Statement::If {
            condition,
            then_body,
            else_body,
            span,
        })
    }

    fn parse_while(&mut self, context: BlockContext) -> ParseResult<Statement> {
        let span = self.current.span();
        self.advance();
        let condition = self.parse_expression()?;
        self.expect(TokenKind::Colon, ":")?;
        let body = self.parse_block(context)?;
        Ok(Statement::While {
            condition,
            body,
            span,
        })
    }

    fn parse_for(&mut self, context: BlockContext) -> ParseResult<Statement> {
        let span = self.current.span();
        self.advance();

        let mut names = vec![self.expect_identifier()?];
        while matches!(self.current.kind, TokenKind::Comma) {
            self.advance();
            names.push(self.expect_identifier()?);
        }

        self.expect(TokenKind::In, "in")?;
        let iterable = self.parse_expression()?;
        self.expect(TokenKind::Colon, ":")?;
        let body = self.parse_block(context)?;

        Ok(Statement::For {
            target: ForTarget { names },
            iterable,
            body,
            span,
        })
    }

    fn parse_return(&mut self) -> ParseResult<Statement> {
        let span = self.current.span();
        self.advance();
        if matches!(self.current.kind, TokenKind::Newline) {
            self.advance();
            return Ok(Statement::Return { value: None, span });
        }
        let value = self.parse_expression()?;
        self.expect_newline()?;
        Ok(Statement::Return {
            value: Some(value),
            span,
        })
    }

    fn parse_pass(&mut self) -> ParseResult<Statement> {
        let span = self.current.span();
        self.advance();
        self.expect_newline()?;
        Ok(Statement::Pass { span })
    }

    fn parse_import(&mut self) -> ParseResult<Statement> {
        let span = self.current.span();
        self.advance();
        let module = self.expect_identifier()?;
        let alias = if matches!(self.current.kind, TokenKind::As) {
            self.advance();
            Some(self.expect_identifier()?)
        } else {
            None
        };
        self.expect_newline()?;
        Ok(Statement::Import {
            module,
            alias,
            span,
        })
    }

    fn parse_import_from(&mut self) -> ParseResult<Statement> {
        let span = self.current.span();
        self.advance();
        let module = self.expect_identifier()?;
        self.expect(TokenKind::Import, "import")?;

        let mut names = Vec::new();
        loop {
            let name = self.expect_identifier()?;
            let alias = if matches!(self.current.kind, TokenKind::As) {
                self.advance();
                Some(self.expect_identifier()?)
            } else {
                None
            };
            names.push(ImportedName { name, alias });
            if matches!(self.current.kind, TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect_newline()?;

        Ok(Statement::ImportFrom {
            module,
            names,
            span,
        })
    }

    fn parse_assignment_or_expression(&mut self) -> ParseResult<Statement> {
        let span = self.current.span();

        // `name = ...`, `name, other = ...`, `name += ...` are decided by
        // one-token lookahead; anything else falls through to expressions.
        if let TokenKind::Identifier(_) = self.current.kind {
            match self.peek_kind() {
                TokenKind::Equal => {
                    let name = self.expect_identifier()?;
                    self.advance(); // =
                    let value = self.parse_expression()?;
                    self.expect_newline()?;
                    return Ok(Statement::Assign {
                        target: AssignTarget::Name(name),
                        value,
                        span,
                    });
                }
                TokenKind::Comma => return self.parse_tuple_assignment(span),
                TokenKind::PlusEqual
                | TokenKind::MinusEqual
                | TokenKind::StarEqual
                | TokenKind::DoubleSlashEqual
                | TokenKind::PercentEqual => return self.parse_augmented_assignment(span),
                _ => {}
            }
        }

        let value = self.parse_expression()?;

        if matches!(self.current.kind, TokenKind::Equal) {
            self.advance();
            let target = match value {
                Expression::Attribute { object, name } => AssignTarget::Attribute {
                    object: *object,
                    name,
                },
                _ => {
                    return Err(ParseError::UnsupportedTarget {
                        line: span.line,
                        column: span.column,
                    });
                }
            };
            let rhs = self.parse_expression()?;
            self.expect_newline()?;
            return Ok(Statement::Assign {
                target,
                value: rhs,
                span,
            });
        }

        self.expect_newline()?;
        Ok(Statement::Expr { value, span })
    }

    fn parse_tuple_assignment(&mut self, span: Span) -> ParseResult<Statement> {
        let mut names = vec![self.expect_identifier()?];
        while matches!(self.current.kind, TokenKind::Comma) {
            self.advance();
            names.push(self.expect_identifier()?);
        }
        self.expect(TokenKind::Equal, "=")?;
        let value = self.parse_expression()?;
        self.expect_newline()?;
        Ok(Statement::Assign {
            target: AssignTarget::Tuple(names),
            value,
            span,
        })
    }

    /// `x op= e` desugars to `x = x op e`.
    fn parse_augmented_assignment(&mut self, span: Span) -> ParseResult<Statement> {
        let name = self.expect_identifier()?;
        let op = match self.current.kind {
            TokenKind::PlusEqual => BinaryOperator::Add,
            TokenKind::MinusEqual => BinaryOperator::Sub,
            TokenKind::StarEqual => BinaryOperator::Mul,
            TokenKind::DoubleSlashEqual => BinaryOperator::FloorDiv,
            TokenKind::PercentEqual => BinaryOperator::Mod,
            _ => return Err(self.unexpected("augmented assignment operator")),
        };
        self.advance();
        let rhs = self.parse_expression()?;
        self.expect_newline()?;
        Ok(Statement::Assign {
            target: AssignTarget::Name(name.clone()),
            value: Expression::BinaryOp {
                left: Box::new(Expression::Identifier(name)),
                op,
                right: Box::new(rhs),
            },
            span,
        })
    }

    fn parse_block(&mut self, context: BlockContext) -> ParseResult<Vec<Statement>> {
        self.expect_newline()?;
        self.expect(TokenKind::Indent, "indent")?;

        let mut body = Vec::new();
        while !matches!(self.current.kind, TokenKind::Dedent | TokenKind::Eof) {
            if self.consume_newlines() {
                continue;
            }
            let statement = self.parse_statement(context)?;
            if !statement.is_docstring() {
                body.push(statement);
            }
        }
        self.expect(TokenKind::Dedent, "dedent")?;
        Ok(body)
    }

    // Expression grammar, highest precedence innermost.

    fn parse_expression(&mut self) -> ParseResult<Expression> {
        self.parse_conditional()
    }

    fn parse_conditional(&mut self) -> ParseResult<Expression> {
        let value = self.parse_or()?;
        if matches!(self.current.kind, TokenKind::If) {
            self.advance();
            let condition = self.parse_or()?;
            self.expect(TokenKind::Else, "else")?;
            let else_value = self.parse_conditional()?;
            return Ok(Expression::Conditional {
                condition: Box::new(condition),
                then_value: Box::new(value),
                else_value: Box::new(else_value),
            });
        }
        Ok(value)
    }

    fn parse_or(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_and()?;
        while matches!(self.current.kind, TokenKind::Or) {
            self.advance();
            let right = self.parse_and()?;
            expr = Expression::BinaryOp {
                left: Box::new(expr),
                op: BinaryOperator::Or,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_comparison()?;
        while matches!(self.current.kind, TokenKind::And) {
            self.advance();
            let right = self.parse_comparison()?;
            expr = Expression::BinaryOp {
                left: Box::new(expr),
                op: BinaryOperator::And,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_bitor()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Less => BinaryOperator::Less,
                TokenKind::LessEqual => BinaryOperator::LessEqual,
                TokenKind::Greater => BinaryOperator::Greater,
                TokenKind::GreaterEqual => BinaryOperator::GreaterEqual,
                TokenKind::EqualEqual => BinaryOperator::Equal,
                TokenKind::NotEqual => BinaryOperator::NotEqual,
                TokenKind::In => BinaryOperator::In,
                TokenKind::Is => BinaryOperator::Is,
                _ => break,
            };
            self.advance();
            let right = self.parse_bitor()?;
            expr = Expression::BinaryOp {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_bitor(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_bitxor()?;
        while matches!(self.current.kind, TokenKind::Pipe) {
            self.advance();
            let right = self.parse_bitxor()?;
            expr = Expression::BinaryOp {
                left: Box::new(expr),
                op: BinaryOperator::BitOr,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_bitxor(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_bitand()?;
        while matches!(self.current.kind, TokenKind::Caret) {
            self.advance();
            let right = self.parse_bitand()?;
            expr = Expression::BinaryOp {
                left: Box::new(expr),
                op: BinaryOperator::BitXor,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_bitand(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_shift()?;
        while matches!(self.current.kind, TokenKind::Ampersand) {
            self.advance();
            let right = self.parse_shift()?;
            expr = Expression::BinaryOp {
                left: Box::new(expr),
                op: BinaryOperator::BitAnd,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_shift(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_additive()?;
        loop {
            let op = match self.current.kind {
                TokenKind::LeftShift => BinaryOperator::LeftShift,
                TokenKind::RightShift => BinaryOperator::RightShift,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            expr = Expression::BinaryOp {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_additive(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_term()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Plus => BinaryOperator::Add,
                TokenKind::Minus => BinaryOperator::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            expr = Expression::BinaryOp {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_term(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Star => BinaryOperator::Mul,
                TokenKind::Slash => BinaryOperator::Div,
                TokenKind::DoubleSlash => BinaryOperator::FloorDiv,
                TokenKind::Percent => BinaryOperator::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            expr = Expression::BinaryOp {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> ParseResult<Expression> {
        let op = match self.current.kind {
            TokenKind::Plus => Some(UnaryOperator::Pos),
            TokenKind::Minus => Some(UnaryOperator::Neg),
            TokenKind::Not => Some(UnaryOperator::Not),
            TokenKind::Tilde => Some(UnaryOperator::Invert),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expression::UnaryOp {
                op,
                operand: Box::new(operand),
            });
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> ParseResult<Expression> {
        let base = self.parse_postfix()?;
        if matches!(self.current.kind, TokenKind::DoubleStar) {
            self.advance();
            // Right-associative.
            let exponent = self.parse_unary()?;
            return Ok(Expression::BinaryOp {
                left: Box::new(base),
                op: BinaryOperator::Pow,
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.current.kind {
                TokenKind::LParen => {
                    self.advance();
                    let mut args = Vec::new();
                    while !matches!(self.current.kind, TokenKind::RParen) {
                        args.push(self.parse_expression()?);
                        if matches!(self.current.kind, TokenKind::Comma) {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                    self.expect(TokenKind::RParen, ")")?;
                    expr = Expression::Call {
                        callee: Box::new(expr),
                        args,
                    };
                }
                TokenKind::Dot => {
                    self.advance();
                    let name = self.expect_identifier()?;
                    expr = Expression::Attribute {
                        object: Box::new(expr),
                        name,
                    };
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    if matches!(self.current.kind, TokenKind::Colon) {
                        return Err(self.unsupported_feature("slice"));
                    }
                    self.expect(TokenKind::RBracket, "]")?;
                    expr = Expression::Subscript {
                        object: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> ParseResult<Expression> {
        match &self.current.kind {
            TokenKind::Integer(value) => {
                let value = *value;
                self.advance();
                Ok(Expression::Integer(value))
            }
            TokenKind::Float(value) => {
                let value = *value;
                self.advance();
                Ok(Expression::Float(value))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expression::Boolean(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expression::Boolean(false))
            }
            TokenKind::None => {
                self.advance();
                Ok(Expression::NoneLiteral)
            }
            TokenKind::String(value) => {
                let value = value.clone();
                self.advance();
                Ok(Expression::String(value))
            }
            TokenKind::Identifier(name) if UNSUPPORTED_KEYWORDS.contains(name) => {
                Err(self.unsupported_feature(name))
            }
            TokenKind::Identifier(name) => {
                let name = name.to_string();
                self.advance();
                Ok(Expression::Identifier(name))
            }
            TokenKind::LParen => {
                self.advance();
                if matches!(self.current.kind, TokenKind::RParen) {
                    self.advance();
                    return Ok(Expression::Tuple(Vec::new()));
                }
                let first = self.parse_expression()?;
                if matches!(self.current.kind, TokenKind::Comma) {
                    let mut elements = vec![first];
                    while matches!(self.current.kind, TokenKind::Comma) {
                        self.advance();
                        if matches!(self.current.kind, TokenKind::RParen) {
                            break;
                        }
                        elements.push(self.parse_expression()?);
                    }
                    self.expect(TokenKind::RParen, ")")?;
                    return Ok(Expression::Tuple(elements));
                }
                self.expect(TokenKind::RParen, ")")?;
                Ok(first)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                while !matches!(self.current.kind, TokenKind::RBracket) {
                    elements.push(self.parse_expression()?);
                    if matches!(self.current.kind, TokenKind::Comma) {
                        self.advance();
                    } else {
                        break;
                    }
                }
                self.expect(TokenKind::RBracket, "]")?;
                Ok(Expression::List(elements))
            }
            TokenKind::LBrace => {
                self.advance();
                let mut entries = Vec::new();
                while !matches!(self.current.kind, TokenKind::RBrace) {
                    let key = self.parse_expression()?;
                    self.expect(TokenKind::Colon, ":")?;
                    let value = self.parse_expression()?;
                    entries.push((key, value));
                    if matches!(self.current.kind, TokenKind::Comma) {
                        self.advance();
                    } else {
                        break;
                    }
                }
                self.expect(TokenKind::RBrace, "}")?;
                Ok(Expression::Dict(entries))
            }
            _ => {
                let span = self.current.span();
                Err(ParseError::ExpectedExpression {
                    found: self.current.kind.describe(),
                    line: span.line,
                    column: span.column,
                })
            }
        }
    }

    fn consume_newlines(&mut self) -> bool {
        let mut consumed = false;
        while matches!(self.current.kind, TokenKind::Newline) {
            consumed = true;
            self.advance();
        }
        consumed
    }

    fn expect_identifier(&mut self) -> ParseResult<String> {
        if let TokenKind::Identifier(name) = &self.current.kind {
            let name = name.to_string();
            self.advance();
            Ok(name)
        } else {
            Err(self.unexpected("identifier"))
        }
    }

    fn expect(&mut self, kind: TokenKind<'a>, expected: &str) -> ParseResult<()> {
        if self.current.kind == kind {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn expect_newline(&mut self) -> ParseResult<()> {
        self.expect(TokenKind::Newline, "newline")
    }

    fn advance(&mut self) -> Token<'a> {
        let next = self
            .tokens
            .get(self.pos + 1)
            .cloned()
            .unwrap_or(Token::new(TokenKind::Eof, Span::default()));
        self.pos = self.pos.saturating_add(1);
        std::mem::replace(&mut self.current, next)
    }

    fn peek_kind(&self) -> TokenKind<'a> {
        self.tokens
            .get(self.pos + 1)
            .map(|token| token.kind.clone())
            .unwrap_or(TokenKind::Eof)
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let span = self.current.span();
        ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found: self.current.kind.describe(),
            line: span.line,
            column: span.column,
        }
    }

    fn unsupported_feature(&self, construct: &str) -> ParseError {
        let span = self.current.span();
        ParseError::UnsupportedFeature {
            construct: construct.to_string(),
            line: span.line,
            column: span.column,
        }
    }
}

pub fn parse_tokens(tokens: Vec<Token<'_>>) -> ParseResult<Program> {
    Parser::new(tokens).parse_program()
}

/// Convenience used by tests and the analyzer round-trip property.
pub fn parse_source(source: &str) -> anyhow::Result<Program> {
    let tokens = crate::lexer::tokenize(source)?;
    Ok(parse_tokens(tokens)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn parse(source: &str) -> Program {
        parse_source(source).expect("parse failed")
    }

    fn parse_err(source: &str) -> ParseError {
        let tokens = crate::lexer::tokenize(source).expect("tokenize should succeed");
        parse_tokens(tokens).expect_err("expected parse failure")
    }

    #[test]
    fn parses_function_with_params_and_hints() {
        let program = parse(indoc! {"
            def add(a: int, b: int) -> int:
                return a + b
        "});
        let Statement::FunctionDef {
            name,
            params,
            returns,
            is_async,
            ..
        } = &program.statements[0]
        else {
            panic!("expected function def");
        };
        assert_eq!(name, "add");
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "a");
        assert_eq!(params[0].hint.as_deref(), Some("int"));
        assert_eq!(returns.as_deref(), Some("int"));
        assert!(!is_async);
    }

    #[test]
    fn parses_async_function() {
        let program = parse(indoc! {"
            async def fetch(url):
                return 1
        "});
        let Statement::FunctionDef { is_async, .. } = &program.statements[0] else {
            panic!("expected function def");
        };
        assert!(is_async);
    }

    #[test]
    fn parses_elif_chain_as_nested_if() {
        let program = parse(indoc! {"
            if a:
                x = 1
            elif b:
                x = 2
            else:
                x = 3
        "});
        let Statement::If { else_body, .. } = &program.statements[0] else {
            panic!("expected if");
        };
        assert_eq!(else_body.len(), 1);
        let Statement::If {
            else_body: inner_else,
            ..
        } = &else_body[0]
        else {
            panic!("expected nested if in else slot");
        };
        assert_eq!(inner_else.len(), 1);
    }

    #[test]
    fn parses_for_with_tuple_target() {
        let program = parse(indoc! {"
            for i, v in enumerate(xs):
                print(i)
        "});
        let Statement::For { target, .. } = &program.statements[0] else {
            panic!("expected for");
        };
        assert_eq!(target.names, vec!["i".to_string(), "v".to_string()]);
    }

    #[test]
    fn respects_operator_precedence() {
        let program = parse("x = 1 + 2 * 3\n");
        let Statement::Assign { value, .. } = &program.statements[0] else {
            panic!("expected assign");
        };
        let Expression::BinaryOp { op, right, .. } = value else {
            panic!("expected binary op");
        };
        assert_eq!(*op, BinaryOperator::Add);
        assert!(matches!(
            right.as_ref(),
            Expression::BinaryOp {
                op: BinaryOperator::Mul,
                ..
            }
        ));
    }

    #[test]
    fn power_is_right_associative() {
        let program = parse("x = 2 ** 3 ** 2\n");
        let Statement::Assign { value, .. } = &program.statements[0] else {
            panic!("expected assign");
        };
        let Expression::BinaryOp { op, right, .. } = value else {
            panic!("expected pow");
        };
        assert_eq!(*op, BinaryOperator::Pow);
        assert!(matches!(
            right.as_ref(),
            Expression::BinaryOp {
                op: BinaryOperator::Pow,
                ..
            }
        ));
    }

    #[test]
    fn parses_conditional_expression() {
        let program = parse("x = a if c else b\n");
        let Statement::Assign { value, .. } = &program.statements[0] else {
            panic!("expected assign");
        };
        assert!(matches!(value, Expression::Conditional { .. }));
    }

    #[test]
    fn parses_attribute_assignment() {
        let program = parse("self.x = 1\n");
        let Statement::Assign { target, .. } = &program.statements[0] else {
            panic!("expected assign");
        };
        assert!(matches!(target, AssignTarget::Attribute { .. }));
    }

    #[test]
    fn parses_tuple_assignment() {
        let program = parse("a, b = f()\n");
        let Statement::Assign { target, .. } = &program.statements[0] else {
            panic!("expected assign");
        };
        assert_eq!(
            *target,
            AssignTarget::Tuple(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn desugars_augmented_assignment() {
        let program = parse("x += 2\n");
        let Statement::Assign { target, value, .. } = &program.statements[0] else {
            panic!("expected assign");
        };
        assert_eq!(*target, AssignTarget::Name("x".to_string()));
        assert!(matches!(
            value,
            Expression::BinaryOp {
                op: BinaryOperator::Add,
                ..
            }
        ));
    }

    #[test]
    fn parses_imports() {
        let program = parse(indoc! {"
            import json
            from json import loads, dumps
            from http import get as fetch
        "});
        assert!(matches!(&program.statements[0], Statement::Import { module, .. } if module == "json"));
        let Statement::ImportFrom { names, .. } = &program.statements[1] else {
            panic!("expected from-import");
        };
        assert_eq!(names.len(), 2);
        let Statement::ImportFrom { names, .. } = &program.statements[2] else {
            panic!("expected from-import");
        };
        assert_eq!(names[0].alias.as_deref(), Some("fetch"));
    }

    #[test]
    fn drops_docstrings() {
        let program = parse(indoc! {"
            def f():
                \"\"\"Docstring.\"\"\"
                return 1
        "});
        let Statement::FunctionDef { body, .. } = &program.statements[0] else {
            panic!("expected function def");
        };
        assert_eq!(body.len(), 1);
        assert!(matches!(body[0], Statement::Return { .. }));
    }

    #[test]
    fn rejects_non_method_class_members() {
        let err = parse_err(indoc! {"
            class C:
                x = 1
        "});
        assert!(matches!(err, ParseError::UnsupportedClassMember { .. }));
    }

    #[test]
    fn rejects_nested_function_defs() {
        let err = parse_err(indoc! {"
            def outer():
                def inner():
                    pass
        "});
        assert!(matches!(err, ParseError::UnsupportedNestedFunction { .. }));
    }

    #[test]
    fn rejects_subscript_assignment_target() {
        let err = parse_err("xs[0] = 1\n");
        assert!(matches!(err, ParseError::UnsupportedTarget { .. }));
    }

    #[test]
    fn rejects_unsupported_statement_keywords() {
        for source in ["with open(p) as f:\n", "lambda x: x\n", "yield 1\n"] {
            let err = parse_err(source);
            assert!(
                matches!(err, ParseError::UnsupportedFeature { .. }),
                "source {source:?} should be rejected, got {err:?}"
            );
        }
    }

    #[test]
    fn rejects_slices() {
        let err = parse_err("y = xs[1:2]\n");
        assert!(matches!(err, ParseError::UnsupportedFeature { .. }));
    }

    #[test]
    fn fails_fast_with_span_on_syntax_error() {
        let err = parse_err("x = = 2\n");
        let ParseError::ExpectedExpression { line, column, .. } = err else {
            panic!("expected ExpectedExpression, got {err:?}");
        };
        assert_eq!(line, 1);
        assert_eq!(column, 5);
    }

    #[test]
    fn lex_then_parse_is_stable() {
        let source = indoc! {"
            def fibonacci(n):
                if n < 2:
                    return n
                return fibonacci(n - 1) + fibonacci(n - 2)

            print(fibonacci(10))
        "};
        let first = parse(source);
        let second = parse(source);
        assert_eq!(first, second);
    }
}
