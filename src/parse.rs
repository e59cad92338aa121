use std::fmt::Display;

use miette::{Diagnostic, Error, NamedSource, SourceSpan};
use thiserror::Error;

use crate::{
    Lexer,
    lex::{Token, TokenKind},
};

/// How deep the parser may recurse, and how tall a tree it may build,
/// before giving up.
pub const MAX_DEPTH: usize = 256;

#[derive(Error, Debug, Diagnostic)]
pub enum SyntaxError {
    #[error("Expected `{expected}` but found {found} at offset {}", .bad_bit.offset())]
    #[diagnostic(help("use `{expected}` here instead"))]
    UnexpectedToken {
        #[source_code]
        src: NamedSource<String>,

        #[label("here")]
        bad_bit: SourceSpan,

        expected: &'static str,
        found: String,
    },

    #[error("Expected a number, `(` or a function but found {found} at offset {}", .bad_bit.offset())]
    #[diagnostic(help("an operand is missing here"))]
    ExpectedOperand {
        #[source_code]
        src: NamedSource<String>,

        #[label("here")]
        bad_bit: SourceSpan,

        found: String,
    },

    #[error("Unexpected {found} after a complete expression at offset {}", .bad_bit.offset())]
    #[diagnostic(help("an operator may be missing, or a parenthesis is unbalanced"))]
    TrailingInput {
        #[source_code]
        src: NamedSource<String>,

        #[label("expression ends before this")]
        bad_bit: SourceSpan,

        found: String,
    },

    #[error("Expression is nested too deeply at offset {}", .bad_bit.offset())]
    #[diagnostic(help("split long operator chains or reduce the nesting of parentheses, functions and unary operators"))]
    TooDeep {
        #[source_code]
        src: NamedSource<String>,

        #[label("nesting limit reached here")]
        bad_bit: SourceSpan,
    },
}

impl SyntaxError {
    pub fn offset(&self) -> usize {
        match self {
            SyntaxError::UnexpectedToken { bad_bit, .. }
            | SyntaxError::ExpectedOperand { bad_bit, .. }
            | SyntaxError::TrailingInput { bad_bit, .. }
            | SyntaxError::TooDeep { bad_bit, .. } => bad_bit.offset(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr<'de> {
    /// A `NUMBER` or `PI` literal.
    Number(Token<'de>),
    Unary {
        op: Token<'de>,
        operand: Box<Expr<'de>>,
    },
    Binary {
        left: Box<Expr<'de>>,
        op: Token<'de>,
        right: Box<Expr<'de>>,
    },
    /// A named function applied to one argument.
    Composition {
        function: Token<'de>,
        argument: Box<Expr<'de>>,
    },
}

impl Display for Expr<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Number(token) => write!(f, "{}", token.text),
            Expr::Unary { op, operand } => write!(f, "({} {operand})", op.text),
            Expr::Binary { left, op, right } => write!(f, "({} {left} {right})", op.text),
            Expr::Composition { function, argument } => {
                write!(f, "({} {argument})", function.text)
            }
        }
    }
}

/// A subtree together with its height; leaves have height 0.
struct Node<'de> {
    expr: Expr<'de>,
    height: usize,
}

impl<'de> Node<'de> {
    fn leaf(expr: Expr<'de>) -> Self {
        Node { expr, height: 0 }
    }
}

/// Recursive-descent parser with one token of lookahead.
pub struct Parser<'de> {
    lexer: Lexer<'de>,
    current: Token<'de>,
    depth: usize,
}

impl<'de> Parser<'de> {
    pub fn new(filename: Option<&'de str>, whole: &'de str) -> Result<Self, Error> {
        let mut lexer = Lexer::new(filename, whole);
        let current = lexer.next_token()?;
        Ok(Parser {
            lexer,
            current,
            depth: 0,
        })
    }

    // expr: complex_expr END_OF_INPUT
    pub fn parse(mut self) -> Result<Expr<'de>, Error> {
        let Node { expr, .. } = self.complex_expr()?;
        if self.current.kind != TokenKind::EndOfInput {
            return Err(SyntaxError::TrailingInput {
                src: self.lexer.source(),
                bad_bit: self.current.span,
                found: describe(&self.current),
            }
            .into());
        }
        log::debug!("parsed `{}` as {expr}", self.lexer.whole());
        Ok(expr)
    }

    fn consume(&mut self, expected: TokenKind) -> Result<Token<'de>, Error> {
        if self.current.kind != expected {
            return Err(SyntaxError::UnexpectedToken {
                src: self.lexer.source(),
                bad_bit: self.current.span,
                expected: expected.symbol(),
                found: describe(&self.current),
            }
            .into());
        }
        let next = self.lexer.next_token()?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn too_deep(&self, at: SourceSpan) -> Error {
        SyntaxError::TooDeep {
            src: self.lexer.source(),
            bad_bit: at,
        }
        .into()
    }

    /// Wraps `expr` as a node one level above its tallest child.
    ///
    /// Evaluating, printing and dropping a tree all recurse along its
    /// height, so the height is held to `MAX_DEPTH` as well.
    fn branch(
        &self,
        expr: Expr<'de>,
        children: &[usize],
        at: SourceSpan,
    ) -> Result<Node<'de>, Error> {
        let height = 1 + children.iter().copied().max().unwrap_or(0);
        if height > MAX_DEPTH {
            return Err(self.too_deep(at));
        }
        Ok(Node { expr, height })
    }

    /// Parses `operand (op operand)*` for any `op` in `ops`, folding to the left.
    fn left_assoc(
        &mut self,
        ops: &[TokenKind],
        operand: fn(&mut Self) -> Result<Node<'de>, Error>,
    ) -> Result<Node<'de>, Error> {
        let mut lhs = operand(self)?;
        while ops.contains(&self.current.kind) {
            let op = self.consume(self.current.kind)?;
            let at = op.span;
            let rhs = operand(self)?;
            lhs = self.branch(
                Expr::Binary {
                    left: Box::new(lhs.expr),
                    op,
                    right: Box::new(rhs.expr),
                },
                &[lhs.height, rhs.height],
                at,
            )?;
        }
        Ok(lhs)
    }

    // complex_expr: xor_expr ('|' xor_expr)*
    fn complex_expr(&mut self) -> Result<Node<'de>, Error> {
        self.left_assoc(&[TokenKind::Or], Self::xor_expr)
    }

    // xor_expr: and_expr ('^' and_expr)*
    fn xor_expr(&mut self) -> Result<Node<'de>, Error> {
        self.left_assoc(&[TokenKind::Xor], Self::and_expr)
    }

    // and_expr: shift_expr ('&' shift_expr)*
    fn and_expr(&mut self) -> Result<Node<'de>, Error> {
        self.left_assoc(&[TokenKind::And], Self::shift_expr)
    }

    // shift_expr: arith_expr (('<<'|'>>') arith_expr)*
    fn shift_expr(&mut self) -> Result<Node<'de>, Error> {
        self.left_assoc(
            &[TokenKind::LeftShift, TokenKind::RightShift],
            Self::arith_expr,
        )
    }

    // arith_expr: term (('+'|'-') term)*
    fn arith_expr(&mut self) -> Result<Node<'de>, Error> {
        self.left_assoc(&[TokenKind::Plus, TokenKind::Minus], Self::term)
    }

    // term: factor (('*'|'/'|'%'|'//') factor)*
    fn term(&mut self) -> Result<Node<'de>, Error> {
        self.left_assoc(
            &[
                TokenKind::Multiply,
                TokenKind::Divide,
                TokenKind::Modulus,
                TokenKind::FloorDivide,
            ],
            Self::factor,
        )
    }

    // factor: ('+'|'-'|'~') factor | power
    fn factor(&mut self) -> Result<Node<'de>, Error> {
        if self.depth == MAX_DEPTH {
            return Err(self.too_deep(self.current.span));
        }
        self.depth += 1;
        let node = self.unary_or_power();
        self.depth -= 1;
        node
    }

    fn unary_or_power(&mut self) -> Result<Node<'de>, Error> {
        match self.current.kind {
            TokenKind::Plus | TokenKind::Minus | TokenKind::Flip => {
                let op = self.consume(self.current.kind)?;
                let at = op.span;
                let operand = self.factor()?;
                self.branch(
                    Expr::Unary {
                        op,
                        operand: Box::new(operand.expr),
                    },
                    &[operand.height],
                    at,
                )
            }
            _ => self.power(),
        }
    }

    // power: atom ('**' factor)?
    fn power(&mut self) -> Result<Node<'de>, Error> {
        let base = self.atom()?;
        if self.current.kind != TokenKind::Power {
            return Ok(base);
        }
        let op = self.consume(TokenKind::Power)?;
        let at = op.span;
        let exponent = self.factor()?;
        self.branch(
            Expr::Binary {
                left: Box::new(base.expr),
                op,
                right: Box::new(exponent.expr),
            },
            &[base.height, exponent.height],
            at,
        )
    }

    // atom: FUNC_NAME '(' complex_expr ')'
    //     | '(' complex_expr ')'
    //     | NUMBER
    //     | PI
    fn atom(&mut self) -> Result<Node<'de>, Error> {
        match self.current.kind {
            kind if kind.is_function() => {
                let function = self.consume(kind)?;
                let at = function.span;
                self.consume(TokenKind::LeftParen)?;
                let argument = self.complex_expr()?;
                self.consume(TokenKind::RightParen)?;
                self.branch(
                    Expr::Composition {
                        function,
                        argument: Box::new(argument.expr),
                    },
                    &[argument.height],
                    at,
                )
            }
            TokenKind::LeftParen => {
                self.consume(TokenKind::LeftParen)?;
                let node = self.complex_expr()?;
                self.consume(TokenKind::RightParen)?;
                Ok(node)
            }
            kind @ (TokenKind::Number | TokenKind::Pi) => {
                Ok(Node::leaf(Expr::Number(self.consume(kind)?)))
            }
            _ => Err(SyntaxError::ExpectedOperand {
                src: self.lexer.source(),
                bad_bit: self.current.span,
                found: describe(&self.current),
            }
            .into()),
        }
    }
}

fn describe(token: &Token<'_>) -> String {
    match token.kind {
        TokenKind::EndOfInput => "end of input".to_string(),
        TokenKind::Number | TokenKind::Pi => format!("number `{}`", token.text),
        _ => format!("`{}`", token.text),
    }
}
