use miette::{Diagnostic, Error, NamedSource, SourceSpan};
use thiserror::Error;

use crate::{
    Parser,
    lex::{Token, TokenKind},
    parse::Expr,
};

/// An operator or function token reached a node shape that cannot apply it.
#[derive(Error, Debug, Diagnostic)]
#[error("Cannot apply `{operator}` as {shape}")]
#[diagnostic(help("the parser and interpreter disagree about this token"))]
pub struct InterpretationError {
    #[source_code]
    src: NamedSource<String>,

    #[label("here")]
    bad_bit: SourceSpan,

    pub operator: String,
    pub shape: &'static str,
}

#[derive(Error, Debug, Diagnostic)]
#[error("Integer division by zero")]
#[diagnostic(help("`//` truncates both operands to integers; use `/` for floating-point division"))]
pub struct ArithmeticError {
    #[source_code]
    src: NamedSource<String>,

    #[label("divisor truncates to zero")]
    bad_bit: SourceSpan,
}

pub struct Interpreter<'de> {
    filename: Option<&'de str>,
    whole: &'de str,
}

impl<'de> Interpreter<'de> {
    pub fn new(filename: Option<&'de str>, whole: &'de str) -> Self {
        Self { filename, whole }
    }

    pub fn interpret(&self) -> Result<f64, Error> {
        let expr = Parser::new(self.filename, self.whole)?.parse()?;
        let value = self.evaluate(&expr)?;
        log::debug!("evaluated `{}` to {value:?}", self.whole);
        Ok(value)
    }

    pub fn evaluate(&self, expr: &Expr<'de>) -> Result<f64, Error> {
        match expr {
            Expr::Number(token) => token
                .text
                .parse()
                .map_err(|_| self.error(token, "a numeric literal")),
            Expr::Unary { op, operand } => {
                let value = self.evaluate(operand)?;
                match op.kind {
                    TokenKind::Plus => Ok(value),
                    TokenKind::Minus => Ok(-value),
                    TokenKind::Flip => Ok(f64::from(!truncate(value))),
                    _ => Err(self.error(op, "a unary operator")),
                }
            }
            Expr::Binary { left, op, right } => {
                let lhs = self.evaluate(left)?;
                let rhs = self.evaluate(right)?;
                self.binary(op, lhs, rhs)
            }
            Expr::Composition { function, argument } => {
                let value = self.evaluate(argument)?;
                Ok(match function.kind {
                    TokenKind::Abs => value.abs(),
                    TokenKind::Sqrt => value.sqrt(),
                    TokenKind::Exp => value.exp(),
                    TokenKind::Ln => value.ln(),
                    TokenKind::Log => value.log10(),
                    TokenKind::Sin => value.sin(),
                    TokenKind::Cos => value.cos(),
                    TokenKind::Tan => value.tan(),
                    TokenKind::Asin => value.asin(),
                    TokenKind::Acos => value.acos(),
                    TokenKind::Atan => value.atan(),
                    TokenKind::Asinh => value.asinh(),
                    TokenKind::Acosh => value.acosh(),
                    TokenKind::Atanh => value.atanh(),
                    TokenKind::Sinh => value.sinh(),
                    TokenKind::Cosh => value.cosh(),
                    TokenKind::Tanh => value.tanh(),
                    TokenKind::Ceil => value.ceil(),
                    TokenKind::Floor => value.floor(),
                    TokenKind::Round => value.round_ties_even(),
                    _ => return Err(self.error(function, "a function")),
                })
            }
        }
    }

    fn binary(&self, op: &Token<'de>, lhs: f64, rhs: f64) -> Result<f64, Error> {
        let (l, r) = (truncate(lhs), truncate(rhs));
        Ok(match op.kind {
            TokenKind::Plus => lhs + rhs,
            TokenKind::Minus => lhs - rhs,
            TokenKind::Multiply => lhs * rhs,
            TokenKind::Divide => lhs / rhs,
            // `%` parses as a term operator, so it evaluates as the IEEE
            // remainder instead of failing like an unknown operator
            TokenKind::Modulus => lhs % rhs,
            TokenKind::Power => lhs.powf(rhs),
            TokenKind::FloorDivide => {
                if r == 0 {
                    return Err(ArithmeticError {
                        src: self.source(),
                        bad_bit: op.span,
                    }
                    .into());
                }
                f64::from(l.wrapping_div(r))
            }
            TokenKind::And => f64::from(l & r),
            TokenKind::Or => f64::from(l | r),
            TokenKind::Xor => f64::from(l ^ r),
            // shift counts keep only their low five bits
            TokenKind::LeftShift => f64::from(l.wrapping_shl(r as u32)),
            TokenKind::RightShift => f64::from(l.wrapping_shr(r as u32)),
            _ => return Err(self.error(op, "a binary operator")),
        })
    }

    fn source(&self) -> NamedSource<String> {
        NamedSource::new(self.filename.unwrap_or("<input>"), self.whole.to_string())
    }

    fn error(&self, token: &Token<'de>, shape: &'static str) -> Error {
        InterpretationError {
            src: self.source(),
            bad_bit: token.span,
            operator: token.text.to_string(),
            shape,
        }
        .into()
    }
}

/// Truncates toward zero, saturating at the `i32` bounds. NaN becomes 0.
fn truncate(value: f64) -> i32 {
    value as i32
}
