pub mod eval;
pub mod lex;
pub mod parse;

pub use eval::Interpreter;
pub use lex::Lexer;
pub use parse::Parser;

/// Evaluates one expression.
///
/// Failures come back as [`miette::Error`] wrapping one of
/// [`lex::ScanError`], [`parse::SyntaxError`], [`eval::InterpretationError`]
/// or [`eval::ArithmeticError`]; use `downcast_ref` to tell them apart.
pub fn evaluate(expression: &str) -> miette::Result<f64> {
    Interpreter::new(None, expression).interpret()
}
