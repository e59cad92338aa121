use std::{borrow::Cow, fmt::Display};

use miette::{Diagnostic, Error, NamedSource, SourceSpan};
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum ScanError {
    #[error("Unexpected character '{token}' at offset {}", .bad_bit.offset())]
    #[diagnostic(help("remove or correct the character: `{token}`"))]
    UnexpectedCharacter {
        #[source_code]
        src: NamedSource<String>,

        #[label("this character")]
        bad_bit: SourceSpan,

        token: char,
    },

    #[error("Malformed number literal: second '.' at offset {}", .bad_bit.offset())]
    #[diagnostic(help("a number may contain at most one decimal point"))]
    MalformedNumber {
        #[source_code]
        src: NamedSource<String>,

        #[label("second decimal point")]
        bad_bit: SourceSpan,
    },

    #[error("Incomplete operator '{token}' at offset {}", .bad_bit.offset())]
    #[diagnostic(help("use `{token}{token}` for a shift"))]
    IncompleteOperator {
        #[source_code]
        src: NamedSource<String>,

        #[label("expected a second character here")]
        bad_bit: SourceSpan,

        token: char,
    },

    #[error("Unknown identifier '{word}' at offset {}", .bad_bit.offset())]
    #[diagnostic(help("known names are ABS, SQRT, EXP, LN, LOG, PI and the trigonometric functions"))]
    UnknownIdentifier {
        #[source_code]
        src: NamedSource<String>,

        #[label("not a function or constant")]
        bad_bit: SourceSpan,

        word: String,
    },
}

impl ScanError {
    /// Byte offset of the offending input.
    pub fn offset(&self) -> usize {
        match self {
            ScanError::UnexpectedCharacter { bad_bit, .. }
            | ScanError::MalformedNumber { bad_bit, .. }
            | ScanError::IncompleteOperator { bad_bit, .. }
            | ScanError::UnknownIdentifier { bad_bit, .. } => bad_bit.offset(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token<'de> {
    pub kind: TokenKind,
    pub text: Cow<'de, str>,
    pub span: SourceSpan,
}

impl<'de> Token<'de> {
    pub fn new(kind: TokenKind, text: impl Into<Cow<'de, str>>, span: SourceSpan) -> Self {
        Token {
            kind,
            text: text.into(),
            span,
        }
    }

    /// A token whose text is the canonical symbol of its kind.
    pub fn symbol(kind: TokenKind, span: SourceSpan) -> Self {
        Token::new(kind, kind.symbol(), span)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Number,
    Pi,
    Plus,
    Minus,
    Flip,
    Multiply,
    Divide,
    FloorDivide,
    Modulus,
    LeftShift,
    RightShift,
    And,
    Or,
    Xor,
    Power,
    Abs,
    Sqrt,
    Exp,
    Ln,
    Log,
    Sin,
    Cos,
    Tan,
    Acos,
    Acosh,
    Asin,
    Asinh,
    Atan,
    Atanh,
    Cosh,
    Sinh,
    Tanh,
    Ceil,
    Floor,
    Round,
    LeftParen,
    RightParen,
    EndOfInput,
}

/// Names recognised at an alphabetic character, matched case-insensitively.
const KEYWORDS: [(&str, TokenKind); 21] = [
    ("ABS", TokenKind::Abs),
    ("COS", TokenKind::Cos),
    ("EXP", TokenKind::Exp),
    ("LN", TokenKind::Ln),
    ("LOG", TokenKind::Log),
    ("SIN", TokenKind::Sin),
    ("SQRT", TokenKind::Sqrt),
    ("TAN", TokenKind::Tan),
    ("PI", TokenKind::Pi),
    ("ACOS", TokenKind::Acos),
    ("ACOSH", TokenKind::Acosh),
    ("ASIN", TokenKind::Asin),
    ("ASINH", TokenKind::Asinh),
    ("ATAN", TokenKind::Atan),
    ("ATANH", TokenKind::Atanh),
    ("COSH", TokenKind::Cosh),
    ("SINH", TokenKind::Sinh),
    ("TANH", TokenKind::Tanh),
    ("CEIL", TokenKind::Ceil),
    ("FLOOR", TokenKind::Floor),
    ("ROUND", TokenKind::Round),
];

impl TokenKind {
    pub fn symbol(self) -> &'static str {
        match self {
            TokenKind::Number => "NUMBER",
            TokenKind::Pi => "PI",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Flip => "~",
            TokenKind::Multiply => "*",
            TokenKind::Divide => "/",
            TokenKind::FloorDivide => "//",
            TokenKind::Modulus => "%",
            TokenKind::LeftShift => "<<",
            TokenKind::RightShift => ">>",
            TokenKind::And => "&",
            TokenKind::Or => "|",
            TokenKind::Xor => "^",
            TokenKind::Power => "**",
            TokenKind::Abs => "ABS",
            TokenKind::Sqrt => "SQRT",
            TokenKind::Exp => "EXP",
            TokenKind::Ln => "LN",
            TokenKind::Log => "LOG",
            TokenKind::Sin => "SIN",
            TokenKind::Cos => "COS",
            TokenKind::Tan => "TAN",
            TokenKind::Acos => "ACOS",
            TokenKind::Acosh => "ACOSH",
            TokenKind::Asin => "ASIN",
            TokenKind::Asinh => "ASINH",
            TokenKind::Atan => "ATAN",
            TokenKind::Atanh => "ATANH",
            TokenKind::Cosh => "COSH",
            TokenKind::Sinh => "SINH",
            TokenKind::Tanh => "TANH",
            TokenKind::Ceil => "CEIL",
            TokenKind::Floor => "FLOOR",
            TokenKind::Round => "ROUND",
            TokenKind::LeftParen => "(",
            TokenKind::RightParen => ")",
            TokenKind::EndOfInput => "end of input",
        }
    }

    pub fn is_function(self) -> bool {
        matches!(
            self,
            TokenKind::Abs
                | TokenKind::Sqrt
                | TokenKind::Exp
                | TokenKind::Ln
                | TokenKind::Log
                | TokenKind::Sin
                | TokenKind::Cos
                | TokenKind::Tan
                | TokenKind::Acos
                | TokenKind::Acosh
                | TokenKind::Asin
                | TokenKind::Asinh
                | TokenKind::Atan
                | TokenKind::Atanh
                | TokenKind::Cosh
                | TokenKind::Sinh
                | TokenKind::Tanh
                | TokenKind::Ceil
                | TokenKind::Floor
                | TokenKind::Round
        )
    }
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TokenKind::Number => "NUMBER",
            TokenKind::Pi => "PI",
            TokenKind::Plus => "PLUS",
            TokenKind::Minus => "MINUS",
            TokenKind::Flip => "FLIP",
            TokenKind::Multiply => "MULTIPLY",
            TokenKind::Divide => "DIVIDE",
            TokenKind::FloorDivide => "FLOOR_DIVIDE",
            TokenKind::Modulus => "MODULUS",
            TokenKind::LeftShift => "LEFT_SHIFT",
            TokenKind::RightShift => "RIGHT_SHIFT",
            TokenKind::And => "AND",
            TokenKind::Or => "OR",
            TokenKind::Xor => "XOR",
            TokenKind::Power => "POWER",
            TokenKind::LeftParen => "LEFT_PARENTHESIS",
            TokenKind::RightParen => "RIGHT_PARENTHESIS",
            TokenKind::EndOfInput => "END_OF_INPUT",
            function => function.symbol(),
        };
        f.write_str(name)
    }
}

impl Display for Token<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.text.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{} {}", self.kind, self.text)
        }
    }
}

pub struct Lexer<'de> {
    filename: Option<&'de str>,
    whole: &'de str,
    rest: &'de str,
    byte: usize,
    done: bool,
}

impl<'de> Lexer<'de> {
    pub fn new(filename: Option<&'de str>, input: &'de str) -> Self {
        Lexer {
            filename,
            whole: input,
            rest: input,
            byte: 0,
            done: false,
        }
    }

    pub fn whole(&self) -> &'de str {
        self.whole
    }

    pub fn source(&self) -> NamedSource<String> {
        NamedSource::new(self.filename.unwrap_or("<input>"), self.whole.to_string())
    }

    /// Scans the next token. Once the input is exhausted every call returns
    /// `EndOfInput`.
    pub fn next_token(&mut self) -> Result<Token<'de>, Error> {
        let token = self.scan()?;
        log::trace!("scanned {token}");
        Ok(token)
    }

    fn advance(&mut self, bytes: usize) {
        self.rest = &self.rest[bytes..];
        self.byte += bytes;
    }

    fn scan(&mut self) -> Result<Token<'de>, Error> {
        loop {
            let mut chars = self.rest.chars();
            let Some(c) = chars.next() else {
                return Ok(Token::new(
                    TokenKind::EndOfInput,
                    "",
                    SourceSpan::from((self.whole.len(), 0)),
                ));
            };
            let start = self.byte;
            let cur = self.rest;
            self.advance(c.len_utf8());

            enum Start {
                Ident,
                Number,
                IfRepeatElse(TokenKind, TokenKind),
                Repeat(TokenKind),
            }

            let process =
                |kind: TokenKind| Ok(Token::symbol(kind, SourceSpan::from(start..start + 1)));

            let started = match c {
                '(' => return process(TokenKind::LeftParen),
                ')' => return process(TokenKind::RightParen),
                '+' => return process(TokenKind::Plus),
                '-' => return process(TokenKind::Minus),
                '~' => return process(TokenKind::Flip),
                '%' => return process(TokenKind::Modulus),
                '|' => return process(TokenKind::Or),
                '&' => return process(TokenKind::And),
                '^' => return process(TokenKind::Xor),
                '*' => Start::IfRepeatElse(TokenKind::Power, TokenKind::Multiply),
                '/' => Start::IfRepeatElse(TokenKind::FloorDivide, TokenKind::Divide),
                '<' => Start::Repeat(TokenKind::LeftShift),
                '>' => Start::Repeat(TokenKind::RightShift),
                '0'..='9' => Start::Number,
                c if c.is_alphabetic() => Start::Ident,
                c if c.is_whitespace() => continue,
                c => {
                    return Err(ScanError::UnexpectedCharacter {
                        src: self.source(),
                        bad_bit: SourceSpan::from(start..self.byte),
                        token: c,
                    }
                    .into());
                }
            };

            match started {
                Start::IfRepeatElse(yes, no) => {
                    if self.rest.starts_with(c) {
                        self.advance(c.len_utf8());
                        return Ok(Token::symbol(yes, SourceSpan::from(start..self.byte)));
                    }
                    return Ok(Token::symbol(no, SourceSpan::from(start..self.byte)));
                }
                Start::Repeat(kind) => {
                    if self.rest.starts_with(c) {
                        self.advance(c.len_utf8());
                        return Ok(Token::symbol(kind, SourceSpan::from(start..self.byte)));
                    }
                    return Err(ScanError::IncompleteOperator {
                        src: self.source(),
                        bad_bit: SourceSpan::from(start..self.byte),
                        token: c,
                    }
                    .into());
                }
                Start::Number => {
                    let end = cur
                        .find(|c: char| !matches!(c, '0'..='9' | '.'))
                        .unwrap_or(cur.len());
                    let literal = &cur[..end];

                    if let Some(first) = literal.find('.') {
                        if let Some(second) = literal[first + 1..].find('.') {
                            let at = start + first + 1 + second;
                            return Err(ScanError::MalformedNumber {
                                src: self.source(),
                                bad_bit: SourceSpan::from(at..at + 1),
                            }
                            .into());
                        }
                    }

                    self.advance(literal.len() - c.len_utf8());
                    let span = SourceSpan::from(start..self.byte);

                    let n: f64 = literal.parse().map_err(|_| ScanError::MalformedNumber {
                        src: self.source(),
                        bad_bit: span,
                    })?;

                    return Ok(Token::new(TokenKind::Number, format!("{n:?}"), span));
                }
                Start::Ident => {
                    let end = cur.find(|c: char| !c.is_alphabetic()).unwrap_or(cur.len());
                    let word = &cur[..end];

                    let matched = KEYWORDS
                        .iter()
                        .filter(|(keyword, _)| {
                            word.get(..keyword.len())
                                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(keyword))
                        })
                        .max_by_key(|(keyword, _)| keyword.len());

                    let Some(&(keyword, kind)) = matched else {
                        return Err(ScanError::UnknownIdentifier {
                            src: self.source(),
                            bad_bit: SourceSpan::from(start..start + word.len()),
                            word: word.to_string(),
                        }
                        .into());
                    };

                    self.advance(keyword.len() - c.len_utf8());
                    let span = SourceSpan::from(start..self.byte);

                    return Ok(match kind {
                        TokenKind::Pi => {
                            Token::new(kind, format!("{:?}", std::f64::consts::PI), span)
                        }
                        _ => Token::symbol(kind, span),
                    });
                }
            }
        }
    }
}

impl<'de> Iterator for Lexer<'de> {
    type Item = Result<Token<'de>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let token = self.next_token();
        match &token {
            Ok(Token {
                kind: TokenKind::EndOfInput,
                ..
            })
            | Err(_) => self.done = true,
            Ok(_) => {}
        }
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(None, input)
            .map(|token| token.expect("valid input").kind)
            .collect()
    }

    fn scan_error(input: &str) -> Error {
        Lexer::new(None, input)
            .find_map(Result::err)
            .expect("input should fail to scan")
    }

    #[test]
    fn operators() {
        assert_eq!(
            kinds("+ - ~ * ** / // % << >> & | ^ ( )"),
            vec![
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Flip,
                TokenKind::Multiply,
                TokenKind::Power,
                TokenKind::Divide,
                TokenKind::FloorDivide,
                TokenKind::Modulus,
                TokenKind::LeftShift,
                TokenKind::RightShift,
                TokenKind::And,
                TokenKind::Or,
                TokenKind::Xor,
                TokenKind::LeftParen,
                TokenKind::RightParen,
                TokenKind::EndOfInput,
            ]
        );
    }

    #[test]
    fn greedy_lookahead_without_whitespace() {
        assert_eq!(
            kinds("2***3"),
            vec![
                TokenKind::Number,
                TokenKind::Power,
                TokenKind::Multiply,
                TokenKind::Number,
                TokenKind::EndOfInput,
            ]
        );
        assert_eq!(
            kinds("8///2"),
            vec![
                TokenKind::Number,
                TokenKind::FloorDivide,
                TokenKind::Divide,
                TokenKind::Number,
                TokenKind::EndOfInput,
            ]
        );
    }

    #[test]
    fn numbers_are_reserialised() {
        let tokens: Vec<_> = Lexer::new(None, "2 0.50 1. 007")
            .map(|token| token.expect("valid input").text.into_owned())
            .collect();
        assert_eq!(tokens, vec!["2.0", "0.5", "1.0", "7.0", ""]);
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(
            kinds("sqrt SQRT Sqrt"),
            vec![
                TokenKind::Sqrt,
                TokenKind::Sqrt,
                TokenKind::Sqrt,
                TokenKind::EndOfInput
            ]
        );
    }

    #[test]
    fn keywords_prefer_longest_match() {
        assert_eq!(
            kinds("cosh acos acosh cos"),
            vec![
                TokenKind::Cosh,
                TokenKind::Acos,
                TokenKind::Acosh,
                TokenKind::Cos,
                TokenKind::EndOfInput
            ]
        );
    }

    #[test]
    fn keyword_prefix_leaves_the_rest() {
        assert_eq!(
            kinds("sin(1)"),
            vec![
                TokenKind::Sin,
                TokenKind::LeftParen,
                TokenKind::Number,
                TokenKind::RightParen,
                TokenKind::EndOfInput
            ]
        );
        let e = scan_error("pix");
        let e = e.downcast_ref::<ScanError>().expect("scan error");
        assert!(matches!(e, ScanError::UnknownIdentifier { word, .. } if word == "x"));
        assert_eq!(e.offset(), 2);
    }

    #[test]
    fn pi_carries_its_expansion() {
        let mut lexer = Lexer::new(None, "pi");
        let token = lexer.next_token().unwrap();
        assert_eq!(token.kind, TokenKind::Pi);
        assert_eq!(token.text, "3.141592653589793");
    }

    #[test]
    fn end_of_input_repeats() {
        let mut lexer = Lexer::new(None, " 1 ");
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Number);
        for _ in 0..3 {
            assert_eq!(lexer.next_token().unwrap().kind, TokenKind::EndOfInput);
        }
    }

    #[test]
    fn iterator_stops_after_end_of_input() {
        let mut lexer = Lexer::new(None, "");
        assert!(matches!(
            lexer.next(),
            Some(Ok(Token {
                kind: TokenKind::EndOfInput,
                ..
            }))
        ));
        assert!(lexer.next().is_none());
    }

    #[test]
    fn second_decimal_point() {
        let e = scan_error("1.2.3");
        let e = e.downcast_ref::<ScanError>().expect("scan error");
        assert!(matches!(e, ScanError::MalformedNumber { .. }));
        assert_eq!(e.offset(), 3);
    }

    #[test]
    fn lone_angle_bracket() {
        for input in ["1 < 2", "1 > 2", "1 <", "1 < < 2"] {
            let e = scan_error(input);
            let e = e.downcast_ref::<ScanError>().expect("scan error");
            assert!(matches!(e, ScanError::IncompleteOperator { .. }));
            assert_eq!(e.offset(), 2);
        }
    }

    #[test]
    fn unexpected_character() {
        let e = scan_error("1 + $");
        let e = e.downcast_ref::<ScanError>().expect("scan error");
        assert!(matches!(e, ScanError::UnexpectedCharacter { token: '$', .. }));
        assert_eq!(e.offset(), 4);
        assert_eq!(e.to_string(), "Unexpected character '$' at offset 4");
    }

    #[test]
    fn leading_dot_is_unexpected() {
        let e = scan_error(".5");
        let e = e.downcast_ref::<ScanError>().expect("scan error");
        assert!(matches!(e, ScanError::UnexpectedCharacter { token: '.', .. }));
    }

    #[test]
    fn token_display() {
        let tokens: Vec<_> = Lexer::new(None, "2 ** abs")
            .map(|token| token.unwrap().to_string())
            .collect();
        assert_eq!(tokens, vec!["NUMBER 2.0", "POWER **", "ABS ABS", "END_OF_INPUT"]);
    }
}
