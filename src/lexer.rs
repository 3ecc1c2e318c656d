//! Converts Cesium source text into a token stream.

use std::iter::Peekable;
use std::str::CharIndices;

use crate::error::{Error, Result};
use crate::token::{classify_word, Token, TokenKind};

/// Tokenizes an entire source buffer. The first lexical error aborts the
/// scan; there is no recovery.
pub fn lex(source: &str) -> Result<Vec<Token>> {
    Lexer::new(source).scan()
}

/// A `Lexer` handles the raw conversion of characters to tokens.
#[derive(Debug)]
struct Lexer<'a> {
    iter: Peekable<CharIndices<'a>>,
    line: usize,
}

const OPERATOR_CHARS: &str = "-+*=/<>|&!";
const DELIMITER_CHARS: &str = "()[]{};,.";

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Lexer {
            iter: source.char_indices().peekable(),
            line: 1,
        }
    }

    fn scan(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(c) = self.peek_char() {
            if c.is_ascii_whitespace() {
                self.next_char();
            } else if c == '/' {
                if let Some(token) = self.slash()? {
                    tokens.push(token);
                }
            } else if c.is_alphabetic() {
                tokens.push(self.lex_word());
            } else if c.is_ascii_digit() {
                tokens.push(self.lex_number()?);
            } else if c == '"' {
                tokens.push(self.lex_string()?);
            } else if OPERATOR_CHARS.contains(c) {
                tokens.push(self.lex_operator());
            } else if DELIMITER_CHARS.contains(c) {
                tokens.push(self.lex_delimiter()?);
            } else {
                return Err(self.error(format!("unrecognized character '{}'", c)));
            }
        }
        Ok(tokens)
    }

    /// Peeks the next character.
    fn peek_char(&mut self) -> Option<char> {
        self.iter.peek().map(|&(_, c)| c)
    }

    /// Pops and returns the next character, tracking line breaks.
    fn next_char(&mut self) -> Option<char> {
        let c = self.iter.next().map(|(_, c)| c);
        if c == Some('\n') {
            self.line += 1;
        }
        c
    }

    /// Moves a character forward, only if the current character matches
    /// `expected`.
    fn try_next(&mut self, expected: char) -> bool {
        match self.peek_char() {
            Some(c) if c == expected => {
                self.next_char();
                true
            }
            _ => false,
        }
    }

    /// Constructs an error at the current line.
    fn error(&self, message: impl Into<String>) -> Error {
        Error::lexical(message, self.line)
    }

    /// The lexer is looking at a `/`. It may start a comment or be the
    /// division operator.
    fn slash(&mut self) -> Result<Option<Token>> {
        let line = self.line;
        self.next_char();
        if self.try_next('/') {
            while let Some(c) = self.next_char() {
                if c == '\n' {
                    break;
                }
            }
            Ok(None)
        } else if self.try_next('*') {
            // An unclosed block comment runs to EOF and is treated as closed.
            while let Some(c) = self.next_char() {
                if c == '*' && self.try_next('/') {
                    break;
                }
            }
            Ok(None)
        } else {
            Ok(Some(Token::new(TokenKind::Operator, "/", line)))
        }
    }

    /// Reads a word and classifies it as an identifier, keyword, or boolean
    /// literal.
    fn lex_word(&mut self) -> Token {
        let line = self.line;
        let mut word = String::new();
        while let Some(c) = self.peek_char() {
            if c.is_alphabetic() || c.is_ascii_digit() {
                word.push(c);
                self.next_char();
            } else {
                break;
            }
        }
        let kind = classify_word(&word);
        Token::new(kind, word, line)
    }

    /// Reads a numeric literal: digits with at most one interior dot. The
    /// dot must be followed by a digit.
    fn lex_number(&mut self) -> Result<Token> {
        let line = self.line;
        let mut text = String::new();
        let mut has_dot = false;
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                text.push(c);
                self.next_char();
            } else if c == '.' && !has_dot {
                has_dot = true;
                text.push(c);
                self.next_char();
            } else if c == '.' {
                return Err(self.error("numeric literal with multiple dots"));
            } else {
                break;
            }
        }
        if text.ends_with('.') {
            return Err(self.error("numeric literal ending with a dot"));
        }
        Ok(Token::new(TokenKind::NumericLiteral, text, line))
    }

    /// Reads a string literal. There is no escape processing; the literal is
    /// every character up to the next `"`.
    fn lex_string(&mut self) -> Result<Token> {
        let line = self.line;
        self.next_char(); // opening quote
        let mut text = String::new();
        while let Some(c) = self.next_char() {
            if c == '"' {
                return Ok(Token::new(TokenKind::StringLiteral, text, line));
            }
            text.push(c);
        }
        Err(Error::lexical("unterminated string literal", line))
    }

    /// Reads a one- or two-character operator. Only the exact pairs
    /// `== != <= >= && ||` merge; any other adjacency yields two tokens.
    fn lex_operator(&mut self) -> Token {
        let line = self.line;
        let first = self.next_char().unwrap();
        let mut text = String::from(first);
        if let Some(second) = self.peek_char() {
            if is_operator_pair(first, second) {
                text.push(second);
                self.next_char();
            }
        }
        Token::new(TokenKind::Operator, text, line)
    }

    /// Reads a delimiter. A `.` immediately followed by a digit is the
    /// fractional half of a malformed number like `.5`.
    fn lex_delimiter(&mut self) -> Result<Token> {
        let line = self.line;
        let c = self.next_char().unwrap();
        if c == '.' {
            if let Some(next) = self.peek_char() {
                if next.is_ascii_digit() {
                    return Err(self.error("numeric literal ending with a dot"));
                }
            }
        }
        Ok(Token::new(TokenKind::Delimiter, c.to_string(), line))
    }
}

fn is_operator_pair(first: char, second: char) -> bool {
    matches!(
        (first, second),
        ('=', '=') | ('!', '=') | ('<', '=') | ('>', '=') | ('&', '&') | ('|', '|')
    )
}
