#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Keyword,
    Identifier,
    NumericLiteral,
    StringLiteral,
    BooleanLiteral,
    Operator,
    Delimiter,
    Unknown,
}

/// A single lexeme with its classification and 1-based source line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, line: usize) -> Self {
        Token {
            kind,
            lexeme: lexeme.into(),
            line,
        }
    }

    pub fn is(&self, kind: TokenKind, lexeme: &str) -> bool {
        self.kind == kind && self.lexeme == lexeme
    }
}

/// Classifies a scanned word as a keyword, boolean literal, or identifier.
/// `reactive` is reserved but never valid in the grammar; it still lexes as
/// a keyword so the parser can reject it with a useful message.
pub fn classify_word(word: &str) -> TokenKind {
    match word {
        "Stream" | "Reactive" | "if" | "else" | "for" | "while" | "return" | "print"
        | "function" | "int" | "float" | "string" | "reactive" => TokenKind::Keyword,
        "true" | "false" => TokenKind::BooleanLiteral,
        _ => TokenKind::Identifier,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_are_exact_matches() {
        assert_eq!(classify_word("if"), TokenKind::Keyword);
        assert_eq!(classify_word("Stream"), TokenKind::Keyword);
        assert_eq!(classify_word("stream"), TokenKind::Identifier);
        assert_eq!(classify_word("iff"), TokenKind::Identifier);
    }

    #[test]
    fn booleans_are_not_keywords() {
        assert_eq!(classify_word("true"), TokenKind::BooleanLiteral);
        assert_eq!(classify_word("false"), TokenKind::BooleanLiteral);
    }

    #[test]
    fn reactive_lowercase_is_reserved() {
        assert_eq!(classify_word("reactive"), TokenKind::Keyword);
    }
}
