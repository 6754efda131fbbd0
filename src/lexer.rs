use crate::diagnostic::Diagnostic;
use crate::lexeme::Lexeme;
use crate::span::{Span, Spanned};

pub struct Lexer<'src> {
    source: &'src [u8],
    pos: usize,
    diagnostics: Vec<Diagnostic>,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source: source.as_bytes(),
            pos: 0,
            diagnostics: Vec::new(),
        }
    }

    pub fn tokenize(mut self) -> (Vec<Spanned<Lexeme>>, Vec<Diagnostic>) {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token();
            let is_eof = tok.node == Lexeme::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        (tokens, self.diagnostics)
    }

    fn next_token(&mut self) -> Spanned<Lexeme> {
        loop {
            if let Some(doc) = self.skip_whitespace_and_comments() {
                return doc;
            }

            if self.pos >= self.source.len() {
                return self.make_token(Lexeme::Eof, self.pos, self.pos);
            }

            let start = self.pos;
            let ch = self.source[self.pos];

            // Identifiers and keywords
            if is_ident_start(ch) {
                return self.scan_ident_or_keyword();
            }

            // Integer literals
            if ch.is_ascii_digit() {
                return self.scan_number();
            }

            // String literals
            if ch == b'"' {
                return self.scan_string();
            }

            // Symbols
            if let Some(tok) = self.scan_symbol(start) {
                return tok;
            }
            // scan_symbol returned None → error was recorded, try again
        }
    }

    /// Skips whitespace, `//` line comments, and `/* */` block comments.
    /// Returns a token when a `/** */` doc comment is encountered.
    fn skip_whitespace_and_comments(&mut self) -> Option<Spanned<Lexeme>> {
        loop {
            while self.pos < self.source.len() && self.source[self.pos].is_ascii_whitespace() {
                self.pos += 1;
            }

            // Line comments
            if self.source[self.pos..].starts_with(b"//") {
                while self.pos < self.source.len() && self.source[self.pos] != b'\n' {
                    self.pos += 1;
                }
                continue;
            }

            // Block comments; `/**` (not `/**/`) starts a doc comment
            if self.source[self.pos..].starts_with(b"/*") {
                let start = self.pos;
                let is_doc = self.source[self.pos..].starts_with(b"/**")
                    && !self.source[self.pos..].starts_with(b"/**/");
                self.pos += if is_doc { 3 } else { 2 };
                let body_start = self.pos;
                while self.pos < self.source.len() && !self.source[self.pos..].starts_with(b"*/") {
                    self.pos += 1;
                }
                if self.pos >= self.source.len() {
                    self.diagnostics.push(
                        Diagnostic::error(
                            "unterminated block comment".to_string(),
                            Span::new(start as u32, self.pos as u32),
                        )
                        .with_help("close the comment with '*/'".to_string()),
                    );
                    return Some(self.make_token(Lexeme::Eof, self.pos, self.pos));
                }
                let body = &self.source[body_start..self.pos];
                self.pos += 2;
                if is_doc {
                    let text = strip_doc_body(body);
                    return Some(self.make_token(Lexeme::DocComment(text), start, self.pos));
                }
                continue;
            }

            return None;
        }
    }

    fn scan_ident_or_keyword(&mut self) -> Spanned<Lexeme> {
        let start = self.pos;
        while self.pos < self.source.len() && is_ident_continue(self.source[self.pos]) {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.source[start..self.pos]).unwrap();
        let token = Lexeme::from_keyword(text).unwrap_or_else(|| Lexeme::Ident(text.to_string()));
        self.make_token(token, start, self.pos)
    }

    fn scan_number(&mut self) -> Spanned<Lexeme> {
        let start = self.pos;
        while self.pos < self.source.len() && self.source[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.source[start..self.pos]).unwrap();
        match text.parse::<u64>() {
            Ok(n) => self.make_token(Lexeme::Integer(n), start, self.pos),
            Err(_) => {
                self.diagnostics.push(
                    Diagnostic::error(
                        format!("integer literal '{}' is too large", text),
                        Span::new(start as u32, self.pos as u32),
                    )
                    .with_help(format!("maximum integer value is {}", u64::MAX)),
                );
                self.make_token(Lexeme::Integer(0), start, self.pos)
            }
        }
    }

    fn scan_string(&mut self) -> Spanned<Lexeme> {
        let start = self.pos;
        self.pos += 1; // skip opening quote
        let mut value = String::new();
        loop {
            if self.pos >= self.source.len() || self.source[self.pos] == b'\n' {
                self.diagnostics.push(
                    Diagnostic::error(
                        "unterminated string literal".to_string(),
                        Span::new(start as u32, self.pos as u32),
                    )
                    .with_help("close the string with '\"' on the same line".to_string()),
                );
                return self.make_token(Lexeme::Str(value), start, self.pos);
            }
            match self.source[self.pos] {
                b'"' => {
                    self.pos += 1;
                    return self.make_token(Lexeme::Str(value), start, self.pos);
                }
                b'\\' => {
                    self.pos += 1;
                    let escaped = if self.pos < self.source.len() {
                        self.source[self.pos]
                    } else {
                        continue; // unterminated, caught on next iteration
                    };
                    match escaped {
                        b'\\' => value.push('\\'),
                        b'"' => value.push('"'),
                        b'n' => value.push('\n'),
                        b't' => value.push('\t'),
                        other => {
                            self.diagnostics.push(
                                Diagnostic::error(
                                    format!("unknown escape sequence '\\{}'", other as char),
                                    Span::new((self.pos - 1) as u32, (self.pos + 1) as u32),
                                )
                                .with_help(
                                    "supported escapes are \\\\, \\\", \\n, and \\t".to_string(),
                                ),
                            );
                        }
                    }
                    self.pos += 1;
                }
                _ => {
                    // Byte-wise copy keeps multi-byte UTF-8 sequences intact.
                    let ch_start = self.pos;
                    self.pos += 1;
                    while self.pos < self.source.len() && self.source[self.pos] & 0xC0 == 0x80 {
                        self.pos += 1;
                    }
                    value.push_str(
                        std::str::from_utf8(&self.source[ch_start..self.pos]).unwrap_or("\u{FFFD}"),
                    );
                }
            }
        }
    }

    fn scan_symbol(&mut self, start: usize) -> Option<Spanned<Lexeme>> {
        let ch = self.source[self.pos];
        self.pos += 1;

        let token = match ch {
            b'{' => Lexeme::LBrace,
            b'}' => Lexeme::RBrace,
            b'(' => Lexeme::LParen,
            b')' => Lexeme::RParen,
            b'[' => Lexeme::LBracket,
            b']' => Lexeme::RBracket,
            b'<' => Lexeme::Lt,
            b'>' => Lexeme::Gt,
            b',' => Lexeme::Comma,
            b';' => Lexeme::Semicolon,
            b':' => Lexeme::Colon,
            b'.' => Lexeme::Dot,
            b'=' => Lexeme::Eq,
            b'*' => Lexeme::Star,
            b'?' => Lexeme::Question,
            b'|' => Lexeme::Pipe,
            b'!' => Lexeme::Bang,
            _ => {
                self.diagnostics.push(
                    Diagnostic::error(
                        format!("unexpected character '{}' (U+{:04X})", ch as char, ch),
                        Span::new(start as u32, self.pos as u32),
                    )
                    .with_help(
                        "this character is not part of the tree-description syntax".to_string(),
                    ),
                );
                return None;
            }
        };

        Some(self.make_token(token, start, self.pos))
    }

    fn make_token(&self, token: Lexeme, start: usize, end: usize) -> Spanned<Lexeme> {
        Spanned::new(token, Span::new(start as u32, end as u32))
    }
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_continue(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || ch == b'_'
}

/// Strips the leading `*` gutter that doc comments conventionally carry.
fn strip_doc_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let mut lines = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        let trimmed = trimmed.strip_prefix('*').map(str::trim_start).unwrap_or(trimmed);
        lines.push(trimmed.to_string());
    }
    while lines.first().is_some_and(|l| l.is_empty()) {
        lines.remove(0);
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Lexeme> {
        let (tokens, diags) = Lexer::new(source).tokenize();
        assert!(diags.is_empty(), "unexpected errors: {:?}", diags);
        tokens.into_iter().map(|t| t.node).collect()
    }

    #[test]
    fn test_keywords() {
        let tokens = lex("namespace include src_include location features prim enum node root error");
        assert_eq!(
            tokens,
            vec![
                Lexeme::Namespace,
                Lexeme::Include,
                Lexeme::SrcInclude,
                Lexeme::Location,
                Lexeme::Features,
                Lexeme::Prim,
                Lexeme::Enum,
                Lexeme::Node,
                Lexeme::Root,
                Lexeme::Error,
                Lexeme::Eof,
            ]
        );
    }

    #[test]
    fn test_edge_keywords() {
        let tokens = lex("Maybe One Any Many Link");
        assert_eq!(
            tokens,
            vec![
                Lexeme::Maybe,
                Lexeme::One,
                Lexeme::Any,
                Lexeme::Many,
                Lexeme::Link,
                Lexeme::Eof,
            ]
        );
    }

    #[test]
    fn test_symbols() {
        let tokens = lex("{ } ( ) [ ] < > , ; : . = * ? | !");
        assert_eq!(
            tokens,
            vec![
                Lexeme::LBrace,
                Lexeme::RBrace,
                Lexeme::LParen,
                Lexeme::RParen,
                Lexeme::LBracket,
                Lexeme::RBracket,
                Lexeme::Lt,
                Lexeme::Gt,
                Lexeme::Comma,
                Lexeme::Semicolon,
                Lexeme::Colon,
                Lexeme::Dot,
                Lexeme::Eq,
                Lexeme::Star,
                Lexeme::Question,
                Lexeme::Pipe,
                Lexeme::Bang,
                Lexeme::Eof,
            ]
        );
    }

    #[test]
    fn test_identifiers() {
        let tokens = lex("Expr binary_op x1 _hidden");
        assert_eq!(
            tokens,
            vec![
                Lexeme::Ident("Expr".into()),
                Lexeme::Ident("binary_op".into()),
                Lexeme::Ident("x1".into()),
                Lexeme::Ident("_hidden".into()),
                Lexeme::Eof,
            ]
        );
    }

    #[test]
    fn test_integers() {
        let tokens = lex("0 1 42 18446744073709551615");
        assert_eq!(
            tokens,
            vec![
                Lexeme::Integer(0),
                Lexeme::Integer(1),
                Lexeme::Integer(42),
                Lexeme::Integer(u64::MAX),
                Lexeme::Eof,
            ]
        );
    }

    #[test]
    fn test_string_literal() {
        let tokens = lex(r#""tree-all.hpp" "a\nb" "q\"q" "back\\slash""#);
        assert_eq!(
            tokens,
            vec![
                Lexeme::Str("tree-all.hpp".into()),
                Lexeme::Str("a\nb".into()),
                Lexeme::Str("q\"q".into()),
                Lexeme::Str("back\\slash".into()),
                Lexeme::Eof,
            ]
        );
    }

    #[test]
    fn test_line_and_block_comments_skipped() {
        let tokens = lex("node // trailing\n/* block\ncomment */ Expr");
        assert_eq!(
            tokens,
            vec![Lexeme::Node, Lexeme::Ident("Expr".into()), Lexeme::Eof]
        );
    }

    #[test]
    fn test_doc_comment_token() {
        let tokens = lex("/** A binary addition. */ node Add");
        assert_eq!(
            tokens,
            vec![
                Lexeme::DocComment("A binary addition.".into()),
                Lexeme::Node,
                Lexeme::Ident("Add".into()),
                Lexeme::Eof,
            ]
        );
    }

    #[test]
    fn test_doc_comment_gutter_stripped() {
        let tokens = lex("/**\n * Line one.\n * Line two.\n */ node X");
        assert_eq!(
            tokens[0],
            Lexeme::DocComment("Line one.\nLine two.".into())
        );
    }

    #[test]
    fn test_empty_block_comment_is_not_doc() {
        let tokens = lex("/**/ node X");
        assert_eq!(
            tokens,
            vec![Lexeme::Node, Lexeme::Ident("X".into()), Lexeme::Eof]
        );
    }

    #[test]
    fn test_field_declaration() {
        let tokens = lex("lhs: One<Expr>;");
        assert_eq!(
            tokens,
            vec![
                Lexeme::Ident("lhs".into()),
                Lexeme::Colon,
                Lexeme::One,
                Lexeme::Lt,
                Lexeme::Ident("Expr".into()),
                Lexeme::Gt,
                Lexeme::Semicolon,
                Lexeme::Eof,
            ]
        );
    }

    // --- Error path tests ---

    fn lex_with_errors(source: &str) -> (Vec<Lexeme>, Vec<Diagnostic>) {
        let (tokens, diags) = Lexer::new(source).tokenize();
        let lexemes = tokens.into_iter().map(|t| t.node).collect();
        (lexemes, diags)
    }

    #[test]
    fn test_error_unexpected_character() {
        let (_tokens, diags) = lex_with_errors("@");
        assert!(!diags.is_empty(), "should produce an error for '@'");
        assert!(
            diags[0].message.contains("unexpected character '@'"),
            "error should name the character, got: {}",
            diags[0].message
        );
        assert!(diags[0].help.is_some());
    }

    #[test]
    fn test_error_unterminated_string() {
        let (_tokens, diags) = lex_with_errors("include \"never closed");
        assert!(!diags.is_empty(), "should error on unterminated string");
        assert!(
            diags[0].message.contains("unterminated string literal"),
            "got: {}",
            diags[0].message
        );
    }

    #[test]
    fn test_error_unterminated_block_comment() {
        let (_tokens, diags) = lex_with_errors("/* never closed");
        assert!(!diags.is_empty(), "should error on unterminated comment");
        assert!(
            diags[0].message.contains("unterminated block comment"),
            "got: {}",
            diags[0].message
        );
    }

    #[test]
    fn test_error_integer_too_large() {
        let (_tokens, diags) = lex_with_errors("99999999999999999999999");
        assert!(!diags.is_empty(), "should error on huge integer");
        assert!(
            diags[0].message.contains("too large"),
            "got: {}",
            diags[0].message
        );
    }

    #[test]
    fn test_error_unknown_escape() {
        let (tokens, diags) = lex_with_errors(r#""a\qb""#);
        assert!(!diags.is_empty(), "should error on unknown escape");
        assert!(
            diags[0].message.contains("unknown escape sequence"),
            "got: {}",
            diags[0].message
        );
        // The rest of the string still lexes
        assert_eq!(tokens[0], Lexeme::Str("ab".into()));
    }
}
