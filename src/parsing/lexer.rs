//! Lexer
//!
//! This submodule prepares source code for parsing by splitting the text
//! into easy-to-work-with tokens. The lexer reads the source left to right
//! with a single character of lookahead and never fails: input it cannot
//! classify becomes an [`TokenKind::Illegal`] token for the parser to
//! report.

use super::token::{lookup_keyword, Token, TokenKind};

pub struct Lexer {
    chars: Vec<char>,
    /// Index of the current character
    position: usize,
    /// Index of the next character to read
    read_position: usize,
    /// Current character, `'\0'` once the input is exhausted
    ch: char,
    line: u32,
    column: u32,
    byte_offset: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        let mut lexer = Self {
            chars: source.chars().collect(),
            position: 0,
            read_position: 0,
            ch: '\0',
            line: 1,
            column: 1,
            byte_offset: 0,
        };
        lexer.read_char();
        lexer
    }

    /// Consume the current character and load the next one
    fn read_char(&mut self) {
        match self.ch {
            '\0' => {}
            '\n' => {
                self.line += 1;
                self.column = 1;
                self.byte_offset += 1;
            }
            c => {
                self.column += 1;
                self.byte_offset += c.len_utf8();
            }
        }
        self.ch = self.chars.get(self.read_position).copied().unwrap_or('\0');
        self.position = self.read_position;
        if self.read_position < self.chars.len() {
            self.read_position += 1;
        }
    }

    fn peek_char(&self) -> char {
        self.chars.get(self.read_position).copied().unwrap_or('\0')
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.ch, ' ' | '\t' | '\r' | '\n') {
            self.read_char();
        }
    }

    fn read_identifier(&mut self) -> String {
        let start = self.position;
        while self.ch.is_ascii_alphanumeric() || self.ch == '_' {
            self.read_char();
        }
        self.chars[start..self.position].iter().collect()
    }

    fn read_number(&mut self) -> String {
        let start = self.position;
        while self.ch.is_ascii_digit() {
            self.read_char();
        }
        if self.ch == '.' && self.peek_char().is_ascii_digit() {
            self.read_char();
            while self.ch.is_ascii_digit() {
                self.read_char();
            }
        }
        self.chars[start..self.position].iter().collect()
    }

    /// Read a string body after the opening quote was seen
    ///
    /// Escape sequences are consumed as backslash + character pairs and kept
    /// verbatim in the lexeme. Returns `None` when the input ends before the
    /// closing quote.
    fn read_string(&mut self) -> Option<String> {
        self.read_char();
        let start = self.position;
        loop {
            match self.ch {
                '"' => {
                    let body = self.chars[start..self.position].iter().collect();
                    self.read_char();
                    return Some(body);
                }
                '\0' => return None,
                '\\' => {
                    self.read_char();
                    if self.ch != '\0' {
                        self.read_char();
                    }
                }
                _ => self.read_char(),
            }
        }
    }

    /// Produce the next token; keeps returning EOF once the input is exhausted
    pub fn next(&mut self) -> Token {
        self.skip_whitespace();

        let line = self.line;
        let column = self.column;
        let offset = self.byte_offset;
        let tok = |kind, lexeme: &str| Token::new(kind, lexeme, line, column, offset);

        let token = match self.ch {
            '\0' => return tok(TokenKind::Eof, ""),
            '(' => tok(TokenKind::LParen, "("),
            ')' => tok(TokenKind::RParen, ")"),
            '{' => tok(TokenKind::LBrace, "{"),
            '}' => tok(TokenKind::RBrace, "}"),
            ';' => tok(TokenKind::Semicolon, ";"),
            ',' => tok(TokenKind::Comma, ","),
            ':' => tok(TokenKind::Colon, ":"),
            '+' => tok(TokenKind::Plus, "+"),
            '-' => tok(TokenKind::Minus, "-"),
            '*' => tok(TokenKind::Star, "*"),
            '/' => tok(TokenKind::Slash, "/"),
            '=' => {
                if self.peek_char() == '=' {
                    self.read_char();
                    tok(TokenKind::Eq, "==")
                } else {
                    tok(TokenKind::Assign, "=")
                }
            }
            '!' => {
                if self.peek_char() == '=' {
                    self.read_char();
                    tok(TokenKind::NotEq, "!=")
                } else {
                    tok(TokenKind::Bang, "!")
                }
            }
            '<' => {
                if self.peek_char() == '=' {
                    self.read_char();
                    tok(TokenKind::LtEq, "<=")
                } else {
                    tok(TokenKind::Lt, "<")
                }
            }
            '>' => {
                if self.peek_char() == '=' {
                    self.read_char();
                    tok(TokenKind::GtEq, ">=")
                } else {
                    tok(TokenKind::Gt, ">")
                }
            }
            '&' => {
                if self.peek_char() == '&' {
                    self.read_char();
                    tok(TokenKind::AndAnd, "&&")
                } else {
                    tok(TokenKind::Illegal, "&")
                }
            }
            '|' => {
                if self.peek_char() == '|' {
                    self.read_char();
                    tok(TokenKind::OrOr, "||")
                } else {
                    tok(TokenKind::Illegal, "|")
                }
            }
            '"' => {
                return match self.read_string() {
                    Some(body) => Token::new(TokenKind::Str, body, line, column, offset),
                    None => Token::new(
                        TokenKind::Illegal,
                        "unterminated string",
                        line,
                        column,
                        offset,
                    ),
                };
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let lexeme = self.read_identifier();
                let kind = lookup_keyword(&lexeme);
                return Token::new(kind, lexeme, line, column, offset);
            }
            c if c.is_ascii_digit() => {
                let lexeme = self.read_number();
                return Token::new(TokenKind::Number, lexeme, line, column, offset);
            }
            c => tok(TokenKind::Illegal, &c.to_string()),
        };

        self.read_char();
        token
    }

    /// Drive the lexer to completion; the returned buffer ends with EOF
    pub fn tokenize(source: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return tokens;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::tokenize(src).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn empty_source_is_a_single_eof() {
        let tokens = Lexer::tokenize("");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Eof);
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
    }

    #[test]
    fn eof_is_idempotent() {
        let mut lexer = Lexer::new("x");
        assert_eq!(lexer.next().kind, TokenKind::Ident);
        let first = lexer.next();
        let second = lexer.next();
        assert_eq!(first.kind, TokenKind::Eof);
        assert_eq!(second.kind, TokenKind::Eof);
        assert_eq!((first.line, first.column), (second.line, second.column));
    }

    #[test]
    fn keywords_types_and_booleans() {
        assert_eq!(
            kinds("func if else while for return int void true false foo"),
            vec![
                TokenKind::Func,
                TokenKind::If,
                TokenKind::Else,
                TokenKind::While,
                TokenKind::For,
                TokenKind::Return,
                TokenKind::Type,
                TokenKind::Type,
                TokenKind::Bool,
                TokenKind::Bool,
                TokenKind::Ident,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn two_character_operators_and_their_fallbacks() {
        assert_eq!(
            kinds("== = != ! <= < >= > && ||"),
            vec![
                TokenKind::Eq,
                TokenKind::Assign,
                TokenKind::NotEq,
                TokenKind::Bang,
                TokenKind::LtEq,
                TokenKind::Lt,
                TokenKind::GtEq,
                TokenKind::Gt,
                TokenKind::AndAnd,
                TokenKind::OrOr,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lone_ampersand_is_illegal() {
        let tokens = Lexer::tokenize("a & b");
        assert_eq!(tokens[1].kind, TokenKind::Illegal);
        assert_eq!(tokens[1].lexeme, "&");
    }

    #[test]
    fn numbers_keep_their_exact_lexeme() {
        let tokens = Lexer::tokenize("0 42 3.25");
        assert_eq!(tokens[0].lexeme, "0");
        assert_eq!(tokens[1].lexeme, "42");
        assert_eq!(tokens[2].lexeme, "3.25");
        assert!(tokens[..3].iter().all(|t| t.kind == TokenKind::Number));
    }

    #[test]
    fn dot_without_digit_is_not_part_of_a_number() {
        let tokens = Lexer::tokenize("1.");
        assert_eq!(tokens[0].kind, TokenKind::Number);
        assert_eq!(tokens[0].lexeme, "1");
        assert_eq!(tokens[1].kind, TokenKind::Illegal);
        assert_eq!(tokens[1].lexeme, ".");
    }

    #[test]
    fn strings_strip_quotes_and_keep_escape_pairs() {
        let tokens = Lexer::tokenize(r#""hello" "" "a\"b""#);
        assert_eq!(tokens[0].kind, TokenKind::Str);
        assert_eq!(tokens[0].lexeme, "hello");
        assert_eq!(tokens[1].lexeme, "");
        assert_eq!(tokens[2].lexeme, r#"a\"b"#);
    }

    #[test]
    fn unterminated_string_is_illegal() {
        let tokens = Lexer::tokenize("\"abc");
        assert_eq!(tokens[0].kind, TokenKind::Illegal);
        assert_eq!(tokens[0].lexeme, "unterminated string");
        assert_eq!(tokens[1].kind, TokenKind::Eof);
    }

    #[test]
    fn unknown_character_position() {
        let tokens = Lexer::tokenize("\n\n    @");
        assert_eq!(tokens[0].kind, TokenKind::Illegal);
        assert_eq!(tokens[0].lexeme, "@");
        assert_eq!((tokens[0].line, tokens[0].column), (3, 5));
    }

    #[test]
    fn newline_resets_the_column() {
        let tokens = Lexer::tokenize("ab cd\nef");
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (1, 4));
        assert_eq!((tokens[2].line, tokens[2].column), (2, 1));
    }

    #[test]
    fn lexemes_match_the_source_text() {
        let src = "int x = 1 + 2;\nwhile (x <= 10) { x = x * 2; }";
        let lines: Vec<&str> = src.lines().collect();
        for token in Lexer::tokenize(src) {
            if matches!(token.kind, TokenKind::Eof | TokenKind::Str) {
                continue;
            }
            let line = lines[(token.line - 1) as usize];
            let start = (token.column - 1) as usize;
            let slice: String = line
                .chars()
                .skip(start)
                .take(token.lexeme.chars().count())
                .collect();
            assert_eq!(slice, token.lexeme);
        }
    }
}
