//! Token stream with lookahead and line/column tracking for the
//! recursive-descent parser.

use super::lexer::Token;
use super::ParseError;
use logos::Logos;
use std::ops::Range;

#[derive(Debug)]
pub(crate) struct TokenStream<'src> {
    src: &'src str,
    tokens: Vec<(Token, Range<usize>)>,
    pos: usize,
    line_starts: Vec<usize>,
}

impl<'src> TokenStream<'src> {
    /// Tokenize the whole source up front. An unrecognized character is the
    /// first (and only) parse error reported.
    pub fn new(src: &'src str) -> Result<Self, ParseError> {
        let mut line_starts = vec![0usize];
        for (i, b) in src.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }

        let mut tokens = Vec::new();
        for (result, span) in Token::lexer(src).spanned() {
            match result {
                Ok(tok) => tokens.push((tok, span)),
                Err(()) => {
                    let bad = src[span.start..].chars().next().unwrap_or('?');
                    let (line, column) = position(src, &line_starts, span.start);
                    return Err(ParseError {
                        message: format!("unexpected character '{bad}'"),
                        line,
                        column,
                    });
                }
            }
        }
        Ok(TokenStream {
            src,
            tokens,
            pos: 0,
            line_starts,
        })
    }

    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    pub fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n).map(|(t, _)| t)
    }

    /// Consume the current token unconditionally (caller has peeked).
    pub fn bump(&mut self) {
        self.pos += 1;
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Consume the current token if it has the same discriminant as `t`.
    pub fn eat(&mut self, t: &Token) -> bool {
        match self.peek() {
            Some(cur) if std::mem::discriminant(cur) == std::mem::discriminant(t) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    pub fn expect(&mut self, t: Token, context: &str) -> Result<(), ParseError> {
        if self.eat(&t) {
            Ok(())
        } else {
            Err(self.err(match self.peek() {
                Some(found) => format!("expected {t} {context}, found {found}"),
                None => format!("expected {t} {context}, found end of input"),
            }))
        }
    }

    pub fn skip_newlines(&mut self) {
        while self.eat(&Token::Newline) {}
    }

    /// Consume newlines and a `|` iff the next non-newline token is a `|`.
    /// With `cross_newlines` unset, only a `|` directly at the cursor counts.
    pub fn eat_pipe(&mut self, cross_newlines: bool) -> bool {
        let mut look = self.pos;
        if cross_newlines {
            while matches!(self.tokens.get(look), Some((Token::Newline, _))) {
                look += 1;
            }
        }
        if matches!(self.tokens.get(look), Some((Token::Pipe, _))) {
            self.pos = look + 1;
            true
        } else {
            false
        }
    }

    /// Build an error at the current token (or end of input).
    pub fn err(&self, message: impl Into<String>) -> ParseError {
        let offset = match self.tokens.get(self.pos) {
            Some((_, span)) => span.start,
            None => self.src.len(),
        };
        let (line, column) = position(self.src, &self.line_starts, offset);
        ParseError {
            message: message.into(),
            line,
            column,
        }
    }

    /// Build an error at the token at stream position `at`.
    pub fn err_at(&self, at: usize, message: impl Into<String>) -> ParseError {
        let offset = match self.tokens.get(at) {
            Some((_, span)) => span.start,
            None => self.src.len(),
        };
        let (line, column) = position(self.src, &self.line_starts, offset);
        ParseError {
            message: message.into(),
            line,
            column,
        }
    }

    pub fn current_pos(&self) -> usize {
        self.pos
    }
}

/// 1-based line/column of a byte offset; columns count characters.
fn position(src: &str, line_starts: &[usize], offset: usize) -> (u32, u32) {
    let line_idx = line_starts.partition_point(|&s| s <= offset) - 1;
    let start = line_starts[line_idx];
    let column = src[start..offset].chars().count() + 1;
    (line_idx as u32 + 1, column as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_are_one_based_lines_and_columns() {
        let ts = TokenStream::new("a = text\nb = (text)").unwrap();
        // Walk to the '(' token and check its reported position.
        let mut ts = ts;
        while !matches!(ts.peek(), Some(Token::LParen)) {
            ts.bump();
        }
        let err = ts.err("probe");
        assert_eq!(err.line, 2);
        assert_eq!(err.column, 5);
    }

    #[test]
    fn unknown_characters_fail_tokenization() {
        let err = TokenStream::new("a = ^").unwrap_err();
        assert!(err.message.contains("unexpected character"));
        assert_eq!(err.line, 1);
        assert_eq!(err.column, 5);
    }
}
