//! Token definitions for `.rengbis` schema text, via logos.
//!
//! - Spaces/tabs are skipped; `\n` is a token (definitions are line-oriented
//!   and commas are optional across newlines).
//! - `#` comments are stripped during lexing; `##` doc comments survive as
//!   tokens with the marker and one leading space removed.
//! - `#` inside a quoted string never starts a comment (the string token
//!   consumes it first).

use logos::{Lexer, Logos};
use std::fmt;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r]+")]
#[logos(skip r"#([^#\n][^\n]*)?")]
pub(crate) enum Token {
    #[token("\n")]
    Newline,

    /// `## ...` doc-comment line; payload is the text after the marker.
    #[regex(r"##[^\n]*", doc_text)]
    DocComment(String),

    // === Keywords ===
    #[token("any")]
    KwAny,
    #[token("boolean")]
    KwBoolean,
    #[token("number")]
    KwNumber,
    #[token("text")]
    KwText,
    #[token("binary")]
    KwBinary,
    #[token("time")]
    KwTime,
    #[token("import")]
    KwImport,

    #[token("@deprecated")]
    DeprecatedMarker,

    // === Literals & names ===
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[regex(r"-?[0-9]+(\.[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),

    #[regex(r#""([^"\\\n]|\\.)*""#, unescape)]
    Str(String),

    // === Structure ===
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,
    #[token("...")]
    #[token("…")]
    Ellipsis,

    // === Operators ===
    #[token("|")]
    Pipe,
    #[token("*")]
    Star,
    #[token("+")]
    Plus,
    #[token("?")]
    Question,
    #[token("=")]
    Eq,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token("?=")]
    DefaultMarker,
    #[token("=>")]
    FatArrow,
}

fn doc_text(lex: &mut Lexer<Token>) -> String {
    let body = &lex.slice()[2..];
    body.strip_prefix(' ').unwrap_or(body).to_string()
}

fn unescape(lex: &mut Lexer<Token>) -> String {
    let raw = lex.slice();
    let inner = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other), // covers \" and \\
            None => {}
        }
    }
    out
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Token::Newline => "end of line",
            Token::DocComment(_) => "doc comment",
            Token::KwAny => "'any'",
            Token::KwBoolean => "'boolean'",
            Token::KwNumber => "'number'",
            Token::KwText => "'text'",
            Token::KwBinary => "'binary'",
            Token::KwTime => "'time'",
            Token::KwImport => "'import'",
            Token::DeprecatedMarker => "'@deprecated'",
            Token::Ident(name) => return write!(f, "identifier '{name}'"),
            Token::Number(n) => return write!(f, "number {n}"),
            Token::Str(s) => return write!(f, "string \"{s}\""),
            Token::LBrace => "'{'",
            Token::RBrace => "'}'",
            Token::LBracket => "'['",
            Token::RBracket => "']'",
            Token::LParen => "'('",
            Token::RParen => "')'",
            Token::Comma => "','",
            Token::Colon => "':'",
            Token::Dot => "'.'",
            Token::Ellipsis => "'...'",
            Token::Pipe => "'|'",
            Token::Star => "'*'",
            Token::Plus => "'+'",
            Token::Question => "'?'",
            Token::Eq => "'='",
            Token::EqEq => "'=='",
            Token::NotEq => "'!='",
            Token::Lt => "'<'",
            Token::Le => "'<='",
            Token::Gt => "'>'",
            Token::Ge => "'>='",
            Token::DefaultMarker => "'?='",
            Token::FatArrow => "'=>'",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<Token> {
        Token::lexer(src).map(|t| t.unwrap()).collect()
    }

    #[test]
    fn comments_are_stripped_but_doc_comments_survive() {
        let toks = lex("a = text # trailing\n## doc line\n");
        assert_eq!(
            toks,
            vec![
                Token::Ident("a".into()),
                Token::Eq,
                Token::KwText,
                Token::Newline,
                Token::DocComment("doc line".into()),
                Token::Newline,
            ]
        );
    }

    #[test]
    fn hash_inside_strings_is_not_a_comment() {
        let toks = lex("pattern = \"####-##\"");
        assert_eq!(
            toks,
            vec![
                Token::Ident("pattern".into()),
                Token::Eq,
                Token::Str("####-##".into()),
            ]
        );
    }

    #[test]
    fn operators_lex_longest_first() {
        assert_eq!(lex("?="), vec![Token::DefaultMarker]);
        assert_eq!(lex("=>"), vec![Token::FatArrow]);
        assert_eq!(lex("=="), vec![Token::EqEq]);
        assert_eq!(lex("..."), vec![Token::Ellipsis]);
        assert_eq!(lex("…"), vec![Token::Ellipsis]);
    }

    #[test]
    fn numbers_take_a_leading_minus() {
        assert_eq!(lex("-3.5"), vec![Token::Number(-3.5)]);
    }

    #[test]
    fn string_escapes_unquote() {
        assert_eq!(lex(r#""a\"b\\c\nd""#), vec![Token::Str("a\"b\\c\nd".into())]);
    }
}
