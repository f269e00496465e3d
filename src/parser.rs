//! Grammar and recursive-descent parser for `.rengbis` schema text.
//!
//! Shape of a schema file: blank lines, zero or more definitions (imports or
//! `name = items` bindings, each optionally preceded by a `##` doc block
//! and/or `@deprecated`), and at most one root line (`= items`).
//!
//! Precedence, from loosest to tightest:
//! - alternatives: `a | b | c` (all-literal chains collapse to an enum)
//! - list markers: `*`, `+`, `{n}`, `{min,max}` attach to the immediately
//!   preceding item; a `[ ... ]` block after a marker constrains the list
//! - items: scalars, literals, `{ ... }`, `( ... )`, references
//!
//! Parentheses steer precedence (`(text | number)*` lists the whole
//! alternative) and build tuples; a parenthesized single item is an error.
//!
//! Failure policy: fail fast on the first structural error. The error carries
//! a structured 1-based line/column and renders the legacy
//! `"<message> (line N, column M)"` text for editor consumption.

pub(crate) mod constraints;
pub(crate) mod lexer;
pub(crate) mod stream;

use crate::schema::{
    Document, FieldLabel, ListConstraints, NumericConstraints, ObjectField, Schema,
    TextConstraints, TimeConstraints,
};
use lexer::Token;
use ordered_float::OrderedFloat;
use stream::TokenStream;

/// Grammar violation, with a best-effort source position.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} (line {line}, column {column})")]
pub struct ParseError {
    pub message: String,
    /// 1-based.
    pub line: u32,
    /// 1-based, counted in characters.
    pub column: u32,
}

/// Parse a schema file and return its root schema.
///
/// A file without a `= <items>` root line is an error; use
/// [`parse_document`] for definition-only files.
pub fn parse(text: &str) -> Result<Schema, ParseError> {
    let doc = parse_document(text)?;
    doc.root.ok_or(ParseError {
        message: "schema has no root (expected a '= <items>' line)".into(),
        line: 1,
        column: 1,
    })
}

/// Parse a schema file into its definitions, imports and optional root.
pub fn parse_document(text: &str) -> Result<Document, ParseError> {
    let ts = TokenStream::new(text)?;
    Parser { ts }.document()
}

pub(crate) struct Parser<'src> {
    pub(crate) ts: TokenStream<'src>,
}

impl Parser<'_> {
    fn document(mut self) -> Result<Document, ParseError> {
        let mut doc = Document::default();
        loop {
            self.ts.skip_newlines();
            if self.ts.at_end() {
                break;
            }

            // Leading metadata: `##` doc block and/or `@deprecated`.
            let mut doc_lines: Vec<String> = Vec::new();
            let mut deprecated = false;
            loop {
                match self.ts.peek() {
                    Some(Token::DocComment(text)) => {
                        let text = text.clone();
                        self.ts.bump();
                        doc_lines.push(text);
                        if !self.ts.eat(&Token::Newline) && !self.ts.at_end() {
                            return Err(self.ts.err("expected end of line after doc comment"));
                        }
                    }
                    Some(Token::DeprecatedMarker) => {
                        self.ts.bump();
                        deprecated = true;
                        self.ts.eat(&Token::Newline);
                    }
                    _ => break,
                }
            }

            match self.ts.peek() {
                Some(Token::Eq) => {
                    self.ts.bump();
                    if doc.root.is_some() {
                        return Err(self.ts.err("document already has a root"));
                    }
                    let items = self.items(false)?;
                    doc.root = Some(self.finish_definition(items, doc_lines, deprecated));
                }
                Some(Token::Ident(name)) => {
                    let name = name.clone();
                    self.ts.bump();
                    match self.ts.peek() {
                        Some(Token::FatArrow) => {
                            self.ts.bump();
                            self.ts.expect(Token::KwImport, "after '=>'")?;
                            let path = self.string_lit("import path")?;
                            self.check_fresh_name(&doc, &name)?;
                            doc.imports.insert(name, path);
                        }
                        Some(Token::Eq) => {
                            self.ts.bump();
                            let items = self.items(false)?;
                            let schema = self.finish_definition(items, doc_lines, deprecated);
                            self.check_fresh_name(&doc, &name)?;
                            doc.definitions.insert(name, schema);
                        }
                        _ => {
                            return Err(self
                                .ts
                                .err(format!("expected '=' or '=> import' after '{name}'")));
                        }
                    }
                }
                Some(other) => {
                    return Err(self
                        .ts
                        .err(format!("expected a definition or root line, found {other}")));
                }
                None => break,
            }
            self.end_of_line()?;
        }
        Ok(doc)
    }

    fn check_fresh_name(&self, doc: &Document, name: &str) -> Result<(), ParseError> {
        if doc.imports.contains_key(name) || doc.definitions.contains_key(name) {
            Err(self.ts.err(format!("duplicate definition of '{name}'")))
        } else {
            Ok(())
        }
    }

    /// Consume an optional trailing `##` doc comment and apply the metadata
    /// wrappers (doc inside, `@deprecated` outside).
    fn finish_definition(
        &mut self,
        schema: Schema,
        mut doc_lines: Vec<String>,
        deprecated: bool,
    ) -> Schema {
        if let Some(Token::DocComment(text)) = self.ts.peek() {
            doc_lines.push(text.clone());
            self.ts.bump();
        }
        let mut schema = schema;
        if !doc_lines.is_empty() {
            schema = Schema::Documented(doc_lines.join("\n"), Box::new(schema));
        }
        if deprecated {
            schema = Schema::Deprecated(Box::new(schema));
        }
        schema
    }

    fn end_of_line(&mut self) -> Result<(), ParseError> {
        if self.ts.at_end() || self.ts.eat(&Token::Newline) {
            Ok(())
        } else {
            match self.ts.peek() {
                Some(other) => Err(self.ts.err(format!("expected end of line, found {other}"))),
                None => Ok(()),
            }
        }
    }

    // ------------------------------ items --------------------------------- //

    /// `items` = a chain of marked items separated by `|`. With `nested` set
    /// (inside braces/brackets/parens) the chain may cross newlines.
    fn items(&mut self, nested: bool) -> Result<Schema, ParseError> {
        let mut branches = vec![self.marked()?];
        while self.ts.eat_pipe(nested) {
            if nested {
                self.ts.skip_newlines();
            }
            branches.push(self.marked()?);
        }
        if branches.len() == 1 {
            return Ok(branches.remove(0));
        }
        // A chain of plain string literals is an enum, not an alternative.
        if branches.iter().all(|b| matches!(b, Schema::GivenText(_))) {
            let lits = branches
                .into_iter()
                .map(|b| match b {
                    Schema::GivenText(s) => s,
                    _ => String::new(),
                })
                .collect();
            return Ok(Schema::Enum(lits));
        }
        Ok(Schema::Alternative(branches))
    }

    /// One item with an optional list marker and list constraint block.
    fn marked(&mut self) -> Result<Schema, ParseError> {
        let item = self.item()?;
        let bounds = match self.ts.peek() {
            Some(Token::Star) => {
                self.ts.bump();
                Some((None, None))
            }
            Some(Token::Plus) => {
                self.ts.bump();
                Some((Some(1), None))
            }
            Some(Token::LBrace) if matches!(self.ts.peek_nth(1), Some(Token::Number(_))) => {
                self.ts.bump();
                let lo = self.count_lit("repetition count")?;
                let hi = if self.ts.eat(&Token::Comma) {
                    self.count_lit("maximum repetition count")?
                } else {
                    lo
                };
                self.ts.expect(Token::RBrace, "to close the repetition marker")?;
                if lo > hi {
                    return Err(self.ts.err(format!("inconsistent size range: {lo} > {hi}")));
                }
                Some((Some(lo), Some(hi)))
            }
            _ => None,
        };
        let Some((min, max)) = bounds else {
            return Ok(item);
        };
        let mut c = ListConstraints {
            min_size: min,
            max_size: max,
            unique: Vec::new(),
        };
        if matches!(self.ts.peek(), Some(Token::LBracket)) {
            self.list_block(&mut c)?;
        }
        Ok(Schema::ListOf(Box::new(item), c))
    }

    fn item(&mut self) -> Result<Schema, ParseError> {
        match self.ts.peek() {
            Some(Token::KwAny) => {
                self.ts.bump();
                Ok(Schema::Any)
            }
            Some(Token::KwBoolean) => {
                self.ts.bump();
                Ok(Schema::Boolean)
            }
            Some(Token::KwNumber) => {
                self.ts.bump();
                let mut c = NumericConstraints::default();
                if matches!(self.ts.peek(), Some(Token::LBracket)) {
                    self.numeric_block(&mut c)?;
                }
                let default = if self.ts.eat(&Token::DefaultMarker) {
                    Some(OrderedFloat(self.number_lit("default value")?))
                } else {
                    None
                };
                Ok(Schema::Numeric(c, default))
            }
            Some(Token::KwText) => {
                self.ts.bump();
                let mut c = TextConstraints::default();
                if matches!(self.ts.peek(), Some(Token::LBracket)) {
                    self.text_block(&mut c)?;
                }
                let default = if self.ts.eat(&Token::DefaultMarker) {
                    Some(self.string_lit("default value")?)
                } else {
                    None
                };
                Ok(Schema::Text(c, default))
            }
            Some(Token::KwBinary) => {
                self.ts.bump();
                let mut c = Default::default();
                if matches!(self.ts.peek(), Some(Token::LBracket)) {
                    self.binary_block(&mut c)?;
                }
                Ok(Schema::Binary(c))
            }
            Some(Token::KwTime) => {
                self.ts.bump();
                let mut c = TimeConstraints::default();
                if matches!(self.ts.peek(), Some(Token::LBracket)) {
                    self.time_block(&mut c)?;
                }
                Ok(Schema::Time(c))
            }
            Some(Token::Str(s)) => {
                let s = s.clone();
                self.ts.bump();
                Ok(Schema::GivenText(s))
            }
            Some(Token::LBrace) => self.braced(),
            Some(Token::LParen) => self.parenthesized(),
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.ts.bump();
                if self.ts.eat(&Token::Dot) {
                    let member = self.ident("after '.'")?;
                    if matches!(self.ts.peek(), Some(Token::Dot)) {
                        return Err(self.ts.err("nested scopes are not supported"));
                    }
                    Ok(Schema::ScopedReference(name, member))
                } else {
                    Ok(Schema::NamedReference(name))
                }
            }
            Some(other) => Err(self.ts.err(format!("expected a schema item, found {other}"))),
            None => Err(self.ts.err("expected a schema item, found end of input")),
        }
    }

    /// `(` ... `)`: a tuple when commas are present, otherwise a grouped
    /// alternative. A lone parenthesized item is the classic arity error.
    fn parenthesized(&mut self) -> Result<Schema, ParseError> {
        let open_at = self.ts.current_pos();
        self.ts.bump();
        self.ts.skip_newlines();
        let first = self.items(true)?;
        self.ts.skip_newlines();
        if matches!(self.ts.peek(), Some(Token::Comma)) {
            let mut elems = vec![first];
            while self.ts.eat(&Token::Comma) {
                self.ts.skip_newlines();
                elems.push(self.items(true)?);
                self.ts.skip_newlines();
            }
            self.ts.expect(Token::RParen, "to close the tuple")?;
            Ok(Schema::Tuple(elems))
        } else {
            self.ts.expect(Token::RParen, "to close the group")?;
            match first {
                Schema::Alternative(_) | Schema::Enum(_) => Ok(first),
                _ => Err(self
                    .ts
                    .err_at(open_at, "tuple needs to have at least two items")),
            }
        }
    }

    /// `{` ... `}`: an object, or a map when the free-key marker is the only
    /// member. Fields separate with commas on one line, bare newlines across
    /// lines.
    fn braced(&mut self) -> Result<Schema, ParseError> {
        self.ts.bump();
        let mut fields: Vec<ObjectField> = Vec::new();
        let mut rest: Option<Schema> = None;
        loop {
            self.ts.skip_newlines();
            if self.ts.eat(&Token::RBrace) {
                break;
            }
            if self.ts.eat(&Token::Ellipsis) {
                self.ts.expect(Token::Colon, "after '...'")?;
                self.ts.skip_newlines();
                let value = self.items(true)?;
                if rest.is_some() {
                    return Err(self.ts.err("object may declare at most one free-key marker"));
                }
                rest = Some(value);
            } else {
                let name = self.field_name()?;
                let optional = self.ts.eat(&Token::Question);
                self.ts.expect(Token::Colon, "after field name")?;
                self.ts.skip_newlines();
                let value = self.items(true)?;
                if fields.iter().any(|f| f.label.name() == name) {
                    return Err(self.ts.err(format!("duplicate field '{name}'")));
                }
                let label = if optional {
                    FieldLabel::Optional(name)
                } else {
                    FieldLabel::Mandatory(name)
                };
                fields.push(ObjectField {
                    label,
                    schema: value,
                });
            }
            if self.ts.eat(&Token::Comma) {
                continue;
            }
            if matches!(self.ts.peek(), Some(Token::Newline)) {
                continue; // consumed at loop head
            }
            if self.ts.eat(&Token::RBrace) {
                break;
            }
            return Err(match self.ts.peek() {
                Some(other) => self.ts.err(format!("expected ',' or '}}' in object, found {other}")),
                None => self.ts.err("expected '}' to close the object"),
            });
        }
        if fields.is_empty() {
            return match rest {
                Some(inner) => Ok(Schema::Map(Box::new(inner))),
                None => Err(self.ts.err("object needs at least one field")),
            };
        }
        Ok(Schema::Object {
            fields,
            rest: rest.map(Box::new),
        })
    }

    // ----------------------------- helpers -------------------------------- //

    /// A field name: an identifier, or a type keyword used as a plain name.
    pub(crate) fn field_name(&mut self) -> Result<String, ParseError> {
        let name = match self.ts.peek() {
            Some(Token::Ident(n)) => n.clone(),
            Some(Token::KwAny) => "any".into(),
            Some(Token::KwBoolean) => "boolean".into(),
            Some(Token::KwNumber) => "number".into(),
            Some(Token::KwText) => "text".into(),
            Some(Token::KwBinary) => "binary".into(),
            Some(Token::KwTime) => "time".into(),
            Some(Token::KwImport) => "import".into(),
            Some(other) => return Err(self.ts.err(format!("expected a field name, found {other}"))),
            None => return Err(self.ts.err("expected a field name, found end of input")),
        };
        self.ts.bump();
        Ok(name)
    }

    pub(crate) fn ident(&mut self, context: &str) -> Result<String, ParseError> {
        match self.ts.peek() {
            Some(Token::Ident(n)) => {
                let n = n.clone();
                self.ts.bump();
                Ok(n)
            }
            Some(other) => Err(self
                .ts
                .err(format!("expected an identifier {context}, found {other}"))),
            None => Err(self
                .ts
                .err(format!("expected an identifier {context}, found end of input"))),
        }
    }

    pub(crate) fn number_lit(&mut self, context: &str) -> Result<f64, ParseError> {
        match self.ts.peek() {
            Some(Token::Number(n)) => {
                let n = *n;
                self.ts.bump();
                Ok(n)
            }
            Some(other) => Err(self.ts.err(format!("expected a {context}, found {other}"))),
            None => Err(self
                .ts
                .err(format!("expected a {context}, found end of input"))),
        }
    }

    pub(crate) fn string_lit(&mut self, context: &str) -> Result<String, ParseError> {
        match self.ts.peek() {
            Some(Token::Str(s)) => {
                let s = s.clone();
                self.ts.bump();
                Ok(s)
            }
            Some(other) => Err(self.ts.err(format!("expected a {context}, found {other}"))),
            None => Err(self
                .ts
                .err(format!("expected a {context}, found end of input"))),
        }
    }

    /// A non-negative integer literal (repetition counts).
    pub(crate) fn count_lit(&mut self, context: &str) -> Result<u64, ParseError> {
        let n = self.number_lit(context)?;
        if n.fract() != 0.0 || n < 0.0 {
            return Err(self
                .ts
                .err(format!("{context} must be a non-negative integer")));
        }
        Ok(n as u64)
    }
}

// -------------------------------- Tests ----------------------------------- //
