//! The algebraic schema tree and its constraint payloads.
//!
//! Design notes:
//! - Closed sum type with exhaustive matching everywhere; adding a variant is
//!   a compile-checked, total change across parser, resolver and validator.
//! - Immutable after construction. Regexes are compiled once at parse time
//!   and stored alongside their source, so validation never recompiles.
//! - `Link` is produced only by the resolver: it addresses a shared slot in
//!   the resolved definition table, never a copy, so mutually recursive
//!   definitions form a graph rather than an infinite tree.
//! - `Display` renders canonical schema text; re-parsing the printed form of
//!   any grammar-constructible tree reproduces an equal tree.

use chrono::{DateTime, FixedOffset, NaiveDate};
use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use std::fmt;

/// Index of a named definition in a resolved definition table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DefId(pub usize);

/// A schema node.
#[derive(Clone, Debug, PartialEq)]
pub enum Schema {
    /// Matches anything.
    Any,
    Boolean,
    Numeric(NumericConstraints, Option<OrderedFloat<f64>>),
    Text(TextConstraints, Option<String>),
    Binary(BinaryConstraints),
    Time(TimeConstraints),
    /// A constant string literal.
    GivenText(String),
    /// Alternatives that are all string literals collapse to this.
    Enum(Vec<String>),
    /// Fixed arity >= 2, enforced at parse time.
    Tuple(Vec<Schema>),
    ListOf(Box<Schema>, ListConstraints),
    /// Open-world record: strict on declared fields, permissive on the rest
    /// unless `rest` (the free-key marker) is set.
    Object {
        fields: Vec<ObjectField>,
        rest: Option<Box<Schema>>,
    },
    /// Uniform dictionary: every value, any key.
    Map(Box<Schema>),
    /// Ordered alternatives, >= 2 branches; first match wins.
    Alternative(Vec<Schema>),
    /// Unresolved `name` reference.
    NamedReference(String),
    /// Unresolved `scope.name` reference.
    ScopedReference(String, String),
    /// Resolved link into the shared definition table.
    Link(DefId),
    /// Doc-comment wrapper; metadata only, transparent to matching.
    Documented(String, Box<Schema>),
    /// `@deprecated` wrapper; metadata only, transparent to matching.
    Deprecated(Box<Schema>),
    /// Intentionally unsatisfiable.
    Fail,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ObjectField {
    pub label: FieldLabel,
    pub schema: Schema,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldLabel {
    Mandatory(String),
    Optional(String),
}

impl FieldLabel {
    pub fn name(&self) -> &str {
        match self {
            FieldLabel::Mandatory(n) | FieldLabel::Optional(n) => n,
        }
    }
}

// ----------------------------- Constraints -------------------------------- //

/// One end of a numeric range; decimal exclusivity is preserved as-is
/// (never folded into the limit, unlike integral length/size bounds).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bound {
    pub limit: OrderedFloat<f64>,
    pub exclusive: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NumericConstraints {
    pub min: Option<Bound>,
    pub max: Option<Bound>,
    pub not_equal: Vec<OrderedFloat<f64>>,
}

impl NumericConstraints {
    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.max.is_none() && self.not_equal.is_empty()
    }
}

/// Regex constraint: source as written plus the anchored, pre-compiled
/// matcher. Equality is on the source; the compiled form is derived.
#[derive(Clone, Debug)]
pub struct CompiledRegex {
    pub source: String,
    pub regex: regex::Regex,
}

impl CompiledRegex {
    /// Compile `source` anchored on both ends (constraint regexes match the
    /// whole text, not a substring).
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        let regex = regex::Regex::new(&format!("^(?:{source})$"))?;
        Ok(CompiledRegex {
            source: source.to_string(),
            regex,
        })
    }

    pub fn is_full_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl PartialEq for CompiledRegex {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// Length bounds are inclusive; `<`/`>` were normalized at parse time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextConstraints {
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub regex: Option<CompiledRegex>,
    pub pattern: Option<String>,
}

impl TextConstraints {
    pub fn is_empty(&self) -> bool {
        self.min_length.is_none()
            && self.max_length.is_none()
            && self.regex.is_none()
            && self.pattern.is_none()
    }
}

/// Inclusive bounds on the decoded byte size.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BinaryConstraints {
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
}

impl BinaryConstraints {
    pub fn is_empty(&self) -> bool {
        self.min_size.is_none() && self.max_size.is_none()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeBound {
    pub instant: DateTime<FixedOffset>,
    pub exclusive: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TimeConstraints {
    pub min: Option<TimeBound>,
    pub max: Option<TimeBound>,
}

impl TimeConstraints {
    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

/// One `unique` constraint on a list. Multiple constraints are independent
/// (each enforced separately), never merged into one composite key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UniqueKey {
    /// Whole-element value equality.
    Whole,
    /// Projection of the named field(s) out of each object-shaped element;
    /// more than one name makes the projected tuple the key.
    Fields(Vec<String>),
}

/// Inclusive size bounds plus uniqueness constraints. `+` is sugar for
/// `min_size = 1`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListConstraints {
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub unique: Vec<UniqueKey>,
}

// ------------------------------ Document ---------------------------------- //

/// Direct parser output for one schema file: imports, named definitions and
/// an optional root. Names are unique across imports and definitions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Document {
    /// alias -> relative path, in declaration order.
    pub imports: IndexMap<String, String>,
    /// name -> schema, in declaration order.
    pub definitions: IndexMap<String, Schema>,
    pub root: Option<Schema>,
}

// --------------------------- Time literal parse ---------------------------- //

/// Parse a time literal: RFC 3339, or a bare `YYYY-MM-DD` date (midnight UTC).
pub(crate) fn parse_time_literal(text: &str) -> Option<DateTime<FixedOffset>> {
    let t = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
        return Some(dt);
    }
    let date = NaiveDate::parse_from_str(t, "%Y-%m-%d").ok()?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    Some(midnight.and_utc().fixed_offset())
}

// --------------------------- Canonical printing ---------------------------- //

/// Render a number without a trailing `.0` when it is integral.
pub(crate) fn fmt_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Escape a string for a double-quoted literal.
pub(crate) fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

impl Schema {
    /// Print into `f`; with `atom` set, forms that would bind differently in
    /// item position (alternatives, enums) get wrapped in parentheses.
    fn fmt_prec(&self, f: &mut fmt::Formatter<'_>, atom: bool) -> fmt::Result {
        match self {
            Schema::Any => write!(f, "any"),
            Schema::Boolean => write!(f, "boolean"),
            Schema::Numeric(c, default) => {
                write!(f, "number")?;
                if !c.is_empty() {
                    let mut parts = Vec::new();
                    match (c.min, c.max) {
                        (Some(lo), Some(hi)) if !lo.exclusive && !hi.exclusive && lo.limit == hi.limit => {
                            parts.push(format!("value == {}", fmt_number(lo.limit.0)));
                        }
                        (min, max) => {
                            if let Some(lo) = min {
                                let op = if lo.exclusive { ">" } else { ">=" };
                                parts.push(format!("value {op} {}", fmt_number(lo.limit.0)));
                            }
                            if let Some(hi) = max {
                                let op = if hi.exclusive { "<" } else { "<=" };
                                parts.push(format!("value {op} {}", fmt_number(hi.limit.0)));
                            }
                        }
                    }
                    for x in &c.not_equal {
                        parts.push(format!("value != {}", fmt_number(x.0)));
                    }
                    write!(f, " [ {} ]", parts.join(", "))?;
                }
                if let Some(d) = default {
                    write!(f, " ?= {}", fmt_number(d.0))?;
                }
                Ok(())
            }
            Schema::Text(c, default) => {
                write!(f, "text")?;
                if !c.is_empty() {
                    let mut parts = Vec::new();
                    push_int_range(&mut parts, "length", c.min_length, c.max_length);
                    if let Some(rx) = &c.regex {
                        parts.push(format!("regex = \"{}\"", escape_string(&rx.source)));
                    }
                    if let Some(p) = &c.pattern {
                        parts.push(format!("pattern = \"{}\"", escape_string(p)));
                    }
                    write!(f, " [ {} ]", parts.join(", "))?;
                }
                if let Some(d) = default {
                    write!(f, " ?= \"{}\"", escape_string(d))?;
                }
                Ok(())
            }
            Schema::Binary(c) => {
                write!(f, "binary")?;
                if !c.is_empty() {
                    let mut parts = Vec::new();
                    push_int_range(&mut parts, "size", c.min_size, c.max_size);
                    write!(f, " [ {} ]", parts.join(", "))?;
                }
                Ok(())
            }
            Schema::Time(c) => {
                write!(f, "time")?;
                if !c.is_empty() {
                    let mut parts = Vec::new();
                    if let Some(lo) = c.min {
                        let op = if lo.exclusive { ">" } else { ">=" };
                        parts.push(format!("value {op} \"{}\"", lo.instant.to_rfc3339()));
                    }
                    if let Some(hi) = c.max {
                        let op = if hi.exclusive { "<" } else { "<=" };
                        parts.push(format!("value {op} \"{}\"", hi.instant.to_rfc3339()));
                    }
                    write!(f, " [ {} ]", parts.join(", "))?;
                }
                Ok(())
            }
            Schema::GivenText(s) => write!(f, "\"{}\"", escape_string(s)),
            Schema::Enum(lits) => {
                let body = lits
                    .iter()
                    .map(|s| format!("\"{}\"", escape_string(s)))
                    .collect::<Vec<_>>()
                    .join(" | ");
                if atom {
                    write!(f, "({body})")
                } else {
                    write!(f, "{body}")
                }
            }
            Schema::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    item.fmt_prec(f, false)?;
                }
                write!(f, ")")
            }
            Schema::ListOf(item, c) => {
                item.fmt_prec(f, true)?;
                let mut parts = Vec::new();
                match (c.min_size, c.max_size) {
                    (Some(1), None) => write!(f, "+")?,
                    (Some(lo), Some(hi)) if lo == hi => write!(f, "{{{lo}}}")?,
                    (Some(lo), Some(hi)) => write!(f, "{{{lo},{hi}}}")?,
                    (Some(lo), None) => {
                        write!(f, "*")?;
                        parts.push(format!("size >= {lo}"));
                    }
                    (None, Some(hi)) => {
                        write!(f, "*")?;
                        parts.push(format!("size <= {hi}"));
                    }
                    (None, None) => write!(f, "*")?,
                }
                for u in &c.unique {
                    parts.push(match u {
                        UniqueKey::Whole => "unique".to_string(),
                        UniqueKey::Fields(fs) if fs.len() == 1 => format!("unique = {}", fs[0]),
                        UniqueKey::Fields(fs) => format!("unique = ({})", fs.join(", ")),
                    });
                }
                if !parts.is_empty() {
                    write!(f, " [ {} ]", parts.join(", "))?;
                }
                Ok(())
            }
            Schema::Object { fields, rest } => {
                write!(f, "{{ ")?;
                let mut first = true;
                for field in fields {
                    if !first {
                        write!(f, ", ")?;
                    }
                    first = false;
                    match &field.label {
                        FieldLabel::Mandatory(n) => write!(f, "{n}: ")?,
                        FieldLabel::Optional(n) => write!(f, "{n}?: ")?,
                    }
                    field.schema.fmt_prec(f, false)?;
                }
                if let Some(rest) = rest {
                    if !first {
                        write!(f, ", ")?;
                    }
                    write!(f, "...: ")?;
                    rest.fmt_prec(f, false)?;
                }
                write!(f, " }}")
            }
            Schema::Map(inner) => {
                write!(f, "{{ ...: ")?;
                inner.fmt_prec(f, false)?;
                write!(f, " }}")
            }
            Schema::Alternative(branches) => {
                let render = |f: &mut fmt::Formatter<'_>| -> fmt::Result {
                    for (i, b) in branches.iter().enumerate() {
                        if i > 0 {
                            write!(f, " | ")?;
                        }
                        b.fmt_prec(f, true)?;
                    }
                    Ok(())
                };
                if atom {
                    write!(f, "(")?;
                    render(f)?;
                    write!(f, ")")
                } else {
                    render(f)
                }
            }
            Schema::NamedReference(n) => write!(f, "{n}"),
            Schema::ScopedReference(scope, n) => write!(f, "{scope}.{n}"),
            Schema::Link(id) => write!(f, "<def #{}>", id.0),
            Schema::Documented(_, inner) | Schema::Deprecated(inner) => inner.fmt_prec(f, atom),
            Schema::Fail => write!(f, "fail"),
        }
    }
}

fn push_int_range(parts: &mut Vec<String>, prop: &str, min: Option<u64>, max: Option<u64>) {
    match (min, max) {
        (Some(lo), Some(hi)) if lo == hi => parts.push(format!("{prop} == {lo}")),
        (min, max) => {
            if let Some(lo) = min {
                parts.push(format!("{prop} >= {lo}"));
            }
            if let Some(hi) = max {
                parts.push(format!("{prop} <= {hi}"));
            }
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_prec(f, false)
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (alias, path) in &self.imports {
            writeln!(f, "{alias} => import \"{}\"", escape_string(path))?;
        }
        for (name, schema) in &self.definitions {
            write_definition(f, Some(name), schema)?;
        }
        if let Some(root) = &self.root {
            write_definition(f, None, root)?;
        }
        Ok(())
    }
}

/// Print one definition (or the root when `name` is `None`), unwrapping the
/// metadata wrappers into `##` doc lines and a `@deprecated` line.
fn write_definition(f: &mut fmt::Formatter<'_>, name: Option<&str>, schema: &Schema) -> fmt::Result {
    let mut node = schema;
    let mut doc: Option<&str> = None;
    let mut deprecated = false;
    loop {
        match node {
            Schema::Deprecated(inner) => {
                deprecated = true;
                node = inner;
            }
            Schema::Documented(text, inner) => {
                doc = Some(text);
                node = inner;
            }
            _ => break,
        }
    }
    if let Some(doc) = doc {
        for line in doc.lines() {
            writeln!(f, "## {line}")?;
        }
    }
    if deprecated {
        writeln!(f, "@deprecated")?;
    }
    match name {
        Some(name) => writeln!(f, "{name} = {node}"),
        None => writeln!(f, "= {node}"),
    }
}

// -------------------------------- Tests ----------------------------------- //

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiled_regex_matches_whole_text_only() {
        let rx = CompiledRegex::new("[0-9]{4}").unwrap();
        assert!(rx.is_full_match("2024"));
        assert!(!rx.is_full_match("x2024y"));
    }

    #[test]
    fn compiled_regex_equality_is_on_source() {
        let a = CompiledRegex::new("[a-z]+").unwrap();
        let b = CompiledRegex::new("[a-z]+").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn time_literal_accepts_rfc3339_and_bare_dates() {
        let a = parse_time_literal("2020-01-01T00:00:00Z").unwrap();
        let b = parse_time_literal("2020-01-01").unwrap();
        assert_eq!(a, b);
        assert!(parse_time_literal("yesterday").is_none());
    }

    #[test]
    fn display_places_parens_only_where_binding_needs_them() {
        let alt = Schema::Alternative(vec![
            Schema::Text(TextConstraints::default(), None),
            Schema::Numeric(NumericConstraints::default(), None),
        ]);
        assert_eq!(alt.to_string(), "text | number");

        let list = Schema::ListOf(Box::new(alt), ListConstraints::default());
        assert_eq!(list.to_string(), "(text | number)*");
    }

    #[test]
    fn display_renders_plus_for_min_one_lists() {
        let list = Schema::ListOf(
            Box::new(Schema::Numeric(NumericConstraints::default(), None)),
            ListConstraints {
                min_size: Some(1),
                ..Default::default()
            },
        );
        assert_eq!(list.to_string(), "number+");
    }
}
