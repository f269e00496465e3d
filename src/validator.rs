//! Validation engine.
//!
//! Matches a [`Value`] against a [`Schema`], accumulating every violation
//! found instead of failing fast. Each diagnostic carries the structural
//! path (field names and list indices) where it occurred, rendered as
//! `$.items[2].id`.
//!
//! Design notes:
//!
//! - One matching rule per schema variant, exhaustively dispatched.
//! - `Link` nodes are followed into the shared definition table without
//!   copying. Termination is value-driven: each descent into a list element
//!   or object field consumes one level of the finite input, and pure alias
//!   cycles (links that consume nothing) are cut by an active-link guard.
//! - `Text` values coerce against scalar targets by re-parsing, regardless
//!   of which decoder produced them.

pub(crate) mod pattern;

use crate::schema::{
    fmt_number, parse_time_literal, DefId, FieldLabel, ListConstraints, NumericConstraints,
    Schema, TextConstraints, TimeConstraints, UniqueKey,
};
use crate::value::{DecodeError, Decoder, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;

// ------------------------------ Diagnostics -------------------------------- //

/// One step of a structural path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

/// Structural location of a violation, rendered `$`, `$.name`, `$.items[2]`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Path(pub Vec<PathSegment>);

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$")?;
        for seg in &self.0 {
            match seg {
                PathSegment::Field(name) => write!(f, ".{name}")?,
                PathSegment::Index(i) => write!(f, "[{i}]")?,
            }
        }
        Ok(())
    }
}

/// What went wrong, split along the error taxonomy: wrong kind of value,
/// wrong structure, or a constraint the value fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, thiserror::Error)]
pub enum Violation {
    #[error("expected {expected}, got {found}")]
    TypeMismatch { expected: String, found: String },
    #[error("{0}")]
    ShapeMismatch(String),
    #[error("{0}")]
    Constraint(String),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ValidationError {
    pub path: Path,
    pub violation: Violation,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.violation)
    }
}

/// The full set of violations from one validation pass; empty means valid.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

// ------------------------------ Entry points ------------------------------- //

/// Validate `value` against `schema`, resolving `Link` nodes through `table`.
pub fn validate(value: &Value, schema: &Schema, table: &[Schema]) -> ValidationResult {
    let mut ctx = Ctx {
        table,
        path: Vec::new(),
        errors: Vec::new(),
    };
    ctx.check(value, schema, &mut Vec::new());
    ValidationResult { errors: ctx.errors }
}

/// Validate against a reference-free schema tree (no definition table).
pub fn validate_standalone(value: &Value, schema: &Schema) -> ValidationResult {
    validate(value, schema, &[])
}

/// Decode `text` with `decoder`, then validate the result.
pub fn validate_text(
    decoder: &dyn Decoder,
    schema: &Schema,
    table: &[Schema],
    text: &str,
) -> Result<ValidationResult, DecodeError> {
    let value = decoder.decode(text)?;
    Ok(validate(&value, schema, table))
}

// -------------------------------- Engine ----------------------------------- //

static BASE64_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[A-Za-z0-9+/]{4})*(?:[A-Za-z0-9+/]{2}==|[A-Za-z0-9+/]{3}=)?$")
        .unwrap()
});

/// `Text` contents quoted, everything else named by kind.
fn found_repr(v: &Value) -> String {
    match v {
        Value::Text(s) => format!("\"{s}\""),
        other => other.kind_name().to_string(),
    }
}

struct Ctx<'a> {
    table: &'a [Schema],
    path: Vec<PathSegment>,
    errors: Vec<ValidationError>,
}

impl Ctx<'_> {
    fn report(&mut self, violation: Violation) {
        self.errors.push(ValidationError {
            path: Path(self.path.clone()),
            violation,
        });
    }

    fn type_mismatch(&mut self, expected: &str, v: &Value) {
        self.report(Violation::TypeMismatch {
            expected: expected.to_string(),
            found: found_repr(v),
        });
    }

    /// Validate a child value one structural level down. The active-link
    /// guard resets here: descending consumed input, so links may repeat.
    fn check_child(&mut self, seg: PathSegment, v: &Value, s: &Schema) {
        self.path.push(seg);
        self.check(v, s, &mut Vec::new());
        self.path.pop();
    }

    fn check(&mut self, v: &Value, s: &Schema, active: &mut Vec<DefId>) {
        match s {
            Schema::Any => {}
            Schema::Fail => {
                self.report(Violation::Constraint(
                    "no value can satisfy this schema".to_string(),
                ));
            }
            Schema::Boolean => match v {
                Value::Bool(_) => {}
                Value::Text(s) if s == "true" || s == "false" => {}
                other => self.type_mismatch("boolean", other),
            },
            Schema::Numeric(c, _) => match v {
                Value::Number(n) => self.check_number(n.0, c),
                Value::Text(s) => match s.trim().parse::<f64>() {
                    Ok(n) => self.check_number(n, c),
                    Err(_) => self.type_mismatch("number", v),
                },
                other => self.type_mismatch("number", other),
            },
            Schema::Text(c, _) => match v {
                Value::Text(s) => self.check_text(s, c),
                other => self.type_mismatch("text", other),
            },
            Schema::GivenText(lit) => match v {
                Value::Text(s) if s == lit => {}
                other => self.type_mismatch(&format!("\"{lit}\""), other),
            },
            Schema::Enum(lits) => match v {
                Value::Text(s) if lits.iter().any(|l| l == s) => {}
                other => {
                    let expected = lits
                        .iter()
                        .map(|l| format!("\"{l}\""))
                        .collect::<Vec<_>>()
                        .join(" | ");
                    self.type_mismatch(&format!("one of {expected}"), other);
                }
            },
            Schema::Binary(c) => match v {
                Value::Text(s) if BASE64_SHAPE.is_match(s) => {
                    let pad = s.bytes().rev().take_while(|b| *b == b'=').count() as u64;
                    let size = (s.len() as u64 / 4) * 3 - pad;
                    if let Some(min) = c.min_size {
                        if size < min {
                            self.report(Violation::Constraint(format!(
                                "binary size {size} is below the minimum {min}"
                            )));
                        }
                    }
                    if let Some(max) = c.max_size {
                        if size > max {
                            self.report(Violation::Constraint(format!(
                                "binary size {size} is above the maximum {max}"
                            )));
                        }
                    }
                }
                other => self.type_mismatch("base64 binary", other),
            },
            Schema::Time(c) => match v {
                Value::Text(s) => match parse_time_literal(s) {
                    Some(t) => self.check_time(t, c),
                    None => self.type_mismatch("timestamp", v),
                },
                other => self.type_mismatch("timestamp", other),
            },
            Schema::Object { fields, rest } => match v {
                Value::Object(map) => {
                    for field in fields {
                        let name = field.label.name();
                        match (map.get(name), &field.label) {
                            (Some(inner), _) => self.check_child(
                                PathSegment::Field(name.to_string()),
                                inner,
                                &field.schema,
                            ),
                            (None, FieldLabel::Mandatory(_)) => {
                                self.report(Violation::ShapeMismatch(format!(
                                    "missing mandatory field \"{name}\""
                                )));
                            }
                            (None, FieldLabel::Optional(_)) => {}
                        }
                    }
                    if let Some(rest) = rest {
                        for (key, inner) in map {
                            if fields.iter().all(|f| f.label.name() != key) {
                                self.check_child(
                                    PathSegment::Field(key.clone()),
                                    inner,
                                    rest,
                                );
                            }
                        }
                    }
                }
                other => self.type_mismatch("object", other),
            },
            Schema::Map(inner) => match v {
                Value::Object(map) => {
                    for (key, val) in map {
                        self.check_child(PathSegment::Field(key.clone()), val, inner);
                    }
                }
                other => self.type_mismatch("object", other),
            },
            Schema::ListOf(inner, c) => match v {
                Value::List(xs) => {
                    self.check_list_size(xs.len(), c);
                    for key in &c.unique {
                        self.check_unique(xs, key);
                    }
                    for (i, x) in xs.iter().enumerate() {
                        self.check_child(PathSegment::Index(i), x, inner);
                    }
                }
                other => self.type_mismatch("list", other),
            },
            Schema::Tuple(items) => match v {
                Value::List(xs) => {
                    if xs.len() != items.len() {
                        self.report(Violation::ShapeMismatch(format!(
                            "expected {} elements, got {}",
                            items.len(),
                            xs.len()
                        )));
                    }
                    for (i, (x, item)) in xs.iter().zip(items).enumerate() {
                        self.check_child(PathSegment::Index(i), x, item);
                    }
                }
                other => self.type_mismatch("list", other),
            },
            Schema::Alternative(branches) => {
                let mut failures = Vec::with_capacity(branches.len());
                for branch in branches {
                    let mut scratch = Ctx {
                        table: self.table,
                        path: self.path.clone(),
                        errors: Vec::new(),
                    };
                    scratch.check(v, branch, &mut active.clone());
                    if scratch.errors.is_empty() {
                        return;
                    }
                    failures.push(scratch.errors.remove(0).violation.to_string());
                }
                self.report(Violation::ShapeMismatch(format!(
                    "no alternative matched: {}",
                    failures.join("; ")
                )));
            }
            Schema::Link(id) => {
                if active.contains(id) {
                    self.report(Violation::ShapeMismatch(
                        "definition refers to itself without consuming input".to_string(),
                    ));
                    return;
                }
                let table = self.table;
                match table.get(id.0) {
                    Some(target) => {
                        active.push(*id);
                        self.check(v, target, active);
                        active.pop();
                    }
                    None => self.report(Violation::ShapeMismatch(
                        "link points outside the definition table".to_string(),
                    )),
                }
            }
            Schema::NamedReference(name) => {
                self.report(Violation::ShapeMismatch(format!(
                    "unresolved reference \"{name}\""
                )));
            }
            Schema::ScopedReference(scope, name) => {
                self.report(Violation::ShapeMismatch(format!(
                    "unresolved reference \"{scope}.{name}\""
                )));
            }
            Schema::Documented(_, inner) | Schema::Deprecated(inner) => {
                self.check(v, inner, active);
            }
        }
    }

    fn check_number(&mut self, n: f64, c: &NumericConstraints) {
        if let Some(lo) = c.min {
            let bad = if lo.exclusive { n <= lo.limit.0 } else { n < lo.limit.0 };
            if bad {
                let op = if lo.exclusive { ">" } else { ">=" };
                self.report(Violation::Constraint(format!(
                    "value {} is not {op} {}",
                    fmt_number(n),
                    fmt_number(lo.limit.0)
                )));
            }
        }
        if let Some(hi) = c.max {
            let bad = if hi.exclusive { n >= hi.limit.0 } else { n > hi.limit.0 };
            if bad {
                let op = if hi.exclusive { "<" } else { "<=" };
                self.report(Violation::Constraint(format!(
                    "value {} is not {op} {}",
                    fmt_number(n),
                    fmt_number(hi.limit.0)
                )));
            }
        }
        for x in &c.not_equal {
            if n == x.0 {
                self.report(Violation::Constraint(format!(
                    "value {} is excluded",
                    fmt_number(n)
                )));
            }
        }
    }

    fn check_text(&mut self, s: &str, c: &TextConstraints) {
        // length counts Unicode scalar values, not bytes
        let len = s.chars().count() as u64;
        if let Some(min) = c.min_length {
            if len < min {
                self.report(Violation::Constraint(format!(
                    "length {len} is below the minimum {min}"
                )));
            }
        }
        if let Some(max) = c.max_length {
            if len > max {
                self.report(Violation::Constraint(format!(
                    "length {len} is above the maximum {max}"
                )));
            }
        }
        if let Some(re) = &c.regex {
            if !re.is_full_match(s) {
                self.report(Violation::Constraint(format!(
                    "\"{s}\" does not match regex \"{}\"",
                    re.source
                )));
            }
        }
        if let Some(p) = &c.pattern {
            if !pattern::matches(p, s) {
                self.report(Violation::Constraint(format!(
                    "\"{s}\" does not match pattern \"{p}\""
                )));
            }
        }
    }

    fn check_time(&mut self, t: chrono::DateTime<chrono::FixedOffset>, c: &TimeConstraints) {
        if let Some(lo) = c.min {
            let bad = if lo.exclusive { t <= lo.instant } else { t < lo.instant };
            if bad {
                let op = if lo.exclusive { ">" } else { ">=" };
                self.report(Violation::Constraint(format!(
                    "time {} is not {op} {}",
                    t.to_rfc3339(),
                    lo.instant.to_rfc3339()
                )));
            }
        }
        if let Some(hi) = c.max {
            let bad = if hi.exclusive { t >= hi.instant } else { t > hi.instant };
            if bad {
                let op = if hi.exclusive { "<" } else { "<=" };
                self.report(Violation::Constraint(format!(
                    "time {} is not {op} {}",
                    t.to_rfc3339(),
                    hi.instant.to_rfc3339()
                )));
            }
        }
    }

    fn check_list_size(&mut self, len: usize, c: &ListConstraints) {
        let len = len as u64;
        if let Some(min) = c.min_size {
            if len < min {
                self.report(Violation::Constraint(format!(
                    "list has {len} elements, minimum is {min}"
                )));
            }
        }
        if let Some(max) = c.max_size {
            if len > max {
                self.report(Violation::Constraint(format!(
                    "list has {len} elements, maximum is {max}"
                )));
            }
        }
    }

    /// One `unique` constraint over the whole list. A missing projected
    /// field counts as null, so two elements both lacking it collide.
    fn check_unique(&mut self, xs: &[Value], key: &UniqueKey) {
        let project = |x: &Value| -> Vec<Value> {
            match key {
                UniqueKey::Whole => vec![x.clone()],
                UniqueKey::Fields(names) => names
                    .iter()
                    .map(|name| match x {
                        Value::Object(map) => map.get(name).cloned().unwrap_or(Value::Null),
                        _ => Value::Null,
                    })
                    .collect(),
            }
        };
        let keys: Vec<Vec<Value>> = xs.iter().map(project).collect();
        for j in 1..keys.len() {
            if let Some(i) = (0..j).find(|&i| keys[i] == keys[j]) {
                let what = match key {
                    UniqueKey::Whole => "the same value".to_string(),
                    UniqueKey::Fields(names) => format!("the same \"{}\"", names.join(", ")),
                };
                self.report(Violation::Constraint(format!(
                    "elements {i} and {j} have {what}"
                )));
            }
        }
    }
}

// -------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::schema::{ListConstraints, ObjectField};
    use crate::value::JsonDecoder;

    fn check_json(schema: &str, json: &str) -> ValidationResult {
        let s = parse(schema).unwrap();
        validate_text(&JsonDecoder, &s, &[], json).unwrap()
    }

    #[test]
    fn person_document_with_typed_fields() {
        let schema = "= { name: text, age: number, hobbies: text* }";
        let ok = check_json(
            schema,
            r#"{"name":"John","age":30,"hobbies":["reading","hiking"]}"#,
        );
        assert!(ok.is_valid(), "{:?}", ok.errors);

        let bad = check_json(
            schema,
            r#"{"name":"John","age":"thirty","hobbies":[]}"#,
        );
        assert_eq!(bad.errors.len(), 1);
        assert_eq!(
            bad.errors[0].to_string(),
            "$.age: expected number, got \"thirty\""
        );
    }

    #[test]
    fn quoted_text_coerces_to_number_and_boolean() {
        assert!(check_json("= number", r#""30""#).is_valid());
        assert!(check_json("= boolean", r#""false""#).is_valid());
        assert!(!check_json("= boolean", r#""maybe""#).is_valid());
    }

    #[test]
    fn undeclared_keys_are_ignored_without_a_free_key_marker() {
        let ok = check_json(
            "= { name: text, age?: number }",
            r#"{"name":"Ann","hobbies":["x"]}"#,
        );
        assert!(ok.is_valid());
    }

    #[test]
    fn free_key_marker_types_the_residual_keys() {
        let schema = "= { name: text, ...: number }";
        assert!(check_json(schema, r#"{"name":"a","extra":1}"#).is_valid());
        let bad = check_json(schema, r#"{"name":"a","extra":"one"}"#);
        assert_eq!(bad.errors[0].path.to_string(), "$.extra");
    }

    #[test]
    fn missing_mandatory_field_is_a_shape_mismatch() {
        let bad = check_json("= { name: text }", r#"{}"#);
        assert!(matches!(
            bad.errors[0].violation,
            Violation::ShapeMismatch(_)
        ));
        assert!(bad.errors[0].to_string().contains("\"name\""));
    }

    #[test]
    fn map_checks_every_value_unlike_object() {
        let bad = check_json("= { ...: number }", r#"{"a":1,"b":"x"}"#);
        assert_eq!(bad.errors.len(), 1);
        assert_eq!(bad.errors[0].path.to_string(), "$.b");
    }

    #[test]
    fn unique_by_field() {
        let schema = "= { id: text, name: text }* [ unique = id ]";
        let bad = check_json(
            schema,
            r#"[{"id":"1","name":"a"},{"id":"1","name":"b"}]"#,
        );
        assert_eq!(bad.errors.len(), 1);
        assert!(bad.errors[0].to_string().contains("\"id\""));
        let ok = check_json(
            schema,
            r#"[{"id":"1","name":"a"},{"id":"2","name":"a"}]"#,
        );
        assert!(ok.is_valid());
    }

    #[test]
    fn multiple_unique_constraints_are_independent() {
        let schema = "= { id: text, code: text, name: text }* [ unique = id, unique = code ]";
        let bad = check_json(
            schema,
            r#"[{"id":"1","code":"a","name":"x"},{"id":"1","code":"b","name":"y"}]"#,
        );
        assert_eq!(bad.errors.len(), 1);
        assert!(bad.errors[0].to_string().contains("\"id\""));
    }

    #[test]
    fn composite_unique_key_needs_both_fields_equal() {
        let schema = "= { a: text, b: text }* [ unique = (a, b) ]";
        let ok = check_json(schema, r#"[{"a":"1","b":"1"},{"a":"1","b":"2"}]"#);
        assert!(ok.is_valid());
        let bad = check_json(schema, r#"[{"a":"1","b":"1"},{"a":"1","b":"1"}]"#);
        assert!(!bad.is_valid());
    }

    #[test]
    fn regex_and_length_together() {
        let schema = r#"= text [ regex = "([0-9]{4}-[0-9]{2}-[0-9]{2})", length == 10 ]"#;
        assert!(check_json(schema, r#""2004-01-20""#).is_valid());
        let bad = check_json(schema, r#""Joe""#);
        assert_eq!(bad.errors.len(), 2); // length and regex both fail
    }

    #[test]
    fn picture_clause_pattern() {
        let schema = "= text [ pattern = \"###-##-@@\" ]";
        assert!(check_json(schema, r#""123-45-a1""#).is_valid());
        assert!(!check_json(schema, r#""123-45-!1""#).is_valid());
    }

    #[test]
    fn binary_size_from_base64() {
        let schema = "= binary [ size <= 3 ]";
        assert!(check_json(schema, r#""AAAA""#).is_valid()); // 3 bytes
        assert!(!check_json(schema, r#""AAAAAAAA""#).is_valid()); // 6 bytes
        let bad = check_json("= binary", r#""not base64!""#);
        assert!(matches!(
            bad.errors[0].violation,
            Violation::TypeMismatch { .. }
        ));
    }

    #[test]
    fn time_bounds_with_exclusivity() {
        let schema = r#"= time [ value >= "2020-01-01", value < "2021-01-01" ]"#;
        assert!(check_json(schema, r#""2020-06-15T12:00:00Z""#).is_valid());
        assert!(check_json(schema, r#""2020-01-01""#).is_valid());
        assert!(!check_json(schema, r#""2021-01-01""#).is_valid());
        assert!(!check_json(schema, r#""not a time""#).is_valid());
    }

    #[test]
    fn numeric_exclusive_bounds() {
        let schema = "= number [ 0 < value < 1 ]";
        assert!(check_json(schema, "0.5").is_valid());
        assert!(!check_json(schema, "0").is_valid());
        assert!(!check_json(schema, "1").is_valid());
    }

    #[test]
    fn tuple_arity_and_prefix_checking() {
        let schema = "= (text, number)";
        assert!(check_json(schema, r#"["a",1]"#).is_valid());
        let bad = check_json(schema, r#"[1,2,3]"#);
        // arity mismatch plus the type error on the common prefix
        assert!(bad.errors.iter().any(|e| matches!(
            e.violation,
            Violation::ShapeMismatch(_)
        )));
        assert!(bad.errors.iter().any(|e| e.path.to_string() == "$[0]"));
    }

    #[test]
    fn alternative_first_match_wins_and_failures_combine() {
        let schema = "= text | number";
        assert!(check_json(schema, r#""x""#).is_valid());
        assert!(check_json(schema, "3").is_valid());
        let bad = check_json(schema, "true");
        assert_eq!(bad.errors.len(), 1);
        let msg = bad.errors[0].to_string();
        assert!(msg.contains("no alternative matched"));
        assert!(msg.contains("expected text") && msg.contains("expected number"));
    }

    #[test]
    fn enum_requires_one_of_the_literals() {
        let schema = r#"= "red" | "green" | "blue""#;
        assert!(check_json(schema, r#""green""#).is_valid());
        let bad = check_json(schema, r#""yellow""#);
        assert!(bad.errors[0].to_string().contains("\"red\""));
    }

    #[test]
    fn recursive_definition_terminates_on_nested_input() {
        // tree = { value: number, children?: tree* }
        let tree = Schema::Object {
            fields: vec![
                ObjectField {
                    label: FieldLabel::Mandatory("value".into()),
                    schema: Schema::Numeric(Default::default(), None),
                },
                ObjectField {
                    label: FieldLabel::Optional("children".into()),
                    schema: Schema::ListOf(
                        Box::new(Schema::Link(DefId(0))),
                        ListConstraints::default(),
                    ),
                },
            ],
            rest: None,
        };
        let table = vec![tree];
        let v = JsonDecoder
            .decode(r#"{"value":1,"children":[{"value":2,"children":[{"value":3}]}]}"#)
            .unwrap();
        let res = validate(&v, &Schema::Link(DefId(0)), &table);
        assert!(res.is_valid(), "{:?}", res.errors);
        let v = JsonDecoder
            .decode(r#"{"value":1,"children":[{"value":"two"}]}"#)
            .unwrap();
        let res = validate(&v, &Schema::Link(DefId(0)), &table);
        assert_eq!(res.errors[0].path.to_string(), "$.children[0].value");
    }

    #[test]
    fn pure_alias_cycle_is_cut_not_diverging() {
        let table = vec![Schema::Link(DefId(1)), Schema::Link(DefId(0))];
        let res = validate(&Value::number(5.0), &Schema::Link(DefId(0)), &table);
        assert_eq!(res.errors.len(), 1);
        assert!(res.errors[0].to_string().contains("without consuming input"));
    }

    #[test]
    fn fail_never_matches() {
        let res = validate_standalone(&Value::Null, &Schema::Fail);
        assert!(!res.is_valid());
    }

    #[test]
    fn metadata_wrappers_are_transparent() {
        let s = Schema::Deprecated(Box::new(Schema::Documented(
            "old".into(),
            Box::new(Schema::Boolean),
        )));
        assert!(validate_standalone(&Value::Bool(true), &s).is_valid());
    }
}
