//! Constraint-block grammar (`[ ... ]`) and range normalization.
//!
//! Each constraint kind accepts three surface forms that normalize to the
//! same internal bounds:
//!
//! - `length == 10`            (property-led)
//! - `10 <= length`            (bound-led)
//! - `10 < length < 100`       (chained range)
//!
//! Integral quantities (`length`, `size`) fold `<`/`>` into inclusive bounds
//! by +/-1. Decimal `value` bounds keep their exclusivity flag instead:
//! integers and arbitrary-precision decimals are not interchangeable there.
//! Repeated bounds tighten (the most restrictive wins); a range that ends up
//! empty is a parse error.

use super::lexer::Token;
use super::{ParseError, Parser};
use crate::schema::{
    BinaryConstraints, Bound, CompiledRegex, ListConstraints, NumericConstraints,
    TextConstraints, TimeBound, TimeConstraints, UniqueKey, parse_time_literal,
};
use ordered_float::OrderedFloat;

#[derive(Clone, Copy, Debug, PartialEq)]
enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    Ne,
}

/// Accumulator for inclusive integral bounds (`length`, `size`).
struct IntRange {
    prop: &'static str,
    min: Option<i128>,
    max: Option<i128>,
}

impl IntRange {
    fn new(prop: &'static str) -> Self {
        IntRange {
            prop,
            min: None,
            max: None,
        }
    }

    fn seed(prop: &'static str, min: Option<u64>, max: Option<u64>) -> Self {
        IntRange {
            prop,
            min: min.map(i128::from),
            max: max.map(i128::from),
        }
    }

    fn tighten_min(&mut self, v: i128) {
        self.min = Some(self.min.map_or(v, |m| m.max(v)));
    }

    fn tighten_max(&mut self, v: i128) {
        self.max = Some(self.max.map_or(v, |m| m.min(v)));
    }

    /// `prop OP n` (property on the left).
    fn apply_prop_led(&mut self, op: CmpOp, n: i128) -> Result<(), String> {
        match op {
            CmpOp::Lt => self.tighten_max(n - 1),
            CmpOp::Le => self.tighten_max(n),
            CmpOp::Gt => self.tighten_min(n + 1),
            CmpOp::Ge => self.tighten_min(n),
            CmpOp::EqEq => {
                self.tighten_min(n);
                self.tighten_max(n);
            }
            CmpOp::Ne => return Err(format!("'{}' does not support '!='", self.prop)),
        }
        Ok(())
    }

    /// `n OP prop` (bound on the left): mirror of the property-led form.
    fn apply_bound_led(&mut self, n: i128, op: CmpOp) -> Result<(), String> {
        match op {
            CmpOp::Lt => self.tighten_min(n + 1),
            CmpOp::Le => self.tighten_min(n),
            CmpOp::Gt => self.tighten_max(n - 1),
            CmpOp::Ge => self.tighten_max(n),
            CmpOp::EqEq => {
                self.tighten_min(n);
                self.tighten_max(n);
            }
            CmpOp::Ne => return Err(format!("'{}' does not support '!='", self.prop)),
        }
        Ok(())
    }

    fn finish(self) -> Result<(Option<u64>, Option<u64>), String> {
        if let Some(hi) = self.max {
            if hi < 0 {
                return Err(format!("inconsistent {} range", self.prop));
            }
        }
        if let (Some(lo), Some(hi)) = (self.min, self.max) {
            if lo > hi {
                return Err(format!("inconsistent {} range", self.prop));
            }
        }
        let min = self.min.map(|lo| lo.max(0) as u64);
        let max = self.max.map(|hi| hi as u64);
        Ok((min, max))
    }
}

fn tighten_num_min(c: &mut NumericConstraints, limit: f64, exclusive: bool) {
    let new = Bound {
        limit: OrderedFloat(limit),
        exclusive,
    };
    c.min = Some(match c.min {
        None => new,
        Some(old) if new.limit > old.limit || (new.limit == old.limit && new.exclusive) => new,
        Some(old) => old,
    });
}

fn tighten_num_max(c: &mut NumericConstraints, limit: f64, exclusive: bool) {
    let new = Bound {
        limit: OrderedFloat(limit),
        exclusive,
    };
    c.max = Some(match c.max {
        None => new,
        Some(old) if new.limit < old.limit || (new.limit == old.limit && new.exclusive) => new,
        Some(old) => old,
    });
}

fn tighten_time_min(c: &mut TimeConstraints, bound: TimeBound) {
    c.min = Some(match c.min {
        None => bound,
        Some(old)
            if bound.instant > old.instant
                || (bound.instant == old.instant && bound.exclusive) =>
        {
            bound
        }
        Some(old) => old,
    });
}

fn tighten_time_max(c: &mut TimeConstraints, bound: TimeBound) {
    c.max = Some(match c.max {
        None => bound,
        Some(old)
            if bound.instant < old.instant
                || (bound.instant == old.instant && bound.exclusive) =>
        {
            bound
        }
        Some(old) => old,
    });
}

impl Parser<'_> {
    /// Walk `[ c1, c2, ... ]`, calling `each` per constraint. Commas separate
    /// on one line; newlines alone separate across lines.
    fn constraint_block<F>(&mut self, mut each: F) -> Result<(), ParseError>
    where
        F: FnMut(&mut Self) -> Result<(), ParseError>,
    {
        self.ts.expect(Token::LBracket, "to open the constraint block")?;
        loop {
            self.ts.skip_newlines();
            if self.ts.eat(&Token::RBracket) {
                break;
            }
            each(self)?;
            if self.ts.eat(&Token::Comma) {
                continue;
            }
            if matches!(self.ts.peek(), Some(Token::Newline)) {
                continue; // consumed at loop head
            }
            if self.ts.eat(&Token::RBracket) {
                break;
            }
            return Err(self.ts.err("expected ',' or ']' in constraint block"));
        }
        Ok(())
    }

    fn cmp_op(&mut self) -> Result<CmpOp, ParseError> {
        let op = match self.ts.peek() {
            Some(Token::Lt) => CmpOp::Lt,
            Some(Token::Le) => CmpOp::Le,
            Some(Token::Gt) => CmpOp::Gt,
            Some(Token::Ge) => CmpOp::Ge,
            Some(Token::EqEq) => CmpOp::EqEq,
            Some(Token::NotEq) => CmpOp::Ne,
            Some(other) => {
                return Err(self
                    .ts
                    .err(format!("expected a comparison operator, found {other}")));
            }
            None => {
                return Err(self
                    .ts
                    .err("expected a comparison operator, found end of input"));
            }
        };
        self.ts.bump();
        Ok(op)
    }

    /// `<`-family only, for the second leg of a chained range.
    fn chain_op(&mut self) -> Option<CmpOp> {
        match self.ts.peek() {
            Some(Token::Lt) => {
                self.ts.bump();
                Some(CmpOp::Lt)
            }
            Some(Token::Le) => {
                self.ts.bump();
                Some(CmpOp::Le)
            }
            Some(Token::Gt) => {
                self.ts.bump();
                Some(CmpOp::Gt)
            }
            Some(Token::Ge) => {
                self.ts.bump();
                Some(CmpOp::Ge)
            }
            _ => None,
        }
    }

    fn expect_prop(&mut self, prop: &str) -> Result<(), ParseError> {
        match self.ts.peek() {
            Some(Token::Ident(n)) if n == prop => {
                self.ts.bump();
                Ok(())
            }
            Some(other) => Err(self
                .ts
                .err(format!("expected '{prop}' in range constraint, found {other}"))),
            None => Err(self
                .ts
                .err(format!("expected '{prop}' in range constraint, found end of input"))),
        }
    }

    /// An integral bound literal for `length`/`size`.
    fn int_bound(&mut self, prop: &str) -> Result<i128, ParseError> {
        let n = self.number_lit("bound")?;
        if n.fract() != 0.0 || !n.is_finite() {
            return Err(self.ts.err(format!("'{prop}' bounds must be integers")));
        }
        Ok(n as i128)
    }

    /// One integral range constraint with the property already consumed.
    fn int_prop_led(&mut self, range: &mut IntRange) -> Result<(), ParseError> {
        let op = self.cmp_op()?;
        let n = self.int_bound(range.prop)?;
        range.apply_prop_led(op, n).map_err(|m| self.ts.err(m))
    }

    /// One integral range constraint starting at a number token; covers
    /// `10 <= length` and `10 < length < 100`.
    fn int_bound_led(&mut self, range: &mut IntRange) -> Result<(), ParseError> {
        let lo = self.int_bound(range.prop)?;
        let op1 = self.cmp_op()?;
        range.apply_bound_led(lo, op1).map_err(|m| self.ts.err(m))?;
        self.expect_prop(range.prop)?;
        if let Some(op2) = self.chain_op() {
            let same_way = matches!(
                (op1, op2),
                (CmpOp::Lt | CmpOp::Le, CmpOp::Lt | CmpOp::Le)
                    | (CmpOp::Gt | CmpOp::Ge, CmpOp::Gt | CmpOp::Ge)
            );
            if !same_way {
                return Err(self.ts.err("range comparisons must point the same way"));
            }
            let hi = self.int_bound(range.prop)?;
            range.apply_prop_led(op2, hi).map_err(|m| self.ts.err(m))?;
        }
        Ok(())
    }

    // ---------------------------- numeric ---------------------------------- //

    pub(crate) fn numeric_block(&mut self, c: &mut NumericConstraints) -> Result<(), ParseError> {
        self.constraint_block(|p| match p.ts.peek() {
            Some(Token::Ident(name)) if name == "value" => {
                p.ts.bump();
                let op = p.cmp_op()?;
                let n = p.number_lit("numeric bound")?;
                match op {
                    CmpOp::Ne => c.not_equal.push(OrderedFloat(n)),
                    CmpOp::EqEq => {
                        tighten_num_min(c, n, false);
                        tighten_num_max(c, n, false);
                    }
                    CmpOp::Lt => tighten_num_max(c, n, true),
                    CmpOp::Le => tighten_num_max(c, n, false),
                    CmpOp::Gt => tighten_num_min(c, n, true),
                    CmpOp::Ge => tighten_num_min(c, n, false),
                }
                Ok(())
            }
            Some(Token::Number(n)) => {
                let lo = *n;
                p.ts.bump();
                let op1 = p.cmp_op()?;
                match op1 {
                    CmpOp::Lt => tighten_num_min(c, lo, true),
                    CmpOp::Le => tighten_num_min(c, lo, false),
                    CmpOp::Gt => tighten_num_max(c, lo, true),
                    CmpOp::Ge => tighten_num_max(c, lo, false),
                    _ => {
                        return Err(p
                            .ts
                            .err("expected '<', '<=', '>' or '>=' in range constraint"));
                    }
                }
                p.expect_prop("value")?;
                if let Some(op2) = p.chain_op() {
                    let hi = p.number_lit("numeric bound")?;
                    match (op1, op2) {
                        (CmpOp::Lt | CmpOp::Le, CmpOp::Lt) => tighten_num_max(c, hi, true),
                        (CmpOp::Lt | CmpOp::Le, CmpOp::Le) => tighten_num_max(c, hi, false),
                        (CmpOp::Gt | CmpOp::Ge, CmpOp::Gt) => tighten_num_min(c, hi, true),
                        (CmpOp::Gt | CmpOp::Ge, CmpOp::Ge) => tighten_num_min(c, hi, false),
                        _ => {
                            return Err(p.ts.err("range comparisons must point the same way"));
                        }
                    }
                }
                Ok(())
            }
            Some(Token::Ident(other)) => {
                Err(p.ts.err(format!("constraint '{other}' is not valid for number")))
            }
            Some(other) => Err(p.ts.err(format!("expected a constraint, found {other}"))),
            None => Err(p.ts.err("expected a constraint, found end of input")),
        })?;
        if let (Some(lo), Some(hi)) = (c.min, c.max) {
            let empty =
                lo.limit > hi.limit || (lo.limit == hi.limit && (lo.exclusive || hi.exclusive));
            if empty {
                return Err(self.ts.err("inconsistent value range"));
            }
        }
        Ok(())
    }

    // ------------------------------ text ----------------------------------- //

    pub(crate) fn text_block(&mut self, c: &mut TextConstraints) -> Result<(), ParseError> {
        let mut range = IntRange::new("length");
        let mut regex: Option<CompiledRegex> = None;
        let mut pattern: Option<String> = None;
        self.constraint_block(|p| match p.ts.peek() {
            Some(Token::Ident(name)) => match name.as_str() {
                "length" => {
                    p.ts.bump();
                    p.int_prop_led(&mut range)
                }
                "regex" => {
                    p.ts.bump();
                    p.ts.expect(Token::Eq, "after 'regex'")?;
                    let src = p.string_lit("regex literal")?;
                    if regex.is_some() {
                        return Err(p.ts.err("duplicate 'regex' constraint"));
                    }
                    regex = Some(
                        CompiledRegex::new(&src)
                            .map_err(|e| p.ts.err(format!("invalid regex: {e}")))?,
                    );
                    Ok(())
                }
                "pattern" => {
                    p.ts.bump();
                    p.ts.expect(Token::Eq, "after 'pattern'")?;
                    let src = p.string_lit("pattern literal")?;
                    if pattern.is_some() {
                        return Err(p.ts.err("duplicate 'pattern' constraint"));
                    }
                    pattern = Some(src);
                    Ok(())
                }
                other => Err(p.ts.err(format!("constraint '{other}' is not valid for text"))),
            },
            Some(Token::Number(_)) => p.int_bound_led(&mut range),
            Some(other) => Err(p.ts.err(format!("expected a constraint, found {other}"))),
            None => Err(p.ts.err("expected a constraint, found end of input")),
        })?;
        let (min, max) = range.finish().map_err(|m| self.ts.err(m))?;
        c.min_length = min;
        c.max_length = max;
        c.regex = regex;
        c.pattern = pattern;
        Ok(())
    }

    // ----------------------------- binary ---------------------------------- //

    pub(crate) fn binary_block(&mut self, c: &mut BinaryConstraints) -> Result<(), ParseError> {
        let mut range = IntRange::new("size");
        self.constraint_block(|p| match p.ts.peek() {
            Some(Token::Ident(name)) if name == "size" => {
                p.ts.bump();
                p.int_prop_led(&mut range)
            }
            Some(Token::Number(_)) => p.int_bound_led(&mut range),
            Some(Token::Ident(other)) => {
                Err(p.ts.err(format!("constraint '{other}' is not valid for binary")))
            }
            Some(other) => Err(p.ts.err(format!("expected a constraint, found {other}"))),
            None => Err(p.ts.err("expected a constraint, found end of input")),
        })?;
        let (min, max) = range.finish().map_err(|m| self.ts.err(m))?;
        c.min_size = min;
        c.max_size = max;
        Ok(())
    }

    // ------------------------------ time ----------------------------------- //

    pub(crate) fn time_block(&mut self, c: &mut TimeConstraints) -> Result<(), ParseError> {
        self.constraint_block(|p| match p.ts.peek() {
            Some(Token::Ident(name)) if name == "value" => {
                p.ts.bump();
                let op = p.cmp_op()?;
                let instant = p.time_literal()?;
                match op {
                    CmpOp::EqEq => {
                        tighten_time_min(c, TimeBound { instant, exclusive: false });
                        tighten_time_max(c, TimeBound { instant, exclusive: false });
                    }
                    CmpOp::Lt => tighten_time_max(c, TimeBound { instant, exclusive: true }),
                    CmpOp::Le => tighten_time_max(c, TimeBound { instant, exclusive: false }),
                    CmpOp::Gt => tighten_time_min(c, TimeBound { instant, exclusive: true }),
                    CmpOp::Ge => tighten_time_min(c, TimeBound { instant, exclusive: false }),
                    CmpOp::Ne => return Err(p.ts.err("'value' on time does not support '!='")),
                }
                Ok(())
            }
            Some(Token::Str(_)) => {
                let instant = p.time_literal()?;
                let op1 = p.cmp_op()?;
                match op1 {
                    CmpOp::Lt => tighten_time_min(c, TimeBound { instant, exclusive: true }),
                    CmpOp::Le => tighten_time_min(c, TimeBound { instant, exclusive: false }),
                    CmpOp::Gt => tighten_time_max(c, TimeBound { instant, exclusive: true }),
                    CmpOp::Ge => tighten_time_max(c, TimeBound { instant, exclusive: false }),
                    _ => {
                        return Err(p
                            .ts
                            .err("expected '<', '<=', '>' or '>=' in range constraint"));
                    }
                }
                p.expect_prop("value")?;
                if let Some(op2) = p.chain_op() {
                    let hi = p.time_literal()?;
                    match (op1, op2) {
                        (CmpOp::Lt | CmpOp::Le, CmpOp::Lt) => {
                            tighten_time_max(c, TimeBound { instant: hi, exclusive: true })
                        }
                        (CmpOp::Lt | CmpOp::Le, CmpOp::Le) => {
                            tighten_time_max(c, TimeBound { instant: hi, exclusive: false })
                        }
                        (CmpOp::Gt | CmpOp::Ge, CmpOp::Gt) => {
                            tighten_time_min(c, TimeBound { instant: hi, exclusive: true })
                        }
                        (CmpOp::Gt | CmpOp::Ge, CmpOp::Ge) => {
                            tighten_time_min(c, TimeBound { instant: hi, exclusive: false })
                        }
                        _ => {
                            return Err(p.ts.err("range comparisons must point the same way"));
                        }
                    }
                }
                Ok(())
            }
            Some(Token::Ident(other)) => {
                Err(p.ts.err(format!("constraint '{other}' is not valid for time")))
            }
            Some(other) => Err(p.ts.err(format!("expected a constraint, found {other}"))),
            None => Err(p.ts.err("expected a constraint, found end of input")),
        })?;
        if let (Some(lo), Some(hi)) = (c.min, c.max) {
            let empty = lo.instant > hi.instant
                || (lo.instant == hi.instant && (lo.exclusive || hi.exclusive));
            if empty {
                return Err(self.ts.err("inconsistent time range"));
            }
        }
        Ok(())
    }

    fn time_literal(&mut self) -> Result<chrono::DateTime<chrono::FixedOffset>, ParseError> {
        let s = self.string_lit("time literal")?;
        parse_time_literal(&s).ok_or_else(|| {
            self.ts.err(format!(
                "invalid time literal \"{s}\" (expected RFC 3339 or YYYY-MM-DD)"
            ))
        })
    }

    // ------------------------------ list ----------------------------------- //

    /// List block after a marker; the marker's bounds are already seeded and
    /// only tighten further.
    pub(crate) fn list_block(&mut self, c: &mut ListConstraints) -> Result<(), ParseError> {
        let mut range = IntRange::seed("size", c.min_size, c.max_size);
        let mut unique: Vec<UniqueKey> = Vec::new();
        self.constraint_block(|p| match p.ts.peek() {
            Some(Token::Ident(name)) if name == "size" => {
                p.ts.bump();
                p.int_prop_led(&mut range)
            }
            Some(Token::Ident(name)) if name == "unique" => {
                p.ts.bump();
                if p.ts.eat(&Token::Eq) {
                    if p.ts.eat(&Token::LParen) {
                        let mut names = vec![p.field_name()?];
                        while p.ts.eat(&Token::Comma) {
                            names.push(p.field_name()?);
                        }
                        p.ts.expect(Token::RParen, "to close the unique key list")?;
                        unique.push(UniqueKey::Fields(names));
                    } else {
                        unique.push(UniqueKey::Fields(vec![p.field_name()?]));
                    }
                } else {
                    unique.push(UniqueKey::Whole);
                }
                Ok(())
            }
            Some(Token::Number(_)) => p.int_bound_led(&mut range),
            Some(Token::Ident(other)) => {
                Err(p.ts.err(format!("constraint '{other}' is not valid for a list")))
            }
            Some(other) => Err(p.ts.err(format!("expected a constraint, found {other}"))),
            None => Err(p.ts.err("expected a constraint, found end of input")),
        })?;
        let (min, max) = range.finish().map_err(|m| self.ts.err(m))?;
        c.min_size = min;
        c.max_size = max;
        c.unique.extend(unique);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::schema::Schema;

    #[test]
    fn all_three_surface_forms_normalize_identically() {
        let a = parse("= text [ length >= 11, length <= 99 ]").unwrap();
        let b = parse("= text [ 10 < length < 100 ]").unwrap();
        let c = parse("= text [ 11 <= length, length < 100 ]").unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn reversed_chain_normalizes_too() {
        let a = parse("= text [ 100 > length > 10 ]").unwrap();
        let b = parse("= text [ 10 < length < 100 ]").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn numeric_exclusivity_is_preserved_not_folded() {
        let s = parse("= number [ 0 < value < 1 ]").unwrap();
        let Schema::Numeric(c, _) = s else { panic!() };
        let lo = c.min.unwrap();
        let hi = c.max.unwrap();
        assert!(lo.exclusive && hi.exclusive);
        assert_eq!(lo.limit.0, 0.0);
        assert_eq!(hi.limit.0, 1.0);
    }

    #[test]
    fn value_equality_pins_both_bounds() {
        let s = parse("= number [ value == 4 ]").unwrap();
        let Schema::Numeric(c, _) = s else { panic!() };
        assert_eq!(c.min, c.max);
        assert!(!c.min.unwrap().exclusive);
    }

    #[test]
    fn value_not_equal_accumulates() {
        let s = parse("= number [ value != 0, value != 1 ]").unwrap();
        let Schema::Numeric(c, _) = s else { panic!() };
        assert_eq!(c.not_equal.len(), 2);
    }

    #[test]
    fn wrong_context_constraints_are_named_in_the_error() {
        let err = parse("= number [ length == 3 ]").unwrap_err();
        assert!(err.message.contains("'length' is not valid for number"));
        let err = parse("= text* [ length == 3 ]").unwrap_err();
        assert!(err.message.contains("'length' is not valid for a list"));
    }

    #[test]
    fn constraints_separate_by_newline_without_commas() {
        let s = parse("= text [\n  length >= 1\n  length <= 5\n]").unwrap();
        let Schema::Text(c, _) = s else { panic!() };
        assert_eq!(c.min_length, Some(1));
        assert_eq!(c.max_length, Some(5));
    }

    #[test]
    fn marker_bounds_and_block_bounds_tighten() {
        let s = parse("= text+ [ size <= 5 ]").unwrap();
        let Schema::ListOf(_, c) = s else { panic!() };
        assert_eq!(c.min_size, Some(1));
        assert_eq!(c.max_size, Some(5));
    }

    #[test]
    fn marker_and_block_conflicts_are_inconsistent() {
        let err = parse("= text{3} [ size <= 1 ]").unwrap_err();
        assert!(err.message.contains("inconsistent size range"));
    }

    #[test]
    fn invalid_regex_fails_at_parse_time() {
        let err = parse(r#"= text [ regex = "(" ]"#).unwrap_err();
        assert!(err.message.contains("invalid regex"));
    }

    #[test]
    fn time_bounds_parse_rfc3339_and_dates() {
        let s = parse(r#"= time [ value >= "2020-01-01", value < "2021-01-01T00:00:00Z" ]"#)
            .unwrap();
        let Schema::Time(c, ..) = s else { panic!() };
        assert!(!c.min.unwrap().exclusive);
        assert!(c.max.unwrap().exclusive);
    }

    #[test]
    fn bad_time_literal_is_a_parse_error() {
        let err = parse(r#"= time [ value >= "whenever" ]"#).unwrap_err();
        assert!(err.message.contains("invalid time literal"));
    }

    #[test]
    fn whole_value_unique() {
        let s = parse("= text* [ unique ]").unwrap();
        let Schema::ListOf(_, c) = s else { panic!() };
        assert_eq!(c.unique, vec![UniqueKey::Whole]);
    }

    #[test]
    fn length_below_one_is_representable_and_zero_floors() {
        let s = parse("= text [ length < 1 ]").unwrap();
        let Schema::Text(c, _) = s else { panic!() };
        assert_eq!(c.max_length, Some(0));
        let err = parse("= text [ length < 0 ]").unwrap_err();
        assert!(err.message.contains("inconsistent length range"));
    }
}
