//! Recursive-descent parser for `SCORE(...)` / `IF(...)` formulas.
//!
//! The grammar is closed:
//!
//! ```text
//! formula   := score | if
//! score     := "SCORE(" group (";" group)* ")"
//! group     := rsid ":" rule ("," rule)*
//! rule      := genotype "=" integer
//! if        := "IF(" condition "," branch "," branch ")"
//! condition := rsid "=" genotype
//! branch    := score | integer
//! ```
//!
//! Every node keeps the byte offset of the text it came from so strict-mode
//! errors can point at the exact fragment.

use miette::SourceSpan;

use super::error::{FormulaError, FormulaResult};
use super::{Branch, Condition, Formula, GenotypeRule, IfExpr, RuleGroup, ScoreExpr};

/// How structural faults inside a formula are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Every fault is an error.
    Strict,
    /// Faults inside a rule group, rule, condition or literal degrade to a
    /// zero contribution (or a condition that never holds). Faults in the
    /// outer call shape are still errors.
    Lenient,
}

/// A slice of the source together with its byte offset.
#[derive(Debug, Clone, Copy)]
struct Piece<'s> {
    text: &'s str,
    offset: usize,
}

impl<'s> Piece<'s> {
    fn trim(self) -> Self {
        let lead = self.text.len() - self.text.trim_start().len();
        Self {
            text: self.text.trim(),
            offset: self.offset + lead,
        }
    }

    fn slice(self, start: usize, end: usize) -> Self {
        Self {
            text: &self.text[start..end],
            offset: self.offset + start,
        }
    }

    fn span(self) -> SourceSpan {
        (self.offset, self.text.len()).into()
    }

    fn is_empty(self) -> bool {
        self.text.is_empty()
    }

    fn split_once(self, sep: char) -> Option<(Self, Self)> {
        let idx = self.text.find(sep)?;
        Some((
            self.slice(0, idx),
            self.slice(idx + sep.len_utf8(), self.text.len()),
        ))
    }

    /// Split on `sep` where it is not nested inside parentheses.
    fn split_top_level(self, sep: char) -> Vec<Self> {
        let mut pieces = Vec::new();
        let mut depth = 0usize;
        let mut start = 0;
        for (i, c) in self.text.char_indices() {
            match c {
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                c if c == sep && depth == 0 => {
                    pieces.push(self.slice(start, i));
                    start = i + c.len_utf8();
                }
                _ => {}
            }
        }
        pieces.push(self.slice(start, self.text.len()));
        pieces
    }
}

/// Parser over a single formula string.
pub struct Parser<'s> {
    src: &'s str,
    mode: ParseMode,
}

impl<'s> Parser<'s> {
    pub fn new(src: &'s str, mode: ParseMode) -> Self {
        Self { src, mode }
    }

    pub fn parse(&self) -> FormulaResult<Formula> {
        let whole = Piece {
            text: self.src,
            offset: 0,
        }
        .trim();
        if whole.is_empty() {
            return Err(FormulaError::Empty);
        }

        let (name, args) = self.call(whole)?;
        match name.text {
            "SCORE" => self.score(args).map(Formula::Score),
            "IF" => self.conditional(args).map(Formula::If),
            _ => Err(self.unknown_function(name)),
        }
    }

    /// Split `NAME(args)` into the name and the text between the parentheses.
    fn call(&self, piece: Piece<'s>) -> FormulaResult<(Piece<'s>, Piece<'s>)> {
        let Some(open) = piece.text.find('(') else {
            return Err(self.unknown_function(piece));
        };
        let name = piece.slice(0, open);

        let mut depth = 0usize;
        for (i, c) in piece.text[open..].char_indices() {
            let at = open + i;
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        let rest = piece.slice(at + 1, piece.text.len());
                        if !rest.text.trim().is_empty() {
                            return Err(FormulaError::TrailingInput {
                                src: self.src.to_string(),
                                span: rest.span(),
                            });
                        }
                        return Ok((name, piece.slice(open + 1, at)));
                    }
                }
                _ => {}
            }
        }

        Err(FormulaError::Unbalanced {
            src: self.src.to_string(),
            span: (piece.offset + open, 1).into(),
        })
    }

    fn score(&self, args: Piece<'s>) -> FormulaResult<ScoreExpr> {
        let mut groups = Vec::new();
        for group in args.split_top_level(';') {
            let group = group.trim();
            if group.is_empty() {
                continue;
            }
            if let Some(parsed) = self.rule_group(group)? {
                groups.push(parsed);
            }
        }
        Ok(ScoreExpr { groups })
    }

    fn rule_group(&self, group: Piece<'s>) -> FormulaResult<Option<RuleGroup>> {
        let parts = group
            .split_once(':')
            .map(|(rsid, rules)| (rsid.trim(), rules.trim()))
            .filter(|(rsid, rules)| !rsid.is_empty() && !rules.is_empty());
        let Some((rsid, rules)) = parts else {
            return self.recover(FormulaError::MalformedRuleGroup {
                group: group.text.to_string(),
                src: self.src.to_string(),
                span: group.span(),
            });
        };

        let mut parsed = Vec::new();
        for rule in rules.split_top_level(',') {
            if let Some(rule) = self.rule(rule.trim())? {
                parsed.push(rule);
            }
        }
        Ok(Some(RuleGroup {
            rsid: rsid.text.to_string(),
            rules: parsed,
        }))
    }

    fn rule(&self, rule: Piece<'s>) -> FormulaResult<Option<GenotypeRule>> {
        let parts = rule
            .split_once('=')
            .map(|(genotype, points)| (genotype.trim(), points.trim()))
            .filter(|(genotype, _)| !genotype.is_empty());
        let Some((genotype, points)) = parts else {
            return self.recover(FormulaError::MalformedRule {
                rule: rule.text.to_string(),
                src: self.src.to_string(),
                span: rule.span(),
            });
        };
        Ok(Some(GenotypeRule {
            genotype: genotype.text.to_string(),
            points: self.integer(points)?,
        }))
    }

    fn conditional(&self, args: Piece<'s>) -> FormulaResult<IfExpr> {
        let parts = if args.text.trim().is_empty() {
            Vec::new()
        } else {
            args.split_top_level(',')
        };
        let [condition, then_branch, else_branch] = parts.as_slice() else {
            return Err(FormulaError::ArgumentCount {
                found: parts.len(),
                src: self.src.to_string(),
                span: args.span(),
            });
        };
        let (then_branch, else_branch) = (then_branch.trim(), else_branch.trim());
        // With a SCORE branch, literals must be whole integers.
        let composite = [then_branch, else_branch]
            .iter()
            .any(|b| b.text.starts_with("SCORE("));
        Ok(IfExpr {
            condition: self.condition(condition.trim())?,
            then_branch: self.branch(then_branch, composite)?,
            else_branch: self.branch(else_branch, composite)?,
        })
    }

    fn condition(&self, condition: Piece<'s>) -> FormulaResult<Condition> {
        let parts = condition
            .split_once('=')
            .map(|(rsid, genotype)| (rsid.trim(), genotype.trim()))
            .filter(|(rsid, genotype)| !rsid.is_empty() && !genotype.is_empty());
        match parts {
            Some((rsid, genotype)) => Ok(Condition {
                rsid: rsid.text.to_string(),
                genotype: genotype.text.to_string(),
            }),
            None => {
                self.recover::<()>(FormulaError::MalformedCondition {
                    condition: condition.text.to_string(),
                    src: self.src.to_string(),
                    span: condition.span(),
                })?;
                Ok(Condition::never())
            }
        }
    }

    fn branch(&self, branch: Piece<'s>, composite: bool) -> FormulaResult<Branch> {
        if branch.text.starts_with("SCORE(") {
            let (_, args) = self.call(branch)?;
            return self.score(args).map(Branch::Score);
        }
        if branch.text.starts_with("IF(") {
            self.recover::<()>(FormulaError::NestedConditional {
                src: self.src.to_string(),
                span: branch.span(),
            })?;
            return Ok(Branch::Literal(0));
        }
        if composite && self.mode == ParseMode::Lenient {
            let value = branch.text.parse::<i64>().unwrap_or_else(|_| {
                tracing::debug!(literal = branch.text, "non-numeric branch literal, using 0");
                0
            });
            return Ok(Branch::Literal(value));
        }
        self.integer(branch).map(Branch::Literal)
    }

    fn integer(&self, literal: Piece<'s>) -> FormulaResult<i64> {
        match self.mode {
            ParseMode::Strict => {
                literal
                    .text
                    .parse::<i64>()
                    .map_err(|_| FormulaError::InvalidNumber {
                        literal: literal.text.to_string(),
                        src: self.src.to_string(),
                        span: literal.span(),
                    })
            }
            ParseMode::Lenient => Ok(parse_int_prefix(literal.text).unwrap_or_else(|| {
                tracing::debug!(literal = literal.text, "non-numeric formula literal, using 0");
                0
            })),
        }
    }

    fn unknown_function(&self, name: Piece<'s>) -> FormulaError {
        FormulaError::UnknownFunction {
            name: name.text.to_string(),
            src: self.src.to_string(),
            span: name.span(),
        }
    }

    /// Strict mode: propagate `err`. Lenient mode: log it and skip the fragment.
    fn recover<T>(&self, err: FormulaError) -> FormulaResult<Option<T>> {
        match self.mode {
            ParseMode::Strict => Err(err),
            ParseMode::Lenient => {
                tracing::debug!(error = %err, "skipping malformed formula fragment");
                Ok(None)
            }
        }
    }
}

/// Leading-integer parse: optional sign, then ASCII digits; anything after
/// the digits is ignored (`"10abc"` -> 10). `None` when no digits lead.
pub(crate) fn parse_int_prefix(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let value = digits[..end].parse::<i64>().ok()?;
    Some(if negative { -value } else { value })
}
