//! Diagnostics for strict formula parsing.
//!
//! Evaluation never surfaces these: a formula that fails to parse scores 0.
//! They are reported when a trait is created or imported and by the CLI
//! `check` command, with a label pointing at the offending fragment.

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum FormulaError {
    #[error("formula is empty")]
    #[diagnostic(
        code(rootara::formula::empty),
        help("Write a SCORE(...) or IF(...) formula, e.g. SCORE(rs12913832:GG=10,AG=5,AA=0).")
    )]
    Empty,

    #[error("unknown formula function \"{name}\"")]
    #[diagnostic(
        code(rootara::formula::unknown_function),
        help(
            "Formulas start with SCORE( or IF(, upper case with no space before the \
             parenthesis. Example: IF(rs12913832=GG, 10, 0)."
        )
    )]
    UnknownFunction {
        name: String,
        #[source_code]
        src: String,
        #[label("expected SCORE or IF")]
        span: SourceSpan,
    },

    #[error("unbalanced parentheses")]
    #[diagnostic(
        code(rootara::formula::unbalanced),
        help("Every opening parenthesis needs a matching closing one.")
    )]
    Unbalanced {
        #[source_code]
        src: String,
        #[label("never closed")]
        span: SourceSpan,
    },

    #[error("unexpected text after the closing parenthesis")]
    #[diagnostic(
        code(rootara::formula::trailing_input),
        help("A formula is a single SCORE(...) or IF(...) call. Remove the trailing text.")
    )]
    TrailingInput {
        #[source_code]
        src: String,
        #[label("unexpected")]
        span: SourceSpan,
    },

    #[error("malformed rule group \"{group}\"")]
    #[diagnostic(
        code(rootara::formula::rule_group),
        help(
            "Each group has the form rsid:GENOTYPE=points,GENOTYPE=points and groups \
             are separated by ';', e.g. rs12913832:GG=10,AG=5; rs1800407:CC=5."
        )
    )]
    MalformedRuleGroup {
        group: String,
        #[source_code]
        src: String,
        #[label("expected rsid:GENOTYPE=points,...")]
        span: SourceSpan,
    },

    #[error("malformed genotype rule \"{rule}\"")]
    #[diagnostic(
        code(rootara::formula::rule),
        help("Genotype rules have the form GENOTYPE=points, e.g. AG=5.")
    )]
    MalformedRule {
        rule: String,
        #[source_code]
        src: String,
        #[label("expected GENOTYPE=points")]
        span: SourceSpan,
    },

    #[error("malformed condition \"{condition}\"")]
    #[diagnostic(
        code(rootara::formula::condition),
        help("Conditions have the form rsid=GENOTYPE, e.g. rs12913832=GG.")
    )]
    MalformedCondition {
        condition: String,
        #[source_code]
        src: String,
        #[label("expected rsid=GENOTYPE")]
        span: SourceSpan,
    },

    #[error("IF expects 3 arguments, found {found}")]
    #[diagnostic(
        code(rootara::formula::argument_count),
        help("Use IF(rsid=GENOTYPE, value-if-true, value-if-false).")
    )]
    ArgumentCount {
        found: usize,
        #[source_code]
        src: String,
        #[label("arguments")]
        span: SourceSpan,
    },

    #[error("\"{literal}\" is not an integer")]
    #[diagnostic(
        code(rootara::formula::invalid_number),
        help(
            "Points and IF branch values must be whole numbers. Boolean results are \
             expressed through the threshold table (e.g. {{\"Carrier\": true}}), not the formula."
        )
    )]
    InvalidNumber {
        literal: String,
        #[source_code]
        src: String,
        #[label("not an integer")]
        span: SourceSpan,
    },

    #[error("IF branches may only be SCORE(...) or an integer")]
    #[diagnostic(
        code(rootara::formula::nested_conditional),
        help("Nested IF(...) is not supported. Combine the conditions into SCORE rule groups instead.")
    )]
    NestedConditional {
        #[source_code]
        src: String,
        #[label("nested IF")]
        span: SourceSpan,
    },
}

/// Result type for formula parsing.
pub type FormulaResult<T> = std::result::Result<T, FormulaError>;
