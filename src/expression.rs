//! Guard expressions and their evaluator.
//!
//! Expressions are evaluated against a single binding by a recursive tree
//! walk. Typing is strict: every operator is defined on an exact set of
//! operand types and anything else is an evaluation error. Errors never
//! escape a guard; the enclosing binding is rejected instead.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::ops;
use std::sync::{OnceLock, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::binding::Binding;
use crate::term::Term;

const REGEX_CACHE_MAX: usize = 1024;

static REGEX_CACHE: OnceLock<RwLock<HashMap<String, regex::Regex>>> = OnceLock::new();

fn cached_regex(pattern: &str) -> Result<regex::Regex, EvalError> {
    let cache = REGEX_CACHE.get_or_init(|| RwLock::new(HashMap::new()));

    {
        let guard = cache.read().map_err(|_| EvalError::RegexCachePoisoned)?;
        if let Some(re) = guard.get(pattern) {
            return Ok(re.clone());
        }
    }

    let compiled = regex::Regex::new(pattern)
        .map_err(|e| EvalError::InvalidRegex(e.to_string()))?;

    let mut guard = cache.write().map_err(|_| EvalError::RegexCachePoisoned)?;

    if guard.len() >= REGEX_CACHE_MAX {
        // Keep the cache bounded to avoid unbounded memory usage.
        guard.clear();
    }

    // Another thread may have inserted it while we compiled.
    guard
        .entry(pattern.to_string())
        .or_insert_with(|| compiled.clone());
    Ok(compiled)
}

/// Why a guard failed to evaluate.
///
/// Never surfaced to callers: any error rejects the binding under
/// evaluation, which is indistinguishable from the guard being false.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum EvalError {
    #[error("variable ${0} is unbound")]
    UnboundVariable(String),

    #[error("{op} is not defined for {left} and {right}")]
    BinaryTypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("{op} is not defined for {operand}")]
    UnaryTypeMismatch {
        op: &'static str,
        operand: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow")]
    Overflow,

    #[error("regex matching is disabled")]
    RegexDisabled,

    #[error("invalid regex: {0}")]
    InvalidRegex(String),

    #[error("regex cache lock poisoned")]
    RegexCachePoisoned,

    #[error("a {0} cannot be a set element")]
    InvalidSetElement(&'static str),
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    /// Identity; only affects rendering.
    Parens,
    /// Logical not on booleans.
    Negate,
    /// Length of a string (code points), byte string, or set.
    Length,
}

impl UnaryOp {
    const fn name(self) -> &'static str {
        match self {
            Self::Parens => "parens",
            Self::Negate => "!",
            Self::Length => "length",
        }
    }

    fn apply(self, operand: Term) -> Result<Term, EvalError> {
        match (self, operand) {
            (Self::Parens, term) => Ok(term),
            (Self::Negate, Term::Bool(b)) => Ok(Term::Bool(!b)),
            (Self::Length, Term::Str(s)) => int_len(s.chars().count()),
            (Self::Length, Term::Bytes(b)) => int_len(b.len()),
            (Self::Length, Term::Set(s)) => int_len(s.len()),
            (op, other) => Err(EvalError::UnaryTypeMismatch {
                op: op.name(),
                operand: other.type_name(),
            }),
        }
    }
}

fn int_len(len: usize) -> Result<Term, EvalError> {
    i64::try_from(len).map(Term::Int).map_err(|_| EvalError::Overflow)
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    /// Structural equality on same-typed scalars or on two sets.
    Equal,
    /// `<` on integers or dates.
    LessThan,
    /// `>` on integers or dates.
    GreaterThan,
    /// `<=` on integers or dates.
    LessOrEqual,
    /// `>=` on integers or dates.
    GreaterOrEqual,
    /// Integer addition; overflow is an error.
    Add,
    /// Integer subtraction; overflow is an error.
    Sub,
    /// Integer multiplication; overflow is an error.
    Mul,
    /// Integer division truncating toward zero; zero divisor is an error.
    Div,
    /// String prefix test.
    Prefix,
    /// String suffix test.
    Suffix,
    /// Regex substring match, gated by the regex limit.
    Regex,
    /// Boolean conjunction (both operands already evaluated).
    And,
    /// Boolean disjunction (both operands already evaluated).
    Or,
    /// Set-contains-set (superset) or set-contains-scalar (membership).
    Contains,
    /// Set intersection.
    Intersection,
    /// Set union.
    Union,
}

impl BinaryOp {
    const fn name(self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::LessThan => "<",
            Self::GreaterThan => ">",
            Self::LessOrEqual => "<=",
            Self::GreaterOrEqual => ">=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Prefix => "starts_with",
            Self::Suffix => "ends_with",
            Self::Regex => "matches",
            Self::And => "&&",
            Self::Or => "||",
            Self::Contains => "contains",
            Self::Intersection => "intersection",
            Self::Union => "union",
        }
    }

    const fn is_infix(self) -> bool {
        !matches!(
            self,
            Self::Prefix | Self::Suffix | Self::Regex | Self::Contains | Self::Intersection | Self::Union
        )
    }

    #[allow(clippy::too_many_lines)]
    fn apply(self, left: Term, right: Term, regexes_enabled: bool) -> Result<Term, EvalError> {
        use Term::{Bool, Date, Int, Set, Str};

        match (self, left, right) {
            (Self::Equal, l, r) => structural_equal(&l, &r).map(Bool),

            (Self::LessThan, Int(a), Int(b)) => Ok(Bool(a < b)),
            (Self::LessThan, Date(a), Date(b)) => Ok(Bool(a < b)),
            (Self::GreaterThan, Int(a), Int(b)) => Ok(Bool(a > b)),
            (Self::GreaterThan, Date(a), Date(b)) => Ok(Bool(a > b)),
            (Self::LessOrEqual, Int(a), Int(b)) => Ok(Bool(a <= b)),
            (Self::LessOrEqual, Date(a), Date(b)) => Ok(Bool(a <= b)),
            (Self::GreaterOrEqual, Int(a), Int(b)) => Ok(Bool(a >= b)),
            (Self::GreaterOrEqual, Date(a), Date(b)) => Ok(Bool(a >= b)),

            (Self::Add, Int(a), Int(b)) => a.checked_add(b).map(Int).ok_or(EvalError::Overflow),
            (Self::Sub, Int(a), Int(b)) => a.checked_sub(b).map(Int).ok_or(EvalError::Overflow),
            (Self::Mul, Int(a), Int(b)) => a.checked_mul(b).map(Int).ok_or(EvalError::Overflow),
            (Self::Div, Int(_), Int(0)) => Err(EvalError::DivisionByZero),
            (Self::Div, Int(a), Int(b)) => a.checked_div(b).map(Int).ok_or(EvalError::Overflow),

            (Self::Prefix, Str(a), Str(b)) => Ok(Bool(a.starts_with(&b))),
            (Self::Suffix, Str(a), Str(b)) => Ok(Bool(a.ends_with(&b))),

            (Self::Regex, Str(a), Str(b)) => {
                if !regexes_enabled {
                    return Err(EvalError::RegexDisabled);
                }
                Ok(Bool(cached_regex(&b)?.is_match(&a)))
            }

            (Self::And, Bool(a), Bool(b)) => Ok(Bool(a && b)),
            (Self::Or, Bool(a), Bool(b)) => Ok(Bool(a || b)),

            (Self::Contains, Set(a), Set(b)) => Ok(Bool(b.is_subset(&a))),
            (Self::Contains, Set(a), element) => {
                if element.is_set_element() {
                    Ok(Bool(a.contains(&element)))
                } else {
                    Err(EvalError::InvalidSetElement(element.type_name()))
                }
            }

            (Self::Intersection, Set(a), Set(b)) => {
                Ok(Set(a.intersection(&b).cloned().collect()))
            }
            (Self::Union, Set(a), Set(b)) => Ok(Set(a.union(&b).cloned().collect())),

            (op, l, r) => Err(EvalError::BinaryTypeMismatch {
                op: op.name(),
                left: l.type_name(),
                right: r.type_name(),
            }),
        }
    }
}

fn structural_equal(left: &Term, right: &Term) -> Result<bool, EvalError> {
    let comparable = matches!(
        (left, right),
        (Term::Symbol(_), Term::Symbol(_))
            | (Term::Int(_), Term::Int(_))
            | (Term::Str(_), Term::Str(_))
            | (Term::Date(_), Term::Date(_))
            | (Term::Bytes(_), Term::Bytes(_))
            | (Term::Bool(_), Term::Bool(_))
            | (Term::Set(_), Term::Set(_))
    );
    if comparable {
        Ok(left == right)
    } else {
        Err(EvalError::BinaryTypeMismatch {
            op: "==",
            left: left.type_name(),
            right: right.type_name(),
        })
    }
}

/// A guard expression tree.
///
/// Leaves are term literals or variables; internal nodes apply a unary or
/// binary operator. A guard passes iff it evaluates to exactly `true`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expression {
    /// A literal term, or a variable resolved from the current binding.
    Value(Term),
    /// A unary operator applied to a subexpression.
    Unary {
        /// The operator.
        op: UnaryOp,
        /// The operand.
        expr: Box<Expression>,
    },
    /// A binary operator applied to two subexpressions.
    Binary {
        /// The operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expression>,
        /// Right operand.
        right: Box<Expression>,
    },
}

impl Expression {
    /// Creates a literal or variable leaf.
    #[must_use]
    pub fn value(term: impl Into<Term>) -> Self {
        Self::Value(term.into())
    }

    fn unary(op: UnaryOp, expr: Self) -> Self {
        Self::Unary {
            op,
            expr: Box::new(expr),
        }
    }

    fn binary(op: BinaryOp, left: Self, right: Self) -> Self {
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Wraps this expression in parentheses.
    #[must_use]
    pub fn parens(self) -> Self {
        Self::unary(UnaryOp::Parens, self)
    }

    /// Logical not.
    #[must_use]
    pub fn negate(self) -> Self {
        Self::unary(UnaryOp::Negate, self)
    }

    /// Length of a string, byte string or set.
    #[must_use]
    pub fn length(self) -> Self {
        Self::unary(UnaryOp::Length, self)
    }

    /// Structural equality.
    #[must_use]
    pub fn equal(self, other: Self) -> Self {
        Self::binary(BinaryOp::Equal, self, other)
    }

    /// `<` on integers or dates.
    #[must_use]
    pub fn less_than(self, other: Self) -> Self {
        Self::binary(BinaryOp::LessThan, self, other)
    }

    /// `>` on integers or dates.
    #[must_use]
    pub fn greater_than(self, other: Self) -> Self {
        Self::binary(BinaryOp::GreaterThan, self, other)
    }

    /// `<=` on integers or dates.
    #[must_use]
    pub fn less_or_equal(self, other: Self) -> Self {
        Self::binary(BinaryOp::LessOrEqual, self, other)
    }

    /// `>=` on integers or dates.
    #[must_use]
    pub fn greater_or_equal(self, other: Self) -> Self {
        Self::binary(BinaryOp::GreaterOrEqual, self, other)
    }

    /// String prefix test.
    #[must_use]
    pub fn starts_with(self, other: Self) -> Self {
        Self::binary(BinaryOp::Prefix, self, other)
    }

    /// String suffix test.
    #[must_use]
    pub fn ends_with(self, other: Self) -> Self {
        Self::binary(BinaryOp::Suffix, self, other)
    }

    /// Regex substring match.
    #[must_use]
    pub fn matches(self, pattern: Self) -> Self {
        Self::binary(BinaryOp::Regex, self, pattern)
    }

    /// Boolean conjunction.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        Self::binary(BinaryOp::And, self, other)
    }

    /// Boolean disjunction.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self::binary(BinaryOp::Or, self, other)
    }

    /// Set membership or superset test.
    #[must_use]
    pub fn contains(self, other: Self) -> Self {
        Self::binary(BinaryOp::Contains, self, other)
    }

    /// Set intersection.
    #[must_use]
    pub fn intersection(self, other: Self) -> Self {
        Self::binary(BinaryOp::Intersection, self, other)
    }

    /// Set union.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self::binary(BinaryOp::Union, self, other)
    }

    /// Evaluates this expression against a binding.
    pub(crate) fn evaluate(
        &self,
        binding: &Binding,
        regexes_enabled: bool,
    ) -> Result<Term, EvalError> {
        match self {
            Self::Value(Term::Variable(v)) => binding
                .get(v)
                .cloned()
                .ok_or_else(|| EvalError::UnboundVariable(v.clone())),
            Self::Value(term) => Ok(term.clone()),
            Self::Unary { op, expr } => op.apply(expr.evaluate(binding, regexes_enabled)?),
            Self::Binary { op, left, right } => {
                let l = left.evaluate(binding, regexes_enabled)?;
                let r = right.evaluate(binding, regexes_enabled)?;
                op.apply(l, r, regexes_enabled)
            }
        }
    }

    /// Returns true iff the expression evaluates to exactly `true`.
    ///
    /// Evaluation errors count as failure.
    pub(crate) fn passes(&self, binding: &Binding, regexes_enabled: bool) -> bool {
        matches!(
            self.evaluate(binding, regexes_enabled),
            Ok(Term::Bool(true))
        )
    }

    /// Collects every variable name appearing in the tree.
    pub(crate) fn collect_variables(&self, out: &mut BTreeSet<String>) {
        match self {
            Self::Value(Term::Variable(v)) => {
                out.insert(v.clone());
            }
            Self::Value(_) => {}
            Self::Unary { expr, .. } => expr.collect_variables(out),
            Self::Binary { left, right, .. } => {
                left.collect_variables(out);
                right.collect_variables(out);
            }
        }
    }
}

impl From<Term> for Expression {
    fn from(term: Term) -> Self {
        Self::Value(term)
    }
}

impl ops::Add for Expression {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self::binary(BinaryOp::Add, self, other)
    }
}

impl ops::Sub for Expression {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self::binary(BinaryOp::Sub, self, other)
    }
}

impl ops::Mul for Expression {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        Self::binary(BinaryOp::Mul, self, other)
    }
}

impl ops::Div for Expression {
    type Output = Self;

    fn div(self, other: Self) -> Self {
        Self::binary(BinaryOp::Div, self, other)
    }
}

// Rendering is reconstructed from the tree; parenthesization is only shown
// where a Parens node was built.
impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(term) => write!(f, "{term}"),
            Self::Unary { op: UnaryOp::Parens, expr } => write!(f, "({expr})"),
            Self::Unary { op: UnaryOp::Negate, expr } => write!(f, "!{expr}"),
            Self::Unary { op: UnaryOp::Length, expr } => write!(f, "{expr}.length()"),
            Self::Binary { op, left, right } => {
                if op.is_infix() {
                    write!(f, "{left} {} {right}", op.name())
                } else {
                    write!(f, "{left}.{}({right})", op.name())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(expr: &Expression) -> Result<Term, EvalError> {
        expr.evaluate(&Binding::new(), true)
    }

    fn int(v: i64) -> Expression {
        Expression::value(Term::Int(v))
    }

    fn string(v: &str) -> Expression {
        Expression::value(Term::string(v))
    }

    #[test]
    fn arithmetic_keeps_standard_precedence_in_tree_form() {
        // 1 + 2 * 3 - 4 / 2 == 5
        let expr = (int(1) + int(2) * int(3) - int(4) / int(2)).equal(int(5));
        assert_eq!(eval(&expr), Ok(Term::Bool(true)));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert_eq!(eval(&(int(1) / int(0))), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn overflow_is_an_error() {
        assert_eq!(eval(&(int(i64::MAX) + int(1))), Err(EvalError::Overflow));
        assert_eq!(eval(&(int(i64::MIN) - int(1))), Err(EvalError::Overflow));
        assert_eq!(eval(&(int(i64::MAX) * int(2))), Err(EvalError::Overflow));
        assert_eq!(eval(&(int(i64::MIN) / int(-1))), Err(EvalError::Overflow));
    }

    #[test]
    fn equality_is_type_strict() {
        assert_eq!(eval(&int(1).equal(int(1))), Ok(Term::Bool(true)));
        assert!(matches!(
            eval(&int(1).equal(string("1"))),
            Err(EvalError::BinaryTypeMismatch { .. })
        ));
    }

    #[test]
    fn comparisons_cover_ints_and_dates() {
        use chrono::DateTime;

        let early = Expression::value(Term::date(DateTime::from_timestamp(1_575_452_801, 0).unwrap()));
        let late = Expression::value(Term::date(DateTime::from_timestamp(1_607_075_201, 0).unwrap()));
        assert_eq!(eval(&early.clone().less_than(late.clone())), Ok(Term::Bool(true)));
        assert_eq!(eval(&late.greater_or_equal(early)), Ok(Term::Bool(true)));

        assert!(matches!(
            eval(&int(1).less_than(string("2"))),
            Err(EvalError::BinaryTypeMismatch { .. })
        ));
    }

    #[test]
    fn string_operators() {
        assert_eq!(
            eval(&string("/a/file1.txt").starts_with(string("/a/"))),
            Ok(Term::Bool(true))
        );
        assert_eq!(
            eval(&string("/a/file1.txt").ends_with(string(".txt"))),
            Ok(Term::Bool(true))
        );
        assert_eq!(eval(&string("héllo").length()), Ok(Term::Int(5)));
    }

    #[test]
    fn regex_is_substring_match_and_gated() {
        let expr = string("abcdef").matches(string("c.e"));
        assert_eq!(expr.evaluate(&Binding::new(), true), Ok(Term::Bool(true)));
        assert_eq!(
            expr.evaluate(&Binding::new(), false),
            Err(EvalError::RegexDisabled)
        );

        let invalid = string("abc").matches(string("("));
        assert!(matches!(
            invalid.evaluate(&Binding::new(), true),
            Err(EvalError::InvalidRegex(_))
        ));
    }

    #[test]
    fn set_operators() {
        let set = |items: Vec<Term>| Expression::value(Term::set(items).unwrap());

        let one_two = set(vec![Term::Int(1), Term::Int(2)]);
        assert_eq!(
            eval(&one_two.clone().contains(int(2))),
            Ok(Term::Bool(true))
        );
        // type-strict membership: "2" is not 2
        assert_eq!(
            eval(&one_two.clone().contains(string("2"))),
            Ok(Term::Bool(false))
        );

        let two = set(vec![Term::Int(2)]);
        assert_eq!(
            eval(&one_two.clone().contains(two.clone())),
            Ok(Term::Bool(true))
        );

        let two_three = set(vec![Term::Int(2), Term::Int(3)]);
        assert_eq!(
            eval(&one_two.clone().intersection(two_three.clone())),
            Ok(Term::set([Term::Int(2)]).unwrap())
        );
        assert_eq!(
            eval(&one_two.union(two_three)),
            Ok(Term::set([Term::Int(1), Term::Int(2), Term::Int(3)]).unwrap())
        );

        assert_eq!(eval(&two.length()), Ok(Term::Int(1)));
    }

    #[test]
    fn boolean_operators_are_strict() {
        let t = Expression::value(Term::Bool(true));
        let f = Expression::value(Term::Bool(false));
        assert_eq!(eval(&t.clone().and(f.clone())), Ok(Term::Bool(false)));
        assert_eq!(eval(&t.clone().or(f.clone())), Ok(Term::Bool(true)));
        assert_eq!(eval(&f.negate()), Ok(Term::Bool(true)));
        assert!(matches!(
            eval(&t.and(int(1))),
            Err(EvalError::BinaryTypeMismatch { .. })
        ));
    }

    #[test]
    fn variables_resolve_from_the_binding() {
        let mut binding = Binding::new();
        binding.bind("x", &Term::Int(41));

        let expr = Expression::value(Term::variable("x")) + int(1);
        assert_eq!(expr.evaluate(&binding, true), Ok(Term::Int(42)));

        let unbound = Expression::value(Term::variable("y"));
        assert_eq!(
            unbound.evaluate(&Binding::new(), true),
            Err(EvalError::UnboundVariable("y".to_string()))
        );
    }

    #[test]
    fn guard_passes_only_on_true() {
        let mut binding = Binding::new();
        binding.bind("x", &Term::Int(1));

        assert!(Expression::value(Term::variable("x")).equal(int(1)).passes(&binding, true));
        assert!(!Expression::value(Term::variable("x")).equal(int(2)).passes(&binding, true));
        // a bare non-boolean value is not a passing guard
        assert!(!int(1).passes(&binding, true));
        // errors fail the guard rather than escaping
        assert!(!(int(1) / int(0)).passes(&binding, true));
    }

    #[test]
    fn display_renders_infix_and_method_forms() {
        let expr = (int(1) + int(2)).parens().equal(int(3));
        assert_eq!(expr.to_string(), "(1 + 2) == 3");

        let method = string("abc").matches(string("a.*"));
        assert_eq!(method.to_string(), "\"abc\".matches(\"a.*\")");
    }

    #[test]
    fn collect_variables_walks_the_tree() {
        let expr = Expression::value(Term::variable("a"))
            .less_than(Expression::value(Term::variable("b")) + int(1));
        let mut vars = BTreeSet::new();
        expr.collect_variables(&mut vars);
        assert_eq!(vars.len(), 2);
        assert!(vars.contains("a") && vars.contains("b"));
    }
}
