use std::fmt;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use tabula_types::{Value, ValueKind};

use crate::context::{math_config, MathConfig};
use crate::error::{MathError, Result};

/// The numeric kinds that take part in promotion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NumericKind {
    Long,
    Double,
    BigInt,
    Decimal,
}

impl NumericKind {
    /// The numeric kind of a value kind, if it has one.
    pub fn of(kind: ValueKind) -> Option<Self> {
        match kind {
            ValueKind::Long => Some(Self::Long),
            ValueKind::Double => Some(Self::Double),
            ValueKind::BigInt => Some(Self::BigInt),
            ValueKind::Decimal => Some(Self::Decimal),
            _ => None,
        }
    }

    pub fn value_kind(&self) -> ValueKind {
        match self {
            Self::Long => ValueKind::Long,
            Self::Double => ValueKind::Double,
            Self::BigInt => ValueKind::BigInt,
            Self::Decimal => ValueKind::Decimal,
        }
    }
}

/// Result kind of combining two numeric kinds.
///
/// Same kinds stay. A long widens to a double or a big integer. A double
/// mixed with a big integer, or anything mixed with a decimal, becomes a
/// decimal. The table is symmetric.
pub fn promote(a: NumericKind, b: NumericKind) -> NumericKind {
    use NumericKind::*;
    match (a, b) {
        (x, y) if x == y => x,
        (Decimal, _) | (_, Decimal) => Decimal,
        (Long, Double) | (Double, Long) => Double,
        (Long, BigInt) | (BigInt, Long) => BigInt,
        (Double, BigInt) | (BigInt, Double) => Decimal,
        _ => Decimal,
    }
}

/// Result kind of combining two values, failing on any non-numeric operand.
pub fn promote_values(a: &Value, b: &Value) -> Result<NumericKind> {
    Ok(promote(numeric_kind(a)?, numeric_kind(b)?))
}

fn numeric_kind(v: &Value) -> Result<NumericKind> {
    NumericKind::of(v.kind()).ok_or(MathError::NotNumeric(v.kind()))
}

/// Arithmetic operators over cell values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl Op {
    pub const ALL: [Op; 5] = [Op::Add, Op::Sub, Op::Mul, Op::Div, Op::Rem];
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Rem => "%",
        };
        f.write_str(s)
    }
}

/// Apply `op` under the process-wide decimal context.
pub fn apply(op: Op, lhs: &Value, rhs: &Value) -> Result<Value> {
    apply_with(op, lhs, rhs, &math_config())
}

/// Apply `op` under an explicit decimal context.
pub fn apply_with(op: Op, lhs: &Value, rhs: &Value, ctx: &MathConfig) -> Result<Value> {
    match promote_values(lhs, rhs)? {
        NumericKind::Long => {
            let (a, b) = (as_long(lhs), as_long(rhs));
            long_op(op, a, b).map(Value::Long)
        }
        NumericKind::Double => {
            let a = lhs.to_f64().ok_or(MathError::NotNumeric(lhs.kind()))?;
            let b = rhs.to_f64().ok_or(MathError::NotNumeric(rhs.kind()))?;
            Ok(Value::Double(double_op(op, a, b)))
        }
        NumericKind::BigInt => {
            let a = as_bigint(lhs)?;
            let b = as_bigint(rhs)?;
            bigint_op(op, &a, &b).map(Value::BigInt)
        }
        NumericKind::Decimal => {
            let a = as_decimal(lhs, ctx)?;
            let b = as_decimal(rhs, ctx)?;
            decimal_op(op, &a, &b, ctx).map(Value::Decimal)
        }
    }
}

fn as_long(v: &Value) -> i64 {
    match v {
        Value::Long(x) => *x,
        _ => 0,
    }
}

fn as_bigint(v: &Value) -> Result<BigInt> {
    match v {
        Value::Long(x) => Ok(BigInt::from(*x)),
        Value::BigInt(x) => Ok(x.clone()),
        other => Err(MathError::NotNumeric(other.kind())),
    }
}

/// Decimal form of an operand. Non-decimal operands are rounded to the
/// context on the way in; decimal operands are taken as they are.
fn as_decimal(v: &Value, ctx: &MathConfig) -> Result<BigDecimal> {
    match v {
        Value::Decimal(x) => Ok(x.clone()),
        Value::Double(x) if !x.is_finite() => Err(MathError::NotRepresentable(x.to_string())),
        other => other
            .to_decimal()
            .map(|d| ctx.round(d))
            .ok_or(MathError::NotNumeric(other.kind())),
    }
}

fn long_op(op: Op, a: i64, b: i64) -> Result<i64> {
    match op {
        Op::Add => Ok(a.wrapping_add(b)),
        Op::Sub => Ok(a.wrapping_sub(b)),
        Op::Mul => Ok(a.wrapping_mul(b)),
        Op::Div if b == 0 => Err(MathError::DivisionByZero),
        Op::Div => Ok(a.wrapping_div(b)),
        Op::Rem if b == 0 => Err(MathError::DivisionByZero),
        Op::Rem => Ok(a.wrapping_rem(b)),
    }
}

fn double_op(op: Op, a: f64, b: f64) -> f64 {
    match op {
        Op::Add => a + b,
        Op::Sub => a - b,
        Op::Mul => a * b,
        Op::Div => a / b,
        Op::Rem => a % b,
    }
}

fn bigint_op(op: Op, a: &BigInt, b: &BigInt) -> Result<BigInt> {
    match op {
        Op::Add => Ok(a + b),
        Op::Sub => Ok(a - b),
        Op::Mul => Ok(a * b),
        Op::Div | Op::Rem if b.is_zero() => Err(MathError::DivisionByZero),
        Op::Div => Ok(a / b),
        Op::Rem => Ok(a % b),
    }
}

/// Exact except for division, which is rounded to `ctx`.
fn decimal_op(op: Op, a: &BigDecimal, b: &BigDecimal, ctx: &MathConfig) -> Result<BigDecimal> {
    match op {
        Op::Add => Ok(a + b),
        Op::Sub => Ok(a - b),
        Op::Mul => Ok(a * b),
        Op::Div | Op::Rem if b.is_zero() => Err(MathError::DivisionByZero),
        Op::Div => Ok(ctx.round(a / b)),
        Op::Rem => Ok(a % b),
    }
}

/// Sum of the numeric values in `values`, skipping everything else.
///
/// Returns [`Value::Empty`] when no numeric value is present.
pub fn sum<'a, I>(values: I) -> Result<Value>
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut acc = Value::Empty;
    for v in values.into_iter().filter(|v| v.is_numeric()) {
        acc = if acc.is_empty() { v.clone() } else { apply(Op::Add, &acc, v)? };
    }
    Ok(acc)
}

/// Largest numeric value in `values`, or [`Value::Empty`].
pub fn max<'a, I>(values: I) -> Value
where
    I: IntoIterator<Item = &'a Value>,
{
    values
        .into_iter()
        .filter(|v| v.is_numeric())
        .max_by(|a, b| tabula_types::compare_values(a, b))
        .cloned()
        .unwrap_or_default()
}

/// Smallest numeric value in `values`, or [`Value::Empty`].
pub fn min<'a, I>(values: I) -> Value
where
    I: IntoIterator<Item = &'a Value>,
{
    values
        .into_iter()
        .filter(|v| v.is_numeric())
        .min_by(|a, b| tabula_types::compare_values(a, b))
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Value {
        Value::Decimal(BigDecimal::from_str(s).unwrap())
    }

    fn big(v: i64) -> Value {
        Value::BigInt(BigInt::from(v))
    }

    fn sample(kind: NumericKind) -> Value {
        match kind {
            NumericKind::Long => Value::Long(7),
            NumericKind::Double => Value::Double(2.5),
            NumericKind::BigInt => big(3),
            NumericKind::Decimal => dec("1.25"),
        }
    }

    fn any_kind() -> impl Strategy<Value = NumericKind> {
        prop_oneof![
            Just(NumericKind::Long),
            Just(NumericKind::Double),
            Just(NumericKind::BigInt),
            Just(NumericKind::Decimal),
        ]
    }

    fn any_op() -> impl Strategy<Value = Op> {
        prop_oneof![Just(Op::Add), Just(Op::Sub), Just(Op::Mul), Just(Op::Div), Just(Op::Rem)]
    }

    // ---- Test 1: promotion table ----
    #[test]
    fn promotion_table() {
        use NumericKind::*;
        assert_eq!(promote(Long, Long), Long);
        assert_eq!(promote(Double, Double), Double);
        assert_eq!(promote(Long, Double), Double);
        assert_eq!(promote(Long, BigInt), BigInt);
        assert_eq!(promote(Double, BigInt), Decimal);
        assert_eq!(promote(Decimal, Long), Decimal);
        assert_eq!(promote(Double, Decimal), Decimal);
    }

    // ---- Test 2: same kinds stay ----
    #[test]
    fn same_kind_arithmetic() {
        let ctx = MathConfig::decimal64();
        assert_eq!(apply_with(Op::Add, &Value::Long(2), &Value::Long(3), &ctx).unwrap(), Value::Long(5));
        assert_eq!(apply_with(Op::Div, &Value::Long(7), &Value::Long(2), &ctx).unwrap(), Value::Long(3));
        assert_eq!(apply_with(Op::Rem, &Value::Long(-7), &Value::Long(2), &ctx).unwrap(), Value::Long(-1));
        assert_eq!(
            apply_with(Op::Mul, &Value::Double(1.5), &Value::Double(2.0), &ctx).unwrap(),
            Value::Double(3.0)
        );
        assert_eq!(apply_with(Op::Sub, &big(10), &big(4), &ctx).unwrap(), big(6));
    }

    // ---- Test 3: long overflow wraps ----
    #[test]
    fn long_overflow_wraps() {
        let ctx = MathConfig::decimal64();
        let r = apply_with(Op::Add, &Value::Long(i64::MAX), &Value::Long(1), &ctx).unwrap();
        assert_eq!(r, Value::Long(i64::MIN));
    }

    // ---- Test 4: mixed kinds promote ----
    #[test]
    fn mixed_kinds_promote() {
        let ctx = MathConfig::decimal64();
        assert_eq!(apply_with(Op::Add, &Value::Long(1), &Value::Double(0.5), &ctx).unwrap(), Value::Double(1.5));
        assert_eq!(apply_with(Op::Add, &Value::Long(1), &big(2), &ctx).unwrap(), big(3));
        assert_eq!(apply_with(Op::Add, &Value::Double(0.1), &big(1), &ctx).unwrap(), dec("1.1"));
        assert_eq!(apply_with(Op::Mul, &dec("1.5"), &Value::Long(2), &ctx).unwrap(), dec("3.0"));
    }

    // ---- Test 5: decimal division follows the context, the rest is exact ----
    #[test]
    fn decimal_division_rounds() {
        let ctx = MathConfig::decimal32();
        let r = apply_with(Op::Div, &dec("1"), &dec("3"), &ctx).unwrap();
        assert_eq!(r, dec("0.3333333"));
        let r = apply_with(Op::Div, &dec("2"), &dec("3"), &ctx).unwrap();
        assert_eq!(r, dec("0.6666667"));

        // Seven digits of precision do not truncate these.
        assert_eq!(apply_with(Op::Mul, &dec("1234.5678"), &dec("2"), &ctx).unwrap(), dec("2469.1356"));
        assert_eq!(apply_with(Op::Add, &dec("1234567.8"), &dec("0.01"), &ctx).unwrap(), dec("1234567.81"));
        assert_eq!(apply_with(Op::Sub, &dec("1234567.8"), &dec("0.01"), &ctx).unwrap(), dec("1234567.79"));
    }

    // ---- Test 6: division by zero ----
    #[test]
    fn division_by_zero() {
        let ctx = MathConfig::decimal64();
        assert_eq!(apply_with(Op::Div, &Value::Long(1), &Value::Long(0), &ctx), Err(MathError::DivisionByZero));
        assert_eq!(apply_with(Op::Rem, &big(1), &big(0), &ctx), Err(MathError::DivisionByZero));
        assert_eq!(apply_with(Op::Div, &dec("1"), &dec("0.00"), &ctx), Err(MathError::DivisionByZero));
        match apply_with(Op::Div, &Value::Double(1.0), &Value::Double(0.0), &ctx).unwrap() {
            Value::Double(v) => assert!(v.is_infinite()),
            other => panic!("unexpected {other:?}"),
        }
    }

    // ---- Test 7: non-numeric operands fail ----
    #[test]
    fn non_numeric_fails() {
        let ctx = MathConfig::decimal64();
        assert_eq!(
            apply_with(Op::Add, &Value::Empty, &Value::Long(1), &ctx),
            Err(MathError::NotNumeric(ValueKind::Empty))
        );
        assert_eq!(
            apply_with(Op::Add, &Value::Long(1), &Value::from("x"), &ctx),
            Err(MathError::NotNumeric(ValueKind::Text))
        );
        assert!(matches!(
            apply_with(Op::Add, &Value::Double(f64::NAN), &dec("1"), &ctx),
            Err(MathError::NotRepresentable(_))
        ));
    }

    // ---- Test 8: decimal remainder keeps the dividend's sign ----
    #[test]
    fn decimal_remainder() {
        let ctx = MathConfig::decimal64();
        assert_eq!(apply_with(Op::Rem, &dec("7.5"), &dec("2"), &ctx).unwrap(), dec("1.5"));
        assert_eq!(apply_with(Op::Rem, &dec("-7.5"), &dec("2"), &ctx).unwrap(), dec("-1.5"));
    }

    // ---- Test 9: aggregates ----
    #[test]
    fn aggregates_skip_non_numeric() {
        let values = vec![Value::Long(1), Value::from("x"), Value::Double(2.5), Value::Empty];
        assert_eq!(sum(&values).unwrap(), Value::Double(3.5));
        assert_eq!(max(&values), Value::Double(2.5));
        assert_eq!(min(&values), Value::Long(1));
        assert_eq!(sum(&[Value::from("x")]).unwrap(), Value::Empty);
    }

    proptest! {
        #[test]
        fn promotion_is_commutative(a in any_kind(), b in any_kind(), op in any_op()) {
            let ctx = MathConfig::decimal64();
            let expected = promote(a, b).value_kind();
            prop_assert_eq!(promote(a, b), promote(b, a));
            let ab = apply_with(op, &sample(a), &sample(b), &ctx).unwrap();
            let ba = apply_with(op, &sample(b), &sample(a), &ctx).unwrap();
            prop_assert_eq!(ab.kind(), expected);
            prop_assert_eq!(ba.kind(), expected);
        }

        #[test]
        fn long_addition_matches_wrapping(a in any::<i64>(), b in any::<i64>()) {
            let ctx = MathConfig::decimal64();
            let r = apply_with(Op::Add, &Value::Long(a), &Value::Long(b), &ctx).unwrap();
            prop_assert_eq!(r, Value::Long(a.wrapping_add(b)));
        }
    }
}
