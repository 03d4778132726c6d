use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use num_bigint::BigInt;

use crate::value::Value;

/// Typed extraction of a cell value.
///
/// Extraction succeeds only when the value already has the requested kind;
/// no conversion is attempted. Empty never extracts.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> Option<Self> {
                    match value {
                        Value::$variant(v) => Some(v.clone()),
                        _ => None,
                    }
                }
            }
        )*
    };
}

from_value! {
    bool => Bool,
    String => Text,
    i64 => Long,
    f64 => Double,
    BigInt => BigInt,
    BigDecimal => Decimal,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => DateTime,
    DateTime<FixedOffset> => Zoned,
}

/// Any non-empty value.
impl FromValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        if value.is_empty() {
            None
        } else {
            Some(value.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_requires_matching_kind() {
        let v = Value::from(42i64);
        assert_eq!(i64::from_value(&v), Some(42));
        assert_eq!(f64::from_value(&v), None);
        assert_eq!(String::from_value(&v), None);
        assert_eq!(Value::from_value(&v), Some(v.clone()));
        assert_eq!(Value::from_value(&Value::Empty), None);
    }
}
