use std::cmp::Ordering;
use std::fmt;

use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TypeError};

/// A typed cell value.
///
/// [`Value::Empty`] is the absence sentinel: a cell that was never written and
/// a cell whose value was cleared are indistinguishable.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Empty,
    Bool(bool),
    Text(String),
    Long(i64),
    Double(f64),
    BigInt(BigInt),
    Decimal(BigDecimal),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Zoned(DateTime<FixedOffset>),
}

/// The kind of a [`Value`], without its payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValueKind {
    Empty,
    Bool,
    Text,
    Long,
    Double,
    BigInt,
    Decimal,
    Date,
    Time,
    DateTime,
    Zoned,
}

impl ValueKind {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Long | Self::Double | Self::BigInt | Self::Decimal)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, Self::Date | Self::Time | Self::DateTime | Self::Zoned)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Empty => "empty",
            Self::Bool => "bool",
            Self::Text => "text",
            Self::Long => "long",
            Self::Double => "double",
            Self::BigInt => "bigint",
            Self::Decimal => "decimal",
            Self::Date => "date",
            Self::Time => "time",
            Self::DateTime => "datetime",
            Self::Zoned => "zoned",
        };
        f.write_str(s)
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Empty => ValueKind::Empty,
            Self::Bool(_) => ValueKind::Bool,
            Self::Text(_) => ValueKind::Text,
            Self::Long(_) => ValueKind::Long,
            Self::Double(_) => ValueKind::Double,
            Self::BigInt(_) => ValueKind::BigInt,
            Self::Decimal(_) => ValueKind::Decimal,
            Self::Date(_) => ValueKind::Date,
            Self::Time(_) => ValueKind::Time,
            Self::DateTime(_) => ValueKind::DateTime,
            Self::Zoned(_) => ValueKind::Zoned,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn is_numeric(&self) -> bool {
        self.kind().is_numeric()
    }

    pub fn is_temporal(&self) -> bool {
        self.kind().is_temporal()
    }

    /// Exact decimal form of a numeric value.
    ///
    /// Returns `None` for non-numeric values and for NaN or infinite doubles.
    pub fn to_decimal(&self) -> Option<BigDecimal> {
        match self {
            Self::Long(v) => Some(BigDecimal::from(*v)),
            Self::BigInt(v) => Some(BigDecimal::new(v.clone(), 0)),
            Self::Decimal(v) => Some(v.clone()),
            Self::Double(v) if v.is_finite() => v.to_string().parse().ok(),
            _ => None,
        }
    }

    /// Lossy float form of a numeric value.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Self::Long(v) => Some(*v as f64),
            Self::Double(v) => Some(*v),
            Self::BigInt(v) => v.to_f64(),
            Self::Decimal(v) => v.to_f64(),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
            Self::Long(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::BigInt(v) => write!(f, "{v}"),
            Self::Decimal(v) => write!(f, "{v}"),
            Self::Date(v) => write!(f, "{v}"),
            Self::Time(v) => write!(f, "{v}"),
            Self::DateTime(v) => write!(f, "{v}"),
            Self::Zoned(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}

/// Total ordering over values.
///
/// Empty sorts before everything. Numbers compare numerically across kinds
/// and sort before any non-number. All remaining pairs compare by their
/// display form.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        _ => {}
    }
    match (a.is_numeric(), b.is_numeric()) {
        (true, true) => compare_numeric(a, b),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.to_string().cmp(&b.to_string()),
    }
}

fn compare_numeric(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Long(x), Value::Long(y)) => x.cmp(y),
        (Value::Double(x), Value::Double(y)) => x.total_cmp(y),
        (Value::BigInt(x), Value::BigInt(y)) => x.cmp(y),
        _ => match (a.to_decimal(), b.to_decimal()) {
            (Some(x), Some(y)) => x.cmp(&y),
            // NaN or infinity on one side
            _ => {
                let x = a.to_f64().unwrap_or(f64::NAN);
                let y = b.to_f64().unwrap_or(f64::NAN);
                x.total_cmp(&y)
            }
        },
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    String => Text,
    &str => Text,
    i64 => Long,
    i32 => Long,
    i16 => Long,
    i8 => Long,
    u32 => Long,
    u16 => Long,
    u8 => Long,
    f64 => Double,
    f32 => Double,
    BigInt => BigInt,
    BigDecimal => Decimal,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => DateTime,
    DateTime<FixedOffset> => Zoned,
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(v) => Value::Long(v),
            Err(_) => Value::BigInt(BigInt::from(v)),
        }
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Empty
    }
}

impl From<&Value> for Value {
    fn from(v: &Value) -> Self {
        v.clone()
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Empty)
    }
}

impl TryFrom<serde_json::Value> for Value {
    type Error = TypeError;

    fn try_from(json: serde_json::Value) -> Result<Self> {
        match json {
            serde_json::Value::Null => Ok(Value::Empty),
            serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
            serde_json::Value::String(s) => Ok(Value::Text(s)),
            serde_json::Value::Number(n) => {
                if let Some(v) = n.as_i64() {
                    Ok(Value::Long(v))
                } else if let Some(v) = n.as_u64() {
                    Ok(Value::BigInt(BigInt::from(v)))
                } else if let Some(v) = n.as_f64() {
                    Ok(Value::Double(v))
                } else {
                    Err(TypeError::UnsupportedValue(n.to_string()))
                }
            }
            serde_json::Value::Array(_) => {
                Err(TypeError::UnsupportedValue("array".to_string()))
            }
            serde_json::Value::Object(_) => {
                Err(TypeError::UnsupportedValue("object".to_string()))
            }
        }
    }
}
