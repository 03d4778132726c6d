use chrono::{Days, Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use tabula_types::Value;

use crate::error::{MathError, Result};

/// A calendar amount: whole months followed by whole days.
///
/// Years fold into months. Applying a period adds the months first (clamping
/// to the end of a shorter month) and then the days.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    pub months: i32,
    pub days: i64,
}

impl Period {
    pub fn new(years: i32, months: i32, days: i64) -> Self {
        Self { months: years * 12 + months, days }
    }

    pub fn years(years: i32) -> Self {
        Self::new(years, 0, 0)
    }

    pub fn months(months: i32) -> Self {
        Self::new(0, months, 0)
    }

    pub fn days(days: i64) -> Self {
        Self::new(0, 0, days)
    }

    pub fn negated(&self) -> Self {
        Self { months: -self.months, days: -self.days }
    }

    pub fn is_zero(&self) -> bool {
        self.months == 0 && self.days == 0
    }
}

/// A temporal amount to add to or subtract from a temporal value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Amount {
    Period(Period),
    Duration(Duration),
}

impl Amount {
    fn name(&self) -> &'static str {
        match self {
            Amount::Period(_) => "period",
            Amount::Duration(_) => "duration",
        }
    }

    fn negated(&self) -> Self {
        match self {
            Amount::Period(p) => Amount::Period(p.negated()),
            Amount::Duration(d) => Amount::Duration(-*d),
        }
    }
}

impl From<Period> for Amount {
    fn from(p: Period) -> Self {
        Amount::Period(p)
    }
}

impl From<Duration> for Amount {
    fn from(d: Duration) -> Self {
        Amount::Duration(d)
    }
}

/// Add `amount` to a temporal value.
///
/// Dates take periods only, times take durations only, date-times and
/// zoned date-times take both. Anything else fails.
pub fn plus(value: &Value, amount: impl Into<Amount>) -> Result<Value> {
    let amount = amount.into();
    let incompatible = || MathError::IncompatibleTemporal { kind: value.kind(), amount: amount.name() };
    match (value, amount) {
        (Value::Date(d), Amount::Period(p)) => date_plus(*d, p).map(Value::Date),
        (Value::Time(t), Amount::Duration(d)) => Ok(Value::Time(t.overflowing_add_signed(d).0)),
        (Value::DateTime(dt), Amount::Period(p)) => {
            let date = date_plus(dt.date(), p)?;
            Ok(Value::DateTime(date.and_time(dt.time())))
        }
        (Value::DateTime(dt), Amount::Duration(d)) => dt
            .checked_add_signed(d)
            .map(Value::DateTime)
            .ok_or(MathError::TemporalOverflow),
        (Value::Zoned(z), Amount::Period(p)) => {
            let z = if p.months >= 0 {
                z.checked_add_months(Months::new(p.months.unsigned_abs()))
            } else {
                z.checked_sub_months(Months::new(p.months.unsigned_abs()))
            }
            .ok_or(MathError::TemporalOverflow)?;
            let z = if p.days >= 0 {
                z.checked_add_days(Days::new(p.days.unsigned_abs()))
            } else {
                z.checked_sub_days(Days::new(p.days.unsigned_abs()))
            };
            z.map(Value::Zoned).ok_or(MathError::TemporalOverflow)
        }
        (Value::Zoned(z), Amount::Duration(d)) => z
            .checked_add_signed(d)
            .map(Value::Zoned)
            .ok_or(MathError::TemporalOverflow),
        _ => Err(incompatible()),
    }
}

/// Subtract `amount` from a temporal value.
pub fn minus(value: &Value, amount: impl Into<Amount>) -> Result<Value> {
    plus(value, amount.into().negated())
}

fn shift_months(date: NaiveDate, months: i32) -> Result<NaiveDate> {
    let shifted = if months >= 0 {
        date.checked_add_months(Months::new(months.unsigned_abs()))
    } else {
        date.checked_sub_months(Months::new(months.unsigned_abs()))
    };
    shifted.ok_or(MathError::TemporalOverflow)
}

fn date_plus(date: NaiveDate, period: Period) -> Result<NaiveDate> {
    let date = shift_months(date, period.months)?;
    let shifted = if period.days >= 0 {
        date.checked_add_days(Days::new(period.days.unsigned_abs()))
    } else {
        date.checked_sub_days(Days::new(period.days.unsigned_abs()))
    };
    shifted.ok_or(MathError::TemporalOverflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveTime, TimeZone};
    use tabula_types::ValueKind;

    fn date(y: i32, m: u32, d: u32) -> Value {
        Value::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    // ---- Test 1: dates take periods ----
    #[test]
    fn date_plus_period() {
        assert_eq!(plus(&date(2024, 1, 31), Period::months(1)).unwrap(), date(2024, 2, 29));
        assert_eq!(plus(&date(2024, 1, 1), Period::new(1, 2, 3)).unwrap(), date(2025, 3, 4));
        assert_eq!(minus(&date(2024, 3, 1), Period::days(1)).unwrap(), date(2024, 2, 29));
    }

    // ---- Test 2: times take durations and wrap ----
    #[test]
    fn time_plus_duration() {
        let t = Value::Time(NaiveTime::from_hms_opt(23, 30, 0).unwrap());
        let r = plus(&t, Duration::hours(1)).unwrap();
        assert_eq!(r, Value::Time(NaiveTime::from_hms_opt(0, 30, 0).unwrap()));
    }

    // ---- Test 3: mismatches fail ----
    #[test]
    fn mismatched_amounts_fail() {
        let t = Value::Time(NaiveTime::from_hms_opt(10, 0, 0).unwrap());
        assert_eq!(
            plus(&t, Period::days(1)),
            Err(MathError::IncompatibleTemporal { kind: ValueKind::Time, amount: "period" })
        );
        assert!(plus(&date(2024, 1, 1), Duration::hours(1)).is_err());
        assert!(plus(&Value::Long(1), Duration::hours(1)).is_err());
    }

    // ---- Test 4: date-times take both ----
    #[test]
    fn datetime_takes_both() {
        let dt = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap().and_hms_opt(12, 0, 0).unwrap();
        let v = Value::DateTime(dt);
        let r = plus(&v, Period::months(1)).unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap().and_hms_opt(12, 0, 0).unwrap();
        assert_eq!(r, Value::DateTime(expected));
        let r = plus(&v, Duration::hours(12)).unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(r, Value::DateTime(expected));
    }

    // ---- Test 5: zoned values keep their offset ----
    #[test]
    fn zoned_keeps_offset() {
        let tz = FixedOffset::east_opt(3600).unwrap();
        let z = tz.with_ymd_and_hms(2024, 1, 31, 8, 0, 0).unwrap();
        let r = plus(&Value::Zoned(z), Period::new(0, 1, 1)).unwrap();
        assert_eq!(r, Value::Zoned(tz.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()));
        let r = minus(&Value::Zoned(z), Duration::minutes(30)).unwrap();
        assert_eq!(r, Value::Zoned(tz.with_ymd_and_hms(2024, 1, 31, 7, 30, 0).unwrap()));
    }
}
