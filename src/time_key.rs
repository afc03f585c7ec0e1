//! Time keys and interval decomposition
//!
//! A [`TimeKey`] addresses one unit of work: an instant plus the strftime
//! pattern used to render it into paths and URLs. An [`Interval`] turns a
//! `[start, end]` range and a [`Step`] into the ordered keys covering it.
//!
//! Calendar steps are computed from the range start (`start + k months`) rather
//! than by repeated addition, so a month-end start keeps its day-of-month where
//! the target month has it: `2021-01-31` steps to `02-28`, `03-31`, `04-30`.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use chrono::{Datelike, Months, NaiveDate, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// strftime pattern used to render a [`TimeKey`]
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyFormat(String);

impl KeyFormat {
    /// Create a format from any chrono strftime pattern
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    /// `YYYYMMDD`
    pub fn daily() -> Self {
        Self::new("%Y%m%d")
    }

    /// `YYYYMM`
    pub fn monthly() -> Self {
        Self::new("%Y%m")
    }

    /// `YYYY`
    pub fn yearly() -> Self {
        Self::new("%Y")
    }

    /// The raw strftime pattern
    pub fn pattern(&self) -> &str {
        &self.0
    }
}

impl Default for KeyFormat {
    fn default() -> Self {
        Self::daily()
    }
}

/// A discrete point in time plus its rendering rule
///
/// Two keys are equal iff both the instant and the format are equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TimeKey {
    instant: NaiveDateTime,
    format: KeyFormat,
}

impl TimeKey {
    /// Create a key for `instant` rendered with `format`
    pub fn new(instant: NaiveDateTime, format: KeyFormat) -> Self {
        Self { instant, format }
    }

    /// The underlying instant
    pub fn instant(&self) -> NaiveDateTime {
        self.instant
    }

    /// The calendar date of the instant
    pub fn date(&self) -> NaiveDate {
        self.instant.date()
    }

    /// The rendering rule attached to this key
    pub fn format(&self) -> &KeyFormat {
        &self.format
    }

    /// Render with the key's own format
    pub fn render(&self) -> String {
        self.instant.format(self.format.pattern()).to_string()
    }

    /// Render with an ad-hoc pattern, leaving the key's own format untouched
    pub fn render_with(&self, pattern: &str) -> String {
        self.instant.format(pattern).to_string()
    }

    /// `YYYYDDD` with a zero-padded ordinal day, as used by catalogues indexed by day-of-year
    pub fn day_of_year(&self) -> String {
        format!("{}{:03}", self.instant.year(), self.instant.ordinal())
    }
}

impl fmt::Display for TimeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Sampling granularity of an interval
///
/// Serialized as `{"fixed": <seconds>}`, `{"months": n}` or `{"years": n}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Additive step of constant length
    Fixed(#[serde(with = "crate::config::duration_serde")] Duration),
    /// Calendar months
    Months(u32),
    /// Calendar years
    Years(u32),
}

impl Step {
    /// Fixed step of `n` days
    pub fn days(n: u64) -> Self {
        Step::Fixed(Duration::from_secs(n * 86_400))
    }

    /// Fixed step of `n` hours
    pub fn hours(n: u64) -> Self {
        Step::Fixed(Duration::from_secs(n * 3_600))
    }

    /// Fixed step of `n` minutes
    pub fn minutes(n: u64) -> Self {
        Step::Fixed(Duration::from_secs(n * 60))
    }

    /// Calendar step of `n` months
    pub fn months(n: u32) -> Self {
        Step::Months(n)
    }

    /// Calendar step of `n` years
    pub fn years(n: u32) -> Self {
        Step::Years(n)
    }

    /// Reject empty steps and fixed steps finer than `min_resolution`.
    ///
    /// Calendar steps are always coarser than any sub-month resolution.
    pub fn validate(&self, min_resolution: Option<Duration>) -> Result<()> {
        match *self {
            Step::Fixed(d) if d.is_zero() => {
                Err(Error::InvalidStep("fixed step must be non-zero".into()))
            }
            Step::Fixed(d) => match min_resolution {
                Some(min) if d < min => Err(Error::InvalidStep(format!(
                    "step of {}s is finer than the minimum resolution of {}s",
                    d.as_secs_f64(),
                    min.as_secs_f64()
                ))),
                _ => Ok(()),
            },
            Step::Months(0) | Step::Years(0) => {
                Err(Error::InvalidStep("calendar step must be non-zero".into()))
            }
            Step::Months(_) | Step::Years(_) => Ok(()),
        }
    }

    /// The `k`-th instant after `start`, or `None` on overflow
    fn nth(&self, start: NaiveDateTime, k: u32) -> Option<NaiveDateTime> {
        match *self {
            Step::Fixed(d) => {
                let delta = TimeDelta::from_std(d.checked_mul(k)?).ok()?;
                start.checked_add_signed(delta)
            }
            Step::Months(n) => start.checked_add_months(Months::new(n.checked_mul(k)?)),
            Step::Years(n) => {
                start.checked_add_months(Months::new(n.checked_mul(12)?.checked_mul(k)?))
            }
        }
    }
}

/// An inclusive `[start, end]` range of instants
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeRange {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl TimeRange {
    /// Create a range, rejecting `start > end`
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self> {
        if start > end {
            return Err(Error::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Whole-day range from midnight of `start` to midnight of `end`
    pub fn days(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        Self::new(start.and_time(chrono::NaiveTime::MIN), end.and_time(chrono::NaiveTime::MIN))
    }

    /// Range start
    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    /// Range end (inclusive)
    pub fn end(&self) -> NaiveDateTime {
        self.end
    }
}

/// A range plus the sampling step and rendering rule for its keys
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Interval {
    range: TimeRange,
    step: Step,
    format: KeyFormat,
}

impl Interval {
    /// Create an interval
    pub fn new(range: TimeRange, step: Step, format: KeyFormat) -> Self {
        Self {
            range,
            step,
            format,
        }
    }

    /// Decompose into ordered keys `start, start + step, …` up to and including `end`.
    ///
    /// A range with `start == end` yields exactly one key.
    pub fn decompose(&self) -> Result<Vec<TimeKey>> {
        self.step.validate(None)?;
        let TimeRange { start, end } = self.range;
        if start > end {
            return Err(Error::InvalidRange { start, end });
        }

        let mut keys = Vec::new();
        let mut k = 0u32;
        while let Some(instant) = self.step.nth(start, k) {
            if instant > end {
                break;
            }
            keys.push(TimeKey::new(instant, self.format.clone()));
            k = match k.checked_add(1) {
                Some(next) => next,
                None => break,
            };
        }
        Ok(keys)
    }

    /// Decompose several ranges sharing a step and format.
    ///
    /// Keys keep the order of the ranges; a key produced by overlapping ranges
    /// appears once, at its first position.
    pub fn decompose_all(
        ranges: &[TimeRange],
        step: Step,
        format: &KeyFormat,
    ) -> Result<Vec<TimeKey>> {
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        for range in ranges {
            for key in Interval::new(*range, step, format.clone()).decompose()? {
                if seen.insert(key.clone()) {
                    keys.push(key);
                }
            }
        }
        Ok(keys)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDateTime {
        at(y, m, d, 0, 0)
    }

    fn rendered(keys: &[TimeKey]) -> Vec<String> {
        keys.iter().map(TimeKey::render).collect()
    }

    #[test]
    fn daily_range_is_inclusive() {
        let range = TimeRange::new(day(2021, 1, 1), day(2021, 1, 3)).unwrap();
        let keys = Interval::new(range, Step::days(1), KeyFormat::daily())
            .decompose()
            .unwrap();

        assert_eq!(rendered(&keys), vec!["20210101", "20210102", "20210103"]);
    }

    #[test]
    fn start_equal_to_end_yields_one_key() {
        let range = TimeRange::new(day(2021, 6, 15), day(2021, 6, 15)).unwrap();
        let keys = Interval::new(range, Step::hours(1), KeyFormat::daily())
            .decompose()
            .unwrap();

        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].instant(), day(2021, 6, 15));
    }

    #[test]
    fn start_after_end_is_invalid_range() {
        let result = TimeRange::new(day(2021, 1, 3), day(2021, 1, 1));
        assert!(matches!(result, Err(Error::InvalidRange { .. })));
    }

    #[test]
    fn fixed_step_length_matches_floor_formula() {
        let start = day(2020, 2, 27);
        let cases = [
            (day(2020, 3, 2), Step::days(1)),
            (at(2020, 2, 28, 5, 0), Step::hours(1)),
            (at(2020, 2, 27, 1, 59), Step::minutes(12)),
            (day(2020, 3, 31), Step::days(7)),
            (at(2020, 2, 27, 0, 1), Step::days(1)),
        ];
        for (end, step) in cases {
            let Step::Fixed(d) = step else { unreachable!() };
            let span = (end - start).num_seconds() as u64;
            let expected = (span / d.as_secs()) as usize + 1;

            let range = TimeRange::new(start, end).unwrap();
            let keys = Interval::new(range, step, KeyFormat::daily())
                .decompose()
                .unwrap();
            assert_eq!(keys.len(), expected, "step {step:?} up to {end}");
        }
    }

    #[test]
    fn decomposition_is_stable() {
        let range = TimeRange::new(day(2016, 10, 10), day(2016, 10, 20)).unwrap();
        let interval = Interval::new(range, Step::days(1), KeyFormat::daily());

        assert_eq!(interval.decompose().unwrap(), interval.decompose().unwrap());
    }

    #[test]
    fn monthly_step_from_month_end_keeps_day_of_month_where_defined() {
        let range = TimeRange::new(day(2021, 1, 31), day(2021, 5, 31)).unwrap();
        let keys = Interval::new(range, Step::months(1), KeyFormat::daily())
            .decompose()
            .unwrap();

        assert_eq!(
            rendered(&keys),
            vec!["20210131", "20210228", "20210331", "20210430", "20210531"]
        );
    }

    #[test]
    fn monthly_step_crosses_year_boundary_without_gaps() {
        let range = TimeRange::new(day(2020, 11, 1), day(2021, 2, 1)).unwrap();
        let keys = Interval::new(range, Step::months(1), KeyFormat::monthly())
            .decompose()
            .unwrap();

        assert_eq!(rendered(&keys), vec!["202011", "202012", "202101", "202102"]);
    }

    #[test]
    fn yearly_step_from_leap_day() {
        let range = TimeRange::new(day(2024, 2, 29), day(2028, 3, 1)).unwrap();
        let keys = Interval::new(range, Step::years(1), KeyFormat::daily())
            .decompose()
            .unwrap();

        assert_eq!(
            rendered(&keys),
            vec!["20240229", "20250228", "20260228", "20270228", "20280229"]
        );
    }

    #[test]
    fn zero_step_is_rejected() {
        let range = TimeRange::new(day(2021, 1, 1), day(2021, 1, 2)).unwrap();
        let fixed = Interval::new(range, Step::Fixed(Duration::ZERO), KeyFormat::daily());
        let months = Interval::new(range, Step::months(0), KeyFormat::monthly());

        assert!(matches!(fixed.decompose(), Err(Error::InvalidStep(_))));
        assert!(matches!(months.decompose(), Err(Error::InvalidStep(_))));
    }

    #[test]
    fn step_below_minimum_resolution_is_rejected() {
        let min = Some(Duration::from_secs(120));
        assert!(Step::minutes(1).validate(min).is_err());
        assert!(Step::minutes(2).validate(min).is_ok());
        assert!(Step::months(1).validate(min).is_ok());
    }

    #[test]
    fn decompose_all_concatenates_and_deduplicates() {
        let ranges = [
            TimeRange::new(day(2021, 1, 1), day(2021, 1, 3)).unwrap(),
            TimeRange::new(day(2021, 1, 10), day(2021, 1, 11)).unwrap(),
            TimeRange::new(day(2021, 1, 2), day(2021, 1, 4)).unwrap(),
        ];
        let keys = Interval::decompose_all(&ranges, Step::days(1), &KeyFormat::daily()).unwrap();

        assert_eq!(
            rendered(&keys),
            vec!["20210101", "20210102", "20210103", "20210110", "20210111", "20210104"]
        );
    }

    #[test]
    fn keys_with_different_formats_are_distinct() {
        let a = TimeKey::new(day(2021, 1, 1), KeyFormat::daily());
        let b = TimeKey::new(day(2021, 1, 1), KeyFormat::monthly());
        assert_ne!(a, b);
        assert_eq!(a, TimeKey::new(day(2021, 1, 1), KeyFormat::daily()));
    }

    #[test]
    fn render_helpers() {
        let key = TimeKey::new(at(2016, 10, 10, 13, 5), KeyFormat::new("%Y%m%d-%H%M"));

        assert_eq!(key.render(), "20161010-1305");
        assert_eq!(key.to_string(), "20161010-1305");
        assert_eq!(key.render_with("%Y/%m/%d"), "2016/10/10");
        assert_eq!(key.day_of_year(), "2016284");
    }

    #[test]
    fn step_serializes_as_tagged_object() {
        let json = serde_json::to_value(Step::hours(2)).unwrap();
        assert_eq!(json, serde_json::json!({ "fixed": 7200 }));

        let months: Step = serde_json::from_value(serde_json::json!({ "months": 3 })).unwrap();
        assert_eq!(months, Step::months(3));
    }
}
