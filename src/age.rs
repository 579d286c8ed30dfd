// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Calendar-aware age decomposition.
//!
//! Chrono has no year/month/day difference, so the borrowing rules are spelled
//! out here: days borrow the length of the month preceding `today`'s month,
//! months borrow twelve from years.

use std::fmt;

use chrono::{Datelike, NaiveDate};

/// Text written to the age slot when no birth date is configured.
pub const AGE_PLACEHOLDER: &str = "—";

/// Elapsed whole years, months and days between two dates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq,)]
pub struct AgeSpan
{
    pub years:  u32,
    pub months: u32,
    pub days:   u32,
}

impl AgeSpan
{
    /// Decomposes the time from `birth` to `today`.
    ///
    /// Returns a zero span when `birth` lies after `today`.
    pub fn between(birth: NaiveDate, today: NaiveDate,) -> Self
    {
        if birth > today {
            return Self::default();
        }

        let mut years = today.year() - birth.year();
        let mut months = today.month() as i32 - birth.month() as i32;
        let mut days = today.day() as i32 - birth.day() as i32;

        let (mut cursor_year, mut cursor_month,) = (today.year(), today.month(),);
        while days < 0 {
            // A 31st borrowing from a short month can stay negative; keep walking back.
            (cursor_year, cursor_month,) =
                if cursor_month == 1 { (cursor_year - 1, 12,) } else { (cursor_year, cursor_month - 1,) };
            months -= 1;
            days += days_in_month(cursor_year, cursor_month,) as i32;
        }

        if months < 0 {
            years -= 1;
            months += 12;
        }

        Self {
            years: years.max(0,) as u32, months: months as u32, days: days as u32,
        }
    }
}

impl fmt::Display for AgeSpan
{
    fn fmt(&self, f: &mut fmt::Formatter<'_,>,) -> fmt::Result
    {
        write!(
            f,
            "{} {}, {} {}, {} {}",
            self.years,
            unit(self.years, "year",),
            self.months,
            unit(self.months, "month",),
            self.days,
            unit(self.days, "day",),
        )
    }
}

/// Renders the age slot text, falling back to [`AGE_PLACEHOLDER`].
pub fn human_age(birth: Option<NaiveDate,>, today: NaiveDate,) -> String
{
    match birth {
        Some(birth,) => AgeSpan::between(birth, today,).to_string(),
        None => AGE_PLACEHOLDER.to_owned(),
    }
}

fn unit(value: u32, singular: &str,) -> String
{
    if value == 1 { singular.to_owned() } else { format!("{singular}s") }
}

fn days_in_month(year: i32, month: u32,) -> u32
{
    let (next_year, next_month,) = if month == 12 { (year + 1, 1,) } else { (year, month + 1,) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1,)
        .and_then(|first| first.pred_opt(),)
        .map_or(30, |last| last.day(),)
}
