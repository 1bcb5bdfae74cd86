//! Monthly revenue aggregation
//!
//! Completed payments are grouped by the calendar month of their payment
//! date within one year. The output always has twelve entries, January
//! first, with empty months reported as zero.
//!
//! When the caller does not name a year, the year is chosen explicitly by
//! [`resolve_year`]: the year of the most recent payment, or the current
//! year when there are no payments at all.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::payments::Payment;
use crate::projects::normalize_zero;

/// Smallest and largest year accepted from a query string
pub const MIN_YEAR: i32 = 1;
pub const MAX_YEAR: i32 = 9999;

/// Revenue for one calendar month
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MonthlyRevenue {
    /// 1 = January
    pub month: u32,
    pub total: f64,
}

/// Which year a monthly revenue report covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum YearSelection {
    /// A year named by the caller
    Year(i32),
    /// Year of the latest payment, falling back to the current year
    #[default]
    LatestPayment,
}

impl YearSelection {
    /// Read an optional `year` query value.
    ///
    /// Malformed or out-of-range values fall back to [`YearSelection::LatestPayment`]
    /// rather than being rejected.
    pub fn from_query(raw: Option<&str>) -> Self {
        raw.and_then(|s| s.trim().parse::<i32>().ok())
            .filter(|y| (MIN_YEAR..=MAX_YEAR).contains(y))
            .map(YearSelection::Year)
            .unwrap_or(YearSelection::LatestPayment)
    }
}

/// Turn a selection into a concrete year.
///
/// `today` is supplied by the caller so the fallback is deterministic.
pub fn resolve_year(selection: YearSelection, payments: &[Payment], today: NaiveDate) -> i32 {
    match selection {
        YearSelection::Year(year) => year,
        YearSelection::LatestPayment => payments
            .iter()
            .map(|p| p.payment_date)
            .max()
            .map(|d| d.year())
            .unwrap_or_else(|| today.year()),
    }
}

/// Completed revenue per month of `year`, January through December
pub fn monthly_revenue(year: i32, payments: &[Payment]) -> Vec<MonthlyRevenue> {
    let mut totals = [0.0f64; 12];

    for payment in payments {
        if !payment.is_completed() || payment.payment_date.year() != year {
            continue;
        }
        totals[payment.payment_date.month0() as usize] += payment.amount;
    }

    totals
        .iter()
        .enumerate()
        .map(|(idx, total)| MonthlyRevenue {
            month: idx as u32 + 1,
            total: normalize_zero(*total),
        })
        .collect()
}

/// Completed revenue dated within `year`
pub fn revenue_for_year(year: i32, payments: &[Payment]) -> f64 {
    payments
        .iter()
        .filter(|p| p.is_completed() && p.payment_date.year() == year)
        .map(|p| p.amount)
        .sum()
}
