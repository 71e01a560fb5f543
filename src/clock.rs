//! Clock and date arithmetic for RDS group 4A.
//!
//! Provides:
//! - [`mjd_to_date`]: Modified Julian Date to Gregorian conversion using
//!   the classical truncating formulae from the RDS standard
//! - [`date_to_mjd`]: the inverse (EN 50067 annex G)
//! - [`local_time`]: UTC plus a signed half-hour offset, with carry
//!   propagation across minutes, hours, days and months
//!
//! # Example
//!
//! ```
//! use radiomon::clock::{mjd_to_date, local_time};
//!
//! let (year, month, day) = mjd_to_date(58849);
//! assert_eq!((year, month, day), (2020, 1, 1));
//!
//! let local = local_time(year, month, day, 12, 19, 2);
//! assert_eq!((local.hour, local.minute), (13, 19));
//! ```

const MONTH_DAYS: [i32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// A local calendar date and wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalDateTime {
    pub year: i32,
    pub month: i32,
    pub day: i32,
    pub hour: i32,
    pub minute: i32,
}

/// Number of days in a month, using the RDS broadcast leap rule
/// (every year divisible by 4 — valid for the MJD range the format
/// can express within 1900..2100).
pub fn days_in_month(year: i32, month: i32) -> i32 {
    if month == 2 && year % 4 == 0 {
        29
    } else {
        MONTH_DAYS[(month - 1) as usize]
    }
}

/// Convert a Modified Julian Date to a Gregorian `(year, month, day)`.
///
/// Uses the truncating-cast formulae given in the RDS standard:
///
/// ```text
/// year0  = trunc((MJD − 15078.2) / 365.25)
/// month0 = trunc(((MJD − 14956.1) − trunc(year0 × 365.25)) / 30.6001)
/// day    = MJD − 14956 − trunc(year0 × 365.25) − trunc(month0 × 30.6001)
/// ```
///
/// with the month-14/15 correction folding January and February into
/// the following year.
pub fn mjd_to_date(mjd: u32) -> (i32, i32, i32) {
    let mjd_f = mjd as f64;
    let year0 = ((mjd_f - 15078.2) / 365.25) as i32;
    let year_days = (year0 as f64 * 365.25) as i32;
    let month0 = ((mjd_f - 14956.1 - year_days as f64) / 30.6001) as i32;
    let month_days = (month0 as f64 * 30.6001) as i32;
    let day = mjd as i32 - 14956 - year_days - month_days;

    let k = if month0 == 14 || month0 == 15 { 1 } else { 0 };
    (year0 + k + 1900, month0 - 1 - k * 12, day)
}

/// Convert a Gregorian date back to a Modified Julian Date
/// (EN 50067 annex G).
pub fn date_to_mjd(year: i32, month: i32, day: i32) -> u32 {
    let l = if month == 1 || month == 2 { 1 } else { 0 };
    let y = year - 1900;
    (14956 + day + ((y - l) as f64 * 365.25) as i32
        + ((month + 1 + l * 12) as f64 * 30.6001) as i32) as u32
}

/// Apply a signed half-hour UTC offset to a UTC date and time.
///
/// Minute carries propagate into hours, hour carries into days, and day
/// carries across month boundaries using [`days_in_month`].
pub fn local_time(
    year: i32,
    month: i32,
    day: i32,
    utc_hour: i32,
    utc_minute: i32,
    offset_half_hours: i32,
) -> LocalDateTime {
    let mut year = year;
    let mut month = month;
    let mut day = day;
    let mut hour = utc_hour;
    let mut minute = utc_minute + offset_half_hours * 30;

    while minute < 0 {
        minute += 60;
        hour -= 1;
    }
    while minute >= 60 {
        minute -= 60;
        hour += 1;
    }
    if hour < 0 {
        hour += 24;
        day -= 1;
        if day < 1 {
            month -= 1;
            if month < 1 {
                month = 12;
                year -= 1;
            }
            day = days_in_month(year, month);
        }
    }
    if hour >= 24 {
        hour -= 24;
        day += 1;
        if day > days_in_month(year, month) {
            day = 1;
            month += 1;
            if month > 12 {
                month = 1;
                year += 1;
            }
        }
    }

    LocalDateTime {
        year,
        month,
        day,
        hour,
        minute,
    }
}
