use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use once_cell::sync::Lazy;
use regex::Regex;

static MONTH_OFFSET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(-?\d+)m").expect("month offset pattern is valid"));

/// Turn a relative period such as `-2m` into the first day of that month.
///
/// `0m` is the current month, `-1m` the previous one. Anything that is not a
/// month offset is returned unchanged.
pub fn parse_period(period: &str, today: NaiveDate) -> String {
    let Some(offset) = MONTH_OFFSET
        .captures(period)
        .and_then(|captures| captures[1].parse::<i32>().ok())
    else {
        return period.to_string();
    };

    let first_of_month = today.with_day(1).unwrap_or(today);
    let months = Months::new(offset.unsigned_abs());
    let target = if offset < 0 {
        first_of_month.checked_sub_months(months)
    } else {
        first_of_month.checked_add_months(months)
    };

    match target {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => period.to_string(),
    }
}

/// Calendar date of a Unix timestamp, as `YYYY-MM-DD`
pub fn epoch_to_date(seconds: i64) -> Option<String> {
    DateTime::from_timestamp(seconds, 0).map(|dt| dt.date_naive().format("%Y-%m-%d").to_string())
}

/// Days from 0001-01-01 to 1899-12-30, day zero of spreadsheet serial dates
const SERIAL_EPOCH_DAYS_FROM_CE: i32 = 693_594;

/// Spreadsheet serial number of a date and time (days since 1899-12-30)
pub fn to_excel_serial(datetime: NaiveDateTime) -> f64 {
    let days = datetime.date().num_days_from_ce() - SERIAL_EPOCH_DAYS_FROM_CE;
    days as f64 + datetime.time().num_seconds_from_midnight() as f64 / 86_400.0
}

pub fn from_excel_serial(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() {
        return None;
    }
    let days = i32::try_from(serial.floor() as i64).ok()?;
    let seconds = ((serial - serial.floor()) * 86_400.0).round() as i64;
    let date = NaiveDate::from_num_days_from_ce_opt(days.checked_add(SERIAL_EPOCH_DAYS_FROM_CE)?)?;
    date.and_time(NaiveTime::MIN).checked_add_signed(Duration::seconds(seconds))
}

/// `YYYY-MM-DD`, with the time appended when it is not midnight
pub fn format_excel_serial(serial: f64) -> Option<String> {
    let datetime = from_excel_serial(serial)?;
    Some(if datetime.time() == NaiveTime::MIN {
        datetime.format("%Y-%m-%d").to_string()
    } else {
        datetime.format("%Y-%m-%d %H:%M:%S").to_string()
    })
}

/// ISO 8601 date or date-time as stored by OpenDocument sheets
pub fn parse_iso_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .map(|date| date.and_time(NaiveTime::MIN))
        })
}
