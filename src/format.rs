//! Human-readable formatting for chat replies and operator logs

use crate::config::Locale;
use crate::error::Error;
use chrono::{DateTime, Datelike, TimeZone, Timelike};

/// Renders timestamps with the configured day/month tables
#[derive(Debug, Clone, Default)]
pub struct Formatter {
    locale: Locale,
}

impl Formatter {
    pub fn new(locale: Locale) -> Self {
        Self { locale }
    }

    pub fn locale(&self) -> &Locale {
        &self.locale
    }

    /// `"<Weekday>, <Day> <Month> <Year> <HH>:<MM> <TZ>"` in the instant's own offset.
    /// The timezone label is cosmetic.
    pub fn date_time<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> String {
        let day = &self.locale.day_names[at.weekday().num_days_from_sunday() as usize];
        let month = &self.locale.month_names[at.month0() as usize];

        format!(
            "{}, {} {} {} {:02}:{:02} {}",
            day,
            at.day(),
            month,
            at.year(),
            at.hour(),
            at.minute(),
            self.locale.timezone_label
        )
    }

    /// Operator-facing error report: timestamp, kind, message and source chain
    pub fn error<Tz: TimeZone>(&self, err: &Error, at: &DateTime<Tz>) -> String {
        let mut report = format!("[ERROR] {}\n{}: {}", self.date_time(at), err.kind(), err);

        let mut source = std::error::Error::source(err);
        while let Some(cause) = source {
            report.push_str("\n  caused by: ");
            report.push_str(&cause.to_string());
            source = cause.source();
        }

        report
    }
}

/// Strip non-digits, then a single leading `0` or `62` country code
pub fn format_phone_number(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if let Some(rest) = digits.strip_prefix('0') {
        rest.to_string()
    } else if let Some(rest) = digits.strip_prefix("62") {
        rest.to_string()
    } else {
        digits
    }
}
