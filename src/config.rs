//! Configuration, locale tables and reminder constants

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Day names, Sunday first
pub const DAY_NAMES: [&str; 7] = ["Minggu", "Senin", "Selasa", "Rabu", "Kamis", "Jumat", "Sabtu"];

pub const MONTH_NAMES: [&str; 12] = [
    "Januari", "Februari", "Maret", "April", "Mei", "Juni",
    "Juli", "Agustus", "September", "Oktober", "November", "Desember",
];

/// Prefix that marks a message as a bot command
pub const COMMAND_PREFIX: char = '!';

/// Longest response-log retention accepted from configuration
pub const MAX_RETENTION_DAYS: i64 = 36_500;

/// Tables used when rendering timestamps for chat users
#[derive(Debug, Clone, PartialEq)]
pub struct Locale {
    pub day_names: [String; 7],
    pub month_names: [String; 12],
    pub timezone_label: String,
}

impl Default for Locale {
    fn default() -> Self {
        Self {
            day_names: DAY_NAMES.map(String::from),
            month_names: MONTH_NAMES.map(String::from),
            timezone_label: "WIB".to_string(),
        }
    }
}

/// Thresholds and window for the reminder sweep
#[derive(Debug, Clone, PartialEq)]
pub struct ReminderSettings {
    /// Quiet period after a plain message
    pub interval: Duration,
    /// Quiet period after a command
    pub fast_interval: Duration,
    /// First local hour (inclusive) reminders may go out
    pub start_hour: u32,
    /// Last local hour (inclusive) reminders may go out
    pub end_hour: u32,
    /// Response rows older than this many days are pruned
    pub retention_days: i64,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2 * 60 * 60),
            fast_interval: Duration::from_secs(60),
            start_hour: 7,
            end_hour: 21,
            retention_days: 30,
        }
    }
}

/// All configurable paths and constants
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub db_path: PathBuf,
    pub bridge_url: String,
    pub locale: Locale,
    pub reminder: ReminderSettings,
    pub sweep_cron: String,
    pub cleanup_cron: String,
}

impl Default for Config {
    fn default() -> Self {
        let db_path = dirs::data_local_dir()
            .map(|d| d.join("reminder-bot/bot.db"))
            .unwrap_or_else(|| PathBuf::from("data/bot.db"));

        Self {
            port: 3000,
            db_path,
            bridge_url: "http://127.0.0.1:8080".to_string(),
            locale: Locale::default(),
            reminder: ReminderSettings::default(),
            sweep_cron: "0 * * * *".to_string(),
            cleanup_cron: "0 0 * * *".to_string(),
        }
    }
}

impl Config {
    /// Build config from process environment, falling back to defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(port) = parse_var(&lookup, "PORT")? {
            config.port = port;
        }
        if let Some(path) = lookup("BOT_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(url) = lookup("BRIDGE_URL") {
            config.bridge_url = url.trim_end_matches('/').to_string();
        }
        if let Some(label) = lookup("BOT_TZ_LABEL") {
            config.locale.timezone_label = label;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "REMINDER_INTERVAL_SECS")? {
            config.reminder.interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "REMINDER_FAST_INTERVAL_SECS")? {
            config.reminder.fast_interval = Duration::from_secs(secs);
        }
        if let Some(hour) = parse_var(&lookup, "REMINDER_START_HOUR")? {
            config.reminder.start_hour = hour;
        }
        if let Some(hour) = parse_var(&lookup, "REMINDER_END_HOUR")? {
            config.reminder.end_hour = hour;
        }
        if let Some(days) = parse_var(&lookup, "RESPONSE_RETENTION_DAYS")? {
            config.reminder.retention_days = days;
        }
        if let Some(expr) = lookup("REMINDER_SWEEP_CRON") {
            config.sweep_cron = expr;
        }
        if let Some(expr) = lookup("RESPONSE_CLEANUP_CRON") {
            config.cleanup_cron = expr;
        }

        config.validate()?;
        Ok(config)
    }

    /// Create config for testing with custom paths
    pub fn for_test(temp_dir: &Path) -> Self {
        Self {
            db_path: temp_dir.join("bot.db"),
            bridge_url: "http://127.0.0.1:9".to_string(),
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<()> {
        let r = &self.reminder;
        if r.start_hour > 23 || r.end_hour > 23 {
            return Err(Error::Config(format!(
                "reminder hours must be 0-23 (got {}-{})",
                r.start_hour, r.end_hour
            )));
        }
        if r.start_hour > r.end_hour {
            return Err(Error::Config(format!(
                "reminder start hour {} is after end hour {}",
                r.start_hour, r.end_hour
            )));
        }
        if r.retention_days < 1 || r.retention_days > MAX_RETENTION_DAYS {
            return Err(Error::Config(format!(
                "retention days must be 1-{} (got {})",
                MAX_RETENTION_DAYS, r.retention_days
            )));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{}={:?}: {}", key, raw, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.reminder.interval, Duration::from_secs(7200));
        assert_eq!(config.reminder.fast_interval, Duration::from_secs(60));
        assert_eq!(config.reminder.start_hour, 7);
        assert_eq!(config.reminder.end_hour, 21);
        assert_eq!(config.locale.timezone_label, "WIB");
        assert!(config.db_path.to_string_lossy().ends_with("bot.db"));
    }

    #[test]
    fn test_test_config() {
        let temp = std::env::temp_dir();
        let config = Config::for_test(&temp);
        assert_eq!(config.db_path, temp.join("bot.db"));
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("PORT", "8081"),
            ("BOT_TZ_LABEL", "WITA"),
            ("REMINDER_INTERVAL_SECS", "600"),
            ("REMINDER_START_HOUR", "8"),
            ("REMINDER_END_HOUR", "20"),
            ("BRIDGE_URL", "http://bridge:9000/"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8081);
        assert_eq!(config.locale.timezone_label, "WITA");
        assert_eq!(config.reminder.interval, Duration::from_secs(600));
        assert_eq!(config.reminder.start_hour, 8);
        assert_eq!(config.reminder.end_hour, 20);
        assert_eq!(config.bridge_url, "http://bridge:9000");
    }

    #[test]
    fn test_from_lookup_empty_is_default() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.reminder, ReminderSettings::default());
        assert_eq!(config.locale, Locale::default());
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = Config::from_lookup(lookup_from(&[("PORT", "three thousand")])).unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("PORT")));
    }

    #[test]
    fn test_from_lookup_rejects_inverted_window() {
        let err = Config::from_lookup(lookup_from(&[
            ("REMINDER_START_HOUR", "22"),
            ("REMINDER_END_HOUR", "7"),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_from_lookup_bounds_retention() {
        let err = Config::from_lookup(lookup_from(&[("RESPONSE_RETENTION_DAYS", "200000000")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("200000000")));

        let err = Config::from_lookup(lookup_from(&[("RESPONSE_RETENTION_DAYS", "0")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let config = Config::from_lookup(lookup_from(&[("RESPONSE_RETENTION_DAYS", "36500")])).unwrap();
        assert_eq!(config.reminder.retention_days, MAX_RETENTION_DAYS);
    }

    #[test]
    fn test_locale_tables() {
        let locale = Locale::default();
        assert_eq!(locale.day_names[0], "Minggu");
        assert_eq!(locale.month_names[11], "Desember");
        assert!(DAY_NAMES.iter().all(|d| !d.is_empty()));
    }
}
