//! Error types for reminder-bot

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Schedule error: {0}")]
    Schedule(#[from] cron::error::Error),

    #[error("Number already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Database lock poisoned")]
    LockPoisoned,
}

impl Error {
    /// Short, stable name of the variant for operator logs
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Sqlite(_) => "SqliteError",
            Error::Io(_) => "IoError",
            Error::Http(_) => "HttpError",
            Error::Schedule(_) => "ScheduleError",
            Error::AlreadyRegistered(_) => "AlreadyRegistered",
            Error::Transport(_) => "TransportError",
            Error::Config(_) => "ConfigError",
            Error::LockPoisoned => "LockPoisoned",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
