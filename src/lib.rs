//! Reminder Bot - chat command bot with scheduled check-in reminders
//!
//! Admins register users over chat; every inbound message is logged, and users who
//! have gone quiet for too long get a reminder during daytime hours.

pub mod bot;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod format;
pub mod scheduler;
pub mod server;
pub mod store;
pub mod transport;

pub use error::{Error, Result};
