//! Integration tests for the reminder bot
//!
//! These tests drive the dispatcher and scheduler against an on-disk database.

use chrono::{Duration, Local, TimeZone, Utc};
use proptest::prelude::*;
use reminder_bot::config::Config;
use reminder_bot::dispatcher::Dispatcher;
use reminder_bot::format::{format_phone_number, Formatter};
use reminder_bot::scheduler::{should_send_reminder, ReminderScheduler, SweepReport};
use reminder_bot::store::{SqliteStore, Store, UserStatus};
use reminder_bot::transport::{InboundMessage, RecordingTransport};
use std::sync::Arc;
use tempfile::TempDir;

const ADMIN: &str = "6280000";

struct Harness {
    _temp_dir: TempDir,
    config: Config,
    store: Arc<SqliteStore>,
    transport: Arc<RecordingTransport>,
    dispatcher: Dispatcher,
}

fn harness() -> Harness {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::for_test(temp_dir.path());
    let store = Arc::new(SqliteStore::open(&config.db_path).unwrap());
    store.add_admin(ADMIN, "Operator", Utc::now()).unwrap();

    let transport = Arc::new(RecordingTransport::new());
    let dispatcher = Dispatcher::new(
        store.clone(),
        transport.clone(),
        Formatter::new(config.locale.clone()),
    );

    Harness {
        _temp_dir: temp_dir,
        config,
        store,
        transport,
        dispatcher,
    }
}

fn from(sender: &str, body: &str) -> InboundMessage {
    InboundMessage::from_chat(&format!("{}@c.us", sender), body)
}

/// Admin registers a user, then lists users
#[tokio::test]
async fn test_register_and_list_workflow() {
    let h = harness();

    h.dispatcher.handle(&from(ADMIN, "!register 6281111 Alice")).await;

    let users = h.store.active_users().unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].name, "Alice");
    assert_eq!(users[0].number, "6281111");
    assert_eq!(users[0].status, UserStatus::Active);

    let reply = h.dispatcher.handle(&from(ADMIN, "!list")).await.unwrap();
    assert!(reply.contains("1. Alice (6281111)"));

    let admin_chat = h.transport.sent_to("6280000@c.us");
    assert_eq!(admin_chat.len(), 2);
    assert_eq!(admin_chat[1], reply);
}

/// A non-admin cannot register and gets no reply
#[tokio::test]
async fn test_non_admin_register_is_dropped() {
    let h = harness();

    let reply = h.dispatcher.handle(&from("6281111", "!register 620000 Bob")).await;

    assert!(reply.is_none());
    assert_eq!(h.store.user_count().unwrap(), 0);
    assert!(h.transport.sent().is_empty());
}

/// Registration survives a restart of the store
#[tokio::test]
async fn test_registration_persists() {
    let h = harness();
    h.dispatcher.handle(&from(ADMIN, "!register 6281111 Alice Smith")).await;

    let reopened = SqliteStore::open(&h.config.db_path).unwrap();
    let user = reopened.find_user("6281111").unwrap().unwrap();
    assert_eq!(user.name, "Alice Smith");
    assert!(reopened.is_admin(ADMIN).unwrap());
}

/// Messages feed the reminder rule: a command gets the short quiet period
#[tokio::test]
async fn test_message_then_sweep() {
    let h = harness();
    h.dispatcher.handle(&from(ADMIN, "!register 6281111 Alice")).await;
    h.dispatcher.handle(&from("6281111", "!status")).await;

    let scheduler = ReminderScheduler::new(
        h.store.clone(),
        h.transport.clone(),
        Formatter::new(h.config.locale.clone()),
        h.config.reminder.clone(),
    );

    // Right after the command: not due yet
    let report = scheduler.send_reminders(Local::now()).await.unwrap();
    assert_eq!(report, SweepReport { checked: 1, sent: 0, failed: 0 });

    // Two minutes later the short threshold has passed
    let later = Local::now() + Duration::minutes(2);
    let report = scheduler.send_reminders(later).await.unwrap();
    assert_eq!(report.sent, 1);

    let reminders = h.transport.sent_to("6281111@c.us");
    assert!(reminders.last().unwrap().starts_with("Hello Alice,"));
}

/// Unregistered users drop out of the sweep
#[tokio::test]
async fn test_unregistered_user_not_reminded() {
    let h = harness();
    h.dispatcher.handle(&from(ADMIN, "!register 6281111 Alice")).await;
    h.dispatcher.handle(&from(ADMIN, "!unregister 6281111")).await;

    let scheduler = ReminderScheduler::new(
        h.store.clone(),
        h.transport.clone(),
        Formatter::default(),
        h.config.reminder.clone(),
    );
    let at = Local.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
    let report = scheduler.hourly_tick(at).await.unwrap();

    assert_eq!(report.checked, 0);
    assert!(h.transport.sent_to("6281111@c.us").is_empty());
}

/// The dual-threshold rule against the documented defaults
#[test]
fn test_reminder_thresholds() {
    let settings = Config::default().reminder;
    let t = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();

    let h = harness();
    h.store.log_response("1", "!status", t).unwrap();
    h.store.log_response("2", "hello", t).unwrap();
    let command = h.store.last_response("1").unwrap();
    let plain = h.store.last_response("2").unwrap();

    assert!(should_send_reminder(None, t, &settings));
    assert!(!should_send_reminder(command.as_ref(), t + Duration::seconds(59), &settings));
    assert!(should_send_reminder(command.as_ref(), t + Duration::seconds(60), &settings));
    assert!(!should_send_reminder(plain.as_ref(), t + Duration::seconds(7199), &settings));
    assert!(should_send_reminder(plain.as_ref(), t + Duration::seconds(7200), &settings));
}

#[test]
fn test_phone_number_examples() {
    assert_eq!(format_phone_number("081234567890"), "81234567890");
    assert_eq!(format_phone_number("6281234567890"), "81234567890");
    assert_eq!(format_phone_number("+62 812-3456-7890"), "81234567890");
}

proptest! {
    #[test]
    fn prop_phone_number_is_digits(raw in "\\PC{0,24}") {
        let formatted = format_phone_number(&raw);
        prop_assert!(formatted.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn prop_phone_number_strips_one_prefix(rest in "[1-9][0-9]{0,14}") {
        prop_assert_eq!(format_phone_number(&format!("0{}", rest)), rest.clone());
        prop_assert_eq!(format_phone_number(&format!("62{}", rest)), rest.clone());
        prop_assert_eq!(format_phone_number(&format!("00{}", rest)), format!("0{}", rest));
    }
}
