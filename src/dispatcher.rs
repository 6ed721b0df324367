//! Chat command dispatch
//!
//! Each inbound message gets at most one reply and exactly one response-log row.
//! The reply goes out before the log append; a failed append never touches the reply.

use crate::config::COMMAND_PREFIX;
use crate::error::Error;
use crate::format::Formatter;
use crate::store::Store;
use crate::transport::{InboundMessage, Transport};
use chrono::{Local, Utc};
use std::sync::Arc;
use tracing::{debug, error, warn};

pub const HELP_TEXT: &str = "*Command List*\n
!help - Show this help
!status - Check your registration status
!register [number] [name] - Register a new user (Admin only)
!unregister [number] - Remove a user (Admin only)
!list - Show registered users (Admin only)";

pub const UNKNOWN_COMMAND: &str = "Unrecognized command. Type !help for help.";
pub const REGISTER_USAGE: &str = "Format: !register [number] [name]";
pub const UNREGISTER_USAGE: &str = "Format: !unregister [number]";
pub const ALREADY_REGISTERED: &str = "That number is already registered.";
pub const NO_USERS: &str = "No users registered yet.";
pub const NOT_REGISTERED: &str = "Your number is not registered.";

/// A command split into its name and positional arguments
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCommand {
    /// Lower-cased command name without the prefix
    pub name: String,
    /// Arguments with their original casing
    pub args: Vec<String>,
}

/// Split a message into a command, or `None` if it is not one
pub fn parse_command(text: &str) -> Option<ParsedCommand> {
    let rest = text.trim().strip_prefix(COMMAND_PREFIX)?;
    // The name is whatever directly follows the prefix, so "! help" has an empty name
    let (name, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));

    Some(ParsedCommand {
        name: name.to_lowercase(),
        args: args.split_whitespace().map(String::from).collect(),
    })
}

/// Interprets inbound messages against the store and replies through the transport
pub struct Dispatcher {
    store: Arc<dyn Store>,
    transport: Arc<dyn Transport>,
    formatter: Formatter,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn Store>, transport: Arc<dyn Transport>, formatter: Formatter) -> Self {
        Self {
            store,
            transport,
            formatter,
        }
    }

    /// Handle one message end to end. Returns the reply that was attempted, if any.
    pub async fn handle(&self, message: &InboundMessage) -> Option<String> {
        let response_type = message.body.trim().to_lowercase();

        let reply = match parse_command(&message.body) {
            Some(command) => {
                let is_admin = self.is_admin(&message.sender);
                debug!("Command !{} from {} (admin: {})", command.name, message.sender, is_admin);
                self.execute(&command, &message.sender, is_admin)
            }
            None => {
                debug!("Non-command message from {}", message.sender);
                None
            }
        };

        if let Some(text) = &reply {
            if let Err(e) = self.transport.send_message(&message.chat_id, text).await {
                error!(
                    "Failed to reply to {}:\n{}",
                    message.chat_id,
                    self.formatter.error(&e, &Local::now())
                );
            }
        }

        if let Err(e) = self.store.log_response(&message.sender, &response_type, Utc::now()) {
            error!(
                "Error logging response from {}:\n{}",
                message.sender,
                self.formatter.error(&e, &Local::now())
            );
        }

        reply
    }

    /// Admin lookup failures are logged and treated as "not an admin"
    fn is_admin(&self, number: &str) -> bool {
        match self.store.is_admin(number) {
            Ok(is_admin) => is_admin,
            Err(e) => {
                warn!(
                    "Admin lookup failed for {}:\n{}",
                    number,
                    self.formatter.error(&e, &Local::now())
                );
                false
            }
        }
    }

    /// Run a parsed command and build its reply. Unauthorized admin commands yield `None`.
    pub fn execute(&self, command: &ParsedCommand, sender: &str, is_admin: bool) -> Option<String> {
        match command.name.as_str() {
            "help" => Some(HELP_TEXT.to_string()),
            "register" if is_admin => Some(self.register(&command.args)),
            "unregister" if is_admin => Some(self.unregister(&command.args)),
            "list" if is_admin => Some(self.list()),
            "register" | "unregister" | "list" => {
                debug!("Dropping !{} from non-admin {}", command.name, sender);
                None
            }
            "status" => Some(self.status(sender)),
            _ => Some(UNKNOWN_COMMAND.to_string()),
        }
    }

    fn register(&self, args: &[String]) -> String {
        if args.len() < 2 {
            return REGISTER_USAGE.to_string();
        }

        let number = &args[0];
        let name = args[1..].join(" ");

        match self.store.insert_user(number, &name, Utc::now()) {
            Ok(()) => format!("Successfully registered {} ({})", name, number),
            Err(Error::AlreadyRegistered(_)) => ALREADY_REGISTERED.to_string(),
            Err(e) => {
                self.report("Database error while registering", &e);
                "An error occurred while registering the user.".to_string()
            }
        }
    }

    fn unregister(&self, args: &[String]) -> String {
        let Some(number) = args.first() else {
            return UNREGISTER_USAGE.to_string();
        };

        match self.store.deactivate_user(number) {
            Ok(_) => format!("Successfully removed user {}", number),
            Err(e) => {
                self.report("Database error while unregistering", &e);
                "An error occurred while removing the user.".to_string()
            }
        }
    }

    fn list(&self) -> String {
        match self.store.active_users() {
            Ok(users) if users.is_empty() => NO_USERS.to_string(),
            Ok(users) => {
                let entries = users
                    .iter()
                    .enumerate()
                    .map(|(i, user)| {
                        format!(
                            "{}. {} ({})\n   Registered: {}",
                            i + 1,
                            user.name,
                            user.number,
                            self.formatter.date_time(&user.created_at.with_timezone(&Local))
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n\n");
                format!("*User List*\n\n{}", entries)
            }
            Err(e) => {
                self.report("Database error while listing users", &e);
                "An error occurred while fetching the user list.".to_string()
            }
        }
    }

    fn status(&self, sender: &str) -> String {
        match self.store.find_user(sender) {
            Ok(None) => NOT_REGISTERED.to_string(),
            Ok(Some(user)) => format!(
                "*User Status*\n\nName: {}\nNumber: {}\nStatus: {}\nRegistered: {}",
                user.name,
                user.number,
                user.status.label(),
                self.formatter.date_time(&user.created_at.with_timezone(&Local))
            ),
            Err(e) => {
                self.report("Database error while checking status", &e);
                "An error occurred while checking status.".to_string()
            }
        }
    }

    fn report(&self, context: &str, err: &Error) {
        error!("{}:\n{}", context, self.formatter.error(err, &Local::now()));
    }
}
