//! Which chat belongs to the admin.
//!
//! A configured chat id wins outright. Otherwise the id is bound once per
//! process, either by a `getChat("@username")` lookup or by the first
//! message whose sender carries the admin username.

use crate::config::Config;
use crate::error::RelayError;
use crate::models::IncomingMessage;
use crate::telegram::client::Messenger;
use std::sync::OnceLock;

pub fn normalize_username(raw: &str) -> String {
    raw.trim().trim_start_matches('@').to_lowercase()
}

#[derive(Debug, Default)]
pub struct AdminIdentity {
    username: Option<String>,
    chat_id: OnceLock<i64>,
    strict: bool,
}

impl AdminIdentity {
    pub fn new(username: Option<&str>, chat_id: Option<i64>, strict: bool) -> Self {
        let bound = OnceLock::new();
        if let Some(id) = chat_id {
            let _ = bound.set(id);
        }
        Self {
            username: username.map(normalize_username).filter(|u| !u.is_empty()),
            chat_id: bound,
            strict,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.admin_username.as_deref(),
            config.admin_chat_id,
            config.strict_admin_check,
        )
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// The admin chat id, if configured or already bound.
    pub fn chat_id(&self) -> Option<i64> {
        self.chat_id.get().copied()
    }

    pub fn is_bound(&self) -> bool {
        self.chat_id().is_some()
    }

    /// Binds the sender's chat when it is the first contact from the admin
    /// username. Returns `true` only when this call performed the binding.
    pub fn bind_from_message(&self, message: &IncomingMessage) -> bool {
        if self.is_bound() {
            return false;
        }
        let Some(admin) = self.username.as_deref() else {
            return false;
        };
        let sender = message.sender_username().map(normalize_username);
        if sender.as_deref() != Some(admin) {
            return false;
        }
        let bound = self.chat_id.set(message.chat.id).is_ok();
        if bound {
            tracing::info!(chat_id = message.chat.id, "Admin chat bound by first contact");
        }
        bound
    }

    /// Known chat id, else a username lookup cached for the process lifetime.
    pub async fn resolve(&self, messenger: &dyn Messenger) -> Result<i64, RelayError> {
        if let Some(id) = self.chat_id() {
            return Ok(id);
        }
        let Some(username) = self.username.as_deref() else {
            return Err(RelayError::AdminUnresolved);
        };

        match messenger.lookup_chat_id(username).await {
            Ok(id) => {
                let _ = self.chat_id.set(id);
                tracing::info!(chat_id = id, username, "Admin chat resolved by username lookup");
                Ok(self.chat_id().unwrap_or(id))
            }
            Err(e) => {
                tracing::warn!(username, "Admin username lookup failed: {e}");
                Err(RelayError::AdminUnresolved)
            }
        }
    }

    /// Strict mode needs every available check to pass, lenient mode any.
    /// With neither a chat id nor a username there is no admin.
    pub fn is_admin(&self, chat_id: i64, sender_username: Option<&str>) -> bool {
        let mut checks = Vec::with_capacity(2);
        if let Some(admin_chat) = self.chat_id() {
            checks.push(chat_id == admin_chat);
        }
        if let Some(admin) = self.username.as_deref() {
            checks.push(sender_username.map(normalize_username).as_deref() == Some(admin));
        }

        if checks.is_empty() {
            return false;
        }
        if self.strict {
            checks.iter().all(|&ok| ok)
        } else {
            checks.iter().any(|&ok| ok)
        }
    }

    pub fn is_admin_message(&self, message: &IncomingMessage) -> bool {
        self.is_admin(message.chat.id, message.sender_username())
    }
}
