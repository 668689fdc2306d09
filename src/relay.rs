//! Routes inbound submissions and bot updates, and relays admin replies
//! back to the client who sent the original request.

use crate::config::Config;
use crate::error::{RelayError, SubmissionError};
use crate::identity::{AdminIdentity, normalize_username};
use crate::models::{IncomingMessage, Submission, Update, WebAppSubmission};
use crate::store::{RequestRecord, RequestStatus, RequestStore, now_seconds, parse_timestamp};
use crate::telegram::client::{Messenger, OutgoingMessage, SentMessage};
use crate::telegram::commands::BotCommand;
use crate::telegram::formatter::format_submission;
use crate::telegram::init_data::verify_init_data;
use std::sync::Arc;
use url::Url;

const THANK_YOU_TEXT: &str = "Thank you! We have received your request.";
const CLIENT_REPLY_HEADER: &str = "Reply to your request:";

#[derive(Debug, Clone, Default)]
pub struct RelaySettings {
    pub bot_token: String,
    pub verify_init_data: bool,
    pub webapp_url: Option<Url>,
}

impl From<&Config> for RelaySettings {
    fn from(config: &Config) -> Self {
        Self {
            bot_token: config.bot_token.clone(),
            verify_init_data: config.verify_init_data,
            webapp_url: config.webapp_url.clone(),
        }
    }
}

pub struct Relay {
    messenger: Arc<dyn Messenger>,
    store: Arc<dyn RequestStore>,
    admin: AdminIdentity,
    settings: RelaySettings,
}

impl Relay {
    pub fn new(
        messenger: Arc<dyn Messenger>,
        store: Arc<dyn RequestStore>,
        admin: AdminIdentity,
        settings: RelaySettings,
    ) -> Self {
        Self {
            messenger,
            store,
            admin,
            settings,
        }
    }

    pub fn admin(&self) -> &AdminIdentity {
        &self.admin
    }

    /// `POST /webapp`: verify, deliver, acknowledge.
    pub async fn handle_submission(&self, body: WebAppSubmission) -> Result<(), SubmissionError> {
        if self.settings.verify_init_data {
            let init_data = body.init_data.as_deref().unwrap_or_default();
            if !verify_init_data(init_data, &self.settings.bot_token) {
                tracing::warn!("Rejected submission with invalid init_data");
                return Err(SubmissionError::InitDataInvalid);
            }
        }

        let submission = body
            .payload
            .as_ref()
            .and_then(Submission::from_payload)
            .ok_or(SubmissionError::PayloadMissing)?;

        self.deliver_to_admin(&submission).await?;

        if let Some(query_id) = body.query_id.as_deref().filter(|id| !id.is_empty()) {
            // Acknowledgement failures do not fail the submission.
            if let Err(e) = self
                .messenger
                .answer_web_app_query(query_id, THANK_YOU_TEXT)
                .await
            {
                tracing::warn!(query_id, "Failed to answer web app query: {e}");
            }
        }

        Ok(())
    }

    /// `POST /telegram`: commands, admin replies, and `web_app_data` submissions.
    pub async fn handle_update(&self, update: Update) -> Result<(), RelayError> {
        let Some(message) = update.into_message() else {
            return Ok(());
        };

        self.admin.bind_from_message(&message);

        match BotCommand::parse(message.text()) {
            Some(BotCommand::MyId) => return self.reply_my_id(&message).await,
            Some(BotCommand::Start) => return self.reply_start(&message).await,
            None => {}
        }

        if self.relay_admin_reply(&message).await? {
            return Ok(());
        }

        if let Some(app_data) = message.web_app_data.as_ref().filter(|d| !d.data.is_empty()) {
            let mut submission = Submission::from_app_data(&app_data.data);
            if submission.user.is_none()
                && let Some(sender) = message.from.as_ref().filter(|s| s.id != 0)
            {
                submission.user = Some(sender.into());
            }
            self.deliver_to_admin(&submission).await?;
            self.messenger
                .send_message(OutgoingMessage::plain(message.chat.id, THANK_YOU_TEXT))
                .await?;
        }

        Ok(())
    }

    /// Sends the formatted submission to the admin chat and records which
    /// client it came from. The record is only written when the client id is
    /// known, since nothing could be relayed back otherwise.
    pub async fn deliver_to_admin(&self, submission: &Submission) -> Result<SentMessage, RelayError> {
        let admin_chat = self.admin.resolve(self.messenger.as_ref()).await?;
        let sent = self
            .messenger
            .send_message(OutgoingMessage::html(admin_chat, format_submission(submission)))
            .await?;
        tracing::info!(
            chat_id = sent.chat_id,
            message_id = sent.message_id,
            kind = submission.kind.as_str(),
            "Submission delivered to admin"
        );

        if let Some(record) = request_record(&sent, submission)
            && let Err(e) = self.store.append(record)
        {
            tracing::error!(
                message_id = sent.message_id,
                "Delivered submission could not be recorded: {e}"
            );
        }

        Ok(sent)
    }

    /// Returns `true` when the message was an admin reply this relay handled
    /// (including the cases where the admin was told why nothing was sent).
    pub async fn relay_admin_reply(&self, message: &IncomingMessage) -> Result<bool, RelayError> {
        if !self.admin.is_admin_message(message) {
            return Ok(false);
        }
        let Some(replied) = message.reply_to_message else {
            return Ok(false);
        };
        let admin_chat = message.chat.id;

        let reply_text = message.reply_text();
        if reply_text.is_empty() {
            self.notify(admin_chat, "Not sent: the reply has no text.")
                .await?;
            return Ok(true);
        }

        let record = match self.store.find_by_admin_message(admin_chat, replied.message_id) {
            Ok(Some(record)) => record,
            Ok(None) => return Ok(false),
            Err(e) => {
                tracing::warn!(message_id = replied.message_id, "Request lookup failed: {e}");
                return Ok(false);
            }
        };

        let Some(client_chat) = record.client_chat_id.filter(|id| *id != 0) else {
            self.notify(admin_chat, "Could not determine who sent this request.")
                .await?;
            return Ok(true);
        };

        let relayed = self
            .messenger
            .send_message(OutgoingMessage::plain(
                client_chat,
                format!("{CLIENT_REPLY_HEADER}\n\n{reply_text}"),
            ))
            .await;

        match relayed {
            Ok(_) => {
                tracing::info!(
                    chat_id = client_chat,
                    request_id = %record.id,
                    "Admin reply relayed to client"
                );
                match self
                    .store
                    .mark_answered(admin_chat, replied.message_id, message.message_id)
                {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::warn!(request_id = %record.id, "Answered request vanished from store");
                    }
                    Err(e) => {
                        tracing::error!(request_id = %record.id, "Failed to mark request answered: {e}");
                    }
                }
                self.notify(admin_chat, "Reply sent to the client.").await?;
            }
            Err(e) => {
                tracing::warn!(chat_id = client_chat, "Failed to relay admin reply: {e}");
                self.notify(admin_chat, &format!("Failed to send to the client: {e}"))
                    .await?;
            }
        }

        Ok(true)
    }

    async fn reply_my_id(&self, message: &IncomingMessage) -> Result<(), RelayError> {
        let username = message
            .sender_username()
            .map(normalize_username)
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| "-".to_string());
        let text = format!(
            "chat_id: <code>{chat_id}</code>\nusername: @{username}\nadmin_bound: {bound}\nadmin_access: {access}",
            chat_id = message.chat.id,
            username = crate::telegram::formatter::escape_html(&username),
            bound = yes_no(self.admin.is_bound()),
            access = yes_no(self.admin.is_admin_message(message)),
        );
        self.messenger
            .send_message(OutgoingMessage::html(message.chat.id, text))
            .await?;
        Ok(())
    }

    async fn reply_start(&self, message: &IncomingMessage) -> Result<(), RelayError> {
        let mut lines = Vec::new();
        if self.admin.is_admin_message(message) {
            lines.push("Admin chat is bound.");
        }
        let outgoing = match &self.settings.webapp_url {
            Some(url) => {
                lines.push("Open the app:");
                OutgoingMessage::plain(message.chat.id, lines.join("\n"))
                    .with_web_app_button("Open web app", url.clone())
            }
            None => {
                lines.push("Web app URL is not configured. Set webapp_url.");
                OutgoingMessage::plain(message.chat.id, lines.join("\n"))
            }
        };
        self.messenger.send_message(outgoing).await?;
        Ok(())
    }

    async fn notify(&self, chat_id: i64, text: &str) -> Result<(), RelayError> {
        self.messenger
            .send_message(OutgoingMessage::plain(chat_id, text))
            .await?;
        Ok(())
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn request_record(sent: &SentMessage, submission: &Submission) -> Option<RequestRecord> {
    let user = submission.user.as_ref()?;
    let client_chat_id = user.id?;
    let received_at = now_seconds();
    let created_at = submission
        .created_at
        .as_deref()
        .and_then(parse_timestamp)
        .unwrap_or(received_at);

    Some(RequestRecord {
        id: RequestRecord::key(sent.chat_id, sent.message_id),
        kind: submission.kind.as_str().to_string(),
        created_at: Some(created_at),
        received_at: Some(received_at),
        admin_chat_id: sent.chat_id,
        admin_message_id: sent.message_id,
        client_chat_id: Some(client_chat_id),
        client_username: user.username.clone().unwrap_or_default(),
        client_name: user.display_name(),
        status: RequestStatus::New,
        answered_at: None,
        admin_reply_message_id: None,
    })
}
