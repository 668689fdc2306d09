use crate::error::RelayError;
use async_trait::async_trait;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, InlineQueryResult, InlineQueryResultArticle,
    InputMessageContent, InputMessageContentText, ParseMode, Recipient, WebAppInfo,
};
use url::Url;

/// A message to deliver through the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub chat_id: i64,
    pub text: String,
    pub html: bool,
    pub web_app_button: Option<(String, Url)>,
}

impl OutgoingMessage {
    pub fn plain(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            html: false,
            web_app_button: None,
        }
    }

    pub fn html(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            html: true,
            ..Self::plain(chat_id, text)
        }
    }

    #[must_use]
    pub fn with_web_app_button(mut self, label: impl Into<String>, url: Url) -> Self {
        self.web_app_button = Some((label.into(), url));
        self
    }
}

/// Tracks a Telegram message the bot sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentMessage {
    pub chat_id: i64,
    pub message_id: i32,
}

/// Outbound side of the Bot API used by the relay.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_message(&self, message: OutgoingMessage) -> Result<SentMessage, RelayError>;

    /// Resolves `@username` to a chat id via `getChat`.
    async fn lookup_chat_id(&self, username: &str) -> Result<i64, RelayError>;

    async fn answer_web_app_query(&self, query_id: &str, text: &str) -> Result<(), RelayError>;
}

pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    /// Bot whose HTTP client gives up after `timeout`; requests are never retried.
    pub fn build_bot(token: &str, timeout: Duration) -> anyhow::Result<Bot> {
        let client = teloxide::net::default_reqwest_settings()
            .timeout(timeout)
            .build()?;
        Ok(Bot::with_client(token, client))
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send_message(&self, message: OutgoingMessage) -> Result<SentMessage, RelayError> {
        let mut request = self.bot.send_message(ChatId(message.chat_id), message.text);
        if message.html {
            request = request.parse_mode(ParseMode::Html);
        }
        if let Some((label, url)) = message.web_app_button {
            let button = InlineKeyboardButton::web_app(label, WebAppInfo { url });
            request = request.reply_markup(InlineKeyboardMarkup::new(vec![vec![button]]));
        }

        let sent = request
            .await
            .map_err(|e| RelayError::telegram("sendMessage", e))?;
        tracing::debug!(
            chat_id = sent.chat.id.0,
            message_id = sent.id.0,
            "Message sent"
        );
        Ok(SentMessage {
            chat_id: sent.chat.id.0,
            message_id: sent.id.0,
        })
    }

    async fn lookup_chat_id(&self, username: &str) -> Result<i64, RelayError> {
        let chat = self
            .bot
            .get_chat(Recipient::ChannelUsername(format!("@{username}")))
            .await
            .map_err(|e| RelayError::telegram("getChat", e))?;
        Ok(chat.id.0)
    }

    async fn answer_web_app_query(&self, query_id: &str, text: &str) -> Result<(), RelayError> {
        let content = InputMessageContent::Text(InputMessageContentText::new(text));
        let article = InlineQueryResultArticle::new("lead", "Request sent", content);
        self.bot
            .answer_web_app_query(query_id.to_string(), InlineQueryResult::Article(article))
            .await
            .map_err(|e| RelayError::telegram("answerWebAppQuery", e))?;
        Ok(())
    }
}
