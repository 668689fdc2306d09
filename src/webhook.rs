use crate::config::Config;
use crate::error::WebhookError;
use crate::telegram::client::TelegramMessenger;
use std::time::Duration;
use teloxide::prelude::*;
use url::Url;

const UPDATE_PATH: &str = "telegram";

/// `<base>/telegram`, tolerating a trailing slash on the base.
pub fn webhook_url(public_base_url: &str) -> Result<Url, WebhookError> {
    let trimmed = public_base_url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(WebhookError::MissingBaseUrl);
    }
    let raw = format!("{trimmed}/{UPDATE_PATH}");
    Url::parse(&raw).map_err(|e| WebhookError::InvalidUrl(raw, e))
}

pub async fn run_set_webhook(config: &Config, public_base_url: Option<String>) -> anyhow::Result<()> {
    let base = public_base_url
        .or_else(|| config.public_base_url.as_ref().map(Url::to_string))
        .ok_or(WebhookError::MissingBaseUrl)?;
    let url = webhook_url(&base)?;

    let bot = TelegramMessenger::build_bot(
        &config.bot_token,
        Duration::from_secs(config.request_timeout_seconds),
    )?;
    bot.set_webhook(url.clone())
        .await
        .map_err(|e| WebhookError::Registration(e.to_string()))?;

    tracing::info!(%url, "Webhook registered");
    println!("Webhook set to {url}");
    Ok(())
}
