use thiserror::Error;

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to write request store at {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize request store: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Telegram API {method} failed: {description}")]
    Telegram {
        method: &'static str,
        description: String,
    },

    #[error("Admin chat id not resolved. Set ADMIN_CHAT_ID (see /myid) and check ADMIN_USERNAME")]
    AdminUnresolved,
}

impl RelayError {
    pub fn telegram(method: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Telegram {
            method,
            description: err.to_string(),
        }
    }
}

/// Rejections of a mini-app submission; the `Display` text is what the
/// caller sees in the `error` field of the response.
#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("init_data validation failed")]
    InitDataInvalid,

    #[error("payload missing")]
    PayloadMissing,

    #[error(transparent)]
    Delivery(#[from] RelayError),
}

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("public_base_url is required (flag --public-base-url, env PUBLIC_BASE_URL or config)")]
    MissingBaseUrl,

    #[error("Invalid webhook URL {0}: {1}")]
    InvalidUrl(String, #[source] url::ParseError),

    #[error("setWebhook failed: {0}")]
    Registration(String),
}
