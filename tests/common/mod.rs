#![allow(dead_code)]

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use lead_relay::error::RelayError;
use lead_relay::identity::AdminIdentity;
use lead_relay::models::Update;
use lead_relay::relay::{Relay, RelaySettings};
use lead_relay::store::{JsonFileStore, RetentionPolicy, format_timestamp, now_seconds};
use lead_relay::telegram::client::{Messenger, OutgoingMessage, SentMessage};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

pub const TOKEN: &str = "123456:TEST-TOKEN";
pub const ADMIN_CHAT: i64 = 100;
pub const CLIENT_CHAT: i64 = 555;
pub const FIRST_SENT_ID: i32 = 1000;

/// Records every outbound call instead of talking to Telegram.
pub struct RecordingMessenger {
    pub sent: Mutex<Vec<OutgoingMessage>>,
    pub acks: Mutex<Vec<(String, String)>>,
    pub lookups: Mutex<Vec<String>>,
    pub failing_chats: Mutex<HashSet<i64>>,
    pub lookup_result: Mutex<Option<i64>>,
    pub fail_acks: Mutex<bool>,
    next_id: AtomicI32,
}

impl Default for RecordingMessenger {
    fn default() -> Self {
        Self {
            sent: Mutex::default(),
            acks: Mutex::default(),
            lookups: Mutex::default(),
            failing_chats: Mutex::default(),
            lookup_result: Mutex::default(),
            fail_acks: Mutex::new(false),
            next_id: AtomicI32::new(FIRST_SENT_ID),
        }
    }
}

impl RecordingMessenger {
    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, chat_id: i64) -> Vec<OutgoingMessage> {
        self.sent()
            .into_iter()
            .filter(|m| m.chat_id == chat_id)
            .collect()
    }

    pub fn outbound_calls(&self) -> usize {
        self.sent.lock().unwrap().len()
            + self.acks.lock().unwrap().len()
            + self.lookups.lock().unwrap().len()
    }

    pub fn fail_chat(&self, chat_id: i64) {
        self.failing_chats.lock().unwrap().insert(chat_id);
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_message(&self, message: OutgoingMessage) -> Result<SentMessage, RelayError> {
        if self.failing_chats.lock().unwrap().contains(&message.chat_id) {
            return Err(RelayError::telegram(
                "sendMessage",
                "Forbidden: bot was blocked by the user",
            ));
        }
        let chat_id = message.chat_id;
        self.sent.lock().unwrap().push(message);
        Ok(SentMessage {
            chat_id,
            message_id: self.next_id.fetch_add(1, Ordering::SeqCst),
        })
    }

    async fn lookup_chat_id(&self, username: &str) -> Result<i64, RelayError> {
        self.lookups.lock().unwrap().push(username.to_string());
        self.lookup_result
            .lock()
            .unwrap()
            .ok_or_else(|| RelayError::telegram("getChat", "Bad Request: chat not found"))
    }

    async fn answer_web_app_query(&self, query_id: &str, text: &str) -> Result<(), RelayError> {
        if *self.fail_acks.lock().unwrap() {
            return Err(RelayError::telegram(
                "answerWebAppQuery",
                "Bad Request: query is too old",
            ));
        }
        self.acks
            .lock()
            .unwrap()
            .push((query_id.to_string(), text.to_string()));
        Ok(())
    }
}

pub struct Harness {
    pub relay: Arc<Relay>,
    pub messenger: Arc<RecordingMessenger>,
    pub store: Arc<JsonFileStore>,
    _dir: tempfile::TempDir,
}

pub fn harness(admin: AdminIdentity, settings: RelaySettings) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let messenger = Arc::new(RecordingMessenger::default());
    let store = Arc::new(JsonFileStore::new(
        dir.path().join("leads_store.json"),
        RetentionPolicy {
            retention_days: 30,
            max_items: 3000,
        },
    ));
    let relay = Arc::new(Relay::new(
        messenger.clone(),
        store.clone(),
        admin,
        settings,
    ));
    Harness {
        relay,
        messenger,
        store,
        _dir: dir,
    }
}

/// Admin configured by id and username, strict checks, no init-data verification.
pub fn default_harness() -> Harness {
    harness(
        AdminIdentity::new(Some("boss"), Some(ADMIN_CHAT), true),
        settings(),
    )
}

pub fn settings() -> RelaySettings {
    RelaySettings {
        bot_token: TOKEN.to_string(),
        verify_init_data: false,
        webapp_url: None,
    }
}

pub fn lead_payload() -> serde_json::Value {
    serde_json::json!({
        "type": "lead",
        "name": "Jane",
        "contact": "+1 555 0100",
        "user": {"id": CLIENT_CHAT, "username": "jane", "first_name": "Jane", "last_name": "Doe"},
        "created_at": format_timestamp(now_seconds())
    })
}

pub fn update(message: serde_json::Value) -> Update {
    serde_json::from_value(serde_json::json!({"update_id": 1, "message": message})).unwrap()
}

/// A message from `username` in `chat_id` replying to `reply_to`.
pub fn reply_update(
    chat_id: i64,
    username: &str,
    message_id: i32,
    reply_to: i32,
    text: Option<&str>,
) -> Update {
    update(serde_json::json!({
        "message_id": message_id,
        "chat": {"id": chat_id, "type": "private"},
        "from": {"id": chat_id, "is_bot": false, "first_name": "Admin", "username": username},
        "text": text,
        "reply_to_message": {"message_id": reply_to, "chat": {"id": chat_id}}
    }))
}

/// Query string signed the way a genuine mini-app session is.
pub fn signed_init_data(pairs: &[(&str, &str)], token: &str) -> String {
    let mut sorted: Vec<_> = pairs.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let check = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("\n");
    let key = Sha256::digest(token.as_bytes());
    let mut mac = Hmac::<Sha256>::new_from_slice(&key).unwrap();
    mac.update(check.as_bytes());
    let hash = hex::encode(mac.finalize().into_bytes());

    let mut query: Vec<String> = pairs
        .iter()
        .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
        .collect();
    query.push(format!("hash={hash}"));
    query.join("&")
}
