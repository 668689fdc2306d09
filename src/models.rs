use serde::{Deserialize, Deserializer, Serialize};

/// Body of `POST /webapp`. Non-string `init_data`/`query_id` read as absent.
#[derive(Debug, Default, Deserialize)]
pub struct WebAppSubmission {
    #[serde(default, deserialize_with = "string_only")]
    pub init_data: Option<String>,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "string_only")]
    pub query_id: Option<String>,
}

/// JSON answered to both inbound endpoints.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelayResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RelayResponse {
    pub fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    pub fn rejected(error: impl ToString) -> Self {
        Self {
            ok: false,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SubmissionKind {
    #[default]
    Lead,
    Question,
    Other(String),
}

impl SubmissionKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "lead" => Self::Lead,
            "question" => Self::Question,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Lead => "lead",
            Self::Question => "question",
            Self::Other(tag) => tag,
        }
    }
}

impl<'de> Deserialize<'de> for SubmissionKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(lenient_text(deserializer)?
            .map(|tag| Self::from_tag(&tag))
            .unwrap_or_default())
    }
}

/// Who submitted a lead, as reported by the mini-app or the bot update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Submitter {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub first_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub last_name: Option<String>,
}

impl Submitter {
    /// `"first last"`, or whichever part exists, or `"-"`.
    pub fn display_name(&self) -> String {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();
        if parts.is_empty() {
            "-".to_string()
        } else {
            parts.join(" ")
        }
    }
}

impl From<&Sender> for Submitter {
    fn from(sender: &Sender) -> Self {
        Self {
            id: Some(sender.id).filter(|id| *id != 0),
            username: sender.username.clone(),
            first_name: sender.first_name.clone(),
            last_name: sender.last_name.clone(),
        }
    }
}

/// A lead or question. Field values are taken as text whatever their JSON
/// type; empty strings count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Submission {
    #[serde(rename = "type", default)]
    pub kind: SubmissionKind,
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub project: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub goal: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub budget: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub contact: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "lenient_submitter")]
    pub user: Option<Submitter>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub created_at: Option<String>,
}

impl Submission {
    /// Accepts only a non-empty JSON object.
    pub fn from_payload(payload: &serde_json::Value) -> Option<Self> {
        match payload.as_object() {
            Some(map) if !map.is_empty() => serde_json::from_value(payload.clone()).ok(),
            _ => None,
        }
    }

    /// Decodes `web_app_data.data` sent through the bot. Anything that is not
    /// a JSON object is wrapped as an `unknown` submission carrying the raw text.
    pub fn from_app_data(raw: &str) -> Self {
        serde_json::from_str::<serde_json::Value>(raw)
            .ok()
            .filter(serde_json::Value::is_object)
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_else(|| Self {
                kind: SubmissionKind::Other("unknown".to_string()),
                message: Some(raw.to_string()),
                ..Self::default()
            })
    }

    pub fn client_chat_id(&self) -> Option<i64> {
        self.user.as_ref().and_then(|user| user.id)
    }
}

fn value_to_text(value: serde_json::Value) -> Option<String> {
    let text = match value {
        serde_json::Value::Null => return None,
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    };
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn string_only<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(s)) => Some(s),
        _ => None,
    })
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<serde_json::Value>::deserialize(deserializer)?.and_then(value_to_text))
}

/// Numbers or numeric strings; zero counts as absent.
fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    let id = match raw {
        Some(serde_json::Value::Number(n)) => n.as_i64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    Ok(id.filter(|id| *id != 0))
}

fn lenient_submitter<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Submitter>, D::Error> {
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .filter(serde_json::Value::is_object)
        .and_then(|value| serde_json::from_value(value).ok()))
}

/// The subset of a Bot API update this service reacts to.
#[derive(Debug, Default, Deserialize)]
pub struct Update {
    #[serde(default)]
    pub message: Option<IncomingMessage>,
    #[serde(default)]
    pub edited_message: Option<IncomingMessage>,
}

impl Update {
    pub fn into_message(self) -> Option<IncomingMessage> {
        self.message.or(self.edited_message)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub message_id: i32,
    pub chat: ChatRef,
    #[serde(default)]
    pub from: Option<Sender>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub reply_to_message: Option<RepliedMessage>,
    #[serde(default)]
    pub web_app_data: Option<WebAppData>,
}

impl IncomingMessage {
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    /// Text, or the caption when the text is absent or empty, trimmed.
    pub fn reply_text(&self) -> &str {
        [self.text.as_deref(), self.caption.as_deref()]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
            .unwrap_or("")
            .trim()
    }

    pub fn sender_username(&self) -> Option<&str> {
        self.from.as_ref().and_then(|s| s.username.as_deref())
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ChatRef {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sender {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RepliedMessage {
    pub message_id: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebAppData {
    pub data: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mistyped_envelope_fields_keep_payload() {
        let body: WebAppSubmission = serde_json::from_value(json!({
            "init_data": 7,
            "payload": {"name": "Jane"},
            "query_id": 12345
        }))
        .unwrap();
        assert!(body.init_data.is_none());
        assert!(body.query_id.is_none());
        assert_eq!(body.payload, Some(json!({"name": "Jane"})));

        let body: WebAppSubmission =
            serde_json::from_value(json!({"init_data": "a=1", "query_id": "AAQ"})).unwrap();
        assert_eq!(body.init_data.as_deref(), Some("a=1"));
        assert_eq!(body.query_id.as_deref(), Some("AAQ"));
    }

    #[test]
    fn submission_decodes_known_fields() {
        let payload = json!({
            "type": "question",
            "name": "Jane",
            "message": "How much?",
            "budget": 5000,
            "user": {"id": 555, "username": "jane", "first_name": "Jane"},
            "created_at": "2026-02-01T10:00:00Z"
        });
        let submission = Submission::from_payload(&payload).unwrap();
        assert_eq!(submission.kind, SubmissionKind::Question);
        assert_eq!(submission.name.as_deref(), Some("Jane"));
        assert_eq!(submission.budget.as_deref(), Some("5000"));
        assert_eq!(submission.client_chat_id(), Some(555));
        assert_eq!(submission.created_at.as_deref(), Some("2026-02-01T10:00:00Z"));
    }

    #[test]
    fn submission_kind_defaults_to_lead_and_keeps_custom_tags() {
        let lead = Submission::from_payload(&json!({"name": "x"})).unwrap();
        assert_eq!(lead.kind, SubmissionKind::Lead);
        let custom = Submission::from_payload(&json!({"type": "callback"})).unwrap();
        assert_eq!(custom.kind, SubmissionKind::Other("callback".to_string()));
        assert_eq!(custom.kind.as_str(), "callback");
    }

    #[test]
    fn empty_or_non_object_payload_rejected() {
        assert!(Submission::from_payload(&json!({})).is_none());
        assert!(Submission::from_payload(&json!(null)).is_none());
        assert!(Submission::from_payload(&json!("lead")).is_none());
        assert!(Submission::from_payload(&json!([1, 2])).is_none());
    }

    #[test]
    fn empty_strings_count_as_absent() {
        let submission = Submission::from_payload(&json!({"name": "  ", "goal": ""})).unwrap();
        assert!(submission.name.is_none());
        assert!(submission.goal.is_none());
    }

    #[test]
    fn submitter_id_accepts_numeric_strings_and_ignores_garbage() {
        let s: Submitter = serde_json::from_value(json!({"id": "42"})).unwrap();
        assert_eq!(s.id, Some(42));
        let s: Submitter = serde_json::from_value(json!({"id": "abc"})).unwrap();
        assert_eq!(s.id, None);
        let s: Submitter = serde_json::from_value(json!({"id": 0})).unwrap();
        assert_eq!(s.id, None);
    }

    #[test]
    fn non_object_user_is_ignored() {
        let submission = Submission::from_payload(&json!({"name": "x", "user": "bob"})).unwrap();
        assert!(submission.user.is_none());
        assert!(submission.client_chat_id().is_none());
    }

    #[test]
    fn display_name_variants() {
        let full = Submitter {
            first_name: Some("Jane".into()),
            last_name: Some("Doe".into()),
            ..Submitter::default()
        };
        assert_eq!(full.display_name(), "Jane Doe");
        let first = Submitter {
            first_name: Some("Jane".into()),
            ..Submitter::default()
        };
        assert_eq!(first.display_name(), "Jane");
        assert_eq!(Submitter::default().display_name(), "-");
    }

    #[test]
    fn app_data_falls_back_to_raw_text() {
        let raw = Submission::from_app_data("plain words");
        assert_eq!(raw.kind, SubmissionKind::Other("unknown".to_string()));
        assert_eq!(raw.message.as_deref(), Some("plain words"));

        let array = Submission::from_app_data("[1,2]");
        assert_eq!(array.message.as_deref(), Some("[1,2]"));

        let parsed = Submission::from_app_data(r#"{"type":"question","message":"hi"}"#);
        assert_eq!(parsed.kind, SubmissionKind::Question);
        assert_eq!(parsed.message.as_deref(), Some("hi"));
    }

    #[test]
    fn update_prefers_message_over_edited_message() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 1,
            "message": {"message_id": 10, "chat": {"id": 1}, "text": "a"},
            "edited_message": {"message_id": 11, "chat": {"id": 1}, "text": "b"}
        }))
        .unwrap();
        assert_eq!(update.into_message().unwrap().message_id, 10);

        let edited: Update = serde_json::from_value(json!({
            "edited_message": {"message_id": 11, "chat": {"id": 1}}
        }))
        .unwrap();
        assert_eq!(edited.into_message().unwrap().message_id, 11);
    }

    #[test]
    fn realistic_reply_update_decodes() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 900,
            "message": {
                "message_id": 77,
                "date": 1_760_000_000,
                "chat": {"id": 100, "type": "private"},
                "from": {"id": 100, "is_bot": false, "first_name": "Admin", "username": "Boss"},
                "text": "  See you tomorrow  ",
                "reply_to_message": {
                    "message_id": 50,
                    "chat": {"id": 100, "type": "private"},
                    "text": "New lead"
                }
            }
        }))
        .unwrap();
        let message = update.into_message().unwrap();
        assert_eq!(message.reply_to_message.unwrap().message_id, 50);
        assert_eq!(message.reply_text(), "See you tomorrow");
        assert_eq!(message.sender_username(), Some("Boss"));
    }

    #[test]
    fn reply_text_falls_back_to_caption() {
        let message: IncomingMessage = serde_json::from_value(json!({
            "message_id": 1,
            "chat": {"id": 1},
            "text": "",
            "caption": " photo caption "
        }))
        .unwrap();
        assert_eq!(message.reply_text(), "photo caption");
    }

    #[test]
    fn response_omits_absent_error() {
        let ok = serde_json::to_value(RelayResponse::ok()).unwrap();
        assert_eq!(ok, json!({"ok": true}));
        let rejected = serde_json::to_value(RelayResponse::rejected("payload missing")).unwrap();
        assert_eq!(rejected, json!({"ok": false, "error": "payload missing"}));
    }
}
