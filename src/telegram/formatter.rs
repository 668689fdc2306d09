use crate::models::{Submission, SubmissionKind, Submitter};

const MAX_FIELD_CHARS: usize = 1000;

pub fn format_submission(submission: &Submission) -> String {
    let header = match submission.kind {
        SubmissionKind::Lead => "New lead",
        _ => "New question",
    };
    let mut lines = vec![format!("<b>{header}</b>")];

    let fields = [
        ("Name", &submission.name),
        ("Project", &submission.project),
        ("Goal", &submission.goal),
        ("Budget", &submission.budget),
        ("Contact", &submission.contact),
        ("Message", &submission.message),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            lines.push(labelled(label, value));
        }
    }

    if let Some(user_line) = submission.user.as_ref().and_then(submitter_line) {
        lines.push(labelled("User", &user_line));
    }

    if let Some(created_at) = &submission.created_at {
        lines.push(labelled("Time", created_at));
    }

    lines.push(String::new());
    if submission.client_chat_id().is_some() {
        lines.push(
            "<i>Reply to this message and the bot will forward your answer to the client.</i>"
                .to_string(),
        );
    } else {
        lines.push("<i>Auto-reply unavailable: the client's Telegram id is unknown.</i>".to_string());
    }

    lines.join("\n")
}

fn labelled(label: &str, value: &str) -> String {
    format!(
        "<b>{label}:</b> {}",
        escape_html(&truncate(value, MAX_FIELD_CHARS))
    )
}

fn submitter_line(user: &Submitter) -> Option<String> {
    let parts: Vec<String> = [
        user.first_name.clone(),
        user.last_name.clone(),
        user.username.as_ref().map(|u| format!("@{u}")),
        user.id.map(|id| format!("(id: {id})")),
    ]
    .into_iter()
    .flatten()
    .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let boundary = s.floor_char_boundary(max);
        format!("{}... (truncated)", &s[..boundary])
    }
}
