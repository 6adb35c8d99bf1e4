use crate::FormFields;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::time::Duration;

/// Characters left alone by JavaScript's `encodeURIComponent`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

const OPEN_AFTER: Duration = Duration::from_secs(2);

/// A pre-filled message for the visitor's own mail client, offered when the endpoint could not
/// take the submission.
#[derive(Debug, Clone, PartialEq)]
pub struct MailDraft {
    pub url: String,
    pub open_after: Duration,
}

impl MailDraft {
    pub fn compose(recipient: &str, fields: &FormFields) -> Self {
        let url = format!(
            "mailto:{recipient}?subject={}&body={}",
            encode_component(&fields.subject()),
            encode_component(&draft_body(fields)),
        );
        Self {
            url,
            open_after: OPEN_AFTER,
        }
    }
}

fn draft_body(fields: &FormFields) -> String {
    let mut lines = vec![
        format!("Name: {}", fields.name),
        format!("Email: {}", fields.email),
    ];
    if let Some(company) = fields.company() {
        lines.push(format!("Company: {company}"));
    }
    if let Some(project) = fields.project() {
        lines.push(format!("Project Type: {project}"));
    }
    lines.push(String::new());
    lines.push("Message:".into());
    lines.push(fields.message.clone());
    lines.join("\n")
}

fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}
