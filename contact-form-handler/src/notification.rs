use crate::submission::ValidatedSubmission;
use lettre::{
    message::{header::ContentType, Mailbox},
    Address, Message,
};
use serde::Serialize;
use serde_json::Value;
use tinytemplate::{format, TinyTemplate};
use tracing::warn;

const NOTIFICATION_TEMPLATE_NAME: &str = "notification";
const NOTIFICATION_TEMPLATE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/assets/notification.html"
));

#[derive(Serialize)]
struct Context<'a> {
    name: &'a str,
    email: &'a str,
    company: Option<&'a str>,
    project: Option<&'a str>,
    message: &'a str,
}

/// Builds the email telling the site operator about a submission.
///
/// The submitter is `From` and `Reply-To` so that answering goes straight back to them, while the
/// configured sender identity is the `Sender` and therefore the SMTP envelope sender.
pub fn compose_notification(
    submission: &ValidatedSubmission,
    recipient: &Mailbox,
    sender: &Mailbox,
) -> Result<Message, NotificationError> {
    let builder = Message::builder()
        .sender(sender.clone())
        .to(recipient.clone())
        .subject(submission.subject())
        .header(ContentType::TEXT_HTML);
    let builder = match submission.email.parse::<Address>() {
        Ok(address) => {
            let submitter = Mailbox::new(Some(submission.name.into()), address);
            builder.from(submitter.clone()).reply_to(submitter)
        }
        Err(error) => {
            warn!(
                "Submitter address {} is not usable as a mailbox ({error}), sending from {sender}",
                submission.email
            );
            builder.from(sender.clone())
        }
    };
    builder
        .body(render_notification_body(submission)?)
        .map_err(NotificationError::Message)
}

pub fn render_notification_body(
    submission: &ValidatedSubmission,
) -> Result<String, NotificationError> {
    let mut tt = TinyTemplate::new();
    tt.add_formatter("line_breaks", render_line_breaks);
    tt.add_template(NOTIFICATION_TEMPLATE_NAME, NOTIFICATION_TEMPLATE)
        .map_err(NotificationError::Template)?;
    let context = Context {
        name: submission.name,
        email: submission.email,
        company: submission.company,
        project: submission.project,
        message: submission.message,
    };
    tt.render(NOTIFICATION_TEMPLATE_NAME, &context)
        .map_err(NotificationError::Template)
}

fn render_line_breaks(value: &Value, output: &mut String) -> tinytemplate::error::Result<()> {
    let mut escaped = String::new();
    format(value, &mut escaped)?;
    output.push_str(&escaped.replace("\r\n", "\n").replace('\n', "<br>"));
    Ok(())
}

#[derive(Debug)]
pub enum NotificationError {
    Template(tinytemplate::error::Error),
    Message(lettre::error::Error),
}

impl std::fmt::Display for NotificationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationError::Template(error) => {
                write!(f, "Error rendering notification: {error}")
            }
            NotificationError::Message(error) => write!(f, "Error building message: {error}"),
        }
    }
}

impl std::error::Error for NotificationError {}

#[cfg(test)]
mod tests {
    use super::{compose_notification, render_notification_body};
    use crate::submission::ValidatedSubmission;
    use googletest::prelude::*;
    use lettre::message::Mailbox;

    const MALICIOUS_CONTENT: &str = "<script>doEvil();</script>";

    fn submission() -> ValidatedSubmission<'static> {
        ValidatedSubmission {
            name: "Ada Lovelace",
            email: "ada@example.com",
            company: None,
            project: None,
            message: "Hello",
            captcha_token: None,
        }
    }

    fn recipient() -> Mailbox {
        "Site Owner <owner@example.com>".parse().unwrap()
    }

    fn sender() -> Mailbox {
        "Web contact form <forms@example.com>".parse().unwrap()
    }

    fn formatted(submission: &ValidatedSubmission) -> String {
        let message = compose_notification(submission, &recipient(), &sender()).unwrap();
        String::from_utf8(message.formatted()).unwrap()
    }

    #[test]
    fn renders_all_fields() -> Result<()> {
        let submission = ValidatedSubmission {
            company: Some("Engines Ltd"),
            project: Some("Web app"),
            ..submission()
        };

        let output = render_notification_body(&submission).unwrap();

        verify_that!(
            output,
            all!(
                contains_substring("<h3>New Contact Form Submission</h3>"),
                contains_substring("<p><strong>Name:</strong> Ada Lovelace</p>"),
                contains_substring("<p><strong>Email:</strong> ada@example.com</p>"),
                contains_substring("<p><strong>Company:</strong> Engines Ltd</p>"),
                contains_substring("<p><strong>Project Type:</strong> Web app</p>"),
                contains_substring("<p>Hello</p>")
            )
        )
    }

    #[test]
    fn omits_absent_optional_fields() -> Result<()> {
        let output = render_notification_body(&submission()).unwrap();

        verify_that!(
            output,
            not(contains_substring("Company:")).and(not(contains_substring("Project Type:")))
        )
    }

    #[test]
    fn converts_newlines_in_message_to_line_breaks() -> Result<()> {
        let submission = ValidatedSubmission {
            message: "First line\nSecond line\r\nThird line",
            ..submission()
        };

        let output = render_notification_body(&submission).unwrap();

        verify_that!(
            output,
            contains_substring("<p>First line<br>Second line<br>Third line</p>")
        )
    }

    #[test]
    fn escapes_user_input_in_message() -> Result<()> {
        let submission = ValidatedSubmission {
            message: MALICIOUS_CONTENT,
            ..submission()
        };

        let output = render_notification_body(&submission).unwrap();

        verify_that!(output, not(contains_substring(MALICIOUS_CONTENT)))
    }

    #[test]
    fn escapes_user_input_in_name() -> Result<()> {
        let submission = ValidatedSubmission {
            name: MALICIOUS_CONTENT,
            ..submission()
        };

        let output = render_notification_body(&submission).unwrap();

        verify_that!(output, not(contains_substring(MALICIOUS_CONTENT)))
    }

    #[test]
    fn addresses_recipient_from_and_reply_to_submitter() -> Result<()> {
        let output = formatted(&submission());

        verify_that!(
            output,
            all!(
                contains_substring("To: \"Site Owner\" <owner@example.com>"),
                contains_substring("From: \"Ada Lovelace\" <ada@example.com>"),
                contains_substring("Reply-To: \"Ada Lovelace\" <ada@example.com>"),
                contains_substring("Sender: \"Web contact form\" <forms@example.com>"),
                contains_substring("Subject: Project Inquiry from Ada Lovelace"),
                contains_substring("Content-Type: text/html; charset=utf-8")
            )
        )
    }

    #[test]
    fn uses_sender_envelope() -> Result<()> {
        let message = compose_notification(&submission(), &recipient(), &sender()).unwrap();

        verify_that!(
            message.envelope().from().map(|address| address.to_string()),
            some(eq("forms@example.com"))
        )
    }

    #[test]
    fn sends_from_sender_when_submitter_address_is_unusable() -> Result<()> {
        let submission = ValidatedSubmission {
            email: "not an address",
            ..submission()
        };

        let output = formatted(&submission);

        verify_that!(
            output,
            all!(
                contains_substring("From: \"Web contact form\" <forms@example.com>"),
                not(contains_substring("Reply-To:")),
                contains_substring("not an address")
            )
        )
    }
}
