//! Client side of the contact form: posts the visitor's message to the contact-form handler and
//! tells the page what to show afterwards.

mod feedback;
mod mail_draft;

pub use feedback::{Banner, BannerKind, Feedback};
pub use mail_draft::MailDraft;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

const CAPTCHA_REQUIRED_MESSAGE: &str = "Please complete the reCAPTCHA verification.";
const DELIVERED_MESSAGE: &str = "Message sent successfully! We will get back to you soon.";
const CAPTCHA_EXPIRED_MESSAGE: &str =
    "reCAPTCHA has expired. Please complete it again and resubmit.";
const FALLBACK_MESSAGE: &str = "Error sending message. Opening email client as backup...";
const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error occurred";

/// The values the visitor typed into the form.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FormFields {
    pub name: String,
    pub email: String,
    pub company: Option<String>,
    pub project: Option<String>,
    pub message: String,
}

impl FormFields {
    pub fn company(&self) -> Option<&str> {
        non_blank(&self.company)
    }

    pub fn project(&self) -> Option<&str> {
        non_blank(&self.project)
    }

    pub fn subject(&self) -> String {
        match self.company() {
            Some(company) => format!("Project Inquiry from {} ({company})", self.name),
            None => format!("Project Inquiry from {}", self.name),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.trim().is_empty())
}

pub struct ContactFormClient {
    client: Client,
    endpoint: String,
    recipient: String,
    in_flight: AtomicBool,
}

impl ContactFormClient {
    /// `recipient` is the address used for the mail-client fallback.
    pub fn new(
        endpoint: impl Into<String>,
        recipient: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().build()?,
            endpoint: endpoint.into(),
            recipient: recipient.into(),
            in_flight: AtomicBool::new(false),
        })
    }

    /// Sends one submission. Only one may be in flight at a time; any call made meanwhile returns
    /// [`Feedback::Ignored`] without sending anything.
    pub async fn submit(&self, fields: &FormFields, captcha_token: Option<&str>) -> Feedback {
        let Some(_in_flight) = InFlight::acquire(&self.in_flight) else {
            info!("Submission already in progress, ignoring");
            return Feedback::Ignored;
        };
        let Some(token) = captcha_token.filter(|token| !token.trim().is_empty()) else {
            return Feedback::CaptchaRequired(Banner::error(CAPTCHA_REQUIRED_MESSAGE));
        };

        match self.post(fields, token).await {
            Ok(()) => {
                info!("Contact form submission delivered");
                Feedback::Delivered(Banner::success(DELIVERED_MESSAGE))
            }
            Err(error) => self.failure_feedback(fields, error),
        }
    }

    async fn post(&self, fields: &FormFields, token: &str) -> Result<(), SubmitError> {
        let payload = SubmissionPayload {
            name: &fields.name,
            email: &fields.email,
            company: fields.company(),
            project: fields.project(),
            message: &fields.message,
            captcha_token: token,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(SubmitError::Transport)?;
        let status = response.status();
        let body = response.text().await.map_err(SubmitError::Transport)?;

        match serde_json::from_str::<EndpointReply>(&body) {
            Ok(reply) if status.is_success() && reply.success => Ok(()),
            Ok(EndpointReply {
                message: Some(message),
                ..
            }) if !message.is_empty() => Err(SubmitError::Rejected(message)),
            _ if !status.is_success() => Err(SubmitError::Rejected(format!(
                "HTTP error! status: {}",
                status.as_u16()
            ))),
            Ok(_) => Err(SubmitError::Rejected(UNKNOWN_ERROR_MESSAGE.into())),
            Err(error) => Err(SubmitError::InvalidReply(error)),
        }
    }

    fn failure_feedback(&self, fields: &FormFields, error: SubmitError) -> Feedback {
        warn!("Contact form submission failed: {error}");
        let reason = error.to_string();
        if reason.contains("reCAPTCHA has expired") {
            Feedback::Failed {
                banner: Banner::error(CAPTCHA_EXPIRED_MESSAGE),
                fallback: None,
            }
        } else if reason.contains("reCAPTCHA") {
            Feedback::Failed {
                banner: Banner::error(reason),
                fallback: None,
            }
        } else {
            Feedback::Failed {
                banner: Banner::error(FALLBACK_MESSAGE),
                fallback: Some(MailDraft::compose(&self.recipient, fields)),
            }
        }
    }
}

/// Holds the client's in-flight flag until dropped.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Serialize)]
struct SubmissionPayload<'a> {
    name: &'a str,
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    company: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    project: Option<&'a str>,
    message: &'a str,
    #[serde(rename = "g-recaptcha-response")]
    captcha_token: &'a str,
}

#[derive(Deserialize)]
struct EndpointReply {
    #[serde(default)]
    success: bool,
    message: Option<String>,
}

#[derive(Debug)]
enum SubmitError {
    Transport(reqwest::Error),
    InvalidReply(serde_json::Error),
    Rejected(String),
}

impl std::fmt::Display for SubmitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmitError::Transport(error) => write!(f, "Error contacting endpoint: {error}"),
            SubmitError::InvalidReply(error) => write!(f, "Unreadable reply from endpoint: {error}"),
            SubmitError::Rejected(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for SubmitError {}
