use crate::mail_draft::MailDraft;
use std::time::Duration;

const BANNER_DURATION: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerKind {
    Success,
    Error,
}

/// A transient notification shown to the visitor.
#[derive(Debug, Clone, PartialEq)]
pub struct Banner {
    pub kind: BannerKind,
    pub text: String,
    pub display_for: Duration,
}

impl Banner {
    pub fn success(text: impl Into<String>) -> Self {
        Self::new(BannerKind::Success, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(BannerKind::Error, text)
    }

    fn new(kind: BannerKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            display_for: BANNER_DURATION,
        }
    }
}

/// What the page should do after a call to
/// [`ContactFormClient::submit`](crate::ContactFormClient::submit).
#[derive(Debug, Clone, PartialEq)]
pub enum Feedback {
    /// Another submission was still in flight. Nothing was sent.
    Ignored,
    /// No CAPTCHA token yet. Nothing was sent and nothing should be reset.
    CaptchaRequired(Banner),
    /// The message went through.
    Delivered(Banner),
    /// The endpoint did not accept the message. When `fallback` is present, the page should open
    /// it once its delay has passed.
    Failed {
        banner: Banner,
        fallback: Option<MailDraft>,
    },
}

impl Feedback {
    pub fn banner(&self) -> Option<&Banner> {
        match self {
            Feedback::Ignored => None,
            Feedback::CaptchaRequired(banner) | Feedback::Delivered(banner) => Some(banner),
            Feedback::Failed { banner, .. } => Some(banner),
        }
    }

    pub fn resets_form(&self) -> bool {
        matches!(self, Feedback::Delivered(_))
    }

    /// A token is spent once the endpoint has seen it, whatever the outcome.
    pub fn resets_captcha(&self) -> bool {
        matches!(self, Feedback::Delivered(_) | Feedback::Failed { .. })
    }
}
