use crate::ContactFormError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

const TIMEOUT_OR_DUPLICATE_MESSAGE: &str =
    "reCAPTCHA has expired or was already used. Please refresh the page and try again.";
const MISSING_INPUT_RESPONSE_MESSAGE: &str = "Please complete the reCAPTCHA verification.";
const INVALID_INPUT_RESPONSE_MESSAGE: &str = "Invalid reCAPTCHA response. Please try again.";
const VERIFICATION_FAILED_MESSAGE: &str = "reCAPTCHA verification failed. Please try again.";

#[async_trait]
pub trait CaptchaVerifier: Send + Sync {
    /// Asks the verification service whether `token` was issued to a human at `remote_ip`.
    async fn verify(
        &self,
        token: &str,
        remote_ip: &str,
    ) -> Result<VerificationOutcome, RecaptchaError>;
}

/// Verifies tokens against Google's `siteverify` endpoint.
pub struct RecaptchaVerifier {
    client: Client,
    verify_url: String,
    secret: String,
}

impl RecaptchaVerifier {
    pub fn new(
        secret: impl Into<String>,
        verify_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            verify_url: verify_url.into(),
            secret: secret.into(),
        })
    }
}

#[async_trait]
impl CaptchaVerifier for RecaptchaVerifier {
    async fn verify(
        &self,
        token: &str,
        remote_ip: &str,
    ) -> Result<VerificationOutcome, RecaptchaError> {
        let payload = RecaptchaVerifyPayload {
            secret: &self.secret,
            response: token,
            remoteip: remote_ip,
        };
        let response = self
            .client
            .post(&self.verify_url)
            .form(&payload)
            .send()
            .await
            .map_err(RecaptchaError::Transport)?;
        if !response.status().is_success() {
            warn!(
                "reCAPTCHA verification service answered with status {}",
                response.status()
            );
        }
        response
            .json()
            .await
            .map_err(RecaptchaError::InvalidResponse)
    }
}

#[derive(Serialize)]
struct RecaptchaVerifyPayload<'a> {
    secret: &'a str,
    response: &'a str,
    remoteip: &'a str,
}

/// The parts of a `siteverify` answer which decide the request's fate.
#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct VerificationOutcome {
    #[serde(default)]
    pub success: bool,
    #[serde(rename = "error-codes", default)]
    pub error_codes: Vec<String>,
}

impl VerificationOutcome {
    /// User-facing explanation of a failed verification. The first matching code wins.
    pub fn rejection_message(&self) -> &'static str {
        if self.has_error_code("timeout-or-duplicate") {
            TIMEOUT_OR_DUPLICATE_MESSAGE
        } else if self.has_error_code("missing-input-response") {
            MISSING_INPUT_RESPONSE_MESSAGE
        } else if self.has_error_code("invalid-input-response") {
            INVALID_INPUT_RESPONSE_MESSAGE
        } else {
            VERIFICATION_FAILED_MESSAGE
        }
    }

    fn has_error_code(&self, code: &str) -> bool {
        self.error_codes.iter().any(|e| e == code)
    }
}

#[derive(Debug)]
pub enum RecaptchaError {
    Transport(reqwest::Error),
    InvalidResponse(reqwest::Error),
}

impl RecaptchaError {
    pub fn into_contact_form_error(self) -> ContactFormError {
        ContactFormError::CaptchaServiceUnavailable(self.to_string())
    }
}

impl std::fmt::Display for RecaptchaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecaptchaError::Transport(error) => {
                write!(f, "Error contacting reCAPTCHA service: {error}")
            }
            RecaptchaError::InvalidResponse(error) => {
                write!(f, "Unreadable response from reCAPTCHA service: {error}")
            }
        }
    }
}

impl std::error::Error for RecaptchaError {}
