mod config;
mod mailer;
mod notification;
mod recaptcha;
mod response;
mod secrets;
mod submission;

use anyhow::Context;
use config::Config;
use lambda_http::{
    http::Method, request::RequestContext, run, service_fn, Body, Error, Request, RequestExt,
    Response,
};
use lettre::message::Mailbox;
use mailer::{Mailer, SmtpMailer};
use notification::compose_notification;
use recaptcha::{CaptchaVerifier, RecaptchaError, RecaptchaVerifier};
use response::{preflight_response, SubmissionResult};
use secrets::{AwsSecretsManagerSecretRepository, SecretRepository};
use std::fmt::Display;
use submission::{ContactFormSubmission, ValidatedSubmission};
use tracing::{error, info, warn};

const UNKNOWN_SOURCE_IP: &str = "unknown";

const MALFORMED_INPUT_MESSAGE: &str = "Invalid request format";
const MISSING_FIELD_MESSAGE: &str = "Name, email, and message are required";
const CAPTCHA_MISSING_MESSAGE: &str = "Please complete the reCAPTCHA verification.";

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    let mut config = Config::from_env()?;
    if let Some(secrets_name) = config.secrets_name.clone() {
        let repository = AwsSecretsManagerSecretRepository::open().await;
        config.load_secrets(&repository, &secrets_name).await?;
    }
    let handler = ContactFormHandler::from_config(&config)?;
    run(service_fn(|event| handler.handle(event))).await
}

/// Processes one contact form request per invocation. Holds no per-request state, so a single
/// instance serves the lifetime of the Lambda process.
struct ContactFormHandler<VerifierT: CaptchaVerifier, MailerT: Mailer> {
    verifier: Option<VerifierT>,
    mailer: Option<MailerT>,
    recipient: Mailbox,
    sender: Mailbox,
}

impl ContactFormHandler<RecaptchaVerifier, SmtpMailer> {
    fn from_config(config: &Config) -> anyhow::Result<Self> {
        let verifier = match config.captcha_secret.as_deref() {
            Some(secret) => Some(
                RecaptchaVerifier::new(secret, &config.captcha_verify_url, config.captcha_timeout)
                    .context("Unable to build reCAPTCHA client")?,
            ),
            None => {
                warn!("RECAPTCHA_SECRET_KEY not configured, submissions will not be verified");
                None
            }
        };
        let mailer = match config.smtp_credentials() {
            Some(credentials) => Some(
                SmtpMailer::new(&config.smtp_url, Some(credentials), config.smtp_timeout)
                    .context("Unable to build SMTP transport")?,
            ),
            None => {
                warn!("SMTP_PASSWORD not configured, submissions will only be logged");
                None
            }
        };
        Ok(Self::new(
            config.recipient.clone(),
            config.sender.clone(),
            verifier,
            mailer,
        ))
    }
}

impl<VerifierT: CaptchaVerifier, MailerT: Mailer> ContactFormHandler<VerifierT, MailerT> {
    fn new(
        recipient: Mailbox,
        sender: Mailbox,
        verifier: Option<VerifierT>,
        mailer: Option<MailerT>,
    ) -> Self {
        Self {
            verifier,
            mailer,
            recipient,
            sender,
        }
    }

    async fn handle(&self, event: Request) -> Result<Response<Body>, Error> {
        if event.method() == Method::OPTIONS {
            return Ok(preflight_response());
        }
        let result = match self.process_submission(&event).await {
            Ok(()) => SubmissionResult::accepted(),
            Err(error) => {
                error.log();
                error.into_result()
            }
        };
        Ok(result.into_response())
    }

    async fn process_submission(&self, event: &Request) -> Result<(), ContactFormError> {
        let submission = ContactFormSubmission::parse(event.body().as_ref())?;
        let validated_submission = submission.validate()?;
        self.verify_captcha(&validated_submission, &source_ip(event))
            .await?;
        self.deliver(&validated_submission).await
    }

    async fn verify_captcha<'a>(
        &self,
        submission: &ValidatedSubmission<'a>,
        remote_ip: &str,
    ) -> Result<(), ContactFormError> {
        let Some(verifier) = self.verifier.as_ref() else {
            info!("reCAPTCHA not configured, skipping verification");
            return Ok(());
        };
        let Some(token) = submission.captcha_token else {
            return Err(ContactFormError::CaptchaMissing);
        };
        let outcome = verifier
            .verify(token, remote_ip)
            .await
            .map_err(RecaptchaError::into_contact_form_error)?;
        if outcome.success {
            info!("reCAPTCHA verification passed");
            Ok(())
        } else {
            Err(ContactFormError::CaptchaRejected {
                message: outcome.rejection_message(),
                error_codes: outcome.error_codes,
            })
        }
    }

    async fn deliver<'a>(
        &self,
        submission: &ValidatedSubmission<'a>,
    ) -> Result<(), ContactFormError> {
        submission.log();
        let Some(mailer) = self.mailer.as_ref() else {
            warn!("Email not configured, submission logged only");
            return Ok(());
        };
        let message = compose_notification(submission, &self.recipient, &self.sender)
            .map_err(|error| ContactFormError::InternalError(error.to_string()))?;
        mailer
            .send(message)
            .await
            .map_err(|error| ContactFormError::DeliveryFailed(error.to_string()))?;
        info!("Notification sent to {}", self.recipient);
        Ok(())
    }
}

/// Caller address as reported by API Gateway or the function URL.
fn source_ip(event: &Request) -> String {
    let source_ip = match event.request_context_ref() {
        Some(RequestContext::ApiGatewayV2(context)) => context.http.source_ip.clone(),
        Some(RequestContext::ApiGatewayV1(context)) => context.identity.source_ip.clone(),
        _ => None,
    };
    source_ip.unwrap_or_else(|| UNKNOWN_SOURCE_IP.into())
}

#[derive(Debug)]
enum ContactFormError {
    MalformedInput(String),
    MissingRequiredField,
    CaptchaMissing,
    CaptchaRejected {
        message: &'static str,
        error_codes: Vec<String>,
    },
    CaptchaServiceUnavailable(String),
    DeliveryFailed(String),
    InternalError(String),
}

impl ContactFormError {
    fn log(&self) {
        match self {
            ContactFormError::MalformedInput(_)
            | ContactFormError::MissingRequiredField
            | ContactFormError::CaptchaMissing
            | ContactFormError::CaptchaRejected { .. } => {
                warn!("Rejected contact form submission: {self}");
            }
            ContactFormError::CaptchaServiceUnavailable(_)
            | ContactFormError::DeliveryFailed(_)
            | ContactFormError::InternalError(_) => {
                error!("Internal error processing contact form submission: {self}");
            }
        }
    }

    fn into_result(self) -> SubmissionResult {
        match self {
            ContactFormError::MalformedInput(_) => {
                SubmissionResult::rejected(MALFORMED_INPUT_MESSAGE)
            }
            ContactFormError::MissingRequiredField => {
                SubmissionResult::rejected(MISSING_FIELD_MESSAGE)
            }
            ContactFormError::CaptchaMissing => SubmissionResult::rejected(CAPTCHA_MISSING_MESSAGE),
            ContactFormError::CaptchaRejected { message, .. } => SubmissionResult::rejected(message),
            ContactFormError::CaptchaServiceUnavailable(_)
            | ContactFormError::DeliveryFailed(_)
            | ContactFormError::InternalError(_) => SubmissionResult::internal_error(),
        }
    }
}

impl Display for ContactFormError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContactFormError::MalformedInput(description) => {
                write!(f, "Malformed request body: {description}")
            }
            ContactFormError::MissingRequiredField => write!(f, "Missing fields in request"),
            ContactFormError::CaptchaMissing => write!(f, "Missing reCAPTCHA response"),
            ContactFormError::CaptchaRejected { error_codes, .. } => {
                write!(f, "reCAPTCHA verification failed: {error_codes:?}")
            }
            ContactFormError::CaptchaServiceUnavailable(description) => {
                write!(f, "reCAPTCHA service unavailable: {description}")
            }
            ContactFormError::DeliveryFailed(description) => {
                write!(f, "Error sending message: {description}")
            }
            ContactFormError::InternalError(description) => {
                write!(f, "Internal error: {description}")
            }
        }
    }
}

impl std::error::Error for ContactFormError {}

#[derive(Debug)]
enum EnvironmentError {
    MissingSecret(String),
}

impl Display for EnvironmentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvironmentError::MissingSecret(key) => write!(f, "Missing secret {key}"),
        }
    }
}

impl std::error::Error for EnvironmentError {}
