use crate::secrets::{ContactSecrets, SecretRepository};
use anyhow::{anyhow, ensure, Context};
use lettre::{message::Mailbox, transport::smtp::authentication::Credentials};
use std::time::Duration;

const DEFAULT_RECIPIENT: &str = "Site Owner <owner@localhost>";
const DEFAULT_SENDER: &str = "Web contact form <noreply@localhost>";

const RECAPTCHA_VERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";
const SMTP_URL: &str = "smtps://smtp.gmail.com";

const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Deployment settings, read once at process startup.
///
/// Recipient and sender identity are plain configuration rather than constants. A missing
/// reCAPTCHA secret disables verification, and a missing SMTP password puts the handler into
/// log-only mode.
#[derive(Clone)]
pub struct Config {
    pub recipient: Mailbox,
    pub sender: Mailbox,
    pub captcha_secret: Option<String>,
    pub captcha_verify_url: String,
    pub captcha_timeout: Duration,
    pub smtp_url: String,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_timeout: Duration,
    pub secrets_name: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from a variable lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| non_blank(lookup(key));
        Ok(Self {
            recipient: parse_mailbox("CONTACT_RECIPIENT", get("CONTACT_RECIPIENT"), DEFAULT_RECIPIENT)?,
            sender: parse_mailbox("CONTACT_SENDER", get("CONTACT_SENDER"), DEFAULT_SENDER)?,
            captcha_secret: get("RECAPTCHA_SECRET_KEY"),
            captcha_verify_url: get("RECAPTCHA_VERIFY_URL").unwrap_or(RECAPTCHA_VERIFY_URL.into()),
            captcha_timeout: parse_timeout("RECAPTCHA_TIMEOUT_SECS", get("RECAPTCHA_TIMEOUT_SECS"))?,
            smtp_url: get("SMTP_URL").unwrap_or(SMTP_URL.into()),
            smtp_username: get("SMTP_USERNAME"),
            smtp_password: get("SMTP_PASSWORD"),
            smtp_timeout: parse_timeout("SMTP_TIMEOUT_SECS", get("SMTP_TIMEOUT_SECS"))?,
            secrets_name: get("CONTACT_SECRETS_NAME"),
        })
    }

    /// Fills credentials the environment left unset from the named secret.
    pub async fn load_secrets<SecretRepositoryT: SecretRepository>(
        &mut self,
        repository: &SecretRepositoryT,
        name: &str,
    ) -> anyhow::Result<()> {
        let secrets: ContactSecrets = repository
            .get_secret(name)
            .await
            .map_err(|error| anyhow!("Unable to read secret {name}: {error}"))?;
        let ContactSecrets {
            smtp_username,
            smtp_password,
            captcha_secret,
        } = secrets;
        self.smtp_username = self.smtp_username.take().or(non_blank(smtp_username));
        self.smtp_password = self.smtp_password.take().or(non_blank(smtp_password));
        self.captcha_secret = self.captcha_secret.take().or(non_blank(captcha_secret));
        Ok(())
    }

    /// SMTP credentials, present only when a mail password is configured. The login defaults to
    /// the sender's address.
    pub fn smtp_credentials(&self) -> Option<Credentials> {
        let password = self.smtp_password.clone()?;
        Some(Credentials::new(self.smtp_login(), password))
    }

    fn smtp_login(&self) -> String {
        self.smtp_username
            .clone()
            .unwrap_or_else(|| self.sender.email.to_string())
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn redacted(value: &Option<String>) -> &'static str {
            if value.is_some() {
                "<redacted>"
            } else {
                "<unset>"
            }
        }
        f.debug_struct("Config")
            .field("recipient", &self.recipient)
            .field("sender", &self.sender)
            .field("captcha_secret", &redacted(&self.captcha_secret))
            .field("captcha_verify_url", &self.captcha_verify_url)
            .field("captcha_timeout", &self.captcha_timeout)
            .field("smtp_url", &self.smtp_url)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &redacted(&self.smtp_password))
            .field("smtp_timeout", &self.smtp_timeout)
            .field("secrets_name", &self.secrets_name)
            .finish()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn parse_mailbox(key: &str, value: Option<String>, default: &str) -> anyhow::Result<Mailbox> {
    let value = value.as_deref().unwrap_or(default);
    value
        .parse()
        .with_context(|| format!("{key} is not a valid mailbox: {value}"))
}

fn parse_timeout(key: &str, value: Option<String>) -> anyhow::Result<Duration> {
    let Some(value) = value else {
        return Ok(Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    };
    let seconds: u64 = value
        .trim()
        .parse()
        .with_context(|| format!("{key} is not a number of seconds: {value}"))?;
    ensure!(seconds > 0, "{key} must be at least one second");
    Ok(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::Config;
    use crate::secrets::test_support::FakeSecretRepository;
    use googletest::prelude::*;
    use std::{collections::HashMap, time::Duration};

    fn config_from(variables: &[(&str, &str)]) -> anyhow::Result<Config> {
        let variables: HashMap<String, String> = variables
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(|key| variables.get(key).cloned())
    }

    #[test]
    fn disables_captcha_and_mail_when_nothing_is_configured() -> Result<()> {
        let config = config_from(&[]).unwrap();

        verify_that!(config.captcha_secret, none())?;
        verify_that!(config.smtp_credentials().is_none(), eq(true))
    }

    #[test]
    fn treats_blank_values_as_unset() -> Result<()> {
        let config = config_from(&[("RECAPTCHA_SECRET_KEY", "  "), ("SMTP_PASSWORD", "")]).unwrap();

        verify_that!(config.captcha_secret, none())?;
        verify_that!(config.smtp_password, none())
    }

    #[test]
    fn reads_recipient_and_sender_mailboxes() -> Result<()> {
        let config = config_from(&[
            ("CONTACT_RECIPIENT", "Jane Operator <jane@example.com>"),
            ("CONTACT_SENDER", "Contact form <forms@example.com>"),
        ])
        .unwrap();

        verify_that!(config.recipient.to_string(), contains_substring("jane@example.com"))?;
        verify_that!(config.sender.email.to_string(), eq("forms@example.com"))
    }

    #[test]
    fn rejects_unparseable_recipient() -> Result<()> {
        let result = config_from(&[("CONTACT_RECIPIENT", "not a mailbox")]);

        verify_that!(
            result.map_err(|e| e.to_string()),
            err(contains_substring("CONTACT_RECIPIENT"))
        )
    }

    #[test]
    fn reads_timeouts_in_seconds() -> Result<()> {
        let config = config_from(&[("RECAPTCHA_TIMEOUT_SECS", "3")]).unwrap();

        verify_that!(config.captcha_timeout, eq(Duration::from_secs(3)))?;
        verify_that!(config.smtp_timeout, eq(Duration::from_secs(10)))
    }

    #[test]
    fn rejects_zero_timeout() -> Result<()> {
        verify_that!(config_from(&[("SMTP_TIMEOUT_SECS", "0")]).is_err(), eq(true))
    }

    #[test]
    fn smtp_login_defaults_to_sender_address() -> Result<()> {
        let config = config_from(&[
            ("CONTACT_SENDER", "Contact form <forms@example.com>"),
            ("SMTP_PASSWORD", "app password"),
        ])
        .unwrap();

        verify_that!(config.smtp_login(), eq("forms@example.com"))?;
        verify_that!(config.smtp_credentials().is_some(), eq(true))
    }

    #[test]
    fn does_not_print_secrets() -> Result<()> {
        let config = config_from(&[
            ("RECAPTCHA_SECRET_KEY", "captcha-secret-value"),
            ("SMTP_PASSWORD", "smtp-password-value"),
        ])
        .unwrap();

        let printed = format!("{config:?}");

        verify_that!(
            printed,
            not(contains_substring("captcha-secret-value"))
                .and(not(contains_substring("smtp-password-value")))
        )
    }

    #[tokio::test]
    async fn fills_unset_credentials_from_secret() -> Result<()> {
        let mut config = config_from(&[("SMTP_USERNAME", "from-environment")]).unwrap();
        let repository = FakeSecretRepository::default().with_secret(
            "contact-form",
            r#"{
                "SMTP_USERNAME": "from-secret",
                "SMTP_PASSWORD": "secret password",
                "RECAPTCHA_SECRET_KEY": "secret captcha key"
            }"#,
        );

        config.load_secrets(&repository, "contact-form").await.unwrap();

        verify_that!(config.smtp_username, some(eq("from-environment")))?;
        verify_that!(config.smtp_password, some(eq("secret password")))?;
        verify_that!(config.captcha_secret, some(eq("secret captcha key")))
    }

    #[tokio::test]
    async fn ignores_blank_values_in_secret() -> Result<()> {
        let mut config = config_from(&[]).unwrap();
        let repository = FakeSecretRepository::default().with_secret(
            "contact-form",
            r#"{"SMTP_USERNAME": " ", "SMTP_PASSWORD": "", "RECAPTCHA_SECRET_KEY": ""}"#,
        );

        config.load_secrets(&repository, "contact-form").await.unwrap();

        verify_that!(config.smtp_username, none())?;
        verify_that!(config.smtp_credentials().is_none(), eq(true))?;
        verify_that!(config.captcha_secret, none())
    }

    #[tokio::test]
    async fn fails_when_secret_is_missing() -> Result<()> {
        let mut config = config_from(&[]).unwrap();

        let result = config
            .load_secrets(&FakeSecretRepository::default(), "contact-form")
            .await;

        verify_that!(
            result.map_err(|e| e.to_string()),
            err(contains_substring("contact-form"))
        )
    }
}
